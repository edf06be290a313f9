//! Bitmask error codes reported by the Snuffelfiets sensor boards.

use std::collections::{BTreeMap, BTreeSet};

use polars::prelude::*;
use tracing::{debug, info};

use crate::error::Result;
use crate::schema::{filter_rows, i64_values, require_columns, ERROR_CODE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Critical,
    /// Expected in normal operation, e.g. no GPS fix indoors.
    Allowed,
    Reserved,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorFlag {
    pub bit: u32,
    pub description: &'static str,
    pub severity: Severity,
}

pub const ERROR_FLAGS: [ErrorFlag; 16] = [
    flag(1, "ACCELEROMETER ERROR 1: Sensor Not Found", Severity::Critical),
    flag(2, "Reserved", Severity::Reserved),
    flag(4, "BME ERROR 1: Sensor Not Found", Severity::Critical),
    flag(8, "BME ERROR 2: Failed to begin reading", Severity::Critical),
    flag(16, "GPS ERROR 1: Sensor Not Found", Severity::Critical),
    flag(32, "GPS ERROR 2: No GPS Fix", Severity::Allowed),
    flag(64, "Reserved", Severity::Reserved),
    flag(128, "NO2 ERROR 1: Sensor Not Found", Severity::Reserved),
    flag(256, "Reserved", Severity::Reserved),
    flag(512, "PM ERROR 1: Sensor Not Found", Severity::Critical),
    flag(1024, "PM ERROR 2a: Measurement Start Failure", Severity::Critical),
    flag(2048, "PM ERROR 2b: Measurement Read Failure", Severity::Allowed),
    flag(4096, "PM ERROR 2c: Measurement Accuracy Uncertain", Severity::Critical),
    flag(8192, "Reserved", Severity::Reserved),
    flag(16384, "Reserved", Severity::Reserved),
    flag(32768, "Reserved", Severity::Reserved),
];

const fn flag(bit: u32, description: &'static str, severity: Severity) -> ErrorFlag {
    ErrorFlag {
        bit,
        description,
        severity,
    }
}

/// Splits a compound code into its individual flags, e.g. `20 -> {4, 16}`.
pub fn decode(code: u32) -> BTreeSet<u32> {
    let mut flags = BTreeSet::new();
    let mut remaining = code;
    while remaining != 0 {
        let lowest = remaining & remaining.wrapping_neg();
        flags.insert(lowest);
        remaining &= remaining - 1;
    }
    flags
}

pub fn describe(bit: u32) -> Option<&'static ErrorFlag> {
    ERROR_FLAGS.iter().find(|flag| flag.bit == bit)
}

#[derive(Debug, Clone)]
pub struct ErrorFilterOutcome {
    pub dataframe: DataFrame,
    pub removed_per_code: BTreeMap<i64, usize>,
    pub remaining_codes: BTreeSet<i64>,
}

impl ErrorFilterOutcome {
    pub fn removed_rows(&self) -> usize {
        self.removed_per_code.values().sum()
    }
}

/// Drops measurements by error code.
///
/// With an empty `codes` every row with a non-zero code is removed. Otherwise only rows
/// whose code equals one of `codes` are removed: a row with code 20 survives a filter
/// for 4. Rows without a code are kept.
pub fn filter_errors(df: &DataFrame, codes: &[i64]) -> Result<ErrorFilterOutcome> {
    require_columns(df, &[ERROR_CODE])?;
    let values = i64_values(df, ERROR_CODE)?;

    let selected: BTreeSet<i64> = codes.iter().copied().collect();
    let removes = |code: i64| {
        if selected.is_empty() {
            code != 0
        } else {
            selected.contains(&code)
        }
    };

    let mut keep = Vec::with_capacity(values.len());
    let mut removed_per_code: BTreeMap<i64, usize> = BTreeMap::new();
    let mut remaining_codes = BTreeSet::new();

    for value in &values {
        match value {
            Some(code) if removes(*code) => {
                *removed_per_code.entry(*code).or_insert(0) += 1;
                keep.push(false);
            }
            Some(code) => {
                remaining_codes.insert(*code);
                keep.push(true);
            }
            None => keep.push(true),
        }
    }

    for (code, count) in &removed_per_code {
        let flags: Vec<u32> = u32::try_from(*code)
            .map(|bits| decode(bits).into_iter().collect())
            .unwrap_or_default();
        debug!(code = *code, ?flags, rows = *count, "Removed measurements with error code");
    }

    let dataframe = filter_rows(df, &keep)?;
    info!(
        removed = removed_per_code.values().sum::<usize>(),
        kept = dataframe.height(),
        remaining_codes = ?remaining_codes,
        "Filtered error codes"
    );

    Ok(ErrorFilterOutcome {
        dataframe,
        removed_per_code,
        remaining_codes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_scans_every_bit() {
        assert_eq!(decode(20), BTreeSet::from([4, 16]));
        assert!(decode(0).is_empty());
        assert_eq!(decode(1), BTreeSet::from([1]));
        assert_eq!(decode(u32::MAX).len(), 32);
    }

    #[test]
    fn table_covers_the_sixteen_documented_bits() {
        for (idx, flag) in ERROR_FLAGS.iter().enumerate() {
            assert_eq!(flag.bit, 1 << idx);
        }
        assert_eq!(describe(32).map(|f| f.severity), Some(Severity::Allowed));
        assert!(describe(65536).is_none());
    }
}
