use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;
use polars::prelude::*;

use snuffel_core::error::PipelineError;
use snuffel_core::error_codes::{decode, describe, filter_errors, Severity};

fn coded_frame() -> DataFrame {
    df!(
        "_id" => &[1i64, 2, 3, 4, 5, 6, 7],
        "error_code" => &[Some(0i64), Some(4), Some(20), Some(36), Some(0), None, Some(32)],
    )
    .unwrap()
}

fn ids(df: &DataFrame) -> Vec<i64> {
    df.column("_id")
        .unwrap()
        .i64()
        .unwrap()
        .into_no_null_iter()
        .collect()
}

#[test]
fn compound_codes_decode_into_flags() {
    assert_eq!(decode(36), BTreeSet::from([4, 32]));
    assert_eq!(decode(4096 | 1), BTreeSet::from([1, 4096]));

    let gps_fix = describe(32).unwrap();
    assert_eq!(gps_fix.severity, Severity::Allowed);
    assert_eq!(describe(4).unwrap().severity, Severity::Critical);
}

#[test]
fn empty_selection_keeps_only_clean_rows() -> Result<()> {
    let outcome = filter_errors(&coded_frame(), &[])?;

    assert_eq!(ids(&outcome.dataframe), vec![1, 5, 6]);
    assert_eq!(
        outcome.removed_per_code,
        BTreeMap::from([(4, 1), (20, 1), (32, 1), (36, 1)])
    );
    assert_eq!(outcome.removed_rows(), 4);
    assert_eq!(outcome.remaining_codes, BTreeSet::from([0]));
    Ok(())
}

#[test]
fn selected_codes_match_exactly() -> Result<()> {
    let outcome = filter_errors(&coded_frame(), &[4])?;

    assert_eq!(ids(&outcome.dataframe), vec![1, 3, 4, 5, 6, 7]);
    assert_eq!(outcome.removed_per_code, BTreeMap::from([(4, 1)]));
    assert_eq!(outcome.remaining_codes, BTreeSet::from([0, 20, 32, 36]));
    Ok(())
}

#[test]
fn selecting_an_absent_code_removes_nothing() -> Result<()> {
    let outcome = filter_errors(&coded_frame(), &[1024])?;
    assert_eq!(outcome.dataframe.height(), 7);
    assert_eq!(outcome.removed_rows(), 0);
    Ok(())
}

#[test]
fn missing_error_code_column_is_reported() {
    let df = df!("_id" => &[1i64]).unwrap();
    let result = filter_errors(&df, &[]);
    assert!(matches!(result, Err(PipelineError::MissingColumn(column)) if column == "error_code"));
}
