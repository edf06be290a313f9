//! Normalization of a freshly fetched measurement table before any unit correction.
//!
//! The CKAN datastore delivers some integer fields as text, ships a bulky `_full_text`
//! column and keeps timestamps as ISO-8601 strings; these helpers turn that into a
//! typed frame sorted the way the trip segmenter expects.

use polars::prelude::*;
use tracing::info;

use crate::error::Result;
use crate::schema::{
    datetime_series, has_column, i64_values, require_columns, required_i64_values,
    required_timestamp_micros, take_rows, timestamp_micros, ENTITY_ID, ERROR_CODE, FULL_TEXT,
    RECORDING_TIMESTAMP, VERSION_MAJOR, VERSION_MINOR,
};

pub const DEFAULT_DROPPED_COLUMNS: [&str; 1] = [FULL_TEXT];
pub const DEFAULT_INTEGER_COLUMNS: [&str; 4] =
    [ENTITY_ID, VERSION_MAJOR, VERSION_MINOR, ERROR_CODE];

/// Drops the named columns that are present; absent ones are skipped.
pub fn drop_columns(df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
    let mut output = df.clone();
    for name in columns {
        if has_column(&output, name) {
            output = output.drop(name)?;
        }
    }
    Ok(output)
}

/// Coerces the named columns to `Int64`, parsing text values strictly.
pub fn convert_to_int(df: &DataFrame, columns: &[&str]) -> Result<DataFrame> {
    require_columns(df, columns)?;

    let mut output = df.clone();
    for name in columns {
        let values = i64_values(&output, name)?;
        output.with_column(Series::new((*name).into(), values))?;
    }
    Ok(output)
}

/// Replaces `recording_timestamp` with a UTC datetime column.
pub fn parse_timestamps(df: &DataFrame) -> Result<DataFrame> {
    require_columns(df, &[RECORDING_TIMESTAMP])?;
    let micros = timestamp_micros(df, RECORDING_TIMESTAMP)?;

    let mut output = df.clone();
    output.with_column(datetime_series(RECORDING_TIMESTAMP, micros)?)?;
    Ok(output)
}

/// Stable sort by `(entity_id, recording_timestamp)`, comparing instants rather than the
/// raw strings so mixed UTC offsets order correctly.
pub fn sort_measurements(df: &DataFrame) -> Result<DataFrame> {
    require_columns(df, &[ENTITY_ID, RECORDING_TIMESTAMP])?;
    let entities = required_i64_values(df, ENTITY_ID)?;
    let timestamps = required_timestamp_micros(df, RECORDING_TIMESTAMP)?;

    let mut order: Vec<usize> = (0..df.height()).collect();
    order.sort_by_key(|&idx| (entities[idx], timestamps[idx]));

    Ok(take_rows(df, &order)?)
}

/// Default normalization: drop `_full_text`, coerce integer fields, parse timestamps and
/// sort.
pub fn prepare(df: &DataFrame) -> Result<DataFrame> {
    let dropped = drop_columns(df, &DEFAULT_DROPPED_COLUMNS)?;
    let typed = convert_to_int(&dropped, &DEFAULT_INTEGER_COLUMNS)?;
    let parsed = parse_timestamps(&typed)?;
    let sorted = sort_measurements(&parsed)?;

    info!(
        rows = sorted.height(),
        columns = sorted.width(),
        "Prepared measurement table"
    );
    Ok(sorted)
}
