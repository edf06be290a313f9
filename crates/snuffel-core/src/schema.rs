//! Column names shared by every stage plus typed accessors over `DataFrame` columns.
//!
//! Stages work row-wise on plain vectors extracted here, so every accessor reports a
//! missing column as [`PipelineError::MissingColumn`] instead of a bare polars error.

use chrono::{DateTime, NaiveDateTime};
use polars::prelude::*;

use crate::error::{PipelineError, Result};

pub const ROW_ID: &str = "_id";
pub const FULL_TEXT: &str = "_full_text";
pub const ENTITY_ID: &str = "entity_id";
pub const RECORDING_TIMESTAMP: &str = "recording_timestamp";
pub const LATITUDE: &str = "latitude";
pub const LONGITUDE: &str = "longitude";
pub const PM1_0: &str = "pm1_0";
pub const PM2_5: &str = "pm2_5";
pub const PM10: &str = "pm10";
pub const TEMPERATURE: &str = "temperature";
pub const PRESSURE: &str = "pressure";
pub const VOLTAGE: &str = "voltage";
pub const HUMIDITY: &str = "humidity";
pub const VERSION_MAJOR: &str = "version_major";
pub const VERSION_MINOR: &str = "version_minor";
pub const ERROR_CODE: &str = "error_code";

pub const UNITS_CORRECTED: &str = "units_corrected";

pub const DUUR: &str = "duur";
pub const RIT_ID: &str = "rit_id";
pub const AFSTAND: &str = "afstand";
pub const SNELHEID: &str = "snelheid";

pub const AANTAL_WAARN: &str = "aantal_waarn";
pub const SNELHEID_MEAN: &str = "snelheid_mean";

pub const TRIP_ID: &str = "trip_id";

const MICROS_PER_MILLI: i64 = 1_000;
const NANOS_PER_MICRO: i64 = 1_000;

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
const OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M:%S%.f%z"];

pub fn has_column(df: &DataFrame, name: &str) -> bool {
    df.get_column_index(name).is_some()
}

pub fn require_columns(df: &DataFrame, columns: &[&str]) -> Result<()> {
    match columns.iter().find(|name| !has_column(df, name)) {
        Some(missing) => Err(PipelineError::MissingColumn((*missing).to_string())),
        None => Ok(()),
    }
}

fn column<'a>(df: &'a DataFrame, name: &str) -> Result<&'a Column> {
    df.column(name)
        .map_err(|_| PipelineError::MissingColumn(name.to_string()))
}

pub fn f64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let casted = column(df, name)?.cast(&DataType::Float64)?;
    Ok(casted.f64()?.into_iter().collect())
}

/// Integer view of a column. String columns are parsed strictly (the CKAN API delivers
/// some integer fields as text); any other dtype goes through a polars cast.
pub fn i64_values(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let source = column(df, name)?;
    if matches!(source.dtype(), DataType::String) {
        return source
            .str()?
            .into_iter()
            .map(|value| value.map(|raw| parse_integer(name, raw)).transpose())
            .collect();
    }

    if source.dtype().is_float() {
        let casted = source.cast(&DataType::Float64)?;
        return casted
            .f64()?
            .into_iter()
            .map(|value| value.map(|raw| float_to_integer(name, raw)).transpose())
            .collect();
    }

    let casted = source.cast(&DataType::Int64)?;
    Ok(casted.i64()?.into_iter().collect())
}

fn float_to_integer(name: &str, value: f64) -> Result<i64> {
    let in_range = (i64::MIN as f64..i64::MAX as f64).contains(&value);
    if in_range && value.fract() == 0.0 {
        Ok(value as i64)
    } else {
        Err(PipelineError::InvalidValue {
            column: name.to_string(),
            value: value.to_string(),
        })
    }
}

pub fn required_i64_values(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    i64_values(df, name)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| PipelineError::NullValue {
                column: name.to_string(),
                row,
            })
        })
        .collect()
}

fn parse_integer(name: &str, raw: &str) -> Result<i64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Ok(value);
    }
    // "2.0" style values show up when a column passed through a float dtype upstream.
    trimmed
        .parse::<f64>()
        .ok()
        .and_then(|value| float_to_integer(name, value).ok())
        .ok_or_else(|| PipelineError::InvalidValue {
            column: name.to_string(),
            value: raw.to_string(),
        })
}

/// Timestamps as UTC microseconds, accepting both ISO-8601 strings and datetime columns.
pub fn timestamp_micros(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let source = column(df, name)?;
    match source.dtype() {
        DataType::String => source
            .str()?
            .into_iter()
            .map(|value| {
                value
                    .map(|raw| {
                        parse_timestamp_micros(raw).ok_or_else(|| PipelineError::InvalidTimestamp {
                            column: name.to_string(),
                            value: raw.to_string(),
                        })
                    })
                    .transpose()
            })
            .collect(),
        DataType::Datetime(unit, _) => {
            let unit = *unit;
            let casted = source.cast(&DataType::Int64)?;
            casted
                .i64()?
                .into_iter()
                .map(|value| {
                    value
                        .map(|raw| {
                            to_micros(raw, unit).ok_or_else(|| PipelineError::InvalidTimestamp {
                                column: name.to_string(),
                                value: format!("{raw} ({unit:?})"),
                            })
                        })
                        .transpose()
                })
                .collect()
        }
        other => Err(PipelineError::InvalidValue {
            column: name.to_string(),
            value: format!("dtype {other}"),
        }),
    }
}

pub fn required_timestamp_micros(df: &DataFrame, name: &str) -> Result<Vec<i64>> {
    timestamp_micros(df, name)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| PipelineError::NullValue {
                column: name.to_string(),
                row,
            })
        })
        .collect()
}

/// `None` when a millisecond value does not fit in microseconds.
fn to_micros(value: i64, unit: TimeUnit) -> Option<i64> {
    match unit {
        TimeUnit::Nanoseconds => Some(value.div_euclid(NANOS_PER_MICRO)),
        TimeUnit::Microseconds => Some(value),
        TimeUnit::Milliseconds => value.checked_mul(MICROS_PER_MILLI),
    }
}

fn to_seconds(value: i64, unit: TimeUnit) -> f64 {
    let per_second = match unit {
        TimeUnit::Nanoseconds => 1_000_000_000.0,
        TimeUnit::Microseconds => 1_000_000.0,
        TimeUnit::Milliseconds => 1_000.0,
    };
    value as f64 / per_second
}

/// Parses an ISO-8601 timestamp into UTC microseconds. Values without an offset are
/// taken as UTC.
pub fn parse_timestamp_micros(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.timestamp_micros());
    }
    for format in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(trimmed, format) {
            return Some(dt.timestamp_micros());
        }
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(naive.and_utc().timestamp_micros());
        }
    }
    None
}

pub(crate) fn filter_rows(df: &DataFrame, keep: &[bool]) -> PolarsResult<DataFrame> {
    df.filter(&BooleanChunked::from_slice("keep".into(), keep))
}

pub(crate) fn take_rows(df: &DataFrame, rows: &[usize]) -> PolarsResult<DataFrame> {
    let indices: Vec<IdxSize> = rows.iter().map(|row| *row as IdxSize).collect();
    df.take(&IdxCa::from_vec("row".into(), indices))
}

pub(crate) fn datetime_series(name: &str, micros: Vec<Option<i64>>) -> PolarsResult<Series> {
    Series::new(name.into(), micros).cast(&DataType::Datetime(
        TimeUnit::Microseconds,
        Some(polars::prelude::TimeZone::UTC),
    ))
}

pub(crate) fn duration_series(name: &str, micros: Vec<i64>) -> PolarsResult<Series> {
    Series::new(name.into(), micros).cast(&DataType::Duration(TimeUnit::Microseconds))
}

/// Duration column as seconds; accepts a polars duration or a plain numeric column
/// holding seconds.
pub fn duration_seconds(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let source = column(df, name)?;
    if let DataType::Duration(unit) = source.dtype() {
        let unit = *unit;
        let casted = source.cast(&DataType::Int64)?;
        return Ok(casted
            .i64()?
            .into_iter()
            .map(|value| value.map(|raw| to_seconds(raw, unit)))
            .collect());
    }
    f64_values(df, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_supported_timestamp_shapes() {
        let expected = 1_731_405_600_000_000;
        assert_eq!(parse_timestamp_micros("2024-11-12T10:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp_micros("2024-11-12T11:00:00+01:00"), Some(expected));
        assert_eq!(parse_timestamp_micros("2024-11-12 10:00:00"), Some(expected));
        assert_eq!(parse_timestamp_micros("2024-11-12T10:00:00.000"), Some(expected));
        assert_eq!(parse_timestamp_micros("not a time"), None);
    }

    #[test]
    fn parses_float_formatted_integers() {
        assert_eq!(parse_integer("version_major", "2.0").unwrap(), 2);
        assert!(parse_integer("version_major", "2.5").is_err());
    }

    #[test]
    fn rejects_fractional_and_non_finite_floats() {
        assert_eq!(float_to_integer("error_code", 32.0).unwrap(), 32);
        assert!(float_to_integer("error_code", 4.7).is_err());
        assert!(float_to_integer("error_code", f64::NAN).is_err());
        assert!(float_to_integer("error_code", f64::INFINITY).is_err());
    }

    #[test]
    fn millisecond_overflow_is_detected() {
        assert_eq!(to_micros(1_500, TimeUnit::Milliseconds), Some(1_500_000));
        assert_eq!(to_micros(i64::MAX / 10, TimeUnit::Milliseconds), None);
    }

    #[test]
    fn overflowing_datetime_column_is_an_invalid_timestamp() {
        let timestamps = Series::new(RECORDING_TIMESTAMP.into(), vec![i64::MAX / 10])
            .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
            .unwrap();
        let df = DataFrame::new(vec![timestamps.into()]).unwrap();
        assert!(matches!(
            timestamp_micros(&df, RECORDING_TIMESTAMP),
            Err(PipelineError::InvalidTimestamp { .. })
        ));
    }
}
