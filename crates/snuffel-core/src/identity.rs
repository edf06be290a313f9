//! Stable identifiers for trips.
//!
//! `rit_id` is generated per run and restarts for every entity, so a trip is only
//! identified by combining it with the entity and the datastore id of its first row.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use polars::prelude::*;

use crate::error::{PipelineError, Result};
use crate::schema::{
    has_column, i64_values, require_columns, required_i64_values, required_timestamp_micros,
    take_rows, ENTITY_ID, RECORDING_TIMESTAMP, RIT_ID, ROW_ID, TRIP_ID,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TripIdentity {
    pub first_row_id: i64,
    pub rit_id: i64,
    pub entity_id: i64,
}

impl fmt::Display for TripIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "first_id={} rit_id={} entity_id={}",
            self.first_row_id, self.rit_id, self.entity_id
        )
    }
}

/// Identity of a frame holding exactly one trip.
pub fn trip_identity(df: &DataFrame) -> Result<TripIdentity> {
    require_columns(df, &[ROW_ID, RIT_ID, ENTITY_ID, RECORDING_TIMESTAMP])?;
    if df.height() == 0 {
        return Err(PipelineError::Invariant(
            "cannot derive a trip identity from an empty frame".to_string(),
        ));
    }

    let rit_id = single_value(df, RIT_ID)?;
    let entity_id = single_value(df, ENTITY_ID)?;

    let timestamps = required_timestamp_micros(df, RECORDING_TIMESTAMP)?;
    if let Some(row) = (1..timestamps.len()).find(|&row| timestamps[row] < timestamps[row - 1]) {
        return Err(PipelineError::Invariant(format!(
            "{RECORDING_TIMESTAMP} decreases at row {row} of trip {rit_id} of entity {entity_id}"
        )));
    }

    let first_row_id = i64_values(df, ROW_ID)?
        .first()
        .copied()
        .flatten()
        .ok_or_else(|| PipelineError::NullValue {
            column: ROW_ID.to_string(),
            row: 0,
        })?;

    Ok(TripIdentity {
        first_row_id,
        rit_id,
        entity_id,
    })
}

/// Appends `trip_id` to a single-trip frame. An existing `trip_id` column is never
/// overwritten.
pub fn add_trip_identity(df: &DataFrame) -> Result<DataFrame> {
    if has_column(df, TRIP_ID) {
        return Err(PipelineError::IdentityExists(TRIP_ID.to_string()));
    }

    let identity = trip_identity(df)?.to_string();
    let mut output = df.clone();
    output.with_column(Series::new(
        TRIP_ID.into(),
        vec![identity.as_str(); df.height()],
    ))?;
    Ok(output)
}

/// Identities of every trip in a segmented frame, in order of first appearance.
pub fn trip_identities(df: &DataFrame) -> Result<Vec<TripIdentity>> {
    require_columns(df, &[ENTITY_ID, RIT_ID])?;
    let entities = required_i64_values(df, ENTITY_ID)?;
    let rit_ids = required_i64_values(df, RIT_ID)?;

    let mut order: Vec<(i64, i64)> = Vec::new();
    let mut rows_per_trip: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for (row, key) in entities.into_iter().zip(rit_ids).enumerate() {
        rows_per_trip
            .entry(key)
            .or_insert_with(|| {
                order.push(key);
                Vec::new()
            })
            .push(row);
    }

    order
        .into_iter()
        .map(|key| {
            let rows = &rows_per_trip[&key];
            trip_identity(&take_rows(df, rows)?)
        })
        .collect()
}

fn single_value(df: &DataFrame, column: &str) -> Result<i64> {
    let distinct: BTreeSet<i64> = required_i64_values(df, column)?.into_iter().collect();
    match (distinct.len(), distinct.first()) {
        (1, Some(value)) => Ok(*value),
        (count, _) => Err(PipelineError::Invariant(format!(
            "{column} is not unique within the trip ({count} distinct values)"
        ))),
    }
}
