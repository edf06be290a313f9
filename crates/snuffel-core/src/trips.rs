use polars::prelude::*;
use tracing::{info, warn};

use crate::config::SegmentationConfig;
use crate::error::{PipelineError, Result};
use crate::schema::{
    duration_series, f64_values, require_columns, required_i64_values, required_timestamp_micros,
    AFSTAND, DUUR, ENTITY_ID, LATITUDE, LONGITUDE, RECORDING_TIMESTAMP, RIT_ID, SNELHEID,
};

const MICROS_PER_SECOND: f64 = 1_000_000.0;

/// Per-row trip attributes, aligned with the rows of the segmented frame.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripColumns {
    pub duur_micros: Vec<i64>,
    pub rit_id: Vec<i64>,
    pub afstand: Vec<f64>,
    pub snelheid: Vec<f64>,
}

/// Splits every entity's stream into trips and appends `duur`, `rit_id`, `afstand` and
/// `snelheid`.
///
/// Input must be sorted by `(entity_id, recording_timestamp)`; see
/// [`crate::ingestion::sort_measurements`]. Trip numbering restarts at 1 for every entity.
pub fn segment_trips(df: &DataFrame, config: &SegmentationConfig) -> Result<DataFrame> {
    require_columns(df, &[ENTITY_ID, RECORDING_TIMESTAMP, LATITUDE, LONGITUDE])?;

    let entities = required_i64_values(df, ENTITY_ID)?;
    let timestamps = required_timestamp_micros(df, RECORDING_TIMESTAMP)?;
    let latitudes = f64_values(df, LATITUDE)?;
    let longitudes = f64_values(df, LONGITUDE)?;

    check_sorted(&entities, &timestamps)?;

    let coordinates: Vec<Option<(f64, f64)>> = latitudes
        .into_iter()
        .zip(longitudes)
        .map(|pair| match pair {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        })
        .collect();

    let columns = compute_trip_columns(&entities, &timestamps, &coordinates, config);

    let rit_ids = &columns.rit_id;
    let trip_count = (0..rit_ids.len())
        .filter(|&idx| {
            idx == 0 || entities[idx] != entities[idx - 1] || rit_ids[idx] != rit_ids[idx - 1]
        })
        .count();

    let mut output = df.clone();
    output.with_column(duration_series(DUUR, columns.duur_micros)?)?;
    output.with_column(Series::new(RIT_ID.into(), columns.rit_id))?;
    output.with_column(Series::new(AFSTAND.into(), columns.afstand))?;
    output.with_column(Series::new(SNELHEID.into(), columns.snelheid))?;

    info!(
        rows = output.height(),
        trips = trip_count,
        gap_seconds = config.trip_gap_seconds,
        "Segmented measurements into trips"
    );
    Ok(output)
}

/// The segmentation state machine over already extracted, sorted columns.
pub fn compute_trip_columns(
    entities: &[i64],
    timestamps: &[i64],
    coordinates: &[Option<(f64, f64)>],
    config: &SegmentationConfig,
) -> TripColumns {
    let len = entities.len();
    let gap_threshold = (config.trip_gap_seconds * MICROS_PER_SECOND) as i64;
    let mut columns = TripColumns {
        duur_micros: Vec::with_capacity(len),
        rit_id: Vec::with_capacity(len),
        afstand: Vec::with_capacity(len),
        snelheid: Vec::with_capacity(len),
    };
    let mut missing_coordinates = 0usize;
    let mut rit_id = 1i64;

    for idx in 0..len {
        if idx == 0 || entities[idx] != entities[idx - 1] {
            rit_id = 1;
            columns.push(0, rit_id, 0.0);
            continue;
        }

        let gap = timestamps[idx] - timestamps[idx - 1];
        if gap >= gap_threshold {
            rit_id += 1;
            columns.push(0, rit_id, 0.0);
            continue;
        }

        if gap == 0 {
            columns.push(0, rit_id, 0.0);
            continue;
        }

        let afstand = match (coordinates[idx - 1], coordinates[idx]) {
            (Some((lat1, lon1)), Some((lat2, lon2))) => {
                config.distance_model.distance(lat1, lon1, lat2, lon2)
            }
            _ => {
                missing_coordinates += 1;
                0.0
            }
        };
        columns.push(gap, rit_id, afstand);
    }

    if missing_coordinates > 0 {
        warn!(
            rows = missing_coordinates,
            "Rows without coordinates contribute no distance"
        );
    }
    columns
}

impl TripColumns {
    fn push(&mut self, duur_micros: i64, rit_id: i64, afstand: f64) {
        let snelheid = if duur_micros > 0 {
            afstand / (duur_micros as f64 / MICROS_PER_SECOND)
        } else {
            0.0
        };
        self.duur_micros.push(duur_micros);
        self.rit_id.push(rit_id);
        self.afstand.push(afstand);
        self.snelheid.push(snelheid);
    }
}

fn check_sorted(entities: &[i64], timestamps: &[i64]) -> Result<()> {
    for idx in 1..entities.len() {
        let (prev_entity, entity) = (entities[idx - 1], entities[idx]);
        if entity < prev_entity {
            return Err(PipelineError::Invariant(format!(
                "rows are not sorted by {ENTITY_ID}: {entity} follows {prev_entity} at row {idx}"
            )));
        }
        if entity == prev_entity && timestamps[idx] < timestamps[idx - 1] {
            return Err(PipelineError::Invariant(format!(
                "rows of {ENTITY_ID} {entity} are not sorted by {RECORDING_TIMESTAMP} at row {idx}"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_equal_to_threshold_starts_a_new_trip() {
        let config = SegmentationConfig::default();
        let second = 1_000_000;
        let columns = compute_trip_columns(
            &[1, 1, 1],
            &[0, 1800 * second - 1, 2 * 1800 * second - 1],
            &[None, None, None],
            &config,
        );
        assert_eq!(columns.rit_id, vec![1, 1, 2]);
        assert_eq!(columns.duur_micros[2], 0);
    }

    #[test]
    fn unsorted_entities_are_rejected() {
        assert!(check_sorted(&[2, 1], &[0, 1]).is_err());
        assert!(check_sorted(&[1, 2, 1], &[0, 0, 5]).is_err());
        assert!(check_sorted(&[1, 1], &[5, 0]).is_err());
        assert!(check_sorted(&[1, 1, 2], &[0, 5, 0]).is_ok());
    }
}
