use std::collections::{HashMap, HashSet};

use polars::prelude::*;
use tracing::{debug, info};

use crate::config::TripFilterConfig;
use crate::error::{PipelineError, Result};
use crate::schema::{
    duration_seconds, f64_values, filter_rows, require_columns, required_i64_values,
    AANTAL_WAARN, AFSTAND, DUUR, ENTITY_ID, RIT_ID, SNELHEID, SNELHEID_MEAN,
};

const SECONDS_PER_MINUTE: f64 = 60.0;
const M_PER_KM: f64 = 1000.0;
const MS_TO_KMH: f64 = 3.6;

pub const RETAINED: &str = "retained";

/// Plausibility criteria, in the order they are applied and reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TripCriterion {
    MeasurementCount,
    Duration,
    Distance,
    SpeedUpper,
    SpeedLower,
}

impl TripCriterion {
    pub const ALL: [TripCriterion; 5] = [
        TripCriterion::MeasurementCount,
        TripCriterion::Duration,
        TripCriterion::Distance,
        TripCriterion::SpeedUpper,
        TripCriterion::SpeedLower,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TripCriterion::MeasurementCount => "min_measurements",
            TripCriterion::Duration => "max_duration",
            TripCriterion::Distance => "max_distance",
            TripCriterion::SpeedUpper => "max_average_speed",
            TripCriterion::SpeedLower => "min_average_speed",
        }
    }

    fn passes(&self, trip: &TripSummary, config: &TripFilterConfig) -> bool {
        match self {
            TripCriterion::MeasurementCount => trip.aantal_waarn >= config.min_measurements,
            TripCriterion::Duration => trip.duur_minutes < config.max_duration,
            TripCriterion::Distance => trip.afstand_km < config.max_distance,
            TripCriterion::SpeedUpper => trip.snelheid_mean_kmh < config.max_average_speed,
            TripCriterion::SpeedLower => trip.snelheid_mean_kmh >= config.min_average_speed,
        }
    }
}

/// Aggregate of one `(entity_id, rit_id)` group, in the units the filter bounds use.
#[derive(Debug, Clone, PartialEq)]
pub struct TripSummary {
    pub entity_id: i64,
    pub rit_id: i64,
    pub aantal_waarn: usize,
    pub duur_minutes: f64,
    pub afstand_km: f64,
    pub snelheid_mean_kmh: f64,
}

#[derive(Debug, Clone)]
pub struct TripFilterOutcome {
    pub dataframe: DataFrame,
    /// One row per trip with a `retained` flag.
    pub trips: DataFrame,
    pub retained_trips: usize,
    pub removed_rows: Vec<(TripCriterion, usize)>,
}

/// Aggregates rows per trip, in order of first appearance.
pub fn summarize_trips(df: &DataFrame) -> Result<Vec<TripSummary>> {
    require_columns(df, &[ENTITY_ID, RIT_ID, DUUR, AFSTAND, SNELHEID])?;

    let entities = required_i64_values(df, ENTITY_ID)?;
    let rit_ids = required_i64_values(df, RIT_ID)?;
    let duur = required(duration_seconds(df, DUUR)?, DUUR)?;
    let afstand = required(f64_values(df, AFSTAND)?, AFSTAND)?;
    let snelheid = required(f64_values(df, SNELHEID)?, SNELHEID)?;

    let mut index: HashMap<(i64, i64), usize> = HashMap::new();
    let mut trips: Vec<TripSummary> = Vec::new();
    let mut speed_sums: Vec<f64> = Vec::new();

    for row in 0..df.height() {
        let key = (entities[row], rit_ids[row]);
        let slot = *index.entry(key).or_insert_with(|| {
            trips.push(TripSummary {
                entity_id: key.0,
                rit_id: key.1,
                aantal_waarn: 0,
                duur_minutes: 0.0,
                afstand_km: 0.0,
                snelheid_mean_kmh: 0.0,
            });
            speed_sums.push(0.0);
            trips.len() - 1
        });

        let trip = &mut trips[slot];
        trip.aantal_waarn += 1;
        trip.duur_minutes += duur[row] / SECONDS_PER_MINUTE;
        trip.afstand_km += afstand[row] / M_PER_KM;
        speed_sums[slot] += snelheid[row];
    }

    for (trip, speed_sum) in trips.iter_mut().zip(speed_sums) {
        trip.snelheid_mean_kmh = speed_sum / trip.aantal_waarn as f64 * MS_TO_KMH;
    }

    Ok(trips)
}

/// Drops every row of trips that violate any plausibility bound.
///
/// Runs in two passes: trip aggregates decide the retained `(entity_id, rit_id)` set,
/// then rows are kept by membership. Criteria are applied in [`TripCriterion::ALL`]
/// order and each reports the rows of the trips it newly removed.
pub fn filter_trips(df: &DataFrame, config: &TripFilterConfig) -> Result<TripFilterOutcome> {
    let trips = summarize_trips(df)?;

    let mut retained = vec![true; trips.len()];
    let mut removed_rows = Vec::with_capacity(TripCriterion::ALL.len());
    for criterion in TripCriterion::ALL {
        let mut rows = 0;
        for (trip, alive) in trips.iter().zip(retained.iter_mut()) {
            if *alive && !criterion.passes(trip, config) {
                *alive = false;
                rows += trip.aantal_waarn;
            }
        }
        debug!(criterion = criterion.as_str(), rows, "Removed implausible trips");
        removed_rows.push((criterion, rows));
    }

    let kept: HashSet<(i64, i64)> = trips
        .iter()
        .zip(&retained)
        .filter(|(_, alive)| **alive)
        .map(|(trip, _)| (trip.entity_id, trip.rit_id))
        .collect();

    let entities = required_i64_values(df, ENTITY_ID)?;
    let rit_ids = required_i64_values(df, RIT_ID)?;
    let keep: Vec<bool> = entities
        .iter()
        .zip(&rit_ids)
        .map(|(entity, rit)| kept.contains(&(*entity, *rit)))
        .collect();
    let dataframe = filter_rows(df, &keep)?;

    info!(
        trips = trips.len(),
        retained_trips = kept.len(),
        rows = dataframe.height(),
        "Filtered implausible trips"
    );

    Ok(TripFilterOutcome {
        dataframe,
        trips: trips_frame(&trips, &retained)?,
        retained_trips: kept.len(),
        removed_rows,
    })
}

fn trips_frame(trips: &[TripSummary], retained: &[bool]) -> Result<DataFrame> {
    let frame = DataFrame::new(vec![
        Series::new(
            ENTITY_ID.into(),
            trips.iter().map(|t| t.entity_id).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            RIT_ID.into(),
            trips.iter().map(|t| t.rit_id).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            AANTAL_WAARN.into(),
            trips.iter().map(|t| t.aantal_waarn as u64).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            DUUR.into(),
            trips.iter().map(|t| t.duur_minutes).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            AFSTAND.into(),
            trips.iter().map(|t| t.afstand_km).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(
            SNELHEID_MEAN.into(),
            trips.iter().map(|t| t.snelheid_mean_kmh).collect::<Vec<_>>(),
        )
        .into(),
        Series::new(RETAINED.into(), retained.to_vec()).into(),
    ])?;
    Ok(frame)
}

fn required(values: Vec<Option<f64>>, column: &str) -> Result<Vec<f64>> {
    values
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or_else(|| PipelineError::NullValue {
                column: column.to_string(),
                row,
            })
        })
        .collect()
}
