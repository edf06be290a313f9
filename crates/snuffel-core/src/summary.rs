use std::collections::{BTreeMap, BTreeSet};

use polars::prelude::*;
use serde::Serialize;
use tracing::info;

use crate::error::Result;
use crate::schema::{
    duration_seconds, f64_values, require_columns, required_i64_values, AFSTAND, DUUR, ENTITY_ID,
    RIT_ID,
};

const SECONDS_PER_HOUR: f64 = 3600.0;
const M_PER_KM: f64 = 1000.0;

/// `N` total, `G` mean per cyclist, `M` maximum of a single cyclist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Metric {
    #[serde(rename = "N")]
    pub n: f64,
    #[serde(rename = "G", skip_serializing_if = "Option::is_none")]
    pub g: Option<f64>,
    #[serde(rename = "M", skip_serializing_if = "Option::is_none")]
    pub m: Option<f64>,
}

impl Metric {
    fn total_only(n: f64) -> Self {
        Self { n, g: None, m: None }
    }

    fn per_cyclist(per_cyclist: &[f64]) -> Self {
        let n: f64 = per_cyclist.iter().sum();
        let g = if per_cyclist.is_empty() {
            0.0
        } else {
            n / per_cyclist.len() as f64
        };
        let m = per_cyclist.iter().copied().fold(0.0, f64::max);
        Self {
            n,
            g: Some(g),
            m: Some(m),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStatistics {
    pub fietsers: Metric,
    pub ritten: Metric,
    pub uren: Metric,
    pub kilometers: Metric,
}

impl SummaryStatistics {
    pub fn metrics(&self) -> BTreeMap<&'static str, Metric> {
        BTreeMap::from([
            ("fietsers", self.fietsers),
            ("ritten", self.ritten),
            ("uren", self.uren),
            ("kilometers", self.kilometers),
        ])
    }

    pub fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::to_value(self)
    }
}

#[derive(Default)]
struct CyclistTotals {
    trips: BTreeSet<i64>,
    seconds: f64,
    meters: f64,
}

/// Population metrics over a segmented (and usually trip-filtered) table.
pub fn summarize(df: &DataFrame) -> Result<SummaryStatistics> {
    require_columns(df, &[ENTITY_ID, RIT_ID, DUUR, AFSTAND])?;

    let entities = required_i64_values(df, ENTITY_ID)?;
    let rit_ids = required_i64_values(df, RIT_ID)?;
    let duur = duration_seconds(df, DUUR)?;
    let afstand = f64_values(df, AFSTAND)?;

    let mut per_cyclist: BTreeMap<i64, CyclistTotals> = BTreeMap::new();
    for row in 0..df.height() {
        let totals = per_cyclist.entry(entities[row]).or_default();
        totals.trips.insert(rit_ids[row]);
        totals.seconds += duur[row].unwrap_or(0.0);
        totals.meters += afstand[row].unwrap_or(0.0);
    }

    let trips: Vec<f64> = per_cyclist.values().map(|t| t.trips.len() as f64).collect();
    let hours: Vec<f64> = per_cyclist
        .values()
        .map(|t| t.seconds / SECONDS_PER_HOUR)
        .collect();
    let kilometers: Vec<f64> = per_cyclist.values().map(|t| t.meters / M_PER_KM).collect();

    let summary = SummaryStatistics {
        fietsers: Metric::total_only(per_cyclist.len() as f64),
        ritten: Metric::per_cyclist(&trips),
        uren: Metric::per_cyclist(&hours),
        kilometers: Metric::per_cyclist(&kilometers),
    };

    info!(
        cyclists = per_cyclist.len(),
        trips = summary.ritten.n,
        hours = summary.uren.n,
        kilometers = summary.kilometers.n,
        "Computed summary statistics"
    );
    Ok(summary)
}
