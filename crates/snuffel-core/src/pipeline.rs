use std::collections::{BTreeMap, BTreeSet};

use anyhow::{Context, Result};
use polars::prelude::DataFrame;
use serde::Serialize;
use tracing::info;

use crate::{
    config::PipelineConfig,
    error_codes, geo_distance, ingestion,
    summary::{self, SummaryStatistics},
    trip_filters, trips, units,
};

pub const DISTANCE_TO_REFERENCE: &str = "distance";

/// Row and trip counts per stage, for auditing what the pipeline discarded.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineReport {
    pub rows_in: usize,
    pub rows_after_error_filter: usize,
    pub removed_per_error_code: BTreeMap<i64, usize>,
    pub remaining_error_codes: BTreeSet<i64>,
    pub trips_segmented: usize,
    pub trips_retained: usize,
    pub removed_rows_per_trip_filter: Vec<(&'static str, usize)>,
    pub rows_out: usize,
}

pub struct PipelineOutput {
    pub dataframe: DataFrame,
    /// Per-trip aggregates, including discarded trips.
    pub trips: DataFrame,
    pub summary: SummaryStatistics,
    pub report: PipelineReport,
}

pub trait ProcessingPipeline {
    fn code_identifier(&self) -> &'static str;
    fn version(&self) -> &'static str;
    fn run_batch(&self, config: &PipelineConfig, raw: &DataFrame) -> Result<PipelineOutput>;
}

/// Normalize, correct units, drop error rows, segment, filter trips and summarize.
pub struct StandardTripPipeline;

impl ProcessingPipeline for StandardTripPipeline {
    fn code_identifier(&self) -> &'static str {
        "snuffelfiets_trips_v1"
    }

    fn version(&self) -> &'static str {
        "0.1.0"
    }

    fn run_batch(&self, config: &PipelineConfig, raw: &DataFrame) -> Result<PipelineOutput> {
        config.validate().context("invalid pipeline configuration")?;

        let prepared = ingestion::prepare(raw).context("failed to normalize measurements")?;
        let corrected = units::correct_units(&prepared, &config.corrections)
            .context("failed to correct units")?;
        let cleaned = error_codes::filter_errors(&corrected, &config.error_codes)
            .context("failed to filter error codes")?;
        let segmented = trips::segment_trips(&cleaned.dataframe, &config.segmentation)
            .context("failed to segment trips")?;
        let filtered = trip_filters::filter_trips(&segmented, &config.trip_filters)
            .context("failed to filter trips")?;

        let dataframe = match &config.reference_point {
            Some(reference) => geo_distance::add_distance_to_point(
                &filtered.dataframe,
                reference,
                DISTANCE_TO_REFERENCE,
            )
            .context("failed to compute distance to reference point")?,
            None => filtered.dataframe,
        };

        let summary = summary::summarize(&dataframe).context("failed to summarize trips")?;

        let report = PipelineReport {
            rows_in: raw.height(),
            rows_after_error_filter: cleaned.dataframe.height(),
            removed_per_error_code: cleaned.removed_per_code,
            remaining_error_codes: cleaned.remaining_codes,
            trips_segmented: filtered.trips.height(),
            trips_retained: filtered.retained_trips,
            removed_rows_per_trip_filter: filtered
                .removed_rows
                .iter()
                .map(|(criterion, rows)| (criterion.as_str(), *rows))
                .collect(),
            rows_out: dataframe.height(),
        };

        info!(
            pipeline = self.code_identifier(),
            rows_in = report.rows_in,
            rows_out = report.rows_out,
            trips = report.trips_retained,
            "Pipeline run complete"
        );

        Ok(PipelineOutput {
            dataframe,
            trips: filtered.trips,
            summary,
            report,
        })
    }
}

pub fn run_pipeline(config: &PipelineConfig, raw: &DataFrame) -> Result<PipelineOutput> {
    StandardTripPipeline.run_batch(config, raw)
}
