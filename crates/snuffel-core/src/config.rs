//! Pipeline configuration as typed data.
//!
//! Every table is a closed struct with `deny_unknown_fields`, so a misspelled key in a
//! TOML file fails at load time instead of silently falling back to a default.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::geo_distance::{DistanceModel, ReferencePoint};
use crate::schema::{PM10, PM1_0, PM2_5, PRESSURE, TEMPERATURE, VERSION_MAJOR, VOLTAGE};

pub const DEFAULT_TRIP_GAP_SECONDS: f64 = 1800.0;

/// Comparison operators usable in a correction condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Comparison {
    Ge,
    Gt,
    Le,
    Lt,
    Eq,
}

impl Comparison {
    pub fn evaluate(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Ge => lhs >= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Le => lhs <= rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Eq => lhs == rhs,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Condition {
    pub column: String,
    pub comparison: Comparison,
    pub value: f64,
}

/// `value' = offset + value * factor` for rows matching `condition` (all rows if `None`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrectionRule {
    pub column: String,
    #[serde(default = "unit_factor")]
    pub factor: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub condition: Option<Condition>,
}

fn unit_factor() -> f64 {
    1.0
}

impl CorrectionRule {
    pub fn scale(column: &str, factor: f64) -> Self {
        Self {
            column: column.to_string(),
            factor,
            offset: 0.0,
            condition: None,
        }
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    pub fn when(mut self, column: &str, comparison: Comparison, value: f64) -> Self {
        self.condition = Some(Condition {
            column: column.to_string(),
            comparison,
            value,
        });
        self
    }
}

/// Raw-to-physical conversions published for the Snuffelfiets measurement dataset.
/// Firmware before v2 already reports particulate matter in µg/m³.
pub fn default_corrections() -> Vec<CorrectionRule> {
    vec![
        CorrectionRule::scale(TEMPERATURE, 0.1),
        CorrectionRule::scale(PRESSURE, 100.0),
        CorrectionRule::scale(VOLTAGE, 0.1).with_offset(3.0),
        CorrectionRule::scale(PM1_0, 0.01).when(VERSION_MAJOR, Comparison::Ge, 2.0),
        CorrectionRule::scale(PM2_5, 0.01).when(VERSION_MAJOR, Comparison::Ge, 2.0),
        CorrectionRule::scale(PM10, 0.01).when(VERSION_MAJOR, Comparison::Ge, 2.0),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct SegmentationConfig {
    pub trip_gap_seconds: f64,
    pub distance_model: DistanceModel,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            trip_gap_seconds: DEFAULT_TRIP_GAP_SECONDS,
            distance_model: DistanceModel::Haversine,
        }
    }
}

/// Plausibility bounds for a trip. Durations in minutes, distances in km, speeds in km/h.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TripFilterConfig {
    pub min_measurements: usize,
    pub max_duration: f64,
    pub max_distance: f64,
    pub min_average_speed: f64,
    pub max_average_speed: f64,
}

impl Default for TripFilterConfig {
    fn default() -> Self {
        Self {
            min_measurements: 2,
            max_duration: 360.0,
            max_distance: 200.0,
            min_average_speed: 1.0,
            max_average_speed: 35.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PipelineConfig {
    pub corrections: Vec<CorrectionRule>,
    /// Exact error codes to drop; empty keeps only `error_code == 0`.
    pub error_codes: Vec<i64>,
    pub segmentation: SegmentationConfig,
    pub trip_filters: TripFilterConfig,
    pub reference_point: Option<ReferencePoint>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            corrections: default_corrections(),
            error_codes: Vec::new(),
            segmentation: SegmentationConfig::default(),
            trip_filters: TripFilterConfig::default(),
            reference_point: None,
        }
    }
}

impl PipelineConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: PipelineConfig =
            toml::from_str(raw).map_err(|err| PipelineError::Configuration(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for rule in &self.corrections {
            validate_rule(rule)?;
        }

        if let Some(code) = self.error_codes.iter().find(|code| **code < 0) {
            return Err(PipelineError::Configuration(format!(
                "error code {code} is negative"
            )));
        }

        let gap = self.segmentation.trip_gap_seconds;
        if !gap.is_finite() || gap <= 0.0 {
            return Err(PipelineError::Configuration(format!(
                "trip_gap_seconds must be positive, got {gap}"
            )));
        }

        let filters = &self.trip_filters;
        for (name, value) in [
            ("max_duration", filters.max_duration),
            ("max_distance", filters.max_distance),
            ("min_average_speed", filters.min_average_speed),
            ("max_average_speed", filters.max_average_speed),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PipelineError::Configuration(format!(
                    "trip filter {name} must be a non-negative number, got {value}"
                )));
            }
        }
        if filters.min_average_speed >= filters.max_average_speed {
            return Err(PipelineError::Configuration(format!(
                "min_average_speed ({}) must be below max_average_speed ({})",
                filters.min_average_speed, filters.max_average_speed
            )));
        }

        if let Some(point) = &self.reference_point {
            point.validate()?;
        }

        Ok(())
    }
}

fn validate_rule(rule: &CorrectionRule) -> Result<()> {
    if rule.column.trim().is_empty() {
        return Err(PipelineError::Configuration(
            "correction rule without a column".to_string(),
        ));
    }
    if !rule.factor.is_finite() || !rule.offset.is_finite() {
        return Err(PipelineError::Configuration(format!(
            "correction for '{}' has a non-finite factor or offset",
            rule.column
        )));
    }
    if let Some(condition) = &rule.condition {
        if condition.column.trim().is_empty() || !condition.value.is_finite() {
            return Err(PipelineError::Configuration(format!(
                "correction for '{}' has an invalid condition",
                rule.column
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comparison_boundaries() {
        assert!(Comparison::Ge.evaluate(2.0, 2.0));
        assert!(!Comparison::Gt.evaluate(2.0, 2.0));
        assert!(Comparison::Le.evaluate(2.0, 2.0));
        assert!(!Comparison::Lt.evaluate(2.0, 2.0));
        assert!(Comparison::Eq.evaluate(2.0, 2.0));
    }

    #[test]
    fn rejects_inverted_speed_bounds() {
        let mut config = PipelineConfig::default();
        config.trip_filters.min_average_speed = 40.0;
        assert!(matches!(
            config.validate(),
            Err(PipelineError::Configuration(_))
        ));
    }
}
