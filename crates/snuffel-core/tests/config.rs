use snuffel_core::config::{default_corrections, Comparison, PipelineConfig};
use snuffel_core::error::PipelineError;
use snuffel_core::geo_distance::DistanceModel;

#[test]
fn empty_document_yields_defaults() {
    let config = PipelineConfig::from_toml_str("").unwrap();
    assert_eq!(config, PipelineConfig::default());
    assert_eq!(config.corrections, default_corrections());
    assert_eq!(config.segmentation.trip_gap_seconds, 1800.0);
    assert_eq!(config.trip_filters.min_measurements, 2);
    assert_eq!(config.trip_filters.max_average_speed, 35.0);
}

#[test]
fn partial_tables_keep_remaining_defaults() {
    let raw = r#"
error_codes = [4, 4096]

[segmentation]
trip_gap_seconds = 900.0
distance_model = "geodesic"

[trip_filters]
max_distance = 120.0

[reference_point]
lat = 52.0811
lon = 5.0347

[[corrections]]
column = "pm2_5"
factor = 0.01

[corrections.condition]
column = "version_major"
comparison = "GE"
value = 2.0
"#;
    let config = PipelineConfig::from_toml_str(raw).unwrap();

    assert_eq!(config.error_codes, vec![4, 4096]);
    assert_eq!(config.segmentation.trip_gap_seconds, 900.0);
    assert_eq!(config.segmentation.distance_model, DistanceModel::Geodesic);
    assert_eq!(config.trip_filters.max_distance, 120.0);
    assert_eq!(config.trip_filters.max_duration, 360.0);
    assert_eq!(config.reference_point.map(|p| p.lat), Some(52.0811));

    assert_eq!(config.corrections.len(), 1);
    let rule = &config.corrections[0];
    assert_eq!(rule.offset, 0.0);
    let condition = rule.condition.as_ref().unwrap();
    assert_eq!(condition.comparison, Comparison::Ge);
}

#[test]
fn unknown_keys_are_rejected() {
    let result = PipelineConfig::from_toml_str("[trip_filters]\nmax_speed = 30.0\n");
    assert!(matches!(result, Err(PipelineError::Configuration(_))));
}

#[test]
fn invalid_values_fail_validation() {
    for raw in [
        "error_codes = [-1]",
        "[segmentation]\ntrip_gap_seconds = 0.0",
        "[trip_filters]\nmax_duration = -5.0",
        "[reference_point]\nlat = 120.0\nlon = 5.0",
    ] {
        let result = PipelineConfig::from_toml_str(raw);
        assert!(
            matches!(result, Err(PipelineError::Configuration(_))),
            "accepted {raw}"
        );
    }
}
