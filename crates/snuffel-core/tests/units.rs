use anyhow::Result;
use polars::prelude::*;

use snuffel_core::config::{default_corrections, Comparison, CorrectionRule};
use snuffel_core::error::PipelineError;
use snuffel_core::units::correct_units;

fn raw_frame() -> DataFrame {
    df!(
        "version_major" => &[1i64, 2, 3],
        "pm1_0" => &[5.0f64, 500.0, 1200.0],
        "pm2_5" => &[8.0f64, 800.0, 1500.0],
        "pm10" => &[12.0f64, 1200.0, 2000.0],
        "temperature" => &[215.0f64, 180.0, -20.0],
        "pressure" => &[1013.0f64, 1000.0, 990.0],
        "voltage" => &[10.0f64, 8.0, 12.0],
    )
    .unwrap()
}

fn values(df: &DataFrame, name: &str) -> Vec<f64> {
    df.column(name)
        .unwrap()
        .f64()
        .unwrap()
        .into_no_null_iter()
        .collect()
}

fn assert_close(actual: &[f64], expected: &[f64]) {
    assert_eq!(actual.len(), expected.len());
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-9, "{actual:?} != {expected:?}");
    }
}

#[test]
fn default_rules_convert_to_physical_units() -> Result<()> {
    let corrected = correct_units(&raw_frame(), &default_corrections())?;

    assert_close(&values(&corrected, "temperature"), &[21.5, 18.0, -2.0]);
    assert_close(&values(&corrected, "pressure"), &[101_300.0, 100_000.0, 99_000.0]);
    assert_close(&values(&corrected, "voltage"), &[4.0, 3.8, 4.2]);
    Ok(())
}

#[test]
fn particulate_matter_scales_only_for_firmware_two_and_up() -> Result<()> {
    let corrected = correct_units(&raw_frame(), &default_corrections())?;

    assert_close(&values(&corrected, "pm1_0"), &[5.0, 5.0, 12.0]);
    assert_close(&values(&corrected, "pm2_5"), &[8.0, 8.0, 15.0]);
    assert_close(&values(&corrected, "pm10"), &[12.0, 12.0, 20.0]);
    Ok(())
}

#[test]
fn input_frame_is_left_untouched() -> Result<()> {
    let raw = raw_frame();
    let _ = correct_units(&raw, &default_corrections())?;

    assert_close(&values(&raw, "temperature"), &[215.0, 180.0, -20.0]);
    assert!(raw.column("units_corrected").is_err());
    Ok(())
}

#[test]
fn second_correction_is_rejected() -> Result<()> {
    let once = correct_units(&raw_frame(), &default_corrections())?;
    let marker: Vec<bool> = once
        .column("units_corrected")?
        .bool()?
        .into_no_null_iter()
        .collect();
    assert_eq!(marker, vec![true, true, true]);

    let twice = correct_units(&once, &default_corrections());
    assert!(matches!(twice, Err(PipelineError::AlreadyCorrected(_))));
    Ok(())
}

#[test]
fn missing_rule_column_fails_before_any_change() {
    let df = raw_frame().drop("voltage").unwrap();
    let result = correct_units(&df, &default_corrections());
    assert!(matches!(result, Err(PipelineError::MissingColumn(column)) if column == "voltage"));
}

#[test]
fn custom_rules_support_conditions_and_nulls() -> Result<()> {
    let df = df!(
        "humidity" => &[Some(40.0f64), None, Some(60.0)],
        "version_major" => &[1i64, 1, 2],
    )?;
    let rules =
        vec![CorrectionRule::scale("humidity", 0.5).when("version_major", Comparison::Lt, 2.0)];

    let corrected = correct_units(&df, &rules)?;
    let humidity: Vec<Option<f64>> = corrected.column("humidity")?.f64()?.into_iter().collect();
    assert_eq!(humidity, vec![Some(20.0), None, Some(60.0)]);
    Ok(())
}

#[test]
fn conditions_see_uncorrected_values() -> Result<()> {
    let df = df!(
        "version_major" => &[1.5f64, 3.0],
        "pm2_5" => &[800.0f64, 800.0],
    )?;
    // The first rule lifts version 1.5 to 2.0; the pm rule must still see 1.5.
    let rules = vec![
        CorrectionRule::scale("version_major", 1.0).with_offset(0.5),
        CorrectionRule::scale("pm2_5", 0.01).when("version_major", Comparison::Ge, 2.0),
    ];

    let corrected = correct_units(&df, &rules)?;
    assert_close(&values(&corrected, "version_major"), &[2.0, 3.5]);
    assert_close(&values(&corrected, "pm2_5"), &[800.0, 8.0]);
    Ok(())
}
