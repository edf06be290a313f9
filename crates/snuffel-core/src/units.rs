use polars::prelude::*;
use tracing::{debug, info};

use crate::config::CorrectionRule;
use crate::error::{PipelineError, Result};
use crate::schema::{f64_values, has_column, require_columns, UNITS_CORRECTED};

/// Converts raw sensor units to physical units.
///
/// The input frame is borrowed and left untouched. The output carries a boolean
/// `units_corrected` marker and frames that already carry it are rejected.
pub fn correct_units(df: &DataFrame, rules: &[CorrectionRule]) -> Result<DataFrame> {
    if has_column(df, UNITS_CORRECTED) {
        return Err(PipelineError::AlreadyCorrected(UNITS_CORRECTED.to_string()));
    }

    for rule in rules {
        require_columns(df, &[rule.column.as_str()])?;
        if let Some(condition) = &rule.condition {
            require_columns(df, &[condition.column.as_str()])?;
        }
    }

    let mut output = df.clone();
    for rule in rules {
        let (corrected, touched) = apply_rule(df, &output, rule)?;
        debug!(column = rule.column.as_str(), rows = touched, "Applied unit correction");
        output.with_column(corrected)?;
    }

    output.with_column(Series::new(
        UNITS_CORRECTED.into(),
        vec![true; output.height()],
    ))?;

    info!(
        rows = output.height(),
        rules = rules.len(),
        "Corrected measurement units"
    );
    Ok(output)
}

/// Conditions are evaluated on the uncorrected `input`, values are taken from `current`.
fn apply_rule(
    input: &DataFrame,
    current: &DataFrame,
    rule: &CorrectionRule,
) -> Result<(Series, usize)> {
    let values = f64_values(current, &rule.column)?;
    let mask = condition_mask(input, rule)?;

    let mut touched = 0;
    let corrected: Vec<Option<f64>> = values
        .into_iter()
        .zip(mask)
        .map(|(value, selected)| match value {
            Some(raw) if selected => {
                touched += 1;
                Some(rule.offset + raw * rule.factor)
            }
            other => other,
        })
        .collect();

    Ok((Series::new(rule.column.as_str().into(), corrected), touched))
}

fn condition_mask(df: &DataFrame, rule: &CorrectionRule) -> Result<Vec<bool>> {
    let Some(condition) = &rule.condition else {
        return Ok(vec![true; df.height()]);
    };

    let values = f64_values(df, &condition.column)?;
    Ok(values
        .into_iter()
        .map(|value| value.is_some_and(|v| condition.comparison.evaluate(v, condition.value)))
        .collect())
}
