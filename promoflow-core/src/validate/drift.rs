//! Per-feature drift between the reference (train) and current (test) splits.

use crate::config::DriftSettings;
use crate::data::frame::{DataFrame, category_key, numeric_value};
use crate::error::PipelineError;
use crate::validate::stats::{TestOutcome, chi_square_homogeneity, ks_two_sample};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Numeric,
    Categorical,
}

/// Statistical test used for one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriftTest {
    KolmogorovSmirnov,
    ChiSquare,
}

/// Diagnostics for a single feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDrift {
    pub column: String,
    pub kind: FeatureKind,
    pub test: DriftTest,
    pub statistic: f64,
    pub p_value: f64,
    pub drifted: bool,
    pub reference_missing: usize,
    pub current_missing: usize,
}

/// Dataset-level drift report, persisted as YAML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub generated_at: DateTime<Utc>,
    pub reference_rows: usize,
    pub current_rows: usize,
    pub p_value_threshold: f64,
    pub drift_share_threshold: f64,
    pub number_of_features: usize,
    pub number_of_drifted_features: usize,
    pub share_of_drifted_features: f64,
    pub dataset_drift: bool,
    pub features: Vec<FeatureDrift>,
}

/// Compare every numeric and categorical feature of `current` against
/// `reference`.
pub fn detect_drift(
    reference: &DataFrame,
    current: &DataFrame,
    numeric_columns: &[String],
    categorical_columns: &[String],
    settings: &DriftSettings,
) -> Result<DriftReport, PipelineError> {
    let mut features = Vec::with_capacity(numeric_columns.len() + categorical_columns.len());

    for column in numeric_columns {
        let (ref_values, ref_missing) = numeric_sample(reference, column)?;
        let (cur_values, cur_missing) = numeric_sample(current, column)?;
        let outcome = ks_two_sample(&ref_values, &cur_values);
        features.push(feature_drift(
            column,
            FeatureKind::Numeric,
            DriftTest::KolmogorovSmirnov,
            outcome,
            settings,
            ref_missing,
            cur_missing,
        ));
    }

    for column in categorical_columns {
        let (ref_counts, ref_missing) = category_counts(reference, column)?;
        let (cur_counts, cur_missing) = category_counts(current, column)?;
        let outcome = chi_square_homogeneity(&ref_counts, &cur_counts);
        features.push(feature_drift(
            column,
            FeatureKind::Categorical,
            DriftTest::ChiSquare,
            outcome,
            settings,
            ref_missing,
            cur_missing,
        ));
    }

    let number_of_features = features.len();
    let number_of_drifted_features = features.iter().filter(|f| f.drifted).count();
    let share_of_drifted_features = if number_of_features == 0 {
        0.0
    } else {
        number_of_drifted_features as f64 / number_of_features as f64
    };
    let dataset_drift =
        number_of_features > 0 && share_of_drifted_features >= settings.drift_share_threshold;

    Ok(DriftReport {
        generated_at: Utc::now(),
        reference_rows: reference.row_count(),
        current_rows: current.row_count(),
        p_value_threshold: settings.p_value_threshold,
        drift_share_threshold: settings.drift_share_threshold,
        number_of_features,
        number_of_drifted_features,
        share_of_drifted_features,
        dataset_drift,
        features,
    })
}

fn feature_drift(
    column: &str,
    kind: FeatureKind,
    test: DriftTest,
    outcome: TestOutcome,
    settings: &DriftSettings,
    reference_missing: usize,
    current_missing: usize,
) -> FeatureDrift {
    let drifted = outcome.p_value < settings.p_value_threshold;
    debug!(
        column,
        statistic = outcome.statistic,
        p_value = outcome.p_value,
        drifted,
        "Feature drift"
    );
    FeatureDrift {
        column: column.to_string(),
        kind,
        test,
        statistic: outcome.statistic,
        p_value: outcome.p_value,
        drifted,
        reference_missing,
        current_missing,
    }
}

/// Non-null values of a numeric column and the number of nulls.
fn numeric_sample(frame: &DataFrame, column: &str) -> Result<(Vec<f64>, usize), PipelineError> {
    let mut values = Vec::with_capacity(frame.row_count());
    let mut missing = 0;
    for cell in frame.column(column)? {
        match numeric_value(cell) {
            Ok(Some(v)) if v.is_finite() => values.push(v),
            Ok(_) => missing += 1,
            Err(e) => {
                return Err(PipelineError::dataset(format!("column '{column}': {e}")));
            }
        }
    }
    Ok((values, missing))
}

fn category_counts(
    frame: &DataFrame,
    column: &str,
) -> Result<(BTreeMap<String, usize>, usize), PipelineError> {
    let mut counts = BTreeMap::new();
    let mut missing = 0;
    for cell in frame.column(column)? {
        if cell.is_null() {
            missing += 1;
        }
        *counts.entry(category_key(cell)).or_insert(0) += 1;
    }
    Ok((counts, missing))
}
