//! Deterministic, stateless feature engineering applied to every split.

use crate::data::frame::{DataFrame, numeric_value};
use crate::data::schema::{AgeFeature, SchemaConfig};
use crate::data::source::{INTERNAL_ID_FIELD, NA_SENTINEL};
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Target separation, derived age and column dropping.
///
/// The reference year is fixed when the engineer is built and stored with
/// the model, so a model evaluated next year derives the same ages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureEngineer {
    pub target_column: String,
    pub reference_year: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_feature: Option<AgeFeature>,
    pub drop_columns: Vec<String>,
}

impl FeatureEngineer {
    pub fn from_schema(schema: &SchemaConfig, reference_year: i32) -> Self {
        Self {
            target_column: schema.target_column.clone(),
            reference_year,
            age_feature: schema.age_feature.clone(),
            drop_columns: schema.drop_columns.iter().cloned().collect(),
        }
    }

    /// Remove the target column, returning features and raw target values.
    pub fn split_target(&self, mut frame: DataFrame) -> Result<(DataFrame, Vec<Value>), PipelineError> {
        let target = frame.take_column(&self.target_column).map_err(|_| {
            PipelineError::transform(format!(
                "target column '{}' not found",
                self.target_column
            ))
        })?;
        Ok((frame, target))
    }

    /// Feature rows for inference.
    ///
    /// Raw rows get the same cleanup as ingested records (`_id` removed,
    /// `"na"` read as null) and the target is dropped if present. Rows that
    /// already carry the derived age without its source column keep that
    /// age, and drop columns absent from the input are skipped.
    pub fn prepare_features(&self, mut frame: DataFrame) -> Result<DataFrame, PipelineError> {
        for column in [self.target_column.as_str(), INTERNAL_ID_FIELD] {
            if frame.has_column(column) {
                frame.take_column(column)?;
            }
        }
        for cell in frame.rows.iter_mut().flatten() {
            if matches!(cell, Value::String(s) if s == NA_SENTINEL) {
                *cell = Value::Null;
            }
        }
        self.apply(frame, true)
    }

    /// Add the derived age column and remove the drop columns. Every
    /// configured column must be present.
    pub fn engineer(&self, frame: DataFrame) -> Result<DataFrame, PipelineError> {
        self.apply(frame, false)
    }

    fn apply(&self, mut frame: DataFrame, inference: bool) -> Result<DataFrame, PipelineError> {
        if let Some(age) = &self.age_feature {
            let precomputed = inference
                && !frame.has_column(&age.source_column)
                && frame.has_column(&age.output_column);
            if !precomputed {
                let years = frame.column(&age.source_column).map_err(|_| {
                    PipelineError::transform(format!(
                        "age source column '{}' not found",
                        age.source_column
                    ))
                })?;
                let ages = years
                    .into_iter()
                    .map(|cell| self.age_of(&age.source_column, cell))
                    .collect::<Result<Vec<_>, _>>()?;
                frame.set_column(&age.output_column, ages)?;
            }
        }

        for column in &self.drop_columns {
            if inference && !frame.has_column(column) {
                continue;
            }
            frame.take_column(column).map_err(|_| {
                PipelineError::transform(format!("drop column '{column}' not found"))
            })?;
        }
        Ok(frame)
    }

    fn age_of(&self, source: &str, cell: &Value) -> Result<Value, PipelineError> {
        let year = numeric_value(cell)
            .map_err(|e| PipelineError::transform(format!("column '{source}': {e}")))?;
        Ok(match year {
            Some(year) => Value::from(f64::from(self.reference_year) - year),
            None => Value::Null,
        })
    }
}
