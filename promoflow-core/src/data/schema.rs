//! Declared column taxonomy used by validation and transformation.

use crate::data::labels::LabelMapping;
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

/// Derived "entity age" feature: `reference_year - source_column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeFeature {
    pub source_column: String,
    pub output_column: String,
}

/// Column roles for one dataset, loaded once per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Expected number of columns in every split.
    pub total_columns: usize,
    pub target_column: String,
    /// `[negative, positive]` target values.
    pub labels: Vec<String>,
    #[serde(default)]
    pub numeric_columns: BTreeSet<String>,
    #[serde(default)]
    pub categorical_columns: BTreeSet<String>,
    #[serde(default)]
    pub nominal_columns: BTreeSet<String>,
    #[serde(default)]
    pub ordinal_columns: BTreeSet<String>,
    #[serde(default)]
    pub drop_columns: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_feature: Option<AgeFeature>,
}

impl SchemaConfig {
    /// Read and validate a schema file.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let schema: Self = crate::persistence::load_yaml(path)?;
        schema.validate()?;
        info!(
            path = %path.display(),
            total_columns = schema.total_columns,
            numeric = schema.numeric_columns.len(),
            categorical = schema.categorical_columns.len(),
            "Loaded schema"
        );
        Ok(schema)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.total_columns == 0 {
            return Err(PipelineError::schema("total_columns must be positive"));
        }
        if self.target_column.trim().is_empty() {
            return Err(PipelineError::schema("target_column must be set"));
        }
        if self.drop_columns.contains(&self.target_column) {
            return Err(PipelineError::schema(format!(
                "target column '{}' cannot be dropped",
                self.target_column
            )));
        }
        if let Some(name) = self
            .numeric_columns
            .intersection(&self.categorical_columns)
            .next()
        {
            return Err(PipelineError::schema(format!(
                "column '{name}' is declared both numeric and categorical"
            )));
        }
        if let Some(name) = self
            .nominal_columns
            .intersection(&self.ordinal_columns)
            .next()
        {
            return Err(PipelineError::schema(format!(
                "column '{name}' is declared both nominal and ordinal"
            )));
        }
        for name in self.nominal_columns.iter().chain(&self.ordinal_columns) {
            if !self.categorical_columns.contains(name) {
                return Err(PipelineError::schema(format!(
                    "encoded column '{name}' is not declared categorical"
                )));
            }
            if self.drop_columns.contains(name) {
                return Err(PipelineError::schema(format!(
                    "encoded column '{name}' is also listed in drop_columns"
                )));
            }
        }
        if let Some(age) = &self.age_feature {
            if !self.numeric_columns.contains(&age.source_column) {
                return Err(PipelineError::schema(format!(
                    "age source column '{}' must be numeric",
                    age.source_column
                )));
            }
            if self.numeric_columns.contains(&age.output_column)
                || self.categorical_columns.contains(&age.output_column)
            {
                return Err(PipelineError::schema(format!(
                    "derived column '{}' collides with a declared column",
                    age.output_column
                )));
            }
        }
        self.label_mapping()?;
        Ok(())
    }

    pub fn label_mapping(&self) -> Result<LabelMapping, PipelineError> {
        LabelMapping::from_declared(&self.labels)
    }

    /// Columns that must be present in every split.
    pub fn required_columns(&self) -> impl Iterator<Item = &String> {
        self.numeric_columns.iter().chain(&self.categorical_columns)
    }

    /// Numeric features compared by the drift check.
    pub fn drift_numeric_columns(&self) -> Vec<String> {
        self.numeric_columns
            .iter()
            .filter(|c| self.is_feature(c))
            .cloned()
            .collect()
    }

    /// Categorical features compared by the drift check.
    pub fn drift_categorical_columns(&self) -> Vec<String> {
        self.categorical_columns
            .iter()
            .filter(|c| self.is_feature(c))
            .cloned()
            .collect()
    }

    /// Numeric columns fed to the preprocessor, including the derived age.
    pub fn model_numeric_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self
            .numeric_columns
            .iter()
            .filter(|c| self.is_feature(c))
            .cloned()
            .collect();
        if let Some(age) = &self.age_feature {
            if !self.drop_columns.contains(&age.output_column) {
                columns.push(age.output_column.clone());
            }
        }
        columns
    }

    fn is_feature(&self, column: &str) -> bool {
        column != self.target_column && !self.drop_columns.contains(column)
    }
}
