//! Column-wise composite preprocessor: plan, fit once, transform many.

use crate::data::frame::DataFrame;
use crate::data::schema::SchemaConfig;
use crate::error::PipelineError;
use crate::features::encoders::{OneHotEncoder, OrdinalEncoder, PowerScaler};
use crate::features::matrix::Matrix;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which encoder each feature column gets. Carries no fitted state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub one_hot_columns: Vec<String>,
    pub ordinal_columns: Vec<String>,
    pub numeric_columns: Vec<String>,
}

/// Derive the encoder plan from the schema.
///
/// Nominal columns are one-hot encoded, ordinal columns rank-encoded, and
/// numeric columns (including the derived age) power-transformed and
/// standardized. Categorical columns declared neither nominal nor ordinal
/// are one-hot encoded. Drop columns and the target are excluded.
pub fn build_preprocessor(schema: &SchemaConfig) -> Preprocessor {
    let is_feature =
        |c: &String| *c != schema.target_column && !schema.drop_columns.contains(c);

    let ordinal_columns: Vec<String> = schema
        .ordinal_columns
        .iter()
        .filter(|c| is_feature(c))
        .cloned()
        .collect();
    let one_hot_columns: Vec<String> = schema
        .categorical_columns
        .iter()
        .filter(|c| is_feature(c) && !schema.ordinal_columns.contains(*c))
        .cloned()
        .collect();

    Preprocessor {
        one_hot_columns,
        ordinal_columns,
        numeric_columns: schema.model_numeric_columns(),
    }
}

impl Preprocessor {
    /// Fit every encoder on the given (training) features.
    pub fn fit(&self, features: &DataFrame) -> Result<FittedPreprocessor, PipelineError> {
        if features.is_empty() {
            return Err(PipelineError::transform("cannot fit on an empty frame"));
        }
        let one_hot = self
            .one_hot_columns
            .iter()
            .map(|c| Ok(OneHotEncoder::fit(c, &feature_column(features, c)?)))
            .collect::<Result<Vec<_>, PipelineError>>()?;
        let ordinal = self
            .ordinal_columns
            .iter()
            .map(|c| Ok(OrdinalEncoder::fit(c, &feature_column(features, c)?)))
            .collect::<Result<Vec<_>, PipelineError>>()?;
        let numeric = self
            .numeric_columns
            .iter()
            .map(|c| PowerScaler::fit(c, &feature_column(features, c)?))
            .collect::<Result<Vec<_>, PipelineError>>()?;

        for scaler in &numeric {
            debug!(
                column = %scaler.column,
                lambda = scaler.lambda,
                median = scaler.median,
                "Fitted power transform"
            );
        }
        let fitted = FittedPreprocessor {
            one_hot,
            ordinal,
            numeric,
        };
        if fitted.n_features() == 0 {
            return Err(PipelineError::transform("preprocessor produces no features"));
        }
        Ok(fitted)
    }
}

fn feature_column<'a>(
    frame: &'a DataFrame,
    column: &str,
) -> Result<Vec<&'a serde_json::Value>, PipelineError> {
    frame
        .column(column)
        .map_err(|_| PipelineError::transform(format!("configured column '{column}' not found")))
}

/// Preprocessor with every encoder fitted. Output columns are ordered
/// one-hot blocks, then ordinal ranks, then scaled numerics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    pub one_hot: Vec<OneHotEncoder>,
    pub ordinal: Vec<OrdinalEncoder>,
    pub numeric: Vec<PowerScaler>,
}

impl FittedPreprocessor {
    pub fn n_features(&self) -> usize {
        self.one_hot.iter().map(OneHotEncoder::width).sum::<usize>()
            + self.ordinal.len()
            + self.numeric.len()
    }

    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.one_hot.iter().flat_map(|e| e.feature_names()).collect();
        names.extend(self.ordinal.iter().map(|e| e.column.clone()));
        names.extend(self.numeric.iter().map(|e| e.column.clone()));
        names
    }

    pub fn transform(&self, features: &DataFrame) -> Result<Matrix, PipelineError> {
        let one_hot_idx = self.indices(features, self.one_hot.iter().map(|e| &e.column))?;
        let ordinal_idx = self.indices(features, self.ordinal.iter().map(|e| &e.column))?;
        let numeric_idx = self.indices(features, self.numeric.iter().map(|e| &e.column))?;

        let mut matrix = Matrix::with_cols(self.n_features());
        let mut row_buf = Vec::with_capacity(self.n_features());
        for row in &features.rows {
            row_buf.clear();
            for (enc, &idx) in self.one_hot.iter().zip(&one_hot_idx) {
                enc.encode_into(&row[idx], &mut row_buf);
            }
            for (enc, &idx) in self.ordinal.iter().zip(&ordinal_idx) {
                row_buf.push(enc.encode(&row[idx]));
            }
            for (enc, &idx) in self.numeric.iter().zip(&numeric_idx) {
                row_buf.push(enc.transform(&row[idx])?);
            }
            matrix.push_row(&row_buf)?;
        }
        Ok(matrix)
    }

    fn indices<'a>(
        &self,
        frame: &DataFrame,
        columns: impl Iterator<Item = &'a String>,
    ) -> Result<Vec<usize>, PipelineError> {
        columns
            .map(|c| {
                frame.column_index(c).ok_or_else(|| {
                    PipelineError::transform(format!("configured column '{c}' not found"))
                })
            })
            .collect()
    }
}
