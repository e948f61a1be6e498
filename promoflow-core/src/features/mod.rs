//! Feature engineering, preprocessing and resampling.

pub mod encoders;
pub mod engineer;
pub mod matrix;
pub mod preprocessor;
pub mod resample;

pub use engineer::FeatureEngineer;
pub use matrix::{LabeledData, Matrix};
pub use preprocessor::{FittedPreprocessor, Preprocessor, build_preprocessor};
pub use resample::SmoteEnn;

use crate::artifact::{IngestionArtifact, TransformationArtifact, ValidationArtifact};
use crate::config::TransformSettings;
use crate::data::frame::DataFrame;
use crate::data::labels::LabelMapping;
use crate::data::schema::SchemaConfig;
use crate::error::PipelineError;
use crate::layout::RunLayout;
use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

/// Everything needed to turn raw rows into model inputs, persisted as the
/// transformation stage's preprocessor object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingObject {
    pub engineer: FeatureEngineer,
    pub labels: LabelMapping,
    pub preprocessor: FittedPreprocessor,
}

impl PreprocessingObject {
    pub fn load(path: &std::path::Path) -> Result<Self, PipelineError> {
        crate::persistence::load_required_json(path)
    }
}

/// Output of [`transform`]: fitted state plus both labeled matrices.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub object: PreprocessingObject,
    pub train: LabeledData,
    pub test: LabeledData,
}

/// Engineer both splits, fit the preprocessor on the training features
/// only, transform both splits and resample the training matrix.
pub fn transform(
    train: DataFrame,
    test: DataFrame,
    schema: &SchemaConfig,
    settings: &TransformSettings,
    reference_year: i32,
) -> Result<TransformOutput, PipelineError> {
    let engineer = FeatureEngineer::from_schema(schema, reference_year);
    let labels = schema.label_mapping()?;
    let plan = build_preprocessor(schema);

    let (train_features, train_target) = engineer.split_target(train)?;
    let (test_features, test_target) = engineer.split_target(test)?;
    let train_features = engineer.engineer(train_features)?;
    let test_features = engineer.engineer(test_features)?;
    let train_labels = labels.encode_all(&train_target)?;
    let test_labels = labels.encode_all(&test_target)?;

    let preprocessor = plan.fit(&train_features)?;
    let train_matrix = preprocessor.transform(&train_features)?;
    let test_matrix = preprocessor.transform(&test_features)?;
    if train_matrix.is_empty() || test_matrix.is_empty() {
        return Err(PipelineError::transform("transformed matrix is empty"));
    }

    let train = LabeledData::new(train_matrix, train_labels)?;
    let test = LabeledData::new(test_matrix, test_labels)?;
    let resampler = SmoteEnn {
        smote_neighbors: settings.smote_neighbors,
        enn_neighbors: settings.enn_neighbors,
        seed: settings.seed,
    };
    let train = resampler.resample(&train)?;

    Ok(TransformOutput {
        object: PreprocessingObject {
            engineer,
            labels,
            preprocessor,
        },
        train,
        test,
    })
}

/// Transformation stage.
pub struct DataTransformation {
    schema: Arc<SchemaConfig>,
    settings: TransformSettings,
    cancel: CancellationToken,
}

impl DataTransformation {
    pub fn new(schema: Arc<SchemaConfig>, settings: TransformSettings) -> Self {
        Self {
            schema,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// Outputs are not written once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn reference_year(&self) -> i32 {
        self.settings
            .reference_year
            .unwrap_or_else(|| chrono::Utc::now().year())
    }

    #[instrument(skip_all)]
    pub fn run(
        &self,
        ingestion: &IngestionArtifact,
        validation: &ValidationArtifact,
        layout: &RunLayout,
    ) -> Result<TransformationArtifact, PipelineError> {
        if !validation.passed {
            return Err(PipelineError::transform(format!(
                "refusing to transform data that failed validation: {}",
                validation.message
            )));
        }

        let train = DataFrame::read_jsonl(&ingestion.training_path)?;
        let test = DataFrame::read_jsonl(&ingestion.testing_path)?;
        let reference_year = self.reference_year();
        let output = transform(train, test, &self.schema, &self.settings, reference_year)?;
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled(
                "transformation abandoned before writing outputs".into(),
            ));
        }

        let preprocessor_path = layout.preprocessor_file();
        let transformed_train_path = layout.transformed_train_file();
        let transformed_test_path = layout.transformed_test_file();
        crate::persistence::atomic_write_json(&preprocessor_path, &output.object)?;
        output.train.to_matrix().save(&transformed_train_path)?;
        output.test.to_matrix().save(&transformed_test_path)?;

        let feature_count = output.object.preprocessor.n_features();
        info!(
            reference_year,
            feature_count,
            train_rows = output.train.len(),
            test_rows = output.test.len(),
            "Transformed train and test splits"
        );

        Ok(TransformationArtifact {
            preprocessor_path,
            transformed_train_path,
            transformed_test_path,
            train_rows: output.train.len(),
            test_rows: output.test.len(),
            feature_count,
        })
    }
}
