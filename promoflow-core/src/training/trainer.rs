//! Model trainer stage: search, floor check, composite model persistence.

use crate::artifact::{TrainerArtifact, TransformationArtifact};
use crate::error::PipelineError;
use crate::features::{LabeledData, Matrix, PreprocessingObject};
use crate::layout::RunLayout;
use crate::training::model::TrainedModel;
use crate::training::search::{ModelSearch, ModelSearchConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument};

pub struct ModelTrainer {
    search: ModelSearch,
}

impl ModelTrainer {
    pub fn new(config: ModelSearchConfig) -> Self {
        Self {
            search: ModelSearch::new(config),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.search = self.search.with_cancellation(cancel);
        self
    }

    /// Nothing is written unless a candidate clears the floor. The model and
    /// its leaderboard land together or not at all.
    #[instrument(skip_all)]
    pub async fn run(
        &self,
        transformation: &TransformationArtifact,
        layout: &RunLayout,
    ) -> Result<TrainerArtifact, PipelineError> {
        let train = LabeledData::from_matrix(&Matrix::load(&transformation.transformed_train_path)?)?;
        let test = LabeledData::from_matrix(&Matrix::load(&transformation.transformed_test_path)?)?;
        let object = PreprocessingObject::load(&transformation.preprocessor_path)?;
        if train.features.cols() != object.preprocessor.n_features()
            || test.features.cols() != object.preprocessor.n_features()
        {
            return Err(PipelineError::dataset(format!(
                "matrix width does not match the preprocessor's {} features",
                object.preprocessor.n_features()
            )));
        }

        let floor = self.search.config().expected_min_score;
        let outcome = self.search.search(Arc::new(train), &test, floor).await?;

        let model = TrainedModel::new(object, outcome.estimator, outcome.best.name.clone());
        let model_path = layout.trained_model_file();
        let leaderboard_path = layout.leaderboard_file();
        crate::persistence::atomic_write_json(&leaderboard_path, &outcome.leaderboard)?;
        let bytes = match model.save(&model_path) {
            Ok(bytes) => bytes,
            Err(e) => {
                let _ = std::fs::remove_file(&leaderboard_path);
                return Err(e);
            }
        };
        let model_sha256 = crate::persistence::sha256_hex(&bytes);

        info!(
            candidate = %outcome.best.name,
            cv_score = outcome.best.cv.mean_score,
            f1 = outcome.test_metrics.f1_score,
            accuracy = outcome.test_metrics.accuracy,
            sha256 = %model_sha256,
            "Trained model"
        );

        Ok(TrainerArtifact {
            model_path,
            metrics: outcome.test_metrics,
            best_score: outcome.best.cv.mean_score,
            best_candidate: outcome.best.name,
            model_sha256,
        })
    }
}
