//! Promotion of an accepted candidate into the registry slot.

use crate::artifact::{EvaluationArtifact, PusherArtifact, TrainerArtifact};
use crate::config::PromotionMode;
use crate::error::PipelineError;
use crate::registry::{ObjectStore, validate_key};
use crate::retry::{RetryPolicy, with_retry};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, instrument};

pub struct ModelPusher {
    store: Arc<dyn ObjectStore>,
    key: String,
    mode: PromotionMode,
    retry: RetryPolicy,
}

impl ModelPusher {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        key: impl Into<String>,
        mode: PromotionMode,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            mode,
            retry,
        }
    }

    /// Key of the immutable copy written in versioned mode.
    pub fn version_key(&self, pushed_at: DateTime<Utc>, sha256: &str) -> String {
        let short: String = sha256.chars().take(8).collect();
        format!(
            "{}-versions/{}-{short}",
            self.key,
            pushed_at.format("%Y%m%dT%H%M%SZ")
        )
    }

    /// Upload the candidate. Refuses anything the evaluation did not accept
    /// and any model file whose digest differs from the trained one.
    #[instrument(skip_all, fields(bucket = %self.store.bucket(), key = %self.key))]
    pub async fn run(
        &self,
        evaluation: &EvaluationArtifact,
        trainer: &TrainerArtifact,
    ) -> Result<PusherArtifact, PipelineError> {
        if !evaluation.accepted {
            return Err(PipelineError::model(format!(
                "refusing to push rejected candidate (score delta {:.4})",
                evaluation.score_delta
            )));
        }
        validate_key(&self.key)?;

        let model_path = &evaluation.candidate_model_path;
        let bytes = tokio::fs::read(model_path).await?;
        let sha256 = crate::persistence::sha256_hex(&bytes);
        if sha256 != trainer.model_sha256 {
            return Err(PipelineError::model(format!(
                "model file {} changed after training (sha256 {sha256}, expected {})",
                model_path.display(),
                trainer.model_sha256
            )));
        }

        let pushed_at = Utc::now();
        let version_key = match self.mode {
            PromotionMode::Overwrite => None,
            PromotionMode::Versioned => {
                let key = self.version_key(pushed_at, &sha256);
                with_retry(&self.retry, "registry_save_version", || {
                    self.store.save(&key, model_path)
                })
                .await?;
                info!(version_key = %key, "Wrote immutable model version");
                Some(key)
            }
        };

        with_retry(&self.retry, "registry_save", || {
            self.store.save(&self.key, model_path)
        })
        .await?;
        info!(sha256 = %sha256, "Promoted model to production slot");

        Ok(PusherArtifact {
            registry_bucket: self.store.bucket().to_string(),
            registry_key: self.key.clone(),
            version_key,
            model_sha256: sha256,
            pushed_at,
        })
    }
}
