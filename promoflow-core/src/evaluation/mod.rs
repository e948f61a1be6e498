//! Champion/challenger comparison against the production model.

use crate::artifact::{EvaluationArtifact, IngestionArtifact, TrainerArtifact};
use crate::data::frame::DataFrame;
use crate::error::PipelineError;
use crate::registry::ObjectStore;
use crate::retry::{RetryPolicy, with_retry};
use crate::training::metrics::f1_score;
use crate::training::model::TrainedModel;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Outcome of comparing two F1 scores.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub accepted: bool,
    pub score_delta: f64,
}

/// A missing production model counts as 0. Ties are rejected.
pub fn decide(candidate_f1: f64, production_f1: Option<f64>) -> Verdict {
    let baseline = production_f1.unwrap_or(0.0);
    Verdict {
        accepted: candidate_f1 > baseline.max(0.0),
        score_delta: candidate_f1 - baseline,
    }
}

/// Scores the production model on the held-out split and compares it with
/// the candidate. Never writes to the registry.
pub struct PromotionDecision {
    store: Arc<dyn ObjectStore>,
    key: String,
    retry: RetryPolicy,
}

impl PromotionDecision {
    pub fn new(store: Arc<dyn ObjectStore>, key: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            store,
            key: key.into(),
            retry,
        }
    }

    /// Fetch the production model, if the slot is occupied.
    async fn production_model(&self) -> Result<Option<TrainedModel>, PipelineError> {
        let exists = with_retry(&self.retry, "registry_exists", || self.store.exists(&self.key)).await?;
        if !exists {
            return Ok(None);
        }
        let bytes = match with_retry(&self.retry, "registry_load", || self.store.load(&self.key)).await {
            Ok(bytes) => bytes,
            Err(PipelineError::NotFound(_)) => {
                warn!(key = %self.key, "Production model vanished between exists and load");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        TrainedModel::from_bytes(&bytes).map(Some).map_err(|e| {
            PipelineError::model(format!("production model at {}: {e}", self.key))
        })
    }

    #[instrument(skip_all, fields(bucket = %self.store.bucket(), key = %self.key))]
    pub async fn evaluate(
        &self,
        trainer: &TrainerArtifact,
        ingestion: &IngestionArtifact,
    ) -> Result<EvaluationArtifact, PipelineError> {
        let candidate_f1 = trainer.metrics.f1_score;
        let production_f1 = match self.production_model().await? {
            None => {
                info!("No production model, comparing against baseline 0");
                None
            }
            Some(production) => {
                let candidate = TrainedModel::load(&trainer.model_path)?;
                let test = DataFrame::read_jsonl(&ingestion.testing_path)?;
                let score = tokio::task::spawn_blocking(move || {
                    score_production(&production, &candidate, &test)
                })
                .await
                .map_err(|e| PipelineError::model(format!("scoring task failed: {e}")))??;
                Some(score)
            }
        };

        let verdict = decide(candidate_f1, production_f1);
        info!(
            candidate_f1,
            production_f1 = ?production_f1,
            score_delta = verdict.score_delta,
            accepted = verdict.accepted,
            "Promotion decision"
        );
        Ok(EvaluationArtifact {
            accepted: verdict.accepted,
            production_model_ref: format!("{}/{}", self.store.bucket(), self.key),
            candidate_model_path: trainer.model_path.clone(),
            candidate_f1,
            production_f1,
            score_delta: verdict.score_delta,
        })
    }
}

/// F1 of the production model on raw test rows, with ground truth and
/// predictions both expressed in the candidate's label mapping.
pub fn score_production(
    production: &TrainedModel,
    candidate: &TrainedModel,
    test: &DataFrame,
) -> Result<f64, PipelineError> {
    let target = &candidate.engineer.target_column;
    let y_true = candidate.labels.encode_all(test.column(target)?)?;
    let y_pred = production
        .predict(test)?
        .iter()
        .map(|label| {
            candidate.labels.encode_str(label).ok_or_else(|| {
                PipelineError::model(format!(
                    "production model predicts '{label}', unknown to the current label mapping"
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(f1_score(&y_true, &y_pred))
}
