//! Immutable records handed from one stage to the next.
//!
//! Each stage consumes the artifacts of its predecessors by shared reference
//! and produces exactly one new artifact. Nothing downstream mutates them.

use crate::training::metrics::ClassificationMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Output of ingestion: the exported snapshot and the train/test split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionArtifact {
    pub feature_store_path: PathBuf,
    pub training_path: PathBuf,
    pub testing_path: PathBuf,
    pub training_rows: usize,
    pub testing_rows: usize,
}

/// Output of the validation gate.
///
/// `message` is non-empty exactly when `passed` is false or drift was
/// detected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationArtifact {
    pub passed: bool,
    pub message: String,
    pub drift_detected: bool,
    pub drift_report_path: PathBuf,
}

/// Output of feature transformation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationArtifact {
    pub preprocessor_path: PathBuf,
    pub transformed_train_path: PathBuf,
    pub transformed_test_path: PathBuf,
    pub train_rows: usize,
    pub test_rows: usize,
    pub feature_count: usize,
}

/// Output of model search and training.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerArtifact {
    pub model_path: PathBuf,
    /// Held-out test metrics of the chosen estimator.
    pub metrics: ClassificationMetrics,
    /// Cross-validated score the floor was checked against.
    pub best_score: f64,
    pub best_candidate: String,
    pub model_sha256: String,
}

/// Output of the champion/challenger comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationArtifact {
    pub accepted: bool,
    /// Registry key of the production slot that was compared against.
    pub production_model_ref: String,
    pub candidate_model_path: PathBuf,
    pub candidate_f1: f64,
    /// `None` when no production model existed.
    pub production_f1: Option<f64>,
    pub score_delta: f64,
}

/// Output of a promotion. Only produced for accepted candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PusherArtifact {
    pub registry_bucket: String,
    pub registry_key: String,
    /// Immutable copy written in versioned promotion mode.
    pub version_key: Option<String>,
    pub model_sha256: String,
    pub pushed_at: DateTime<Utc>,
}

/// Every artifact a run produced so far, in stage order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArtifactLedger {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingestion: Option<IngestionArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<TransformationArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trainer: Option<TrainerArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<EvaluationArtifact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pusher: Option<PusherArtifact>,
}
