//! Error types for the promoflow-core crate.
//!
//! Every stage returns [`PipelineError`]; the orchestrator is the single place
//! that wraps a stage error into a [`StageFailure`] carrying the stage and the
//! source location of the failing call.

use crate::pipeline::graph::StageKind;
use crate::pipeline::state::PipelineState;
use std::panic::Location;
use thiserror::Error;

/// Top-level error type for pipeline stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable {0} is required but not set")]
    MissingEnv(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Data source error: {0}")]
    DataSource(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Transformation error: {0}")]
    Transform(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("No candidate reached the expected score: best {best:.4} < floor {floor:.4}")]
    BelowFloor { best: f64, floor: f64 },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Registry error: {0}")]
    Registry(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Invalid pipeline transition from {from} to {to}")]
    InvalidTransition {
        from: PipelineState,
        to: PipelineState,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Configuration error: {0}")]
    Figment(#[from] Box<figment::Error>),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn data_source(msg: impl Into<String>) -> Self {
        Self::DataSource(msg.into())
    }

    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn transform(msg: impl Into<String>) -> Self {
        Self::Transform(msg.into())
    }

    pub fn training(msg: impl Into<String>) -> Self {
        Self::Training(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn registry(msg: impl Into<String>) -> Self {
        Self::Registry(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Whether a retry may succeed.
    ///
    /// Only transport-level failures against the data source or the registry
    /// qualify. Data-correctness failures (schema mismatch, below-floor score,
    /// corrupt matrices) are never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::DataSource(_) | Self::Registry(_) | Self::Timeout(_)
        )
    }
}

/// A fatal failure of one pipeline stage, as surfaced to the caller.
#[derive(Debug, Error)]
#[error("{stage} stage failed at {location}: {source}")]
pub struct StageFailure {
    pub stage: StageKind,
    pub location: &'static Location<'static>,
    #[source]
    pub source: PipelineError,
}

impl StageFailure {
    #[track_caller]
    pub fn new(stage: StageKind, source: PipelineError) -> Self {
        Self::at(stage, Location::caller(), source)
    }

    /// Wrap with a location captured earlier, e.g. before entering an async block.
    pub fn at(
        stage: StageKind,
        location: &'static Location<'static>,
        source: PipelineError,
    ) -> Self {
        Self {
            stage,
            location,
            source,
        }
    }
}
