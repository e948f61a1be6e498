//! # promoflow-core: staged classifier training with gated promotion
//!
//! Pulls labeled records from a data source, validates them against a
//! declared schema and for drift, fits a leakage-safe preprocessing pipeline,
//! searches a grid of classifier candidates and promotes the winner into a
//! model registry only if it beats the model already deployed there.
//!
//! The [`pipeline::Orchestrator`] is the only component that knows about
//! more than one stage. Stages exchange immutable artifacts from
//! [`artifact`].

// Foundation
pub mod artifact;
pub mod config;
pub mod error;
pub mod layout;
pub mod persistence;
pub mod retry;

// Data
pub mod data;
pub mod features;
pub mod validate;

// Models
pub mod algorithms;
pub mod evaluation;
pub mod training;

// Promotion
pub mod pipeline;
pub mod registry;

// Re-exports
pub use artifact::ArtifactLedger;
pub use config::{CONFIG_FILE_NAME, PipelineConfig, PromotionMode, load_config};
pub use error::{PipelineError, StageFailure};
pub use pipeline::{Orchestrator, PipelineState, RunOutcome, RunReport, StageKind};
pub use registry::{InMemoryObjectStore, LocalObjectStore, ObjectStore};
pub use training::TrainedModel;
