//! Stage graph, run state machine and the orchestrator.

pub mod graph;
pub mod orchestrator;
pub mod state;

pub use graph::{ArtifactKind, StageGraph, StageKind};
pub use orchestrator::{Orchestrator, RunManifest, RunOutcome, RunReport};
pub use state::{PipelineState, RunState, StateTransition};
