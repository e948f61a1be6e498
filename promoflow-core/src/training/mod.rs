//! Model search, metrics and the composite trained model.

pub mod metrics;
pub mod model;
pub mod search;
pub mod trainer;

pub use metrics::{ClassificationMetrics, ConfusionMatrix};
pub use model::TrainedModel;
pub use search::{CandidateScore, CandidateSpec, ModelSearch, ModelSearchConfig, SearchOutcome};
pub use trainer::ModelTrainer;
