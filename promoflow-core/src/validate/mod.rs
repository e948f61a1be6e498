//! Schema conformance and drift gate.

pub mod drift;
pub mod stats;

pub use drift::{DriftReport, FeatureDrift, detect_drift};

use crate::artifact::{IngestionArtifact, ValidationArtifact};
use crate::config::DriftSettings;
use crate::data::frame::DataFrame;
use crate::data::schema::SchemaConfig;
use crate::error::PipelineError;
use crate::layout::RunLayout;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

/// Decides whether the ingested splits may flow into transformation.
///
/// Schema problems fail the gate. Drift is reported but never fails it.
pub struct ValidationGate {
    schema: Arc<SchemaConfig>,
    settings: DriftSettings,
    cancel: CancellationToken,
}

impl ValidationGate {
    pub fn new(schema: Arc<SchemaConfig>, settings: DriftSettings) -> Self {
        Self {
            schema,
            settings,
            cancel: CancellationToken::new(),
        }
    }

    /// The drift report is not written once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Stage entry point: read both splits and validate them.
    #[instrument(skip_all)]
    pub fn run(
        &self,
        ingestion: &IngestionArtifact,
        layout: &RunLayout,
    ) -> Result<ValidationArtifact, PipelineError> {
        let train = DataFrame::read_jsonl(&ingestion.training_path)?;
        let test = DataFrame::read_jsonl(&ingestion.testing_path)?;
        self.validate(&train, &test, &layout.drift_report_file())
    }

    pub fn validate(
        &self,
        train: &DataFrame,
        test: &DataFrame,
        report_path: &Path,
    ) -> Result<ValidationArtifact, PipelineError> {
        let mut problems = Vec::new();
        for (split, frame) in [("training", train), ("test", test)] {
            if let Some(problem) = self.check_column_count(split, frame) {
                problems.push(problem);
            }
            if let Some(problem) = self.check_required_columns(split, frame) {
                problems.push(problem);
            }
        }

        if !problems.is_empty() {
            let message = problems.join("; ");
            warn!(%message, "Validation failed");
            return Ok(ValidationArtifact {
                passed: false,
                message,
                drift_detected: false,
                drift_report_path: report_path.to_path_buf(),
            });
        }

        let report = detect_drift(
            train,
            test,
            &self.schema.drift_numeric_columns(),
            &self.schema.drift_categorical_columns(),
            &self.settings,
        )?;
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled(
                "validation abandoned before writing the drift report".into(),
            ));
        }
        crate::persistence::atomic_write_yaml(report_path, &report)?;

        let message = if report.dataset_drift {
            warn!(
                drifted = report.number_of_drifted_features,
                features = report.number_of_features,
                "Dataset drift detected"
            );
            format!(
                "Drift detected: {} of {} features drifted",
                report.number_of_drifted_features, report.number_of_features
            )
        } else {
            String::new()
        };
        info!(
            drifted = report.number_of_drifted_features,
            features = report.number_of_features,
            report = %report_path.display(),
            "Validation passed"
        );

        Ok(ValidationArtifact {
            passed: true,
            message,
            drift_detected: report.dataset_drift,
            drift_report_path: report_path.to_path_buf(),
        })
    }

    fn check_column_count(&self, split: &str, frame: &DataFrame) -> Option<String> {
        let found = frame.column_count();
        (found != self.schema.total_columns).then(|| {
            format!(
                "{split} dataframe has {found} columns, expected {}",
                self.schema.total_columns
            )
        })
    }

    fn check_required_columns(&self, split: &str, frame: &DataFrame) -> Option<String> {
        let missing: Vec<&str> = self
            .schema
            .required_columns()
            .filter(|c| !frame.has_column(c))
            .map(String::as_str)
            .collect();
        for column in &missing {
            warn!(split, column, "Missing required column");
        }
        (!missing.is_empty()).then(|| {
            format!(
                "columns missing in {split} dataframe: {}",
                missing.join(", ")
            )
        })
    }
}
