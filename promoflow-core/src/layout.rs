//! Fixed relative paths of every file a run writes.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};

/// Directory tree of a single pipeline run.
#[derive(Debug, Clone)]
pub struct RunLayout {
    root: PathBuf,
}

impl RunLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Allocate a fresh run directory under `artifact_dir`.
    pub fn for_run(artifact_dir: &Path, started_at: DateTime<Utc>, run_id: &str) -> Self {
        let short_id: String = run_id.chars().take(8).collect();
        let name = format!("{}_{short_id}", started_at.format("%m_%d_%Y_%H_%M_%S"));
        Self::new(artifact_dir.join(name))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.root.join("run.json")
    }

    pub fn feature_store_file(&self) -> PathBuf {
        self.root
            .join("data_ingestion")
            .join("feature_store")
            .join("records.jsonl")
    }

    pub fn train_file(&self) -> PathBuf {
        self.root
            .join("data_ingestion")
            .join("ingested")
            .join("train.jsonl")
    }

    pub fn test_file(&self) -> PathBuf {
        self.root
            .join("data_ingestion")
            .join("ingested")
            .join("test.jsonl")
    }

    pub fn drift_report_file(&self) -> PathBuf {
        self.root
            .join("data_validation")
            .join("drift_report")
            .join("report.yaml")
    }

    pub fn preprocessor_file(&self) -> PathBuf {
        self.root
            .join("data_transformation")
            .join("transformed_object")
            .join("preprocessing.json")
    }

    pub fn transformed_train_file(&self) -> PathBuf {
        self.root
            .join("data_transformation")
            .join("transformed")
            .join("train.json")
    }

    pub fn transformed_test_file(&self) -> PathBuf {
        self.root
            .join("data_transformation")
            .join("transformed")
            .join("test.json")
    }

    pub fn trained_model_file(&self) -> PathBuf {
        self.root
            .join("model_trainer")
            .join("trained_model")
            .join("model.json")
    }

    pub fn leaderboard_file(&self) -> PathBuf {
        self.root.join("model_trainer").join("leaderboard.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_run_directory_name() {
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap();
        let layout = RunLayout::for_run(Path::new("artifact"), at, "abcdef0123456789");
        assert_eq!(
            layout.root(),
            Path::new("artifact").join("03_09_2024_14_05_07_abcdef01")
        );
    }

    #[test]
    fn test_paths_are_distinct() {
        let layout = RunLayout::new("/tmp/run");
        let paths = [
            layout.feature_store_file(),
            layout.train_file(),
            layout.test_file(),
            layout.drift_report_file(),
            layout.preprocessor_file(),
            layout.transformed_train_file(),
            layout.transformed_test_file(),
            layout.trained_model_file(),
            layout.manifest_file(),
        ];
        let unique: std::collections::HashSet<_> = paths.iter().collect();
        assert_eq!(unique.len(), paths.len());
        assert!(paths.iter().all(|p| p.starts_with("/tmp/run")));
    }
}
