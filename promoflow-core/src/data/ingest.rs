//! Ingestion stage: export the collection and split it into train/test.

use crate::artifact::IngestionArtifact;
use crate::config::IngestionSettings;
use crate::data::frame::DataFrame;
use crate::data::source::{CollectionRef, DataSource};
use crate::error::PipelineError;
use crate::layout::RunLayout;
use crate::retry::{RetryPolicy, with_retry};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use std::sync::Arc;
use tracing::{info, instrument};

/// Pulls records from a [`DataSource`] and writes the run's feature store
/// snapshot plus its train and test splits.
pub struct DataIngestion {
    source: Arc<dyn DataSource>,
    collection: CollectionRef,
    settings: IngestionSettings,
    retry: RetryPolicy,
}

impl DataIngestion {
    pub fn new(
        source: Arc<dyn DataSource>,
        collection: CollectionRef,
        settings: IngestionSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            collection,
            settings,
            retry,
        }
    }

    #[instrument(skip_all, fields(collection = %self.collection))]
    pub async fn run(&self, layout: &RunLayout) -> Result<IngestionArtifact, PipelineError> {
        let records = with_retry(&self.retry, "fetch_records", || {
            self.source.fetch_records(&self.collection)
        })
        .await?;
        if records.is_empty() {
            return Err(PipelineError::dataset(format!(
                "collection {} returned no records",
                self.collection
            )));
        }

        let frame = DataFrame::from_records(&records);
        let feature_store_path = layout.feature_store_file();
        frame.write_jsonl(&feature_store_path)?;
        info!(
            source = %self.source.describe(),
            rows = frame.row_count(),
            columns = frame.column_count(),
            path = %feature_store_path.display(),
            "Exported feature store snapshot"
        );

        let (train, test) = split_train_test(&frame, self.settings.test_ratio, self.settings.seed)?;
        let training_path = layout.train_file();
        let testing_path = layout.test_file();
        train.write_jsonl(&training_path)?;
        test.write_jsonl(&testing_path)?;
        info!(
            train_rows = train.row_count(),
            test_rows = test.row_count(),
            "Split dataset into train and test"
        );

        Ok(IngestionArtifact {
            feature_store_path,
            training_path,
            testing_path,
            training_rows: train.row_count(),
            testing_rows: test.row_count(),
        })
    }
}

/// Seeded shuffle split. The test split gets `ceil(n * test_ratio)` rows and
/// both splits are guaranteed non-empty.
pub fn split_train_test(
    frame: &DataFrame,
    test_ratio: f64,
    seed: u64,
) -> Result<(DataFrame, DataFrame), PipelineError> {
    let n = frame.row_count();
    if n < 2 {
        return Err(PipelineError::dataset(format!(
            "need at least 2 rows to split, got {n}"
        )));
    }
    if !(test_ratio > 0.0 && test_ratio < 1.0) {
        return Err(PipelineError::config(format!(
            "test_ratio must be in (0, 1), got {test_ratio}"
        )));
    }

    let mut indices: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);

    let test_count = ((n as f64) * test_ratio).ceil() as usize;
    let test_count = test_count.clamp(1, n - 1);
    let (test_idx, train_idx) = indices.split_at(test_count);
    Ok((frame.select_rows(train_idx), frame.select_rows(test_idx)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::frame::Record;
    use crate::data::source::InMemorySource;
    use serde_json::json;

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| {
                json!({"_id": i, "row": i, "status": if i % 2 == 0 { "a" } else { "b" }})
                    .as_object()
                    .cloned()
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn test_split_sizes_and_disjointness() {
        let frame = DataFrame::from_records(&records(101));
        let (train, test) = split_train_test(&frame, 0.2, 7).unwrap();
        assert_eq!(test.row_count(), 21);
        assert_eq!(train.row_count(), 80);

        let idx = frame.column_index("row").unwrap();
        let mut seen: Vec<u64> = train
            .rows
            .iter()
            .chain(&test.rows)
            .map(|r| r[idx].as_u64().unwrap())
            .collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..101).collect::<Vec<u64>>());
    }

    #[test]
    fn test_split_is_deterministic_per_seed() {
        let frame = DataFrame::from_records(&records(50));
        let a = split_train_test(&frame, 0.2, 1).unwrap();
        let b = split_train_test(&frame, 0.2, 1).unwrap();
        let c = split_train_test(&frame, 0.2, 2).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.1, c.1);
    }

    #[test]
    fn test_split_keeps_both_sides_non_empty() {
        let frame = DataFrame::from_records(&records(2));
        let (train, test) = split_train_test(&frame, 0.9, 3).unwrap();
        assert_eq!(train.row_count(), 1);
        assert_eq!(test.row_count(), 1);
        assert!(split_train_test(&DataFrame::from_records(&records(1)), 0.2, 3).is_err());
    }

    #[tokio::test]
    async fn test_ingestion_writes_snapshot_and_splits() {
        let dir = tempfile::TempDir::new().unwrap();
        let layout = RunLayout::new(dir.path());
        let collection = CollectionRef::new("db", "cases");
        let source = InMemorySource::new().with_collection(collection.clone(), records(20));
        let stage = DataIngestion::new(
            Arc::new(source),
            collection,
            IngestionSettings::default(),
            RetryPolicy::none(),
        );

        let artifact = stage.run(&layout).await.unwrap();
        assert_eq!(artifact.training_rows, 16);
        assert_eq!(artifact.testing_rows, 4);
        let snapshot = DataFrame::read_jsonl(&artifact.feature_store_path).unwrap();
        assert_eq!(snapshot.row_count(), 20);
        assert!(!snapshot.has_column("_id"));
        assert!(artifact.training_path.exists());
    }

    #[tokio::test]
    async fn test_empty_collection_is_fatal() {
        let dir = tempfile::TempDir::new().unwrap();
        let collection = CollectionRef::new("db", "empty");
        let source = InMemorySource::new().with_collection(collection.clone(), Vec::new());
        let stage = DataIngestion::new(
            Arc::new(source),
            collection,
            IngestionSettings::default(),
            RetryPolicy::none(),
        );
        let err = stage.run(&RunLayout::new(dir.path())).await.unwrap_err();
        assert!(matches!(err, PipelineError::Dataset(_)));
    }
}
