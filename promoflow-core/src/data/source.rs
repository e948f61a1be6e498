//! Data source abstraction for pulling labeled records.

use crate::data::frame::Record;
use crate::error::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;

/// Internal identifier field stripped from every record.
pub const INTERNAL_ID_FIELD: &str = "_id";

/// Sentinel the upstream store uses for missing values.
pub const NA_SENTINEL: &str = "na";

/// `database_name/collection_name` address of a record collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionRef {
    pub database_name: String,
    pub collection_name: String,
}

impl CollectionRef {
    pub fn new(database_name: impl Into<String>, collection_name: impl Into<String>) -> Self {
        Self {
            database_name: database_name.into(),
            collection_name: collection_name.into(),
        }
    }
}

impl std::fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.database_name, self.collection_name)
    }
}

/// Capability for fetching raw records from a document collection.
#[async_trait]
pub trait DataSource: Send + Sync {
    async fn fetch_records(&self, collection: &CollectionRef) -> Result<Vec<Record>, PipelineError>;

    /// Short description for logs and the run manifest.
    fn describe(&self) -> String;
}

/// Strip internal identifiers and turn `"na"` sentinels into nulls.
pub fn normalize_record(mut record: Record) -> Record {
    record.remove(INTERNAL_ID_FIELD);
    for value in record.values_mut() {
        if matches!(value, Value::String(s) if s == NA_SENTINEL) {
            *value = Value::Null;
        }
    }
    record
}

// ---------------------------------------------------------------------------
// JsonlCollectionSource
// ---------------------------------------------------------------------------

/// Collection exports laid out as `<root>/<database>/<collection>.jsonl`.
pub struct JsonlCollectionSource {
    pub root: PathBuf,
}

impl JsonlCollectionSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn collection_path(&self, collection: &CollectionRef) -> PathBuf {
        self.root
            .join(&collection.database_name)
            .join(format!("{}.jsonl", collection.collection_name))
    }
}

#[async_trait]
impl DataSource for JsonlCollectionSource {
    async fn fetch_records(&self, collection: &CollectionRef) -> Result<Vec<Record>, PipelineError> {
        let path = self.collection_path(collection);
        let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
            PipelineError::data_source(format!("failed to read {}: {e}", path.display()))
        })?;

        let mut records = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: Value = serde_json::from_str(line).map_err(|e| {
                PipelineError::dataset(format!("{}:{}: {e}", path.display(), line_no + 1))
            })?;
            match value {
                Value::Object(map) => records.push(normalize_record(map)),
                _ => {
                    return Err(PipelineError::dataset(format!(
                        "{}:{}: record must be a JSON object",
                        path.display(),
                        line_no + 1
                    )));
                }
            }
        }
        Ok(records)
    }

    fn describe(&self) -> String {
        format!("jsonl:{}", self.root.display())
    }
}

// ---------------------------------------------------------------------------
// InMemorySource
// ---------------------------------------------------------------------------

/// In-memory collections, keyed by `database/collection`.
#[derive(Default)]
pub struct InMemorySource {
    collections: HashMap<CollectionRef, Vec<Record>>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_collection(mut self, collection: CollectionRef, records: Vec<Record>) -> Self {
        self.collections.insert(collection, records);
        self
    }
}

#[async_trait]
impl DataSource for InMemorySource {
    async fn fetch_records(&self, collection: &CollectionRef) -> Result<Vec<Record>, PipelineError> {
        let records = self
            .collections
            .get(collection)
            .ok_or_else(|| PipelineError::not_found(format!("collection {collection}")))?;
        Ok(records.iter().cloned().map(normalize_record).collect())
    }

    fn describe(&self) -> String {
        format!("memory:{} collections", self.collections.len())
    }
}
