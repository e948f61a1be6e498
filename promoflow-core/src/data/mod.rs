//! Records, schema and ingestion.

pub mod frame;
pub mod ingest;
pub mod labels;
pub mod schema;
pub mod source;

pub use frame::{DataFrame, Record};
pub use ingest::{DataIngestion, split_train_test};
pub use labels::{BinaryLabel, LabelMapping};
pub use schema::{AgeFeature, SchemaConfig};
pub use source::{CollectionRef, DataSource, InMemorySource, JsonlCollectionSource};
