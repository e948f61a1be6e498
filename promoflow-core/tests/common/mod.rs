//! Shared fixtures: synthetic visa application records and pipeline wiring.

#![allow(dead_code)]

use promoflow_core::data::{CollectionRef, InMemorySource, Record, SchemaConfig};
use promoflow_core::retry::RetryPolicy;
use promoflow_core::training::ModelSearchConfig;
use promoflow_core::{ObjectStore, Orchestrator, PipelineConfig};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub const CONTINENTS: [&str; 4] = ["Asia", "Europe", "North America", "Africa"];
pub const REGIONS: [&str; 4] = ["West", "Northeast", "South", "Midwest"];

pub fn config_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join("config")
}

pub fn schema() -> SchemaConfig {
    SchemaConfig::load(&config_dir().join("schema.yaml")).unwrap()
}

/// Small, fast search space.
pub fn search_config(expected_min_score: f64) -> ModelSearchConfig {
    let yaml = format!(
        r#"
expected_min_score: {expected_min_score}
max_workers: 2
candidates:
  - family: gaussian_nb
  - family: decision_tree
    grid:
      max_depth: [3, 5]
"#
    );
    serde_yaml::from_str(&yaml).unwrap()
}

/// One application. Certified cases earn more, hold higher degrees and
/// usually have job experience; the split is learnable but not perfect.
fn application(i: usize, certified: bool, rng: &mut StdRng) -> Record {
    let education = if certified {
        ["Bachelor's", "Master's", "Doctorate"][rng.gen_range(0..3)]
    } else {
        ["High School", "Bachelor's", "Master's"][rng.gen_range(0..3)]
    };
    let experience = if rng.gen_range(0.0..1.0) < if certified { 0.8 } else { 0.3 } {
        "Y"
    } else {
        "N"
    };
    let wage = if certified {
        rng.gen_range(70_000.0..140_000.0)
    } else {
        rng.gen_range(15_000.0..90_000.0)
    };
    let unit = if !certified && rng.gen_range(0.0..1.0) < 0.3 {
        "Hour"
    } else {
        "Year"
    };
    let value = json!({
        "_id": format!("{i:024x}"),
        "case_id": format!("EZYV{i:05}"),
        "continent": CONTINENTS[rng.gen_range(0..CONTINENTS.len())],
        "education_of_employee": education,
        "has_job_experience": experience,
        "requires_job_training": if rng.gen_range(0.0..1.0) < 0.15 { "Y" } else { "N" },
        "no_of_employees": rng.gen_range(10..20_000),
        "yr_of_estab": rng.gen_range(1900..2016),
        "region_of_employment": REGIONS[rng.gen_range(0..REGIONS.len())],
        "prevailing_wage": (wage * 100.0_f64).round() / 100.0,
        "unit_of_wage": unit,
        "full_time_position": if rng.gen_range(0.0..1.0) < 0.9 { "Y" } else { "N" },
        "case_status": if certified { "Certified" } else { "Denied" },
    });
    match value {
        Value::Object(map) => map,
        _ => unreachable!(),
    }
}

/// `n` records, half of each class, in shuffled order.
pub fn visa_records(n: usize, seed: u64) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records: Vec<Record> = (0..n)
        .map(|i| application(i, i % 2 == 0, &mut rng))
        .collect();
    records.shuffle(&mut rng);
    records
}

/// Records whose label is independent of every feature.
pub fn unlearnable_records(n: usize, seed: u64) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut records = visa_records(n, seed);
    for record in &mut records {
        let status = if rng.gen_range(0..2) == 0 { "Certified" } else { "Denied" };
        record.insert("case_status".into(), json!(status));
    }
    records
}

pub fn pipeline_config(artifact_dir: &Path) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.artifact_dir = artifact_dir.to_path_buf();
    config.transformation.reference_year = Some(2024);
    config.retry = RetryPolicy {
        max_attempts: 2,
        base_delay_ms: 1,
        max_delay_ms: 2,
    };
    config
}

pub fn source_with(config: &PipelineConfig, records: Vec<Record>) -> Arc<InMemorySource> {
    Arc::new(InMemorySource::new().with_collection(
        CollectionRef::new(
            config.data_source.database_name.clone(),
            config.data_source.collection_name.clone(),
        ),
        records,
    ))
}

pub fn orchestrator(
    config: PipelineConfig,
    records: Vec<Record>,
    search: ModelSearchConfig,
    store: Arc<dyn ObjectStore>,
) -> Orchestrator {
    let source = source_with(&config, records);
    Orchestrator::new(config, schema(), search, source, store).unwrap()
}
