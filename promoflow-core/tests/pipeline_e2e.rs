//! End-to-end pipeline runs against in-memory and directory-backed
//! collaborators.

mod common;

use pretty_assertions::assert_eq;
use promoflow_core::data::{DataFrame, SchemaConfig};
use promoflow_core::pipeline::{PipelineState, RunManifest};
use promoflow_core::training::ModelSearchConfig;
use promoflow_core::training::metrics::f1_score;
use promoflow_core::{
    InMemoryObjectStore, LocalObjectStore, ObjectStore, PipelineError, RunOutcome, StageKind,
    TrainedModel,
};
use std::sync::Arc;
use tempfile::TempDir;

#[tokio::test]
async fn test_balanced_run_promotes_into_empty_registry() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(LocalObjectStore::new(dir.path().join("registry"), "models").unwrap());
    let config = common::pipeline_config(&dir.path().join("artifact"));
    let orchestrator = common::orchestrator(
        config,
        common::visa_records(1000, 7),
        common::search_config(0.6),
        store.clone(),
    );

    let report = orchestrator.run().await.unwrap();
    assert!(report.succeeded());
    assert_eq!(report.final_state, PipelineState::Completed);
    assert_eq!(
        report.outcome,
        RunOutcome::Pushed {
            registry_key: "model-registry".into()
        }
    );
    let path: Vec<PipelineState> = report.history.iter().map(|t| t.to).collect();
    assert_eq!(
        path,
        vec![
            PipelineState::Ingesting,
            PipelineState::Validating,
            PipelineState::Transforming,
            PipelineState::Training,
            PipelineState::Evaluating,
            PipelineState::Pushing,
            PipelineState::Completed,
        ]
    );

    let ingestion = report.artifacts.ingestion.clone().unwrap();
    assert_eq!(ingestion.training_rows + ingestion.testing_rows, 1000);
    assert_eq!(ingestion.testing_rows, 200);
    let validation = report.artifacts.validation.clone().unwrap();
    assert!(validation.passed);
    assert!(validation.drift_report_path.exists());

    let trainer = report.artifacts.trainer.clone().unwrap();
    assert!(trainer.best_score >= 0.6);
    let evaluation = report.artifacts.evaluation.clone().unwrap();
    assert!(evaluation.accepted);
    assert_eq!(evaluation.production_f1, None);
    assert_eq!(evaluation.candidate_f1, trainer.metrics.f1_score);
    let pushed = report.artifacts.pusher.clone().unwrap();
    assert_eq!(pushed.model_sha256, trainer.model_sha256);

    // The promoted binary scores the raw held-out split exactly as training reported.
    let bytes = store.load("model-registry").await.unwrap();
    let model = TrainedModel::from_bytes(&bytes).unwrap();
    let test = DataFrame::read_jsonl(&ingestion.testing_path).unwrap();
    let y_true = model
        .labels
        .encode_all(test.column("case_status").unwrap())
        .unwrap();
    let y_pred = model.predict_labels(&test).unwrap();
    let recomputed = f1_score(&y_true, &y_pred);
    assert!((recomputed - trainer.metrics.f1_score).abs() < 1e-12);
    assert_eq!(model.engineer.reference_year, 2024);

    let manifest: RunManifest = serde_json::from_str(
        &std::fs::read_to_string(report.run_dir.join("run.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(manifest.state, PipelineState::Completed);
    assert_eq!(manifest.run_id, report.run_id);
}

#[tokio::test]
async fn test_missing_column_halts_before_transformation() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryObjectStore::new("models"));
    let mut records = common::visa_records(300, 11);
    for record in &mut records {
        record.remove("continent");
    }
    let config = common::pipeline_config(dir.path());
    let orchestrator =
        common::orchestrator(config, records, common::search_config(0.6), store.clone());

    let report = orchestrator.run().await.unwrap();
    assert!(!report.succeeded());
    assert_eq!(report.final_state, PipelineState::Halted);
    let RunOutcome::Halted { message } = &report.outcome else {
        panic!("expected a halted run, got {:?}", report.outcome);
    };
    assert!(message.contains("training"));
    assert!(message.contains("test"));
    assert!(message.contains("continent"));
    assert!(report.artifacts.transformation.is_none());
    assert!(report.artifacts.trainer.is_none());
    assert!(!report.run_dir.join("data_transformation").exists());
    assert!(store.keys().await.is_empty());
}

#[tokio::test]
async fn test_identical_rerun_is_rejected() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryObjectStore::new("models"));

    let first = common::orchestrator(
        common::pipeline_config(dir.path()),
        common::visa_records(600, 3),
        common::search_config(0.6),
        store.clone(),
    );
    let first = first.run().await.unwrap();
    assert!(matches!(first.outcome, RunOutcome::Pushed { .. }));
    let promoted = store.get("model-registry").await.unwrap();

    let second = common::orchestrator(
        common::pipeline_config(dir.path()),
        common::visa_records(600, 3),
        common::search_config(0.6),
        store.clone(),
    );
    let second = second.run().await.unwrap();
    assert!(second.succeeded());
    assert_eq!(second.final_state, PipelineState::Completed);
    let evaluation = second.artifacts.evaluation.unwrap();
    assert!(!evaluation.accepted);
    assert_eq!(evaluation.score_delta, 0.0);
    assert!(matches!(second.outcome, RunOutcome::Rejected { .. }));
    assert!(second.artifacts.pusher.is_none());
    assert_eq!(store.get("model-registry").await.unwrap(), promoted);
}

#[tokio::test]
async fn test_registry_outage_aborts_with_stage_context() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryObjectStore::new("models"));
    store.set_unavailable(true);
    let orchestrator = common::orchestrator(
        common::pipeline_config(dir.path()),
        common::visa_records(300, 5),
        common::search_config(0.6),
        store.clone(),
    );

    let failure = orchestrator.run().await.unwrap_err();
    assert_eq!(failure.stage, StageKind::Evaluation);
    assert!(matches!(failure.source, PipelineError::Registry(_)));
    assert!(failure.to_string().contains("evaluation"));
    store.set_unavailable(false);
    assert!(store.keys().await.is_empty());
}

#[tokio::test]
async fn test_below_floor_persists_no_model() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryObjectStore::new("models"));
    let orchestrator = common::orchestrator(
        common::pipeline_config(dir.path()),
        common::unlearnable_records(400, 9),
        common::search_config(0.9),
        store.clone(),
    );

    let failure = orchestrator.run().await.unwrap_err();
    assert_eq!(failure.stage, StageKind::Training);
    assert!(matches!(failure.source, PipelineError::BelowFloor { .. }));

    let run_dir = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .find(|path| path.is_dir())
        .unwrap();
    assert!(!run_dir.join("model_trainer").exists());
    let manifest: RunManifest =
        serde_json::from_str(&std::fs::read_to_string(run_dir.join("run.json")).unwrap()).unwrap();
    assert_eq!(manifest.state, PipelineState::Failed);
    assert!(manifest.error.unwrap().contains("training"));
    assert!(store.keys().await.is_empty());
}

#[test]
fn test_shipped_configuration_files_load() {
    let schema = SchemaConfig::load(&common::config_dir().join("schema.yaml")).unwrap();
    assert_eq!(schema.total_columns, 12);
    assert_eq!(schema.target_column, "case_status");
    let search = ModelSearchConfig::load(&common::config_dir().join("model.yaml")).unwrap();
    assert!(search.grid_points().unwrap().len() > search.candidates.len());
}
