//! Pipeline orchestrator: sequences stages along the stage graph, hands
//! artifacts forward, halts on a failed gate and writes the run manifest.

use crate::artifact::ArtifactLedger;
use crate::config::PipelineConfig;
use crate::data::ingest::DataIngestion;
use crate::data::schema::SchemaConfig;
use crate::data::source::{CollectionRef, DataSource, JsonlCollectionSource};
use crate::error::{PipelineError, StageFailure};
use crate::evaluation::PromotionDecision;
use crate::features::DataTransformation;
use crate::layout::RunLayout;
use crate::pipeline::graph::{StageGraph, StageKind};
use crate::pipeline::state::{PipelineState, RunState, StateTransition};
use crate::registry::{LocalObjectStore, ModelPusher, ObjectStore};
use crate::training::search::ModelSearchConfig;
use crate::training::trainer::ModelTrainer;
use crate::validate::ValidationGate;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::Location;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// How a run that did not abort ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Validation failed; nothing past the gate ran.
    Halted { message: String },
    /// Candidate did not beat the production model.
    Rejected { score_delta: f64 },
    /// Candidate promoted to the registry slot.
    Pushed { registry_key: String },
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub outcome: RunOutcome,
    pub final_state: PipelineState,
    pub artifacts: ArtifactLedger,
    pub history: Vec<StateTransition>,
}

impl RunReport {
    /// Pushed and Rejected both count as success.
    pub fn succeeded(&self) -> bool {
        !matches!(self.outcome, RunOutcome::Halted { .. })
    }
}

/// Audit record persisted as `run.json` after every stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub pipeline_name: String,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub state: PipelineState,
    pub data_source: String,
    pub registry_bucket: String,
    pub history: Vec<StateTransition>,
    pub artifacts: ArtifactLedger,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Mutable bookkeeping for a single run. Only the orchestrator touches it.
struct RunContext {
    run_id: String,
    started_at: DateTime<Utc>,
    layout: RunLayout,
    state: RunState,
    ledger: ArtifactLedger,
    error: Option<String>,
}

impl RunContext {
    fn enter(&mut self, to: PipelineState, stage: StageKind) -> Result<(), StageFailure> {
        self.state
            .transition(to)
            .map_err(|e| StageFailure::new(stage, e))?;
        info!(run_id = %self.run_id, state = %to, "Entering state");
        Ok(())
    }
}

/// Fetch a stage input from the ledger.
fn input<T: Clone>(stage: StageKind, from: StageKind, slot: &Option<T>) -> Result<T, StageFailure> {
    slot.clone().ok_or_else(|| {
        StageFailure::new(
            stage,
            PipelineError::not_found(format!("{from} artifact required by {stage} stage")),
        )
    })
}

/// Run synchronous stage work on the blocking pool.
async fn blocking<T, F>(work: F) -> Result<T, PipelineError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PipelineError::Io(std::io::Error::other(format!("stage task failed: {e}"))))?
}

pub struct Orchestrator {
    config: PipelineConfig,
    schema: Arc<SchemaConfig>,
    search: ModelSearchConfig,
    source: Arc<dyn DataSource>,
    store: Arc<dyn ObjectStore>,
    graph: StageGraph,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        config: PipelineConfig,
        schema: SchemaConfig,
        search: ModelSearchConfig,
        source: Arc<dyn DataSource>,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        schema.validate()?;
        search.validate()?;
        Ok(Self {
            config,
            schema: Arc::new(schema),
            search,
            source,
            store,
            graph: StageGraph::standard(),
            cancel: CancellationToken::new(),
        })
    }

    /// Build from configuration: schema and model files, the JSON Lines
    /// export root and the local registry root.
    pub fn from_config(config: PipelineConfig) -> Result<Self, PipelineError> {
        config.validate()?;
        let schema = SchemaConfig::load(&config.schema_path)?;
        let search = ModelSearchConfig::load(&config.model_config_path)?;
        let source: Arc<dyn DataSource> =
            Arc::new(JsonlCollectionSource::new(config.data_source.resolve_root()?));
        let store: Arc<dyn ObjectStore> = Arc::new(LocalObjectStore::new(
            config.registry.resolve_root()?,
            config.registry.bucket.clone(),
        )?);
        Self::new(config, schema, search, source, store)
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Token for one stage's work. It fires when the run is cancelled and
    /// when the guarded stage returns, so blocking work that outlives a
    /// timeout stops before writing into the run directory.
    fn stage_token(&self) -> CancellationToken {
        self.cancel.child_token()
    }

    /// Wrap a stage future with the cancellation token and the stage
    /// timeout. Errors carry the caller's source location.
    #[track_caller]
    fn guarded<T, F>(
        &self,
        stage: StageKind,
        stage_token: CancellationToken,
        work: F,
    ) -> impl Future<Output = Result<T, StageFailure>>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        let location = Location::caller();
        let cancel = self.cancel.clone();
        let limit = Duration::from_secs(self.config.stage_timeout_secs);
        async move {
            let _stage_done = stage_token.drop_guard();
            if cancel.is_cancelled() {
                return Err(StageFailure::at(
                    stage,
                    location,
                    PipelineError::Cancelled(format!("{stage} stage not started")),
                ));
            }
            let result = tokio::select! {
                _ = cancel.cancelled() => {
                    Err(PipelineError::Cancelled(format!("{stage} stage interrupted")))
                }
                outcome = tokio::time::timeout(limit, work) => match outcome {
                    Ok(result) => result,
                    Err(_) => Err(PipelineError::Timeout(format!(
                        "{stage} stage exceeded {}s",
                        limit.as_secs()
                    ))),
                },
            };
            result.map_err(|e| StageFailure::at(stage, location, e))
        }
    }

    fn write_manifest(&self, run: &RunContext) -> Result<(), PipelineError> {
        let manifest = RunManifest {
            run_id: run.run_id.clone(),
            pipeline_name: self.config.pipeline_name.clone(),
            started_at: run.started_at,
            updated_at: Utc::now(),
            state: run.state.current(),
            data_source: self.source.describe(),
            registry_bucket: self.store.bucket().to_string(),
            history: run.state.history().to_vec(),
            artifacts: run.ledger.clone(),
            error: run.error.clone(),
        };
        crate::persistence::atomic_write_json(&run.layout.manifest_file(), &manifest)?;
        Ok(())
    }

    /// Execute one full run. Halted and Rejected runs return `Ok`; any
    /// fatal abort returns the wrapped stage failure.
    pub async fn run(&self) -> Result<RunReport, StageFailure> {
        let run_id = uuid::Uuid::new_v4().to_string();
        let started_at = Utc::now();
        let layout = RunLayout::for_run(&self.config.artifact_dir, started_at, &run_id);
        let mut run = RunContext {
            run_id,
            started_at,
            layout,
            state: RunState::new(),
            ledger: ArtifactLedger::default(),
            error: None,
        };
        info!(
            run_id = %run.run_id,
            pipeline = %self.config.pipeline_name,
            run_dir = %run.layout.root().display(),
            "Starting pipeline run"
        );

        match self.execute(&mut run).await {
            Ok(outcome) => {
                info!(run_id = %run.run_id, state = %run.state.current(), ?outcome, "Pipeline run finished");
                Ok(RunReport {
                    run_id: run.run_id,
                    run_dir: run.layout.root().to_path_buf(),
                    outcome,
                    final_state: run.state.current(),
                    artifacts: run.ledger,
                    history: run.state.history().to_vec(),
                })
            }
            Err(failure) => {
                error!(run_id = %run.run_id, stage = %failure.stage, error = %failure, "Pipeline run failed");
                run.error = Some(failure.to_string());
                if let Err(e) = run.state.transition(PipelineState::Failed) {
                    warn!(error = %e, "Could not record failed state");
                }
                if let Err(e) = self.write_manifest(&run) {
                    warn!(error = %e, "Could not write run manifest");
                }
                Err(failure)
            }
        }
    }

    async fn execute(&self, run: &mut RunContext) -> Result<RunOutcome, StageFailure> {
        let order = self
            .graph
            .execution_order()
            .map_err(|e| StageFailure::new(StageKind::Ingestion, e))?;

        for stage in order {
            self.graph
                .check_inputs(stage, &run.ledger)
                .map_err(|e| StageFailure::new(stage, e))?;

            match stage {
                StageKind::Ingestion => {
                    run.enter(PipelineState::Ingesting, stage)?;
                    let ingestion = DataIngestion::new(
                        Arc::clone(&self.source),
                        CollectionRef::new(
                            self.config.data_source.database_name.clone(),
                            self.config.data_source.collection_name.clone(),
                        ),
                        self.config.ingestion.clone(),
                        self.config.retry.clone(),
                    );
                    let artifact = self
                        .guarded(stage, self.stage_token(), ingestion.run(&run.layout))
                        .await?;
                    run.ledger.ingestion = Some(artifact);
                }
                StageKind::Validation => {
                    run.enter(PipelineState::Validating, stage)?;
                    let ingestion = input(stage, StageKind::Ingestion, &run.ledger.ingestion)?;
                    let token = self.stage_token();
                    let gate = ValidationGate::new(Arc::clone(&self.schema), self.config.validation.clone())
                        .with_cancellation(token.clone());
                    let layout = run.layout.clone();
                    let artifact = self
                        .guarded(stage, token, blocking(move || gate.run(&ingestion, &layout)))
                        .await?;
                    let passed = artifact.passed;
                    let message = artifact.message.clone();
                    run.ledger.validation = Some(artifact);

                    if !passed {
                        warn!(run_id = %run.run_id, %message, "Validation failed, halting pipeline");
                        run.state
                            .transition_with_note(PipelineState::Halted, Some(message.clone()))
                            .map_err(|e| StageFailure::new(stage, e))?;
                        self.write_manifest(run)
                            .map_err(|e| StageFailure::new(stage, e))?;
                        return Ok(RunOutcome::Halted { message });
                    }
                    if !message.is_empty() {
                        warn!(run_id = %run.run_id, %message, "Continuing despite drift");
                    }
                }
                StageKind::Transformation => {
                    run.enter(PipelineState::Transforming, stage)?;
                    let ingestion = input(stage, StageKind::Ingestion, &run.ledger.ingestion)?;
                    let validation = input(stage, StageKind::Validation, &run.ledger.validation)?;
                    let token = self.stage_token();
                    let transformation = DataTransformation::new(
                        Arc::clone(&self.schema),
                        self.config.transformation.clone(),
                    )
                    .with_cancellation(token.clone());
                    let layout = run.layout.clone();
                    let artifact = self
                        .guarded(
                            stage,
                            token,
                            blocking(move || transformation.run(&ingestion, &validation, &layout)),
                        )
                        .await?;
                    run.ledger.transformation = Some(artifact);
                }
                StageKind::Training => {
                    run.enter(PipelineState::Training, stage)?;
                    let transformation =
                        input(stage, StageKind::Transformation, &run.ledger.transformation)?;
                    let token = self.stage_token();
                    let trainer = ModelTrainer::new(self.search.clone()).with_cancellation(token.clone());
                    let artifact = self
                        .guarded(stage, token, trainer.run(&transformation, &run.layout))
                        .await?;
                    run.ledger.trainer = Some(artifact);
                }
                StageKind::Evaluation => {
                    run.enter(PipelineState::Evaluating, stage)?;
                    let trainer = input(stage, StageKind::Training, &run.ledger.trainer)?;
                    let ingestion = input(stage, StageKind::Ingestion, &run.ledger.ingestion)?;
                    let decision = PromotionDecision::new(
                        Arc::clone(&self.store),
                        self.config.registry.key.clone(),
                        self.config.retry.clone(),
                    );
                    let artifact = self
                        .guarded(stage, self.stage_token(), decision.evaluate(&trainer, &ingestion))
                        .await?;
                    let accepted = artifact.accepted;
                    let score_delta = artifact.score_delta;
                    run.ledger.evaluation = Some(artifact);

                    if !accepted {
                        info!(run_id = %run.run_id, score_delta, "Candidate rejected, production model kept");
                        run.enter(PipelineState::Rejected, stage)?;
                        run.enter(PipelineState::Completed, stage)?;
                        self.write_manifest(run)
                            .map_err(|e| StageFailure::new(stage, e))?;
                        return Ok(RunOutcome::Rejected { score_delta });
                    }
                }
                StageKind::Pushing => {
                    run.enter(PipelineState::Pushing, stage)?;
                    let evaluation = input(stage, StageKind::Evaluation, &run.ledger.evaluation)?;
                    let trainer = input(stage, StageKind::Training, &run.ledger.trainer)?;
                    let pusher = ModelPusher::new(
                        Arc::clone(&self.store),
                        self.config.registry.key.clone(),
                        self.config.registry.mode,
                        self.config.retry.clone(),
                    );
                    let artifact = self
                        .guarded(stage, self.stage_token(), pusher.run(&evaluation, &trainer))
                        .await?;
                    let registry_key = artifact.registry_key.clone();
                    run.ledger.pusher = Some(artifact);
                    run.enter(PipelineState::Completed, stage)?;
                    self.write_manifest(run)
                        .map_err(|e| StageFailure::new(stage, e))?;
                    return Ok(RunOutcome::Pushed { registry_key });
                }
            }

            self.write_manifest(run)
                .map_err(|e| StageFailure::new(stage, e))?;
        }

        Err(StageFailure::new(
            StageKind::Pushing,
            PipelineError::config("stage graph ended without a terminal stage"),
        ))
    }
}
