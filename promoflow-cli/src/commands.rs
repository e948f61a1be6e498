//! CLI subcommand handlers.

use crate::Commands;
use promoflow_core::data::{DataFrame, SchemaConfig};
use promoflow_core::features::build_preprocessor;
use promoflow_core::training::ModelSearchConfig;
use promoflow_core::{Orchestrator, PipelineConfig, RunOutcome, TrainedModel};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{info, warn};

/// Exit status of a run halted by the validation gate.
const HALTED_EXIT_CODE: u8 = 2;

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<ExitCode> {
    match command {
        Commands::Run => handle_run(workspace, config_path).await,
        Commands::CheckConfig => handle_check_config(workspace, config_path),
        Commands::ShowSchema => handle_show_schema(workspace, config_path),
        Commands::Predict {
            model,
            input,
            output,
        } => handle_predict(&model, &input, output.as_deref()),
    }
}

/// Load layered configuration and anchor its relative paths at `workspace`.
fn load_pipeline_config(
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<PipelineConfig> {
    let mut config = promoflow_core::load_config(Some(workspace), config_path)
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    let anchor = |path: &mut PathBuf| {
        if path.is_relative() {
            *path = workspace.join(&*path);
        }
    };
    anchor(&mut config.artifact_dir);
    anchor(&mut config.schema_path);
    anchor(&mut config.model_config_path);
    if let Some(root) = config.data_source.root.as_mut() {
        anchor(root);
    }
    if let Some(root) = config.registry.root.as_mut() {
        anchor(root);
    }
    config.validate()?;
    Ok(config)
}

async fn handle_run(workspace: &Path, config_path: Option<&Path>) -> anyhow::Result<ExitCode> {
    let config = load_pipeline_config(workspace, config_path)?;
    let orchestrator = Orchestrator::from_config(config)?;

    let cancel = orchestrator.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling the current stage");
            cancel.cancel();
        }
    });

    let report = orchestrator.run().await?;
    println!("Run {} finished: {}", report.run_id, report.final_state);
    println!("  Artifacts: {}", report.run_dir.display());
    match &report.outcome {
        RunOutcome::Pushed { registry_key } => {
            if let Some(evaluation) = &report.artifacts.evaluation {
                println!(
                    "  Promoted to '{}' (F1 {:.4}, delta {:+.4})",
                    registry_key, evaluation.candidate_f1, evaluation.score_delta
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::Rejected { score_delta } => {
            println!("  Candidate rejected, production model kept (delta {score_delta:+.4})");
            Ok(ExitCode::SUCCESS)
        }
        RunOutcome::Halted { message } => {
            eprintln!("  Halted by validation: {message}");
            Ok(ExitCode::from(HALTED_EXIT_CODE))
        }
    }
}

fn handle_check_config(workspace: &Path, config_path: Option<&Path>) -> anyhow::Result<ExitCode> {
    let config = load_pipeline_config(workspace, config_path)?;
    let schema = SchemaConfig::load(&config.schema_path)?;
    let search = ModelSearchConfig::load(&config.model_config_path)?;
    let grid = search.grid_points()?;

    println!("{}", toml::to_string_pretty(&config)?);
    println!(
        "Schema: {} columns, target '{}'",
        schema.total_columns, schema.target_column
    );
    println!(
        "Model search: {} candidates, floor {:.2}, {}-fold CV",
        grid.len(),
        search.expected_min_score,
        search.cv_folds
    );

    let mut ok = true;
    if let Err(e) = config.data_source.resolve_root() {
        warn!(error = %e, "Data source root is not resolvable");
        ok = false;
    }
    if let Err(e) = config.registry.resolve_root() {
        warn!(error = %e, "Registry root is not resolvable");
        ok = false;
    }
    if ok {
        info!("Configuration is valid");
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}

fn handle_show_schema(workspace: &Path, config_path: Option<&Path>) -> anyhow::Result<ExitCode> {
    let config = load_pipeline_config(workspace, config_path)?;
    let schema = SchemaConfig::load(&config.schema_path)?;
    let labels = schema.label_mapping()?;
    let plan = build_preprocessor(&schema);

    println!("Schema: {}", config.schema_path.display());
    println!("  Total columns: {}", schema.total_columns);
    println!(
        "  Target: {} ({} = 0, {} = 1)",
        schema.target_column,
        labels.decode(promoflow_core::data::BinaryLabel::Negative),
        labels.decode(promoflow_core::data::BinaryLabel::Positive)
    );
    println!("  Numeric: {}", join_names(&schema.numeric_columns));
    println!("  Categorical: {}", join_names(&schema.categorical_columns));
    println!("  Dropped: {}", join_names(&schema.drop_columns));
    if let Some(age) = &schema.age_feature {
        println!(
            "  Derived: {} = reference_year - {}",
            age.output_column, age.source_column
        );
    }
    println!("Feature layout:");
    println!("  One-hot: {}", join_names(&plan.one_hot_columns));
    println!("  Ordinal: {}", join_names(&plan.ordinal_columns));
    println!("  Power-scaled: {}", join_names(&plan.numeric_columns));
    Ok(ExitCode::SUCCESS)
}

fn join_names<'a>(columns: impl IntoIterator<Item = &'a String>) -> String {
    columns
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn handle_predict(model: &Path, input: &Path, output: Option<&Path>) -> anyhow::Result<ExitCode> {
    let model = TrainedModel::load(model)?;
    let frame = DataFrame::read_jsonl(input)?;
    let predictions = model.predict(&frame)?;
    info!(
        rows = predictions.len(),
        candidate = %model.candidate,
        "Predicted labels"
    );

    let mut out: Box<dyn Write> = match output {
        Some(path) => Box::new(std::io::BufWriter::new(std::fs::File::create(path)?)),
        None => Box::new(std::io::stdout().lock()),
    };
    for label in &predictions {
        writeln!(out, "{label}")?;
    }
    out.flush()?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_relative_paths_anchor_at_workspace() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("promoflow.toml"),
            "artifact_dir = \"runs\"\n\n[registry]\nroot = \"/srv/registry\"\n",
        )
        .unwrap();
        let config = load_pipeline_config(dir.path(), None).unwrap();
        assert_eq!(config.artifact_dir, dir.path().join("runs"));
        assert_eq!(config.schema_path, dir.path().join("config").join("schema.yaml"));
        assert_eq!(config.registry.root, Some(PathBuf::from("/srv/registry")));
    }

    #[test]
    fn test_join_names() {
        let names = vec!["a".to_string(), "b".to_string()];
        assert_eq!(join_names(&names), "a, b");
        assert_eq!(join_names(&Vec::<String>::new()), "");
    }
}
