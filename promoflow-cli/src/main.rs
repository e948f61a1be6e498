//! promoflow CLI: run the training pipeline and inspect its inputs.

mod commands;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// promoflow: staged classifier training with drift gating and promotion
#[derive(Parser, Debug)]
#[command(name = "promoflow", version, about, long_about = None)]
struct Cli {
    /// Workspace directory; relative paths in the configuration resolve against it
    #[arg(short, long, default_value = ".")]
    workspace: PathBuf,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run the full pipeline once
    Run,
    /// Load and validate configuration, schema and model search files
    CheckConfig,
    /// Print the column taxonomy and the derived feature layout
    ShowSchema,
    /// Predict labels for raw JSON Lines records with a trained model
    Predict {
        /// Path to a trained model file
        #[arg(short, long)]
        model: PathBuf,
        /// JSON Lines file with one raw record per line
        input: PathBuf,
        /// Write labels here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Human output on stderr plus a daily JSON log under the user data directory.
/// The returned guard flushes the file writer on drop.
fn init_tracing(verbose: u8, quiet: bool) -> WorkerGuard {
    let level = match (verbose, quiet) {
        (0, true) => "error",
        (0, false) => "info",
        (1, _) => "debug",
        _ => "trace",
    };
    let console = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)));

    let log_dir = directories::ProjectDirs::from("dev", "promoflow", "promoflow")
        .map(|dirs| dirs.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let _ = std::fs::create_dir_all(&log_dir);
    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "promoflow.log"));
    let audit = tracing_subscriber::fmt::layer()
        .json()
        .with_current_span(true)
        .with_writer(writer)
        .with_filter(EnvFilter::new("promoflow=debug,promoflow_core=debug"));

    tracing_subscriber::registry().with(console).with(audit).init();
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.quiet);

    let workspace = match cli.workspace.canonicalize() {
        Ok(path) => path,
        Err(e) => anyhow::bail!("workspace {} is not accessible: {e}", cli.workspace.display()),
    };
    commands::handle_command(cli.command, &workspace, cli.config.as_deref()).await
}
