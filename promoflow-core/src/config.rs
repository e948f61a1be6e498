//! Configuration types for promoflow.
//!
//! Uses `figment` for layered configuration: defaults -> workspace file ->
//! explicit file -> environment.

use crate::error::PipelineError;
use crate::retry::RetryPolicy;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the workspace-level configuration file.
pub const CONFIG_FILE_NAME: &str = "promoflow.toml";

/// Top-level pipeline configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Logical pipeline name, used in log records and the run manifest.
    #[serde(default = "default_pipeline_name")]
    pub pipeline_name: String,
    /// Root directory under which every run gets its own timestamped tree.
    #[serde(default = "default_artifact_dir")]
    pub artifact_dir: PathBuf,
    /// Column taxonomy file (YAML).
    #[serde(default = "default_schema_path")]
    pub schema_path: PathBuf,
    /// Candidate model families and grids (YAML).
    #[serde(default = "default_model_config_path")]
    pub model_config_path: PathBuf,
    /// Per-stage timeout in seconds.
    #[serde(default = "default_stage_timeout")]
    pub stage_timeout_secs: u64,
    #[serde(default)]
    pub data_source: DataSourceConfig,
    #[serde(default)]
    pub ingestion: IngestionSettings,
    #[serde(default)]
    pub validation: DriftSettings,
    #[serde(default)]
    pub transformation: TransformSettings,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            pipeline_name: default_pipeline_name(),
            artifact_dir: default_artifact_dir(),
            schema_path: default_schema_path(),
            model_config_path: default_model_config_path(),
            stage_timeout_secs: default_stage_timeout(),
            data_source: DataSourceConfig::default(),
            ingestion: IngestionSettings::default(),
            validation: DriftSettings::default(),
            transformation: TransformSettings::default(),
            registry: RegistryConfig::default(),
            retry: RetryPolicy::default(),
        }
    }
}

fn default_pipeline_name() -> String {
    "promoflow".to_string()
}

fn default_artifact_dir() -> PathBuf {
    PathBuf::from("artifact")
}

fn default_schema_path() -> PathBuf {
    PathBuf::from("config").join("schema.yaml")
}

fn default_model_config_path() -> PathBuf {
    PathBuf::from("config").join("model.yaml")
}

fn default_stage_timeout() -> u64 {
    3600
}

impl PipelineConfig {
    /// Check cross-field constraints figment cannot express.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let ratio = self.ingestion.test_ratio;
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(PipelineError::config(format!(
                "ingestion.test_ratio must be in (0, 1), got {ratio}"
            )));
        }
        let p = self.validation.p_value_threshold;
        if !(p > 0.0 && p < 1.0) {
            return Err(PipelineError::config(format!(
                "validation.p_value_threshold must be in (0, 1), got {p}"
            )));
        }
        let share = self.validation.drift_share_threshold;
        if !(share > 0.0 && share <= 1.0) {
            return Err(PipelineError::config(format!(
                "validation.drift_share_threshold must be in (0, 1], got {share}"
            )));
        }
        if self.transformation.smote_neighbors == 0 || self.transformation.enn_neighbors == 0 {
            return Err(PipelineError::config(
                "transformation neighbour counts must be positive",
            ));
        }
        if self.registry.key.trim().is_empty() || self.registry.bucket.trim().is_empty() {
            return Err(PipelineError::config("registry bucket and key must be set"));
        }
        if self.stage_timeout_secs == 0 {
            return Err(PipelineError::config("stage_timeout_secs must be positive"));
        }
        Ok(())
    }
}

/// Location of the labeled record collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceConfig {
    #[serde(default = "default_database_name")]
    pub database_name: String,
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
    /// Explicit export root. Takes precedence over `root_env`.
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Environment variable holding the export root when `root` is unset.
    #[serde(default = "default_data_root_env")]
    pub root_env: String,
}

impl Default for DataSourceConfig {
    fn default() -> Self {
        Self {
            database_name: default_database_name(),
            collection_name: default_collection_name(),
            root: None,
            root_env: default_data_root_env(),
        }
    }
}

fn default_database_name() -> String {
    "records".to_string()
}

fn default_collection_name() -> String {
    "labeled".to_string()
}

fn default_data_root_env() -> String {
    "PROMOFLOW_DATA_ROOT".to_string()
}

impl DataSourceConfig {
    pub fn resolve_root(&self) -> Result<PathBuf, PipelineError> {
        resolve_location(self.root.as_ref(), &self.root_env)
    }
}

/// Train/test split settings for ingestion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionSettings {
    /// Fraction of rows held out for testing.
    #[serde(default = "default_test_ratio")]
    pub test_ratio: f64,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for IngestionSettings {
    fn default() -> Self {
        Self {
            test_ratio: default_test_ratio(),
            seed: default_seed(),
        }
    }
}

fn default_test_ratio() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

/// Drift detection thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftSettings {
    /// A feature drifts when its test p-value falls below this.
    #[serde(default = "default_p_value")]
    pub p_value_threshold: f64,
    /// The dataset drifts when at least this share of features drift.
    #[serde(default = "default_drift_share")]
    pub drift_share_threshold: f64,
}

impl Default for DriftSettings {
    fn default() -> Self {
        Self {
            p_value_threshold: default_p_value(),
            drift_share_threshold: default_drift_share(),
        }
    }
}

fn default_p_value() -> f64 {
    0.05
}

fn default_drift_share() -> f64 {
    0.5
}

/// Feature transformation and resampling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformSettings {
    /// Year used for the derived age feature. Defaults to the current year.
    #[serde(default)]
    pub reference_year: Option<i32>,
    /// Neighbours used when synthesizing minority samples.
    #[serde(default = "default_smote_neighbors")]
    pub smote_neighbors: usize,
    /// Neighbours consulted by edited-nearest-neighbour cleaning.
    #[serde(default = "default_enn_neighbors")]
    pub enn_neighbors: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            reference_year: None,
            smote_neighbors: default_smote_neighbors(),
            enn_neighbors: default_enn_neighbors(),
            seed: default_seed(),
        }
    }
}

fn default_smote_neighbors() -> usize {
    5
}

fn default_enn_neighbors() -> usize {
    3
}

/// How a promotion writes to the registry slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionMode {
    /// Overwrite the single production key.
    #[default]
    Overwrite,
    /// Write an immutable versioned copy first, then overwrite the production key.
    Versioned,
}

/// Model registry (object store) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default = "default_bucket")]
    pub bucket: String,
    /// Key of the production deployment slot.
    #[serde(default = "default_registry_key")]
    pub key: String,
    #[serde(default)]
    pub root: Option<PathBuf>,
    #[serde(default = "default_registry_root_env")]
    pub root_env: String,
    #[serde(default)]
    pub mode: PromotionMode,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            bucket: default_bucket(),
            key: default_registry_key(),
            root: None,
            root_env: default_registry_root_env(),
            mode: PromotionMode::default(),
        }
    }
}

fn default_bucket() -> String {
    "promoflow-models".to_string()
}

fn default_registry_key() -> String {
    "model-registry".to_string()
}

fn default_registry_root_env() -> String {
    "PROMOFLOW_REGISTRY_ROOT".to_string()
}

impl RegistryConfig {
    pub fn resolve_root(&self) -> Result<PathBuf, PipelineError> {
        resolve_location(self.root.as_ref(), &self.root_env)
    }
}

fn resolve_location(explicit: Option<&PathBuf>, env_var: &str) -> Result<PathBuf, PipelineError> {
    if let Some(path) = explicit {
        return Ok(path.clone());
    }
    match std::env::var(env_var) {
        Ok(value) if !value.trim().is_empty() => Ok(PathBuf::from(value)),
        _ => Err(PipelineError::MissingEnv(env_var.to_string())),
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `PROMOFLOW_`, nested with `__`)
/// 2. Explicit config file
/// 3. Workspace config (`<workspace>/promoflow.toml`)
/// 4. Built-in defaults
pub fn load_config(
    workspace: Option<&Path>,
    explicit: Option<&Path>,
) -> Result<PipelineConfig, Box<figment::Error>> {
    let mut figment = Figment::from(Serialized::defaults(PipelineConfig::default()));

    if let Some(ws) = workspace {
        let ws_config = ws.join(CONFIG_FILE_NAME);
        if ws_config.exists() {
            figment = figment.merge(Toml::file(&ws_config));
        }
    }

    if let Some(path) = explicit {
        figment = figment.merge(Toml::file(path));
    }

    // PROMOFLOW_REGISTRY__BUCKET, PROMOFLOW_INGESTION__TEST_RATIO, ...
    // The *_ROOT variables are read directly by `resolve_root`, not merged here.
    figment = figment.merge(
        Env::prefixed("PROMOFLOW_")
            .split("__")
            .ignore(&["DATA_ROOT", "REGISTRY_ROOT"]),
    );

    figment.extract().map_err(Box::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.ingestion.test_ratio, 0.2);
        assert_eq!(config.validation.p_value_threshold, 0.05);
        assert_eq!(config.transformation.smote_neighbors, 5);
        assert_eq!(config.registry.key, "model-registry");
        assert_eq!(config.registry.mode, PromotionMode::Overwrite);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_ratio() {
        let mut config = PipelineConfig::default();
        config.ingestion.test_ratio = 1.5;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_explicit_root_wins_over_env() {
        let cfg = DataSourceConfig {
            root: Some(PathBuf::from("/data/export")),
            root_env: "PROMOFLOW_TEST_UNSET_VARIABLE".into(),
            ..DataSourceConfig::default()
        };
        assert_eq!(cfg.resolve_root().unwrap(), PathBuf::from("/data/export"));
    }

    #[test]
    fn test_missing_env_is_reported() {
        let cfg = RegistryConfig {
            root_env: "PROMOFLOW_TEST_DEFINITELY_UNSET".into(),
            ..RegistryConfig::default()
        };
        match cfg.resolve_root() {
            Err(PipelineError::MissingEnv(name)) => {
                assert_eq!(name, "PROMOFLOW_TEST_DEFINITELY_UNSET")
            }
            other => panic!("expected MissingEnv, got {other:?}"),
        }
    }

    #[test]
    fn test_load_config_from_explicit_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "pipeline_name = \"visa\"\n[ingestion]\ntest_ratio = 0.25\n[registry]\nmode = \"versioned\"\n",
        )
        .unwrap();
        let config = load_config(None, Some(&path)).unwrap();
        assert_eq!(config.pipeline_name, "visa");
        assert_eq!(config.ingestion.test_ratio, 0.25);
        assert_eq!(config.ingestion.seed, 42);
        assert_eq!(config.registry.mode, PromotionMode::Versioned);
    }

    #[test]
    fn test_config_serde_roundtrip() {
        let config = PipelineConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: PipelineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.registry.bucket, config.registry.bucket);
        assert_eq!(parsed.stage_timeout_secs, config.stage_timeout_secs);
    }
}
