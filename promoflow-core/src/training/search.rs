//! Grid search over declared estimator families with cross-validated scoring.

use crate::algorithms::{Classifier, CrossValidation, CrossValidationResult, Estimator, EstimatorFamily, Params};
use crate::error::PipelineError;
use crate::features::matrix::LabeledData;
use crate::training::metrics::ClassificationMetrics;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

/// One declared candidate family with fixed params and a grid to expand.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateSpec {
    pub family: EstimatorFamily,
    #[serde(default)]
    pub params: Params,
    /// Parameter name to the values to try. Keys expand in sorted order.
    #[serde(default)]
    pub grid: BTreeMap<String, Vec<Value>>,
}

impl CandidateSpec {
    /// Cartesian product of the grid, each merged over the fixed params.
    pub fn expand(&self) -> Vec<Params> {
        let mut configs = vec![self.params.clone()];
        for (key, values) in &self.grid {
            let mut next = Vec::with_capacity(configs.len() * values.len());
            for config in &configs {
                for value in values {
                    let mut c = config.clone();
                    c.insert(key.clone(), value.clone());
                    next.push(c);
                }
            }
            configs = next;
        }
        configs
    }
}

/// Model search configuration, loaded from YAML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSearchConfig {
    /// Minimum acceptable cross-validated accuracy.
    #[serde(default = "default_expected_min_score")]
    pub expected_min_score: f64,
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
    /// Parallel candidate evaluations. Defaults to the available cores.
    #[serde(default)]
    pub max_workers: Option<usize>,
    #[serde(default = "default_search_seed")]
    pub seed: u64,
    pub candidates: Vec<CandidateSpec>,
}

fn default_expected_min_score() -> f64 {
    0.6
}

fn default_cv_folds() -> usize {
    3
}

fn default_search_seed() -> u64 {
    42
}

impl ModelSearchConfig {
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let config: Self = crate::persistence::load_yaml(path)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.candidates.is_empty() {
            return Err(PipelineError::config("model config declares no candidates"));
        }
        if self.cv_folds < 2 {
            return Err(PipelineError::config("cv_folds must be at least 2"));
        }
        if !(0.0..=1.0).contains(&self.expected_min_score) {
            return Err(PipelineError::config(format!(
                "expected_min_score must be in [0, 1], got {}",
                self.expected_min_score
            )));
        }
        for spec in &self.candidates {
            if let Some((key, _)) = spec.grid.iter().find(|(_, values)| values.is_empty()) {
                return Err(PipelineError::config(format!(
                    "{}: grid for '{key}' is empty",
                    spec.family
                )));
            }
        }
        self.grid_points().map(|_| ())
    }

    /// Every grid point in declaration order, built and validated.
    pub fn grid_points(&self) -> Result<Vec<GridPoint>, PipelineError> {
        let mut points = Vec::new();
        for spec in &self.candidates {
            for params in spec.expand() {
                let estimator = Estimator::from_params(spec.family, &params)?;
                let name = format!(
                    "{} {}",
                    spec.family,
                    serde_json::to_string(&params).unwrap_or_default()
                );
                points.push(GridPoint {
                    index: points.len(),
                    name,
                    params,
                    estimator,
                });
            }
        }
        Ok(points)
    }
}

/// A single expanded candidate.
#[derive(Debug, Clone)]
pub struct GridPoint {
    pub index: usize,
    pub name: String,
    pub params: Params,
    pub estimator: Estimator,
}

/// Leaderboard row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub index: usize,
    pub name: String,
    pub family: EstimatorFamily,
    pub params: Params,
    pub cv: CrossValidationResult,
}

/// Winner of a search, refit on the full training matrix.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub estimator: Estimator,
    pub best: CandidateScore,
    pub leaderboard: Vec<CandidateScore>,
    pub test_metrics: ClassificationMetrics,
}

pub struct ModelSearch {
    config: ModelSearchConfig,
    cancel: CancellationToken,
}

impl ModelSearch {
    pub fn new(config: ModelSearchConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Candidates not yet started are skipped once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &ModelSearchConfig {
        &self.config
    }

    fn max_workers(&self) -> usize {
        self.config
            .max_workers
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }

    /// Score every grid point, pick the best (ties go to the earliest
    /// declared), enforce the floor, refit and evaluate on `test`.
    #[instrument(skip_all, fields(floor = expected_min_score))]
    pub async fn search(
        &self,
        train: Arc<LabeledData>,
        test: &LabeledData,
        expected_min_score: f64,
    ) -> Result<SearchOutcome, PipelineError> {
        let points = self.config.grid_points()?;
        let cv = CrossValidation {
            n_folds: self.config.cv_folds,
            random_state: Some(self.config.seed),
            ..CrossValidation::default()
        };
        let workers = self.max_workers();
        info!(candidates = points.len(), workers, "Starting model search");

        let semaphore = Arc::new(Semaphore::new(workers));
        let mut handles = Vec::with_capacity(points.len());
        for point in &points {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| PipelineError::training(format!("worker pool closed: {e}")))?;
            let cv = cv.clone();
            let train = Arc::clone(&train);
            let estimator = point.estimator.clone();
            let cancel = self.cancel.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                let _permit = permit;
                if cancel.is_cancelled() {
                    return Err(PipelineError::Cancelled("model search abandoned".into()));
                }
                cv.score(&estimator, &train)
            }));
        }

        let mut leaderboard = Vec::with_capacity(points.len());
        for (point, handle) in points.iter().zip(handles) {
            let result = handle
                .await
                .map_err(|e| PipelineError::training(format!("candidate task failed: {e}")))??;
            debug!(candidate = %point.name, score = result.mean_score, "Scored candidate");
            leaderboard.push(CandidateScore {
                index: point.index,
                name: point.name.clone(),
                family: point.estimator.family(),
                params: point.params.clone(),
                cv: result,
            });
        }

        let best = select_best(&leaderboard)
            .ok_or_else(|| PipelineError::training("no candidate produced a score"))?
            .clone();
        if best.cv.mean_score < expected_min_score {
            return Err(PipelineError::BelowFloor {
                best: best.cv.mean_score,
                floor: expected_min_score,
            });
        }
        info!(candidate = %best.name, score = best.cv.mean_score, "Selected best candidate");

        let mut estimator = points[best.index].estimator.clone();
        let refit_data = Arc::clone(&train);
        let estimator = tokio::task::spawn_blocking(move || {
            estimator.fit(&refit_data.features, &refit_data.labels)?;
            Ok::<_, PipelineError>(estimator)
        })
        .await
        .map_err(|e| PipelineError::training(format!("refit task failed: {e}")))??;

        let predictions = estimator.predict(&test.features);
        let test_metrics = ClassificationMetrics::compute(&test.labels, &predictions);
        Ok(SearchOutcome {
            estimator,
            best,
            leaderboard,
            test_metrics,
        })
    }
}

/// Highest mean score; the earliest entry wins ties. NaN scores never win.
pub fn select_best(scores: &[CandidateScore]) -> Option<&CandidateScore> {
    let mut best: Option<&CandidateScore> = None;
    for score in scores {
        if score.cv.mean_score.is_nan() {
            continue;
        }
        if best.is_none_or(|b| score.cv.mean_score > b.cv.mean_score) {
            best = Some(score);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::labels::BinaryLabel;
    use crate::features::matrix::Matrix;
    use serde_json::json;

    const MODEL_YAML: &str = r#"
expected_min_score: 0.6
cv_folds: 3
max_workers: 2
candidates:
  - family: gaussian_nb
  - family: k_neighbors
    params:
      weights: uniform
    grid:
      n_neighbors: [1, 3]
  - family: decision_tree
    grid:
      max_depth: [1, 3]
      criterion: [gini, entropy]
"#;

    fn config() -> ModelSearchConfig {
        serde_yaml::from_str(MODEL_YAML).unwrap()
    }

    fn separable(n: usize) -> LabeledData {
        let rows: Vec<Vec<f64>> = (0..n).map(|i| vec![i as f64, (i % 3) as f64]).collect();
        let labels = (0..n)
            .map(|i| BinaryLabel::from_index(usize::from(i >= n / 2)).unwrap())
            .collect();
        LabeledData::new(Matrix::from_rows(&rows).unwrap(), labels).unwrap()
    }

    fn score(index: usize, mean: f64) -> CandidateScore {
        CandidateScore {
            index,
            name: format!("c{index}"),
            family: EstimatorFamily::GaussianNb,
            params: Params::new(),
            cv: CrossValidationResult::from_scores(vec![mean], "accuracy"),
        }
    }

    #[test]
    fn test_grid_expansion_order() {
        let points = config().grid_points().unwrap();
        let names: Vec<&str> = points.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(points.len(), 1 + 2 + 4);
        assert_eq!(names[0], "gaussian_nb {}");
        assert_eq!(names[1], r#"k_neighbors {"n_neighbors":1,"weights":"uniform"}"#);
        // criterion sorts before max_depth, so max_depth varies fastest.
        assert_eq!(points[3].params["criterion"], json!("gini"));
        assert_eq!(points[3].params["max_depth"], json!(1));
        assert_eq!(points[4].params["max_depth"], json!(3));
        assert_eq!(points[5].params["criterion"], json!("entropy"));
    }

    #[test]
    fn test_config_validation() {
        let mut bad = config();
        bad.candidates[1].grid.insert("n_neighbors".into(), vec![]);
        assert!(bad.validate().is_err());

        let mut bad = config();
        bad.candidates[0].params.insert("bogus".into(), json!(1));
        assert!(bad.validate().is_err());

        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_ties_go_to_first_declared() {
        let scores = vec![score(0, 0.7), score(1, 0.9), score(2, 0.9), score(3, f64::NAN)];
        assert_eq!(select_best(&scores).unwrap().index, 1);
        assert!(select_best(&[]).is_none());
    }

    #[tokio::test]
    async fn test_search_picks_and_refits_winner() {
        let search = ModelSearch::new(config());
        let data = separable(90);
        let test = data.select(&(0..90).step_by(3).collect::<Vec<_>>());
        let outcome = search.search(Arc::new(data), &test, 0.6).await.unwrap();
        assert_eq!(outcome.leaderboard.len(), 7);
        assert!(outcome.best.cv.mean_score >= 0.9);
        assert!(outcome.test_metrics.accuracy >= 0.9);
        let top = outcome
            .leaderboard
            .iter()
            .map(|s| s.cv.mean_score)
            .fold(f64::MIN, f64::max);
        assert_eq!(outcome.best.cv.mean_score, top);
    }

    #[tokio::test]
    async fn test_search_is_deterministic() {
        let search = ModelSearch::new(config());
        let a = search
            .search(Arc::new(separable(60)), &separable(20), 0.0)
            .await
            .unwrap();
        let b = search
            .search(Arc::new(separable(60)), &separable(20), 0.0)
            .await
            .unwrap();
        assert_eq!(a.leaderboard, b.leaderboard);
        assert_eq!(a.best.index, b.best.index);
    }

    #[tokio::test]
    async fn test_below_floor_is_fatal() {
        // Constant features with alternating labels: nothing beats 0.5.
        let rows = vec![vec![1.0]; 60];
        let labels = (0..60)
            .map(|i| BinaryLabel::from_index(i % 2).unwrap())
            .collect();
        let train = LabeledData::new(Matrix::from_rows(&rows).unwrap(), labels).unwrap();
        let search = ModelSearch::new(config());
        let err = search
            .search(Arc::new(train.clone()), &train, 0.6)
            .await
            .unwrap_err();
        match err {
            PipelineError::BelowFloor { best, floor } => {
                assert!(best < 0.6);
                assert_eq!(floor, 0.6);
            }
            other => panic!("expected BelowFloor, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancelled_search_skips_candidates() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let search = ModelSearch::new(config()).with_cancellation(cancel);
        let err = search
            .search(Arc::new(separable(60)), &separable(20), 0.0)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled(_)));
    }
}
