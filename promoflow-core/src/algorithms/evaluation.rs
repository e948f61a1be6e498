//! Cross-validated scoring of candidate estimators.

use crate::algorithms::{Classifier, Estimator};
use crate::data::labels::BinaryLabel;
use crate::error::PipelineError;
use crate::features::matrix::LabeledData;
use crate::training::metrics::accuracy;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Cross-validation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossValidation {
    pub n_folds: usize,
    pub stratified: bool,
    pub shuffle: bool,
    pub random_state: Option<u64>,
}

impl Default for CrossValidation {
    fn default() -> Self {
        Self {
            n_folds: 3,
            stratified: true,
            shuffle: true,
            random_state: Some(42),
        }
    }
}

/// Cross-validation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationResult {
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
    pub metric_name: String,
}

impl CrossValidationResult {
    pub fn from_scores(scores: Vec<f64>, metric_name: &str) -> Self {
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
        Self {
            fold_scores: scores,
            mean_score: mean,
            std_score: variance.sqrt(),
            metric_name: metric_name.to_string(),
        }
    }
}

impl CrossValidation {
    /// Assign every row to a fold. Stratified assignment deals each class
    /// round-robin so both classes spread evenly across folds.
    pub fn fold_assignment(&self, labels: &[BinaryLabel]) -> Vec<usize> {
        let mut rng = StdRng::seed_from_u64(self.random_state.unwrap_or(0));
        let mut folds = vec![0; labels.len()];
        let groups: Vec<Vec<usize>> = if self.stratified {
            [BinaryLabel::Negative, BinaryLabel::Positive]
                .iter()
                .map(|c| (0..labels.len()).filter(|&i| labels[i] == *c).collect())
                .collect()
        } else {
            vec![(0..labels.len()).collect()]
        };

        let mut offset = 0;
        for mut group in groups {
            if self.shuffle {
                group.shuffle(&mut rng);
            }
            for (pos, &i) in group.iter().enumerate() {
                folds[i] = (offset + pos) % self.n_folds;
            }
            offset += group.len();
        }
        folds
    }

    /// Mean held-out accuracy of `template` across the folds. The template
    /// itself is never fitted.
    pub fn score(
        &self,
        template: &Estimator,
        data: &LabeledData,
    ) -> Result<CrossValidationResult, PipelineError> {
        if self.n_folds < 2 {
            return Err(PipelineError::config("cross-validation needs at least 2 folds"));
        }
        if data.len() < self.n_folds {
            return Err(PipelineError::training(format!(
                "{} rows cannot be split into {} folds",
                data.len(),
                self.n_folds
            )));
        }

        let folds = self.fold_assignment(&data.labels);
        let mut scores = Vec::with_capacity(self.n_folds);
        for fold in 0..self.n_folds {
            let (held_out, train): (Vec<usize>, Vec<usize>) =
                (0..data.len()).partition(|&i| folds[i] == fold);
            let train = data.select(&train);
            let held_out = data.select(&held_out);

            let mut model = template.clone();
            model.fit(&train.features, &train.labels)?;
            let predictions = model.predict(&held_out.features);
            scores.push(accuracy(&held_out.labels, &predictions));
        }
        Ok(CrossValidationResult::from_scores(scores, "accuracy"))
    }
}
