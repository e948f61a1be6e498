//! Gaussian naive Bayes.

use crate::algorithms::Classifier;
use crate::algorithms::params::{self, Params};
use crate::data::labels::BinaryLabel;
use crate::error::PipelineError;
use crate::features::matrix::Matrix;
use serde::{Deserialize, Serialize};

/// Per-class Gaussian likelihood parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassStats {
    pub log_prior: f64,
    pub means: Vec<f64>,
    pub variances: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GaussianNb {
    /// Fraction of the largest feature variance added to every variance.
    pub var_smoothing: f64,
    /// Indexed by [`BinaryLabel::as_index`]. `None` for a class absent from
    /// the training data.
    #[serde(default)]
    pub classes: [Option<ClassStats>; 2],
}

impl GaussianNb {
    pub const FAMILY: &'static str = "gaussian_nb";

    pub fn from_params(p: &Params) -> Result<Self, PipelineError> {
        params::check_known(Self::FAMILY, p, &["var_smoothing"])?;
        let var_smoothing = params::get_f64(p, "var_smoothing", 1e-9)?;
        if var_smoothing < 0.0 {
            return Err(PipelineError::config("gaussian_nb: var_smoothing must be non-negative"));
        }
        Ok(Self {
            var_smoothing,
            classes: [None, None],
        })
    }

    fn joint_log_likelihood(stats: &ClassStats, row: &[f64]) -> f64 {
        let mut total = stats.log_prior;
        for ((x, mean), var) in row.iter().zip(&stats.means).zip(&stats.variances) {
            total -= 0.5 * (2.0 * std::f64::consts::PI * var).ln();
            total -= (x - mean).powi(2) / (2.0 * var);
        }
        total
    }
}

impl Classifier for GaussianNb {
    fn fit(&mut self, x: &Matrix, y: &[BinaryLabel]) -> Result<(), PipelineError> {
        if x.rows() == 0 {
            return Err(PipelineError::training("cannot fit on an empty matrix"));
        }
        let d = x.cols();
        let n = x.rows() as f64;

        let max_variance = (0..d)
            .map(|j| {
                let col = x.column(j);
                let mean = col.iter().sum::<f64>() / n;
                col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n
            })
            .fold(0.0f64, f64::max);
        let epsilon = (self.var_smoothing * max_variance).max(1e-12);

        let mut classes: [Option<ClassStats>; 2] = [None, None];
        for label in [BinaryLabel::Negative, BinaryLabel::Positive] {
            let rows: Vec<&[f64]> = x
                .iter_rows()
                .zip(y)
                .filter(|(_, l)| **l == label)
                .map(|(r, _)| r)
                .collect();
            if rows.is_empty() {
                continue;
            }
            let count = rows.len() as f64;
            let mut means = vec![0.0; d];
            for row in &rows {
                for (m, v) in means.iter_mut().zip(row.iter()) {
                    *m += v / count;
                }
            }
            let mut variances = vec![epsilon; d];
            for row in &rows {
                for ((var, v), m) in variances.iter_mut().zip(row.iter()).zip(&means) {
                    *var += (v - m).powi(2) / count;
                }
            }
            classes[label.as_index()] = Some(ClassStats {
                log_prior: (count / n).ln(),
                means,
                variances,
            });
        }
        self.classes = classes;
        Ok(())
    }

    fn predict_row(&self, row: &[f64]) -> BinaryLabel {
        let score = |idx: usize| {
            self.classes[idx]
                .as_ref()
                .map(|stats| Self::joint_log_likelihood(stats, row))
                .unwrap_or(f64::NEG_INFINITY)
        };
        if score(1) > score(0) {
            BinaryLabel::Positive
        } else {
            BinaryLabel::Negative
        }
    }
}
