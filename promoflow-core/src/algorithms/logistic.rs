//! L2-regularized logistic regression trained by batch gradient descent.

use crate::algorithms::Classifier;
use crate::algorithms::params::{self, Params};
use crate::data::labels::BinaryLabel;
use crate::error::PipelineError;
use crate::features::matrix::Matrix;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    pub learning_rate: f64,
    pub max_iter: usize,
    /// L2 penalty strength.
    pub alpha: f64,
    pub tolerance: f64,
    #[serde(default)]
    pub weights: Vec<f64>,
    #[serde(default)]
    pub bias: f64,
}

impl LogisticRegression {
    pub const FAMILY: &'static str = "logistic_regression";

    pub fn from_params(p: &Params) -> Result<Self, PipelineError> {
        params::check_known(
            Self::FAMILY,
            p,
            &["learning_rate", "max_iter", "alpha", "tolerance"],
        )?;
        let model = Self {
            learning_rate: params::get_f64(p, "learning_rate", 0.1)?,
            max_iter: params::get_usize(p, "max_iter", 300)?,
            alpha: params::get_f64(p, "alpha", 1e-4)?,
            tolerance: params::get_f64(p, "tolerance", 1e-6)?,
            weights: Vec::new(),
            bias: 0.0,
        };
        if model.learning_rate <= 0.0 || model.alpha < 0.0 {
            return Err(PipelineError::config(
                "logistic_regression: learning_rate must be positive and alpha non-negative",
            ));
        }
        Ok(model)
    }

    pub fn probability(&self, row: &[f64]) -> f64 {
        let z: f64 = self.bias + row.iter().zip(&self.weights).map(|(x, w)| x * w).sum::<f64>();
        sigmoid(z)
    }
}

fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

impl Classifier for LogisticRegression {
    fn fit(&mut self, x: &Matrix, y: &[BinaryLabel]) -> Result<(), PipelineError> {
        if x.rows() == 0 {
            return Err(PipelineError::training("cannot fit on an empty matrix"));
        }
        let n = x.rows() as f64;
        let d = x.cols();
        self.weights = vec![0.0; d];
        self.bias = 0.0;

        let mut grad = vec![0.0; d];
        for _ in 0..self.max_iter {
            grad.iter_mut().for_each(|g| *g = 0.0);
            let mut grad_bias = 0.0;
            for (row, label) in x.iter_rows().zip(y) {
                let err = self.probability(row) - label.as_f64();
                for (g, xi) in grad.iter_mut().zip(row) {
                    *g += err * xi;
                }
                grad_bias += err;
            }

            let mut step_norm = 0.0;
            for (w, g) in self.weights.iter_mut().zip(&grad) {
                let step = self.learning_rate * (g / n + self.alpha * *w);
                *w -= step;
                step_norm += step * step;
            }
            let bias_step = self.learning_rate * grad_bias / n;
            self.bias -= bias_step;
            step_norm += bias_step * bias_step;

            if step_norm.sqrt() < self.tolerance {
                break;
            }
        }
        Ok(())
    }

    fn predict_row(&self, row: &[f64]) -> BinaryLabel {
        if self.probability(row) >= 0.5 {
            BinaryLabel::Positive
        } else {
            BinaryLabel::Negative
        }
    }
}
