//! Binary classifiers available to model search.

pub mod evaluation;
pub mod knn;
pub mod logistic;
pub mod naive_bayes;
pub mod params;
pub mod tree;

pub use evaluation::{CrossValidation, CrossValidationResult};
pub use knn::KNeighbors;
pub use logistic::LogisticRegression;
pub use naive_bayes::GaussianNb;
pub use params::Params;
pub use tree::DecisionTree;

use crate::data::labels::BinaryLabel;
use crate::error::PipelineError;
use crate::features::matrix::Matrix;
use serde::{Deserialize, Serialize};

/// A trainable binary classifier.
pub trait Classifier {
    fn fit(&mut self, x: &Matrix, y: &[BinaryLabel]) -> Result<(), PipelineError>;

    fn predict_row(&self, row: &[f64]) -> BinaryLabel;

    fn predict(&self, x: &Matrix) -> Vec<BinaryLabel> {
        x.iter_rows().map(|row| self.predict_row(row)).collect()
    }
}

/// Estimator families a model config may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorFamily {
    LogisticRegression,
    KNeighbors,
    DecisionTree,
    GaussianNb,
}

impl std::fmt::Display for EstimatorFamily {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::LogisticRegression => LogisticRegression::FAMILY,
            Self::KNeighbors => KNeighbors::FAMILY,
            Self::DecisionTree => DecisionTree::FAMILY,
            Self::GaussianNb => GaussianNb::FAMILY,
        };
        f.write_str(name)
    }
}

/// A configured (and possibly fitted) estimator of any family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum Estimator {
    LogisticRegression(LogisticRegression),
    KNeighbors(KNeighbors),
    DecisionTree(DecisionTree),
    GaussianNb(GaussianNb),
}

impl Estimator {
    /// Build an unfitted estimator, validating its hyperparameters.
    pub fn from_params(family: EstimatorFamily, params: &Params) -> Result<Self, PipelineError> {
        Ok(match family {
            EstimatorFamily::LogisticRegression => {
                Self::LogisticRegression(LogisticRegression::from_params(params)?)
            }
            EstimatorFamily::KNeighbors => Self::KNeighbors(KNeighbors::from_params(params)?),
            EstimatorFamily::DecisionTree => Self::DecisionTree(DecisionTree::from_params(params)?),
            EstimatorFamily::GaussianNb => Self::GaussianNb(GaussianNb::from_params(params)?),
        })
    }

    pub fn family(&self) -> EstimatorFamily {
        match self {
            Self::LogisticRegression(_) => EstimatorFamily::LogisticRegression,
            Self::KNeighbors(_) => EstimatorFamily::KNeighbors,
            Self::DecisionTree(_) => EstimatorFamily::DecisionTree,
            Self::GaussianNb(_) => EstimatorFamily::GaussianNb,
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            Self::LogisticRegression(m) => m,
            Self::KNeighbors(m) => m,
            Self::DecisionTree(m) => m,
            Self::GaussianNb(m) => m,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Classifier {
        match self {
            Self::LogisticRegression(m) => m,
            Self::KNeighbors(m) => m,
            Self::DecisionTree(m) => m,
            Self::GaussianNb(m) => m,
        }
    }
}

impl Classifier for Estimator {
    fn fit(&mut self, x: &Matrix, y: &[BinaryLabel]) -> Result<(), PipelineError> {
        if x.rows() != y.len() {
            return Err(PipelineError::training(format!(
                "{} rows but {} labels",
                x.rows(),
                y.len()
            )));
        }
        self.inner_mut().fit(x, y)
    }

    fn predict_row(&self, row: &[f64]) -> BinaryLabel {
        self.inner().predict_row(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_estimator_serde_carries_family_tag() {
        let params: Params = serde_json::from_value(json!({"n_neighbors": 3})).unwrap();
        let est = Estimator::from_params(EstimatorFamily::KNeighbors, &params).unwrap();
        let value = serde_json::to_value(&est).unwrap();
        assert_eq!(value["family"], "k_neighbors");
        let back: Estimator = serde_json::from_value(value).unwrap();
        assert_eq!(back, est);
        assert_eq!(back.family().to_string(), "k_neighbors");
    }

    #[test]
    fn test_fit_rejects_label_mismatch() {
        let mut est = Estimator::from_params(EstimatorFamily::GaussianNb, &Params::new()).unwrap();
        let x = Matrix::from_rows(&[vec![1.0], vec![2.0]]).unwrap();
        assert!(est.fit(&x, &[BinaryLabel::Negative]).is_err());
    }

    #[test]
    fn test_every_family_fits_and_predicts() {
        let rows: Vec<Vec<f64>> = (0..40).map(|i| vec![i as f64 / 10.0]).collect();
        let labels: Vec<BinaryLabel> = (0..40)
            .map(|i| BinaryLabel::from_index(usize::from(i >= 20)).unwrap())
            .collect();
        let x = Matrix::from_rows(&rows).unwrap();
        for family in [
            EstimatorFamily::LogisticRegression,
            EstimatorFamily::KNeighbors,
            EstimatorFamily::DecisionTree,
            EstimatorFamily::GaussianNb,
        ] {
            let mut est = Estimator::from_params(family, &Params::new()).unwrap();
            est.fit(&x, &labels).unwrap();
            assert_eq!(est.predict_row(&[0.1]), BinaryLabel::Negative, "{family}");
            assert_eq!(est.predict_row(&[3.9]), BinaryLabel::Positive, "{family}");
        }
    }
}
