//! k-nearest-neighbours classifier with Euclidean distance.

use crate::algorithms::Classifier;
use crate::algorithms::params::{self, Params};
use crate::data::labels::BinaryLabel;
use crate::error::PipelineError;
use crate::features::matrix::Matrix;
use crate::features::resample::squared_distance;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborWeights {
    Uniform,
    Distance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KNeighbors {
    pub n_neighbors: usize,
    pub weights: NeighborWeights,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub train_x: Option<Matrix>,
    #[serde(default)]
    pub train_y: Vec<BinaryLabel>,
}

impl KNeighbors {
    pub const FAMILY: &'static str = "k_neighbors";

    pub fn from_params(p: &Params) -> Result<Self, PipelineError> {
        params::check_known(Self::FAMILY, p, &["n_neighbors", "weights"])?;
        let n_neighbors = params::get_usize(p, "n_neighbors", 5)?;
        if n_neighbors == 0 {
            return Err(PipelineError::config("k_neighbors: n_neighbors must be positive"));
        }
        let weights = match params::get_str(p, "weights", "uniform")? {
            "uniform" => NeighborWeights::Uniform,
            "distance" => NeighborWeights::Distance,
            other => {
                return Err(PipelineError::config(format!(
                    "k_neighbors: unknown weights '{other}'"
                )));
            }
        };
        Ok(Self {
            n_neighbors,
            weights,
            train_x: None,
            train_y: Vec::new(),
        })
    }
}

impl Classifier for KNeighbors {
    fn fit(&mut self, x: &Matrix, y: &[BinaryLabel]) -> Result<(), PipelineError> {
        if x.rows() == 0 {
            return Err(PipelineError::training("cannot fit on an empty matrix"));
        }
        self.train_x = Some(x.clone());
        self.train_y = y.to_vec();
        Ok(())
    }

    fn predict_row(&self, row: &[f64]) -> BinaryLabel {
        let Some(train_x) = &self.train_x else {
            return BinaryLabel::Negative;
        };
        let mut distances: Vec<(f64, usize)> = train_x
            .iter_rows()
            .enumerate()
            .map(|(i, r)| (squared_distance(row, r), i))
            .collect();
        let k = self.n_neighbors.min(distances.len());
        let by_distance = |a: &(f64, usize), b: &(f64, usize)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
        distances.select_nth_unstable_by(k - 1, by_distance);

        let mut votes = [0.0f64; 2];
        for &(d2, i) in &distances[..k] {
            let weight = match self.weights {
                NeighborWeights::Uniform => 1.0,
                NeighborWeights::Distance => {
                    let d = d2.sqrt();
                    if d == 0.0 { 1e12 } else { 1.0 / d }
                }
            };
            votes[self.train_y[i].as_index()] += weight;
        }
        if votes[1] > votes[0] {
            BinaryLabel::Positive
        } else {
            BinaryLabel::Negative
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fitted(weights: &str, k: usize) -> KNeighbors {
        let params: Params =
            serde_json::from_value(json!({"n_neighbors": k, "weights": weights})).unwrap();
        let mut model = KNeighbors::from_params(&params).unwrap();
        let x = Matrix::from_rows(&[vec![0.0], vec![0.1], vec![0.2], vec![5.0], vec![5.1]])
            .unwrap();
        let y = [
            BinaryLabel::Negative,
            BinaryLabel::Negative,
            BinaryLabel::Negative,
            BinaryLabel::Positive,
            BinaryLabel::Positive,
        ];
        model.fit(&x, &y).unwrap();
        model
    }

    #[test]
    fn test_majority_vote() {
        let model = fitted("uniform", 3);
        assert_eq!(model.predict_row(&[0.05]), BinaryLabel::Negative);
        assert_eq!(model.predict_row(&[4.9]), BinaryLabel::Positive);
    }

    #[test]
    fn test_distance_weighting_favours_close_points() {
        // Uniform k=5 votes 3:2 for negative; distance weighting flips it.
        assert_eq!(fitted("uniform", 5).predict_row(&[5.05]), BinaryLabel::Negative);
        assert_eq!(fitted("distance", 5).predict_row(&[5.05]), BinaryLabel::Positive);
    }

    #[test]
    fn test_invalid_params() {
        let params: Params = serde_json::from_value(json!({"weights": "cosine"})).unwrap();
        assert!(KNeighbors::from_params(&params).is_err());
        let params: Params = serde_json::from_value(json!({"n_neighbors": 0})).unwrap();
        assert!(KNeighbors::from_params(&params).is_err());
    }
}
