//! Class-imbalance resampling: SMOTE oversampling followed by edited
//! nearest-neighbour cleaning.

use crate::data::labels::BinaryLabel;
use crate::error::PipelineError;
use crate::features::matrix::{LabeledData, Matrix};
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::info;

/// SMOTE + ENN resampler for a binary training set.
#[derive(Debug, Clone)]
pub struct SmoteEnn {
    pub smote_neighbors: usize,
    pub enn_neighbors: usize,
    pub seed: u64,
}

impl Default for SmoteEnn {
    fn default() -> Self {
        Self {
            smote_neighbors: 5,
            enn_neighbors: 3,
            seed: 42,
        }
    }
}

impl SmoteEnn {
    pub fn resample(&self, data: &LabeledData) -> Result<LabeledData, PipelineError> {
        let counts = data.class_counts();
        if counts[0] == 0 || counts[1] == 0 {
            return Err(PipelineError::transform(
                "training split contains a single class; cannot resample",
            ));
        }

        let oversampled = self.smote(data)?;
        let cleaned = self.enn(&oversampled);
        if cleaned.is_empty() {
            return Err(PipelineError::transform(
                "edited nearest neighbours removed every training row",
            ));
        }
        info!(
            before = ?counts,
            oversampled = oversampled.len(),
            after = ?cleaned.class_counts(),
            "Resampled training matrix"
        );
        Ok(cleaned)
    }

    /// Synthesize minority rows until both classes have the majority count.
    fn smote(&self, data: &LabeledData) -> Result<LabeledData, PipelineError> {
        let counts = data.class_counts();
        let (minority, deficit) = if counts[0] < counts[1] {
            (BinaryLabel::Negative, counts[1] - counts[0])
        } else {
            (BinaryLabel::Positive, counts[0] - counts[1])
        };
        if deficit == 0 {
            return Ok(data.clone());
        }

        let minority_idx: Vec<usize> = (0..data.len())
            .filter(|&i| data.labels[i] == minority)
            .collect();
        if minority_idx.len() < 2 {
            return Err(PipelineError::transform(format!(
                "need at least 2 minority samples to oversample, got {}",
                minority_idx.len()
            )));
        }
        let k = self.smote_neighbors.min(minority_idx.len() - 1).max(1);
        let minority_rows = data.features.select_rows(&minority_idx);
        let neighbors: Vec<Vec<usize>> = (0..minority_rows.rows())
            .map(|i| nearest_neighbors(&minority_rows, i, k))
            .collect();

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut features = data.features.clone();
        let mut labels = data.labels.clone();
        let mut synthetic = vec![0.0; features.cols()];
        for _ in 0..deficit {
            let i = rng.gen_range(0..minority_rows.rows());
            let j = neighbors[i][rng.gen_range(0..neighbors[i].len())];
            let gap: f64 = rng.gen_range(0.0..1.0);
            for (s, (a, b)) in synthetic
                .iter_mut()
                .zip(minority_rows.row(i).iter().zip(minority_rows.row(j)))
            {
                *s = a + gap * (b - a);
            }
            features.push_row(&synthetic)?;
            labels.push(minority);
        }
        LabeledData::new(features, labels)
    }

    /// Drop every row whose nearest neighbours include another class.
    fn enn(&self, data: &LabeledData) -> LabeledData {
        let k = self.enn_neighbors.min(data.len().saturating_sub(1));
        if k == 0 {
            return data.clone();
        }
        let keep: Vec<usize> = (0..data.len())
            .filter(|&i| {
                nearest_neighbors(&data.features, i, k)
                    .iter()
                    .all(|&j| data.labels[j] == data.labels[i])
            })
            .collect();
        data.select(&keep)
    }
}

/// Indices of the `k` rows closest to row `i`, excluding `i`. Ties go to
/// the lower index.
pub fn nearest_neighbors(matrix: &Matrix, i: usize, k: usize) -> Vec<usize> {
    let query = matrix.row(i);
    let mut distances: Vec<(f64, usize)> = (0..matrix.rows())
        .filter(|&j| j != i)
        .map(|j| (squared_distance(query, matrix.row(j)), j))
        .collect();
    let k = k.min(distances.len());
    if k == 0 {
        return Vec::new();
    }
    let by_distance = |a: &(f64, usize), b: &(f64, usize)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
    distances.select_nth_unstable_by(k - 1, by_distance);
    let mut nearest = distances[..k].to_vec();
    nearest.sort_by(by_distance);
    nearest.into_iter().map(|(_, j)| j).collect()
}

pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}
