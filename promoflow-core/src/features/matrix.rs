//! Dense row-major feature matrices and their labeled form.

use crate::data::labels::BinaryLabel;
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Dense row-major matrix of `f64`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self, PipelineError> {
        if data.len() != rows * cols {
            return Err(PipelineError::dataset(format!(
                "matrix shape {rows}x{cols} does not match {} values",
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// An empty matrix with a fixed column count, filled by [`Matrix::push_row`].
    pub fn with_cols(cols: usize) -> Self {
        Self {
            rows: 0,
            cols,
            data: Vec::new(),
        }
    }

    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, PipelineError> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        let mut matrix = Self::with_cols(cols);
        for row in rows {
            matrix.push_row(row)?;
        }
        Ok(matrix)
    }

    pub fn push_row(&mut self, row: &[f64]) -> Result<(), PipelineError> {
        if row.len() != self.cols {
            return Err(PipelineError::dataset(format!(
                "row has {} values, matrix has {} columns",
                row.len(),
                self.cols
            )));
        }
        self.data.extend_from_slice(row);
        self.rows += 1;
        Ok(())
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f64]> {
        (0..self.rows).map(move |i| self.row(i))
    }

    pub fn column(&self, j: usize) -> Vec<f64> {
        self.iter_rows().map(|r| r[j]).collect()
    }

    pub fn select_rows(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(indices.len() * self.cols);
        for &i in indices {
            data.extend_from_slice(self.row(i));
        }
        Self {
            rows: indices.len(),
            cols: self.cols,
            data,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        crate::persistence::atomic_write_json(path, self)?;
        Ok(())
    }

    /// Load a matrix, rejecting missing, empty or inconsistent files.
    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let matrix: Self = crate::persistence::load_required_json(path)?;
        if matrix.data.len() != matrix.rows * matrix.cols {
            return Err(PipelineError::dataset(format!(
                "corrupt matrix {}: shape {}x{} with {} values",
                path.display(),
                matrix.rows,
                matrix.cols,
                matrix.data.len()
            )));
        }
        if matrix.is_empty() {
            return Err(PipelineError::dataset(format!(
                "matrix {} is empty",
                path.display()
            )));
        }
        Ok(matrix)
    }
}

/// Features plus one binary label per row.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledData {
    pub features: Matrix,
    pub labels: Vec<BinaryLabel>,
}

impl LabeledData {
    pub fn new(features: Matrix, labels: Vec<BinaryLabel>) -> Result<Self, PipelineError> {
        if features.rows() != labels.len() {
            return Err(PipelineError::dataset(format!(
                "{} feature rows but {} labels",
                features.rows(),
                labels.len()
            )));
        }
        Ok(Self { features, labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// `[negative, positive]` counts.
    pub fn class_counts(&self) -> [usize; 2] {
        let mut counts = [0, 0];
        for label in &self.labels {
            counts[label.as_index()] += 1;
        }
        counts
    }

    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            features: self.features.select_rows(indices),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    /// Features with the label appended as the last column.
    pub fn to_matrix(&self) -> Matrix {
        let cols = self.features.cols() + 1;
        let mut data = Vec::with_capacity(self.len() * cols);
        for (row, label) in self.features.iter_rows().zip(&self.labels) {
            data.extend_from_slice(row);
            data.push(label.as_f64());
        }
        Matrix {
            rows: self.len(),
            cols,
            data,
        }
    }

    /// Split off the last column as labels. Any label other than 0 or 1
    /// marks the matrix as corrupt.
    pub fn from_matrix(matrix: &Matrix) -> Result<Self, PipelineError> {
        if matrix.cols() < 2 {
            return Err(PipelineError::dataset(format!(
                "labeled matrix needs at least 2 columns, got {}",
                matrix.cols()
            )));
        }
        let width = matrix.cols() - 1;
        let mut features = Matrix::with_cols(width);
        let mut labels = Vec::with_capacity(matrix.rows());
        for (i, row) in matrix.iter_rows().enumerate() {
            let raw = row[width];
            let label = BinaryLabel::from_f64(raw).ok_or_else(|| {
                PipelineError::dataset(format!("row {i} has invalid label {raw}"))
            })?;
            features.push_row(&row[..width])?;
            labels.push(label);
        }
        Ok(Self { features, labels })
    }
}
