//! Column encoders fitted on training data only.

use crate::data::frame::{category_key, numeric_value};
use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;

/// Value emitted by the ordinal encoder for a category unseen during fit.
pub const UNKNOWN_ORDINAL: f64 = -1.0;

const LAMBDA_BOUNDS: (f64, f64) = (-2.0, 2.0);

// ---------------------------------------------------------------------------
// One-hot
// ---------------------------------------------------------------------------

/// Indicator columns for a nominal feature. Unseen categories encode as all
/// zeros.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    pub column: String,
    pub categories: Vec<String>,
}

impl OneHotEncoder {
    pub fn fit(column: &str, values: &[&Value]) -> Self {
        let categories: BTreeSet<String> = values.iter().map(|v| category_key(v)).collect();
        Self {
            column: column.to_string(),
            categories: categories.into_iter().collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.categories.len()
    }

    pub fn encode_into(&self, value: &Value, out: &mut Vec<f64>) {
        let key = category_key(value);
        let hit = self.categories.binary_search(&key).ok();
        out.extend((0..self.width()).map(|i| if Some(i) == hit { 1.0 } else { 0.0 }));
    }

    pub fn feature_names(&self) -> impl Iterator<Item = String> + '_ {
        self.categories
            .iter()
            .map(|c| format!("{}={c}", self.column))
    }
}

// ---------------------------------------------------------------------------
// Ordinal
// ---------------------------------------------------------------------------

/// Maps each category to its rank in sorted order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrdinalEncoder {
    pub column: String,
    pub categories: Vec<String>,
}

impl OrdinalEncoder {
    pub fn fit(column: &str, values: &[&Value]) -> Self {
        let categories: BTreeSet<String> = values.iter().map(|v| category_key(v)).collect();
        Self {
            column: column.to_string(),
            categories: categories.into_iter().collect(),
        }
    }

    pub fn encode(&self, value: &Value) -> f64 {
        let key = category_key(value);
        match self.categories.binary_search(&key) {
            Ok(rank) => rank as f64,
            Err(_) => UNKNOWN_ORDINAL,
        }
    }
}

// ---------------------------------------------------------------------------
// Yeo-Johnson power transform + standardization
// ---------------------------------------------------------------------------

/// Median imputation, Yeo-Johnson power transform and standardization for
/// one numeric feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PowerScaler {
    pub column: String,
    pub median: f64,
    pub lambda: f64,
    pub mean: f64,
    pub std: f64,
}

impl PowerScaler {
    pub fn fit(column: &str, values: &[&Value]) -> Result<Self, PipelineError> {
        let mut observed = Vec::with_capacity(values.len());
        for value in values {
            if let Some(v) = parse_numeric(column, value)? {
                observed.push(v);
            }
        }
        if observed.is_empty() {
            return Err(PipelineError::transform(format!(
                "numeric column '{column}' has no values to fit"
            )));
        }

        let median = median(&observed);
        let filled: Vec<f64> = values
            .iter()
            .map(|v| parse_numeric(column, v).map(|x| x.unwrap_or(median)))
            .collect::<Result<_, _>>()?;

        let lambda = fit_lambda(&filled);
        let transformed: Vec<f64> = filled.iter().map(|&x| yeo_johnson(x, lambda)).collect();
        let (mean, variance) = mean_variance(&transformed);
        let std = variance.sqrt();
        let std = if std > 1e-12 && std.is_finite() { std } else { 1.0 };

        Ok(Self {
            column: column.to_string(),
            median,
            lambda,
            mean,
            std,
        })
    }

    pub fn transform(&self, value: &Value) -> Result<f64, PipelineError> {
        let x = parse_numeric(&self.column, value)?.unwrap_or(self.median);
        Ok((yeo_johnson(x, self.lambda) - self.mean) / self.std)
    }
}

fn parse_numeric(column: &str, value: &Value) -> Result<Option<f64>, PipelineError> {
    match numeric_value(value) {
        Ok(Some(v)) if v.is_finite() => Ok(Some(v)),
        Ok(_) => Ok(None),
        Err(e) => Err(PipelineError::transform(format!("column '{column}': {e}"))),
    }
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

fn mean_variance(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
    (mean, variance)
}

/// Yeo-Johnson transform of a single value.
pub fn yeo_johnson(x: f64, lambda: f64) -> f64 {
    const EPS: f64 = 1e-12;
    if x >= 0.0 {
        if lambda.abs() < EPS {
            x.ln_1p()
        } else {
            ((x + 1.0).powf(lambda) - 1.0) / lambda
        }
    } else if (lambda - 2.0).abs() < EPS {
        -(-x).ln_1p()
    } else {
        -((1.0 - x).powf(2.0 - lambda) - 1.0) / (2.0 - lambda)
    }
}

/// Profile log-likelihood of the Yeo-Johnson transform at `lambda`.
fn log_likelihood(values: &[f64], lambda: f64) -> f64 {
    let n = values.len() as f64;
    let transformed: Vec<f64> = values.iter().map(|&x| yeo_johnson(x, lambda)).collect();
    let (_, variance) = mean_variance(&transformed);
    if variance <= 0.0 || !variance.is_finite() {
        return f64::NEG_INFINITY;
    }
    let jacobian: f64 = values.iter().map(|x| x.signum() * x.abs().ln_1p()).sum();
    -0.5 * n * variance.ln() + (lambda - 1.0) * jacobian
}

/// Maximum-likelihood lambda by golden-section search. Constant columns keep
/// the identity transform.
fn fit_lambda(values: &[f64]) -> f64 {
    let first = values[0];
    if values.iter().all(|&v| v == first) {
        return 1.0;
    }

    let golden = (5f64.sqrt() - 1.0) / 2.0;
    let (mut a, mut b) = LAMBDA_BOUNDS;
    let mut c = b - golden * (b - a);
    let mut d = a + golden * (b - a);
    let mut fc = log_likelihood(values, c);
    let mut fd = log_likelihood(values, d);
    for _ in 0..100 {
        if (b - a).abs() < 1e-6 {
            break;
        }
        if fc > fd {
            b = d;
            d = c;
            fd = fc;
            c = b - golden * (b - a);
            fc = log_likelihood(values, c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + golden * (b - a);
            fd = log_likelihood(values, d);
        }
    }
    (a + b) / 2.0
}
