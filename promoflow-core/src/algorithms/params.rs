//! Typed access to hyperparameter maps from the model config.

use crate::error::PipelineError;
use serde_json::Value;
use std::collections::BTreeMap;

/// Hyperparameters of one candidate, keyed by name.
pub type Params = BTreeMap<String, Value>;

/// Reject parameters the estimator does not understand.
pub fn check_known(family: &str, params: &Params, known: &[&str]) -> Result<(), PipelineError> {
    match params.keys().find(|k| !known.contains(&k.as_str())) {
        Some(unknown) => Err(PipelineError::config(format!(
            "{family}: unknown parameter '{unknown}' (expected one of {})",
            known.join(", ")
        ))),
        None => Ok(()),
    }
}

pub fn get_f64(params: &Params, name: &str, default: f64) -> Result<f64, PipelineError> {
    match params.get(name) {
        None => Ok(default),
        Some(v) => v
            .as_f64()
            .filter(|x| x.is_finite())
            .ok_or_else(|| invalid(name, v, "a finite number")),
    }
}

pub fn get_usize(params: &Params, name: &str, default: usize) -> Result<usize, PipelineError> {
    match params.get(name) {
        None => Ok(default),
        Some(v) => v
            .as_u64()
            .map(|x| x as usize)
            .ok_or_else(|| invalid(name, v, "a non-negative integer")),
    }
}

/// Optional integer; `null` means unbounded.
pub fn get_opt_usize(
    params: &Params,
    name: &str,
    default: Option<usize>,
) -> Result<Option<usize>, PipelineError> {
    match params.get(name) {
        None => Ok(default),
        Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|x| Some(x as usize))
            .ok_or_else(|| invalid(name, v, "a non-negative integer or null")),
    }
}

pub fn get_str<'a>(params: &'a Params, name: &str, default: &'a str) -> Result<&'a str, PipelineError> {
    match params.get(name) {
        None => Ok(default),
        Some(v) => v.as_str().ok_or_else(|| invalid(name, v, "a string")),
    }
}

pub fn get_bool(params: &Params, name: &str, default: bool) -> Result<bool, PipelineError> {
    match params.get(name) {
        None => Ok(default),
        Some(v) => v.as_bool().ok_or_else(|| invalid(name, v, "a boolean")),
    }
}

fn invalid(name: &str, value: &Value, expected: &str) -> PipelineError {
    PipelineError::config(format!("parameter '{name}' must be {expected}, got {value}"))
}
