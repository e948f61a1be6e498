//! Row-partitioned tabular data with JSON Lines persistence.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::io::Write;
use std::path::Path;

/// A single document-store record.
pub type Record = serde_json::Map<String, Value>;

/// Key under which categorical nulls are grouped.
pub const MISSING_CATEGORY: &str = "__missing__";

/// A batch of rows sharing one column list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataFrame {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl DataFrame {
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Build a frame from records. The column list is the union of all keys;
    /// keys absent from a record become nulls.
    pub fn from_records(records: &[Record]) -> Self {
        let mut seen = BTreeSet::new();
        let mut columns = Vec::new();
        for record in records {
            for key in record.keys() {
                if seen.insert(key.clone()) {
                    columns.push(key.clone());
                }
            }
        }
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                    .collect()
            })
            .collect();
        Self { columns, rows }
    }

    pub fn to_records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .cloned()
                    .zip(row.iter().cloned())
                    .collect()
            })
            .collect()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Values of one column, or an error naming the missing column.
    pub fn column(&self, name: &str) -> Result<Vec<&Value>, PipelineError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| PipelineError::dataset(format!("column '{name}' not found")))?;
        Ok(self
            .rows
            .iter()
            .map(|row| row.get(idx).unwrap_or(&Value::Null))
            .collect())
    }

    /// Remove a column, returning its values.
    pub fn take_column(&mut self, name: &str) -> Result<Vec<Value>, PipelineError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| PipelineError::dataset(format!("column '{name}' not found")))?;
        self.columns.remove(idx);
        Ok(self
            .rows
            .iter_mut()
            .map(|row| {
                if idx < row.len() {
                    row.remove(idx)
                } else {
                    Value::Null
                }
            })
            .collect())
    }

    /// Append a column (replacing an existing one of the same name).
    pub fn set_column(&mut self, name: &str, values: Vec<Value>) -> Result<(), PipelineError> {
        if values.len() != self.rows.len() {
            return Err(PipelineError::dataset(format!(
                "column '{name}' has {} values for {} rows",
                values.len(),
                self.rows.len()
            )));
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_string());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    /// A new frame holding the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> Self {
        Self {
            columns: self.columns.clone(),
            rows: indices
                .iter()
                .filter_map(|&i| self.rows.get(i).cloned())
                .collect(),
        }
    }

    /// Write the frame as JSON Lines, one record per line.
    pub fn write_jsonl(&self, path: &Path) -> Result<(), PipelineError> {
        let mut buf = Vec::new();
        for record in self.to_records() {
            serde_json::to_writer(&mut buf, &record)?;
            buf.write_all(b"\n")?;
        }
        crate::persistence::atomic_write(path, &buf)?;
        Ok(())
    }

    pub fn read_jsonl(path: &Path) -> Result<Self, PipelineError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::dataset(format!("failed to read {}: {e}", path.display()))
        })?;
        let mut records = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let record: Record = serde_json::from_str(line).map_err(|e| {
                PipelineError::dataset(format!(
                    "{}:{}: malformed record: {e}",
                    path.display(),
                    line_no + 1
                ))
            })?;
            records.push(record);
        }
        Ok(Self::from_records(&records))
    }
}

/// Interpret a cell as a number. Nulls yield `Ok(None)`.
pub fn numeric_value(value: &Value) -> Result<Option<f64>, String> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("unrepresentable number {n}")),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }
            trimmed
                .parse::<f64>()
                .map(Some)
                .map_err(|_| format!("non-numeric value '{s}'"))
        }
        Value::Bool(b) => Ok(Some(if *b { 1.0 } else { 0.0 })),
        other => Err(format!("non-numeric value {other}")),
    }
}

/// Interpret a cell as a category key.
pub fn category_key(value: &Value) -> String {
    match value {
        Value::Null => MISSING_CATEGORY.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
