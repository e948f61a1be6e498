//! Fixed bidirectional mapping between target values and binary labels.

use crate::error::PipelineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Encoded class of a binary target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryLabel {
    Negative,
    Positive,
}

impl BinaryLabel {
    pub fn as_index(self) -> usize {
        match self {
            Self::Negative => 0,
            Self::Positive => 1,
        }
    }

    pub fn as_f64(self) -> f64 {
        self.as_index() as f64
    }

    pub fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(Self::Negative),
            1 => Some(Self::Positive),
            _ => None,
        }
    }

    /// Decode a label stored in a matrix column. Anything but exactly 0 or 1
    /// means the matrix is corrupt.
    pub fn from_f64(value: f64) -> Option<Self> {
        if value == 0.0 {
            Some(Self::Negative)
        } else if value == 1.0 {
            Some(Self::Positive)
        } else {
            None
        }
    }
}

/// Bijection between the two declared target values and [`BinaryLabel`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelMapping {
    negative: String,
    positive: String,
}

impl LabelMapping {
    pub fn new(negative: impl Into<String>, positive: impl Into<String>) -> Result<Self, PipelineError> {
        let negative = negative.into();
        let positive = positive.into();
        if negative.trim().is_empty() || positive.trim().is_empty() {
            return Err(PipelineError::schema("target labels must be non-empty"));
        }
        if negative == positive {
            return Err(PipelineError::schema(format!(
                "target labels must be distinct, got '{negative}' twice"
            )));
        }
        Ok(Self { negative, positive })
    }

    /// Build from a declared label list `[negative, positive]`.
    pub fn from_declared(labels: &[String]) -> Result<Self, PipelineError> {
        match labels {
            [negative, positive] => Self::new(negative.clone(), positive.clone()),
            _ => Err(PipelineError::schema(format!(
                "exactly two target labels are required, got {}",
                labels.len()
            ))),
        }
    }

    pub fn encode_str(&self, value: &str) -> Option<BinaryLabel> {
        if value == self.negative {
            Some(BinaryLabel::Negative)
        } else if value == self.positive {
            Some(BinaryLabel::Positive)
        } else {
            None
        }
    }

    /// Encode a raw target cell. Unknown or null targets are an error.
    pub fn encode(&self, value: &Value) -> Result<BinaryLabel, PipelineError> {
        match value {
            Value::String(s) => self.encode_str(s),
            _ => None,
        }
        .ok_or_else(|| {
            PipelineError::dataset(format!(
                "target value {value} is not one of '{}', '{}'",
                self.negative, self.positive
            ))
        })
    }

    pub fn encode_all<'a, I>(&self, values: I) -> Result<Vec<BinaryLabel>, PipelineError>
    where
        I: IntoIterator<Item = &'a Value>,
    {
        values.into_iter().map(|v| self.encode(v)).collect()
    }

    pub fn decode(&self, label: BinaryLabel) -> &str {
        match label {
            BinaryLabel::Negative => &self.negative,
            BinaryLabel::Positive => &self.positive,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mapping_is_bijective() {
        let mapping = LabelMapping::new("Certified", "Denied").unwrap();
        for label in [BinaryLabel::Negative, BinaryLabel::Positive] {
            let raw = json!(mapping.decode(label));
            assert_eq!(mapping.encode(&raw).unwrap(), label);
        }
        assert_eq!(mapping.encode(&json!("Certified")).unwrap().as_index(), 0);
        assert_eq!(mapping.encode(&json!("Denied")).unwrap().as_index(), 1);
    }

    #[test]
    fn test_unknown_target_is_rejected() {
        let mapping = LabelMapping::new("no", "yes").unwrap();
        assert!(mapping.encode(&json!("maybe")).is_err());
        assert!(mapping.encode(&Value::Null).is_err());
    }

    #[test]
    fn test_declared_labels_are_validated() {
        assert!(LabelMapping::from_declared(&["a".into()]).is_err());
        assert!(LabelMapping::from_declared(&["a".into(), "a".into()]).is_err());
        assert!(LabelMapping::from_declared(&["a".into(), "b".into()]).is_ok());
    }

    #[test]
    fn test_label_from_f64() {
        assert_eq!(BinaryLabel::from_f64(1.0), Some(BinaryLabel::Positive));
        assert_eq!(BinaryLabel::from_f64(0.0), Some(BinaryLabel::Negative));
        assert_eq!(BinaryLabel::from_f64(0.5), None);
        assert_eq!(BinaryLabel::from_f64(f64::NAN), None);
    }
}
