//! Composite model consuming raw rows end to end.

use crate::algorithms::{Classifier, Estimator};
use crate::data::frame::DataFrame;
use crate::data::labels::{BinaryLabel, LabelMapping};
use crate::error::PipelineError;
use crate::features::{FeatureEngineer, FittedPreprocessor, PreprocessingObject};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Feature engineering, fitted preprocessor, fitted estimator and label
/// mapping in one serializable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainedModel {
    pub engineer: FeatureEngineer,
    pub preprocessor: FittedPreprocessor,
    pub estimator: Estimator,
    pub labels: LabelMapping,
    /// Leaderboard name of the winning candidate.
    pub candidate: String,
    pub trained_at: DateTime<Utc>,
}

impl TrainedModel {
    pub fn new(object: PreprocessingObject, estimator: Estimator, candidate: String) -> Self {
        Self {
            engineer: object.engineer,
            preprocessor: object.preprocessor,
            estimator,
            labels: object.labels,
            candidate,
            trained_at: Utc::now(),
        }
    }

    /// Predict encoded labels for raw rows. A target column, if present,
    /// is ignored.
    pub fn predict_labels(&self, raw: &DataFrame) -> Result<Vec<BinaryLabel>, PipelineError> {
        let features = self.engineer.prepare_features(raw.clone())?;
        let matrix = self.preprocessor.transform(&features)?;
        Ok(self.estimator.predict(&matrix))
    }

    /// Predict decoded target values for raw rows.
    pub fn predict(&self, raw: &DataFrame) -> Result<Vec<String>, PipelineError> {
        Ok(self
            .predict_labels(raw)?
            .into_iter()
            .map(|label| self.labels.decode(label).to_string())
            .collect())
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PipelineError> {
        serde_json::from_slice(bytes)
            .map_err(|e| PipelineError::model(format!("corrupt model payload: {e}")))
    }

    /// Write the model and return its bytes.
    pub fn save(&self, path: &Path) -> Result<Vec<u8>, PipelineError> {
        let bytes = self.to_bytes()?;
        crate::persistence::atomic_write(path, &bytes)?;
        Ok(bytes)
    }

    pub fn load(path: &Path) -> Result<Self, PipelineError> {
        let bytes = std::fs::read(path).map_err(|e| {
            PipelineError::model(format!("failed to read model {}: {e}", path.display()))
        })?;
        Self::from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::{EstimatorFamily, Params};
    use crate::data::schema::SchemaConfig;
    use crate::features::build_preprocessor;
    use serde_json::json;

    fn schema() -> SchemaConfig {
        serde_yaml::from_str(
            r#"
total_columns: 3
target_column: status
labels: [ok, bad]
numeric_columns: [wage]
categorical_columns: [region, status]
"#,
        )
        .unwrap()
    }

    fn frame() -> DataFrame {
        DataFrame {
            columns: vec!["wage".into(), "region".into(), "status".into()],
            rows: (0..40)
                .map(|i| {
                    let bad = i % 2 == 0;
                    vec![
                        json!(if bad { 900.0 + i as f64 } else { 10.0 + i as f64 }),
                        json!(if bad { "West" } else { "South" }),
                        json!(if bad { "bad" } else { "ok" }),
                    ]
                })
                .collect(),
        }
    }

    fn trained() -> TrainedModel {
        let schema = schema();
        let engineer = FeatureEngineer::from_schema(&schema, 2024);
        let labels = schema.label_mapping().unwrap();
        let (features, target) = engineer.split_target(frame()).unwrap();
        let features = engineer.engineer(features).unwrap();
        let preprocessor = build_preprocessor(&schema).fit(&features).unwrap();
        let matrix = preprocessor.transform(&features).unwrap();
        let y = labels.encode_all(&target).unwrap();
        let mut estimator =
            Estimator::from_params(EstimatorFamily::DecisionTree, &Params::new()).unwrap();
        estimator.fit(&matrix, &y).unwrap();
        TrainedModel::new(
            PreprocessingObject {
                engineer,
                labels,
                preprocessor,
            },
            estimator,
            "decision_tree {}".into(),
        )
    }

    #[test]
    fn test_predict_decodes_labels() {
        let model = trained();
        let predictions = model.predict(&frame()).unwrap();
        assert_eq!(predictions[0], "bad");
        assert_eq!(predictions[1], "ok");
    }

    #[test]
    fn test_predict_without_target_column() {
        let model = trained();
        let mut raw = frame();
        raw.take_column("status").unwrap();
        assert_eq!(model.predict(&raw).unwrap().len(), 40);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("model.json");
        let model = trained();
        let bytes = model.save(&path).unwrap();
        assert_eq!(TrainedModel::load(&path).unwrap(), model);
        assert_eq!(TrainedModel::from_bytes(&bytes).unwrap(), model);
        assert!(TrainedModel::from_bytes(b"not a model").is_err());
    }
    fn aged_model() -> (TrainedModel, DataFrame) {
        let schema: SchemaConfig = serde_yaml::from_str(
            r#"
total_columns: 5
target_column: status
labels: [ok, bad]
numeric_columns: [wage, yr_of_estab]
categorical_columns: [case_id, region, status]
nominal_columns: [region]
drop_columns: [case_id, yr_of_estab]
age_feature:
  source_column: yr_of_estab
  output_column: company_age
"#,
        )
        .unwrap();
        let raw = DataFrame {
            columns: vec![
                "case_id".into(),
                "wage".into(),
                "yr_of_estab".into(),
                "region".into(),
                "status".into(),
            ],
            rows: (0..40)
                .map(|i| {
                    let bad = i % 2 == 0;
                    vec![
                        json!(format!("EZYV{i:03}")),
                        json!(if bad { 900.0 + i as f64 } else { 10.0 + i as f64 }),
                        json!(if bad { 2015 } else { 1990 }),
                        json!(if bad { "West" } else { "South" }),
                        json!(if bad { "bad" } else { "ok" }),
                    ]
                })
                .collect(),
        };
        let engineer = FeatureEngineer::from_schema(&schema, 2024);
        let labels = schema.label_mapping().unwrap();
        let (features, target) = engineer.split_target(raw.clone()).unwrap();
        let features = engineer.engineer(features).unwrap();
        let preprocessor = build_preprocessor(&schema).fit(&features).unwrap();
        let matrix = preprocessor.transform(&features).unwrap();
        let y = labels.encode_all(&target).unwrap();
        let mut estimator =
            Estimator::from_params(EstimatorFamily::DecisionTree, &Params::new()).unwrap();
        estimator.fit(&matrix, &y).unwrap();
        let model = TrainedModel::new(
            PreprocessingObject {
                engineer,
                labels,
                preprocessor,
            },
            estimator,
            "decision_tree {}".into(),
        );
        (model, raw)
    }

    #[test]
    fn test_predict_accepts_precomputed_age_without_dropped_columns() {
        let (model, _) = aged_model();
        let request = DataFrame {
            columns: vec!["wage".into(), "region".into(), "company_age".into()],
            rows: vec![
                vec![json!(950.0), json!("West"), json!(9)],
                vec![json!(15.0), json!("South"), json!(34)],
            ],
        };
        assert_eq!(model.predict(&request).unwrap(), vec!["bad", "ok"]);
    }

    #[test]
    fn test_predict_reads_na_sentinel_as_missing() {
        let (model, mut raw) = aged_model();
        let mut wages: Vec<serde_json::Value> =
            raw.column("wage").unwrap().into_iter().cloned().collect();
        wages[0] = json!("na");
        raw.set_column("wage", wages).unwrap();
        raw.set_column("_id", (0..40).map(|i| json!(i)).collect()).unwrap();
        assert_eq!(model.predict(&raw).unwrap().len(), 40);
    }

    #[test]
    fn test_predict_still_requires_features() {
        let (model, mut raw) = aged_model();
        raw.take_column("region").unwrap();
        assert!(matches!(
            model.predict(&raw).unwrap_err(),
            PipelineError::Transform(_)
        ));
    }
}
