//! Property-based tests for leakage safety, promotion and drift.

mod common;

use proptest::prelude::*;

use promoflow_core::config::{DriftSettings, TransformSettings};
use promoflow_core::data::source::normalize_record;
use promoflow_core::data::{DataFrame, Record, split_train_test};
use promoflow_core::evaluation::decide;
use promoflow_core::features::transform;
use promoflow_core::validate::detect_drift;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde_json::json;

fn frame(records: &[Record]) -> DataFrame {
    let records: Vec<Record> = records.iter().cloned().map(normalize_record).collect();
    DataFrame::from_records(&records)
}

fn settings() -> TransformSettings {
    TransformSettings {
        reference_year: Some(2024),
        ..TransformSettings::default()
    }
}

// --- Promotion rule ---

proptest! {
    #[test]
    fn promotion_accepts_only_strict_improvement(
        candidate in 0.0f64..=1.0,
        production in prop::option::of(0.0f64..=1.0),
    ) {
        let verdict = decide(candidate, production);
        let baseline = production.unwrap_or(0.0);
        prop_assert_eq!(verdict.accepted, candidate > baseline);
        prop_assert!((verdict.score_delta - (candidate - baseline)).abs() < 1e-12);
    }

    #[test]
    fn promotion_rejects_ties(score in 0.0f64..=1.0) {
        prop_assert!(!decide(score, Some(score)).accepted);
    }
}

// --- Leakage safety ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn preprocessor_ignores_test_split(
        seed in any::<u64>(),
        wage_factor in 0.1f64..10.0,
    ) {
        let schema = common::schema();
        let all = frame(&common::visa_records(160, 21));
        let (train, test) = split_train_test(&all, 0.25, 5).unwrap();
        let baseline = transform(train.clone(), test.clone(), &schema, &settings(), 2024).unwrap();

        // Permute the test rows and rescale one of its numeric columns.
        let mut order: Vec<usize> = (0..test.row_count()).collect();
        order.shuffle(&mut StdRng::seed_from_u64(seed));
        let mut altered = test.select_rows(&order);
        let wages: Vec<serde_json::Value> = altered
            .column("prevailing_wage")
            .unwrap()
            .into_iter()
            .map(|v| json!(v.as_f64().unwrap_or(0.0) * wage_factor))
            .collect();
        altered.set_column("prevailing_wage", wages).unwrap();

        let rerun = transform(train, altered, &schema, &settings(), 2024).unwrap();
        prop_assert_eq!(&rerun.object, &baseline.object);
        prop_assert_eq!(&rerun.train, &baseline.train);
        prop_assert_eq!(rerun.test.len(), baseline.test.len());
    }

    #[test]
    fn resampling_leaves_test_split_untouched(seed in 0u64..1000) {
        let schema = common::schema();
        let all = frame(&common::visa_records(160, seed));
        let (train, test) = split_train_test(&all, 0.2, seed).unwrap();
        let labels = schema.label_mapping().unwrap();
        let expected = labels
            .encode_all(test.column("case_status").unwrap())
            .unwrap();

        let out = transform(train, test.clone(), &schema, &settings(), 2024).unwrap();
        prop_assert_eq!(out.test.len(), test.row_count());
        prop_assert_eq!(&out.test.labels, &expected);
    }
}

// --- Drift monotonicity ---

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn drift_grows_with_injected_shift(
        small in 0.0f64..20_000.0,
        extra in 0.0f64..60_000.0,
    ) {
        let schema = common::schema();
        let reference = frame(&common::visa_records(200, 13));
        let shifted = |delta: f64| {
            let mut current = reference.clone();
            let wages: Vec<serde_json::Value> = current
                .column("prevailing_wage")
                .unwrap()
                .into_iter()
                .map(|v| json!(v.as_f64().unwrap_or(0.0) + delta))
                .collect();
            current.set_column("prevailing_wage", wages).unwrap();
            current
        };
        let numeric = schema.drift_numeric_columns();
        let categorical = schema.drift_categorical_columns();
        let settings = DriftSettings::default();

        let near = detect_drift(&reference, &shifted(small), &numeric, &categorical, &settings).unwrap();
        let far = detect_drift(&reference, &shifted(small + extra), &numeric, &categorical, &settings).unwrap();

        let p = |report: &promoflow_core::validate::DriftReport| {
            report
                .features
                .iter()
                .find(|f| f.column == "prevailing_wage")
                .map(|f| f.p_value)
                .unwrap()
        };
        prop_assert!(p(&far) <= p(&near) + 1e-12);
        prop_assert!(far.number_of_drifted_features >= near.number_of_drifted_features);
    }
}
