use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use ndarray::Array1;
use serde::{Deserialize, Serialize};

use super::linalg::{centered_gram, solve_gram};
use crate::{
    dataset::{Dataset, FeatureSchema, FeatureVector},
    error::{ForecastError, ForecastResult},
};

/// Regularization strength used when none is configured.
pub const DEFAULT_ALPHA: f64 = 1.0;

/// Immutable linear model: intercept plus one coefficient per schema feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    intercept: f64,
    coefficients: IndexMap<String, f64>,
    alpha: f64,
    #[serde(rename = "model_type", default)]
    label: String,
    /// Features whose columns were linearly dependent at fit time.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    aliased: Vec<String>,
    trained_at: DateTime<Utc>,
}

impl FittedModel {
    /// Assembles a model from known parameters.
    pub fn from_parts(
        intercept: f64,
        coefficients: IndexMap<String, f64>,
        alpha: f64,
    ) -> ForecastResult<Self> {
        if !intercept.is_finite() || coefficients.values().any(|value| !value.is_finite()) {
            return Err(ForecastError::DegenerateInput(
                "model parameters must be finite".into(),
            ));
        }
        Ok(Self {
            intercept,
            coefficients,
            alpha,
            label: estimator_label(alpha),
            aliased: Vec::new(),
            trained_at: Utc::now(),
        })
    }

    /// Intercept term.
    #[must_use]
    pub const fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Coefficients keyed by feature, in schema order.
    #[must_use]
    pub const fn coefficients(&self) -> &IndexMap<String, f64> {
        &self.coefficients
    }

    /// Regularization strength used at fit time.
    #[must_use]
    pub const fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Dependent features pinned to zero during fitting.
    #[must_use]
    pub fn aliased(&self) -> &[String] {
        &self.aliased
    }

    /// Fit timestamp.
    #[must_use]
    pub const fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Feature names in training order.
    #[must_use]
    pub fn feature_names(&self) -> Vec<String> {
        self.coefficients.keys().cloned().collect()
    }

    /// Training schema.
    #[must_use]
    pub fn schema(&self) -> FeatureSchema {
        // Keys of an IndexMap are unique, so the schema is always valid.
        FeatureSchema::new(self.feature_names()).unwrap_or_default()
    }

    /// Human-readable estimator label, e.g. `Ridge Regression (α=1.0)`.
    #[must_use]
    pub fn model_type(&self) -> String {
        if self.label.is_empty() {
            estimator_label(self.alpha)
        } else {
            self.label.clone()
        }
    }

    /// `intercept + Σ coefᵢ·xᵢ`; the vector must carry exactly the trained features.
    pub fn predict(&self, vector: &FeatureVector) -> ForecastResult<f64> {
        let mismatch = self.schema().diff(vector.keys().map(String::as_str));
        if !mismatch.is_empty() {
            return Err(mismatch.into());
        }
        Ok(self
            .coefficients
            .iter()
            .fold(self.intercept, |acc, (name, coefficient)| {
                acc + coefficient * vector[name.as_str()]
            }))
    }

    /// Predicts every sample; the dataset schema must equal the trained schema.
    pub fn predict_dataset(&self, dataset: &Dataset) -> ForecastResult<Vec<f64>> {
        let mismatch = self.schema().diff_ordered(dataset.schema().names());
        if !mismatch.is_empty() {
            return Err(mismatch.into());
        }
        Ok(dataset
            .samples()
            .iter()
            .map(|sample| self.predict_row(&sample.features))
            .collect())
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        self.coefficients
            .values()
            .zip(row)
            .fold(self.intercept, |acc, (coefficient, value)| {
                acc + coefficient * value
            })
    }
}

fn estimator_label(alpha: f64) -> String {
    if alpha > 0.0 {
        format!("Ridge Regression (α={alpha:.1})")
    } else {
        "Linear Regression".to_string()
    }
}

/// L2-regularized least squares with an unpenalized intercept.
#[derive(Debug, Clone, Copy)]
pub struct RidgeRegression {
    alpha: f64,
}

impl RidgeRegression {
    /// Creates the estimator; `alpha = 0` is ordinary least squares.
    pub fn new(alpha: f64) -> ForecastResult<Self> {
        if !alpha.is_finite() || alpha < 0.0 {
            return Err(ForecastError::Config(format!(
                "alpha must be a finite non-negative number, got {alpha}"
            )));
        }
        Ok(Self { alpha })
    }

    /// Regularization strength.
    #[must_use]
    pub const fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Fits on centered data, then recovers the intercept as `ȳ − x̄·w`.
    pub fn fit(&self, train: &Dataset) -> ForecastResult<FittedModel> {
        if train.is_empty() {
            return Err(ForecastError::DegenerateInput(
                "cannot fit on an empty training set".into(),
            ));
        }
        if train.schema().is_empty() {
            return Err(ForecastError::DegenerateInput(
                "training set has no features".into(),
            ));
        }
        let matrix = train.feature_matrix();
        let targets = Array1::from(train.targets());
        let (means, centered, mut gram) = centered_gram(&matrix)
            .ok_or_else(|| ForecastError::DegenerateInput("no rows to center".into()))?;
        let target_mean = targets.mean().unwrap_or(0.0);
        let centered_targets = &targets - target_mean;

        for idx in 0..gram.nrows() {
            gram[[idx, idx]] += self.alpha;
        }
        let rhs = centered.t().dot(&centered_targets);
        let solution = solve_gram(&gram, &rhs);
        let intercept = target_mean - means.dot(&solution.coefficients);

        let names = train.schema().names();
        let coefficients = names
            .iter()
            .cloned()
            .zip(solution.coefficients.iter().copied())
            .collect();
        let mut model = FittedModel::from_parts(intercept, coefficients, self.alpha)?;
        model.aliased = solution
            .aliased
            .iter()
            .map(|&idx| names[idx].clone())
            .collect();
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dataset::fixtures, error::SchemaMismatch};
    use approx::assert_abs_diff_eq;

    fn scenario_model() -> FittedModel {
        let coefficients: IndexMap<String, f64> = [
            ("RH_6", 0.42),
            ("Windspeed", 1.7),
            ("Visibility", -0.11),
            ("Tdewpoint", 2.3),
            ("rv1", 0.015),
            ("hour", 0.8),
            ("hour_sin", -12.5),
            ("hour_cos", 6.25),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();
        FittedModel::from_parts(55.0, coefficients, 1.0).unwrap()
    }

    fn scenario_vector() -> FeatureVector {
        [
            ("RH_6", 50.0),
            ("Windspeed", 5.0),
            ("Visibility", 40.0),
            ("Tdewpoint", 5.0),
            ("rv1", 100.0),
            ("hour", 14.0),
            ("hour_sin", 0.95),
            ("hour_cos", -0.309),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
    }

    #[test]
    fn predict_matches_linear_formula_and_is_idempotent() {
        let model = scenario_model();
        let vector = scenario_vector();
        let expected = 55.0
            + 0.42 * 50.0
            + 1.7 * 5.0
            - 0.11 * 40.0
            + 2.3 * 5.0
            + 0.015 * 100.0
            + 0.8 * 14.0
            - 12.5 * 0.95
            + 6.25 * -0.309;
        let first = model.predict(&vector).unwrap();
        assert_abs_diff_eq!(first, expected, epsilon = 1e-9);
        assert_eq!(first.to_bits(), model.predict(&vector).unwrap().to_bits());
    }

    #[test]
    fn predict_accepts_any_key_order_but_rejects_other_sets() {
        let model = scenario_model();
        let mut reversed: FeatureVector = scenario_vector().into_iter().rev().collect();
        assert!(model.predict(&reversed).is_ok());

        reversed.shift_remove("rv1");
        reversed.insert("rv2".into(), 1.0);
        match model.predict(&reversed) {
            Err(ForecastError::SchemaMismatch(SchemaMismatch {
                missing, unexpected, ..
            })) => {
                assert_eq!(missing, vec!["rv1".to_string()]);
                assert_eq!(unexpected, vec!["rv2".to_string()]);
            }
            other => panic!("expected schema mismatch, got {other:?}"),
        }
    }

    #[test]
    fn ols_recovers_exact_linear_relationship() {
        let dataset = fixtures::dataset(
            &["a", "b"],
            30,
            |i| vec![i as f64, ((i * 7) % 11) as f64],
            |i| 3.0 + 2.0 * i as f64 - 0.5 * ((i * 7) % 11) as f64,
        );
        let model = RidgeRegression::new(0.0).unwrap().fit(&dataset).unwrap();
        assert_abs_diff_eq!(model.intercept(), 3.0, epsilon = 1e-8);
        assert_abs_diff_eq!(model.coefficients()["a"], 2.0, epsilon = 1e-8);
        assert_abs_diff_eq!(model.coefficients()["b"], -0.5, epsilon = 1e-8);
        assert_eq!(model.model_type(), "Linear Regression");
    }

    #[test]
    fn ridge_shrinks_coefficients_toward_zero() {
        let dataset = fixtures::dataset(
            &["a"],
            20,
            |i| vec![i as f64],
            |i| 4.0 * i as f64 + if i % 2 == 0 { 1.0 } else { -1.0 },
        );
        let ols = RidgeRegression::new(0.0).unwrap().fit(&dataset).unwrap();
        let ridge = RidgeRegression::new(50.0).unwrap().fit(&dataset).unwrap();
        assert!(ridge.coefficients()["a"].abs() < ols.coefficients()["a"].abs());
        assert!(ridge.coefficients()["a"] > 0.0);
        assert_eq!(ridge.model_type(), "Ridge Regression (α=50.0)");
    }

    #[test]
    fn ols_aliases_duplicated_column() {
        let dataset = fixtures::dataset(
            &["a", "a_copy"],
            12,
            |i| vec![i as f64, i as f64],
            |i| 1.0 + i as f64,
        );
        let model = RidgeRegression::new(0.0).unwrap().fit(&dataset).unwrap();
        assert_eq!(model.aliased(), ["a_copy"]);
        let predictions = model.predict_dataset(&dataset).unwrap();
        for (prediction, target) in predictions.iter().zip(dataset.targets()) {
            assert_abs_diff_eq!(*prediction, target, epsilon = 1e-8);
        }
    }

    #[test]
    fn fit_rejects_empty_training_set_and_bad_alpha() {
        let empty = fixtures::dataset(&["a"], 0, |_| vec![0.0], |_| 0.0);
        assert!(matches!(
            RidgeRegression::new(1.0).unwrap().fit(&empty),
            Err(ForecastError::DegenerateInput(_))
        ));
        assert!(RidgeRegression::new(-1.0).is_err());
    }

    #[test]
    fn predict_dataset_requires_identical_order() {
        let dataset = fixtures::dataset(&["a", "b"], 5, |i| vec![i as f64, 1.0], |i| i as f64);
        let model = RidgeRegression::new(1.0).unwrap().fit(&dataset).unwrap();
        let swapped = dataset.select_features(&[1, 0]);
        assert!(matches!(
            model.predict_dataset(&swapped),
            Err(ForecastError::SchemaMismatch(mismatch)) if mismatch.reordered
        ));
    }
}
