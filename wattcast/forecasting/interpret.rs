#[cfg(feature = "shap")]
use rand::{rngs::SmallRng, seq::index, SeedableRng};
use serde::{Deserialize, Serialize};

#[cfg(feature = "shap")]
use crate::error::{ForecastError, ForecastResult};
use crate::{dataset::Dataset, model::FittedModel};

/// Upper bound on the explained sample.
pub const DEFAULT_SAMPLE_SIZE: usize = 100;

/// Seed of the sample selection.
pub const DEFAULT_SAMPLE_SEED: u64 = 42;

/// Whether attribution support was compiled in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShapCapability {
    /// Built with the `shap` feature.
    Present,
    /// Built without it.
    Absent,
}

impl ShapCapability {
    /// Capability of this build.
    #[must_use]
    pub const fn detect() -> Self {
        if cfg!(feature = "shap") {
            Self::Present
        } else {
            Self::Absent
        }
    }
}

/// Mean absolute attribution of one feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapImportance {
    /// Feature name.
    pub feature: String,
    /// `mean |coef·(x − x̄)|` over the sample.
    pub mean_abs: f64,
}

/// Attribution summary over the explained sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapSummary {
    /// Rows explained.
    pub sample_size: usize,
    /// Seed the rows were drawn with.
    pub seed: u64,
    /// Features sorted by `mean_abs` descending, ties by name.
    pub features: Vec<ShapImportance>,
}

/// What happened to the optional attribution step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum InterpretationOutcome {
    /// Attributions were computed.
    Computed(ShapSummary),
    /// The build does not include attribution support.
    SkippedByDesign {
        /// Why the step did not run.
        reason: String,
    },
    /// Attribution was available but failed.
    Failed {
        /// Failure description.
        error: String,
    },
}

/// Exact SHAP values for a linear model against a sample-mean baseline.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(not(feature = "shap"), allow(dead_code))]
pub struct LinearShap {
    sample_size: usize,
    seed: u64,
}

impl Default for LinearShap {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            seed: DEFAULT_SAMPLE_SEED,
        }
    }
}

impl LinearShap {
    /// Creates an explainer with a custom sample.
    #[must_use]
    pub const fn new(sample_size: usize, seed: u64) -> Self {
        Self { sample_size, seed }
    }

    /// Runs when `capability` is present, recording a skip otherwise.
    #[must_use]
    pub fn run(
        &self,
        capability: ShapCapability,
        model: &FittedModel,
        test: &Dataset,
    ) -> InterpretationOutcome {
        match capability {
            ShapCapability::Absent => InterpretationOutcome::SkippedByDesign {
                reason: "built without the `shap` feature".into(),
            },
            ShapCapability::Present => self.attribute(model, test),
        }
    }

    #[cfg(feature = "shap")]
    fn attribute(&self, model: &FittedModel, test: &Dataset) -> InterpretationOutcome {
        match self.explain(model, test) {
            Ok(summary) => InterpretationOutcome::Computed(summary),
            Err(err) => InterpretationOutcome::Failed {
                error: err.to_string(),
            },
        }
    }

    #[cfg(not(feature = "shap"))]
    fn attribute(&self, _model: &FittedModel, _test: &Dataset) -> InterpretationOutcome {
        InterpretationOutcome::Failed {
            error: "attribution requested but the explainer is not compiled in".into(),
        }
    }

    /// Draws `min(sample_size, N)` rows without replacement and averages
    /// `|coefᵢ·(xᵢ − x̄ᵢ)|` with the sample itself as background.
    #[cfg(feature = "shap")]
    pub fn explain(&self, model: &FittedModel, test: &Dataset) -> ForecastResult<ShapSummary> {
        if test.is_empty() {
            return Err(ForecastError::EmptyDataset);
        }
        let mismatch = model.schema().diff_ordered(test.schema().names());
        if !mismatch.is_empty() {
            return Err(mismatch.into());
        }
        let amount = self.sample_size.min(test.len());
        if amount == 0 {
            return Err(ForecastError::Config("shap sample size must be positive".into()));
        }
        let mut rng = SmallRng::seed_from_u64(self.seed);
        let mut rows = index::sample(&mut rng, test.len(), amount).into_vec();
        rows.sort_unstable();
        let matrix = test.subset(&rows).feature_matrix();

        #[allow(clippy::cast_precision_loss)]
        let count = amount as f64;
        let mut features: Vec<ShapImportance> = model
            .coefficients()
            .iter()
            .enumerate()
            .map(|(col, (feature, coefficient))| {
                let column = matrix.column(col);
                let mean = column.sum() / count;
                let total: f64 = column
                    .iter()
                    .map(|value| (coefficient * (value - mean)).abs())
                    .sum();
                ShapImportance {
                    feature: feature.clone(),
                    mean_abs: total / count,
                }
            })
            .collect();
        features.sort_by(|a, b| {
            b.mean_abs
                .total_cmp(&a.mean_abs)
                .then_with(|| a.feature.cmp(&b.feature))
        });
        Ok(ShapSummary {
            sample_size: amount,
            seed: self.seed,
            features,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures;
    #[cfg(feature = "shap")]
    use approx::assert_abs_diff_eq;
    use indexmap::IndexMap;

    fn model() -> FittedModel {
        let coefficients: IndexMap<String, f64> =
            [("a".to_string(), 2.0), ("b".to_string(), -0.5)].into_iter().collect();
        FittedModel::from_parts(1.0, coefficients, 1.0).unwrap()
    }

    #[cfg(feature = "shap")]
    #[test]
    fn attributions_scale_with_coefficients() {
        // Both columns take values {0, 1} alternately, so mean |x − x̄| = 0.5.
        let test = fixtures::dataset(
            &["a", "b"],
            10,
            |i| vec![(i % 2) as f64, ((i + 1) % 2) as f64],
            |_| 0.0,
        );
        let summary = LinearShap::default().explain(&model(), &test).unwrap();
        assert_eq!(summary.sample_size, 10);
        assert_eq!(summary.features[0].feature, "a");
        assert_abs_diff_eq!(summary.features[0].mean_abs, 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(summary.features[1].mean_abs, 0.25, epsilon = 1e-12);
    }

    #[cfg(feature = "shap")]
    #[test]
    fn sample_is_reproducible() {
        let test = fixtures::dataset(
            &["a", "b"],
            500,
            |i| vec![(i as f64 * 0.3).sin(), (i as f64 * 0.7).cos()],
            |_| 0.0,
        );
        let first = LinearShap::default().explain(&model(), &test).unwrap();
        let second = LinearShap::default().explain(&model(), &test).unwrap();
        assert_eq!(first.sample_size, DEFAULT_SAMPLE_SIZE);
        assert_eq!(first, second);
    }

    #[test]
    fn absent_capability_is_a_skip_not_a_failure() {
        let test = fixtures::dataset(&["a", "b"], 3, |_| vec![0.0, 0.0], |_| 0.0);
        let outcome = LinearShap::default().run(ShapCapability::Absent, &model(), &test);
        assert!(matches!(outcome, InterpretationOutcome::SkippedByDesign { .. }));
    }

    #[test]
    fn present_capability_never_reports_a_skip() {
        let test = fixtures::dataset(&["a", "b"], 3, |_| vec![0.0, 0.0], |_| 0.0);
        let outcome = LinearShap::default().run(ShapCapability::Present, &model(), &test);
        if cfg!(feature = "shap") {
            assert!(matches!(outcome, InterpretationOutcome::Computed(_)));
        } else {
            assert!(matches!(outcome, InterpretationOutcome::Failed { .. }));
        }
    }

    #[cfg(feature = "shap")]
    #[test]
    fn schema_mismatch_is_a_failure() {
        let wrong = fixtures::dataset(&["b", "a"], 3, |_| vec![0.0, 0.0], |_| 0.0);
        let outcome = LinearShap::default().run(ShapCapability::Present, &model(), &wrong);
        assert!(matches!(outcome, InterpretationOutcome::Failed { .. }));
    }
}
