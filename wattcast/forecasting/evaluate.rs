use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    dataset::Dataset,
    error::{ForecastError, ForecastResult},
    model::FittedModel,
};

/// Train/test R² gap treated as significant when none is configured.
pub const DEFAULT_OVERFIT_TOLERANCE: f64 = 0.1;

/// Error metrics of one split.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitMetrics {
    /// Root mean squared error (Wh).
    pub rmse: f64,
    /// Mean absolute error (Wh).
    pub mae: f64,
    /// Coefficient of determination; NaN when the target has zero variance.
    #[serde(deserialize_with = "nan_from_null")]
    pub r2: f64,
    /// Number of samples scored.
    pub samples: usize,
}

impl SplitMetrics {
    /// Scores predictions against targets.
    pub fn from_predictions(targets: &[f64], predictions: &[f64]) -> ForecastResult<Self> {
        if targets.is_empty() {
            return Err(ForecastError::EmptyDataset);
        }
        if targets.len() != predictions.len() {
            return Err(ForecastError::DegenerateInput(format!(
                "{} targets for {} predictions",
                targets.len(),
                predictions.len()
            )));
        }
        #[allow(clippy::cast_precision_loss)]
        let count = targets.len() as f64;
        let mean = targets.iter().sum::<f64>() / count;
        let (ss_res, abs_err, ss_tot) = targets.iter().zip(predictions).fold(
            (0.0, 0.0, 0.0),
            |(ss_res, abs_err, ss_tot), (target, prediction)| {
                let residual = target - prediction;
                (
                    residual.mul_add(residual, ss_res),
                    abs_err + residual.abs(),
                    (target - mean).mul_add(target - mean, ss_tot),
                )
            },
        );
        let r2 = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else {
            f64::NAN
        };
        Ok(Self {
            rmse: (ss_res / count).sqrt(),
            mae: abs_err / count,
            r2,
            samples: targets.len(),
        })
    }
}

/// Train-versus-test verdict; advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum FitDiagnosis {
    /// Train R² exceeds test R² by more than the tolerance.
    Overfitting {
        /// `train R² − test R²`.
        gap: f64,
    },
    /// Test R² exceeds train R² by more than the tolerance.
    TestOutperformsTrain {
        /// `train R² − test R²`.
        gap: f64,
    },
    /// Gap within tolerance.
    Balanced {
        /// `train R² − test R²`.
        gap: f64,
    },
    /// Either R² is undefined.
    Indeterminate,
}

impl FitDiagnosis {
    /// Whether training looks overfit.
    #[must_use]
    pub const fn is_overfitting(&self) -> bool {
        matches!(self, Self::Overfitting { .. })
    }

    /// Advisory sentence for reports.
    #[must_use]
    pub fn advisory(&self) -> String {
        match self {
            Self::Overfitting { gap } => {
                format!("possible overfitting: train R² exceeds test R² by {gap:.4}")
            }
            Self::TestOutperformsTrain { gap } => format!(
                "test R² exceeds train R² by {:.4}; check for distribution shift",
                -gap
            ),
            Self::Balanced { gap } => {
                format!("consistent generalization (R² gap {gap:.4})")
            }
            Self::Indeterminate => "R² undefined on a split; overfitting not assessed".into(),
        }
    }
}

/// Reliability band of the test R².
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBand {
    /// R² > 0.8.
    Strong,
    /// 0.6 < R² ≤ 0.8.
    Moderate,
    /// R² ≤ 0.6.
    Weak,
    /// R² is NaN.
    Undefined,
}

impl QualityBand {
    /// Band of an R² value.
    #[must_use]
    pub fn from_r2(r2: f64) -> Self {
        if r2.is_nan() {
            Self::Undefined
        } else if r2 > 0.8 {
            Self::Strong
        } else if r2 > 0.6 {
            Self::Moderate
        } else {
            Self::Weak
        }
    }

    /// Usage guidance for the band.
    #[must_use]
    pub const fn guidance(&self) -> &'static str {
        match self {
            Self::Strong => "strong model, reliable for predictions and insights",
            Self::Moderate => "moderate model, suitable for decisions with validation",
            Self::Weak => "weak model, use predictions with caution and explore more features",
            Self::Undefined => "model quality undefined for a constant target",
        }
    }
}

/// Metrics of both splits plus the derived verdicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Training split metrics.
    pub train: SplitMetrics,
    /// Test split metrics.
    pub test: SplitMetrics,
    /// Overfitting verdict.
    pub diagnosis: FitDiagnosis,
    /// Test R² band.
    pub quality: QualityBand,
    /// Tolerance the verdict was computed with.
    pub overfit_tolerance: f64,
}

impl EvaluationReport {
    /// Advisory text of the verdict.
    #[must_use]
    pub fn advisory(&self) -> String {
        self.diagnosis.advisory()
    }
}

/// Scores a fitted model on both splits.
#[derive(Debug, Clone, Copy)]
pub struct Evaluator {
    overfit_tolerance: f64,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self {
            overfit_tolerance: DEFAULT_OVERFIT_TOLERANCE,
        }
    }
}

impl Evaluator {
    /// Creates an evaluator; the tolerance must be finite and non-negative.
    pub fn new(overfit_tolerance: f64) -> ForecastResult<Self> {
        if !overfit_tolerance.is_finite() || overfit_tolerance < 0.0 {
            return Err(ForecastError::Config(format!(
                "overfit tolerance must be a finite non-negative number, got {overfit_tolerance}"
            )));
        }
        Ok(Self { overfit_tolerance })
    }

    /// Configured tolerance.
    #[must_use]
    pub const fn overfit_tolerance(&self) -> f64 {
        self.overfit_tolerance
    }

    /// Metrics for one split.
    pub fn score(&self, model: &FittedModel, split: &Dataset) -> ForecastResult<SplitMetrics> {
        if split.is_empty() {
            return Err(ForecastError::EmptyDataset);
        }
        let predictions = model.predict_dataset(split)?;
        SplitMetrics::from_predictions(&split.targets(), &predictions)
    }

    /// Metrics for both splits and the overfitting verdict.
    pub fn evaluate(
        &self,
        model: &FittedModel,
        train: &Dataset,
        test: &Dataset,
    ) -> ForecastResult<EvaluationReport> {
        let train = self.score(model, train)?;
        let test = self.score(model, test)?;
        Ok(EvaluationReport {
            diagnosis: self.diagnose(train.r2, test.r2),
            quality: QualityBand::from_r2(test.r2),
            train,
            test,
            overfit_tolerance: self.overfit_tolerance,
        })
    }

    /// Compares the two R² values against the tolerance.
    #[must_use]
    pub fn diagnose(&self, train_r2: f64, test_r2: f64) -> FitDiagnosis {
        if train_r2.is_nan() || test_r2.is_nan() {
            return FitDiagnosis::Indeterminate;
        }
        let gap = train_r2 - test_r2;
        if gap > self.overfit_tolerance {
            FitDiagnosis::Overfitting { gap }
        } else if -gap > self.overfit_tolerance {
            FitDiagnosis::TestOutperformsTrain { gap }
        } else {
            FitDiagnosis::Balanced { gap }
        }
    }
}

/// Reads `null` back as NaN, mirroring how serde_json writes non-finite floats.
fn nan_from_null<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}
