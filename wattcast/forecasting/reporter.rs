use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    evaluate::{EvaluationReport, QualityBand, SplitMetrics},
    features::VifRemoval,
    importance::{top_by_direction, Direction, ImportanceRecord},
    interpret::InterpretationOutcome,
    service::DriverCatalog,
};

/// Outcome of one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Estimator label.
    pub model: String,
    /// Surviving features in schema order.
    pub features: Vec<String>,
    /// Features removed by VIF pruning.
    pub removed: Vec<VifRemoval>,
    /// Rows in the train split.
    pub train_rows: usize,
    /// Rows in the test split.
    pub test_rows: usize,
    /// Ridge metrics and verdicts.
    pub evaluation: EvaluationReport,
    /// Unregularized baseline metrics, when fitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub baseline: Option<BaselineMetrics>,
}

/// Test metrics of the ordinary least-squares baseline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BaselineMetrics {
    /// Baseline train metrics.
    pub train: SplitMetrics,
    /// Baseline test metrics.
    pub test: SplitMetrics,
}

impl TrainingReport {
    /// Renders a concise summary string.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut line = format!(
            "[ridge] model={} features={} train_r2={:.4} test_r2={:.4} test_rmse={:.4}",
            self.model,
            self.features.len(),
            self.evaluation.train.r2,
            self.evaluation.test.r2,
            self.evaluation.test.rmse
        );
        if let Some(baseline) = &self.baseline {
            let _ = write!(line, " baseline_test_r2={:.4}", baseline.test.r2);
        }
        line
    }
}

/// One driver in the textual insight report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverNote {
    /// Feature name.
    pub feature: String,
    /// Signed coefficient.
    pub coefficient: f64,
    /// Catalog description.
    pub description: String,
}

/// Energy drivers and model reliability in plain language.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightReport {
    /// Strongest consumption-raising features.
    pub increasing: Vec<DriverNote>,
    /// Strongest consumption-lowering features.
    pub decreasing: Vec<DriverNote>,
    /// Test R² band.
    pub quality: QualityBand,
    /// Test RMSE (Wh).
    pub test_rmse: f64,
    /// Test R² as a percentage of explained variance.
    pub explained_variance_pct: f64,
}

impl InsightReport {
    /// Builds the report from ranked importance and test metrics.
    #[must_use]
    pub fn new(
        ranked: &[ImportanceRecord],
        evaluation: &EvaluationReport,
        catalog: &DriverCatalog,
        top_n: usize,
    ) -> Self {
        let notes = |direction: Direction| {
            top_by_direction(ranked, direction, top_n)
                .into_iter()
                .map(|record| DriverNote {
                    feature: record.feature.clone(),
                    coefficient: record.coefficient,
                    description: catalog.describe(&record.feature, record.direction),
                })
                .collect::<Vec<_>>()
        };
        Self {
            increasing: notes(Direction::Increases),
            decreasing: notes(Direction::Decreases),
            quality: evaluation.quality,
            test_rmse: evaluation.test.rmse,
            explained_variance_pct: evaluation.test.r2 * 100.0,
        }
    }

    /// Feature with the largest positive coefficient.
    #[must_use]
    pub fn primary_driver(&self) -> Option<&str> {
        self.increasing.first().map(|note| note.feature.as_str())
    }

    /// Feature with the largest negative coefficient.
    #[must_use]
    pub fn primary_mitigator(&self) -> Option<&str> {
        self.decreasing.first().map(|note| note.feature.as_str())
    }

    /// Multi-line text rendering.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "features that increase energy consumption:");
        for note in &self.increasing {
            let _ = writeln!(
                out,
                "  + {} ({:.4}): {}",
                note.feature, note.coefficient, note.description
            );
        }
        let _ = writeln!(out, "features that decrease energy consumption:");
        if self.decreasing.is_empty() {
            let _ = writeln!(out, "  none");
        }
        for note in &self.decreasing {
            let _ = writeln!(
                out,
                "  - {} ({:.4}): {}",
                note.feature, note.coefficient, note.description
            );
        }
        if self.explained_variance_pct.is_nan() {
            let _ = writeln!(out, "test R² undefined (constant target)");
        } else {
            let _ = writeln!(
                out,
                "model explains {:.2}% of test variance; average error {:.2} Wh",
                self.explained_variance_pct, self.test_rmse
            );
        }
        if let Some(driver) = self.primary_driver() {
            let _ = writeln!(out, "primary energy driver: {driver}");
        }
        if let Some(mitigator) = self.primary_mitigator() {
            let _ = writeln!(out, "primary energy mitigator: {mitigator}");
        }
        let _ = writeln!(out, "reliability: {}", self.quality.guidance());
        out
    }
}

/// JSON report written by the evaluation pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationDocument {
    /// Report creation time.
    pub generated_at: DateTime<Utc>,
    /// Estimator label.
    pub model_type: String,
    /// Model intercept.
    pub intercept: f64,
    /// Features in schema order.
    pub features: Vec<String>,
    /// Metrics and verdicts.
    pub evaluation: EvaluationReport,
    /// Advisory overfitting text.
    pub advisory: String,
    /// Ranked coefficients.
    pub importance: Vec<ImportanceRecord>,
    /// Textual insights.
    pub insights: InsightReport,
    /// Optional attribution step.
    pub interpretation: InterpretationOutcome,
}
