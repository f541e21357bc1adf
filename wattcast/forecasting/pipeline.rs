use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    config::WattcastConfig,
    evaluate::Evaluator,
    features::{FeatureBuild, FeatureBuilder, RawFrame},
    importance,
    interpret::{InterpretationOutcome, LinearShap, ShapCapability},
    model::{FittedModel, ModelArtifact, RidgeRegression},
    plots::write_plots,
    reporter::{BaselineMetrics, EvaluationDocument, InsightReport, TrainingReport},
    service::DriverCatalog,
    split::time_ordered_split,
    telemetry::ForecastTelemetry,
};

/// Artifacts and report of a finished training run.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    /// Persisted artifact.
    pub artifact: ModelArtifact,
    /// Metrics and feature summary.
    pub report: TrainingReport,
}

/// Feature build, split, Ridge fit, evaluation, and artifact persistence.
#[derive(Debug, Clone)]
pub struct TrainingPipeline {
    config: WattcastConfig,
    telemetry: ForecastTelemetry,
}

impl TrainingPipeline {
    /// Creates the pipeline.
    #[must_use]
    pub fn new(config: WattcastConfig) -> Self {
        Self {
            config,
            telemetry: ForecastTelemetry::disabled(),
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: ForecastTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Reads the CSV at `data_path`, trains, and writes the artifacts.
    pub fn run(&self, data_path: &Path) -> Result<TrainingOutcome> {
        let frame = load_frame(&self.config, data_path)?;
        let outcome = self.train(&frame)?;
        let artifacts = &self.config.artifacts;
        outcome
            .artifact
            .save(&artifacts.model_path, &artifacts.feature_names_path)
            .with_context(|| format!("writing model to {}", artifacts.model_path.display()))?;
        self.telemetry.emit(
            LogLevel::Info,
            "training.saved",
            json!({
                "model_path": artifacts.model_path.display().to_string(),
                "feature_names_path": artifacts.feature_names_path.display().to_string(),
            }),
        );
        Ok(outcome)
    }

    /// Trains on an in-memory frame without touching the filesystem.
    pub fn train(&self, frame: &RawFrame) -> Result<TrainingOutcome> {
        let build = build_features(&self.config, frame, &self.telemetry)?;
        let training = &self.config.training;
        let split = time_ordered_split(&build.dataset, training.train_fraction)
            .context("splitting dataset")?;
        self.telemetry.emit(
            LogLevel::Info,
            "training.split",
            json!({ "train": split.train.len(), "test": split.test.len() }),
        );

        let model = RidgeRegression::new(training.alpha)?
            .fit(&split.train)
            .context("fitting ridge model")?;
        if !model.aliased().is_empty() {
            self.telemetry.emit(
                LogLevel::Warn,
                "training.aliased",
                json!({ "features": model.aliased() }),
            );
        }
        let evaluator = Evaluator::new(self.config.evaluation.overfit_tolerance)?;
        let evaluation = evaluator
            .evaluate(&model, &split.train, &split.test)
            .context("evaluating ridge model")?;
        if evaluation.diagnosis.is_overfitting() {
            self.telemetry.emit(
                LogLevel::Warn,
                "training.overfit",
                json!({ "advisory": evaluation.advisory() }),
            );
        }

        let baseline = if training.baseline {
            let ols = RidgeRegression::new(0.0)?
                .fit(&split.train)
                .context("fitting baseline")?;
            Some(BaselineMetrics {
                train: evaluator.score(&ols, &split.train)?,
                test: evaluator.score(&ols, &split.test)?,
            })
        } else {
            None
        };

        let report = TrainingReport {
            model: model.model_type(),
            features: build.feature_names().to_vec(),
            removed: build.removals,
            train_rows: split.train.len(),
            test_rows: split.test.len(),
            evaluation,
            baseline,
        };
        self.telemetry.emit(
            LogLevel::Info,
            "training.complete",
            json!({ "summary": report.summary() }),
        );
        Ok(TrainingOutcome {
            artifact: ModelArtifact::from_model(model),
            report,
        })
    }
}

/// Reloads persisted artifacts and reports metrics, importance, insights, and attributions.
#[derive(Debug, Clone)]
pub struct EvaluationPipeline {
    config: WattcastConfig,
    capability: ShapCapability,
    telemetry: ForecastTelemetry,
}

impl EvaluationPipeline {
    /// Creates the pipeline; attribution support is detected here, once.
    #[must_use]
    pub fn new(config: WattcastConfig) -> Self {
        Self {
            config,
            capability: ShapCapability::detect(),
            telemetry: ForecastTelemetry::disabled(),
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: ForecastTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Overrides the detected capability.
    #[must_use]
    pub const fn with_capability(mut self, capability: ShapCapability) -> Self {
        self.capability = capability;
        self
    }

    /// Evaluates the stored model on the CSV at `data_path`, then writes the JSON
    /// report and the SVG charts.
    pub fn run(&self, data_path: &Path) -> Result<EvaluationDocument> {
        let artifacts = &self.config.artifacts;
        let artifact = ModelArtifact::load(&artifacts.model_path, &artifacts.feature_names_path)
            .with_context(|| format!("loading model from {}", artifacts.model_path.display()))?;
        let frame = load_frame(&self.config, data_path)?;
        let document = self.evaluate(&artifact.model, &frame)?;

        if let Some(parent) = artifacts.report_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        fs::write(&artifacts.report_path, serde_json::to_vec_pretty(&document)?)
            .with_context(|| format!("writing report {}", artifacts.report_path.display()))?;

        let plots = write_plots(
            &artifacts.plots_dir,
            &document.importance,
            &document.interpretation,
            self.config.evaluation.plot_features,
        )
        .with_context(|| format!("writing plots to {}", artifacts.plots_dir.display()))?;
        self.telemetry.emit(
            LogLevel::Info,
            "evaluation.plots",
            json!({ "paths": plots }),
        );
        Ok(document)
    }

    /// Evaluates `model` on a frame rebuilt with the configured feature pipeline.
    pub fn evaluate(&self, model: &FittedModel, frame: &RawFrame) -> Result<EvaluationDocument> {
        let build = build_features(&self.config, frame, &self.telemetry)?;
        let mismatch = model.schema().diff_ordered(build.feature_names());
        if !mismatch.is_empty() {
            bail!("rebuilt features do not match the trained model: {mismatch}");
        }
        let split = time_ordered_split(&build.dataset, self.config.training.train_fraction)
            .context("splitting dataset")?;
        let evaluation = Evaluator::new(self.config.evaluation.overfit_tolerance)?
            .evaluate(model, &split.train, &split.test)
            .context("evaluating model")?;

        let ranked = importance::rank(model);
        let catalog =
            DriverCatalog::default().with_overrides(self.config.serving.descriptions.clone());
        let insights =
            InsightReport::new(&ranked, &evaluation, &catalog, self.config.evaluation.top_n);

        let shap = LinearShap::new(
            self.config.evaluation.shap_sample_size,
            self.config.evaluation.shap_seed,
        );
        let interpretation = shap.run(self.capability, model, &split.test);
        match &interpretation {
            InterpretationOutcome::Computed(summary) => self.telemetry.emit(
                LogLevel::Info,
                "evaluation.shap",
                json!({ "sample_size": summary.sample_size }),
            ),
            InterpretationOutcome::SkippedByDesign { reason } => self.telemetry.emit(
                LogLevel::Info,
                "evaluation.shap_skipped",
                json!({ "reason": reason }),
            ),
            InterpretationOutcome::Failed { error } => self.telemetry.emit(
                LogLevel::Warn,
                "evaluation.shap_failed",
                json!({ "error": error }),
            ),
        }

        Ok(EvaluationDocument {
            generated_at: Utc::now(),
            model_type: model.model_type(),
            intercept: model.intercept(),
            features: model.feature_names(),
            advisory: evaluation.advisory(),
            evaluation,
            importance: ranked,
            insights,
            interpretation,
        })
    }
}

/// Reads a CSV with the configured layout.
pub fn load_frame(config: &WattcastConfig, data_path: &Path) -> Result<RawFrame> {
    RawFrame::from_path(data_path, &config.features.layout())
        .with_context(|| format!("reading {}", data_path.display()))
}

/// Runs the configured feature builder.
pub fn build_features(
    config: &WattcastConfig,
    frame: &RawFrame,
    telemetry: &ForecastTelemetry,
) -> Result<FeatureBuild> {
    FeatureBuilder::new(config.features.build_config())?
        .with_telemetry(telemetry.clone())
        .build(frame)
        .context("building features")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plots::{IMPORTANCE_PLOT, SHAP_PLOT};
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn sample_csv() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("dataset/energy_sample.csv")
    }

    fn config_in(dir: &Path) -> WattcastConfig {
        let mut config = WattcastConfig::default();
        config.artifacts.model_path = dir.join("models/ridge_model.json");
        config.artifacts.feature_names_path = dir.join("models/feature_names.json");
        config.artifacts.report_path = dir.join("reports/evaluation.json");
        config.artifacts.plots_dir = dir.join("reports/plots");
        config
    }

    #[test]
    fn train_then_evaluate_round_trip() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let outcome = TrainingPipeline::new(config.clone())
            .run(&sample_csv())
            .unwrap();
        assert!(config.artifacts.model_path.exists());
        assert!(outcome.report.baseline.is_some());
        assert_eq!(
            outcome.report.train_rows + outcome.report.test_rows,
            297,
            "300 rows minus the lag row and two rows with gaps"
        );
        assert!(!outcome.report.features.iter().any(|f| f == "lights"));
        // rv2 duplicates rv1 and is the one pruned.
        let rv_survivors: Vec<_> = outcome
            .report
            .features
            .iter()
            .filter(|f| f.starts_with("rv"))
            .collect();
        assert_eq!(rv_survivors, ["rv1"]);

        let document = EvaluationPipeline::new(config.clone())
            .with_capability(ShapCapability::Absent)
            .run(&sample_csv())
            .unwrap();
        assert_eq!(document.features, outcome.report.features);
        assert_eq!(
            document.evaluation.test.rmse.to_bits(),
            outcome.report.evaluation.test.rmse.to_bits()
        );
        assert!(matches!(
            document.interpretation,
            InterpretationOutcome::SkippedByDesign { .. }
        ));
        assert!(config.artifacts.report_path.exists());
        let coefficients = config.artifacts.plots_dir.join(IMPORTANCE_PLOT);
        let svg = fs::read_to_string(coefficients).unwrap();
        assert!(svg.contains(&document.importance[0].feature));
        assert!(!config.artifacts.plots_dir.join(SHAP_PLOT).exists());
    }

    #[cfg(feature = "shap")]
    #[test]
    fn evaluation_computes_attributions_when_present() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let frame = load_frame(&config, &sample_csv()).unwrap();
        let outcome = TrainingPipeline::new(config.clone()).train(&frame).unwrap();
        let document = EvaluationPipeline::new(config)
            .with_capability(ShapCapability::Present)
            .evaluate(&outcome.artifact.model, &frame)
            .unwrap();
        match document.interpretation {
            InterpretationOutcome::Computed(summary) => {
                assert_eq!(summary.sample_size, 60);
                assert_eq!(summary.features.len(), document.features.len());
            }
            other => panic!("expected attributions, got {other:?}"),
        }
    }

    #[test]
    fn training_failure_leaves_existing_artifacts_untouched() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        TrainingPipeline::new(config.clone())
            .run(&sample_csv())
            .unwrap();
        let before = fs::read(&config.artifacts.model_path).unwrap();

        let broken = dir.path().join("broken.csv");
        fs::write(&broken, "date,Energy\n2016-01-11 17:00:00,10\n").unwrap();
        assert!(TrainingPipeline::new(config.clone()).run(&broken).is_err());
        assert_eq!(fs::read(&config.artifacts.model_path).unwrap(), before);
    }

    #[test]
    fn evaluation_rejects_model_with_other_schema() {
        let dir = tempdir().unwrap();
        let config = config_in(dir.path());
        let frame = load_frame(&config, &sample_csv()).unwrap();
        let model = FittedModel::from_parts(
            1.0,
            [("rv1".to_string(), 0.5), ("T1".to_string(), 0.1)]
                .into_iter()
                .collect(),
            1.0,
        )
        .unwrap();
        let err = EvaluationPipeline::new(config)
            .evaluate(&model, &frame)
            .unwrap_err();
        assert!(err.to_string().contains("do not match"));
    }
}
