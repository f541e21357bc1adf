#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Wattcast forecasting core: feature engineering, time-ordered evaluation, Ridge regression,
//! importance ranking, and the prediction service facade.

/// Typed errors of the forecasting core.
#[path = "../error.rs"]
pub mod error;

/// Schema, samples, and the ordered dataset.
#[path = "../dataset.rs"]
pub mod dataset;

/// Raw CSV ingestion, feature engineering, VIF pruning.
#[path = "../features/main.rs"]
pub mod features;

/// Chronological train/test partition.
#[path = "../split.rs"]
pub mod split;

/// Ridge estimator, fitted model, persistence.
#[path = "../model/main.rs"]
pub mod model;

/// RMSE, MAE, R², and overfitting verdicts.
#[path = "../evaluate.rs"]
pub mod evaluate;

/// Coefficient ranking.
#[path = "../importance.rs"]
pub mod importance;

/// Optional linear SHAP attributions.
#[path = "../interpret.rs"]
pub mod interpret;

/// SVG charts of coefficients and attributions.
#[path = "../plots.rs"]
pub mod plots;

/// Prediction facade used by the CLI and HTTP surface.
#[path = "../service/main.rs"]
pub mod service;

/// Training and insight reports.
#[path = "../reporter.rs"]
pub mod reporter;

/// TOML configuration.
#[path = "../config.rs"]
pub mod config;

/// Training and evaluation orchestration.
#[path = "../pipeline.rs"]
pub mod pipeline;

/// Telemetry helpers for structured logging.
#[path = "../telemetry.rs"]
pub mod telemetry;

pub use config::WattcastConfig;
pub use dataset::{Dataset, FeatureSchema, FeatureVector, Sample};
pub use error::{ForecastError, ForecastResult, SchemaMismatch};
pub use evaluate::{EvaluationReport, Evaluator, FitDiagnosis, QualityBand, SplitMetrics};
pub use features::{FeatureBuild, FeatureBuildConfig, FeatureBuilder, RawFrame};
pub use importance::{Direction, ImportanceRecord};
pub use interpret::{InterpretationOutcome, LinearShap, ShapCapability};
pub use model::{FittedModel, ModelArtifact, RidgeRegression};
pub use pipeline::{EvaluationPipeline, TrainingOutcome, TrainingPipeline};
pub use reporter::{EvaluationDocument, InsightReport, TrainingReport};
pub use service::{PredictRequest, PredictionService, ServiceError, ServiceOptions};
pub use split::{time_ordered_split, TrainTestSplit};
pub use telemetry::{ForecastTelemetry, ForecastTelemetryBuilder};
