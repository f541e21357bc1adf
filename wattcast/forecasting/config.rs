use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use shared_logging::LogLevel;

use crate::{
    evaluate::DEFAULT_OVERFIT_TOLERANCE,
    features::{CsvLayout, FeatureBuildConfig, DEFAULT_VIF_THRESHOLD},
    interpret::{DEFAULT_SAMPLE_SEED, DEFAULT_SAMPLE_SIZE},
    model::DEFAULT_ALPHA,
    plots::DEFAULT_PLOT_FEATURES,
    service::{
        default_field_ranges, ConversionFactors, DriverCatalog, FieldRange, ServiceOptions,
        DEFAULT_TOP_DRIVERS,
    },
    split::DEFAULT_TRAIN_FRACTION,
};

/// Workspace configuration loaded from TOML; every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WattcastConfig {
    /// Raw data layout and feature engineering.
    pub features: FeaturesSection,
    /// Split and estimator parameters.
    pub training: TrainingSection,
    /// Evaluation and interpretation parameters.
    pub evaluation: EvaluationSection,
    /// Prediction service parameters.
    pub serving: ServingSection,
    /// Output locations.
    pub artifacts: ArtifactsSection,
    /// Log sink.
    pub logging: LoggingSection,
}

impl WattcastConfig {
    /// Loads configuration from a TOML file, resolving relative paths against its directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let mut config: Self =
            toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        let source_dir = path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        config.resolve_paths(&source_dir);
        config.validate()?;
        Ok(config)
    }

    /// Loads `path` when given, otherwise the defaults relative to the working directory.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// Rejects out-of-domain parameters.
    pub fn validate(&self) -> Result<()> {
        let fraction = self.training.train_fraction;
        if !(fraction > 0.0 && fraction < 1.0) {
            bail!("training.train_fraction must lie in (0, 1), got {fraction}");
        }
        if !self.training.alpha.is_finite() || self.training.alpha < 0.0 {
            bail!("training.alpha must be non-negative, got {}", self.training.alpha);
        }
        if !self.features.vif_threshold.is_finite() || self.features.vif_threshold < 1.0 {
            bail!(
                "features.vif_threshold must be at least 1, got {}",
                self.features.vif_threshold
            );
        }
        if self.features.timestamp_formats.is_empty() {
            bail!("features.timestamp_formats must not be empty");
        }
        let tolerance = self.evaluation.overfit_tolerance;
        if !tolerance.is_finite() || tolerance < 0.0 {
            bail!("evaluation.overfit_tolerance must be non-negative, got {tolerance}");
        }
        if self.evaluation.shap_sample_size == 0 {
            bail!("evaluation.shap_sample_size must be positive");
        }
        if self.evaluation.plot_features == 0 {
            bail!("evaluation.plot_features must be positive");
        }
        for (name, value) in [
            ("serving.cost_per_kwh", self.serving.cost_per_kwh),
            ("serving.co2_per_kwh", self.serving.co2_per_kwh),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{name} must be non-negative, got {value}");
            }
        }
        for range in &self.serving.ranges {
            if let (Some(min), Some(max)) = (range.min, range.max) {
                if min > max {
                    bail!("serving range for {} has min {min} > max {max}", range.name);
                }
            }
        }
        self.logging.min_level()?;
        Ok(())
    }

    fn resolve_paths(&mut self, source_dir: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = source_dir.join(&*path);
            }
        };
        resolve(&mut self.training.data_path);
        resolve(&mut self.artifacts.model_path);
        resolve(&mut self.artifacts.feature_names_path);
        resolve(&mut self.artifacts.report_path);
        resolve(&mut self.artifacts.plots_dir);
        resolve(&mut self.artifacts.manifest_path);
        resolve(&mut self.logging.log_dir);
    }

    /// Options for building the prediction service.
    #[must_use]
    pub fn service_options(&self) -> ServiceOptions {
        ServiceOptions {
            factors: self.serving.factors(),
            ranges: self.serving.ranges.clone(),
            catalog: DriverCatalog::default().with_overrides(self.serving.descriptions.clone()),
            top_drivers: self.serving.top_drivers,
        }
    }
}

/// `[features]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeaturesSection {
    /// Timestamp column name.
    pub timestamp_column: String,
    /// Target column name.
    pub target_column: String,
    /// Timestamp formats tried in order.
    pub timestamp_formats: Vec<String>,
    /// Raw columns never offered as candidates.
    pub excluded_columns: Vec<String>,
    /// Raw columns that get a one-step lag.
    pub lag_features: Vec<String>,
    /// VIF pruning threshold.
    pub vif_threshold: f64,
}

impl Default for FeaturesSection {
    fn default() -> Self {
        let layout = CsvLayout::default();
        let build = FeatureBuildConfig::default();
        Self {
            timestamp_column: layout.timestamp_column,
            target_column: layout.target_column,
            timestamp_formats: layout.timestamp_formats,
            excluded_columns: build.excluded_columns,
            lag_features: build.lag_features,
            vif_threshold: DEFAULT_VIF_THRESHOLD,
        }
    }
}

impl FeaturesSection {
    /// CSV layout.
    #[must_use]
    pub fn layout(&self) -> CsvLayout {
        CsvLayout {
            timestamp_column: self.timestamp_column.clone(),
            target_column: self.target_column.clone(),
            timestamp_formats: self.timestamp_formats.clone(),
        }
    }

    /// Builder parameters.
    #[must_use]
    pub fn build_config(&self) -> FeatureBuildConfig {
        FeatureBuildConfig {
            excluded_columns: self.excluded_columns.clone(),
            lag_features: self.lag_features.clone(),
            vif_threshold: self.vif_threshold,
        }
    }
}

/// `[training]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingSection {
    /// Raw CSV used when no path is passed on the command line.
    pub data_path: PathBuf,
    /// Leading share of samples used for training.
    pub train_fraction: f64,
    /// Ridge regularization strength.
    pub alpha: f64,
    /// Also fit and report the unregularized baseline.
    pub baseline: bool,
}

impl Default for TrainingSection {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from("data/raw/energydata_complete.csv"),
            train_fraction: DEFAULT_TRAIN_FRACTION,
            alpha: DEFAULT_ALPHA,
            baseline: true,
        }
    }
}

/// `[evaluation]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EvaluationSection {
    /// Train/test R² gap flagged as overfitting.
    pub overfit_tolerance: f64,
    /// Rows explained by the attribution step.
    pub shap_sample_size: usize,
    /// Seed of the attribution sample.
    pub shap_seed: u64,
    /// Drivers listed per direction in the insight report.
    pub top_n: usize,
    /// Bars drawn per chart.
    pub plot_features: usize,
}

impl Default for EvaluationSection {
    fn default() -> Self {
        Self {
            overfit_tolerance: DEFAULT_OVERFIT_TOLERANCE,
            shap_sample_size: DEFAULT_SAMPLE_SIZE,
            shap_seed: DEFAULT_SAMPLE_SEED,
            top_n: 5,
            plot_features: DEFAULT_PLOT_FEATURES,
        }
    }
}

/// `[serving]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServingSection {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Currency units per kWh.
    pub cost_per_kwh: f64,
    /// kg CO2 per kWh.
    pub co2_per_kwh: f64,
    /// Drivers returned by insights.
    pub top_drivers: usize,
    /// Declared request field ranges.
    pub ranges: Vec<FieldRange>,
    /// Catalog entries added to or replacing the built-in descriptions.
    pub descriptions: BTreeMap<String, String>,
}

impl Default for ServingSection {
    fn default() -> Self {
        let factors = ConversionFactors::default();
        Self {
            host: "127.0.0.1".into(),
            port: 8000,
            cost_per_kwh: factors.cost_per_kwh,
            co2_per_kwh: factors.co2_per_kwh,
            top_drivers: DEFAULT_TOP_DRIVERS,
            ranges: default_field_ranges(),
            descriptions: BTreeMap::new(),
        }
    }
}

impl ServingSection {
    /// Conversion factors.
    #[must_use]
    pub const fn factors(&self) -> ConversionFactors {
        ConversionFactors {
            cost_per_kwh: self.cost_per_kwh,
            co2_per_kwh: self.co2_per_kwh,
        }
    }
}

/// `[artifacts]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactsSection {
    /// Fitted model JSON.
    pub model_path: PathBuf,
    /// Feature names JSON.
    pub feature_names_path: PathBuf,
    /// Evaluation report JSON.
    pub report_path: PathBuf,
    /// Directory of the SVG charts written by evaluation.
    pub plots_dir: PathBuf,
    /// JSON-lines run manifest.
    pub manifest_path: PathBuf,
}

impl Default for ArtifactsSection {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/ridge_model.json"),
            feature_names_path: PathBuf::from("models/feature_names.json"),
            report_path: PathBuf::from("reports/evaluation.json"),
            plots_dir: PathBuf::from("reports/plots"),
            manifest_path: PathBuf::from("runs/manifest.jsonl"),
        }
    }
}

/// `[logging]`
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Directory of daily log files.
    pub log_dir: PathBuf,
    /// Minimum level written.
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            level: "info".into(),
        }
    }
}

impl LoggingSection {
    /// Parsed minimum level.
    pub fn min_level(&self) -> Result<LogLevel> {
        self.level
            .parse()
            .with_context(|| format!("logging.level `{}`", self.level))
    }
}
