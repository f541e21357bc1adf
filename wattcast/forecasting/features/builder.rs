use std::f64::consts::PI;

use chrono::Timelike;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use super::{
    raw::RawFrame,
    vif::{VifPruner, VifRemoval, VifScore, DEFAULT_VIF_THRESHOLD},
};
use crate::{
    dataset::{Dataset, FeatureSchema, Sample},
    error::{ForecastError, ForecastResult},
    telemetry::ForecastTelemetry,
};

/// Suffix appended to a lagged base feature.
pub const LAG_SUFFIX: &str = "_lag1";

/// Engineered hour-of-day feature names, in emission order.
pub const HOUR_FEATURES: [&str; 3] = ["hour", "hour_sin", "hour_cos"];

/// Feature engineering parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureBuildConfig {
    /// Raw columns never offered as candidates.
    pub excluded_columns: Vec<String>,
    /// Raw columns that get a one-step lag feature.
    pub lag_features: Vec<String>,
    /// VIF pruning threshold.
    pub vif_threshold: f64,
}

impl Default for FeatureBuildConfig {
    fn default() -> Self {
        Self {
            excluded_columns: vec!["lights".into()],
            lag_features: vec!["T_out".into(), "RH_out".into()],
            vif_threshold: DEFAULT_VIF_THRESHOLD,
        }
    }
}

/// Builder output: the model-ready dataset plus its bookkeeping.
#[derive(Debug, Clone)]
pub struct FeatureBuild {
    /// Pruned dataset; schema = survivors in candidate order.
    pub dataset: Dataset,
    /// Candidate features before pruning.
    pub candidates: Vec<String>,
    /// Pruning steps.
    pub removals: Vec<VifRemoval>,
    /// VIF of each survivor.
    pub final_vif: Vec<VifScore>,
    /// Raw observations read.
    pub rows_in: usize,
    /// Leading observations without a lag value.
    pub dropped_for_lag: usize,
    /// Observations with a missing reading or target.
    pub dropped_for_missing: usize,
}

impl FeatureBuild {
    /// Names of the surviving features.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        self.dataset.schema().names()
    }
}

/// Turns raw observations into a Dataset: hour encodings, lag features, VIF pruning.
#[derive(Debug, Clone)]
pub struct FeatureBuilder {
    config: FeatureBuildConfig,
    pruner: VifPruner,
    telemetry: ForecastTelemetry,
}

/// Where a candidate's value comes from.
#[derive(Debug, Clone, Copy)]
enum Source {
    Reading(usize),
    Hour,
    HourSin,
    HourCos,
    Lag(usize),
}

impl FeatureBuilder {
    /// Creates a builder after validating the threshold.
    pub fn new(config: FeatureBuildConfig) -> ForecastResult<Self> {
        let pruner = VifPruner::new(config.vif_threshold)?;
        Ok(Self {
            config,
            pruner,
            telemetry: ForecastTelemetry::disabled(),
        })
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: ForecastTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &FeatureBuildConfig {
        &self.config
    }

    /// Engineers and prunes features.
    pub fn build(&self, frame: &RawFrame) -> ForecastResult<FeatureBuild> {
        for skipped in frame.skipped_columns() {
            self.telemetry.emit(
                LogLevel::Warn,
                "features.skip_column",
                json!({ "column": skipped, "reason": "non-numeric" }),
            );
        }
        let engineered = self.engineer(frame)?;
        if engineered.dataset.is_empty() {
            return Err(ForecastError::EmptyDataset);
        }
        let outcome = self.pruner.prune(&engineered.dataset)?;
        for removal in &outcome.removals {
            self.telemetry.emit(
                LogLevel::Info,
                "features.vif_removed",
                json!({
                    "feature": removal.feature,
                    "vif": finite_or_null(removal.vif),
                    "iteration": removal.iteration,
                }),
            );
        }
        let dataset = engineered.dataset.select_features(&outcome.kept);
        self.telemetry.emit(
            LogLevel::Info,
            "features.built",
            json!({
                "rows_in": frame.len(),
                "rows_out": dataset.len(),
                "candidates": engineered.candidates.len(),
                "survivors": dataset.schema().len(),
            }),
        );
        Ok(FeatureBuild {
            dataset,
            candidates: engineered.candidates,
            removals: outcome.removals,
            final_vif: outcome.final_scores,
            rows_in: frame.len(),
            dropped_for_lag: engineered.dropped_for_lag,
            dropped_for_missing: engineered.dropped_for_missing,
        })
    }

    /// Engineers every candidate without pruning.
    pub fn engineer(&self, frame: &RawFrame) -> ForecastResult<EngineeredFrame> {
        let mut sources = Vec::new();
        let mut names = Vec::new();
        for (idx, column) in frame.columns().iter().enumerate() {
            if !self.config.excluded_columns.contains(column) {
                sources.push(Source::Reading(idx));
                names.push(column.clone());
            }
        }
        for (name, source) in HOUR_FEATURES
            .iter()
            .zip([Source::Hour, Source::HourSin, Source::HourCos])
        {
            sources.push(source);
            names.push((*name).to_string());
        }
        for base in &self.config.lag_features {
            let idx = frame
                .column_index(base)
                .ok_or_else(|| ForecastError::MissingColumn(base.clone()))?;
            sources.push(Source::Lag(idx));
            names.push(format!("{base}{LAG_SUFFIX}"));
        }
        if names.len() < 2 {
            return Err(ForecastError::Config(format!(
                "need at least 2 candidate features, found {}",
                names.len()
            )));
        }
        let schema = FeatureSchema::new(names.clone())?;

        let observations = frame.observations();
        let dropped_for_lag = usize::from(!observations.is_empty());
        let mut dropped_for_missing = 0;
        let mut dataset = Dataset::new(schema);
        for (position, observation) in observations.iter().enumerate().skip(1) {
            let previous = &observations[position - 1];
            let hour = observation.timestamp.hour();
            let (hour_sin, hour_cos) = hour_encoding(hour);
            let features: Option<Vec<f64>> = sources
                .iter()
                .map(|source| match *source {
                    Source::Reading(idx) => observation.readings[idx],
                    Source::Hour => Some(f64::from(hour)),
                    Source::HourSin => Some(hour_sin),
                    Source::HourCos => Some(hour_cos),
                    Source::Lag(idx) => previous.readings[idx],
                })
                .collect();
            match (features, observation.target) {
                (Some(features), Some(target)) => dataset.push(Sample {
                    timestamp: observation.timestamp,
                    features,
                    target,
                })?,
                _ => dropped_for_missing += 1,
            }
        }
        Ok(EngineeredFrame {
            dataset,
            candidates: names,
            dropped_for_lag,
            dropped_for_missing,
        })
    }
}

/// Candidate features before pruning.
#[derive(Debug, Clone)]
pub struct EngineeredFrame {
    /// Every candidate column.
    pub dataset: Dataset,
    /// Candidate names in emission order.
    pub candidates: Vec<String>,
    /// Leading observations without a lag value.
    pub dropped_for_lag: usize,
    /// Observations with a missing value.
    pub dropped_for_missing: usize,
}

/// `(sin(2π·h/24), cos(2π·h/24))`.
#[must_use]
pub fn hour_encoding(hour: u32) -> (f64, f64) {
    let angle = 2.0 * PI * f64::from(hour) / 24.0;
    (angle.sin(), angle.cos())
}

pub(crate) fn finite_or_null(value: f64) -> serde_json::Value {
    if value.is_finite() {
        json!(value)
    } else {
        serde_json::Value::Null
    }
}
