use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{
    catalog::DriverCatalog,
    validate::{default_field_ranges, FieldRange, PredictRequest, RequestValidator, ValidationError},
};
use crate::{
    dataset::FeatureVector,
    error::{ForecastError, ForecastResult},
    importance,
    model::{FittedModel, ModelArtifact},
};

/// Number of drivers returned by insights when none is configured.
pub const DEFAULT_TOP_DRIVERS: usize = 5;

/// Per-kWh cost and emission factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConversionFactors {
    /// Currency units per kWh.
    pub cost_per_kwh: f64,
    /// kg CO2 per kWh.
    pub co2_per_kwh: f64,
}

impl Default for ConversionFactors {
    fn default() -> Self {
        Self {
            cost_per_kwh: 5.0,
            co2_per_kwh: 0.82,
        }
    }
}

impl ConversionFactors {
    fn validate(&self) -> ForecastResult<()> {
        for (name, value) in [
            ("cost_per_kwh", self.cost_per_kwh),
            ("co2_per_kwh", self.co2_per_kwh),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ForecastError::Config(format!(
                    "{name} must be a finite non-negative number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Serving parameters besides the model itself.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Cost and CO2 factors.
    pub factors: ConversionFactors,
    /// Declared field ranges.
    pub ranges: Vec<FieldRange>,
    /// Driver descriptions.
    pub catalog: DriverCatalog,
    /// Drivers returned by [`PredictionService::insights`].
    pub top_drivers: usize,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            factors: ConversionFactors::default(),
            ranges: default_field_ranges(),
            catalog: DriverCatalog::default(),
            top_drivers: DEFAULT_TOP_DRIVERS,
        }
    }
}

/// Prediction plus derived cost and emissions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    /// Predicted consumption (Wh).
    pub energy_wh: f64,
    /// `energy_wh / 1000 · cost_per_kwh`.
    pub cost: f64,
    /// `energy_wh / 1000 · co2_per_kwh` (kg).
    pub co2: f64,
}

/// Top drivers with length-matched descriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsightsResponse {
    /// Feature names by importance.
    pub top_drivers: Vec<String>,
    /// One description per driver.
    pub descriptions: Vec<String>,
}

/// Model metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsResponse {
    /// Estimator label.
    pub model_type: String,
    /// Trained features in schema order.
    pub features_used: Vec<String>,
    /// kg CO2 per kWh in use.
    pub co2_factor: f64,
}

/// Failure of a single service call.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request failed field validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The core rejected the input.
    #[error(transparent)]
    Forecast(#[from] ForecastError),
}

impl ServiceError {
    /// Whether the caller's input caused the failure.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_) | Self::Forecast(ForecastError::SchemaMismatch(_))
        )
    }
}

/// Immutable prediction facade; built once, shared by reference.
#[derive(Debug, Clone)]
pub struct PredictionService {
    model: FittedModel,
    validator: RequestValidator,
    factors: ConversionFactors,
    catalog: DriverCatalog,
    top_drivers: usize,
}

impl PredictionService {
    /// Wraps a verified artifact.
    pub fn new(artifact: ModelArtifact, options: ServiceOptions) -> ForecastResult<Self> {
        options.factors.validate()?;
        let validator = RequestValidator::new(artifact.feature_names, options.ranges);
        Ok(Self {
            model: artifact.model,
            validator,
            factors: options.factors,
            catalog: options.catalog,
            top_drivers: options.top_drivers,
        })
    }

    /// Loads and verifies the two artifact files.
    pub fn load(
        model_path: &Path,
        feature_names_path: &Path,
        options: ServiceOptions,
    ) -> ForecastResult<Self> {
        Self::new(ModelArtifact::load(model_path, feature_names_path)?, options)
    }

    /// Served model.
    #[must_use]
    pub const fn model(&self) -> &FittedModel {
        &self.model
    }

    /// Factors in use.
    #[must_use]
    pub const fn factors(&self) -> ConversionFactors {
        self.factors
    }

    /// Validates, predicts, and derives cost and CO2.
    pub fn predict(&self, request: &PredictRequest) -> Result<PredictResponse, ServiceError> {
        let vector = self.validator.validate(request)?;
        Ok(self.predict_vector(&vector)?)
    }

    /// Predicts an already validated vector.
    pub fn predict_vector(&self, vector: &FeatureVector) -> ForecastResult<PredictResponse> {
        let energy_wh = self.model.predict(vector)?;
        let energy_kwh = energy_wh / 1000.0;
        Ok(PredictResponse {
            energy_wh,
            cost: energy_kwh * self.factors.cost_per_kwh,
            co2: energy_kwh * self.factors.co2_per_kwh,
        })
    }

    /// Top drivers by coefficient magnitude.
    #[must_use]
    pub fn insights(&self) -> InsightsResponse {
        let (top_drivers, descriptions) = importance::rank(&self.model)
            .into_iter()
            .take(self.top_drivers)
            .map(|record| {
                let description = self.catalog.describe(&record.feature, record.direction);
                (record.feature, description)
            })
            .unzip();
        InsightsResponse {
            top_drivers,
            descriptions,
        }
    }

    /// Model metadata.
    #[must_use]
    pub fn stats(&self) -> StatsResponse {
        StatsResponse {
            model_type: self.model.model_type(),
            features_used: self.model.feature_names(),
            co2_factor: self.factors.co2_per_kwh,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use std::path::PathBuf;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("dataset").join(name)
    }

    fn service() -> PredictionService {
        PredictionService::load(
            &fixture("ridge_model.json"),
            &fixture("feature_names.json"),
            ServiceOptions::default(),
        )
        .unwrap()
    }

    fn scenario() -> PredictRequest {
        PredictRequest::from_values([
            ("RH_6", 50.0),
            ("Windspeed", 5.0),
            ("Visibility", 40.0),
            ("Tdewpoint", 5.0),
            ("rv1", 100.0),
            ("hour", 14.0),
            ("hour_sin", 0.95),
            ("hour_cos", -0.309),
        ])
    }

    #[test]
    fn scenario_prediction_matches_linear_formula() {
        let service = service();
        let response = service.predict(&scenario()).unwrap();
        let expected = 55.0
            + 0.42 * 50.0
            + 1.7 * 5.0
            - 0.11 * 40.0
            + 2.3 * 5.0
            + 0.015 * 100.0
            + 0.8 * 14.0
            - 12.5 * 0.95
            + 6.25 * -0.309;
        assert_abs_diff_eq!(response.energy_wh, expected, epsilon = 1e-6);
        assert_abs_diff_eq!(response.cost, expected / 1000.0 * 5.0, epsilon = 1e-6);
        assert_abs_diff_eq!(response.co2, expected / 1000.0 * 0.82, epsilon = 1e-6);
        assert_eq!(service.predict(&scenario()).unwrap(), response);
    }

    #[test]
    fn validation_failure_is_a_client_error() {
        let service = service();
        let mut request = scenario();
        request.0.insert("hour".into(), serde_json::json!(24));
        let err = service.predict(&request).unwrap_err();
        assert!(err.is_client_error());
        assert!(matches!(err, ServiceError::Validation(ref v) if v.mentions("hour")));
    }

    #[test]
    fn insights_are_ranked_and_length_matched() {
        let insights = service().insights();
        assert_eq!(insights.top_drivers.len(), DEFAULT_TOP_DRIVERS);
        assert_eq!(insights.descriptions.len(), insights.top_drivers.len());
        // |−12.5| > 6.25 > 2.3 > 1.7 > 0.8
        assert_eq!(
            insights.top_drivers,
            ["hour_sin", "hour_cos", "Tdewpoint", "Windspeed", "hour"]
        );
        assert!(insights.descriptions[2].starts_with("Dew point temperature"));
    }

    #[test]
    fn stats_report_label_features_and_factor() {
        let stats = service().stats();
        assert_eq!(stats.model_type, "Ridge Regression (α=1.0)");
        assert_eq!(stats.features_used.len(), 8);
        assert_eq!(stats.features_used[0], "RH_6");
        assert_abs_diff_eq!(stats.co2_factor, 0.82);
    }

    #[test]
    fn custom_factors_flow_into_response() {
        let options = ServiceOptions {
            factors: ConversionFactors {
                cost_per_kwh: 0.25,
                co2_per_kwh: 0.4,
            },
            ..ServiceOptions::default()
        };
        let artifact = ModelArtifact::load(
            &fixture("ridge_model.json"),
            &fixture("feature_names.json"),
        )
        .unwrap();
        let service = PredictionService::new(artifact, options).unwrap();
        let response = service.predict(&scenario()).unwrap();
        assert_abs_diff_eq!(response.cost, response.energy_wh / 1000.0 * 0.25, epsilon = 1e-12);
        assert_eq!(service.stats().co2_factor, 0.4);

        let bad = ServiceOptions {
            factors: ConversionFactors {
                cost_per_kwh: -1.0,
                co2_per_kwh: 0.4,
            },
            ..ServiceOptions::default()
        };
        let artifact = ModelArtifact::load(
            &fixture("ridge_model.json"),
            &fixture("feature_names.json"),
        )
        .unwrap();
        assert!(matches!(
            PredictionService::new(artifact, bad),
            Err(ForecastError::Config(_))
        ));
    }
}
