use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use shared_logging::LogLevel;
use wattcast_forecasting::{
    service::{InsightsResponse, PredictResponse, StatsResponse},
    ForecastTelemetry, PredictRequest, PredictionService, ServiceError,
};

/// State shared by every handler; the service is immutable after startup.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    pub telemetry: ForecastTelemetry,
}

impl AppState {
    pub fn new(service: PredictionService, telemetry: ForecastTelemetry) -> Self {
        Self {
            service: Arc::new(service),
            telemetry,
        }
    }
}

/// Failure of one request, rendered as `{detail, issues}` JSON.
#[derive(Debug)]
pub enum ApiError {
    /// The service rejected the request.
    Service(ServiceError),
    /// The body was not a JSON object of fields.
    Body(JsonRejection),
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self::Service(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Body(rejection)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail, issues) = match &self {
            Self::Service(err) => {
                let status = if err.is_client_error() {
                    StatusCode::UNPROCESSABLE_ENTITY
                } else {
                    StatusCode::INTERNAL_SERVER_ERROR
                };
                let issues = match err {
                    ServiceError::Validation(invalid) => json!(invalid.issues),
                    ServiceError::Forecast(_) => json!([]),
                };
                (status, err.to_string(), issues)
            }
            Self::Body(rejection) => (rejection.status(), rejection.body_text(), json!([])),
        };
        let body = json!({
            "detail": detail,
            "issues": issues,
        });
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/predict", post(predict))
        .route("/insights", get(insights))
        .route("/stats", get(stats))
        .with_state(state)
}

pub async fn serve(state: AppState, host: &str, port: u16) -> Result<()> {
    let addr = format!("{host}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    state.telemetry.emit(
        LogLevel::Info,
        "server.listening",
        json!({ "addr": addr, "model_type": state.service.stats().model_type }),
    );
    println!("wattcast API listening on http://{addr}");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "message": "Smart Building Energy API is running",
    }))
}

async fn predict(
    State(state): State<AppState>,
    body: Result<Json<PredictRequest>, JsonRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let Json(request) = body.map_err(|rejection| {
        state.telemetry.emit(
            LogLevel::Warn,
            "server.predict_rejected",
            json!({ "error": rejection.body_text() }),
        );
        ApiError::from(rejection)
    })?;
    match state.service.predict(&request) {
        Ok(response) => {
            state.telemetry.emit(
                LogLevel::Debug,
                "server.predict",
                json!({ "energy_wh": response.energy_wh }),
            );
            Ok(Json(response))
        }
        Err(err) => {
            let level = if err.is_client_error() {
                LogLevel::Warn
            } else {
                LogLevel::Error
            };
            state
                .telemetry
                .emit(level, "server.predict_rejected", json!({ "error": err.to_string() }));
            Err(err.into())
        }
    }
}

async fn insights(State(state): State<AppState>) -> Json<InsightsResponse> {
    Json(state.service.insights())
}

async fn stats(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.service.stats())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        extract::FromRequest,
        http::{header, Request},
    };
    use std::path::{Path, PathBuf};
    use tokio::runtime::Runtime;
    use wattcast_forecasting::ServiceOptions;

    fn fixture(name: &str) -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../forecasting/dataset")
            .join(name)
    }

    fn state() -> AppState {
        let service = PredictionService::load(
            &fixture("ridge_model.json"),
            &fixture("feature_names.json"),
            ServiceOptions::default(),
        )
        .unwrap();
        AppState::new(service, ForecastTelemetry::disabled())
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
    fn predict_handler_returns_prediction() {
        let rt = Runtime::new().unwrap();
        let state = state();
        let expected = state.service.predict(&scenario()).unwrap();
        let Json(response) = rt
            .block_on(predict(State(state), Ok(Json(scenario()))))
            .unwrap();
        assert_eq!(response, expected);
    }

    #[test]
    fn invalid_request_maps_to_422_with_issues() {
        let rt = Runtime::new().unwrap();
        let mut request = scenario();
        request.0.shift_remove("rv1");
        request.0.insert("hour".into(), json!(24));
        let err = rt
            .block_on(predict(State(state()), Ok(Json(request))))
            .unwrap_err();
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let bytes = rt
            .block_on(axum::body::to_bytes(response.into_body(), usize::MAX))
            .unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        let fields: Vec<&str> = body["issues"]
            .as_array()
            .unwrap()
            .iter()
            .map(|issue| issue["field"].as_str().unwrap())
            .collect();
        assert_eq!(fields, ["rv1", "hour"]);
    }

    fn rejected_body(body: &'static str) -> JsonRejection {
        let request = Request::builder()
            .method("POST")
            .uri("/predict")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap();
        Runtime::new()
            .unwrap()
            .block_on(Json::<PredictRequest>::from_request(request, &()))
            .unwrap_err()
    }

    #[test]
    fn malformed_bodies_get_the_json_error_shape() {
        let rt = Runtime::new().unwrap();
        for (body, status) in [
            ("{not json", StatusCode::BAD_REQUEST),
            ("[1, 2, 3]", StatusCode::UNPROCESSABLE_ENTITY),
        ] {
            let err = rt
                .block_on(predict(State(state()), Err(rejected_body(body))))
                .unwrap_err();
            let response = err.into_response();
            assert_eq!(response.status(), status, "body {body}");
            let bytes = rt
                .block_on(axum::body::to_bytes(response.into_body(), usize::MAX))
                .unwrap();
            let json: Value = serde_json::from_slice(&bytes).unwrap();
            assert!(json["detail"].as_str().is_some_and(|detail| !detail.is_empty()));
            assert_eq!(json["issues"], json!([]));
        }
    }

    #[test]
    fn insights_and_stats_handlers_share_the_service() {
        let rt = Runtime::new().unwrap();
        let state = state();
        let Json(insights) = rt.block_on(insights(State(state.clone())));
        assert_eq!(insights.top_drivers.len(), 5);
        assert_eq!(insights.top_drivers[0], "hour_sin");
        let Json(stats) = rt.block_on(stats(State(state)));
        assert_eq!(stats.features_used.len(), 8);
        let Json(health) = rt.block_on(health());
        assert_eq!(health["status"], "ok");
    }
}
