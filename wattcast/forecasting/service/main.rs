//! Prediction service facade: request validation, prediction, insights, stats.

/// Driver description catalog.
pub mod catalog;
/// The immutable service shared by request handlers.
pub mod facade;
/// Field ranges and request validation.
pub mod validate;

pub use catalog::DriverCatalog;
pub use facade::{
    ConversionFactors, InsightsResponse, PredictResponse, PredictionService, ServiceError,
    ServiceOptions, StatsResponse, DEFAULT_TOP_DRIVERS,
};
pub use validate::{
    default_field_ranges, FieldIssue, FieldRange, IssueKind, PredictRequest, RequestValidator,
    ValidationError,
};
