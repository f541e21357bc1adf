use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::dataset::FeatureVector;

/// Declared bounds of one request field; `None` leaves a side open.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRange {
    /// Field name.
    pub name: String,
    /// Inclusive lower bound.
    #[serde(default)]
    pub min: Option<f64>,
    /// Inclusive upper bound.
    #[serde(default)]
    pub max: Option<f64>,
    /// Human description with unit.
    #[serde(default)]
    pub description: String,
}

impl FieldRange {
    fn new(name: &str, min: Option<f64>, max: Option<f64>, description: &str) -> Self {
        Self {
            name: name.into(),
            min,
            max,
            description: description.into(),
        }
    }

    /// Whether `value` lies within the bounds.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value <= max)
    }
}

/// Ranges of the serving feature set.
#[must_use]
pub fn default_field_ranges() -> Vec<FieldRange> {
    vec![
        FieldRange::new("RH_6", Some(0.0), Some(100.0), "outdoor relative humidity (%)"),
        FieldRange::new("Windspeed", Some(0.0), None, "wind speed (m/s)"),
        FieldRange::new("Visibility", Some(0.0), None, "visibility (km)"),
        FieldRange::new("Tdewpoint", Some(-50.0), Some(50.0), "dew point temperature (°C)"),
        FieldRange::new("rv1", Some(0.0), None, "solar radiation (Wh/m²)"),
        FieldRange::new("hour", Some(0.0), Some(23.0), "hour of day"),
        FieldRange::new("hour_sin", Some(-1.0), Some(1.0), "sine-encoded hour"),
        FieldRange::new("hour_cos", Some(-1.0), Some(1.0), "cosine-encoded hour"),
    ]
}

/// Flat request body: field name to raw JSON value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictRequest(pub IndexMap<String, Value>);

impl PredictRequest {
    /// Request holding numeric fields only.
    #[must_use]
    pub fn from_values<'a>(fields: impl IntoIterator<Item = (&'a str, f64)>) -> Self {
        Self(
            fields
                .into_iter()
                .map(|(name, value)| (name.to_string(), Value::from(value)))
                .collect(),
        )
    }
}

/// Why one field was rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueKind {
    /// The field is required but absent.
    Missing,
    /// The value is not a finite number.
    NotNumeric {
        /// Offending JSON value.
        value: Value,
    },
    /// The value lies outside the declared bounds.
    OutOfRange {
        /// Offending value.
        value: f64,
        /// Lower bound.
        min: Option<f64>,
        /// Upper bound.
        max: Option<f64>,
    },
    /// The model does not use this field.
    Unexpected,
}

/// A rejected field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldIssue {
    /// Field name.
    pub field: String,
    /// Rejection reason.
    #[serde(flatten)]
    pub kind: IssueKind,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IssueKind::Missing => write!(f, "{}: field required", self.field),
            IssueKind::NotNumeric { value } => {
                write!(f, "{}: expected a number, got {value}", self.field)
            }
            IssueKind::OutOfRange { value, min, max } => {
                let low = min.map_or_else(|| "-inf".to_string(), |v| v.to_string());
                let high = max.map_or_else(|| "inf".to_string(), |v| v.to_string());
                write!(f, "{}: {value} outside [{low}, {high}]", self.field)
            }
            IssueKind::Unexpected => write!(f, "{}: unexpected field", self.field),
        }
    }
}

/// Every problem found in one request.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[error("invalid prediction request: {}", render(.issues))]
pub struct ValidationError {
    /// Issues in model field order, unexpected fields last.
    pub issues: Vec<FieldIssue>,
}

impl ValidationError {
    /// Whether `field` was reported.
    #[must_use]
    pub fn mentions(&self, field: &str) -> bool {
        self.issues.iter().any(|issue| issue.field == field)
    }
}

fn render(issues: &[FieldIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Checks requests against the model's field list and declared ranges.
#[derive(Debug, Clone)]
pub struct RequestValidator {
    fields: Vec<String>,
    ranges: IndexMap<String, FieldRange>,
}

impl RequestValidator {
    /// Validator for `fields` (model order); ranges for other names are ignored.
    #[must_use]
    pub fn new(fields: Vec<String>, ranges: Vec<FieldRange>) -> Self {
        let ranges = ranges
            .into_iter()
            .filter(|range| fields.contains(&range.name))
            .map(|range| (range.name.clone(), range))
            .collect();
        Self { fields, ranges }
    }

    /// Expected fields in model order.
    #[must_use]
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Range declared for a field.
    #[must_use]
    pub fn range(&self, field: &str) -> Option<&FieldRange> {
        self.ranges.get(field)
    }

    /// Returns the vector in model order, or every issue found. Values are never clamped.
    pub fn validate(&self, request: &PredictRequest) -> Result<FeatureVector, ValidationError> {
        let mut issues = Vec::new();
        let mut vector = FeatureVector::with_capacity(self.fields.len());
        for field in &self.fields {
            let Some(raw) = request.0.get(field) else {
                issues.push(FieldIssue {
                    field: field.clone(),
                    kind: IssueKind::Missing,
                });
                continue;
            };
            let Some(value) = raw.as_f64().filter(|value| value.is_finite()) else {
                issues.push(FieldIssue {
                    field: field.clone(),
                    kind: IssueKind::NotNumeric { value: raw.clone() },
                });
                continue;
            };
            if let Some(range) = self.ranges.get(field) {
                if !range.contains(value) {
                    issues.push(FieldIssue {
                        field: field.clone(),
                        kind: IssueKind::OutOfRange {
                            value,
                            min: range.min,
                            max: range.max,
                        },
                    });
                    continue;
                }
            }
            vector.insert(field.clone(), value);
        }
        for name in request.0.keys() {
            if !self.fields.contains(name) {
                issues.push(FieldIssue {
                    field: name.clone(),
                    kind: IssueKind::Unexpected,
                });
            }
        }
        if issues.is_empty() {
            Ok(vector)
        } else {
            Err(ValidationError { issues })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator() -> RequestValidator {
        let fields = default_field_ranges()
            .into_iter()
            .map(|range| range.name)
            .collect();
        RequestValidator::new(fields, default_field_ranges())
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
    fn valid_request_is_returned_in_model_order() {
        let mut request = scenario();
        request.0.reverse();
        let vector = validator().validate(&request).unwrap();
        let names: Vec<&str> = vector.keys().map(String::as_str).collect();
        assert_eq!(
            names,
            ["RH_6", "Windspeed", "Visibility", "Tdewpoint", "rv1", "hour", "hour_sin", "hour_cos"]
        );
        assert_eq!(vector["rv1"], 100.0);
    }

    #[test]
    fn missing_field_is_named() {
        let mut request = scenario();
        request.0.shift_remove("Windspeed");
        let err = validator().validate(&request).unwrap_err();
        assert_eq!(err.issues.len(), 1);
        assert_eq!(err.issues[0].field, "Windspeed");
        assert_eq!(err.issues[0].kind, IssueKind::Missing);
        assert!(err.to_string().contains("Windspeed: field required"));
    }

    #[test]
    fn hour_24_is_rejected_not_clamped() {
        let mut request = scenario();
        request.0.insert("hour".into(), json!(24));
        let err = validator().validate(&request).unwrap_err();
        assert!(matches!(
            err.issues[0].kind,
            IssueKind::OutOfRange { value, max: Some(max), .. } if value == 24.0 && max == 23.0
        ));
    }

    #[test]
    fn every_problem_is_reported() {
        let mut request = scenario();
        request.0.shift_remove("rv1");
        request.0.insert("RH_6".into(), json!(120.0));
        request.0.insert("Visibility".into(), json!("far"));
        request.0.insert("lights".into(), json!(30));
        let err = validator().validate(&request).unwrap_err();
        assert_eq!(err.issues.len(), 4);
        for field in ["rv1", "RH_6", "Visibility", "lights"] {
            assert!(err.mentions(field), "{field} not reported");
        }
        assert_eq!(err.issues[3].kind, IssueKind::Unexpected);
        let body = serde_json::to_value(&err).unwrap();
        assert_eq!(body["issues"][0]["kind"], "out_of_range");
    }

    #[test]
    fn unranged_model_field_must_still_be_numeric() {
        let validator = RequestValidator::new(vec!["T_out_lag1".into()], default_field_ranges());
        assert!(validator.range("T_out_lag1").is_none());
        let ok = validator
            .validate(&PredictRequest::from_values([("T_out_lag1", -80.0)]))
            .unwrap();
        assert_eq!(ok["T_out_lag1"], -80.0);
        let err = validator
            .validate(&PredictRequest(
                [("T_out_lag1".to_string(), Value::Null)].into_iter().collect(),
            ))
            .unwrap_err();
        assert!(matches!(err.issues[0].kind, IssueKind::NotNumeric { .. }));
    }
}
