use std::fmt;

use serde::Serialize;
use thiserror::Error;

/// Errors raised by the forecasting core.
#[derive(Debug, Error)]
pub enum ForecastError {
    /// A column the pipeline depends on is absent from the raw data.
    #[error("required column `{0}` not found in dataset header")]
    MissingColumn(String),
    /// A raw row could not be interpreted.
    #[error("row {row}: {reason}")]
    MalformedRow {
        /// 1-based data row number (header excluded).
        row: usize,
        /// What went wrong.
        reason: String,
    },
    /// The dataset holds no samples.
    #[error("dataset is empty")]
    EmptyDataset,
    /// Fewer rows than an operation needs.
    #[error("insufficient data: need at least {required} rows, found {found}")]
    InsufficientData {
        /// Minimum row count.
        required: usize,
        /// Actual row count.
        found: usize,
    },
    /// Fitting input cannot produce a model.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),
    /// Invalid parameter or configuration value.
    #[error("configuration error: {0}")]
    Config(String),
    /// Feature set does not match the trained schema.
    #[error(transparent)]
    SchemaMismatch(#[from] SchemaMismatch),
    /// Persisted model and feature list disagree.
    #[error("artifact mismatch: {0}")]
    ArtifactMismatch(String),
    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// CSV decoding failure.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    /// JSON encoding/decoding failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience alias for core results.
pub type ForecastResult<T> = Result<T, ForecastError>;

/// Difference between an offered feature set and the trained schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaMismatch {
    /// Trained features absent from the input.
    pub missing: Vec<String>,
    /// Input features the model was not trained on.
    pub unexpected: Vec<String>,
    /// Same names, different order (only reported for ordered inputs).
    pub reordered: bool,
}

impl SchemaMismatch {
    /// Whether the two sets were identical.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.unexpected.is_empty() && !self.reordered
    }
}

impl fmt::Display for SchemaMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "schema mismatch")?;
        if !self.missing.is_empty() {
            write!(f, "; missing: {}", self.missing.join(", "))?;
        }
        if !self.unexpected.is_empty() {
            write!(f, "; unexpected: {}", self.unexpected.join(", "))?;
        }
        if self.reordered {
            write!(f, "; feature order differs from training order")?;
        }
        Ok(())
    }
}

impl std::error::Error for SchemaMismatch {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mismatch_message_lists_both_sides() {
        let mismatch = SchemaMismatch {
            missing: vec!["rv1".into()],
            unexpected: vec!["rv2".into(), "lights".into()],
            reordered: false,
        };
        let text = ForecastError::from(mismatch).to_string();
        assert!(text.contains("missing: rv1"));
        assert!(text.contains("unexpected: rv2, lights"));
    }
}
