use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::FittedModel;

/// Effect of raising a feature on predicted consumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Positive coefficient.
    Increases,
    /// Negative coefficient.
    Decreases,
    /// Zero coefficient.
    Neutral,
}

impl Direction {
    /// Direction of a coefficient.
    #[must_use]
    pub fn of(coefficient: f64) -> Self {
        if coefficient > 0.0 {
            Self::Increases
        } else if coefficient < 0.0 {
            Self::Decreases
        } else {
            Self::Neutral
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Increases => "increases",
            Self::Decreases => "decreases",
            Self::Neutral => "neutral",
        })
    }
}

/// One ranked coefficient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceRecord {
    /// Feature name.
    pub feature: String,
    /// Signed coefficient.
    pub coefficient: f64,
    /// `|coefficient|`, the ranking key.
    pub abs_coefficient: f64,
    /// Sign class.
    pub direction: Direction,
}

/// Coefficients sorted by magnitude descending, ties by feature name ascending.
#[must_use]
pub fn rank(model: &FittedModel) -> Vec<ImportanceRecord> {
    let mut records: Vec<ImportanceRecord> = model
        .coefficients()
        .iter()
        .map(|(feature, &coefficient)| ImportanceRecord {
            feature: feature.clone(),
            coefficient,
            abs_coefficient: coefficient.abs(),
            direction: Direction::of(coefficient),
        })
        .collect();
    records.sort_by(|a, b| {
        b.abs_coefficient
            .total_cmp(&a.abs_coefficient)
            .then_with(|| a.feature.cmp(&b.feature))
    });
    records
}

/// First `limit` ranked records with the given direction.
#[must_use]
pub fn top_by_direction(
    records: &[ImportanceRecord],
    direction: Direction,
    limit: usize,
) -> Vec<&ImportanceRecord> {
    records
        .iter()
        .filter(|record| record.direction == direction)
        .take(limit)
        .collect()
}
