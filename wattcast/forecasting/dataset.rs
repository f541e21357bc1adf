use std::{collections::HashSet, ops::Range};

use chrono::NaiveDateTime;
use indexmap::IndexMap;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, ForecastResult, SchemaMismatch};

/// Named feature values for a single observation.
pub type FeatureVector = IndexMap<String, f64>;

/// Fixed-order list of feature names shared by every sample of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    /// Creates a schema; duplicate names are rejected.
    pub fn new(names: Vec<String>) -> ForecastResult<Self> {
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(ForecastError::Config(format!(
                    "feature `{name}` listed more than once"
                )));
            }
        }
        Ok(Self { names })
    }

    /// Feature names in schema order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the schema has no features.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of a feature, if present.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|candidate| candidate == name)
    }

    /// Compares an unordered set of names against the schema.
    #[must_use]
    pub fn diff<'a>(&self, offered: impl IntoIterator<Item = &'a str>) -> SchemaMismatch {
        let offered: Vec<&str> = offered.into_iter().collect();
        let offered_set: HashSet<&str> = offered.iter().copied().collect();
        let missing = self
            .names
            .iter()
            .filter(|name| !offered_set.contains(name.as_str()))
            .cloned()
            .collect();
        let unexpected = offered
            .iter()
            .filter(|name| self.index_of(name).is_none())
            .map(|name| (*name).to_string())
            .collect();
        SchemaMismatch {
            missing,
            unexpected,
            reordered: false,
        }
    }

    /// Compares an ordered name list; same names in another order is a mismatch.
    #[must_use]
    pub fn diff_ordered(&self, offered: &[String]) -> SchemaMismatch {
        let mut mismatch = self.diff(offered.iter().map(String::as_str));
        if mismatch.missing.is_empty() && mismatch.unexpected.is_empty() {
            mismatch.reordered = self.names.as_slice() != offered;
        }
        mismatch
    }

    /// Schema restricted to the given positions, in the given order.
    #[must_use]
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            names: indices.iter().map(|&idx| self.names[idx].clone()).collect(),
        }
    }
}

/// One chronological observation of the model-ready dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Observation timestamp.
    pub timestamp: NaiveDateTime,
    /// Feature values in schema order.
    pub features: Vec<f64>,
    /// Target value (energy, Wh).
    pub target: f64,
}

/// Ordered samples sharing one schema; insertion order is chronological order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Dataset {
    schema: FeatureSchema,
    samples: Vec<Sample>,
}

impl Dataset {
    /// Creates an empty dataset for the schema.
    #[must_use]
    pub fn new(schema: FeatureSchema) -> Self {
        Self {
            schema,
            samples: Vec::new(),
        }
    }

    /// Builds a dataset, checking every sample against the schema width.
    pub fn from_samples(schema: FeatureSchema, samples: Vec<Sample>) -> ForecastResult<Self> {
        let mut dataset = Self::new(schema);
        dataset.samples.reserve(samples.len());
        for sample in samples {
            dataset.push(sample)?;
        }
        Ok(dataset)
    }

    /// Appends a sample at the end of the sequence.
    pub fn push(&mut self, sample: Sample) -> ForecastResult<()> {
        if sample.features.len() != self.schema.len() {
            return Err(ForecastError::DegenerateInput(format!(
                "sample has {} features, schema has {}",
                sample.features.len(),
                self.schema.len()
            )));
        }
        self.samples.push(sample);
        Ok(())
    }

    /// Feature schema.
    #[must_use]
    pub const fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    /// Samples in chronological order.
    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the dataset holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Target column.
    #[must_use]
    pub fn targets(&self) -> Vec<f64> {
        self.samples.iter().map(|sample| sample.target).collect()
    }

    /// Row-major `(samples, features)` matrix.
    #[must_use]
    pub fn feature_matrix(&self) -> Array2<f64> {
        let width = self.schema.len();
        Array2::from_shape_fn((self.samples.len(), width), |(row, col)| {
            self.samples[row].features[col]
        })
    }

    /// Named view of one sample.
    #[must_use]
    pub fn feature_vector(&self, index: usize) -> Option<FeatureVector> {
        self.samples.get(index).map(|sample| {
            self.schema
                .names()
                .iter()
                .cloned()
                .zip(sample.features.iter().copied())
                .collect()
        })
    }

    /// Contiguous sub-sequence, order preserved.
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Self {
        Self {
            schema: self.schema.clone(),
            samples: self.samples[range].to_vec(),
        }
    }

    /// Samples at the given (ascending) positions.
    #[must_use]
    pub fn subset(&self, indices: &[usize]) -> Self {
        Self {
            schema: self.schema.clone(),
            samples: indices.iter().map(|&idx| self.samples[idx].clone()).collect(),
        }
    }

    /// Keeps only the listed feature columns, in the listed order.
    #[must_use]
    pub fn select_features(&self, indices: &[usize]) -> Self {
        Self {
            schema: self.schema.select(indices),
            samples: self
                .samples
                .iter()
                .map(|sample| Sample {
                    timestamp: sample.timestamp,
                    features: indices.iter().map(|&idx| sample.features[idx]).collect(),
                    target: sample.target,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    use super::{Dataset, FeatureSchema, Sample};

    pub fn start() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2016, 1, 11)
            .unwrap()
            .and_hms_opt(17, 0, 0)
            .unwrap()
    }

    /// Dataset whose rows are `(features(i), target(i))`, ten minutes apart.
    pub fn dataset(
        names: &[&str],
        rows: usize,
        features: impl Fn(usize) -> Vec<f64>,
        target: impl Fn(usize) -> f64,
    ) -> Dataset {
        let schema = FeatureSchema::new(names.iter().map(|n| (*n).to_string()).collect()).unwrap();
        let samples = (0..rows)
            .map(|i| Sample {
                timestamp: start() + Duration::minutes(10 * i as i64),
                features: features(i),
                target: target(i),
            })
            .collect();
        Dataset::from_samples(schema, samples).unwrap()
    }
}
