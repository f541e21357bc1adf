use crate::{
    dataset::Dataset,
    error::{ForecastError, ForecastResult},
};

/// Train fraction used when none is configured.
pub const DEFAULT_TRAIN_FRACTION: f64 = 0.8;

/// Chronological train/test partition of a dataset.
#[derive(Debug, Clone)]
pub struct TrainTestSplit {
    /// Leading `floor(p·N)` samples.
    pub train: Dataset,
    /// Remaining samples.
    pub test: Dataset,
}

impl TrainTestSplit {
    /// Index of the first test sample in the source dataset.
    #[must_use]
    pub fn boundary(&self) -> usize {
        self.train.len()
    }
}

/// Splits without shuffling: every train sample precedes every test sample.
pub fn time_ordered_split(dataset: &Dataset, train_fraction: f64) -> ForecastResult<TrainTestSplit> {
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        return Err(ForecastError::Config(format!(
            "train fraction must lie in (0, 1), got {train_fraction}"
        )));
    }
    let total = dataset.len();
    if total < 2 {
        return Err(ForecastError::InsufficientData {
            required: 2,
            found: total,
        });
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
    let boundary = (train_fraction * total as f64).floor() as usize;
    Ok(TrainTestSplit {
        train: dataset.slice(0..boundary),
        test: dataset.slice(boundary..total),
    })
}
