use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::{
    dataset::Dataset,
    error::{ForecastError, ForecastResult},
    model::linalg::{centered_gram, solve_gram, ALIAS_TOLERANCE},
};

/// Threshold above which a feature is pruned when none is configured.
pub const DEFAULT_VIF_THRESHOLD: f64 = 5.0;

/// VIF of one surviving feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VifScore {
    /// Feature name.
    pub feature: String,
    /// Variance inflation factor; infinite for constant or dependent columns.
    pub vif: f64,
}

/// One pruning step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VifRemoval {
    /// 1-based pruning iteration.
    pub iteration: usize,
    /// Removed feature.
    pub feature: String,
    /// Its VIF at removal time.
    pub vif: f64,
}

/// Result of iterative pruning.
#[derive(Debug, Clone, PartialEq)]
pub struct VifOutcome {
    /// Surviving column positions in candidate order.
    pub kept: Vec<usize>,
    /// Removals in the order they happened.
    pub removals: Vec<VifRemoval>,
    /// VIF of each survivor after the last iteration.
    pub final_scores: Vec<VifScore>,
}

impl VifOutcome {
    /// Names of the surviving features.
    #[must_use]
    pub fn kept_names(&self) -> Vec<String> {
        self.final_scores
            .iter()
            .map(|score| score.feature.clone())
            .collect()
    }
}

/// Removes the most collinear feature until every survivor is at or below the threshold.
#[derive(Debug, Clone, Copy)]
pub struct VifPruner {
    threshold: f64,
}

impl Default for VifPruner {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_VIF_THRESHOLD,
        }
    }
}

impl VifPruner {
    /// Creates a pruner; the threshold must be finite and at least 1.
    pub fn new(threshold: f64) -> ForecastResult<Self> {
        if !threshold.is_finite() || threshold < 1.0 {
            return Err(ForecastError::Config(format!(
                "vif threshold must be a finite number >= 1, got {threshold}"
            )));
        }
        Ok(Self { threshold })
    }

    /// Configured threshold.
    #[must_use]
    pub const fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Prunes the dataset's columns. The centered Gram matrix is computed once
    /// and every iteration works on sub-blocks of it.
    pub fn prune(&self, dataset: &Dataset) -> ForecastResult<VifOutcome> {
        let names = dataset.schema().names();
        if names.len() < 2 {
            return Err(ForecastError::Config(format!(
                "vif pruning needs at least 2 candidate features, found {}",
                names.len()
            )));
        }
        let (_, _, gram) =
            centered_gram(&dataset.feature_matrix()).ok_or(ForecastError::EmptyDataset)?;

        let mut active: Vec<usize> = (0..names.len()).collect();
        let mut removals = Vec::new();
        loop {
            let scores = variance_inflation(&gram, &active);
            let worst = scores
                .iter()
                .enumerate()
                .fold(None::<(usize, f64)>, |best, (slot, &vif)| match best {
                    // Ties remove the later candidate.
                    Some((_, top)) if vif < top => best,
                    _ => Some((slot, vif)),
                });
            match worst {
                Some((slot, vif)) if vif > self.threshold && active.len() > 1 => {
                    let column = active.remove(slot);
                    removals.push(VifRemoval {
                        iteration: removals.len() + 1,
                        feature: names[column].clone(),
                        vif,
                    });
                }
                _ => {
                    let final_scores = active
                        .iter()
                        .zip(scores)
                        .map(|(&column, vif)| VifScore {
                            feature: names[column].clone(),
                            vif,
                        })
                        .collect();
                    return Ok(VifOutcome {
                        kept: active,
                        removals,
                        final_scores,
                    });
                }
            }
        }
    }
}

/// VIF of every `active` column of a centered Gram matrix, computed from the
/// residual sum of squares of that column regressed on the other active columns.
#[must_use]
pub fn variance_inflation(gram: &Array2<f64>, active: &[usize]) -> Vec<f64> {
    let scale = active
        .iter()
        .fold(0.0_f64, |acc, &column| acc.max(gram[[column, column]].abs()));
    active
        .iter()
        .map(|&column| {
            let total = gram[[column, column]];
            if !(total > f64::EPSILON * scale) {
                return f64::INFINITY;
            }
            let others: Vec<usize> = active.iter().copied().filter(|&o| o != column).collect();
            if others.is_empty() {
                return 1.0;
            }
            let block = gram.select(Axis(0), &others).select(Axis(1), &others);
            let cross: Array1<f64> = others.iter().map(|&o| gram[[o, column]]).collect();
            let explained = solve_gram(&block, &cross).coefficients.dot(&cross);
            let residual = total - explained;
            if residual <= ALIAS_TOLERANCE * total {
                f64::INFINITY
            } else {
                total / residual
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures;
    use approx::assert_abs_diff_eq;

    fn noise(i: usize, k: f64) -> f64 {
        ((i as f64) * k).sin() * 10.0 + ((i as f64) * k * 2.7).cos() * 3.0
    }

    #[test]
    fn collinear_pair_loses_exactly_one_member() {
        let dataset = fixtures::dataset(
            &["T1", "T1_scaled", "RH_6", "Windspeed"],
            200,
            |i| {
                let base = noise(i, 0.31);
                vec![base, 2.0 * base + 1.0, noise(i, 1.17), noise(i, 2.53)]
            },
            |i| i as f64,
        );
        let outcome = VifPruner::default().prune(&dataset).unwrap();
        assert_eq!(outcome.removals.len(), 1);
        assert_eq!(outcome.removals[0].feature, "T1_scaled");
        assert_eq!(outcome.removals[0].iteration, 1);
        assert!(outcome.removals[0].vif.is_infinite());
        assert_eq!(outcome.kept, vec![0, 2, 3]);
        assert_eq!(outcome.kept_names(), ["T1", "RH_6", "Windspeed"]);
        assert!(outcome
            .final_scores
            .iter()
            .all(|score| score.vif <= DEFAULT_VIF_THRESHOLD));
    }

    #[test]
    fn exact_duplicate_keeps_the_earlier_column() {
        let dataset = fixtures::dataset(
            &["rv1", "RH_6", "rv2"],
            120,
            |i| {
                let radiation = noise(i, 0.83).abs();
                vec![radiation, noise(i, 1.41), radiation]
            },
            |_| 0.0,
        );
        let outcome = VifPruner::default().prune(&dataset).unwrap();
        assert_eq!(outcome.removals.len(), 1);
        assert_eq!(outcome.removals[0].feature, "rv2");
        assert_eq!(outcome.kept_names(), ["rv1", "RH_6"]);
    }

    #[test]
    fn orthogonal_columns_have_unit_vif() {
        // Centered columns [-1, 1, -1, 1] and [-1, -1, 1, 1] are orthogonal.
        let dataset = fixtures::dataset(
            &["a", "b"],
            4,
            |i| vec![(i % 2) as f64, (i / 2) as f64],
            |_| 0.0,
        );
        let outcome = VifPruner::default().prune(&dataset).unwrap();
        assert!(outcome.removals.is_empty());
        for score in &outcome.final_scores {
            assert_abs_diff_eq!(score.vif, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn constant_column_is_removed_first() {
        let dataset = fixtures::dataset(
            &["a", "flat", "b"],
            50,
            |i| vec![noise(i, 0.7), 3.0, noise(i, 1.9)],
            |_| 0.0,
        );
        let outcome = VifPruner::new(10.0).unwrap().prune(&dataset).unwrap();
        assert_eq!(outcome.removals.len(), 1);
        assert_eq!(outcome.removals[0].feature, "flat");
    }

    #[test]
    fn too_few_candidates_is_a_config_error() {
        let dataset = fixtures::dataset(&["a"], 5, |i| vec![i as f64], |_| 0.0);
        assert!(matches!(
            VifPruner::default().prune(&dataset),
            Err(ForecastError::Config(_))
        ));
        assert!(VifPruner::new(0.5).is_err());
    }

    #[test]
    fn pruning_is_deterministic() {
        let dataset = fixtures::dataset(
            &["a", "b", "c", "d"],
            80,
            |i| {
                let x = noise(i, 0.45);
                vec![x, x + noise(i, 3.1) * 0.05, noise(i, 1.3), x - noise(i, 1.3)]
            },
            |_| 0.0,
        );
        let first = VifPruner::default().prune(&dataset).unwrap();
        let second = VifPruner::default().prune(&dataset).unwrap();
        assert_eq!(first, second);
    }
}
