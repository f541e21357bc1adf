use ndarray::{Array1, Array2, Axis};

/// Relative residual below which a column counts as linearly dependent.
pub const ALIAS_TOLERANCE: f64 = 1e-10;

/// Solution of a symmetric positive semi-definite system.
#[derive(Debug, Clone)]
pub struct GramSolution {
    /// Solution vector; aliased positions hold zero.
    pub coefficients: Array1<f64>,
    /// Columns dependent on earlier columns, in ascending order.
    pub aliased: Vec<usize>,
}

/// Column means and the centered cross-product matrix `Xcᵀ·Xc`.
///
/// Returns `None` for a matrix without rows.
#[must_use]
pub fn centered_gram(matrix: &Array2<f64>) -> Option<(Array1<f64>, Array2<f64>, Array2<f64>)> {
    let means = matrix.mean_axis(Axis(0))?;
    let centered = matrix - &means;
    let gram = centered.t().dot(&centered);
    Some((means, centered, gram))
}

/// Solves `A·x = b` for a symmetric PSD `A` with an incremental Cholesky
/// factorization. A column whose residual pivot collapses relative to its
/// diagonal is aliased: it is left out of the factor and its coefficient is 0.
#[must_use]
pub fn solve_gram(gram: &Array2<f64>, rhs: &Array1<f64>) -> GramSolution {
    let size = gram.nrows();
    let scale = gram
        .diag()
        .iter()
        .fold(0.0_f64, |acc, value| acc.max(value.abs()));
    let mut active: Vec<usize> = Vec::with_capacity(size);
    let mut factor: Vec<Vec<f64>> = Vec::with_capacity(size);
    let mut aliased = Vec::new();

    for col in 0..size {
        let diagonal = gram[[col, col]];
        let mut row = Vec::with_capacity(active.len() + 1);
        for (i, &prior) in active.iter().enumerate() {
            let mut value = gram[[prior, col]];
            for j in 0..i {
                value -= factor[i][j] * row[j];
            }
            row.push(value / factor[i][i]);
        }
        let residual = diagonal - row.iter().map(|v| v * v).sum::<f64>();
        if !(diagonal > f64::EPSILON * scale) || !(residual > ALIAS_TOLERANCE * diagonal) {
            aliased.push(col);
            continue;
        }
        row.push(residual.sqrt());
        factor.push(row);
        active.push(col);
    }

    let rank = active.len();
    let mut forward = vec![0.0; rank];
    for i in 0..rank {
        let mut value = rhs[active[i]];
        for j in 0..i {
            value -= factor[i][j] * forward[j];
        }
        forward[i] = value / factor[i][i];
    }
    let mut backward = vec![0.0; rank];
    for i in (0..rank).rev() {
        let mut value = forward[i];
        for j in (i + 1)..rank {
            value -= factor[j][i] * backward[j];
        }
        backward[i] = value / factor[i][i];
    }

    let mut coefficients = Array1::zeros(size);
    for (slot, &col) in active.iter().enumerate() {
        coefficients[col] = backward[slot];
    }
    GramSolution {
        coefficients,
        aliased,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array2};

    #[test]
    fn solves_well_conditioned_system() {
        let gram = array![[4.0, 2.0], [2.0, 3.0]];
        let rhs = array![2.0, 5.0];
        let solution = solve_gram(&gram, &rhs);
        assert!(solution.aliased.is_empty());
        assert_abs_diff_eq!(solution.coefficients[0], -0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(solution.coefficients[1], 2.0, epsilon = 1e-12);
    }

    #[test]
    fn aliases_dependent_column() {
        // Column 1 is exactly twice column 0.
        let x = array![[1.0, 2.0, 0.5], [2.0, 4.0, -1.0], [3.0, 6.0, 2.0], [4.0, 8.0, 0.0]];
        let (_, centered, gram) = centered_gram(&x).unwrap();
        let y = centered.column(0).to_owned() * 3.0;
        let rhs = centered.t().dot(&y);
        let solution = solve_gram(&gram, &rhs);
        assert_eq!(solution.aliased, vec![1]);
        assert_abs_diff_eq!(solution.coefficients[0], 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(solution.coefficients[1], 0.0);
        assert_abs_diff_eq!(solution.coefficients[2], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn empty_matrix_has_no_gram() {
        let x = Array2::<f64>::zeros((0, 3));
        assert!(centered_gram(&x).is_none());
    }
}
