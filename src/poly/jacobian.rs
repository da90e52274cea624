use crate::domains::Ring;

use super::polynomial::MultivariatePolynomial;

/// Compute the matrix of partial derivatives `J[i][j] = d F_i / d X_j`.
pub fn jacobian_matrix<F: Ring>(
    map: &[MultivariatePolynomial<F>],
) -> Vec<Vec<MultivariatePolynomial<F>>> {
    map.iter()
        .map(|f| (0..f.nvars()).map(|j| f.derivative(j)).collect())
        .collect()
}

/// Compute the determinant of the Jacobian matrix of `map`.
///
/// The rows are expanded one at a time, memoising the partial determinants
/// over the set of columns that are already used. This takes `2^n * n`
/// polynomial products instead of `n!`.
pub fn jacobian_determinant<F: Ring>(map: &[MultivariatePolynomial<F>]) -> MultivariatePolynomial<F> {
    let n = map.len();
    assert!(n < usize::BITS as usize, "too many coordinates");

    let Some(first) = map.first() else {
        panic!("empty map has no Jacobian");
    };

    let jac = jacobian_matrix(map);

    // partial[mask] is the signed sum over all assignments of the first popcount(mask) rows
    // to the columns in mask
    let mut partial: Vec<Option<MultivariatePolynomial<F>>> = vec![None; 1 << n];
    partial[0] = Some(first.one());

    for mask in 0usize..(1 << n) {
        let row = mask.count_ones() as usize;
        if row >= n {
            continue;
        }

        let Some(current) = partial[mask].take() else {
            continue;
        };

        for col in 0..n {
            if mask & (1 << col) != 0 || jac[row][col].is_zero() {
                continue;
            }

            let mut term = &current * &jac[row][col];
            // each used column to the right of `col` is an inversion
            if (mask >> (col + 1)).count_ones() % 2 == 1 {
                term = -term;
            }

            let next = mask | (1 << col);
            partial[next] = Some(match partial[next].take() {
                Some(acc) => acc + term,
                None => term,
            });
        }
    }

    partial[(1 << n) - 1]
        .take()
        .unwrap_or_else(|| first.zero())
}

/// Check if the Jacobian determinant is the constant `1`.
pub fn has_unit_jacobian<F: Ring>(map: &[MultivariatePolynomial<F>]) -> bool {
    let det = jacobian_determinant(map);
    det.is_constant() && det.field.is_one(&det.get_constant())
}
