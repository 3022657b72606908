//! Per-point eigendecompositions of square matrix fields.

use super::field::{BatchStrategy, TensorField};
use crate::error::{Result, SolverError};
use nalgebra::DMatrix;

/// Eigenvalues (ascending) and eigenvectors of a matrix field.
///
/// `vectors` has shape `[dim, dim]`; row `k` holds the unit eigenvector
/// belonging to eigenvalue `k`.
#[derive(Debug, Clone)]
pub struct Eigen {
    pub values: TensorField,
    pub vectors: TensorField,
}

fn dimension(a: &TensorField) -> Result<usize> {
    match a.shape() {
        [m, n] if m == n && (1..=3).contains(m) => Ok(*m),
        shape => Err(SolverError::shape(format!(
            "eigendecomposition needs (1, 1), (2, 2) or (3, 3) matrices, got {shape:?}"
        ))),
    }
}

/// Index pairs of principal differences appended by the `shear` option.
fn shear_pairs(dim: usize) -> &'static [(usize, usize)] {
    match dim {
        3 => &[(1, 0), (2, 0), (2, 1)],
        2 => &[(1, 0)],
        _ => &[],
    }
}

fn ascending(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&i, &j| values[i].total_cmp(&values[j]));
    order
}

/// Symmetric eigenpairs `(values, vectors-as-rows)` of one point.
fn symmetric_point(x: &[f64], dim: usize) -> (Vec<f64>, Vec<f64>) {
    let m = DMatrix::from_row_slice(dim, dim, x);
    let decomposition = m.symmetric_eigen();
    let values = decomposition.eigenvalues.as_slice().to_vec();
    let order = ascending(&values);
    let mut vectors = vec![0.0; dim * dim];
    for (row, &k) in order.iter().enumerate() {
        for c in 0..dim {
            vectors[row * dim + c] = decomposition.eigenvectors[(c, k)];
        }
    }
    (order.iter().map(|&k| values[k]).collect(), vectors)
}

/// Real eigenpairs of one general point, `None` on a complex spectrum.
fn general_point(x: &[f64], dim: usize) -> Option<(Vec<f64>, Vec<f64>)> {
    let m = DMatrix::from_row_slice(dim, dim, x);
    let raw = m.eigenvalues()?;
    let mut values: Vec<f64> = raw.iter().copied().collect();
    values.sort_by(f64::total_cmp);
    let mut vectors = vec![0.0; dim * dim];
    for (row, &lambda) in values.iter().enumerate() {
        // right singular vector of the smallest singular value spans the null space
        let shifted = &m - DMatrix::identity(dim, dim) * lambda;
        let svd = shifted.svd(false, true);
        let v_t = svd.v_t?;
        let (k, _) = svd
            .singular_values
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))?;
        let v = v_t.row(k);
        let norm = v.norm();
        for c in 0..dim {
            vectors[row * dim + c] = v[c] / norm;
        }
    }
    Some((values, vectors))
}

fn with_shear(values: &[f64], dim: usize) -> Vec<f64> {
    let mut out = values.to_vec();
    out.extend(shear_pairs(dim).iter().map(|&(i, j)| values[i] - values[j]));
    out
}

fn split(a: &TensorField, dim: usize, pairs: Vec<(Vec<f64>, Vec<f64>)>) -> Result<Eigen> {
    let (ne, np) = (a.n_elements(), a.n_points());
    let mut values = Vec::with_capacity(dim * pairs.len());
    let mut vectors = Vec::with_capacity(dim * dim * pairs.len());
    for (w, v) in pairs {
        values.extend(w);
        vectors.extend(v);
    }
    Ok(Eigen {
        values: TensorField::from_data(&[dim], ne, np, values)?,
        vectors: TensorField::from_data(&[dim, dim], ne, np, vectors)?,
    })
}

/// Eigenpairs of symmetric matrices.
pub fn eigh(a: &TensorField, strategy: BatchStrategy) -> Result<Eigen> {
    let dim = dimension(a)?;
    let pairs = strategy.map_indexed(a.batch_len(), |b| Ok(symmetric_point(a.point(b), dim)))?;
    split(a, dim, pairs)
}

/// Eigenvalues of symmetric matrices, optionally followed by principal
/// differences.
pub fn eigvalsh(a: &TensorField, shear: bool, strategy: BatchStrategy) -> Result<TensorField> {
    let dim = dimension(a)?;
    let width = if shear { dim + shear_pairs(dim).len() } else { dim };
    Ok(a.map_points(&[width], strategy, |x, o| {
        let (values, _) = symmetric_point(x, dim);
        if shear {
            o.copy_from_slice(&with_shear(&values, dim));
        } else {
            o.copy_from_slice(&values);
        }
    }))
}

/// Eigenpairs of general matrices with a real spectrum.
pub fn eig(a: &TensorField, strategy: BatchStrategy) -> Result<Eigen> {
    let dim = dimension(a)?;
    let pairs = strategy.map_indexed(a.batch_len(), |b| {
        general_point(a.point(b), dim).ok_or_else(|| {
            SolverError::NonRealSpectrum(format!("complex eigenvalues at batch index {b}"))
        })
    })?;
    split(a, dim, pairs)
}

/// Eigenvalues of general matrices with a real spectrum.
pub fn eigvals(a: &TensorField, shear: bool, strategy: BatchStrategy) -> Result<TensorField> {
    let dim = dimension(a)?;
    let e = eig(a, strategy)?;
    if !shear {
        return Ok(e.values);
    }
    let width = dim + shear_pairs(dim).len();
    Ok(e.values
        .map_points(&[width], BatchStrategy::Serial, |x, o| {
            o.copy_from_slice(&with_shear(x, dim))
        }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagonal_matrix_values_are_sorted() {
        let a = TensorField::from_data(
            &[3, 3],
            1,
            1,
            vec![3.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 2.0],
        )
        .unwrap();
        let w = eigvalsh(&a, false, BatchStrategy::Serial).unwrap();
        assert_eq!(w.as_slice(), &[1.0, 2.0, 3.0]);
        let with = eigvalsh(&a, true, BatchStrategy::Serial).unwrap();
        assert_eq!(with.as_slice(), &[1.0, 2.0, 3.0, 1.0, 2.0, 1.0]);
    }

    #[test]
    fn eigenvector_rows_satisfy_definition() {
        let data = vec![2.0, 1.0, 0.0, 1.0, 2.0, 0.0, 0.0, 0.0, 5.0];
        let a = TensorField::from_data(&[3, 3], 1, 1, data.clone()).unwrap();
        let e = eigh(&a, BatchStrategy::Serial).unwrap();
        let m = DMatrix::from_row_slice(3, 3, &data);
        for k in 0..3 {
            let v = nalgebra::DVector::from_row_slice(&e.vectors.point(0)[k * 3..k * 3 + 3]);
            let lambda = e.values.point(0)[k];
            assert!((&m * &v - v.clone() * lambda).norm() < 1e-10);
        }
    }

    #[test]
    fn general_eig_of_triangular_matrix() {
        let a = TensorField::from_data(&[2, 2], 1, 1, vec![1.0, 4.0, 0.0, 3.0]).unwrap();
        let w = eigvals(&a, true, BatchStrategy::Serial).unwrap();
        assert!((w.point(0)[0] - 1.0).abs() < 1e-10);
        assert!((w.point(0)[1] - 3.0).abs() < 1e-10);
        assert!((w.point(0)[2] - 2.0).abs() < 1e-10);
    }

    /// Non-symmetric `S diag(w) S⁻¹` with a known real spectrum.
    fn similar_to_diagonal(w: [f64; 3]) -> Vec<f64> {
        let s = DMatrix::from_row_slice(3, 3, &[1.0, 1.0, 0.0, 0.0, 1.0, 1.0, 1.0, 0.0, 2.0]);
        let s_inv = s.clone().try_inverse().unwrap();
        let a = &s * DMatrix::from_diagonal(&nalgebra::DVector::from_row_slice(&w)) * s_inv;
        let mut data = Vec::with_capacity(9);
        for i in 0..3 {
            for j in 0..3 {
                data.push(a[(i, j)]);
            }
        }
        data
    }

    #[test]
    fn general_eigenvectors_satisfy_definition() {
        let first = similar_to_diagonal([5.0, 1.0, 2.0]);
        let second = similar_to_diagonal([-1.0, 0.5, 3.0]);
        assert!((first[1] - first[3]).abs() > 1e-3, "matrix must not be symmetric");
        let data: Vec<f64> = first.iter().chain(&second).copied().collect();
        let a = TensorField::from_data(&[3, 3], 1, 2, data).unwrap();
        let e = eig(&a, BatchStrategy::Parallel).unwrap();

        let expected = [[1.0, 2.0, 5.0], [-1.0, 0.5, 3.0]];
        for (b, values) in expected.iter().enumerate() {
            let m = DMatrix::from_row_slice(3, 3, a.point(b));
            for k in 0..3 {
                let lambda = e.values.point(b)[k];
                assert!((lambda - values[k]).abs() < 1e-9, "λ{k} = {lambda}");
                let v = nalgebra::DVector::from_row_slice(&e.vectors.point(b)[k * 3..k * 3 + 3]);
                assert!((v.norm() - 1.0).abs() < 1e-12);
                assert!((&m * &v - v.clone() * lambda).norm() < 1e-8);
            }
        }
    }

    #[test]
    fn shear_differences_follow_pair_order() {
        // (1, 0), (2, 0), (2, 1) of the ascending values 1, 4, 9
        let a = TensorField::from_data(&[3, 3], 1, 1, similar_to_diagonal([9.0, 1.0, 4.0]))
            .unwrap();
        let w = eigvals(&a, true, BatchStrategy::Serial).unwrap();
        for (got, want) in w.point(0).iter().zip([1.0, 4.0, 9.0, 3.0, 8.0, 5.0]) {
            assert!((got - want).abs() < 1e-9, "{:?}", w.point(0));
        }

        let s = TensorField::from_data(
            &[3, 3],
            1,
            1,
            vec![9.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 4.0],
        )
        .unwrap();
        let ws = eigvalsh(&s, true, BatchStrategy::Serial).unwrap();
        assert_eq!(ws.as_slice(), &[1.0, 4.0, 9.0, 3.0, 8.0, 5.0]);

        let plane = TensorField::from_data(&[2, 2], 1, 1, vec![6.0, 0.0, 0.0, 2.0]).unwrap();
        let wp = eigvalsh(&plane, true, BatchStrategy::Serial).unwrap();
        assert_eq!(wp.as_slice(), &[2.0, 6.0, 4.0]);
    }

    #[test]
    fn rotation_has_non_real_spectrum() {
        let a = TensorField::from_data(&[2, 2], 1, 1, vec![0.0, -1.0, 1.0, 0.0]).unwrap();
        assert!(matches!(
            eig(&a, BatchStrategy::Serial),
            Err(SolverError::NonRealSpectrum(_))
        ));
    }
}
