//! Batched 2nd/4th-order tensor operations.
//!
//! Every function works pointwise over the element × point batch of its
//! inputs. Dimensions 1, 2 and 3 are supported wherever the operation makes
//! sense; closed-form determinants and inverses are limited to 1×1, 2×2 and
//! 3×3 matrices.

use super::field::{BatchStrategy, TensorField};
use crate::error::{Result, SolverError};

/// Dyadic product flavour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DyadicMode {
    /// `a_i b_j` of two vectors.
    Vector,
    /// `A_ij B_kl` of two matrices.
    Matrix,
}

/// Options for [`inv`].
#[derive(Debug, Clone, Copy, Default)]
pub struct InverseOptions<'a> {
    /// Precomputed determinant (scalar field) used instead of evaluating it.
    pub determinant: Option<&'a TensorField>,
    /// Mirror the upper triangle of the adjugate instead of computing the
    /// lower one.
    pub symmetric: bool,
}

fn square_dim(a: &TensorField, op: &str) -> Result<usize> {
    match a.shape() {
        [m, n] if m == n => Ok(*m),
        shape => Err(SolverError::shape(format!(
            "{op} needs square matrices, got shape {shape:?}"
        ))),
    }
}

fn small_square_dim(a: &TensorField, op: &str) -> Result<usize> {
    let dim = square_dim(a, op)?;
    if !(1..=3).contains(&dim) {
        return Err(SolverError::shape(format!(
            "{op} is only defined for (1, 1), (2, 2) or (3, 3) matrices, got ({dim}, {dim})"
        )));
    }
    Ok(dim)
}

fn fourth_order_dim(a: &TensorField, op: &str) -> Result<usize> {
    match a.shape() {
        [d, e, f, g] if d == e && e == f && f == g => Ok(*d),
        shape => Err(SolverError::shape(format!(
            "{op} needs a 4th-order tensor with equal dimensions, got shape {shape:?}"
        ))),
    }
}

/// Identity matrix of dimension `dim` repeated over the batch.
pub fn identity(dim: usize, n_elements: usize, n_points: usize) -> TensorField {
    let mut eye = vec![0.0; dim * dim];
    for i in 0..dim {
        eye[i * dim + i] = 1.0;
    }
    let mut out = TensorField::zeros(&[dim, dim], n_elements, n_points);
    for b in 0..out.batch_len() {
        out.point_mut(b).copy_from_slice(&eye);
    }
    out
}

/// Identity matching the dimension and batch of a square-matrix field.
pub fn identity_like(a: &TensorField) -> Result<TensorField> {
    let dim = square_dim(a, "identity")?;
    Ok(identity(dim, a.n_elements(), a.n_points()))
}

/// Transpose of a 2nd-order field.
pub fn transpose(a: &TensorField) -> Result<TensorField> {
    let (m, n) = match a.shape() {
        [m, n] => (*m, *n),
        shape => {
            return Err(SolverError::shape(format!(
                "transpose needs a 2nd-order tensor, got shape {shape:?}"
            )))
        }
    };
    Ok(a.map_points(&[n, m], BatchStrategy::Serial, |x, o| {
        for i in 0..m {
            for j in 0..n {
                o[j * m + i] = x[i * n + j];
            }
        }
    }))
}

/// Major transpose `A_ijkl -> A_klij` of a 4th-order field.
pub fn majortranspose(a: &TensorField) -> Result<TensorField> {
    let d = fourth_order_dim(a, "majortranspose")?;
    let d2 = d * d;
    Ok(a.map_points(a.shape(), BatchStrategy::Serial, |x, o| {
        for ij in 0..d2 {
            for kl in 0..d2 {
                o[ij * d2 + kl] = x[kl * d2 + ij];
            }
        }
    }))
}

/// Symmetric part `(A + Aᵀ) / 2`.
pub fn sym(a: &TensorField) -> Result<TensorField> {
    let d = square_dim(a, "sym")?;
    Ok(a.map_points(a.shape(), BatchStrategy::Serial, |x, o| {
        for i in 0..d {
            for j in 0..d {
                o[i * d + j] = 0.5 * (x[i * d + j] + x[j * d + i]);
            }
        }
    }))
}

/// Sum of the diagonal, as a scalar field.
pub fn trace(a: &TensorField) -> Result<TensorField> {
    let d = square_dim(a, "trace")?;
    Ok(a.map_points(&[], BatchStrategy::Serial, |x, o| {
        o[0] = (0..d).map(|i| x[i * d + i]).sum();
    }))
}

/// Deviator `A - tr(A)/dim · 1`.
pub fn dev(a: &TensorField) -> Result<TensorField> {
    let d = square_dim(a, "dev")?;
    Ok(a.map_points(a.shape(), BatchStrategy::Serial, |x, o| {
        let mean = (0..d).map(|i| x[i * d + i]).sum::<f64>() / d as f64;
        o.copy_from_slice(x);
        for i in 0..d {
            o[i * d + i] -= mean;
        }
    }))
}

/// Dyadic (outer) product of two vectors or two matrices.
pub fn dya(
    a: &TensorField,
    b: &TensorField,
    mode: DyadicMode,
    strategy: BatchStrategy,
) -> Result<TensorField> {
    let rank = match mode {
        DyadicMode::Vector => 1,
        DyadicMode::Matrix => 2,
    };
    if a.rank() != rank || b.rank() != rank {
        return Err(SolverError::shape(format!(
            "dya({mode:?}) got shapes {:?} and {:?}",
            a.shape(),
            b.shape()
        )));
    }
    let shape: Vec<usize> = a.shape().iter().chain(b.shape()).copied().collect();
    let bs = b.size();
    a.zip_points(b, &shape, strategy, |x, y, o| {
        for (i, xi) in x.iter().enumerate() {
            for (j, yj) in y.iter().enumerate() {
                o[i * bs + j] = xi * yj;
            }
        }
    })
}

fn crossed(
    a: &TensorField,
    b: &TensorField,
    strategy: BatchStrategy,
    op: &str,
    ik: bool,
) -> Result<TensorField> {
    let d = square_dim(a, op)?;
    if square_dim(b, op)? != d {
        return Err(SolverError::shape(format!(
            "{op} needs matrices of equal dimension, got {:?} and {:?}",
            a.shape(),
            b.shape()
        )));
    }
    a.zip_points(b, &[d, d, d, d], strategy, |x, y, o| {
        for i in 0..d {
            for j in 0..d {
                for k in 0..d {
                    for l in 0..d {
                        o[((i * d + j) * d + k) * d + l] = if ik {
                            x[i * d + k] * y[j * d + l]
                        } else {
                            x[i * d + l] * y[k * d + j]
                        };
                    }
                }
            }
        }
    })
}

/// Crossed dyadic product `(A ⊙ B)_ijkl = A_ik B_jl`.
pub fn cdya_ik(a: &TensorField, b: &TensorField, strategy: BatchStrategy) -> Result<TensorField> {
    crossed(a, b, strategy, "cdya_ik", true)
}

/// Crossed dyadic product `(A ⊙ B)_ijkl = A_il B_kj`.
pub fn cdya_il(a: &TensorField, b: &TensorField, strategy: BatchStrategy) -> Result<TensorField> {
    crossed(a, b, strategy, "cdya_il", false)
}

/// Symmetric crossed dyadic product `(cdya_ik + cdya_il) / 2`.
pub fn cdya(a: &TensorField, b: &TensorField, strategy: BatchStrategy) -> Result<TensorField> {
    let ik = cdya_ik(a, b, strategy)?;
    let il = cdya_il(a, b, strategy)?;
    Ok(ik.add(&il)?.scale(0.5))
}

fn det_point(x: &[f64], d: usize) -> f64 {
    match d {
        1 => x[0],
        2 => x[0] * x[3] - x[2] * x[1],
        _ => {
            x[0] * x[4] * x[8] + x[1] * x[5] * x[6] + x[2] * x[3] * x[7]
                - x[6] * x[4] * x[2]
                - x[7] * x[5] * x[0]
                - x[8] * x[3] * x[1]
        }
    }
}

/// Adjugate (`det(A) · A⁻¹`) by cofactor expansion.
fn adjugate_point(x: &[f64], d: usize, symmetric: bool, o: &mut [f64]) {
    match d {
        1 => o[0] = 1.0,
        2 => {
            o[0] = x[3];
            o[1] = -x[1];
            o[2] = -x[2];
            o[3] = x[0];
        }
        _ => {
            let a = |i: usize, j: usize| x[i * 3 + j];
            o[0] = a(1, 1) * a(2, 2) - a(1, 2) * a(2, 1);
            o[4] = a(0, 0) * a(2, 2) - a(0, 2) * a(2, 0);
            o[8] = a(0, 0) * a(1, 1) - a(0, 1) * a(1, 0);
            o[1] = a(0, 2) * a(2, 1) - a(0, 1) * a(2, 2);
            o[2] = a(0, 1) * a(1, 2) - a(0, 2) * a(1, 1);
            o[5] = a(0, 2) * a(1, 0) - a(0, 0) * a(1, 2);
            if symmetric {
                o[3] = o[1];
                o[6] = o[2];
                o[7] = o[5];
            } else {
                o[3] = a(2, 0) * a(1, 2) - a(1, 0) * a(2, 2);
                o[6] = a(1, 0) * a(2, 1) - a(2, 0) * a(1, 1);
                o[7] = a(2, 0) * a(0, 1) - a(0, 0) * a(2, 1);
            }
        }
    }
}

/// Determinant of 1×1, 2×2 or 3×3 matrices, as a scalar field.
pub fn det(a: &TensorField) -> Result<TensorField> {
    let d = small_square_dim(a, "det")?;
    Ok(a.map_points(&[], BatchStrategy::Serial, |x, o| o[0] = det_point(x, d)))
}

/// Inverse of 1×1, 2×2 or 3×3 matrices.
pub fn inv(a: &TensorField, options: InverseOptions<'_>) -> Result<TensorField> {
    let d = small_square_dim(a, "inv")?;
    let symmetric = options.symmetric;
    match options.determinant {
        Some(determinant) => {
            if determinant.rank() != 0 {
                return Err(SolverError::shape("determinant must be a scalar field"));
            }
            a.zip_points(determinant, a.shape(), BatchStrategy::Serial, |x, dt, o| {
                adjugate_point(x, d, symmetric, o);
                o.iter_mut().for_each(|v| *v /= dt[0]);
            })
        }
        None => Ok(a.map_points(a.shape(), BatchStrategy::Serial, |x, o| {
            adjugate_point(x, d, symmetric, o);
            let dt = det_point(x, d);
            o.iter_mut().for_each(|v| *v /= dt);
        })),
    }
}

/// Inverse and determinant computed in one pass.
pub fn inv_and_det(a: &TensorField, symmetric: bool) -> Result<(TensorField, TensorField)> {
    let d = small_square_dim(a, "inv")?;
    let size = d * d;
    let packed = a.map_points(&[size + 1], BatchStrategy::Serial, |x, o| {
        let dt = det_point(x, d);
        adjugate_point(x, d, symmetric, &mut o[..size]);
        o[..size].iter_mut().for_each(|v| *v /= dt);
        o[size] = dt;
    });
    let inverse = packed.map_points(&[d, d], BatchStrategy::Serial, |x, o| {
        o.copy_from_slice(&x[..size])
    });
    let determinant = packed.map_points(&[], BatchStrategy::Serial, |x, o| o[0] = x[size]);
    Ok((inverse, determinant))
}

/// Cofactor matrix `det(A) · A⁻ᵀ`.
pub fn cof(a: &TensorField) -> Result<TensorField> {
    let d = small_square_dim(a, "cof")?;
    Ok(a.map_points(a.shape(), BatchStrategy::Serial, |x, o| {
        let mut adj = [0.0; 9];
        adjugate_point(x, d, false, &mut adj[..d * d]);
        for i in 0..d {
            for j in 0..d {
                o[i * d + j] = adj[j * d + i];
            }
        }
    }))
}

/// Cross product of two 3D vector fields.
pub fn cross(a: &TensorField, b: &TensorField) -> Result<TensorField> {
    if a.shape() != [3] || b.shape() != [3] {
        return Err(SolverError::shape(format!(
            "cross needs 3D vectors, got {:?} and {:?}",
            a.shape(),
            b.shape()
        )));
    }
    a.zip_points(b, &[3], BatchStrategy::Serial, |x, y, o| {
        o[0] = x[1] * y[2] - x[2] * y[1];
        o[1] = x[2] * y[0] - x[0] * y[2];
        o[2] = x[0] * y[1] - x[1] * y[0];
    })
}

fn voigt_pairs(dim: usize) -> &'static [(usize, usize)] {
    if dim == 2 {
        &[(0, 0), (1, 1), (0, 1)]
    } else {
        &[(0, 0), (1, 1), (2, 2), (0, 1), (1, 2), (0, 2)]
    }
}

/// Voigt vector of symmetric (2, 2) or (3, 3) tensors.
///
/// Shear components are doubled when `strain` is set.
pub fn tovoigt(a: &TensorField, strain: bool) -> Result<TensorField> {
    let d = square_dim(a, "tovoigt")?;
    if d != 2 && d != 3 {
        return Err(SolverError::shape(format!(
            "tovoigt needs (2, 2) or (3, 3) tensors, got ({d}, {d})"
        )));
    }
    let pairs = voigt_pairs(d);
    Ok(a.map_points(&[pairs.len()], BatchStrategy::Serial, |x, o| {
        for (n, &(i, j)) in pairs.iter().enumerate() {
            let factor = if strain && n >= d { 2.0 } else { 1.0 };
            o[n] = factor * x[i * d + j];
        }
    }))
}

/// Symmetric tensor from a 3- or 6-component Voigt vector; inverse of [`tovoigt`].
pub fn from_voigt(v: &TensorField, strain: bool) -> Result<TensorField> {
    let d = match v.shape() {
        [3] => 2,
        [6] => 3,
        shape => {
            return Err(SolverError::shape(format!(
                "from_voigt needs 3 or 6 components, got shape {shape:?}"
            )))
        }
    };
    let pairs = voigt_pairs(d);
    Ok(v.map_points(&[d, d], BatchStrategy::Serial, |x, o| {
        for (n, &(i, j)) in pairs.iter().enumerate() {
            let factor = if strain && n >= d { 0.5 } else { 1.0 };
            o[i * d + j] = factor * x[n];
            o[j * d + i] = factor * x[n];
        }
    }))
}

/// Equivalent von Mises value `sqrt(3/2 · dev(A) : dev(A))`.
///
/// 2×2 matrices are zero-padded to 3×3 first.
pub fn equivalent_von_mises(a: &TensorField) -> Result<TensorField> {
    let d = square_dim(a, "equivalent_von_mises")?;
    if d != 2 && d != 3 {
        return Err(SolverError::shape(format!(
            "square matrices must be two- or three-dimensional, got ({d}, {d})"
        )));
    }
    Ok(a.map_points(&[], BatchStrategy::Serial, |x, o| {
        let mut m = [0.0; 9];
        for i in 0..d {
            for j in 0..d {
                m[i * 3 + j] = x[i * d + j];
            }
        }
        let mean = (m[0] + m[4] + m[8]) / 3.0;
        m[0] -= mean;
        m[4] -= mean;
        m[8] -= mean;
        o[0] = (1.5 * m.iter().map(|v| v * v).sum::<f64>()).sqrt();
    }))
}

/// Minor-symmetric part of a 4th-order tensor: the average of
/// `A_ijkl`, `A_jikl`, `A_ijlk` and `A_jilk`.
pub fn minor_symmetrize(a: &TensorField) -> Result<TensorField> {
    let d = fourth_order_dim(a, "minor_symmetrize")?;
    let idx = move |i: usize, j: usize, k: usize, l: usize| ((i * d + j) * d + k) * d + l;
    Ok(a.map_points(a.shape(), BatchStrategy::Serial, |x, o| {
        for i in 0..d {
            for j in 0..d {
                for k in 0..d {
                    for l in 0..d {
                        o[idx(i, j, k, l)] = 0.25
                            * (x[idx(i, j, k, l)]
                                + x[idx(j, i, k, l)]
                                + x[idx(i, j, l, k)]
                                + x[idx(j, i, l, k)]);
                    }
                }
            }
        }
    }))
}

/// `num` evenly spaced values from `start` to `stop`, both included.
pub fn linsteps(start: f64, stop: f64, num: usize) -> Vec<f64> {
    match num {
        0 => Vec::new(),
        1 => vec![stop],
        _ => (0..num)
            .map(|i| start + (stop - start) * i as f64 / (num - 1) as f64)
            .collect(),
    }
}
