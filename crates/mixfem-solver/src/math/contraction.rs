//! Single and double contractions keyed by an explicit rank table.
//!
//! Each supported (left rank, right rank) pair maps to one index pattern,
//! written in einsum letters. Pairs outside the table are rejected with
//! [`SolverError::UnsupportedContractionMode`].

use super::field::{BatchStrategy, TensorField};
use crate::error::{Result, SolverError};

/// Modes of the single contraction [`dot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DotMode {
    /// `ik,kj->ij`
    MatrixMatrix,
    /// `i,i->`
    VectorVector,
    /// `ijkp,plmn->ijklmn`
    FourthFourth,
    /// `ij,j->i`
    MatrixVector,
    /// `i,ij->j`
    VectorMatrix,
    /// `im,mjk->ijk`
    MatrixThird,
    /// `ijm,mk->ijk`
    ThirdMatrix,
    /// `ijkl,l->ijk`
    FourthVector,
    /// `i,ijkl->jkl`
    VectorFourth,
    /// `im,mjkl->ijkl`
    MatrixFourth,
    /// `ijkm,ml->ijkl`
    FourthMatrix,
}

impl DotMode {
    /// Look up the mode for a pair of operand ranks.
    pub fn from_ranks(left: usize, right: usize) -> Result<Self> {
        Ok(match (left, right) {
            (2, 2) => Self::MatrixMatrix,
            (1, 1) => Self::VectorVector,
            (4, 4) => Self::FourthFourth,
            (2, 1) => Self::MatrixVector,
            (1, 2) => Self::VectorMatrix,
            (2, 3) => Self::MatrixThird,
            (3, 2) => Self::ThirdMatrix,
            (4, 1) => Self::FourthVector,
            (1, 4) => Self::VectorFourth,
            (2, 4) => Self::MatrixFourth,
            (4, 2) => Self::FourthMatrix,
            _ => return Err(SolverError::UnsupportedContractionMode { left, right }),
        })
    }

    fn pattern(self) -> Pattern {
        let p = |a, b, out| Pattern { a, b, out };
        match self {
            Self::MatrixMatrix => p("ik", "kj", "ij"),
            Self::VectorVector => p("i", "i", ""),
            Self::FourthFourth => p("ijkp", "plmn", "ijklmn"),
            Self::MatrixVector => p("ij", "j", "i"),
            Self::VectorMatrix => p("i", "ij", "j"),
            Self::MatrixThird => p("im", "mjk", "ijk"),
            Self::ThirdMatrix => p("ijm", "mk", "ijk"),
            Self::FourthVector => p("ijkl", "l", "ijk"),
            Self::VectorFourth => p("i", "ijkl", "jkl"),
            Self::MatrixFourth => p("im", "mjkl", "ijkl"),
            Self::FourthMatrix => p("ijkm", "ml", "ijkl"),
        }
    }
}

/// Modes of the double contraction [`ddot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdotMode {
    /// `ij,ij->`
    MatrixMatrix,
    /// `ij,ijkl->kl`
    MatrixFourth,
    /// `ijkl,kl->ij`
    FourthMatrix,
    /// `ij,ijk->k`
    MatrixThird,
    /// `ijk,jk->i`
    ThirdMatrix,
    /// `ijkl,klmn->ijmn`
    FourthFourth,
}

impl DdotMode {
    pub fn from_ranks(left: usize, right: usize) -> Result<Self> {
        Ok(match (left, right) {
            (2, 2) => Self::MatrixMatrix,
            (2, 4) => Self::MatrixFourth,
            (4, 2) => Self::FourthMatrix,
            (2, 3) => Self::MatrixThird,
            (3, 2) => Self::ThirdMatrix,
            (4, 4) => Self::FourthFourth,
            _ => return Err(SolverError::UnsupportedContractionMode { left, right }),
        })
    }

    fn pattern(self) -> Pattern {
        let p = |a, b, out| Pattern { a, b, out };
        match self {
            Self::MatrixMatrix => p("ij", "ij", ""),
            Self::MatrixFourth => p("ij", "ijkl", "kl"),
            Self::FourthMatrix => p("ijkl", "kl", "ij"),
            Self::MatrixThird => p("ij", "ijk", "k"),
            Self::ThirdMatrix => p("ijk", "jk", "i"),
            Self::FourthFourth => p("ijkl", "klmn", "ijmn"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Pattern {
    a: &'static str,
    b: &'static str,
    out: &'static str,
}

/// Row-major strides of a shape.
fn strides(shape: &[usize]) -> Vec<usize> {
    let mut s = vec![1; shape.len()];
    for k in (0..shape.len().saturating_sub(1)).rev() {
        s[k] = s[k + 1] * shape[k + 1];
    }
    s
}

fn contract(
    pattern: Pattern,
    a: &TensorField,
    b: &TensorField,
    strategy: BatchStrategy,
) -> Result<TensorField> {
    if a.rank() != pattern.a.len() || b.rank() != pattern.b.len() {
        return Err(SolverError::shape(format!(
            "operands {:?} and {:?} do not fit pattern {},{}->{}",
            a.shape(),
            b.shape(),
            pattern.a,
            pattern.b,
            pattern.out
        )));
    }

    // letter -> extent, checking that repeated letters agree
    let mut letters: Vec<char> = Vec::new();
    let mut extents: Vec<usize> = Vec::new();
    for (labels, shape) in [(pattern.a, a.shape()), (pattern.b, b.shape())] {
        for (c, &n) in labels.chars().zip(shape) {
            match letters.iter().position(|&l| l == c) {
                Some(pos) if extents[pos] != n => {
                    return Err(SolverError::shape(format!(
                        "index '{c}' has extents {} and {n} in {},{}",
                        extents[pos], pattern.a, pattern.b
                    )));
                }
                Some(_) => {}
                None => {
                    letters.push(c);
                    extents.push(n);
                }
            }
        }
    }

    let out_shape: Vec<usize> = pattern
        .out
        .chars()
        .map(|c| {
            letters
                .iter()
                .position(|&l| l == c)
                .map(|pos| extents[pos])
                .ok_or_else(|| SolverError::shape(format!("free index '{c}' not in operands")))
        })
        .collect::<Result<_>>()?;

    let letter_strides = |labels: &str, shape: &[usize]| -> Vec<usize> {
        let s = strides(shape);
        letters
            .iter()
            .map(|&l| {
                labels
                    .chars()
                    .zip(&s)
                    .filter(|(c, _)| *c == l)
                    .map(|(_, st)| *st)
                    .sum()
            })
            .collect()
    };
    let sa = letter_strides(pattern.a, a.shape());
    let sb = letter_strides(pattern.b, b.shape());
    let so = letter_strides(pattern.out, &out_shape);
    let total: usize = extents.iter().product();

    a.zip_points(b, &out_shape, strategy, |x, y, o| {
        let mut idx = vec![0usize; extents.len()];
        for _ in 0..total {
            let (mut ia, mut ib, mut io) = (0, 0, 0);
            for (k, &i) in idx.iter().enumerate() {
                ia += i * sa[k];
                ib += i * sb[k];
                io += i * so[k];
            }
            o[io] += x[ia] * y[ib];
            // odometer increment, last letter fastest
            for k in (0..idx.len()).rev() {
                idx[k] += 1;
                if idx[k] < extents[k] {
                    break;
                }
                idx[k] = 0;
            }
        }
    })
}

/// Single contraction of the last index of `a` with the first index of `b`.
pub fn dot(a: &TensorField, b: &TensorField, strategy: BatchStrategy) -> Result<TensorField> {
    let mode = DotMode::from_ranks(a.rank(), b.rank())?;
    contract(mode.pattern(), a, b, strategy)
}

/// Double contraction of the last two indices of `a` with the first two of `b`.
pub fn ddot(a: &TensorField, b: &TensorField, strategy: BatchStrategy) -> Result<TensorField> {
    let mode = DdotMode::from_ranks(a.rank(), b.rank())?;
    contract(mode.pattern(), a, b, strategy)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::tensor::identity;

    fn single(shape: &[usize], data: &[f64]) -> TensorField {
        TensorField::from_data(shape, 1, 1, data.to_vec()).unwrap()
    }

    #[test]
    fn matrix_product() {
        let a = single(&[2, 2], &[1.0, 2.0, 3.0, 4.0]);
        let b = single(&[2, 2], &[5.0, 6.0, 7.0, 8.0]);
        let ab = dot(&a, &b, BatchStrategy::Serial).unwrap();
        assert_eq!(ab.as_slice(), &[19.0, 22.0, 43.0, 50.0]);
    }

    #[test]
    fn matrix_vector_and_vector_vector() {
        let a = single(&[2, 2], &[1.0, 2.0, 3.0, 4.0]);
        let v = single(&[2], &[1.0, -1.0]);
        assert_eq!(dot(&a, &v, BatchStrategy::Serial).unwrap().as_slice(), &[-1.0, -1.0]);
        assert_eq!(dot(&v, &a, BatchStrategy::Serial).unwrap().as_slice(), &[-2.0, -2.0]);
        assert_eq!(dot(&v, &v, BatchStrategy::Serial).unwrap().scalar(0, 0), 2.0);
    }

    #[test]
    fn ddot_with_identity_is_trace() {
        let a = single(&[3, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        let eye = identity(3, 1, 1);
        assert_eq!(ddot(&a, &eye, BatchStrategy::Serial).unwrap().scalar(0, 0), 15.0);
    }

    #[test]
    fn fourth_order_identity_maps_matrix_to_itself() {
        let eye = identity(3, 1, 1);
        let ik = crate::math::tensor::cdya_ik(&eye, &eye, BatchStrategy::Serial).unwrap();
        let a = single(&[3, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0]);
        let b = ddot(&ik, &a, BatchStrategy::Serial).unwrap();
        assert_eq!(b, a);
        let ikik = ddot(&ik, &ik, BatchStrategy::Parallel).unwrap();
        assert_eq!(ikik, ik);
    }

    #[test]
    fn unsupported_modes_are_rejected() {
        let a = TensorField::zeros(&[3, 3, 3], 1, 1);
        assert!(matches!(
            dot(&a, &a, BatchStrategy::Serial),
            Err(SolverError::UnsupportedContractionMode { left: 3, right: 3 })
        ));
        let v = TensorField::zeros(&[3], 1, 1);
        assert!(matches!(
            ddot(&v, &v, BatchStrategy::Serial),
            Err(SolverError::UnsupportedContractionMode { left: 1, right: 1 })
        ));
    }

    #[test]
    fn mismatched_extents_are_shape_errors() {
        let a = TensorField::zeros(&[2, 2], 1, 1);
        let b = TensorField::zeros(&[3, 3], 1, 1);
        assert!(matches!(dot(&a, &b, BatchStrategy::Serial), Err(SolverError::Shape(_))));
    }
}
