//! Batched tensor algebra over element × quadrature-point fields.

pub mod contraction;
pub mod eigen;
pub mod field;
pub mod tensor;

pub use contraction::{DdotMode, DotMode, ddot, dot};
pub use eigen::{Eigen, eig, eigh, eigvals, eigvalsh};
pub use field::{BatchStrategy, TensorField};
pub use tensor::{
    DyadicMode, InverseOptions, cdya, cdya_ik, cdya_il, cof, cross, det, dev, dya,
    equivalent_von_mises, from_voigt, identity, identity_like, inv, inv_and_det, linsteps,
    majortranspose, minor_symmetrize, sym, tovoigt, trace, transpose,
};
