//! Linear solver backends.
//!
//! # Backends
//!
//! - **Native** (default): dense LU of the reduced system via nalgebra.
//! - **ConjugateGradient**: Jacobi-preconditioned CG on the CSR tangent,
//!   for larger symmetric positive definite problems.
//!
//! ```text
//! MixedFieldAssembler (CSR tangent + residual)
//!         │
//!         ▼
//! LinearSolver trait (partition D/I, prescribed increments)
//!    ┌────┴────┐
//!    ▼         ▼
//! Native    ConjugateGradient
//! ```

pub mod cg;
pub mod native;
pub mod traits;

pub use cg::ConjugateGradient;
pub use native::NativeBackend;
pub use traits::*;

use serde::{Deserialize, Serialize};

/// Backend selector for configuration files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Lu,
    Cg,
}

impl BackendKind {
    pub fn build(self) -> Box<dyn LinearSolver> {
        match self {
            BackendKind::Lu => Box::new(NativeBackend),
            BackendKind::Cg => Box::new(ConjugateGradient::new()),
        }
    }
}

/// Returns the default solver backend.
pub fn default_backend() -> Box<dyn LinearSolver> {
    Box::new(NativeBackend)
}
