//! Error types for mixfem operations.

use crate::backend::BackendError;
use thiserror::Error;

/// Result type alias using [`SolverError`].
pub type Result<T> = std::result::Result<T, SolverError>;

/// Errors raised by the tensor kernel, the constitutive models, the
/// assembler and the surrounding collaborators.
#[derive(Error, Debug)]
pub enum SolverError {
    /// Tensor or matrix shape not supported by an operation.
    #[error("shape error: {0}")]
    Shape(String),

    /// State vector length or shape does not match the declared layout.
    #[error("state layout error: {0}")]
    StateLayout(String),

    /// Wrong number of input fields for the active formulation.
    #[error("field arity error: expected {expected} field(s), got {found}")]
    FieldArity { expected: usize, found: usize },

    /// Contraction mode pair that is not part of the operation table.
    #[error("unsupported contraction mode ({left}, {right})")]
    UnsupportedContractionMode { left: usize, right: usize },

    /// Element with zero or negative reference/current volume.
    #[error("degenerate element {element}: {reason}")]
    DegenerateElement { element: usize, reason: String },

    /// NaN or infinite values detected in a numerical result.
    #[error("numerical divergence: {0}")]
    NumericalDivergence(String),

    /// General eigenvalue problem with complex eigenvalues.
    #[error("non-real spectrum: {0}")]
    NonRealSpectrum(String),

    /// Mesh connectivity problems.
    #[error("mesh error: {0}")]
    Mesh(String),

    /// Boundary-condition problems.
    #[error("boundary error: {0}")]
    Boundary(String),

    /// Invalid configuration values.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Linear solver failures.
    #[error("linear solver error: {0}")]
    Backend(#[from] BackendError),
}

impl SolverError {
    pub(crate) fn shape(msg: impl Into<String>) -> Self {
        SolverError::Shape(msg.into())
    }

    pub(crate) fn state_layout(msg: impl Into<String>) -> Self {
        SolverError::StateLayout(msg.into())
    }

    /// Whether this error signals a degenerate element.
    pub fn is_degenerate_element(&self) -> bool {
        matches!(self, SolverError::DegenerateElement { .. })
    }
}
