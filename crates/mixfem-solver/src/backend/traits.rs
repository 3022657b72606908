//! Backend trait definitions for the global linear solve.
//!
//! The assembler hands over the full tangent and residual together with the
//! dof partition; a backend returns an increment that equals the prescribed
//! increment on D and solves the reduced system
//! `K_II δu_I = -r_I - K_ID δu_D` on I.

use crate::boundary::DofPartition;
use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;

/// Error type for backend operations.
#[derive(Debug, Clone)]
pub struct BackendError(pub String);

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BackendError {}

impl From<String> for BackendError {
    fn from(s: String) -> Self {
        BackendError(s)
    }
}

impl From<&str> for BackendError {
    fn from(s: &str) -> Self {
        BackendError(s.to_string())
    }
}

/// A partitioned linear system ready for solving.
pub struct LinearSystem<'a> {
    /// Global tangent (all dofs)
    pub tangent: &'a CsrMatrix<f64>,
    /// Global residual (all dofs)
    pub residual: &'a DVector<f64>,
    pub partition: &'a DofPartition,
    /// Increment of the prescribed dofs, full length (free entries ignored)
    pub prescribed: &'a DVector<f64>,
}

impl LinearSystem<'_> {
    pub fn num_dofs(&self) -> usize {
        self.residual.len()
    }

    pub(crate) fn check(&self) -> Result<(), BackendError> {
        let n = self.num_dofs();
        if self.tangent.nrows() != n || self.tangent.ncols() != n {
            return Err(format!(
                "tangent is {}x{}, residual has {} entries",
                self.tangent.nrows(),
                self.tangent.ncols(),
                n
            )
            .into());
        }
        if self.prescribed.len() != n || self.partition.num_dofs() != n {
            return Err("partition or prescribed increments do not match the system size".into());
        }
        Ok(())
    }

    /// Position of every global dof inside the free set, if free.
    pub(crate) fn free_positions(&self) -> Vec<Option<usize>> {
        let mut positions = vec![None; self.num_dofs()];
        for (k, &d) in self.partition.free.iter().enumerate() {
            positions[d] = Some(k);
        }
        positions
    }

    /// Right-hand side of the reduced system, `-r_I - K_ID δu_D`.
    pub(crate) fn reduced_rhs(&self, positions: &[Option<usize>]) -> DVector<f64> {
        let free = &self.partition.free;
        let mut b = DVector::from_iterator(free.len(), free.iter().map(|&d| -self.residual[d]));
        for (k, &d) in free.iter().enumerate() {
            if let Some(row) = self.tangent.get_row(d) {
                for (&c, &v) in row.col_indices().iter().zip(row.values()) {
                    if positions[c].is_none() {
                        b[k] -= v * self.prescribed[c];
                    }
                }
            }
        }
        b
    }

    /// Full increment from the free-dof solution.
    pub(crate) fn expand(&self, x_free: &DVector<f64>) -> DVector<f64> {
        let mut du = DVector::zeros(self.num_dofs());
        for &d in &self.partition.prescribed {
            du[d] = self.prescribed[d];
        }
        for (k, &d) in self.partition.free.iter().enumerate() {
            du[d] = x_free[k];
        }
        du
    }
}

/// Solver convergence and diagnostic info.
#[derive(Debug, Clone)]
pub struct SolveInfo {
    /// Number of iterations (1 for direct solvers)
    pub iterations: usize,
    /// Final residual norm (if available)
    pub residual_norm: Option<f64>,
    /// Human-readable solver name (e.g., "nalgebra-LU")
    pub solver_name: String,
}

/// Trait for a linear solver backend.
pub trait LinearSolver: Send + Sync {
    /// Human-readable name of this backend.
    fn name(&self) -> &str;

    /// Solve the partitioned system and return the full increment.
    fn solve_linear(
        &self,
        system: &LinearSystem<'_>,
    ) -> Result<(DVector<f64>, SolveInfo), BackendError>;
}
