//! Native backend: dense LU of the reduced free-dof system.

use super::traits::*;
use nalgebra::{DMatrix, DVector};

/// Native solver backend using nalgebra's dense LU.
///
/// Suitable for small-to-medium problems (up to a few thousand free dofs).
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

impl LinearSolver for NativeBackend {
    fn name(&self) -> &str {
        "native"
    }

    fn solve_linear(
        &self,
        system: &LinearSystem<'_>,
    ) -> Result<(DVector<f64>, SolveInfo), BackendError> {
        system.check()?;
        let positions = system.free_positions();
        let n = system.partition.free.len();

        // Gather K_II from the CSR rows of the free dofs
        let mut k = DMatrix::zeros(n, n);
        for (i, &d) in system.partition.free.iter().enumerate() {
            if let Some(row) = system.tangent.get_row(d) {
                for (&c, &v) in row.col_indices().iter().zip(row.values()) {
                    if let Some(j) = positions[c] {
                        k[(i, j)] += v;
                    }
                }
            }
        }
        let b = system.reduced_rhs(&positions);

        let x = k
            .lu()
            .solve(&b)
            .ok_or(BackendError("Singular matrix in LU decomposition".into()))?;

        Ok((
            system.expand(&x),
            SolveInfo {
                iterations: 1,
                residual_norm: None,
                solver_name: "nalgebra-LU".to_string(),
            },
        ))
    }
}
