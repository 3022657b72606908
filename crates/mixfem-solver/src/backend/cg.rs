//! Jacobi-preconditioned conjugate gradients on the reduced system.
//!
//! The reduced operator `K_II` is applied directly from the CSR rows of the
//! global tangent, so no reduced matrix is formed.

use super::traits::*;
use nalgebra::DVector;

/// Conjugate gradient solver for symmetric positive definite systems
#[derive(Debug, Clone)]
pub struct ConjugateGradient {
    /// Iteration budget; `None` means ten times the number of free dofs
    pub max_iterations: Option<usize>,
    /// Tolerance on the residual norm relative to the right-hand side
    pub tolerance: f64,
    /// Absolute tolerance
    pub abs_tolerance: f64,
}

impl Default for ConjugateGradient {
    fn default() -> Self {
        Self {
            max_iterations: None,
            tolerance: 1e-10,
            abs_tolerance: 1e-14,
        }
    }
}

impl ConjugateGradient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }
}

impl LinearSolver for ConjugateGradient {
    fn name(&self) -> &str {
        "cg"
    }

    fn solve_linear(
        &self,
        system: &LinearSystem<'_>,
    ) -> Result<(DVector<f64>, SolveInfo), BackendError> {
        system.check()?;
        let positions = system.free_positions();
        let free = &system.partition.free;
        let n = free.len();

        let apply = |x: &DVector<f64>| -> DVector<f64> {
            let mut y = DVector::zeros(n);
            for (i, &d) in free.iter().enumerate() {
                if let Some(row) = system.tangent.get_row(d) {
                    y[i] = row
                        .col_indices()
                        .iter()
                        .zip(row.values())
                        .filter_map(|(&c, &v)| positions[c].map(|j| v * x[j]))
                        .sum();
                }
            }
            y
        };

        // Jacobi preconditioner M = diag(K_II)
        let mut diag_inv = DVector::from_element(n, 1.0);
        for (i, &d) in free.iter().enumerate() {
            if let Some(v) = system.tangent.get_entry(d, d).map(|e| e.into_value()) {
                if v.abs() > 1e-14 {
                    diag_inv[i] = 1.0 / v;
                }
            }
        }

        let b = system.reduced_rhs(&positions);
        let b_norm = b.norm();
        let info = |iterations, residual_norm| SolveInfo {
            iterations,
            residual_norm: Some(residual_norm),
            solver_name: "jacobi-cg".to_string(),
        };
        if b_norm < self.abs_tolerance {
            return Ok((system.expand(&DVector::zeros(n)), info(0, b_norm)));
        }

        let max_iterations = self.max_iterations.unwrap_or(10 * n.max(1));
        let mut x = DVector::zeros(n);
        let mut r = b.clone();
        let mut z = r.component_mul(&diag_inv);
        let mut p = z.clone();
        let mut rz = r.dot(&z);

        for iteration in 1..=max_iterations {
            let ap = apply(&p);
            let p_ap = p.dot(&ap);
            if !p_ap.is_finite() || p_ap <= 0.0 {
                return Err(format!(
                    "CG breakdown at iteration {iteration}: operator not positive definite (pᵀAp = {p_ap:.3e})"
                )
                .into());
            }
            let alpha = rz / p_ap;
            x.axpy(alpha, &p, 1.0);
            r.axpy(-alpha, &ap, 1.0);

            let r_norm = r.norm();
            if r_norm < self.tolerance * b_norm || r_norm < self.abs_tolerance {
                return Ok((system.expand(&x), info(iteration, r_norm)));
            }

            z = r.component_mul(&diag_inv);
            let rz_new = r.dot(&z);
            let beta = rz_new / rz;
            rz = rz_new;
            p = &z + &p * beta;
        }

        Err(format!(
            "CG did not converge within {max_iterations} iterations (|r| = {:.3e})",
            r.norm()
        )
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NativeBackend;
    use crate::boundary::DofPartition;
    use nalgebra_sparse::{CooMatrix, CsrMatrix};

    fn laplacian(n: usize) -> CsrMatrix<f64> {
        let mut coo = CooMatrix::new(n, n);
        for i in 0..n {
            coo.push(i, i, 2.0 + 0.1 * i as f64);
            if i + 1 < n {
                coo.push(i, i + 1, -1.0);
                coo.push(i + 1, i, -1.0);
            }
        }
        CsrMatrix::from(&coo)
    }

    #[test]
    fn agrees_with_dense_lu() {
        let n = 12;
        let k = laplacian(n);
        let r = DVector::from_fn(n, |i, _| (i as f64).sin());
        let partition = DofPartition {
            prescribed: vec![0, n - 1],
            free: (1..n - 1).collect(),
        };
        let mut prescribed = DVector::zeros(n);
        prescribed[0] = 0.2;
        prescribed[n - 1] = -0.1;
        let system = LinearSystem {
            tangent: &k,
            residual: &r,
            partition: &partition,
            prescribed: &prescribed,
        };
        let (cg, info) = ConjugateGradient::new().solve_linear(&system).unwrap();
        let (lu, _) = NativeBackend.solve_linear(&system).unwrap();
        assert!((cg - lu).amax() < 1e-8);
        assert!(info.iterations <= n);
    }

    #[test]
    fn budget_exhaustion_is_an_error() {
        let n = 30;
        let k = laplacian(n);
        let r = DVector::from_element(n, 1.0);
        let partition = DofPartition {
            prescribed: vec![],
            free: (0..n).collect(),
        };
        let prescribed = DVector::zeros(n);
        let system = LinearSystem {
            tangent: &k,
            residual: &r,
            partition: &partition,
            prescribed: &prescribed,
        };
        let solver = ConjugateGradient::new().with_max_iterations(2);
        assert!(solver.solve_linear(&system).is_err());
    }

    #[test]
    fn nan_operator_breaks_down_immediately() {
        let n = 4;
        let mut coo = CooMatrix::new(n, n);
        for i in 0..n {
            coo.push(i, i, if i == 2 { f64::NAN } else { 2.0 });
        }
        let k = CsrMatrix::from(&coo);
        let r = DVector::from_element(n, 1.0);
        let partition = DofPartition {
            prescribed: vec![],
            free: (0..n).collect(),
        };
        let prescribed = DVector::zeros(n);
        let system = LinearSystem {
            tangent: &k,
            residual: &r,
            partition: &partition,
            prescribed: &prescribed,
        };
        let err = ConjugateGradient::new().solve_linear(&system).unwrap_err();
        assert!(err.0.contains("breakdown at iteration 1"), "{err}");
    }
}
