//! Newton-Raphson driver for the equilibrium of a solid body.
//!
//! Solves `r(u, p, J) = 0` where `p` and `J` are condensed per element, so
//! only the nodal displacement enters the global system.
//!
//! # Newton-Raphson Method
//!
//! Every iteration, in this order:
//! 1. Kinematics from the current fields
//! 2. Elasticity, then stress (and trial state) at every point
//! 3. Assembly of the residual `r` and tangent `K`
//! 4. Partition into prescribed (D) and free (I) dofs
//! 5. Solve `K δu = -r` on I with `δu` fixed to the prescribed increments on D
//! 6. Local recovery of `δp` and `δJ`
//! 7. Diagnostic norms, then `u += δu`, `J += δJ`, `p += δp`
//!
//! # Convergence Criterion
//!
//! - **Relative residual**: `|r_I| / |r_D| < tol`, where `|r_D|` is the
//!   reaction norm. With `|r_D| == 0` the relative residual is taken as 1.
//!
//! The check uses the residual assembled before the update, and the update
//! of the converging iteration is still applied. An iteration that still
//! moves prescribed dofs towards their targets never converges, since its
//! residual was assembled before those targets were reached.
//!
//! # Driver states
//!
//! `Initialized → Iterating → (Converged | Diverged)`. A degenerate element,
//! a non-finite residual, tangent or increment, or a failed linear solve
//! stops the driver in `Diverged` without touching the fields. Running out of iterations leaves it in `Iterating`.
//!
//! # Example
//!
//! ```no_run
//! use mixfem_solver::{
//!     BoundaryConditions, NativeBackend, NeoHooke, NewtonConfig, NewtonRaphsonDriver, Region,
//!     SolidBody, ThreeFieldVariation,
//! };
//!
//! # fn example(region: Region, bcs: BoundaryConditions) -> mixfem_solver::Result<()> {
//! let model = ThreeFieldVariation::new(NeoHooke::isochoric(1.0), 5000.0);
//! let mut body = SolidBody::new(&region, &model);
//! let driver = NewtonRaphsonDriver::new(&bcs, &NativeBackend, NewtonConfig::default());
//!
//! let results = driver.solve(&mut body)?;
//! println!("{:?} after {} iterations", results.state, results.iterations);
//! # Ok(())
//! # }
//! ```

use crate::assembly::{Assembly, LocalIncrements};
use crate::backend::{LinearSolver, LinearSystem};
use crate::boundary::BoundaryConditions;
use crate::error::{Result, SolverError};
use log::{debug, info, warn};
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

/// Newton-Raphson configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonConfig {
    /// Maximum number of iterations
    pub max_iterations: usize,
    /// Relative residual tolerance
    pub tolerance: f64,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tolerance: 1e-5,
        }
    }
}

impl NewtonConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance > 0.0) {
            return Err(SolverError::Config(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        Ok(())
    }
}

/// Driver state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverState {
    /// No iteration evaluated yet
    Initialized,
    /// Iterating (also the final state when the cap is reached)
    Iterating,
    /// Relative residual below tolerance
    Converged,
    /// Non-finite increment or degenerate element; fields kept at the last
    /// valid iterate
    Diverged,
}

/// Diagnostics of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IterationReport {
    /// One-based iteration index
    pub iteration: usize,
    /// Relative residual `|r_I| / |r_D|`
    pub residual: f64,
    /// `|δu|`
    pub du: f64,
    /// `|δp|`
    pub dp: f64,
    /// `|δJ|`
    pub dj: f64,
}

impl std::fmt::Display for IterationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "#{:2}: |f|={:1.3e} (|δu|={:1.3e} |δp|={:1.3e} |δJ|={:1.3e})",
            self.iteration, self.residual, self.du, self.dp, self.dj
        )
    }
}

/// Outcome of one Newton solve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewtonResults {
    /// Final driver state
    pub state: DriverState,
    /// Number of completed (updated) iterations
    pub iterations: usize,
    /// Per-iteration diagnostics
    pub history: Vec<IterationReport>,
    /// Reason for divergence
    pub cause: Option<String>,
}

impl NewtonResults {
    pub fn converged(&self) -> bool {
        self.state == DriverState::Converged
    }

    /// Last relative residual, if any iteration completed.
    pub fn residual_norm(&self) -> Option<f64> {
        self.history.last().map(|r| r.residual)
    }
}

/// Something the Newton driver can assemble and update.
pub trait NonlinearProblem {
    /// Current nodal displacement (all dofs).
    fn displacement(&self) -> &[f64];

    /// Residual and tangent at the current fields.
    fn assemble(&mut self) -> Result<Assembly>;

    /// Local field increments implied by a displacement increment.
    fn recover(&self, du: &DVector<f64>) -> LocalIncrements;

    /// Apply the increments of one iteration.
    fn update(&mut self, du: &DVector<f64>, local: &LocalIncrements);
}

/// Newton-Raphson driver
pub struct NewtonRaphsonDriver<'a> {
    boundaries: &'a BoundaryConditions,
    solver: &'a dyn LinearSolver,
    config: NewtonConfig,
}

impl<'a> NewtonRaphsonDriver<'a> {
    /// Create a new driver
    ///
    /// # Arguments
    /// * `boundaries` - Dirichlet boundaries with their target values
    /// * `solver` - Linear solver for the free-dof system
    /// * `config` - Iteration cap and tolerance
    pub fn new(
        boundaries: &'a BoundaryConditions,
        solver: &'a dyn LinearSolver,
        config: NewtonConfig,
    ) -> Self {
        Self {
            boundaries,
            solver,
            config,
        }
    }

    pub fn config(&self) -> &NewtonConfig {
        &self.config
    }

    /// Iterate until convergence, divergence or the iteration cap.
    ///
    /// Divergence is reported in the results, never raised: a degenerate
    /// element, a non-finite residual, tangent or increment, or a breakdown
    /// of the linear solver. Any other error (shapes, state layout, boundary
    /// conditions) propagates.
    pub fn solve<P: NonlinearProblem + ?Sized>(&self, problem: &mut P) -> Result<NewtonResults> {
        self.config.validate()?;
        let num_dofs = problem.displacement().len();
        let partition = self.boundaries.partition(num_dofs)?;

        let mut results = NewtonResults {
            state: DriverState::Initialized,
            iterations: 0,
            history: Vec::new(),
            cause: None,
        };

        for iteration in 1..=self.config.max_iterations {
            results.state = DriverState::Iterating;

            let system = match problem.assemble() {
                Ok(system) => system,
                Err(err) if err.is_degenerate_element() => {
                    warn!("iteration {iteration}: {err}; stopping without update");
                    results.state = DriverState::Diverged;
                    results.cause = Some(err.to_string());
                    return Ok(results);
                }
                Err(err) => return Err(err),
            };

            if !system.is_finite() {
                warn!("iteration {iteration}: non-finite residual or tangent; stopping without update");
                results.state = DriverState::Diverged;
                results.cause = Some(format!(
                    "non-finite residual or tangent in iteration {iteration}"
                ));
                return Ok(results);
            }

            let prescribed = DVector::from_vec(
                self.boundaries
                    .prescribed_increments(problem.displacement())?,
            );
            let linear = LinearSystem {
                tangent: &system.tangent,
                residual: &system.residual,
                partition: &partition,
                prescribed: &prescribed,
            };
            linear.check()?;
            // sizes are consistent, so a failure here is a numerical breakdown
            let (du, info) = match self.solver.solve_linear(&linear) {
                Ok(solution) => solution,
                Err(err) => {
                    warn!("iteration {iteration}: {err}; stopping without update");
                    results.state = DriverState::Diverged;
                    results.cause = Some(format!(
                        "linear solve failed in iteration {iteration}: {err}"
                    ));
                    return Ok(results);
                }
            };
            debug!(
                "linear solve ({}) in {} iteration(s)",
                info.solver_name, info.iterations
            );

            let local = problem.recover(&du);
            let finite = du
                .iter()
                .chain(&local.dp)
                .chain(&local.dj)
                .all(|v| v.is_finite());
            if !finite {
                warn!("iteration {iteration}: non-finite increment; stopping without update");
                results.state = DriverState::Diverged;
                results.cause = Some(format!("non-finite increment in iteration {iteration}"));
                return Ok(results);
            }

            let reference = subset_norm(&system.residual, &partition.prescribed);
            let residual = if reference == 0.0 {
                1.0
            } else {
                subset_norm(&system.residual, &partition.free) / reference
            };
            let report = IterationReport {
                iteration,
                residual,
                du: du.norm(),
                dp: norm(&local.dp),
                dj: norm(&local.dj),
            };
            info!("{report}");

            let targets_reached = partition.prescribed.iter().all(|&d| prescribed[d] == 0.0);
            problem.update(&du, &local);
            results.iterations = iteration;
            results.history.push(report);

            if targets_reached && residual < self.config.tolerance {
                results.state = DriverState::Converged;
                return Ok(results);
            }
        }

        if results.state == DriverState::Iterating {
            warn!(
                "no convergence within {} iterations (|f|={:1.3e})",
                self.config.max_iterations,
                results.residual_norm().unwrap_or(f64::NAN)
            );
        }
        Ok(results)
    }
}

fn subset_norm(v: &DVector<f64>, dofs: &[usize]) -> f64 {
    dofs.iter().map(|&d| v[d] * v[d]).sum::<f64>().sqrt()
}

fn norm(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}
