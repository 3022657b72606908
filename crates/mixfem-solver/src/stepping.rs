//! Incremental loading: prescribed values are ramped up over a number of
//! load increments, with one Newton solve per increment.

use crate::backend::LinearSolver;
use crate::boundary::BoundaryConditions;
use crate::error::{Result, SolverError};
use crate::math::linsteps;
use crate::nonlinear_solver::{NewtonConfig, NewtonRaphsonDriver, NewtonResults};
use crate::solid::SolidBody;
use log::{info, warn};

/// Load-stepping job over a solid body.
pub struct Job<'a> {
    boundaries: &'a BoundaryConditions,
    solver: &'a dyn LinearSolver,
    config: NewtonConfig,
    increments: usize,
}

impl<'a> Job<'a> {
    /// Single-increment job.
    pub fn new(
        boundaries: &'a BoundaryConditions,
        solver: &'a dyn LinearSolver,
        config: NewtonConfig,
    ) -> Self {
        Self {
            boundaries,
            solver,
            config,
            increments: 1,
        }
    }

    pub fn with_increments(mut self, increments: usize) -> Self {
        self.increments = increments;
        self
    }

    /// Load factors of the increments, excluding the unloaded start.
    pub fn load_factors(&self) -> Vec<f64> {
        linsteps(0.0, 1.0, self.increments + 1)
            .into_iter()
            .skip(1)
            .collect()
    }

    /// Run the increments in order.
    ///
    /// The material state is re-evaluated at the converged fields and
    /// committed after each converged increment. The
    /// job stops at the first increment that does not converge; its result is
    /// the last entry of the returned list and its trial state is discarded.
    pub fn run(&self, body: &mut SolidBody<'_>) -> Result<Vec<NewtonResults>> {
        if self.increments == 0 {
            return Err(SolverError::Config("a job needs at least one increment".into()));
        }
        let factors = self.load_factors();
        let mut results = Vec::with_capacity(factors.len());

        for (step, factor) in factors.into_iter().enumerate() {
            info!("increment {}/{} (load factor {factor:.4})", step + 1, self.increments);
            let boundaries = self.boundaries.scaled(factor);
            let driver = NewtonRaphsonDriver::new(&boundaries, self.solver, self.config);
            let outcome = driver.solve(body)?;
            let converged = outcome.converged();
            results.push(outcome);

            if converged {
                body.refresh_state()?;
                body.commit();
            } else {
                warn!("increment {} did not converge; stopping", step + 1);
                body.rollback();
                break;
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NativeBackend;
    use crate::boundary::Boundary;
    use crate::constitution::{
        LinearElasticPlasticIsotropicHardening, StrainMaterial, lame_converter,
    };
    use crate::mesh::Mesh;
    use crate::nonlinear_solver::DriverState;
    use crate::quadrature::GaussLegendre;
    use crate::region::Region;

    fn tension(mesh: &Mesh, value: f64) -> BoundaryConditions {
        BoundaryConditions::symmetry_planes(mesh).with(Boundary::plane(
            "pull",
            mesh,
            0,
            1.0,
            [true, false, false],
            value,
        ))
    }

    #[test]
    fn load_factors_exclude_start() {
        let bcs = BoundaryConditions::new();
        let job = Job::new(&bcs, &NativeBackend, NewtonConfig::default()).with_increments(4);
        assert_eq!(job.load_factors(), vec![0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn plastic_bar_accumulates_history_over_increments() {
        let mesh = Mesh::cube([0.0; 3], [1.0; 3], [2, 2, 2]).unwrap();
        let region = Region::new(mesh, GaussLegendre::hexahedron(2).unwrap()).unwrap();
        let (lambda, mu) = lame_converter(210000.0, 0.3);
        let model = StrainMaterial::new(
            LinearElasticPlasticIsotropicHardening::new(lambda, mu, 250.0, 1000.0),
            3,
        );
        let bcs = tension(region.mesh(), 0.004);
        let mut body = SolidBody::new(&region, &model);
        let results = Job::new(&bcs, &NativeBackend, NewtonConfig::default())
            .with_increments(4)
            .run(&mut body)
            .unwrap();

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.converged()));
        let alpha = body.state().layout().range("alpha").unwrap();
        let state = body.state().old();
        let hardening = state.point(0)[alpha.start];
        assert!(hardening > 0.0, "expected plastic flow, alpha = {hardening}");
    }

    #[test]
    fn stops_at_first_failed_increment() {
        let mesh = Mesh::cube([0.0; 3], [1.0; 3], [2, 2, 2]).unwrap();
        let region = Region::new(mesh, GaussLegendre::hexahedron(2).unwrap()).unwrap();
        let (lambda, mu) = lame_converter(210000.0, 0.3);
        let model = StrainMaterial::new(
            LinearElasticPlasticIsotropicHardening::new(lambda, mu, 250.0, 1000.0),
            3,
        );
        let bcs = tension(region.mesh(), 0.004);
        let mut body = SolidBody::new(&region, &model);
        let config = NewtonConfig {
            max_iterations: 1,
            ..Default::default()
        };
        let results = Job::new(&bcs, &NativeBackend, config)
            .with_increments(3)
            .run(&mut body)
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].state, DriverState::Iterating);
        assert_eq!(body.state().old(), body.state().trial());
    }

    #[test]
    fn zero_increments_is_a_config_error() {
        let mesh = Mesh::cube([0.0; 3], [1.0; 3], [2, 2, 2]).unwrap();
        let region = Region::new(mesh, GaussLegendre::hexahedron(1).unwrap()).unwrap();
        let model = StrainMaterial::new(
            LinearElasticPlasticIsotropicHardening::new(1.0, 1.0, 1.0, 0.0),
            3,
        );
        let bcs = BoundaryConditions::new();
        let mut body = SolidBody::new(&region, &model);
        let err = Job::new(&bcs, &NativeBackend, NewtonConfig::default())
            .with_increments(0)
            .run(&mut body)
            .unwrap_err();
        assert!(matches!(err, SolverError::Config(_)));
    }
}
