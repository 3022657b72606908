//! Single-field materials solved on a uniaxial tension block.

use approx::assert_relative_eq;
use mixfem_solver::math::{
    BatchStrategy, DyadicMode, TensorField, cdya, dya, identity_like, sym, trace,
};
use mixfem_solver::{
    Boundary, BoundaryConditions, ConstitutiveModel, GaussLegendre, HyperelasticMaterial,
    LinearElasticPlasticIsotropicHardening, Mesh, NativeBackend, NeoHooke, NewtonConfig,
    NewtonRaphsonDriver, Region, ResultFields, SolidBody, StrainMaterial, UserMaterial,
    lame_converter,
};
use mixfem_solver::{Job, Result};

/// Typed configuration of a user-defined small-strain material.
struct Lame {
    lambda: f64,
    mu: f64,
}

fn small_strain_user_material(lambda: f64, mu: f64) -> UserMaterial<Lame> {
    let gradient = |fields: &[TensorField], old: &TensorField, c: &Lame| -> Result<_> {
        let eps = sym(&fields[0].sub(&identity_like(&fields[0])?)?)?;
        let stress = identity_like(&eps)?
            .scale_by(&trace(&eps)?)?
            .scale(c.lambda)
            .add(&eps.scale(2.0 * c.mu))?;
        Ok((vec![stress], old.clone()))
    };
    let hessian = |fields: &[TensorField], _old: &TensorField, c: &Lame| -> Result<_> {
        let eye = identity_like(&fields[0])?;
        let tangent = dya(&eye, &eye, DyadicMode::Matrix, BatchStrategy::Serial)?
            .scale(c.lambda)
            .add(&cdya(&eye, &eye, BatchStrategy::Serial)?.scale(2.0 * c.mu))?;
        Ok(vec![tangent])
    };
    UserMaterial::new(Lame { lambda, mu }, gradient, hessian)
}

fn region() -> Region {
    let mesh = Mesh::cube([0.0; 3], [1.0; 3], [3, 3, 3]).unwrap();
    Region::new(mesh, GaussLegendre::hexahedron(2).unwrap()).unwrap()
}

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

fn pulled_face(mesh: &Mesh) -> Vec<usize> {
    (0..mesh.num_points()).filter(|&p| mesh.points[p][0] == 1.0).collect()
}

#[test]
fn test_user_material_solves_linear_problem_in_two_iterations() {
    let region = region();
    let (lambda, mu) = lame_converter(1000.0, 0.25);
    let model = small_strain_user_material(lambda, mu);
    let bcs = tension(region.mesh(), 0.01);
    let mut body = SolidBody::new(&region, &model);
    let results = NewtonRaphsonDriver::new(&bcs, &NativeBackend, NewtonConfig::default())
        .solve(&mut body)
        .unwrap();

    assert!(results.converged());
    assert_eq!(results.iterations, 2);
    assert_eq!(model.config().mu, mu);

    // uniaxial stress: pulled-face force equals E · strain · area
    let fields = ResultFields::collect(&mut body, BatchStrategy::Serial).unwrap();
    let force = fields.total_reaction(&pulled_face(region.mesh()))[0];
    assert_relative_eq!(force, 1000.0 * 0.01, max_relative = 1e-8);
}

#[test]
fn test_neo_hooke_uniaxial_tension_has_free_lateral_faces() {
    let region = region();
    let model = HyperelasticMaterial::new(NeoHooke::new(1.0, Some(50.0)));
    let bcs = tension(region.mesh(), 0.2);
    let mut body = SolidBody::new(&region, &model).with_strategy(BatchStrategy::Parallel);
    let results = NewtonRaphsonDriver::new(&bcs, &NativeBackend, NewtonConfig::default())
        .solve(&mut body)
        .unwrap();
    assert!(results.converged(), "state {:?}", results.state);

    let fields = ResultFields::collect(&mut body, BatchStrategy::Serial).unwrap();
    for sigma in &fields.cauchy_stress {
        assert!(sigma[0] > 0.1, "axial stress {}", sigma[0]);
        assert!(sigma[4].abs() < 1e-4 * sigma[0], "lateral stress {}", sigma[4]);
        assert!(sigma[8].abs() < 1e-4 * sigma[0], "lateral stress {}", sigma[8]);
    }
    for principal in &fields.principal_stress {
        assert!(principal[0] <= principal[1] && principal[1] <= principal[2]);
    }
    // homogeneous: von Mises equals the axial stress
    let stats = fields.von_mises_statistics();
    assert_relative_eq!(stats.max, fields.cauchy_stress[0][0], max_relative = 1e-4);
}

#[test]
fn test_plasticity_leaves_residual_stress_after_unloading() {
    let region = region();
    let (lambda, mu) = lame_converter(210000.0, 0.3);
    let model = StrainMaterial::new(
        LinearElasticPlasticIsotropicHardening::new(lambda, mu, 250.0, 10000.0),
        3,
    );
    assert!(!model.state_layout().is_empty());

    // load past yield (elastic limit at 250 / 210000 ≈ 0.0012)
    let mut body = SolidBody::new(&region, &model);
    let loaded = tension(region.mesh(), 0.003);
    let results = Job::new(&loaded, &NativeBackend, NewtonConfig::default())
        .with_increments(3)
        .run(&mut body)
        .unwrap();
    assert!(results.iter().all(|r| r.converged()));
    let sxx = body.stress().unwrap().point(0)[0];
    assert!(sxx > 250.0 && sxx < 210000.0 * 0.003, "σxx = {sxx}");
    let alpha = body.state().layout().range("alpha").unwrap();
    assert!(body.state().old().point(0)[alpha.start] > 0.0);

    // back to the original length
    let unloaded = tension(region.mesh(), 0.0);
    let results = Job::new(&unloaded, &NativeBackend, NewtonConfig::default())
        .run(&mut body)
        .unwrap();
    assert!(results[0].converged());
    assert!(results[0].iterations > 1);
    let sxx = body.stress().unwrap().point(0)[0];
    assert!(sxx < 0.0, "σxx = {sxx}");
}
