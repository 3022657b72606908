//! Nonlinear solid mechanics with a mixed (u, p, J) finite element
//! formulation.
//!
//! This crate provides a batched tensor-algebra kernel, a constitutive model
//! abstraction with per-point state history, global assembly with local
//! static condensation of pressure and volume ratio, and a Newton-Raphson
//! driver on top of hexahedral meshes.

pub mod assembly;
pub mod backend;
pub mod boundary;
pub mod constitution;
pub mod elements;
pub mod error;
pub mod math;
pub mod mesh;
pub mod nonlinear_solver;
pub mod postprocess;
pub mod quadrature;
pub mod region;
pub mod solid;
pub mod stepping;

pub use assembly::{Assembly, Condensation, LocalIncrements, MixedFieldAssembler};
pub use backend::{
    BackendError, BackendKind, ConjugateGradient, LinearSolver, LinearSystem, NativeBackend,
    SolveInfo, default_backend,
};
pub use boundary::{Boundary, BoundaryConditions, DofPartition};
pub use constitution::{
    ConstitutiveModel, Formulation, Hyperelastic, HyperelasticMaterial, LinearElastic,
    LinearElasticPlasticIsotropicHardening, NeoHooke, StateComponent, StateLayout, StateStore,
    StrainLaw, StrainMaterial, ThreeFieldVariation, UserMaterial, lame_converter,
};
pub use elements::{Element, Hexahedron};
pub use error::{Result, SolverError};
pub use math::{BatchStrategy, TensorField};
pub use mesh::Mesh;
pub use nonlinear_solver::{
    DriverState, IterationReport, NewtonConfig, NewtonRaphsonDriver, NewtonResults,
    NonlinearProblem,
};
pub use postprocess::{ResultFields, ResultStatistics};
pub use quadrature::GaussLegendre;
pub use region::Region;
pub use solid::SolidBody;
pub use stepping::Job;
