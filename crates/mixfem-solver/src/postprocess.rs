//! Post-processing of a solved body into nodal and element result fields.
//!
//! Point quantities (Cauchy stress, its principal values, von Mises stress)
//! are projected to the nodes by volume-weighted averaging over all
//! integration points of the adjacent elements. Reaction forces are the
//! residual reshaped per node; they vanish on free dofs at equilibrium.

use crate::error::{Result, SolverError};
use crate::math::{BatchStrategy, TensorField, det, dot, eigvalsh, equivalent_von_mises, transpose};
use crate::mesh::DOFS_PER_NODE;
use crate::nonlinear_solver::NonlinearProblem;
use crate::region::Region;
use crate::solid::SolidBody;
use nalgebra::DVector;
use serde::Serialize;

/// Cauchy stress `σ = P Fᵀ / det F`.
pub fn cauchy_stress(
    piola: &TensorField,
    f: &TensorField,
    strategy: BatchStrategy,
) -> Result<TensorField> {
    let inverse_volume = det(f)?.map_values(|j| 1.0 / j);
    dot(piola, &transpose(f)?, strategy)?.scale_by(&inverse_volume)
}

/// Volume-weighted nodal average of a point field, `size` values per node.
pub fn project_to_nodes(region: &Region, field: &TensorField) -> Result<Vec<f64>> {
    field.require_same_batch(region.dv())?;
    let mesh = region.mesh();
    let size = field.size();
    let mut sums = vec![0.0; mesh.num_points() * size];
    let mut weights = vec![0.0; mesh.num_points()];
    for (e, cell) in mesh.cells.iter().enumerate() {
        for q in 0..region.n_points() {
            let w = region.dv().scalar(e, q);
            let values = field.at(e, q);
            for &node in cell {
                weights[node] += w;
                for (s, v) in sums[node * size..(node + 1) * size].iter_mut().zip(values) {
                    *s += w * v;
                }
            }
        }
    }
    for (node, &w) in weights.iter().enumerate() {
        if w > 0.0 {
            for s in &mut sums[node * size..(node + 1) * size] {
                *s /= w;
            }
        }
    }
    Ok(sums)
}

/// Dof vector reshaped to one vector per node.
pub fn per_node(values: &[f64]) -> Vec<[f64; 3]> {
    values
        .chunks_exact(DOFS_PER_NODE)
        .map(|c| [c[0], c[1], c[2]])
        .collect()
}

/// Residual reshaped to one force vector per node.
pub fn reaction_forces(residual: &DVector<f64>) -> Vec<[f64; 3]> {
    per_node(residual.as_slice())
}

/// Min/max/mean of a scalar result
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResultStatistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl ResultStatistics {
    pub fn of(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self {
                min: 0.0,
                max: 0.0,
                mean: 0.0,
            };
        }
        Self {
            min: values.iter().cloned().fold(f64::INFINITY, f64::min),
            max: values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
            mean: values.iter().sum::<f64>() / values.len() as f64,
        }
    }
}

/// Result fields handed to an export sink.
#[derive(Debug, Clone, Serialize)]
pub struct ResultFields {
    /// Nodal displacement
    pub displacement: Vec<[f64; 3]>,
    /// Nodal Cauchy stress, row-major
    pub cauchy_stress: Vec<[f64; 9]>,
    /// Nodal principal stresses, ascending
    pub principal_stress: Vec<[f64; 3]>,
    /// Nodal von Mises stress
    pub von_mises: Vec<f64>,
    /// Nodal reaction force
    pub reaction_force: Vec<[f64; 3]>,
    /// Element pressure
    pub pressure: Vec<f64>,
    /// Element volume ratio
    pub volume_ratio: Vec<f64>,
}

impl ResultFields {
    /// Evaluate the result fields of a body at its current fields.
    ///
    /// Re-assembles the body for the reaction forces, which overwrites its
    /// trial state with the one of the current fields.
    pub fn collect(body: &mut SolidBody<'_>, strategy: BatchStrategy) -> Result<Self> {
        let region = body.region();
        let f = body.deformation_gradient()?;
        let sigma = cauchy_stress(&body.stress()?, &f, strategy)?;
        let principal = eigvalsh(&sigma, false, strategy)?;
        let mises = equivalent_von_mises(&sigma)?;
        let residual = body.assemble()?.residual;

        Ok(Self {
            displacement: per_node(body.displacement()),
            cauchy_stress: chunked(&project_to_nodes(region, &sigma)?)?,
            principal_stress: chunked(&project_to_nodes(region, &principal)?)?,
            von_mises: project_to_nodes(region, &mises)?,
            reaction_force: reaction_forces(&residual),
            pressure: body.pressure().to_vec(),
            volume_ratio: body.volume_ratio().to_vec(),
        })
    }

    pub fn von_mises_statistics(&self) -> ResultStatistics {
        ResultStatistics::of(&self.von_mises)
    }

    /// Sum of the reaction forces over a set of nodes.
    pub fn total_reaction(&self, nodes: &[usize]) -> [f64; 3] {
        let mut total = [0.0; 3];
        for &n in nodes {
            if let Some(r) = self.reaction_force.get(n) {
                for i in 0..3 {
                    total[i] += r[i];
                }
            }
        }
        total
    }
}

fn chunked<const N: usize>(values: &[f64]) -> Result<Vec<[f64; N]>> {
    values
        .chunks_exact(N)
        .map(|c| {
            c.try_into()
                .map_err(|_| SolverError::shape(format!("expected blocks of {N} values")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::identity;
    use crate::mesh::Mesh;
    use crate::quadrature::GaussLegendre;

    #[test]
    fn cauchy_equals_piola_without_deformation() {
        let f = identity(3, 2, 1);
        let p = TensorField::broadcast(&[3, 3], &[1.0, 2.0, 0.0, 2.0, 3.0, 0.0, 0.0, 0.0, 4.0], 2, 1)
            .unwrap();
        let sigma = cauchy_stress(&p, &f, BatchStrategy::Serial).unwrap();
        assert!(sigma.max_abs_diff(&p) < 1e-15);
    }

    #[test]
    fn cauchy_of_uniaxial_stretch() {
        // F = diag(2, 1, 1), P = diag(4, 0, 0): σ = P Fᵀ / J = diag(4, 0, 0)
        let f = TensorField::broadcast(&[3, 3], &[2.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0], 1, 1)
            .unwrap();
        let p = TensorField::broadcast(&[3, 3], &[4.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0], 1, 1)
            .unwrap();
        let sigma = cauchy_stress(&p, &f, BatchStrategy::Serial).unwrap();
        assert!((sigma.point(0)[0] - 4.0).abs() < 1e-15);
    }

    #[test]
    fn projection_preserves_constant_fields() {
        let mesh = Mesh::cube([0.0; 3], [2.0, 1.0, 1.0], [3, 2, 2]).unwrap();
        let region = Region::new(mesh, GaussLegendre::hexahedron(2).unwrap()).unwrap();
        let field = TensorField::filled(&[2], region.n_elements(), region.n_points(), 1.5);
        let nodal = project_to_nodes(&region, &field).unwrap();
        assert_eq!(nodal.len(), region.mesh().num_points() * 2);
        assert!(nodal.iter().all(|v| (v - 1.5).abs() < 1e-14));
    }

    #[test]
    fn statistics_of_values() {
        let stats = ResultStatistics::of(&[1.0, 3.0, 2.0]);
        assert_eq!(stats.min, 1.0);
        assert_eq!(stats.max, 3.0);
        assert_eq!(stats.mean, 2.0);
        assert_eq!(ResultStatistics::of(&[]).mean, 0.0);
    }

    #[test]
    fn reactions_per_node() {
        let r = DVector::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(reaction_forces(&r), vec![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
    }
}
