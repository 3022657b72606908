//! Numeric region: a mesh together with its element and quadrature rule.
//!
//! Shape-function gradients with respect to the undeformed coordinates and
//! the integration volumes are computed once, at construction, for every
//! (element, point) pair.

use crate::elements::{Element, Hexahedron};
use crate::error::{Result, SolverError};
use crate::math::{BatchStrategy, TensorField, identity};
use crate::mesh::{DOFS_PER_NODE, Mesh};
use crate::quadrature::GaussLegendre;
use log::debug;
use nalgebra::Matrix3;

/// Precomputed geometry of a hexahedral mesh
#[derive(Debug, Clone)]
pub struct Region {
    mesh: Mesh,
    quadrature: GaussLegendre,
    /// `dN_a/dX_J` with shape `[8, 3]`
    dndx: TensorField,
    /// Integration volumes `det(dX/dξ) · w`
    dv: TensorField,
}

impl Region {
    /// Build the region; fails on invalid connectivity or on any point with
    /// a non-positive Jacobian.
    pub fn new(mesh: Mesh, quadrature: GaussLegendre) -> Result<Self> {
        mesh.validate()?;
        let element = Hexahedron;
        let (ne, nq) = (mesh.num_cells(), quadrature.num_points());
        let n = element.num_nodes();

        let reference: Vec<Vec<f64>> = quadrature
            .points
            .iter()
            .map(|xi| element.shape_gradients(xi))
            .collect();

        let mut dndx = Vec::with_capacity(ne * nq * n * 3);
        let mut dv = Vec::with_capacity(ne * nq);
        for (e, cell) in mesh.cells.iter().enumerate() {
            for (q, dn_dxi) in reference.iter().enumerate() {
                // dX_i/dξ_J
                let mut jac = Matrix3::<f64>::zeros();
                for (a, &p) in cell.iter().enumerate() {
                    for i in 0..3 {
                        for j in 0..3 {
                            jac[(i, j)] += mesh.points[p][i] * dn_dxi[a * 3 + j];
                        }
                    }
                }
                let det_j = jac.determinant();
                if det_j <= 0.0 {
                    return Err(SolverError::DegenerateElement {
                        element: e,
                        reason: format!("non-positive Jacobian {det_j:.3e} at point {q}"),
                    });
                }
                let inv_j = jac.try_inverse().ok_or_else(|| SolverError::DegenerateElement {
                    element: e,
                    reason: format!("singular Jacobian at point {q}"),
                })?;
                for a in 0..n {
                    for i in 0..3 {
                        dndx.push((0..3).map(|j| dn_dxi[a * 3 + j] * inv_j[(j, i)]).sum());
                    }
                }
                dv.push(det_j * quadrature.weights[q]);
            }
        }
        debug!("region: {ne} cells x {nq} points");

        Ok(Self {
            dndx: TensorField::from_data(&[n, 3], ne, nq, dndx)?,
            dv: TensorField::from_data(&[], ne, nq, dv)?,
            mesh,
            quadrature,
        })
    }

    pub fn mesh(&self) -> &Mesh {
        &self.mesh
    }

    pub fn quadrature(&self) -> &GaussLegendre {
        &self.quadrature
    }

    pub fn n_elements(&self) -> usize {
        self.mesh.num_cells()
    }

    pub fn n_points(&self) -> usize {
        self.quadrature.num_points()
    }

    /// Shape-function gradients `dN/dX`
    pub fn dndx(&self) -> &TensorField {
        &self.dndx
    }

    /// Integration volumes
    pub fn dv(&self) -> &TensorField {
        &self.dv
    }

    fn check_displacement(&self, u: &[f64]) -> Result<()> {
        if u.len() != self.mesh.num_dofs() {
            return Err(SolverError::shape(format!(
                "displacement vector of length {} for {} dofs",
                u.len(),
                self.mesh.num_dofs()
            )));
        }
        Ok(())
    }

    /// Displacement gradient `∂u/∂X` at every point.
    pub fn grad(&self, u: &[f64], strategy: BatchStrategy) -> Result<TensorField> {
        self.check_displacement(u)?;
        let nq = self.n_points();
        let blocks = strategy.map_indexed(self.n_elements(), |e| {
            let cell = &self.mesh.cells[e];
            let mut out = vec![0.0; nq * 9];
            for q in 0..nq {
                let dn = self.dndx.at(e, q);
                let h = &mut out[q * 9..(q + 1) * 9];
                for (a, &p) in cell.iter().enumerate() {
                    for i in 0..3 {
                        let ui = u[p * DOFS_PER_NODE + i];
                        for j in 0..3 {
                            h[i * 3 + j] += ui * dn[a * 3 + j];
                        }
                    }
                }
            }
            Ok(out)
        })?;
        TensorField::from_data(&[3, 3], self.n_elements(), nq, blocks.concat())
    }

    /// Deformation gradient `F = 1 + ∂u/∂X`.
    pub fn deformation_gradient(&self, u: &[f64], strategy: BatchStrategy) -> Result<TensorField> {
        let eye = identity(3, self.n_elements(), self.n_points());
        eye.add(&self.grad(u, strategy)?)
    }

    /// Per-element integral of a scalar field.
    pub fn volume(&self, scalar: &TensorField) -> Result<Vec<f64>> {
        if scalar.rank() != 0 {
            return Err(SolverError::shape("volume integrates scalar fields only"));
        }
        scalar.require_same_batch(&self.dv)?;
        Ok((0..self.n_elements())
            .map(|e| {
                (0..self.n_points())
                    .map(|q| scalar.scalar(e, q) * self.dv.scalar(e, q))
                    .sum()
            })
            .collect())
    }

    /// Undeformed element volumes.
    pub fn element_volumes(&self) -> Vec<f64> {
        (0..self.n_elements())
            .map(|e| (0..self.n_points()).map(|q| self.dv.scalar(e, q)).sum())
            .collect()
    }

    /// Broadcast one value per element onto its points.
    pub fn interpolate_cells(&self, values: &[f64]) -> Result<TensorField> {
        if values.len() != self.n_elements() {
            return Err(SolverError::shape(format!(
                "{} cell values for {} cells",
                values.len(),
                self.n_elements()
            )));
        }
        Ok(TensorField::from_cells(values, self.n_points()))
    }
}
