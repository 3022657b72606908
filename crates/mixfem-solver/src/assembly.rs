//! Global residual and tangent assembly with three-field static condensation.
//!
//! Per-point stress `P` and elasticity `A` are integrated against the
//! shape-function gradients of each hexahedron:
//!
//! ```text
//! r_e[a i]      = Σ_q P_iJ dN_a/dX_J dV
//! K_e[a i, b k] = Σ_q dN_a/dX_J A_iJkL dN_b/dX_L dV
//! ```
//!
//! For the mixed (u, p, J) formulation the element pressure and volume
//! ratio are eliminated locally. With `V` the undeformed and `v` the
//! deformed element volume and `H = ∫cof(F):∇N dV / V`:
//!
//! ```text
//! r_e += (v/V - J) V H + (dU/dJ - p) V H
//! K_e += d²U/dJ² V H ⊗ H
//! ```
//!
//! Element quantities are computed independently (optionally in parallel)
//! and scattered sequentially into COO triplets in element order, so the
//! global result does not depend on the batch strategy.

use crate::error::{Result, SolverError};
use crate::math::{BatchStrategy, TensorField, cof, det};
use crate::region::Region;
use log::debug;
use nalgebra::DVector;
use nalgebra_sparse::{CooMatrix, CsrMatrix};

/// Dofs of one hexahedron
pub const ELEMENT_DOFS: usize = 24;

/// Assembled global system.
#[derive(Debug, Clone)]
pub struct Assembly {
    pub residual: DVector<f64>,
    pub tangent: CsrMatrix<f64>,
}

impl Assembly {
    /// Whether every residual entry and every stored tangent value is finite.
    pub fn is_finite(&self) -> bool {
        self.residual.iter().all(|v| v.is_finite())
            && self.tangent.values().iter().all(|v| v.is_finite())
    }
}

/// Per-element data needed to recover the condensed fields.
#[derive(Debug, Clone)]
pub struct Condensation {
    /// Projection `H` per element
    pub projection: Vec<[f64; ELEMENT_DOFS]>,
    /// `d²U/dJ²` per element
    pub volumetric_stiffness: Vec<f64>,
    /// Undeformed element volumes
    pub reference_volume: Vec<f64>,
    /// Deformed element volumes
    pub current_volume: Vec<f64>,
}

/// Element increments of the condensed fields.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalIncrements {
    pub dp: Vec<f64>,
    pub dj: Vec<f64>,
}

impl Condensation {
    /// `dJ = H · δu_e` and `dp = dJ · d²U/dJ²` for every element.
    pub fn recover(&self, region: &Region, du: &DVector<f64>) -> LocalIncrements {
        let mesh = region.mesh();
        let dj: Vec<f64> = self
            .projection
            .iter()
            .enumerate()
            .map(|(e, h)| {
                mesh.dof_indices(e)
                    .iter()
                    .zip(h)
                    .map(|(&d, hk)| hk * du[d])
                    .sum()
            })
            .collect();
        let dp = dj
            .iter()
            .zip(&self.volumetric_stiffness)
            .map(|(dj, k)| dj * k)
            .collect();
        LocalIncrements { dp, dj }
    }
}

/// Turns per-point stress and elasticity into a global residual and tangent.
#[derive(Debug, Clone, Copy)]
pub struct MixedFieldAssembler<'a> {
    region: &'a Region,
    strategy: BatchStrategy,
}

impl<'a> MixedFieldAssembler<'a> {
    pub fn new(region: &'a Region, strategy: BatchStrategy) -> Self {
        Self { region, strategy }
    }

    pub fn region(&self) -> &'a Region {
        self.region
    }

    fn check_batch(&self, field: &TensorField, shape: &[usize], what: &str) -> Result<()> {
        if field.shape() != shape {
            return Err(SolverError::shape(format!(
                "{what} must have shape {shape:?}, got {:?}",
                field.shape()
            )));
        }
        field.require_same_batch(self.region.dv())
    }

    /// Fail with `DegenerateElement` on any non-positive (or non-finite)
    /// `det F`.
    pub fn check_volumes(&self, det_f: &TensorField) -> Result<()> {
        self.check_batch(det_f, &[], "det F")?;
        for e in 0..det_f.n_elements() {
            for q in 0..det_f.n_points() {
                let j = det_f.scalar(e, q);
                if !(j > 0.0) {
                    return Err(SolverError::DegenerateElement {
                        element: e,
                        reason: format!("det F = {j:.3e} at point {q}"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Integrated element vectors of a stress field.
    pub fn element_vectors(&self, stress: &TensorField) -> Result<Vec<[f64; ELEMENT_DOFS]>> {
        self.check_batch(stress, &[3, 3], "stress")?;
        let (dndx, dv) = (self.region.dndx(), self.region.dv());
        let nq = self.region.n_points();
        self.strategy.map_indexed(self.region.n_elements(), |e| {
            let mut r = [0.0; ELEMENT_DOFS];
            for q in 0..nq {
                let (p, dn, w) = (stress.at(e, q), dndx.at(e, q), dv.scalar(e, q));
                for a in 0..8 {
                    for i in 0..3 {
                        r[a * 3 + i] += w * (0..3).map(|j| p[i * 3 + j] * dn[a * 3 + j]).sum::<f64>();
                    }
                }
            }
            Ok(r)
        })
    }

    /// Integrated element matrices (row-major 24 × 24) of an elasticity field.
    pub fn element_matrices(&self, elasticity: &TensorField) -> Result<Vec<Vec<f64>>> {
        self.check_batch(elasticity, &[3, 3, 3, 3], "elasticity")?;
        let (dndx, dv) = (self.region.dndx(), self.region.dv());
        let nq = self.region.n_points();
        self.strategy.map_indexed(self.region.n_elements(), |e| {
            let mut k = vec![0.0; ELEMENT_DOFS * ELEMENT_DOFS];
            for q in 0..nq {
                let (a4, dn, w) = (elasticity.at(e, q), dndx.at(e, q), dv.scalar(e, q));
                // A_iJkL dN_b/dX_L, indexed [i, J, b, k]
                let mut adn = [0.0; 3 * 3 * 8 * 3];
                for i in 0..3 {
                    for j in 0..3 {
                        for b in 0..8 {
                            for kk in 0..3 {
                                adn[((i * 3 + j) * 8 + b) * 3 + kk] = (0..3)
                                    .map(|l| a4[((i * 3 + j) * 3 + kk) * 3 + l] * dn[b * 3 + l])
                                    .sum();
                            }
                        }
                    }
                }
                for a in 0..8 {
                    for i in 0..3 {
                        let row = (a * 3 + i) * ELEMENT_DOFS;
                        for b in 0..8 {
                            for kk in 0..3 {
                                let value: f64 = (0..3)
                                    .map(|j| dn[a * 3 + j] * adn[((i * 3 + j) * 8 + b) * 3 + kk])
                                    .sum();
                                k[row + b * 3 + kk] += w * value;
                            }
                        }
                    }
                }
            }
            Ok(k)
        })
    }

    /// Sum element vectors into a global vector.
    pub fn scatter_vector(&self, vectors: &[[f64; ELEMENT_DOFS]]) -> DVector<f64> {
        let mesh = self.region.mesh();
        let mut r = DVector::zeros(mesh.num_dofs());
        for (e, re) in vectors.iter().enumerate() {
            for (&d, v) in mesh.dof_indices(e).iter().zip(re) {
                r[d] += v;
            }
        }
        r
    }

    /// Sum element matrices into a global CSR matrix.
    pub fn scatter_matrix(&self, matrices: &[Vec<f64>]) -> CsrMatrix<f64> {
        let mesh = self.region.mesh();
        let n = mesh.num_dofs();
        let mut coo = CooMatrix::new(n, n);
        for (e, ke) in matrices.iter().enumerate() {
            let dofs = mesh.dof_indices(e);
            for (a, &row) in dofs.iter().enumerate() {
                for (b, &col) in dofs.iter().enumerate() {
                    coo.push(row, col, ke[a * ELEMENT_DOFS + b]);
                }
            }
        }
        CsrMatrix::from(&coo)
    }

    /// Single-field system from the stress and elasticity at every point.
    pub fn assemble(&self, stress: &TensorField, elasticity: &TensorField) -> Result<Assembly> {
        let residual = self.scatter_vector(&self.element_vectors(stress)?);
        let tangent = self.scatter_matrix(&self.element_matrices(elasticity)?);
        debug!(
            "assembled {} dofs, {} stored tangent entries",
            residual.len(),
            tangent.nnz()
        );
        Ok(Assembly { residual, tangent })
    }

    /// Three-field system with the pressure and volume ratio condensed out.
    ///
    /// `gradients` and `hessians` are the outputs of a three-field
    /// constitutive model evaluated at `(f, p, j)`; `j` holds the current
    /// element volume ratios.
    pub fn assemble_three_field(
        &self,
        f: &TensorField,
        j: &[f64],
        gradients: &[TensorField],
        hessians: &[TensorField],
    ) -> Result<(Assembly, Condensation)> {
        if gradients.len() != 3 || hessians.len() != 6 {
            return Err(SolverError::shape(format!(
                "three-field assembly needs 3 gradients and 6 hessians, got {} and {}",
                gradients.len(),
                hessians.len()
            )));
        }
        let ne = self.region.n_elements();
        if j.len() != ne {
            return Err(SolverError::shape(format!(
                "{} volume ratios for {ne} elements",
                j.len()
            )));
        }

        let det_f = det(f)?;
        self.check_volumes(&det_f)?;
        let reference_volume = self.region.element_volumes();
        if let Some(e) = reference_volume.iter().position(|&v| !(v > 0.0)) {
            return Err(SolverError::DegenerateElement {
                element: e,
                reason: format!("reference volume {:.3e}", reference_volume[e]),
            });
        }
        let current_volume = self.region.volume(&det_f)?;

        let integrated_cof = self.element_vectors(&cof(f)?)?;
        let projection: Vec<[f64; ELEMENT_DOFS]> = integrated_cof
            .iter()
            .zip(&reference_volume)
            .map(|(h, &vol)| h.map(|x| x / vol))
            .collect();

        // p and J are constant per element; so are dψ/dJ and d²U/dJ²
        let dpsi_dj = element_means(&gradients[2])?;
        let volumetric_stiffness = element_means(&hessians[5])?;

        let mut vectors = self.element_vectors(&gradients[0])?;
        for (e, re) in vectors.iter_mut().enumerate() {
            let vol = reference_volume[e];
            let factor = (current_volume[e] / vol - j[e]) * vol + dpsi_dj[e] * vol;
            for (r, h) in re.iter_mut().zip(&projection[e]) {
                *r += factor * h;
            }
        }

        let mut matrices = self.element_matrices(&hessians[0])?;
        for (e, ke) in matrices.iter_mut().enumerate() {
            let factor = volumetric_stiffness[e] * reference_volume[e];
            let h = &projection[e];
            for a in 0..ELEMENT_DOFS {
                for b in 0..ELEMENT_DOFS {
                    ke[a * ELEMENT_DOFS + b] += factor * h[a] * h[b];
                }
            }
        }

        let residual = self.scatter_vector(&vectors);
        let tangent = self.scatter_matrix(&matrices);
        debug!(
            "assembled three-field system: {} dofs, {} elements condensed",
            residual.len(),
            ne
        );
        Ok((
            Assembly { residual, tangent },
            Condensation {
                projection,
                volumetric_stiffness,
                reference_volume,
                current_volume,
            },
        ))
    }
}

/// Mean over the points of each element of a scalar field.
fn element_means(field: &TensorField) -> Result<Vec<f64>> {
    if field.rank() != 0 {
        return Err(SolverError::shape(format!(
            "expected a scalar field, got shape {:?}",
            field.shape()
        )));
    }
    let np = field.n_points() as f64;
    Ok((0..field.n_elements())
        .map(|e| (0..field.n_points()).map(|q| field.scalar(e, q)).sum::<f64>() / np)
        .collect())
}
