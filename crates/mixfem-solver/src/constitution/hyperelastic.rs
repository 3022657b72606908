//! Hyperelastic laws and their single- and three-field material wrappers.

use super::{ConstitutiveModel, Formulation};
use crate::error::{Result, SolverError};
use crate::math::{
    BatchStrategy, DyadicMode, TensorField, cdya_ik, cdya_il, cof, ddot, det, dya, identity_like,
    inv_and_det, transpose,
};

/// Strain-energy law expressed in the deformation gradient.
pub trait Hyperelastic: Send + Sync {
    /// First Piola-Kirchhoff stress `∂ψ/∂F`.
    fn stress(&self, f: &TensorField, strategy: BatchStrategy) -> Result<TensorField>;

    /// Elasticity tensor `∂²ψ/∂F∂F`.
    fn elasticity(&self, f: &TensorField, strategy: BatchStrategy) -> Result<TensorField>;
}

/// Nearly-incompressible Neo-Hookean law
///
/// `ψ = μ/2 (J^(-2/3) tr(C) - 3) + K/2 (J - 1)²`
///
/// The volumetric part is dropped when `bulk` is `None`, which is the
/// isochoric form used by [`ThreeFieldVariation`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeoHooke {
    /// Shear modulus μ
    pub mu: f64,
    /// Bulk modulus K
    pub bulk: Option<f64>,
}

impl NeoHooke {
    pub fn new(mu: f64, bulk: Option<f64>) -> Self {
        Self { mu, bulk }
    }

    /// Isochoric part only.
    pub fn isochoric(mu: f64) -> Self {
        Self { mu, bulk: None }
    }
}

/// Invariants shared by stress and elasticity.
struct Kinematics {
    /// F^(-T)
    i_ft: TensorField,
    /// det F
    j: TensorField,
    /// tr(C) = F : F
    i1: TensorField,
    /// J^(-2/3)
    jm23: TensorField,
}

impl Kinematics {
    fn of(f: &TensorField, strategy: BatchStrategy) -> Result<Self> {
        let (inv_f, j) = inv_and_det(f, false)?;
        Ok(Self {
            i_ft: transpose(&inv_f)?,
            i1: ddot(f, f, strategy)?,
            jm23: j.map_values(|j| j.powf(-2.0 / 3.0)),
            j,
        })
    }
}

impl Hyperelastic for NeoHooke {
    fn stress(&self, f: &TensorField, strategy: BatchStrategy) -> Result<TensorField> {
        let k = Kinematics::of(f, strategy)?;
        let p_iso = f
            .sub(&k.i_ft.scale_by(&k.i1.scale(1.0 / 3.0))?)?
            .scale_by(&k.jm23)?
            .scale(self.mu);
        match self.bulk {
            None => Ok(p_iso),
            Some(bulk) => {
                let factor = k.j.map_values(|j| bulk * (j - 1.0) * j);
                p_iso.add(&k.i_ft.scale_by(&factor)?)
            }
        }
    }

    fn elasticity(&self, f: &TensorField, strategy: BatchStrategy) -> Result<TensorField> {
        let k = Kinematics::of(f, strategy)?;
        let eye = identity_like(f)?;
        let i_ft_i_ft = dya(&k.i_ft, &k.i_ft, DyadicMode::Matrix, strategy)?;
        let il = cdya_il(&k.i_ft, &k.i_ft, strategy)?;

        let mixed = dya(f, &k.i_ft, DyadicMode::Matrix, strategy)?
            .add(&dya(&k.i_ft, f, DyadicMode::Matrix, strategy)?)?;
        let a_iso = cdya_ik(&eye, &eye, strategy)?
            .axpy(-2.0 / 3.0, &mixed)?
            .add(&i_ft_i_ft.scale_by(&k.i1.scale(2.0 / 9.0))?)?
            .add(&il.scale_by(&k.i1.scale(1.0 / 3.0))?)?
            .scale_by(&k.jm23)?
            .scale(self.mu);

        match self.bulk {
            None => Ok(a_iso),
            Some(bulk) => {
                let a = k.j.map_values(|j| bulk * j * (2.0 * j - 1.0));
                let b = k.j.map_values(|j| bulk * (j - 1.0) * j);
                a_iso
                    .add(&i_ft_i_ft.scale_by(&a)?)?
                    .sub(&il.scale_by(&b)?)
            }
        }
    }
}

/// Single-field (displacement) material over a hyperelastic law.
#[derive(Debug, Clone)]
pub struct HyperelasticMaterial<M> {
    pub law: M,
    pub strategy: BatchStrategy,
}

impl<M: Hyperelastic> HyperelasticMaterial<M> {
    pub fn new(law: M) -> Self {
        Self {
            law,
            strategy: BatchStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: BatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }
}

impl<M: Hyperelastic> ConstitutiveModel for HyperelasticMaterial<M> {
    fn gradient(
        &self,
        fields: &[TensorField],
        old_state: &TensorField,
    ) -> Result<(Vec<TensorField>, TensorField)> {
        let p = self.law.stress(&fields[0], self.strategy)?;
        Ok((vec![p], old_state.clone()))
    }

    fn hessian(&self, fields: &[TensorField], _old_state: &TensorField) -> Result<Vec<TensorField>> {
        Ok(vec![self.law.elasticity(&fields[0], self.strategy)?])
    }
}

/// Three-field (u, p, J) variation of an isochoric hyperelastic law
///
/// `ψ(F, p, J) = ψ_iso(F) + K/2 (J - 1)² + p (det F - J)`
#[derive(Debug, Clone)]
pub struct ThreeFieldVariation<M> {
    /// Isochoric law; it must not carry its own volumetric part
    pub law: M,
    /// Bulk modulus K
    pub bulk: f64,
    pub strategy: BatchStrategy,
}

impl<M: Hyperelastic> ThreeFieldVariation<M> {
    pub fn new(law: M, bulk: f64) -> Self {
        Self {
            law,
            bulk,
            strategy: BatchStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: BatchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// First derivative of the volumetric energy `U(J) = K/2 (J - 1)²`.
    pub fn volumetric_gradient(&self, j: f64) -> f64 {
        self.bulk * (j - 1.0)
    }

    /// Second derivative of the volumetric energy.
    pub fn volumetric_hessian(&self, _j: f64) -> f64 {
        self.bulk
    }
}

fn scalar_inputs<'a>(fields: &'a [TensorField]) -> Result<(&'a TensorField, &'a TensorField)> {
    let (p, j) = (&fields[1], &fields[2]);
    if p.rank() != 0 || j.rank() != 0 {
        return Err(SolverError::shape(format!(
            "pressure and volume ratio must be scalar fields, got {:?} and {:?}",
            p.shape(),
            j.shape()
        )));
    }
    Ok((p, j))
}

impl<M: Hyperelastic> ConstitutiveModel for ThreeFieldVariation<M> {
    fn formulation(&self) -> Formulation {
        Formulation::ThreeField
    }

    fn gradient(
        &self,
        fields: &[TensorField],
        old_state: &TensorField,
    ) -> Result<(Vec<TensorField>, TensorField)> {
        let f = &fields[0];
        let (p, j) = scalar_inputs(fields)?;
        let det_f = det(f)?;
        let cof_f = cof(f)?;
        let bulk = self.bulk;

        let dpsi_df = self.law.stress(f, self.strategy)?.add(&cof_f.scale_by(p)?)?;
        let dpsi_dp = det_f.sub(j)?;
        let dpsi_dj = j
            .zip_points(p, &[], BatchStrategy::Serial, |j, p, o| {
                o[0] = bulk * (j[0] - 1.0) - p[0]
            })?;
        Ok((vec![dpsi_df, dpsi_dp, dpsi_dj], old_state.clone()))
    }

    fn hessian(&self, fields: &[TensorField], _old_state: &TensorField) -> Result<Vec<TensorField>> {
        let f = &fields[0];
        let (p, _j) = scalar_inputs(fields)?;
        let s = self.strategy;
        let (inv_f, det_f) = inv_and_det(f, false)?;
        let i_ft = transpose(&inv_f)?;
        let cof_f = i_ft.scale_by(&det_f)?;

        // ∂cof(F)/∂F = J (F^-T ⊗ F^-T - F^-T ⊙ F^-T)
        let dcof_df = dya(&i_ft, &i_ft, DyadicMode::Matrix, s)?
            .sub(&cdya_il(&i_ft, &i_ft, s)?)?
            .scale_by(&det_f)?;

        let (ne, np) = (f.n_elements(), f.n_points());
        let d = f.shape()[0];
        Ok(vec![
            self.law.elasticity(f, s)?.add(&dcof_df.scale_by(p)?)?,
            cof_f,
            TensorField::zeros(&[d, d], ne, np),
            TensorField::zeros(&[], ne, np),
            TensorField::filled(&[], ne, np, -1.0),
            TensorField::filled(&[], ne, np, self.bulk),
        ])
    }
}
