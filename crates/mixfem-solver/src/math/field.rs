//! Batched tensor storage.
//!
//! A [`TensorField`] holds one tensor of a fixed shape for every
//! (element, quadrature point) pair. Logically it is indexed as
//! `(i, j[, k, l], element, point)`: the leading axes are tensor indices and
//! the trailing two are the batch. Storage is point-contiguous, i.e. all
//! components of one (element, point) pair are adjacent, so the batch can be
//! split into chunks and processed in parallel.

use crate::error::{Result, SolverError};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// How a batched operation walks over the element × point batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStrategy {
    /// Sequential loop over the batch.
    #[default]
    Serial,
    /// Rayon work-stealing over chunks of the batch.
    Parallel,
}

impl BatchStrategy {
    /// Map `f` over `0..n` preserving order, short-circuiting on the first error.
    pub fn map_indexed<T, F>(self, n: usize, f: F) -> Result<Vec<T>>
    where
        T: Send,
        F: Fn(usize) -> Result<T> + Sync + Send,
    {
        match self {
            BatchStrategy::Serial => (0..n).map(f).collect(),
            BatchStrategy::Parallel => (0..n).into_par_iter().map(f).collect(),
        }
    }
}

/// Tensor of arbitrary (small) rank sampled over an element × point batch.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorField {
    shape: Vec<usize>,
    n_elements: usize,
    n_points: usize,
    data: Vec<f64>,
}

impl TensorField {
    /// Zero-filled field.
    pub fn zeros(shape: &[usize], n_elements: usize, n_points: usize) -> Self {
        let size: usize = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            n_elements,
            n_points,
            data: vec![0.0; size * n_elements * n_points],
        }
    }

    /// Field filled with a constant value.
    pub fn filled(shape: &[usize], n_elements: usize, n_points: usize, value: f64) -> Self {
        let mut field = Self::zeros(shape, n_elements, n_points);
        field.data.fill(value);
        field
    }

    /// Build a field from point-contiguous data.
    pub fn from_data(
        shape: &[usize],
        n_elements: usize,
        n_points: usize,
        data: Vec<f64>,
    ) -> Result<Self> {
        let size: usize = shape.iter().product();
        if data.len() != size * n_elements * n_points {
            return Err(SolverError::shape(format!(
                "data length {} does not match shape {:?} over batch ({}, {})",
                data.len(),
                shape,
                n_elements,
                n_points
            )));
        }
        Ok(Self {
            shape: shape.to_vec(),
            n_elements,
            n_points,
            data,
        })
    }

    /// The same tensor (given row-major components) repeated over the batch.
    pub fn broadcast(
        shape: &[usize],
        components: &[f64],
        n_elements: usize,
        n_points: usize,
    ) -> Result<Self> {
        let size: usize = shape.iter().product();
        if components.len() != size {
            return Err(SolverError::shape(format!(
                "{} components given for shape {:?}",
                components.len(),
                shape
            )));
        }
        let mut data = Vec::with_capacity(size * n_elements * n_points);
        for _ in 0..n_elements * n_points {
            data.extend_from_slice(components);
        }
        Ok(Self {
            shape: shape.to_vec(),
            n_elements,
            n_points,
            data,
        })
    }

    /// Scalar field taking one value per element, constant over its points.
    pub fn from_cells(values: &[f64], n_points: usize) -> Self {
        let mut data = Vec::with_capacity(values.len() * n_points);
        for &v in values {
            data.extend(std::iter::repeat_n(v, n_points));
        }
        Self {
            shape: Vec::new(),
            n_elements: values.len(),
            n_points,
            data,
        }
    }

    /// 2nd-order field whose per-point matrices are given as nalgebra matrices
    /// (ordered element-major).
    pub fn from_matrices(matrices: &[DMatrix<f64>], n_elements: usize, n_points: usize) -> Result<Self> {
        if matrices.len() != n_elements * n_points {
            return Err(SolverError::shape("matrix count does not match batch size"));
        }
        let (r, c) = matrices.first().map(|m| m.shape()).unwrap_or((0, 0));
        let mut data = Vec::with_capacity(r * c * matrices.len());
        for m in matrices {
            if m.shape() != (r, c) {
                return Err(SolverError::shape("matrices with mixed shapes"));
            }
            for i in 0..r {
                for j in 0..c {
                    data.push(m[(i, j)]);
                }
            }
        }
        Self::from_data(&[r, c], n_elements, n_points, data)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Number of components per point.
    pub fn size(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn n_elements(&self) -> usize {
        self.n_elements
    }

    pub fn n_points(&self) -> usize {
        self.n_points
    }

    /// Number of (element, point) pairs.
    pub fn batch_len(&self) -> usize {
        self.n_elements * self.n_points
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.data
    }

    pub fn into_data(self) -> Vec<f64> {
        self.data
    }

    /// Components of the tensor at flat batch index `b = element * n_points + point`.
    pub fn point(&self, b: usize) -> &[f64] {
        let size = self.size();
        &self.data[b * size..(b + 1) * size]
    }

    pub fn point_mut(&mut self, b: usize) -> &mut [f64] {
        let size = self.size();
        &mut self.data[b * size..(b + 1) * size]
    }

    /// Components of the tensor at (element, point).
    pub fn at(&self, element: usize, point: usize) -> &[f64] {
        self.point(element * self.n_points + point)
    }

    /// Single component by tensor index.
    pub fn get(&self, index: &[usize], element: usize, point: usize) -> f64 {
        self.at(element, point)[self.flat_index(index)]
    }

    /// Row-major position of a tensor index.
    pub fn flat_index(&self, index: &[usize]) -> usize {
        index
            .iter()
            .zip(&self.shape)
            .fold(0, |acc, (&i, &n)| acc * n + i)
    }

    /// The 2nd-order tensor at (element, point) as a matrix.
    pub fn matrix(&self, element: usize, point: usize) -> Result<DMatrix<f64>> {
        if self.rank() != 2 {
            return Err(SolverError::shape(format!(
                "matrix view needs a 2nd-order field, got shape {:?}",
                self.shape
            )));
        }
        Ok(DMatrix::from_row_slice(
            self.shape[0],
            self.shape[1],
            self.at(element, point),
        ))
    }

    /// Scalar value at (element, point) of a rank-0 field.
    pub fn scalar(&self, element: usize, point: usize) -> f64 {
        self.at(element, point)[0]
    }

    pub fn same_batch(&self, other: &TensorField) -> bool {
        self.n_elements == other.n_elements && self.n_points == other.n_points
    }

    pub(crate) fn require_same_batch(&self, other: &TensorField) -> Result<()> {
        if self.same_batch(other) {
            Ok(())
        } else {
            Err(SolverError::shape(format!(
                "batch ({}, {}) does not match batch ({}, {})",
                self.n_elements, self.n_points, other.n_elements, other.n_points
            )))
        }
    }

    /// Apply `f(input, output)` to every point, producing a field of `out_shape`.
    pub fn map_points<F>(&self, out_shape: &[usize], strategy: BatchStrategy, f: F) -> TensorField
    where
        F: Fn(&[f64], &mut [f64]) + Sync + Send,
    {
        let mut out = TensorField::zeros(out_shape, self.n_elements, self.n_points);
        let (isz, osz) = (self.size(), out.size());
        if isz == 0 || osz == 0 {
            for b in 0..self.batch_len() {
                f(&self.data[b * isz..(b + 1) * isz], &mut out.data[b * osz..(b + 1) * osz]);
            }
            return out;
        }
        match strategy {
            BatchStrategy::Serial => out
                .data
                .chunks_mut(osz)
                .zip(self.data.chunks(isz))
                .for_each(|(o, a)| f(a, o)),
            BatchStrategy::Parallel => out
                .data
                .par_chunks_mut(osz)
                .zip(self.data.par_chunks(isz))
                .for_each(|(o, a)| f(a, o)),
        }
        out
    }

    /// Apply `f(a, b, output)` pointwise over two fields sharing a batch.
    pub fn zip_points<F>(
        &self,
        other: &TensorField,
        out_shape: &[usize],
        strategy: BatchStrategy,
        f: F,
    ) -> Result<TensorField>
    where
        F: Fn(&[f64], &[f64], &mut [f64]) + Sync + Send,
    {
        self.require_same_batch(other)?;
        let mut out = TensorField::zeros(out_shape, self.n_elements, self.n_points);
        let (asz, bsz, osz) = (self.size(), other.size(), out.size());
        if asz == 0 || bsz == 0 || osz == 0 {
            for b in 0..self.batch_len() {
                f(
                    &self.data[b * asz..(b + 1) * asz],
                    &other.data[b * bsz..(b + 1) * bsz],
                    &mut out.data[b * osz..(b + 1) * osz],
                );
            }
            return Ok(out);
        }
        match strategy {
            BatchStrategy::Serial => out
                .data
                .chunks_mut(osz)
                .zip(self.data.chunks(asz).zip(other.data.chunks(bsz)))
                .for_each(|(o, (a, b))| f(a, b, o)),
            BatchStrategy::Parallel => out
                .data
                .par_chunks_mut(osz)
                .zip(self.data.par_chunks(asz).zip(other.data.par_chunks(bsz)))
                .for_each(|(o, (a, b))| f(a, b, o)),
        }
        Ok(out)
    }

    /// Elementwise sum of two fields with identical shape and batch.
    pub fn add(&self, other: &TensorField) -> Result<TensorField> {
        self.axpy(1.0, other)
    }

    /// Elementwise difference of two fields with identical shape and batch.
    pub fn sub(&self, other: &TensorField) -> Result<TensorField> {
        self.axpy(-1.0, other)
    }

    /// `self + alpha * other`.
    pub fn axpy(&self, alpha: f64, other: &TensorField) -> Result<TensorField> {
        if self.shape != other.shape {
            return Err(SolverError::shape(format!(
                "cannot combine shapes {:?} and {:?}",
                self.shape, other.shape
            )));
        }
        self.require_same_batch(other)?;
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| a + alpha * b)
            .collect();
        Ok(TensorField {
            shape: self.shape.clone(),
            n_elements: self.n_elements,
            n_points: self.n_points,
            data,
        })
    }

    /// Multiply every component by a constant.
    pub fn scale(&self, factor: f64) -> TensorField {
        TensorField {
            shape: self.shape.clone(),
            n_elements: self.n_elements,
            n_points: self.n_points,
            data: self.data.iter().map(|v| v * factor).collect(),
        }
    }

    /// Multiply each point's tensor by the matching value of a scalar field.
    pub fn scale_by(&self, scalar: &TensorField) -> Result<TensorField> {
        if scalar.rank() != 0 {
            return Err(SolverError::shape("scale_by expects a scalar field"));
        }
        self.zip_points(scalar, &self.shape.clone(), BatchStrategy::Serial, |a, s, o| {
            for (oi, ai) in o.iter_mut().zip(a) {
                *oi = ai * s[0];
            }
        })
    }

    /// Apply a function to every component.
    pub fn map_values(&self, f: impl Fn(f64) -> f64) -> TensorField {
        TensorField {
            shape: self.shape.clone(),
            n_elements: self.n_elements,
            n_points: self.n_points,
            data: self.data.iter().map(|&v| f(v)).collect(),
        }
    }

    /// Reinterpret the per-point components with another shape of equal size.
    pub fn reshape(&self, shape: &[usize]) -> Result<TensorField> {
        let size: usize = shape.iter().product();
        if size != self.size() {
            return Err(SolverError::shape(format!(
                "cannot reshape {:?} into {:?}",
                self.shape, shape
            )));
        }
        Ok(TensorField {
            shape: shape.to_vec(),
            n_elements: self.n_elements,
            n_points: self.n_points,
            data: self.data.clone(),
        })
    }

    pub fn has_nan(&self) -> bool {
        self.data.iter().any(|v| v.is_nan())
    }

    /// Largest absolute componentwise difference to another field.
    ///
    /// Fields of different shape or batch are infinitely far apart.
    pub fn max_abs_diff(&self, other: &TensorField) -> f64 {
        if self.shape != other.shape || !self.same_batch(other) {
            return f64::INFINITY;
        }
        self.data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }
}
