//! Hexahedral meshes.
//!
//! Points are addressed by their position in `points`; every cell lists eight
//! point indices in the [`Hexahedron`](crate::elements::Hexahedron) node order.

use crate::error::{Result, SolverError};

/// Displacement dofs per node
pub const DOFS_PER_NODE: usize = 3;

/// A mesh of trilinear hexahedra
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    /// Node coordinates
    pub points: Vec<[f64; 3]>,
    /// Cell connectivity (point indices)
    pub cells: Vec<[usize; 8]>,
}

impl Mesh {
    pub fn new(points: Vec<[f64; 3]>, cells: Vec<[usize; 8]>) -> Self {
        Self { points, cells }
    }

    /// Structured block from corner `a` to corner `b` with `n[i]` nodes along
    /// axis `i`.
    pub fn cube(a: [f64; 3], b: [f64; 3], n: [usize; 3]) -> Result<Self> {
        if n.iter().any(|&k| k < 2) {
            return Err(SolverError::Mesh(format!(
                "a block needs at least 2 nodes per axis, got {n:?}"
            )));
        }
        if (0..3).any(|i| b[i] <= a[i]) {
            return Err(SolverError::Mesh(format!(
                "block corners {a:?} -> {b:?} do not span a positive volume"
            )));
        }

        let coord = |i: usize, k: usize| a[i] + (b[i] - a[i]) * k as f64 / (n[i] - 1) as f64;
        let mut points = Vec::with_capacity(n[0] * n[1] * n[2]);
        for k in 0..n[2] {
            for j in 0..n[1] {
                for i in 0..n[0] {
                    points.push([coord(0, i), coord(1, j), coord(2, k)]);
                }
            }
        }

        let id = |i: usize, j: usize, k: usize| i + n[0] * (j + n[1] * k);
        let mut cells = Vec::with_capacity((n[0] - 1) * (n[1] - 1) * (n[2] - 1));
        for k in 0..n[2] - 1 {
            for j in 0..n[1] - 1 {
                for i in 0..n[0] - 1 {
                    cells.push([
                        id(i, j, k),
                        id(i + 1, j, k),
                        id(i + 1, j + 1, k),
                        id(i, j + 1, k),
                        id(i, j, k + 1),
                        id(i + 1, j, k + 1),
                        id(i + 1, j + 1, k + 1),
                        id(i, j + 1, k + 1),
                    ]);
                }
            }
        }
        Ok(Self { points, cells })
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    pub fn num_cells(&self) -> usize {
        self.cells.len()
    }

    /// Total number of displacement dofs
    pub fn num_dofs(&self) -> usize {
        self.points.len() * DOFS_PER_NODE
    }

    /// Check that every cell refers to existing, distinct points
    pub fn validate(&self) -> Result<()> {
        for (c, cell) in self.cells.iter().enumerate() {
            if let Some(p) = cell.iter().find(|&&p| p >= self.points.len()) {
                return Err(SolverError::Mesh(format!(
                    "cell {c} references point {p}, but the mesh has {} points",
                    self.points.len()
                )));
            }
            for (i, p) in cell.iter().enumerate() {
                if cell[..i].contains(p) {
                    return Err(SolverError::Mesh(format!(
                        "cell {c} references point {p} twice"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Global dofs of a cell, node-major (`node * 3 + component`)
    pub fn dof_indices(&self, cell: usize) -> [usize; 24] {
        let mut dofs = [0; 24];
        for (a, &p) in self.cells[cell].iter().enumerate() {
            for c in 0..DOFS_PER_NODE {
                dofs[a * DOFS_PER_NODE + c] = p * DOFS_PER_NODE + c;
            }
        }
        dofs
    }
}
