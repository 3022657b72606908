//! Dirichlet boundary conditions and the prescribed/free dof partition.

use crate::error::{Result, SolverError};
use crate::mesh::{DOFS_PER_NODE, Mesh};

/// Absolute tolerance of the plane predicates.
const PLANE_TOLERANCE: f64 = 1e-8;

/// Prescribed displacement on a set of nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    pub name: String,
    /// Mesh point indices
    pub nodes: Vec<usize>,
    /// Which displacement components (x, y, z) are prescribed
    pub mask: [bool; 3],
    /// Prescribed value of every masked component
    pub value: f64,
}

impl Boundary {
    /// Nodes selected by a predicate on their coordinates.
    pub fn new(
        name: impl Into<String>,
        mesh: &Mesh,
        mask: [bool; 3],
        value: f64,
        predicate: impl Fn(&[f64; 3]) -> bool,
    ) -> Self {
        let nodes = mesh
            .points
            .iter()
            .enumerate()
            .filter(|(_, x)| predicate(x))
            .map(|(p, _)| p)
            .collect();
        Self {
            name: name.into(),
            nodes,
            mask,
            value,
        }
    }

    /// Nodes on the plane `X[axis] == at`.
    pub fn plane(
        name: impl Into<String>,
        mesh: &Mesh,
        axis: usize,
        at: f64,
        mask: [bool; 3],
        value: f64,
    ) -> Self {
        Self::new(name, mesh, mask, value, |x| {
            (x[axis] - at).abs() < PLANE_TOLERANCE
        })
    }

    /// Zero normal displacement on the plane `X[axis] == at`.
    pub fn symmetry(name: impl Into<String>, mesh: &Mesh, axis: usize, at: f64) -> Self {
        let mut mask = [false; 3];
        mask[axis] = true;
        Self::plane(name, mesh, axis, at, mask, 0.0)
    }

    /// Global dofs touched by this boundary.
    pub fn dofs(&self) -> impl Iterator<Item = usize> + '_ {
        self.nodes.iter().flat_map(move |&p| {
            (0..DOFS_PER_NODE)
                .filter(move |&c| self.mask[c])
                .map(move |c| p * DOFS_PER_NODE + c)
        })
    }
}

/// Sorted, disjoint prescribed (D) and free (I) dof sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DofPartition {
    pub prescribed: Vec<usize>,
    pub free: Vec<usize>,
}

impl DofPartition {
    pub fn num_dofs(&self) -> usize {
        self.prescribed.len() + self.free.len()
    }
}

/// Ordered collection of boundaries; later entries win on shared dofs.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BoundaryConditions {
    pub boundaries: Vec<Boundary>,
}

impl BoundaryConditions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, boundary: Boundary) {
        self.boundaries.push(boundary);
    }

    pub fn with(mut self, boundary: Boundary) -> Self {
        self.add(boundary);
        self
    }

    /// Symmetry planes `X = 0`, `Y = 0` and `Z = 0`.
    pub fn symmetry_planes(mesh: &Mesh) -> Self {
        Self::new()
            .with(Boundary::symmetry("sym-x", mesh, 0, 0.0))
            .with(Boundary::symmetry("sym-y", mesh, 1, 0.0))
            .with(Boundary::symmetry("sym-z", mesh, 2, 0.0))
    }

    /// Prescribed value per dof (`None` for free dofs).
    fn values(&self, num_dofs: usize) -> Result<Vec<Option<f64>>> {
        let mut values = vec![None; num_dofs];
        for b in &self.boundaries {
            for dof in b.dofs() {
                let slot = values.get_mut(dof).ok_or_else(|| {
                    SolverError::Boundary(format!(
                        "boundary '{}' addresses dof {dof} of {num_dofs}",
                        b.name
                    ))
                })?;
                *slot = Some(b.value);
            }
        }
        Ok(values)
    }

    /// Split `0..num_dofs` into prescribed and free dofs.
    pub fn partition(&self, num_dofs: usize) -> Result<DofPartition> {
        let values = self.values(num_dofs)?;
        let (prescribed, free) = (0..num_dofs).partition(|&d| values[d].is_some());
        Ok(DofPartition { prescribed, free })
    }

    /// Prescribed values as a full-length vector (zero on free dofs).
    pub fn targets(&self, num_dofs: usize) -> Result<Vec<f64>> {
        Ok(self
            .values(num_dofs)?
            .into_iter()
            .map(|v| v.unwrap_or(0.0))
            .collect())
    }

    /// Increment that moves the prescribed dofs of `u` onto their targets;
    /// zero on free dofs.
    pub fn prescribed_increments(&self, u: &[f64]) -> Result<Vec<f64>> {
        Ok(self
            .values(u.len())?
            .into_iter()
            .zip(u)
            .map(|(v, ui)| v.map_or(0.0, |v| v - ui))
            .collect())
    }

    /// Copy with every prescribed value multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            boundaries: self
                .boundaries
                .iter()
                .map(|b| Boundary {
                    value: b.value * factor,
                    ..b.clone()
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh() -> Mesh {
        Mesh::cube([0.0; 3], [1.0; 3], [3, 3, 3]).unwrap()
    }

    fn compression(mesh: &Mesh) -> BoundaryConditions {
        BoundaryConditions::symmetry_planes(mesh).with(Boundary::plane(
            "move",
            mesh,
            2,
            1.0,
            [false, false, true],
            -0.1,
        ))
    }

    #[test]
    fn partition_covers_all_dofs() {
        let mesh = mesh();
        let bcs = compression(&mesh);
        let part = bcs.partition(mesh.num_dofs()).unwrap();
        assert_eq!(part.num_dofs(), mesh.num_dofs());
        // 9 nodes on each of the four planes, one component each
        assert_eq!(part.prescribed.len(), 36);
        assert!(part.prescribed.windows(2).all(|w| w[0] < w[1]));
        assert!(part.free.iter().all(|d| !part.prescribed.contains(d)));
    }

    #[test]
    fn targets_and_increments() {
        let mesh = mesh();
        let bcs = compression(&mesh);
        let n = mesh.num_dofs();
        let targets = bcs.targets(n).unwrap();
        let top = mesh.points.iter().position(|x| x[2] == 1.0).unwrap();
        assert_eq!(targets[top * 3 + 2], -0.1);

        let mut u = vec![0.0; n];
        u[top * 3 + 2] = -0.04;
        u[top * 3] = 0.3;
        let du = bcs.prescribed_increments(&u).unwrap();
        assert!((du[top * 3 + 2] + 0.06).abs() < 1e-15);
        assert_eq!(du[top * 3], 0.0);
    }

    #[test]
    fn later_boundaries_win() {
        let mesh = mesh();
        let bcs = BoundaryConditions::new()
            .with(Boundary::plane("a", &mesh, 2, 1.0, [false, false, true], 1.0))
            .with(Boundary::plane("b", &mesh, 0, 1.0, [true, true, true], 2.0));
        let targets = bcs.targets(mesh.num_dofs()).unwrap();
        let corner = mesh.points.iter().position(|x| *x == [1.0, 1.0, 1.0]).unwrap();
        assert_eq!(targets[corner * 3 + 2], 2.0);
    }

    #[test]
    fn scaled_boundaries() {
        let mesh = mesh();
        let half = compression(&mesh).scaled(0.5);
        let top = mesh.points.iter().position(|x| x[2] == 1.0).unwrap();
        assert_eq!(half.targets(mesh.num_dofs()).unwrap()[top * 3 + 2], -0.05);
    }

    #[test]
    fn out_of_range_nodes_are_rejected() {
        let bcs = BoundaryConditions::new().with(Boundary {
            name: "bad".into(),
            nodes: vec![1000],
            mask: [true; 3],
            value: 0.0,
        });
        assert!(matches!(bcs.partition(30), Err(SolverError::Boundary(_))));
    }
}
