//! 8-node trilinear hexahedron.

use super::Element;

/// Natural coordinates of the corner nodes.
///
/// Node ordering:
/// ```text
///        7----------6
///       /|         /|
///      / |        / |
///     4----------5  |
///     |  3-------|--2
///     | /        | /
///     |/         |/
///     0----------1
/// ```
/// Bottom face (ζ = -1) counter-clockwise, then the top face (ζ = +1).
const CORNERS: [[f64; 3]; 8] = [
    [-1.0, -1.0, -1.0],
    [1.0, -1.0, -1.0],
    [1.0, 1.0, -1.0],
    [-1.0, 1.0, -1.0],
    [-1.0, -1.0, 1.0],
    [1.0, -1.0, 1.0],
    [1.0, 1.0, 1.0],
    [-1.0, 1.0, 1.0],
];

/// Trilinear hexahedron on `[-1, 1]³`:
/// `N_a = (1 + ξξ_a)(1 + ηη_a)(1 + ζζ_a) / 8`
#[derive(Debug, Clone, Copy, Default)]
pub struct Hexahedron;

impl Element for Hexahedron {
    fn num_nodes(&self) -> usize {
        8
    }

    fn dim(&self) -> usize {
        3
    }

    fn shape_functions(&self, xi: &[f64]) -> Vec<f64> {
        CORNERS
            .iter()
            .map(|c| {
                (1.0 + xi[0] * c[0]) * (1.0 + xi[1] * c[1]) * (1.0 + xi[2] * c[2]) / 8.0
            })
            .collect()
    }

    fn shape_gradients(&self, xi: &[f64]) -> Vec<f64> {
        let mut out = Vec::with_capacity(24);
        for c in &CORNERS {
            let (a, b, d) = (1.0 + xi[0] * c[0], 1.0 + xi[1] * c[1], 1.0 + xi[2] * c[2]);
            out.push(c[0] * b * d / 8.0);
            out.push(a * c[1] * d / 8.0);
            out.push(a * b * c[2] / 8.0);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_of_unity() {
        let hex = Hexahedron;
        let xi = [0.3, -0.2, 0.7];
        let n = hex.shape_functions(&xi);
        assert!((n.iter().sum::<f64>() - 1.0).abs() < 1e-14);
        let dn = hex.shape_gradients(&xi);
        for i in 0..3 {
            let s: f64 = (0..8).map(|a| dn[a * 3 + i]).sum();
            assert!(s.abs() < 1e-14, "gradients along axis {i} sum to {s}");
        }
    }

    #[test]
    fn kronecker_property_at_corners() {
        let hex = Hexahedron;
        for (a, corner) in CORNERS.iter().enumerate() {
            let n = hex.shape_functions(corner);
            for (b, value) in n.iter().enumerate() {
                let expected = if a == b { 1.0 } else { 0.0 };
                assert!((value - expected).abs() < 1e-14);
            }
        }
    }
}
