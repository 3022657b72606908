//! Gauss-Legendre quadrature rules.

use crate::error::{Result, SolverError};

/// Integration points and weights on a reference element.
#[derive(Debug, Clone, PartialEq)]
pub struct GaussLegendre {
    /// Natural coordinates, one `[ξ, η, ζ]` per point
    pub points: Vec<[f64; 3]>,
    pub weights: Vec<f64>,
}

/// 1D abscissae and weights on `[-1, 1]`.
fn line(order: usize) -> Result<(Vec<f64>, Vec<f64>)> {
    Ok(match order {
        1 => (vec![0.0], vec![2.0]),
        2 => {
            let g = 1.0 / 3.0_f64.sqrt();
            (vec![-g, g], vec![1.0, 1.0])
        }
        3 => {
            let g = (3.0_f64 / 5.0).sqrt();
            (vec![-g, 0.0, g], vec![5.0 / 9.0, 8.0 / 9.0, 5.0 / 9.0])
        }
        _ => {
            return Err(SolverError::Config(format!(
                "Gauss-Legendre order {order} not supported (1, 2 or 3)"
            )))
        }
    })
}

impl GaussLegendre {
    /// Tensor-product rule on `[-1, 1]³` with `order` points per axis.
    pub fn hexahedron(order: usize) -> Result<Self> {
        let (x, w) = line(order)?;
        let mut points = Vec::with_capacity(order.pow(3));
        let mut weights = Vec::with_capacity(order.pow(3));
        for k in 0..order {
            for j in 0..order {
                for i in 0..order {
                    points.push([x[i], x[j], x[k]]);
                    weights.push(w[i] * w[j] * w[k]);
                }
            }
        }
        Ok(Self { points, weights })
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_sum_to_reference_volume() {
        for order in 1..=3 {
            let q = GaussLegendre::hexahedron(order).unwrap();
            assert_eq!(q.num_points(), order.pow(3));
            let total: f64 = q.weights.iter().sum();
            assert!((total - 8.0).abs() < 1e-12, "order {order}: {total}");
        }
    }

    #[test]
    fn integrates_cubic_exactly_with_two_points() {
        let q = GaussLegendre::hexahedron(2).unwrap();
        // ∫ ξ² η² over [-1,1]³ = (2/3)(2/3)(2)
        let value: f64 = q
            .points
            .iter()
            .zip(&q.weights)
            .map(|(p, w)| w * p[0] * p[0] * p[1] * p[1])
            .sum();
        assert!((value - 8.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_unknown_order() {
        assert!(GaussLegendre::hexahedron(4).is_err());
    }
}
