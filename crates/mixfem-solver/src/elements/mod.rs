//! Reference finite elements.

pub mod hexahedron;

pub use hexahedron::Hexahedron;

/// Shape functions of a reference element.
pub trait Element: Send + Sync {
    /// Number of nodes
    fn num_nodes(&self) -> usize;

    /// Spatial dimension of the reference coordinates
    fn dim(&self) -> usize;

    /// Shape-function values `N_a(ξ)`.
    fn shape_functions(&self, xi: &[f64]) -> Vec<f64>;

    /// Shape-function gradients `∂N_a/∂ξ_i`, node-major (`[num_nodes, dim]`).
    fn shape_gradients(&self, xi: &[f64]) -> Vec<f64>;
}
