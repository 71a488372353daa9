use ndarray::{Array2, ArrayView2};

use crate::Result;

/// A parameterized function whose parameters live outside of it, in a flat slice.
pub trait Model {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Makes a forward pass through the model.
    ///
    /// # Arguments
    /// * `params` - The model's parameters, read but never modified.
    /// * `x` - A batch of inputs, one example per row.
    ///
    /// # Returns
    /// The model outputs, one row per example, or an error if occurred.
    fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>>;
}
