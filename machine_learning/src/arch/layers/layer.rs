use ndarray::{Array2, Array3, ArrayView2, ArrayView3};

use super::Dense;
use crate::{Result, arch::activations::ActFn};

/// A layer of a `Sequential` model.
#[derive(Debug, Clone)]
pub enum Layer {
    Dense(Dense),
}

impl Layer {
    pub fn dense(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self::Dense(Dense::new(dim, act_fn))
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Dense(l) => l.size(),
        }
    }

    /// Returns the shapes of the parameter tensors of this layer, in storage order.
    pub fn param_shapes(&self) -> Vec<Vec<usize>> {
        match self {
            Self::Dense(l) => {
                let (i, o) = l.dim();
                vec![vec![i, o], vec![o]]
            }
        }
    }

    pub fn output_dim(&self) -> usize {
        match self {
            Self::Dense(l) => l.dim().1,
        }
    }

    pub fn input(&self) -> Result<ArrayView2<'_, f32>> {
        match self {
            Self::Dense(l) => l.input(),
        }
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        match self {
            Self::Dense(l) => l.forward(params, x),
        }
    }

    pub fn backward_activation(&self, s: Array3<f32>) -> Result<Array3<f32>> {
        match self {
            Self::Dense(l) => l.backward_activation(s),
        }
    }

    pub fn backward_input(&self, params: &[f32], s_z: ArrayView3<f32>) -> Result<Array3<f32>> {
        match self {
            Self::Dense(l) => l.backward_input(params, s_z),
        }
    }
}
