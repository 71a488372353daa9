use ndarray::{Array2, Array3, ArrayView2};
use rand::Rng;

use super::{CrossEntropy, Mse};

/// A loss function summed over the examples of a batch.
///
/// Besides the value and the gradient w.r.t. the model output, a loss exposes a symmetric
/// factorization of its Hessian w.r.t. the output. For an output batch of shape `M×C` the
/// factor `S` has shape `M×C×K` and satisfies `S_m S_mᵀ = ∂²ℓ_m/∂f_m²` for every example `m`.
pub trait LossFn {
    /// Returns the summed loss of the batch.
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32;

    /// Returns the per-example gradient of the loss w.r.t. `y_pred`.
    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32>;

    /// Returns the exact factorization of the output Hessian, with `K = C`.
    fn sqrt_hessian(&self, y_pred: ArrayView2<f32>) -> Array3<f32>;

    /// Returns a one-sample Monte-Carlo factorization of the output Hessian, with `K = 1`.
    ///
    /// Only the expectation `E[S_m S_mᵀ]` equals the output Hessian.
    fn sampled_sqrt_hessian<R>(&self, y_pred: ArrayView2<f32>, rng: &mut R) -> Array3<f32>
    where
        R: Rng + ?Sized;
}

/// The losses a model can be extended with.
#[derive(Debug, Clone, Copy)]
pub enum Loss {
    Mse(Mse),
    CrossEntropy(CrossEntropy),
}

impl Loss {
    pub fn mse() -> Self {
        Self::Mse(Mse::new())
    }

    pub fn cross_entropy() -> Self {
        Self::CrossEntropy(CrossEntropy::new())
    }
}

impl LossFn for Loss {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        match self {
            Self::Mse(l) => l.loss(y_pred, y),
            Self::CrossEntropy(l) => l.loss(y_pred, y),
        }
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        match self {
            Self::Mse(l) => l.loss_prime(y_pred, y),
            Self::CrossEntropy(l) => l.loss_prime(y_pred, y),
        }
    }

    fn sqrt_hessian(&self, y_pred: ArrayView2<f32>) -> Array3<f32> {
        match self {
            Self::Mse(l) => l.sqrt_hessian(y_pred),
            Self::CrossEntropy(l) => l.sqrt_hessian(y_pred),
        }
    }

    fn sampled_sqrt_hessian<R>(&self, y_pred: ArrayView2<f32>, rng: &mut R) -> Array3<f32>
    where
        R: Rng + ?Sized,
    {
        match self {
            Self::Mse(l) => l.sampled_sqrt_hessian(y_pred, rng),
            Self::CrossEntropy(l) => l.sampled_sqrt_hessian(y_pred, rng),
        }
    }
}
