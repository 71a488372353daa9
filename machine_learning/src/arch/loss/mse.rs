use ndarray::{Array2, Array3, ArrayView2};
use rand::{Rng, distr::Distribution};
use rand_distr::StandardNormal;
use std::f32::consts::SQRT_2;

use super::LossFn;

/// Squared error loss summed over every example and output dimension: `ℓ = Σ (f - y)²`.
///
/// The Hessian w.r.t. the output is `2I` for every example.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mse;

impl Mse {
    /// Returns a new `Mse`.
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for Mse {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        (&y_pred - &y).mapv(|x| x.powi(2)).sum()
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        (&y_pred - &y) * 2.0
    }

    fn sqrt_hessian(&self, y_pred: ArrayView2<f32>) -> Array3<f32> {
        let (m, c) = y_pred.dim();
        let mut s = Array3::zeros((m, c, c));

        for mut sm in s.outer_iter_mut() {
            sm.diag_mut().fill(SQRT_2);
        }

        s
    }

    fn sampled_sqrt_hessian<R>(&self, y_pred: ArrayView2<f32>, rng: &mut R) -> Array3<f32>
    where
        R: Rng + ?Sized,
    {
        let (m, c) = y_pred.dim();
        Array3::from_shape_simple_fn((m, c, 1), || {
            let eps: f32 = StandardNormal.sample(&mut *rng);
            SQRT_2 * eps
        })
    }
}
