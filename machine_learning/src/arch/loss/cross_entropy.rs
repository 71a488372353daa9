use ndarray::{Array2, Array3, ArrayView2, Axis};
use rand::{
    Rng,
    distr::{Distribution, StandardUniform},
};

use super::LossFn;

/// Row-wise softmax of a batch of logits.
pub fn softmax(logits: ArrayView2<f32>) -> Array2<f32> {
    let mut p = logits.to_owned();

    for mut row in p.rows_mut() {
        let max = row.fold(f32::NEG_INFINITY, |acc, &z| acc.max(z));
        row.mapv_inplace(|z| (z - max).exp());
        let sum = row.sum();
        row /= sum;
    }

    p
}

/// Categorical cross-entropy over softmax logits, summed over the examples.
///
/// Targets are one-hot rows (or probability vectors summing to one). The Hessian w.r.t. the
/// logits of an example is `diag(p) - ppᵀ` where `p` is the softmax of its logits.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossEntropy;

impl CrossEntropy {
    /// Returns a new `CrossEntropy`.
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for CrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        y_pred
            .outer_iter()
            .zip(y.outer_iter())
            .map(|(f, t)| {
                let max = f.fold(f32::NEG_INFINITY, |acc, &z| acc.max(z));
                let lse = max + f.mapv(|z| (z - max).exp()).sum().ln();
                -f.iter().zip(t).map(|(z, t)| t * (z - lse)).sum::<f32>()
            })
            .sum()
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        softmax(y_pred) - &y
    }

    fn sqrt_hessian(&self, y_pred: ArrayView2<f32>) -> Array3<f32> {
        let p = softmax(y_pred);
        let (m, c) = p.dim();

        // S = diag(√p) - p √pᵀ
        Array3::from_shape_fn((m, c, c), |(n, i, k)| {
            let sqrt_pk = p[[n, k]].sqrt();
            let diag = if i == k { sqrt_pk } else { 0.0 };
            diag - p[[n, i]] * sqrt_pk
        })
    }

    fn sampled_sqrt_hessian<R>(&self, y_pred: ArrayView2<f32>, rng: &mut R) -> Array3<f32>
    where
        R: Rng + ?Sized,
    {
        let p = softmax(y_pred);
        let c = p.ncols();
        let mut s = p.clone().insert_axis(Axis(2));

        for (n, row) in p.outer_iter().enumerate() {
            let u: f32 = StandardUniform.sample(&mut *rng);
            let mut acc = 0.0;
            let sampled = row
                .iter()
                .position(|&pk| {
                    acc += pk;
                    u < acc
                })
                .unwrap_or(c - 1);

            s[[n, sampled, 0]] -= 1.0;
        }

        s
    }
}
