//! Curvature of the loss surface w.r.t. the parameters of a model.
//!
//! Two families implement [`CurvatureInterface`]: the generalized Gauss-Newton matrix
//! ([`GgnCurvature`]) and the empirical Fisher matrix ([`EfCurvature`]). Every operation runs
//! one forward and one backward pass over a batch and returns the loss and the curvature, both
//! scaled by the likelihood's factor.
//!
//! | Operation | GGN exact | GGN stochastic | EF |
//! |---|---|---|---|
//! | `full` | yes | unsupported | yes |
//! | `kron` | yes | yes | unimplemented |
//! | `diag` | yes | yes | yes |

mod ef;
mod ggn;

pub use ef::EfCurvature;
pub use ggn::GgnCurvature;

use machine_learning::{
    MlErr,
    arch::loss::{LossFn, softmax},
};
use ndarray::{Array1, Array2, ArrayView2, ArrayView3, linalg};

use crate::{Kron, Likelihood, Result};

/// The operations every curvature family exposes.
///
/// Each takes a batch of inputs `x` (one example per row) and targets `y`, and returns the
/// scaled loss of the batch along with the scaled curvature. Unsupported combinations fail
/// before any pass through the model is made.
pub trait CurvatureInterface {
    /// Returns the likelihood the interface was built for.
    fn likelihood(&self) -> Likelihood;

    /// Computes the dense `P×P` curvature matrix.
    fn full(&mut self, x: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<(f32, Array2<f32>)>;

    /// Computes the Kronecker-factored curvature, rescaled for a dataset of `n` examples.
    fn kron(&mut self, x: ArrayView2<f32>, y: ArrayView2<f32>, n: usize) -> Result<(f32, Kron)>;

    /// Computes the diagonal of the curvature matrix.
    fn diag(&mut self, x: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<(f32, Array1<f32>)>;
}

/// Assembles the generalized Gauss-Newton matrix from per-example Jacobians.
///
/// For regression the Hessian of the loss w.r.t. the outputs is taken to be the identity, so
/// `H = Σ_m J_mᵀ J_m`. For classification it is `diag(p) - ppᵀ` with `p` the softmax of the
/// outputs, so `H = Σ_m J_mᵀ (diag(p_m) - p_m p_mᵀ) J_m`.
///
/// # Arguments
/// * `likelihood` - The likelihood of the model.
/// * `js` - The Jacobians of the outputs w.r.t. the parameters, of shape `M×C×P`.
/// * `f` - The model outputs, of shape `M×C`.
/// * `y` - The targets.
///
/// # Returns
/// The loss scaled by the likelihood's factor and the unscaled matrix.
pub fn full_ggn(
    likelihood: Likelihood,
    js: ArrayView3<f32>,
    f: ArrayView2<f32>,
    y: ArrayView2<f32>,
) -> (f32, Array2<f32>) {
    let loss = likelihood.factor() * likelihood.loss_fn().loss(f, y);
    let p = js.dim().2;
    let mut h = Array2::zeros((p, p));

    match likelihood {
        Likelihood::Regression => {
            for jm in js.outer_iter() {
                linalg::general_mat_mul(1.0, &jm.t(), &jm, 1.0, &mut h);
            }
        }
        Likelihood::Classification => {
            let ps = softmax(f);
            for (jm, pm) in js.outer_iter().zip(ps.outer_iter()) {
                let mut h_lik = Array2::from_diag(&pm);
                for ((c, k), v) in h_lik.indexed_iter_mut() {
                    *v -= pm[c] * pm[k];
                }

                let hj = h_lik.dot(&jm);
                linalg::general_mat_mul(1.0, &jm.t(), &hj, 1.0, &mut h);
            }
        }
    }

    (loss, h)
}

fn check_targets(f: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<()> {
    if f.dim() != y.dim() {
        return Err(MlErr::SizeMismatch {
            what: "targets",
            got: y.len(),
            expected: f.len(),
        }
        .into());
    }

    Ok(())
}
