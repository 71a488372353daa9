use log::warn;
use machine_learning::{
    arch::{Sequential, loss::Loss},
    extensions::{Extended, Extension, Quantity, jacobians, last_layer_jacobians},
};
use ndarray::{Array1, Array2, ArrayView2};
use rand::{SeedableRng, rngs::StdRng};

use super::{CurvatureInterface, check_targets, full_ggn};
use crate::{Kron, LaplaceErr, Likelihood, Result};

/// Generalized Gauss-Newton curvature.
///
/// The diagonal and Kronecker-factored approximations come from the differentiation engine,
/// either exactly or from a one-sample Monte-Carlo estimate of the output Hessian when
/// `stochastic` is set. The dense matrix is assembled from per-example Jacobians and has no
/// stochastic counterpart.
///
/// For regression, `diag` and `kron` use the Hessian of the summed squared error (`2I`) while
/// `full` takes the output Hessian to be the identity; both are then scaled by `0.5`.
pub struct GgnCurvature<'m> {
    likelihood: Likelihood,
    ext: Extended<'m, Loss>,
    last_layer: bool,
    stochastic: bool,
    rng: StdRng,
}

impl<'m> GgnCurvature<'m> {
    /// Creates a new `GgnCurvature`, extending the model (or only its last layer) and the loss
    /// induced by the likelihood.
    ///
    /// # Arguments
    /// * `model` - The architecture of the fitted model, held for the lifetime of the interface.
    /// * `params` - The fitted parameters.
    /// * `likelihood` - The likelihood the model was fitted under.
    /// * `last_layer` - Whether to restrict the curvature to the last layer's parameters.
    /// * `stochastic` - Whether to use Monte-Carlo estimates instead of exact quantities.
    pub fn new(
        model: &'m mut Sequential,
        params: &'m [f32],
        likelihood: Likelihood,
        last_layer: bool,
        stochastic: bool,
    ) -> Result<Self> {
        let ext = Extended::new(model, params, likelihood.loss_fn(), last_layer)?;

        Ok(Self {
            likelihood,
            ext,
            last_layer,
            stochastic,
            rng: StdRng::from_os_rng(),
        })
    }

    /// Replaces the source of the Monte-Carlo samples.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Rescales minibatch Kronecker factors so that summing them over the batches of a dataset
    /// of `n` examples approximates the dataset-level factors: the second factor of every pair
    /// is multiplied by `m / n`. Single factors are left untouched. For `m == n` this is a
    /// no-op.
    pub fn rescale_kron_factors(kron: &mut Kron, m: usize, n: usize) {
        let ratio = m as f32 / n as f32;

        for fs in kron.kfacs_mut() {
            if let [_, second] = fs.as_mut_slice() {
                *second *= ratio;
            }
        }
    }

    fn extract(
        &mut self,
        x: ArrayView2<f32>,
        y: ArrayView2<f32>,
        ext: Extension,
    ) -> Result<(f32, Vec<Quantity>)> {
        let f = self.ext.forward(x)?;
        let loss = self.ext.loss(f.view(), y)?;
        let quantities = self.ext.backward(y, ext, &mut self.rng)?;

        Ok((loss, quantities))
    }
}

impl CurvatureInterface for GgnCurvature<'_> {
    fn likelihood(&self) -> Likelihood {
        self.likelihood
    }

    fn full(&mut self, x: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<(f32, Array2<f32>)> {
        if self.stochastic {
            warn!("full GGN requested on a stochastic interface");
            return Err(LaplaceErr::Unsupported(
                "stochastic approximation of the full GGN",
            ));
        }

        let params = self.ext.params();
        let (js, f) = if self.last_layer {
            last_layer_jacobians(self.ext.model_mut(), params, x)?
        } else {
            jacobians(self.ext.model_mut(), params, x)?
        };

        check_targets(f.view(), y)?;
        let (loss, h) = full_ggn(self.likelihood, js.view(), f.view(), y);
        Ok((loss, h * self.likelihood.factor()))
    }

    fn kron(&mut self, x: ArrayView2<f32>, y: ArrayView2<f32>, n: usize) -> Result<(f32, Kron)> {
        if n == 0 {
            return Err(LaplaceErr::InvalidSpec(
                "the dataset size must be positive".to_string(),
            ));
        }

        let ext = if self.stochastic {
            Extension::Kfac
        } else {
            Extension::Kflr
        };

        let (loss, quantities) = self.extract(x, y, ext)?;
        let kfacs = quantities
            .into_iter()
            .map(|q| match q {
                Quantity::Kron(fs) => Ok(fs),
                _ => Err(LaplaceErr::UnexpectedQuantity(ext.name())),
            })
            .collect::<Result<Vec<_>>>()?;

        let mut kron = Kron::new(kfacs);
        Self::rescale_kron_factors(&mut kron, y.nrows(), n);

        let factor = self.likelihood.factor();
        Ok((factor * loss, kron * factor))
    }

    fn diag(&mut self, x: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<(f32, Array1<f32>)> {
        let ext = if self.stochastic {
            Extension::DiagGgnMc
        } else {
            Extension::DiagGgnExact
        };

        let (loss, quantities) = self.extract(x, y, ext)?;
        let diag = concat_diag(quantities, ext)?;

        let factor = self.likelihood.factor();
        Ok((factor * loss, diag * factor))
    }
}

/// Concatenates per-parameter diagonals, in parameter order.
pub(super) fn concat_diag(quantities: Vec<Quantity>, ext: Extension) -> Result<Array1<f32>> {
    let mut out = Vec::new();

    for q in quantities {
        match q {
            Quantity::Diag(d) => out.extend(d.iter().copied()),
            _ => return Err(LaplaceErr::UnexpectedQuantity(ext.name())),
        }
    }

    Ok(Array1::from(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn rescaling_only_touches_second_factors() {
        let mut kron = Kron::new(vec![
            vec![array![[1.0]], array![[2.0, 0.0], [0.0, 4.0]]],
            vec![array![[3.0]]],
        ]);
        GgnCurvature::rescale_kron_factors(&mut kron, 25, 100);

        assert_eq!(kron.kfacs()[0][0], array![[1.0]]);
        assert_eq!(kron.kfacs()[0][1], array![[0.5, 0.0], [0.0, 1.0]]);
        assert_eq!(kron.kfacs()[1][0], array![[3.0]]);
    }

    #[test]
    fn full_batch_rescaling_is_a_no_op() {
        let original = Kron::new(vec![vec![array![[1.5]], array![[2.5]]]]);
        let mut kron = original.clone();
        GgnCurvature::rescale_kron_factors(&mut kron, 10, 10);

        assert_eq!(kron, original);
    }
}
