use log::warn;
use machine_learning::{
    MlErr,
    arch::{Sequential, loss::Loss},
    extensions::{Extended, Extension, Quantity},
};
use ndarray::{Array1, Array2, ArrayView2, Axis, concatenate};

use super::{CurvatureInterface, ggn::concat_diag};
use crate::{Kron, LaplaceErr, Likelihood, Result};

/// Empirical Fisher curvature, built from per-example gradients.
///
/// The diagonal sums the squared per-example gradients and the dense matrix is the Gram matrix
/// `GᵀG` of the stacked per-example gradients `G` (`M×P`). There is no Kronecker-factored
/// empirical Fisher.
pub struct EfCurvature<'m> {
    likelihood: Likelihood,
    ext: Extended<'m, Loss>,
}

impl<'m> EfCurvature<'m> {
    /// Creates a new `EfCurvature`, extending the model (or only its last layer) and the loss
    /// induced by the likelihood.
    pub fn new(
        model: &'m mut Sequential,
        params: &'m [f32],
        likelihood: Likelihood,
        last_layer: bool,
    ) -> Result<Self> {
        let ext = Extended::new(model, params, likelihood.loss_fn(), last_layer)?;

        Ok(Self { likelihood, ext })
    }

    fn extract(
        &mut self,
        x: ArrayView2<f32>,
        y: ArrayView2<f32>,
        ext: Extension,
    ) -> Result<(f32, Vec<Quantity>)> {
        let f = self.ext.forward(x)?;
        let loss = self.ext.loss(f.view(), y)?;
        let quantities = self.ext.backward(y, ext, &mut rand::rng())?;

        Ok((loss, quantities))
    }
}

impl CurvatureInterface for EfCurvature<'_> {
    fn likelihood(&self) -> Likelihood {
        self.likelihood
    }

    fn full(&mut self, x: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<(f32, Array2<f32>)> {
        let ext = Extension::BatchGrad;
        let (loss, quantities) = self.extract(x, y, ext)?;

        let grads = quantities
            .iter()
            .map(|q| match q {
                Quantity::PerExample(g) => Ok(g.view()),
                _ => Err(LaplaceErr::UnexpectedQuantity(ext.name())),
            })
            .collect::<Result<Vec<_>>>()?;
        let gs = concatenate(Axis(1), &grads).map_err(MlErr::from)?;

        let factor = self.likelihood.factor();
        Ok((factor * loss, gs.t().dot(&gs) * factor))
    }

    fn kron(&mut self, _x: ArrayView2<f32>, _y: ArrayView2<f32>, _n: usize) -> Result<(f32, Kron)> {
        warn!("kronecker-factored empirical Fisher requested");
        Err(LaplaceErr::Unimplemented("kronecker-factored empirical Fisher"))
    }

    fn diag(&mut self, x: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<(f32, Array1<f32>)> {
        let ext = Extension::SumGradSquared;
        let (loss, quantities) = self.extract(x, y, ext)?;
        let diag = concat_diag(quantities, ext)?;

        let factor = self.likelihood.factor();
        Ok((factor * loss, diag * factor))
    }
}
