use log::debug;
use ndarray::{Array2, ArrayView2, Axis};
use rand::Rng;

use super::{Extension, Quantity, quantities};
use crate::{
    MlErr, Result,
    arch::{Model, ParamInfo, Sequential, loss::LossFn},
};

/// A model and its loss, prepared for extracting second-order quantities.
///
/// Building an `Extended` registers the model once: it holds the exclusive borrow of the
/// architecture (whose layers cache the forward pass) for as long as it lives, so a model cannot
/// be extended twice at the same time. The parameters are only read.
pub struct Extended<'m, L> {
    model: &'m mut Sequential,
    params: &'m [f32],
    loss_fn: L,
    depth: usize,
    output: Option<Array2<f32>>,
}

impl<'m, L: LossFn> Extended<'m, L> {
    /// Extends a model and its loss.
    ///
    /// # Arguments
    /// * `model` - The architecture of the model.
    /// * `params` - The model's parameters.
    /// * `loss_fn` - The loss the backward passes start from.
    /// * `last_layer` - Whether only the last layer's parameters are extended.
    ///
    /// # Returns
    /// A new `Extended` or an error if the parameters don't fit the model.
    pub fn new(
        model: &'m mut Sequential,
        params: &'m [f32],
        loss_fn: L,
        last_layer: bool,
    ) -> Result<Self> {
        let nlayers = model.layers().len();
        if nlayers == 0 {
            return Err(MlErr::EmptyModel);
        }

        if params.len() != model.size() {
            return Err(MlErr::SizeMismatch {
                what: "parameters",
                got: params.len(),
                expected: model.size(),
            });
        }

        let depth = if last_layer { 1 } else { nlayers };
        debug!(params = params.len(), layers = depth; "extended model");

        Ok(Self {
            model,
            params,
            loss_fn,
            depth,
            output: None,
        })
    }

    pub fn model_mut(&mut self) -> &mut Sequential {
        &mut *self.model
    }

    pub fn params(&self) -> &'m [f32] {
        self.params
    }

    /// Returns the extended parameter tensors, in order.
    pub fn parameters(&self) -> Vec<ParamInfo> {
        let first = self.model.layers().len() - self.depth;
        self.model
            .parameters()
            .into_iter()
            .filter(|info| info.layer >= first)
            .collect()
    }

    /// Returns the amount of extended scalar parameters.
    pub fn num_params(&self) -> usize {
        self.parameters().iter().map(ParamInfo::len).sum()
    }

    /// Makes a forward pass and keeps its output for the next backward pass.
    pub fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let f = self.model.forward(self.params, x)?;
        self.output = Some(f.clone());
        Ok(f)
    }

    /// Evaluates the (unscaled) loss of an output batch.
    pub fn loss(&self, f: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<f32> {
        check_targets(f, y)?;
        Ok(self.loss_fn.loss(f, y))
    }

    /// Runs a backward pass from the loss of the last forward pass.
    ///
    /// The output of the forward pass is consumed, so every backward pass needs its own forward
    /// pass.
    ///
    /// # Arguments
    /// * `y` - The targets of the batch.
    /// * `extension` - What to extract for every extended parameter tensor.
    /// * `rng` - The source of the Monte-Carlo samples.
    ///
    /// # Returns
    /// One quantity per extended parameter tensor, in order.
    pub fn backward<R>(
        &mut self,
        y: ArrayView2<f32>,
        extension: Extension,
        rng: &mut R,
    ) -> Result<Vec<Quantity>>
    where
        R: Rng + ?Sized,
    {
        let f = self.output.take().ok_or(MlErr::NotForwarded)?;
        check_targets(f.view(), y)?;

        debug!(
            extension = extension.name(),
            batch = f.nrows();
            "running backward pass"
        );

        let s = match extension {
            Extension::DiagGgnExact | Extension::Kflr => self.loss_fn.sqrt_hessian(f.view()),
            Extension::DiagGgnMc | Extension::Kfac => {
                self.loss_fn.sampled_sqrt_hessian(f.view(), rng)
            }
            Extension::SumGradSquared | Extension::BatchGrad => {
                self.loss_fn.loss_prime(f.view(), y).insert_axis(Axis(2))
            }
        };

        let signals = self.model.backward(self.params, s, self.depth)?;
        let mut out = Vec::with_capacity(2 * signals.len());

        for signal in signals {
            let x = self.model.layers()[signal.layer].input()?;
            let s = signal.signal.view();

            out.extend(match extension {
                Extension::DiagGgnExact
                | Extension::DiagGgnMc
                | Extension::SumGradSquared => quantities::diag(x, s),
                Extension::Kflr | Extension::Kfac => quantities::kron(x, s),
                Extension::BatchGrad => quantities::per_example(x, s),
            });
        }

        Ok(out)
    }
}

fn check_targets(f: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<()> {
    if f.nrows() != y.nrows() {
        return Err(MlErr::SizeMismatch {
            what: "target examples",
            got: y.nrows(),
            expected: f.nrows(),
        });
    }

    if f.ncols() != y.ncols() {
        return Err(MlErr::SizeMismatch {
            what: "target outputs",
            got: y.ncols(),
            expected: f.ncols(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{activations::ActFn, layers::Layer, loss::Loss};
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    fn mlp() -> Sequential {
        Sequential::new([
            Layer::dense((2, 3), Some(ActFn::sigmoid(1.0))),
            Layer::dense((3, 2), None),
        ])
    }

    #[test]
    fn backward_without_forward_fails() {
        let mut model = mlp();
        let params = model.init_params(&mut StdRng::seed_from_u64(0));
        let mut ext = Extended::new(&mut model, &params, Loss::mse(), false).unwrap();
        let y = array![[0.0, 0.0]];

        let res = ext.backward(y.view(), Extension::DiagGgnExact, &mut StdRng::seed_from_u64(0));
        assert!(matches!(res, Err(MlErr::NotForwarded)));
    }

    #[test]
    fn last_layer_extends_only_the_last_layer() {
        let mut model = mlp();
        let params = model.init_params(&mut StdRng::seed_from_u64(0));
        let mut ext = Extended::new(&mut model, &params, Loss::cross_entropy(), true).unwrap();
        let x = array![[0.1, 0.2], [0.3, -0.4]];
        let y = array![[1.0, 0.0], [0.0, 1.0]];

        assert_eq!(ext.num_params(), 8);
        ext.forward(x.view()).unwrap();
        let quantities = ext
            .backward(y.view(), Extension::Kflr, &mut StdRng::seed_from_u64(0))
            .unwrap();

        assert_eq!(quantities.len(), 2);
        let Quantity::Kron(w) = &quantities[0] else {
            panic!("expected kronecker factors");
        };
        assert_eq!(w[0].dim(), (3, 3));
        assert_eq!(w[1].dim(), (2, 2));
    }

    #[test]
    fn batch_grad_sums_to_the_loss_gradient() {
        let mut model = mlp();
        let params = model.init_params(&mut StdRng::seed_from_u64(5));
        let x = array![[0.5, -1.0], [1.5, 0.25], [-0.3, 0.8]];
        let y = array![[0.2, 0.1], [-0.4, 1.0], [0.0, 0.3]];
        let mut ext = Extended::new(&mut model, &params, Loss::mse(), false).unwrap();
        ext.forward(x.view()).unwrap();
        let grads = ext
            .backward(y.view(), Extension::BatchGrad, &mut StdRng::seed_from_u64(0))
            .unwrap();

        let mut total = Vec::new();
        for q in &grads {
            let Quantity::PerExample(g) = q else {
                panic!("expected per-example gradients");
            };
            total.extend(g.sum_axis(Axis(0)).iter().copied());
        }

        let h = 1e-2;
        for p in [0, 4, 7, 9, 12, 14] {
            let mut pp = params.clone();
            let mut pm = params.clone();
            pp[p] += h;
            pm[p] -= h;
            let lp = Loss::mse().loss(model_forward(&pp, x.view()).view(), y.view());
            let lm = Loss::mse().loss(model_forward(&pm, x.view()).view(), y.view());

            assert_abs_diff_eq!(total[p], (lp - lm) / (2. * h), epsilon = 1e-2);
        }
    }

    fn model_forward(params: &[f32], x: ArrayView2<f32>) -> Array2<f32> {
        mlp().forward(params, x).unwrap()
    }
}
