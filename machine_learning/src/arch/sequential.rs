use ndarray::{Array2, Array3, ArrayView2};
use ndarray_rand::{RandomExt, rand_distr::StandardNormal};
use rand::Rng;
use std::{iter, ops::Range};

use super::{Model, layers::Layer};
use crate::{MlErr, Result};

/// The kind of a parameter tensor within its layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Weight,
    Bias,
}

/// Where a parameter tensor lives in the flat parameter slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamInfo {
    pub layer: usize,
    pub kind: ParamKind,
    pub shape: Vec<usize>,
    pub range: Range<usize>,
}

impl ParamInfo {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// A signal w.r.t. the pre-activations of a layer, of shape `M×out×K`.
#[derive(Debug)]
pub struct LayerSignal {
    pub layer: usize,
    pub signal: Array3<f32>,
}

/// A sequential model: information flows forward when computing an output and backward when
/// pushing signals from the output to the layers.
#[derive(Debug, Clone)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn output_dim(&self) -> Option<usize> {
        self.layers.last().map(Layer::output_dim)
    }

    /// Returns the range each layer occupies in the flat parameter slice.
    pub fn layer_ranges(&self) -> Vec<Range<usize>> {
        let mut start = 0;
        self.layers
            .iter()
            .map(|layer| {
                let range = start..start + layer.size();
                start = range.end;
                range
            })
            .collect()
    }

    /// Enumerates the parameter tensors of the model in a fixed order: layer by layer, weights
    /// before biases.
    pub fn parameters(&self) -> Vec<ParamInfo> {
        let mut params = Vec::with_capacity(2 * self.layers.len());
        let mut start = 0;

        for (layer, l) in self.layers.iter().enumerate() {
            let kinds = [ParamKind::Weight, ParamKind::Bias];
            for (shape, kind) in l.param_shapes().into_iter().zip(kinds) {
                let len = shape.iter().product::<usize>();
                params.push(ParamInfo {
                    layer,
                    kind,
                    shape,
                    range: start..start + len,
                });
                start += len;
            }
        }

        params
    }

    /// Draws a fresh parameter vector: weights from `N(0, 1/in)`, zero biases.
    pub fn init_params<R>(&self, rng: &mut R) -> Vec<f32>
    where
        R: Rng + ?Sized,
    {
        let mut params = Vec::with_capacity(self.size());

        for info in self.parameters() {
            match info.kind {
                ParamKind::Weight => {
                    let scale = (info.shape[0] as f32).sqrt();
                    let shape = (info.shape[0], info.shape[1]);
                    let w = Array2::<f32>::random_using(shape, StandardNormal, rng);
                    params.extend(w.iter().map(|w| w / scale));
                }
                ParamKind::Bias => params.extend(iter::repeat_n(0.0, info.len())),
            }
        }

        params
    }

    /// Pushes a signal of shape `M×C×K` given at the output of the model back through its
    /// trailing `depth` layers.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `s` - The signal at the model output.
    /// * `depth` - How many layers, counted from the last one, the signal goes through.
    ///
    /// # Returns
    /// The signals w.r.t. the pre-activations of the visited layers, in forward order.
    pub fn backward(
        &self,
        params: &[f32],
        mut s: Array3<f32>,
        depth: usize,
    ) -> Result<Vec<LayerSignal>> {
        self.check_params(params)?;

        let ranges = self.layer_ranges();
        let mut signals = Vec::with_capacity(depth.min(self.layers.len()));

        for (idx, layer) in self.layers.iter().enumerate().rev().take(depth) {
            let s_z = layer.backward_activation(s)?;
            s = layer.backward_input(&params[ranges[idx].clone()], s_z.view())?;
            signals.push(LayerSignal {
                layer: idx,
                signal: s_z,
            });
        }

        signals.reverse();
        Ok(signals)
    }

    fn check_params(&self, params: &[f32]) -> Result<()> {
        if self.layers.is_empty() {
            return Err(MlErr::EmptyModel);
        }

        let size = self.size();
        if params.len() != size {
            return Err(MlErr::SizeMismatch {
                what: "parameters",
                got: params.len(),
                expected: size,
            });
        }

        Ok(())
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.layers.iter().map(|layer| layer.size()).sum()
    }

    fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_params(params)?;

        if x.nrows() == 0 {
            return Err(MlErr::EmptyBatch);
        }

        let ranges = self.layer_ranges();
        let mut out = x.to_owned();

        for (layer, range) in self.layers.iter_mut().zip(ranges) {
            out = layer.forward(&params[range], out.view())?;
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::activations::ActFn;
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    fn mlp() -> Sequential {
        Sequential::new([
            Layer::dense((3, 4), Some(ActFn::tanh())),
            Layer::dense((4, 2), None),
        ])
    }

    #[test]
    fn parameters_are_ordered_and_contiguous() {
        let model = mlp();
        let params = model.parameters();

        assert_eq!(params.len(), 4);
        assert_eq!(params[0].kind, ParamKind::Weight);
        assert_eq!(params[0].shape, vec![3, 4]);
        assert_eq!(params[1].range, 12..16);
        assert_eq!(params[2].range, 16..24);
        assert_eq!(params[3].range, 24..26);
        assert_eq!(params[3].range.end, model.size());
    }

    #[test]
    fn init_params_has_model_size_and_zero_biases() {
        let model = mlp();
        let params = model.init_params(&mut StdRng::seed_from_u64(1));

        assert_eq!(params.len(), model.size());
        assert!(params[12..16].iter().all(|&b| b == 0.0));
    }

    #[test]
    fn forward_rejects_wrong_parameter_count() {
        let mut model = mlp();
        let res = model.forward(&[0.0; 3], array![[1., 2., 3.]].view());

        assert!(matches!(
            res,
            Err(MlErr::SizeMismatch {
                what: "parameters",
                got: 3,
                expected: 26
            })
        ));
    }

    #[test]
    fn backward_returns_signals_in_forward_order() {
        let mut model = mlp();
        let params = model.init_params(&mut StdRng::seed_from_u64(3));
        model.forward(&params, array![[1., 0., -1.], [0.5, 0.5, 0.5]].view()).unwrap();

        let s = Array3::ones((2, 2, 1));
        let signals = model.backward(&params, s.clone(), 2).unwrap();
        assert_eq!(signals.iter().map(|s| s.layer).collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(signals[0].signal.dim(), (2, 4, 1));

        let last = model.backward(&params, s, 1).unwrap();
        assert_eq!(last.len(), 1);
        assert_eq!(last[0].layer, 1);
    }
}
