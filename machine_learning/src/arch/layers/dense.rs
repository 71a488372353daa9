use ndarray::{Array2, Array3, ArrayView1, ArrayView2, ArrayView3, linalg};

use crate::{MlErr, Result, arch::activations::ActFn};

/// A fully connected layer computing `act(x W + b)`.
///
/// The parameter slice of a layer holds the weights `W` (`in×out`, row-major) followed by the
/// biases `b` (`out`). The inputs and pre-activations of the last forward pass are kept so that
/// signals can be pushed back through the layer.
#[derive(Debug, Clone)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    size: usize,

    // Forward metadata
    x: Option<Array2<f32>>,
    z: Option<Array2<f32>>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The input and output dimensions of the layer.
    /// * `act_fn` - The activation applied to the output, if any.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            act_fn,
            x: None,
            z: None,
        }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// Returns the input of the last forward pass.
    pub fn input(&self) -> Result<ArrayView2<'_, f32>> {
        self.x.as_ref().map(|x| x.view()).ok_or(MlErr::NotForwarded)
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "layer input",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        let z = x.dot(&w) + &b;
        let a = match &self.act_fn {
            Some(act_fn) => z.mapv(|z| act_fn.f(z)),
            None => z.clone(),
        };

        self.x = Some(x.to_owned());
        self.z = Some(z);
        Ok(a)
    }

    /// Pushes a signal of shape `M×out×K` given at the output of the layer back through its
    /// activation, yielding the signal w.r.t. the pre-activations.
    pub fn backward_activation(&self, mut s: Array3<f32>) -> Result<Array3<f32>> {
        let z = self.z.as_ref().ok_or(MlErr::NotForwarded)?;
        self.check_signal(s.view())?;

        if let Some(act_fn) = &self.act_fn {
            for (mut sm, zm) in s.outer_iter_mut().zip(z.outer_iter()) {
                for (mut row, &zj) in sm.outer_iter_mut().zip(zm) {
                    row *= act_fn.df(zj);
                }
            }
        }

        Ok(s)
    }

    /// Pushes a signal w.r.t. the pre-activations back to the input of the layer: `s_in = W s_z`
    /// for every example.
    pub fn backward_input(&self, params: &[f32], s_z: ArrayView3<f32>) -> Result<Array3<f32>> {
        self.check_signal(s_z)?;

        let (w, _) = self.view_params(params)?;
        let (m, _, k) = s_z.dim();
        let mut s = Array3::zeros((m, self.dim.0, k));

        for (mut out, sm) in s.outer_iter_mut().zip(s_z.outer_iter()) {
            linalg::general_mat_mul(1.0, &w, &sm, 0.0, &mut out);
        }

        Ok(s)
    }

    fn check_signal(&self, s: ArrayView3<f32>) -> Result<()> {
        let x = self.x.as_ref().ok_or(MlErr::NotForwarded)?;
        let (m, out, _) = s.dim();

        if m != x.nrows() {
            return Err(MlErr::SizeMismatch {
                what: "signal examples",
                got: m,
                expected: x.nrows(),
            });
        }

        if out != self.dim.1 {
            return Err(MlErr::SizeMismatch {
                what: "signal outputs",
                got: out,
                expected: self.dim.1,
            });
        }

        Ok(())
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    ///
    /// # Arguments
    /// * `params` - A slice of parameters.
    ///
    /// # Returns
    /// A tuple containing the weights and biases.
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        if params.len() != self.size {
            return Err(MlErr::SizeMismatch {
                what: "layer parameters",
                got: params.len(),
                expected: self.size,
            });
        }

        let (w_raw, b_raw) = params.split_at(self.size - self.dim.1);
        let weights = ArrayView2::from_shape(self.dim, w_raw)?;
        let biases = ArrayView1::from_shape(self.dim.1, b_raw)?;
        Ok((weights, biases))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{Axis, array};

    #[test]
    fn forward_uses_row_major_weights_then_biases() {
        let mut dense = Dense::new((2, 3), None);
        let params = [1., 2., 3., 4., 5., 6., 0.5, -0.5, 1.];
        let y = dense.forward(&params, array![[1., 1.]].view()).unwrap();

        assert_eq!(y, array![[5.5, 6.5, 10.]]);
    }

    #[test]
    fn backward_before_forward_fails() {
        let dense = Dense::new((2, 1), None);
        let res = dense.backward_activation(Array3::zeros((1, 1, 1)));

        assert!(matches!(res, Err(MlErr::NotForwarded)));
    }

    #[test]
    fn backward_matches_finite_differences_of_the_input() {
        let mut dense = Dense::new((2, 2), Some(ActFn::tanh()));
        let params = [0.3, -0.7, 1.1, 0.4, 0.1, -0.2];
        let x = array![[0.5, -1.5]];
        dense.forward(&params, x.view()).unwrap();

        let s = Array3::from_shape_vec((1, 2, 1), vec![1., 0.]).unwrap();
        let s_z = dense.backward_activation(s).unwrap();
        let s_in = dense.backward_input(&params, s_z.view()).unwrap();

        let h = 1e-3;
        for i in 0..2 {
            let mut xp = x.clone();
            let mut xm = x.clone();
            xp[[0, i]] += h;
            xm[[0, i]] -= h;
            let fp = dense.forward(&params, xp.view()).unwrap();
            let fm = dense.forward(&params, xm.view()).unwrap();
            let fd = (fp[[0, 0]] - fm[[0, 0]]) / (2. * h);

            assert_abs_diff_eq!(s_in.index_axis(Axis(2), 0)[[0, i]], fd, epsilon = 1e-3);
        }
    }
}
