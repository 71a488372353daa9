use ndarray::{Array2, Array3, ArrayView2, s};

use super::quantities;
use crate::{
    Result,
    arch::{Model, Sequential},
};

/// Computes the Jacobians of the model outputs w.r.t. all of its parameters.
///
/// # Returns
/// The Jacobians, of shape `M×C×P`, and the model outputs, of shape `M×C`.
pub fn jacobians(
    model: &mut Sequential,
    params: &[f32],
    x: ArrayView2<f32>,
) -> Result<(Array3<f32>, Array2<f32>)> {
    let depth = model.layers().len();
    jacobians_over(model, params, x, depth)
}

/// Computes the Jacobians of the model outputs w.r.t. the parameters of its last layer only,
/// treating the previous layers as a fixed feature map.
pub fn last_layer_jacobians(
    model: &mut Sequential,
    params: &[f32],
    x: ArrayView2<f32>,
) -> Result<(Array3<f32>, Array2<f32>)> {
    jacobians_over(model, params, x, 1)
}

fn jacobians_over(
    model: &mut Sequential,
    params: &[f32],
    x: ArrayView2<f32>,
    depth: usize,
) -> Result<(Array3<f32>, Array2<f32>)> {
    let f = model.forward(params, x)?;
    let (m, c) = f.dim();

    let mut eye = Array3::zeros((m, c, c));
    for mut em in eye.outer_iter_mut() {
        em.diag_mut().fill(1.0);
    }

    let signals = model.backward(params, eye, depth)?;
    let p: usize = signals
        .iter()
        .map(|signal| model.layers()[signal.layer].size())
        .sum();

    let mut js = Array3::zeros((m, c, p));
    let mut offset = 0;

    for signal in &signals {
        let x = model.layers()[signal.layer].input()?;
        let (jw, jb) = quantities::jacobian(x, signal.signal.view());
        let (nw, nb) = (jw.dim().2, jb.dim().2);

        js.slice_mut(s![.., .., offset..offset + nw]).assign(&jw);
        offset += nw;
        js.slice_mut(s![.., .., offset..offset + nb]).assign(&jb);
        offset += nb;
    }

    Ok((js, f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::{activations::ActFn, layers::Layer};
    use approx::assert_abs_diff_eq;
    use ndarray::array;
    use rand::{SeedableRng, rngs::StdRng};

    fn mlp() -> Sequential {
        Sequential::new([
            Layer::dense((2, 3), Some(ActFn::tanh())),
            Layer::dense((3, 2), Some(ActFn::sigmoid(1.0))),
        ])
    }

    #[test]
    fn jacobians_match_finite_differences() {
        let mut model = mlp();
        let params = model.init_params(&mut StdRng::seed_from_u64(11));
        let x = array![[0.4, -0.9], [1.2, 0.3]];
        let (js, f) = jacobians(&mut model, &params, x.view()).unwrap();

        assert_eq!(js.dim(), (2, 2, model.size()));
        assert_eq!(f.dim(), (2, 2));

        let h = 1e-2;
        for p in 0..model.size() {
            let mut pp = params.clone();
            let mut pm = params.clone();
            pp[p] += h;
            pm[p] -= h;
            let fp = model.forward(&pp, x.view()).unwrap();
            let fm = model.forward(&pm, x.view()).unwrap();

            for n in 0..2 {
                for c in 0..2 {
                    let fd = (fp[[n, c]] - fm[[n, c]]) / (2. * h);
                    assert_abs_diff_eq!(js[[n, c, p]], fd, epsilon = 1e-3);
                }
            }
        }
    }

    #[test]
    fn last_layer_jacobians_are_the_trailing_columns() {
        let mut model = mlp();
        let params = model.init_params(&mut StdRng::seed_from_u64(2));
        let x = array![[0.4, -0.9]];
        let (full, _) = jacobians(&mut model, &params, x.view()).unwrap();
        let (last, _) = last_layer_jacobians(&mut model, &params, x.view()).unwrap();

        let first = model.size() - last.dim().2;
        assert_eq!(last.dim().2, 8);
        assert_eq!(full.slice(s![.., .., first..]), last);
    }
}
