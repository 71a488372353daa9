use ndarray::{Array1, Array2, Array3, ArrayView2, ArrayView3, Axis, linalg};

/// What a backward pass extracted for a single parameter tensor.
#[derive(Debug, Clone, PartialEq)]
pub enum Quantity {
    /// One value per scalar parameter, flattened in storage order.
    Diag(Array1<f32>),
    /// One or two Kronecker factors.
    Kron(Vec<Array2<f32>>),
    /// One flattened row per example.
    PerExample(Array2<f32>),
}

/// Contracts a layer signal `s` (`M×out×K`) with the layer inputs `x` (`M×in`) into the diagonal
/// of `Σ_m Σ_k g_mk g_mkᵀ`, where `g_mk` is the gradient the `k`-th signal column induces on the
/// weights and biases.
pub(super) fn diag(x: ArrayView2<f32>, s: ArrayView3<f32>) -> [Quantity; 2] {
    let s2 = s.mapv(|v| v * v).sum_axis(Axis(2));
    let dw = x.mapv(|v| v * v).t().dot(&s2);
    let db = s2.sum_axis(Axis(0));

    [
        Quantity::Diag(dw.iter().copied().collect()),
        Quantity::Diag(db),
    ]
}

/// Kronecker factors of a layer: the weights get `[A, G]` and the biases `[G]`, where `A` is
/// the mean over the batch of the input outer products and `G` the sum over the batch of the
/// signal outer products.
pub(super) fn kron(x: ArrayView2<f32>, s: ArrayView3<f32>) -> [Quantity; 2] {
    let m = x.nrows() as f32;
    let a = x.t().dot(&x) / m;

    let out = s.dim().1;
    let mut g = Array2::zeros((out, out));
    for sm in s.outer_iter() {
        linalg::general_mat_mul(1.0, &sm, &sm.t(), 1.0, &mut g);
    }

    [Quantity::Kron(vec![a, g.clone()]), Quantity::Kron(vec![g])]
}

/// Per-example gradients of a layer given the per-example gradient w.r.t. its pre-activations,
/// stored as the only column of `s`.
pub(super) fn per_example(x: ArrayView2<f32>, s: ArrayView3<f32>) -> [Quantity; 2] {
    let delta = s.index_axis(Axis(2), 0);
    let (m, n_in) = x.dim();
    let out = delta.ncols();

    let mut gw = Array2::zeros((m, n_in * out));
    for ((mut row, xm), dm) in gw.outer_iter_mut().zip(x.outer_iter()).zip(delta.outer_iter()) {
        for (i, &xi) in xm.iter().enumerate() {
            for (j, &dj) in dm.iter().enumerate() {
                row[i * out + j] = xi * dj;
            }
        }
    }

    [Quantity::PerExample(gw), Quantity::PerExample(delta.to_owned())]
}

/// Jacobian blocks of a layer, of shape `M×K×len`, where the `k`-th signal column holds the
/// derivative of the `k`-th model output w.r.t. the pre-activations.
pub(super) fn jacobian(x: ArrayView2<f32>, s: ArrayView3<f32>) -> (Array3<f32>, Array3<f32>) {
    let (m, out, k) = s.dim();
    let n_in = x.ncols();

    let jw = Array3::from_shape_fn((m, k, n_in * out), |(n, c, p)| {
        x[[n, p / out]] * s[[n, p % out, c]]
    });
    let jb = Array3::from_shape_fn((m, k, out), |(n, c, j)| s[[n, j, c]]);

    (jw, jb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn diag_of_a_single_example_is_squared_gradient() {
        let x = array![[1.0, -2.0]];
        let s = Array3::from_shape_vec((1, 1, 1), vec![3.0]).unwrap();
        let [Quantity::Diag(dw), Quantity::Diag(db)] = diag(x.view(), s.view()) else {
            panic!("expected diagonal quantities");
        };

        assert_eq!(dw, array![9.0, 36.0]);
        assert_eq!(db, array![9.0]);
    }

    #[test]
    fn kron_input_factor_is_batch_mean() {
        let x = array![[1.0, 0.0], [0.0, 2.0]];
        let s = Array3::from_shape_vec((2, 1, 1), vec![1.0, 1.0]).unwrap();
        let [Quantity::Kron(w), Quantity::Kron(b)] = kron(x.view(), s.view()) else {
            panic!("expected kronecker quantities");
        };

        assert_eq!(w.len(), 2);
        assert_eq!(b.len(), 1);
        assert_eq!(w[0], array![[0.5, 0.0], [0.0, 2.0]]);
        assert_abs_diff_eq!(w[1][[0, 0]], 2.0);
        assert_eq!(w[1], b[0]);
    }

    #[test]
    fn per_example_gradients_are_outer_products() {
        let x = array![[1.0, 2.0], [3.0, 4.0]];
        let s = Array3::from_shape_vec((2, 2, 1), vec![1.0, -1.0, 0.5, 2.0]).unwrap();
        let [Quantity::PerExample(gw), Quantity::PerExample(gb)] = per_example(x.view(), s.view())
        else {
            panic!("expected per-example quantities");
        };

        assert_eq!(gw.row(0), array![1.0, -1.0, 2.0, -2.0]);
        assert_eq!(gw.row(1), array![1.5, 6.0, 2.0, 8.0]);
        assert_eq!(gb, array![[1.0, -1.0], [0.5, 2.0]]);
    }
}
