use machine_learning::MlErr;
use ndarray::{Array1, Array2, linalg, s};
use std::ops::{Mul, MulAssign};

use crate::Result;

/// A block-diagonal, Kronecker-factored curvature matrix.
///
/// Every group holds the factors of one parameter tensor, in parameter order. A group with a
/// single factor is the block itself; a group `[A, B]` stands for the block `A ⊗ B`.
///
/// Sums of `Kron`s are taken factor by factor, which is how per-batch factors are accumulated
/// into dataset-level ones.
#[derive(Debug, Clone, PartialEq)]
pub struct Kron {
    kfacs: Vec<Vec<Array2<f32>>>,
}

impl Kron {
    pub fn new(kfacs: Vec<Vec<Array2<f32>>>) -> Self {
        Self { kfacs }
    }

    pub fn kfacs(&self) -> &[Vec<Array2<f32>>] {
        &self.kfacs
    }

    pub fn kfacs_mut(&mut self) -> &mut [Vec<Array2<f32>>] {
        &mut self.kfacs
    }

    /// Returns the amount of factor groups.
    pub fn len(&self) -> usize {
        self.kfacs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kfacs.is_empty()
    }

    /// Returns the side of the dense matrix this `Kron` stands for.
    pub fn dim(&self) -> usize {
        self.kfacs
            .iter()
            .map(|fs| fs.iter().map(Array2::nrows).product::<usize>())
            .sum()
    }

    /// Expands the factors into the dense block-diagonal matrix.
    pub fn to_matrix(&self) -> Array2<f32> {
        let p = self.dim();
        let mut out = Array2::zeros((p, p));
        let mut offset = 0;

        for fs in &self.kfacs {
            let block = block(fs);
            let n = block.nrows();
            out.slice_mut(s![offset..offset + n, offset..offset + n])
                .assign(&block);
            offset += n;
        }

        out
    }

    /// Returns the diagonal of the dense matrix without expanding it.
    pub fn diag(&self) -> Array1<f32> {
        let mut out = Vec::with_capacity(self.dim());

        for fs in &self.kfacs {
            let mut acc = vec![1.0];
            for f in fs {
                acc = acc
                    .iter()
                    .flat_map(|&a| f.diag().iter().map(move |&d| a * d).collect::<Vec<_>>())
                    .collect();
            }
            if !fs.is_empty() {
                out.extend(acc);
            }
        }

        Array1::from(out)
    }

    /// Adds `rhs` factor by factor, which is how per-batch factors are accumulated.
    ///
    /// # Returns
    /// An error if both sides don't have the same groups and factor shapes.
    pub fn try_add(&mut self, rhs: &Kron) -> Result<()> {
        if self.kfacs.len() != rhs.kfacs.len() {
            return Err(MlErr::SizeMismatch {
                what: "kronecker groups",
                got: rhs.kfacs.len(),
                expected: self.kfacs.len(),
            }
            .into());
        }

        for (fs, gs) in self.kfacs.iter().zip(&rhs.kfacs) {
            if fs.len() != gs.len() {
                return Err(MlErr::SizeMismatch {
                    what: "kronecker factors",
                    got: gs.len(),
                    expected: fs.len(),
                }
                .into());
            }

            for (f, g) in fs.iter().zip(gs) {
                if f.dim() != g.dim() {
                    return Err(MlErr::SizeMismatch {
                        what: "kronecker factor",
                        got: g.len(),
                        expected: f.len(),
                    }
                    .into());
                }
            }
        }

        for (fs, gs) in self.kfacs.iter_mut().zip(&rhs.kfacs) {
            for (f, g) in fs.iter_mut().zip(gs) {
                *f += g;
            }
        }

        Ok(())
    }
}

fn block(fs: &[Array2<f32>]) -> Array2<f32> {
    match fs {
        [] => Array2::zeros((0, 0)),
        [first, rest @ ..] => rest
            .iter()
            .fold(first.clone(), |acc, f| linalg::kron(&acc, f)),
    }
}

impl MulAssign<f32> for Kron {
    /// Scales every block by `rhs`, spreading it evenly over the factors of each group.
    /// `rhs` must be non-negative.
    fn mul_assign(&mut self, rhs: f32) {
        for fs in &mut self.kfacs {
            let k = rhs.powf(1.0 / fs.len() as f32);
            for f in fs.iter_mut() {
                *f *= k;
            }
        }
    }
}

impl Mul<f32> for Kron {
    type Output = Kron;

    fn mul(mut self, rhs: f32) -> Self::Output {
        self *= rhs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LaplaceErr;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn sample() -> Kron {
        Kron::new(vec![
            vec![array![[2.0, 1.0], [1.0, 3.0]], array![[4.0]]],
            vec![array![[5.0, 0.5], [0.5, 6.0]]],
        ])
    }

    #[test]
    fn to_matrix_is_block_diagonal() {
        let m = sample().to_matrix();

        assert_eq!(m.dim(), (4, 4));
        assert_eq!(m.slice(s![0..2, 0..2]), array![[8.0, 4.0], [4.0, 12.0]]);
        assert_eq!(m.slice(s![2..4, 2..4]), array![[5.0, 0.5], [0.5, 6.0]]);
        assert_eq!(m.slice(s![0..2, 2..4]), Array2::<f32>::zeros((2, 2)));
    }

    #[test]
    fn diag_matches_dense_diagonal() {
        let k = Kron::new(vec![vec![
            array![[1.0, 0.2], [0.2, 2.0]],
            array![[3.0, 0.0, 0.1], [0.0, 4.0, 0.0], [0.1, 0.0, 5.0]],
        ]]);

        assert_eq!(k.diag(), k.to_matrix().diag().to_owned());
    }

    #[test]
    fn scaling_scales_every_block() {
        let k = sample();
        let scaled = k.clone() * 0.25;

        for (a, b) in scaled.to_matrix().iter().zip(k.to_matrix().iter()) {
            assert_abs_diff_eq!(*a, 0.25 * b, epsilon = 1e-6);
        }
    }

    #[test]
    fn sums_are_factor_wise() {
        let mut k = sample();
        k.try_add(&sample()).unwrap();

        assert_eq!(k.kfacs()[0][1], array![[8.0]]);
        assert_eq!(k.kfacs()[1][0], array![[10.0, 1.0], [1.0, 12.0]]);
    }

    #[test]
    fn sums_of_mismatched_structures_fail_untouched() {
        let mut k = sample();
        let other = Kron::new(vec![vec![array![[1.0]]]]);
        let err = k.try_add(&other).unwrap_err();

        assert!(matches!(
            err,
            LaplaceErr::Ml(MlErr::SizeMismatch {
                what: "kronecker groups",
                got: 1,
                expected: 2
            })
        ));

        let reshaped = Kron::new(vec![
            vec![array![[1.0]], array![[4.0]]],
            vec![array![[5.0, 0.5], [0.5, 6.0]]],
        ]);
        assert!(k.try_add(&reshaped).is_err());
        assert_eq!(k, sample());
    }
}
