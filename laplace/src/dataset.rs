use machine_learning::MlErr;
use ndarray::{Array2, ArrayView2, Axis};
use std::{iter, num::NonZeroUsize};

use crate::{LaplaceErr, Result};

/// A dataset of examples stored row-major, each row holding the `x_size` inputs followed by the
/// `y_size` targets.
#[derive(Debug, Clone)]
pub struct Dataset {
    x_size: usize,
    data: Array2<f32>,
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Returns
    /// The dataset, or an error if `data` doesn't hold a whole amount of rows.
    pub fn new(data: Vec<f32>, x_size: usize, y_size: usize) -> Result<Self> {
        let width = x_size + y_size;
        if width == 0 {
            return Err(LaplaceErr::InvalidSpec(
                "examples must have at least one value".to_string(),
            ));
        }

        if data.len() % width != 0 {
            return Err(MlErr::SizeMismatch {
                what: "dataset",
                got: data.len(),
                expected: data.len().next_multiple_of(width),
            }
            .into());
        }

        let rows = data.len() / width;
        let data = Array2::from_shape_vec((rows, width), data).map_err(MlErr::from)?;

        Ok(Self { x_size, data })
    }

    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splits the dataset in consecutive `(x, y)` batches; the last one may be smaller.
    pub fn batches(
        &self,
        batch_size: NonZeroUsize,
    ) -> impl Iterator<Item = (ArrayView2<'_, f32>, ArrayView2<'_, f32>)> {
        let batch_size = batch_size.get();
        let x_size = self.x_size;
        let mut rest = self.data.view();

        iter::from_fn(move || {
            if rest.nrows() == 0 {
                return None;
            }

            let take = batch_size.min(rest.nrows());
            let (batch, tail) = rest.split_at(Axis(0), take);
            rest = tail;

            Some(batch.split_at(Axis(1), x_size))
        })
    }
}

/// One-hot encodes class labels into a `labels.len()×classes` matrix.
///
/// Labels out of range leave their row zeroed.
pub fn one_hot(labels: &[usize], classes: usize) -> Array2<f32> {
    let mut out = Array2::zeros((labels.len(), classes));

    for (mut row, &label) in out.outer_iter_mut().zip(labels) {
        if let Some(v) = row.get_mut(label) {
            *v = 1.0;
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn splits_in_batches() {
        let data = vec![1.0, 2.0, 10.0, 3.0, 4.0, 20.0, 5.0, 6.0, 30.0];
        let dataset = Dataset::new(data, 2, 1).unwrap();
        let batches: Vec<_> = dataset
            .batches(NonZeroUsize::new(2).unwrap())
            .collect();

        assert_eq!(dataset.len(), 3);
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].0, array![[1.0, 2.0], [3.0, 4.0]]);
        assert_eq!(batches[0].1, array![[10.0], [20.0]]);
        assert_eq!(batches[1].0, array![[5.0, 6.0]]);
        assert_eq!(batches[1].1, array![[30.0]]);
    }

    #[test]
    fn rejects_partial_rows() {
        let err = Dataset::new(vec![1.0, 2.0, 3.0, 4.0], 2, 1).unwrap_err();
        assert!(matches!(
            err,
            LaplaceErr::Ml(MlErr::SizeMismatch {
                what: "dataset",
                ..
            })
        ));
    }

    #[test]
    fn empty_datasets_have_no_batches() {
        let dataset = Dataset::new(vec![], 2, 1).unwrap();

        assert!(dataset.is_empty());
        assert_eq!(dataset.batches(NonZeroUsize::MIN).count(), 0);
    }

    #[test]
    fn one_hot_encodes_labels() {
        assert_eq!(
            one_hot(&[1, 0, 2], 3),
            array![[0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]]
        );
    }
}
