use log::{debug, info};
use ndarray::{Array1, Array2, ArrayView2};

use crate::{CurvatureInterface, Kron, LaplaceErr, Result, config::HessianStructure};

/// A dataset-level curvature approximation.
#[derive(Debug, Clone, PartialEq)]
pub enum Hessian {
    Full(Array2<f32>),
    Kron(Kron),
    Diag(Array1<f32>),
}

impl Hessian {
    /// Returns the amount of parameters the approximation covers.
    pub fn dim(&self) -> usize {
        match self {
            Hessian::Full(h) => h.nrows(),
            Hessian::Kron(k) => k.dim(),
            Hessian::Diag(d) => d.len(),
        }
    }

    /// Returns the diagonal of the approximation.
    pub fn diag(&self) -> Array1<f32> {
        match self {
            Hessian::Full(h) => h.diag().to_owned(),
            Hessian::Kron(k) => k.diag(),
            Hessian::Diag(d) => d.clone(),
        }
    }

    pub fn trace(&self) -> f32 {
        self.diag().sum()
    }
}

/// Sums the scaled loss and the curvature of a dataset, batch by batch.
///
/// # Arguments
/// * `curv` - The curvature interface.
/// * `structure` - The structure of the approximation.
/// * `batches` - The `(x, y)` batches of the dataset.
/// * `n` - The amount of examples in the dataset, used to rescale Kronecker factors.
///
/// # Returns
/// The total scaled loss and the accumulated curvature, or an error if there are no batches or
/// any of them fails.
pub fn accumulate<'a, C, I>(
    curv: &mut C,
    structure: HessianStructure,
    batches: I,
    n: usize,
) -> Result<(f32, Hessian)>
where
    C: CurvatureInterface + ?Sized,
    I: IntoIterator<Item = (ArrayView2<'a, f32>, ArrayView2<'a, f32>)>,
{
    info!(structure = structure.as_str(), examples = n; "accumulating curvature");

    let mut batches = batches.into_iter();
    let (x, y) = batches.next().ok_or(LaplaceErr::EmptyDataset)?;
    let mut nbatches = 1;

    let (loss, hessian) = match structure {
        HessianStructure::Full => {
            let (mut loss, mut h) = curv.full(x, y)?;
            for (x, y) in batches {
                let (l, hb) = curv.full(x, y)?;
                loss += l;
                h += &hb;
                nbatches += 1;
            }
            (loss, Hessian::Full(h))
        }
        HessianStructure::Kron => {
            let (mut loss, mut k) = curv.kron(x, y, n)?;
            for (x, y) in batches {
                let (l, kb) = curv.kron(x, y, n)?;
                loss += l;
                k.try_add(&kb)?;
                nbatches += 1;
            }
            (loss, Hessian::Kron(k))
        }
        HessianStructure::Diag => {
            let (mut loss, mut d) = curv.diag(x, y)?;
            for (x, y) in batches {
                let (l, db) = curv.diag(x, y)?;
                loss += l;
                d += &db;
                nbatches += 1;
            }
            (loss, Hessian::Diag(d))
        }
    };

    debug!(batches = nbatches, loss = loss; "accumulated curvature");

    Ok((loss, hessian))
}
