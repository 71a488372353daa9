//! Second-order quantities extracted from a single backward pass.
//!
//! A model is *extended* once, together with its loss, by building an [`Extended`]. Afterwards
//! every backward pass runs under one [`Extension`] and yields one [`Quantity`] per parameter
//! tensor of the extended layers, in the order given by `Sequential::parameters`.

mod extended;
mod jacobians;
mod quantities;

pub use extended::Extended;
pub use jacobians::{jacobians, last_layer_jacobians};
pub use quantities::Quantity;

/// Selects what a backward pass extracts for every parameter tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extension {
    /// Exact diagonal of the generalized Gauss-Newton matrix.
    DiagGgnExact,
    /// One-sample Monte-Carlo estimate of the diagonal of the generalized Gauss-Newton matrix.
    DiagGgnMc,
    /// Exact Kronecker factors of the generalized Gauss-Newton matrix.
    Kflr,
    /// Kronecker factors from a one-sample Monte-Carlo estimate of the output Hessian.
    Kfac,
    /// Sum over the examples of the squared per-example gradients.
    SumGradSquared,
    /// Per-example gradients.
    BatchGrad,
}

impl Extension {
    pub fn name(&self) -> &'static str {
        match self {
            Extension::DiagGgnExact => "diag_ggn_exact",
            Extension::DiagGgnMc => "diag_ggn_mc",
            Extension::Kflr => "kflr",
            Extension::Kfac => "kfac",
            Extension::SumGradSquared => "sum_grad_squared",
            Extension::BatchGrad => "batch_grad",
        }
    }
}
