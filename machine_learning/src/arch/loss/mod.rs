mod cross_entropy;
mod loss_fn;
mod mse;

pub use cross_entropy::{CrossEntropy, softmax};
pub use loss_fn::{Loss, LossFn};
pub use mse::Mse;
