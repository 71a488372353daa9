pub mod activations;
pub mod layers;
pub mod loss;
mod model;
mod sequential;

pub use model::Model;
pub use sequential::{LayerSignal, ParamInfo, ParamKind, Sequential};
