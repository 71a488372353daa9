pub mod builder;
pub mod config;
pub mod curvature;
pub mod dataset;
pub mod error;
pub mod fit;
pub mod likelihood;
pub mod matrix;

pub use curvature::{CurvatureInterface, EfCurvature, GgnCurvature};
pub use error::{LaplaceErr, Result};
pub use likelihood::Likelihood;
pub use matrix::Kron;
