pub mod arch;
pub mod error;
pub mod extensions;

pub use error::{MlErr, Result};
