use machine_learning::MlErr;
use std::{error::Error, fmt, io};

/// The laplace module's result type.
pub type Result<T> = std::result::Result<T, LaplaceErr>;

/// Failures while computing curvature.
#[derive(Debug)]
pub enum LaplaceErr {
    /// The likelihood is neither `regression` nor `classification`.
    InvalidLikelihood(String),
    /// The operation is not supported by this configuration of the interface.
    Unsupported(&'static str),
    /// The operation is not implemented by this family of curvature.
    Unimplemented(&'static str),
    /// The differentiation engine returned a quantity of the wrong kind for an extension.
    UnexpectedQuantity(&'static str),
    InvalidSpec(String),
    EmptyDataset,
    Ml(MlErr),
    Io(io::Error),
    Json(serde_json::Error),
}

impl fmt::Display for LaplaceErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LaplaceErr::InvalidLikelihood(got) => write!(
                f,
                "invalid likelihood {got:?}, expected \"regression\" or \"classification\""
            ),
            LaplaceErr::Unsupported(what) => write!(f, "unsupported operation: {what}"),
            LaplaceErr::Unimplemented(what) => write!(f, "not implemented: {what}"),
            LaplaceErr::UnexpectedQuantity(ext) => {
                write!(f, "unexpected quantity returned by the {ext} extension")
            }
            LaplaceErr::InvalidSpec(what) => write!(f, "invalid spec: {what}"),
            LaplaceErr::EmptyDataset => write!(f, "the dataset has no batches"),
            LaplaceErr::Ml(e) => write!(f, "model error: {e}"),
            LaplaceErr::Io(e) => write!(f, "io error: {e}"),
            LaplaceErr::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl Error for LaplaceErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LaplaceErr::Ml(e) => Some(e),
            LaplaceErr::Io(e) => Some(e),
            LaplaceErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MlErr> for LaplaceErr {
    fn from(value: MlErr) -> Self {
        Self::Ml(value)
    }
}

impl From<io::Error> for LaplaceErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for LaplaceErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}
