use serde::{Deserialize, Serialize};
use std::{fs, num::NonZeroUsize, path::Path};

use crate::Result;

/// The specification for the `ActFn` enum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActFnSpec {
    Sigmoid { amp: f32 },
    Tanh,
}

/// The specification for the `Layer` enum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerSpec {
    Dense {
        dim: (usize, usize),
        act_fn: Option<ActFnSpec>,
    },
}

/// The specification for the `Sequential` model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSpec {
    Sequential { layers: Vec<LayerSpec> },
}

/// The family of curvature approximations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurvatureBackend {
    Ggn,
    Ef,
}

/// The specification for a curvature interface.
///
/// The likelihood is kept as a string so an invalid one is reported by the builder rather than
/// by the parser.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurvatureSpec {
    pub likelihood: String,
    pub backend: CurvatureBackend,
    #[serde(default)]
    pub last_layer: bool,
    #[serde(default)]
    pub stochastic: bool,
    pub seed: Option<u64>,
}

/// The structure of the approximated Hessian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HessianStructure {
    Full,
    Kron,
    Diag,
}

impl HessianStructure {
    pub fn as_str(self) -> &'static str {
        match self {
            HessianStructure::Full => "full",
            HessianStructure::Kron => "kron",
            HessianStructure::Diag => "diag",
        }
    }
}

/// The specification for the `Dataset`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub data: Vec<f32>,
    pub x_size: usize,
    pub y_size: usize,
}

/// The specification for a whole curvature run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSpec {
    pub model: ModelSpec,
    /// The fitted parameters; freshly initialized ones are used when missing.
    pub params: Option<Vec<f32>>,
    pub dataset: DatasetSpec,
    pub curvature: CurvatureSpec,
    pub structure: HessianStructure,
    pub batch_size: NonZeroUsize,
}

impl RunSpec {
    /// Reads a `RunSpec` from a json file.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}
