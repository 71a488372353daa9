use machine_learning::arch::loss::Loss;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::LaplaceErr;

/// The likelihood a model was fitted under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Likelihood {
    Regression,
    Classification,
}

impl Likelihood {
    /// Returns the loss induced by the likelihood: summed squared error for regression and
    /// summed cross-entropy for classification.
    pub fn loss_fn(self) -> Loss {
        match self {
            Likelihood::Regression => Loss::mse(),
            Likelihood::Classification => Loss::cross_entropy(),
        }
    }

    /// Returns the factor that turns the loss and its curvature into the negative
    /// log-likelihood: `0.5` maps the squared error to `-log N(y | f, 1)` up to a constant.
    pub fn factor(self) -> f32 {
        match self {
            Likelihood::Regression => 0.5,
            Likelihood::Classification => 1.0,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Likelihood::Regression => "regression",
            Likelihood::Classification => "classification",
        }
    }
}

impl FromStr for Likelihood {
    type Err = LaplaceErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "regression" => Ok(Likelihood::Regression),
            "classification" => Ok(Likelihood::Classification),
            other => Err(LaplaceErr::InvalidLikelihood(other.to_string())),
        }
    }
}

impl TryFrom<&str> for Likelihood {
    type Error = LaplaceErr;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for Likelihood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_likelihoods() {
        assert_eq!("regression".parse::<Likelihood>().unwrap(), Likelihood::Regression);
        assert_eq!(
            Likelihood::try_from("classification").unwrap(),
            Likelihood::Classification
        );
    }

    #[test]
    fn rejects_unknown_likelihood() {
        let err = "poisson".parse::<Likelihood>().unwrap_err();
        assert!(matches!(err, LaplaceErr::InvalidLikelihood(ref s) if s == "poisson"));
    }

    #[test]
    fn factors() {
        assert_eq!(Likelihood::Regression.factor(), 0.5);
        assert_eq!(Likelihood::Classification.factor(), 1.0);
    }
}
