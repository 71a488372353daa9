use log::info;
use machine_learning::arch::{Sequential, activations::ActFn, layers::Layer};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    CurvatureInterface, EfCurvature, GgnCurvature, LaplaceErr, Likelihood, Result,
    config::{ActFnSpec, CurvatureBackend, CurvatureSpec, LayerSpec, ModelSpec},
};

/// Builds models and curvature interfaces given a specification.
#[derive(Default)]
pub struct CurvatureBuilder;

impl CurvatureBuilder {
    /// Creates a new `CurvatureBuilder`.
    pub fn new() -> Self {
        Self
    }

    /// Builds the architecture of a model following a spec.
    pub fn build_model(&self, spec: &ModelSpec) -> Sequential {
        match spec {
            ModelSpec::Sequential {
                layers: layer_specs,
            } => {
                let layers = layer_specs.iter().map(|ls| self.resolve_layer(*ls));
                Sequential::new(layers)
            }
        }
    }

    /// Builds a new curvature interface following a spec.
    ///
    /// The interface holds the model for as long as it lives.
    ///
    /// # Arguments
    /// * `spec` - The specification for the curvature.
    /// * `model` - The architecture of the fitted model.
    /// * `params` - The fitted parameters.
    ///
    /// # Returns
    /// The interface, or an error if the likelihood is invalid, the combination of options is not
    /// supported or the parameters don't fit the model.
    pub fn build<'m>(
        &self,
        spec: &CurvatureSpec,
        model: &'m mut Sequential,
        params: &'m [f32],
    ) -> Result<Box<dyn CurvatureInterface + 'm>> {
        let likelihood: Likelihood = spec.likelihood.parse()?;

        info!(
            likelihood = likelihood.as_str(),
            last_layer = spec.last_layer,
            stochastic = spec.stochastic;
            "building curvature interface"
        );

        match spec.backend {
            CurvatureBackend::Ggn => {
                let rng = self.generate_rng(spec.seed);
                let ggn =
                    GgnCurvature::new(model, params, likelihood, spec.last_layer, spec.stochastic)?
                        .with_rng(rng);

                Ok(Box::new(ggn))
            }
            CurvatureBackend::Ef if spec.stochastic => Err(LaplaceErr::InvalidSpec(
                "the empirical Fisher has no stochastic variant".to_string(),
            )),
            CurvatureBackend::Ef => {
                let ef = EfCurvature::new(model, params, likelihood, spec.last_layer)?;
                Ok(Box::new(ef))
            }
        }
    }

    fn resolve_layer(&self, spec: LayerSpec) -> Layer {
        match spec {
            LayerSpec::Dense { dim, act_fn } => {
                let factory = |act_fn| Layer::dense(dim, act_fn);
                self.resolve_act_fn(act_fn, factory)
            }
        }
    }

    fn resolve_act_fn<F>(&self, spec: Option<ActFnSpec>, layer_factory: F) -> Layer
    where
        F: FnOnce(Option<ActFn>) -> Layer,
    {
        let Some(act_fn) = spec else {
            return layer_factory(None);
        };

        let act_fn = match act_fn {
            ActFnSpec::Sigmoid { amp } => ActFn::sigmoid(amp),
            ActFnSpec::Tanh => ActFn::tanh(),
        };

        layer_factory(Some(act_fn))
    }

    /// Returns a seeded generator, or one seeded from the os when `seed` is missing.
    pub fn generate_rng(&self, seed: Option<u64>) -> StdRng {
        match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use machine_learning::arch::Model;

    fn model_spec() -> ModelSpec {
        ModelSpec::Sequential {
            layers: vec![
                LayerSpec::Dense {
                    dim: (2, 3),
                    act_fn: Some(ActFnSpec::Sigmoid { amp: 1.0 }),
                },
                LayerSpec::Dense {
                    dim: (3, 2),
                    act_fn: None,
                },
            ],
        }
    }

    fn curvature_spec(likelihood: &str, backend: CurvatureBackend) -> CurvatureSpec {
        CurvatureSpec {
            likelihood: likelihood.to_string(),
            backend,
            last_layer: false,
            stochastic: false,
            seed: Some(0),
        }
    }

    #[test]
    fn builds_the_model_architecture() {
        let builder = CurvatureBuilder::new();
        let model = builder.build_model(&model_spec());

        assert_eq!(model.layers().len(), 2);
        assert_eq!(model.size(), 2 * 3 + 3 + 3 * 2 + 2);
        assert_eq!(model.output_dim(), Some(2));
    }

    #[test]
    fn rejects_an_invalid_likelihood() {
        let builder = CurvatureBuilder::new();
        let mut model = builder.build_model(&model_spec());
        let params = vec![0.0; model.size()];

        let spec = curvature_spec("poisson", CurvatureBackend::Ggn);
        let err = builder.build(&spec, &mut model, &params).err().unwrap();

        assert!(matches!(err, LaplaceErr::InvalidLikelihood(l) if l == "poisson"));
    }

    #[test]
    fn builds_both_families() {
        let builder = CurvatureBuilder::new();
        let mut model = builder.build_model(&model_spec());
        let params = vec![0.0; model.size()];

        for backend in [CurvatureBackend::Ggn, CurvatureBackend::Ef] {
            let spec = curvature_spec("classification", backend);
            let curv = builder.build(&spec, &mut model, &params).unwrap();
            assert_eq!(curv.likelihood(), Likelihood::Classification);
        }
    }

    #[test]
    fn seeded_generators_are_reproducible() {
        use rand::Rng;

        let builder = CurvatureBuilder::new();
        let a: u64 = builder.generate_rng(Some(3)).random();
        let b: u64 = builder.generate_rng(Some(3)).random();

        assert_eq!(a, b);
    }
}
