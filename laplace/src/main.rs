use std::env;

use anyhow::{Context, bail};
use laplace::{
    builder::CurvatureBuilder,
    config::RunSpec,
    dataset::Dataset,
    fit::{self, Hessian},
};
use log::info;
use machine_learning::arch::Model;
use serde_json::json;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let Some(path) = env::args().nth(1) else {
        bail!("usage: laplace <run.json>");
    };

    let spec = RunSpec::from_path(&path).with_context(|| format!("reading {path}"))?;
    info!("loaded run spec from {path}");

    let builder = CurvatureBuilder::new();
    let mut model = builder.build_model(&spec.model);

    let params = match spec.params {
        Some(params) => params,
        None => {
            let mut rng = builder.generate_rng(spec.curvature.seed);
            info!("no parameters given, initializing {} of them", model.size());
            model.init_params(&mut rng)
        }
    };

    let ds = spec.dataset;
    let dataset = Dataset::new(ds.data, ds.x_size, ds.y_size)?;
    info!(examples = dataset.len(); "loaded dataset");

    let mut curv = builder.build(&spec.curvature, &mut model, &params)?;
    let (loss, hessian) = fit::accumulate(
        curv.as_mut(),
        spec.structure,
        dataset.batches(spec.batch_size),
        dataset.len(),
    )?;

    info!(loss = loss, dim = hessian.dim(); "curvature ready");

    let mut summary = json!({
        "structure": spec.structure,
        "likelihood": curv.likelihood(),
        "loss": loss,
        "dim": hessian.dim(),
        "trace": hessian.trace(),
        "diag": hessian.diag().to_vec(),
    });

    if let Hessian::Kron(kron) = &hessian {
        let shapes: Vec<Vec<usize>> = kron
            .kfacs()
            .iter()
            .map(|fs| fs.iter().map(|f| f.nrows()).collect())
            .collect();
        summary["kron_factors"] = json!(shapes);
    }

    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
