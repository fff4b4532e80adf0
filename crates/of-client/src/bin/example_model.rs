//! Example worker evaluating a quadratic surface
//!
//! `f(x, y) = a*x^2 + b*y^2 + c*x*y + d*x + e*y + f`
//!
//! With `--generate` a synthetic data set is written for a random parameter
//! set; otherwise one new run is claimed, evaluated against that data set
//! and its result uploaded.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use of_client::{AnyObjectiveFunction, ObjFunConfig, ObjFunKind, ParameterSet};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use tracing::info;
use tracing_subscriber::EnvFilter;

const SYNTHETIC_DATA: &str = "synthetic.data";
const PARAMETERS_DATA: &str = "parameters.data";

#[derive(Debug, Parser)]
#[command(author, version, about = "Quadratic surface example model")]
struct Args {
    /// Name of configuration file
    config: PathBuf,

    /// Delay setting results by SEC seconds
    #[arg(short, long, default_value_t = 0, value_name = "SEC")]
    delay: u64,

    /// Scale for random noise to add to synthetic data
    #[arg(short, long, default_value_t = 10.0)]
    scale: f64,

    /// Generate synthetic data
    #[arg(short, long)]
    generate: bool,
}

fn param(params: &BTreeMap<String, f64>, name: &str) -> anyhow::Result<f64> {
    params
        .get(name)
        .copied()
        .with_context(|| format!("parameter {name} missing"))
}

fn model(x: f64, y: f64, params: &BTreeMap<String, f64>) -> anyhow::Result<f64> {
    Ok(param(params, "a")? * x * x
        + param(params, "b")? * y * y
        + param(params, "c")? * x * y
        + param(params, "d")? * x
        + param(params, "e")? * y
        + param(params, "f")?)
}

fn noise(scale: f64) -> anyhow::Result<Normal<f64>> {
    Normal::new(0.0, scale).map_err(|e| anyhow::anyhow!("invalid noise scale {scale}: {e}"))
}

fn generate(cfg: &ObjFunConfig, scale: f64) -> anyhow::Result<()> {
    info!("generating synthetic data");
    let basedir = cfg.basedir();
    fs::create_dir_all(&basedir)?;

    let mut rng = rand::rng();
    let noise = noise(scale)?;
    let mut params = BTreeMap::new();
    for (name, p) in cfg.parameters() {
        let (minv, maxv) = (p.minv().as_f64(), p.maxv().as_f64());
        let value = p.snap(rng.random_range(minv..=maxv).into())?;
        params.insert(name.clone(), value.as_f64());
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(b' ')
        .from_path(basedir.join(PARAMETERS_DATA))?;
    for (name, value) in &params {
        writer.write_record([name.clone(), value.to_string()])?;
    }
    writer.flush()?;

    let mut writer = csv::Writer::from_path(basedir.join(SYNTHETIC_DATA))?;
    for y in -50..50 {
        for x in -50..50 {
            let (x, y) = (x as f64, y as f64);
            let z = model(x, y, &params)? + noise.sample(&mut rng);
            writer.serialize((x, y, z))?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn read_data(path: &Path) -> anyhow::Result<Vec<(f64, f64, f64)>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let rows: Vec<(f64, f64, f64)> = reader.deserialize().collect::<Result<_, _>>()?;
    Ok(rows)
}

fn differences(path: &Path, params: &BTreeMap<String, f64>) -> anyhow::Result<Vec<f64>> {
    read_data(path)?
        .into_iter()
        .map(|(x, y, z)| Ok(model(x, y, params)? - z))
        .collect()
}

fn std_dev(values: &[f64]) -> f64 {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0)).sqrt()
}

fn run(cfg: &ObjFunConfig, delay: u64) -> anyhow::Result<()> {
    info!("running model");
    let mut objfun = cfg.objective_function()?;
    let pending = objfun.get_new(None)?;
    let params: ParameterSet = pending.parameters;
    let values: BTreeMap<String, f64> = params.iter().map(|(n, v)| (n.clone(), v.as_f64())).collect();
    let data = cfg.basedir().join(SYNTHETIC_DATA);

    let wait = || {
        if delay > 0 {
            info!("waiting {delay} seconds");
            std::thread::sleep(Duration::from_secs(delay));
        }
    };

    match &mut objfun {
        AnyObjectiveFunction::Misfit(o) => {
            let result = std_dev(&differences(&data, &values)?);
            wait();
            info!("result {result}");
            o.set_result(&params, &result, false, None)?;
        }
        AnyObjectiveFunction::Residual(o) => {
            let result = differences(&data, &values)?;
            wait();
            info!("result of {} residuals", result.len());
            o.set_result(&params, &result, false, None)?;
        }
        AnyObjectiveFunction::SimObs(o) => {
            let mut result = BTreeMap::new();
            for (i, (name, target)) in cfg.observations().iter().enumerate() {
                result.insert(name.clone(), model(i as f64 * 5.0, 0.0, &values)? - target);
            }
            wait();
            info!("result {result:?}");
            o.set_result(&params, &result, false, None)?;
        }
    }
    info!("stored result of run {}", pending.id);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let cfg = ObjFunConfig::load(&args.config)?;

    if args.generate {
        if cfg.objfun() == ObjFunKind::SimObs {
            bail!("no need to generate data for simobs example");
        }
        generate(&cfg, args.scale)
    } else {
        run(&cfg, args.delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> BTreeMap<String, f64> {
        ["a", "b", "c", "d", "e", "f"]
            .iter()
            .zip([1.0, 2.0, 3.0, 4.0, 5.0, 6.0])
            .map(|(n, v)| (n.to_string(), v))
            .collect()
    }

    #[test]
    fn quadratic_model() {
        let p = params();
        assert_eq!(model(0.0, 0.0, &p).unwrap(), 6.0);
        assert_eq!(model(1.0, 2.0, &p).unwrap(), 1.0 + 8.0 + 6.0 + 4.0 + 10.0 + 6.0);

        let mut missing = p.clone();
        missing.remove("e");
        assert!(model(1.0, 1.0, &missing).is_err());
    }

    #[test]
    fn sample_std_dev() {
        assert!((std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]) - 2.138089935).abs() < 1e-8);
    }

    #[test]
    fn noise_spread_follows_scale() {
        let mut rng = rand::rng();
        let samples: Vec<f64> = noise(10.0).unwrap().sample_iter(&mut rng).take(20_000).collect();
        assert!((std_dev(&samples) - 10.0).abs() < 0.5);
        assert!(noise(-1.0).is_err());
        assert!(noise(f64::NAN).is_err());
    }

    #[test]
    fn synthetic_data_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join(SYNTHETIC_DATA);
        let mut writer = csv::Writer::from_path(&path).unwrap();
        writer.serialize((1.0, 2.0, 39.0)).unwrap();
        writer.serialize((0.0, 0.0, 5.0)).unwrap();
        writer.flush().unwrap();

        assert_eq!(differences(&path, &params()).unwrap(), vec![-4.0, 1.0]);
    }
}
