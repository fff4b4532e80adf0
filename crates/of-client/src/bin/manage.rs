use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use of_client::proxy::DEFAULT_URL_BASE;
use of_client::{ObjFunConfig, Proxy};
use tracing_subscriber::EnvFilter;

/// List the studies known to an ObjectiveFunction server.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// API url
    #[arg(short, long)]
    baseurl: Option<String>,

    /// The ObjectiveFunction app
    #[arg(short, long)]
    app: Option<String>,

    /// The password for the app
    #[arg(short, long)]
    password: Option<String>,

    /// Config file to read
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let mut app = None;
    let mut password = None;
    let mut baseurl = None;
    if let Some(path) = &args.config {
        let cfg = ObjFunConfig::load(path)?;
        password = Some(cfg.secret()?);
        app = Some(cfg.app().to_string());
        baseurl = Some(cfg.baseurl().to_string());
    }
    let app = args.app.or(app).context("no app given")?;
    let password = args.password.or(password).context("no password given")?;
    let baseurl = args
        .baseurl
        .or(baseurl)
        .unwrap_or_else(|| DEFAULT_URL_BASE.to_string());

    let proxy = Proxy::connect(&app, &password, &baseurl)?;
    for study in proxy.studies()? {
        println!("{study}");
    }
    Ok(())
}
