use std::path::PathBuf;

use anyhow::{Context, Result};
use aya::include_bytes_aligned;
use chownwatch::{ChownWatchEngine, settings::Settings, telemetry};
use clap::Parser;

#[derive(Debug, Parser)]
struct Opt {
    /// Verbose output
    #[clap(short, long)]
    verbose: bool,

    /// Settings file (YAML); environment variables override it
    #[clap(short, long, env = "CHOWNWATCH_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let opt = Opt::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if opt.verbose {
        "debug"
    } else {
        "info"
    }))
    .init();

    let settings = Settings::load(opt.config.as_deref()).context("Failed to load settings")?;

    telemetry::init_metrics(settings.otel_exporter_otlp_endpoint.as_deref())?;

    // build.rs compiles the eBPF crate and leaves the object in $OUT_DIR
    let engine = ChownWatchEngine::new(
        settings,
        include_bytes_aligned!(concat!(env!("OUT_DIR"), "/chownwatch")),
    )?;
    engine.run().await
}
