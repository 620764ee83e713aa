mod config;
mod platform;
mod session;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use audit_engine::{EngineHandle, ReportStore};
use clap::Parser;
use engine_logging::engine_info;

use crate::config::AppConfig;
use crate::platform::logging::{self, LogDestination};

/// Run a multi-expert audit of a website or of uploaded screenshots.
#[derive(Debug, Parser)]
#[command(name = "site-audit", version)]
struct Args {
    /// URLs on one domain, or paths to screenshot images. The first is the primary input.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Configuration file.
    #[arg(long, default_value = "audit.ron")]
    config: PathBuf,

    /// Directory for saved reports; overrides the config file.
    #[arg(long)]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogDestination::File)]
    log: LogDestination,

    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();
    logging::initialize(args.log, args.verbose);

    let mut config = AppConfig::load(&args.config)?;
    config.apply_env(|name| std::env::var(name).ok());
    let store = ReportStore::new(
        args.output
            .clone()
            .unwrap_or_else(|| PathBuf::from(&config.output_dir)),
    );

    let inputs = session::collect_inputs(&args.inputs)?;
    let engine = EngineHandle::new(config.backend_settings(), config.pipeline_settings()?)
        .context("failed to start audit engine")?;

    let ticket = engine.start(inputs);
    engine_info!("Started run {} for {} input(s)", ticket, args.inputs.len());

    match session::follow_run(&engine, ticket, &store)? {
        Some(_) => Ok(ExitCode::SUCCESS),
        None => Ok(ExitCode::FAILURE),
    }
}
