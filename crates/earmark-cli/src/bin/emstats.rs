//! emstats - Summarize the stored fingerprint collection
//!
//! Usage: emstats [--config <path>]

use anyhow::Result;
use clap::Parser;
use earmark_cli::output::{print_json, StatsOutput};
use earmark_core::{hydrate, open_backend, EarmarkConfig, Engine};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "emstats")]
#[command(about = "Show counts for the stored fingerprints", long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    earmark_cli::init_logging(args.verbose);

    let config = EarmarkConfig::load_or_default(args.config.as_deref())?;
    let backend = open_backend(&config.storage).await?;
    let engine = Engine::in_memory(config.engine_config())?;
    let stored = hydrate(backend.as_ref(), &engine).await?;

    print_json(&StatsOutput::new(
        engine.index().stats()?,
        stored,
        engine.catalog().list()?,
    ));
    Ok(())
}
