//! emmatch - Identify an audio clip against the stored tracks
//!
//! Usage: emmatch [--config <path>] [--threshold X] [--max-results N]
//!                [--start S] [--duration D] <query>

use anyhow::Result;
use clap::Parser;
use earmark_cli::output::{print_json, MatchOutput};
use earmark_core::{hydrate, open_backend, Decoder, EarmarkConfig, Engine, FileDecoder};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "emmatch")]
#[command(about = "Match an audio clip against stored fingerprints", long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Minimum aligned votes for a match (overrides [matching])
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Maximum number of results (overrides [matching])
    #[arg(short = 'n', long)]
    max_results: Option<usize>,

    /// Start of the clip within the query file, in seconds
    #[arg(short, long, default_value_t = 0.0)]
    start: f64,

    /// Length of the clip in seconds (default: to the end)
    #[arg(short, long)]
    duration: Option<f64>,

    /// Query audio file
    query: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    earmark_cli::init_logging(args.verbose);

    let mut config = EarmarkConfig::load_or_default(args.config.as_deref())?;
    if let Some(threshold) = args.threshold {
        config.matching.match_threshold = threshold;
    }
    if let Some(max_results) = args.max_results {
        config.matching.max_results = max_results;
    }
    config.validate()?;

    if !args.query.exists() {
        anyhow::bail!("Query file not found: {}", args.query.display());
    }
    if args.start < 0.0 || args.duration.is_some_and(|d| d <= 0.0) {
        anyhow::bail!("--start must be non-negative and --duration positive");
    }

    let backend = open_backend(&config.storage).await?;
    let engine = Engine::in_memory(config.engine_config())?;
    hydrate(backend.as_ref(), &engine).await?;

    let audio = FileDecoder::from_config(&config.fingerprinting).decode(&args.query)?;
    let rate = audio.sample_rate as f64;
    let begin = ((args.start * rate) as usize).min(audio.samples.len());
    let end = match args.duration {
        Some(d) => (begin + (d * rate) as usize).min(audio.samples.len()),
        None => audio.samples.len(),
    };
    log::info!(
        "Query {}: {:.2}s from {:.2}s",
        args.query.display(),
        (end - begin) as f64 / rate,
        args.start
    );

    let outcome = engine.match_samples(&audio.samples[begin..end])?;
    print_json(&MatchOutput::new(
        &args.query.display().to_string(),
        outcome,
        &engine,
    ));
    Ok(())
}
