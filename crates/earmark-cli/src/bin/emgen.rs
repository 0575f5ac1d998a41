//! emgen - Fingerprint audio files into the configured store
//!
//! Usage: emgen [--config <path>] [--recursive] [--workers N] <paths>...

use anyhow::{Context, Result};
use clap::Parser;
use earmark_cli::discover::collect_audio_files;
use earmark_cli::output::{print_json, BatchOutput};
use earmark_core::{
    next_track_id, open_backend, CancelToken, EarmarkConfig, Engine, FileDecoder, Fingerprint, StoredTrack, TrackId,
    TrackSource,
};
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Parser, Debug)]
#[command(name = "emgen")]
#[command(about = "Fingerprint audio files and store them", long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Descend into subdirectories
    #[arg(short, long)]
    recursive: bool,

    /// Worker threads (overrides [pipeline] workers)
    #[arg(short, long)]
    workers: Option<usize>,

    /// Audio files or directories
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    earmark_cli::init_logging(args.verbose);

    let mut config = EarmarkConfig::load_or_default(args.config.as_deref())?;
    if let Some(workers) = args.workers {
        config.pipeline.workers = workers;
    }
    config.validate()?;

    let files = collect_audio_files(&args.paths, args.recursive)?;
    if files.is_empty() {
        anyhow::bail!("No audio files found");
    }

    let backend = open_backend(&config.storage).await?;
    let first_id = next_track_id(backend.as_ref()).await?;
    let sources: Vec<TrackSource> = files
        .iter()
        .zip(first_id..)
        .map(|(path, track_id)| TrackSource::new(track_id, path))
        .collect();

    let engine = Engine::in_memory(config.engine_config())?;
    let decoder = FileDecoder::from_config(&config.fingerprinting);

    let cancel = CancelToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted, finishing files in progress");
            on_interrupt.cancel();
        }
    });

    log::info!("Fingerprinting {} files starting at track id {}", sources.len(), first_id);

    let indexed: Mutex<Vec<(TrackId, Vec<Fingerprint>)>> = Mutex::new(Vec::new());
    let report = tokio::task::block_in_place(|| {
        engine.fingerprint_observed(&sources, &decoder, &cancel, &|track| {
            if let Ok(mut indexed) = indexed.lock() {
                indexed.push((track.source.track_id, track.fingerprints.to_vec()));
            }
        })
    });

    let mut output = BatchOutput::from_report(&report);

    let indexed = indexed
        .into_inner()
        .map_err(|_| anyhow::anyhow!("fingerprint collector poisoned"))?;
    for (track_id, fingerprints) in indexed {
        let saved = async {
            let metadata = engine
                .metadata(track_id)?
                .with_context(|| format!("Track {} missing from catalog", track_id))?;
            let track = StoredTrack::new(metadata, &config.fingerprinting, fingerprints);
            backend.save_track(&track).await
        }
        .await;

        if let Err(e) = saved {
            log::warn!("Could not store track {}: {:#}", track_id, e);
            output.mark_unsaved(track_id, &e);
        }
    }

    print_json(&output);
    Ok(())
}
