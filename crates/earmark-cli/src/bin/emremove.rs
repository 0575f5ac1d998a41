//! emremove - Delete tracks from the configured store
//!
//! Usage: emremove [--config <path>] <track_id>...

use anyhow::Result;
use clap::Parser;
use earmark_cli::output::{print_json, RemoveOutput};
use earmark_core::{open_backend, EarmarkConfig, TrackId};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "emremove")]
#[command(about = "Remove stored tracks", long_about = None)]
struct Args {
    /// Path to configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Track ids to delete
    #[arg(required = true)]
    track_ids: Vec<TrackId>,

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

    let mut results = Vec::with_capacity(args.track_ids.len());
    for track_id in args.track_ids {
        let result = match backend.delete_track(track_id).await {
            Ok(removed) => {
                log::info!("Track {}: {}", track_id, if removed { "removed" } else { "not found" });
                RemoveOutput {
                    track_id,
                    removed,
                    error: None,
                }
            }
            Err(e) => RemoveOutput {
                track_id,
                removed: false,
                error: Some(format!("{:#}", e)),
            },
        };
        results.push(result);
    }

    print_json(&results);
    Ok(())
}
