//! Shared plumbing for the Earmark command-line tools

pub mod discover;
pub mod output;

/// Logs are off unless `verbose`, so stdout stays clean JSON.
/// `RUST_LOG` still applies on top.
pub fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Info
    } else {
        log::LevelFilter::Off
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}
