//! pngsift CLI - low-memory streaming PNG downsampler.
//!
//! pngsift reads a PNG in small fixed-size chunks, decodes it progressively,
//! keeps every Nth pixel of every Nth row, and writes the reduced image
//! incrementally, so peak memory stays bounded regardless of image size.
//!
//! # Usage
//!
//! ```bash
//! # Halve both dimensions
//! pngsift photo.png small.png 2
//!
//! # Aggressive shrink with a tiny read buffer and a JSON report
//! pngsift photo.png thumb.png 8 --chunk-size 256 --report json
//! ```

use clap::Parser;

mod cli;
mod logging;

/// pngsift - shrink a PNG by integer pixel sampling while streaming it.
#[derive(Parser, Debug)]
#[command(name = "pngsift")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    convert: cli::convert::ConvertArgs,

    /// Enable verbose (debug) logging
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json_logs: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging from config, with CLI verbose override.
    // Note: logging isn't initialized yet, so use eprintln for config warnings.
    let config = match pngsift_core::Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Warning: Failed to load config: {e}\n  Using default configuration.");
            pngsift_core::Config::default()
        }
    };
    logging::init(&config.logging, cli.verbose, cli.json_logs);

    tracing::debug!("pngsift v{}", pngsift_core::VERSION);

    cli::convert::execute(cli.convert, &config)
}
