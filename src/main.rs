use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber;

use reelforge::{
    config::{Config, TokenData},
    engine::DailiesEngine,
};

#[derive(Parser)]
#[command(
    name = "reelforge",
    version,
    about = "Turn rendered image sequences into slated review movies",
    long_about = "reelforge processes rendered still-frame sequences through a color \
transform, resize/crop/fit geometry and burned-in slate overlays, then streams the \
frames into ffmpeg to produce one review movie per sequence."
)]
struct Cli {
    /// Input sequences: a folder, a first-frame path, or a %05d / #### pattern
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Slate token data file substituted into data-bound text elements
    #[arg(short, long)]
    data: Option<PathBuf>,

    /// Output folder, overriding the configured movie location
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Codec profile name, overriding the configured codec
    #[arg(long)]
    codec: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .init();

    info!("Starting reelforge v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };

    if let Some(output) = &cli.output {
        config.globals.movie_location = output.display().to_string();
    }
    if let Some(codec) = &cli.codec {
        config.globals.output_codec = Some(codec.clone());
    }

    let tokens = match &cli.data {
        Some(data_path) => {
            info!("Loading slate token data from {:?}", data_path);
            TokenData::from_file(data_path)?
        }
        None => TokenData::default(),
    };

    let engine = DailiesEngine::new(config, tokens)?;
    let summary = engine.generate(&cli.inputs).await?;

    if summary.movies.is_empty() {
        anyhow::bail!(
            "no movies were produced ({} sequence(s) failed)",
            summary.sequences_failed
        );
    }

    info!(
        "Done: {} movie(s) written, {} sequence(s) failed",
        summary.movies.len(),
        summary.sequences_failed
    );
    Ok(())
}
