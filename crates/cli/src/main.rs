mod commands;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use transcoder_core::{
    load_config, load_default_config, validate_config, Config, FfmpegConverter, LoggingConfig,
};

/// Environment variable naming the config file when `--config` is absent.
const CONFIG_ENV: &str = "TRANSCODER_CONFIG";

#[derive(Debug, Parser)]
#[command(
    name = "transcoder",
    version,
    about = "Probe, convert and thumbnail media files with ffmpeg"
)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print container and stream information.
    Probe {
        input: PathBuf,
        /// Print the raw probe result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Convert a file according to a JSON or TOML conversion spec.
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Conversion spec file (.json or .toml).
        #[arg(long)]
        spec: PathBuf,
        /// Print one JSON progress event per line instead of a progress bar.
        #[arg(long)]
        json: bool,
    },
    /// Extract a single still frame.
    Thumbnail {
        input: PathBuf,
        output: PathBuf,
        /// Offset into the input, in seconds.
        #[arg(long, default_value_t = 0.0)]
        time: f64,
        /// Frame size as WIDTHxHEIGHT.
        #[arg(long)]
        size: Option<String>,
        /// JPEG quality, 2 (best) to 31 (worst).
        #[arg(long)]
        quality: Option<u32>,
    },
    /// Check that ffmpeg/ffprobe run and report missing encoders.
    Check,
    /// List the known formats and codecs.
    Formats,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var(CONFIG_ENV).ok().map(PathBuf::from));

    let config = match &config_path {
        Some(path) => load_config(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => load_default_config().context("Failed to load default config")?,
    };

    init_logging(&config.logging);

    match &config_path {
        Some(path) => info!("Loaded configuration from {:?}", path),
        None => info!("Using default configuration"),
    }

    validate_config(&config).context("Configuration validation failed")?;

    let converter = build_converter(&config)?;

    match cli.command {
        Command::Probe { input, json } => commands::probe(&converter, &input, json).await,
        Command::Convert {
            input,
            output,
            spec,
            json,
        } => commands::convert(&converter, &input, &output, &spec, json).await,
        Command::Thumbnail {
            input,
            output,
            time,
            size,
            quality,
        } => commands::thumbnail(&converter, &input, &output, time, size.as_deref(), quality).await,
        Command::Check => commands::check(&converter).await,
        Command::Formats => {
            commands::formats(converter.registry());
            Ok(())
        }
    }
}

fn init_logging(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));

    // Logs go to stderr so probe/convert output on stdout stays parseable.
    let registry = tracing_subscriber::registry().with(filter);
    if logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn build_converter(config: &Config) -> Result<FfmpegConverter> {
    let converter = FfmpegConverter::from_config(config.converter.clone())
        .context("Failed to load codec registry")?;
    info!(
        ffmpeg = %config.converter.ffmpeg_path.display(),
        ffprobe = %config.converter.ffprobe_path.display(),
        "Converter ready"
    );
    Ok(converter)
}
