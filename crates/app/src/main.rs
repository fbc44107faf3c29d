use anyhow::Context;
use atlas_foundation::PipelineConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod runtime;

use runtime::Runtime;

#[derive(Parser)]
#[command(name = "atlas-voice", version, about = "Streaming avatar speech pipeline")]
struct Cli {
    /// TOML pipeline configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Speech server WebSocket URL (overrides the config file).
    #[arg(long, global = true)]
    server_url: Option<String>,

    /// Synthesis voice identifier (overrides the config file).
    #[arg(long, global = true)]
    voice: Option<String>,

    /// Recognition language (overrides the config file).
    #[arg(long, global = true)]
    language: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Speak the given text; with no text, stream stdin line by line.
    Speak { text: Option<String> },
    /// Capture microphone audio and print transcripts until interrupted.
    Listen,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("reading config file {}", path.display()))?;
            let parsed: PipelineConfig = toml::from_str(&raw)
                .with_context(|| format!("parsing config file {}", path.display()))?;
            let local = PipelineConfig::local();
            let mut parsed = parsed;
            if parsed.server_url.is_empty() {
                parsed.server_url = local.server_url;
            }
            if parsed.voice.is_empty() {
                parsed.voice = local.voice;
            }
            if parsed.language.is_empty() {
                parsed.language = local.language;
            }
            parsed
        }
        None => PipelineConfig::local(),
    };

    if let Some(url) = &cli.server_url {
        config.server_url = url.clone();
    }
    if let Some(voice) = &cli.voice {
        config.voice = voice.clone();
    }
    if let Some(language) = &cli.language {
        config.language = language.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    tracing::info!(server_url = %config.server_url, voice = %config.voice, "starting atlas-voice");

    let runtime = Runtime::new(config);
    match cli.command {
        Command::Speak { text: Some(text) } => runtime.speak(&text).await?,
        Command::Speak { text: None } => runtime.speak_stdin().await?,
        Command::Listen => runtime.listen().await?,
    }
    Ok(())
}
