use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use fact_shorts::config::Config;
use fact_shorts::{init, pipeline};

#[derive(Parser)]
#[command(name = "fact-shorts")]
#[command(about = "Turn encyclopedia topics into narrated vertical short videos")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Pipeline settings file
    #[arg(long, default_value = "config.json", global = true)]
    config: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a story and render it, COUNT times
    Run {
        #[arg(default_value_t = 1)]
        count: usize,
    },

    /// Write one story pair into the output folder
    Write,

    /// Render a video from the newest story pair
    Render,

    /// Render every story in a story-inputs file
    Batch { file: PathBuf },

    /// Narration audio for TEXT in a new run directory
    Tts { text: String },

    /// Cut the background clip in the newest run directory
    Crop,

    /// Generate images from a prompts JSON file into the newest run directory
    Images { prompts: PathBuf },

    /// Overlay the images onto the background in the newest run directory
    Compose,
}

async fn dispatch(cfg: &Config, command: Commands) -> Result<bool> {
    match command {
        Commands::Run { count } => Ok(pipeline::run_pipeline(cfg, count).await?.all_succeeded()),
        Commands::Write => {
            let story = pipeline::write_only(cfg).await?;
            tracing::info!("Wrote story on {}", story.topic);
            Ok(true)
        }
        Commands::Render => {
            pipeline::render_latest(cfg).await?;
            Ok(true)
        }
        Commands::Batch { file } => Ok(pipeline::run_batch(cfg, &file).await?.all_succeeded()),
        Commands::Tts { text } => {
            pipeline::stage_tts(cfg, &text).await?;
            Ok(true)
        }
        Commands::Crop => {
            pipeline::stage_crop(cfg).await?;
            Ok(true)
        }
        Commands::Images { prompts } => {
            pipeline::stage_images(cfg, &prompts).await?;
            Ok(true)
        }
        Commands::Compose => {
            pipeline::stage_compose(cfg).await?;
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config).await?;

    init::ensure_directories(&cfg).await?;
    if !init::check_ffmpeg().await {
        tracing::warn!("FFmpeg not found in PATH. Please install FFmpeg.");
    }

    let ok = match dispatch(&cfg, cli.command).await {
        Ok(ok) => ok,
        Err(err) => {
            tracing::error!("{:#}", err);
            false
        }
    };
    std::process::exit(if ok { 0 } else { 1 });
}
