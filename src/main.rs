//! `catemoji` CLI - Turn a selfie into a cat meme

mod cmd;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use catemoji::Config;

#[derive(Parser)]
#[command(name = "catemoji")]
#[command(about = "Your face + AI cat memes")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/catemoji/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print a JSON summary on stdout
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Make a meme from an image file
    Make {
        /// Face image (JPEG, PNG, GIF, WebP)
        image: PathBuf,

        /// Output directory for the PNG
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Snap a webcam frame and make a meme from it
    Camera {
        /// Camera device (e.g. /dev/video1, or an avfoundation index)
        #[arg(short, long)]
        device: Option<String>,

        /// Let the camera settle before capturing
        #[arg(long, default_value = "1000")]
        warmup_ms: u64,

        /// Output directory for the PNG
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate a caption for an expression label
    Caption {
        /// Expression label (happy, sad, surprised, angry, neutral, fearful, disgusted)
        label: String,
    },

    /// List expression labels with their fallback captions
    Labels,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Make { image, output } => {
            cmd::cmd_make(&config, &image, output, cli.json).await?;
        }
        Commands::Camera {
            device,
            warmup_ms,
            output,
        } => {
            cmd::cmd_camera(&config, device.as_deref(), warmup_ms, output, cli.json).await?;
        }
        Commands::Caption { label } => {
            cmd::cmd_caption(&config, &label, cli.json).await?;
        }
        Commands::Labels => {
            cmd::cmd_labels(&config, cli.json)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
