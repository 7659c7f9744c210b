use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{info, warn};
use rollcall::{config, FaceService, SidecarAnalyzer};
use serde::Serialize;

#[derive(Parser)]
#[command(name = "rollcall")]
#[command(version, about = "Face roster: enroll identities and recognize faces")]
struct Cli {
    /// Config file (defaults to the compiled-in location)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List identities in the dataset and whether they have an embedding
    List,
    /// Recompute all embeddings from the dataset directory
    Recompute,
    /// Enroll an identity from one or more images
    Enroll {
        /// Identity name
        #[arg(short, long)]
        name: String,
        /// Images to analyze; they are not copied into the dataset, so keep
        /// them under <dataset_dir>/<name>/ to survive `recompute`
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
    /// Recognize the faces in an image
    Recognize {
        image: PathBuf,
        /// Override the configured threshold
        #[arg(short, long)]
        threshold: Option<f32>,
    },
    /// Detect faces in an image
    Detect { image: PathBuf },
    /// Open config file in editor
    Config,
}

fn main() -> Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .format_timestamp(None)
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::List => {
            let service = FaceService::open(&cfg, SidecarAnalyzer::new())?;
            print_json(&service.list()?)
        }
        Commands::Recompute => {
            let service = FaceService::new(&cfg, SidecarAnalyzer::new());
            let report = service.recompute_all()?;
            info!("✓ Recomputed {} embeddings", report.total_embeddings);
            print_json(&report)
        }
        Commands::Enroll { name, images } => {
            let service = FaceService::open(&cfg, SidecarAnalyzer::new())?;
            let report = service.enroll(&name, &images)?;
            if !report.computed {
                anyhow::bail!("No face detected in any image for {}", name);
            }
            if report.persisted {
                info!("✓ Enrolled {} from {} image(s)", name, report.usable);
            } else {
                warn!("Enrolled {} in memory only; saving failed", name);
            }
            print_json(&report)
        }
        Commands::Recognize { image, threshold } => {
            let service = FaceService::open(&cfg, SidecarAnalyzer::new())?;
            let threshold = threshold.unwrap_or(service.threshold());
            print_json(&service.recognize(&image, threshold)?)
        }
        Commands::Detect { image } => {
            let service = FaceService::new(&cfg, SidecarAnalyzer::new());
            print_json(&service.detect(&image)?)
        }
        Commands::Config => open_config(cli.config),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn open_config(path: Option<PathBuf>) -> Result<()> {
    let config_path = path.unwrap_or_else(|| config::CONFIG_PATH.to_path_buf());
    let editor = env::var("EDITOR").unwrap_or_else(|_| "vi".to_string());

    info!("Opening config file: {:?}", config_path);

    let status = std::process::Command::new(editor)
        .arg(&config_path)
        .status()
        .context("Failed to open editor")?;

    if !status.success() {
        anyhow::bail!("Editor exited with non-zero status");
    }

    Ok(())
}
