use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use moodcam_core::{DetectorMode, ImageSource, OnnxEmotionDetector, Pipeline};
use moodcam_store::{HistoryStore, HISTORY_PAGE_SIZE};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "moodcam", about = "moodcam facial emotion analysis CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse a local image file and print the result as JSON
    Analyze {
        /// Image file (PNG, JPEG, ...)
        image: PathBuf,
        /// Operating point: fast (downscaled) or accurate (full resolution)
        #[arg(long, default_value = "fast")]
        mode: DetectorMode,
        /// Directory containing det_10g.onnx and emotion-ferplus-8.onnx
        #[arg(long)]
        model_dir: Option<PathBuf>,
    },
    /// Print the most recent persisted observations, newest first
    History {
        /// Path to the history database
        #[arg(long, default_value = "history.db")]
        db: PathBuf,
        /// Number of records to show
        #[arg(long, default_value_t = HISTORY_PAGE_SIZE)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            image,
            mode,
            model_dir,
        } => {
            let bytes = std::fs::read(&image)
                .with_context(|| format!("failed to read {}", image.display()))?;
            let model_dir = model_dir.unwrap_or_else(moodcam_core::default_model_dir);
            let detector = OnnxEmotionDetector::load(&model_dir, mode)
                .context("failed to load emotion detector")?;

            let mut pipeline = Pipeline::new(detector, mode.scale_factor());
            let result = pipeline
                .analyze(&ImageSource::Bytes(bytes))
                .with_context(|| format!("failed to analyse {}", image.display()))?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Commands::History { db, limit } => {
            if !db.exists() {
                anyhow::bail!("history database not found: {}", db.display());
            }
            let store = HistoryStore::open(&db)
                .await
                .with_context(|| format!("failed to open {}", db.display()))?;
            let records = store.recent(limit).await?;
            if records.is_empty() {
                eprintln!("No observations recorded");
            }
            println!("{}", serde_json::to_string_pretty(&records)?);
        }
    }

    Ok(())
}
