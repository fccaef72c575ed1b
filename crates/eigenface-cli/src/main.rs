use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use eigenface_core::{Classification, Progress, RecognitionContext, TrainedModel};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod gallery;

use config::{Config, Overrides};
use gallery::GalleryLoader;

/// Leading eigenvalues shown in the training summary.
const SUMMARY_EIGENVALUES: usize = 10;

#[derive(Parser)]
#[command(name = "eigenface", about = "Eigenface face recognition CLI")]
struct Cli {
    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train an eigenspace on a gallery folder and summarise it
    Train {
        /// Gallery root; sub-folder names become labels
        gallery: PathBuf,
        /// Write the average face as an image
        #[arg(long)]
        average_face: Option<PathBuf>,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// Train on a gallery, then classify a probe photo
    Probe {
        gallery: PathBuf,
        image: PathBuf,
        /// Print the classification as JSON
        #[arg(long)]
        json: bool,
    },
    /// Locate the face in a photo and save the resized crop
    Locate { image: PathBuf, out: PathBuf },
    /// Print the normalized 3-D feature chart as JSON
    Chart {
        gallery: PathBuf,
        /// Photo to add to the chart as the probe point
        #[arg(long)]
        probe: Option<PathBuf>,
    },
}

#[derive(Serialize)]
struct TrainSummary {
    samples: usize,
    labels: Vec<String>,
    components: usize,
    eigenvalues: Vec<f64>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    cli.overrides.apply(&mut config);
    tracing::debug!(?config, "configuration loaded");

    let loader = GalleryLoader::new(&config);
    let context = RecognitionContext::new(config.recognizer.clone());

    match cli.command {
        Commands::Train {
            gallery,
            average_face,
            json,
        } => {
            let model = train(&context, &loader, &gallery)?;
            if let Some(path) = average_face {
                model
                    .eigenspace()
                    .average_face()
                    .to_luma8()
                    .save(&path)
                    .with_context(|| format!("failed to write average face to {}", path.display()))?;
                tracing::info!(path = %path.display(), "average face written");
            }

            let summary = summarise(&model);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("samples:     {}", summary.samples);
                println!("labels:      {}", summary.labels.join(", "));
                println!("components:  {}", summary.components);
                println!("eigenvalues: {:?}", summary.eigenvalues);
            }
        }
        Commands::Probe {
            gallery,
            image,
            json,
        } => {
            train(&context, &loader, &gallery)?;
            let face = loader.load_face(&image)?;
            let result = context.classify(&face)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_classification(&image, &result);
            }
        }
        Commands::Locate { image, out } => {
            let photo = gallery::load_color(&image)?;
            let region = loader.locator().locate(&photo);
            println!(
                "face region: left={} top={} right={} bottom={} ({}x{})",
                region.left,
                region.top,
                region.right,
                region.bottom,
                region.width(),
                region.height()
            );
            loader
                .locator()
                .crop(&photo)
                .to_rgb_image()
                .save(&out)
                .with_context(|| format!("failed to write {}", out.display()))?;
        }
        Commands::Chart { gallery, probe } => {
            let model = train(&context, &loader, &gallery)?;
            let coefficients = match probe {
                Some(path) => Some(model.project(&loader.load_face(&path)?)?),
                None => None,
            };
            let points = model.store().project_to_3d(coefficients.as_deref());
            println!("{}", serde_json::to_string_pretty(&points)?);
        }
    }

    Ok(())
}

/// Load `gallery` and train on the dedicated training thread, logging progress.
fn train(context: &RecognitionContext, loader: &GalleryLoader, gallery: &Path) -> Result<Arc<TrainedModel>> {
    let samples = loader.load_dir(gallery)?;
    let (handle, progress) = context.spawn_training(samples);

    for event in progress {
        match event {
            Progress::Stage(stage) => tracing::info!(%stage, "training"),
            Progress::Finished => tracing::debug!("training finished"),
        }
    }

    RecognitionContext::wait(handle).context("training failed")
}

fn summarise(model: &TrainedModel) -> TrainSummary {
    let space = model.eigenspace();
    TrainSummary {
        samples: model.store().len(),
        labels: model
            .store()
            .labels()
            .iter()
            .map(|(_, label)| label.to_string())
            .collect(),
        components: model.components(),
        eigenvalues: space
            .eigenvalues()
            .iter()
            .take(SUMMARY_EIGENVALUES)
            .copied()
            .collect(),
    }
}

fn print_classification(image: &Path, result: &Classification) {
    println!("probe:    {}", image.display());
    println!("nearest:  {}", result.nearest.as_deref().unwrap_or("-"));
    match &result.tally {
        Some(tally) => {
            let votes: Vec<String> = tally
                .votes
                .iter()
                .map(|(label, count)| format!("{label}={count}"))
                .collect();
            println!(
                "majority: {} ({} of {} neighbours: {})",
                tally.majority,
                tally
                    .votes
                    .iter()
                    .find(|(label, _)| *label == tally.majority)
                    .map(|(_, count)| *count)
                    .unwrap_or(0),
                tally.neighbours,
                votes.join(", ")
            );
        }
        None => println!("majority: -"),
    }
    for (rank, (label, distance)) in result.ranking.iter().enumerate() {
        println!("  {:>2}. {label:<16} {distance:.3}", rank + 1);
    }
}
