//! MaMoNet multi-label classifier CLI
//!
//! Entry point for training the network on a labelled image directory and for
//! classifying single images with a persisted model.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{error, info};

use mamonet::backend::{backend_name, default_device, DefaultBackend, TrainingBackend};
use mamonet::utils::logging::{init_logging, LogConfig};
use mamonet::utils::{format_duration, format_number};
use mamonet::{run_training, MamonetError, Predictor, RunConfig};

/// Exit status when training succeeded but its outputs could not be written
const EXIT_PERSIST: u8 = 3;

/// MaMoNet multi-label image classification
///
/// Trains a convolutional network that predicts several independent labels
/// per image, using the Burn framework.
#[derive(Parser, Debug)]
#[command(name = "mamonet")]
#[command(version = "0.1.0")]
#[command(about = "Multi-label image classification with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true, default_value = "false")]
    verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train the network and persist model, vocabulary and plot
    Train {
        /// JSON run configuration (defaults are used when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Dataset root containing one directory per label combination
        #[arg(short, long)]
        dataset: Option<PathBuf>,

        /// Output path for the model artifact
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// Output path for the label vocabulary
        #[arg(short, long)]
        labelbin: Option<PathBuf>,

        /// Output path for the loss/accuracy plot
        #[arg(short, long)]
        plot: Option<PathBuf>,

        /// Optional output path for the per-epoch history JSON
        #[arg(long)]
        history: Option<PathBuf>,

        /// Number of training epochs
        #[arg(short, long)]
        epochs: Option<usize>,

        /// Batch size for training
        #[arg(short, long)]
        batch_size: Option<usize>,

        /// Random seed for reproducibility
        #[arg(long)]
        seed: Option<u64>,

        /// Initial learning rate
        #[arg(long)]
        learning_rate: Option<f64>,
    },

    /// Classify a single image with a trained model
    Classify {
        /// Path to the model artifact
        #[arg(short, long)]
        model: PathBuf,

        /// Path to the label vocabulary
        #[arg(short, long)]
        labelbin: PathBuf,

        /// Image to classify
        #[arg(short, long)]
        image: PathBuf,

        /// Number of labels to show
        #[arg(short, long, default_value = "5")]
        top: usize,
    },

    /// Write the default run configuration to a file
    InitConfig {
        /// Destination JSON file
        path: PathBuf,
    },
}

/// Overrides collected from `train` flags
#[derive(Debug, Default)]
struct TrainOverrides {
    dataset: Option<PathBuf>,
    model: Option<PathBuf>,
    labelbin: Option<PathBuf>,
    plot: Option<PathBuf>,
    history: Option<PathBuf>,
    epochs: Option<usize>,
    batch_size: Option<usize>,
    seed: Option<u64>,
    learning_rate: Option<f64>,
}

impl TrainOverrides {
    fn apply(self, config: &mut RunConfig) {
        if let Some(dataset) = self.dataset {
            config.dataset_dir = dataset;
        }
        if let Some(model) = self.model {
            config.output.model_path = model;
        }
        if let Some(labelbin) = self.labelbin {
            config.output.label_path = labelbin;
        }
        if let Some(plot) = self.plot {
            config.output.plot_path = plot;
        }
        if self.history.is_some() {
            config.output.history_path = self.history;
        }
        if let Some(epochs) = self.epochs {
            config.epochs = epochs;
        }
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(seed) = self.seed {
            config.seed = seed;
        }
        if let Some(learning_rate) = self.learning_rate {
            config.learning_rate = learning_rate;
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            let persistence = e
                .downcast_ref::<MamonetError>()
                .is_some_and(MamonetError::is_persistence);
            if persistence {
                ExitCode::from(EXIT_PERSIST)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Train {
            config,
            dataset,
            model,
            labelbin,
            plot,
            history,
            epochs,
            batch_size,
            seed,
            learning_rate,
        } => {
            let overrides = TrainOverrides {
                dataset,
                model,
                labelbin,
                plot,
                history,
                epochs,
                batch_size,
                seed,
                learning_rate,
            };
            cmd_train(config.as_deref(), overrides)
        }

        Commands::Classify {
            model,
            labelbin,
            image,
            top,
        } => cmd_classify(&model, &labelbin, &image, top),

        Commands::InitConfig { path } => cmd_init_config(&path),
    }
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ==============================================================
   MaMoNet - Multi-label Image Classification
   Burn + Rust
 ==============================================================
  "#
        .green()
    );
}

fn cmd_train(config_path: Option<&Path>, overrides: TrainOverrides) -> Result<()> {
    let mut config = match config_path {
        Some(path) => RunConfig::load(path)?,
        None => RunConfig::default(),
    };
    overrides.apply(&mut config);

    println!("{}", "Training Configuration".cyan().bold());
    println!("  Dataset:        {:?}", config.dataset_dir);
    println!("  Image:          {}", config.image);
    println!("  Epochs:         {}", config.epochs);
    println!("  Batch size:     {}", config.batch_size);
    println!("  Learning rate:  {}", config.learning_rate);
    println!("  Seed:           {}", config.seed);
    println!("  Backend:        {}", backend_name());
    println!();

    let start = Instant::now();
    let report = run_training::<TrainingBackend>(&config, default_device())?;

    println!();
    println!("{}", "Training Complete".green().bold());
    println!(
        "  Samples:        {} ({} train / {} test)",
        format_number(report.num_samples),
        format_number(report.train_samples),
        format_number(report.test_samples)
    );
    println!("  Labels:         {}", report.classes.join(", "));
    if let Some(acc) = report.final_val_accuracy() {
        println!("  Val accuracy:   {:.2}%", acc * 100.0);
    }
    println!("  Duration:       {}", format_duration(start.elapsed()));
    println!("  Model:          {:?}", report.artifacts.model_path);
    println!("  Labels file:    {:?}", report.artifacts.label_path);
    println!("  Plot:           {:?}", report.artifacts.plot_path);

    Ok(())
}

fn cmd_classify(model: &Path, labelbin: &Path, image: &Path, top: usize) -> Result<()> {
    info!("Loading model from {:?}", model);
    let predictor = Predictor::<DefaultBackend>::load(model, labelbin, default_device())?;
    let metadata = predictor.metadata();
    info!(
        "Model trained for {} epochs on {} ({}), {} labels",
        metadata.epochs,
        metadata.backend,
        metadata.trained_at,
        predictor.classes().len()
    );

    let prediction = predictor
        .predict_image(image)
        .with_context(|| format!("classifying {:?}", image))?;

    println!("{}", "Prediction".cyan().bold());
    print!("{}", prediction.display(top));

    let labels = prediction.predicted_labels();
    if labels.is_empty() {
        println!("{}", "No label above 50%".yellow());
    } else {
        println!("Predicted labels: {}", labels.join(", ").green());
    }

    Ok(())
}

fn cmd_init_config(path: &Path) -> Result<()> {
    RunConfig::default().save(path)?;
    println!("Wrote default configuration to {:?}", path);
    Ok(())
}
