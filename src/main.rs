//! LungScan CLI
//!
//! Command-line entry point for classifying chest X-rays, benchmarking the
//! prediction pipeline and writing initial weight artifacts.

use std::io::Cursor;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use image::{DynamicImage, ImageFormat, Luma};
use tracing::info;

use lungscan::backend::{backend_name, default_device, DefaultBackend};
use lungscan::inference::benchmark::{run_benchmark, BenchmarkConfig};
use lungscan::inference::preprocess::ResizeFilter;
use lungscan::inference::{BENCHMARK_ITERATIONS, WARMUP_ITERATIONS};
use lungscan::model::classifier::{save_artifact, LungClassifierConfig};
use lungscan::utils::format_number;
use lungscan::utils::logging::{init_logging, LogConfig};
use lungscan::{ClassifierVariant, PredictionService, ServiceConfig};

/// Chest X-ray classification with Burn
///
/// Classifies images into Normal, Lung Opacity and Viral Pneumonia using an
/// InceptionV3 backbone with a squeeze-and-excitation head.
#[derive(Parser, Debug)]
#[command(name = "lungscan")]
#[command(author = "Warre Snaet")]
#[command(version)]
#[command(about = "Chest X-ray classification with Burn", long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, default_value = "false")]
    verbose: bool,

    /// Service configuration file (JSON)
    #[arg(short, long, env = "LUNGSCAN_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

/// Classifier selection shared by `infer` and `benchmark`
#[derive(clap::Args, Debug)]
struct ModelArgs {
    /// Path to the weight file (.mpk)
    #[arg(short, long, env = "LUNGSCAN_WEIGHTS")]
    weights: Option<PathBuf>,

    /// Use the deterministic mock classifier
    #[arg(long, default_value = "false")]
    mock: bool,

    /// Seed of the mock classifier
    #[arg(long)]
    seed: Option<u64>,

    /// Fall back to the mock when the weights cannot be loaded
    #[arg(long, default_value = "false")]
    allow_mock_fallback: bool,

    /// Resize with nearest-neighbour instead of bilinear interpolation
    #[arg(long, default_value = "false")]
    nearest: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Classify a single image
    Infer {
        /// Path to the input image
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        model: ModelArgs,

        /// Print the result as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },

    /// Benchmark classification latency on a synthetic image
    Benchmark {
        #[command(flatten)]
        model: ModelArgs,

        /// Number of timed iterations
        #[arg(short = 'n', long, default_value_t = BENCHMARK_ITERATIONS)]
        iterations: usize,

        /// Number of warmup iterations
        #[arg(long, default_value_t = WARMUP_ITERATIONS)]
        warmup: usize,

        /// Optional image to benchmark with instead of the synthetic one
        #[arg(long)]
        image: Option<PathBuf>,

        /// Output JSON file for benchmark results
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a randomly initialized weight artifact and its config
    InitWeights {
        /// Output directory
        #[arg(short, long, default_value = "models")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::verbose()
    } else {
        LogConfig::default()
    };

    let _ = init_logging(&log_config);

    print_banner();

    match cli.command {
        Commands::Infer { input, model, json } => {
            let config = service_config(cli.config.as_deref(), &model)?;
            cmd_infer(&input, &config, json)?;
        }

        Commands::Benchmark {
            model,
            iterations,
            warmup,
            image,
            output,
        } => {
            let config = service_config(cli.config.as_deref(), &model)?;
            let bench = BenchmarkConfig {
                warmup_iterations: warmup,
                iterations,
                verbose: cli.verbose,
                output_path: output,
            };
            cmd_benchmark(&config, bench, image.as_deref())?;
        }

        Commands::InitWeights { output } => {
            cmd_init_weights(&output)?;
        }
    }

    Ok(())
}

fn print_banner() {
    println!(
        "{}",
        r#"
 ==================================================================
   LungScan
   Chest X-ray Classification with Burn + Rust
 ==================================================================
  "#
        .green()
    );
}

/// Config file (or defaults) overridden by command-line flags
fn service_config(path: Option<&Path>, args: &ModelArgs) -> Result<ServiceConfig> {
    let mut config = match path {
        Some(path) => ServiceConfig::load(path)
            .with_context(|| format!("Failed to load config from {:?}", path))?,
        None => ServiceConfig::default(),
    };

    if let Some(weights) = &args.weights {
        config.classifier = ClassifierVariant::Real;
        config.weights_path = weights.clone();
    }
    if args.mock {
        config.classifier = ClassifierVariant::Mock;
    }
    if let Some(seed) = args.seed {
        config.mock_seed = seed;
    }
    if args.allow_mock_fallback {
        config.allow_mock_fallback = true;
    }
    if args.nearest {
        config.preprocess.filter = ResizeFilter::Nearest;
    }

    config.validate()?;
    Ok(config)
}

fn build_service(config: &ServiceConfig) -> Result<PredictionService> {
    println!("{}", "Loading model...".cyan());
    let service = PredictionService::from_config(config).context("Failed to load classifier")?;

    let handle = service.handle();
    if handle.is_fallback() {
        println!(
            "{} real model unavailable, serving mock predictions",
            "Warning:".yellow()
        );
    }
    println!("  Classifier: {}", handle.variant());
    println!("  Backend:    {}", backend_name());
    println!();
    Ok(service)
}

fn cmd_infer(input: &Path, config: &ServiceConfig, json: bool) -> Result<()> {
    if !input.exists() {
        bail!("Input path not found: {:?}", input);
    }

    let service = build_service(config)?;
    let bytes = std::fs::read(input).with_context(|| format!("Failed to read {:?}", input))?;

    println!("{}", "Running inference...".cyan());
    let result = service.classify(&bytes)?;
    info!(label = %result.label, confidence = result.confidence, "Inference complete");

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        println!("Image: {:?}", input);
        println!("{}", result.display());
    }

    Ok(())
}

/// Gradient test image so the benchmark needs no input file
fn synthetic_xray() -> Result<Vec<u8>> {
    let img = image::GrayImage::from_fn(512, 512, |x, y| Luma([((x + y) / 4 % 256) as u8]));
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img).write_to(&mut buf, ImageFormat::Png)?;
    Ok(buf.into_inner())
}

fn cmd_benchmark(config: &ServiceConfig, bench: BenchmarkConfig, image: Option<&Path>) -> Result<()> {
    let service = build_service(config)?;

    let payload = match image {
        Some(path) => std::fs::read(path).with_context(|| format!("Failed to read {:?}", path))?,
        None => synthetic_xray()?,
    };

    println!(
        "{} {} iterations (+{} warmup)",
        "Benchmarking".cyan().bold(),
        bench.iterations,
        bench.warmup_iterations
    );

    let result = run_benchmark(&service, &payload, bench)?;
    println!();
    println!("{}", result);

    if let Some(path) = &result.config.output_path {
        println!("{} {:?}", "Results saved to".green(), path);
    }

    Ok(())
}

fn cmd_init_weights(output: &Path) -> Result<()> {
    let config = LungClassifierConfig::new();
    config.validate()?;

    println!("{}", "Initializing model...".cyan());
    let model = config.init::<DefaultBackend>(&default_device());
    let num_params = burn::module::Module::num_params(&model);

    let weights = save_artifact(model, &config, output)?;

    println!("  Parameters: {}", format_number(num_params));
    println!("  Weights:    {:?}", weights);
    println!(
        "{} weights are randomly initialized and produce meaningless predictions",
        "Note:".yellow()
    );

    Ok(())
}
