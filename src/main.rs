use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{error, info, Level};

use meterread::config::ReaderConfig;
use meterread::workspace::load_image;
use meterread::{
    DigitClassifier, DigitNormalizer, MeterReader, MeterTools, Observation, ReadOutcome,
    RtenDigitModel, ScratchWorkspace, WindowDetector, YoloWindowModel,
};

#[derive(Parser)]
#[command(name = "meterread")]
#[command(about = "Read the five-digit counter of water meter photos")]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Window detector model (.rten), overrides the config
    #[arg(long, global = true, value_name = "PATH")]
    window_model: Option<PathBuf>,

    /// Digit classifier model (.rten), overrides the config
    #[arg(long, global = true, value_name = "PATH")]
    digit_model: Option<PathBuf>,

    /// Scratch directory for window crops, wiped at startup
    #[arg(long, global = true, value_name = "DIR")]
    scratch_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read one meter image, retrying detection at lower thresholds
    Read {
        #[arg(value_name = "IMAGE")]
        image_path: PathBuf,

        /// Save normalization steps to directory (must be empty)
        #[arg(long, value_name = "DIR")]
        debug_out: Option<PathBuf>,
    },
    /// Serve tool calls as JSON lines on stdin/stdout
    Tools,
    /// Normalize a single window crop to a 28x28 bitmap
    Normalize {
        #[arg(value_name = "CROP")]
        crop: PathBuf,

        #[arg(value_name = "OUT")]
        out: PathBuf,

        /// Save normalization steps to directory (must be empty)
        #[arg(long, value_name = "DIR")]
        debug_out: Option<PathBuf>,
    },
}

/// One line of the tool protocol
#[derive(Deserialize)]
struct ToolRequest {
    tool: String,
    #[serde(default)]
    args: Value,
}

type Tools = MeterTools<YoloWindowModel, RtenDigitModel>;

fn main() -> Result<()> {
    let args = Cli::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .init();

    let mut config = ReaderConfig::load(args.config.as_deref())?;
    if let Some(path) = args.window_model {
        config.models.window_model = path;
    }
    if let Some(path) = args.digit_model {
        config.models.digit_model = path;
    }
    if let Some(dir) = args.scratch_dir {
        config.scratch.dir = dir;
    }

    match args.command {
        Command::Read { image_path, debug_out } => run_read(&config, image_path, debug_out),
        Command::Tools => run_tools(&config),
        Command::Normalize { crop, out, debug_out } => run_normalize(&config, crop, out, debug_out),
    }
}

fn build_tools(config: &ReaderConfig, debug_out: Option<PathBuf>) -> Result<Tools> {
    let mut normalizer = DigitNormalizer::new(&config.normalize);
    if let Some(dir) = debug_out {
        normalizer = normalizer.with_debug(dir)?;
    }

    let models = &config.models;
    let window_model = YoloWindowModel::load(&models.window_model, models.window_input_size, models.iou_threshold)?;
    let digit_model = RtenDigitModel::load(&models.digit_model, models.digit_channels_last, models.digit_softmax)?;

    let workspace = ScratchWorkspace::create(&config.scratch.dir)?;
    info!("Scratch workspace at {}", workspace.root().display());

    Ok(MeterTools::new(
        WindowDetector::new(window_model, workspace),
        DigitClassifier::new(digit_model, normalizer),
    ))
}

fn run_read(config: &ReaderConfig, image_path: PathBuf, debug_out: Option<PathBuf>) -> Result<()> {
    let tools = build_tools(config, debug_out)?;
    let reader = MeterReader::from_config(tools, &config.retry)?;

    let outcome = reader.read(&image_path)?;

    println!("\n=== Detection Attempts ===");
    for (i, attempt) in outcome.attempts().iter().enumerate() {
        println!("  {}. threshold {} → {} windows", i + 1, attempt.threshold, attempt.found);
    }

    match outcome {
        ReadOutcome::Done { reading, predictions, .. } => {
            println!("\n=== Meter Reading ===");
            println!("Reading: {}", reading.digits);
            println!("Reliability score: {:.3}", reading.reliability_score);
            for (i, prediction) in predictions.iter().enumerate() {
                match &prediction.error {
                    Some(err) => println!("  Digit {}: {} ({})", i + 1, prediction.digit, err),
                    None => println!("  Digit {}: {} - confidence: {:.2}", i + 1, prediction.digit, prediction.confidence),
                }
            }
        }
        ReadOutcome::Aborted { .. } => {
            println!("\nNo threshold produced exactly 5 windows; the meter could not be read.");
        }
    }

    Ok(())
}

fn run_tools(config: &ReaderConfig) -> Result<()> {
    let tools = build_tools(config, None)?;
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout().lock();

    for line in stdin.lock().lines() {
        let line = line.context("Failed to read tool request")?;
        if line.trim().is_empty() {
            continue;
        }

        let observation = match serde_json::from_str::<ToolRequest>(&line) {
            Ok(request) => tools.call(&request.tool, &request.args),
            Err(e) => {
                error!("Malformed tool request: {}", e);
                Observation::Error {
                    kind: "malformed_request".to_string(),
                    message: format!("Request must be {{\"tool\": ..., \"args\": ...}}: {}", e),
                    fatal: false,
                }
            }
        };

        writeln!(stdout, "{}", observation.to_json())?;
        stdout.flush()?;
    }

    Ok(())
}

fn run_normalize(config: &ReaderConfig, crop: PathBuf, out: PathBuf, debug_out: Option<PathBuf>) -> Result<()> {
    let mut normalizer = DigitNormalizer::new(&config.normalize);
    if let Some(dir) = debug_out {
        normalizer = normalizer.with_debug(dir)?;
    }

    let image = load_image(&crop)?;
    let name = crop
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "crop".to_string());
    let digit = normalizer.normalize_named(&image, &name)?;

    digit
        .image()
        .save(&out)
        .with_context(|| format!("Failed to write {}", out.display()))?;

    if digit.is_blank() {
        println!("No digit found in {}; wrote a blank bitmap to {}", crop.display(), out.display());
    } else {
        println!("Wrote normalized digit to {}", out.display());
    }
    Ok(())
}
