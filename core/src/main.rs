//! CLI entry point for modelbridge-rs.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use modelbridge_rs::cli::{Cli, Commands, ModelArgs};
use modelbridge_rs::config::Config;
use modelbridge_rs::ModelBridge;

/// Operands read by the `add` subcommand.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Operands {
    Single { a: Vec<f32>, b: Vec<f32> },
    Batch { a: Vec<Vec<f32>>, b: Vec<Vec<f32>> },
}

fn print_json(value: &Value, format: &str) -> Result<()> {
    if format == "pretty" {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        println!("{}", serde_json::to_string(value)?);
    }
    Ok(())
}

/// Load the config file (if any) and apply command-line overrides.
fn load_config(args: &ModelArgs) -> Result<Config> {
    let mut config = if let Some(config_path) = &args.config {
        Config::from_yaml_file(config_path)
            .with_context(|| format!("Failed to load config: {}", config_path.display()))?
    } else {
        Config::default()
    };

    if let Some(model) = &args.model {
        config.model.path = Some(model.clone());
    }
    if let Some(transport) = &args.transport {
        config.model.transport = transport.parse()?;
    }
    if let Some(library) = &args.library {
        config.model.library = Some(library.clone());
    }
    Ok(config)
}

fn open_bridge(config: &Config) -> Result<ModelBridge> {
    let path = config
        .model
        .path
        .as_ref()
        .context("No model path given (use --model or model.path in the config)")?;
    info!(
        "Loading model: {} ({} transport)",
        path.display(),
        config.model.transport
    );
    let transport = config.model.transport()?;
    let bridge = ModelBridge::open(path, transport)
        .with_context(|| format!("Failed to load model: {}", path.display()))?;
    info!("Model loaded successfully");
    Ok(bridge)
}

fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    let cli = Cli::parse_args();
    let config = load_config(&cli.model)?;

    match cli.command {
        Commands::Add { input, format } => {
            let bridge = open_bridge(&config)?;

            info!("Loading input: {}", input.display());
            let operands: Operands = serde_json::from_str(
                &fs::read_to_string(&input)
                    .with_context(|| format!("Failed to read input: {}", input.display()))?,
            )
            .context("Input must have matching 'a' and 'b' arrays")?;

            let output = match operands {
                Operands::Single { a, b } => {
                    let result = bridge.add(&a, &b)?;
                    serde_json::json!({ "len": result.len(), "result": result })
                }
                Operands::Batch { a, b } => {
                    let results = bridge.batch_add(&a, &b)?;
                    info!("Batch complete: {} items", results.len());
                    serde_json::json!({ "batch": results.len(), "results": results })
                }
            };
            bridge.release();
            print_json(&output, &format)?;
        }

        Commands::Validate { tolerance, sizes } => {
            let tolerance = tolerance.unwrap_or(config.validate.tolerance);
            let sizes = sizes.unwrap_or_else(|| config.validate.sizes.clone());
            let bridge = open_bridge(&config)?;

            let outcomes = bridge.self_check(&sizes, tolerance)?;
            bridge.release();

            let failed = outcomes.iter().filter(|o| !o.passed).count();
            for outcome in &outcomes {
                println!(
                    "size {:>8} {:<7} {}",
                    outcome.size,
                    outcome.pattern,
                    if outcome.passed { "PASS" } else { "FAIL" }
                );
            }
            if failed > 0 {
                bail!("{} of {} validation cases failed", failed, outcomes.len());
            }
            println!("All {} validation cases passed", outcomes.len());
        }

        Commands::Benchmark {
            sizes,
            runs,
            compare,
            format,
        } => {
            let sizes = sizes.unwrap_or_else(|| config.benchmark.sizes.clone());
            let runs = runs.unwrap_or(config.benchmark.runs);
            let bridge = open_bridge(&config)?;

            let mut reports = Vec::with_capacity(sizes.len());
            for size in sizes {
                let report = if compare {
                    serde_json::to_value(bridge.compare(size, runs)?)?
                } else {
                    serde_json::to_value(bridge.benchmark(size, runs)?)?
                };
                reports.push(report);
            }
            bridge.release();
            print_json(&Value::Array(reports), &format)?;
        }

        Commands::Info => {
            println!("modelbridge-rs v{}", env!("CARGO_PKG_VERSION"));
            println!("transport: {}", config.model.transport);
            if let Some(library) = &config.model.library {
                println!("library: {}", library.display());
            }
            println!();

            // Try to load the model to verify it works
            let bridge = open_bridge(&config)?;
            println!("Model: {}", bridge.model_path().display());
            println!("Status: OK ({})", bridge.state());
            bridge.release();
        }
    }

    Ok(())
}
