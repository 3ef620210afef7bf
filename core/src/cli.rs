//! Command-line interface for modelbridge-rs.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Call a precompiled native add model with validation and benchmarks.
#[derive(Parser, Debug)]
#[command(name = "modelbridge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub model: ModelArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug)]
pub struct ModelArgs {
    /// Path to the model artifact.
    ///
    /// Overrides `model.path` from the config file.
    #[arg(short, long, global = true)]
    pub model: Option<PathBuf>,

    /// Transport to load the model through (reference, raw, module).
    #[arg(short, long, global = true)]
    pub transport: Option<String>,

    /// Shared library for the raw and module transports.
    #[arg(short, long, global = true)]
    pub library: Option<PathBuf>,

    /// Path to an optional YAML config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Add two buffers, or two batches of buffers, read from a JSON file.
    ///
    /// Expected format: { "a": [...], "b": [...] } or
    /// { "a": [[...], ...], "b": [[...], ...] }.
    Add {
        /// Path to the input JSON file.
        #[arg(short, long)]
        input: PathBuf,

        /// Output format (json, pretty).
        #[arg(short, long, default_value = "json")]
        format: String,
    },

    /// Check model output against host-side sums for several input patterns.
    Validate {
        /// Absolute tolerance per element.
        #[arg(long)]
        tolerance: Option<f32>,

        /// Buffer sizes to check (comma separated).
        #[arg(long, value_delimiter = ',')]
        sizes: Option<Vec<usize>>,
    },

    /// Measure mean add latency over random inputs.
    Benchmark {
        /// Buffer sizes to benchmark (comma separated).
        #[arg(long, value_delimiter = ',')]
        sizes: Option<Vec<usize>>,

        /// Timed runs per size.
        #[arg(short, long)]
        runs: Option<usize>,

        /// Also time an in-process reference sum and report the speedup.
        #[arg(long)]
        compare: bool,

        /// Output format (json, pretty).
        #[arg(short, long, default_value = "json")]
        format: String,
    },

    /// Print version, transport and model load status.
    Info,
}

impl Cli {
    /// Parse command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
