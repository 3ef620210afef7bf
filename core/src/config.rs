//! Configuration types for modelbridge-rs.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::Deserialize;

use crate::bridge::DEFAULT_TOLERANCE;
use crate::error::{BridgeError, Result};
use crate::native::{ModuleTransport, NativeTransport, RawAbiTransport, ReferenceTransport};

/// Environment variable consulted when a native transport has no library configured.
pub const NATIVE_LIB_ENV: &str = "MODELBRIDGE_NATIVE_LIB";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    /// Model configuration.
    #[serde(default)]
    pub model: ModelConfig,

    /// Validation configuration.
    #[serde(default)]
    pub validate: ValidateConfig,

    /// Benchmark configuration.
    #[serde(default)]
    pub benchmark: BenchmarkConfig,
}

/// Which native transport to load the model through.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// In-process host addition.
    #[default]
    Reference,
    /// Three-call kernel library (load, run, release).
    Raw,
    /// Module library with a shaped-tensor forward call.
    Module,
}

impl FromStr for TransportKind {
    type Err = BridgeError;

    /// Parse a transport name like "reference", "raw" or "module".
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "reference" | "ref" => Ok(Self::Reference),
            "raw" => Ok(Self::Raw),
            "module" => Ok(Self::Module),
            other => Err(BridgeError::config(format!("Invalid transport: {}", other))),
        }
    }
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reference => write!(f, "reference"),
            Self::Raw => write!(f, "raw"),
            Self::Module => write!(f, "module"),
        }
    }
}

/// Model configuration.
#[derive(Debug, Default, Deserialize)]
pub struct ModelConfig {
    /// Path to the model artifact.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Transport to load the model through.
    #[serde(default)]
    pub transport: TransportKind,

    /// Shared library for the `raw` and `module` transports.
    #[serde(default)]
    pub library: Option<PathBuf>,
}

impl ModelConfig {
    /// Build the configured transport.
    ///
    /// Native transports fall back to [`NATIVE_LIB_ENV`] when no library is set.
    pub fn transport(&self) -> Result<Arc<dyn NativeTransport>> {
        match self.transport {
            TransportKind::Reference => Ok(Arc::new(ReferenceTransport::new())),
            TransportKind::Raw => Ok(Arc::new(RawAbiTransport::open(self.library_path()?)?)),
            TransportKind::Module => Ok(Arc::new(ModuleTransport::open(self.library_path()?)?)),
        }
    }

    fn library_path(&self) -> Result<PathBuf> {
        if let Some(library) = &self.library {
            return Ok(library.clone());
        }
        match std::env::var(NATIVE_LIB_ENV) {
            Ok(path) if !path.trim().is_empty() => Ok(PathBuf::from(path.trim())),
            _ => Err(BridgeError::config(format!(
                "the {} transport needs a library (set model.library or {})",
                self.transport, NATIVE_LIB_ENV
            ))),
        }
    }
}

/// Validation configuration.
#[derive(Debug, Deserialize)]
pub struct ValidateConfig {
    /// Absolute tolerance per element.
    #[serde(default = "default_tolerance")]
    pub tolerance: f32,

    /// Buffer sizes to check.
    #[serde(default = "default_validate_sizes")]
    pub sizes: Vec<usize>,
}

impl Default for ValidateConfig {
    fn default() -> Self {
        Self {
            tolerance: default_tolerance(),
            sizes: default_validate_sizes(),
        }
    }
}

/// Benchmark configuration.
#[derive(Debug, Deserialize)]
pub struct BenchmarkConfig {
    /// Buffer sizes to benchmark.
    #[serde(default = "default_benchmark_sizes")]
    pub sizes: Vec<usize>,

    /// Timed runs per size.
    #[serde(default = "default_runs")]
    pub runs: usize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            sizes: default_benchmark_sizes(),
            runs: default_runs(),
        }
    }
}

fn default_tolerance() -> f32 {
    DEFAULT_TOLERANCE
}

fn default_validate_sizes() -> Vec<usize> {
    vec![10, 100, 1000]
}

fn default_benchmark_sizes() -> Vec<usize> {
    vec![1000, 10000, 100000]
}

fn default_runs() -> usize {
    10
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }
}
