//! modelbridge-rs: call precompiled native add models from Rust.
//!
//! The crate owns a native model handle and wraps it in a checked calling
//! contract. Callers pass flat `f32` slices; the bridge validates lengths,
//! marshals them into shaped tensors, crosses the native boundary and hands
//! back flat results.
//!
//! # Transports
//!
//! The model runs behind a [`NativeTransport`]:
//!
//! - [`RawAbiTransport`]: a shared library exposing the three-call
//!   `bridge_load_model` / `bridge_run_kernel` / `bridge_release_model` ABI
//! - [`ModuleTransport`]: a shared library exposing `module_load` /
//!   `module_forward` over shaped native tensors
//! - [`ReferenceTransport`]: in-process host addition, for tests and demos
//!
//! Native libraries are opened at runtime with `libloading`, so building the
//! crate needs no native toolchain.
//!
//! # Example
//!
//! ```no_run
//! use modelbridge_rs::{ModelBridge, RawAbiTransport};
//! use std::sync::Arc;
//!
//! // Load model
//! let transport = Arc::new(RawAbiTransport::open("libadd_kernel.so")?);
//! let bridge = ModelBridge::open("add_model.pt", transport)?;
//!
//! // Run inference
//! let sum = bridge.add(&[1.0, 2.0, 3.0], &[1.0, 1.0, 1.0])?;
//! assert_eq!(sum, vec![2.0, 3.0, 4.0]);
//!
//! let result = bridge.benchmark(1000, 10)?;
//! println!("mean latency {:.3}ms", result.mean_latency_ms);
//!
//! bridge.release();
//! # Ok::<(), modelbridge_rs::BridgeError>(())
//! ```
//!
//! # Logging
//!
//! The library emits `tracing` events and never installs a subscriber;
//! the `modelbridge` binary sets one up at INFO.

pub mod bridge;
pub mod cli;
pub mod config;
pub mod error;
pub mod native;
pub mod tensor;

// Re-export commonly used types
pub use bridge::{
    reference_add, BenchmarkResult, BridgeState, CheckOutcome, Comparison, InputPattern,
    ModelBridge, DEFAULT_TOLERANCE, WARMUP_RUNS,
};
pub use error::{BridgeError, Result};
pub use native::{
    ModelHandle, ModuleTransport, NativeModelHandle, NativeTransport, RawAbiTransport,
    ReferenceTransport,
};
pub use tensor::TensorBuffer;
