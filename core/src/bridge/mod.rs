//! Caller-facing bridge over a native add model.
//!
//! [`ModelBridge`] owns one [`NativeModelHandle`] and adds the contract the
//! native side does not enforce: length checks before crossing the boundary,
//! ordered batch processing, correctness validation and latency benchmarks.

mod benchmark;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::native::{NativeModelHandle, NativeTransport};
use crate::tensor::TensorBuffer;

pub use benchmark::{reference_add, BenchmarkResult, Comparison, WARMUP_RUNS};

/// Default absolute tolerance for correctness checks.
pub const DEFAULT_TOLERANCE: f32 = 1e-6;

/// Lifecycle state of a [`ModelBridge`].
///
/// There is no "uninitialized" state: construction either loads the model
/// or fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeState {
    Loaded,
    Released,
}

impl fmt::Display for BridgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Loaded => write!(f, "loaded"),
            Self::Released => write!(f, "released"),
        }
    }
}

/// Input pattern used by [`ModelBridge::self_check`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InputPattern {
    Random,
    Zeros,
    Ones,
    Half,
}

impl InputPattern {
    pub const ALL: [InputPattern; 4] = [Self::Random, Self::Zeros, Self::Ones, Self::Half];

    fn fill(self, size: usize, rng: &mut impl Rng) -> Vec<f32> {
        match self {
            Self::Random => (0..size).map(|_| rng.gen::<f32>()).collect(),
            Self::Zeros => vec![0.0; size],
            Self::Ones => vec![1.0; size],
            Self::Half => vec![0.5; size],
        }
    }
}

impl fmt::Display for InputPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Random => "random",
            Self::Zeros => "zeros",
            Self::Ones => "ones",
            Self::Half => "half",
        };
        f.pad(name)
    }
}

/// Outcome of one self-check case.
#[derive(Debug, Clone, Serialize)]
pub struct CheckOutcome {
    pub size: usize,
    pub pattern: InputPattern,
    pub passed: bool,
    /// Native error that failed the case, if any.
    pub error: Option<String>,
}

/// Validated, batchable, benchmarkable access to one native add model.
///
/// The handle is guarded by a mutex: concurrent calls on one bridge are
/// serialized, and a batch or benchmark holds the lock for its whole run.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use modelbridge_rs::{ModelBridge, ReferenceTransport};
///
/// let bridge = ModelBridge::open("add_model.pt", Arc::new(ReferenceTransport::new()))?;
/// let sum = bridge.add(&[1.0, 2.0], &[3.0, 4.0])?;
/// assert_eq!(sum, vec![4.0, 6.0]);
/// bridge.release();
/// # Ok::<(), modelbridge_rs::BridgeError>(())
/// ```
pub struct ModelBridge {
    path: PathBuf,
    transport_name: &'static str,
    model: Mutex<NativeModelHandle>,
}

impl ModelBridge {
    /// Load the model at `path` through `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ModelLoad`] if the model cannot be loaded.
    pub fn open(path: impl AsRef<Path>, transport: Arc<dyn NativeTransport>) -> Result<Self> {
        let path = path.as_ref();
        let transport_name = transport.name();
        let model = NativeModelHandle::load(transport, path)?;
        Ok(Self {
            path: path.to_path_buf(),
            transport_name,
            model: Mutex::new(model),
        })
    }

    /// Path of the loaded artifact.
    pub fn model_path(&self) -> &Path {
        &self.path
    }

    /// Name of the transport the model was loaded through.
    pub fn transport_name(&self) -> &'static str {
        self.transport_name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BridgeState {
        if self.model.lock().is_released() {
            BridgeState::Released
        } else {
            BridgeState::Loaded
        }
    }

    /// Elementwise `a + b` computed by the native model.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::UseAfterRelease`] after [`release`](Self::release)
    /// - [`BridgeError::ShapeMismatch`] if the lengths differ (no native call is made)
    /// - [`BridgeError::Invocation`] if the native call fails
    pub fn add(&self, a: &[f32], b: &[f32]) -> Result<Vec<f32>> {
        let model = self.model.lock();
        add_locked(&model, a, b)
    }

    /// Add each pair of a batch, in order.
    ///
    /// The first failing pair aborts the batch; its error is returned and
    /// no partial results are kept.
    pub fn batch_add<A, B>(&self, batch_a: &[A], batch_b: &[B]) -> Result<Vec<Vec<f32>>>
    where
        A: AsRef<[f32]>,
        B: AsRef<[f32]>,
    {
        let model = self.model.lock();
        ensure_loaded(&model)?;
        if batch_a.len() != batch_b.len() {
            return Err(BridgeError::BatchSizeMismatch {
                left: batch_a.len(),
                right: batch_b.len(),
            });
        }

        let mut results = Vec::with_capacity(batch_a.len());
        for (index, (a, b)) in batch_a.iter().zip(batch_b).enumerate() {
            match add_locked(&model, a.as_ref(), b.as_ref()) {
                Ok(sum) => results.push(sum),
                Err(e) => {
                    warn!(index, batch = batch_a.len(), error = %e, "batch aborted");
                    return Err(e);
                }
            }
        }
        debug!(batch = results.len(), "batch complete");
        Ok(results)
    }

    /// Check the native result of `a + b` against a host-side sum.
    ///
    /// Returns `false` at the first element off by more than `tolerance`.
    /// A numeric mismatch is never an error.
    pub fn validate(&self, a: &[f32], b: &[f32], tolerance: f32) -> Result<bool> {
        let model = self.model.lock();
        validate_locked(&model, a, b, tolerance)
    }

    /// Validate every [`InputPattern`] at each size against random second operands.
    ///
    /// Native failures mark a case as failed instead of aborting the run.
    pub fn self_check(&self, sizes: &[usize], tolerance: f32) -> Result<Vec<CheckOutcome>> {
        let model = self.model.lock();
        ensure_loaded(&model)?;

        let mut rng = rand::thread_rng();
        let mut outcomes = Vec::with_capacity(sizes.len() * InputPattern::ALL.len());
        for &size in sizes {
            for pattern in InputPattern::ALL {
                let a = pattern.fill(size, &mut rng);
                let b = InputPattern::Random.fill(size, &mut rng);
                let (passed, error) = match validate_locked(&model, &a, &b, tolerance) {
                    Ok(passed) => (passed, None),
                    Err(e @ BridgeError::Invocation(_)) => (false, Some(e.to_string())),
                    Err(e) => return Err(e),
                };
                info!(size, ?pattern, passed, "self check");
                outcomes.push(CheckOutcome {
                    size,
                    pattern,
                    passed,
                    error,
                });
            }
        }
        Ok(outcomes)
    }

    /// Release the native model. Idempotent and infallible.
    pub fn release(&self) {
        self.model.lock().release();
    }
}

impl fmt::Debug for ModelBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBridge")
            .field("path", &self.path)
            .field("transport", &self.transport_name)
            .field("state", &self.state())
            .finish()
    }
}

fn ensure_loaded(model: &NativeModelHandle) -> Result<()> {
    if model.is_released() {
        Err(BridgeError::UseAfterRelease)
    } else {
        Ok(())
    }
}

fn add_locked(model: &NativeModelHandle, a: &[f32], b: &[f32]) -> Result<Vec<f32>> {
    ensure_loaded(model)?;
    if a.len() != b.len() {
        return Err(BridgeError::ShapeMismatch {
            left: a.len(),
            right: b.len(),
        });
    }

    let out = model.invoke(&TensorBuffer::from_slice(a), &TensorBuffer::from_slice(b))?;
    if out.len() != a.len() {
        return Err(BridgeError::invocation(format!(
            "model returned {} elements for {} inputs",
            out.len(),
            a.len()
        )));
    }
    Ok(out.into_vec())
}

fn validate_locked(model: &NativeModelHandle, a: &[f32], b: &[f32], tolerance: f32) -> Result<bool> {
    let result = add_locked(model, a, b)?;
    for (index, ((&x, &y), &actual)) in a.iter().zip(b).zip(&result).enumerate() {
        let expected = x + y;
        // NaN compares false, so it fails the check.
        let within = (actual - expected).abs() <= tolerance;
        if !within {
            warn!(index, actual, expected, tolerance, "validation mismatch");
            return Ok(false);
        }
    }
    Ok(true)
}
