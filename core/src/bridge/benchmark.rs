//! Latency benchmarks and reference comparison.

use std::hint::black_box;
use std::time::{Duration, Instant};

use ndarray::ArrayView1;
use rand::Rng;
use serde::Serialize;
use tracing::info;

use super::{add_locked, ensure_loaded, ModelBridge, DEFAULT_TOLERANCE};
use crate::error::{BridgeError, Result};

/// Untimed invocations run before measuring, to keep one-time setup cost
/// (JIT, caches, device transfer) out of the samples.
pub const WARMUP_RUNS: usize = 3;

/// Latency of repeated invocations at one input size.
#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkResult {
    /// Elements per operand.
    pub size: usize,
    /// Timed invocations.
    pub runs: usize,
    /// Untimed invocations before the timed ones.
    pub warmup_runs: usize,
    /// Total elapsed time of the timed runs divided by `runs`.
    pub mean_latency_ms: f64,
    pub min_latency_ms: f64,
    pub max_latency_ms: f64,
    pub total_ms: f64,
}

impl BenchmarkResult {
    fn from_samples(size: usize, samples: &[Duration]) -> Self {
        let ms: Vec<f64> = samples.iter().map(|d| d.as_secs_f64() * 1000.0).collect();
        let total_ms: f64 = ms.iter().sum();
        Self {
            size,
            runs: ms.len(),
            warmup_runs: WARMUP_RUNS,
            mean_latency_ms: total_ms / ms.len() as f64,
            min_latency_ms: ms.iter().copied().fold(f64::INFINITY, f64::min),
            max_latency_ms: ms.iter().copied().fold(0.0, f64::max),
            total_ms,
        }
    }
}

/// Bridge latency next to an in-process reference sum over the same inputs.
#[derive(Debug, Clone, Serialize)]
pub struct Comparison {
    pub bridge: BenchmarkResult,
    pub reference: BenchmarkResult,
    /// `reference / bridge` mean latency; 0 when the bridge mean is 0.
    pub speedup: f64,
    pub max_abs_diff: f32,
    /// Whether `max_abs_diff` is within the default tolerance.
    pub accurate: bool,
}

/// Host-side elementwise sum used as the correctness and speed baseline.
pub fn reference_add(a: &[f32], b: &[f32]) -> Vec<f32> {
    (&ArrayView1::from(a) + &ArrayView1::from(b)).to_vec()
}

fn random_operands(size: usize) -> (Vec<f32>, Vec<f32>) {
    let mut rng = rand::thread_rng();
    let a = (0..size).map(|_| rng.gen::<f32>()).collect();
    let b = (0..size).map(|_| rng.gen::<f32>()).collect();
    (a, b)
}

/// Run `f` [`WARMUP_RUNS`] times untimed, then `runs` times timed.
fn measure<F>(runs: usize, mut f: F) -> Result<Vec<Duration>>
where
    F: FnMut() -> Result<()>,
{
    for _ in 0..WARMUP_RUNS {
        f()?;
    }
    let mut samples = Vec::with_capacity(runs);
    for _ in 0..runs {
        let start = Instant::now();
        f()?;
        samples.push(start.elapsed());
    }
    Ok(samples)
}

/// Largest elementwise `|actual - expected|`. A NaN anywhere is returned as NaN.
fn max_abs_diff(actual: &[f32], expected: &[f32]) -> f32 {
    actual
        .iter()
        .zip(expected)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0f32, |acc, d| if d.is_nan() || d > acc { d } else { acc })
}

fn check_runs(runs: usize) -> Result<()> {
    if runs == 0 {
        return Err(BridgeError::invalid_argument("runs must be at least 1"));
    }
    Ok(())
}

impl ModelBridge {
    /// Mean latency of `add` on two random buffers of `size` elements.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::UseAfterRelease`] after release,
    /// [`BridgeError::InvalidArgument`] if `runs` is 0, and any error raised
    /// by the underlying `add` calls.
    pub fn benchmark(&self, size: usize, runs: usize) -> Result<BenchmarkResult> {
        let model = self.model.lock();
        ensure_loaded(&model)?;
        check_runs(runs)?;

        info!(size, runs, "benchmark start");
        let (a, b) = random_operands(size);
        let samples = measure(runs, || add_locked(&model, &a, &b).map(drop))?;
        let result = BenchmarkResult::from_samples(size, &samples);
        info!(
            size,
            runs,
            mean_ms = result.mean_latency_ms,
            "benchmark complete"
        );
        Ok(result)
    }

    /// Benchmark the bridge and [`reference_add`] on the same inputs and
    /// compare their outputs.
    pub fn compare(&self, size: usize, runs: usize) -> Result<Comparison> {
        let model = self.model.lock();
        ensure_loaded(&model)?;
        check_runs(runs)?;

        let (a, b) = random_operands(size);
        let bridge_samples = measure(runs, || add_locked(&model, &a, &b).map(drop))?;
        let reference_samples = measure(runs, || {
            black_box(reference_add(black_box(&a), black_box(&b)));
            Ok(())
        })?;

        let actual = add_locked(&model, &a, &b)?;
        let expected = reference_add(&a, &b);
        let max_abs_diff = max_abs_diff(&actual, &expected);

        let bridge = BenchmarkResult::from_samples(size, &bridge_samples);
        let reference = BenchmarkResult::from_samples(size, &reference_samples);
        let speedup = if bridge.mean_latency_ms > 0.0 {
            reference.mean_latency_ms / bridge.mean_latency_ms
        } else {
            0.0
        };

        info!(
            size,
            bridge_ms = bridge.mean_latency_ms,
            reference_ms = reference.mean_latency_ms,
            speedup,
            max_abs_diff,
            "comparison complete"
        );
        Ok(Comparison {
            bridge,
            reference,
            speedup,
            max_abs_diff,
            // NaN is never accurate.
            accurate: max_abs_diff <= DEFAULT_TOLERANCE,
        })
    }
}
