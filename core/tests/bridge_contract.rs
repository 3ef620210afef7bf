use anyhow::{Context, Result};
use approx::assert_abs_diff_eq;
use modelbridge_rs::{
    BridgeError, BridgeState, ModelBridge, ModelHandle, NativeTransport, TensorBuffer, WARMUP_RUNS,
};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;

/// Test double that adds on the host and counts boundary crossings.
///
/// When `skew` is set, element `index` of every result is shifted by `delta`.
/// When `nan` is set, every result element is NaN.
#[derive(Default)]
struct CountingTransport {
    loads: AtomicUsize,
    forwards: AtomicUsize,
    releases: AtomicUsize,
    skew: Option<(usize, f32)>,
    fail_on_call: Option<usize>,
    nan: bool,
}

impl CountingTransport {
    fn rigged(index: usize, delta: f32) -> Self {
        Self {
            skew: Some((index, delta)),
            ..Default::default()
        }
    }

    fn failing_on(call: usize) -> Self {
        Self {
            fail_on_call: Some(call),
            ..Default::default()
        }
    }

    fn returning_nan() -> Self {
        Self {
            nan: true,
            ..Default::default()
        }
    }

    fn forwards(&self) -> usize {
        self.forwards.load(Ordering::SeqCst)
    }
}

impl NativeTransport for CountingTransport {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn load(&self, _path: &Path) -> modelbridge_rs::Result<ModelHandle> {
        let n = self.loads.fetch_add(1, Ordering::SeqCst) as u64;
        Ok(ModelHandle::from_raw(0x1000 + n))
    }

    fn forward(
        &self,
        _handle: ModelHandle,
        a: &TensorBuffer,
        b: &TensorBuffer,
    ) -> modelbridge_rs::Result<TensorBuffer> {
        let call = self.forwards.fetch_add(1, Ordering::SeqCst);
        if self.fail_on_call == Some(call) {
            return Err(BridgeError::invocation("device out of memory"));
        }
        let mut out: Vec<f32> = a
            .as_slice()
            .iter()
            .zip(b.as_slice())
            .map(|(x, y)| x + y)
            .collect();
        if self.nan {
            out.iter_mut().for_each(|v| *v = f32::NAN);
        }
        if let Some((index, delta)) = self.skew {
            if let Some(v) = out.get_mut(index) {
                *v += delta;
            }
        }
        TensorBuffer::with_shape(out, a.shape().to_vec())
    }

    fn release(&self, _handle: ModelHandle) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

fn open(transport: Arc<CountingTransport>) -> Result<(NamedTempFile, ModelBridge)> {
    let artifact = NamedTempFile::new()?;
    let bridge = ModelBridge::open(artifact.path(), transport).context("Failed to open bridge")?;
    Ok((artifact, bridge))
}

#[test]
fn add_matches_host_sum() -> Result<()> {
    let (_artifact, bridge) = open(Arc::new(CountingTransport::default()))?;

    let a: Vec<f32> = (0..257).map(|i| i as f32 * 0.25).collect();
    let b: Vec<f32> = (0..257).map(|i| 1.0 - i as f32 * 0.5).collect();
    let result = bridge.add(&a, &b)?;

    assert_eq!(result.len(), a.len());
    for i in 0..a.len() {
        assert_abs_diff_eq!(result[i], a[i] + b[i], epsilon = 1e-6);
    }
    Ok(())
}

#[test]
fn add_length_mismatch_never_crosses_boundary() -> Result<()> {
    let transport = Arc::new(CountingTransport::default());
    let (_artifact, bridge) = open(transport.clone())?;

    let err = bridge.add(&[1.0, 2.0, 3.0], &[1.0, 2.0]).unwrap_err();
    assert!(matches!(err, BridgeError::ShapeMismatch { left: 3, right: 2 }));
    assert_eq!(transport.forwards(), 0);
    Ok(())
}

#[test]
fn batch_add_returns_results_in_order() -> Result<()> {
    let (_artifact, bridge) = open(Arc::new(CountingTransport::default()))?;

    let batch_a = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
    let batch_b = vec![vec![1.0, 1.0, 1.0], vec![2.0, 2.0, 2.0]];
    let results = bridge.batch_add(&batch_a, &batch_b)?;

    assert_eq!(results, vec![vec![2.0, 3.0, 4.0], vec![6.0, 7.0, 8.0]]);
    Ok(())
}

#[test]
fn batch_size_mismatch_fails_before_first_pair() -> Result<()> {
    let transport = Arc::new(CountingTransport::default());
    let (_artifact, bridge) = open(transport.clone())?;

    let batch_a = vec![vec![1.0, 2.0, 3.0]];
    let batch_b = vec![vec![1.0, 1.0, 1.0], vec![2.0, 2.0, 2.0]];
    let err = bridge.batch_add(&batch_a, &batch_b).unwrap_err();

    assert!(matches!(err, BridgeError::BatchSizeMismatch { left: 1, right: 2 }));
    assert_eq!(transport.forwards(), 0);
    Ok(())
}

#[test]
fn batch_aborts_at_first_failing_pair() -> Result<()> {
    let transport = Arc::new(CountingTransport::default());
    let (_artifact, bridge) = open(transport.clone())?;

    let batch_a = vec![vec![1.0], vec![1.0, 2.0], vec![3.0]];
    let batch_b = vec![vec![1.0], vec![1.0], vec![3.0]];
    let err = bridge.batch_add(&batch_a, &batch_b).unwrap_err();

    assert!(matches!(err, BridgeError::ShapeMismatch { left: 2, right: 1 }));
    // Only the first pair reached the model; the third was never attempted.
    assert_eq!(transport.forwards(), 1);
    Ok(())
}

#[test]
fn batch_propagates_native_failure() -> Result<()> {
    let transport = Arc::new(CountingTransport::failing_on(1));
    let (_artifact, bridge) = open(transport.clone())?;

    let batch = vec![vec![1.0, 2.0]; 4];
    let err = bridge.batch_add(&batch, &batch).unwrap_err();

    assert!(matches!(err, BridgeError::Invocation(ref msg) if msg.contains("out of memory")));
    assert_eq!(transport.forwards(), 2);
    Ok(())
}

#[test]
fn validate_detects_rigged_model() -> Result<()> {
    let a = vec![1.0, 2.0, 3.0, 4.0];
    let b = vec![0.5, 0.5, 0.5, 0.5];

    let (_exact_artifact, exact) = open(Arc::new(CountingTransport::default()))?;
    assert!(exact.validate(&a, &b, 1e-6)?);

    let (_rigged_artifact, rigged) = open(Arc::new(CountingTransport::rigged(2, 0.01)))?;
    assert!(!rigged.validate(&a, &b, 1e-3)?);
    // Within a looser tolerance the same skew passes.
    assert!(rigged.validate(&a, &b, 0.1)?);
    Ok(())
}

#[test]
fn validate_propagates_shape_mismatch() -> Result<()> {
    let (_artifact, bridge) = open(Arc::new(CountingTransport::default()))?;
    assert!(matches!(
        bridge.validate(&[1.0], &[1.0, 2.0], 1e-6),
        Err(BridgeError::ShapeMismatch { .. })
    ));
    Ok(())
}

#[test]
fn benchmark_times_requested_runs_after_warmup() -> Result<()> {
    let transport = Arc::new(CountingTransport::default());
    let (_artifact, bridge) = open(transport.clone())?;

    let result = bridge.benchmark(1000, 10)?;

    assert_eq!(result.size, 1000);
    assert_eq!(result.runs, 10);
    assert_eq!(result.warmup_runs, 3);
    assert!(result.mean_latency_ms >= 0.0);
    assert!(result.min_latency_ms <= result.max_latency_ms);
    assert_eq!(transport.forwards(), 10 + WARMUP_RUNS);
    Ok(())
}

#[test]
fn benchmark_rejects_zero_runs() -> Result<()> {
    let transport = Arc::new(CountingTransport::default());
    let (_artifact, bridge) = open(transport.clone())?;

    assert!(matches!(
        bridge.benchmark(100, 0),
        Err(BridgeError::InvalidArgument(_))
    ));
    assert_eq!(transport.forwards(), 0);
    Ok(())
}

#[test]
fn compare_reports_rigged_difference() -> Result<()> {
    let (_artifact, bridge) = open(Arc::new(CountingTransport::rigged(0, 0.5)))?;

    let comparison = bridge.compare(64, 5)?;
    assert_eq!(comparison.bridge.runs, 5);
    assert_eq!(comparison.reference.runs, 5);
    assert_abs_diff_eq!(comparison.max_abs_diff, 0.5, epsilon = 1e-6);
    assert!(!comparison.accurate);
    assert!(comparison.speedup >= 0.0);
    Ok(())
}

#[test]
fn nan_results_are_never_accurate() -> Result<()> {
    let (_artifact, bridge) = open(Arc::new(CountingTransport::returning_nan()))?;

    let a = vec![1.0; 16];
    assert!(!bridge.validate(&a, &a, 1e-6)?);

    let comparison = bridge.compare(16, 2)?;
    assert!(comparison.max_abs_diff.is_nan());
    assert!(!comparison.accurate);
    Ok(())
}

#[test]
fn release_is_idempotent() -> Result<()> {
    let transport = Arc::new(CountingTransport::default());
    let (_artifact, bridge) = open(transport.clone())?;
    assert_eq!(bridge.state(), BridgeState::Loaded);

    bridge.release();
    assert_eq!(bridge.state(), BridgeState::Released);
    bridge.release();
    assert_eq!(bridge.state(), BridgeState::Released);

    drop(bridge);
    assert_eq!(transport.releases.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn drop_releases_loaded_model() -> Result<()> {
    let transport = Arc::new(CountingTransport::default());
    let (_artifact, bridge) = open(transport.clone())?;
    drop(bridge);
    assert_eq!(transport.releases.load(Ordering::SeqCst), 1);
    Ok(())
}

#[test]
fn operations_after_release_fail() -> Result<()> {
    let transport = Arc::new(CountingTransport::default());
    let (_artifact, bridge) = open(transport.clone())?;
    bridge.release();

    let a = [1.0, 2.0];
    assert!(matches!(bridge.add(&a, &a), Err(BridgeError::UseAfterRelease)));
    assert!(matches!(
        bridge.batch_add(&[a], &[a]),
        Err(BridgeError::UseAfterRelease)
    ));
    assert!(matches!(
        bridge.validate(&a, &a, 1e-6),
        Err(BridgeError::UseAfterRelease)
    ));
    assert!(matches!(
        bridge.benchmark(10, 1),
        Err(BridgeError::UseAfterRelease)
    ));
    // Release is reported ahead of argument errors.
    assert!(matches!(
        bridge.benchmark(10, 0),
        Err(BridgeError::UseAfterRelease)
    ));
    assert!(matches!(
        bridge.compare(10, 1),
        Err(BridgeError::UseAfterRelease)
    ));
    assert!(matches!(
        bridge.compare(10, 0),
        Err(BridgeError::UseAfterRelease)
    ));
    assert!(matches!(
        bridge.self_check(&[10], 1e-6),
        Err(BridgeError::UseAfterRelease)
    ));
    assert_eq!(transport.forwards(), 0);
    Ok(())
}

#[test]
fn missing_artifact_fails_construction() {
    let transport = Arc::new(CountingTransport::default());
    let err = ModelBridge::open("/nonexistent/add_model.pt", transport.clone()).unwrap_err();
    assert!(matches!(err, BridgeError::ModelLoad(_)));
    assert_eq!(transport.loads.load(Ordering::SeqCst), 0);
}

#[test]
fn concurrent_adds_share_one_bridge() -> Result<()> {
    let transport = Arc::new(CountingTransport::default());
    let (_artifact, bridge) = open(transport.clone())?;
    let bridge = Arc::new(bridge);

    let handles: Vec<_> = (0..4)
        .map(|t| {
            let bridge = Arc::clone(&bridge);
            std::thread::spawn(move || -> modelbridge_rs::Result<()> {
                for i in 0..25 {
                    let a = vec![t as f32; 8];
                    let b = vec![i as f32; 8];
                    let out = bridge.add(&a, &b)?;
                    assert!(out.iter().all(|&v| v == (t + i) as f32));
                }
                Ok(())
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("worker panicked")?;
    }
    assert_eq!(transport.forwards(), 100);
    Ok(())
}
