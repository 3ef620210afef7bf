//! In-process stand-in for the native add model.
//!
//! Computes the sum with `ndarray` on the host. Used by tests, demos and
//! benchmarks where no native runtime is installed.

use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{ModelHandle, NativeTransport};
use crate::error::{BridgeError, Result};
use crate::tensor::TensorBuffer;

/// Host-side transport that adds tensors elementwise.
#[derive(Debug)]
pub struct ReferenceTransport {
    next: AtomicU64,
    live: Mutex<HashSet<ModelHandle>>,
}

impl ReferenceTransport {
    /// Create a transport with no models loaded.
    pub fn new() -> Self {
        Self {
            next: AtomicU64::new(1),
            live: Mutex::new(HashSet::new()),
        }
    }

    /// Number of models loaded and not yet released.
    pub fn live_models(&self) -> usize {
        self.live.lock().len()
    }
}

impl Default for ReferenceTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeTransport for ReferenceTransport {
    fn name(&self) -> &'static str {
        "reference"
    }

    fn load(&self, path: &Path) -> Result<ModelHandle> {
        let meta = std::fs::metadata(path).map_err(|e| {
            BridgeError::model_load(format!("cannot read {}: {}", path.display(), e))
        })?;
        if !meta.is_file() {
            return Err(BridgeError::model_load(format!(
                "{} is not a model artifact",
                path.display()
            )));
        }

        let handle = ModelHandle::from_raw(self.next.fetch_add(1, Ordering::Relaxed));
        self.live.lock().insert(handle);
        Ok(handle)
    }

    fn forward(
        &self,
        handle: ModelHandle,
        a: &TensorBuffer,
        b: &TensorBuffer,
    ) -> Result<TensorBuffer> {
        if !self.live.lock().contains(&handle) {
            return Err(BridgeError::invocation(format!(
                "unknown model handle {}",
                handle
            )));
        }
        if a.shape() != b.shape() {
            return Err(BridgeError::invocation(format!(
                "operand shapes differ: {:?} vs {:?}",
                a.shape(),
                b.shape()
            )));
        }

        let sum = a.to_array()? + b.to_array()?;
        Ok(TensorBuffer::from_array(&sum))
    }

    fn release(&self, handle: ModelHandle) {
        self.live.lock().remove(&handle);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_forward_adds_and_keeps_shape() {
        let artifact = NamedTempFile::new().unwrap();
        let transport = ReferenceTransport::new();
        let handle = transport.load(artifact.path()).unwrap();

        let a = TensorBuffer::with_shape(vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]).unwrap();
        let b = TensorBuffer::with_shape(vec![0.5; 4], vec![2, 2]).unwrap();
        let out = transport.forward(handle, &a, &b).unwrap();
        assert_eq!(out.shape(), &[2, 2]);
        assert_eq!(out.as_slice(), &[1.5, 2.5, 3.5, 4.5]);
    }

    #[test]
    fn test_handles_are_distinct_and_tracked() {
        let artifact = NamedTempFile::new().unwrap();
        let transport = ReferenceTransport::new();
        let h1 = transport.load(artifact.path()).unwrap();
        let h2 = transport.load(artifact.path()).unwrap();
        assert_ne!(h1, h2);
        assert!(!h1.is_null());
        assert_eq!(transport.live_models(), 2);

        transport.release(h1);
        assert_eq!(transport.live_models(), 1);

        let a = TensorBuffer::from_slice(&[1.0]);
        assert!(matches!(
            transport.forward(h1, &a, &a),
            Err(BridgeError::Invocation(_))
        ));
    }

    #[test]
    fn test_shape_mismatch_is_invocation_error() {
        let artifact = NamedTempFile::new().unwrap();
        let transport = ReferenceTransport::new();
        let handle = transport.load(artifact.path()).unwrap();

        let a = TensorBuffer::from_slice(&[1.0, 2.0]);
        let b = TensorBuffer::from_slice(&[1.0]);
        assert!(matches!(
            transport.forward(handle, &a, &b),
            Err(BridgeError::Invocation(_))
        ));
    }

    #[test]
    fn test_directory_is_not_an_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let transport = ReferenceTransport::new();
        assert!(matches!(
            transport.load(dir.path()),
            Err(BridgeError::ModelLoad(_))
        ));
    }
}
