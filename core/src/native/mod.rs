//! Native model transports and the owned model handle.
//!
//! A [`NativeTransport`] is the raw boundary to wherever the model actually
//! runs: a shared library speaking the three-call ABI, a shared library
//! exposing a module/forward API, or the in-process reference used for
//! tests. [`NativeModelHandle`] owns one loaded model on top of any of them.

mod dylib;
mod ffi;
mod reference;

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{BridgeError, Result};
use crate::tensor::TensorBuffer;

pub use dylib::{ModuleTransport, RawAbiTransport};
pub use reference::ReferenceTransport;

/// Opaque token naming a model loaded by a transport.
///
/// Zero is reserved for "not loaded" / "released".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModelHandle(u64);

impl ModelHandle {
    /// The sentinel token.
    pub const NULL: Self = Self(0);

    /// Wrap a raw token as returned by native code.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw token value.
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Whether this is the sentinel token.
    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Boundary to a native execution environment that can run the add model.
///
/// Implementations only know the calling contract: load an artifact,
/// forward two tensors, release. Input validation happens above this layer.
pub trait NativeTransport: Send + Sync {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Load the artifact at `path`, returning a non-null token.
    fn load(&self, path: &Path) -> Result<ModelHandle>;

    /// Run the model's forward entry point on two tensors.
    fn forward(&self, handle: ModelHandle, a: &TensorBuffer, b: &TensorBuffer)
        -> Result<TensorBuffer>;

    /// Free the model. Must not fail; errors are swallowed by the transport.
    fn release(&self, handle: ModelHandle);
}

/// Exclusive owner of one loaded native model.
///
/// The model is released exactly once: on the first call to
/// [`release`](Self::release) or when the handle is dropped.
pub struct NativeModelHandle {
    transport: Arc<dyn NativeTransport>,
    handle: ModelHandle,
}

impl NativeModelHandle {
    /// Load a model through the given transport.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ModelLoad`] if the artifact does not exist or the
    /// transport cannot load it.
    pub fn load(transport: Arc<dyn NativeTransport>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(BridgeError::model_load(format!(
                "model artifact not found: {}",
                path.display()
            )));
        }

        let handle = transport.load(path)?;
        if handle.is_null() {
            return Err(BridgeError::model_load(format!(
                "{} transport returned a null handle for {}",
                transport.name(),
                path.display()
            )));
        }

        info!(
            transport = transport.name(),
            handle = %handle,
            path = %path.display(),
            "model loaded"
        );
        Ok(Self { transport, handle })
    }

    /// The current token; [`ModelHandle::NULL`] once released.
    pub fn handle(&self) -> ModelHandle {
        self.handle
    }

    /// Whether the model has been released.
    pub fn is_released(&self) -> bool {
        self.handle.is_null()
    }

    /// Name of the underlying transport.
    pub fn transport_name(&self) -> &'static str {
        self.transport.name()
    }

    /// Cross the boundary once: `a` and `b` in, one tensor out.
    ///
    /// Lengths are not compared here; callers validate before invoking.
    pub fn invoke(&self, a: &TensorBuffer, b: &TensorBuffer) -> Result<TensorBuffer> {
        if self.handle.is_null() {
            return Err(BridgeError::UseAfterRelease);
        }
        debug!(
            transport = self.transport.name(),
            len = a.len(),
            ndim = a.ndim(),
            "forward"
        );
        self.transport.forward(self.handle, a, b)
    }

    /// Release the model. Later calls are no-ops.
    pub fn release(&mut self) {
        if self.handle.is_null() {
            return;
        }
        let handle = std::mem::replace(&mut self.handle, ModelHandle::NULL);
        self.transport.release(handle);
        info!(transport = self.transport.name(), handle = %handle, "model released");
    }
}

impl Drop for NativeModelHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for NativeModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeModelHandle")
            .field("transport", &self.transport.name())
            .field("handle", &self.handle)
            .finish()
    }
}
