//! Transports backed by a native shared library loaded at runtime.

use std::ffi::{CStr, CString};
use std::path::Path;

use libloading::Library;
use tracing::debug;

use super::ffi::{self, LastErrorFn, ModuleAbi, RawAbi};
use super::{ModelHandle, NativeTransport};
use crate::error::{BridgeError, Result};
use crate::tensor::TensorBuffer;

/// Get the last error message reported by a native library.
fn last_error_message(last_error: LastErrorFn) -> String {
    unsafe {
        let err_ptr = last_error();
        if err_ptr.is_null() {
            "Unknown error".to_string()
        } else {
            CStr::from_ptr(err_ptr).to_string_lossy().into_owned()
        }
    }
}

fn open_library(path: &Path) -> Result<Library> {
    unsafe { Library::new(path) }.map_err(|e| {
        BridgeError::model_load(format!(
            "failed to open native library {}: {}",
            path.display(),
            e
        ))
    })
}

fn path_cstring(path: &Path) -> Result<CString> {
    CString::new(path.to_string_lossy().as_ref())
        .map_err(|_| BridgeError::model_load("Invalid path encoding"))
}

/// The legacy three-call surface: load, run kernel, release.
///
/// Inputs are passed as flat arrays of equal length; any attached shape is
/// kept on the output but never sent across.
pub struct RawAbiTransport {
    abi: RawAbi,
    // Keeps the resolved function pointers valid.
    _lib: Library,
}

impl RawAbiTransport {
    /// Open the shared library and resolve its entry points.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ModelLoad`] if the library or any symbol is missing.
    pub fn open(library: impl AsRef<Path>) -> Result<Self> {
        let library = library.as_ref();
        let lib = open_library(library)?;
        let abi = unsafe { RawAbi::resolve(&lib) }.map_err(|e| {
            BridgeError::model_load(format!(
                "{} is not a kernel library: {}",
                library.display(),
                e
            ))
        })?;
        debug!(library = %library.display(), "raw kernel library opened");
        Ok(Self { abi, _lib: lib })
    }

    fn last_error(&self) -> String {
        last_error_message(self.abi.last_error)
    }
}

impl NativeTransport for RawAbiTransport {
    fn name(&self) -> &'static str {
        "raw"
    }

    fn load(&self, path: &Path) -> Result<ModelHandle> {
        let path_cstr = path_cstring(path)?;
        let raw = unsafe { (self.abi.load_model)(path_cstr.as_ptr()) };
        if raw == 0 {
            return Err(BridgeError::model_load(format!(
                "Failed to load model: {}",
                self.last_error()
            )));
        }
        Ok(ModelHandle::from_raw(raw))
    }

    fn forward(
        &self,
        handle: ModelHandle,
        a: &TensorBuffer,
        b: &TensorBuffer,
    ) -> Result<TensorBuffer> {
        // The kernel reads `n` elements from both inputs.
        if a.len() != b.len() {
            return Err(BridgeError::invocation(format!(
                "kernel inputs differ in length ({} vs {})",
                a.len(),
                b.len()
            )));
        }

        let n = a.len();
        let mut out = vec![0.0f32; n];
        let code = unsafe {
            (self.abi.run_kernel)(
                handle.as_raw(),
                a.as_slice().as_ptr(),
                b.as_slice().as_ptr(),
                n,
                out.as_mut_ptr(),
            )
        };
        if code != 0 {
            return Err(BridgeError::invocation(format!(
                "kernel returned {}: {}",
                code,
                self.last_error()
            )));
        }

        TensorBuffer::with_shape(out, a.shape().to_vec())
    }

    fn release(&self, handle: ModelHandle) {
        unsafe { (self.abi.release_model)(handle.as_raw()) };
    }
}

/// Native tensor freed on drop.
struct OwnedTensor<'a> {
    abi: &'a ModuleAbi,
    ptr: ffi::TensorHandle,
}

impl OwnedTensor<'_> {
    /// Copy the tensor out of native memory.
    ///
    /// A malformed tensor is a fault on the native side and is reported as
    /// [`BridgeError::Invocation`].
    ///
    /// # Safety
    ///
    /// `ptr` must be a live tensor produced by the same library.
    unsafe fn extract(&self) -> Result<TensorBuffer> {
        let ndim = (self.abi.tensor_ndim)(self.ptr);
        let numel = (self.abi.tensor_numel)(self.ptr);
        let shape_ptr = (self.abi.tensor_shape)(self.ptr);
        if shape_ptr.is_null() && ndim > 0 {
            return Err(BridgeError::invocation("Null tensor shape"));
        }
        let shape = if ndim == 0 {
            Vec::new()
        } else {
            std::slice::from_raw_parts(shape_ptr, ndim).to_vec()
        };

        let data = if numel == 0 {
            Vec::new()
        } else {
            let data_ptr = (self.abi.tensor_data)(self.ptr);
            if data_ptr.is_null() {
                return Err(BridgeError::invocation("Null tensor data"));
            }
            std::slice::from_raw_parts(data_ptr, numel).to_vec()
        };

        TensorBuffer::from_native(&shape, data)
            .map_err(|e| BridgeError::invocation(format!("Malformed output tensor: {}", e)))
    }
}

impl Drop for OwnedTensor<'_> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { (self.abi.tensor_free)(self.ptr) };
        }
    }
}

/// The module/forward surface: load a module, pass shaped tensors to its
/// forward entry point.
pub struct ModuleTransport {
    abi: ModuleAbi,
    // Keeps the resolved function pointers valid.
    _lib: Library,
}

impl ModuleTransport {
    /// Open the shared library and resolve its entry points.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::ModelLoad`] if the library or any symbol is missing.
    pub fn open(library: impl AsRef<Path>) -> Result<Self> {
        let library = library.as_ref();
        let lib = open_library(library)?;
        let abi = unsafe { ModuleAbi::resolve(&lib) }.map_err(|e| {
            BridgeError::model_load(format!(
                "{} is not a module library: {}",
                library.display(),
                e
            ))
        })?;
        debug!(library = %library.display(), "module library opened");
        Ok(Self { abi, _lib: lib })
    }

    fn last_error(&self) -> String {
        last_error_message(self.abi.module_last_error)
    }

    fn create_tensor(&self, tensor: &TensorBuffer) -> Result<OwnedTensor<'_>> {
        let shape = tensor.native_shape();
        let ptr = unsafe {
            (self.abi.tensor_create)(tensor.as_slice().as_ptr(), shape.as_ptr(), shape.len())
        };
        if ptr.is_null() {
            return Err(BridgeError::invocation(format!(
                "Failed to create input tensor: {}",
                self.last_error()
            )));
        }
        Ok(OwnedTensor {
            abi: &self.abi,
            ptr,
        })
    }
}

impl NativeTransport for ModuleTransport {
    fn name(&self) -> &'static str {
        "module"
    }

    fn load(&self, path: &Path) -> Result<ModelHandle> {
        let path_cstr = path_cstring(path)?;
        let module = unsafe { (self.abi.module_load)(path_cstr.as_ptr()) };
        if module.is_null() {
            return Err(BridgeError::model_load(format!(
                "Failed to load module: {}",
                self.last_error()
            )));
        }
        Ok(ModelHandle::from_raw(module as usize as u64))
    }

    fn forward(
        &self,
        handle: ModelHandle,
        a: &TensorBuffer,
        b: &TensorBuffer,
    ) -> Result<TensorBuffer> {
        let input_a = self.create_tensor(a)?;
        let input_b = self.create_tensor(b)?;
        let inputs = [input_a.ptr, input_b.ptr];

        let module = handle.as_raw() as usize as ffi::ModuleHandle;
        let result = OwnedTensor {
            abi: &self.abi,
            ptr: unsafe { (self.abi.module_forward)(module, inputs.as_ptr(), inputs.len()) },
        };
        drop(input_a);
        drop(input_b);

        if result.ptr.is_null() {
            return Err(BridgeError::invocation(format!(
                "Forward failed: {}",
                self.last_error()
            )));
        }
        unsafe { result.extract() }
    }

    fn release(&self, handle: ModelHandle) {
        let module = handle.as_raw() as usize as ffi::ModuleHandle;
        if !module.is_null() {
            unsafe { (self.abi.module_free)(module) };
        }
    }
}
