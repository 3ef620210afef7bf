//! C ABI declarations for native model libraries.
//!
//! The symbols are resolved at runtime with `libloading`, so this module
//! holds function-pointer types instead of an `extern` block. Use the safe
//! transports in the `dylib` module instead of calling these directly.

use std::ffi::c_void;
use std::os::raw::c_char;

use libloading::Library;

/// Opaque handle to a native module.
pub type ModuleHandle = *mut c_void;

/// Opaque handle to a native tensor.
pub type TensorHandle = *mut c_void;

// Raw three-call surface
pub type LoadModelFn = unsafe extern "C" fn(path: *const c_char) -> u64;
pub type RunKernelFn = unsafe extern "C" fn(
    model: u64,
    a: *const f32,
    b: *const f32,
    n: usize,
    out: *mut f32,
) -> i32;
pub type ReleaseModelFn = unsafe extern "C" fn(model: u64);
pub type LastErrorFn = unsafe extern "C" fn() -> *const c_char;

// Module lifecycle
pub type ModuleLoadFn = unsafe extern "C" fn(path: *const c_char) -> ModuleHandle;
pub type ModuleFreeFn = unsafe extern "C" fn(module: ModuleHandle);
pub type ModuleForwardFn =
    unsafe extern "C" fn(module: ModuleHandle, inputs: *const TensorHandle, n: usize) -> TensorHandle;

// Tensor operations
pub type TensorCreateFn =
    unsafe extern "C" fn(data: *const f32, shape: *const i64, ndim: usize) -> TensorHandle;
pub type TensorFreeFn = unsafe extern "C" fn(tensor: TensorHandle);
pub type TensorDataFn = unsafe extern "C" fn(tensor: TensorHandle) -> *const f32;
pub type TensorShapeFn = unsafe extern "C" fn(tensor: TensorHandle) -> *const i64;
pub type TensorNdimFn = unsafe extern "C" fn(tensor: TensorHandle) -> usize;
pub type TensorNumelFn = unsafe extern "C" fn(tensor: TensorHandle) -> usize;

/// Resolve a symbol and copy the function pointer out.
///
/// # Safety
///
/// `T` must match the symbol's real signature, and the pointer must not be
/// called after `lib` is dropped.
unsafe fn symbol<T: Copy>(lib: &Library, name: &[u8]) -> Result<T, libloading::Error> {
    lib.get::<T>(name).map(|s| *s)
}

/// Entry points of the three-call kernel library.
#[derive(Clone, Copy)]
pub struct RawAbi {
    pub load_model: LoadModelFn,
    pub run_kernel: RunKernelFn,
    pub release_model: ReleaseModelFn,
    pub last_error: LastErrorFn,
}

impl RawAbi {
    /// # Safety
    ///
    /// The library must export these symbols with the declared signatures.
    pub unsafe fn resolve(lib: &Library) -> Result<Self, libloading::Error> {
        Ok(Self {
            load_model: symbol(lib, b"bridge_load_model\0")?,
            run_kernel: symbol(lib, b"bridge_run_kernel\0")?,
            release_model: symbol(lib, b"bridge_release_model\0")?,
            last_error: symbol(lib, b"bridge_last_error\0")?,
        })
    }
}

/// Entry points of the module/forward library.
#[derive(Clone, Copy)]
pub struct ModuleAbi {
    pub module_load: ModuleLoadFn,
    pub module_free: ModuleFreeFn,
    pub module_forward: ModuleForwardFn,
    pub module_last_error: LastErrorFn,
    pub tensor_create: TensorCreateFn,
    pub tensor_free: TensorFreeFn,
    pub tensor_data: TensorDataFn,
    pub tensor_shape: TensorShapeFn,
    pub tensor_ndim: TensorNdimFn,
    pub tensor_numel: TensorNumelFn,
}

impl ModuleAbi {
    /// # Safety
    ///
    /// The library must export these symbols with the declared signatures.
    pub unsafe fn resolve(lib: &Library) -> Result<Self, libloading::Error> {
        Ok(Self {
            module_load: symbol(lib, b"module_load\0")?,
            module_free: symbol(lib, b"module_free\0")?,
            module_forward: symbol(lib, b"module_forward\0")?,
            module_last_error: symbol(lib, b"module_last_error\0")?,
            tensor_create: symbol(lib, b"tensor_create\0")?,
            tensor_free: symbol(lib, b"tensor_free\0")?,
            tensor_data: symbol(lib, b"tensor_data\0")?,
            tensor_shape: symbol(lib, b"tensor_shape\0")?,
            tensor_ndim: symbol(lib, b"tensor_ndim\0")?,
            tensor_numel: symbol(lib, b"tensor_numel\0")?,
        })
    }
}
