//! Native add-model library used by the transport tests.
//!
//! Exports both native surfaces the bridge can open: the three-call kernel
//! ABI (`bridge_*`) and the module/forward ABI (`module_*`, `tensor_*`).
//!
//! A model artifact is a text file whose content picks the model's behavior:
//!
//! - `add`: elementwise sum
//! - `fail`: every invocation fails and sets the last error
//! - `bad-shape`: forward returns a tensor whose shape does not cover its data
//!
//! Any other content fails to load.

#![allow(clippy::missing_safety_doc)]

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ffi::{c_void, CStr, CString};
use std::os::raw::c_char;
use std::ptr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::{const_mutex, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Add,
    Fail,
    BadShape,
}

impl Behavior {
    fn parse(artifact: &str) -> Option<Self> {
        match artifact.trim() {
            "add" => Some(Self::Add),
            "fail" => Some(Self::Fail),
            "bad-shape" => Some(Self::BadShape),
            _ => None,
        }
    }
}

struct Module {
    behavior: Behavior,
}

struct Tensor {
    data: Vec<f32>,
    shape: Vec<i64>,
}

static NEXT_MODEL: AtomicU64 = AtomicU64::new(1);
static RAW_MODELS: Mutex<BTreeMap<u64, Behavior>> = const_mutex(BTreeMap::new());
static LIVE_MODULES: AtomicUsize = AtomicUsize::new(0);
static LIVE_TENSORS: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static LAST_ERROR: RefCell<CString> = RefCell::new(CString::default());
}

fn set_error(msg: &str) {
    let msg = CString::new(msg).unwrap_or_default();
    LAST_ERROR.with(|e| *e.borrow_mut() = msg);
}

// Valid until the next error is set on this thread.
fn last_error_ptr() -> *const c_char {
    LAST_ERROR.with(|e| e.borrow().as_ptr())
}

unsafe fn load_behavior(path: *const c_char) -> Option<Behavior> {
    if path.is_null() {
        set_error("null model path");
        return None;
    }
    let path = CStr::from_ptr(path).to_string_lossy().into_owned();
    let artifact = match std::fs::read_to_string(&path) {
        Ok(artifact) => artifact,
        Err(e) => {
            set_error(&format!("cannot read {}: {}", path, e));
            return None;
        }
    };
    let behavior = Behavior::parse(&artifact);
    if behavior.is_none() {
        set_error(&format!("{} is not an add model", path));
    }
    behavior
}

fn new_tensor(data: Vec<f32>, shape: Vec<i64>) -> *mut c_void {
    LIVE_TENSORS.fetch_add(1, Ordering::SeqCst);
    Box::into_raw(Box::new(Tensor { data, shape })) as *mut c_void
}

unsafe fn tensor_ref<'a>(tensor: *mut c_void) -> Option<&'a Tensor> {
    (tensor as *const Tensor).as_ref()
}

// Three-call kernel ABI

#[no_mangle]
pub unsafe extern "C" fn bridge_load_model(path: *const c_char) -> u64 {
    match load_behavior(path) {
        Some(behavior) => {
            let model = NEXT_MODEL.fetch_add(1, Ordering::SeqCst);
            RAW_MODELS.lock().insert(model, behavior);
            model
        }
        None => 0,
    }
}

#[no_mangle]
pub unsafe extern "C" fn bridge_run_kernel(
    model: u64,
    a: *const f32,
    b: *const f32,
    n: usize,
    out: *mut f32,
) -> i32 {
    let behavior = match RAW_MODELS.lock().get(&model).copied() {
        Some(behavior) => behavior,
        None => {
            set_error(&format!("unknown model {}", model));
            return -2;
        }
    };
    if behavior == Behavior::Fail {
        set_error("kernel fault: injected failure");
        return -1;
    }
    if n == 0 {
        return 0;
    }
    if a.is_null() || b.is_null() || out.is_null() {
        set_error("null buffer");
        return -3;
    }

    let a = std::slice::from_raw_parts(a, n);
    let b = std::slice::from_raw_parts(b, n);
    let out = std::slice::from_raw_parts_mut(out, n);
    for ((o, x), y) in out.iter_mut().zip(a).zip(b) {
        *o = x + y;
    }
    0
}

#[no_mangle]
pub extern "C" fn bridge_release_model(model: u64) {
    RAW_MODELS.lock().remove(&model);
}

#[no_mangle]
pub extern "C" fn bridge_last_error() -> *const c_char {
    last_error_ptr()
}

// Module/forward ABI

#[no_mangle]
pub unsafe extern "C" fn module_load(path: *const c_char) -> *mut c_void {
    match load_behavior(path) {
        Some(behavior) => {
            LIVE_MODULES.fetch_add(1, Ordering::SeqCst);
            Box::into_raw(Box::new(Module { behavior })) as *mut c_void
        }
        None => ptr::null_mut(),
    }
}

#[no_mangle]
pub unsafe extern "C" fn module_free(module: *mut c_void) {
    if module.is_null() {
        return;
    }
    drop(Box::from_raw(module as *mut Module));
    LIVE_MODULES.fetch_sub(1, Ordering::SeqCst);
}

#[no_mangle]
pub unsafe extern "C" fn module_forward(
    module: *mut c_void,
    inputs: *const *mut c_void,
    n: usize,
) -> *mut c_void {
    let Some(module) = (module as *const Module).as_ref() else {
        set_error("null module");
        return ptr::null_mut();
    };
    if inputs.is_null() || n != 2 {
        set_error(&format!("forward expects 2 inputs, got {}", n));
        return ptr::null_mut();
    }
    let inputs = std::slice::from_raw_parts(inputs, n);
    let (Some(a), Some(b)) = (tensor_ref(inputs[0]), tensor_ref(inputs[1])) else {
        set_error("null input tensor");
        return ptr::null_mut();
    };

    if module.behavior == Behavior::Fail {
        set_error("forward fault: injected failure");
        return ptr::null_mut();
    }
    if a.shape != b.shape {
        set_error(&format!("shape mismatch: {:?} vs {:?}", a.shape, b.shape));
        return ptr::null_mut();
    }

    let data: Vec<f32> = a.data.iter().zip(&b.data).map(|(x, y)| x + y).collect();
    let shape = match module.behavior {
        Behavior::BadShape => vec![data.len() as i64 + 1],
        _ => a.shape.clone(),
    };
    new_tensor(data, shape)
}

#[no_mangle]
pub extern "C" fn module_last_error() -> *const c_char {
    last_error_ptr()
}

#[no_mangle]
pub unsafe extern "C" fn tensor_create(
    data: *const f32,
    shape: *const i64,
    ndim: usize,
) -> *mut c_void {
    if shape.is_null() && ndim > 0 {
        set_error("null shape");
        return ptr::null_mut();
    }
    let shape = if ndim == 0 {
        Vec::new()
    } else {
        std::slice::from_raw_parts(shape, ndim).to_vec()
    };
    if shape.iter().any(|&d| d < 0) {
        set_error(&format!("negative dimension in {:?}", shape));
        return ptr::null_mut();
    }

    let numel = shape.iter().product::<i64>() as usize;
    let data = if numel == 0 {
        Vec::new()
    } else if data.is_null() {
        set_error("null tensor data");
        return ptr::null_mut();
    } else {
        std::slice::from_raw_parts(data, numel).to_vec()
    };
    new_tensor(data, shape)
}

#[no_mangle]
pub unsafe extern "C" fn tensor_free(tensor: *mut c_void) {
    if tensor.is_null() {
        return;
    }
    drop(Box::from_raw(tensor as *mut Tensor));
    LIVE_TENSORS.fetch_sub(1, Ordering::SeqCst);
}

#[no_mangle]
pub unsafe extern "C" fn tensor_data(tensor: *mut c_void) -> *const f32 {
    tensor_ref(tensor).map_or(ptr::null(), |t| t.data.as_ptr())
}

#[no_mangle]
pub unsafe extern "C" fn tensor_shape(tensor: *mut c_void) -> *const i64 {
    tensor_ref(tensor).map_or(ptr::null(), |t| t.shape.as_ptr())
}

#[no_mangle]
pub unsafe extern "C" fn tensor_ndim(tensor: *mut c_void) -> usize {
    tensor_ref(tensor).map_or(0, |t| t.shape.len())
}

#[no_mangle]
pub unsafe extern "C" fn tensor_numel(tensor: *mut c_void) -> usize {
    tensor_ref(tensor).map_or(0, |t| t.data.len())
}

// Bookkeeping for tests

/// Models loaded through either ABI and not yet released.
#[no_mangle]
pub extern "C" fn fixture_live_models() -> usize {
    RAW_MODELS.lock().len() + LIVE_MODULES.load(Ordering::SeqCst)
}

/// Tensors created and not yet freed.
#[no_mangle]
pub extern "C" fn fixture_live_tensors() -> usize {
    LIVE_TENSORS.load(Ordering::SeqCst)
}
