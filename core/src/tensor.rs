//! Flat `f32` buffers with an attached shape.
//!
//! Callers of the bridge only ever see flat slices; [`TensorBuffer`] is the
//! marshaling form handed to a native transport.

use ndarray::{ArrayD, IxDyn};

use crate::error::{BridgeError, Result};

/// A flat `f32` buffer paired with its shape.
///
/// The product of the shape's dimensions always equals the buffer length.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorBuffer {
    data: Vec<f32>,
    shape: Vec<usize>,
}

impl TensorBuffer {
    /// Wrap a buffer as a 1-D tensor of its own length.
    pub fn from_vec(data: Vec<f32>) -> Self {
        let shape = vec![data.len()];
        Self { data, shape }
    }

    /// Copy a slice into a 1-D tensor.
    pub fn from_slice(data: &[f32]) -> Self {
        Self::from_vec(data.to_vec())
    }

    /// Wrap a buffer with an explicit shape.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Tensor`] if the shape does not cover the buffer exactly.
    pub fn with_shape(data: Vec<f32>, shape: Vec<usize>) -> Result<Self> {
        let numel: usize = shape.iter().product();
        if numel != data.len() {
            return Err(BridgeError::tensor(format!(
                "shape {:?} holds {} elements, buffer has {}",
                shape,
                numel,
                data.len()
            )));
        }
        Ok(Self { data, shape })
    }

    /// Build a tensor from a shape as reported by native code.
    pub fn from_native(shape: &[i64], data: Vec<f32>) -> Result<Self> {
        let shape = shape
            .iter()
            .map(|&d| {
                usize::try_from(d)
                    .map_err(|_| BridgeError::tensor(format!("negative dimension {}", d)))
            })
            .collect::<Result<Vec<_>>>()?;
        Self::with_shape(data, shape)
    }

    /// Convert an `ndarray` array into a tensor in logical (row-major) order.
    pub fn from_array(array: &ArrayD<f32>) -> Self {
        Self {
            data: array.iter().copied().collect(),
            shape: array.shape().to_vec(),
        }
    }

    /// Get the shape of the tensor.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Shape in the `i64` form native tensor APIs expect.
    pub fn native_shape(&self) -> Vec<i64> {
        self.shape.iter().map(|&d| d as i64).collect()
    }

    /// Get the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Get the total number of elements.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the tensor is empty.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow the flat data.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Take the flat data, dropping the shape.
    pub fn into_vec(self) -> Vec<f32> {
        self.data
    }

    /// View the tensor as a dynamic-dimensional `ndarray` array.
    pub fn to_array(&self) -> Result<ArrayD<f32>> {
        ArrayD::from_shape_vec(IxDyn(&self.shape), self.data.clone())
            .map_err(|e| BridgeError::tensor(format!("Array shape error: {}", e)))
    }
}

impl From<Vec<f32>> for TensorBuffer {
    fn from(data: Vec<f32>) -> Self {
        Self::from_vec(data)
    }
}
