//! Tensor - Contiguous NCHW Array with Per-Channel Scale
//!
//! The `Tensor` type backing activations, weights and bias in the fused
//! operator pipeline. Data lives in reference-counted [`Storage`]; clones
//! share both the data and the per-channel quantization scale, which is how
//! a device mirror observes scale updates written through the host copy.
//!
//! # Example
//! ```rust
//! use arborml_tensor::Tensor;
//!
//! let t = Tensor::from_vec(vec![1.0_f32, 2.0, 3.0, 4.0], &[2, 2]).unwrap();
//! assert_eq!(t.shape(), &[2, 2]);
//! assert_eq!(t.numel(), 4);
//! ```
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use core::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use arborml_core::storage::{Storage, StorageReadGuard, StorageWriteGuard};
use arborml_core::{Device, Error, Result, Scalar};

use crate::shape::{normalize_dim, numel, Shape};

// =============================================================================
// Tensor Struct
// =============================================================================

/// A contiguous N-dimensional array with an optional per-channel scale.
///
/// The per-channel quantization scale maps stored low-bit integer values to
/// the real values they represent. It is shared between clones so that host
/// and device mirrors of the same logical tensor stay consistent.
pub struct Tensor<T: Scalar> {
    /// Underlying data storage (reference-counted).
    storage: Storage<T>,
    /// Shape of the tensor (dimensions).
    shape: Shape,
    /// Per-channel quantization scale (empty when unquantized).
    scale: Arc<RwLock<Vec<f32>>>,
}

impl<T: Scalar> Tensor<T> {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Creates a new tensor from storage with the given shape.
    pub fn from_storage(storage: Storage<T>, shape: &[usize]) -> Result<Self> {
        if numel(shape) != storage.len() {
            return Err(Error::shape_mismatch(&[storage.len()], shape));
        }
        Ok(Self {
            storage,
            shape: shape.to_vec(),
            scale: Arc::new(RwLock::new(Vec::new())),
        })
    }

    /// Creates a new tensor from a vector with the given shape.
    pub fn from_vec(data: Vec<T>, shape: &[usize]) -> Result<Self> {
        Self::from_storage(Storage::from_vec(data, Device::Cpu), shape)
    }

    /// Creates a new tensor from a slice with the given shape.
    pub fn from_slice(data: &[T], shape: &[usize]) -> Result<Self> {
        Self::from_storage(Storage::from_slice(data, Device::Cpu), shape)
    }

    /// Creates a zero-filled tensor on the CPU.
    #[must_use]
    pub fn zeros(shape: &[usize]) -> Self {
        Self::zeros_on(shape, Device::Cpu)
    }

    /// Creates a zero-filled tensor tagged with the given device.
    #[must_use]
    pub fn zeros_on(shape: &[usize], device: Device) -> Self {
        Self {
            storage: Storage::zeros(numel(shape), device),
            shape: shape.to_vec(),
            scale: Arc::new(RwLock::new(Vec::new())),
        }
    }

    // =========================================================================
    // Properties
    // =========================================================================

    /// Returns the shape of the tensor.
    #[must_use]
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Returns the number of dimensions.
    #[must_use]
    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Returns the total number of elements.
    #[must_use]
    pub fn numel(&self) -> usize {
        numel(&self.shape)
    }

    /// Returns true if the tensor has zero elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.numel() == 0
    }

    /// Returns the size of a specific dimension (negative indices allowed).
    pub fn size(&self, dim: i64) -> Result<usize> {
        let idx = normalize_dim(dim, self.ndim())?;
        Ok(self.shape[idx])
    }

    /// Returns the device this tensor is tagged with.
    #[must_use]
    pub fn device(&self) -> Device {
        self.storage.device()
    }

    // =========================================================================
    // Data Access
    // =========================================================================

    /// Returns a read guard over the element data.
    #[must_use]
    pub fn as_slice(&self) -> StorageReadGuard<'_, T> {
        self.storage.as_slice()
    }

    /// Returns a write guard over the element data.
    #[must_use]
    pub fn as_slice_mut(&self) -> StorageWriteGuard<'_, T> {
        self.storage.as_slice_mut()
    }

    /// Copies the element data into a new vector.
    #[must_use]
    pub fn to_vec(&self) -> Vec<T> {
        self.as_slice().to_vec()
    }

    /// Copies element data from another tensor of the same shape.
    ///
    /// Only the data moves; the destination keeps its device tag and scale.
    pub fn copy_from(&self, other: &Self) -> Result<()> {
        if self.shape != other.shape {
            return Err(Error::shape_mismatch(&other.shape, &self.shape));
        }
        self.storage.copy_from(&other.storage)
    }

    // =========================================================================
    // Quantization Scale
    // =========================================================================

    /// Returns a copy of the per-channel quantization scale.
    ///
    /// Empty for unquantized tensors.
    #[must_use]
    pub fn scale(&self) -> Vec<f32> {
        self.scale.read().clone()
    }

    /// Replaces the per-channel quantization scale.
    pub fn set_scale(&self, scale: Vec<f32>) {
        *self.scale.write() = scale;
    }

    /// Expands a single broadcast scale entry to one entry per channel.
    ///
    /// A scale of length `channels` is left untouched; a length-1 scale is
    /// repeated; any other non-empty length violates the per-channel
    /// contract and is rejected.
    pub fn broadcast_scale(&self, channels: usize) -> Result<()> {
        let mut guard = self.scale.write();
        match guard.len() {
            0 => Ok(()),
            1 => {
                let s = guard[0];
                *guard = vec![s; channels];
                Ok(())
            }
            len if len == channels => Ok(()),
            len => Err(Error::scale_length_mismatch(channels, len)),
        }
    }
}

impl<T: Scalar> Clone for Tensor<T> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            shape: self.shape.clone(),
            scale: Arc::clone(&self.scale),
        }
    }
}

impl<T: Scalar> fmt::Debug for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("dtype", &T::DTYPE)
            .field("device", &self.device())
            .field("scale_len", &self.scale.read().len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tensor_from_vec() {
        let t = Tensor::from_vec(vec![1.0_f32, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
        assert_eq!(t.shape(), &[2, 3]);
        assert_eq!(t.ndim(), 2);
        assert_eq!(t.numel(), 6);
    }

    #[test]
    fn test_tensor_shape_mismatch() {
        assert!(Tensor::from_vec(vec![1.0_f32, 2.0], &[3]).is_err());
    }

    #[test]
    fn test_tensor_clone_shares_data() {
        let t1 = Tensor::from_vec(vec![1.0_f32, 2.0], &[2]).unwrap();
        let t2 = t1.clone();
        t2.as_slice_mut()[0] = 9.0;
        assert_eq!(t1.to_vec(), vec![9.0, 2.0]);
    }

    #[test]
    fn test_tensor_clone_shares_scale() {
        let t1 = Tensor::from_vec(vec![0_i8, 1], &[2]).unwrap();
        let t2 = t1.clone();
        t1.set_scale(vec![0.5, 0.25]);
        assert_eq!(t2.scale(), vec![0.5, 0.25]);
    }

    #[test]
    fn test_tensor_copy_from() {
        let src = Tensor::from_vec(vec![1.0_f32, 2.0, 3.0], &[3]).unwrap();
        let dst = Tensor::<f32>::zeros(&[3]);
        dst.copy_from(&src).unwrap();
        assert_eq!(dst.to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_tensor_copy_from_shape_mismatch() {
        let src = Tensor::<f32>::zeros(&[2]);
        let dst = Tensor::<f32>::zeros(&[3]);
        assert!(dst.copy_from(&src).is_err());
    }

    #[test]
    fn test_broadcast_scale() {
        let t = Tensor::from_vec(vec![0_i8; 8], &[4, 2]).unwrap();
        t.set_scale(vec![0.1]);
        t.broadcast_scale(4).unwrap();
        assert_eq!(t.scale(), vec![0.1, 0.1, 0.1, 0.1]);
    }

    #[test]
    fn test_broadcast_scale_rejects_partial() {
        let t = Tensor::from_vec(vec![0_i8; 8], &[4, 2]).unwrap();
        t.set_scale(vec![0.1, 0.2]);
        assert!(t.broadcast_scale(4).is_err());
    }

    #[test]
    fn test_empty_tensor() {
        let t = Tensor::<f32>::zeros(&[0]);
        assert!(t.is_empty());
    }
}
