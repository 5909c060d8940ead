//! Weight Block - Host/Device Mirrored Parameter Storage
//!
//! A `WeightBlock` carries one trainable parameter tensor through graph
//! optimization. It keeps a host-resident copy, which is the single source
//! of truth for in-place transforms like weight fusion, and a device-tagged
//! mirror that must be re-derived byte-for-byte after any host mutation.
//!
//! Blocks are identified by a process-unique [`BlockId`]; clones alias the
//! same underlying pair, so every operator instance referencing one logical
//! parameter observes the same data and the same id.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use core::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use arborml_core::{Device, Result, Scalar};

use crate::tensor::Tensor;

// =============================================================================
// Block Identity
// =============================================================================

/// Process-unique identity of a weight block.
///
/// Used as the key for idempotency state in the weight pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(u64);

static NEXT_BLOCK_ID: AtomicU64 = AtomicU64::new(1);

impl BlockId {
    fn next() -> Self {
        Self(NEXT_BLOCK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw id value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

// =============================================================================
// WeightBlock
// =============================================================================

/// Host/device mirrored storage for one parameter tensor.
pub struct WeightBlock<T: Scalar> {
    inner: Arc<RwLock<Mirror<T>>>,
    id: BlockId,
}

struct Mirror<T: Scalar> {
    host: Tensor<T>,
    device: Tensor<T>,
}

impl<T: Scalar> WeightBlock<T> {
    /// Creates a block from a host tensor, mirroring it onto `device`.
    #[must_use]
    pub fn new(host: Tensor<T>, device: Device) -> Self {
        let mirror = Tensor::zeros_on(host.shape(), device);
        mirror
            .copy_from(&host)
            .expect("mirror allocated with host shape");
        mirror.set_scale(host.scale());
        Self {
            inner: Arc::new(RwLock::new(Mirror {
                host,
                device: mirror,
            })),
            id: BlockId::next(),
        }
    }

    /// Creates a block from raw data with the given shape.
    pub fn from_vec(data: Vec<T>, shape: &[usize], device: Device) -> Result<Self> {
        Ok(Self::new(Tensor::from_vec(data, shape)?, device))
    }

    /// Creates an empty throwaway block.
    ///
    /// Used for the uniform no-op layout-transposition call issued by
    /// operator instances that find the layout flag already set.
    #[must_use]
    pub fn empty(device: Device) -> Self {
        Self::new(Tensor::zeros(&[0]), device)
    }

    /// Returns the block identity.
    #[must_use]
    pub const fn id(&self) -> BlockId {
        self.id
    }

    /// Returns the current shape of the block.
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        self.inner.read().host.shape().to_vec()
    }

    /// Returns the number of elements in the block.
    #[must_use]
    pub fn numel(&self) -> usize {
        self.inner.read().host.numel()
    }

    /// Returns true if the block holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.numel() == 0
    }

    /// Returns the host copy (shares storage with the block).
    #[must_use]
    pub fn host_tensor(&self) -> Tensor<T> {
        self.inner.read().host.clone()
    }

    /// Returns the device mirror (shares storage with the block).
    #[must_use]
    pub fn device_tensor(&self) -> Tensor<T> {
        self.inner.read().device.clone()
    }

    /// Returns the device this block's mirror is tagged with.
    #[must_use]
    pub fn device(&self) -> Device {
        self.inner.read().device.device()
    }

    /// Reallocates the block to a new zero-filled shape.
    ///
    /// Both mirrors get fresh storage; any previous data and scale are
    /// dropped. Used to materialize an absent convolution bias.
    pub fn realloc(&self, shape: &[usize]) {
        let mut guard = self.inner.write();
        let device = guard.device.device();
        guard.host = Tensor::zeros(shape);
        guard.device = Tensor::zeros_on(shape, device);
    }

    /// Re-derives the device mirror from the host copy.
    ///
    /// After this call the mirror is byte-for-byte identical to the host
    /// and carries the same per-channel scale.
    pub fn sync_device(&self) -> Result<()> {
        let guard = self.inner.read();
        guard.device.copy_from(&guard.host)?;
        guard.device.set_scale(guard.host.scale());
        Ok(())
    }

    /// Returns a copy of the host per-channel quantization scale.
    #[must_use]
    pub fn scale(&self) -> Vec<f32> {
        self.inner.read().host.scale()
    }

    /// Replaces the host per-channel quantization scale.
    ///
    /// The device mirror picks the new scale up on the next
    /// [`WeightBlock::sync_device`].
    pub fn set_scale(&self, scale: Vec<f32>) {
        self.inner.read().host.set_scale(scale);
    }
}

impl<T: Scalar> Clone for WeightBlock<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            id: self.id,
        }
    }
}

impl<T: Scalar> fmt::Debug for WeightBlock<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeightBlock")
            .field("id", &self.id)
            .field("shape", &self.shape())
            .field("device", &self.device())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
