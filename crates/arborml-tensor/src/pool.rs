//! Weight Pool - Process-Wide Deduplicating Parameter Store
//!
//! Graph-level optimization passes rewrite weights in place, and a weight
//! block may be referenced by several logical operators after earlier graph
//! rewriting. The pool deduplicates blocks by graph-level name and tracks,
//! per block, whether the one-time transforms (parameter fusion, backend
//! weight layout) have already run. The `fuse_once` / `layout_once` guards
//! put the idempotency check inside the pool so call sites cannot forget
//! it; a failed closure leaves the flag unset and propagates the error.
//!
//! Access is tiered: [`AccessLevel::Coarse`] holds the block's state lock
//! across a mutating closure, serializing instances that share a block;
//! [`AccessLevel::Fine`] observes a snapshot for per-instance bookkeeping.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;

use arborml_core::{DType, Error, Result};

use crate::block::{BlockId, WeightBlock};

// =============================================================================
// Access Levels
// =============================================================================

/// Access tier for pool state operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    /// Holds the block's state lock across the closure. Required for any
    /// operation that mutates shared weight content.
    Coarse,
    /// Runs the closure against a snapshot of the state without holding
    /// the lock. For lightweight per-instance bookkeeping only; writes to
    /// the snapshot are discarded.
    Fine,
}

// =============================================================================
// Block State
// =============================================================================

/// Idempotency state of one weight block.
///
/// Both flags start false, are set true exactly once, and are never reset
/// for the lifetime of the process.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlockState {
    /// Fusion parameters have been folded into the weights.
    pub fused: bool,
    /// Weights have been transposed into the backend kernel's layout.
    pub laid_out: bool,
}

// =============================================================================
// Pool Entries
// =============================================================================

/// A named block held by the pool.
#[derive(Debug, Clone)]
pub enum PoolEntry {
    /// Floating-point weights or bias.
    F32(WeightBlock<f32>),
    /// Quantized int8 weights.
    I8(WeightBlock<i8>),
}

impl PoolEntry {
    /// Returns the identity of the underlying block.
    #[must_use]
    pub fn id(&self) -> BlockId {
        match self {
            Self::F32(b) => b.id(),
            Self::I8(b) => b.id(),
        }
    }

    /// Returns the dtype of the underlying block.
    #[must_use]
    pub const fn dtype(&self) -> DType {
        match self {
            Self::F32(_) => DType::F32,
            Self::I8(_) => DType::I8,
        }
    }
}

// =============================================================================
// WeightPool
// =============================================================================

/// Process-wide deduplicating weight store with idempotency state.
#[derive(Default)]
pub struct WeightPool {
    /// Blocks deduplicated by graph-level parameter name.
    entries: Mutex<HashMap<String, PoolEntry>>,
    /// Per-block transform state, keyed by block identity.
    states: Mutex<HashMap<BlockId, Arc<Mutex<BlockState>>>>,
}

static GLOBAL_POOL: OnceLock<WeightPool> = OnceLock::new();

impl WeightPool {
    /// Creates an empty pool. Tests build private pools; production code
    /// shares [`WeightPool::global`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide pool instance.
    #[must_use]
    pub fn global() -> &'static Self {
        GLOBAL_POOL.get_or_init(Self::new)
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Registers an f32 block under `name`, or returns the block already
    /// registered there.
    pub fn register_f32(
        &self,
        name: &str,
        init: impl FnOnce() -> WeightBlock<f32>,
    ) -> Result<WeightBlock<f32>> {
        let mut entries = self.entries.lock();
        match entries
            .entry(name.to_string())
            .or_insert_with(|| PoolEntry::F32(init()))
        {
            PoolEntry::F32(block) => Ok(block.clone()),
            other => Err(Error::DTypeMismatch {
                expected: DType::F32,
                actual: other.dtype(),
            }),
        }
    }

    /// Registers an i8 block under `name`, or returns the block already
    /// registered there.
    pub fn register_i8(
        &self,
        name: &str,
        init: impl FnOnce() -> WeightBlock<i8>,
    ) -> Result<WeightBlock<i8>> {
        let mut entries = self.entries.lock();
        match entries
            .entry(name.to_string())
            .or_insert_with(|| PoolEntry::I8(init()))
        {
            PoolEntry::I8(block) => Ok(block.clone()),
            other => Err(Error::DTypeMismatch {
                expected: DType::I8,
                actual: other.dtype(),
            }),
        }
    }

    /// Returns true if a block is registered under `name`.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.lock().contains_key(name)
    }

    /// Returns the number of registered blocks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if no blocks are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    // =========================================================================
    // Idempotency State
    // =========================================================================

    fn state_handle(&self, id: BlockId) -> Arc<Mutex<BlockState>> {
        Arc::clone(self.states.lock().entry(id).or_default())
    }

    /// Runs a closure against a block's state at the given access level.
    pub fn apply<R>(
        &self,
        id: BlockId,
        level: AccessLevel,
        f: impl FnOnce(&mut BlockState) -> R,
    ) -> R {
        let handle = self.state_handle(id);
        match level {
            AccessLevel::Coarse => {
                let mut state = handle.lock();
                f(&mut state)
            }
            AccessLevel::Fine => {
                let mut snapshot = *handle.lock();
                f(&mut snapshot)
            }
        }
    }

    /// Runs the fusion closure if the block has not been fused yet.
    ///
    /// Returns `Ok(true)` when the closure ran and the flag was set,
    /// `Ok(false)` when a previous caller already fused the block. The
    /// block's state lock is held across the closure, so instances sharing
    /// the block serialize here.
    pub fn fuse_once<E>(
        &self,
        id: BlockId,
        f: impl FnOnce() -> core::result::Result<(), E>,
    ) -> core::result::Result<bool, E> {
        let handle = self.state_handle(id);
        let mut state = handle.lock();
        if state.fused {
            return Ok(false);
        }
        f()?;
        state.fused = true;
        Ok(true)
    }

    /// Runs the layout closure if the block has not been laid out yet.
    ///
    /// Same contract as [`WeightPool::fuse_once`] for the layout flag.
    pub fn layout_once<E>(
        &self,
        id: BlockId,
        f: impl FnOnce() -> core::result::Result<(), E>,
    ) -> core::result::Result<bool, E> {
        let handle = self.state_handle(id);
        let mut state = handle.lock();
        if state.laid_out {
            return Ok(false);
        }
        f()?;
        state.laid_out = true;
        Ok(true)
    }

    /// Returns true if the block's parameters have been fused.
    #[must_use]
    pub fn is_fused(&self, id: BlockId) -> bool {
        self.apply(id, AccessLevel::Fine, |s| s.fused)
    }

    /// Returns true if the block's weights are laid out for the backend.
    #[must_use]
    pub fn is_laid_out(&self, id: BlockId) -> bool {
        self.apply(id, AccessLevel::Fine, |s| s.laid_out)
    }
}

impl core::fmt::Debug for WeightPool {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("WeightPool")
            .field("entries", &self.len())
            .finish()
    }
}

// =============================================================================
// Tests
// =============================================================================
