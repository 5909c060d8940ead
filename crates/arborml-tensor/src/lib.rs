//! Arborml Tensor - Parameter Storage for the ArborML Inference Optimizer
//!
//! This crate provides the contiguous NCHW `Tensor` type used by the fused
//! operator pipeline, the host/device mirrored [`WeightBlock`] that carries
//! trainable parameters through graph optimization, and the process-wide
//! [`WeightPool`] that deduplicates blocks and guards one-time transforms
//! (weight fusion, backend layout) with idempotency state.
//!
//! # Key Features
//! - Contiguous NCHW tensors with per-channel quantization scale
//! - Host/device mirrored weight blocks with byte-for-byte sync
//! - Key-addressed weight pool with `fuse_once` / `layout_once` guards
//!
//! # Example
//! ```rust
//! use arborml_tensor::{Tensor, WeightBlock};
//! use arborml_core::Device;
//!
//! let weights = WeightBlock::<f32>::from_vec(vec![1.0; 18], &[2, 1, 3, 3], Device::Cpu).unwrap();
//! assert_eq!(weights.shape(), vec![2, 1, 3, 3]);
//! ```
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// ML/tensor-specific allowances
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::many_single_char_names)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::needless_range_loop)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::too_many_lines)]

// =============================================================================
// Modules
// =============================================================================

pub mod block;
pub mod creation;
pub mod pool;
pub mod shape;
pub mod tensor;

// =============================================================================
// Re-exports
// =============================================================================

pub use arborml_core::{DType, Device, Error, Precision, Result};
pub use block::{BlockId, WeightBlock};
pub use creation::{full, ones, rand, randn, zeros};
pub use pool::{AccessLevel, BlockState, PoolEntry, WeightPool};
pub use shape::Shape;
pub use tensor::Tensor;

// =============================================================================
// Prelude
// =============================================================================

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::block::{BlockId, WeightBlock};
    pub use crate::pool::{AccessLevel, WeightPool};
    pub use crate::tensor::Tensor;
    pub use crate::{full, ones, rand, randn, zeros};
    pub use arborml_core::{DType, Device, Error, Precision, Result};
}
