//! Arborml Core - Foundation Layer for the ArborML Inference Optimizer
//!
//! This crate provides the core abstractions that underpin the ArborML
//! fused-operator optimizer: compute-device and precision tags, the scalar
//! type system, and the reference-counted storage that backs tensors and
//! mirrored weight blocks.
//!
//! # Key Features
//! - Device abstraction (CPU vector backend, CUDA device tag)
//! - Execution precision tags (FP32, FP16, INT8) used for kernel selection
//! - Type-safe scalar system (f32, f16, i8, i32)
//! - Reference-counted, lock-guarded memory storage
//!
//! # Example
//! ```rust
//! use arborml_core::{Device, Precision, Storage};
//!
//! let device = Device::Cpu;
//! let precision = Precision::Fp32;
//! let storage = Storage::<f32>::zeros(1024, device);
//! assert!(precision.is_float());
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

pub mod device;
pub mod dtype;
pub mod error;
pub mod precision;
pub mod storage;

// =============================================================================
// Re-exports
// =============================================================================

pub use device::{Device, DeviceCapabilities};
pub use dtype::{DType, Float, Numeric, Scalar};
pub use error::{Error, Result};
pub use precision::Precision;
pub use storage::Storage;

// =============================================================================
// Prelude
// =============================================================================

/// Convenient imports for common usage.
pub mod prelude {
    pub use crate::device::Device;
    pub use crate::dtype::{DType, Float, Numeric, Scalar};
    pub use crate::error::{Error, Result};
    pub use crate::precision::Precision;
    pub use crate::storage::Storage;
}
