//! Arborml Kernels - Convolution Kernel Selection and Strategies
//!
//! Chooses the concrete compute kernel implementing a fused convolution for
//! a given device, precision and shape, and owns the weight-layout
//! transposition that kernel expects. Selection happens exactly once at
//! operator initialization: the (device, precision) pair is resolved into a
//! [`ConvKernel`] strategy object that is cached for the instance's
//! lifetime and never re-branched per call.
//!
//! # Key Features
//! - Closed [`ConvAlgorithm`] set with an ordered, testable rule table
//! - One [`ConvKernel`] strategy per algorithm (init / trans / dispatch)
//! - Idempotent weight-layout transposition for the direct kernel
//!
//! # Example
//! ```rust
//! use arborml_kernels::{select_algorithm, ConvAlgorithm, ConvMeta};
//! use arborml_core::{Device, Precision};
//!
//! let meta = ConvMeta::pointwise(1, 8, 8, true);
//! let alg = select_algorithm(Device::Cuda(0), Precision::Fp32, &meta);
//! assert_eq!(alg, ConvAlgorithm::K1x1S1P0);
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

pub mod algorithm;
pub mod conv;
pub mod error;
pub mod layout;
pub mod meta;
pub mod params;
pub mod selector;

// =============================================================================
// Re-exports
// =============================================================================

pub use algorithm::ConvAlgorithm;
pub use conv::{create_kernel, ConvKernel};
pub use error::{KernelError, KernelResult};
pub use meta::ConvMeta;
pub use params::{ConvWeights, FusedConvParams};
pub use selector::{cascade, select_algorithm, SelectionRule, SELECTION_RULES};
