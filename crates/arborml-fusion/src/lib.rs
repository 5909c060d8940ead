//! Arborml Fusion - Convolution Weight Fusion Transform
//!
//! Folds chains of auxiliary numeric operators (batch normalization, affine
//! channel scale, activation, elementwise merge) into a preceding
//! convolution's weights and bias, so a single kernel call reproduces the
//! whole chain at inference time. Supports floating-point and quantized
//! (int8) weights and both forward and transposed convolution layouts.
//!
//! The transform mutates the host copy of a [`arborml_tensor::WeightBlock`]
//! in place and re-derives the device mirror; callers guard it with the
//! weight pool's `fuse_once` so a shared block is rewritten exactly once.
//!
//! # Example
//! ```ignore
//! use arborml_fusion::{fuse_conv_weights, FusionDescriptor};
//!
//! fuse_conv_weights(&weights, &bias, &descriptor)?;
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

pub mod descriptor;
pub mod error;
pub mod int8;
pub mod weights;

// =============================================================================
// Re-exports
// =============================================================================

pub use descriptor::{
    Activation, ActivationKind, AffineScaleParams, BatchNormParams, EltwiseKind, EltwiseSpec,
    FusionDescriptor,
};
pub use error::{FusionError, FusionResult};
pub use int8::{fuse_conv_weights_int8, fuse_deconv_weights_int8};
pub use weights::{fuse_conv_weights, fuse_deconv_weights};
