//! Fusion Error Types
//!
//! Error types for the weight fusion transform.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use thiserror::Error;

/// Result type for fusion operations.
pub type FusionResult<T> = Result<T, FusionError>;

/// Errors that can occur during weight fusion.
#[derive(Error, Debug)]
pub enum FusionError {
    /// A per-channel parameter vector does not cover every output channel.
    #[error("per-channel parameter length mismatch: expected {expected}, got {actual}")]
    ChannelMismatch {
        /// Output channel count of the convolution.
        expected: usize,
        /// Length of the offending per-channel vector.
        actual: usize,
    },

    /// The weight block holds no elements.
    #[error("weight block has no elements to fuse")]
    EmptyWeights,

    /// Quantized weights carry no per-channel scale.
    #[error("quantized weights require a per-channel scale ({expected} channels, got {actual})")]
    MissingScale {
        /// Output channel count of the convolution.
        expected: usize,
        /// Number of scale entries found.
        actual: usize,
    },

    /// Tensor-level failure while rewriting weights.
    #[error("tensor error: {0}")]
    Tensor(#[from] arborml_core::Error),
}

// =============================================================================
// Tests
// =============================================================================
