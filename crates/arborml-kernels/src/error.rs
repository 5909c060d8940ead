//! Kernel Error Types
//!
//! Error types for kernel selection, layout and dispatch.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use thiserror::Error;

use crate::algorithm::ConvAlgorithm;

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;

/// Errors that can occur in kernel selection and dispatch.
#[derive(Error, Debug)]
pub enum KernelError {
    /// The selected algorithm cannot execute this shape/precision/device
    /// combination. Fatal at initialization; never raised per call.
    #[error("{algorithm} kernel does not support this configuration: {reason}")]
    Unsupported {
        /// The algorithm that was selected.
        algorithm: ConvAlgorithm,
        /// Why the configuration is not executable.
        reason: String,
    },

    /// Input/output rank or dimensions do not match the convolution.
    #[error("dispatch shape mismatch: {message}")]
    DispatchShape {
        /// Description of the mismatch.
        message: String,
    },

    /// The elementwise-merge path needs a residual operand that is absent.
    #[error("elementwise merge requires a residual input")]
    MissingResidual,

    /// Tensor-level failure inside a kernel.
    #[error("tensor error: {0}")]
    Tensor(#[from] arborml_core::Error),
}

impl KernelError {
    /// Creates an unsupported-configuration error.
    #[must_use]
    pub fn unsupported(algorithm: ConvAlgorithm, reason: impl Into<String>) -> Self {
        Self::Unsupported {
            algorithm,
            reason: reason.into(),
        }
    }

    /// Creates a dispatch shape mismatch error.
    #[must_use]
    pub fn dispatch_shape(message: impl Into<String>) -> Self {
        Self::DispatchShape {
            message: message.into(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_display() {
        let err = KernelError::unsupported(ConvAlgorithm::K1x1S1P0, "padding must be zero");
        assert!(err.to_string().contains("k1x1s1p0"));
        assert!(err.to_string().contains("padding"));
    }
}
