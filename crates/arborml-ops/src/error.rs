//! Operator Error Types
//!
//! Error taxonomy of the operator layer. Configuration errors are fatal at
//! construction/parse time and never retried; kernel errors surface either
//! as fatal initialization failures or as propagated dispatch status.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use thiserror::Error;

/// Result type for operator operations.
pub type OpResult<T> = Result<T, OpError>;

/// Errors that can occur in the operator layer.
#[derive(Error, Debug)]
pub enum OpError {
    /// A required attribute is absent.
    #[error("missing attribute: {name}")]
    MissingAttribute {
        /// Name of the absent attribute.
        name: String,
    },

    /// An attribute holds a different type than requested.
    #[error("attribute {name} is not a {expected}")]
    AttributeType {
        /// Name of the attribute.
        name: String,
        /// The requested type.
        expected: &'static str,
    },

    /// The operator's fused configuration is invalid.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration problem.
        message: String,
    },

    /// A lifecycle method was called before `init_param` / `init`.
    #[error("operator is not initialized")]
    NotInitialized,

    /// Weight fusion failed.
    #[error(transparent)]
    Fusion(#[from] arborml_fusion::FusionError),

    /// Kernel selection, layout or dispatch failed.
    #[error(transparent)]
    Kernel(#[from] arborml_kernels::KernelError),

    /// Tensor-level failure.
    #[error(transparent)]
    Core(#[from] arborml_core::Error),
}

impl OpError {
    /// Creates a missing-attribute error.
    #[must_use]
    pub fn missing(name: impl Into<String>) -> Self {
        Self::MissingAttribute { name: name.into() }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
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
    fn test_missing_display() {
        assert_eq!(
            OpError::missing("weights").to_string(),
            "missing attribute: weights"
        );
    }

    #[test]
    fn test_config_display() {
        let err = OpError::config("no merge descriptor");
        assert!(err.to_string().contains("no merge descriptor"));
    }
}
