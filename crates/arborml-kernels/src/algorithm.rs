//! Convolution Algorithm Variants
//!
//! The closed set of compute-kernel variants a fused convolution can be
//! lowered to. One variant is chosen per operator instance at
//! initialization and stays fixed for the instance's lifetime.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use core::fmt;

// =============================================================================
// ConvAlgorithm
// =============================================================================

/// Compute-kernel variant implementing a fused convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConvAlgorithm {
    /// Generic vendor-library kernel; handles every configuration.
    Vendor,
    /// Pointwise kernel for 1x1 / stride 1 / no padding / ungrouped convs
    /// with bias.
    K1x1S1P0,
    /// Specialized 3x3 / stride 1 / dilation 1 / ungrouped kernel.
    K3x3S1D1,
    /// Per-channel kernel for depthwise convolutions.
    Depthwise,
    /// Direct kernel with input-channel-major weight layout, preferred for
    /// wide input channel counts.
    Direct,
}

impl ConvAlgorithm {
    /// Returns the lowercase name of this algorithm.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Vendor => "vendor",
            Self::K1x1S1P0 => "k1x1s1p0",
            Self::K3x3S1D1 => "k3x3s1d1",
            Self::Depthwise => "depthwise",
            Self::Direct => "direct",
        }
    }

    /// Returns true if this variant consumes a transposed weight layout.
    ///
    /// Only the direct kernel re-lays weights; the other variants read the
    /// canonical OIHW order and their layout step is a flag-only no-op.
    #[must_use]
    pub const fn wants_input_major_weights(self) -> bool {
        matches!(self, Self::Direct)
    }
}

impl fmt::Display for ConvAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_names() {
        assert_eq!(ConvAlgorithm::Vendor.name(), "vendor");
        assert_eq!(ConvAlgorithm::K1x1S1P0.name(), "k1x1s1p0");
        assert_eq!(format!("{}", ConvAlgorithm::Depthwise), "depthwise");
    }

    #[test]
    fn test_only_direct_relays_weights() {
        assert!(ConvAlgorithm::Direct.wants_input_major_weights());
        assert!(!ConvAlgorithm::Vendor.wants_input_major_weights());
        assert!(!ConvAlgorithm::K3x3S1D1.wants_input_major_weights());
    }
}
