//! Fused Convolution Parameters
//!
//! The assembled parameter bag a fused operator hands to its kernel:
//! shape metadata, the (possibly quantized) weight block, bias, the
//! absorbed activation and elementwise merge, and the scalar accumulation
//! coefficients carried for the quantized path.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use arborml_core::{DType, Precision};
use arborml_fusion::{Activation, EltwiseSpec};
use arborml_tensor::{BlockId, WeightBlock};

use crate::meta::ConvMeta;

// =============================================================================
// ConvWeights
// =============================================================================

/// Weight storage of a fused convolution, tagged by element type.
#[derive(Debug, Clone)]
pub enum ConvWeights {
    /// Floating-point weights.
    F32(WeightBlock<f32>),
    /// Quantized int8 weights with per-channel scale.
    I8(WeightBlock<i8>),
}

impl ConvWeights {
    /// Returns the identity of the underlying block.
    #[must_use]
    pub fn id(&self) -> BlockId {
        match self {
            Self::F32(b) => b.id(),
            Self::I8(b) => b.id(),
        }
    }

    /// Returns the weight shape.
    #[must_use]
    pub fn shape(&self) -> Vec<usize> {
        match self {
            Self::F32(b) => b.shape(),
            Self::I8(b) => b.shape(),
        }
    }

    /// Returns true if the block holds no elements.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::F32(b) => b.is_empty(),
            Self::I8(b) => b.is_empty(),
        }
    }

    /// Returns the element dtype of the weights.
    #[must_use]
    pub const fn dtype(&self) -> DType {
        match self {
            Self::F32(_) => DType::F32,
            Self::I8(_) => DType::I8,
        }
    }

    /// Returns the per-channel quantization scale of the weights.
    #[must_use]
    pub fn scale(&self) -> Vec<f32> {
        match self {
            Self::F32(b) => b.scale(),
            Self::I8(b) => b.scale(),
        }
    }
}

// =============================================================================
// FusedConvParams
// =============================================================================

/// Parameter bag of one fused convolution instance.
#[derive(Debug, Clone)]
pub struct FusedConvParams {
    /// Shape-level convolution parameters.
    pub meta: ConvMeta,
    /// Weight block (already fused).
    pub weights: ConvWeights,
    /// Bias block (materialized during fusion when absent).
    pub bias: WeightBlock<f32>,
    /// Execution precision of the owning instance.
    pub precision: Precision,
    /// Activation absorbed from the fused chain, applied after bias.
    pub activation: Option<Activation>,
    /// Elementwise merge absorbed from the fused chain, applied last.
    pub eltwise: Option<EltwiseSpec>,
    /// Scalar multiplier on the convolution accumulator.
    pub alpha: f32,
    /// Additive bias-scale term used by quantized kernels. Rewritten at
    /// initialization on targets that derive it from input/weight scale.
    pub beta: f32,
}

impl FusedConvParams {
    /// Builds a parameter bag with neutral accumulation coefficients.
    #[must_use]
    pub fn new(
        meta: ConvMeta,
        weights: ConvWeights,
        bias: WeightBlock<f32>,
        precision: Precision,
    ) -> Self {
        Self {
            meta,
            weights,
            bias,
            precision,
            activation: None,
            eltwise: None,
            alpha: 1.0,
            beta: 0.0,
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use arborml_core::Device;

    #[test]
    fn test_conv_weights_dtype() {
        let f = ConvWeights::F32(WeightBlock::empty(Device::Cpu));
        let q = ConvWeights::I8(WeightBlock::empty(Device::Cpu));
        assert_eq!(f.dtype(), DType::F32);
        assert_eq!(q.dtype(), DType::I8);
    }

    #[test]
    fn test_params_defaults() {
        let weights =
            ConvWeights::F32(WeightBlock::from_vec(vec![0.0; 9], &[1, 1, 3, 3], Device::Cpu).unwrap());
        let bias = WeightBlock::empty(Device::Cpu);
        let params = FusedConvParams::new(ConvMeta::simple(3, 1, 1), weights, bias, Precision::Fp32);
        assert_eq!(params.alpha, 1.0);
        assert_eq!(params.beta, 0.0);
        assert!(params.activation.is_none());
    }
}
