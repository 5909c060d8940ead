//! Fusion Descriptor - Absorbed Operator Parameters
//!
//! The set of auxiliary operator parameters a convolution absorbs during
//! fusion: batch-normalization statistics, affine channel scale
//! coefficients, an activation specifier and an optional elementwise merge.
//! A descriptor is assembled once when the owning operator's attributes are
//! parsed and is immutable afterwards.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use crate::error::{FusionError, FusionResult};

// =============================================================================
// Batch Normalization
// =============================================================================

/// Batch-normalization statistics absorbed into the convolution.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchNormParams {
    /// Per-channel running mean.
    pub mean: Vec<f32>,
    /// Per-channel running variance.
    pub variance: Vec<f32>,
    /// Single scale-inverse coefficient applied to mean and variance.
    pub scale_factor: f32,
    /// Numerical stability term added to the variance.
    pub epsilon: f32,
}

impl BatchNormParams {
    /// Returns the effective inverse of the scale factor.
    ///
    /// A stored factor of zero denotes an unscaled accumulator and maps to
    /// an effective factor of one.
    #[must_use]
    pub fn inv_factor(&self) -> f32 {
        if self.scale_factor == 0.0 {
            1.0
        } else {
            1.0 / self.scale_factor
        }
    }
}

// =============================================================================
// Affine Channel Scale
// =============================================================================

/// Per-channel affine scale coefficients absorbed into the convolution.
#[derive(Debug, Clone, PartialEq)]
pub struct AffineScaleParams {
    /// Per-channel multiplicative weight.
    pub weight: Vec<f32>,
    /// Per-channel additive bias (ignored when `bias_term` is false).
    pub bias: Vec<f32>,
    /// Whether the additive bias participates.
    pub bias_term: bool,
}

impl AffineScaleParams {
    /// Builds coefficients for an affine-channel operator, whose bias is
    /// always present.
    #[must_use]
    pub fn affine_channel(weight: Vec<f32>, bias: Vec<f32>) -> Self {
        Self {
            weight,
            bias,
            bias_term: true,
        }
    }
}

// =============================================================================
// Activation
// =============================================================================

/// Activation function kinds a fused convolution can absorb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationKind {
    /// Rectified linear unit.
    Relu,
    /// Parametric ReLU with a negative-side slope.
    PRelu,
}

/// Activation specifier: kind plus the optional slope used by
/// bounded-below activations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Activation {
    /// The activation kind.
    pub kind: ActivationKind,
    /// Negative-side slope for [`ActivationKind::PRelu`].
    pub neg_slope: Option<f32>,
}

impl Activation {
    /// Plain ReLU.
    #[must_use]
    pub const fn relu() -> Self {
        Self {
            kind: ActivationKind::Relu,
            neg_slope: None,
        }
    }

    /// Parametric ReLU with the given negative-side slope.
    #[must_use]
    pub const fn prelu(neg_slope: f32) -> Self {
        Self {
            kind: ActivationKind::PRelu,
            neg_slope: Some(neg_slope),
        }
    }

    /// Applies the activation to a single value.
    #[inline]
    #[must_use]
    pub fn apply(&self, x: f32) -> f32 {
        match self.kind {
            ActivationKind::Relu => x.max(0.0),
            ActivationKind::PRelu => {
                if x >= 0.0 {
                    x
                } else {
                    x * self.neg_slope.unwrap_or(0.0)
                }
            }
        }
    }
}

// =============================================================================
// Elementwise Merge
// =============================================================================

/// Elementwise merge kinds a fused convolution can absorb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EltwiseKind {
    /// Coefficient-weighted sum.
    Sum,
    /// Elementwise maximum.
    Max,
    /// Elementwise product.
    Prod,
}

impl EltwiseKind {
    /// Parses the merge-type attribute string.
    ///
    /// `"Add"` merges by sum, `"Max"` by maximum; anything else falls back
    /// to product.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "Add" => Self::Sum,
            "Max" => Self::Max,
            _ => Self::Prod,
        }
    }
}

/// Elementwise merge descriptor: kind, per-operand coefficients and an
/// optional trailing activation.
#[derive(Debug, Clone, PartialEq)]
pub struct EltwiseSpec {
    /// The merge kind.
    pub kind: EltwiseKind,
    /// Per-operand coefficients (used by [`EltwiseKind::Sum`]).
    pub coeffs: Vec<f32>,
    /// Activation applied after the merge, if any.
    pub activation: Option<Activation>,
}

impl EltwiseSpec {
    /// Merges the convolution result with the residual operand.
    #[inline]
    #[must_use]
    pub fn merge(&self, conv: f32, residual: f32) -> f32 {
        let merged = match self.kind {
            EltwiseKind::Sum => {
                let ca = self.coeffs.first().copied().unwrap_or(1.0);
                let cb = self.coeffs.get(1).copied().unwrap_or(1.0);
                ca * conv + cb * residual
            }
            EltwiseKind::Max => conv.max(residual),
            EltwiseKind::Prod => conv * residual,
        };
        match &self.activation {
            Some(act) => act.apply(merged),
            None => merged,
        }
    }
}

// =============================================================================
// Fusion Descriptor
// =============================================================================

/// All auxiliary operator parameters an owning convolution absorbs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FusionDescriptor {
    /// Batch-normalization statistics, if a batchnorm was absorbed.
    pub batchnorm: Option<BatchNormParams>,
    /// Affine channel scale, if a scale operator was absorbed.
    pub scale: Option<AffineScaleParams>,
    /// Activation applied after the convolution, if any.
    pub activation: Option<Activation>,
}

impl FusionDescriptor {
    /// Checks that every per-channel vector covers `channels` output
    /// channels.
    ///
    /// A mismatched length is a caller contract violation and rejects the
    /// whole descriptor; nothing is partially applied.
    pub fn validate_channels(&self, channels: usize) -> FusionResult<()> {
        if let Some(bn) = &self.batchnorm {
            for len in [bn.mean.len(), bn.variance.len()] {
                if len != channels {
                    return Err(FusionError::ChannelMismatch {
                        expected: channels,
                        actual: len,
                    });
                }
            }
        }
        if let Some(scale) = &self.scale {
            if scale.weight.len() != channels {
                return Err(FusionError::ChannelMismatch {
                    expected: channels,
                    actual: scale.weight.len(),
                });
            }
            if scale.bias_term && scale.bias.len() != channels {
                return Err(FusionError::ChannelMismatch {
                    expected: channels,
                    actual: scale.bias.len(),
                });
            }
        }
        Ok(())
    }

    /// Returns true when there is nothing to fold into the weights.
    #[must_use]
    pub const fn is_identity(&self) -> bool {
        self.batchnorm.is_none() && self.scale.is_none()
    }
}

// =============================================================================
// Tests
// =============================================================================
