//! Convolution Metadata - Shape Parameters and Output Shape Rule
//!
//! The shape-level description of one convolution instance: kernel extent,
//! padding, stride, dilation, grouping and channel counts. Kernel selection
//! and shape inference are pure functions of this metadata.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use crate::error::{KernelError, KernelResult};

// =============================================================================
// ConvMeta
// =============================================================================

/// Shape parameters of a convolution instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvMeta {
    /// Number of convolution groups.
    pub group: usize,
    /// Padding along the height axis.
    pub pad_h: usize,
    /// Padding along the width axis.
    pub pad_w: usize,
    /// Stride along the height axis.
    pub stride_h: usize,
    /// Stride along the width axis.
    pub stride_w: usize,
    /// Dilation along the height axis.
    pub dilation_h: usize,
    /// Dilation along the width axis.
    pub dilation_w: usize,
    /// Kernel height.
    pub kernel_h: usize,
    /// Kernel width.
    pub kernel_w: usize,
    /// Input channel count of the whole convolution.
    pub in_channels: usize,
    /// Output channel count (filter count).
    pub out_channels: usize,
    /// Whether a bias vector participates.
    pub bias_term: bool,
}

impl ConvMeta {
    /// Builds metadata for a square-kernel convolution with unit stride
    /// and dilation and no padding.
    #[must_use]
    pub fn simple(kernel: usize, in_channels: usize, out_channels: usize) -> Self {
        Self {
            group: 1,
            pad_h: 0,
            pad_w: 0,
            stride_h: 1,
            stride_w: 1,
            dilation_h: 1,
            dilation_w: 1,
            kernel_h: kernel,
            kernel_w: kernel,
            in_channels,
            out_channels,
            bias_term: true,
        }
    }

    /// Builds pointwise (1x1) metadata.
    #[must_use]
    pub fn pointwise(group: usize, in_channels: usize, out_channels: usize, bias: bool) -> Self {
        Self {
            group,
            bias_term: bias,
            ..Self::simple(1, in_channels, out_channels)
        }
    }

    /// Builds depthwise metadata (one group per channel).
    #[must_use]
    pub fn depthwise(channels: usize, kernel: usize) -> Self {
        Self {
            group: channels,
            ..Self::simple(kernel, channels, channels)
        }
    }

    /// Returns true for depthwise configurations.
    #[must_use]
    pub const fn is_depthwise(&self) -> bool {
        self.group == self.in_channels && self.group == self.out_channels
    }

    /// Input channels seen by one group.
    #[must_use]
    pub const fn in_channels_per_group(&self) -> usize {
        self.in_channels / self.group
    }

    /// Output channels produced by one group.
    #[must_use]
    pub const fn out_channels_per_group(&self) -> usize {
        self.out_channels / self.group
    }

    /// Expected weight shape in canonical OIHW order.
    #[must_use]
    pub fn weight_shape(&self) -> Vec<usize> {
        vec![
            self.out_channels,
            self.in_channels_per_group(),
            self.kernel_h,
            self.kernel_w,
        ]
    }

    /// Computes the output shape for an `[n, c, h, w]` input.
    ///
    /// Pure shape computation; weights are never touched.
    pub fn compute_output_shape(&self, input_shape: &[usize]) -> KernelResult<Vec<usize>> {
        let &[n, c, h, w] = input_shape else {
            return Err(KernelError::dispatch_shape(format!(
                "expected 4-d input, got {:?}",
                input_shape
            )));
        };
        if c != self.in_channels {
            return Err(KernelError::dispatch_shape(format!(
                "input has {c} channels, convolution expects {}",
                self.in_channels
            )));
        }

        let eff_kh = self.dilation_h * (self.kernel_h - 1) + 1;
        let eff_kw = self.dilation_w * (self.kernel_w - 1) + 1;
        let padded_h = h + 2 * self.pad_h;
        let padded_w = w + 2 * self.pad_w;
        if padded_h < eff_kh || padded_w < eff_kw {
            return Err(KernelError::dispatch_shape(format!(
                "kernel {eff_kh}x{eff_kw} exceeds padded input {padded_h}x{padded_w}"
            )));
        }

        let out_h = (padded_h - eff_kh) / self.stride_h + 1;
        let out_w = (padded_w - eff_kw) / self.stride_w + 1;
        Ok(vec![n, self.out_channels, out_h, out_w])
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_shape_same_padding() {
        let meta = ConvMeta {
            pad_h: 1,
            pad_w: 1,
            ..ConvMeta::simple(3, 4, 8)
        };
        let out = meta.compute_output_shape(&[2, 4, 16, 16]).unwrap();
        assert_eq!(out, vec![2, 8, 16, 16]);
    }

    #[test]
    fn test_output_shape_stride() {
        let meta = ConvMeta {
            stride_h: 2,
            stride_w: 2,
            ..ConvMeta::simple(1, 3, 6)
        };
        let out = meta.compute_output_shape(&[1, 3, 8, 8]).unwrap();
        assert_eq!(out, vec![1, 6, 4, 4]);
    }

    #[test]
    fn test_output_shape_dilation() {
        let meta = ConvMeta {
            dilation_h: 2,
            dilation_w: 2,
            ..ConvMeta::simple(3, 1, 1)
        };
        // effective kernel 5x5
        let out = meta.compute_output_shape(&[1, 1, 9, 9]).unwrap();
        assert_eq!(out, vec![1, 1, 5, 5]);
    }

    #[test]
    fn test_output_shape_channel_mismatch() {
        let meta = ConvMeta::simple(3, 4, 8);
        assert!(meta.compute_output_shape(&[1, 3, 8, 8]).is_err());
    }

    #[test]
    fn test_output_shape_kernel_too_large() {
        let meta = ConvMeta::simple(5, 1, 1);
        assert!(meta.compute_output_shape(&[1, 1, 3, 3]).is_err());
    }

    #[test]
    fn test_depthwise_helpers() {
        let meta = ConvMeta::depthwise(8, 3);
        assert!(meta.is_depthwise());
        assert_eq!(meta.in_channels_per_group(), 1);
        assert_eq!(meta.weight_shape(), vec![8, 1, 3, 3]);
    }
}
