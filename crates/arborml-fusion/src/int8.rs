//! Weight Fusion Transform - Quantized (Int8) Path
//!
//! Quantized weights store `value = scale[i] * stored_i8`, so folding the
//! per-channel coefficient `alpha[i]` multiplies the channel's quantization
//! scale instead of the stored integers. When the product turns negative
//! the scale is negated back to positive and every stored element in the
//! channel flips sign, keeping the represented real value identical while
//! preserving the invariant that quantization scale is non-negative.
//!
//! Bias stays in fp32 and follows the same rewrite as the floating-point
//! path.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use arborml_tensor::shape::as_nchw;
use arborml_tensor::WeightBlock;

use crate::descriptor::FusionDescriptor;
use crate::error::{FusionError, FusionResult};
use crate::weights::{channel_coefficients, ensure_bias, rewrite_bias};

// =============================================================================
// Forward Convolution
// =============================================================================

/// Folds a [`FusionDescriptor`] into int8 convolution weights and fp32
/// bias.
///
/// The weights' per-channel quantization scale must already cover all `n`
/// output channels (a broadcast scale is expanded by the operator layer
/// before fusion runs).
pub fn fuse_conv_weights_int8(
    weights: &WeightBlock<i8>,
    bias: &WeightBlock<f32>,
    descriptor: &FusionDescriptor,
) -> FusionResult<()> {
    let (n, c, h, w) = as_nchw(&weights.shape())?;
    let chw = c * h * w;
    if n == 0 || chw == 0 {
        return Err(FusionError::EmptyWeights);
    }
    descriptor.validate_channels(n)?;
    ensure_bias(bias, n)?;

    let mut w_scale = weights.scale();
    if w_scale.len() != n {
        return Err(FusionError::MissingScale {
            expected: n,
            actual: w_scale.len(),
        });
    }

    let (alpha, beta) = channel_coefficients(descriptor, n);

    {
        let host = weights.host_tensor();
        let mut data = host.as_slice_mut();
        for i in 0..n {
            w_scale[i] *= alpha[i];
            if w_scale[i] < 0.0 {
                w_scale[i] = w_scale[i].abs();
                for v in &mut data[i * chw..(i + 1) * chw] {
                    *v = v.wrapping_neg();
                }
            }
        }
    }
    rewrite_bias(bias, &alpha, &beta);

    weights.set_scale(w_scale);
    weights.sync_device()?;
    bias.sync_device()?;
    Ok(())
}

// =============================================================================
// Transposed Convolution
// =============================================================================

/// Folds a [`FusionDescriptor`] into int8 transposed-convolution weights.
///
/// Weight layout is `(c, n, h, w)` as in
/// [`crate::weights::fuse_deconv_weights`]; the sign flip for a negative
/// scale walks every element across the first dimension at the channel's
/// spatial offset.
pub fn fuse_deconv_weights_int8(
    weights: &WeightBlock<i8>,
    bias: &WeightBlock<f32>,
    descriptor: &FusionDescriptor,
) -> FusionResult<()> {
    let (c, n, h, w) = as_nchw(&weights.shape())?;
    let hw = h * w;
    let chw = n * hw;
    if n == 0 || c == 0 || hw == 0 {
        return Err(FusionError::EmptyWeights);
    }
    descriptor.validate_channels(n)?;
    ensure_bias(bias, n)?;

    let mut w_scale = weights.scale();
    if w_scale.len() != n {
        return Err(FusionError::MissingScale {
            expected: n,
            actual: w_scale.len(),
        });
    }

    let (alpha, beta) = channel_coefficients(descriptor, n);

    {
        let host = weights.host_tensor();
        let mut data = host.as_slice_mut();
        for i in 0..n {
            w_scale[i] *= alpha[i];
            if w_scale[i] < 0.0 {
                w_scale[i] = w_scale[i].abs();
                for ni in 0..c {
                    let start = ni * chw + i * hw;
                    for v in &mut data[start..start + hw] {
                        *v = v.wrapping_neg();
                    }
                }
            }
        }
    }
    rewrite_bias(bias, &alpha, &beta);

    weights.set_scale(w_scale);
    weights.sync_device()?;
    bias.sync_device()?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::AffineScaleParams;
    use arborml_core::Device;

    fn int8_block(n: usize, chw: usize, scale: Vec<f32>) -> WeightBlock<i8> {
        let data: Vec<i8> = (0..n * chw).map(|v| (v as i8) - 4).collect();
        let block = WeightBlock::from_vec(data, &[n, chw, 1, 1], Device::Cpu).unwrap();
        block.set_scale(scale);
        block
    }

    fn scale_desc(weight: Vec<f32>) -> FusionDescriptor {
        FusionDescriptor {
            batchnorm: None,
            scale: Some(AffineScaleParams {
                weight,
                bias: Vec::new(),
                bias_term: false,
            }),
            activation: None,
        }
    }

    #[test]
    fn test_positive_alpha_touches_scale_only() {
        let weights = int8_block(2, 3, vec![0.5, 0.25]);
        let before = weights.host_tensor().to_vec();
        let bias = WeightBlock::from_vec(vec![1.0, 1.0], &[2], Device::Cpu).unwrap();

        fuse_conv_weights_int8(&weights, &bias, &scale_desc(vec![2.0, 4.0])).unwrap();

        assert_eq!(weights.host_tensor().to_vec(), before);
        assert_eq!(weights.scale(), vec![1.0, 1.0]);
        assert_eq!(bias.host_tensor().to_vec(), vec![2.0, 4.0]);
    }

    #[test]
    fn test_negative_alpha_flips_channel_sign() {
        let weights = int8_block(2, 3, vec![0.5, 0.5]);
        let before = weights.host_tensor().to_vec();
        let bias = WeightBlock::from_vec(vec![0.0, 0.0], &[2], Device::Cpu).unwrap();

        fuse_conv_weights_int8(&weights, &bias, &scale_desc(vec![-2.0, 3.0])).unwrap();

        // scale stays non-negative
        assert_eq!(weights.scale(), vec![1.0, 1.5]);
        let after = weights.host_tensor().to_vec();
        // flipped channel inverted, other channel untouched
        for j in 0..3 {
            assert_eq!(after[j], -before[j]);
            assert_eq!(after[3 + j], before[3 + j]);
        }
        // represented real value unchanged: (-scale) * w == scale * (-w)
        for j in 0..3 {
            let reference = 0.5 * -2.0 * f32::from(before[j]);
            let stored = 1.0 * f32::from(after[j]);
            assert!((reference - stored).abs() < 1e-6);
        }
    }

    #[test]
    fn test_scale_propagated_to_device_mirror() {
        let weights = int8_block(1, 2, vec![0.5]);
        let bias = WeightBlock::<f32>::empty(Device::Cpu);

        fuse_conv_weights_int8(&weights, &bias, &scale_desc(vec![-1.0])).unwrap();

        assert_eq!(weights.device_tensor().scale(), vec![0.5]);
        assert_eq!(
            weights.device_tensor().to_vec(),
            weights.host_tensor().to_vec()
        );
    }

    #[test]
    fn test_missing_scale_rejected() {
        let weights = int8_block(2, 2, Vec::new());
        let bias = WeightBlock::<f32>::empty(Device::Cpu);
        assert!(matches!(
            fuse_conv_weights_int8(&weights, &bias, &scale_desc(vec![1.0, 1.0])),
            Err(FusionError::MissingScale { .. })
        ));
    }

    #[test]
    fn test_deconv_int8_sign_flip_walks_columns() {
        // layout (c=2, n=2, 1, 1)
        let weights =
            WeightBlock::from_vec(vec![1_i8, 2, 3, 4], &[2, 2, 1, 1], Device::Cpu).unwrap();
        weights.set_scale(vec![0.5, 0.5]);
        let bias = WeightBlock::from_vec(vec![0.0, 0.0], &[2], Device::Cpu).unwrap();

        fuse_deconv_weights_int8(&weights, &bias, &scale_desc(vec![-1.0, 1.0])).unwrap();

        // channel 0 is the first column of the (2, 2) buffer
        assert_eq!(weights.host_tensor().to_vec(), vec![-1, 2, -3, 4]);
        assert_eq!(weights.scale(), vec![0.5, 0.5]);
    }
}
