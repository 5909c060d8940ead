//! Weight Fusion Transform - Floating-Point Path
//!
//! Rewrites a convolution's weights and bias in place so that the plain
//! convolution reproduces the output of the original
//! conv → batchnorm → scale chain. For each output channel `i` the chain
//! reduces to an affine transform `y = alpha[i] * conv(x) + beta[i]`;
//! folding multiplies channel `i`'s weight slice by `alpha[i]` and rewrites
//! `bias[i] = bias[i] * alpha[i] + beta[i]`.
//!
//! The transposed-convolution variant walks the same coefficients over the
//! swapped weight layout, where the kernel's channel axis occupies the
//! position the forward convolution uses for the output count.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use rayon::prelude::*;

use arborml_tensor::shape::as_nchw;
use arborml_tensor::WeightBlock;

use crate::descriptor::FusionDescriptor;
use crate::error::{FusionError, FusionResult};

// =============================================================================
// Channel Coefficients
// =============================================================================

/// Computes the per-channel affine coefficients `(alpha, beta)` a
/// descriptor folds into the convolution.
///
/// Batchnorm contributes `alpha = 1/sqrt(variance*inv_factor + eps)` and
/// `beta = -mean*inv_factor*alpha`; an affine scale then folds on top as
/// `alpha *= w`, `beta = beta*w + b`. Either half may be absent.
pub(crate) fn channel_coefficients(
    descriptor: &FusionDescriptor,
    channels: usize,
) -> (Vec<f32>, Vec<f32>) {
    let mut alpha = vec![1.0_f32; channels];
    let mut beta = vec![0.0_f32; channels];

    if let Some(bn) = &descriptor.batchnorm {
        let inv = bn.inv_factor();
        for i in 0..channels {
            let a = 1.0 / (bn.variance[i] * inv + bn.epsilon).sqrt();
            alpha[i] = a;
            beta[i] = -(bn.mean[i] * inv) * a;
        }
    }

    if let Some(scale) = &descriptor.scale {
        for i in 0..channels {
            alpha[i] *= scale.weight[i];
            beta[i] = beta[i] * scale.weight[i]
                + if scale.bias_term { scale.bias[i] } else { 0.0 };
        }
    }

    (alpha, beta)
}

/// Materializes an absent bias as a zero vector of length `channels`.
///
/// The caller is responsible for persisting the "bias now present" flag so
/// later passes do not re-allocate it.
pub(crate) fn ensure_bias(bias: &WeightBlock<f32>, channels: usize) -> FusionResult<()> {
    if bias.is_empty() {
        bias.realloc(&[channels]);
        return Ok(());
    }
    if bias.numel() != channels {
        return Err(FusionError::ChannelMismatch {
            expected: channels,
            actual: bias.numel(),
        });
    }
    Ok(())
}

/// Applies the per-channel bias rewrite shared by every variant.
pub(crate) fn rewrite_bias(bias: &WeightBlock<f32>, alpha: &[f32], beta: &[f32]) {
    let host = bias.host_tensor();
    let mut data = host.as_slice_mut();
    for i in 0..alpha.len() {
        data[i] = data[i] * alpha[i] + beta[i];
    }
}

// =============================================================================
// Forward Convolution
// =============================================================================

/// Folds a [`FusionDescriptor`] into fp32 convolution weights and bias.
///
/// `weights` has shape `(n, c, h, w)` with `n` output channels; every
/// per-channel vector in the descriptor must have length `n`. A missing
/// bias is allocated zero-filled as a side effect. After the rewrite the
/// host copy is the source of truth and both device mirrors are re-derived
/// from it.
pub fn fuse_conv_weights(
    weights: &WeightBlock<f32>,
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

    let (alpha, beta) = channel_coefficients(descriptor, n);

    {
        let host = weights.host_tensor();
        let mut data = host.as_slice_mut();
        data.par_chunks_mut(chw)
            .zip(alpha.par_iter())
            .for_each(|(chunk, &a)| {
                for v in chunk {
                    *v *= a;
                }
            });
    }
    rewrite_bias(bias, &alpha, &beta);

    weights.sync_device()?;
    bias.sync_device()?;
    Ok(())
}

// =============================================================================
// Transposed Convolution
// =============================================================================

/// Folds a [`FusionDescriptor`] into fp32 transposed-convolution weights.
///
/// The weight layout is `(c, n, h, w)`: the output-channel axis sits in
/// the position a forward convolution uses for the filter count. The
/// per-channel loop walks that swapped axis and, for each channel, touches
/// every element across the first dimension at the channel's spatial
/// offset.
pub fn fuse_deconv_weights(
    weights: &WeightBlock<f32>,
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

    let (alpha, beta) = channel_coefficients(descriptor, n);

    {
        let host = weights.host_tensor();
        let mut data = host.as_slice_mut();
        for i in 0..n {
            let a = alpha[i];
            for ni in 0..c {
                let start = ni * chw + i * hw;
                for v in &mut data[start..start + hw] {
                    *v *= a;
                }
            }
        }
    }
    rewrite_bias(bias, &alpha, &beta);

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
    use crate::descriptor::{AffineScaleParams, BatchNormParams};
    use arborml_core::Device;

    fn bn(mean: Vec<f32>, variance: Vec<f32>) -> BatchNormParams {
        BatchNormParams {
            mean,
            variance,
            scale_factor: 1.0,
            epsilon: 1e-5,
        }
    }

    fn weight_block(n: usize, c: usize, h: usize, w: usize, fill: f32) -> WeightBlock<f32> {
        WeightBlock::from_vec(vec![fill; n * c * h * w], &[n, c, h, w], Device::Cpu).unwrap()
    }

    #[test]
    fn test_batchnorm_only_fold() {
        let weights = weight_block(2, 1, 1, 1, 1.0);
        let bias = WeightBlock::from_vec(vec![1.0, 1.0], &[2], Device::Cpu).unwrap();
        let desc = FusionDescriptor {
            batchnorm: Some(bn(vec![0.5, -0.5], vec![3.0, 0.0])),
            scale: None,
            activation: None,
        };

        fuse_conv_weights(&weights, &bias, &desc).unwrap();

        let a0 = 1.0 / (3.0_f32 + 1e-5).sqrt();
        let a1 = 1.0 / (1e-5_f32).sqrt();
        let got_w = weights.host_tensor().to_vec();
        assert!((got_w[0] - a0).abs() < 1e-6);
        assert!((got_w[1] - a1).abs() < 1e-2);

        let got_b = bias.host_tensor().to_vec();
        assert!((got_b[0] - (a0 - 0.5 * a0)).abs() < 1e-6);
        assert!((got_b[1] - (a1 + 0.5 * a1)).abs() < 1e-2);
    }

    #[test]
    fn test_scale_only_fold() {
        let weights = weight_block(2, 1, 2, 2, 2.0);
        let bias = WeightBlock::from_vec(vec![1.0, -1.0], &[2], Device::Cpu).unwrap();
        let desc = FusionDescriptor {
            batchnorm: None,
            scale: Some(AffineScaleParams {
                weight: vec![3.0, 0.5],
                bias: vec![1.0, 2.0],
                bias_term: true,
            }),
            activation: None,
        };

        fuse_conv_weights(&weights, &bias, &desc).unwrap();

        let got_w = weights.host_tensor().to_vec();
        assert!(got_w[..4].iter().all(|&v| (v - 6.0).abs() < 1e-6));
        assert!(got_w[4..].iter().all(|&v| (v - 1.0).abs() < 1e-6));
        assert_eq!(bias.host_tensor().to_vec(), vec![4.0, 1.5]);
    }

    #[test]
    fn test_scale_without_bias_term() {
        let weights = weight_block(1, 1, 1, 1, 1.0);
        let bias = WeightBlock::from_vec(vec![2.0], &[1], Device::Cpu).unwrap();
        let desc = FusionDescriptor {
            batchnorm: None,
            scale: Some(AffineScaleParams {
                weight: vec![4.0],
                bias: Vec::new(),
                bias_term: false,
            }),
            activation: None,
        };

        fuse_conv_weights(&weights, &bias, &desc).unwrap();
        assert_eq!(bias.host_tensor().to_vec(), vec![8.0]);
    }

    #[test]
    fn test_missing_bias_allocated_zeroed() {
        let weights = weight_block(3, 2, 1, 1, 1.0);
        let bias = WeightBlock::<f32>::empty(Device::Cpu);
        let desc = FusionDescriptor {
            batchnorm: Some(bn(vec![0.0; 3], vec![1.0; 3])),
            scale: None,
            activation: None,
        };

        fuse_conv_weights(&weights, &bias, &desc).unwrap();
        assert_eq!(bias.shape(), vec![3]);
        // bias = 0*alpha + beta, and beta is 0 for zero mean
        assert!(bias.host_tensor().to_vec().iter().all(|&b| b.abs() < 1e-6));
    }

    #[test]
    fn test_channel_mismatch_rejected() {
        let weights = weight_block(4, 1, 1, 1, 1.0);
        let bias = WeightBlock::<f32>::empty(Device::Cpu);
        let desc = FusionDescriptor {
            batchnorm: Some(bn(vec![0.0; 2], vec![1.0; 2])),
            scale: None,
            activation: None,
        };
        assert!(fuse_conv_weights(&weights, &bias, &desc).is_err());
    }

    #[test]
    fn test_device_mirror_rederived() {
        let weights =
            WeightBlock::from_vec(vec![1.0; 4], &[2, 2, 1, 1], Device::Cuda(0)).unwrap();
        let bias = WeightBlock::from_vec(vec![0.0, 0.0], &[2], Device::Cuda(0)).unwrap();
        let desc = FusionDescriptor {
            batchnorm: None,
            scale: Some(AffineScaleParams {
                weight: vec![2.0, 3.0],
                bias: Vec::new(),
                bias_term: false,
            }),
            activation: None,
        };

        fuse_conv_weights(&weights, &bias, &desc).unwrap();
        assert_eq!(
            weights.device_tensor().to_vec(),
            weights.host_tensor().to_vec()
        );
    }

    #[test]
    fn test_deconv_matches_forward_per_swapped_channel() {
        // Forward layout (n=3, c=2): channel i scales row i.
        // Deconv layout (c=2, n=3): channel i scales column i.
        let data: Vec<f32> = (0..6).map(|v| v as f32 + 1.0).collect();
        let fwd = WeightBlock::from_vec(data.clone(), &[3, 2, 1, 1], Device::Cpu).unwrap();
        let dec = WeightBlock::from_vec(
            // transpose of the forward buffer
            vec![data[0], data[2], data[4], data[1], data[3], data[5]],
            &[2, 3, 1, 1],
            Device::Cpu,
        )
        .unwrap();
        let fwd_bias = WeightBlock::from_vec(vec![0.0; 3], &[3], Device::Cpu).unwrap();
        let dec_bias = WeightBlock::from_vec(vec![0.0; 3], &[3], Device::Cpu).unwrap();
        let desc = FusionDescriptor {
            batchnorm: Some(bn(vec![0.1, 0.2, 0.3], vec![1.0, 2.0, 3.0])),
            scale: Some(AffineScaleParams {
                weight: vec![1.5, -0.5, 2.0],
                bias: vec![0.1, 0.2, 0.3],
                bias_term: true,
            }),
            activation: None,
        };

        fuse_conv_weights(&fwd, &fwd_bias, &desc).unwrap();
        fuse_deconv_weights(&dec, &dec_bias, &desc).unwrap();

        let f = fwd.host_tensor().to_vec();
        let d = dec.host_tensor().to_vec();
        // element (i, j) of forward equals element (j, i) of deconv
        for i in 0..3 {
            for j in 0..2 {
                assert!((f[i * 2 + j] - d[j * 3 + i]).abs() < 1e-6);
            }
        }
        assert_eq!(fwd_bias.host_tensor().to_vec(), dec_bias.host_tensor().to_vec());
    }

    #[test]
    fn test_empty_weights_rejected() {
        let weights = WeightBlock::from_vec(Vec::new(), &[0, 1, 1, 1], Device::Cpu).unwrap();
        let bias = WeightBlock::<f32>::empty(Device::Cpu);
        assert!(matches!(
            fuse_conv_weights(&weights, &bias, &FusionDescriptor::default()),
            Err(FusionError::EmptyWeights)
        ));
    }
}
