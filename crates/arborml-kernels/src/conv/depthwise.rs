//! Depthwise Convolution Kernel
//!
//! Specialized path for depthwise convolutions (group count equals both
//! channel counts). Each channel convolves independently against its own
//! single-channel filter, so the channel-mixing loop disappears.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use arborml_tensor::{Tensor, WeightBlock};

use crate::algorithm::ConvAlgorithm;
use crate::error::{KernelError, KernelResult};
use crate::meta::ConvMeta;
use crate::params::{ConvWeights, FusedConvParams};

use super::{apply_epilogue, bias_vector, check_dispatch, require_float_weights, validate_common, ConvKernel};

/// Depthwise convolution strategy.
#[derive(Debug, Default)]
pub struct DepthwiseConv;

impl ConvKernel for DepthwiseConv {
    fn algorithm(&self) -> ConvAlgorithm {
        ConvAlgorithm::Depthwise
    }

    fn init(&mut self, params: &FusedConvParams) -> KernelResult<()> {
        validate_common(self.algorithm(), params)?;
        require_float_weights(self.algorithm(), params)?;
        if !params.meta.is_depthwise() {
            return Err(KernelError::unsupported(
                self.algorithm(),
                "group count must equal input and output channel count",
            ));
        }
        Ok(())
    }

    fn trans_weights(
        &self,
        _weights: &ConvWeights,
        _bias: &WeightBlock<f32>,
        _meta: &ConvMeta,
    ) -> KernelResult<()> {
        Ok(())
    }

    fn dispatch(
        &self,
        inputs: &[&Tensor<f32>],
        output: &Tensor<f32>,
        params: &FusedConvParams,
    ) -> KernelResult<()> {
        let dims = check_dispatch(inputs, output, params)?;
        let meta = &params.meta;
        let ConvWeights::F32(block) = &params.weights else {
            return Err(KernelError::unsupported(
                self.algorithm(),
                "quantized weights reached the depthwise kernel",
            ));
        };

        let weights = block.device_tensor().to_vec();
        let bias = bias_vector(params);
        let input = inputs[0].as_slice();
        let khw = meta.kernel_h * meta.kernel_w;
        let in_plane = dims.in_h * dims.in_w;
        let out_plane = dims.out_h * dims.out_w;
        let mut out = output.as_slice_mut();

        for b in 0..dims.batch {
            for c in 0..meta.out_channels {
                let i_base = (b * meta.in_channels + c) * in_plane;
                let o_base = (b * meta.out_channels + c) * out_plane;
                let wk = c * khw;
                for oh in 0..dims.out_h {
                    for ow in 0..dims.out_w {
                        let mut acc = 0.0_f32;
                        for kh in 0..meta.kernel_h {
                            let ih = (oh * meta.stride_h + kh * meta.dilation_h) as isize
                                - meta.pad_h as isize;
                            if ih < 0 || ih as usize >= dims.in_h {
                                continue;
                            }
                            for kw in 0..meta.kernel_w {
                                let iw = (ow * meta.stride_w + kw * meta.dilation_w) as isize
                                    - meta.pad_w as isize;
                                if iw < 0 || iw as usize >= dims.in_w {
                                    continue;
                                }
                                acc += input[i_base + ih as usize * dims.in_w + iw as usize]
                                    * weights[wk + kh * meta.kernel_w + kw];
                            }
                        }
                        out[o_base + oh * dims.out_w + ow] = params.alpha * acc + bias[c];
                    }
                }
            }
        }

        let residual = inputs.get(1).map(|t| t.to_vec());
        apply_epilogue(params, &mut out, residual.as_deref())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use arborml_core::{Device, Precision};

    #[test]
    fn test_depthwise_channels_independent() {
        let meta = ConvMeta::depthwise(2, 1);
        let weights =
            WeightBlock::from_vec(vec![2.0, 3.0], &[2, 1, 1, 1], Device::Cpu).unwrap();
        let bias = WeightBlock::from_vec(vec![0.0, 1.0], &[2], Device::Cpu).unwrap();
        let params = FusedConvParams::new(meta, ConvWeights::F32(weights), bias, Precision::Fp32);

        let input = Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[1, 2, 2, 1]).unwrap();
        let output = Tensor::<f32>::zeros(&[1, 2, 2, 1]);

        let mut kernel = DepthwiseConv;
        kernel.init(&params).unwrap();
        kernel.dispatch(&[&input], &output, &params).unwrap();

        // channel 0 scaled by 2, channel 1 scaled by 3 plus bias 1
        assert_eq!(output.to_vec(), vec![2.0, 4.0, 10.0, 13.0]);
    }

    #[test]
    fn test_depthwise_matches_reference() {
        let meta = ConvMeta {
            pad_h: 1,
            pad_w: 1,
            ..ConvMeta::depthwise(3, 3)
        };
        let wdata: Vec<f32> = (0..27).map(|v| (v as f32) * 0.05 - 0.4).collect();
        let weights =
            WeightBlock::from_vec(wdata.clone(), &meta.weight_shape(), Device::Cpu).unwrap();
        let bias = WeightBlock::from_vec(vec![0.1; 3], &[3], Device::Cpu).unwrap();
        let params = FusedConvParams::new(
            meta.clone(),
            ConvWeights::F32(weights),
            bias,
            Precision::Fp32,
        );

        let input = Tensor::from_vec(
            (0..48).map(|v| (v as f32) * 0.1).collect(),
            &[1, 3, 4, 4],
        )
        .unwrap();
        let output = Tensor::<f32>::zeros(&[1, 3, 4, 4]);

        let mut kernel = DepthwiseConv;
        kernel.init(&params).unwrap();
        kernel.dispatch(&[&input], &output, &params).unwrap();

        let dims = check_dispatch(&[&input], &output, &params).unwrap();
        let mut expected = vec![0.0; output.numel()];
        super::super::conv2d_oihw(
            &input.to_vec(),
            &wdata,
            &bias_vector(&params),
            &meta,
            &dims,
            1.0,
            0.0,
            &mut expected,
        );
        for (got, want) in output.to_vec().iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-4);
        }
    }

    #[test]
    fn test_depthwise_rejects_grouped_mix() {
        let meta = ConvMeta {
            group: 2,
            ..ConvMeta::simple(3, 4, 4)
        };
        let weights =
            WeightBlock::from_vec(vec![0.0; 72], &meta.weight_shape(), Device::Cpu).unwrap();
        let bias = WeightBlock::from_vec(vec![0.0; 4], &[4], Device::Cpu).unwrap();
        let params = FusedConvParams::new(meta, ConvWeights::F32(weights), bias, Precision::Fp32);
        let mut kernel = DepthwiseConv;
        assert!(kernel.init(&params).is_err());
    }
}
