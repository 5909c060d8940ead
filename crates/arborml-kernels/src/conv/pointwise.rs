//! Pointwise Convolution Kernel
//!
//! Specialized path for 1x1 / stride 1 / unpadded / ungrouped floating
//! point convolutions with bias. A 1x1 convolution is a per-pixel matrix
//! multiply over the channel axis, so the spatial loops collapse entirely.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use arborml_tensor::{Tensor, WeightBlock};

use crate::algorithm::ConvAlgorithm;
use crate::error::{KernelError, KernelResult};
use crate::meta::ConvMeta;
use crate::params::{ConvWeights, FusedConvParams};

use super::{apply_epilogue, bias_vector, check_dispatch, require_float_weights, validate_common, ConvKernel};

/// 1x1 stride-1 convolution strategy.
#[derive(Debug, Default)]
pub struct PointwiseConv;

impl ConvKernel for PointwiseConv {
    fn algorithm(&self) -> ConvAlgorithm {
        ConvAlgorithm::K1x1S1P0
    }

    fn init(&mut self, params: &FusedConvParams) -> KernelResult<()> {
        validate_common(self.algorithm(), params)?;
        require_float_weights(self.algorithm(), params)?;
        let meta = &params.meta;
        let shape_ok = meta.kernel_h == 1
            && meta.kernel_w == 1
            && meta.pad_h == 0
            && meta.pad_w == 0
            && meta.stride_h == 1
            && meta.stride_w == 1
            && meta.dilation_h == 1
            && meta.dilation_w == 1
            && meta.group == 1;
        if !shape_ok {
            return Err(KernelError::unsupported(
                self.algorithm(),
                "requires 1x1 kernel, unit stride/dilation, no padding, group 1",
            ));
        }
        if !meta.bias_term {
            return Err(KernelError::unsupported(
                self.algorithm(),
                "requires a bias vector",
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
                "quantized weights reached the pointwise kernel",
            ));
        };

        let weights = block.device_tensor().to_vec();
        let bias = bias_vector(params);
        let input = inputs[0].as_slice();
        let plane = dims.in_h * dims.in_w;
        let mut out = output.as_slice_mut();

        for b in 0..dims.batch {
            let i_base = b * meta.in_channels * plane;
            let o_base = b * meta.out_channels * plane;
            for oc in 0..meta.out_channels {
                let w_row = oc * meta.in_channels;
                for p in 0..plane {
                    let mut acc = 0.0_f32;
                    for ic in 0..meta.in_channels {
                        acc += weights[w_row + ic] * input[i_base + ic * plane + p];
                    }
                    out[o_base + oc * plane + p] = params.alpha * acc + bias[oc];
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

    fn pointwise_params(in_c: usize, out_c: usize, wdata: Vec<f32>, bias: Vec<f32>) -> FusedConvParams {
        let meta = ConvMeta::pointwise(1, in_c, out_c, true);
        let weights = WeightBlock::from_vec(wdata, &[out_c, in_c, 1, 1], Device::Cpu).unwrap();
        let bias = WeightBlock::from_vec(bias, &[out_c], Device::Cpu).unwrap();
        FusedConvParams::new(meta, ConvWeights::F32(weights), bias, Precision::Fp32)
    }

    #[test]
    fn test_pointwise_channel_mix() {
        let params = pointwise_params(2, 2, vec![1.0, 2.0, 3.0, 4.0], vec![0.0, 1.0]);
        let input =
            Tensor::from_vec(vec![1.0, 2.0, 3.0, 4.0], &[1, 2, 2, 1]).unwrap();
        let output = Tensor::<f32>::zeros(&[1, 2, 2, 1]);

        let mut kernel = PointwiseConv;
        kernel.init(&params).unwrap();
        kernel.dispatch(&[&input], &output, &params).unwrap();

        // oc0 = 1*x0 + 2*x1, oc1 = 3*x0 + 4*x1 + 1
        assert_eq!(output.to_vec(), vec![7.0, 10.0, 16.0, 23.0]);
    }

    #[test]
    fn test_pointwise_rejects_padded() {
        let mut params = pointwise_params(1, 1, vec![1.0], vec![0.0]);
        params.meta.pad_h = 1;
        let mut kernel = PointwiseConv;
        assert!(kernel.init(&params).is_err());
    }

    #[test]
    fn test_pointwise_rejects_missing_bias() {
        let mut params = pointwise_params(1, 1, vec![1.0], vec![0.0]);
        params.meta.bias_term = false;
        let mut kernel = PointwiseConv;
        assert!(kernel.init(&params).is_err());
    }
}
