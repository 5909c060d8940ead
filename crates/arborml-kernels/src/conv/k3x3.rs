//! 3x3 Stride-1 Convolution Kernel
//!
//! Specialized path for 3x3 / stride 1 / dilation 1 / ungrouped floating
//! point convolutions, the dominant shape in convolutional backbones. The
//! kernel extent is fixed so the inner loops unroll over a 3x3 window.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use arborml_tensor::{Tensor, WeightBlock};

use crate::algorithm::ConvAlgorithm;
use crate::error::{KernelError, KernelResult};
use crate::meta::ConvMeta;
use crate::params::{ConvWeights, FusedConvParams};

use super::{apply_epilogue, bias_vector, check_dispatch, require_float_weights, validate_common, ConvKernel};

/// 3x3 stride-1 dilation-1 convolution strategy.
#[derive(Debug, Default)]
pub struct Conv3x3;

impl ConvKernel for Conv3x3 {
    fn algorithm(&self) -> ConvAlgorithm {
        ConvAlgorithm::K3x3S1D1
    }

    fn init(&mut self, params: &FusedConvParams) -> KernelResult<()> {
        validate_common(self.algorithm(), params)?;
        require_float_weights(self.algorithm(), params)?;
        let meta = &params.meta;
        let shape_ok = meta.kernel_h == 3
            && meta.kernel_w == 3
            && meta.stride_h == 1
            && meta.stride_w == 1
            && meta.dilation_h == 1
            && meta.dilation_w == 1
            && meta.group == 1;
        if !shape_ok {
            return Err(KernelError::unsupported(
                self.algorithm(),
                "requires 3x3 kernel, unit stride/dilation, group 1",
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
                "quantized weights reached the 3x3 kernel",
            ));
        };

        let weights = block.device_tensor().to_vec();
        let bias = bias_vector(params);
        let input = inputs[0].as_slice();
        let in_plane = dims.in_h * dims.in_w;
        let out_plane = dims.out_h * dims.out_w;
        let mut out = output.as_slice_mut();

        for b in 0..dims.batch {
            for oc in 0..meta.out_channels {
                let w_base = oc * meta.in_channels * 9;
                let o_base = (b * meta.out_channels + oc) * out_plane;
                for oh in 0..dims.out_h {
                    for ow in 0..dims.out_w {
                        let mut acc = 0.0_f32;
                        for ic in 0..meta.in_channels {
                            let i_base = (b * meta.in_channels + ic) * in_plane;
                            let wk = w_base + ic * 9;
                            for kh in 0..3 {
                                let ih = (oh + kh) as isize - meta.pad_h as isize;
                                if ih < 0 || ih as usize >= dims.in_h {
                                    continue;
                                }
                                let row = i_base + ih as usize * dims.in_w;
                                for kw in 0..3 {
                                    let iw = (ow + kw) as isize - meta.pad_w as isize;
                                    if iw < 0 || iw as usize >= dims.in_w {
                                        continue;
                                    }
                                    acc += input[row + iw as usize] * weights[wk + kh * 3 + kw];
                                }
                            }
                        }
                        out[o_base + oh * dims.out_w + ow] = params.alpha * acc + bias[oc];
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
