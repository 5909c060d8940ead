//! Direct Convolution Kernel
//!
//! The backend's own direct path, preferred for wide input channel counts
//! on GPU and for everything the CPU vector backend runs natively (FP32
//! and quantized int8). Walks input channels in the outer accumulation
//! loop, which is why it consumes the input-channel-major weight layout
//! produced by [`crate::layout::transpose_to_input_major`].
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use arborml_tensor::{Tensor, WeightBlock};

use crate::algorithm::ConvAlgorithm;
use crate::error::KernelResult;
use crate::layout::transpose_to_input_major;
use crate::meta::ConvMeta;
use crate::params::{ConvWeights, FusedConvParams};

use super::{apply_epilogue, bias_vector, check_dispatch, dequantize_weights, validate_common, ConvKernel};

/// Direct convolution strategy with input-channel-major weights.
#[derive(Debug, Default)]
pub struct DirectConv;

impl ConvKernel for DirectConv {
    fn algorithm(&self) -> ConvAlgorithm {
        ConvAlgorithm::Direct
    }

    fn init(&mut self, params: &FusedConvParams) -> KernelResult<()> {
        validate_common(self.algorithm(), params)
    }

    fn trans_weights(
        &self,
        weights: &ConvWeights,
        _bias: &WeightBlock<f32>,
        meta: &ConvMeta,
    ) -> KernelResult<()> {
        match weights {
            ConvWeights::F32(block) => transpose_to_input_major(block, meta),
            ConvWeights::I8(block) => transpose_to_input_major(block, meta),
        }
    }

    fn dispatch(
        &self,
        inputs: &[&Tensor<f32>],
        output: &Tensor<f32>,
        params: &FusedConvParams,
    ) -> KernelResult<()> {
        let dims = check_dispatch(inputs, output, params)?;
        let meta = &params.meta;

        let (weights, beta) = match &params.weights {
            ConvWeights::F32(block) => (block.device_tensor().to_vec(), 0.0),
            ConvWeights::I8(block) => (dequantize_weights(block, meta, true), params.beta),
        };
        let bias = bias_vector(params);
        let input = inputs[0].as_slice();

        let in_cg = meta.in_channels_per_group();
        let out_cg = meta.out_channels_per_group();
        let khw = meta.kernel_h * meta.kernel_w;
        let in_plane = dims.in_h * dims.in_w;
        let out_plane = dims.out_h * dims.out_w;
        let group_span = out_cg * in_cg * khw;
        let mut out = output.as_slice_mut();

        let mut acc = vec![0.0_f32; out_cg * out_plane];
        for b in 0..dims.batch {
            for g in 0..meta.group {
                acc.iter_mut().for_each(|v| *v = 0.0);
                let w_group = g * group_span;
                // input-channel-major walk
                for icg in 0..in_cg {
                    let ic = g * in_cg + icg;
                    let i_base = (b * meta.in_channels + ic) * in_plane;
                    let w_ic = w_group + icg * out_cg * khw;
                    for ocg in 0..out_cg {
                        let wk = w_ic + ocg * khw;
                        let a_base = ocg * out_plane;
                        for oh in 0..dims.out_h {
                            for ow in 0..dims.out_w {
                                let mut sum = 0.0_f32;
                                for kh in 0..meta.kernel_h {
                                    let ih = (oh * meta.stride_h + kh * meta.dilation_h) as isize
                                        - meta.pad_h as isize;
                                    if ih < 0 || ih as usize >= dims.in_h {
                                        continue;
                                    }
                                    for kw in 0..meta.kernel_w {
                                        let iw = (ow * meta.stride_w + kw * meta.dilation_w)
                                            as isize
                                            - meta.pad_w as isize;
                                        if iw < 0 || iw as usize >= dims.in_w {
                                            continue;
                                        }
                                        sum += input
                                            [i_base + ih as usize * dims.in_w + iw as usize]
                                            * weights[wk + kh * meta.kernel_w + kw];
                                    }
                                }
                                acc[a_base + oh * dims.out_w + ow] += sum;
                            }
                        }
                    }
                }
                for ocg in 0..out_cg {
                    let oc = g * out_cg + ocg;
                    let o_base = (b * meta.out_channels + oc) * out_plane;
                    for p in 0..out_plane {
                        out[o_base + p] = params.alpha * acc[ocg * out_plane + p] + bias[oc] + beta;
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
