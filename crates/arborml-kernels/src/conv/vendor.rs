//! Vendor Convolution Kernel
//!
//! The generic library-backed path: lowers the convolution to im2col
//! followed by a matrix multiply, the way vendor libraries implement the
//! catch-all case. Handles every shape, grouping and precision, including
//! quantized weights, and is therefore the cascade's default.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use arborml_tensor::{Tensor, WeightBlock};

use crate::algorithm::ConvAlgorithm;
use crate::error::KernelResult;
use crate::meta::ConvMeta;
use crate::params::{ConvWeights, FusedConvParams};

use super::{
    apply_epilogue, bias_vector, check_dispatch, dequantize_weights, validate_common, ConvKernel,
};

/// Generic im2col + GEMM convolution strategy.
#[derive(Debug, Default)]
pub struct VendorConv;

impl ConvKernel for VendorConv {
    fn algorithm(&self) -> ConvAlgorithm {
        ConvAlgorithm::Vendor
    }

    fn init(&mut self, params: &FusedConvParams) -> KernelResult<()> {
        validate_common(self.algorithm(), params)
    }

    fn trans_weights(
        &self,
        _weights: &ConvWeights,
        _bias: &WeightBlock<f32>,
        _meta: &ConvMeta,
    ) -> KernelResult<()> {
        // consumes canonical OIHW order; participates in the exactly-once
        // protocol without touching data
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

        let (weights, beta) = match &params.weights {
            ConvWeights::F32(block) => (block.device_tensor().to_vec(), 0.0),
            ConvWeights::I8(block) => (dequantize_weights(block, meta, false), params.beta),
        };
        let bias = bias_vector(params);
        let input = inputs[0].as_slice();

        let in_cg = meta.in_channels_per_group();
        let out_cg = meta.out_channels_per_group();
        let khw = meta.kernel_h * meta.kernel_w;
        let in_plane = dims.in_h * dims.in_w;
        let out_plane = dims.out_h * dims.out_w;
        let col_rows = in_cg * khw;

        let mut col = vec![0.0_f32; col_rows * out_plane];
        let mut out = output.as_slice_mut();

        for b in 0..dims.batch {
            for g in 0..meta.group {
                // im2col for this (batch, group)
                for icg in 0..in_cg {
                    let ic = g * in_cg + icg;
                    let i_base = (b * meta.in_channels + ic) * in_plane;
                    for kh in 0..meta.kernel_h {
                        for kw in 0..meta.kernel_w {
                            let row = (icg * khw + kh * meta.kernel_w + kw) * out_plane;
                            for oh in 0..dims.out_h {
                                let ih = (oh * meta.stride_h + kh * meta.dilation_h) as isize
                                    - meta.pad_h as isize;
                                for ow in 0..dims.out_w {
                                    let iw = (ow * meta.stride_w + kw * meta.dilation_w) as isize
                                        - meta.pad_w as isize;
                                    let v = if ih < 0
                                        || ih as usize >= dims.in_h
                                        || iw < 0
                                        || iw as usize >= dims.in_w
                                    {
                                        0.0
                                    } else {
                                        input[i_base + ih as usize * dims.in_w + iw as usize]
                                    };
                                    col[row + oh * dims.out_w + ow] = v;
                                }
                            }
                        }
                    }
                }

                // GEMM: (out_cg x col_rows) * (col_rows x out_plane)
                for ocg in 0..out_cg {
                    let oc = g * out_cg + ocg;
                    let w_row = oc * col_rows;
                    let o_base = (b * meta.out_channels + oc) * out_plane;
                    for p in 0..out_plane {
                        let mut acc = 0.0_f32;
                        for k in 0..col_rows {
                            acc += weights[w_row + k] * col[k * out_plane + p];
                        }
                        out[o_base + p] = params.alpha * acc + bias[oc] + beta;
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
    fn test_vendor_matches_reference() {
        let meta = ConvMeta {
            pad_h: 1,
            pad_w: 1,
            stride_h: 2,
            stride_w: 2,
            ..ConvMeta::simple(3, 2, 4)
        };
        let wshape = meta.weight_shape();
        let wlen: usize = wshape.iter().product();
        let wdata: Vec<f32> = (0..wlen).map(|v| (v as f32) * 0.1 - 0.5).collect();
        let weights = WeightBlock::from_vec(wdata.clone(), &wshape, Device::Cpu).unwrap();
        let bias = WeightBlock::from_vec(vec![0.1, 0.2, 0.3, 0.4], &[4], Device::Cpu).unwrap();
        let params = FusedConvParams::new(
            meta.clone(),
            ConvWeights::F32(weights),
            bias.clone(),
            Precision::Fp32,
        );

        let input = Tensor::from_vec((0..50).map(|v| v as f32 * 0.2).collect(), &[1, 2, 5, 5])
            .unwrap();
        let out_shape = meta.compute_output_shape(input.shape()).unwrap();
        let output = Tensor::<f32>::zeros(&out_shape);

        let mut kernel = VendorConv;
        kernel.init(&params).unwrap();
        kernel.dispatch(&[&input], &output, &params).unwrap();

        // reference computation through the shared OIHW routine
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
    fn test_vendor_accepts_int8() {
        let meta = ConvMeta::simple(1, 1, 2);
        let block = WeightBlock::from_vec(vec![2_i8, 4], &[2, 1, 1, 1], Device::Cpu).unwrap();
        block.set_scale(vec![0.5, 0.5]);
        block.sync_device().unwrap();
        let bias = WeightBlock::from_vec(vec![0.0, 0.0], &[2], Device::Cpu).unwrap();
        let mut params =
            FusedConvParams::new(meta, ConvWeights::I8(block), bias, Precision::Int8);
        params.beta = 0.25;

        let input = Tensor::from_vec(vec![3.0_f32], &[1, 1, 1, 1]).unwrap();
        let output = Tensor::<f32>::zeros(&[1, 2, 1, 1]);

        let mut kernel = VendorConv;
        kernel.init(&params).unwrap();
        kernel.dispatch(&[&input], &output, &params).unwrap();

        // 0.5*2*3 + beta, 0.5*4*3 + beta
        assert_eq!(output.to_vec(), vec![3.25, 6.25]);
    }
}
