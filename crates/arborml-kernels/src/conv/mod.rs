//! Convolution Kernel Strategies
//!
//! One [`ConvKernel`] implementation per [`ConvAlgorithm`], resolved once
//! at operator initialization via [`create_kernel`]. `init` validates that
//! the kernel can execute the configuration (an unsupported combination is
//! a fatal initialization error, never re-checked per call),
//! `trans_weights` performs the variant's idempotent layout step with a
//! uniform signature, and `dispatch` executes the fused convolution
//! read-only with respect to weights and bias.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use arborml_tensor::{Tensor, WeightBlock};

use crate::algorithm::ConvAlgorithm;
use crate::error::{KernelError, KernelResult};
use crate::meta::ConvMeta;
use crate::params::{ConvWeights, FusedConvParams};

mod depthwise;
mod direct;
mod k3x3;
mod pointwise;
mod vendor;

pub use depthwise::DepthwiseConv;
pub use direct::DirectConv;
pub use k3x3::Conv3x3;
pub use pointwise::PointwiseConv;
pub use vendor::VendorConv;

// =============================================================================
// ConvKernel Trait
// =============================================================================

/// A concrete compute-kernel strategy for a fused convolution.
pub trait ConvKernel: Send + Sync {
    /// The algorithm this strategy implements.
    fn algorithm(&self) -> ConvAlgorithm;

    /// Validates that this kernel can execute the given configuration.
    ///
    /// Runs once at operator initialization; shape-dependent validation is
    /// never repeated on the dispatch path.
    fn init(&mut self, params: &FusedConvParams) -> KernelResult<()>;

    /// Performs this kernel's weight-layout step.
    ///
    /// Uniform across all strategies: instances that find the layout flag
    /// already set call this with throwaway empty blocks, which is a no-op.
    fn trans_weights(
        &self,
        weights: &ConvWeights,
        bias: &WeightBlock<f32>,
        meta: &ConvMeta,
    ) -> KernelResult<()>;

    /// Computes the output shape for an input shape.
    fn infer_shape(&self, input_shape: &[usize], meta: &ConvMeta) -> KernelResult<Vec<usize>> {
        meta.compute_output_shape(input_shape)
    }

    /// Executes the fused convolution into `output`.
    ///
    /// `inputs[0]` is the convolution input; `inputs[1]` is the residual
    /// operand when an elementwise merge was absorbed.
    fn dispatch(
        &self,
        inputs: &[&Tensor<f32>],
        output: &Tensor<f32>,
        params: &FusedConvParams,
    ) -> KernelResult<()>;
}

/// Resolves an algorithm into its strategy object.
#[must_use]
pub fn create_kernel(algorithm: ConvAlgorithm) -> Box<dyn ConvKernel> {
    match algorithm {
        ConvAlgorithm::Vendor => Box::new(VendorConv::default()),
        ConvAlgorithm::K1x1S1P0 => Box::new(PointwiseConv::default()),
        ConvAlgorithm::K3x3S1D1 => Box::new(Conv3x3::default()),
        ConvAlgorithm::Depthwise => Box::new(DepthwiseConv::default()),
        ConvAlgorithm::Direct => Box::new(DirectConv::default()),
    }
}

// =============================================================================
// Shared Validation
// =============================================================================

/// Configuration checks shared by every strategy.
pub(crate) fn validate_common(
    algorithm: ConvAlgorithm,
    params: &FusedConvParams,
) -> KernelResult<()> {
    let meta = &params.meta;
    if meta.stride_h == 0 || meta.stride_w == 0 || meta.dilation_h == 0 || meta.dilation_w == 0 {
        return Err(KernelError::unsupported(
            algorithm,
            "stride and dilation must be positive",
        ));
    }
    if meta.group == 0
        || meta.in_channels % meta.group != 0
        || meta.out_channels % meta.group != 0
    {
        return Err(KernelError::unsupported(
            algorithm,
            format!(
                "group {} does not divide channels {}x{}",
                meta.group, meta.in_channels, meta.out_channels
            ),
        ));
    }
    if params.weights.shape() != meta.weight_shape() {
        return Err(KernelError::unsupported(
            algorithm,
            format!(
                "weight shape {:?}, expected {:?}",
                params.weights.shape(),
                meta.weight_shape()
            ),
        ));
    }
    if meta.bias_term && params.bias.numel() != meta.out_channels {
        return Err(KernelError::unsupported(
            algorithm,
            format!(
                "bias holds {} entries for {} output channels",
                params.bias.numel(),
                meta.out_channels
            ),
        ));
    }
    // scale length must equal channel count before any quantized dispatch
    if let ConvWeights::I8(block) = &params.weights {
        let scale = block.scale();
        if scale.len() != meta.out_channels {
            return Err(KernelError::Tensor(
                arborml_core::Error::scale_length_mismatch(meta.out_channels, scale.len()),
            ));
        }
    }
    Ok(())
}

/// Rejects quantized weights for float-only strategies.
pub(crate) fn require_float_weights(
    algorithm: ConvAlgorithm,
    params: &FusedConvParams,
) -> KernelResult<()> {
    match &params.weights {
        ConvWeights::F32(_) => Ok(()),
        ConvWeights::I8(_) => Err(KernelError::unsupported(
            algorithm,
            "quantized weights are not executable by this kernel",
        )),
    }
}

// =============================================================================
// Shared Dispatch Plumbing
// =============================================================================

/// Validated dispatch geometry.
pub(crate) struct DispatchDims {
    pub batch: usize,
    pub in_h: usize,
    pub in_w: usize,
    pub out_h: usize,
    pub out_w: usize,
}

/// Validates input/output/residual shapes and returns the geometry.
pub(crate) fn check_dispatch(
    inputs: &[&Tensor<f32>],
    output: &Tensor<f32>,
    params: &FusedConvParams,
) -> KernelResult<DispatchDims> {
    let input = inputs
        .first()
        .ok_or_else(|| KernelError::dispatch_shape("no input tensor"))?;
    let expected = params.meta.compute_output_shape(input.shape())?;
    if output.shape() != expected.as_slice() {
        return Err(KernelError::dispatch_shape(format!(
            "output shape {:?}, expected {:?}",
            output.shape(),
            expected
        )));
    }
    if params.eltwise.is_some() {
        let residual = inputs.get(1).ok_or(KernelError::MissingResidual)?;
        if residual.shape() != expected.as_slice() {
            return Err(KernelError::dispatch_shape(format!(
                "residual shape {:?}, expected {:?}",
                residual.shape(),
                expected
            )));
        }
    }
    Ok(DispatchDims {
        batch: input.shape()[0],
        in_h: input.shape()[2],
        in_w: input.shape()[3],
        out_h: expected[2],
        out_w: expected[3],
    })
}

/// Returns the bias slice the accumulation adds, or zeros when absent.
pub(crate) fn bias_vector(params: &FusedConvParams) -> Vec<f32> {
    if params.meta.bias_term {
        params.bias.device_tensor().to_vec()
    } else {
        vec![0.0; params.meta.out_channels]
    }
}

/// Dequantizes int8 weights through their per-channel scale.
///
/// Works for both OIHW and input-major layouts because the scale applies
/// per output channel and the caller indexes the result the same way as
/// the stored integers.
pub(crate) fn dequantize_weights(
    block: &WeightBlock<i8>,
    meta: &ConvMeta,
    input_major: bool,
) -> Vec<f32> {
    let data = block.device_tensor().to_vec();
    let scale = block.device_tensor().scale();
    let out_cg = meta.out_channels_per_group();
    let in_cg = meta.in_channels_per_group();
    let khw = meta.kernel_h * meta.kernel_w;
    let group_span = out_cg * in_cg * khw;

    let mut result = vec![0.0_f32; data.len()];
    for g in 0..meta.group {
        let base = g * group_span;
        for oc in 0..out_cg {
            let s = scale[g * out_cg + oc];
            if input_major {
                for ic in 0..in_cg {
                    let start = base + ic * out_cg * khw + oc * khw;
                    for k in 0..khw {
                        result[start + k] = s * f32::from(data[start + k]);
                    }
                }
            } else {
                let start = base + oc * in_cg * khw;
                for idx in start..start + in_cg * khw {
                    result[idx] = s * f32::from(data[idx]);
                }
            }
        }
    }
    result
}

/// Applies the fused epilogue: activation, then elementwise merge.
pub(crate) fn apply_epilogue(
    params: &FusedConvParams,
    out: &mut [f32],
    residual: Option<&[f32]>,
) -> KernelResult<()> {
    if let Some(act) = &params.activation {
        for v in out.iter_mut() {
            *v = act.apply(*v);
        }
    }
    if let Some(eltwise) = &params.eltwise {
        let residual = residual.ok_or(KernelError::MissingResidual)?;
        for (v, &r) in out.iter_mut().zip(residual.iter()) {
            *v = eltwise.merge(*v, r);
        }
    }
    Ok(())
}

/// Reference grouped convolution over canonical OIHW weights.
///
/// Computes `out = alpha * conv(input, weights) + bias + beta` without the
/// epilogue; every strategy that keeps the OIHW order funnels through
/// this.
pub(crate) fn conv2d_oihw(
    input: &[f32],
    weights: &[f32],
    bias: &[f32],
    meta: &ConvMeta,
    dims: &DispatchDims,
    alpha: f32,
    beta: f32,
    out: &mut [f32],
) {
    let in_cg = meta.in_channels_per_group();
    let out_cg = meta.out_channels_per_group();
    let khw = meta.kernel_h * meta.kernel_w;
    let in_plane = dims.in_h * dims.in_w;
    let out_plane = dims.out_h * dims.out_w;

    for b in 0..dims.batch {
        for g in 0..meta.group {
            for ocg in 0..out_cg {
                let oc = g * out_cg + ocg;
                let w_base = oc * in_cg * khw;
                for oh in 0..dims.out_h {
                    for ow in 0..dims.out_w {
                        let mut acc = 0.0_f32;
                        for icg in 0..in_cg {
                            let ic = g * in_cg + icg;
                            let i_base = (b * meta.in_channels + ic) * in_plane;
                            let wk = w_base + icg * khw;
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
                                    acc += input
                                        [i_base + ih as usize * dims.in_w + iw as usize]
                                        * weights[wk + kh * meta.kernel_w + kw];
                                }
                            }
                        }
                        out[(b * meta.out_channels + oc) * out_plane + oh * dims.out_w + ow] =
                            alpha * acc + bias[oc] + beta;
                    }
                }
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use arborml_core::{Device, Precision};

    fn identity_params(meta: ConvMeta) -> FusedConvParams {
        let wshape = meta.weight_shape();
        let numel: usize = wshape.iter().product();
        let weights = ConvWeights::F32(
            WeightBlock::from_vec(vec![1.0; numel], &wshape, Device::Cpu).unwrap(),
        );
        let bias = WeightBlock::from_vec(vec![0.0; meta.out_channels], &[meta.out_channels], Device::Cpu)
            .unwrap();
        FusedConvParams::new(meta, weights, bias, Precision::Fp32)
    }

    #[test]
    fn test_validate_common_accepts_valid() {
        let params = identity_params(ConvMeta::simple(3, 4, 8));
        assert!(validate_common(ConvAlgorithm::Vendor, &params).is_ok());
    }

    #[test]
    fn test_validate_common_rejects_bad_group() {
        let mut params = identity_params(ConvMeta::simple(3, 4, 8));
        params.meta.group = 3;
        assert!(validate_common(ConvAlgorithm::Vendor, &params).is_err());
    }

    #[test]
    fn test_validate_common_rejects_scale_mismatch() {
        let meta = ConvMeta::simple(1, 2, 2);
        let block = WeightBlock::from_vec(vec![1_i8; 4], &[2, 2, 1, 1], Device::Cpu).unwrap();
        block.set_scale(vec![0.5]);
        let bias = WeightBlock::from_vec(vec![0.0; 2], &[2], Device::Cpu).unwrap();
        let params =
            FusedConvParams::new(meta, ConvWeights::I8(block), bias, Precision::Int8);
        assert!(validate_common(ConvAlgorithm::Direct, &params).is_err());
    }

    #[test]
    fn test_conv2d_oihw_identity_kernel() {
        // 1x1 kernel of ones over a single channel copies the input
        let meta = ConvMeta::simple(1, 1, 1);
        let dims = DispatchDims {
            batch: 1,
            in_h: 2,
            in_w: 2,
            out_h: 2,
            out_w: 2,
        };
        let input = vec![1.0, 2.0, 3.0, 4.0];
        let weights = vec![1.0];
        let bias = vec![0.5];
        let mut out = vec![0.0; 4];

        conv2d_oihw(&input, &weights, &bias, &meta, &dims, 1.0, 0.0, &mut out);
        assert_eq!(out, vec![1.5, 2.5, 3.5, 4.5]);
    }

    #[test]
    fn test_conv2d_oihw_padding() {
        let meta = ConvMeta {
            pad_h: 1,
            pad_w: 1,
            ..ConvMeta::simple(3, 1, 1)
        };
        let dims = DispatchDims {
            batch: 1,
            in_h: 2,
            in_w: 2,
            out_h: 2,
            out_w: 2,
        };
        let input = vec![1.0, 1.0, 1.0, 1.0];
        let weights = vec![1.0; 9];
        let bias = vec![0.0];
        let mut out = vec![0.0; 4];

        conv2d_oihw(&input, &weights, &bias, &meta, &dims, 1.0, 0.0, &mut out);
        // each corner output sees the full 2x2 input
        assert_eq!(out, vec![4.0, 4.0, 4.0, 4.0]);
    }

    #[test]
    fn test_dequantize_weights_oihw() {
        let meta = ConvMeta::simple(1, 1, 2);
        let block = WeightBlock::from_vec(vec![2_i8, -4], &[2, 1, 1, 1], Device::Cpu).unwrap();
        block.set_scale(vec![0.5, 0.25]);
        block.sync_device().unwrap();

        let deq = dequantize_weights(&block, &meta, false);
        assert_eq!(deq, vec![1.0, -1.0]);
    }

    #[test]
    fn test_apply_epilogue_relu_then_merge() {
        use arborml_fusion::{Activation, EltwiseKind, EltwiseSpec};

        let mut params = identity_params(ConvMeta::simple(1, 1, 1));
        params.activation = Some(Activation::relu());
        params.eltwise = Some(EltwiseSpec {
            kind: EltwiseKind::Sum,
            coeffs: vec![1.0, 1.0],
            activation: None,
        });

        let mut out = vec![-1.0, 2.0];
        apply_epilogue(&params, &mut out, Some(&[5.0, 5.0])).unwrap();
        assert_eq!(out, vec![5.0, 7.0]);
    }

    #[test]
    fn test_apply_epilogue_missing_residual() {
        use arborml_fusion::{EltwiseKind, EltwiseSpec};

        let mut params = identity_params(ConvMeta::simple(1, 1, 1));
        params.eltwise = Some(EltwiseSpec {
            kind: EltwiseKind::Max,
            coeffs: Vec::new(),
            activation: None,
        });

        let mut out = vec![0.0];
        assert!(matches!(
            apply_epilogue(&params, &mut out, None),
            Err(KernelError::MissingResidual)
        ));
    }

    #[test]
    fn test_create_kernel_resolves_each_variant() {
        for alg in [
            ConvAlgorithm::Vendor,
            ConvAlgorithm::K1x1S1P0,
            ConvAlgorithm::K3x3S1D1,
            ConvAlgorithm::Depthwise,
            ConvAlgorithm::Direct,
        ] {
            assert_eq!(create_kernel(alg).algorithm(), alg);
        }
    }
}
