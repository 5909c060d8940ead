//! Fused Convolution Operator
//!
//! Operator wrapper for a convolution that has absorbed optional
//! batch-normalization, affine channel scale and activation operators
//! during graph rewriting. `init_param` folds the absorbed parameters into
//! the weights exactly once through the shared weight pool; `init` selects
//! the kernel strategy and triggers the idempotent layout step; `dispatch`
//! invokes the cached strategy.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::sync::Arc;

use tracing::debug;

use arborml_core::{Device, Precision};
use arborml_fusion::{
    fuse_conv_weights, fuse_conv_weights_int8, Activation, AffineScaleParams, BatchNormParams,
    EltwiseKind, EltwiseSpec, FusionDescriptor,
};
use arborml_kernels::{
    create_kernel, select_algorithm, ConvAlgorithm, ConvKernel, ConvMeta, ConvWeights,
    FusedConvParams,
};
use arborml_tensor::{Tensor, WeightBlock, WeightPool};

use crate::attr::{AttrStore, AttrValue};
use crate::error::{OpError, OpResult};

// =============================================================================
// Attribute Parsing
// =============================================================================

fn get_pair(attrs: &AttrStore, name: &str) -> OpResult<(usize, usize)> {
    let values = attrs.get_ints(name)?;
    if values.len() != 2 {
        return Err(OpError::config(format!(
            "attribute {name} must hold two entries, got {}",
            values.len()
        )));
    }
    Ok((values[0] as usize, values[1] as usize))
}

/// Parses the optional batchnorm/scale attributes into a descriptor.
fn parse_descriptor(attrs: &AttrStore, activation: Option<Activation>) -> OpResult<FusionDescriptor> {
    let batchnorm = if attrs.has("batchnorm.epsilon") {
        Some(BatchNormParams {
            mean: attrs.get_floats("batchnorm.mean")?,
            variance: attrs.get_floats("batchnorm.variance")?,
            scale_factor: attrs.get_float("batchnorm.scale_factor")?,
            epsilon: attrs.get_float("batchnorm.epsilon")?,
        })
    } else {
        None
    };

    let scale = if attrs.has("scale.weight") {
        let bias_term = attrs.get_bool_or_false("scale.bias_term");
        Some(AffineScaleParams {
            weight: attrs.get_floats("scale.weight")?,
            bias: if bias_term {
                attrs.get_floats("scale.bias")?
            } else {
                Vec::new()
            },
            bias_term,
        })
    } else {
        None
    };

    Ok(FusionDescriptor {
        batchnorm,
        scale,
        activation,
    })
}

/// Parses the optional absorbed activation.
fn parse_activation(attrs: &AttrStore) -> OpResult<Option<Activation>> {
    if !attrs.has("activation.type") {
        return Ok(None);
    }
    let kind = attrs.get_str("activation.type")?;
    match kind.as_str() {
        "relu" => Ok(Some(Activation::relu())),
        "prelu" => Ok(Some(Activation::prelu(
            attrs.get_float("activation.neg_slope")?,
        ))),
        other => Err(OpError::config(format!("unknown activation kind: {other}"))),
    }
}

/// Parses the elementwise merge attributes.
pub(crate) fn parse_eltwise(attrs: &AttrStore) -> OpResult<EltwiseSpec> {
    let kind = EltwiseKind::parse(&attrs.get_str("merge.type")?);
    let coeffs = attrs.get_floats("merge.coeff")?;
    let activation = if attrs.has("merge.relu_alpha") {
        Some(Activation::relu())
    } else {
        None
    };
    Ok(EltwiseSpec {
        kind,
        coeffs,
        activation,
    })
}

/// Reads attributes, applies the guarded weight fusion and assembles the
/// fused parameter bag.
pub(crate) fn parse_conv_params(
    attrs: &AttrStore,
    device: Device,
    precision: Precision,
    pool: &WeightPool,
) -> OpResult<FusedConvParams> {
    debug!(device = %device, precision = %precision, "parsing fused convolution parameters");

    let group = attrs.get_int("group")? as usize;
    let bias_term = attrs.get_bool("bias_term")?;
    let (pad_h, pad_w) = get_pair(attrs, "padding")?;
    let (stride_h, stride_w) = get_pair(attrs, "strides")?;
    let (dilation_h, dilation_w) = get_pair(attrs, "dilation")?;
    let filter_num = attrs.get_int("filter_num")? as usize;
    let (kernel_h, kernel_w) = get_pair(attrs, "kernel_size")?;

    let weights = match attrs.get("weights") {
        Some(AttrValue::BlockF32(block)) => ConvWeights::F32(block),
        Some(AttrValue::BlockI8(block)) => ConvWeights::I8(block),
        Some(_) => {
            return Err(OpError::AttributeType {
                name: "weights".to_string(),
                expected: "parameter block",
            })
        }
        None => return Err(OpError::missing("weights")),
    };

    let wshape = weights.shape();
    if wshape.len() != 4 || wshape[0] != filter_num || wshape[2] != kernel_h || wshape[3] != kernel_w
    {
        return Err(OpError::config(format!(
            "weight shape {:?} does not match filter_num {} and kernel {}x{}",
            wshape, filter_num, kernel_h, kernel_w
        )));
    }

    // a single stored weight scale broadcasts to every output channel
    match &weights {
        ConvWeights::F32(block) => block.host_tensor().broadcast_scale(filter_num)?,
        ConvWeights::I8(block) => block.host_tensor().broadcast_scale(filter_num)?,
    }

    let mut meta = ConvMeta {
        group,
        pad_h,
        pad_w,
        stride_h,
        stride_w,
        dilation_h,
        dilation_w,
        kernel_h,
        kernel_w,
        in_channels: wshape[1] * group,
        out_channels: filter_num,
        bias_term,
    };

    let activation = parse_activation(attrs)?;
    let descriptor = parse_descriptor(attrs, activation)?;

    if !descriptor.is_identity() {
        pool.fuse_once(weights.id(), || -> OpResult<()> {
            let bias = if bias_term {
                attrs.get_block_f32("bias")?
            } else {
                // materialize the bias and persist the "bias now present"
                // flag so later passes do not re-allocate it
                let bias = WeightBlock::empty(device);
                attrs.set("bias_term", AttrValue::Bool(true));
                attrs.set("bias", AttrValue::BlockF32(bias.clone()));
                bias
            };
            match &weights {
                ConvWeights::F32(block) => fuse_conv_weights(block, &bias, &descriptor)?,
                ConvWeights::I8(block) => fuse_conv_weights_int8(block, &bias, &descriptor)?,
            }
            Ok(())
        })?;
        meta.bias_term = attrs.get_bool_or_false("bias_term");
    }

    let bias = if meta.bias_term {
        attrs.get_block_f32("bias")?
    } else {
        WeightBlock::empty(device)
    };

    let mut params = FusedConvParams::new(meta, weights, bias, precision);
    params.activation = activation;
    Ok(params)
}

// =============================================================================
// Selection + Layout
// =============================================================================

/// Selects the kernel strategy, validates it and runs the exactly-once
/// weight layout step.
pub(crate) fn select_and_layout(
    device: Device,
    precision: Precision,
    pool: &WeightPool,
    params: &FusedConvParams,
) -> OpResult<Box<dyn ConvKernel>> {
    let algorithm = select_algorithm(device, precision, &params.meta);
    let mut kernel = create_kernel(algorithm);
    kernel.init(params)?;

    let ran = pool.layout_once(params.weights.id(), || {
        kernel.trans_weights(&params.weights, &params.bias, &params.meta)
    })?;
    if !ran {
        // the block is already laid out; keep the call shape uniform by
        // running the transposition against throwaway empty blocks
        let empty_weights = ConvWeights::F32(WeightBlock::empty(device));
        let empty_bias = WeightBlock::empty(device);
        kernel.trans_weights(&empty_weights, &empty_bias, &params.meta)?;
    }
    debug!(algorithm = %algorithm, layout_ran = ran, "initialized convolution kernel");
    Ok(kernel)
}

// =============================================================================
// FusedConv
// =============================================================================

/// Convolution operator with absorbed batchnorm/scale/activation.
pub struct FusedConv {
    attrs: AttrStore,
    device: Device,
    precision: Precision,
    pool: Arc<WeightPool>,
    params: Option<FusedConvParams>,
    kernel: Option<Box<dyn ConvKernel>>,
}

impl FusedConv {
    /// Creates the operator instance for one (device, precision) target.
    #[must_use]
    pub fn new(attrs: AttrStore, device: Device, precision: Precision, pool: Arc<WeightPool>) -> Self {
        Self {
            attrs,
            device,
            precision,
            pool,
            params: None,
            kernel: None,
        }
    }

    /// Reads attributes and applies the weight fusion transform when this
    /// instance is the first to touch the shared weight block.
    pub fn init_param(&mut self) -> OpResult<()> {
        let params = parse_conv_params(&self.attrs, self.device, self.precision, &self.pool)?;
        self.params = Some(params);
        Ok(())
    }

    /// Selects the kernel algorithm, triggers layout transposition and
    /// initializes the backend kernel.
    pub fn init(&mut self, inputs: &[&Tensor<f32>], outputs: &[&Tensor<f32>]) -> OpResult<()> {
        let params = self.params.as_mut().ok_or(OpError::NotInitialized)?;

        if self.precision.is_quantized() {
            if let Ok(scale) = self.attrs.get_float("output_scale") {
                if let Some(output) = outputs.first() {
                    output.set_scale(vec![scale]);
                }
            }
        }

        let kernel = select_and_layout(self.device, self.precision, &self.pool, params)?;

        // TODO: the combined bias-scale term below is only derived for the
        // CUDA int8 target; the CPU int8 output scaling path has not been
        // validated and keeps the parsed beta untouched.
        if matches!(self.device, Device::Cuda(_)) && self.precision.is_quantized() {
            let input = inputs
                .first()
                .ok_or_else(|| OpError::config("initialization requires the convolution input"))?;
            let in_scale = input
                .scale()
                .first()
                .copied()
                .ok_or_else(|| OpError::config("quantized input carries no scale"))?;
            let weight_scale = params
                .weights
                .scale()
                .first()
                .copied()
                .ok_or_else(|| OpError::config("quantized weights carry no scale"))?;
            params.beta = params.beta / in_scale / weight_scale;
        }

        self.kernel = Some(kernel);
        Ok(())
    }

    /// Computes the output shape for an input shape via the kernel's shape
    /// rule. Weights are never touched.
    pub fn infer_shape(&self, input_shape: &[usize]) -> OpResult<Vec<usize>> {
        let params = self.params.as_ref().ok_or(OpError::NotInitialized)?;
        match &self.kernel {
            Some(kernel) => Ok(kernel.infer_shape(input_shape, &params.meta)?),
            None => Ok(params.meta.compute_output_shape(input_shape)?),
        }
    }

    /// Executes the fused convolution through the cached strategy.
    pub fn dispatch(&self, inputs: &[&Tensor<f32>], output: &Tensor<f32>) -> OpResult<()> {
        let params = self.params.as_ref().ok_or(OpError::NotInitialized)?;
        let kernel = self.kernel.as_ref().ok_or(OpError::NotInitialized)?;
        kernel.dispatch(inputs, output, params)?;
        Ok(())
    }

    /// Returns the selected algorithm, once `init` has run.
    #[must_use]
    pub fn algorithm(&self) -> Option<ConvAlgorithm> {
        self.kernel.as_ref().map(|k| k.algorithm())
    }

    /// Returns the assembled parameter bag, once `init_param` has run.
    #[must_use]
    pub fn params(&self) -> Option<&FusedConvParams> {
        self.params.as_ref()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn conv_attrs(out_c: usize, in_c: usize, kernel: usize, bias: Option<Vec<f32>>) -> AttrStore {
        let attrs = AttrStore::new();
        attrs.set("group", AttrValue::Int(1));
        attrs.set("bias_term", AttrValue::Bool(bias.is_some()));
        attrs.set("padding", AttrValue::Ints(vec![0, 0]));
        attrs.set("strides", AttrValue::Ints(vec![1, 1]));
        attrs.set("dilation", AttrValue::Ints(vec![1, 1]));
        attrs.set("filter_num", AttrValue::Int(out_c as i64));
        attrs.set("kernel_size", AttrValue::Ints(vec![kernel as i64, kernel as i64]));

        let wlen = out_c * in_c * kernel * kernel;
        let weights =
            WeightBlock::from_vec(vec![1.0; wlen], &[out_c, in_c, kernel, kernel], Device::Cpu)
                .unwrap();
        attrs.set("weights", AttrValue::BlockF32(weights));
        if let Some(b) = bias {
            let block = WeightBlock::from_vec(b, &[out_c], Device::Cpu).unwrap();
            attrs.set("bias", AttrValue::BlockF32(block));
        }
        attrs
    }

    fn with_scale(attrs: &AttrStore, weight: Vec<f32>) {
        attrs.set("scale.weight", AttrValue::Floats(weight));
        attrs.set("scale.bias_term", AttrValue::Bool(false));
    }

    #[test]
    fn test_init_param_plain_conv() {
        let attrs = conv_attrs(2, 1, 3, Some(vec![0.1, 0.2]));
        let pool = Arc::new(WeightPool::new());
        let mut op = FusedConv::new(attrs, Device::Cpu, Precision::Fp32, pool);

        op.init_param().unwrap();
        let params = op.params().unwrap();
        assert_eq!(params.meta.out_channels, 2);
        assert_eq!(params.meta.in_channels, 1);
        assert!(params.meta.bias_term);
    }

    #[test]
    fn test_init_param_fuses_scale_once() {
        let attrs = conv_attrs(2, 1, 1, None);
        with_scale(&attrs, vec![2.0, 3.0]);
        let pool = Arc::new(WeightPool::new());

        let mut op = FusedConv::new(attrs.clone(), Device::Cpu, Precision::Fp32, Arc::clone(&pool));
        op.init_param().unwrap();

        let weights = attrs.get_block_f32("weights").unwrap();
        assert_eq!(weights.host_tensor().to_vec(), vec![2.0, 3.0]);
        // bias materialized and flag persisted
        assert!(attrs.get_bool("bias_term").unwrap());
        assert_eq!(attrs.get_block_f32("bias").unwrap().shape(), vec![2]);

        // a second instance over the same node must not re-fuse
        let mut second = FusedConv::new(attrs.clone(), Device::Cpu, Precision::Fp32, pool);
        second.init_param().unwrap();
        assert_eq!(weights.host_tensor().to_vec(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_missing_weights_is_fatal() {
        let attrs = AttrStore::new();
        attrs.set("group", AttrValue::Int(1));
        attrs.set("bias_term", AttrValue::Bool(false));
        attrs.set("padding", AttrValue::Ints(vec![0, 0]));
        attrs.set("strides", AttrValue::Ints(vec![1, 1]));
        attrs.set("dilation", AttrValue::Ints(vec![1, 1]));
        attrs.set("filter_num", AttrValue::Int(1));
        attrs.set("kernel_size", AttrValue::Ints(vec![1, 1]));

        let pool = Arc::new(WeightPool::new());
        let mut op = FusedConv::new(attrs, Device::Cpu, Precision::Fp32, pool);
        assert!(matches!(
            op.init_param(),
            Err(OpError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_init_selects_and_dispatches() {
        let attrs = conv_attrs(2, 1, 1, Some(vec![1.0, -1.0]));
        let pool = Arc::new(WeightPool::new());
        let mut op = FusedConv::new(attrs, Device::Cuda(0), Precision::Fp32, pool);

        op.init_param().unwrap();
        let input = Tensor::from_vec(vec![2.0_f32, 4.0], &[1, 1, 2, 1]).unwrap();
        let out_shape = op.infer_shape(input.shape()).unwrap();
        assert_eq!(out_shape, vec![1, 2, 2, 1]);

        let output = Tensor::<f32>::zeros(&out_shape);
        op.init(&[&input], &[&output]).unwrap();
        assert_eq!(op.algorithm(), Some(ConvAlgorithm::K1x1S1P0));

        op.dispatch(&[&input], &output).unwrap();
        assert_eq!(output.to_vec(), vec![3.0, 5.0, 1.0, 3.0]);
    }

    #[test]
    fn test_dispatch_before_init_fails() {
        let attrs = conv_attrs(1, 1, 1, None);
        let pool = Arc::new(WeightPool::new());
        let op = FusedConv::new(attrs, Device::Cpu, Precision::Fp32, pool);
        let t = Tensor::<f32>::zeros(&[1, 1, 1, 1]);
        assert!(matches!(
            op.dispatch(&[&t], &t),
            Err(OpError::NotInitialized)
        ));
    }
}
