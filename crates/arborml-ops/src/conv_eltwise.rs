//! Fused Convolution + Elementwise Merge Operator
//!
//! Like [`crate::FusedConv`], but the graph rewriter only emits this
//! operator after merging an elementwise operator (optionally followed by
//! a ReLU) into the convolution. A missing merge descriptor therefore
//! aborts construction; it is a configuration error, never retried.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::sync::Arc;

use arborml_core::{Device, Precision};
use arborml_kernels::{ConvAlgorithm, ConvKernel, FusedConvParams};
use arborml_tensor::{Tensor, WeightPool};

use crate::attr::AttrStore;
use crate::conv_fused::{parse_conv_params, parse_eltwise, select_and_layout};
use crate::error::{OpError, OpResult};

// =============================================================================
// FusedConvEltwise
// =============================================================================

/// Convolution operator with an absorbed elementwise merge.
pub struct FusedConvEltwise {
    attrs: AttrStore,
    device: Device,
    precision: Precision,
    pool: Arc<WeightPool>,
    params: Option<FusedConvParams>,
    kernel: Option<Box<dyn ConvKernel>>,
}

impl FusedConvEltwise {
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

    /// Reads attributes, applies the guarded weight fusion and attaches
    /// the required elementwise merge descriptor.
    pub fn init_param(&mut self) -> OpResult<()> {
        if !self.attrs.has("merge.type") {
            return Err(OpError::config(
                "fused eltwise convolution requires a merged elementwise operator",
            ));
        }
        let mut params = parse_conv_params(&self.attrs, self.device, self.precision, &self.pool)?;
        params.eltwise = Some(parse_eltwise(&self.attrs)?);

        // quantized residuals arrive in the scale of the merged operator
        if self.precision.is_quantized() {
            if let Ok(beta) = self.attrs.get_float("merge.residual_scale") {
                params.beta = beta;
            }
        }

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

        // TODO: same open question as FusedConv::init - the combined
        // bias-scale term is derived for the CUDA int8 target only.
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

    /// Computes the output shape via the kernel's shape rule.
    pub fn infer_shape(&self, input_shape: &[usize]) -> OpResult<Vec<usize>> {
        let params = self.params.as_ref().ok_or(OpError::NotInitialized)?;
        match &self.kernel {
            Some(kernel) => Ok(kernel.infer_shape(input_shape, &params.meta)?),
            None => Ok(params.meta.compute_output_shape(input_shape)?),
        }
    }

    /// Executes the fused convolution; `inputs[1]` is the residual operand
    /// of the merge.
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
