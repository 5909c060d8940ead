//! Kernel Algorithm Selector
//!
//! Chooses the [`ConvAlgorithm`] for one operator instance from its shape
//! metadata and the (device, precision) pair. The shape cascade is an
//! ordered table of named predicate rules evaluated top to bottom; the
//! first matching rule wins and the tie-break order is a first-class,
//! testable artifact. Device/precision overrides short-circuit the cascade
//! entirely.
//!
//! Selection is deterministic and side-effect free; the caller triggers
//! the one-time weight-layout transposition separately.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use tracing::debug;

use arborml_core::{Device, Precision};

use crate::algorithm::ConvAlgorithm;
use crate::meta::ConvMeta;

// =============================================================================
// Selection Rules
// =============================================================================

/// One named predicate → algorithm rule of the selection cascade.
pub struct SelectionRule {
    /// Rule name, for logs and tests.
    pub name: &'static str,
    /// Algorithm chosen when the predicate holds.
    pub algorithm: ConvAlgorithm,
    /// Shape/precision predicate.
    pub applies: fn(&ConvMeta, Precision) -> bool,
}

fn rule_k1x1s1p0(meta: &ConvMeta, precision: Precision) -> bool {
    meta.kernel_h == 1
        && meta.kernel_w == 1
        && meta.pad_h == 0
        && meta.pad_w == 0
        && meta.stride_h == 1
        && meta.stride_w == 1
        && meta.dilation_h == 1
        && meta.dilation_w == 1
        && meta.group == 1
        && meta.bias_term
        && precision.is_float()
}

fn rule_k3x3s1d1(meta: &ConvMeta, precision: Precision) -> bool {
    meta.kernel_h == 3
        && meta.kernel_w == 3
        && meta.group == 1
        && meta.stride_h == 1
        && meta.stride_w == 1
        && meta.dilation_h == 1
        && meta.dilation_w == 1
        && precision.is_float()
}

fn rule_depthwise(meta: &ConvMeta, _precision: Precision) -> bool {
    meta.is_depthwise()
}

fn rule_direct(meta: &ConvMeta, precision: Precision) -> bool {
    meta.in_channels >= 16 && meta.group == 1 && precision.is_float()
}

/// The shape cascade, in priority order. Depthwise outranks direct so a
/// depthwise configuration with a wide channel count still selects the
/// depthwise kernel.
pub const SELECTION_RULES: &[SelectionRule] = &[
    SelectionRule {
        name: "k1x1s1p0",
        algorithm: ConvAlgorithm::K1x1S1P0,
        applies: rule_k1x1s1p0,
    },
    SelectionRule {
        name: "k3x3s1d1",
        algorithm: ConvAlgorithm::K3x3S1D1,
        applies: rule_k3x3s1d1,
    },
    SelectionRule {
        name: "depthwise",
        algorithm: ConvAlgorithm::Depthwise,
        applies: rule_depthwise,
    },
    SelectionRule {
        name: "direct",
        algorithm: ConvAlgorithm::Direct,
        applies: rule_direct,
    },
];

/// Runs the shape cascade; falls back to the vendor kernel when no rule
/// matches.
#[must_use]
pub fn cascade(meta: &ConvMeta, precision: Precision) -> ConvAlgorithm {
    for rule in SELECTION_RULES {
        if (rule.applies)(meta, precision) {
            return rule.algorithm;
        }
    }
    ConvAlgorithm::Vendor
}

// =============================================================================
// Device/Precision Resolution
// =============================================================================

/// Selects the kernel algorithm for one operator instance.
///
/// Quantized execution forces the vendor kernel on GPU targets and the
/// specialized direct kernel on the CPU vector backend. The CPU backend
/// defaults to the library-backed vendor kernel, except that FP32 prefers
/// its own direct kernel without consulting the shape cascade. GPU
/// floating-point instances run the full cascade.
#[must_use]
pub fn select_algorithm(device: Device, precision: Precision, meta: &ConvMeta) -> ConvAlgorithm {
    let algorithm = match (device, precision) {
        (Device::Cuda(_), Precision::Int8) => ConvAlgorithm::Vendor,
        (Device::Cpu, Precision::Int8) | (Device::Cpu, Precision::Fp32) => ConvAlgorithm::Direct,
        (Device::Cpu, Precision::Fp16) => ConvAlgorithm::Vendor,
        (Device::Cuda(_), _) => cascade(meta, precision),
    };
    debug!(
        device = %device,
        precision = %precision,
        algorithm = %algorithm,
        "selected convolution kernel"
    );
    algorithm
}

// =============================================================================
// Tests
// =============================================================================
