//! Weight Layout Transposition
//!
//! The direct kernel walks input channels in its outer loop, so it
//! consumes weights with the input-channel axis major inside each group.
//! This module permutes a canonical OIHW weight block into that order in
//! place and re-derives the device mirror.
//!
//! The permutation is destructive and not self-inverse: running it twice
//! corrupts the weights. Callers gate it through the weight pool's
//! `layout_once`, which is what makes the transform run at most once per
//! shared block. The block's shape annotation keeps describing the logical
//! filter bank; only the physical element order changes.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use arborml_core::Scalar;
use arborml_tensor::WeightBlock;

use crate::error::{KernelError, KernelResult};
use crate::meta::ConvMeta;

/// Permutes weights from OIHW to input-channel-major order per group.
///
/// Empty blocks are a no-op; that is the uniform throwaway call issued by
/// instances that find the layout flag already set.
pub fn transpose_to_input_major<T: Scalar>(
    weights: &WeightBlock<T>,
    meta: &ConvMeta,
) -> KernelResult<()> {
    if weights.is_empty() {
        return Ok(());
    }
    if weights.shape() != meta.weight_shape() {
        return Err(KernelError::dispatch_shape(format!(
            "weight shape {:?} does not match convolution {:?}",
            weights.shape(),
            meta.weight_shape()
        )));
    }

    let out_cg = meta.out_channels_per_group();
    let in_cg = meta.in_channels_per_group();
    let khw = meta.kernel_h * meta.kernel_w;
    let group_span = out_cg * in_cg * khw;

    {
        let host = weights.host_tensor();
        let mut data = host.as_slice_mut();
        let mut scratch = vec![T::default(); group_span];
        for g in 0..meta.group {
            let base = g * group_span;
            for oc in 0..out_cg {
                for ic in 0..in_cg {
                    let src = base + oc * in_cg * khw + ic * khw;
                    let dst = ic * out_cg * khw + oc * khw;
                    scratch[dst..dst + khw].copy_from_slice(&data[src..src + khw]);
                }
            }
            data[base..base + group_span].copy_from_slice(&scratch);
        }
    }

    weights.sync_device()?;
    Ok(())
}

// =============================================================================
// Tests
// =============================================================================
