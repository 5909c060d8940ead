//! Shape Utilities - Contiguous NCHW Shape Handling
//!
//! Everything in this workspace stores tensors contiguously in NCHW order,
//! so shape handling reduces to element counting and dimension checks.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use arborml_core::{Error, Result};

/// Shape of a tensor (dimension sizes, outermost first).
pub type Shape = Vec<usize>;

/// Returns the total number of elements for a shape.
#[must_use]
pub fn numel(shape: &[usize]) -> usize {
    shape.iter().product()
}

/// Normalizes a possibly-negative dimension index.
pub fn normalize_dim(dim: i64, ndim: usize) -> Result<usize> {
    let idx = if dim < 0 { dim + ndim as i64 } else { dim };
    if idx < 0 || idx as usize >= ndim {
        return Err(Error::IndexOutOfBounds {
            index: idx.unsigned_abs() as usize,
            size: ndim,
        });
    }
    Ok(idx as usize)
}

/// Splits a 4-d convolution weight shape into `(n, c, h, w)`.
///
/// `n` is the output-channel (filter) count, `c` the per-group input
/// channel count, `h`/`w` the kernel extent.
pub fn as_nchw(shape: &[usize]) -> Result<(usize, usize, usize, usize)> {
    if shape.len() != 4 {
        return Err(Error::shape_mismatch(&[4], &[shape.len()]));
    }
    Ok((shape[0], shape[1], shape[2], shape[3]))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numel() {
        assert_eq!(numel(&[2, 3, 4]), 24);
        assert_eq!(numel(&[]), 1);
        assert_eq!(numel(&[0, 5]), 0);
    }

    #[test]
    fn test_normalize_dim() {
        assert_eq!(normalize_dim(1, 4).unwrap(), 1);
        assert_eq!(normalize_dim(-1, 4).unwrap(), 3);
        assert!(normalize_dim(4, 4).is_err());
        assert!(normalize_dim(-5, 4).is_err());
    }

    #[test]
    fn test_as_nchw() {
        assert_eq!(as_nchw(&[8, 3, 3, 3]).unwrap(), (8, 3, 3, 3));
        assert!(as_nchw(&[8, 3, 3]).is_err());
    }
}
