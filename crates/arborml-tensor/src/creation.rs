//! Tensor Creation - Factory Functions
//!
//! Free-standing constructors for common tensor contents.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use rand::distributions::Distribution;
use rand::Rng;

use arborml_core::{Float, Numeric, Scalar};

use crate::shape::numel;
use crate::tensor::Tensor;

/// Creates a tensor filled with zeros.
#[must_use]
pub fn zeros<T: Scalar>(shape: &[usize]) -> Tensor<T> {
    Tensor::zeros(shape)
}

/// Creates a tensor filled with ones.
#[must_use]
pub fn ones<T: Numeric>(shape: &[usize]) -> Tensor<T> {
    full(shape, T::ONE)
}

/// Creates a tensor filled with a constant value.
#[must_use]
pub fn full<T: Scalar>(shape: &[usize], value: T) -> Tensor<T> {
    let data = vec![value; numel(shape)];
    Tensor::from_vec(data, shape).expect("length computed from shape")
}

/// Creates a tensor with values drawn from the standard normal distribution.
#[must_use]
pub fn randn<T>(shape: &[usize]) -> Tensor<T>
where
    T: Float,
    rand_distr::StandardNormal: Distribution<T>,
{
    let mut rng = rand::thread_rng();
    let dist = rand_distr::StandardNormal;
    let data: Vec<T> = (0..numel(shape)).map(|_| dist.sample(&mut rng)).collect();
    Tensor::from_vec(data, shape).expect("length computed from shape")
}

/// Creates a tensor with values drawn uniformly from `[0, 1)`.
#[must_use]
pub fn rand<T>(shape: &[usize]) -> Tensor<T>
where
    T: Float,
    rand::distributions::Standard: Distribution<T>,
{
    let mut rng = rand::thread_rng();
    let data: Vec<T> = (0..numel(shape)).map(|_| rng.gen()).collect();
    Tensor::from_vec(data, shape).expect("length computed from shape")
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let t = zeros::<f32>(&[2, 3]);
        assert_eq!(t.numel(), 6);
        assert!(t.to_vec().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_ones() {
        let t = ones::<f32>(&[4]);
        assert!(t.to_vec().iter().all(|&v| v == 1.0));
    }

    #[test]
    fn test_full() {
        let t = full(&[2, 2], 3.5_f32);
        assert!(t.to_vec().iter().all(|&v| v == 3.5));
    }

    #[test]
    fn test_randn_shape() {
        let t = randn::<f32>(&[3, 3]);
        assert_eq!(t.shape(), &[3, 3]);
    }

    #[test]
    fn test_rand_range() {
        let t = rand::<f32>(&[100]);
        assert!(t.to_vec().iter().all(|&v| (0.0..1.0).contains(&v)));
    }
}
