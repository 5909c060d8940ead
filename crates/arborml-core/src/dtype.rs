//! Data Types - ArborML Scalar Type System
//!
//! Defines the scalar types ArborML tensors can store and the traits that
//! make generic storage and weight-rewriting code type safe. The optimizer
//! stores f32 weights and bias, i8 quantized weights, f16 half-precision
//! payloads, and i32 accumulators.
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use bytemuck::{Pod, Zeroable};
use half::f16;
use num_traits::{Float as NumFloat, Num, NumCast, One, Zero};

use core::fmt::Debug;

// =============================================================================
// DType Enum
// =============================================================================

/// Runtime representation of tensor data types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// 32-bit floating point (single precision).
    F32,
    /// 16-bit floating point (half precision).
    F16,
    /// 8-bit signed integer (quantized weights).
    I8,
    /// 32-bit signed integer (accumulators).
    I32,
}

impl DType {
    /// Returns the size in bytes of this data type.
    #[must_use]
    pub const fn size_of(self) -> usize {
        match self {
            Self::I8 => 1,
            Self::F16 => 2,
            Self::F32 | Self::I32 => 4,
        }
    }

    /// Returns true if this is a floating point type.
    #[must_use]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::F32 | Self::F16)
    }

    /// Returns true if this is an integer type.
    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::I8 | Self::I32)
    }

    /// Returns the name of this data type as a string.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::F16 => "f16",
            Self::I8 => "i8",
            Self::I32 => "i32",
        }
    }
}

impl Default for DType {
    fn default() -> Self {
        Self::F32
    }
}

impl core::fmt::Display for DType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Scalar Trait
// =============================================================================

/// Trait for all scalar types that can be stored in a tensor.
pub trait Scalar: Copy + Clone + Debug + Default + Send + Sync + Pod + Zeroable + 'static {
    /// The runtime dtype for this scalar type.
    const DTYPE: DType;

    /// Returns the dtype for this type.
    #[must_use]
    fn dtype() -> DType {
        Self::DTYPE
    }
}

// =============================================================================
// Numeric Trait
// =============================================================================

/// Trait for scalar types that support arithmetic operations.
pub trait Numeric: Scalar + Num + NumCast + PartialOrd + Zero + One {
    /// The zero value for this type.
    const ZERO: Self;

    /// The one value for this type.
    const ONE: Self;

    /// Returns the minimum value for this type.
    fn min_value() -> Self;

    /// Returns the maximum value for this type.
    fn max_value() -> Self;
}

// =============================================================================
// Float Trait
// =============================================================================

/// Trait for floating point scalar types.
pub trait Float: Numeric + NumFloat {
    /// Machine epsilon.
    const EPSILON: Self;

    /// Returns the square root of this value.
    fn sqrt_value(self) -> Self;

    /// Returns the absolute value.
    fn abs_value(self) -> Self;
}

// =============================================================================
// Scalar Implementations
// =============================================================================

macro_rules! impl_scalar {
    ($ty:ty, $dtype:expr) => {
        impl Scalar for $ty {
            const DTYPE: DType = $dtype;
        }
    };
}

impl_scalar!(f32, DType::F32);
impl_scalar!(f16, DType::F16);
impl_scalar!(i8, DType::I8);
impl_scalar!(i32, DType::I32);

// =============================================================================
// Numeric Implementations
// =============================================================================

macro_rules! impl_numeric {
    ($ty:ty, $zero:expr, $one:expr) => {
        impl Numeric for $ty {
            const ZERO: Self = $zero;
            const ONE: Self = $one;

            fn min_value() -> Self {
                <$ty>::MIN
            }

            fn max_value() -> Self {
                <$ty>::MAX
            }
        }
    };
}

impl_numeric!(f32, 0.0, 1.0);
impl_numeric!(i8, 0, 1);
impl_numeric!(i32, 0, 1);

impl Numeric for f16 {
    const ZERO: Self = f16::ZERO;
    const ONE: Self = f16::ONE;

    fn min_value() -> Self {
        f16::MIN
    }

    fn max_value() -> Self {
        f16::MAX
    }
}

// =============================================================================
// Float Implementations
// =============================================================================

impl Float for f32 {
    const EPSILON: Self = f32::EPSILON;

    fn sqrt_value(self) -> Self {
        self.sqrt()
    }

    fn abs_value(self) -> Self {
        self.abs()
    }
}

impl Float for f16 {
    const EPSILON: Self = f16::EPSILON;

    fn sqrt_value(self) -> Self {
        NumFloat::sqrt(self)
    }

    fn abs_value(self) -> Self {
        NumFloat::abs(self)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dtype_size() {
        assert_eq!(DType::F32.size_of(), 4);
        assert_eq!(DType::F16.size_of(), 2);
        assert_eq!(DType::I8.size_of(), 1);
        assert_eq!(DType::I32.size_of(), 4);
    }

    #[test]
    fn test_dtype_is_float() {
        assert!(DType::F32.is_float());
        assert!(DType::F16.is_float());
        assert!(!DType::I8.is_float());
        assert!(DType::I8.is_integer());
    }

    #[test]
    fn test_scalar_dtype() {
        assert_eq!(f32::dtype(), DType::F32);
        assert_eq!(i8::dtype(), DType::I8);
        assert_eq!(f16::dtype(), DType::F16);
    }

    #[test]
    fn test_numeric_constants() {
        assert_eq!(f32::ZERO, 0.0);
        assert_eq!(f32::ONE, 1.0);
        assert_eq!(i8::ZERO, 0);
        assert_eq!(<i8 as Numeric>::max_value(), 127);
    }

    #[test]
    fn test_float_sqrt() {
        assert!((4.0_f32.sqrt_value() - 2.0).abs() < f32::EPSILON);
        assert_eq!((-3.0_f32).abs_value(), 3.0);
    }
}
