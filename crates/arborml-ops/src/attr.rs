//! Attribute Store - Typed Operator Parameters
//!
//! The named, typed attribute set of one graph node. Clones share the
//! underlying map, so every operator instance materialized from the same
//! node observes attribute writes (the persisted "bias now present" flag
//! relies on this).
//!
//! @version 0.1.0
//! @author `AutomataNexus` Development Team

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use arborml_tensor::WeightBlock;

use crate::error::{OpError, OpResult};

// =============================================================================
// AttrValue
// =============================================================================

/// A typed attribute value.
#[derive(Debug, Clone)]
pub enum AttrValue {
    /// Boolean flag.
    Bool(bool),
    /// Integer scalar.
    Int(i64),
    /// Floating-point scalar.
    Float(f32),
    /// String value.
    Str(String),
    /// Integer tuple.
    Ints(Vec<i64>),
    /// Floating-point tuple.
    Floats(Vec<f32>),
    /// Floating-point parameter block.
    BlockF32(WeightBlock<f32>),
    /// Quantized int8 parameter block.
    BlockI8(WeightBlock<i8>),
}

// =============================================================================
// AttrStore
// =============================================================================

/// Shared typed attribute store of one graph node.
#[derive(Debug, Clone, Default)]
pub struct AttrStore {
    inner: Arc<RwLock<HashMap<String, AttrValue>>>,
}

macro_rules! typed_get {
    ($fn_name:ident, $variant:ident, $ty:ty, $expected:literal) => {
        /// Returns the named attribute as this type.
        #[allow(clippy::clone_on_copy)]
        pub fn $fn_name(&self, name: &str) -> OpResult<$ty> {
            match self.inner.read().get(name) {
                Some(AttrValue::$variant(v)) => Ok(v.clone()),
                Some(_) => Err(OpError::AttributeType {
                    name: name.to_string(),
                    expected: $expected,
                }),
                None => Err(OpError::missing(name)),
            }
        }
    };
}

impl AttrStore {
    /// Creates an empty attribute store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if an attribute with this name exists.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.inner.read().contains_key(name)
    }

    /// Sets an attribute, replacing any previous value.
    pub fn set(&self, name: &str, value: AttrValue) {
        self.inner.write().insert(name.to_string(), value);
    }

    /// Returns a raw attribute value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<AttrValue> {
        self.inner.read().get(name).cloned()
    }

    typed_get!(get_bool, Bool, bool, "bool");
    typed_get!(get_int, Int, i64, "int");
    typed_get!(get_float, Float, f32, "float");
    typed_get!(get_str, Str, String, "string");
    typed_get!(get_ints, Ints, Vec<i64>, "int tuple");
    typed_get!(get_floats, Floats, Vec<f32>, "float tuple");
    typed_get!(get_block_f32, BlockF32, WeightBlock<f32>, "f32 block");
    typed_get!(get_block_i8, BlockI8, WeightBlock<i8>, "i8 block");

    /// Returns a boolean attribute, defaulting to `false` when absent.
    #[must_use]
    pub fn get_bool_or_false(&self, name: &str) -> bool {
        self.get_bool(name).unwrap_or(false)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use arborml_core::Device;

    #[test]
    fn test_set_get_roundtrip() {
        let attrs = AttrStore::new();
        attrs.set("group", AttrValue::Int(2));
        attrs.set("padding", AttrValue::Ints(vec![1, 1]));

        assert_eq!(attrs.get_int("group").unwrap(), 2);
        assert_eq!(attrs.get_ints("padding").unwrap(), vec![1, 1]);
        assert!(attrs.has("group"));
        assert!(!attrs.has("strides"));
    }

    #[test]
    fn test_type_mismatch() {
        let attrs = AttrStore::new();
        attrs.set("group", AttrValue::Int(2));
        assert!(matches!(
            attrs.get_bool("group"),
            Err(OpError::AttributeType { .. })
        ));
    }

    #[test]
    fn test_missing_attribute() {
        let attrs = AttrStore::new();
        assert!(matches!(
            attrs.get_float("epsilon"),
            Err(OpError::MissingAttribute { .. })
        ));
    }

    #[test]
    fn test_clone_shares_writes() {
        let attrs = AttrStore::new();
        let view = attrs.clone();
        attrs.set("bias_term", AttrValue::Bool(true));
        assert!(view.get_bool("bias_term").unwrap());
    }

    #[test]
    fn test_block_attribute_shares_storage() {
        let attrs = AttrStore::new();
        let block = WeightBlock::from_vec(vec![1.0_f32], &[1], Device::Cpu).unwrap();
        attrs.set("weights", AttrValue::BlockF32(block.clone()));

        let fetched = attrs.get_block_f32("weights").unwrap();
        assert_eq!(fetched.id(), block.id());
    }

    #[test]
    fn test_bool_or_false() {
        let attrs = AttrStore::new();
        assert!(!attrs.get_bool_or_false("bias_term"));
        attrs.set("bias_term", AttrValue::Bool(true));
        assert!(attrs.get_bool_or_false("bias_term"));
    }
}
