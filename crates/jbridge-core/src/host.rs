//! Host-side values
//!
//! `HostValue` is what the dynamically-typed host hands to the engine and gets
//! back from it. `ArgShape` is the part of a value that overload resolution
//! depends on, used to memoise resolutions.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use jbridge_sdk::RawRef;

use crate::lifecycle::ObjectHandle;
use crate::reflect::ClassInfo;
use crate::types::{limits, PrimitiveType};

/// A runtime object held by the host, with its runtime class
#[derive(Clone)]
pub struct JavaObject {
    handle: Arc<ObjectHandle>,
    class: Arc<ClassInfo>,
}

impl JavaObject {
    /// Pair a global handle with its runtime class
    pub fn new(handle: ObjectHandle, class: Arc<ClassInfo>) -> Self {
        Self {
            handle: Arc::new(handle),
            class,
        }
    }

    /// The owning handle
    pub fn handle(&self) -> &Arc<ObjectHandle> {
        &self.handle
    }

    /// Runtime class of the object
    pub fn class(&self) -> &Arc<ClassInfo> {
        &self.class
    }

    /// Native reference, `None` once released
    pub fn raw(&self) -> Option<RawRef> {
        self.handle.raw()
    }

    /// Whether both wrap the same handle
    pub fn same_handle(&self, other: &JavaObject) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }
}

impl fmt::Debug for JavaObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JavaObject({} {:?})", self.class.name(), self.handle.raw())
    }
}

/// An opaque host object, converted only by adapters
#[derive(Clone)]
pub struct CustomValue {
    type_name: Arc<str>,
    value: Arc<dyn Any + Send + Sync>,
}

impl CustomValue {
    /// Wrap a host object under its host type name
    pub fn new<T: Any + Send + Sync>(type_name: impl Into<Arc<str>>, value: T) -> Self {
        Self {
            type_name: type_name.into(),
            value: Arc::new(value),
        }
    }

    /// Host type name
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Borrow the wrapped object as `T`
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for CustomValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CustomValue({})", self.type_name)
    }
}

/// A dynamically-typed host value
#[derive(Debug, Clone)]
pub enum HostValue {
    /// Absence of a value; null on the runtime side
    None,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point
    Float(f64),
    /// Text
    Str(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Heterogeneous sequence
    List(Vec<HostValue>),
    /// Wrapped runtime object
    Object(JavaObject),
    /// Opaque host object
    Custom(CustomValue),
}

impl HostValue {
    /// Host type name, for messages and adapter lookup
    pub fn type_name(&self) -> &str {
        match self {
            HostValue::None => "None",
            HostValue::Bool(_) => "bool",
            HostValue::Int(_) => "int",
            HostValue::Float(_) => "float",
            HostValue::Str(_) => "str",
            HostValue::Bytes(_) => "bytes",
            HostValue::List(_) => "list",
            HostValue::Object(obj) => obj.class.readable_name(),
            HostValue::Custom(custom) => custom.type_name(),
        }
    }

    /// Resolution-relevant shape, `None` when the value cannot key the
    /// resolution cache
    pub fn shape(&self) -> Option<ArgShape> {
        Some(match self {
            HostValue::None => ArgShape::None,
            HostValue::Bool(_) => ArgShape::Bool,
            HostValue::Int(v) => ArgShape::Int(IntFit::of(*v)),
            HostValue::Float(v) => ArgShape::Float {
                fits_float: fits_float(*v),
            },
            HostValue::Str(s) => ArgShape::Str {
                single_unit: s.encode_utf16().nth(1).is_none() && !s.is_empty(),
            },
            HostValue::Bytes(_) => ArgShape::Bytes,
            HostValue::Object(obj) if obj.handle.is_live() => {
                ArgShape::Object(Arc::from(obj.class.name()))
            }
            HostValue::Object(_) | HostValue::List(_) | HostValue::Custom(_) => return None,
        })
    }

    /// Check if this is `None`
    pub fn is_none(&self) -> bool {
        matches!(self, HostValue::None)
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::None, HostValue::None) => true,
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::Float(a), HostValue::Float(b)) => a == b,
            (HostValue::Str(a), HostValue::Str(b)) => a == b,
            (HostValue::Bytes(a), HostValue::Bytes(b)) => a == b,
            (HostValue::List(a), HostValue::List(b)) => a == b,
            (HostValue::Object(a), HostValue::Object(b)) => a.same_handle(b),
            (HostValue::Custom(a), HostValue::Custom(b)) => Arc::ptr_eq(&a.value, &b.value),
            _ => false,
        }
    }
}

impl From<bool> for HostValue {
    fn from(v: bool) -> Self {
        HostValue::Bool(v)
    }
}

impl From<i64> for HostValue {
    fn from(v: i64) -> Self {
        HostValue::Int(v)
    }
}

impl From<i32> for HostValue {
    fn from(v: i32) -> Self {
        HostValue::Int(v as i64)
    }
}

impl From<f64> for HostValue {
    fn from(v: f64) -> Self {
        HostValue::Float(v)
    }
}

impl From<&str> for HostValue {
    fn from(v: &str) -> Self {
        HostValue::Str(v.to_string())
    }
}

impl From<String> for HostValue {
    fn from(v: String) -> Self {
        HostValue::Str(v)
    }
}

impl From<Vec<HostValue>> for HostValue {
    fn from(v: Vec<HostValue>) -> Self {
        HostValue::List(v)
    }
}

impl From<JavaObject> for HostValue {
    fn from(v: JavaObject) -> Self {
        HostValue::Object(v)
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(HostValue::None, Into::into)
    }
}

/// Which integral primitives an integer fits, as a bit set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IntFit(u8);

impl IntFit {
    const BYTE: u8 = 1 << 0;
    const SHORT: u8 = 1 << 1;
    const CHAR: u8 = 1 << 2;
    const INT: u8 = 1 << 3;

    /// Classify an integer
    pub fn of(v: i64) -> Self {
        let mut bits = 0;
        for (p, bit) in [
            (PrimitiveType::Byte, Self::BYTE),
            (PrimitiveType::Short, Self::SHORT),
            (PrimitiveType::Char, Self::CHAR),
            (PrimitiveType::Int, Self::INT),
        ] {
            if p.fits(v) {
                bits |= bit;
            }
        }
        IntFit(bits)
    }

    /// Whether the integer fits `int`
    pub fn fits_int(self) -> bool {
        self.0 & Self::INT != 0
    }
}

/// The part of a host value that overload resolution depends on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArgShape {
    /// `None`
    None,
    /// Boolean
    Bool,
    /// Integer, bucketed by the primitives it fits
    Int(IntFit),
    /// Floating point
    Float {
        /// Representable as `float`
        fits_float: bool,
    },
    /// Text
    Str {
        /// Exactly one UTF-16 code unit
        single_unit: bool,
    },
    /// Raw bytes
    Bytes,
    /// Runtime object of the named class
    Object(Arc<str>),
}

/// Whether a double can be narrowed to `float`; non-finite values pass through
pub(crate) fn fits_float(v: f64) -> bool {
    !v.is_finite() || v.abs() <= limits::FLOAT_MAX
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_shapes_bucket_by_range() {
        assert_eq!(HostValue::Int(5).shape(), HostValue::Int(100).shape());
        assert_ne!(HostValue::Int(5).shape(), HostValue::Int(200).shape());
        assert_ne!(HostValue::Int(-1).shape(), HostValue::Int(1).shape());
        assert_ne!(HostValue::Int(1 << 40).shape(), HostValue::Int(1).shape());
        assert!(IntFit::of(i32::MAX as i64).fits_int());
        assert!(!IntFit::of(i32::MAX as i64 + 1).fits_int());
    }

    #[test]
    fn test_str_shapes() {
        assert_eq!(
            HostValue::from("a").shape(),
            Some(ArgShape::Str { single_unit: true })
        );
        assert_eq!(
            HostValue::from("ab").shape(),
            Some(ArgShape::Str { single_unit: false })
        );
        assert_eq!(
            HostValue::from("").shape(),
            Some(ArgShape::Str { single_unit: false })
        );
        // Outside the basic plane: two code units
        assert_eq!(
            HostValue::from("\u{1F600}").shape(),
            Some(ArgShape::Str { single_unit: false })
        );
    }

    #[test]
    fn test_uncacheable_values() {
        assert_eq!(HostValue::List(vec![]).shape(), None);
        assert_eq!(HostValue::Custom(CustomValue::new("point", (1, 2))).shape(), None);
    }

    #[test]
    fn test_float_fit() {
        assert!(fits_float(1.5));
        assert!(fits_float(f64::INFINITY));
        assert!(fits_float(f64::NAN));
        assert!(!fits_float(1e300));
    }

    #[test]
    fn test_conversions_and_equality() {
        assert_eq!(HostValue::from(Some(3)), HostValue::Int(3));
        assert_eq!(HostValue::from(None::<bool>), HostValue::None);
        let c = CustomValue::new("point", 7u32);
        assert_eq!(c.downcast_ref::<u32>(), Some(&7));
        assert_eq!(HostValue::Custom(c.clone()), HostValue::Custom(c));
        assert_eq!(HostValue::from("x").type_name(), "str");
    }
}
