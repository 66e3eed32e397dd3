//! Raw handles and native value slots
//!
//! `RawRef` is the opaque bit pattern of a runtime reference (local or global,
//! the runtime knows which). `MemberId` identifies a resolved method or field.
//! `JValue` is one argument/return slot, tagged with its JNI kind.

use std::fmt;
use std::num::NonZeroU64;

/// Opaque, non-null runtime reference.
///
/// Nullable references are expressed as `Option<RawRef>`.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct RawRef(NonZeroU64);

impl RawRef {
    /// Wrap raw bits. Returns `None` for the null reference.
    #[inline]
    pub const fn from_bits(bits: u64) -> Option<Self> {
        match NonZeroU64::new(bits) {
            Some(nz) => Some(Self(nz)),
            None => None,
        }
    }

    /// Raw bits of the reference
    #[inline]
    pub const fn to_bits(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Debug for RawRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawRef({:#x})", self.0.get())
    }
}

/// Identifier of a resolved method, constructor or field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemberId(pub u64);

/// Kind of a native slot (argument, return value or field).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// No value (method returns void)
    Void,
    /// `boolean`
    Boolean,
    /// `byte`
    Byte,
    /// `char`
    Char,
    /// `short`
    Short,
    /// `int`
    Int,
    /// `long`
    Long,
    /// `float`
    Float,
    /// `double`
    Double,
    /// Any reference type
    Object,
}

impl ValueKind {
    /// Kind name for messages
    pub const fn name(self) -> &'static str {
        match self {
            ValueKind::Void => "void",
            ValueKind::Boolean => "boolean",
            ValueKind::Byte => "byte",
            ValueKind::Char => "char",
            ValueKind::Short => "short",
            ValueKind::Int => "int",
            ValueKind::Long => "long",
            ValueKind::Float => "float",
            ValueKind::Double => "double",
            ValueKind::Object => "object",
        }
    }
}

/// One native value slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum JValue {
    /// Result of a void method
    Void,
    /// `boolean`
    Boolean(bool),
    /// `byte`
    Byte(i8),
    /// `char` (one UTF-16 code unit)
    Char(u16),
    /// `short`
    Short(i16),
    /// `int`
    Int(i32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// Reference, `None` is null
    Object(Option<RawRef>),
}

impl JValue {
    /// The null reference
    pub const NULL: JValue = JValue::Object(None);

    /// Slot kind of this value
    pub const fn kind(&self) -> ValueKind {
        match self {
            JValue::Void => ValueKind::Void,
            JValue::Boolean(_) => ValueKind::Boolean,
            JValue::Byte(_) => ValueKind::Byte,
            JValue::Char(_) => ValueKind::Char,
            JValue::Short(_) => ValueKind::Short,
            JValue::Int(_) => ValueKind::Int,
            JValue::Long(_) => ValueKind::Long,
            JValue::Float(_) => ValueKind::Float,
            JValue::Double(_) => ValueKind::Double,
            JValue::Object(_) => ValueKind::Object,
        }
    }

    /// Reference held by an object slot
    pub const fn as_object(&self) -> Option<RawRef> {
        match self {
            JValue::Object(r) => *r,
            _ => None,
        }
    }

    /// Check if this is the null reference
    pub const fn is_null(&self) -> bool {
        matches!(self, JValue::Object(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_bits_are_not_a_reference() {
        assert!(RawRef::from_bits(0).is_none());
        let r = RawRef::from_bits(0x10).unwrap();
        assert_eq!(r.to_bits(), 0x10);
    }

    #[test]
    fn test_option_raw_ref_is_pointer_sized() {
        assert_eq!(std::mem::size_of::<Option<RawRef>>(), 8);
    }

    #[test]
    fn test_jvalue_kind() {
        assert_eq!(JValue::Int(3).kind(), ValueKind::Int);
        assert_eq!(JValue::NULL.kind(), ValueKind::Object);
        assert!(JValue::NULL.is_null());
        assert!(!JValue::Boolean(false).is_null());
        assert_eq!(JValue::Char(b'a' as u16).kind().name(), "char");
    }
}
