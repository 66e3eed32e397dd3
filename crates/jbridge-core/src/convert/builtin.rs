//! Built-in converters
//!
//! Object-slot converters are tried for reference targets, primitive-slot
//! converters for primitive targets. Each built-in handles one host value
//! family; the registry keeps the best score.

use jbridge_sdk::{JValue, RawRef, ValueKind};
use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;

use super::{no_converter, Marshal, Quality, ScoreCx};
use crate::error::ConversionError;
use crate::host::{fits_float, HostValue};
use crate::types::{PrimitiveType, TypeRef, OBJECT, STRING};

const CHAR_SEQUENCE: &str = "java.lang.CharSequence";
const COMPARABLE: &str = "java.lang.Comparable";
const SERIALIZABLE: &str = "java.io.Serializable";
const NUMBER: &str = "java.lang.Number";

/// Box class name to primitive
pub(crate) static BOXES: Lazy<FxHashMap<&'static str, PrimitiveType>> = Lazy::new(|| {
    PrimitiveType::ALL
        .into_iter()
        .filter(|p| *p != PrimitiveType::Void)
        .map(|p| (p.box_class(), p))
        .collect()
});

/// Built-in converter into an object slot
pub struct NativeConverter {
    /// Name for logs
    pub name: &'static str,
    score: fn(&HostValue, &TypeRef, &ScoreCx<'_>) -> Quality,
    convert: fn(&HostValue, &TypeRef, &Marshal<'_>) -> Result<JValue, ConversionError>,
}

impl NativeConverter {
    /// Score `value` against a reference type
    pub fn score(&self, value: &HostValue, target: &TypeRef, cx: &ScoreCx<'_>) -> Quality {
        (self.score)(value, target, cx)
    }

    /// Convert `value` into a reference slot
    pub fn convert(
        &self,
        value: &HostValue,
        target: &TypeRef,
        m: &Marshal<'_>,
    ) -> Result<JValue, ConversionError> {
        (self.convert)(value, target, m)
    }
}

/// Built-in converter into a primitive slot
pub struct PrimitiveConverter {
    /// Name for logs
    pub name: &'static str,
    score: fn(&HostValue, PrimitiveType) -> Quality,
    convert: fn(&HostValue, PrimitiveType, &Marshal<'_>) -> Result<JValue, ConversionError>,
}

impl PrimitiveConverter {
    /// Score `value` against a primitive type
    pub fn score(&self, value: &HostValue, target: PrimitiveType) -> Quality {
        (self.score)(value, target)
    }

    /// Convert `value` into a primitive slot
    pub fn convert(
        &self,
        value: &HostValue,
        target: PrimitiveType,
        m: &Marshal<'_>,
    ) -> Result<JValue, ConversionError> {
        (self.convert)(value, target, m)
    }
}

// ============================================================================
// Object Slots
// ============================================================================

pub(super) static NATIVE: [&NativeConverter; 9] = [
    &NULL,
    &OBJECT_REF,
    &STRING_CONV,
    &BOOLEAN_BOX,
    &INTEGER_BOX,
    &FLOAT_BOX,
    &BYTES,
    &SEQUENCE,
    &CHARS,
];

static NULL: NativeConverter = NativeConverter {
    name: "null",
    score: |value, _, _| match value {
        HostValue::None => Quality::Good,
        _ => Quality::Fail,
    },
    convert: |_, _, _| Ok(JValue::NULL),
};

static OBJECT_REF: NativeConverter = NativeConverter {
    name: "object",
    score: score_object,
    convert: |value, target, _| match value {
        HostValue::Object(obj) => obj
            .raw()
            .map(|raw| JValue::Object(Some(raw)))
            .ok_or(ConversionError::Released),
        _ => Err(no_converter(value, target)),
    },
};

fn score_object(value: &HostValue, target: &TypeRef, cx: &ScoreCx<'_>) -> Quality {
    let HostValue::Object(obj) = value else {
        return Quality::Fail;
    };
    if !obj.handle().is_live() {
        return Quality::Fail;
    }
    if obj.class().name() == target.name() {
        return Quality::Perfect;
    }
    match cx.class(target) {
        Some(class) if class.is_assignable_from(obj.class()) => Quality::Great,
        _ => Quality::Fail,
    }
}

static STRING_CONV: NativeConverter = NativeConverter {
    name: "string",
    score: |value, target, _| match value {
        HostValue::Str(_) => match target.name() {
            STRING => Quality::Perfect,
            CHAR_SEQUENCE => Quality::Great,
            OBJECT | COMPARABLE | SERIALIZABLE => Quality::Good,
            _ => Quality::Fail,
        },
        _ => Quality::Fail,
    },
    convert: |value, target, m| match value {
        HostValue::Str(s) => Ok(object(m.local(m.runtime.new_string(s))?)),
        _ => Err(no_converter(value, target)),
    },
};

static BOOLEAN_BOX: NativeConverter = NativeConverter {
    name: "boolean box",
    score: |value, target, _| match value {
        HostValue::Bool(_) => match target.name() {
            "java.lang.Boolean" => Quality::Great,
            OBJECT => Quality::Bad,
            _ => Quality::Fail,
        },
        _ => Quality::Fail,
    },
    convert: |value, target, m| match value {
        HostValue::Bool(b) => boxed(m, JValue::Boolean(*b)),
        _ => Err(no_converter(value, target)),
    },
};

static INTEGER_BOX: NativeConverter = NativeConverter {
    name: "integer box",
    score: |value, target, _| {
        let HostValue::Int(v) = value else {
            return Quality::Fail;
        };
        match target.name() {
            NUMBER | OBJECT => Quality::Bad,
            name => match BOXES.get(name) {
                Some(PrimitiveType::Int) if PrimitiveType::Int.fits(*v) => Quality::Great,
                Some(PrimitiveType::Long) => Quality::Great,
                Some(p @ (PrimitiveType::Short | PrimitiveType::Byte)) if p.fits(*v) => {
                    Quality::Good
                }
                _ => Quality::Fail,
            },
        }
    },
    convert: |value, target, m| {
        let &HostValue::Int(v) = value else {
            return Err(no_converter(value, target));
        };
        let slot = match target.name() {
            NUMBER | OBJECT if PrimitiveType::Int.fits(v) => PrimitiveType::Int,
            NUMBER | OBJECT => PrimitiveType::Long,
            name => match BOXES.get(name) {
                Some(p) => *p,
                None => return Err(no_converter(value, target)),
            },
        };
        boxed(m, integral(v, slot)?)
    },
};

static FLOAT_BOX: NativeConverter = NativeConverter {
    name: "float box",
    score: |value, target, _| {
        let HostValue::Float(v) = value else {
            return Quality::Fail;
        };
        match target.name() {
            "java.lang.Double" => Quality::Great,
            "java.lang.Float" if fits_float(*v) => Quality::Good,
            NUMBER | OBJECT => Quality::Bad,
            _ => Quality::Fail,
        }
    },
    convert: |value, target, m| match (value, target.name()) {
        (HostValue::Float(v), "java.lang.Float") => boxed(m, JValue::Float(*v as f32)),
        (HostValue::Float(v), _) => boxed(m, JValue::Double(*v)),
        _ => Err(no_converter(value, target)),
    },
};

static BYTES: NativeConverter = NativeConverter {
    name: "bytes",
    score: |value, target, _| match value {
        HostValue::Bytes(_) => match target.name() {
            "[B" => Quality::Perfect,
            OBJECT => Quality::Bad,
            _ => Quality::Fail,
        },
        _ => Quality::Fail,
    },
    convert: |value, target, m| match value {
        HostValue::Bytes(bytes) => {
            let slots: Vec<JValue> = bytes.iter().map(|b| JValue::Byte(*b as i8)).collect();
            Ok(object(m.local(m.runtime.new_primitive_array(ValueKind::Byte, &slots))?))
        }
        _ => Err(no_converter(value, target)),
    },
};

static SEQUENCE: NativeConverter = NativeConverter {
    name: "sequence",
    score: |value, target, cx| {
        let (HostValue::List(items), Some(component)) = (value, target.component()) else {
            return Quality::Fail;
        };
        items
            .iter()
            .map(|item| cx.score(item, &component))
            .fold(Quality::Good, Quality::min)
    },
    convert: convert_sequence,
};

fn convert_sequence(
    value: &HostValue,
    target: &TypeRef,
    m: &Marshal<'_>,
) -> Result<JValue, ConversionError> {
    let (HostValue::List(items), Some(component)) = (value, target.component()) else {
        return Err(no_converter(value, target));
    };
    let mut slots = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let slot = m.convert(item, &component).map_err(|source| ConversionError::Element {
            index,
            source: Box::new(source),
        })?;
        slots.push(slot);
    }
    let array = match component.primitive() {
        Some(p) => m.runtime.new_primitive_array(p.kind(), &slots),
        None => {
            let elements: Vec<Option<RawRef>> = slots.iter().map(JValue::as_object).collect();
            m.runtime.new_object_array(m.class_ref(&component)?, &elements)
        }
    };
    Ok(object(m.local(array)?))
}

static CHARS: NativeConverter = NativeConverter {
    name: "chars",
    score: |value, target, _| match value {
        HostValue::Str(_) if target.name() == "[C" => Quality::Good,
        _ => Quality::Fail,
    },
    convert: |value, target, m| match value {
        HostValue::Str(s) => {
            let slots: Vec<JValue> = s.encode_utf16().map(JValue::Char).collect();
            Ok(object(m.local(m.runtime.new_primitive_array(ValueKind::Char, &slots))?))
        }
        _ => Err(no_converter(value, target)),
    },
};

// ============================================================================
// Primitive Slots
// ============================================================================

pub(super) static PRIMITIVE: [&PrimitiveConverter; 5] = [&BOOLEAN, &INTEGER, &FLOAT, &CHAR, &UNBOX];

static BOOLEAN: PrimitiveConverter = PrimitiveConverter {
    name: "boolean",
    score: |value, p| match (value, p) {
        (HostValue::Bool(_), PrimitiveType::Boolean) => Quality::Perfect,
        _ => Quality::Fail,
    },
    convert: |value, p, _| match value {
        HostValue::Bool(b) => Ok(JValue::Boolean(*b)),
        _ => Err(no_converter(value, &p.into())),
    },
};

static INTEGER: PrimitiveConverter = PrimitiveConverter {
    name: "integer",
    score: |value, p| {
        let HostValue::Int(v) = value else {
            return Quality::Fail;
        };
        match p {
            PrimitiveType::Int if p.fits(*v) => Quality::Perfect,
            PrimitiveType::Long => Quality::Great,
            PrimitiveType::Short | PrimitiveType::Byte if p.fits(*v) => Quality::Good,
            PrimitiveType::Char if p.fits(*v) => Quality::Bad,
            PrimitiveType::Float | PrimitiveType::Double => Quality::Good,
            _ => Quality::Fail,
        }
    },
    convert: |value, p, _| match value {
        HostValue::Int(v) => integral(*v, p),
        _ => Err(no_converter(value, &p.into())),
    },
};

static FLOAT: PrimitiveConverter = PrimitiveConverter {
    name: "float",
    score: |value, p| match (value, p) {
        (HostValue::Float(_), PrimitiveType::Double) => Quality::Perfect,
        (HostValue::Float(v), PrimitiveType::Float) if fits_float(*v) => Quality::Great,
        _ => Quality::Fail,
    },
    convert: |value, p, _| match (value, p) {
        (HostValue::Float(v), PrimitiveType::Double) => Ok(JValue::Double(*v)),
        (HostValue::Float(v), PrimitiveType::Float) => Ok(JValue::Float(*v as f32)),
        _ => Err(no_converter(value, &p.into())),
    },
};

static CHAR: PrimitiveConverter = PrimitiveConverter {
    name: "char",
    score: |value, p| match (value, p) {
        (HostValue::Str(s), PrimitiveType::Char) if single_unit(s).is_some() => Quality::Perfect,
        _ => Quality::Fail,
    },
    convert: |value, p, _| match value {
        HostValue::Str(s) => single_unit(s)
            .map(JValue::Char)
            .ok_or_else(|| no_converter(value, &p.into())),
        _ => Err(no_converter(value, &p.into())),
    },
};

static UNBOX: PrimitiveConverter = PrimitiveConverter {
    name: "unbox",
    score: |value, p| match value {
        HostValue::Object(obj)
            if obj.handle().is_live() && BOXES.get(obj.class().name()) == Some(&p) =>
        {
            Quality::Good
        }
        _ => Quality::Fail,
    },
    convert: |value, p, m| match value {
        HostValue::Object(obj) => {
            let raw = obj.raw().ok_or(ConversionError::Released)?;
            Ok(m.runtime.unbox_value(raw, p.kind())?)
        }
        _ => Err(no_converter(value, &p.into())),
    },
};

// ============================================================================
// Helpers
// ============================================================================

fn object(raw: RawRef) -> JValue {
    JValue::Object(Some(raw))
}

fn boxed(m: &Marshal<'_>, slot: JValue) -> Result<JValue, ConversionError> {
    Ok(object(m.local(m.runtime.box_value(slot))?))
}

fn single_unit(s: &str) -> Option<u16> {
    let mut units = s.encode_utf16();
    match (units.next(), units.next()) {
        (Some(unit), None) => Some(unit),
        _ => None,
    }
}

/// Narrow an integer into a primitive slot, failing when it does not fit
pub(crate) fn integral(v: i64, slot: PrimitiveType) -> Result<JValue, ConversionError> {
    let out_of_range = || ConversionError::OutOfRange {
        value: v.to_string(),
        target: slot.name().to_string(),
    };
    Ok(match slot {
        PrimitiveType::Int => JValue::Int(i32::try_from(v).map_err(|_| out_of_range())?),
        PrimitiveType::Long => JValue::Long(v),
        PrimitiveType::Short => JValue::Short(i16::try_from(v).map_err(|_| out_of_range())?),
        PrimitiveType::Byte => JValue::Byte(i8::try_from(v).map_err(|_| out_of_range())?),
        PrimitiveType::Char => JValue::Char(u16::try_from(v).map_err(|_| out_of_range())?),
        PrimitiveType::Float => JValue::Float(v as f32),
        PrimitiveType::Double => JValue::Double(v as f64),
        PrimitiveType::Boolean | PrimitiveType::Void => return Err(out_of_range()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_primitive_scores() {
        let score = |v: i64, p| INTEGER.score(&HostValue::Int(v), p);
        assert_eq!(score(5, PrimitiveType::Int), Quality::Perfect);
        assert_eq!(score(5, PrimitiveType::Long), Quality::Great);
        assert_eq!(score(5, PrimitiveType::Short), Quality::Good);
        assert_eq!(score(300, PrimitiveType::Byte), Quality::Fail);
        assert_eq!(score(65, PrimitiveType::Char), Quality::Bad);
        assert_eq!(score(-1, PrimitiveType::Char), Quality::Fail);
        assert_eq!(score(5, PrimitiveType::Double), Quality::Good);
        assert_eq!(score(1 << 40, PrimitiveType::Int), Quality::Fail);
        assert_eq!(score(1 << 40, PrimitiveType::Long), Quality::Great);
        assert_eq!(score(1, PrimitiveType::Boolean), Quality::Fail);
    }

    #[test]
    fn test_float_primitive_scores() {
        assert_eq!(FLOAT.score(&HostValue::Float(1.5), PrimitiveType::Double), Quality::Perfect);
        assert_eq!(FLOAT.score(&HostValue::Float(1.5), PrimitiveType::Float), Quality::Great);
        assert_eq!(FLOAT.score(&HostValue::Float(1e300), PrimitiveType::Float), Quality::Fail);
        assert_eq!(FLOAT.score(&HostValue::Float(f64::NAN), PrimitiveType::Float), Quality::Great);
        assert_eq!(FLOAT.score(&HostValue::Float(1.0), PrimitiveType::Int), Quality::Fail);
    }

    #[test]
    fn test_char_scores() {
        assert_eq!(CHAR.score(&HostValue::from("x"), PrimitiveType::Char), Quality::Perfect);
        assert_eq!(CHAR.score(&HostValue::from("xy"), PrimitiveType::Char), Quality::Fail);
        assert_eq!(CHAR.score(&HostValue::from("\u{1F600}"), PrimitiveType::Char), Quality::Fail);
        assert_eq!(single_unit("é"), Some(0xE9));
    }

    #[test]
    fn test_integral_narrowing() {
        assert_eq!(integral(7, PrimitiveType::Byte), Ok(JValue::Byte(7)));
        assert_eq!(integral(65, PrimitiveType::Char), Ok(JValue::Char(65)));
        assert!(matches!(
            integral(1 << 20, PrimitiveType::Short),
            Err(ConversionError::OutOfRange { .. })
        ));
        assert_eq!(integral(3, PrimitiveType::Double), Ok(JValue::Double(3.0)));
    }

    #[test]
    fn test_box_table() {
        assert_eq!(BOXES.get("java.lang.Integer"), Some(&PrimitiveType::Int));
        assert_eq!(BOXES.get("java.lang.Void"), None);
        assert_eq!(BOXES.len(), 8);
    }
}
