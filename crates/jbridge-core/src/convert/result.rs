//! Runtime values back to host values

use jbridge_sdk::{JValue, RawRef};

use super::builtin::BOXES;
use super::Marshal;
use crate::error::ConversionError;
use crate::host::{HostValue, JavaObject};
use crate::types::{TypeRef, STRING};

/// Convert a returned slot into a host value.
///
/// Strings become text; other objects are promoted to global handles so they
/// outlive the call's local frame.
pub(crate) fn to_host(
    value: JValue,
    declared: &TypeRef,
    m: &Marshal<'_>,
) -> Result<HostValue, ConversionError> {
    Ok(match value {
        JValue::Void | JValue::Object(None) => HostValue::None,
        JValue::Boolean(b) => HostValue::Bool(b),
        JValue::Byte(v) => HostValue::Int(v as i64),
        JValue::Short(v) => HostValue::Int(v as i64),
        JValue::Int(v) => HostValue::Int(v as i64),
        JValue::Long(v) => HostValue::Int(v),
        JValue::Char(unit) => HostValue::Str(String::from_utf16_lossy(&[unit])),
        JValue::Float(v) => HostValue::Float(v as f64),
        JValue::Double(v) => HostValue::Float(v),
        JValue::Object(Some(raw)) if declared.name() == STRING => {
            HostValue::Str(m.runtime.read_string(raw)?)
        }
        JValue::Object(Some(raw)) => object_to_host(raw, m)?,
    })
}

fn object_to_host(raw: RawRef, m: &Marshal<'_>) -> Result<HostValue, ConversionError> {
    let class = m.classes.class_of_object(raw)?;
    if class.name() == STRING {
        return Ok(HostValue::Str(m.runtime.read_string(raw)?));
    }
    let handle = m.lifecycle.promote(raw)?;
    Ok(HostValue::Object(JavaObject::new(handle, class)))
}

/// Boxed primitives and strings to scalars; any other object is returned
/// as is
pub(crate) fn unbox(obj: &JavaObject, m: &Marshal<'_>) -> Result<HostValue, ConversionError> {
    let raw = obj.raw().ok_or(ConversionError::Released)?;
    let name = obj.class().name();
    if name == STRING {
        return Ok(HostValue::Str(m.runtime.read_string(raw)?));
    }
    match BOXES.get(name) {
        Some(p) => {
            let slot = m.runtime.unbox_value(raw, p.kind())?;
            to_host(slot, &TypeRef::from(*p), m)
        }
        None => Ok(HostValue::Object(obj.clone())),
    }
}
