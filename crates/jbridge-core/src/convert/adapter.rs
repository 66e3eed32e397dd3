//! Host-registered adapters

use std::fmt;

use jbridge_sdk::JValue;

use super::{Marshal, Quality, ScoreCx};
use crate::error::ConversionError;
use crate::host::HostValue;
use crate::types::TypeRef;

type ScoreFn = dyn Fn(&HostValue, &TypeRef) -> Quality + Send + Sync;
type ConvertFn =
    dyn Fn(&HostValue, &TypeRef, &Marshal<'_>) -> Result<JValue, ConversionError> + Send + Sync;

/// Converts one host type into one runtime type.
///
/// An adapter applies to values whose [`HostValue::type_name`] equals its
/// host type. For its own runtime type the score callback decides; for a
/// supertype of it the score is one level lower; anything else fails.
pub struct HostAdapter {
    host_type: String,
    runtime_type: TypeRef,
    score: Box<ScoreFn>,
    convert: Box<ConvertFn>,
}

impl HostAdapter {
    /// Create an adapter
    pub fn new<S, C>(
        host_type: impl Into<String>,
        runtime_type: impl Into<TypeRef>,
        score: S,
        convert: C,
    ) -> Self
    where
        S: Fn(&HostValue, &TypeRef) -> Quality + Send + Sync + 'static,
        C: Fn(&HostValue, &TypeRef, &Marshal<'_>) -> Result<JValue, ConversionError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            host_type: host_type.into(),
            runtime_type: runtime_type.into(),
            score: Box::new(score),
            convert: Box::new(convert),
        }
    }

    /// Host type name this adapter consumes
    pub fn host_type(&self) -> &str {
        &self.host_type
    }

    /// Runtime type this adapter produces
    pub fn runtime_type(&self) -> &TypeRef {
        &self.runtime_type
    }

    /// Score a value against a target slot
    pub fn score(&self, value: &HostValue, target: &TypeRef, cx: &ScoreCx<'_>) -> Quality {
        if value.type_name() != self.host_type {
            return Quality::Fail;
        }
        if *target == self.runtime_type {
            return (self.score)(value, target);
        }
        if target.is_primitive() || self.runtime_type.is_primitive() {
            return Quality::Fail;
        }
        let (Some(slot), Some(produced)) = (cx.class(target), cx.class(&self.runtime_type)) else {
            return Quality::Fail;
        };
        if slot.is_assignable_from(&produced) {
            (self.score)(value, &self.runtime_type).downgrade()
        } else {
            Quality::Fail
        }
    }

    /// Convert a value; produces the adapter's runtime type
    pub fn convert(
        &self,
        value: &HostValue,
        _target: &TypeRef,
        m: &Marshal<'_>,
    ) -> Result<JValue, ConversionError> {
        (self.convert)(value, &self.runtime_type, m)
    }
}

impl fmt::Debug for HostAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostAdapter")
            .field("host_type", &self.host_type)
            .field("runtime_type", &self.runtime_type)
            .finish()
    }
}
