//! Value conversion engine
//!
//! Every (host value, runtime type) pair is scored on a five-level
//! [`Quality`] scale; the best-scoring converter performs the conversion.
//! Scoring is pure and cheap so overload resolution can score every
//! candidate. Converting may allocate local references in the current
//! [`LocalFrame`].

mod adapter;
mod builtin;
mod result;

pub use adapter::HostAdapter;
pub use builtin::{NativeConverter, PrimitiveConverter};

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use jbridge_sdk::{JValue, JavaRuntime, RawRef, RuntimeResult};
use tracing::debug;

use crate::error::ConversionError;
use crate::host::HostValue;
use crate::lifecycle::{Lifecycle, LocalFrame};
use crate::reflect::{ClassInfo, DescriptorCache};
use crate::types::TypeRef;

/// How well a host value fits a runtime type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Quality {
    /// Not convertible
    Fail = 0,
    /// Convertible, but only through a lossy or surprising path
    Bad = 1,
    /// Convertible with widening or boxing
    Good = 2,
    /// Near-exact
    Great = 3,
    /// Exact
    Perfect = 4,
}

impl Quality {
    /// Whether a conversion at this quality is attempted
    pub fn is_applicable(self) -> bool {
        self > Quality::Fail
    }

    /// One level worse; `Fail` stays `Fail`
    pub fn downgrade(self) -> Quality {
        match self {
            Quality::Perfect => Quality::Great,
            Quality::Great => Quality::Good,
            Quality::Good => Quality::Bad,
            Quality::Bad | Quality::Fail => Quality::Fail,
        }
    }

    /// Upper-case name
    pub fn as_str(self) -> &'static str {
        match self {
            Quality::Fail => "FAIL",
            Quality::Bad => "BAD",
            Quality::Good => "GOOD",
            Quality::Great => "GREAT",
            Quality::Perfect => "PERFECT",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A converter, chosen once per (value, target) pair by scoring
#[derive(Clone)]
pub enum Converter {
    /// Built-in converter into an object slot
    Native(&'static NativeConverter),
    /// Built-in converter into a primitive slot
    Primitive(&'static PrimitiveConverter),
    /// Host-registered adapter
    Adapter(Arc<HostAdapter>),
}

impl Converter {
    /// Score `value` against `target`
    pub fn score(&self, value: &HostValue, target: &TypeRef, cx: &ScoreCx<'_>) -> Quality {
        match self {
            Converter::Native(c) => c.score(value, target, cx),
            Converter::Primitive(c) => match target.primitive() {
                Some(p) => c.score(value, p),
                None => Quality::Fail,
            },
            Converter::Adapter(a) => a.score(value, target, cx),
        }
    }

    /// Convert `value` into a slot of `target`
    pub fn convert(
        &self,
        value: &HostValue,
        target: &TypeRef,
        marshal: &Marshal<'_>,
    ) -> Result<JValue, ConversionError> {
        match self {
            Converter::Native(c) => c.convert(value, target, marshal),
            Converter::Primitive(c) => match target.primitive() {
                Some(p) => c.convert(value, p, marshal),
                None => Err(no_converter(value, target)),
            },
            Converter::Adapter(a) => a.convert(value, target, marshal),
        }
    }

    /// Converter name, for logs
    pub fn name(&self) -> &str {
        match self {
            Converter::Native(c) => c.name,
            Converter::Primitive(c) => c.name,
            Converter::Adapter(a) => a.host_type(),
        }
    }
}

impl fmt::Debug for Converter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Converter::Native(c) => write!(f, "Native({})", c.name),
            Converter::Primitive(c) => write!(f, "Primitive({})", c.name),
            Converter::Adapter(a) => {
                write!(f, "Adapter({} -> {})", a.host_type(), a.runtime_type())
            }
        }
    }
}

/// What scoring needs: type descriptors for assignability, and the registry
/// for element-wise scoring of sequences
#[derive(Clone, Copy)]
pub struct ScoreCx<'a> {
    /// Descriptor cache
    pub classes: &'a DescriptorCache,
    /// Converter registry
    pub converters: &'a ConverterRegistry,
}

impl ScoreCx<'_> {
    /// Score through the registry
    pub fn score(&self, value: &HostValue, target: &TypeRef) -> Quality {
        self.converters.score(value, target, self)
    }

    /// Descriptor for a target type, `None` when it cannot be loaded
    pub fn class(&self, target: &TypeRef) -> Option<Arc<ClassInfo>> {
        self.classes.for_type(target).ok()
    }
}

/// What conversion needs: scoring plus the runtime, the lifecycle for
/// results that outlive the call, and the call's local frame
pub struct Marshal<'a> {
    /// Runtime to allocate values in
    pub runtime: &'a dyn JavaRuntime,
    /// Descriptor cache
    pub classes: &'a DescriptorCache,
    /// Converter registry
    pub converters: &'a ConverterRegistry,
    /// Lifecycle owning global handles
    pub lifecycle: &'a Arc<Lifecycle>,
    /// Frame collecting local references
    pub frame: &'a LocalFrame<'a>,
}

impl<'a> Marshal<'a> {
    /// Scoring view
    pub fn scoring(&self) -> ScoreCx<'a> {
        ScoreCx {
            classes: self.classes,
            converters: self.converters,
        }
    }

    /// Convert through the registry
    pub fn convert(&self, value: &HostValue, target: &TypeRef) -> Result<JValue, ConversionError> {
        self.converters.convert(value, target, self)
    }

    /// Register a freshly created local reference with the frame
    pub fn local(&self, created: RuntimeResult<RawRef>) -> Result<RawRef, ConversionError> {
        Ok(self.frame.track(created?))
    }

    /// Global reference to the class object of `target`
    pub fn class_ref(&self, target: &TypeRef) -> Result<RawRef, ConversionError> {
        Ok(self.classes.for_type(target)?.raw()?)
    }
}

/// Built-in converters plus host adapters keyed by host type name
#[derive(Default)]
pub struct ConverterRegistry {
    adapters: DashMap<Arc<str>, Vec<Arc<HostAdapter>>>,
}

impl ConverterRegistry {
    /// Registry with the built-in converters only
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host adapter; later registrations are tried after
    /// earlier ones for the same host type
    pub fn register(&self, adapter: HostAdapter) {
        debug!(
            target: "jbridge::convert",
            host_type = adapter.host_type(),
            runtime_type = %adapter.runtime_type(),
            "registered host adapter"
        );
        self.adapters
            .entry(Arc::from(adapter.host_type()))
            .or_default()
            .push(Arc::new(adapter));
    }

    /// Number of registered adapters
    pub fn adapter_count(&self) -> usize {
        self.adapters.iter().map(|e| e.value().len()).sum()
    }

    /// Best converter for the pair and its quality.
    ///
    /// Built-ins are scored first; an adapter replaces the best built-in only
    /// when it scores strictly better.
    pub fn best(
        &self,
        value: &HostValue,
        target: &TypeRef,
        cx: &ScoreCx<'_>,
    ) -> (Quality, Option<Converter>) {
        let mut best = (Quality::Fail, None);
        if target.is_void() {
            return best;
        }
        if target.is_primitive() {
            for c in builtin::PRIMITIVE {
                let converter = Converter::Primitive(c);
                let q = converter.score(value, target, cx);
                if q > best.0 {
                    best = (q, Some(converter));
                }
            }
        } else {
            for c in builtin::NATIVE {
                let converter = Converter::Native(c);
                let q = converter.score(value, target, cx);
                if q > best.0 {
                    best = (q, Some(converter));
                }
            }
        }
        if best.0 == Quality::Perfect {
            return best;
        }

        // Clone out so adapter callbacks never run under a shard lock
        let adapters: Vec<Arc<HostAdapter>> = match self.adapters.get(value.type_name()) {
            Some(entry) => entry.value().clone(),
            None => return best,
        };
        for adapter in adapters {
            let q = adapter.score(value, target, cx);
            if q > best.0 {
                best = (q, Some(Converter::Adapter(adapter)));
            }
        }
        best
    }

    /// Score the pair
    pub fn score(&self, value: &HostValue, target: &TypeRef, cx: &ScoreCx<'_>) -> Quality {
        self.best(value, target, cx).0
    }

    /// Convert with the best converter
    pub fn convert(
        &self,
        value: &HostValue,
        target: &TypeRef,
        marshal: &Marshal<'_>,
    ) -> Result<JValue, ConversionError> {
        match self.best(value, target, &marshal.scoring()) {
            (q, Some(converter)) if q.is_applicable() => converter.convert(value, target, marshal),
            _ => Err(no_converter(value, target)),
        }
    }
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry")
            .field("adapters", &self.adapter_count())
            .finish()
    }
}

pub(crate) use result::{to_host, unbox};

pub(crate) fn no_converter(value: &HostValue, target: &TypeRef) -> ConversionError {
    ConversionError::NoConverter {
        value_type: value.type_name().to_string(),
        target: target.readable_name(),
    }
}
