//! jbridge core - interop engine between a dynamic host and a JVM
//!
//! Host code calls methods, constructors and fields of arbitrary runtime
//! classes with dynamically-typed values. The engine picks the best overload,
//! converts values across the boundary, invokes through the
//! [`JavaRuntime`](jbridge_sdk::JavaRuntime) capability surface, and converts
//! results back, while keeping every native reference valid and releasing it
//! exactly once.
//!
//! # Example
//!
//! ```ignore
//! use jbridge_core::{HostValue, Interop};
//!
//! let interop = Interop::new(runtime);
//! let list = interop.get_class("java.util.ArrayList")?;
//! let obj = interop.new_instance(&list, &[])?;
//! interop.call_method(&obj, "add", &[HostValue::from("hello")])?;
//! ```

#![warn(missing_docs)]

pub mod convert;
pub mod error;
pub mod host;
pub mod interop;
pub mod lifecycle;
pub mod modifiers;
pub mod options;
pub mod reflect;
pub mod resolve;
pub mod types;

pub use convert::{Converter, ConverterRegistry, HostAdapter, Marshal, Quality, ScoreCx};
pub use error::{
    ConversionError, InteropError, InteropResult, ReflectionError, RejectedCandidate, Rejection,
    ResolutionError,
};
pub use host::{ArgShape, CustomValue, HostValue, JavaObject};
pub use interop::Interop;
pub use lifecycle::{
    Disposition, HandleState, Lifecycle, LifecycleStats, LocalFrame, LocalRef, MonitorGuard,
    ObjectHandle, ReleaseAction,
};
pub use modifiers::Modifiers;
pub use options::InteropOptions;
pub use reflect::{
    ClassInfo, ClassKind, ConstructorInfo, DescriptorCache, FieldInfo, MethodInfo, Nesting,
    OverloadSet,
};
pub use resolve::{OverloadResolver, ResolverStats};
pub use types::{PrimitiveType, TypeRef};

pub use jbridge_sdk as sdk;
