//! jbridge SDK - capability surface of the foreign runtime
//!
//! This crate provides the minimal types and the `JavaRuntime` trait that a
//! binding layer implements so the interop engine can reach a JVM without
//! depending on any particular native interface crate.
//!
//! - [`JavaRuntime`]: reference management, reflection, invocation, field
//!   access, value creation, monitors and thread attachment
//! - [`RawRef`], [`MemberId`], [`JValue`]: raw handles and native slots
//! - [`RuntimeError`]: failures reported by the binding layer

#![warn(missing_docs)]

pub mod error;
pub mod runtime;
pub mod value;

pub use error::{RuntimeError, RuntimeResult};
pub use runtime::{ClassFlags, JavaRuntime, RawField, RawMethod};
pub use value::{JValue, MemberId, RawRef, ValueKind};
