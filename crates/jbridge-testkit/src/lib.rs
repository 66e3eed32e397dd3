//! jbridge testkit - in-memory runtime for exercising the interop engine
//!
//! [`TestRuntime`] implements the full capability surface without a JVM.
//! Classes are declared with [`ClassBuilder`] and [`MethodBuilder`]; method
//! bodies are plain closures. The runtime records every reference it hands
//! out so tests can assert that nothing leaks and nothing is released twice.

#![warn(missing_docs)]

mod builder;
mod runtime;

pub use builder::{Body, ClassBuilder, MethodBuilder};
pub use runtime::{Event, TestRuntime};
