//! Interop engine errors
//!
//! Three failure categories reach the caller: reflection (a descriptor could
//! not be built), conversion (no converter path for a value/target pair) and
//! resolution (no applicable overload). Releasing an already-released handle
//! is not an error and never surfaces here.

use std::fmt;

use jbridge_sdk::RuntimeError;
use thiserror::Error;

use crate::convert::Quality;

/// A descriptor could not be built or is no longer valid
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReflectionError {
    /// A reflective call failed while building the descriptor
    #[error("Cannot load class {name}: {source}")]
    Lookup {
        /// Binary name of the class being built
        name: String,
        /// Underlying runtime failure
        #[source]
        source: RuntimeError,
    },

    /// The runtime returned metadata that violates descriptor invariants
    #[error("Malformed class {name}: {reason}")]
    Malformed {
        /// Binary name of the class
        name: String,
        /// Violated invariant
        reason: String,
    },

    /// Building the class re-entered its own construction
    #[error("Circular class definition: {name}")]
    Cycle {
        /// Binary name of the class
        name: String,
    },

    /// The descriptor was severed at shutdown or type unload
    #[error("Class descriptor invalidated: {name}")]
    Invalidated {
        /// Binary name of the class
        name: String,
    },
}

/// A host value cannot be marshalled to a runtime type
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConversionError {
    /// No converter scores above FAIL
    #[error("Cannot convert {value_type} to {target}")]
    NoConverter {
        /// Host type of the value
        value_type: String,
        /// Readable name of the target type
        target: String,
    },

    /// A numeric value does not fit the target slot
    #[error("Value {value} out of range for {target}")]
    OutOfRange {
        /// Rendered value
        value: String,
        /// Readable name of the target type
        target: String,
    },

    /// An element of a sequence failed to convert
    #[error("Element {index} of sequence: {source}")]
    Element {
        /// Index of the failing element
        index: usize,
        /// Element failure
        #[source]
        source: Box<ConversionError>,
    },

    /// The wrapped runtime object was already released
    #[error("Object handle already released")]
    Released,

    /// The runtime failed while creating the native value
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// The target type could not be resolved
    #[error(transparent)]
    Reflection(#[from] ReflectionError),
}

/// Why a candidate overload was rejected
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Argument count does not match
    Arity {
        /// Declared parameter count
        expected: usize,
        /// Whether the candidate is variadic
        varargs: bool,
        /// Provided argument count
        provided: usize,
    },
    /// One argument scored FAIL
    Argument {
        /// Index of the first failing argument
        index: usize,
        /// Readable name of the parameter type
        target: String,
    },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Arity {
                expected,
                varargs: false,
                provided,
            } => write!(f, "takes {expected} argument(s), {provided} given"),
            Rejection::Arity {
                expected,
                varargs: true,
                provided,
            } => write!(
                f,
                "takes at least {} argument(s), {provided} given",
                expected.saturating_sub(1)
            ),
            Rejection::Argument { index, target } => {
                write!(f, "{} on argument {index} ({target})", Quality::Fail)
            }
        }
    }
}

/// One candidate considered during resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedCandidate {
    /// Candidate signature (`bar(java.lang.String)`)
    pub signature: String,
    /// Rejection reason
    pub reason: Rejection,
}

/// No overload applies to the call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ResolutionError {
    /// Every candidate was rejected
    #[error("{}", render_no_overload(.name, .arguments, .rejected))]
    NoApplicableOverload {
        /// Member name
        name: String,
        /// Host types of the arguments
        arguments: Vec<String>,
        /// Every candidate with its rejection reason
        rejected: Vec<RejectedCandidate>,
    },

    /// The class has no member with this name
    #[error("{class} has no {kind} named {name}")]
    NoSuchMember {
        /// Readable class name
        class: String,
        /// `method`, `static method`, `field`, `constructor`
        kind: &'static str,
        /// Member name
        name: String,
    },
}

fn render_no_overload(name: &str, arguments: &[String], rejected: &[RejectedCandidate]) -> String {
    let mut out = format!("No applicable overload of {name}({})", arguments.join(", "));
    for candidate in rejected {
        out.push_str(&format!("\n  {}: {}", candidate.signature, candidate.reason));
    }
    out
}

/// Any failure of a high-level interop call
#[derive(Debug, Clone, Error, PartialEq)]
pub enum InteropError {
    /// Descriptor failure
    #[error(transparent)]
    Reflection(#[from] ReflectionError),

    /// Marshalling failure
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Overload resolution failure
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// Failure of the invocation itself
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Result type for high-level interop calls
pub type InteropResult<T> = Result<T, InteropError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_overload_message_lists_candidates() {
        let err = ResolutionError::NoApplicableOverload {
            name: "bar".to_string(),
            arguments: vec!["bytes".to_string()],
            rejected: vec![
                RejectedCandidate {
                    signature: "bar(java.lang.String)".to_string(),
                    reason: Rejection::Argument {
                        index: 0,
                        target: "java.lang.String".to_string(),
                    },
                },
                RejectedCandidate {
                    signature: "bar(int,int)".to_string(),
                    reason: Rejection::Arity {
                        expected: 2,
                        varargs: false,
                        provided: 1,
                    },
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("No applicable overload of bar(bytes)"));
        assert!(msg.contains("bar(java.lang.String): FAIL on argument 0 (java.lang.String)"));
        assert!(msg.contains("bar(int,int): takes 2 argument(s), 1 given"));
    }

    #[test]
    fn test_lookup_error_names_class() {
        let err = ReflectionError::Lookup {
            name: "com.example.Gone".to_string(),
            source: RuntimeError::Unloaded("com.example.Gone".to_string()),
        };
        assert!(err.to_string().contains("com.example.Gone"));
    }
}
