//! Error types for the capability surface

/// Result type for capability calls
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Failures reported by the foreign runtime binding layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuntimeError {
    /// No class with this name is visible to the runtime
    #[error("Class not found: {0}")]
    ClassNotFound(String),

    /// The class was unloaded or its loader is gone
    #[error("Class unloaded: {0}")]
    Unloaded(String),

    /// The calling thread is not attached to the runtime
    #[error("Current thread is not attached to the runtime")]
    NotAttached,

    /// A runtime-side exception was raised during the call
    #[error("{class}: {message}")]
    Exception {
        /// Binary name of the exception class
        class: String,
        /// Exception message (may be empty)
        message: String,
    },

    /// A reference or member id that the runtime does not know about
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    /// Any other runtime fault
    #[error("Runtime fault: {0}")]
    Fault(String),
}

impl RuntimeError {
    /// Build an exception error from its class and message
    pub fn exception(class: impl Into<String>, message: impl Into<String>) -> Self {
        RuntimeError::Exception {
            class: class.into(),
            message: message.into(),
        }
    }
}

impl From<String> for RuntimeError {
    fn from(s: String) -> Self {
        RuntimeError::Fault(s)
    }
}

impl From<&str> for RuntimeError {
    fn from(s: &str) -> Self {
        RuntimeError::Fault(s.to_string())
    }
}
