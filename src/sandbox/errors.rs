//! Sandbox error types

use std::time::Duration;
use thiserror::Error;

/// A host call rejected by the engine. Raising one traps the script.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostFault {
    #[error("iterator is exhausted")]
    IteratorExhausted,

    #[error("null handle passed to {operation}")]
    NullHandle { operation: &'static str },

    #[error("handle {handle} is not valid")]
    InvalidHandle { handle: i32 },

    #[error("handle {handle} is a {found}, expected a {expected}")]
    WrongHandleKind {
        handle: i32,
        expected: &'static str,
        found: &'static str,
    },

    #[error("index {index} is out of bounds for length {len}")]
    IndexOutOfBounds { index: i64, len: usize },

    #[error("handle limit of {limit} reached")]
    HandleLimit { limit: usize },

    #[error("script memory access out of bounds")]
    MemoryAccess,
}

/// Failure of a single script invocation
#[derive(Debug, Clone, Error)]
pub enum ScriptError {
    #[error("script engine could not be initialized: {message}")]
    Engine { message: String },

    #[error("script failed to compile: {message}")]
    Compile { message: String },

    #[error("required function {name} not found")]
    MissingFunction { name: String },

    #[error("function {name} has an unsupported signature {found}")]
    Signature { name: String, found: String },

    #[error("{function} raised an error: {message}")]
    Runtime {
        function: String,
        message: String,
        fault: Option<HostFault>,
    },

    #[error("{function} exceeded its deadline of {budget:?}")]
    Timeout { function: String, budget: Duration },

    #[error("{function} was cancelled")]
    Cancelled { function: String },
}

impl ScriptError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// The host fault behind a runtime error, if any
    pub fn fault(&self) -> Option<&HostFault> {
        match self {
            Self::Runtime { fault, .. } => fault.as_ref(),
            _ => None,
        }
    }
}

/// Raised from the epoch callback to abort a running script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub(crate) enum Interrupt {
    #[error("deadline exceeded")]
    Deadline,

    #[error("cancelled")]
    Cancelled,
}
