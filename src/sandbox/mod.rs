//! WebAssembly sandbox for user scripts
//!
//! Scripts are WebAssembly modules (text or binary) that may only import the
//! host interface in [`host::HOST_IMPORTS`]. Each invocation runs in a fresh
//! store with capped memory and handles, and is aborted on deadline or
//! cancellation through epoch interruption.

pub mod engine;
pub mod errors;
pub mod host;
pub mod invoker;

pub use engine::{CompiledScript, ScriptEngine};
pub use errors::{HostFault, ScriptError};
pub use host::HOST_IMPORTS;
pub use invoker::{CancelFlag, Invocation, SandboxInvoker, ScriptArg};
