//! Process-wide runtime context
//!
//! The context is created once the walk completes and stored here. Access is
//! thread-safe via OnceLock; a set context doubles as the "ready" flag.

use std::sync::OnceLock;

use crate::context::RuntimeContext;
use crate::error::{RuntimeError, RuntimeResult};

/// Global runtime storage
static RUNTIME: OnceLock<RuntimeContext> = OnceLock::new();

/// Publish the runtime context
///
/// Called once after discovery. Returns error if already initialized.
pub fn init_runtime(ctx: RuntimeContext) -> RuntimeResult<&'static RuntimeContext> {
    RUNTIME
        .set(ctx)
        .map_err(|_| RuntimeError::AlreadyInitialized)?;
    RUNTIME.get().ok_or(RuntimeError::NotReady)
}

/// Get the runtime context
pub fn runtime() -> RuntimeResult<&'static RuntimeContext> {
    RUNTIME.get().ok_or(RuntimeError::NotReady)
}

/// Try to get the runtime context
pub fn try_runtime() -> Option<&'static RuntimeContext> {
    RUNTIME.get()
}

/// Check if the runtime has been discovered
pub fn is_runtime_ready() -> bool {
    RUNTIME.get().is_some()
}
