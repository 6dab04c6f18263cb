//! uniresolve Engine - Runtime Module Location and Native Dispatch
//!
//! This crate handles:
//! - Locating the Mono or IL2Cpp runtime module already mapped into the process
//! - Resolving its C exports by name, memoized for the process lifetime
//! - Calling resolved exports through typed `extern "C"` function pointers
//!
//! # Architecture
//!
//! The runtime module is found once via [`loader::locate_runtime`] (bounded
//! retry) or wrapped from a host-supplied handle with
//! [`NativeModule::from_raw`]. Lookups go through [`NativeBridge`], which keeps
//! a concurrent cache so each export name costs one OS lookup.
//!
//! # Thread Safety
//!
//! [`NativeBridge`] is `Send + Sync`. Resolved addresses stay valid for the
//! process lifetime because the runtime module is never unloaded.

pub mod bridge;
pub mod call;
pub mod error;
pub mod loader;
pub mod symbols;

pub use bridge::NativeBridge;
pub use call::NativeArgs;
pub use error::BridgeError;
pub use loader::{locate_runtime, LocatedRuntime, RetryPolicy};
pub use symbols::{NativeModule, SymbolSource};
