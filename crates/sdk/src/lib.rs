//! uniresolve SDK - Mono / IL2Cpp Runtime Type Definitions
//!
//! This crate contains opaque handle types, exported symbol names and managed
//! memory layouts shared by every other uniresolve crate. It has no
//! dependencies and compiles quickly, allowing parallel compilation of
//! dependent crates.
//!
//! # Modules
//!
//! - [`runtime`] - Opaque runtime handles and the runtime flavour enum
//! - [`exports`] - C export names per runtime
//! - [`metadata`] - Metadata flag and token constants
//! - [`layout`] - `#[repr(C)]` managed value and object header layouts

pub mod exports;
pub mod layout;
pub mod metadata;
pub mod runtime;

pub use layout::*;
pub use runtime::*;
