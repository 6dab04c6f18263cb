//! uniresolve proc macros
//!
//! - `#[derive(ManagedClass)]` - Generate typed accessors for managed class fields
//!
//! # Example
//!
//! ```ignore
//! use std::ffi::c_void;
//! use std::marker::PhantomData;
//! use uniresolve_core::ManagedClass;
//!
//! #[derive(ManagedClass)]
//! #[managed(assembly = "Assembly-CSharp.dll", namespace = "Game", class = "Player")]
//! pub struct Player {
//!     ptr: *mut c_void,
//!
//!     #[managed(field = "health")]
//!     health: PhantomData<i32>,
//!
//!     #[managed(field = "maxHealth", readonly)]
//!     max_health: PhantomData<i32>,
//!
//!     #[managed(field = "count", static_field)]
//!     count: PhantomData<i32>,
//! }
//!
//! // Generated methods:
//! // - player.health() -> RuntimeResult<i32>
//! // - player.set_health(100) -> RuntimeResult<()>
//! // - player.max_health() -> RuntimeResult<i32>
//! // - Player::count() / Player::set_count(n)
//! ```
//!
//! # Attributes
//!
//! ## Struct Attributes
//!
//! - `#[managed(class = "Name")]` - **Required.** The managed class name.
//! - `#[managed(assembly = "X.dll")]` - Declaring assembly (default: "Assembly-CSharp.dll").
//! - `#[managed(namespace = "Ns")]` - Namespace filter (default: any).
//!
//! ## Field Attributes
//!
//! - `#[managed(field = "name")]` - Mark as a managed field with the given name.
//! - `#[managed(readonly)]` - Don't generate a setter.
//! - `#[managed(static_field)]` - Field lives in static storage; accessors take no `self`.

mod managed_class;
mod parse;

use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

/// Derive macro for managed class wrappers
///
/// Generates typed accessors for managed fields with lazy resolution through
/// the process-wide runtime. Each field resolves once per runtime context and
/// is cached in a `ManagedField` static.
///
/// # Generated Code
///
/// For each managed field:
///
/// - A getter (`fn health(&self) -> RuntimeResult<i32>`)
/// - A setter (`fn set_health(&self, value: i32) -> RuntimeResult<()>`) unless `readonly`
/// - A `HEALTH_FIELD` name constant
///
/// For the struct, which must have a `ptr: *mut c_void` field:
///
/// - A `ManagedObject` trait implementation (`from_ptr`, `ptr`, class constants)
/// - `fn as_ptr(&self) -> *mut c_void`
#[proc_macro_derive(ManagedClass, attributes(managed))]
pub fn derive_managed_class(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    managed_class::derive_managed_class(input).into()
}
