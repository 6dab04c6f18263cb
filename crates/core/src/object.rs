//! Typed wrappers over managed object pointers
//!
//! Implemented by `#[derive(ManagedClass)]`; see the macro crate for the
//! attribute syntax.

use std::ffi::c_void;

use crate::context::RuntimeContext;
use crate::error::{RuntimeError, RuntimeResult};
use crate::global;
use crate::model::WILDCARD;
use crate::view::ClassRef;

/// A Rust type wrapping a pointer to one managed class's instances
pub trait ManagedObject: Sized {
    /// Declaring assembly
    const ASSEMBLY: &'static str;
    /// Namespace filter (`"*"` for any)
    const NAMESPACE: &'static str;
    /// Managed class name
    const CLASS_NAME: &'static str;

    /// The wrapped object pointer
    fn ptr(&self) -> *mut c_void;

    /// Wrap an object pointer
    ///
    /// # Safety
    /// `ptr` must be null or point to a live instance of the class.
    unsafe fn from_ptr(ptr: *mut c_void) -> Option<Self>;

    fn is_valid(&self) -> bool {
        !self.ptr().is_null()
    }

    /// Resolve the wrapped class in `ctx`
    fn class_in(ctx: &RuntimeContext) -> RuntimeResult<ClassRef<'_>> {
        ctx.require_assembly(Self::ASSEMBLY)?
            .class_in(Self::CLASS_NAME, Self::NAMESPACE, WILDCARD)
            .ok_or_else(|| RuntimeError::ClassNotFound(Self::CLASS_NAME.to_string()))
    }

    /// Allocate a fresh, unconstructed instance through `ctx`
    fn new_in(ctx: &RuntimeContext) -> RuntimeResult<Self> {
        let object = Self::class_in(ctx)?.new_object()?;
        // SAFETY: the runtime just allocated an instance of this class
        unsafe { Self::from_ptr(object.as_void()) }
            .ok_or_else(|| RuntimeError::NullReturn(Self::CLASS_NAME.to_string()))
    }

    /// [`Self::new_in`] against the process-wide runtime
    fn new_object() -> RuntimeResult<Self> {
        Self::new_in(global::runtime()?)
    }
}
