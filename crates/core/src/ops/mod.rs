//! Runtime operation strategy
//!
//! Mono and IL2Cpp expose similar but incompatible C APIs. Everything above
//! this module talks to a [`RuntimeOps`] trait object and never names a
//! runtime export directly.
//!
//! ```text
//! ┌──────────────┐     ┌────────────┐     ┌──────────────┐
//! │ walker       │     │ invoke     │     │ memory       │
//! └──────┬───────┘     └─────┬──────┘     └──────┬───────┘
//!        └───────────────────┼───────────────────┘
//!                            ▼
//!                   dyn RuntimeOps
//!              ┌─────────────┴─────────────┐
//!              ▼                           ▼
//!          MonoOps                     Il2CppOps
//!   (mono_* via NativeBridge)   (il2cpp_* via NativeBridge)
//! ```

mod il2cpp;
mod mono;

use std::ffi::{c_char, c_void, CStr};

use uniresolve_engine::{NativeBridge, RetryPolicy};
use uniresolve_sdk::{Handle, RuntimeKind};

use crate::error::{RuntimeError, RuntimeResult};
use crate::model::TypeInfo;

pub use il2cpp::Il2CppOps;
pub use mono::MonoOps;

/// Upper bound on members returned by a single iterator export
///
/// Guards against a corrupted cursor looping forever.
pub(crate) const MAX_ITER_ITEMS: usize = 1 << 16;

/// Class identity as reported by the runtime
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub name: String,
    pub namespace: String,
    /// Parent class name, `None` for roots (`System.Object`, interfaces)
    pub parent: Option<String>,
}

/// Field descriptor as reported by the runtime
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub ty: TypeInfo,
    pub offset: i32,
    /// Metadata attribute flags, when the runtime exposes them (Mono)
    pub flags: Option<u32>,
}

/// Parameter descriptor
#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    pub name: String,
    pub ty: TypeInfo,
}

/// Method descriptor as reported by the runtime
#[derive(Debug, Clone, PartialEq)]
pub struct MethodInfo {
    pub name: String,
    pub return_type: TypeInfo,
    pub params: Vec<ParamInfo>,
    pub flags: u32,
    /// Native entry point known at discovery time (IL2Cpp AOT code)
    pub native: Option<usize>,
}

/// Operations every supported runtime provides
///
/// Handles passed in are ones the same implementation handed out earlier.
/// Implementations must not cache anything thread-affine; thread attachment
/// is managed by [`crate::RuntimeContext`].
pub trait RuntimeOps: Send + Sync {
    /// Which runtime this is
    fn kind(&self) -> RuntimeKind;

    /// Load address of the runtime image, for RVA output
    fn module_base(&self) -> Option<usize> {
        None
    }

    /// Block until the runtime's VM is usable
    fn wait_ready(&self, _policy: &RetryPolicy) -> RuntimeResult<()> {
        Ok(())
    }

    /// Root domain
    fn domain(&self) -> RuntimeResult<Handle>;

    /// Register the calling thread with the runtime
    fn attach_thread(&self) -> RuntimeResult<()>;

    /// Unregister the calling thread
    fn detach_thread(&self) -> RuntimeResult<()>;

    /// All loaded assemblies, in load order
    fn assemblies(&self) -> RuntimeResult<Vec<Handle>>;

    /// Image backing an assembly
    fn assembly_image(&self, assembly: Handle) -> RuntimeResult<Handle>;

    /// Assembly name as shown to users (always carries the `.dll` suffix)
    fn image_name(&self, image: Handle) -> RuntimeResult<String>;

    /// On-disk path of the image
    fn image_filename(&self, image: Handle) -> RuntimeResult<String>;

    /// Classes defined in an image, in metadata order
    fn image_classes(&self, image: Handle) -> RuntimeResult<Vec<Handle>>;

    fn class_info(&self, class: Handle) -> RuntimeResult<ClassInfo>;
    fn class_fields(&self, class: Handle) -> RuntimeResult<Vec<Handle>>;
    fn class_methods(&self, class: Handle) -> RuntimeResult<Vec<Handle>>;
    fn class_interfaces(&self, class: Handle) -> RuntimeResult<Vec<Handle>>;
    fn field_info(&self, field: Handle) -> RuntimeResult<FieldInfo>;
    fn method_info(&self, method: Handle) -> RuntimeResult<MethodInfo>;

    /// Produce a callable native entry point for the method
    fn compile_method(&self, method: Handle) -> RuntimeResult<usize>;

    /// Reflective invoke; returns the (possibly null) boxed result object
    ///
    /// # Safety
    /// `args` must point to one valid argument pointer per parameter, and
    /// `instance` must be a live object of the declaring class (or null for
    /// static methods).
    unsafe fn runtime_invoke(
        &self,
        method: Handle,
        instance: *mut c_void,
        args: *mut *mut c_void,
    ) -> RuntimeResult<*mut c_void>;

    /// Pointer to the value payload of a boxed value type
    ///
    /// # Safety
    /// `object` must be a live boxed value.
    unsafe fn object_unbox(&self, object: *mut c_void) -> RuntimeResult<*mut c_void>;

    /// Static storage v-table for a class (`None` when the runtime needs none)
    fn class_vtable(&self, class: Handle) -> RuntimeResult<Option<Handle>>;

    /// Copy a static field's value into `out`
    ///
    /// # Safety
    /// `out` must be writable for the field's full size.
    unsafe fn static_get(
        &self,
        field: Handle,
        vtable: Option<Handle>,
        out: *mut c_void,
    ) -> RuntimeResult<()>;

    /// Store a static field's value from `value`
    ///
    /// # Safety
    /// `value` must be readable for the field's full size.
    unsafe fn static_set(
        &self,
        field: Handle,
        vtable: Option<Handle>,
        value: *mut c_void,
    ) -> RuntimeResult<()>;

    /// Reflection `System.Type` object for a class
    fn class_type_object(&self, class: Handle) -> RuntimeResult<Handle>;

    /// Allocate an uninitialized instance (constructor not run)
    fn object_new(&self, class: Handle) -> RuntimeResult<Handle>;

    /// Allocate a managed string
    fn string_new(&self, text: &str) -> RuntimeResult<Handle>;

    /// Class name of a live object
    fn object_class_name(&self, object: Handle) -> RuntimeResult<String>;
}

/// Build the strategy for a runtime over its resolved exports
pub fn ops_for(kind: RuntimeKind, bridge: NativeBridge) -> Box<dyn RuntimeOps> {
    match kind {
        RuntimeKind::Mono => Box::new(MonoOps::new(bridge)),
        RuntimeKind::Il2Cpp => Box::new(Il2CppOps::new(bridge)),
    }
}

/// Copy a runtime-owned C string
///
/// # Safety
/// `ptr` must be null or point to a nul-terminated string.
pub(crate) unsafe fn owned_c_str(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(CStr::from_ptr(ptr).to_string_lossy().into_owned())
    }
}

/// Drain an `(owner, void** iter)` style iterator export
///
/// # Safety
/// `export` must have the signature `void* (void* owner, void** iter)`.
pub(crate) unsafe fn collect_iter(
    bridge: &NativeBridge,
    export: &'static str,
    owner: Handle,
) -> RuntimeResult<Vec<Handle>> {
    let mut cursor: *mut c_void = std::ptr::null_mut();
    let mut items = Vec::new();

    loop {
        let item: *mut c_void =
            bridge.call(export, (owner.as_void(), &mut cursor as *mut *mut c_void))?;
        match Handle::from_ptr(item) {
            Some(handle) => items.push(handle),
            None => break,
        }
        if items.len() >= MAX_ITER_ITEMS {
            tracing::warn!("{} yielded {} items for {}, stopping", export, items.len(), owner);
            break;
        }
    }

    Ok(items)
}

/// Fetch a string export result, mapping null to an error
pub(crate) fn require_str(value: Option<String>, export: &'static str) -> RuntimeResult<String> {
    value.ok_or(RuntimeError::NullResult { export })
}

/// Wrap a pointer result, mapping null to an error
pub(crate) fn require_handle(ptr: *mut c_void, export: &'static str) -> RuntimeResult<Handle> {
    Handle::from_ptr(ptr).ok_or(RuntimeError::NullResult { export })
}

/// Name the assembly the way users type it
pub(crate) fn assembly_display_name(image_name: &str) -> String {
    if image_name.ends_with(".dll") {
        image_name.to_string()
    } else {
        format!("{image_name}.dll")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembly_display_name() {
        assert_eq!(assembly_display_name("mscorlib"), "mscorlib.dll");
        assert_eq!(assembly_display_name("Assembly-CSharp.dll"), "Assembly-CSharp.dll");
    }

    #[test]
    fn test_owned_c_str() {
        assert_eq!(unsafe { owned_c_str(std::ptr::null()) }, None);
        assert_eq!(
            unsafe { owned_c_str(c"System.Int32".as_ptr()) }.as_deref(),
            Some("System.Int32")
        );
    }
}
