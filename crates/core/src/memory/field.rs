//! Lazily resolved typed field accessor

use std::ffi::c_void;
use std::marker::PhantomData;
use std::sync::OnceLock;

use crate::context::RuntimeContext;
use crate::error::{RuntimeError, RuntimeResult};
use crate::global;
use crate::model::{FieldId, WILDCARD};

/// A typed managed field with cached resolution
///
/// Resolves `assembly!namespace.class::field` on first access and caches the
/// resulting [`FieldId`] for the context it was resolved against. Accessing
/// through a different context re-resolves without touching the cache.
///
/// # Example
///
/// ```ignore
/// static HEALTH: ManagedField<i32> =
///     ManagedField::new("Assembly-CSharp.dll", "Game", "Player", "health");
///
/// let hp = HEALTH.get(player_ptr)?;
/// HEALTH.set(player_ptr, 100)?;
/// ```
pub struct ManagedField<T: Copy> {
    assembly: &'static str,
    namespace: &'static str,
    class: &'static str,
    field: &'static str,
    resolved: OnceLock<(u64, FieldId)>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Copy> ManagedField<T> {
    /// Create a field accessor; `namespace` may be `"*"`
    pub const fn new(
        assembly: &'static str,
        namespace: &'static str,
        class: &'static str,
        field: &'static str,
    ) -> Self {
        Self {
            assembly,
            namespace,
            class,
            field,
            resolved: OnceLock::new(),
            _marker: PhantomData,
        }
    }

    /// Find the field in `ctx`, caching the first successful resolution
    pub fn resolve(&self, ctx: &RuntimeContext) -> RuntimeResult<FieldId> {
        if let Some(&(owner, id)) = self.resolved.get() {
            if owner == ctx.id() {
                tracing::trace!("Cache hit for {}.{}", self.class, self.field);
                return Ok(id);
            }
        }

        let registry = ctx.registry();
        let assembly = registry
            .find_assembly(self.assembly)
            .ok_or_else(|| RuntimeError::AssemblyNotFound(self.assembly.to_string()))?;
        let class = registry
            .find_class(assembly, self.class, self.namespace, WILDCARD)
            .ok_or_else(|| RuntimeError::ClassNotFound(self.class.to_string()))?;
        let id = registry
            .find_field(class, self.field)
            .ok_or_else(|| RuntimeError::FieldNotFound {
                class: self.class.to_string(),
                field: self.field.to_string(),
            })?;

        tracing::debug!(
            "Resolved {}.{}: offset={:#x}",
            self.class,
            self.field,
            registry.field(id).offset
        );
        let _ = self.resolved.set((ctx.id(), id));
        Ok(id)
    }

    /// Whether a resolution has been cached
    pub fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    pub fn get_in(&self, ctx: &RuntimeContext, instance: *mut c_void) -> RuntimeResult<T> {
        ctx.read_field(instance, self.resolve(ctx)?)
    }

    pub fn set_in(&self, ctx: &RuntimeContext, instance: *mut c_void, value: T) -> RuntimeResult<()> {
        ctx.write_field(instance, self.resolve(ctx)?, value)
    }

    pub fn get_static_in(&self, ctx: &RuntimeContext) -> RuntimeResult<T> {
        ctx.read_static(self.resolve(ctx)?)
    }

    pub fn set_static_in(&self, ctx: &RuntimeContext, value: T) -> RuntimeResult<()> {
        ctx.write_static(self.resolve(ctx)?, value)
    }

    /// Read from `instance` using the process-wide runtime
    pub fn get(&self, instance: *mut c_void) -> RuntimeResult<T> {
        self.get_in(global::try_runtime().ok_or(RuntimeError::NotReady)?, instance)
    }

    /// Write to `instance` using the process-wide runtime
    pub fn set(&self, instance: *mut c_void, value: T) -> RuntimeResult<()> {
        self.set_in(global::try_runtime().ok_or(RuntimeError::NotReady)?, instance, value)
    }

    /// Read the static value using the process-wide runtime
    pub fn get_static(&self) -> RuntimeResult<T> {
        self.get_static_in(global::try_runtime().ok_or(RuntimeError::NotReady)?)
    }

    /// Write the static value using the process-wide runtime
    pub fn set_static(&self, value: T) -> RuntimeResult<()> {
        self.set_static_in(global::try_runtime().ok_or(RuntimeError::NotReady)?, value)
    }
}
