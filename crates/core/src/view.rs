//! Borrowing views for chained lookups
//!
//! ```ignore
//! let method = ctx
//!     .require_assembly("Assembly-CSharp.dll")?
//!     .require_class("Player")?
//!     .method("TakeDamage", &["System.Int32"])?;
//! let killed: bool = unsafe { method.runtime_invoke(player, (25i32,))? };
//! ```

use std::ffi::c_void;

use uniresolve_engine::NativeArgs;
use uniresolve_sdk::Handle;

use crate::context::RuntimeContext;
use crate::error::{RuntimeError, RuntimeResult};
use crate::managed::FieldValue;
use crate::model::{
    Assembly, AssemblyId, Class, ClassId, Field, FieldId, Method, MethodId, Resolution, WILDCARD,
};

/// An assembly in a [`RuntimeContext`]
#[derive(Clone, Copy)]
pub struct AssemblyRef<'a> {
    ctx: &'a RuntimeContext,
    id: AssemblyId,
}

impl<'a> AssemblyRef<'a> {
    pub(crate) fn new(ctx: &'a RuntimeContext, id: AssemblyId) -> Self {
        Self { ctx, id }
    }

    pub fn id(&self) -> AssemblyId {
        self.id
    }

    pub fn get(&self) -> &'a Assembly {
        self.ctx.registry().assembly(self.id)
    }

    pub fn name(&self) -> &'a str {
        &self.get().name
    }

    /// First class with this name in any namespace
    pub fn class(&self, name: &str) -> Option<ClassRef<'a>> {
        self.class_in(name, WILDCARD, WILDCARD)
    }

    /// First class matching name, namespace and parent (`"*"` matches any)
    pub fn class_in(&self, name: &str, namespace: &str, parent: &str) -> Option<ClassRef<'a>> {
        self.ctx
            .registry()
            .find_class(self.id, name, namespace, parent)
            .map(|id| ClassRef::new(self.ctx, id))
    }

    pub fn require_class(&self, name: &str) -> RuntimeResult<ClassRef<'a>> {
        self.class(name)
            .ok_or_else(|| RuntimeError::ClassNotFound(format!("{}!{}", self.name(), name)))
    }

    pub fn classes(&self) -> impl Iterator<Item = ClassRef<'a>> + 'a {
        let ctx = self.ctx;
        self.get().classes.iter().map(move |&id| ClassRef::new(ctx, id))
    }
}

/// A class in a [`RuntimeContext`]
#[derive(Clone, Copy)]
pub struct ClassRef<'a> {
    ctx: &'a RuntimeContext,
    id: ClassId,
}

impl<'a> ClassRef<'a> {
    pub(crate) fn new(ctx: &'a RuntimeContext, id: ClassId) -> Self {
        Self { ctx, id }
    }

    pub fn id(&self) -> ClassId {
        self.id
    }

    pub fn get(&self) -> &'a Class {
        self.ctx.registry().class(self.id)
    }

    pub fn name(&self) -> &'a str {
        &self.get().name
    }

    pub fn namespace(&self) -> &'a str {
        &self.get().namespace
    }

    pub fn field(&self, name: &str) -> Option<FieldRef<'a>> {
        self.ctx
            .registry()
            .find_field(self.id, name)
            .map(|id| FieldRef::new(self.ctx, id))
    }

    pub fn require_field(&self, name: &str) -> RuntimeResult<FieldRef<'a>> {
        self.field(name).ok_or_else(|| RuntimeError::FieldNotFound {
            class: self.get().full_name(),
            field: name.to_string(),
        })
    }

    /// Overload lookup with name-only fallback; check [`MethodRef::is_exact`]
    pub fn method(&self, name: &str, params: &[&str]) -> RuntimeResult<MethodRef<'a>> {
        let found = self
            .ctx
            .registry()
            .find_method(self.id, name, params)
            .ok_or_else(|| RuntimeError::MethodNotFound {
                class: self.get().full_name(),
                method: name.to_string(),
            })?;
        Ok(MethodRef::new(self.ctx, found.id, found.resolution))
    }

    /// Overload lookup without fallback
    pub fn method_strict(&self, name: &str, params: &[&str]) -> RuntimeResult<MethodRef<'a>> {
        let id = self.ctx.registry().find_method_strict(self.id, name, params)?;
        Ok(MethodRef::new(self.ctx, id, Resolution::Exact))
    }

    /// Parent class, resolved by name
    pub fn parent(&self) -> Option<ClassRef<'a>> {
        self.ctx
            .registry()
            .parent_of(self.id)
            .map(|id| ClassRef::new(self.ctx, id))
    }

    pub fn fields(&self) -> impl Iterator<Item = FieldRef<'a>> + 'a {
        let ctx = self.ctx;
        self.get().fields.iter().map(move |&id| FieldRef::new(ctx, id))
    }

    pub fn methods(&self) -> impl Iterator<Item = MethodRef<'a>> + 'a {
        let ctx = self.ctx;
        self.get()
            .methods
            .iter()
            .map(move |&id| MethodRef::new(ctx, id, Resolution::Exact))
    }

    pub fn type_object(&self) -> RuntimeResult<Handle> {
        self.ctx.class_type_object(self.id)
    }

    pub fn new_object(&self) -> RuntimeResult<Handle> {
        self.ctx.new_object(self.id)
    }
}

/// A field in a [`RuntimeContext`]
#[derive(Clone, Copy)]
pub struct FieldRef<'a> {
    ctx: &'a RuntimeContext,
    id: FieldId,
}

impl<'a> FieldRef<'a> {
    pub(crate) fn new(ctx: &'a RuntimeContext, id: FieldId) -> Self {
        Self { ctx, id }
    }

    pub fn id(&self) -> FieldId {
        self.id
    }

    pub fn get(&self) -> &'a Field {
        self.ctx.registry().field(self.id)
    }

    pub fn offset(&self) -> i32 {
        self.get().offset
    }

    pub fn is_static(&self) -> bool {
        self.get().is_static
    }

    pub fn read<T: Copy>(&self, instance: *mut c_void) -> RuntimeResult<T> {
        self.ctx.read_field(instance, self.id)
    }

    pub fn write<T: Copy>(&self, instance: *mut c_void, value: T) -> RuntimeResult<()> {
        self.ctx.write_field(instance, self.id, value)
    }

    pub fn read_static<T: Copy>(&self) -> RuntimeResult<T> {
        self.ctx.read_static(self.id)
    }

    pub fn write_static<T: Copy>(&self, value: T) -> RuntimeResult<()> {
        self.ctx.write_static(self.id, value)
    }

    /// Type-erased read; `instance` is ignored for static fields
    pub fn value(&self, instance: *mut c_void) -> RuntimeResult<FieldValue> {
        self.ctx.read_value(self.id, instance)
    }

    pub fn set_value(&self, instance: *mut c_void, value: FieldValue) -> RuntimeResult<()> {
        self.ctx.write_value(self.id, instance, value)
    }
}

/// A method in a [`RuntimeContext`]
#[derive(Clone, Copy)]
pub struct MethodRef<'a> {
    ctx: &'a RuntimeContext,
    id: MethodId,
    resolution: Resolution,
}

impl<'a> MethodRef<'a> {
    pub(crate) fn new(ctx: &'a RuntimeContext, id: MethodId, resolution: Resolution) -> Self {
        Self {
            ctx,
            id,
            resolution,
        }
    }

    pub fn id(&self) -> MethodId {
        self.id
    }

    pub fn get(&self) -> &'a Method {
        self.ctx.registry().method(self.id)
    }

    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    /// False when the lookup fell back to the first method with this name
    pub fn is_exact(&self) -> bool {
        self.resolution == Resolution::Exact
    }

    pub fn ensure_compiled(&self) -> RuntimeResult<usize> {
        self.ctx.ensure_compiled(self.id)
    }

    /// Direct native call; see [`RuntimeContext::invoke`]
    ///
    /// # Safety
    /// `A` and `R` must match the native signature exactly.
    pub unsafe fn invoke<R, A: NativeArgs>(&self, args: A) -> RuntimeResult<R> {
        self.ctx.invoke(self.id, args)
    }

    /// Typed function pointer; see [`RuntimeContext::cast`]
    ///
    /// # Safety
    /// `F` must be an `extern "C"` fn type matching the native signature.
    pub unsafe fn cast<F: Copy>(&self) -> RuntimeResult<F> {
        self.ctx.cast(self.id)
    }

    /// Reflective call with unboxed result; see [`RuntimeContext::runtime_invoke`]
    ///
    /// # Safety
    /// Each element of `args` must match the parameter's managed layout.
    pub unsafe fn runtime_invoke<R: Copy, A: NativeArgs>(
        &self,
        instance: *mut c_void,
        args: A,
    ) -> RuntimeResult<R> {
        self.ctx.runtime_invoke(self.id, instance, args)
    }

    /// # Safety
    /// Each element of `args` must match the parameter's managed layout.
    pub unsafe fn runtime_invoke_void<A: NativeArgs>(
        &self,
        instance: *mut c_void,
        args: A,
    ) -> RuntimeResult<()> {
        self.ctx.runtime_invoke_void(self.id, instance, args)
    }

    /// # Safety
    /// Each element of `args` must match the parameter's managed layout.
    pub unsafe fn runtime_invoke_object<A: NativeArgs>(
        &self,
        instance: *mut c_void,
        args: A,
    ) -> RuntimeResult<Option<Handle>> {
        self.ctx.runtime_invoke_object(self.id, instance, args)
    }
}
