//! IL2Cpp runtime strategy (`il2cpp_*` exports)
//!
//! IL2Cpp code is compiled ahead of time, so method entry points are known
//! at discovery: the first word of every `MethodInfo` is the native pointer.

use std::ffi::{c_char, c_void, CString};
use std::sync::OnceLock;

use uniresolve_engine::{NativeBridge, RetryPolicy};
use uniresolve_sdk::exports::il2cpp;
use uniresolve_sdk::{Handle, RuntimeKind};

use super::{
    assembly_display_name, collect_iter, owned_c_str, require_handle, require_str, ClassInfo,
    FieldInfo, MethodInfo, ParamInfo, RuntimeOps, MAX_ITER_ITEMS,
};
use crate::error::{RuntimeError, RuntimeResult};
use crate::memory::guard;
use crate::model::TypeInfo;

/// IL2Cpp (AOT) runtime operations
pub struct Il2CppOps {
    bridge: NativeBridge,
    domain: OnceLock<Handle>,
}

impl Il2CppOps {
    pub fn new(bridge: NativeBridge) -> Self {
        Self {
            bridge,
            domain: OnceLock::new(),
        }
    }

    /// Full name of an `Il2CppType*`, freed with `il2cpp_free`
    ///
    /// IL2Cpp exposes no type size export; sizes stay unknown.
    fn type_info(&self, ty: *mut c_void) -> RuntimeResult<TypeInfo> {
        let ty = require_handle(ty, il2cpp::TYPE_GET_NAME)?;
        unsafe {
            let raw: *mut c_char = self.bridge.call(il2cpp::TYPE_GET_NAME, (ty.as_void(),))?;
            let name = owned_c_str(raw);
            if !raw.is_null() {
                let _: Option<()> = self
                    .bridge
                    .optional_call(il2cpp::FREE, (raw as *mut c_void,));
            }
            Ok(TypeInfo {
                name: require_str(name, il2cpp::TYPE_GET_NAME)?,
                size: None,
            })
        }
    }

    fn str_export(&self, export: &'static str, handle: Handle) -> RuntimeResult<String> {
        let raw: *const c_char = unsafe { self.bridge.call(export, (handle.as_void(),))? };
        require_str(unsafe { owned_c_str(raw) }, export)
    }

    fn class_name_of(&self, class: *mut c_void) -> RuntimeResult<Option<String>> {
        match Handle::from_ptr(class) {
            Some(class) => self.str_export(il2cpp::CLASS_GET_NAME, class).map(Some),
            None => Ok(None),
        }
    }

    /// Native pointer stored in the first word of the `MethodInfo`
    fn method_pointer(&self, method: Handle) -> Option<usize> {
        guard::try_read::<usize>(method.addr())
            .ok()
            .filter(|&ptr| ptr != 0)
    }
}

impl RuntimeOps for Il2CppOps {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Il2Cpp
    }

    fn module_base(&self) -> Option<usize> {
        self.bridge.module_base()
    }

    #[tracing::instrument(skip_all)]
    fn wait_ready(&self, policy: &RetryPolicy) -> RuntimeResult<()> {
        let ready = policy.run("il2cpp vm thread", |_| {
            let is_vm: Result<bool, _> =
                unsafe { self.bridge.call(il2cpp::IS_VM_THREAD, (std::ptr::null_mut::<c_void>(),)) };
            match is_vm {
                Ok(true) => Some(Ok(())),
                Ok(false) => None,
                Err(e) => Some(Err(e)),
            }
        });

        match ready {
            Some((result, _)) => result.map_err(RuntimeError::from),
            None => Err(RuntimeError::RuntimeNotReady {
                attempts: policy.max_attempts.max(1),
            }),
        }
    }

    fn domain(&self) -> RuntimeResult<Handle> {
        if let Some(domain) = self.domain.get() {
            return Ok(*domain);
        }
        let raw: *mut c_void = unsafe { self.bridge.call(il2cpp::DOMAIN_GET, ())? };
        let domain = require_handle(raw, il2cpp::DOMAIN_GET)?;
        Ok(*self.domain.get_or_init(|| domain))
    }

    fn attach_thread(&self) -> RuntimeResult<()> {
        let domain = self.domain()?;
        let _: *mut c_void =
            unsafe { self.bridge.call(il2cpp::THREAD_ATTACH, (domain.as_void(),))? };
        Ok(())
    }

    fn detach_thread(&self) -> RuntimeResult<()> {
        unsafe {
            let thread: *mut c_void = self.bridge.call(il2cpp::THREAD_CURRENT, ())?;
            if !thread.is_null() {
                let _: () = self.bridge.call(il2cpp::THREAD_DETACH, (thread,))?;
            }
        }
        Ok(())
    }

    fn assemblies(&self) -> RuntimeResult<Vec<Handle>> {
        let domain = self.domain()?;
        let mut count: usize = 0;
        let list: *mut *mut c_void = unsafe {
            self.bridge.call(
                il2cpp::DOMAIN_GET_ASSEMBLIES,
                (domain.as_void(), &mut count as *mut usize),
            )?
        };
        if list.is_null() || count == 0 {
            return Ok(Vec::new());
        }

        let count = count.min(MAX_ITER_ITEMS);
        // SAFETY: the runtime owns a contiguous array of `count` assembly pointers
        let raw = unsafe { std::slice::from_raw_parts(list, count) };
        Ok(raw.iter().filter_map(|&a| Handle::from_ptr(a)).collect())
    }

    fn assembly_image(&self, assembly: Handle) -> RuntimeResult<Handle> {
        let raw: *mut c_void =
            unsafe { self.bridge.call(il2cpp::ASSEMBLY_GET_IMAGE, (assembly.as_void(),))? };
        require_handle(raw, il2cpp::ASSEMBLY_GET_IMAGE)
    }

    fn image_name(&self, image: Handle) -> RuntimeResult<String> {
        self.str_export(il2cpp::IMAGE_GET_NAME, image)
            .map(|name| assembly_display_name(&name))
    }

    fn image_filename(&self, image: Handle) -> RuntimeResult<String> {
        self.str_export(il2cpp::IMAGE_GET_FILENAME, image)
    }

    fn image_classes(&self, image: Handle) -> RuntimeResult<Vec<Handle>> {
        unsafe {
            let count: usize = self
                .bridge
                .call(il2cpp::IMAGE_GET_CLASS_COUNT, (image.as_void(),))?;
            let count = count.min(MAX_ITER_ITEMS);
            let mut classes = Vec::with_capacity(count);
            for index in 0..count {
                let class: *mut c_void = self
                    .bridge
                    .call(il2cpp::IMAGE_GET_CLASS, (image.as_void(), index))?;
                if let Some(class) = Handle::from_ptr(class) {
                    classes.push(class);
                }
            }
            Ok(classes)
        }
    }

    fn class_info(&self, class: Handle) -> RuntimeResult<ClassInfo> {
        let name = self.str_export(il2cpp::CLASS_GET_NAME, class)?;
        let namespace = self.str_export(il2cpp::CLASS_GET_NAMESPACE, class)?;
        let parent: *mut c_void =
            unsafe { self.bridge.call(il2cpp::CLASS_GET_PARENT, (class.as_void(),))? };
        let parent = self.class_name_of(parent)?;
        Ok(ClassInfo {
            name,
            namespace,
            parent,
        })
    }

    fn class_fields(&self, class: Handle) -> RuntimeResult<Vec<Handle>> {
        unsafe { collect_iter(&self.bridge, il2cpp::CLASS_GET_FIELDS, class) }
    }

    fn class_methods(&self, class: Handle) -> RuntimeResult<Vec<Handle>> {
        unsafe { collect_iter(&self.bridge, il2cpp::CLASS_GET_METHODS, class) }
    }

    fn class_interfaces(&self, class: Handle) -> RuntimeResult<Vec<Handle>> {
        unsafe { collect_iter(&self.bridge, il2cpp::CLASS_GET_INTERFACES, class) }
    }

    fn field_info(&self, field: Handle) -> RuntimeResult<FieldInfo> {
        let name = self.str_export(il2cpp::FIELD_GET_NAME, field)?;
        unsafe {
            let ty: *mut c_void = self.bridge.call(il2cpp::FIELD_GET_TYPE, (field.as_void(),))?;
            let ty = self.type_info(ty)?;
            // size_t on the wire; thread-static fields report -1
            let offset: usize = self
                .bridge
                .call(il2cpp::FIELD_GET_OFFSET, (field.as_void(),))?;
            Ok(FieldInfo {
                name,
                ty,
                offset: offset as isize as i32,
                flags: None,
            })
        }
    }

    fn method_info(&self, method: Handle) -> RuntimeResult<MethodInfo> {
        let name = self.str_export(il2cpp::METHOD_GET_NAME, method)?;
        unsafe {
            let ret: *mut c_void = self
                .bridge
                .call(il2cpp::METHOD_GET_RETURN_TYPE, (method.as_void(),))?;
            let return_type = self.type_info(ret)?;

            let mut iflags: u32 = 0;
            let flags: u32 = self.bridge.call(
                il2cpp::METHOD_GET_FLAGS,
                (method.as_void(), &mut iflags as *mut u32),
            )?;

            let count: u32 = self
                .bridge
                .call(il2cpp::METHOD_GET_PARAM_COUNT, (method.as_void(),))?;
            let count = (count as usize).min(MAX_ITER_ITEMS);

            let mut params = Vec::with_capacity(count);
            for index in 0..count as u32 {
                let raw_name: *const c_char = self
                    .bridge
                    .call(il2cpp::METHOD_GET_PARAM_NAME, (method.as_void(), index))?;
                let name = owned_c_str(raw_name).unwrap_or_else(|| format!("arg{index}"));
                let ty: *mut c_void = self
                    .bridge
                    .call(il2cpp::METHOD_GET_PARAM, (method.as_void(), index))?;
                params.push(ParamInfo {
                    name,
                    ty: self.type_info(ty)?,
                });
            }

            Ok(MethodInfo {
                name,
                return_type,
                params,
                flags,
                native: self.method_pointer(method),
            })
        }
    }

    fn compile_method(&self, method: Handle) -> RuntimeResult<usize> {
        self.method_pointer(method)
            .ok_or_else(|| RuntimeError::NotCompiled(method.to_string()))
    }

    unsafe fn runtime_invoke(
        &self,
        method: Handle,
        instance: *mut c_void,
        args: *mut *mut c_void,
    ) -> RuntimeResult<*mut c_void> {
        let mut exception: *mut c_void = std::ptr::null_mut();
        let result: *mut c_void = self.bridge.call(
            il2cpp::RUNTIME_INVOKE,
            (method.as_void(), instance, args, &mut exception as *mut *mut c_void),
        )?;

        if let Some(exception) = Handle::from_ptr(exception) {
            let name = self
                .object_class_name(exception)
                .unwrap_or_else(|_| "<unknown exception>".to_string());
            let method = self.str_export(il2cpp::METHOD_GET_NAME, method)?;
            return Err(RuntimeError::ManagedException {
                method,
                exception: name,
            });
        }

        Ok(result)
    }

    unsafe fn object_unbox(&self, object: *mut c_void) -> RuntimeResult<*mut c_void> {
        Ok(self.bridge.call(il2cpp::OBJECT_UNBOX, (object,))?)
    }

    fn class_vtable(&self, _class: Handle) -> RuntimeResult<Option<Handle>> {
        Ok(None)
    }

    unsafe fn static_get(
        &self,
        field: Handle,
        _vtable: Option<Handle>,
        out: *mut c_void,
    ) -> RuntimeResult<()> {
        let _: () = self
            .bridge
            .call(il2cpp::FIELD_STATIC_GET_VALUE, (field.as_void(), out))?;
        Ok(())
    }

    unsafe fn static_set(
        &self,
        field: Handle,
        _vtable: Option<Handle>,
        value: *mut c_void,
    ) -> RuntimeResult<()> {
        let _: () = self
            .bridge
            .call(il2cpp::FIELD_STATIC_SET_VALUE, (field.as_void(), value))?;
        Ok(())
    }

    fn class_type_object(&self, class: Handle) -> RuntimeResult<Handle> {
        unsafe {
            let ty: *mut c_void = self.bridge.call(il2cpp::CLASS_GET_TYPE, (class.as_void(),))?;
            let ty = require_handle(ty, il2cpp::CLASS_GET_TYPE)?;
            let object: *mut c_void = self.bridge.call(il2cpp::TYPE_GET_OBJECT, (ty.as_void(),))?;
            require_handle(object, il2cpp::TYPE_GET_OBJECT)
        }
    }

    fn object_new(&self, class: Handle) -> RuntimeResult<Handle> {
        let raw: *mut c_void =
            unsafe { self.bridge.call(il2cpp::OBJECT_NEW, (class.as_void(),))? };
        require_handle(raw, il2cpp::OBJECT_NEW)
    }

    fn string_new(&self, text: &str) -> RuntimeResult<Handle> {
        let text = CString::new(text).map_err(|e| RuntimeError::Internal(e.to_string()))?;
        let raw: *mut c_void = unsafe { self.bridge.call(il2cpp::STRING_NEW, (text.as_ptr(),))? };
        require_handle(raw, il2cpp::STRING_NEW)
    }

    fn object_class_name(&self, object: Handle) -> RuntimeResult<String> {
        let class: *mut c_void =
            unsafe { self.bridge.call(il2cpp::OBJECT_GET_CLASS, (object.as_void(),))? };
        self.class_name_of(class)?
            .ok_or(RuntimeError::NullResult {
                export: il2cpp::OBJECT_GET_CLASS,
            })
    }
}
