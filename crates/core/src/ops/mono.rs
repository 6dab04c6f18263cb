//! Mono runtime strategy (`mono_*` exports)

use std::ffi::{c_char, c_void, CString};
use std::sync::OnceLock;

use uniresolve_engine::NativeBridge;
use uniresolve_sdk::exports::mono;
use uniresolve_sdk::metadata::{typedef_token, TABLE_TYPEDEF};
use uniresolve_sdk::{Handle, RuntimeKind};

use super::{
    assembly_display_name, collect_iter, owned_c_str, require_handle, require_str, ClassInfo,
    FieldInfo, MethodInfo, ParamInfo, RuntimeOps, MAX_ITER_ITEMS,
};
use crate::error::{RuntimeError, RuntimeResult};
use crate::model::TypeInfo;

/// `mono_assembly_foreach` callback collecting into a `Vec<Handle>`
extern "C" fn collect_assembly(assembly: *mut c_void, user_data: *mut c_void) {
    // SAFETY: user_data is the &mut Vec<Handle> passed by `assemblies` below,
    // alive for the duration of the foreach call.
    let out = unsafe { &mut *(user_data as *mut Vec<Handle>) };
    if let Some(handle) = Handle::from_ptr(assembly) {
        out.push(handle);
    }
}

/// Mono (JIT) runtime operations
pub struct MonoOps {
    bridge: NativeBridge,
    domain: OnceLock<Handle>,
}

impl MonoOps {
    pub fn new(bridge: NativeBridge) -> Self {
        Self {
            bridge,
            domain: OnceLock::new(),
        }
    }

    /// Full name of a `MonoType*`, freed with `mono_free`
    fn type_info(&self, ty: *mut c_void) -> RuntimeResult<TypeInfo> {
        let ty = require_handle(ty, mono::TYPE_GET_NAME)?;
        unsafe {
            let raw: *mut c_char = self.bridge.call(mono::TYPE_GET_NAME, (ty.as_void(),))?;
            let name = owned_c_str(raw);
            if !raw.is_null() {
                let _: Option<()> = self.bridge.optional_call(mono::FREE, (raw as *mut c_void,));
            }
            let name = require_str(name, mono::TYPE_GET_NAME)?;

            let mut align: i32 = 0;
            let size: Option<i32> = self
                .bridge
                .optional_call(mono::TYPE_SIZE, (ty.as_void(), &mut align as *mut i32));

            Ok(TypeInfo { name, size })
        }
    }

    fn str_export(&self, export: &'static str, handle: Handle) -> RuntimeResult<String> {
        let raw: *const c_char = unsafe { self.bridge.call(export, (handle.as_void(),))? };
        require_str(unsafe { owned_c_str(raw) }, export)
    }

    fn class_name_of(&self, class: *mut c_void) -> RuntimeResult<Option<String>> {
        match Handle::from_ptr(class) {
            Some(class) => self.str_export(mono::CLASS_GET_NAME, class).map(Some),
            None => Ok(None),
        }
    }
}

impl RuntimeOps for MonoOps {
    fn kind(&self) -> RuntimeKind {
        RuntimeKind::Mono
    }

    fn module_base(&self) -> Option<usize> {
        self.bridge.module_base()
    }

    fn domain(&self) -> RuntimeResult<Handle> {
        if let Some(domain) = self.domain.get() {
            return Ok(*domain);
        }
        let raw: *mut c_void = unsafe { self.bridge.call(mono::GET_ROOT_DOMAIN, ())? };
        let domain = require_handle(raw, mono::GET_ROOT_DOMAIN)?;
        Ok(*self.domain.get_or_init(|| domain))
    }

    fn attach_thread(&self) -> RuntimeResult<()> {
        let domain = self.domain()?;
        unsafe {
            let _: *mut c_void = self.bridge.call(mono::THREAD_ATTACH, (domain.as_void(),))?;
            let _: Option<*mut c_void> = self
                .bridge
                .optional_call(mono::JIT_THREAD_ATTACH, (domain.as_void(),));
        }
        Ok(())
    }

    fn detach_thread(&self) -> RuntimeResult<()> {
        unsafe {
            let thread: *mut c_void = self.bridge.call(mono::THREAD_CURRENT, ())?;
            if !thread.is_null() {
                let _: () = self.bridge.call(mono::THREAD_DETACH, (thread,))?;
            }
        }
        Ok(())
    }

    fn assemblies(&self) -> RuntimeResult<Vec<Handle>> {
        let mut out: Vec<Handle> = Vec::new();
        let callback: extern "C" fn(*mut c_void, *mut c_void) = collect_assembly;
        unsafe {
            let _: () = self.bridge.call(
                mono::ASSEMBLY_FOREACH,
                (callback, &mut out as *mut Vec<Handle> as *mut c_void),
            )?;
        }
        Ok(out)
    }

    fn assembly_image(&self, assembly: Handle) -> RuntimeResult<Handle> {
        let raw: *mut c_void =
            unsafe { self.bridge.call(mono::ASSEMBLY_GET_IMAGE, (assembly.as_void(),))? };
        require_handle(raw, mono::ASSEMBLY_GET_IMAGE)
    }

    fn image_name(&self, image: Handle) -> RuntimeResult<String> {
        self.str_export(mono::IMAGE_GET_NAME, image)
            .map(|name| assembly_display_name(&name))
    }

    fn image_filename(&self, image: Handle) -> RuntimeResult<String> {
        self.str_export(mono::IMAGE_GET_FILENAME, image)
    }

    fn image_classes(&self, image: Handle) -> RuntimeResult<Vec<Handle>> {
        unsafe {
            let table: *mut c_void = self
                .bridge
                .call(mono::IMAGE_GET_TABLE_INFO, (image.as_void(), TABLE_TYPEDEF))?;
            let table = require_handle(table, mono::IMAGE_GET_TABLE_INFO)?;
            let rows: i32 = self.bridge.call(mono::TABLE_INFO_GET_ROWS, (table.as_void(),))?;

            let rows = (rows.max(0) as usize).min(MAX_ITER_ITEMS);
            let mut classes = Vec::with_capacity(rows);
            for row in 0..rows {
                let class: *mut c_void = self
                    .bridge
                    .call(mono::CLASS_GET, (image.as_void(), typedef_token(row as u32)))?;
                if let Some(class) = Handle::from_ptr(class) {
                    classes.push(class);
                }
            }
            Ok(classes)
        }
    }

    fn class_info(&self, class: Handle) -> RuntimeResult<ClassInfo> {
        let name = self.str_export(mono::CLASS_GET_NAME, class)?;
        let namespace = self.str_export(mono::CLASS_GET_NAMESPACE, class)?;
        let parent: *mut c_void =
            unsafe { self.bridge.call(mono::CLASS_GET_PARENT, (class.as_void(),))? };
        let parent = self.class_name_of(parent)?;
        Ok(ClassInfo {
            name,
            namespace,
            parent,
        })
    }

    fn class_fields(&self, class: Handle) -> RuntimeResult<Vec<Handle>> {
        unsafe { collect_iter(&self.bridge, mono::CLASS_GET_FIELDS, class) }
    }

    fn class_methods(&self, class: Handle) -> RuntimeResult<Vec<Handle>> {
        unsafe { collect_iter(&self.bridge, mono::CLASS_GET_METHODS, class) }
    }

    fn class_interfaces(&self, class: Handle) -> RuntimeResult<Vec<Handle>> {
        unsafe { collect_iter(&self.bridge, mono::CLASS_GET_INTERFACES, class) }
    }

    fn field_info(&self, field: Handle) -> RuntimeResult<FieldInfo> {
        let name = self.str_export(mono::FIELD_GET_NAME, field)?;
        unsafe {
            let ty: *mut c_void = self.bridge.call(mono::FIELD_GET_TYPE, (field.as_void(),))?;
            let ty = self.type_info(ty)?;
            let offset: u32 = self.bridge.call(mono::FIELD_GET_OFFSET, (field.as_void(),))?;
            let flags: u32 = self.bridge.call(mono::FIELD_GET_FLAGS, (field.as_void(),))?;
            Ok(FieldInfo {
                name,
                ty,
                offset: offset as i32,
                flags: Some(flags),
            })
        }
    }

    fn method_info(&self, method: Handle) -> RuntimeResult<MethodInfo> {
        let name = self.str_export(mono::METHOD_GET_NAME, method)?;
        unsafe {
            let mut iflags: u32 = 0;
            let flags: u32 = self
                .bridge
                .call(mono::METHOD_GET_FLAGS, (method.as_void(), &mut iflags as *mut u32))?;

            let signature: *mut c_void =
                self.bridge.call(mono::METHOD_SIGNATURE, (method.as_void(),))?;
            let signature = require_handle(signature, mono::METHOD_SIGNATURE)?;

            let ret: *mut c_void = self
                .bridge
                .call(mono::SIGNATURE_GET_RETURN_TYPE, (signature.as_void(),))?;
            let return_type = self.type_info(ret)?;

            let count: u32 = self
                .bridge
                .call(mono::SIGNATURE_GET_PARAM_COUNT, (signature.as_void(),))?;
            let count = (count as usize).min(MAX_ITER_ITEMS);

            let mut names: Vec<*const c_char> = vec![std::ptr::null(); count];
            if count > 0 {
                let _: () = self
                    .bridge
                    .call(mono::METHOD_GET_PARAM_NAMES, (method.as_void(), names.as_mut_ptr()))?;
            }

            let types = collect_iter(&self.bridge, mono::SIGNATURE_GET_PARAMS, signature)?;
            let mut params = Vec::with_capacity(count);
            for (index, ty) in types.into_iter().take(count).enumerate() {
                let name = owned_c_str(names[index]).unwrap_or_else(|| format!("arg{index}"));
                params.push(ParamInfo {
                    name,
                    ty: self.type_info(ty.as_void())?,
                });
            }

            Ok(MethodInfo {
                name,
                return_type,
                params,
                flags,
                native: None,
            })
        }
    }

    fn compile_method(&self, method: Handle) -> RuntimeResult<usize> {
        let ptr: *mut c_void =
            unsafe { self.bridge.call(mono::COMPILE_METHOD, (method.as_void(),))? };
        if ptr.is_null() {
            Err(RuntimeError::NotCompiled(method.to_string()))
        } else {
            Ok(ptr as usize)
        }
    }

    unsafe fn runtime_invoke(
        &self,
        method: Handle,
        instance: *mut c_void,
        args: *mut *mut c_void,
    ) -> RuntimeResult<*mut c_void> {
        let mut exception: *mut c_void = std::ptr::null_mut();
        let result: *mut c_void = self.bridge.call(
            mono::RUNTIME_INVOKE,
            (method.as_void(), instance, args, &mut exception as *mut *mut c_void),
        )?;

        if let Some(exception) = Handle::from_ptr(exception) {
            let name = self
                .object_class_name(exception)
                .unwrap_or_else(|_| "<unknown exception>".to_string());
            let method = self.str_export(mono::METHOD_GET_NAME, method)?;
            return Err(RuntimeError::ManagedException {
                method,
                exception: name,
            });
        }

        Ok(result)
    }

    unsafe fn object_unbox(&self, object: *mut c_void) -> RuntimeResult<*mut c_void> {
        Ok(self.bridge.call(mono::OBJECT_UNBOX, (object,))?)
    }

    fn class_vtable(&self, class: Handle) -> RuntimeResult<Option<Handle>> {
        let domain = self.domain()?;
        let raw: *mut c_void = unsafe {
            self.bridge
                .call(mono::CLASS_VTABLE, (domain.as_void(), class.as_void()))?
        };
        require_handle(raw, mono::CLASS_VTABLE).map(Some)
    }

    unsafe fn static_get(
        &self,
        field: Handle,
        vtable: Option<Handle>,
        out: *mut c_void,
    ) -> RuntimeResult<()> {
        let vtable = vtable.ok_or(RuntimeError::NullResult {
            export: mono::CLASS_VTABLE,
        })?;
        let _: () = self.bridge.call(
            mono::FIELD_STATIC_GET_VALUE,
            (vtable.as_void(), field.as_void(), out),
        )?;
        Ok(())
    }

    unsafe fn static_set(
        &self,
        field: Handle,
        vtable: Option<Handle>,
        value: *mut c_void,
    ) -> RuntimeResult<()> {
        let vtable = vtable.ok_or(RuntimeError::NullResult {
            export: mono::CLASS_VTABLE,
        })?;
        let _: () = self.bridge.call(
            mono::FIELD_STATIC_SET_VALUE,
            (vtable.as_void(), field.as_void(), value),
        )?;
        Ok(())
    }

    fn class_type_object(&self, class: Handle) -> RuntimeResult<Handle> {
        let domain = self.domain()?;
        unsafe {
            let ty: *mut c_void = self.bridge.call(mono::CLASS_GET_TYPE, (class.as_void(),))?;
            let ty = require_handle(ty, mono::CLASS_GET_TYPE)?;
            let object: *mut c_void = self
                .bridge
                .call(mono::TYPE_GET_OBJECT, (domain.as_void(), ty.as_void()))?;
            require_handle(object, mono::TYPE_GET_OBJECT)
        }
    }

    fn object_new(&self, class: Handle) -> RuntimeResult<Handle> {
        let domain = self.domain()?;
        let raw: *mut c_void = unsafe {
            self.bridge
                .call(mono::OBJECT_NEW, (domain.as_void(), class.as_void()))?
        };
        require_handle(raw, mono::OBJECT_NEW)
    }

    fn string_new(&self, text: &str) -> RuntimeResult<Handle> {
        let domain = self.domain()?;
        let text = CString::new(text).map_err(|e| RuntimeError::Internal(e.to_string()))?;
        let raw: *mut c_void = unsafe {
            self.bridge
                .call(mono::STRING_NEW, (domain.as_void(), text.as_ptr()))?
        };
        require_handle(raw, mono::STRING_NEW)
    }

    fn object_class_name(&self, object: Handle) -> RuntimeResult<String> {
        let class: *mut c_void =
            unsafe { self.bridge.call(mono::OBJECT_GET_CLASS, (object.as_void(),))? };
        self.class_name_of(class)?
            .ok_or(RuntimeError::NullResult {
                export: mono::OBJECT_GET_CLASS,
            })
    }
}
