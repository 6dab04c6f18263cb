//! Exported C symbol names for both runtimes
//!
//! These strings must match exactly what the runtime module exports.
//! Names are plain `&str`; the symbol bridge converts them to C strings on
//! first resolution.

/// Default module names probed for a Mono runtime
#[cfg(windows)]
pub const MONO_MODULES: &[&str] = &["mono-2.0-bdwgc.dll", "mono-2.0-sgen.dll", "mono.dll"];
#[cfg(target_os = "macos")]
pub const MONO_MODULES: &[&str] = &["libmonobdwgc-2.0.dylib", "libmono.dylib"];
#[cfg(all(unix, not(target_os = "macos")))]
pub const MONO_MODULES: &[&str] = &["libmonobdwgc-2.0.so", "libmono-2.0.so", "libmono.so"];

/// Default module names probed for an IL2Cpp runtime
#[cfg(windows)]
pub const IL2CPP_MODULES: &[&str] = &["GameAssembly.dll"];
#[cfg(target_os = "macos")]
pub const IL2CPP_MODULES: &[&str] = &["GameAssembly.dylib"];
#[cfg(all(unix, not(target_os = "macos")))]
pub const IL2CPP_MODULES: &[&str] = &["GameAssembly.so", "libil2cpp.so"];

/// `mono_*` exports
pub mod mono {
    // Domain and threads
    pub const GET_ROOT_DOMAIN: &str = "mono_get_root_domain";
    pub const THREAD_ATTACH: &str = "mono_thread_attach";
    pub const JIT_THREAD_ATTACH: &str = "mono_jit_thread_attach";
    pub const THREAD_CURRENT: &str = "mono_thread_current";
    pub const THREAD_DETACH: &str = "mono_thread_detach";

    // Assemblies and images
    pub const ASSEMBLY_FOREACH: &str = "mono_assembly_foreach";
    pub const ASSEMBLY_GET_IMAGE: &str = "mono_assembly_get_image";
    pub const IMAGE_GET_NAME: &str = "mono_image_get_name";
    pub const IMAGE_GET_FILENAME: &str = "mono_image_get_filename";
    pub const IMAGE_GET_TABLE_INFO: &str = "mono_image_get_table_info";
    pub const TABLE_INFO_GET_ROWS: &str = "mono_table_info_get_rows";

    // Classes
    pub const CLASS_GET: &str = "mono_class_get";
    pub const CLASS_GET_NAME: &str = "mono_class_get_name";
    pub const CLASS_GET_NAMESPACE: &str = "mono_class_get_namespace";
    pub const CLASS_GET_PARENT: &str = "mono_class_get_parent";
    pub const CLASS_GET_FIELDS: &str = "mono_class_get_fields";
    pub const CLASS_GET_METHODS: &str = "mono_class_get_methods";
    pub const CLASS_GET_INTERFACES: &str = "mono_class_get_interfaces";
    pub const CLASS_VTABLE: &str = "mono_class_vtable";
    pub const CLASS_GET_TYPE: &str = "mono_class_get_type";

    // Fields
    pub const FIELD_GET_NAME: &str = "mono_field_get_name";
    pub const FIELD_GET_TYPE: &str = "mono_field_get_type";
    pub const FIELD_GET_OFFSET: &str = "mono_field_get_offset";
    pub const FIELD_GET_FLAGS: &str = "mono_field_get_flags";
    pub const FIELD_STATIC_GET_VALUE: &str = "mono_field_static_get_value";
    pub const FIELD_STATIC_SET_VALUE: &str = "mono_field_static_set_value";

    // Methods and signatures
    pub const METHOD_GET_NAME: &str = "mono_method_get_name";
    pub const METHOD_GET_FLAGS: &str = "mono_method_get_flags";
    pub const METHOD_SIGNATURE: &str = "mono_method_signature";
    pub const METHOD_GET_PARAM_NAMES: &str = "mono_method_get_param_names";
    pub const SIGNATURE_GET_RETURN_TYPE: &str = "mono_signature_get_return_type";
    pub const SIGNATURE_GET_PARAMS: &str = "mono_signature_get_params";
    pub const SIGNATURE_GET_PARAM_COUNT: &str = "mono_signature_get_param_count";
    pub const COMPILE_METHOD: &str = "mono_compile_method";

    // Types
    pub const TYPE_GET_NAME: &str = "mono_type_get_name";
    pub const TYPE_SIZE: &str = "mono_type_size";
    pub const TYPE_GET_OBJECT: &str = "mono_type_get_object";
    pub const FREE: &str = "mono_free";

    // Objects and invocation
    pub const RUNTIME_INVOKE: &str = "mono_runtime_invoke";
    pub const OBJECT_UNBOX: &str = "mono_object_unbox";
    pub const OBJECT_NEW: &str = "mono_object_new";
    pub const OBJECT_GET_CLASS: &str = "mono_object_get_class";
    pub const STRING_NEW: &str = "mono_string_new";
}

/// `il2cpp_*` exports
pub mod il2cpp {
    // Domain and threads
    pub const DOMAIN_GET: &str = "il2cpp_domain_get";
    pub const IS_VM_THREAD: &str = "il2cpp_is_vm_thread";
    pub const THREAD_ATTACH: &str = "il2cpp_thread_attach";
    pub const THREAD_CURRENT: &str = "il2cpp_thread_current";
    pub const THREAD_DETACH: &str = "il2cpp_thread_detach";

    // Assemblies and images
    pub const DOMAIN_GET_ASSEMBLIES: &str = "il2cpp_domain_get_assemblies";
    pub const ASSEMBLY_GET_IMAGE: &str = "il2cpp_assembly_get_image";
    pub const IMAGE_GET_NAME: &str = "il2cpp_image_get_name";
    pub const IMAGE_GET_FILENAME: &str = "il2cpp_image_get_filename";
    pub const IMAGE_GET_CLASS_COUNT: &str = "il2cpp_image_get_class_count";
    pub const IMAGE_GET_CLASS: &str = "il2cpp_image_get_class";

    // Classes
    pub const CLASS_GET_NAME: &str = "il2cpp_class_get_name";
    pub const CLASS_GET_NAMESPACE: &str = "il2cpp_class_get_namespace";
    pub const CLASS_GET_PARENT: &str = "il2cpp_class_get_parent";
    pub const CLASS_GET_FIELDS: &str = "il2cpp_class_get_fields";
    pub const CLASS_GET_METHODS: &str = "il2cpp_class_get_methods";
    pub const CLASS_GET_INTERFACES: &str = "il2cpp_class_get_interfaces";
    pub const CLASS_GET_TYPE: &str = "il2cpp_class_get_type";

    // Fields
    pub const FIELD_GET_NAME: &str = "il2cpp_field_get_name";
    pub const FIELD_GET_TYPE: &str = "il2cpp_field_get_type";
    pub const FIELD_GET_OFFSET: &str = "il2cpp_field_get_offset";
    pub const FIELD_STATIC_GET_VALUE: &str = "il2cpp_field_static_get_value";
    pub const FIELD_STATIC_SET_VALUE: &str = "il2cpp_field_static_set_value";

    // Methods
    pub const METHOD_GET_NAME: &str = "il2cpp_method_get_name";
    pub const METHOD_GET_RETURN_TYPE: &str = "il2cpp_method_get_return_type";
    pub const METHOD_GET_FLAGS: &str = "il2cpp_method_get_flags";
    pub const METHOD_GET_PARAM_COUNT: &str = "il2cpp_method_get_param_count";
    pub const METHOD_GET_PARAM_NAME: &str = "il2cpp_method_get_param_name";
    pub const METHOD_GET_PARAM: &str = "il2cpp_method_get_param";

    // Types
    pub const TYPE_GET_NAME: &str = "il2cpp_type_get_name";
    pub const TYPE_GET_OBJECT: &str = "il2cpp_type_get_object";
    pub const FREE: &str = "il2cpp_free";

    // Objects and invocation
    pub const RUNTIME_INVOKE: &str = "il2cpp_runtime_invoke";
    pub const OBJECT_UNBOX: &str = "il2cpp_object_unbox";
    pub const OBJECT_NEW: &str = "il2cpp_object_new";
    pub const OBJECT_GET_CLASS: &str = "il2cpp_object_get_class";
    pub const STRING_NEW: &str = "il2cpp_string_new";
}
