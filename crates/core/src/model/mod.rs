//! Type/field/method model
//!
//! The metadata graph lives in a [`Registry`]: one append-only arena per
//! entity kind, addressed by index handles. Nothing is removed or moved after
//! insertion, so an id handed out once stays valid for the registry's
//! lifetime and the graph can be shared immutably across threads.
//!
//! Per-element data that is only computed on demand (compiled entry points,
//! static v-tables, reflection type objects) is memoized in `OnceLock`s.

mod query;

use std::sync::OnceLock;

use bitflags::bitflags;
use serde::Serialize;
use uniresolve_sdk::metadata::FIELD_ATTRIBUTE_STATIC;
use uniresolve_sdk::{Handle, RuntimeKind};

pub use query::{MethodMatch, Resolution, WILDCARD};

macro_rules! arena_id {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
            #[serde(transparent)]
            pub struct $name(u32);

            impl $name {
                /// Position in the owning arena
                pub const fn index(self) -> usize {
                    self.0 as usize
                }

                pub(crate) const fn from_index(index: usize) -> Self {
                    Self(index as u32)
                }
            }
        )*
    };
}

arena_id!(
    /// Index of an [`Assembly`] in a [`Registry`]
    AssemblyId,
    /// Index of a [`Class`] in a [`Registry`]
    ClassId,
    /// Index of a [`Field`] in a [`Registry`]
    FieldId,
    /// Index of a [`Method`] in a [`Registry`]
    MethodId,
);

bitflags! {
    /// Method attribute flags; unknown bits are kept as reported
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodFlags: u32 {
        const STATIC = 0x0010;
        const FINAL = 0x0020;
        const VIRTUAL = 0x0040;
        const ABSTRACT = 0x0400;
        const _ = !0;
    }
}

/// Type reference: qualified name plus advisory size
///
/// The size is informational only and never used for layout math. IL2Cpp
/// does not expose one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TypeInfo {
    pub name: String,
    pub size: Option<i32>,
}

impl TypeInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size: None,
        }
    }

    pub fn sized(name: impl Into<String>, size: i32) -> Self {
        Self {
            name: name.into(),
            size: Some(size),
        }
    }
}

/// Method parameter
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Param {
    pub name: String,
    pub ty: TypeInfo,
}

/// A loaded assembly
#[derive(Debug)]
pub struct Assembly {
    pub name: String,
    pub file: String,
    pub handle: Handle,
    pub classes: Vec<ClassId>,
}

/// A class with its (interface-flattened) members
#[derive(Debug)]
pub struct Class {
    pub name: String,
    pub namespace: String,
    /// Parent class name; resolved lazily via [`Registry::parent_of`]
    pub parent: Option<String>,
    pub assembly: AssemblyId,
    pub handle: Handle,
    pub fields: Vec<FieldId>,
    pub methods: Vec<MethodId>,
    pub(crate) type_object: OnceLock<Handle>,
}

impl Class {
    /// `Namespace.Name`, or just `Name` in the global namespace
    pub fn full_name(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{}.{}", self.namespace, self.name)
        }
    }

    /// Reflection type object, if it has been requested before
    pub fn cached_type_object(&self) -> Option<Handle> {
        self.type_object.get().copied()
    }
}

/// A field descriptor
#[derive(Debug)]
pub struct Field {
    pub name: String,
    /// Declaring class (for interface members, the class they were merged into)
    pub class: ClassId,
    pub ty: TypeInfo,
    pub offset: i32,
    pub is_static: bool,
    pub handle: Handle,
    pub(crate) vtable: OnceLock<Option<Handle>>,
}

/// A method descriptor
#[derive(Debug)]
pub struct Method {
    pub name: String,
    pub class: ClassId,
    pub return_type: TypeInfo,
    pub params: Vec<Param>,
    pub flags: MethodFlags,
    pub is_static: bool,
    pub handle: Handle,
    pub(crate) native: OnceLock<usize>,
}

impl Method {
    /// Entry point, if known (IL2Cpp at discovery, Mono after compilation)
    pub fn native(&self) -> Option<usize> {
        self.native.get().copied()
    }

    pub fn is_virtual(&self) -> bool {
        self.flags.contains(MethodFlags::VIRTUAL)
    }

    /// `Name(System.Int32, System.String)`
    pub fn signature(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|p| p.ty.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!("{}({})", self.name, params)
    }
}

/// Decide whether a field lives in static storage
///
/// Mono reports metadata flags and bit `0x10` is authoritative regardless of
/// offset (a static field may sit at offset 0). IL2Cpp reports no flags;
/// static and thread-static fields carry offsets `<= 0` there.
pub fn classify_static(kind: RuntimeKind, flags: Option<u32>, offset: i32) -> bool {
    match (kind, flags) {
        (RuntimeKind::Mono, Some(flags)) => flags & FIELD_ATTRIBUTE_STATIC != 0,
        _ => offset <= 0,
    }
}

/// Arena storage for the metadata graph
#[derive(Debug, Default)]
pub struct Registry {
    assemblies: Vec<Assembly>,
    classes: Vec<Class>,
    fields: Vec<Field>,
    methods: Vec<Method>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_assembly(&mut self, name: String, file: String, handle: Handle) -> AssemblyId {
        let id = AssemblyId::from_index(self.assemblies.len());
        self.assemblies.push(Assembly {
            name,
            file,
            handle,
            classes: Vec::new(),
        });
        id
    }

    pub(crate) fn add_class(
        &mut self,
        assembly: AssemblyId,
        name: String,
        namespace: String,
        parent: Option<String>,
        handle: Handle,
    ) -> ClassId {
        let id = ClassId::from_index(self.classes.len());
        self.classes.push(Class {
            name,
            namespace,
            parent,
            assembly,
            handle,
            fields: Vec::new(),
            methods: Vec::new(),
            type_object: OnceLock::new(),
        });
        self.assemblies[assembly.index()].classes.push(id);
        id
    }

    pub(crate) fn add_field(
        &mut self,
        class: ClassId,
        name: String,
        ty: TypeInfo,
        offset: i32,
        is_static: bool,
        handle: Handle,
    ) -> FieldId {
        let id = FieldId::from_index(self.fields.len());
        self.fields.push(Field {
            name,
            class,
            ty,
            offset,
            is_static,
            handle,
            vtable: OnceLock::new(),
        });
        self.classes[class.index()].fields.push(id);
        id
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn add_method(
        &mut self,
        class: ClassId,
        name: String,
        return_type: TypeInfo,
        params: Vec<Param>,
        flags: MethodFlags,
        handle: Handle,
        native: Option<usize>,
    ) -> MethodId {
        let id = MethodId::from_index(self.methods.len());
        let cell = OnceLock::new();
        if let Some(ptr) = native.filter(|&p| p != 0) {
            let _ = cell.set(ptr);
        }
        self.methods.push(Method {
            name,
            class,
            return_type,
            params,
            is_static: flags.contains(MethodFlags::STATIC),
            flags,
            handle,
            native: cell,
        });
        self.classes[class.index()].methods.push(id);
        id
    }

    pub fn assembly(&self, id: AssemblyId) -> &Assembly {
        &self.assemblies[id.index()]
    }

    pub fn class(&self, id: ClassId) -> &Class {
        &self.classes[id.index()]
    }

    pub fn field(&self, id: FieldId) -> &Field {
        &self.fields[id.index()]
    }

    pub fn method(&self, id: MethodId) -> &Method {
        &self.methods[id.index()]
    }

    /// Assemblies in discovery order
    pub fn assemblies(&self) -> impl Iterator<Item = (AssemblyId, &Assembly)> {
        self.assemblies
            .iter()
            .enumerate()
            .map(|(i, a)| (AssemblyId::from_index(i), a))
    }

    /// All classes in discovery order
    pub fn classes(&self) -> impl Iterator<Item = (ClassId, &Class)> {
        self.classes
            .iter()
            .enumerate()
            .map(|(i, c)| (ClassId::from_index(i), c))
    }

    pub fn assembly_count(&self) -> usize {
        self.assemblies.len()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// `Assembly.dll!Namespace.Class`
    pub fn class_path(&self, id: ClassId) -> String {
        let class = self.class(id);
        format!("{}!{}", self.assembly(class.assembly).name, class.full_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(addr: usize) -> Handle {
        Handle::from_addr(addr).unwrap()
    }

    #[test]
    fn test_mono_static_uses_flag_even_at_offset_zero() {
        assert!(classify_static(RuntimeKind::Mono, Some(0x10), 0));
        assert!(classify_static(RuntimeKind::Mono, Some(0x16), 0x40));
        assert!(!classify_static(RuntimeKind::Mono, Some(0x06), 0));
        assert!(!classify_static(RuntimeKind::Mono, Some(0x01), 0x18));
    }

    #[test]
    fn test_il2cpp_static_uses_offset() {
        assert!(classify_static(RuntimeKind::Il2Cpp, None, 0));
        assert!(classify_static(RuntimeKind::Il2Cpp, None, -1));
        assert!(!classify_static(RuntimeKind::Il2Cpp, None, 0x10));
        // flags are ignored for IL2Cpp even if present
        assert!(!classify_static(RuntimeKind::Il2Cpp, Some(0x10), 0x10));
    }

    #[test]
    fn test_ids_are_stable_indices() {
        let mut reg = Registry::new();
        let asm = reg.add_assembly("A.dll".into(), "/a/A.dll".into(), handle(0x10));
        let c0 = reg.add_class(asm, "First".into(), "".into(), None, handle(0x20));
        let c1 = reg.add_class(asm, "Second".into(), "Ns".into(), Some("First".into()), handle(0x30));
        let f = reg.add_field(c1, "x".into(), TypeInfo::new("System.Int32"), 0x10, false, handle(0x40));
        let m = reg.add_method(
            c1,
            "Run".into(),
            TypeInfo::new("System.Void"),
            vec![],
            MethodFlags::STATIC | MethodFlags::from_bits_retain(0x0086),
            handle(0x50),
            Some(0xdead),
        );

        assert_eq!(c0.index(), 0);
        assert_eq!(c1.index(), 1);
        assert_eq!(reg.assembly(asm).classes, vec![c0, c1]);
        assert_eq!(reg.class(c1).fields, vec![f]);
        assert_eq!(reg.class(c1).full_name(), "Ns.Second");
        assert_eq!(reg.class_path(c0), "A.dll!First");
        let method = reg.method(m);
        assert!(method.is_static);
        assert_eq!(method.flags.bits(), 0x0096);
        assert_eq!(method.native(), Some(0xdead));
        assert_eq!(method.signature(), "Run()");
    }

    #[test]
    fn test_zero_native_pointer_is_unknown() {
        let mut reg = Registry::new();
        let asm = reg.add_assembly("A.dll".into(), String::new(), handle(0x10));
        let c = reg.add_class(asm, "C".into(), "".into(), None, handle(0x20));
        let m = reg.add_method(
            c,
            "M".into(),
            TypeInfo::new("System.Void"),
            vec![],
            MethodFlags::empty(),
            handle(0x30),
            Some(0),
        );
        assert_eq!(reg.method(m).native(), None);
    }
}
