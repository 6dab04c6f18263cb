//! Runtime handle type definitions
//!
//! Every entity the runtime hands out (domains, assemblies, classes, fields,
//! methods, objects) is an opaque pointer. We never look inside them except
//! through the runtime's own exports.

use std::ffi::c_void;
use std::fmt;

/// Opaque type for a runtime domain (`MonoDomain*` / `Il2CppDomain*`)
#[repr(C)]
pub struct RuntimeDomain {
    _opaque: [u8; 0],
}

/// Opaque type for a loaded assembly
#[repr(C)]
pub struct RuntimeAssembly {
    _opaque: [u8; 0],
}

/// Opaque type for an assembly image
#[repr(C)]
pub struct RuntimeImage {
    _opaque: [u8; 0],
}

/// Opaque type for a class (`MonoClass*` / `Il2CppClass*`)
#[repr(C)]
pub struct RuntimeClass {
    _opaque: [u8; 0],
}

/// Opaque type for a field descriptor
#[repr(C)]
pub struct RuntimeField {
    _opaque: [u8; 0],
}

/// Opaque type for a method descriptor
#[repr(C)]
pub struct RuntimeMethod {
    _opaque: [u8; 0],
}

/// Opaque type for a managed object
#[repr(C)]
pub struct RuntimeObject {
    _opaque: [u8; 0],
}

/// Address-sized handle to a runtime entity
///
/// Stored in the metadata graph instead of raw pointers so the graph stays
/// `Send + Sync` without blanket unsafe impls. Never null.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct Handle(usize);

impl Handle {
    /// Wrap a raw pointer, rejecting null
    pub fn from_ptr<T>(ptr: *mut T) -> Option<Self> {
        Self::from_addr(ptr as usize)
    }

    /// Wrap a raw address, rejecting zero
    pub const fn from_addr(addr: usize) -> Option<Self> {
        if addr == 0 {
            None
        } else {
            Some(Self(addr))
        }
    }

    /// Raw address
    pub const fn addr(self) -> usize {
        self.0
    }

    /// Raw pointer, typed as the caller needs
    pub fn as_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    /// Untyped raw pointer
    pub fn as_void(self) -> *mut c_void {
        self.0 as *mut c_void
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#x})", self.0)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Which managed runtime the target process hosts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(C)]
pub enum RuntimeKind {
    /// JIT runtime (`mono_*` exports, explicit method compilation)
    Mono = 0,
    /// AOT runtime (`il2cpp_*` exports, native pointers known up front)
    Il2Cpp = 1,
}

impl RuntimeKind {
    /// Convert from the integer used across the C boundary
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Mono),
            1 => Some(Self::Il2Cpp),
            _ => None,
        }
    }

    /// Short lowercase name for logs and file output
    pub const fn name(self) -> &'static str {
        match self {
            Self::Mono => "mono",
            Self::Il2Cpp => "il2cpp",
        }
    }
}

impl fmt::Display for RuntimeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handle_rejects_null() {
        assert!(Handle::from_ptr(std::ptr::null_mut::<RuntimeClass>()).is_none());
        assert!(Handle::from_addr(0).is_none());
        let h = Handle::from_addr(0x1000).unwrap();
        assert_eq!(h.addr(), 0x1000);
        assert_eq!(format!("{h:?}"), "Handle(0x1000)");
    }

    #[test]
    fn test_runtime_kind_raw() {
        assert_eq!(RuntimeKind::from_raw(0), Some(RuntimeKind::Mono));
        assert_eq!(RuntimeKind::from_raw(1), Some(RuntimeKind::Il2Cpp));
        assert_eq!(RuntimeKind::from_raw(7), None);
        assert_eq!(RuntimeKind::Il2Cpp.to_string(), "il2cpp");
    }
}
