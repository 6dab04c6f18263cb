//! Symbol sources backed by already-loaded runtime modules

use std::ffi::{c_void, CStr};
use std::mem::ManuallyDrop;

use crate::error::BridgeError;

/// Something that can turn an export name into an address
///
/// Each call performs exactly one underlying lookup; memoization lives in
/// [`crate::NativeBridge`].
pub trait SymbolSource: Send + Sync {
    /// Look up `name`, returning `None` when it is not exported
    fn lookup(&self, name: &CStr) -> Option<usize>;

    /// Load address of the module image, when the platform exposes it directly
    fn base_address(&self) -> Option<usize> {
        None
    }

    /// Human-readable module description for logs
    fn describe(&self) -> &str;
}

#[cfg(unix)]
type OsLibrary = libloading::os::unix::Library;
#[cfg(windows)]
type OsLibrary = libloading::os::windows::Library;

/// An already-loaded runtime library
///
/// The runtime image is never unloaded while the process lives, so the
/// library handle is intentionally leaked and never closed.
pub struct NativeModule {
    name: String,
    library: ManuallyDrop<OsLibrary>,
    base: Option<usize>,
}

// SAFETY: library handles are process-global and symbol lookup is thread-safe
// on every supported platform.
unsafe impl Send for NativeModule {}
unsafe impl Sync for NativeModule {}

impl NativeModule {
    /// Open a module only if it is already mapped into the process
    ///
    /// Never loads anything new: probing for a runtime must not pull a
    /// second copy of it into the process.
    pub fn open_loaded(name: &str) -> Result<Self, BridgeError> {
        let open_err = |e: libloading::Error| BridgeError::ModuleOpen {
            module: name.to_string(),
            reason: e.to_string(),
        };

        #[cfg(unix)]
        let (library, base) = {
            let lib = unsafe { OsLibrary::open(Some(name), libc::RTLD_NOW | libc::RTLD_NOLOAD) }
                .map_err(open_err)?;
            (lib, None)
        };

        #[cfg(windows)]
        let (library, base) = {
            let lib = OsLibrary::open_already_loaded(name).map_err(open_err)?;
            let raw = lib.into_raw();
            let base = raw as usize;
            (unsafe { OsLibrary::from_raw(raw) }, Some(base))
        };

        Ok(Self {
            name: name.to_string(),
            library: ManuallyDrop::new(library),
            base,
        })
    }

    /// Wrap a module handle supplied by the host (`HMODULE` / `dlopen` handle)
    ///
    /// # Safety
    /// `handle` must be a live module handle for the lifetime of the process.
    pub unsafe fn from_raw(handle: *mut c_void, name: &str) -> Result<Self, BridgeError> {
        if handle.is_null() {
            return Err(BridgeError::NullModule);
        }

        #[cfg(unix)]
        let base = None;
        #[cfg(windows)]
        let base = Some(handle as usize);

        Ok(Self {
            name: name.to_string(),
            library: ManuallyDrop::new(OsLibrary::from_raw(handle as _)),
            base,
        })
    }

    /// Handle for the main program (global symbol scope on unix)
    #[cfg(unix)]
    pub fn this_process() -> Self {
        Self {
            name: "<process>".to_string(),
            library: ManuallyDrop::new(OsLibrary::this()),
            base: None,
        }
    }

    /// Module name as it was located
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SymbolSource for NativeModule {
    fn lookup(&self, name: &CStr) -> Option<usize> {
        let symbol = unsafe {
            self.library
                .get::<unsafe extern "C" fn()>(name.to_bytes_with_nul())
                .ok()?
        };
        Some(*symbol as usize)
    }

    fn base_address(&self) -> Option<usize> {
        self.base
    }

    fn describe(&self) -> &str {
        &self.name
    }
}

/// Base address of the image containing `addr`
#[cfg(unix)]
pub(crate) fn image_base_of(addr: usize) -> Option<usize> {
    let mut info = std::mem::MaybeUninit::<libc::Dl_info>::zeroed();
    let found = unsafe { libc::dladdr(addr as *const c_void, info.as_mut_ptr()) };
    if found == 0 {
        return None;
    }
    let base = unsafe { info.assume_init() }.dli_fbase as usize;
    (base != 0).then_some(base)
}

#[cfg(not(unix))]
pub(crate) fn image_base_of(_addr: usize) -> Option<usize> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_module_fails() {
        let result = NativeModule::open_loaded("definitely-not-a-runtime-module-1234");
        assert!(matches!(result, Err(BridgeError::ModuleOpen { .. })));
    }

    #[test]
    fn test_from_raw_rejects_null() {
        let result = unsafe { NativeModule::from_raw(std::ptr::null_mut(), "null") };
        assert!(matches!(result, Err(BridgeError::NullModule)));
    }

    #[cfg(unix)]
    #[test]
    fn test_process_scope_lookup() {
        let module = NativeModule::this_process();
        assert!(module.lookup(c"strlen").is_some());
        assert!(module.lookup(c"uniresolve_missing_export_xyz").is_none());
    }
}
