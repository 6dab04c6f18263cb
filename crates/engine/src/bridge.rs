//! Memoized export resolution and typed dispatch
//!
//! ```text
//! ┌──────────────┐  resolve("mono_class_get_name")  ┌─────────────────┐
//! │ NativeBridge │ ────────────────────────────────► │ DashMap cache   │
//! └──────┬───────┘                                   └────────┬────────┘
//!        │ miss: one lookup                                    │ hit
//!        ▼                                                     ▼
//! ┌──────────────┐                                   cached address
//! │ SymbolSource │  dlsym / GetProcAddress
//! └──────────────┘
//! ```

use std::ffi::CString;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;

use crate::call::NativeArgs;
use crate::error::BridgeError;
use crate::symbols::{image_base_of, SymbolSource};

/// Process-lifetime symbol cache in front of a [`SymbolSource`]
///
/// Only successful lookups are cached. Two threads racing on the first
/// resolution of the same name may both hit the OS; both write the same
/// address, so the race is benign.
pub struct NativeBridge {
    source: Box<dyn SymbolSource>,
    cache: DashMap<Box<str>, usize>,
    lookups: AtomicUsize,
}

impl NativeBridge {
    /// Create a bridge over a symbol source
    pub fn new(source: impl SymbolSource + 'static) -> Self {
        Self {
            source: Box::new(source),
            cache: DashMap::new(),
            lookups: AtomicUsize::new(0),
        }
    }

    /// Resolve an export to its address
    pub fn resolve(&self, name: &str) -> Result<usize, BridgeError> {
        if let Some(addr) = self.cache.get(name) {
            tracing::trace!("Symbol cache hit: {} -> {:#x}", name, *addr);
            return Ok(*addr);
        }

        let c_name =
            CString::new(name).map_err(|_| BridgeError::InvalidSymbolName(name.to_string()))?;

        self.lookups.fetch_add(1, Ordering::Relaxed);
        let addr = self
            .source
            .lookup(&c_name)
            .filter(|&addr| addr != 0)
            .ok_or_else(|| BridgeError::SymbolNotFound(name.to_string()))?;

        tracing::debug!("Resolved {}!{} -> {:#x}", self.source.describe(), name, addr);
        self.cache.insert(name.into(), addr);
        Ok(addr)
    }

    /// Resolve an export, returning `None` when it is missing
    pub fn try_resolve(&self, name: &str) -> Option<usize> {
        self.resolve(name).ok()
    }

    /// Check whether the module exports `name`
    pub fn has(&self, name: &str) -> bool {
        self.try_resolve(name).is_some()
    }

    /// Resolve `name` and call it as `extern "C" fn(args...) -> R`
    ///
    /// # Safety
    /// The export must have exactly the signature described by `A` and `R`,
    /// and the arguments must satisfy its preconditions.
    pub unsafe fn call<R, A: NativeArgs>(&self, name: &str, args: A) -> Result<R, BridgeError> {
        let addr = self.resolve(name)?;
        Ok(args.call_at::<R>(addr))
    }

    /// Call an export that some runtime builds legitimately omit
    ///
    /// # Safety
    /// Same as [`NativeBridge::call`].
    pub unsafe fn optional_call<R, A: NativeArgs>(&self, name: &str, args: A) -> Option<R> {
        let addr = self.try_resolve(name)?;
        Some(args.call_at::<R>(addr))
    }

    /// Base address of the runtime image, used to print RVAs
    pub fn module_base(&self) -> Option<usize> {
        self.source.base_address().or_else(|| {
            let any = self.cache.iter().next().map(|entry| *entry.value())?;
            image_base_of(any)
        })
    }

    /// Resolve a batch of exports up front, returning how many were found
    pub fn prefetch(&self, names: &[&str]) -> usize {
        let found = names.iter().filter(|name| self.has(name)).count();
        tracing::debug!("Prefetched {}/{} symbols", found, names.len());
        found
    }

    /// Module description from the underlying source
    pub fn describe(&self) -> &str {
        self.source.describe()
    }

    /// Number of cached symbols
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }

    /// Number of underlying lookups performed so far
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Clear the symbol cache (e.g. after the runtime module was replaced)
    pub fn clear_cache(&self) {
        self.cache.clear();
        tracing::debug!("Symbol cache cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::ffi::CStr;
    use std::sync::Arc;

    extern "C" fn triple(v: i32) -> i32 {
        v * 3
    }

    /// Fixed export table that counts lookups
    struct TableSource {
        exports: HashMap<&'static str, usize>,
        hits: Arc<AtomicUsize>,
    }

    impl SymbolSource for TableSource {
        fn lookup(&self, name: &CStr) -> Option<usize> {
            self.hits.fetch_add(1, Ordering::SeqCst);
            self.exports.get(name.to_str().ok()?).copied()
        }

        fn base_address(&self) -> Option<usize> {
            Some(0x1000_0000)
        }

        fn describe(&self) -> &str {
            "table"
        }
    }

    fn bridge() -> (NativeBridge, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let mut exports = HashMap::new();
        exports.insert("triple", triple as usize);
        exports.insert("zero", 0);
        let source = TableSource {
            exports,
            hits: hits.clone(),
        };
        (NativeBridge::new(source), hits)
    }

    #[test]
    fn test_resolution_is_memoized() {
        let (bridge, hits) = bridge();
        let first = bridge.resolve("triple").unwrap();
        let second = bridge.resolve("triple").unwrap();
        assert_eq!(first, second);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(bridge.lookup_count(), 1);
        assert_eq!(bridge.cache_size(), 1);
    }

    #[test]
    fn test_missing_symbol_is_an_error_and_not_cached() {
        let (bridge, hits) = bridge();
        assert_eq!(
            bridge.resolve("absent"),
            Err(BridgeError::SymbolNotFound("absent".into()))
        );
        assert!(bridge.resolve("absent").is_err());
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(bridge.cache_size(), 0);
    }

    #[test]
    fn test_zero_address_is_not_found() {
        let (bridge, _) = bridge();
        assert!(matches!(
            bridge.resolve("zero"),
            Err(BridgeError::SymbolNotFound(_))
        ));
    }

    #[test]
    fn test_invalid_name() {
        let (bridge, hits) = bridge();
        assert!(matches!(
            bridge.resolve("bad\0name"),
            Err(BridgeError::InvalidSymbolName(_))
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_typed_call() {
        let (bridge, _) = bridge();
        let out: i32 = unsafe { bridge.call("triple", (14i32,)) }.unwrap();
        assert_eq!(out, 42);
        let missing: Option<i32> = unsafe { bridge.optional_call("absent", (1i32,)) };
        assert!(missing.is_none());
    }

    #[test]
    fn test_clear_cache_forces_lookup() {
        let (bridge, hits) = bridge();
        bridge.resolve("triple").unwrap();
        bridge.clear_cache();
        bridge.resolve("triple").unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(bridge.module_base(), Some(0x1000_0000));
        assert_eq!(bridge.prefetch(&["triple", "absent"]), 1);
    }
}
