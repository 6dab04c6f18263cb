//! C-compatible exports called by the host

use std::ffi::{c_char, c_void, CStr};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;

use tracing::instrument;
use uniresolve_core::{frame, global, CoreConfig};
use uniresolve_sdk::RuntimeKind;

use super::error::write_c_string;
use super::{clear_last_error, last_error, set_last_error};
use crate::attach;
use crate::PluginError;

/// Run an entry point, converting errors and panics into `false`
fn guarded(name: &'static str, f: impl FnOnce() -> Result<(), PluginError>) -> bool {
    let result = catch_unwind(AssertUnwindSafe(f)).unwrap_or(Err(PluginError::Panic(name)));
    match result {
        Ok(()) => {
            clear_last_error();
            true
        }
        Err(e) => {
            tracing::error!("{} failed: {}", name, e);
            set_last_error(e.to_string());
            false
        }
    }
}

/// Walk an already-loaded runtime module and publish it
///
/// `kind` is 0 for Mono, 1 for IL2Cpp. Blocks until the walk completes.
///
/// # Safety
/// - `module` must be a live module handle (`HMODULE` / `dlopen` handle) for
///   the lifetime of the process
#[no_mangle]
#[instrument(skip_all)]
pub unsafe extern "C" fn uniresolve_init(module: *mut c_void, kind: u32) -> bool {
    guarded("uniresolve_init", || {
        if module.is_null() {
            return Err(PluginError::InvalidArgument("module handle is null"));
        }
        let kind = RuntimeKind::from_raw(kind).ok_or(PluginError::UnknownKind(kind))?;
        let config = attach::bootstrap();
        attach::attach_module(module, kind, &config)?;
        Ok(())
    })
}

/// Locate the runtime on a worker thread and publish it when ready
///
/// Returns once the worker is started; poll [`uniresolve_is_ready`].
#[no_mangle]
#[instrument(skip_all)]
pub extern "C" fn uniresolve_attach() -> bool {
    guarded("uniresolve_attach", attach::spawn_attach)
}

/// Whether a runtime context has been published
#[no_mangle]
pub extern "C" fn uniresolve_is_ready() -> bool {
    global::is_runtime_ready()
}

/// Called from the host's render hook once per presented frame
#[no_mangle]
pub extern "C" fn uniresolve_on_frame() {
    if catch_unwind(frame::on_frame).is_err() {
        tracing::error!("Panic in frame dispatch");
        set_last_error("Panic during uniresolve_on_frame");
    }
}

/// Write the metadata dump
///
/// `dir` may be null to use the configured dump directory.
///
/// # Safety
/// - `dir` must be null or a valid null-terminated UTF-8 string
#[no_mangle]
#[instrument(skip_all)]
pub unsafe extern "C" fn uniresolve_dump(dir: *const c_char) -> bool {
    guarded("uniresolve_dump", || {
        let ctx = global::runtime()?;
        let dir = if dir.is_null() {
            None
        } else {
            Some(
                CStr::from_ptr(dir)
                    .to_str()
                    .map_err(|_| PluginError::InvalidArgument("dump directory is not UTF-8"))?,
            )
        };
        let written = match dir {
            Some(dir) => attach::dump_runtime(ctx, Some(Path::new(dir)), &CoreConfig::default())?,
            None => attach::dump_runtime(ctx, None, &attach::bootstrap())?,
        };
        tracing::info!("Dump written to {}", written.display());
        Ok(())
    })
}

/// Called when the host unloads the library
#[no_mangle]
#[instrument(skip_all)]
pub extern "C" fn uniresolve_shutdown() {
    if catch_unwind(crate::shutdown).is_err() {
        set_last_error("Panic during shutdown");
    }
}

/// Copy the most recent error message into `buf`
///
/// Returns the full message length (0 when there is none); the copy is
/// truncated to `len - 1` bytes and NUL-terminated.
///
/// # Safety
/// - `buf` must be null or valid for `len` bytes of writes
#[no_mangle]
pub unsafe extern "C" fn uniresolve_last_error(buf: *mut c_char, len: usize) -> usize {
    match last_error() {
        Some(message) => write_c_string(&message, buf, len),
        None => {
            if !buf.is_null() && len > 0 {
                *buf = 0;
            }
            0
        }
    }
}
