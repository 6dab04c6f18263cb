//! Runtime attach and publication
//!
//! Two ways in: the host hands over the runtime module directly
//! ([`attach_module`]), or a worker thread locates it by name with bounded
//! retry ([`spawn_attach`]). Either way the walk completes before the context
//! is published, and the optional on-init dump runs right after.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{error, info, instrument, warn};
use uniresolve_core::{dump, global, CoreConfig, RuntimeContext};
use uniresolve_engine::{locate_runtime, NativeModule};
use uniresolve_sdk::RuntimeKind;

use crate::ffi::set_last_error;
use crate::logging::init_logging;
use crate::PluginError;

/// Set while a worker is running or after it published a context
static ATTACH_STARTED: AtomicBool = AtomicBool::new(false);

/// Load the core config and install logging
///
/// An unreadable config falls back to defaults so a broken file never blocks
/// attaching.
pub fn bootstrap() -> CoreConfig {
    let loaded = CoreConfig::load();
    init_logging(loaded.as_ref().map(|c| c.debug).unwrap_or(false));
    loaded.unwrap_or_else(|e| {
        warn!("Using default config: {}", e);
        CoreConfig::default()
    })
}

/// Walk a host-supplied module and publish the context
///
/// # Safety
/// `handle` must be a live module handle for the lifetime of the process.
#[instrument(skip_all, fields(kind = %kind))]
pub unsafe fn attach_module(
    handle: *mut std::ffi::c_void,
    kind: RuntimeKind,
    config: &CoreConfig,
) -> Result<&'static RuntimeContext, PluginError> {
    let module = NativeModule::from_raw(handle, kind.name())?;
    let ctx = RuntimeContext::from_module(module, kind, &config.init_options())?;
    publish(ctx, config)
}

/// Locate the runtime by name, walk it and publish the context
#[instrument(skip_all)]
pub fn attach_located(config: &CoreConfig) -> Result<&'static RuntimeContext, PluginError> {
    let located = locate_runtime(
        &config.runtime.mono_modules,
        &config.runtime.il2cpp_modules,
        &config.attach_policy(),
    )?;
    let ctx = RuntimeContext::from_module(located.module, located.kind, &config.init_options())?;
    publish(ctx, config)
}

/// Publish `ctx` process-wide, then run the on-init dump if configured
pub fn publish(
    ctx: RuntimeContext,
    config: &CoreConfig,
) -> Result<&'static RuntimeContext, PluginError> {
    let ctx = global::init_runtime(ctx)?;
    let report = ctx.report();
    info!(
        "Runtime ready: {} assemblies, {} classes ({} skipped)",
        report.assemblies,
        report.classes,
        report.skipped()
    );

    if config.dump.on_init {
        // A failed dump leaves the runtime usable
        if let Err(e) = dump_runtime(ctx, None, config) {
            warn!("On-init dump failed: {}", e);
        }
    }
    Ok(ctx)
}

/// Dump `ctx` into `dir`, or the configured dump directory
pub fn dump_runtime(
    ctx: &RuntimeContext,
    dir: Option<&Path>,
    config: &CoreConfig,
) -> Result<PathBuf, PluginError> {
    let dir = match dir {
        Some(dir) => dir.to_path_buf(),
        None => config.dump_dir()?,
    };
    dump::dump_to_dir(ctx, &dir)?;
    Ok(dir)
}

/// Start the attach worker
///
/// Fails if a worker is already running or the runtime is already published.
pub fn spawn_attach() -> Result<(), PluginError> {
    if global::is_runtime_ready() {
        return Err(PluginError::AlreadyAttached);
    }
    if ATTACH_STARTED.swap(true, Ordering::SeqCst) {
        return Err(PluginError::AttachInProgress);
    }

    let spawned = std::thread::Builder::new()
        .name("uniresolve-attach".into())
        .spawn(|| {
            let config = bootstrap();
            let result = std::panic::catch_unwind(|| attach_located(&config))
                .unwrap_or(Err(PluginError::Panic("attach")));
            if let Err(e) = result {
                error!("Attach failed: {}", e);
                set_last_error(e.to_string());
                ATTACH_STARTED.store(false, Ordering::SeqCst);
            }
        });

    if let Err(e) = spawned {
        ATTACH_STARTED.store(false, Ordering::SeqCst);
        return Err(PluginError::Spawn(e));
    }
    Ok(())
}
