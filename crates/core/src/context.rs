//! Runtime context
//!
//! A [`RuntimeContext`] bundles the runtime strategy with the metadata graph
//! discovered from it. It only exists after a completed walk, so readers
//! never observe a partially built registry.

use std::cell::RefCell;
use std::ffi::c_void;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, info, instrument};
use uniresolve_engine::{NativeBridge, NativeModule, RetryPolicy};
use uniresolve_sdk::{Handle, RuntimeKind};

use crate::error::{RuntimeError, RuntimeResult};
use crate::model::{ClassId, Registry};
use crate::ops::{ops_for, RuntimeOps};
use crate::view::AssemblyRef;
use crate::walker::{self, WalkReport};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    /// Contexts the current thread is attached to
    static ATTACHED: RefCell<Vec<u64>> = const { RefCell::new(Vec::new()) };
}

/// Options for [`RuntimeContext::init`]
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// How long to wait for the IL2Cpp VM to come up
    pub vm_wait: RetryPolicy,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            vm_wait: RetryPolicy::new(500, Duration::from_millis(10)),
        }
    }
}

/// A discovered runtime: strategy plus immutable metadata graph
pub struct RuntimeContext {
    id: u64,
    ops: Box<dyn RuntimeOps>,
    registry: Registry,
    report: WalkReport,
}

impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("id", &self.id)
            .field("kind", &self.ops.kind())
            .field("report", &self.report)
            .finish_non_exhaustive()
    }
}

impl RuntimeContext {
    /// Wait for the runtime, attach, and walk all metadata
    #[instrument(skip_all, fields(kind = %ops.kind()))]
    pub fn init(ops: Box<dyn RuntimeOps>, options: &InitOptions) -> RuntimeResult<Self> {
        ops.wait_ready(&options.vm_wait)?;
        let domain = ops.domain()?;
        debug!("Root domain: {}", domain);

        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        ops.attach_thread()?;
        ATTACHED.with(|attached| attached.borrow_mut().push(id));

        let discovery = walker::discover(ops.as_ref());
        info!(
            "{} runtime ready: {} assemblies, {} classes",
            ops.kind(),
            discovery.registry.assembly_count(),
            discovery.registry.class_count()
        );

        Ok(Self {
            id,
            ops,
            registry: discovery.registry,
            report: discovery.report,
        })
    }

    /// Build the strategy over an already-loaded runtime module and walk it
    pub fn from_module(
        module: NativeModule,
        kind: RuntimeKind,
        options: &InitOptions,
    ) -> RuntimeResult<Self> {
        debug!("Binding {} exports from {}", kind, module.name());
        let bridge = NativeBridge::new(module);
        Self::init(ops_for(kind, bridge), options)
    }

    pub fn kind(&self) -> RuntimeKind {
        self.ops.kind()
    }

    /// Process-unique identifier of this context
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn ops(&self) -> &dyn RuntimeOps {
        self.ops.as_ref()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Counts and skips from the discovery walk
    pub fn report(&self) -> &WalkReport {
        &self.report
    }

    /// Attach the calling thread to the runtime; no-op if already attached
    pub fn attach_thread(&self) -> RuntimeResult<()> {
        let attached = ATTACHED.with(|attached| attached.borrow().contains(&self.id));
        if attached {
            return Ok(());
        }
        self.ops.attach_thread()?;
        ATTACHED.with(|attached| attached.borrow_mut().push(self.id));
        debug!("Attached thread {:?}", std::thread::current().id());
        Ok(())
    }

    /// Detach the calling thread if it was attached
    pub fn detach_thread(&self) -> RuntimeResult<()> {
        let was_attached = ATTACHED.with(|attached| {
            let mut attached = attached.borrow_mut();
            let before = attached.len();
            attached.retain(|&id| id != self.id);
            attached.len() != before
        });
        if was_attached {
            self.ops.detach_thread()?;
        }
        Ok(())
    }

    /// Look up an assembly by name (e.g. `"Assembly-CSharp.dll"`)
    pub fn assembly(&self, name: &str) -> Option<AssemblyRef<'_>> {
        self.registry
            .find_assembly(name)
            .map(|id| AssemblyRef::new(self, id))
    }

    /// Like [`Self::assembly`], but with an error for `?` chains
    pub fn require_assembly(&self, name: &str) -> RuntimeResult<AssemblyRef<'_>> {
        self.assembly(name)
            .ok_or_else(|| RuntimeError::AssemblyNotFound(name.to_string()))
    }

    /// All assemblies in discovery order
    pub fn assemblies(&self) -> impl Iterator<Item = AssemblyRef<'_>> {
        self.registry
            .assemblies()
            .map(move |(id, _)| AssemblyRef::new(self, id))
    }

    /// Reflection `System.Type` object for a class, memoized
    pub fn class_type_object(&self, class: ClassId) -> RuntimeResult<Handle> {
        let class = self.registry.class(class);
        if let Some(object) = class.cached_type_object() {
            return Ok(object);
        }
        self.attach_thread()?;
        let object = self.ops.class_type_object(class.handle)?;
        Ok(*class.type_object.get_or_init(|| object))
    }

    /// Allocate an instance of a class; the constructor is not run
    pub fn new_object(&self, class: ClassId) -> RuntimeResult<Handle> {
        self.attach_thread()?;
        self.ops.object_new(self.registry.class(class).handle)
    }

    /// Allocate a managed string
    pub fn new_string(&self, text: &str) -> RuntimeResult<Handle> {
        self.attach_thread()?;
        self.ops.string_new(text)
    }

    /// Class name of a live object
    pub fn object_class_name(&self, object: *mut c_void) -> RuntimeResult<String> {
        let object = Handle::from_ptr(object).ok_or(crate::error::AccessError::NullPointer)?;
        self.attach_thread()?;
        self.ops.object_class_name(object)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FixtureOps};

    #[test]
    fn test_attach_is_idempotent_per_thread() {
        let (ops, counters) = FixtureOps::game().with_counters();
        let ctx = testing::context(ops);
        // init attaches once
        assert_eq!(counters.attaches(), 1);

        ctx.attach_thread().unwrap();
        ctx.attach_thread().unwrap();
        assert_eq!(counters.attaches(), 1);

        std::thread::scope(|s| {
            s.spawn(|| {
                ctx.attach_thread().unwrap();
                ctx.attach_thread().unwrap();
            });
        });
        assert_eq!(counters.attaches(), 2);

        ctx.detach_thread().unwrap();
        ctx.detach_thread().unwrap();
        assert_eq!(counters.detaches(), 1);
        ctx.attach_thread().unwrap();
        assert_eq!(counters.attaches(), 3);
    }

    #[test]
    fn test_assembly_lookup() {
        let ctx = testing::context(FixtureOps::game());
        assert!(ctx.assembly("Game.dll").is_some());
        assert!(ctx.assembly("Missing.dll").is_none());
        assert!(matches!(
            ctx.require_assembly("Missing.dll"),
            Err(RuntimeError::AssemblyNotFound(_))
        ));
        let names: Vec<_> = ctx.assemblies().map(|a| a.name().to_string()).collect();
        assert_eq!(names, ["mscorlib.dll", "Game.dll"]);
    }

    #[test]
    fn test_type_object_is_memoized() {
        let (ops, counters) = FixtureOps::game().with_counters();
        let ctx = testing::context(ops);
        let player = ctx
            .require_assembly("Game.dll")
            .and_then(|a| a.require_class("Player"))
            .unwrap();
        let first = ctx.class_type_object(player.id()).unwrap();
        let second = ctx.class_type_object(player.id()).unwrap();
        assert_eq!(first, second);
        assert_eq!(counters.type_objects(), 1);
    }

    #[test]
    fn test_object_helpers() {
        let ctx = testing::context(FixtureOps::game());
        let player = ctx.registry().find_class_anywhere("Game", "Player").unwrap();
        let object = ctx.new_object(player).unwrap();
        assert_eq!(ctx.object_class_name(object.as_void()).unwrap(), "Player");
        let text = ctx.new_string("hello").unwrap();
        assert_eq!(ctx.object_class_name(text.as_void()).unwrap(), "String");
        assert!(ctx.object_class_name(std::ptr::null_mut()).is_err());
    }

    #[test]
    fn test_class_name_lookup_attaches_caller() {
        let (ops, counters) = FixtureOps::game().with_counters();
        let ctx = testing::context(ops);
        let player = ctx.registry().find_class_anywhere("Game", "Player").unwrap();
        let object = ctx.new_object(player).unwrap();
        assert_eq!(counters.attaches(), 1);

        std::thread::scope(|s| {
            s.spawn(|| {
                assert_eq!(ctx.object_class_name(object.as_void()).unwrap(), "Player");
            });
        });
        assert_eq!(counters.attaches(), 2);
    }

    #[test]
    fn test_vm_wait_failure_aborts_init() {
        let ops = FixtureOps::game().never_ready();
        let options = InitOptions {
            vm_wait: RetryPolicy::new(3, Duration::ZERO),
        };
        let err = RuntimeContext::init(Box::new(ops), &options).unwrap_err();
        assert!(matches!(err, RuntimeError::RuntimeNotReady { attempts: 3 }));
    }
}
