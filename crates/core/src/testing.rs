//! In-memory runtime for tests
//!
//! [`FixtureOps`] implements [`RuntimeOps`] over a metadata graph built in
//! code. Handles are synthetic, but everything the core dereferences is real:
//! entry points are `extern "C"` functions, boxed results, allocated objects
//! and strings live in fixture-owned buffers laid out like managed objects.
//!
//! ```ignore
//! let ops = FixtureOps::new(RuntimeKind::Mono)
//!     .assembly("Game")
//!     .class("Game", "Player", Some("Object"))
//!     .field("score", "System.Int32", 0x10)
//!     .method(FixtureMethod::new("Reset", "System.Void"));
//! let ctx = testing::context(ops);
//! ```

use std::collections::HashMap;
use std::ffi::c_void;
use std::mem::{offset_of, size_of};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use uniresolve_engine::RetryPolicy;
use uniresolve_sdk::{Handle, ObjectHeader, RuntimeKind, StringHeader, Vector3, STRING_CHARS_OFFSET};

use crate::context::{InitOptions, RuntimeContext};
use crate::error::{RuntimeError, RuntimeResult};
use crate::managed::ValueKind;
use crate::model::TypeInfo;
use crate::ops::{assembly_display_name, ClassInfo, FieldInfo, MethodInfo, ParamInfo, RuntimeOps};

const DOMAIN: usize = 0xD0_0000;
const ASSEMBLY: usize = 0x10_0000;
const IMAGE: usize = 0x20_0000;
const CLASS: usize = 0x30_0000;
const FIELD: usize = 0x40_0000;
const METHOD: usize = 0x50_0000;
const TYPE_OBJECT: usize = 0x60_0000;
const VTABLE: usize = 0x70_0000;
const SPAN: usize = 0x0F_FFFF;

fn handle(base: usize, index: usize) -> Handle {
    Handle::from_addr(base + index + 1).expect("fixture handles are non-zero")
}

fn decode(h: Handle, base: usize) -> RuntimeResult<usize> {
    let addr = h.addr();
    if addr > base && addr <= base + SPAN {
        Ok(addr - base - 1)
    } else {
        Err(RuntimeError::Internal(format!("fixture: foreign handle {h}")))
    }
}

/// Body of a reflectively invoked fixture method
pub type ManagedFn = fn(instance: *mut c_void, args: &[*mut c_void]) -> Outcome;

/// What a [`ManagedFn`] returns to the runtime
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Value-type result; boxed by the fixture
    Value(Vec<u8>),
    /// Reference-type result
    Object(usize),
    /// Null result (also used for `void`)
    Null,
    /// Managed exception of this class
    Throw(&'static str),
}

impl Outcome {
    pub fn value<T: Copy>(value: T) -> Self {
        // SAFETY: a `T` is readable as `size_of::<T>()` bytes
        let bytes =
            unsafe { std::slice::from_raw_parts(&value as *const T as *const u8, size_of::<T>()) };
        Self::Value(bytes.to_vec())
    }
}

/// Method declaration for [`FixtureOps::method`]
#[derive(Clone)]
pub struct FixtureMethod {
    name: String,
    return_type: String,
    params: Vec<(String, String)>,
    flags: u32,
    native: usize,
    managed: Option<ManagedFn>,
    fail: bool,
}

impl FixtureMethod {
    pub fn new(name: &str, return_type: &str) -> Self {
        Self {
            name: name.to_string(),
            return_type: return_type.to_string(),
            params: Vec::new(),
            flags: 0x0006,
            native: 0,
            managed: None,
            fail: false,
        }
    }

    pub fn param(mut self, name: &str, ty: &str) -> Self {
        self.params.push((name.to_string(), ty.to_string()));
        self
    }

    pub fn static_(mut self) -> Self {
        self.flags |= 0x0010;
        self
    }

    /// Replace the raw attribute flags
    pub fn flags(mut self, flags: u32) -> Self {
        self.flags = flags;
        self
    }

    /// Entry point for direct calls
    pub fn native(mut self, address: usize) -> Self {
        self.native = address;
        self
    }

    /// Body for reflective calls
    pub fn managed(mut self, body: ManagedFn) -> Self {
        self.managed = Some(body);
        self
    }
}

/// Calls observed by a [`FixtureOps`]
#[derive(Debug, Default)]
pub struct FixtureCounters {
    attaches: AtomicUsize,
    detaches: AtomicUsize,
    compiles: AtomicUsize,
    type_objects: AtomicUsize,
    vtables: AtomicUsize,
}

impl FixtureCounters {
    pub fn attaches(&self) -> usize {
        self.attaches.load(Ordering::SeqCst)
    }

    pub fn detaches(&self) -> usize {
        self.detaches.load(Ordering::SeqCst)
    }

    pub fn compiles(&self) -> usize {
        self.compiles.load(Ordering::SeqCst)
    }

    pub fn type_objects(&self) -> usize {
        self.type_objects.load(Ordering::SeqCst)
    }

    pub fn vtables(&self) -> usize {
        self.vtables.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Failure {
    Error,
    Panic,
}

struct FxAssembly {
    name: String,
    classes: Vec<usize>,
}

struct FxClass {
    namespace: String,
    name: String,
    parent: Option<String>,
    fields: Vec<usize>,
    methods: Vec<usize>,
    interfaces: Vec<String>,
    failure: Option<Failure>,
}

struct FxField {
    name: String,
    ty: String,
    offset: i32,
    is_static: bool,
    fail: bool,
}

struct Allocation {
    storage: Box<[u64]>,
    class: String,
}

impl Allocation {
    fn new(bytes: usize, class: &str) -> Self {
        Self {
            storage: vec![0u64; bytes.div_ceil(8)].into_boxed_slice(),
            class: class.to_string(),
        }
    }

    fn address(&self) -> usize {
        self.storage.as_ptr() as usize
    }

    fn bytes_mut(&mut self) -> *mut u8 {
        self.storage.as_mut_ptr() as *mut u8
    }
}

/// In-memory [`RuntimeOps`]
pub struct FixtureOps {
    kind: RuntimeKind,
    base: Option<usize>,
    ready: bool,
    assemblies: Vec<FxAssembly>,
    classes: Vec<FxClass>,
    fields: Vec<FxField>,
    methods: Vec<FixtureMethod>,
    statics: Mutex<HashMap<usize, Vec<u8>>>,
    allocations: Mutex<Vec<Allocation>>,
    counters: Arc<FixtureCounters>,
}

impl FixtureOps {
    pub fn new(kind: RuntimeKind) -> Self {
        Self {
            kind,
            base: None,
            ready: true,
            assemblies: Vec::new(),
            classes: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            statics: Mutex::new(HashMap::new()),
            allocations: Mutex::new(Vec::new()),
            counters: Arc::default(),
        }
    }

    /// `mscorlib` plus a `Game` assembly with `Entity` and `Player` (Mono)
    pub fn game() -> Self {
        Self::game_for(RuntimeKind::Mono)
    }

    /// The [`Self::game`] graph under either runtime
    ///
    /// `Game.Player` lays out like [`PlayerObject`] and has a static
    /// `instances` field initialized to 3, a static `DoThing(System.Int32)`
    /// entry point returning `2 * value + 1`, and an instance `GetScore()`.
    pub fn game_for(kind: RuntimeKind) -> Self {
        Self::new(kind)
            .assembly("mscorlib")
            .class("System", "Object", None)
            .class("System", "String", Some("Object"))
            .assembly("Game")
            .class("Game", "Entity", Some("Object"))
            .class("Game", "Player", Some("Entity"))
            .field("score", "System.Int32", offset_of!(PlayerObject, score) as i32)
            .field("speed", "System.Single", offset_of!(PlayerObject, speed) as i32)
            .field("alive", "System.Boolean", offset_of!(PlayerObject, alive) as i32)
            .field("position", "UnityEngine.Vector3", offset_of!(PlayerObject, position) as i32)
            .static_field("instances", "System.Int32", &3i32.to_ne_bytes())
            .method(
                FixtureMethod::new("DoThing", "System.Int32")
                    .param("value", "System.Int32")
                    .static_()
                    .native(do_thing as usize),
            )
            .method(FixtureMethod::new("GetScore", "System.Int32").managed(|instance, _| {
                // SAFETY: the caller passed a `PlayerObject`
                let score = unsafe { (*(instance as *const PlayerObject)).score };
                Outcome::value(score)
            }))
    }

    /// Image base reported for RVA computation
    pub fn module_base(mut self, base: usize) -> Self {
        self.base = Some(base);
        self
    }

    /// The VM never reports ready
    pub fn never_ready(mut self) -> Self {
        self.ready = false;
        self
    }

    /// Start a new assembly (`name` without the `.dll` suffix)
    pub fn assembly(mut self, name: &str) -> Self {
        self.assemblies.push(FxAssembly {
            name: name.to_string(),
            classes: Vec::new(),
        });
        self
    }

    /// Add a class to the current assembly
    pub fn class(mut self, namespace: &str, name: &str, parent: Option<&str>) -> Self {
        if self.assemblies.is_empty() {
            self = self.assembly("Assembly-CSharp");
        }
        let index = self.classes.len();
        self.classes.push(FxClass {
            namespace: namespace.to_string(),
            name: name.to_string(),
            parent: parent.map(str::to_string),
            fields: Vec::new(),
            methods: Vec::new(),
            interfaces: Vec::new(),
            failure: None,
        });
        if let Some(assembly) = self.assemblies.last_mut() {
            assembly.classes.push(index);
        }
        self
    }

    fn current_class(&mut self) -> &mut FxClass {
        self.classes.last_mut().expect("declare a class first")
    }

    /// Add an instance field to the current class
    pub fn field(mut self, name: &str, ty: &str, offset: i32) -> Self {
        let index = self.fields.len();
        self.fields.push(FxField {
            name: name.to_string(),
            ty: ty.to_string(),
            offset,
            is_static: false,
            fail: false,
        });
        self.current_class().fields.push(index);
        self
    }

    /// Add a static field with initial storage contents
    ///
    /// Reported at offset 0 under both runtimes.
    pub fn static_field(mut self, name: &str, ty: &str, initial: &[u8]) -> Self {
        let index = self.fields.len();
        self.fields.push(FxField {
            name: name.to_string(),
            ty: ty.to_string(),
            offset: 0,
            is_static: true,
            fail: false,
        });
        self.statics.get_mut().insert(index, initial.to_vec());
        self.current_class().fields.push(index);
        self
    }

    /// Add a method to the current class
    pub fn method(mut self, method: FixtureMethod) -> Self {
        let index = self.methods.len();
        self.methods.push(method);
        self.current_class().methods.push(index);
        self
    }

    /// The current class implements the named interface class
    pub fn implements(mut self, interface: &str) -> Self {
        self.current_class().interfaces.push(interface.to_string());
        self
    }

    /// Field enumeration of the named class returns an error
    pub fn fail_fields(self, class: &str) -> Self {
        self.with_failure(class, Failure::Error)
    }

    /// Field enumeration of the named class panics
    pub fn panic_fields(self, class: &str) -> Self {
        self.with_failure(class, Failure::Panic)
    }

    fn with_failure(mut self, class: &str, failure: Failure) -> Self {
        for c in self.classes.iter_mut().filter(|c| c.name == class) {
            c.failure = Some(failure);
        }
        self
    }

    /// Describing any field or method with this name fails
    pub fn fail_member(mut self, name: &str) -> Self {
        for f in self.fields.iter_mut().filter(|f| f.name == name) {
            f.fail = true;
        }
        for m in self.methods.iter_mut().filter(|m| m.name == name) {
            m.fail = true;
        }
        self
    }

    /// Share the call counters
    pub fn with_counters(self) -> (Self, Arc<FixtureCounters>) {
        let counters = Arc::clone(&self.counters);
        (self, counters)
    }

    fn class_at(&self, class: Handle) -> RuntimeResult<&FxClass> {
        Ok(&self.classes[decode(class, CLASS)?])
    }

    fn allocate(&self, allocation: Allocation) -> Handle {
        let address = allocation.address();
        self.allocations.lock().push(allocation);
        Handle::from_addr(address).expect("heap allocations are non-null")
    }
}

/// Layout of a `Game.Player` object in [`FixtureOps::game`]
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct PlayerObject {
    pub header: ObjectHeader,
    pub score: i32,
    pub speed: f32,
    pub alive: bool,
    pub position: Vector3,
}

impl PlayerObject {
    pub fn as_ptr(&mut self) -> *mut c_void {
        self as *mut Self as *mut c_void
    }
}

extern "C" fn do_thing(value: i32) -> i32 {
    value * 2 + 1
}

/// Initialize a context over the fixture, panicking on failure
pub fn context(ops: FixtureOps) -> RuntimeContext {
    RuntimeContext::init(Box::new(ops), &InitOptions::default())
        .unwrap_or_else(|e| panic!("fixture runtime failed to initialize: {e}"))
}

impl RuntimeOps for FixtureOps {
    fn kind(&self) -> RuntimeKind {
        self.kind
    }

    fn module_base(&self) -> Option<usize> {
        self.base
    }

    fn wait_ready(&self, policy: &RetryPolicy) -> RuntimeResult<()> {
        if self.ready {
            return Ok(());
        }
        policy.run("fixture VM", |_| None::<()>);
        Err(RuntimeError::RuntimeNotReady {
            attempts: policy.max_attempts.max(1),
        })
    }

    fn domain(&self) -> RuntimeResult<Handle> {
        Ok(handle(DOMAIN, 0))
    }

    fn attach_thread(&self) -> RuntimeResult<()> {
        self.counters.attaches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn detach_thread(&self) -> RuntimeResult<()> {
        self.counters.detaches.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn assemblies(&self) -> RuntimeResult<Vec<Handle>> {
        Ok((0..self.assemblies.len()).map(|i| handle(ASSEMBLY, i)).collect())
    }

    fn assembly_image(&self, assembly: Handle) -> RuntimeResult<Handle> {
        Ok(handle(IMAGE, decode(assembly, ASSEMBLY)?))
    }

    fn image_name(&self, image: Handle) -> RuntimeResult<String> {
        Ok(assembly_display_name(&self.assemblies[decode(image, IMAGE)?].name))
    }

    fn image_filename(&self, image: Handle) -> RuntimeResult<String> {
        self.image_name(image)
    }

    fn image_classes(&self, image: Handle) -> RuntimeResult<Vec<Handle>> {
        let assembly = &self.assemblies[decode(image, IMAGE)?];
        Ok(assembly.classes.iter().map(|&i| handle(CLASS, i)).collect())
    }

    fn class_info(&self, class: Handle) -> RuntimeResult<ClassInfo> {
        let c = self.class_at(class)?;
        Ok(ClassInfo {
            name: c.name.clone(),
            namespace: c.namespace.clone(),
            parent: c.parent.clone(),
        })
    }

    fn class_fields(&self, class: Handle) -> RuntimeResult<Vec<Handle>> {
        let c = self.class_at(class)?;
        match c.failure {
            Some(Failure::Error) => Err(RuntimeError::Internal(format!(
                "injected field enumeration failure in {}",
                c.name
            ))),
            Some(Failure::Panic) => panic!("injected field enumeration panic in {}", c.name),
            None => Ok(c.fields.iter().map(|&i| handle(FIELD, i)).collect()),
        }
    }

    fn class_methods(&self, class: Handle) -> RuntimeResult<Vec<Handle>> {
        let c = self.class_at(class)?;
        Ok(c.methods.iter().map(|&i| handle(METHOD, i)).collect())
    }

    fn class_interfaces(&self, class: Handle) -> RuntimeResult<Vec<Handle>> {
        let c = self.class_at(class)?;
        Ok(c.interfaces
            .iter()
            .filter_map(|name| self.classes.iter().position(|other| &other.name == name))
            .map(|i| handle(CLASS, i))
            .collect())
    }

    fn field_info(&self, field: Handle) -> RuntimeResult<FieldInfo> {
        let f = &self.fields[decode(field, FIELD)?];
        if f.fail {
            return Err(RuntimeError::NullResult {
                export: "field_get_type",
            });
        }
        let ty = match (self.kind, ValueKind::from_type_name(&f.ty).size()) {
            (RuntimeKind::Mono, Some(size)) => TypeInfo::sized(&f.ty, size as i32),
            _ => TypeInfo::new(&f.ty),
        };
        let flags = match self.kind {
            RuntimeKind::Mono => Some(if f.is_static { 0x0016 } else { 0x0006 }),
            RuntimeKind::Il2Cpp => None,
        };
        Ok(FieldInfo {
            name: f.name.clone(),
            ty,
            offset: f.offset,
            flags,
        })
    }

    fn method_info(&self, method: Handle) -> RuntimeResult<MethodInfo> {
        let m = &self.methods[decode(method, METHOD)?];
        if m.fail {
            return Err(RuntimeError::NullResult {
                export: "method_signature",
            });
        }
        let native = match self.kind {
            RuntimeKind::Il2Cpp => Some(m.native),
            RuntimeKind::Mono => None,
        };
        Ok(MethodInfo {
            name: m.name.clone(),
            return_type: TypeInfo::new(&m.return_type),
            params: m
                .params
                .iter()
                .map(|(name, ty)| ParamInfo {
                    name: name.clone(),
                    ty: TypeInfo::new(ty),
                })
                .collect(),
            flags: m.flags,
            native,
        })
    }

    fn compile_method(&self, method: Handle) -> RuntimeResult<usize> {
        self.counters.compiles.fetch_add(1, Ordering::SeqCst);
        let m = &self.methods[decode(method, METHOD)?];
        if m.native == 0 {
            return Err(RuntimeError::NotCompiled(m.name.clone()));
        }
        Ok(m.native)
    }

    unsafe fn runtime_invoke(
        &self,
        method: Handle,
        instance: *mut c_void,
        args: *mut *mut c_void,
    ) -> RuntimeResult<*mut c_void> {
        let m = &self.methods[decode(method, METHOD)?];
        let body = m
            .managed
            .ok_or_else(|| RuntimeError::Internal(format!("fixture: {} has no body", m.name)))?;
        let args: &[*mut c_void] = if m.params.is_empty() || args.is_null() {
            &[]
        } else {
            std::slice::from_raw_parts(args, m.params.len())
        };

        match body(instance, args) {
            Outcome::Value(bytes) => {
                let header = size_of::<ObjectHeader>();
                let mut boxed = Allocation::new(header + bytes.len(), &m.return_type);
                std::ptr::copy_nonoverlapping(
                    bytes.as_ptr(),
                    boxed.bytes_mut().add(header),
                    bytes.len(),
                );
                Ok(self.allocate(boxed).as_void())
            }
            Outcome::Object(address) => Ok(address as *mut c_void),
            Outcome::Null => Ok(std::ptr::null_mut()),
            Outcome::Throw(exception) => Err(RuntimeError::ManagedException {
                method: m.name.clone(),
                exception: exception.to_string(),
            }),
        }
    }

    unsafe fn object_unbox(&self, object: *mut c_void) -> RuntimeResult<*mut c_void> {
        Ok((object as *mut u8).add(size_of::<ObjectHeader>()) as *mut c_void)
    }

    fn class_vtable(&self, class: Handle) -> RuntimeResult<Option<Handle>> {
        self.counters.vtables.fetch_add(1, Ordering::SeqCst);
        let index = decode(class, CLASS)?;
        Ok(match self.kind {
            RuntimeKind::Mono => Some(handle(VTABLE, index)),
            RuntimeKind::Il2Cpp => None,
        })
    }

    unsafe fn static_get(
        &self,
        field: Handle,
        vtable: Option<Handle>,
        out: *mut c_void,
    ) -> RuntimeResult<()> {
        if self.kind == RuntimeKind::Mono && vtable.is_none() {
            return Err(RuntimeError::Internal("fixture: missing vtable".into()));
        }
        let statics = self.statics.lock();
        let storage = statics
            .get(&decode(field, FIELD)?)
            .ok_or_else(|| RuntimeError::Internal("fixture: not a static field".into()))?;
        std::ptr::copy_nonoverlapping(storage.as_ptr(), out as *mut u8, storage.len());
        Ok(())
    }

    unsafe fn static_set(
        &self,
        field: Handle,
        vtable: Option<Handle>,
        value: *mut c_void,
    ) -> RuntimeResult<()> {
        if self.kind == RuntimeKind::Mono && vtable.is_none() {
            return Err(RuntimeError::Internal("fixture: missing vtable".into()));
        }
        let mut statics = self.statics.lock();
        let storage = statics
            .get_mut(&decode(field, FIELD)?)
            .ok_or_else(|| RuntimeError::Internal("fixture: not a static field".into()))?;
        std::ptr::copy_nonoverlapping(value as *const u8, storage.as_mut_ptr(), storage.len());
        Ok(())
    }

    fn class_type_object(&self, class: Handle) -> RuntimeResult<Handle> {
        self.counters.type_objects.fetch_add(1, Ordering::SeqCst);
        Ok(handle(TYPE_OBJECT, decode(class, CLASS)?))
    }

    fn object_new(&self, class: Handle) -> RuntimeResult<Handle> {
        let c = self.class_at(class)?;
        Ok(self.allocate(Allocation::new(0x40, &c.name)))
    }

    fn string_new(&self, text: &str) -> RuntimeResult<Handle> {
        let units: Vec<u16> = text.encode_utf16().collect();
        let mut string = Allocation::new(STRING_CHARS_OFFSET + units.len() * 2 + 2, "String");
        // SAFETY: the allocation covers the header and every code unit
        unsafe {
            let base = string.bytes_mut();
            std::ptr::write_unaligned(
                base.add(offset_of!(StringHeader, length)) as *mut i32,
                units.len() as i32,
            );
            std::ptr::copy_nonoverlapping(
                units.as_ptr() as *const u8,
                base.add(STRING_CHARS_OFFSET),
                units.len() * 2,
            );
        }
        Ok(self.allocate(string))
    }

    fn object_class_name(&self, object: Handle) -> RuntimeResult<String> {
        self.allocations
            .lock()
            .iter()
            .find(|a| a.address() == object.addr())
            .map(|a| a.class.clone())
            .ok_or(RuntimeError::NullResult {
                export: "object_get_class",
            })
    }
}
