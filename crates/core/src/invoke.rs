//! Invocation and marshaling
//!
//! Two ways to call a managed method:
//!
//! - **Direct** ([`RuntimeContext::invoke`], [`RuntimeContext::cast`]): jump
//!   to the compiled entry point with a caller-chosen `extern "C"` shape.
//!   Fast, but the caller owns the ABI, including the leading `this` pointer
//!   for instance methods.
//! - **Reflective** ([`RuntimeContext::runtime_invoke`]): hand the runtime an
//!   array of pointers to each argument and let it marshal. Results come back
//!   boxed and are unboxed and copied through the memory guard.

use std::ffi::c_void;
use std::mem::size_of;

use uniresolve_engine::NativeArgs;
use uniresolve_sdk::{Handle, RuntimeKind};

use crate::context::RuntimeContext;
use crate::error::{AccessError, RuntimeError, RuntimeResult};
use crate::memory::guard;
use crate::model::MethodId;

impl RuntimeContext {
    /// Native entry point of a method
    ///
    /// IL2Cpp entry points are known from discovery. Mono methods are
    /// JIT-compiled on first request and the pointer is memoized.
    pub fn ensure_compiled(&self, method: MethodId) -> RuntimeResult<usize> {
        let m = self.registry().method(method);
        if let Some(ptr) = m.native() {
            return Ok(ptr);
        }

        match self.kind() {
            RuntimeKind::Il2Cpp => Err(RuntimeError::NotCompiled(m.signature())),
            RuntimeKind::Mono => {
                self.attach_thread()?;
                let ptr = self.ops().compile_method(m.handle)?;
                if ptr == 0 {
                    return Err(RuntimeError::NotCompiled(m.signature()));
                }
                tracing::debug!("Compiled {} at {:#x}", m.signature(), ptr);
                Ok(*m.native.get_or_init(|| ptr))
            }
        }
    }

    /// Call the compiled entry point directly
    ///
    /// The entry point must lie in executable memory. Faults inside the
    /// callee are not contained.
    ///
    /// # Safety
    /// `A` and `R` must match the native signature exactly, including the
    /// instance pointer for instance methods.
    pub unsafe fn invoke<R, A: NativeArgs>(&self, method: MethodId, args: A) -> RuntimeResult<R> {
        let address = self.ensure_compiled(method)?;
        self.attach_thread()?;
        let m = self.registry().method(method);

        if !guard::is_executable(address) {
            return Err(RuntimeError::CallFault {
                method: m.signature(),
                address,
                reason: "entry point is not executable".to_string(),
            });
        }

        Ok(args.call_at::<R>(address))
    }

    /// Entry point as a typed function pointer for repeated calls
    ///
    /// # Safety
    /// `F` must be an `extern "C"` fn pointer type matching the native
    /// signature.
    pub unsafe fn cast<F: Copy>(&self, method: MethodId) -> RuntimeResult<F> {
        if size_of::<F>() != size_of::<usize>() {
            return Err(RuntimeError::Internal(format!(
                "cast target is {} bytes, expected a function pointer",
                size_of::<F>()
            )));
        }
        let address = self.ensure_compiled(method)?;
        if !guard::is_executable(address) {
            let m = self.registry().method(method);
            return Err(RuntimeError::CallFault {
                method: m.signature(),
                address,
                reason: "entry point is not executable".to_string(),
            });
        }
        Ok(std::mem::transmute_copy::<usize, F>(&address))
    }

    /// Reflective call; returns the raw (possibly null) result object
    ///
    /// `argv` must hold exactly one pointer per parameter, and an instance
    /// method's object header must be readable.
    ///
    /// # Safety
    /// Each pointer in `argv` must point to storage matching its parameter.
    pub unsafe fn runtime_invoke_raw(
        &self,
        method: MethodId,
        instance: *mut c_void,
        argv: &mut [*mut c_void],
    ) -> RuntimeResult<*mut c_void> {
        let m = self.registry().method(method);
        if !m.is_static && instance.is_null() {
            return Err(RuntimeError::MissingInstance(m.signature()));
        }
        if argv.len() != m.params.len() {
            return Err(RuntimeError::ArityMismatch {
                method: m.signature(),
                expected: m.params.len(),
                actual: argv.len(),
            });
        }
        if !m.is_static && !guard::is_readable(instance as usize, size_of::<usize>()) {
            return Err(AccessError::InvalidTarget {
                address: instance as usize,
                len: size_of::<usize>(),
            }
            .into());
        }
        self.attach_thread()?;

        let argv_ptr = if argv.is_empty() {
            std::ptr::null_mut()
        } else {
            argv.as_mut_ptr()
        };
        let instance = if m.is_static {
            std::ptr::null_mut()
        } else {
            instance
        };
        self.ops()
            .runtime_invoke(m.handle, instance, argv_ptr)
            .map_err(|e| match e {
                RuntimeError::ManagedException { exception, .. } => {
                    RuntimeError::ManagedException {
                        method: m.signature(),
                        exception,
                    }
                }
                other => other,
            })
    }

    /// Reflective call with an unboxed value-type result
    ///
    /// Each argument is passed by pointer to its storage, which is what the
    /// runtime expects for value types. Pass object references as raw
    /// pointers.
    ///
    /// # Safety
    /// Each element of `args` must match the parameter's managed layout, and
    /// `R` must match the return type's.
    pub unsafe fn runtime_invoke<R: Copy, A: NativeArgs>(
        &self,
        method: MethodId,
        instance: *mut c_void,
        mut args: A,
    ) -> RuntimeResult<R> {
        let mut argv = args.arg_ptrs();
        let result = self.runtime_invoke_raw(method, instance, &mut argv)?;
        let signature = || self.registry().method(method).signature();
        if result.is_null() {
            return Err(RuntimeError::NullReturn(signature()));
        }

        let value = self.ops().object_unbox(result)?;
        if value.is_null() {
            return Err(RuntimeError::NullUnbox(signature()));
        }
        Ok(guard::try_read::<R>(value as usize)?)
    }

    /// Reflective call discarding any result
    ///
    /// # Safety
    /// Each element of `args` must match the parameter's managed layout.
    pub unsafe fn runtime_invoke_void<A: NativeArgs>(
        &self,
        method: MethodId,
        instance: *mut c_void,
        mut args: A,
    ) -> RuntimeResult<()> {
        let mut argv = args.arg_ptrs();
        self.runtime_invoke_raw(method, instance, &mut argv)?;
        Ok(())
    }

    /// Reflective call returning a reference-type result as a raw object
    ///
    /// # Safety
    /// Each element of `args` must match the parameter's managed layout.
    pub unsafe fn runtime_invoke_object<A: NativeArgs>(
        &self,
        method: MethodId,
        instance: *mut c_void,
        mut args: A,
    ) -> RuntimeResult<Option<Handle>> {
        let mut argv = args.arg_ptrs();
        let result = self.runtime_invoke_raw(method, instance, &mut argv)?;
        Ok(Handle::from_ptr(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FixtureMethod, FixtureOps, Outcome};

    extern "C" fn do_thing(value: i32) -> i32 {
        value * 2 + 1
    }

    fn three_classes(kind: RuntimeKind) -> FixtureOps {
        FixtureOps::new(kind)
            .assembly("mscorlib")
            .class("System", "Object", None)
            .assembly("Game")
            .class("Game", "Entity", Some("Object"))
            .class("Game", "Player", Some("Entity"))
            .field("score", "System.Int32", 0x10)
            .method(
                FixtureMethod::new("DoThing", "System.Int32")
                    .param("value", "System.Int32")
                    .static_()
                    .native(do_thing as usize),
            )
    }

    #[test]
    fn test_end_to_end_direct_invoke() {
        for kind in [RuntimeKind::Mono, RuntimeKind::Il2Cpp] {
            let ctx = testing::context(three_classes(kind));
            assert_eq!(ctx.registry().assembly_count(), 2);
            assert_eq!(ctx.registry().class_count(), 3);

            let method = ctx
                .require_assembly("Game.dll")
                .and_then(|a| a.require_class("Player"))
                .and_then(|c| c.method("DoThing", &["System.Int32"]))
                .unwrap();
            assert!(method.is_exact());

            let result: i32 = unsafe { ctx.invoke(method.id(), (42i32,)) }.unwrap();
            assert_eq!(result, 85);

            let f: extern "C" fn(i32) -> i32 = unsafe { ctx.cast(method.id()) }.unwrap();
            assert_eq!(f(-1), -1);
        }
    }

    #[test]
    fn test_mono_compiles_once() {
        let (ops, counters) = three_classes(RuntimeKind::Mono).with_counters();
        let ctx = testing::context(ops);
        let player = ctx.registry().find_class_anywhere("Game", "Player").unwrap();
        let method = ctx.registry().find_method(player, "DoThing", &["*"]).unwrap().id;

        assert_eq!(ctx.registry().method(method).native(), None);
        let first = ctx.ensure_compiled(method).unwrap();
        let second = ctx.ensure_compiled(method).unwrap();
        assert_eq!(first, second);
        assert_eq!(counters.compiles(), 1);
    }

    #[test]
    fn test_il2cpp_without_pointer_is_not_compiled() {
        let ops = FixtureOps::new(RuntimeKind::Il2Cpp)
            .assembly("Game")
            .class("Game", "Thing", None)
            .method(FixtureMethod::new("Abstract", "System.Void"));
        let ctx = testing::context(ops);
        let thing = ctx.registry().find_class_anywhere("Game", "Thing").unwrap();
        let method = ctx.registry().find_method(thing, "Abstract", &[]).unwrap().id;
        assert!(matches!(
            ctx.ensure_compiled(method),
            Err(RuntimeError::NotCompiled(_))
        ));
    }

    #[test]
    fn test_invoke_at_bad_address_faults() {
        let ops = FixtureOps::new(RuntimeKind::Il2Cpp)
            .assembly("Game")
            .class("Game", "Thing", None)
            .method(FixtureMethod::new("Broken", "System.Int32").static_().native(0x1));
        let ctx = testing::context(ops);
        let thing = ctx.registry().find_class_anywhere("Game", "Thing").unwrap();
        let method = ctx.registry().find_method(thing, "Broken", &[]).unwrap().id;

        let err = unsafe { ctx.invoke::<i32, _>(method, ()) }.unwrap_err();
        assert!(matches!(err, RuntimeError::CallFault { address: 0x1, .. }));
        assert!(err.is_invalid_target());
        assert!(unsafe { ctx.cast::<extern "C" fn() -> i32>(method) }.is_err());
    }

    #[test]
    fn test_runtime_invoke_unboxes_result() {
        let ops = FixtureOps::new(RuntimeKind::Mono)
            .assembly("Game")
            .class("Game", "Math", None)
            .method(
                FixtureMethod::new("Add", "System.Single")
                    .param("a", "System.Single")
                    .param("b", "System.Single")
                    .static_()
                    .managed(|_, args| unsafe {
                        let a = *(args[0] as *const f32);
                        let b = *(args[1] as *const f32);
                        Outcome::value(a + b)
                    }),
            )
            .method(
                FixtureMethod::new("Fail", "System.Void")
                    .static_()
                    .managed(|_, _| Outcome::Throw("System.InvalidOperationException")),
            )
            .method(
                FixtureMethod::new("Nothing", "System.Object")
                    .static_()
                    .managed(|_, _| Outcome::Null),
            );
        let ctx = testing::context(ops);
        let math = ctx.require_assembly("Game.dll").unwrap().require_class("Math").unwrap();

        let add = math.method("Add", &["System.Single", "System.Single"]).unwrap();
        let sum: f32 = unsafe { add.runtime_invoke(std::ptr::null_mut(), (1.5f32, 2.0f32)) }.unwrap();
        assert_eq!(sum, 3.5);

        let fail = math.method("Fail", &[]).unwrap();
        match unsafe { fail.runtime_invoke_void(std::ptr::null_mut(), ()) } {
            Err(RuntimeError::ManagedException { method, exception }) => {
                assert_eq!(method, "Fail()");
                assert_eq!(exception, "System.InvalidOperationException");
            }
            other => panic!("unexpected {other:?}"),
        }

        let nothing = math.method("Nothing", &[]).unwrap();
        assert!(matches!(
            unsafe { nothing.runtime_invoke::<i32, _>(std::ptr::null_mut(), ()) },
            Err(RuntimeError::NullReturn(_))
        ));
        assert_eq!(
            unsafe { nothing.runtime_invoke_object(std::ptr::null_mut(), ()) }.unwrap(),
            None
        );
    }

    #[test]
    fn test_instance_method_requires_instance() {
        let ctx = testing::context(FixtureOps::game());
        let player = ctx.require_assembly("Game.dll").unwrap().require_class("Player").unwrap();
        let get_score = player.method("GetScore", &[]).unwrap();
        assert!(matches!(
            unsafe { get_score.runtime_invoke::<i32, _>(std::ptr::null_mut(), ()) },
            Err(RuntimeError::MissingInstance(_))
        ));

        let mut object = testing::PlayerObject {
            score: 77,
            ..Default::default()
        };
        let score: i32 = unsafe { get_score.runtime_invoke(object.as_ptr(), ()) }.unwrap();
        assert_eq!(score, 77);
    }

    #[test]
    fn test_unreadable_instance_is_rejected() {
        for kind in [RuntimeKind::Mono, RuntimeKind::Il2Cpp] {
            let ctx = testing::context(FixtureOps::game_for(kind));
            let player = ctx.require_assembly("Game.dll").unwrap().require_class("Player").unwrap();
            let get_score = player.method("GetScore", &[]).unwrap();

            let err = unsafe { get_score.runtime_invoke::<i32, _>(1usize as *mut c_void, ()) }
                .unwrap_err();
            assert!(matches!(
                err,
                RuntimeError::Access(AccessError::InvalidTarget { address: 0x1, .. })
            ));
            assert!(err.is_invalid_target());
            assert!(unsafe { get_score.runtime_invoke_void(1usize as *mut c_void, ()) }.is_err());
        }
    }

    #[test]
    fn test_argument_count_must_match() {
        let ctx = testing::context(three_classes(RuntimeKind::Mono));
        let player = ctx.require_assembly("Game.dll").unwrap().require_class("Player").unwrap();
        let do_thing = player.method("DoThing", &["System.Int32"]).unwrap();

        match unsafe { do_thing.runtime_invoke::<i32, _>(std::ptr::null_mut(), ()) } {
            Err(RuntimeError::ArityMismatch { expected, actual, .. }) => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 0);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            unsafe { do_thing.runtime_invoke_void(std::ptr::null_mut(), (1i32, 2i32)) },
            Err(RuntimeError::ArityMismatch { expected: 1, actual: 2, .. })
        ));
    }
}
