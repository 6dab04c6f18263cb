//! uniresolve core
//!
//! Runtime introspection for Unity processes running on Mono or IL2Cpp:
//! discovers every assembly, class, field and method once, then serves name
//! based lookups, guarded field access and method invocation over the
//! resulting graph.
//!
//! # Re-exports
//!
//! This crate re-exports the SDK and engine crates for convenience:
//! - [`sdk`] - Runtime kinds, export names and managed layouts
//! - [`engine`] - Export resolution and native calls

// Allow the crate to refer to itself as `uniresolve_core` for proc macro compatibility
extern crate self as uniresolve_core;

use tracing::info;

// Re-export SDK and engine crates
pub use uniresolve_engine as engine;
pub use uniresolve_sdk as sdk;

pub mod config;
pub mod context;
pub mod dump;
pub mod error;
pub mod frame;
pub mod global;
pub mod invoke;
pub mod managed;
pub mod memory;
pub mod model;
pub mod object;
pub mod ops;
pub mod view;
pub mod walker;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used items
pub use context::{InitOptions, RuntimeContext};
pub use error::{AccessError, RuntimeError, RuntimeResult};
pub use global::{init_runtime, is_runtime_ready, runtime, try_runtime};
pub use managed::{FieldValue, ValueKind};
pub use memory::ManagedField;
pub use model::{
    AssemblyId, ClassId, FieldId, MethodFlags, MethodId, Registry, Resolution, WILDCARD,
};
pub use object::ManagedObject;
pub use ops::RuntimeOps;
pub use view::{AssemblyRef, ClassRef, FieldRef, MethodRef};
pub use walker::WalkReport;

// Re-export frame dispatch
pub use frame::{
    on_frame, queue_task, register_frame_callback, unregister_frame_callback, FrameKey,
};

// Re-export config types
pub use config::{ConfigError, ConfigResult, CoreConfig};

// Re-export macros
pub use uniresolve_macros::ManagedClass;

/// Release the calling thread and drop frame callbacks
///
/// Called from the FFI layer when the host unloads the library. The context
/// itself stays in place; metadata handles remain valid for the process.
pub fn shutdown() {
    info!("uniresolve shutting down...");
    if let Some(ctx) = try_runtime() {
        if let Err(e) = ctx.detach_thread() {
            tracing::warn!("Failed to detach thread: {}", e);
        }
    }
    frame::clear_callbacks();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FixtureOps, PlayerObject};
    use std::ffi::c_void;
    use std::marker::PhantomData;

    #[derive(ManagedClass)]
    #[managed(assembly = "Game.dll", namespace = "Game", class = "Player")]
    struct Player {
        ptr: *mut c_void,

        #[managed(field = "score")]
        score: PhantomData<i32>,

        #[managed(field = "speed", readonly)]
        speed: PhantomData<f32>,

        #[managed(field = "instances", static_field)]
        instances: PhantomData<i32>,
    }

    mod wrappers {
        use super::*;
        use uniresolve_sdk::Vector3;

        // Accessors take the struct's visibility
        #[derive(ManagedClass)]
        #[managed(assembly = "Game.dll", namespace = "Game", class = "Player")]
        pub(super) struct PlayerPosition {
            ptr: *mut c_void,

            #[managed(field = "position", readonly)]
            position: PhantomData<Vector3>,
        }
    }

    // The process-wide context can only be set once; everything runs in one test
    #[test]
    fn test_global_runtime_and_derived_accessors() {
        assert!(matches!(Player::instances(), Err(RuntimeError::NotReady)));

        let ctx = init_runtime(testing::context(FixtureOps::game())).unwrap();
        assert!(is_runtime_ready());
        assert!(matches!(
            init_runtime(testing::context(FixtureOps::game())),
            Err(RuntimeError::AlreadyInitialized)
        ));
        assert_eq!(runtime().unwrap().id(), ctx.id());

        let mut object = PlayerObject {
            score: 7,
            speed: 1.5,
            ..Default::default()
        };
        let player = unsafe { Player::from_ptr(object.as_ptr()) }.unwrap();
        assert!(player.is_valid());
        assert_eq!(player.score().unwrap(), 7);
        assert_eq!(player.speed().unwrap(), 1.5);
        player.set_score(11).unwrap();
        assert_eq!(object.score, 11);

        assert_eq!(Player::instances().unwrap(), 3);
        Player::set_instances(4).unwrap();
        assert_eq!(Player::instances().unwrap(), 4);

        assert_eq!(Player::SCORE_FIELD, "score");
        assert_eq!(<Player as ManagedObject>::CLASS_NAME, "Player");
        assert!(unsafe { Player::from_ptr(std::ptr::null_mut()) }.is_none());

        object.position = uniresolve_sdk::Vector3::new(1.0, 2.0, 3.0);
        let located = unsafe { wrappers::PlayerPosition::from_ptr(object.as_ptr()) }.unwrap();
        assert_eq!(located.position().unwrap(), object.position);
        assert_eq!(located.as_ptr(), object.as_ptr());
        assert_eq!(wrappers::PlayerPosition::POSITION_FIELD, "position");

        let fresh = Player::new_object().unwrap();
        assert_eq!(ctx.object_class_name(fresh.as_ptr()).unwrap(), "Player");
    }
}
