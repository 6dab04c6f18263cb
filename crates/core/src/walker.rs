//! Metadata walker
//!
//! One-time scan of every loaded assembly into a [`Registry`]. Any single
//! assembly, class, field or method that fails (error, null, or a panic in the
//! ops layer) is skipped and counted; the walk itself never fails.
//!
//! Classes are drafted completely before being committed, so a class whose
//! field enumeration fails leaves nothing half-built in the registry.

use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uniresolve_sdk::{Handle, RuntimeKind};

use crate::error::{RuntimeError, RuntimeResult};
use crate::model::{classify_static, AssemblyId, MethodFlags, Param, Registry};
use crate::ops::{ClassInfo, FieldInfo, MethodInfo, RuntimeOps};

/// Totals and skip counts for one walk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WalkReport {
    pub assemblies: usize,
    pub classes: usize,
    pub fields: usize,
    pub methods: usize,
    pub skipped_assemblies: usize,
    pub skipped_classes: usize,
    pub skipped_fields: usize,
    pub skipped_methods: usize,
    pub skipped_interfaces: usize,
}

impl WalkReport {
    pub fn skipped(&self) -> usize {
        self.skipped_assemblies
            + self.skipped_classes
            + self.skipped_fields
            + self.skipped_methods
            + self.skipped_interfaces
    }
}

/// Result of [`discover`]
#[derive(Debug)]
pub struct Discovery {
    pub registry: Registry,
    pub report: WalkReport,
}

/// Run `f`, turning a panic into [`RuntimeError::Internal`]
fn contain<T>(what: &str, f: impl FnOnce() -> RuntimeResult<T>) -> RuntimeResult<T> {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let reason = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            Err(RuntimeError::Internal(format!("{what}: {reason}")))
        }
    }
}

struct ClassDraft {
    info: ClassInfo,
    handle: Handle,
    fields: Vec<(Handle, FieldInfo)>,
    methods: Vec<(Handle, MethodInfo)>,
}

struct Walker<'a> {
    ops: &'a dyn RuntimeOps,
    kind: RuntimeKind,
    registry: Registry,
    report: WalkReport,
}

impl<'a> Walker<'a> {
    fn walk_assembly(&mut self, assembly: Handle) -> RuntimeResult<()> {
        let ops = self.ops;
        let (name, file, classes) = contain("assembly", || {
            let image = ops.assembly_image(assembly)?;
            let name = ops.image_name(image)?;
            let file = ops.image_filename(image).unwrap_or_default();
            let classes = ops.image_classes(image)?;
            Ok((name, file, classes))
        })?;

        let id = self.registry.add_assembly(name, file, assembly);
        self.report.assemblies += 1;

        for class in classes {
            match self.draft_class(class) {
                Ok(draft) => self.commit(id, draft),
                Err(e) => {
                    debug!("Skipping class {}: {}", class, e);
                    self.report.skipped_classes += 1;
                }
            }
        }
        Ok(())
    }

    fn draft_class(&mut self, class: Handle) -> RuntimeResult<ClassDraft> {
        let ops = self.ops;
        let info = contain("class_info", || ops.class_info(class))?;

        let mut draft = ClassDraft {
            info,
            handle: class,
            fields: Vec::new(),
            methods: Vec::new(),
        };
        self.collect_members(class, &mut draft)?;

        match contain("class_interfaces", || ops.class_interfaces(class)) {
            Ok(interfaces) => {
                for interface in interfaces {
                    if let Err(e) = self.collect_members(interface, &mut draft) {
                        debug!(
                            "Skipping interface {} of {}: {}",
                            interface, draft.info.name, e
                        );
                        self.report.skipped_interfaces += 1;
                    }
                }
            }
            Err(e) => {
                debug!("No interfaces for {}: {}", draft.info.name, e);
                self.report.skipped_interfaces += 1;
            }
        }

        Ok(draft)
    }

    /// Append the fields and methods of `owner` to the draft
    ///
    /// Failing to enumerate fields fails the owner; single members that fail
    /// are skipped.
    fn collect_members(&mut self, owner: Handle, draft: &mut ClassDraft) -> RuntimeResult<()> {
        let ops = self.ops;
        let fields = contain("class_fields", || ops.class_fields(owner))?;
        for field in fields {
            match contain("field_info", || ops.field_info(field)) {
                Ok(info) => draft.fields.push((field, info)),
                Err(e) => {
                    debug!("Skipping field {} of {}: {}", field, draft.info.name, e);
                    self.report.skipped_fields += 1;
                }
            }
        }

        let methods = match contain("class_methods", || ops.class_methods(owner)) {
            Ok(methods) => methods,
            Err(e) => {
                debug!("No methods for {}: {}", draft.info.name, e);
                Vec::new()
            }
        };
        for method in methods {
            match contain("method_info", || ops.method_info(method)) {
                Ok(info) => draft.methods.push((method, info)),
                Err(e) => {
                    debug!("Skipping method {} of {}: {}", method, draft.info.name, e);
                    self.report.skipped_methods += 1;
                }
            }
        }
        Ok(())
    }

    fn commit(&mut self, assembly: AssemblyId, draft: ClassDraft) {
        let ClassDraft {
            info,
            handle,
            fields,
            methods,
        } = draft;
        let class = self
            .registry
            .add_class(assembly, info.name, info.namespace, info.parent, handle);
        self.report.classes += 1;

        for (field, info) in fields {
            let is_static = classify_static(self.kind, info.flags, info.offset);
            self.registry
                .add_field(class, info.name, info.ty, info.offset, is_static, field);
            self.report.fields += 1;
        }

        for (method, info) in methods {
            let params = info
                .params
                .into_iter()
                .map(|p| Param {
                    name: p.name,
                    ty: p.ty,
                })
                .collect();
            self.registry.add_method(
                class,
                info.name,
                info.return_type,
                params,
                MethodFlags::from_bits_retain(info.flags),
                method,
                info.native,
            );
            self.report.methods += 1;
        }
    }
}

/// Walk every assembly the runtime reports
///
/// The calling thread must already be attached.
#[instrument(skip_all, fields(kind = %ops.kind()))]
pub fn discover(ops: &dyn RuntimeOps) -> Discovery {
    let mut walker = Walker {
        ops,
        kind: ops.kind(),
        registry: Registry::new(),
        report: WalkReport::default(),
    };

    let assemblies = match contain("assemblies", || ops.assemblies()) {
        Ok(assemblies) => assemblies,
        Err(e) => {
            warn!("Assembly enumeration failed: {}", e);
            Vec::new()
        }
    };

    for assembly in assemblies {
        if let Err(e) = walker.walk_assembly(assembly) {
            debug!("Skipping assembly {}: {}", assembly, e);
            walker.report.skipped_assemblies += 1;
        }
    }

    let report = walker.report;
    if report.skipped() > 0 {
        warn!(
            "Walk skipped {} assemblies, {} classes, {} fields, {} methods, {} interfaces",
            report.skipped_assemblies,
            report.skipped_classes,
            report.skipped_fields,
            report.skipped_methods,
            report.skipped_interfaces
        );
    }
    info!(
        "Discovered {} assemblies, {} classes, {} fields, {} methods",
        report.assemblies, report.classes, report.fields, report.methods
    );

    Discovery {
        registry: walker.registry,
        report,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FixtureMethod, FixtureOps};

    fn five_classes(kind: RuntimeKind) -> FixtureOps {
        let mut ops = FixtureOps::new(kind).assembly("Five");
        for i in 1..=5 {
            ops = ops
                .class("Five", &format!("C{i}"), None)
                .field("value", "System.Int32", 0x10)
                .method(FixtureMethod::new("Get", "System.Int32"));
        }
        ops.fail_fields("C3")
    }

    #[test]
    fn test_partial_walk_skips_failing_class() {
        let discovery = discover(&five_classes(RuntimeKind::Mono));
        let reg = &discovery.registry;

        let names: Vec<_> = reg.classes().map(|(_, c)| c.name.as_str()).collect();
        assert_eq!(names, ["C1", "C2", "C4", "C5"]);
        assert_eq!(discovery.report.classes, 4);
        assert_eq!(discovery.report.skipped_classes, 1);
        // nothing of C3 leaked into the arenas
        assert_eq!(reg.field_count(), 4);
        assert_eq!(reg.method_count(), 4);
    }

    #[test]
    fn test_panic_in_ops_is_contained() {
        let ops = five_classes(RuntimeKind::Il2Cpp).panic_fields("C5");
        let discovery = discover(&ops);
        assert_eq!(discovery.report.classes, 3);
        assert_eq!(discovery.report.skipped_classes, 2);
    }

    #[test]
    fn test_single_member_failures_are_counted() {
        let ops = FixtureOps::new(RuntimeKind::Mono)
            .assembly("Game")
            .class("Game", "Thing", None)
            .field("ok", "System.Int32", 0x10)
            .field("broken", "System.Int32", 0x14)
            .method(FixtureMethod::new("Fine", "System.Void"))
            .method(FixtureMethod::new("NoSignature", "System.Void"))
            .fail_member("broken")
            .fail_member("NoSignature");
        let discovery = discover(&ops);
        let thing = discovery.registry.find_class_anywhere("*", "Thing").unwrap();
        assert_eq!(discovery.registry.class(thing).fields.len(), 1);
        assert_eq!(discovery.registry.class(thing).methods.len(), 1);
        assert_eq!(discovery.report.skipped_fields, 1);
        assert_eq!(discovery.report.skipped_methods, 1);
    }

    #[test]
    fn test_interface_members_are_flattened() {
        let ops = FixtureOps::new(RuntimeKind::Mono)
            .assembly("Game")
            .class("Game", "IDamageable", None)
            .field("armor", "System.Int32", 0x10)
            .method(FixtureMethod::new("Damage", "System.Void").param("amount", "System.Int32"))
            .class("Game", "Enemy", Some("Object"))
            .field("hp", "System.Int32", 0x18)
            .method(FixtureMethod::new("Think", "System.Void"))
            .implements("IDamageable");
        let discovery = discover(&ops);
        let reg = &discovery.registry;
        let enemy = reg.find_class_anywhere("Game", "Enemy").unwrap();

        let fields: Vec<_> = reg.class(enemy).fields.iter().map(|&f| reg.field(f).name.as_str()).collect();
        assert_eq!(fields, ["hp", "armor"]);
        let damage = reg.find_method(enemy, "Damage", &["System.Int32"]).unwrap();
        assert!(damage.is_exact());
        assert_eq!(reg.method(damage.id).class, enemy);
    }

    #[test]
    fn test_static_classification_per_runtime() {
        let build = |kind| {
            FixtureOps::new(kind)
                .assembly("Game")
                .class("Game", "Config", None)
                .static_field("count", "System.Int32", &3i32.to_ne_bytes())
                .field("first", "System.Int32", 0x10)
        };

        for kind in [RuntimeKind::Mono, RuntimeKind::Il2Cpp] {
            let discovery = discover(&build(kind));
            let reg = &discovery.registry;
            let class = reg.find_class_anywhere("Game", "Config").unwrap();
            let count = reg.field(reg.find_field(class, "count").unwrap());
            let first = reg.field(reg.find_field(class, "first").unwrap());
            assert_eq!(count.offset, 0, "{kind}");
            assert!(count.is_static, "{kind}");
            assert!(!first.is_static, "{kind}");
        }
    }

    #[test]
    fn test_method_flags_are_normalized() {
        let ops = FixtureOps::new(RuntimeKind::Il2Cpp)
            .assembly("Game")
            .class("Game", "Thing", None)
            .method(FixtureMethod::new("Make", "Game.Thing").flags(0x0096))
            .method(FixtureMethod::new("Update", "System.Void").flags(0x01C6));
        let discovery = discover(&ops);
        let reg = &discovery.registry;
        let thing = reg.find_class_anywhere("*", "Thing").unwrap();
        let make = reg.method(reg.find_method(thing, "Make", &[]).unwrap().id);
        let update = reg.method(reg.find_method(thing, "Update", &[]).unwrap().id);
        assert!(make.is_static && !make.is_virtual());
        assert!(!update.is_static && update.is_virtual());
        assert_eq!(update.flags.bits(), 0x01C6);
    }

    #[test]
    fn test_empty_runtime() {
        let discovery = discover(&FixtureOps::new(RuntimeKind::Mono));
        assert_eq!(discovery.report, WalkReport::default());
        assert_eq!(discovery.registry.assembly_count(), 0);
    }
}
