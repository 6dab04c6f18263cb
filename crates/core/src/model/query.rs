//! Name-based lookups over the registry

use super::{AssemblyId, ClassId, FieldId, MethodId, Registry};
use crate::error::RuntimeError;

/// Matches any namespace, parent or parameter type
pub const WILDCARD: &str = "*";

/// How confidently a method lookup matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Name, arity and every non-wildcard parameter type matched
    Exact,
    /// Only the name matched; first declared overload was chosen
    NameOnly,
}

/// Result of [`Registry::find_method`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodMatch {
    pub id: MethodId,
    pub resolution: Resolution,
}

impl MethodMatch {
    pub fn is_exact(&self) -> bool {
        self.resolution == Resolution::Exact
    }
}

fn matches_filter(filter: &str, value: &str) -> bool {
    filter == WILDCARD || filter == value
}

fn param_matches(requested: &str, actual: &str) -> bool {
    requested.is_empty() || requested == WILDCARD || requested == actual
}

impl Registry {
    /// First assembly with this name (e.g. `"Assembly-CSharp.dll"`)
    pub fn find_assembly(&self, name: &str) -> Option<AssemblyId> {
        self.assemblies().find(|(_, a)| a.name == name).map(|(id, _)| id)
    }

    /// First class in the assembly matching name, namespace and parent name
    ///
    /// `namespace` and `parent` accept [`WILDCARD`].
    pub fn find_class(
        &self,
        assembly: AssemblyId,
        name: &str,
        namespace: &str,
        parent: &str,
    ) -> Option<ClassId> {
        self.assembly(assembly).classes.iter().copied().find(|&id| {
            let class = self.class(id);
            class.name == name
                && matches_filter(namespace, &class.namespace)
                && matches_filter(parent, class.parent.as_deref().unwrap_or(""))
        })
    }

    /// First class with this namespace and name across all assemblies
    pub fn find_class_anywhere(&self, namespace: &str, name: &str) -> Option<ClassId> {
        self.classes()
            .find(|(_, c)| c.name == name && matches_filter(namespace, &c.namespace))
            .map(|(id, _)| id)
    }

    /// Resolve a class's parent by name
    ///
    /// Looks in the declaring assembly first, then everywhere.
    pub fn parent_of(&self, class: ClassId) -> Option<ClassId> {
        let child = self.class(class);
        let parent = child.parent.as_deref()?;
        self.find_class(child.assembly, parent, WILDCARD, WILDCARD)
            .filter(|&id| id != class)
            .or_else(|| {
                self.find_class_anywhere(WILDCARD, parent)
                    .filter(|&id| id != class)
            })
    }

    /// First field of the class with this name
    pub fn find_field(&self, class: ClassId, name: &str) -> Option<FieldId> {
        self.class(class)
            .fields
            .iter()
            .copied()
            .find(|&id| self.field(id).name == name)
    }

    /// Overload resolution by name and parameter type names
    ///
    /// Pass 1 picks the first method with this name whose arity equals
    /// `param_types.len()` and whose parameter types match in order, where an
    /// empty or `"*"` entry matches anything. If none qualifies, pass 2 picks
    /// the first method with this name regardless of parameters and reports
    /// [`Resolution::NameOnly`].
    pub fn find_method(
        &self,
        class: ClassId,
        name: &str,
        param_types: &[&str],
    ) -> Option<MethodMatch> {
        if let Some(id) = self.exact_method(class, name, param_types) {
            return Some(MethodMatch {
                id,
                resolution: Resolution::Exact,
            });
        }

        let id = self
            .class(class)
            .methods
            .iter()
            .copied()
            .find(|&id| self.method(id).name == name)?;
        tracing::debug!(
            "{}.{}({}) matched by name only",
            self.class(class).name,
            name,
            param_types.join(", ")
        );
        Some(MethodMatch {
            id,
            resolution: Resolution::NameOnly,
        })
    }

    /// Overload resolution without the name-only fallback
    pub fn find_method_strict(
        &self,
        class: ClassId,
        name: &str,
        param_types: &[&str],
    ) -> Result<MethodId, RuntimeError> {
        if let Some(id) = self.exact_method(class, name, param_types) {
            return Ok(id);
        }

        let owner = self.class(class);
        let has_name = owner.methods.iter().any(|&id| self.method(id).name == name);
        if has_name {
            Err(RuntimeError::NoExactOverload {
                class: owner.full_name(),
                method: name.to_string(),
                params: param_types.join(", "),
            })
        } else {
            Err(RuntimeError::MethodNotFound {
                class: owner.full_name(),
                method: name.to_string(),
            })
        }
    }

    fn exact_method(&self, class: ClassId, name: &str, param_types: &[&str]) -> Option<MethodId> {
        self.class(class).methods.iter().copied().find(|&id| {
            let method = self.method(id);
            method.name == name
                && method.params.len() == param_types.len()
                && method
                    .params
                    .iter()
                    .zip(param_types)
                    .all(|(param, requested)| param_matches(requested, &param.ty.name))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MethodFlags, Param, TypeInfo};
    use uniresolve_sdk::Handle;

    fn h(addr: usize) -> Handle {
        Handle::from_addr(addr).unwrap()
    }

    fn param(name: &str, ty: &str) -> Param {
        Param {
            name: name.into(),
            ty: TypeInfo::new(ty),
        }
    }

    /// `Foo.foo(int)` declared before `Foo.foo(string)`, plus `Bar : Foo`
    fn overloads() -> (Registry, ClassId, MethodId, MethodId) {
        let mut reg = Registry::new();
        let asm = reg.add_assembly("Game.dll".into(), String::new(), h(0x1000));
        let foo = reg.add_class(asm, "Foo".into(), "Game".into(), Some("Object".into()), h(0x2000));
        let by_int = reg.add_method(
            foo,
            "foo".into(),
            TypeInfo::new("System.Void"),
            vec![param("value", "System.Int32")],
            MethodFlags::empty(),
            h(0x3000),
            None,
        );
        let by_string = reg.add_method(
            foo,
            "foo".into(),
            TypeInfo::new("System.Void"),
            vec![param("value", "System.String")],
            MethodFlags::empty(),
            h(0x3001),
            None,
        );
        reg.add_class(asm, "Bar".into(), "Game".into(), Some("Foo".into()), h(0x2001));
        (reg, foo, by_int, by_string)
    }

    #[test]
    fn test_exact_overload_pick() {
        let (reg, foo, by_int, by_string) = overloads();
        let m = reg.find_method(foo, "foo", &["System.String"]).unwrap();
        assert_eq!(m.id, by_string);
        assert!(m.is_exact());
        let m = reg.find_method(foo, "foo", &["System.Int32"]).unwrap();
        assert_eq!(m.id, by_int);
    }

    #[test]
    fn test_wildcard_picks_first_declared() {
        let (reg, foo, by_int, _) = overloads();
        let m = reg.find_method(foo, "foo", &["*"]).unwrap();
        assert_eq!(m.id, by_int);
        assert_eq!(m.resolution, Resolution::Exact);
        let m = reg.find_method(foo, "foo", &[""]).unwrap();
        assert_eq!(m.id, by_int);
    }

    #[test]
    fn test_arity_mismatch_falls_back_to_first_by_name() {
        let (reg, foo, by_int, _) = overloads();
        let m = reg.find_method(foo, "foo", &[]).unwrap();
        assert_eq!(m.id, by_int);
        assert_eq!(m.resolution, Resolution::NameOnly);

        let m = reg
            .find_method(foo, "foo", &["System.Int32", "System.Int32"])
            .unwrap();
        assert_eq!(m.resolution, Resolution::NameOnly);

        let m = reg.find_method(foo, "foo", &["System.Single"]).unwrap();
        assert_eq!(m.id, by_int);
        assert!(!m.is_exact());
    }

    #[test]
    fn test_unknown_method() {
        let (reg, foo, _, _) = overloads();
        assert!(reg.find_method(foo, "bar", &[]).is_none());
    }

    #[test]
    fn test_strict_lookup_does_not_fall_back() {
        let (reg, foo, _, by_string) = overloads();
        assert_eq!(
            reg.find_method_strict(foo, "foo", &["System.String"]).unwrap(),
            by_string
        );
        assert!(matches!(
            reg.find_method_strict(foo, "foo", &[]),
            Err(RuntimeError::NoExactOverload { .. })
        ));
        assert!(matches!(
            reg.find_method_strict(foo, "nope", &[]),
            Err(RuntimeError::MethodNotFound { .. })
        ));
    }

    #[test]
    fn test_class_filters_and_parent() {
        let (reg, foo, _, _) = overloads();
        let asm = reg.find_assembly("Game.dll").unwrap();
        assert!(reg.find_assembly("Missing.dll").is_none());

        let bar = reg.find_class(asm, "Bar", "*", "*").unwrap();
        assert_eq!(reg.find_class(asm, "Bar", "Game", "Foo"), Some(bar));
        assert_eq!(reg.find_class(asm, "Bar", "Other", "*"), None);
        assert_eq!(reg.find_class(asm, "Bar", "*", "Object"), None);
        assert_eq!(reg.parent_of(bar), Some(foo));
        // "Object" is not part of this registry
        assert_eq!(reg.parent_of(foo), None);
        assert_eq!(reg.find_class_anywhere("Game", "Foo"), Some(foo));
    }
}
