//! Type-erased field values

use std::ffi::c_void;
use std::fmt;
use std::mem::size_of;

use serde::Serialize;
use uniresolve_sdk::{Color, Matrix4x4, Quaternion, Rect, Vector2, Vector3, Vector4};

use crate::context::RuntimeContext;
use crate::error::{RuntimeError, RuntimeResult};
use crate::model::FieldId;

use super::objects::read_string;

/// Storage class of a managed type, derived from its metadata name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ValueKind {
    Bool,
    I8,
    U8,
    I16,
    U16,
    Char,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    String,
    Vector2,
    Vector3,
    Vector4,
    Quaternion,
    Color,
    Rect,
    Matrix4x4,
    /// `System.Object` or an array reference
    Reference,
    /// Anything else, including other classes and structs; layout unknown
    Unknown,
}

impl ValueKind {
    pub fn from_type_name(name: &str) -> Self {
        match name {
            "System.Boolean" => Self::Bool,
            "System.SByte" => Self::I8,
            "System.Byte" => Self::U8,
            "System.Int16" => Self::I16,
            "System.UInt16" => Self::U16,
            "System.Char" => Self::Char,
            "System.Int32" => Self::I32,
            "System.UInt32" => Self::U32,
            "System.Int64" => Self::I64,
            "System.UInt64" => Self::U64,
            "System.Single" => Self::F32,
            "System.Double" => Self::F64,
            "System.String" => Self::String,
            "UnityEngine.Vector2" => Self::Vector2,
            "UnityEngine.Vector3" => Self::Vector3,
            "UnityEngine.Vector4" => Self::Vector4,
            "UnityEngine.Quaternion" => Self::Quaternion,
            "UnityEngine.Color" => Self::Color,
            "UnityEngine.Rect" => Self::Rect,
            "UnityEngine.Matrix4x4" => Self::Matrix4x4,
            "System.Object" => Self::Reference,
            other if other.ends_with("[]") => Self::Reference,
            _ => Self::Unknown,
        }
    }

    /// Bytes the value occupies in field storage
    pub fn size(self) -> Option<usize> {
        Some(match self {
            Self::Bool | Self::I8 | Self::U8 => 1,
            Self::I16 | Self::U16 | Self::Char => 2,
            Self::I32 | Self::U32 | Self::F32 => 4,
            Self::I64 | Self::U64 | Self::F64 => 8,
            Self::String | Self::Reference => size_of::<usize>(),
            Self::Vector2 => size_of::<Vector2>(),
            Self::Vector3 => size_of::<Vector3>(),
            Self::Vector4 => size_of::<Vector4>(),
            Self::Quaternion => size_of::<Quaternion>(),
            Self::Color => size_of::<Color>(),
            Self::Rect => size_of::<Rect>(),
            Self::Matrix4x4 => size_of::<Matrix4x4>(),
            Self::Unknown => return None,
        })
    }

    /// Whether the field holds an object pointer
    pub fn is_reference(self) -> bool {
        matches!(self, Self::String | Self::Reference)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A field value of any supported kind
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Bool(bool),
    I8(i8),
    U8(u8),
    I16(i16),
    U16(u16),
    Char(u16),
    I32(i32),
    U32(u32),
    I64(i64),
    U64(u64),
    F32(f32),
    F64(f64),
    /// `None` for a null string reference
    String(Option<String>),
    Vector2(Vector2),
    Vector3(Vector3),
    Vector4(Vector4),
    Quaternion(Quaternion),
    Color(Color),
    Rect(Rect),
    Matrix4x4(Matrix4x4),
    /// Raw object pointer, 0 for null
    Reference(usize),
}

impl FieldValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Bool(_) => ValueKind::Bool,
            Self::I8(_) => ValueKind::I8,
            Self::U8(_) => ValueKind::U8,
            Self::I16(_) => ValueKind::I16,
            Self::U16(_) => ValueKind::U16,
            Self::Char(_) => ValueKind::Char,
            Self::I32(_) => ValueKind::I32,
            Self::U32(_) => ValueKind::U32,
            Self::I64(_) => ValueKind::I64,
            Self::U64(_) => ValueKind::U64,
            Self::F32(_) => ValueKind::F32,
            Self::F64(_) => ValueKind::F64,
            Self::String(_) => ValueKind::String,
            Self::Vector2(_) => ValueKind::Vector2,
            Self::Vector3(_) => ValueKind::Vector3,
            Self::Vector4(_) => ValueKind::Vector4,
            Self::Quaternion(_) => ValueKind::Quaternion,
            Self::Color(_) => ValueKind::Color,
            Self::Rect(_) => ValueKind::Rect,
            Self::Matrix4x4(_) => ValueKind::Matrix4x4,
            Self::Reference(_) => ValueKind::Reference,
        }
    }
}

impl RuntimeContext {
    /// Instance or static read, depending on the field
    fn load<T: Copy>(&self, field: FieldId, instance: *mut c_void) -> RuntimeResult<T> {
        if self.registry().field(field).is_static {
            self.read_static(field)
        } else {
            self.read_field(instance, field)
        }
    }

    fn store<T: Copy>(&self, field: FieldId, instance: *mut c_void, value: T) -> RuntimeResult<()> {
        if self.registry().field(field).is_static {
            self.write_static(field, value)
        } else {
            self.write_field(instance, field, value)
        }
    }

    /// Read a field as a [`FieldValue`]; `instance` is ignored for statics
    pub fn read_value(&self, field: FieldId, instance: *mut c_void) -> RuntimeResult<FieldValue> {
        let f = self.registry().field(field);
        let value = match ValueKind::from_type_name(&f.ty.name) {
            ValueKind::Bool => FieldValue::Bool(self.load::<u8>(field, instance)? != 0),
            ValueKind::I8 => FieldValue::I8(self.load(field, instance)?),
            ValueKind::U8 => FieldValue::U8(self.load(field, instance)?),
            ValueKind::I16 => FieldValue::I16(self.load(field, instance)?),
            ValueKind::U16 => FieldValue::U16(self.load(field, instance)?),
            ValueKind::Char => FieldValue::Char(self.load(field, instance)?),
            ValueKind::I32 => FieldValue::I32(self.load(field, instance)?),
            ValueKind::U32 => FieldValue::U32(self.load(field, instance)?),
            ValueKind::I64 => FieldValue::I64(self.load(field, instance)?),
            ValueKind::U64 => FieldValue::U64(self.load(field, instance)?),
            ValueKind::F32 => FieldValue::F32(self.load(field, instance)?),
            ValueKind::F64 => FieldValue::F64(self.load(field, instance)?),
            ValueKind::String => {
                let ptr = self.load::<usize>(field, instance)?;
                if ptr == 0 {
                    FieldValue::String(None)
                } else {
                    FieldValue::String(Some(read_string(ptr as *mut c_void)?))
                }
            }
            ValueKind::Vector2 => FieldValue::Vector2(self.load(field, instance)?),
            ValueKind::Vector3 => FieldValue::Vector3(self.load(field, instance)?),
            ValueKind::Vector4 => FieldValue::Vector4(self.load(field, instance)?),
            ValueKind::Quaternion => FieldValue::Quaternion(self.load(field, instance)?),
            ValueKind::Color => FieldValue::Color(self.load(field, instance)?),
            ValueKind::Rect => FieldValue::Rect(self.load(field, instance)?),
            ValueKind::Matrix4x4 => FieldValue::Matrix4x4(self.load(field, instance)?),
            ValueKind::Reference => FieldValue::Reference(self.load(field, instance)?),
            ValueKind::Unknown => {
                return Err(RuntimeError::UnsupportedKind {
                    field: f.name.clone(),
                    type_name: f.ty.name.clone(),
                })
            }
        };
        Ok(value)
    }

    /// Write a [`FieldValue`]; its kind must match the field's type
    ///
    /// Strings are allocated in the runtime before the reference is stored.
    pub fn write_value(
        &self,
        field: FieldId,
        instance: *mut c_void,
        value: FieldValue,
    ) -> RuntimeResult<()> {
        let f = self.registry().field(field);
        let expected = ValueKind::from_type_name(&f.ty.name);
        if expected == ValueKind::Unknown {
            return Err(RuntimeError::UnsupportedKind {
                field: f.name.clone(),
                type_name: f.ty.name.clone(),
            });
        }
        if value.kind() != expected {
            return Err(RuntimeError::TypeMismatch {
                field: f.name.clone(),
                expected: expected.to_string(),
                actual: value.kind().to_string(),
            });
        }

        match value {
            FieldValue::Bool(v) => self.store(field, instance, v as u8),
            FieldValue::I8(v) => self.store(field, instance, v),
            FieldValue::U8(v) => self.store(field, instance, v),
            FieldValue::I16(v) => self.store(field, instance, v),
            FieldValue::U16(v) | FieldValue::Char(v) => self.store(field, instance, v),
            FieldValue::I32(v) => self.store(field, instance, v),
            FieldValue::U32(v) => self.store(field, instance, v),
            FieldValue::I64(v) => self.store(field, instance, v),
            FieldValue::U64(v) => self.store(field, instance, v),
            FieldValue::F32(v) => self.store(field, instance, v),
            FieldValue::F64(v) => self.store(field, instance, v),
            FieldValue::String(None) => self.store(field, instance, 0usize),
            FieldValue::String(Some(text)) => {
                let object = self.new_string(&text)?;
                self.store(field, instance, object.addr())
            }
            FieldValue::Vector2(v) => self.store(field, instance, v),
            FieldValue::Vector3(v) => self.store(field, instance, v),
            FieldValue::Vector4(v) => self.store(field, instance, v),
            FieldValue::Quaternion(v) => self.store(field, instance, v),
            FieldValue::Color(v) => self.store(field, instance, v),
            FieldValue::Rect(v) => self.store(field, instance, v),
            FieldValue::Matrix4x4(v) => self.store(field, instance, v),
            FieldValue::Reference(v) => self.store(field, instance, v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{self, FixtureOps, PlayerObject};
    use uniresolve_sdk::RuntimeKind;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ValueKind::from_type_name("System.Int32"), ValueKind::I32);
        assert_eq!(ValueKind::from_type_name("UnityEngine.Vector3"), ValueKind::Vector3);
        assert_eq!(ValueKind::from_type_name("System.Byte[]"), ValueKind::Reference);
        assert_eq!(ValueKind::from_type_name("System.Object"), ValueKind::Reference);
        assert_eq!(ValueKind::from_type_name("Game.Player"), ValueKind::Unknown);
        assert!(!ValueKind::from_type_name("Game.Player").is_reference());
        assert_eq!(ValueKind::Vector3.size(), Some(12));
        assert_eq!(ValueKind::Matrix4x4.size(), Some(64));
        assert_eq!(ValueKind::Unknown.size(), None);
        assert!(ValueKind::String.is_reference());
    }

    #[test]
    fn test_instance_values() {
        let ctx = testing::context(FixtureOps::game());
        let player = ctx.registry().find_class_anywhere("Game", "Player").unwrap();
        let field = |name| ctx.registry().find_field(player, name).unwrap();
        let mut object = PlayerObject::default();
        let ptr = object.as_ptr();

        ctx.write_value(field("score"), ptr, FieldValue::I32(-7)).unwrap();
        ctx.write_value(field("alive"), ptr, FieldValue::Bool(true)).unwrap();
        ctx.write_value(field("position"), ptr, FieldValue::Vector3(Vector3::new(1.0, 0.0, -1.0)))
            .unwrap();

        assert_eq!(object.score, -7);
        assert!(object.alive);
        assert_eq!(ctx.read_value(field("score"), ptr).unwrap(), FieldValue::I32(-7));
        assert_eq!(
            ctx.read_value(field("position"), ptr).unwrap(),
            FieldValue::Vector3(Vector3::new(1.0, 0.0, -1.0))
        );
    }

    #[test]
    fn test_kind_mismatch() {
        let ctx = testing::context(FixtureOps::game());
        let player = ctx.registry().find_class_anywhere("Game", "Player").unwrap();
        let score = ctx.registry().find_field(player, "score").unwrap();
        let mut object = PlayerObject::default();

        let err = ctx
            .write_value(score, object.as_ptr(), FieldValue::F32(1.0))
            .unwrap_err();
        assert!(matches!(err, RuntimeError::TypeMismatch { .. }));
        assert_eq!(object.score, 0);
    }

    #[test]
    fn test_static_values_both_runtimes() {
        for kind in [RuntimeKind::Mono, RuntimeKind::Il2Cpp] {
            let ctx = testing::context(FixtureOps::game_for(kind));
            let player = ctx.registry().find_class_anywhere("Game", "Player").unwrap();
            let instances = ctx.registry().find_field(player, "instances").unwrap();

            assert_eq!(
                ctx.read_value(instances, std::ptr::null_mut()).unwrap(),
                FieldValue::I32(3)
            );
            ctx.write_value(instances, std::ptr::null_mut(), FieldValue::I32(i32::MIN))
                .unwrap();
            assert_eq!(ctx.read_static::<i32>(instances).unwrap(), i32::MIN);
            assert!(matches!(
                ctx.read_field::<i32>(std::ptr::null_mut(), instances),
                Err(RuntimeError::IsStatic(_))
            ));
        }
    }

    #[test]
    fn test_string_field_round_trip() {
        let ops = FixtureOps::new(RuntimeKind::Mono)
            .assembly("Game")
            .class("Game", "Label", None)
            .field("text", "System.String", 0x10);
        let ctx = testing::context(ops);
        let label = ctx.registry().find_class_anywhere("Game", "Label").unwrap();
        let text = ctx.registry().find_field(label, "text").unwrap();

        let mut object = [0usize; 4];
        let ptr = object.as_mut_ptr() as *mut c_void;
        assert_eq!(ctx.read_value(text, ptr).unwrap(), FieldValue::String(None));
        ctx.write_value(text, ptr, FieldValue::String(Some("héllo".into())))
            .unwrap();
        assert_ne!(object[2], 0);
        assert_eq!(
            ctx.read_value(text, ptr).unwrap(),
            FieldValue::String(Some("héllo".into()))
        );
    }
}
