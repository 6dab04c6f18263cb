//! Managed value and object header layouts
//!
//! Value types mirror the UnityEngine structs byte for byte so they can be
//! read from and written to field storage directly. Object headers describe
//! the fixed prefix every managed reference type carries.

/// `UnityEngine.Vector2`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

/// `UnityEngine.Vector3`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// `UnityEngine.Vector4`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct Vector4 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

/// `UnityEngine.Quaternion`
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(C)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

/// `UnityEngine.Color`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

/// `UnityEngine.Rect`
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// `UnityEngine.Matrix4x4` (column-major, as Unity stores it)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[repr(C)]
pub struct Matrix4x4 {
    pub m: [[f32; 4]; 4],
}

/// Prefix shared by every managed object
///
/// The first word is the class (IL2Cpp) or v-table (Mono) pointer, the second
/// the monitor used for `lock`.
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct ObjectHeader {
    pub klass: usize,
    pub monitor: usize,
}

/// `System.String` header; UTF-16 code units follow `length`
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct StringHeader {
    pub object: ObjectHeader,
    pub length: i32,
}

/// `T[]` header; elements follow `max_length` with no extra padding
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct ArrayHeader {
    pub object: ObjectHeader,
    pub bounds: usize,
    pub max_length: usize,
}

/// `System.Collections.Generic.List<T>` header
#[derive(Debug, Clone, Copy, Default)]
#[repr(C)]
pub struct ListHeader {
    pub object: ObjectHeader,
    pub items: usize,
    pub size: i32,
    pub version: i32,
}

/// Byte offset of the first UTF-16 code unit of a managed string
pub const STRING_CHARS_OFFSET: usize = std::mem::offset_of!(StringHeader, length) + 4;

/// Byte offset of the first element of a managed array
pub const ARRAY_DATA_OFFSET: usize = std::mem::size_of::<ArrayHeader>();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_type_sizes() {
        assert_eq!(std::mem::size_of::<Vector2>(), 8);
        assert_eq!(std::mem::size_of::<Vector3>(), 12);
        assert_eq!(std::mem::size_of::<Quaternion>(), 16);
        assert_eq!(std::mem::size_of::<Matrix4x4>(), 64);
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_header_offsets_64() {
        assert_eq!(STRING_CHARS_OFFSET, 0x14);
        assert_eq!(ARRAY_DATA_OFFSET, 0x20);
        assert_eq!(std::mem::offset_of!(ListHeader, items), 0x10);
        assert_eq!(std::mem::offset_of!(ListHeader, size), 0x18);
    }
}
