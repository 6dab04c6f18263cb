//! Safe memory access layer
//!
//! Instance fields live at `object + offset`; no bounds checking against the
//! allocation is possible because object sizes are not known. Every access
//! goes through [`guard`] so a stale object pointer yields
//! [`AccessError::InvalidTarget`] instead of a crash.
//!
//! Static fields are never addressed directly. Their storage is reached
//! through the runtime (`*_field_static_get_value` / `*_set_value`), with
//! Mono additionally requiring the class v-table for the root domain.

mod field;
pub mod guard;

use std::ffi::c_void;
use std::mem::size_of;

use uniresolve_sdk::Handle;

use crate::context::RuntimeContext;
use crate::error::{AccessError, RuntimeError, RuntimeResult};
use crate::model::{Field, FieldId};

pub use field::ManagedField;

/// `base + offset`, rejecting null bases and negative offsets
pub fn field_address(base: *mut c_void, offset: i32) -> Result<usize, AccessError> {
    if base.is_null() {
        return Err(AccessError::NullPointer);
    }
    if offset < 0 {
        return Err(AccessError::NegativeOffset(offset));
    }
    (base as usize)
        .checked_add(offset as usize)
        .ok_or(AccessError::Overflow {
            base: base as usize,
            offset: offset as usize,
        })
}

/// Read a `T` at `base + offset`
pub fn read_at<T: Copy>(base: *mut c_void, offset: i32) -> Result<T, AccessError> {
    guard::try_read(field_address(base, offset)?)
}

/// Write a `T` at `base + offset`
pub fn write_at<T: Copy>(base: *mut c_void, offset: i32, value: T) -> Result<(), AccessError> {
    guard::try_write(field_address(base, offset)?, value)
}

/// 8-byte aligned scratch buffer large enough for `T` and the field's own size
fn static_buffer<T>(field: &Field) -> Vec<u64> {
    let declared = field.ty.size.unwrap_or(0).max(0) as usize;
    let bytes = size_of::<T>().max(declared).max(size_of::<usize>());
    vec![0u64; bytes.div_ceil(8)]
}

impl RuntimeContext {
    /// Read an instance field of `instance`
    pub fn read_field<T: Copy>(&self, instance: *mut c_void, field: FieldId) -> RuntimeResult<T> {
        let f = self.registry().field(field);
        if f.is_static {
            return Err(RuntimeError::IsStatic(f.name.clone()));
        }
        Ok(read_at(instance, f.offset)?)
    }

    /// Write an instance field of `instance`
    pub fn write_field<T: Copy>(
        &self,
        instance: *mut c_void,
        field: FieldId,
        value: T,
    ) -> RuntimeResult<()> {
        let f = self.registry().field(field);
        if f.is_static {
            return Err(RuntimeError::IsStatic(f.name.clone()));
        }
        Ok(write_at(instance, f.offset, value)?)
    }

    /// Read a static field through the runtime
    pub fn read_static<T: Copy>(&self, field: FieldId) -> RuntimeResult<T> {
        let f = self.registry().field(field);
        if !f.is_static {
            return Err(RuntimeError::NotStatic(f.name.clone()));
        }
        self.attach_thread()?;
        let vtable = self.static_vtable(field)?;

        let mut buf = static_buffer::<T>(f);
        unsafe {
            self.ops()
                .static_get(f.handle, vtable, buf.as_mut_ptr() as *mut c_void)?;
            Ok(std::ptr::read_unaligned(buf.as_ptr() as *const T))
        }
    }

    /// Write a static field through the runtime
    pub fn write_static<T: Copy>(&self, field: FieldId, value: T) -> RuntimeResult<()> {
        let f = self.registry().field(field);
        if !f.is_static {
            return Err(RuntimeError::NotStatic(f.name.clone()));
        }
        self.attach_thread()?;
        let vtable = self.static_vtable(field)?;

        let mut buf = static_buffer::<T>(f);
        unsafe {
            std::ptr::write_unaligned(buf.as_mut_ptr() as *mut T, value);
            self.ops()
                .static_set(f.handle, vtable, buf.as_mut_ptr() as *mut c_void)
        }
    }

    /// Class v-table for static storage, memoized per field
    fn static_vtable(&self, field: FieldId) -> RuntimeResult<Option<Handle>> {
        let f = self.registry().field(field);
        if let Some(vtable) = f.vtable.get() {
            return Ok(*vtable);
        }
        let class = self.registry().class(f.class);
        let vtable = self.ops().class_vtable(class.handle)?;
        tracing::debug!("Static storage for {}.{}: {:?}", class.name, f.name, vtable);
        Ok(*f.vtable.get_or_init(|| vtable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_address_rejects_bad_input() {
        let mut slot = 0u64;
        let base = &mut slot as *mut u64 as *mut c_void;
        assert_eq!(field_address(base, 4).unwrap(), base as usize + 4);
        assert_eq!(
            field_address(std::ptr::null_mut(), 8),
            Err(AccessError::NullPointer)
        );
        assert_eq!(field_address(base, -1), Err(AccessError::NegativeOffset(-1)));
    }

    #[test]
    fn test_read_write_at_offset() {
        #[repr(C)]
        struct Object {
            header: [usize; 2],
            health: i32,
            speed: f32,
        }
        let mut obj = Object {
            header: [0; 2],
            health: 100,
            speed: 1.0,
        };
        let base = &mut obj as *mut Object as *mut c_void;
        let health = std::mem::offset_of!(Object, health) as i32;
        let speed = std::mem::offset_of!(Object, speed) as i32;

        assert_eq!(read_at::<i32>(base, health).unwrap(), 100);
        write_at(base, health, i32::MIN).unwrap();
        write_at(base, speed, f32::INFINITY).unwrap();
        assert_eq!(obj.health, i32::MIN);
        assert_eq!(obj.speed, f32::INFINITY);
    }

    #[test]
    fn test_stale_object_is_invalid_target() {
        let err = read_at::<i32>(0x1 as *mut c_void, 0).unwrap_err();
        assert!(matches!(err, AccessError::InvalidTarget { .. }));
        let err = write_at::<i32>(0x1 as *mut c_void, 0x10, 5).unwrap_err();
        assert!(matches!(err, AccessError::InvalidTarget { address: 0x11, .. }));
    }
}
