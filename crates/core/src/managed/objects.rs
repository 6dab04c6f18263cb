//! Managed string, array and list decoding

use std::ffi::c_void;
use std::mem::{offset_of, size_of};

use uniresolve_sdk::{ArrayHeader, ListHeader, StringHeader, ARRAY_DATA_OFFSET, STRING_CHARS_OFFSET};

use crate::error::AccessError;
use crate::memory::guard;

/// Longest string decoded, in UTF-16 code units
pub const MAX_STRING_LEN: usize = 1 << 20;

/// Most elements copied out of one array or list
pub const MAX_ELEMENTS: usize = 1 << 20;

fn base_of(ptr: *mut c_void) -> Result<usize, AccessError> {
    if ptr.is_null() {
        Err(AccessError::NullPointer)
    } else {
        Ok(ptr as usize)
    }
}

fn at(base: usize, offset: usize) -> Result<usize, AccessError> {
    base.checked_add(offset).ok_or(AccessError::Overflow { base, offset })
}

fn checked_len(address: usize, length: i64, cap: usize) -> Result<usize, AccessError> {
    if length < 0 || length as u64 > cap as u64 {
        return Err(AccessError::InvalidLength { address, length });
    }
    Ok(length as usize)
}

/// Decode a `System.String`
///
/// Unpaired surrogates are replaced with U+FFFD.
pub fn read_string(ptr: *mut c_void) -> Result<String, AccessError> {
    let base = base_of(ptr)?;
    let length_at = at(base, offset_of!(StringHeader, length))?;
    let length = guard::try_read::<i32>(length_at)?;
    let length = checked_len(length_at, length as i64, MAX_STRING_LEN)?;

    let bytes = guard::try_read_bytes(at(base, STRING_CHARS_OFFSET)?, length * 2)?;
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_ne_bytes([pair[0], pair[1]]))
        .collect();
    Ok(String::from_utf16_lossy(&units))
}

/// Copy `count` elements of `T` starting at `address`
fn read_elements<T: Copy>(address: usize, count: usize) -> Result<Vec<T>, AccessError> {
    let stride = size_of::<T>();
    if stride == 0 || count == 0 {
        return Ok(Vec::new());
    }
    let len = count.checked_mul(stride).ok_or(AccessError::Overflow {
        base: address,
        offset: count,
    })?;
    let bytes = guard::try_read_bytes(address, len)?;
    Ok(bytes
        .chunks_exact(stride)
        // SAFETY: each chunk is exactly `size_of::<T>()` initialized bytes
        .map(|chunk| unsafe { std::ptr::read_unaligned(chunk.as_ptr() as *const T) })
        .collect())
}

/// Copy the elements of a `T[]`
///
/// `T` is the element's in-array representation: the value itself for value
/// types, a pointer-sized object reference otherwise.
pub fn read_array<T: Copy>(ptr: *mut c_void) -> Result<Vec<T>, AccessError> {
    let base = base_of(ptr)?;
    let length_at = at(base, offset_of!(ArrayHeader, max_length))?;
    let length = guard::try_read::<usize>(length_at)?;
    let length = checked_len(length_at, length.min(i64::MAX as usize) as i64, MAX_ELEMENTS)?;
    read_elements(at(base, ARRAY_DATA_OFFSET)?, length)
}

/// Copy the live elements of a `List<T>`
pub fn read_list<T: Copy>(ptr: *mut c_void) -> Result<Vec<T>, AccessError> {
    let base = base_of(ptr)?;
    let header = guard::try_read::<ListHeader>(base)?;
    let size_at = at(base, offset_of!(ListHeader, size))?;
    let size = checked_len(size_at, header.size as i64, MAX_ELEMENTS)?;
    if size == 0 {
        return Ok(Vec::new());
    }

    let items = header.items as *mut c_void;
    let items_base = base_of(items)?;
    let capacity = guard::try_read::<usize>(at(items_base, offset_of!(ArrayHeader, max_length))?)?;
    if size > capacity {
        return Err(AccessError::InvalidLength {
            address: size_at,
            length: size as i64,
        });
    }
    read_elements(at(items_base, ARRAY_DATA_OFFSET)?, size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uniresolve_sdk::{ObjectHeader, Vector3};

    /// Managed string image: header + UTF-16 payload
    fn string_image(text: &str) -> Vec<u64> {
        let units: Vec<u16> = text.encode_utf16().collect();
        let bytes = STRING_CHARS_OFFSET + units.len() * 2;
        let mut image = vec![0u64; bytes.div_ceil(8) + 1];
        let base = image.as_mut_ptr() as *mut u8;
        unsafe {
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
        image
    }

    fn array_image<T: Copy>(items: &[T]) -> Vec<u64> {
        let bytes = ARRAY_DATA_OFFSET + std::mem::size_of_val(items);
        let mut image = vec![0u64; bytes.div_ceil(8)];
        let base = image.as_mut_ptr() as *mut u8;
        unsafe {
            std::ptr::write_unaligned(
                base as *mut ArrayHeader,
                ArrayHeader {
                    object: ObjectHeader::default(),
                    bounds: 0,
                    max_length: items.len(),
                },
            );
            std::ptr::copy_nonoverlapping(
                items.as_ptr() as *const u8,
                base.add(ARRAY_DATA_OFFSET),
                std::mem::size_of_val(items),
            );
        }
        image
    }

    #[test]
    fn test_read_string() {
        let mut image = string_image("Player (Clone) ✓");
        let text = read_string(image.as_mut_ptr() as *mut c_void).unwrap();
        assert_eq!(text, "Player (Clone) ✓");

        let mut empty = string_image("");
        assert_eq!(read_string(empty.as_mut_ptr() as *mut c_void).unwrap(), "");
        assert_eq!(read_string(std::ptr::null_mut()), Err(AccessError::NullPointer));
    }

    #[test]
    fn test_corrupt_string_length() {
        let mut image = string_image("abc");
        let base = image.as_mut_ptr() as *mut u8;
        unsafe {
            std::ptr::write_unaligned(base.add(offset_of!(StringHeader, length)) as *mut i32, -5);
        }
        assert!(matches!(
            read_string(base as *mut c_void),
            Err(AccessError::InvalidLength { length: -5, .. })
        ));
    }

    #[test]
    fn test_read_array_and_list() {
        let values = [Vector3::new(1.0, 2.0, 3.0), Vector3::ZERO];
        let mut array = array_image(&values);
        let array_ptr = array.as_mut_ptr() as *mut c_void;
        assert_eq!(read_array::<Vector3>(array_ptr).unwrap(), values);

        let mut list = ListHeader {
            object: ObjectHeader::default(),
            items: array_ptr as usize,
            size: 1,
            version: 0,
        };
        let list_ptr = &mut list as *mut ListHeader as *mut c_void;
        assert_eq!(read_list::<Vector3>(list_ptr).unwrap(), &values[..1]);

        list.size = 3;
        assert!(matches!(
            read_list::<Vector3>(list_ptr),
            Err(AccessError::InvalidLength { length: 3, .. })
        ));
    }

    #[test]
    fn test_pointer_near_address_space_end() {
        let ptr = (usize::MAX - 4) as *mut c_void;
        assert!(matches!(read_string(ptr), Err(AccessError::Overflow { .. })));
        assert!(matches!(read_array::<i32>(ptr), Err(AccessError::Overflow { .. })));
        assert!(matches!(read_list::<i32>(ptr), Err(AccessError::Overflow { .. })));

        let mut list = ListHeader {
            object: ObjectHeader::default(),
            items: usize::MAX - 4,
            size: 1,
            version: 0,
        };
        let list_ptr = &mut list as *mut ListHeader as *mut c_void;
        assert!(matches!(read_list::<i32>(list_ptr), Err(AccessError::Overflow { .. })));
    }

    #[test]
    fn test_empty_array() {
        let mut array = array_image::<i32>(&[]);
        assert!(read_array::<i32>(array.as_mut_ptr() as *mut c_void).unwrap().is_empty());
    }
}
