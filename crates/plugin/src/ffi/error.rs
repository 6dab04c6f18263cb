//! Last-error slot for the C boundary
//!
//! Exports report failure as `false`; the message behind the most recent
//! failure is kept here until the next export succeeds or fails.

use std::ffi::c_char;

use parking_lot::Mutex;

static LAST_ERROR: Mutex<Option<String>> = Mutex::new(None);

pub(crate) fn set_last_error(message: impl Into<String>) {
    *LAST_ERROR.lock() = Some(message.into());
}

pub(crate) fn clear_last_error() {
    *LAST_ERROR.lock() = None;
}

/// Most recent error message, if any
pub fn last_error() -> Option<String> {
    LAST_ERROR.lock().clone()
}

/// Copy `message` into a C buffer, truncating and NUL-terminating
///
/// Returns the untruncated message length in bytes.
///
/// # Safety
/// - `buf` must be null or valid for `len` bytes of writes
pub(crate) unsafe fn write_c_string(message: &str, buf: *mut c_char, len: usize) -> usize {
    let bytes = message.as_bytes();
    if !buf.is_null() && len > 0 {
        let n = bytes.len().min(len - 1);
        std::ptr::copy_nonoverlapping(bytes.as_ptr(), buf as *mut u8, n);
        *buf.add(n) = 0;
    }
    bytes.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_c_string_truncates() {
        let mut buf = [0x7f as c_char; 6];
        let full = unsafe { write_c_string("hello world", buf.as_mut_ptr(), buf.len()) };
        assert_eq!(full, 11);
        let written: Vec<u8> = buf.iter().map(|&c| c as u8).collect();
        assert_eq!(&written, b"hello\0");

        assert_eq!(unsafe { write_c_string("abc", std::ptr::null_mut(), 0) }, 3);
    }
}
