//! Fault-isolated memory primitives
//!
//! A dangling object pointer must produce an error, never a crash. Reads and
//! writes therefore go through the kernel instead of dereferencing directly:
//!
//! - Linux: `process_vm_readv` / `process_vm_writev` against our own pid. The
//!   kernel copies through the page tables and reports `EFAULT` for unmapped
//!   or protected pages.
//! - Windows: `ReadProcessMemory` / `WriteProcessMemory` on the current
//!   process handle.
//! - Elsewhere, or when the syscall is filtered (seccomp `EPERM`, `ENOSYS`):
//!   the page protection of the whole range is queried first and the access
//!   is only performed when every page allows it.

use std::mem::{size_of, MaybeUninit};
use std::ops::Range;

use region::Protection;

use crate::error::AccessError;

fn invalid(address: usize, len: usize) -> AccessError {
    AccessError::InvalidTarget { address, len }
}

fn span(address: usize, len: usize) -> Result<Range<usize>, AccessError> {
    let end = address.checked_add(len).ok_or(AccessError::Overflow {
        base: address,
        offset: len,
    })?;
    Ok(address..end)
}

/// Whether every page in `[address, address + len)` is mapped with `required`
pub fn has_protection(address: usize, len: usize, required: Protection) -> bool {
    if address == 0 {
        return false;
    }
    let Ok(range) = span(address, len.max(1)) else {
        return false;
    };
    let Ok(regions) = region::query_range(range.start as *const u8, range.len()) else {
        return false;
    };

    let mut cursor = range.start;
    for region in regions {
        let Ok(region) = region else {
            return false;
        };
        let mapped = region.as_range();
        if mapped.start > cursor || !region.protection().contains(required) {
            return false;
        }
        cursor = mapped.end;
        if cursor >= range.end {
            return true;
        }
    }
    cursor >= range.end
}

/// Whether `[address, address + len)` is readable
pub fn is_readable(address: usize, len: usize) -> bool {
    has_protection(address, len, Protection::READ)
}

/// Whether `address` lies in executable memory
pub fn is_executable(address: usize) -> bool {
    has_protection(address, 1, Protection::EXECUTE)
}

/// Copy `buf.len()` bytes from `address`
pub fn read_into(address: usize, buf: &mut [u8]) -> Result<(), AccessError> {
    if buf.is_empty() {
        return Ok(());
    }
    if address == 0 {
        return Err(AccessError::NullPointer);
    }
    span(address, buf.len())?;
    platform::read(address, buf)
}

/// Copy `data` to `address`
pub fn write_from(address: usize, data: &[u8]) -> Result<(), AccessError> {
    if data.is_empty() {
        return Ok(());
    }
    if address == 0 {
        return Err(AccessError::NullPointer);
    }
    span(address, data.len())?;
    platform::write(address, data)
}

/// Read a `T` from `address` without requiring alignment
pub fn try_read<T: Copy>(address: usize) -> Result<T, AccessError> {
    let mut value = MaybeUninit::<T>::uninit();
    // SAFETY: the buffer covers exactly the storage of `value`
    let buf = unsafe {
        std::slice::from_raw_parts_mut(value.as_mut_ptr() as *mut u8, size_of::<T>())
    };
    read_into(address, buf)?;
    // SAFETY: every byte was initialized by the copy above; `T: Copy` values
    // read from field storage are plain data
    Ok(unsafe { value.assume_init() })
}

/// Write a `T` to `address` without requiring alignment
pub fn try_write<T: Copy>(address: usize, value: T) -> Result<(), AccessError> {
    // SAFETY: a `T` is readable as `size_of::<T>()` bytes
    let bytes =
        unsafe { std::slice::from_raw_parts(&value as *const T as *const u8, size_of::<T>()) };
    write_from(address, bytes)
}

/// Read `len` raw bytes
pub fn try_read_bytes(address: usize, len: usize) -> Result<Vec<u8>, AccessError> {
    let mut buf = vec![0u8; len];
    read_into(address, &mut buf)?;
    Ok(buf)
}

/// Copy after a page protection check
#[cfg_attr(windows, allow(dead_code))]
fn checked_read(address: usize, buf: &mut [u8]) -> Result<(), AccessError> {
    if !has_protection(address, buf.len(), Protection::READ) {
        return Err(invalid(address, buf.len()));
    }
    // SAFETY: every page in the range is mapped readable
    unsafe {
        std::ptr::copy_nonoverlapping(address as *const u8, buf.as_mut_ptr(), buf.len());
    }
    Ok(())
}

/// Store after a page protection check
#[cfg_attr(windows, allow(dead_code))]
fn checked_write(address: usize, data: &[u8]) -> Result<(), AccessError> {
    if !has_protection(address, data.len(), Protection::READ_WRITE) {
        return Err(invalid(address, data.len()));
    }
    // SAFETY: every page in the range is mapped writable
    unsafe {
        std::ptr::copy_nonoverlapping(data.as_ptr(), address as *mut u8, data.len());
    }
    Ok(())
}

#[cfg(target_os = "linux")]
mod platform {
    use std::io::{IoSlice, IoSliceMut};

    use nix::errno::Errno;
    use nix::sys::uio::{process_vm_readv, process_vm_writev, RemoteIoVec};
    use nix::unistd::Pid;

    use super::{checked_read, checked_write, invalid};
    use crate::error::AccessError;

    pub(super) fn read(address: usize, buf: &mut [u8]) -> Result<(), AccessError> {
        let len = buf.len();
        let remote = [RemoteIoVec { base: address, len }];
        let result = {
            let mut local = [IoSliceMut::new(&mut *buf)];
            process_vm_readv(Pid::this(), &mut local, &remote)
        };
        match result {
            Ok(n) if n == len => Ok(()),
            Ok(_) | Err(Errno::EFAULT) => Err(invalid(address, len)),
            Err(Errno::EPERM | Errno::ENOSYS) => checked_read(address, buf),
            Err(e) => {
                tracing::trace!("process_vm_readv({:#x}, {}): {}", address, len, e);
                Err(invalid(address, len))
            }
        }
    }

    pub(super) fn write(address: usize, data: &[u8]) -> Result<(), AccessError> {
        let len = data.len();
        let remote = [RemoteIoVec { base: address, len }];
        let local = [IoSlice::new(data)];
        match process_vm_writev(Pid::this(), &local, &remote) {
            Ok(n) if n == len => Ok(()),
            Ok(_) | Err(Errno::EFAULT) => Err(invalid(address, len)),
            Err(Errno::EPERM | Errno::ENOSYS) => checked_write(address, data),
            Err(e) => {
                tracing::trace!("process_vm_writev({:#x}, {}): {}", address, len, e);
                Err(invalid(address, len))
            }
        }
    }
}

#[cfg(windows)]
mod platform {
    use winapi::shared::minwindef::LPVOID;
    use winapi::um::memoryapi::{ReadProcessMemory, WriteProcessMemory};
    use winapi::um::processthreadsapi::GetCurrentProcess;

    use super::{has_protection, invalid};
    use crate::error::AccessError;
    use region::Protection;

    pub(super) fn read(address: usize, buf: &mut [u8]) -> Result<(), AccessError> {
        let mut read = 0usize;
        let ok = unsafe {
            ReadProcessMemory(
                GetCurrentProcess(),
                address as LPVOID,
                buf.as_mut_ptr() as LPVOID,
                buf.len(),
                &mut read,
            )
        };
        if ok != 0 && read == buf.len() {
            Ok(())
        } else {
            Err(invalid(address, buf.len()))
        }
    }

    pub(super) fn write(address: usize, data: &[u8]) -> Result<(), AccessError> {
        // WriteProcessMemory may silently lift protection on image pages
        if !has_protection(address, data.len(), Protection::READ_WRITE) {
            return Err(invalid(address, data.len()));
        }
        let mut written = 0usize;
        let ok = unsafe {
            WriteProcessMemory(
                GetCurrentProcess(),
                address as LPVOID,
                data.as_ptr() as LPVOID,
                data.len(),
                &mut written,
            )
        };
        if ok != 0 && written == data.len() {
            Ok(())
        } else {
            Err(invalid(address, data.len()))
        }
    }
}

#[cfg(not(any(target_os = "linux", windows)))]
mod platform {
    use super::{checked_read, checked_write};
    use crate::error::AccessError;

    pub(super) fn read(address: usize, buf: &mut [u8]) -> Result<(), AccessError> {
        checked_read(address, buf)
    }

    pub(super) fn write(address: usize, data: &[u8]) -> Result<(), AccessError> {
        checked_write(address, data)
    }
}
