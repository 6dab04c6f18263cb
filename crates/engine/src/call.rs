//! Typed native dispatch for argument tuples
//!
//! Every runtime export and every compiled managed method is called through
//! an `extern "C"` function pointer shaped from the argument tuple. On x64
//! Windows this is the platform fastcall convention, on 32-bit Windows it is
//! cdecl, elsewhere the System V ABI.

use std::ffi::c_void;

/// Argument tuple that can be passed to a native function
///
/// Implemented for tuples of up to eight `Copy` values.
pub trait NativeArgs: Copy {
    /// Number of arguments
    const ARITY: usize;

    /// Call `addr` as `extern "C" fn(args...) -> R`
    ///
    /// # Safety
    /// `addr` must point to a function with exactly this signature.
    unsafe fn call_at<R>(self, addr: usize) -> R;

    /// Pointers to each argument's storage, in order
    ///
    /// This is the `void**` array shape the runtime's reflective invoke
    /// expects. Pointers are only valid while `self` is not moved.
    fn arg_ptrs(&mut self) -> Vec<*mut c_void>;
}

macro_rules! impl_native_args {
    ($arity:expr; $($T:ident),*) => {
        paste::paste! {
            impl<$($T: Copy),*> NativeArgs for ($($T,)*) {
                const ARITY: usize = $arity;

                #[inline]
                unsafe fn call_at<R>(self, addr: usize) -> R {
                    let ($([<$T:lower>],)*) = self;
                    let f: unsafe extern "C" fn($($T),*) -> R = std::mem::transmute_copy(&addr);
                    f($([<$T:lower>]),*)
                }

                fn arg_ptrs(&mut self) -> Vec<*mut c_void> {
                    let ($([<$T:lower>],)*) = self;
                    vec![$([<$T:lower>] as *mut $T as *mut c_void),*]
                }
            }
        }
    };
}

impl_native_args!(0;);
impl_native_args!(1; A0);
impl_native_args!(2; A0, A1);
impl_native_args!(3; A0, A1, A2);
impl_native_args!(4; A0, A1, A2, A3);
impl_native_args!(5; A0, A1, A2, A3, A4);
impl_native_args!(6; A0, A1, A2, A3, A4, A5);
impl_native_args!(7; A0, A1, A2, A3, A4, A5, A6);
impl_native_args!(8; A0, A1, A2, A3, A4, A5, A6, A7);

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn add(a: i32, b: i32) -> i32 {
        a + b
    }

    extern "C" fn scale(v: f32, by: f64, negate: bool) -> f64 {
        let r = v as f64 * by;
        if negate {
            -r
        } else {
            r
        }
    }

    extern "C" fn forty_two() -> u64 {
        42
    }

    #[test]
    fn test_call_at_matches_signature() {
        unsafe {
            assert_eq!((2i32, 40i32).call_at::<i32>(add as usize), 42);
            assert_eq!((1.5f32, 2.0f64, true).call_at::<f64>(scale as usize), -3.0);
            assert_eq!(().call_at::<u64>(forty_two as usize), 42);
        }
    }

    #[test]
    fn test_arg_ptrs_point_at_storage() {
        let mut args = (7i32, 2.5f32, 0xAAu8);
        let ptrs = args.arg_ptrs();
        assert_eq!(ptrs.len(), 3);
        unsafe {
            assert_eq!(*(ptrs[0] as *const i32), 7);
            assert_eq!(*(ptrs[1] as *const f32), 2.5);
            assert_eq!(*(ptrs[2] as *const u8), 0xAA);
        }
        assert_eq!(<(i32, f32, u8)>::ARITY, 3);
        assert!(().arg_ptrs().is_empty());
    }
}
