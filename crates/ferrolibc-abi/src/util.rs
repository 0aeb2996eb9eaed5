//! Shared internal utilities for ABI adapters.

use std::ffi::{c_char, c_int};

use ferrolibc_core::errno;

/// C `wchar_t` on Linux.
pub type WcharT = i32;
/// C `wint_t`.
pub type WintT = u32;

/// Scan a C string with an optional hard bound.
///
/// Returns `(len, terminated)` where:
/// - `len` is the byte length before the first NUL or before the bound.
/// - `terminated` indicates whether a NUL byte was observed.
///
/// # Safety
///
/// `ptr` must be valid to read up to the discovered length (and bound when given).
pub unsafe fn scan_c_string(ptr: *const c_char, bound: Option<usize>) -> (usize, bool) {
    match bound {
        Some(limit) => {
            for i in 0..limit {
                if unsafe { *ptr.add(i) } == 0 {
                    return (i, true);
                }
            }
            (limit, false)
        }
        None => {
            let mut i = 0usize;
            while unsafe { *ptr.add(i) } != 0 {
                i += 1;
            }
            (i, true)
        }
    }
}

/// Borrow a NUL-terminated C string as bytes (terminator excluded).
///
/// # Safety
///
/// `ptr` must be non-null and point to a NUL-terminated string that
/// outlives `'a`.
pub unsafe fn c_bytes<'a>(ptr: *const c_char) -> &'a [u8] {
    let (len, _) = unsafe { scan_c_string(ptr, None) };
    unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len) }
}

/// Borrow a NUL-terminated wide string (terminator excluded).
///
/// # Safety
///
/// `ptr` must be non-null and point to a NUL-terminated `wchar_t` string
/// that outlives `'a`.
pub unsafe fn c_wide<'a>(ptr: *const WcharT) -> &'a [u32] {
    let mut len = 0usize;
    while unsafe { *ptr.add(len) } != 0 {
        len += 1;
    }
    unsafe { std::slice::from_raw_parts(ptr.cast::<u32>(), len) }
}

/// Store `val` in the calling thread's errno.
#[inline]
pub fn set_abi_errno(val: c_int) {
    errno::set_errno(val);
}

/// Host errno after a failed `libc::syscall`.
#[inline]
pub fn last_host_errno(default_errno: c_int) -> c_int {
    std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(default_errno)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_respects_bound() {
        let s = b"abc\0def";
        assert_eq!(unsafe { scan_c_string(s.as_ptr().cast(), None) }, (3, true));
        assert_eq!(unsafe { scan_c_string(s.as_ptr().cast(), Some(2)) }, (2, false));
        assert_eq!(unsafe { c_bytes(s.as_ptr().cast()) }, b"abc");
    }

    #[test]
    fn wide_strings_stop_at_nul() {
        let w: [WcharT; 4] = [0x48, 0x20AC, 0, 0x41];
        assert_eq!(unsafe { c_wide(w.as_ptr()) }, &[0x48, 0x20AC]);
    }
}
