//! ABI layer for `<errno.h>` plus `strerror`/`perror`.
//!
//! errno itself lives in the core crate's thread-local cell; this module
//! only hands its address to C.

use std::cell::RefCell;
use std::ffi::{c_char, c_int};

use ferrolibc_core::errno;
use ferrolibc_core::stdio::{STDERR_ID, StreamId};

use crate::stdio_abi::with_stream;

#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn __errno_location() -> *mut c_int {
    errno::errno_ptr()
}

thread_local! {
    static STRERROR_BUF: RefCell<Vec<u8>> = const { RefCell::new(Vec::new()) };
}

abi_fn! {
    /// `strerror`: the message lives in a per-thread buffer that the next
    /// call on the same thread overwrites.
    fn strerror(errnum: c_int) -> *mut c_char {
        let msg = errno::strerror_message(errnum);
        STRERROR_BUF.with(|buf| {
            let mut buf = buf.borrow_mut();
            buf.clear();
            if msg == "Unknown error" {
                buf.extend_from_slice(format!("Unknown error {errnum}").as_bytes());
            } else {
                buf.extend_from_slice(msg.as_bytes());
            }
            buf.push(0);
            buf.as_mut_ptr().cast::<c_char>()
        })
    }
}

abi_fn! {
    /// `perror`: writes `"<s>: <message>\n"` to stderr. errno is preserved.
    fn perror(s: *const c_char) {
        let saved = errno::get_errno();
        let prefix = if s.is_null() { &[][..] } else { crate::util::c_bytes(s) };
        let line = errno::perror_line(prefix, saved);
        let id: StreamId = STDERR_ID;
        let _ = with_stream(id as *mut libc::FILE, |stream| {
            if stream.write(&line) == line.len() {
                stream.flush().ok()
            } else {
                None
            }
        });
        errno::set_errno(saved);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CStr;

    #[test]
    fn errno_location_is_core_cell() {
        errno::set_errno(errno::ERANGE);
        let p = unsafe { __errno_location() };
        assert_eq!(unsafe { *p }, errno::ERANGE);
        unsafe { *p = errno::EDOM };
        assert_eq!(errno::get_errno(), errno::EDOM);
        errno::set_errno(0);
    }

    #[test]
    fn strerror_formats_unknown_values() {
        let known = unsafe { CStr::from_ptr(strerror(errno::ENOENT)) };
        assert_eq!(known.to_bytes(), b"No such file or directory");
        let unknown = unsafe { CStr::from_ptr(strerror(9999)) };
        assert_eq!(unknown.to_bytes(), b"Unknown error 9999");
    }
}
