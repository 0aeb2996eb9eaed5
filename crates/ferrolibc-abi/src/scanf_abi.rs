//! ABI layer for the scanf family.
//!
//! The format decides how many destination pointers the call carries; they
//! are pulled up front and written by [`CScanTarget`] as conversions
//! succeed.

use std::ffi::{VaList, c_char, c_int, c_void};

use libc::FILE;

use ferrolibc_core::config;
use ferrolibc_core::errno;
use ferrolibc_core::stdio::STDIN_ID;
use ferrolibc_core::stdio::scanf::{ScanError, SliceInput, scan_into, stream_scan_into};
use ferrolibc_core::stdlib::NumUnit;

use crate::stdio_abi::with_stream;
use crate::util::{WcharT, c_bytes, c_wide, set_abi_errno};
use crate::varargs::{CScanTarget, scanf_pointer_count};

const EOF: c_int = -1;

fn stdin_fp() -> *mut FILE {
    STDIN_ID as *mut FILE
}

fn count_failed(err: ScanError) {
    log::warn!("scanf: {err}");
    if err.is_format_error() && config::stdio_config().format_errors.aborts() {
        log::error!("scanf: aborting on format error: {err}");
        std::process::abort();
    }
    if let Some(e) = err.errno() {
        set_abi_errno(e);
    }
}

fn pointer_count<T: NumUnit>(fmt: &[T]) -> Option<usize> {
    scanf_pointer_count(fmt).map_err(count_failed).ok()
}

unsafe fn prepare<'a>(fmt: *const c_char, pull: impl FnOnce(usize) -> Vec<*mut c_void>) -> Option<(&'a [u8], CScanTarget)> {
    if fmt.is_null() {
        set_abi_errno(errno::EINVAL);
        return None;
    }
    let fmt = unsafe { c_bytes(fmt) };
    let count = pointer_count(fmt)?;
    Some((fmt, unsafe { CScanTarget::new(pull(count)) }))
}

unsafe fn prepare_wide<'a>(
    fmt: *const WcharT,
    pull: impl FnOnce(usize) -> Vec<*mut c_void>,
) -> Option<(&'a [u32], CScanTarget)> {
    if fmt.is_null() {
        set_abi_errno(errno::EINVAL);
        return None;
    }
    let fmt = unsafe { c_wide(fmt) };
    let count = pointer_count(fmt)?;
    Some((fmt, unsafe { CScanTarget::new(pull(count)) }))
}

/// C return value: assignments made, or `EOF` when input failed before the
/// first conversion or the call could not run.
fn finish(result: Option<Result<usize, ScanError>>) -> c_int {
    match result {
        Some(Ok(n)) => c_int::try_from(n).unwrap_or(c_int::MAX),
        _ => EOF,
    }
}

fn from_stream<T: NumUnit>(fp: *mut FILE, wide: bool, fmt: &[T], target: &mut CScanTarget) -> c_int {
    finish(with_stream(fp, |s| stream_scan_into(s, wide, fmt, target)))
}

unsafe fn from_string(input: *const c_char, fmt: &[u8], target: &mut CScanTarget) -> c_int {
    if input.is_null() {
        set_abi_errno(errno::EINVAL);
        return EOF;
    }
    let input = unsafe { c_bytes(input) };
    finish(Some(scan_into(&mut SliceInput::new(input), fmt, target)))
}

unsafe fn from_wide_string(input: *const WcharT, fmt: &[u32], target: &mut CScanTarget) -> c_int {
    if input.is_null() {
        set_abi_errno(errno::EINVAL);
        return EOF;
    }
    let input = unsafe { c_wide(input) };
    finish(Some(scan_into(&mut SliceInput::new(input), fmt, target)))
}

// ---------------------------------------------------------------------------
// Narrow entry points
// ---------------------------------------------------------------------------

/// ISO C `scanf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn scanf(fmt: *const c_char, mut args: ...) -> c_int {
    unsafe {
        match prepare(fmt, |n| collect_va_ptrs!(args, n)) {
            Some((fmt, mut target)) => from_stream(stdin_fp(), false, fmt, &mut target),
            None => EOF,
        }
    }
}

/// ISO C `vscanf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn vscanf(fmt: *const c_char, mut ap: VaList) -> c_int {
    unsafe {
        match prepare(fmt, |n| collect_va_ptrs!(ap, n)) {
            Some((fmt, mut target)) => from_stream(stdin_fp(), false, fmt, &mut target),
            None => EOF,
        }
    }
}

/// ISO C `fscanf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn fscanf(fp: *mut FILE, fmt: *const c_char, mut args: ...) -> c_int {
    unsafe {
        match prepare(fmt, |n| collect_va_ptrs!(args, n)) {
            Some((fmt, mut target)) => from_stream(fp, false, fmt, &mut target),
            None => EOF,
        }
    }
}

/// ISO C `vfscanf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn vfscanf(fp: *mut FILE, fmt: *const c_char, mut ap: VaList) -> c_int {
    unsafe {
        match prepare(fmt, |n| collect_va_ptrs!(ap, n)) {
            Some((fmt, mut target)) => from_stream(fp, false, fmt, &mut target),
            None => EOF,
        }
    }
}

/// ISO C `sscanf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn sscanf(input: *const c_char, fmt: *const c_char, mut args: ...) -> c_int {
    unsafe {
        match prepare(fmt, |n| collect_va_ptrs!(args, n)) {
            Some((fmt, mut target)) => from_string(input, fmt, &mut target),
            None => EOF,
        }
    }
}

/// ISO C `vsscanf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn vsscanf(input: *const c_char, fmt: *const c_char, mut ap: VaList) -> c_int {
    unsafe {
        match prepare(fmt, |n| collect_va_ptrs!(ap, n)) {
            Some((fmt, mut target)) => from_string(input, fmt, &mut target),
            None => EOF,
        }
    }
}

// ---------------------------------------------------------------------------
// Wide entry points
// ---------------------------------------------------------------------------

/// ISO C `wscanf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn wscanf(fmt: *const WcharT, mut args: ...) -> c_int {
    unsafe {
        match prepare_wide(fmt, |n| collect_va_ptrs!(args, n)) {
            Some((fmt, mut target)) => from_stream(stdin_fp(), true, fmt, &mut target),
            None => EOF,
        }
    }
}

/// ISO C `vwscanf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn vwscanf(fmt: *const WcharT, mut ap: VaList) -> c_int {
    unsafe {
        match prepare_wide(fmt, |n| collect_va_ptrs!(ap, n)) {
            Some((fmt, mut target)) => from_stream(stdin_fp(), true, fmt, &mut target),
            None => EOF,
        }
    }
}

/// ISO C `fwscanf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn fwscanf(fp: *mut FILE, fmt: *const WcharT, mut args: ...) -> c_int {
    unsafe {
        match prepare_wide(fmt, |n| collect_va_ptrs!(args, n)) {
            Some((fmt, mut target)) => from_stream(fp, true, fmt, &mut target),
            None => EOF,
        }
    }
}

/// ISO C `vfwscanf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn vfwscanf(fp: *mut FILE, fmt: *const WcharT, mut ap: VaList) -> c_int {
    unsafe {
        match prepare_wide(fmt, |n| collect_va_ptrs!(ap, n)) {
            Some((fmt, mut target)) => from_stream(fp, true, fmt, &mut target),
            None => EOF,
        }
    }
}

/// ISO C `swscanf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn swscanf(input: *const WcharT, fmt: *const WcharT, mut args: ...) -> c_int {
    unsafe {
        match prepare_wide(fmt, |n| collect_va_ptrs!(args, n)) {
            Some((fmt, mut target)) => from_wide_string(input, fmt, &mut target),
            None => EOF,
        }
    }
}

/// ISO C `vswscanf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn vswscanf(input: *const WcharT, fmt: *const WcharT, mut ap: VaList) -> c_int {
    unsafe {
        match prepare_wide(fmt, |n| collect_va_ptrs!(ap, n)) {
            Some((fmt, mut target)) => from_wide_string(input, fmt, &mut target),
            None => EOF,
        }
    }
}
