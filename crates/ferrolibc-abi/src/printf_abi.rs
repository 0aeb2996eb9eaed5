//! ABI layer for the printf family.
//!
//! Each entry point plans its arguments from the format string, pulls them
//! out of the C argument list, and hands them to the core renderer with the
//! destination its name implies.

use std::ffi::{VaList, c_char, c_int};
use std::ptr;

use libc::FILE;

use ferrolibc_core::config;
use ferrolibc_core::errno;
use ferrolibc_core::stdio::printf::{self, PrintfError};
use ferrolibc_core::stdio::{RawIo, STDOUT_ID};
use ferrolibc_core::stdlib::NumUnit;

use crate::fd_backend::FdBackend;
use crate::stdio_abi::with_stream;
use crate::util::{WcharT, c_bytes, c_wide, set_abi_errno};
use crate::varargs::{Planned, PrintfArgs, RawArg, printf_plan};

fn stdout_fp() -> *mut FILE {
    STDOUT_ID as *mut FILE
}

/// A format the planner rejects never reaches the renderer, so the
/// format-error policy is applied here.
fn plan_failed(err: PrintfError) {
    log::warn!("printf: {err}");
    if err.is_format_error() && config::stdio_config().format_errors.aborts() {
        log::error!("printf: aborting on format error: {err}");
        std::process::abort();
    }
    set_abi_errno(err.errno());
}

fn prepare_with<T: NumUnit>(fmt: &[T], pull: impl FnOnce(&[Planned]) -> Vec<RawArg>) -> Option<PrintfArgs> {
    match printf_plan(fmt) {
        Ok(plan) => {
            let raw = pull(&plan);
            Some(PrintfArgs::new(plan, raw))
        }
        Err(e) => {
            plan_failed(e);
            None
        }
    }
}

unsafe fn prepare<'a>(
    fmt: *const c_char,
    pull: impl FnOnce(&[Planned]) -> Vec<RawArg>,
) -> Option<(&'a [u8], PrintfArgs)> {
    if fmt.is_null() {
        set_abi_errno(errno::EINVAL);
        return None;
    }
    let fmt = unsafe { c_bytes(fmt) };
    prepare_with(fmt, pull).map(|call| (fmt, call))
}

unsafe fn prepare_wide<'a>(
    fmt: *const WcharT,
    pull: impl FnOnce(&[Planned]) -> Vec<RawArg>,
) -> Option<(&'a [u32], PrintfArgs)> {
    if fmt.is_null() {
        set_abi_errno(errno::EINVAL);
        return None;
    }
    let fmt = unsafe { c_wide(fmt) };
    prepare_with(fmt, pull).map(|call| (fmt, call))
}

/// C return value of a finished call; `%n` results are stored on success.
unsafe fn finish(result: Option<Result<usize, PrintfError>>, call: &PrintfArgs) -> c_int {
    match result {
        Some(Ok(n)) => {
            unsafe { call.write_counts() };
            c_int::try_from(n).unwrap_or_else(|_| {
                set_abi_errno(errno::EOVERFLOW);
                -1
            })
        }
        _ => -1,
    }
}

// ---------------------------------------------------------------------------
// Destinations
// ---------------------------------------------------------------------------

unsafe fn to_stream(fp: *mut FILE, fmt: &[u8], call: &PrintfArgs) -> c_int {
    let result = with_stream(fp, |s| printf::fprintf(s, fmt, unsafe { call.format_args() }));
    unsafe { finish(result, call) }
}

unsafe fn to_fd(fd: c_int, fmt: &[u8], call: &PrintfArgs) -> c_int {
    let rendered = match printf::sprintf(fmt, unsafe { call.format_args() }) {
        Ok(out) => out,
        Err(_) => return -1,
    };
    let mut backend = FdBackend::new(fd);
    let mut done = 0;
    while done < rendered.len() {
        match backend.raw_write(&rendered[done..]) {
            Ok(0) => {
                set_abi_errno(errno::EIO);
                return -1;
            }
            Ok(n) => done += n,
            Err(e) => {
                set_abi_errno(e);
                return -1;
            }
        }
    }
    unsafe { finish(Some(Ok(rendered.len())), call) }
}

/// `size` of `None` is the unbounded `sprintf`.
unsafe fn to_buffer(buf: *mut c_char, size: Option<usize>, fmt: &[u8], call: &PrintfArgs) -> c_int {
    let result = match size {
        None => {
            if buf.is_null() {
                set_abi_errno(errno::EINVAL);
                return -1;
            }
            printf::sprintf(fmt, unsafe { call.format_args() }).map(|out| {
                unsafe {
                    ptr::copy_nonoverlapping(out.as_ptr(), buf.cast::<u8>(), out.len());
                    *buf.add(out.len()) = 0;
                }
                out.len()
            })
        }
        Some(n) => {
            let dest = (!buf.is_null() && n > 0).then(|| unsafe { std::slice::from_raw_parts_mut(buf.cast::<u8>(), n) });
            printf::snprintf(dest, fmt, unsafe { call.format_args() })
        }
    };
    unsafe { finish(Some(result), call) }
}

unsafe fn to_allocation(strp: *mut *mut c_char, fmt: &[u8], call: &PrintfArgs) -> c_int {
    if strp.is_null() {
        set_abi_errno(errno::EINVAL);
        return -1;
    }
    unsafe { *strp = ptr::null_mut() };
    let out = match printf::sprintf(fmt, unsafe { call.format_args() }) {
        Ok(out) => out,
        Err(_) => return -1,
    };
    let block = unsafe { libc::malloc(out.len() + 1) }.cast::<u8>();
    if block.is_null() {
        set_abi_errno(errno::ENOMEM);
        return -1;
    }
    unsafe {
        ptr::copy_nonoverlapping(out.as_ptr(), block, out.len());
        *block.add(out.len()) = 0;
    }
    let ret = unsafe { finish(Some(Ok(out.len())), call) };
    if ret < 0 {
        unsafe { libc::free(block.cast()) };
    } else {
        unsafe { *strp = block.cast() };
    }
    ret
}

unsafe fn to_wide_stream(fp: *mut FILE, fmt: &[u32], call: &PrintfArgs) -> c_int {
    let result = with_stream(fp, |s| printf::fwprintf(s, fmt, unsafe { call.format_args() }));
    unsafe { finish(result, call) }
}

unsafe fn to_wide_buffer(buf: *mut WcharT, n: usize, fmt: &[u32], call: &PrintfArgs) -> c_int {
    let dest: &mut [u32] = if buf.is_null() {
        &mut []
    } else {
        unsafe { std::slice::from_raw_parts_mut(buf.cast::<u32>(), n) }
    };
    let result = printf::swprintf(dest, fmt, unsafe { call.format_args() });
    unsafe { finish(Some(result), call) }
}

// ---------------------------------------------------------------------------
// Narrow entry points
// ---------------------------------------------------------------------------

/// ISO C `printf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn printf(fmt: *const c_char, mut args: ...) -> c_int {
    unsafe {
        match prepare(fmt, |plan| collect_va!(args, plan)) {
            Some((fmt, call)) => to_stream(stdout_fp(), fmt, &call),
            None => -1,
        }
    }
}

/// ISO C `vprintf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn vprintf(fmt: *const c_char, mut ap: VaList) -> c_int {
    unsafe {
        match prepare(fmt, |plan| collect_va!(ap, plan)) {
            Some((fmt, call)) => to_stream(stdout_fp(), fmt, &call),
            None => -1,
        }
    }
}

/// ISO C `fprintf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn fprintf(fp: *mut FILE, fmt: *const c_char, mut args: ...) -> c_int {
    unsafe {
        match prepare(fmt, |plan| collect_va!(args, plan)) {
            Some((fmt, call)) => to_stream(fp, fmt, &call),
            None => -1,
        }
    }
}

/// ISO C `vfprintf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn vfprintf(fp: *mut FILE, fmt: *const c_char, mut ap: VaList) -> c_int {
    unsafe {
        match prepare(fmt, |plan| collect_va!(ap, plan)) {
            Some((fmt, call)) => to_stream(fp, fmt, &call),
            None => -1,
        }
    }
}

/// POSIX `dprintf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn dprintf(fd: c_int, fmt: *const c_char, mut args: ...) -> c_int {
    unsafe {
        match prepare(fmt, |plan| collect_va!(args, plan)) {
            Some((fmt, call)) => to_fd(fd, fmt, &call),
            None => -1,
        }
    }
}

/// POSIX `vdprintf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn vdprintf(fd: c_int, fmt: *const c_char, mut ap: VaList) -> c_int {
    unsafe {
        match prepare(fmt, |plan| collect_va!(ap, plan)) {
            Some((fmt, call)) => to_fd(fd, fmt, &call),
            None => -1,
        }
    }
}

/// ISO C `sprintf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn sprintf(buf: *mut c_char, fmt: *const c_char, mut args: ...) -> c_int {
    unsafe {
        match prepare(fmt, |plan| collect_va!(args, plan)) {
            Some((fmt, call)) => to_buffer(buf, None, fmt, &call),
            None => -1,
        }
    }
}

/// ISO C `vsprintf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn vsprintf(buf: *mut c_char, fmt: *const c_char, mut ap: VaList) -> c_int {
    unsafe {
        match prepare(fmt, |plan| collect_va!(ap, plan)) {
            Some((fmt, call)) => to_buffer(buf, None, fmt, &call),
            None => -1,
        }
    }
}

/// ISO C `snprintf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn snprintf(buf: *mut c_char, n: usize, fmt: *const c_char, mut args: ...) -> c_int {
    unsafe {
        match prepare(fmt, |plan| collect_va!(args, plan)) {
            Some((fmt, call)) => to_buffer(buf, Some(n), fmt, &call),
            None => -1,
        }
    }
}

/// ISO C `vsnprintf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn vsnprintf(buf: *mut c_char, n: usize, fmt: *const c_char, mut ap: VaList) -> c_int {
    unsafe {
        match prepare(fmt, |plan| collect_va!(ap, plan)) {
            Some((fmt, call)) => to_buffer(buf, Some(n), fmt, &call),
            None => -1,
        }
    }
}

/// GNU `asprintf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn asprintf(strp: *mut *mut c_char, fmt: *const c_char, mut args: ...) -> c_int {
    unsafe {
        match prepare(fmt, |plan| collect_va!(args, plan)) {
            Some((fmt, call)) => to_allocation(strp, fmt, &call),
            None => -1,
        }
    }
}

/// GNU `vasprintf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn vasprintf(strp: *mut *mut c_char, fmt: *const c_char, mut ap: VaList) -> c_int {
    unsafe {
        match prepare(fmt, |plan| collect_va!(ap, plan)) {
            Some((fmt, call)) => to_allocation(strp, fmt, &call),
            None => -1,
        }
    }
}

// ---------------------------------------------------------------------------
// Wide entry points
// ---------------------------------------------------------------------------

/// ISO C `wprintf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn wprintf(fmt: *const WcharT, mut args: ...) -> c_int {
    unsafe {
        match prepare_wide(fmt, |plan| collect_va!(args, plan)) {
            Some((fmt, call)) => to_wide_stream(stdout_fp(), fmt, &call),
            None => -1,
        }
    }
}

/// ISO C `vwprintf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn vwprintf(fmt: *const WcharT, mut ap: VaList) -> c_int {
    unsafe {
        match prepare_wide(fmt, |plan| collect_va!(ap, plan)) {
            Some((fmt, call)) => to_wide_stream(stdout_fp(), fmt, &call),
            None => -1,
        }
    }
}

/// ISO C `fwprintf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn fwprintf(fp: *mut FILE, fmt: *const WcharT, mut args: ...) -> c_int {
    unsafe {
        match prepare_wide(fmt, |plan| collect_va!(args, plan)) {
            Some((fmt, call)) => to_wide_stream(fp, fmt, &call),
            None => -1,
        }
    }
}

/// ISO C `vfwprintf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn vfwprintf(fp: *mut FILE, fmt: *const WcharT, mut ap: VaList) -> c_int {
    unsafe {
        match prepare_wide(fmt, |plan| collect_va!(ap, plan)) {
            Some((fmt, call)) => to_wide_stream(fp, fmt, &call),
            None => -1,
        }
    }
}

/// ISO C `swprintf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn swprintf(buf: *mut WcharT, n: usize, fmt: *const WcharT, mut args: ...) -> c_int {
    unsafe {
        match prepare_wide(fmt, |plan| collect_va!(args, plan)) {
            Some((fmt, call)) => to_wide_buffer(buf, n, fmt, &call),
            None => -1,
        }
    }
}

/// ISO C `vswprintf`.
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub unsafe extern "C" fn vswprintf(buf: *mut WcharT, n: usize, fmt: *const WcharT, mut ap: VaList) -> c_int {
    unsafe {
        match prepare_wide(fmt, |plan| collect_va!(ap, plan)) {
            Some((fmt, call)) => to_wide_buffer(buf, n, fmt, &call),
            None => -1,
        }
    }
}
