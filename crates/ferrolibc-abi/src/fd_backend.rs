//! File-descriptor backend for streams.
//!
//! Talks to the kernel through `libc::syscall` directly so the stream layer
//! never re-enters the exported stdio symbols. `EINTR` is retried here;
//! every other failure is returned as the raw errno.

use std::ffi::{c_char, c_int, c_long};

use ferrolibc_core::errno;
use ferrolibc_core::stdio::{RawIo, Whence};

use crate::util::last_host_errno;

/// Stream backend over an open descriptor.
#[derive(Debug)]
pub struct FdBackend {
    fd: c_int,
    tty: bool,
    closed: bool,
}

impl FdBackend {
    pub fn new(fd: c_int) -> Self {
        Self {
            fd,
            tty: is_tty(fd),
            closed: false,
        }
    }
}

fn syscall_result(ret: c_long) -> Result<usize, i32> {
    if ret < 0 {
        Err(last_host_errno(errno::EIO))
    } else {
        Ok(ret as usize)
    }
}

/// Run `op` until it stops failing with `EINTR`.
fn retry_eintr(mut op: impl FnMut() -> c_long) -> Result<usize, i32> {
    loop {
        match syscall_result(op()) {
            Err(errno::EINTR) => continue,
            other => return other,
        }
    }
}

/// Whether `fd` refers to a terminal (`TCGETS` succeeds).
pub fn is_tty(fd: c_int) -> bool {
    let mut term = std::mem::MaybeUninit::<libc::termios>::uninit();
    // SAFETY: TCGETS writes at most one termios into `term`.
    let rc = unsafe { libc::syscall(libc::SYS_ioctl, fd, libc::TCGETS, term.as_mut_ptr()) };
    rc == 0
}

/// `openat(AT_FDCWD, path, oflags, mode)`.
///
/// # Safety
///
/// `path` must be a valid NUL-terminated string.
pub unsafe fn open_path(path: *const c_char, oflags: c_int, mode: libc::mode_t) -> Result<c_int, i32> {
    retry_eintr(|| unsafe { libc::syscall(libc::SYS_openat, libc::AT_FDCWD, path, oflags, mode) })
        .map(|fd| fd as c_int)
}

/// `fcntl(fd, F_GETFL)`.
pub fn fd_status_flags(fd: c_int) -> Result<c_int, i32> {
    // SAFETY: F_GETFL takes no pointer argument.
    syscall_result(unsafe { libc::syscall(libc::SYS_fcntl, fd, libc::F_GETFL) }).map(|v| v as c_int)
}

/// `close(fd)`; `EINTR` is not retried since the descriptor is gone either way.
pub fn close_fd(fd: c_int) -> Result<(), i32> {
    // SAFETY: closing a descriptor has no memory effects.
    syscall_result(unsafe { libc::syscall(libc::SYS_close, fd) }).map(|_| ())
}

impl RawIo for FdBackend {
    fn raw_read(&mut self, buf: &mut [u8]) -> Result<usize, i32> {
        // SAFETY: `buf` is valid for `buf.len()` bytes of writes.
        retry_eintr(|| unsafe { libc::syscall(libc::SYS_read, self.fd, buf.as_mut_ptr(), buf.len()) })
    }

    fn raw_write(&mut self, buf: &[u8]) -> Result<usize, i32> {
        // SAFETY: `buf` is valid for `buf.len()` bytes of reads.
        retry_eintr(|| unsafe { libc::syscall(libc::SYS_write, self.fd, buf.as_ptr(), buf.len()) })
    }

    fn raw_seek(&mut self, offset: i64, whence: Whence) -> Result<u64, i32> {
        let whence = match whence {
            Whence::Set => libc::SEEK_SET,
            Whence::Cur => libc::SEEK_CUR,
            Whence::End => libc::SEEK_END,
        };
        // SAFETY: lseek takes no pointer argument.
        retry_eintr(|| unsafe { libc::syscall(libc::SYS_lseek, self.fd, offset, whence) }).map(|pos| pos as u64)
    }

    fn raw_close(&mut self) -> Result<(), i32> {
        if std::mem::replace(&mut self.closed, true) {
            return Ok(());
        }
        close_fd(self.fd)
    }

    fn fd(&self) -> Option<i32> {
        Some(self.fd)
    }

    fn is_tty(&self) -> bool {
        self.tty
    }
}
