//! ABI layer for `<stdio.h>` functions.
//!
//! Provides the POSIX stdio surface: stream management (fopen/fdopen/
//! freopen/fclose), memory streams (fmemopen/open_memstream), tmpfile,
//! popen/pclose, buffered I/O (fread/fwrite/fgetc/fputc/fgets/fputs/
//! getdelim), positioning, buffering control, status queries and the
//! flockfile family.
//!
//! A `FILE*` handed to C is a stream id from the core registry.
//! stdin/stdout/stderr are installed lazily at their sentinel ids the first
//! time any stream is looked up.

use std::ffi::{CString, c_char, c_int, c_long, c_void};
use std::ptr;
use std::sync::Once;

use libc::FILE;
use log::debug;

use ferrolibc_core::errno;
use ferrolibc_core::stdio::backend::{MemBackend, MemStreamBackend};
use ferrolibc_core::stdio::buffer::{IOFBF, IOLBF, IONBF};
use ferrolibc_core::stdio::file::{flags_to_oflags, oflags_allow};
use ferrolibc_core::stdio::{
    BUFSIZ, BufMode, OpenFlags, RawIo, Region, STDERR_ID, STDIN_ID, STDOUT_ID, StdioError, StdioStream, StreamId,
    StreamPos, Whence, parse_mode, registry,
};
use ferrolibc_core::wchar::MbState;

use crate::fd_backend::{FdBackend, close_fd, fd_status_flags, open_path};
use crate::util::{c_bytes, last_host_errno, set_abi_errno};

const EOF: c_int = -1;

// ---------------------------------------------------------------------------
// Registry access
// ---------------------------------------------------------------------------

fn make_standard(id: StreamId) -> Option<StdioStream> {
    let (fd, mode) = match id {
        STDIN_ID => (libc::STDIN_FILENO, b"r".as_slice()),
        STDOUT_ID => (libc::STDOUT_FILENO, b"w".as_slice()),
        STDERR_ID => (libc::STDERR_FILENO, b"w".as_slice()),
        _ => return None,
    };
    let flags = parse_mode(mode)?;
    let backend = FdBackend::new(fd);
    let buf_mode = if id == STDERR_ID {
        BufMode::None
    } else if backend.is_tty() {
        BufMode::Line
    } else {
        BufMode::Full
    };
    StdioStream::new(Box::new(backend), flags, buf_mode)
        .ok()
        .map(StdioStream::borrowed)
}

extern "C" fn flush_at_exit() {
    if let Err(e) = registry().flush_all() {
        debug!("stdio: flush at exit failed: {e}");
    }
}

/// Install the standard streams and the exit-time flush, once.
pub(crate) fn ensure_standard_streams() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        registry().install_standard(make_standard);
        // SAFETY: `flush_at_exit` is a plain extern "C" fn with no captures.
        unsafe { libc::atexit(flush_at_exit) };
    });
}

/// Run `f` on the stream behind `fp`, honouring `flockfile` ownership.
/// `None` (errno `EBADF`) if `fp` is not an open stream.
pub fn with_stream<R>(fp: *mut FILE, f: impl FnOnce(&mut StdioStream) -> R) -> Option<R> {
    let id = fp as StreamId;
    ensure_standard_streams();
    let reg = registry();
    let Some(handle) = reg.get(id) else {
        set_abi_errno(errno::EBADF);
        return None;
    };
    let mut stream = reg.lock_for_op(id, &handle);
    Some(f(&mut stream))
}

fn publish(stream: StdioStream) -> *mut FILE {
    registry().register(stream) as *mut FILE
}

fn fail_null(err: c_int) -> *mut FILE {
    set_abi_errno(err);
    ptr::null_mut()
}

fn status(result: Option<Result<(), StdioError>>, fail: c_int) -> c_int {
    match result {
        Some(Ok(())) => 0,
        Some(Err(e)) => {
            set_abi_errno(e.errno());
            fail
        }
        None => fail,
    }
}

/// Wrap an open descriptor; the descriptor is closed if the stream cannot
/// be built.
fn stream_over_fd(fd: c_int, flags: OpenFlags) -> Result<StdioStream, c_int> {
    StdioStream::open_default(Box::new(FdBackend::new(fd)), flags).map_err(|e| {
        let _ = close_fd(fd);
        e.errno()
    })
}

unsafe fn open_file(path: *const c_char, flags: OpenFlags) -> Result<StdioStream, c_int> {
    let fd = unsafe { open_path(path, flags_to_oflags(&flags), 0o666) }?;
    stream_over_fd(fd, flags)
}

// ---------------------------------------------------------------------------
// stdin / stdout / stderr
// ---------------------------------------------------------------------------

/// Global `stdin` pointer.
#[allow(non_upper_case_globals)]
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub static stdin: usize = STDIN_ID;

/// Global `stdout` pointer.
#[allow(non_upper_case_globals)]
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub static stdout: usize = STDOUT_ID;

/// Global `stderr` pointer.
#[allow(non_upper_case_globals)]
#[cfg_attr(not(debug_assertions), unsafe(no_mangle))]
pub static stderr: usize = STDERR_ID;

// ---------------------------------------------------------------------------
// Opening and closing
// ---------------------------------------------------------------------------

abi_fn! {
    /// POSIX `fopen`.
    fn fopen(pathname: *const c_char, mode: *const c_char) -> *mut FILE {
        if pathname.is_null() || mode.is_null() {
            return fail_null(errno::EINVAL);
        }
        let Some(flags) = parse_mode(c_bytes(mode)) else {
            return fail_null(errno::EINVAL);
        };
        match open_file(pathname, flags) {
            Ok(stream) => publish(stream),
            Err(e) => fail_null(e),
        }
    }
}

abi_fn! {
    /// POSIX `fdopen`. The mode must be compatible with the descriptor's
    /// access mode; `w` does not truncate.
    fn fdopen(fd: c_int, mode: *const c_char) -> *mut FILE {
        if mode.is_null() {
            return fail_null(errno::EINVAL);
        }
        let Some(flags) = parse_mode(c_bytes(mode)) else {
            return fail_null(errno::EINVAL);
        };
        let oflags = match fd_status_flags(fd) {
            Ok(v) => v,
            Err(e) => return fail_null(e),
        };
        if !oflags_allow(oflags, &flags) {
            return fail_null(errno::EINVAL);
        }
        match StdioStream::open_default(Box::new(FdBackend::new(fd)), flags) {
            Ok(stream) => publish(stream),
            Err(e) => fail_null(e.errno()),
        }
    }
}

abi_fn! {
    /// POSIX `freopen`. The stream keeps its `FILE*`. A null `pathname`
    /// reopens the current descriptor with the new mode. Standard streams
    /// keep their descriptor numbers.
    fn freopen(pathname: *const c_char, mode: *const c_char, fp: *mut FILE) -> *mut FILE {
        if mode.is_null() {
            return fail_null(errno::EINVAL);
        }
        let Some(flags) = parse_mode(c_bytes(mode)) else {
            return fail_null(errno::EINVAL);
        };
        let id = fp as StreamId;
        ensure_standard_streams();
        let reg = registry();
        let Some(handle) = reg.get(id) else {
            return fail_null(errno::EBADF);
        };
        let mut old = reg.lock_for_op(id, &handle);
        let old_fd = old.fileno();

        let self_path;
        let path = if pathname.is_null() {
            let Some(fd) = old_fd else {
                drop(old);
                return fail_null(errno::EBADF);
            };
            match CString::new(format!("/proc/self/fd/{fd}")) {
                Ok(p) => {
                    self_path = p;
                    self_path.as_ptr()
                }
                Err(_) => return fail_null(errno::EINVAL),
            }
        } else {
            pathname
        };

        let mut oflags = flags_to_oflags(&flags);
        if pathname.is_null() {
            oflags &= !(libc::O_CREAT | libc::O_EXCL);
        }
        let opened = open_path(path, oflags, 0o666);
        let _ = old.close();
        let new_fd = match opened {
            Ok(fd) => fd,
            Err(e) => {
                drop(old);
                reg.deregister(id);
                return fail_null(e);
            }
        };

        let fd = match old_fd {
            Some(std_fd) if (0..=2).contains(&std_fd) && std_fd != new_fd => {
                let rc = libc::syscall(libc::SYS_dup3, new_fd, std_fd, 0);
                let _ = close_fd(new_fd);
                if rc < 0 {
                    drop(old);
                    reg.deregister(id);
                    return fail_null(last_host_errno(errno::EBADF));
                }
                std_fd
            }
            _ => new_fd,
        };
        match StdioStream::open_default(Box::new(FdBackend::new(fd)), flags) {
            Ok(stream) => {
                *old = stream;
                debug!("freopen: stream {id:#x} now on fd {fd}");
                fp
            }
            Err(e) => {
                drop(old);
                reg.deregister(id);
                fail_null(e.errno())
            }
        }
    }
}

abi_fn! {
    /// POSIX `fclose`. The stream is released even when flushing fails.
    fn fclose(fp: *mut FILE) -> c_int {
        let id = fp as StreamId;
        ensure_standard_streams();
        let reg = registry();
        let Some(handle) = reg.get(id) else {
            set_abi_errno(errno::EBADF);
            return EOF;
        };
        let mut stream = reg.lock_for_op(id, &handle);
        if reg.deregister(id).is_none() {
            set_abi_errno(errno::EBADF);
            return EOF;
        }
        let _ = reg.take_child(id);
        let result = stream.close();
        status(Some(result), EOF)
    }
}

abi_fn! {
    /// POSIX `fflush`; a null stream flushes every open output stream.
    fn fflush(fp: *mut FILE) -> c_int {
        if fp.is_null() {
            ensure_standard_streams();
            return status(Some(registry().flush_all()), EOF);
        }
        status(with_stream(fp, |s| s.flush()), EOF)
    }
}

/// Caller-owned memory behind `fmemopen`.
struct CallerRegion {
    ptr: *mut u8,
    len: usize,
}

// SAFETY: the caller guarantees the buffer outlives the stream; the stream
// mutex serializes every access.
unsafe impl Send for CallerRegion {}

impl Region for CallerRegion {
    fn bytes(&self) -> &[u8] {
        // SAFETY: `ptr` is valid for `len` bytes for the stream's lifetime.
        unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        // SAFETY: as above, and the stream holds the only handle.
        unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
    }
}

abi_fn! {
    /// POSIX `fmemopen`. A null `buf` gets a private zeroed region of
    /// `size` bytes.
    fn fmemopen(buf: *mut c_void, size: usize, mode: *const c_char) -> *mut FILE {
        if size == 0 || mode.is_null() {
            return fail_null(errno::EINVAL);
        }
        let Some(flags) = parse_mode(c_bytes(mode)) else {
            return fail_null(errno::EINVAL);
        };
        let backend: Box<dyn RawIo> = if buf.is_null() {
            let mut region = Vec::new();
            if region.try_reserve_exact(size).is_err() {
                return fail_null(errno::ENOMEM);
            }
            region.resize(size, 0u8);
            Box::new(MemBackend::new(region, &flags))
        } else {
            Box::new(MemBackend::new(CallerRegion { ptr: buf.cast(), len: size }, &flags))
        };
        match StdioStream::open_default(backend, flags) {
            Ok(stream) => publish(stream),
            Err(e) => fail_null(e.errno()),
        }
    }
}

/// Publishes `open_memstream` contents into the caller's `char**`/`size_t*`.
fn memstream_publisher(ptr_loc: usize, size_loc: usize) -> impl FnMut(&[u8]) -> Result<(), i32> + Send {
    move |data: &[u8]| {
        let ptr_loc = ptr_loc as *mut *mut c_char;
        let size_loc = size_loc as *mut usize;
        // SAFETY: both locations were non-null at open time and must stay
        // valid until the stream is closed; `*ptr_loc` is our malloc block.
        unsafe {
            let grown = libc::realloc((*ptr_loc).cast(), data.len() + 1).cast::<u8>();
            if grown.is_null() {
                return Err(errno::ENOMEM);
            }
            ptr::copy_nonoverlapping(data.as_ptr(), grown, data.len());
            *grown.add(data.len()) = 0;
            *ptr_loc = grown.cast();
            *size_loc = data.len();
        }
        Ok(())
    }
}

abi_fn! {
    /// POSIX `open_memstream`. `*bufp` and `*sizep` are updated on every
    /// flush and on close; the caller frees `*bufp`.
    fn open_memstream(bufp: *mut *mut c_char, sizep: *mut usize) -> *mut FILE {
        if bufp.is_null() || sizep.is_null() {
            return fail_null(errno::EINVAL);
        }
        let initial = libc::malloc(1).cast::<c_char>();
        if initial.is_null() {
            return fail_null(errno::ENOMEM);
        }
        *initial = 0;
        *bufp = initial;
        *sizep = 0;
        let Some(flags) = parse_mode(b"w") else {
            return fail_null(errno::EINVAL);
        };
        let (backend, _) = MemStreamBackend::new();
        let backend = backend.with_sync_hook(Box::new(memstream_publisher(bufp as usize, sizep as usize)));
        match StdioStream::new(Box::new(backend), flags, BufMode::Full) {
            Ok(stream) => publish(stream),
            Err(e) => fail_null(e.errno()),
        }
    }
}

fn open_anonymous_temp() -> Result<c_int, i32> {
    let dir = c"/tmp";
    // SAFETY: `dir` is a static NUL-terminated string.
    match unsafe { open_path(dir.as_ptr(), libc::O_TMPFILE | libc::O_RDWR | libc::O_CLOEXEC, 0o600) } {
        Ok(fd) => return Ok(fd),
        Err(e) if e != libc::EOPNOTSUPP && e != libc::EISDIR && e != errno::EINVAL => return Err(e),
        Err(_) => {}
    }
    // SAFETY: getpid takes no arguments.
    let pid = unsafe { libc::syscall(libc::SYS_getpid) };
    for attempt in 0..100u32 {
        let name = CString::new(format!("/tmp/ferrolibc-{pid}-{attempt}")).map_err(|_| errno::EINVAL)?;
        let oflags = libc::O_RDWR | libc::O_CREAT | libc::O_EXCL | libc::O_CLOEXEC;
        // SAFETY: `name` is NUL-terminated.
        match unsafe { open_path(name.as_ptr(), oflags, 0o600) } {
            Ok(fd) => {
                // SAFETY: `name` is NUL-terminated.
                unsafe { libc::syscall(libc::SYS_unlinkat, libc::AT_FDCWD, name.as_ptr(), 0) };
                return Ok(fd);
            }
            Err(errno::EEXIST) => continue,
            Err(e) => return Err(e),
        }
    }
    Err(errno::EEXIST)
}

abi_fn! {
    /// POSIX `tmpfile`: an anonymous `w+` stream removed on close.
    fn tmpfile() -> *mut FILE {
        let Some(flags) = parse_mode(b"w+") else {
            return fail_null(errno::EINVAL);
        };
        match open_anonymous_temp().and_then(|fd| stream_over_fd(fd, flags)) {
            Ok(stream) => publish(stream),
            Err(e) => fail_null(e),
        }
    }
}

abi_fn! {
    /// POSIX `popen`: run `command` under `/bin/sh -c`, connected to a
    /// one-way pipe. Mode is `r` or `w`, optionally with `e`.
    fn popen(command: *const c_char, mode: *const c_char) -> *mut FILE {
        if command.is_null() || mode.is_null() {
            return fail_null(errno::EINVAL);
        }
        let reading = match c_bytes(mode) {
            [b'r', rest @ ..] if rest.iter().all(|&c| c == b'e') => true,
            [b'w', rest @ ..] if rest.iter().all(|&c| c == b'e') => false,
            _ => return fail_null(errno::EINVAL),
        };
        let Some(flags) = parse_mode(if reading { b"r" } else { b"w" }) else {
            return fail_null(errno::EINVAL);
        };

        let mut fds = [0 as c_int; 2];
        if libc::syscall(libc::SYS_pipe2, fds.as_mut_ptr(), libc::O_CLOEXEC) < 0 {
            return fail_null(last_host_errno(errno::EMFILE));
        }
        let (parent_end, child_end, child_target) = if reading {
            (fds[0], fds[1], libc::STDOUT_FILENO)
        } else {
            (fds[1], fds[0], libc::STDIN_FILENO)
        };

        // Everything the child touches is prepared before fork.
        let sh = c"/bin/sh";
        let argv: [*const c_char; 4] = [c"sh".as_ptr(), c"-c".as_ptr(), command, ptr::null()];

        let pid = libc::fork();
        if pid < 0 {
            let err = last_host_errno(errno::EAGAIN);
            let _ = close_fd(fds[0]);
            let _ = close_fd(fds[1]);
            return fail_null(err);
        }
        if pid == 0 {
            if child_end != child_target {
                libc::syscall(libc::SYS_dup3, child_end, child_target, 0);
            } else {
                libc::syscall(libc::SYS_fcntl, child_end, libc::F_SETFD, 0);
            }
            libc::execv(sh.as_ptr(), argv.as_ptr());
            libc::_exit(127);
        }

        let _ = close_fd(child_end);
        match stream_over_fd(parent_end, flags) {
            Ok(stream) => {
                let fp = publish(stream);
                registry().set_child(fp as StreamId, pid);
                debug!("popen: child {pid} on stream {:#x}", fp as StreamId);
                fp
            }
            Err(e) => fail_null(e),
        }
    }
}

abi_fn! {
    /// POSIX `pclose`: close the stream and wait for its child. Returns the
    /// child's wait status.
    fn pclose(fp: *mut FILE) -> c_int {
        let id = fp as StreamId;
        let reg = registry();
        let Some(pid) = reg.take_child(id) else {
            set_abi_errno(errno::ECHILD);
            return -1;
        };
        if let Some(handle) = reg.get(id) {
            let mut stream = reg.lock_for_op(id, &handle);
            if reg.deregister(id).is_some() {
                let _ = stream.close();
            }
        }
        let mut wstatus: c_int = 0;
        loop {
            if libc::waitpid(pid, &mut wstatus, 0) >= 0 {
                return wstatus;
            }
            let err = last_host_errno(errno::ECHILD);
            if err != errno::EINTR {
                set_abi_errno(err);
                return -1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Byte I/O
// ---------------------------------------------------------------------------

abi_fn! {
    /// POSIX `fread`.
    fn fread(buf: *mut c_void, size: usize, nmemb: usize, fp: *mut FILE) -> usize {
        let Some(total) = size.checked_mul(nmemb) else {
            set_abi_errno(errno::EOVERFLOW);
            return 0;
        };
        if total == 0 || buf.is_null() {
            return 0;
        }
        let out = std::slice::from_raw_parts_mut(buf.cast::<u8>(), total);
        with_stream(fp, |s| s.read(out) / size).unwrap_or(0)
    }
}

abi_fn! {
    /// POSIX `fwrite`.
    fn fwrite(buf: *const c_void, size: usize, nmemb: usize, fp: *mut FILE) -> usize {
        let Some(total) = size.checked_mul(nmemb) else {
            set_abi_errno(errno::EOVERFLOW);
            return 0;
        };
        if total == 0 || buf.is_null() {
            return 0;
        }
        let data = std::slice::from_raw_parts(buf.cast::<u8>(), total);
        with_stream(fp, |s| s.write(data) / size).unwrap_or(0)
    }
}

fn getc_impl(fp: *mut FILE) -> c_int {
    match with_stream(fp, |s| s.getc()) {
        Some(Ok(Some(b))) => c_int::from(b),
        _ => EOF,
    }
}

fn putc_impl(c: c_int, fp: *mut FILE) -> c_int {
    let byte = c as u8;
    match with_stream(fp, |s| s.putc(byte)) {
        Some(Ok(())) => c_int::from(byte),
        _ => EOF,
    }
}

abi_fn! {
    /// POSIX `fgetc`.
    fn fgetc(fp: *mut FILE) -> c_int {
        getc_impl(fp)
    }
}

abi_fn! {
    /// POSIX `getc`.
    fn getc(fp: *mut FILE) -> c_int {
        getc_impl(fp)
    }
}

abi_fn! {
    /// POSIX `getchar`.
    fn getchar() -> c_int {
        getc_impl(STDIN_ID as *mut FILE)
    }
}

abi_fn! {
    /// POSIX `fputc`.
    fn fputc(c: c_int, fp: *mut FILE) -> c_int {
        putc_impl(c, fp)
    }
}

abi_fn! {
    /// POSIX `putc`.
    fn putc(c: c_int, fp: *mut FILE) -> c_int {
        putc_impl(c, fp)
    }
}

abi_fn! {
    /// POSIX `putchar`.
    fn putchar(c: c_int) -> c_int {
        putc_impl(c, STDOUT_ID as *mut FILE)
    }
}

abi_fn! {
    /// POSIX `fgets`.
    fn fgets(buf: *mut c_char, n: c_int, fp: *mut FILE) -> *mut c_char {
        if buf.is_null() || n <= 0 {
            set_abi_errno(errno::EINVAL);
            return ptr::null_mut();
        }
        let out = std::slice::from_raw_parts_mut(buf.cast::<u8>(), n as usize);
        match with_stream(fp, |s| s.gets(out)) {
            Some(Some(_)) => buf,
            _ => ptr::null_mut(),
        }
    }
}

abi_fn! {
    /// POSIX `fputs`.
    fn fputs(s: *const c_char, fp: *mut FILE) -> c_int {
        if s.is_null() {
            set_abi_errno(errno::EINVAL);
            return EOF;
        }
        let bytes = c_bytes(s);
        match with_stream(fp, |stream| stream.puts(bytes)) {
            Some(Ok(_)) => 1,
            _ => EOF,
        }
    }
}

abi_fn! {
    /// POSIX `puts`: writes `s` and a newline to stdout.
    fn puts(s: *const c_char) -> c_int {
        if s.is_null() {
            set_abi_errno(errno::EINVAL);
            return EOF;
        }
        let bytes = c_bytes(s);
        let result = with_stream(STDOUT_ID as *mut FILE, |stream| {
            stream.puts(bytes)?;
            stream.putc(b'\n')
        });
        match result {
            Some(Ok(())) => c_int::try_from(bytes.len() + 1).unwrap_or(c_int::MAX),
            _ => EOF,
        }
    }
}

abi_fn! {
    /// POSIX `ungetc`.
    fn ungetc(c: c_int, fp: *mut FILE) -> c_int {
        if c == EOF {
            return EOF;
        }
        let byte = c as u8;
        match with_stream(fp, |s| s.ungetc(byte)) {
            Some(Ok(())) => c_int::from(byte),
            _ => EOF,
        }
    }
}

abi_fn! {
    /// POSIX `getdelim`: read through `delim` into a malloc'd buffer that
    /// is grown with `realloc` as needed.
    fn getdelim(lineptr: *mut *mut c_char, n: *mut usize, delim: c_int, fp: *mut FILE) -> isize {
        if lineptr.is_null() || n.is_null() {
            set_abi_errno(errno::EINVAL);
            return -1;
        }
        let mut line = Vec::new();
        let got = match with_stream(fp, |s| s.read_delim(delim as u8, &mut line)) {
            Some(Ok(Some(len))) => len,
            _ => return -1,
        };
        let needed = got + 1;
        if (*lineptr).is_null() || *n < needed {
            let cap = needed.max(120);
            let grown = libc::realloc((*lineptr).cast(), cap).cast::<c_char>();
            if grown.is_null() {
                set_abi_errno(errno::ENOMEM);
                return -1;
            }
            *lineptr = grown;
            *n = cap;
        }
        ptr::copy_nonoverlapping(line.as_ptr(), (*lineptr).cast::<u8>(), got);
        *(*lineptr).add(got) = 0;
        isize::try_from(got).unwrap_or(isize::MAX)
    }
}

abi_fn! {
    /// POSIX `getline`.
    fn getline(lineptr: *mut *mut c_char, n: *mut usize, fp: *mut FILE) -> isize {
        getdelim(lineptr, n, c_int::from(b'\n'), fp)
    }
}

// ---------------------------------------------------------------------------
// Positioning
// ---------------------------------------------------------------------------

abi_fn! {
    /// POSIX `fseeko`.
    fn fseeko(fp: *mut FILE, offset: libc::off_t, whence: c_int) -> c_int {
        let Some(whence) = Whence::from_posix(whence) else {
            set_abi_errno(errno::EINVAL);
            return -1;
        };
        status(with_stream(fp, |s| s.seek(offset, whence).map(|_| ())), -1)
    }
}

abi_fn! {
    /// POSIX `fseek`.
    fn fseek(fp: *mut FILE, offset: c_long, whence: c_int) -> c_int {
        fseeko(fp, libc::off_t::from(offset), whence)
    }
}

abi_fn! {
    /// POSIX `ftello`.
    fn ftello(fp: *mut FILE) -> libc::off_t {
        match with_stream(fp, |s| s.tell()) {
            Some(Ok(pos)) => libc::off_t::try_from(pos).unwrap_or_else(|_| {
                set_abi_errno(errno::EOVERFLOW);
                -1
            }),
            Some(Err(e)) => {
                set_abi_errno(e.errno());
                -1
            }
            None => -1,
        }
    }
}

abi_fn! {
    /// POSIX `ftell`.
    fn ftell(fp: *mut FILE) -> c_long {
        let pos = ftello(fp);
        c_long::try_from(pos).unwrap_or_else(|_| {
            set_abi_errno(errno::EOVERFLOW);
            -1
        })
    }
}

abi_fn! {
    /// POSIX `rewind`.
    fn rewind(fp: *mut FILE) {
        let _ = with_stream(fp, |s| s.rewind());
    }
}

/// Layout of glibc's `fpos_t`: offset followed by the conversion state.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct FposT {
    pub pos: libc::off_t,
    pub state: [u8; 8],
}

abi_fn! {
    /// POSIX `fgetpos`.
    fn fgetpos(fp: *mut FILE, pos: *mut FposT) -> c_int {
        if pos.is_null() {
            set_abi_errno(errno::EINVAL);
            return -1;
        }
        match with_stream(fp, |s| s.get_pos()) {
            Some(Ok(p)) => {
                let Ok(offset) = libc::off_t::try_from(p.offset) else {
                    set_abi_errno(errno::EOVERFLOW);
                    return -1;
                };
                *pos = FposT {
                    pos: offset,
                    state: p.state.to_raw(),
                };
                0
            }
            Some(Err(e)) => {
                set_abi_errno(e.errno());
                -1
            }
            None => -1,
        }
    }
}

abi_fn! {
    /// POSIX `fsetpos`.
    fn fsetpos(fp: *mut FILE, pos: *const FposT) -> c_int {
        if pos.is_null() || (*pos).pos < 0 {
            set_abi_errno(errno::EINVAL);
            return -1;
        }
        let saved = StreamPos {
            offset: (*pos).pos as u64,
            state: MbState::from_raw((*pos).state),
        };
        status(with_stream(fp, |s| s.set_pos(&saved)), -1)
    }
}

// ---------------------------------------------------------------------------
// Buffering control
// ---------------------------------------------------------------------------

abi_fn! {
    /// POSIX `setvbuf`. The stream always allocates its own buffer; `buf`
    /// only selects the size.
    fn setvbuf(fp: *mut FILE, buf: *mut c_char, mode: c_int, size: usize) -> c_int {
        let _ = buf;
        let Some(mode) = BufMode::from_posix(mode) else {
            set_abi_errno(errno::EINVAL);
            return -1;
        };
        let size = (size > 0).then_some(size);
        status(with_stream(fp, |s| s.set_buffering(mode, size)), -1)
    }
}

abi_fn! {
    /// POSIX `setbuf`.
    fn setbuf(fp: *mut FILE, buf: *mut c_char) {
        let mode = if buf.is_null() { IONBF } else { IOFBF };
        let _ = setvbuf(fp, buf, mode, BUFSIZ);
    }
}

abi_fn! {
    /// BSD `setlinebuf`.
    fn setlinebuf(fp: *mut FILE) {
        let _ = setvbuf(fp, ptr::null_mut(), IOLBF, 0);
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

abi_fn! {
    /// POSIX `feof`.
    fn feof(fp: *mut FILE) -> c_int {
        with_stream(fp, |s| c_int::from(s.is_eof())).unwrap_or(0)
    }
}

abi_fn! {
    /// POSIX `ferror`.
    fn ferror(fp: *mut FILE) -> c_int {
        with_stream(fp, |s| c_int::from(s.is_error())).unwrap_or(0)
    }
}

abi_fn! {
    /// POSIX `clearerr`.
    fn clearerr(fp: *mut FILE) {
        let _ = with_stream(fp, |s| s.clear_err());
    }
}

abi_fn! {
    /// POSIX `fileno`; `EBADF` for streams without a descriptor.
    fn fileno(fp: *mut FILE) -> c_int {
        match with_stream(fp, |s| s.fileno()) {
            Some(Some(fd)) => fd,
            Some(None) => {
                set_abi_errno(errno::EBADF);
                -1
            }
            None => -1,
        }
    }
}

abi_fn! {
    /// ISO C `fwide`.
    fn fwide(fp: *mut FILE, mode: c_int) -> c_int {
        with_stream(fp, |s| s.fwide(mode)).unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Locking
// ---------------------------------------------------------------------------

abi_fn! {
    /// POSIX `flockfile`.
    fn flockfile(fp: *mut FILE) {
        registry().lock_file(fp as StreamId);
    }
}

abi_fn! {
    /// POSIX `ftrylockfile`: 0 when the lock was taken.
    fn ftrylockfile(fp: *mut FILE) -> c_int {
        if registry().try_lock_file(fp as StreamId) { 0 } else { -1 }
    }
}

abi_fn! {
    /// POSIX `funlockfile`.
    fn funlockfile(fp: *mut FILE) {
        registry().unlock_file(fp as StreamId);
    }
}
