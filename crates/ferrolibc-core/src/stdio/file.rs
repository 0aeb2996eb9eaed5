//! FILE stream state management.
//!
//! Clean-room implementation of the POSIX FILE abstraction.
//! Manages the backend, buffering, flags, orientation and position.
//!
//! Reference: POSIX.1-2024 fopen, ISO C11 7.21.5
//!
//! `StdioStream` is the safe Rust model of a C `FILE`. The ABI layer keeps
//! these in the registry and hands out opaque pointers to C callers.
//!
//! Failures latch on the stream (`ferror`), set the thread-local errno and
//! surface as [`StdioError`]. End of input latches `feof` and is not an
//! error.

use log::{debug, warn};

use super::backend::{RawIo, Whence};
use super::buffer::{BufMode, Direction, StreamBuffer, write_through};
use super::error::StdioError;
use crate::errno;
use crate::locale::{self, Encoding};
use crate::wchar::MbState;

/// Guaranteed pushback depth for `ungetc`/`ungetwc`.
pub const UNGET_SLOTS: usize = 8;

// ---------------------------------------------------------------------------
// Stream flags
// ---------------------------------------------------------------------------

/// File open mode flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OpenFlags {
    pub readable: bool,
    pub writable: bool,
    pub append: bool,
    pub truncate: bool,
    pub create: bool,
    pub binary: bool,
    pub exclusive: bool,
    pub cloexec: bool,
}

/// Latched stream indicators.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamFlags {
    pub eof: bool,
    pub error: bool,
}

/// Byte/wide orientation (`fwide`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Orientation {
    #[default]
    Unset,
    Byte,
    Wide,
}

/// Saved position for `fgetpos`/`fsetpos`: offset plus conversion state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamPos {
    pub offset: u64,
    pub state: MbState,
}

/// A write that stopped early: bytes accepted and the backend's error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ShortWrite {
    pub(crate) written: usize,
    pub(crate) error: StdioError,
}

// ---------------------------------------------------------------------------
// Mode parsing
// ---------------------------------------------------------------------------

/// Parse a POSIX fopen mode string (e.g. "r", "w+", "rb", "a+b", "re").
///
/// Modifiers after the base character may appear in any order. A `,`
/// ends the mode (glibc `ccs=` suffixes are ignored).
///
/// Returns `None` if the mode string is invalid.
pub fn parse_mode(mode: &[u8]) -> Option<OpenFlags> {
    let (&base, rest) = mode.split_first()?;

    let mut flags = OpenFlags::default();
    match base {
        b'r' => {
            flags.readable = true;
        }
        b'w' => {
            flags.writable = true;
            flags.create = true;
            flags.truncate = true;
        }
        b'a' => {
            flags.writable = true;
            flags.create = true;
            flags.append = true;
        }
        _ => return None,
    }

    for &c in rest {
        match c {
            b'+' => {
                flags.readable = true;
                flags.writable = true;
            }
            b'b' => flags.binary = true,
            b'x' => flags.exclusive = true,
            b'e' => flags.cloexec = true,
            b'm' => {}
            b',' => break,
            _ => return None,
        }
    }

    Some(flags)
}

/// Convert open flags to POSIX O_* flag bits.
pub fn flags_to_oflags(flags: &OpenFlags) -> i32 {
    let mut oflags = 0i32;

    if flags.readable && flags.writable {
        oflags |= 2; // O_RDWR
    } else if flags.writable {
        oflags |= 1; // O_WRONLY
    }

    if flags.create {
        oflags |= 0o100; // O_CREAT
    }
    if flags.truncate {
        oflags |= 0o1000; // O_TRUNC
    }
    if flags.append {
        oflags |= 0o2000; // O_APPEND
    }
    if flags.exclusive {
        oflags |= 0o200; // O_EXCL
    }
    if flags.cloexec {
        oflags |= 0o2000000; // O_CLOEXEC
    }

    oflags
}

/// Access mode implied by `fcntl(F_GETFL)` bits, for `fdopen` checks.
pub fn oflags_allow(oflags: i32, wanted: &OpenFlags) -> bool {
    let acc = oflags & 3;
    let can_read = acc == 0 || acc == 2;
    let can_write = acc == 1 || acc == 2;
    (!wanted.readable || can_read) && (!wanted.writable || can_write)
}

/// Default buffering for a descriptor-backed stream.
///
/// stderr is unbuffered; interactive devices are line-buffered; everything
/// else is fully buffered.
pub fn default_buf_mode(fd: Option<i32>, is_tty: bool) -> BufMode {
    match fd {
        Some(2) => BufMode::None,
        _ if is_tty => BufMode::Line,
        _ => BufMode::Full,
    }
}

// ---------------------------------------------------------------------------
// Stream
// ---------------------------------------------------------------------------

/// POSIX FILE stream.
pub struct StdioStream {
    backend: Box<dyn RawIo>,
    buffer: StreamBuffer,
    open_flags: OpenFlags,
    flags: StreamFlags,
    orientation: Orientation,
    /// Conversion state for wide orientation.
    mb_state: MbState,
    /// Encoding bound when the stream became wide-oriented.
    encoding: Encoding,
    /// Pushback stack; the last element is read next.
    pushback: Vec<u8>,
    /// Leave the backend open on close.
    borrowed: bool,
    closed: bool,
}

impl std::fmt::Debug for StdioStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StdioStream")
            .field("fd", &self.backend.fd())
            .field("open_flags", &self.open_flags)
            .field("flags", &self.flags)
            .field("orientation", &self.orientation)
            .field("mode", &self.buffer.mode())
            .field("direction", &self.buffer.direction())
            .field("pushback", &self.pushback.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl StdioStream {
    /// Create a stream over `backend` with the given buffering and the
    /// configured default buffer size.
    pub fn new(backend: Box<dyn RawIo>, open_flags: OpenFlags, mode: BufMode) -> Result<Self, StdioError> {
        Self::with_buffer_size(backend, open_flags, mode, None)
    }

    /// Create a stream with an explicit buffer size.
    pub fn with_buffer_size(
        backend: Box<dyn RawIo>,
        open_flags: OpenFlags,
        mode: BufMode,
        size: Option<usize>,
    ) -> Result<Self, StdioError> {
        let buffer = StreamBuffer::acquire(mode, size).map_err(|e| {
            errno::set_errno(e);
            StdioError::from_errno(e)
        })?;
        debug!(
            "stdio stream open: fd={:?} mode={mode:?} read={} write={}",
            backend.fd(),
            open_flags.readable,
            open_flags.writable
        );
        Ok(Self {
            backend,
            buffer,
            open_flags,
            flags: StreamFlags::default(),
            orientation: Orientation::Unset,
            mb_state: MbState::new(),
            encoding: Encoding::Utf8,
            pushback: Vec::with_capacity(UNGET_SLOTS),
            borrowed: false,
            closed: false,
        })
    }

    /// Create a stream with default buffering for its backend.
    pub fn open_default(backend: Box<dyn RawIo>, open_flags: OpenFlags) -> Result<Self, StdioError> {
        let mode = default_buf_mode(backend.fd(), backend.is_tty());
        Self::new(backend, open_flags, mode)
    }

    /// Do not close the backend when the stream closes.
    pub fn borrowed(mut self) -> Self {
        self.borrowed = true;
        self
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Underlying file descriptor (`fileno`).
    pub fn fileno(&self) -> Option<i32> {
        self.backend.fd()
    }

    pub fn open_flags(&self) -> OpenFlags {
        self.open_flags
    }

    pub fn is_readable(&self) -> bool {
        self.open_flags.readable
    }

    pub fn is_writable(&self) -> bool {
        self.open_flags.writable
    }

    /// `feof`.
    pub fn is_eof(&self) -> bool {
        self.flags.eof
    }

    /// `ferror`.
    pub fn is_error(&self) -> bool {
        self.flags.error
    }

    /// `clearerr`.
    pub fn clear_err(&mut self) {
        self.flags = StreamFlags::default();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn buf_mode(&self) -> BufMode {
        self.buffer.mode()
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// Encoding used by wide operations on this stream.
    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// Current wide conversion state.
    pub fn mb_state(&self) -> MbState {
        self.mb_state
    }

    pub(crate) fn mb_state_mut(&mut self) -> &mut MbState {
        &mut self.mb_state
    }

    /// Bytes staged for output.
    pub fn pending_output(&self) -> usize {
        self.buffer.pending().len()
    }

    // -----------------------------------------------------------------------
    // Internal state transitions
    // -----------------------------------------------------------------------

    /// Record a failure: set errno, optionally latch the error flag.
    pub(crate) fn fail(&mut self, err: StdioError, latch: bool) -> StdioError {
        if latch {
            self.flags.error = true;
        }
        errno::set_errno(err.errno());
        warn!("stdio stream error: {err} (fd={:?})", self.backend.fd());
        err
    }

    /// Fix the orientation, or fail if it is already the other kind.
    pub(crate) fn claim(&mut self, want: Orientation) -> Result<(), StdioError> {
        if self.orientation == want {
            return Ok(());
        }
        if self.orientation == Orientation::Unset {
            self.orientation = want;
            if want == Orientation::Wide {
                self.encoding = locale::current_encoding();
            }
            debug!("stdio stream orientation fixed: {want:?}");
            return Ok(());
        }
        Err(self.fail(StdioError::Orientation, true))
    }

    fn ensure_open(&mut self) -> Result<(), StdioError> {
        if self.closed {
            errno::set_errno(errno::EBADF);
            return Err(StdioError::Closed);
        }
        Ok(())
    }

    fn begin_read(&mut self) -> Result<(), StdioError> {
        self.ensure_open()?;
        if !self.open_flags.readable {
            return Err(self.fail(StdioError::NotReadable, true));
        }
        if self.buffer.direction() == Direction::Writing {
            self.drain_output()?;
        }
        Ok(())
    }

    fn begin_write(&mut self) -> Result<(), StdioError> {
        self.ensure_open()?;
        if !self.open_flags.writable {
            return Err(self.fail(StdioError::NotWritable, true));
        }
        if self.buffer.direction() == Direction::Reading || !self.pushback.is_empty() {
            self.drop_read_ahead()?;
        }
        Ok(())
    }

    /// Unread input plus pushback, in bytes.
    fn unread_len(&self) -> usize {
        self.buffer.readable() + self.pushback.len()
    }

    /// Discard read-ahead, moving the backend back to the logical position.
    /// If the backend cannot seek, the read-ahead is kept and the switch
    /// fails with the error indicator latched.
    fn drop_read_ahead(&mut self) -> Result<(), StdioError> {
        let unread = self.unread_len();
        if unread > 0 {
            if let Err(e) = self.backend.raw_seek(-(unread as i64), Whence::Cur) {
                return Err(self.fail(StdioError::from_errno(e), true));
            }
        }
        self.buffer.discard_input();
        self.pushback.clear();
        Ok(())
    }

    fn drain_output(&mut self) -> Result<(), StdioError> {
        match self.buffer.drain(self.backend.as_mut()) {
            Ok(_) => Ok(()),
            Err(e) => Err(self.fail(StdioError::from_errno(e), true)),
        }
    }

    /// One backend read. `Ok(false)` means end of input (EOF latched).
    fn fill_buffer(&mut self) -> Result<bool, StdioError> {
        match self.buffer.fill(self.backend.as_mut()) {
            Ok(0) => {
                self.flags.eof = true;
                Ok(false)
            }
            Ok(_) => Ok(true),
            Err(e) => Err(self.fail(StdioError::from_errno(e), true)),
        }
    }

    /// Next byte without orientation checks.
    pub(crate) fn next_byte(&mut self) -> Result<Option<u8>, StdioError> {
        self.begin_read()?;
        if let Some(b) = self.pushback.pop() {
            return Ok(Some(b));
        }
        if let Some(b) = self.buffer.pop_byte() {
            return Ok(Some(b));
        }
        if self.flags.eof || !self.fill_buffer()? {
            return Ok(None);
        }
        Ok(self.buffer.pop_byte())
    }

    /// Look at the next byte without consuming it.
    pub(crate) fn peek_byte(&mut self) -> Result<Option<u8>, StdioError> {
        self.begin_read()?;
        if let Some(&b) = self.pushback.last() {
            return Ok(Some(b));
        }
        if let Some(b) = self.buffer.peek_byte() {
            return Ok(Some(b));
        }
        if self.flags.eof || !self.fill_buffer()? {
            return Ok(None);
        }
        Ok(self.buffer.peek_byte())
    }

    /// Push bytes back so that `bytes[0]` is read first.
    pub(crate) fn push_back(&mut self, bytes: &[u8]) -> Result<(), StdioError> {
        self.ensure_open()?;
        if !self.open_flags.readable {
            return Err(StdioError::NotReadable);
        }
        if self.buffer.direction() == Direction::Writing {
            self.drain_output()?;
        }
        if self.pushback.len() + bytes.len() > UNGET_SLOTS {
            return Err(StdioError::PushbackFull);
        }
        self.pushback.extend(bytes.iter().rev());
        self.flags.eof = false;
        Ok(())
    }

    /// Write bytes without orientation checks, following the buffering mode.
    /// Returns how many bytes were accepted.
    pub(crate) fn write_bytes(&mut self, data: &[u8]) -> Result<(), ShortWrite> {
        if data.is_empty() {
            return Ok(());
        }
        let short = |written: usize| move |error: StdioError| ShortWrite { written, error };
        self.begin_write().map_err(short(0))?;
        let mode = self.buffer.mode();
        let mut done = 0;
        while done < data.len() {
            let rest = &data[done..];
            if self.buffer.pending().is_empty() && rest.len() >= self.buffer.capacity() {
                self.buffer.mark_io_started();
                match write_through(self.backend.as_mut(), rest) {
                    Ok(n) => done += n,
                    Err((n, e)) => {
                        let error = self.fail(StdioError::from_errno(e), true);
                        return Err(ShortWrite {
                            written: done + n,
                            error,
                        });
                    }
                }
                break;
            }
            done += self.buffer.append(rest);
            if done < data.len() {
                self.drain_output().map_err(short(done))?;
            }
        }
        let must_drain = match mode {
            BufMode::None => true,
            BufMode::Line => data.contains(&b'\n'),
            BufMode::Full => false,
        };
        if must_drain {
            self.drain_output().map_err(short(done))?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Buffering control
    // -----------------------------------------------------------------------

    /// Change the buffering mode (`setvbuf`). Only legal before any I/O.
    pub fn set_buffering(&mut self, mode: BufMode, size: Option<usize>) -> Result<(), StdioError> {
        self.ensure_open()?;
        match self.buffer.set_mode(mode, size) {
            Ok(true) => Ok(()),
            Ok(false) => Err(self.fail(StdioError::InvalidArgument, false)),
            Err(e) => Err(self.fail(StdioError::from_errno(e), false)),
        }
    }

    /// `fwide`: query or set orientation. Returns >0 wide, <0 byte, 0 unset.
    pub fn fwide(&mut self, mode: i32) -> i32 {
        if self.orientation == Orientation::Unset && mode != 0 {
            let want = if mode > 0 {
                Orientation::Wide
            } else {
                Orientation::Byte
            };
            let _ = self.claim(want);
        }
        match self.orientation {
            Orientation::Wide => 1,
            Orientation::Byte => -1,
            Orientation::Unset => 0,
        }
    }

    // -----------------------------------------------------------------------
    // Byte input
    // -----------------------------------------------------------------------

    /// `fgetc`: `Ok(None)` at end of input.
    pub fn getc(&mut self) -> Result<Option<u8>, StdioError> {
        self.claim(Orientation::Byte)?;
        self.next_byte()
    }

    /// `ungetc`: push one byte back; clears EOF.
    pub fn ungetc(&mut self, byte: u8) -> Result<(), StdioError> {
        self.claim(Orientation::Byte)?;
        self.push_back(&[byte])
    }

    /// `fread` core: read up to `out.len()` bytes. A short count means end
    /// of input or an error; check [`Self::is_eof`]/[`Self::is_error`].
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        if out.is_empty() || self.claim(Orientation::Byte).is_err() || self.begin_read().is_err() {
            return 0;
        }
        let mut done = 0;
        while done < out.len() {
            match self.pushback.pop() {
                Some(b) => {
                    out[done] = b;
                    done += 1;
                }
                None => break,
            }
        }
        loop {
            done += self.buffer.take(&mut out[done..]);
            if done == out.len() || self.flags.eof {
                break;
            }
            let rest = &mut out[done..];
            if rest.len() >= self.buffer.capacity() {
                self.buffer.mark_io_started();
                match self.backend.raw_read(rest) {
                    Ok(0) => {
                        self.flags.eof = true;
                        break;
                    }
                    Ok(n) => done += n,
                    Err(e) => {
                        self.fail(StdioError::from_errno(e), true);
                        break;
                    }
                }
                continue;
            }
            match self.fill_buffer() {
                Ok(true) => {}
                Ok(false) | Err(_) => break,
            }
        }
        done
    }

    /// `fgets` core: read at most `out.len() - 1` bytes, stopping after a
    /// newline, and NUL-terminate. `None` if nothing was read before end of
    /// input, or on a read error.
    pub fn gets(&mut self, out: &mut [u8]) -> Option<usize> {
        let limit = out.len().checked_sub(1)?;
        if self.claim(Orientation::Byte).is_err() || self.begin_read().is_err() {
            return None;
        }
        let mut k = 0;
        while k < limit {
            if let Some(b) = self.pushback.pop() {
                out[k] = b;
                k += 1;
                if b == b'\n' {
                    break;
                }
                continue;
            }
            if self.buffer.readable() == 0 {
                if self.flags.eof {
                    break;
                }
                match self.fill_buffer() {
                    Ok(true) => continue,
                    Ok(false) => break,
                    Err(_) => return None,
                }
            }
            let avail = self.buffer.unread();
            let want = (limit - k).min(avail.len());
            let (n, newline) = match avail[..want].iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (want, false),
            };
            out[k..k + n].copy_from_slice(&avail[..n]);
            self.buffer.consume(n);
            k += n;
            if newline {
                break;
            }
        }
        out[k] = 0;
        if k == 0 && limit > 0 { None } else { Some(k) }
    }

    /// `getdelim` core: append bytes through `delim` (inclusive) to `out`.
    /// `Ok(None)` when end of input is reached before any byte.
    pub fn read_delim(&mut self, delim: u8, out: &mut Vec<u8>) -> Result<Option<usize>, StdioError> {
        self.claim(Orientation::Byte)?;
        self.begin_read()?;
        let start = out.len();
        loop {
            if let Some(b) = self.pushback.pop() {
                self.grow(out, 1)?;
                out.push(b);
                if b == delim {
                    break;
                }
                continue;
            }
            if self.buffer.readable() == 0 {
                if self.flags.eof || !self.fill_buffer()? {
                    break;
                }
            }
            let avail = self.buffer.unread();
            let (n, found) = match avail.iter().position(|&b| b == delim) {
                Some(i) => (i + 1, true),
                None => (avail.len(), false),
            };
            if out.try_reserve(n).is_err() {
                return Err(self.fail(StdioError::NoMemory, true));
            }
            out.extend_from_slice(&self.buffer.unread()[..n]);
            self.buffer.consume(n);
            if found {
                break;
            }
        }
        let got = out.len() - start;
        Ok((got > 0).then_some(got))
    }

    fn grow(&mut self, out: &mut Vec<u8>, extra: usize) -> Result<(), StdioError> {
        out.try_reserve(extra)
            .map_err(|_| self.fail(StdioError::NoMemory, true))
    }

    // -----------------------------------------------------------------------
    // Byte output
    // -----------------------------------------------------------------------

    /// `fputc`.
    pub fn putc(&mut self, byte: u8) -> Result<(), StdioError> {
        self.claim(Orientation::Byte)?;
        self.put_byte(byte)
    }

    pub(crate) fn put_byte(&mut self, byte: u8) -> Result<(), StdioError> {
        self.begin_write()?;
        if !self.buffer.push_byte(byte) {
            self.drain_output()?;
            self.buffer.push_byte(byte);
        }
        let must_drain = match self.buffer.mode() {
            BufMode::None => true,
            BufMode::Line => byte == b'\n',
            BufMode::Full => false,
        };
        if must_drain {
            self.drain_output()?;
        }
        Ok(())
    }

    /// `fwrite` core: returns the number of bytes accepted.
    pub fn write(&mut self, data: &[u8]) -> usize {
        if self.claim(Orientation::Byte).is_err() {
            return 0;
        }
        match self.write_bytes(data) {
            Ok(()) => data.len(),
            Err(short) => short.written,
        }
    }

    /// Write everything or report the failure.
    pub fn write_all(&mut self, data: &[u8]) -> Result<(), StdioError> {
        self.claim(Orientation::Byte)?;
        self.write_bytes(data).map_err(|short| short.error)
    }

    /// `fputs`: returns the number of bytes written.
    pub fn puts(&mut self, s: &[u8]) -> Result<usize, StdioError> {
        self.write_all(s).map(|()| s.len())
    }

    // -----------------------------------------------------------------------
    // Positioning
    // -----------------------------------------------------------------------

    /// `fseek`: flush output, discard input and pushback, clear EOF.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64, StdioError> {
        self.ensure_open()?;
        if self.buffer.direction() == Direction::Writing {
            self.drain_output()?;
        }
        let target = match whence {
            Whence::Cur => offset - self.unread_len() as i64,
            _ => offset,
        };
        let pos = self
            .backend
            .raw_seek(target, whence)
            .map_err(|e| self.fail(StdioError::from_errno(e), false))?;
        self.buffer.discard_input();
        self.pushback.clear();
        self.flags.eof = false;
        self.mb_state.reset();
        Ok(pos)
    }

    /// `ftell`: logical position, accounting for read-ahead, pushback and
    /// staged output.
    pub fn tell(&mut self) -> Result<u64, StdioError> {
        self.ensure_open()?;
        let pending = self.buffer.pending().len() as u64;
        let whence = if self.open_flags.append && pending > 0 {
            Whence::End
        } else {
            Whence::Cur
        };
        let base = self
            .backend
            .raw_seek(0, whence)
            .map_err(|e| self.fail(StdioError::from_errno(e), false))?;
        Ok((base + pending).saturating_sub(self.unread_len() as u64))
    }

    /// `rewind`: seek to the start and clear both indicators.
    pub fn rewind(&mut self) {
        let _ = self.seek(0, Whence::Set);
        self.clear_err();
    }

    /// `fgetpos`.
    pub fn get_pos(&mut self) -> Result<StreamPos, StdioError> {
        Ok(StreamPos {
            offset: self.tell()?,
            state: self.mb_state,
        })
    }

    /// `fsetpos`.
    pub fn set_pos(&mut self, pos: &StreamPos) -> Result<(), StdioError> {
        let offset = i64::try_from(pos.offset).map_err(|_| self.fail(StdioError::InvalidArgument, false))?;
        self.seek(offset, Whence::Set)?;
        self.mb_state = pos.state;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Flush / close
    // -----------------------------------------------------------------------

    /// `fflush`: write staged output. Input streams are left untouched:
    /// read-ahead and pushback survive.
    pub fn flush(&mut self) -> Result<(), StdioError> {
        self.ensure_open()?;
        if self.buffer.direction() == Direction::Writing {
            self.drain_output()?;
        }
        if self.open_flags.writable {
            if let Err(e) = self.backend.sync() {
                return Err(self.fail(StdioError::from_errno(e), true));
            }
        }
        Ok(())
    }

    /// `fclose` core: flush, release the backend, mark closed. Returns the
    /// first error seen; the stream is closed either way.
    pub fn close(&mut self) -> Result<(), StdioError> {
        self.ensure_open()?;
        let mut first = self.flush().err();
        if !self.borrowed {
            if let Err(e) = self.backend.raw_close() {
                let err = self.fail(StdioError::from_errno(e), false);
                first.get_or_insert(err);
            }
        }
        self.closed = true;
        self.buffer.discard_input();
        self.pushback.clear();
        debug!("stdio stream closed: fd={:?}", self.backend.fd());
        first.map_or(Ok(()), Err)
    }
}

impl Drop for StdioStream {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.close();
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stdio::backend::{MemBackend, PipeBackend, SharedRegion, SharedRegionBackend};

    fn reader(input: &[u8]) -> StdioStream {
        let flags = parse_mode(b"r").unwrap();
        StdioStream::with_buffer_size(Box::new(PipeBackend::new(input)), flags, BufMode::Full, Some(4))
            .unwrap()
    }

    fn mem_stream(contents: &[u8], mode: &[u8]) -> (StdioStream, SharedRegion) {
        let shared = SharedRegion::from_bytes(contents);
        let flags = parse_mode(mode).unwrap();
        let backend = SharedRegionBackend::new(shared.clone(), &flags);
        let s = StdioStream::with_buffer_size(Box::new(backend), flags, BufMode::Full, Some(8)).unwrap();
        (s, shared)
    }

    #[test]
    fn test_parse_mode_read() {
        let f = parse_mode(b"r").unwrap();
        assert!(f.readable);
        assert!(!f.writable);
        assert!(!f.append);
    }

    #[test]
    fn test_parse_mode_write() {
        let f = parse_mode(b"w").unwrap();
        assert!(!f.readable);
        assert!(f.writable);
        assert!(f.truncate);
        assert!(f.create);
    }

    #[test]
    fn test_parse_mode_modifiers() {
        let f = parse_mode(b"a+").unwrap();
        assert!(f.readable && f.writable && f.append);
        assert!(parse_mode(b"rb").unwrap().binary);
        assert!(parse_mode(b"wx").unwrap().exclusive);
        assert!(parse_mode(b"re").unwrap().cloexec);
        assert!(parse_mode(b"r,ccs=UTF-8").unwrap().readable);
    }

    #[test]
    fn test_parse_mode_invalid() {
        assert!(parse_mode(b"").is_none());
        assert!(parse_mode(b"z").is_none());
        assert!(parse_mode(b"rq").is_none());
    }

    #[test]
    fn test_flags_to_oflags() {
        let o = flags_to_oflags(&parse_mode(b"w").unwrap());
        assert_ne!(o & 1, 0);
        assert_ne!(o & 0o100, 0);
        assert_ne!(o & 0o1000, 0);
        assert_ne!(flags_to_oflags(&parse_mode(b"r+").unwrap()) & 2, 0);
    }

    #[test]
    fn test_oflags_allow() {
        let w = parse_mode(b"w").unwrap();
        let r = parse_mode(b"r").unwrap();
        assert!(oflags_allow(2, &w));
        assert!(!oflags_allow(0, &w));
        assert!(oflags_allow(0, &r));
        assert!(!oflags_allow(1, &r));
    }

    #[test]
    fn test_default_buf_modes() {
        assert_eq!(default_buf_mode(Some(2), true), BufMode::None);
        assert_eq!(default_buf_mode(Some(1), true), BufMode::Line);
        assert_eq!(default_buf_mode(Some(1), false), BufMode::Full);
        assert_eq!(default_buf_mode(None, false), BufMode::Full);
    }

    #[test]
    fn test_getc_until_eof_latches() {
        let mut s = reader(b"ab");
        assert_eq!(s.getc(), Ok(Some(b'a')));
        assert_eq!(s.getc(), Ok(Some(b'b')));
        assert_eq!(s.getc(), Ok(None));
        assert!(s.is_eof());
        assert!(!s.is_error());
        s.clear_err();
        assert!(!s.is_eof());
    }

    #[test]
    fn test_ungetc_clears_eof_and_is_read_first() {
        let mut s = reader(b"x");
        assert_eq!(s.getc(), Ok(Some(b'x')));
        assert_eq!(s.getc(), Ok(None));
        s.ungetc(b'y').unwrap();
        assert!(!s.is_eof());
        assert_eq!(s.getc(), Ok(Some(b'y')));
    }

    #[test]
    fn test_pushback_capacity() {
        let mut s = reader(b"");
        for b in 0..UNGET_SLOTS as u8 {
            s.ungetc(b).unwrap();
        }
        assert_eq!(s.ungetc(b'!'), Err(StdioError::PushbackFull));
        assert_eq!(s.getc(), Ok(Some(UNGET_SLOTS as u8 - 1)));
    }

    #[test]
    fn test_read_spans_buffer_refills() {
        let mut s = reader(b"hello world, long input");
        let mut out = [0u8; 11];
        assert_eq!(s.read(&mut out), 11);
        assert_eq!(&out, b"hello world");
        let mut rest = [0u8; 64];
        assert_eq!(s.read(&mut rest), 12);
        assert!(s.is_eof());
    }

    #[test]
    fn test_gets_stops_after_newline() {
        let mut s = reader(b"first line\nsecond");
        let mut out = [0u8; 32];
        assert_eq!(s.gets(&mut out), Some(11));
        assert_eq!(&out[..12], b"first line\n\0");
        assert_eq!(s.gets(&mut out), Some(6));
        assert_eq!(&out[..7], b"second\0");
        assert_eq!(s.gets(&mut out), None);
    }

    #[test]
    fn test_gets_respects_limit() {
        let mut s = reader(b"abcdef\n");
        let mut out = [0xffu8; 4];
        assert_eq!(s.gets(&mut out), Some(3));
        assert_eq!(&out, b"abc\0");
        let mut one = [0xffu8; 1];
        assert_eq!(s.gets(&mut one), Some(0));
        assert_eq!(one[0], 0);
    }

    #[test]
    fn test_read_delim_accumulates() {
        let mut s = reader(b"a,bb,ccc");
        let mut field = Vec::new();
        assert_eq!(s.read_delim(b',', &mut field), Ok(Some(2)));
        assert_eq!(field, b"a,");
        field.clear();
        assert_eq!(s.read_delim(b',', &mut field), Ok(Some(3)));
        field.clear();
        assert_eq!(s.read_delim(b',', &mut field), Ok(Some(3)));
        assert_eq!(field, b"ccc");
        field.clear();
        assert_eq!(s.read_delim(b',', &mut field), Ok(None));
    }

    #[test]
    fn test_write_on_read_only_latches_error() {
        let mut s = reader(b"");
        assert_eq!(s.write(b"x"), 0);
        assert!(s.is_error());
        assert_eq!(errno::get_errno(), errno::EBADF);
    }

    #[test]
    fn test_full_buffering_defers_output() {
        let pipe = PipeBackend::new(b"");
        let out = pipe.output();
        let flags = parse_mode(b"w").unwrap();
        let mut s = StdioStream::with_buffer_size(Box::new(pipe), flags, BufMode::Full, Some(8)).unwrap();
        assert_eq!(s.write(b"abc"), 3);
        assert!(out.lock().is_empty());
        assert_eq!(s.write(b"defghij"), 7);
        assert_eq!(out.lock().as_slice(), b"abcdefgh");
        s.flush().unwrap();
        assert_eq!(out.lock().as_slice(), b"abcdefghij");
    }

    #[test]
    fn test_line_buffering_flushes_at_newline() {
        let pipe = PipeBackend::new(b"");
        let out = pipe.output();
        let flags = parse_mode(b"w").unwrap();
        let mut s = StdioStream::with_buffer_size(Box::new(pipe), flags, BufMode::Line, Some(64)).unwrap();
        s.puts(b"partial").unwrap();
        assert!(out.lock().is_empty());
        s.putc(b'\n').unwrap();
        assert_eq!(out.lock().as_slice(), b"partial\n");
    }

    #[test]
    fn test_unbuffered_writes_immediately() {
        let pipe = PipeBackend::new(b"");
        let out = pipe.output();
        let flags = parse_mode(b"w").unwrap();
        let mut s = StdioStream::new(Box::new(pipe), flags, BufMode::None).unwrap();
        s.putc(b'a').unwrap();
        assert_eq!(s.write(b"bc"), 2);
        assert_eq!(out.lock().as_slice(), b"abc");
    }

    #[test]
    fn test_write_error_latches() {
        let pipe = PipeBackend::new(b"").with_write_error(errno::EPIPE);
        let flags = parse_mode(b"w").unwrap();
        let mut s = StdioStream::new(Box::new(pipe), flags, BufMode::None).unwrap();
        assert_eq!(s.putc(b'a'), Err(StdioError::Io(errno::EPIPE)));
        assert!(s.is_error());
    }

    #[test]
    fn test_read_error_latches() {
        let pipe = PipeBackend::new(b"").with_read_error(errno::EIO);
        let flags = parse_mode(b"r").unwrap();
        let mut s = StdioStream::new(Box::new(pipe), flags, BufMode::Full).unwrap();
        assert_eq!(s.getc(), Err(StdioError::Io(errno::EIO)));
        assert!(s.is_error());
        assert!(!s.is_eof());
    }

    #[test]
    fn test_setvbuf_only_before_io() {
        let mut s = reader(b"abc");
        s.set_buffering(BufMode::Line, Some(16)).unwrap();
        assert_eq!(s.buf_mode(), BufMode::Line);
        s.getc().unwrap();
        assert_eq!(s.set_buffering(BufMode::None, None), Err(StdioError::InvalidArgument));
    }

    #[test]
    fn test_seek_on_pipe_fails_with_espipe() {
        let mut s = reader(b"abc");
        assert_eq!(s.seek(0, Whence::Set), Err(StdioError::NotSeekable));
        assert_eq!(errno::get_errno(), errno::ESPIPE);
        assert!(!s.is_error());
        assert_eq!(s.getc(), Ok(Some(b'a')));
    }

    #[test]
    fn test_tell_accounts_for_read_ahead_and_pushback() {
        let (mut s, _) = mem_stream(b"0123456789abcdef", b"r");
        assert_eq!(s.getc(), Ok(Some(b'0')));
        assert_eq!(s.tell(), Ok(1));
        s.ungetc(b'0').unwrap();
        assert_eq!(s.tell(), Ok(0));
        assert_eq!(s.getc(), Ok(Some(b'0')));
        assert_eq!(s.seek(2, Whence::Cur), Ok(3));
        assert_eq!(s.getc(), Ok(Some(b'3')));
        assert_eq!(s.tell(), Ok(4));
    }

    #[test]
    fn test_tell_counts_staged_output() {
        let (mut s, shared) = mem_stream(&[0u8; 32], b"w");
        s.write(b"hello");
        assert_eq!(s.tell(), Ok(5));
        s.flush().unwrap();
        assert_eq!(&shared.snapshot()[..6], b"hello\0");
    }

    #[test]
    fn test_seek_clears_eof_and_rereads() {
        let (mut s, _) = mem_stream(b"xy", b"r");
        let mut out = [0u8; 8];
        assert_eq!(s.read(&mut out), 2);
        assert!(s.is_eof());
        assert_eq!(s.seek(-1, Whence::End), Ok(1));
        assert!(!s.is_eof());
        assert_eq!(s.getc(), Ok(Some(b'y')));
    }

    #[test]
    fn test_read_then_write_repositions() {
        let (mut s, shared) = mem_stream(b"abcdefgh", b"r+");
        assert_eq!(s.getc(), Ok(Some(b'a')));
        s.seek(0, Whence::Cur).unwrap();
        s.putc(b'Z').unwrap();
        s.flush().unwrap();
        assert_eq!(shared.snapshot(), b"aZcdefgh");
    }

    #[test]
    fn test_write_then_read_flushes_first() {
        let (mut s, shared) = mem_stream(b"abcdefgh", b"r+");
        s.write(b"XY");
        assert_eq!(s.getc(), Ok(Some(b'c')));
        assert_eq!(&shared.snapshot()[..3], b"XYc");
    }

    #[test]
    fn test_get_and_set_pos() {
        let (mut s, _) = mem_stream(b"abcdef", b"r");
        s.getc().unwrap();
        s.getc().unwrap();
        let pos = s.get_pos().unwrap();
        assert_eq!(pos.offset, 2);
        s.getc().unwrap();
        s.set_pos(&pos).unwrap();
        assert_eq!(s.getc(), Ok(Some(b'c')));
    }

    #[test]
    fn test_flush_on_reader_keeps_pushback_and_position() {
        let (mut s, _) = mem_stream(b"abcdef", b"r");
        assert_eq!(s.getc(), Ok(Some(b'a')));
        s.ungetc(b'Z').unwrap();
        s.flush().unwrap();
        assert_eq!(s.getc(), Ok(Some(b'Z')));
        assert_eq!(s.getc(), Ok(Some(b'b')));
        assert_eq!(s.tell(), Ok(2));
    }

    #[test]
    fn test_flush_on_pipe_reader_keeps_read_ahead() {
        let mut s = reader(b"xyz");
        assert_eq!(s.getc(), Ok(Some(b'x')));
        s.flush().unwrap();
        assert_eq!(s.getc(), Ok(Some(b'y')));
        assert!(!s.is_error());
    }

    #[test]
    fn test_write_after_read_on_pipe_keeps_read_ahead() {
        let pipe = PipeBackend::new(b"abc");
        let flags = parse_mode(b"r+").unwrap();
        let mut s = StdioStream::new(Box::new(pipe), flags, BufMode::Full).unwrap();
        assert_eq!(s.getc(), Ok(Some(b'a')));
        assert_eq!(s.putc(b'Z'), Err(StdioError::NotSeekable));
        assert!(s.is_error());
        assert_eq!(errno::get_errno(), errno::ESPIPE);
        s.clear_err();
        assert_eq!(s.getc(), Ok(Some(b'b')));
    }

    #[test]
    fn test_write_all_reports_backend_error_not_stale_errno() {
        let pipe = PipeBackend::new(b"").with_write_error(errno::EIO);
        let flags = parse_mode(b"w").unwrap();
        let mut s = StdioStream::with_buffer_size(Box::new(pipe), flags, BufMode::Full, Some(4)).unwrap();
        errno::set_errno(errno::ENOMEM);
        assert_eq!(s.write_all(b"0123456789"), Err(StdioError::Io(errno::EIO)));
        errno::set_errno(0);
        assert_eq!(s.write_all(b"ab"), Ok(()));
        assert_eq!(s.flush(), Err(StdioError::Io(errno::EIO)));
    }

    #[test]
    fn test_rewind_clears_error_and_eof() {
        let (mut s, _) = mem_stream(b"q", b"r");
        s.getc().unwrap();
        s.getc().unwrap();
        assert!(s.is_eof());
        s.rewind();
        assert!(!s.is_eof());
        assert_eq!(s.getc(), Ok(Some(b'q')));
    }

    #[test]
    fn test_close_flushes_and_rejects_further_io() {
        let mut mem = vec![0u8; 16];
        mem[0] = b'!';
        let flags = parse_mode(b"w").unwrap();
        let shared = SharedRegion::from_bytes(&mem);
        let mut s = StdioStream::new(
            Box::new(SharedRegionBackend::new(shared.clone(), &flags)),
            flags,
            BufMode::Full,
        )
        .unwrap();
        s.write(b"bye");
        s.close().unwrap();
        assert_eq!(&shared.snapshot()[..4], b"bye\0");
        assert!(s.is_closed());
        assert_eq!(s.putc(b'x'), Err(StdioError::Closed));
    }

    #[test]
    fn test_fwide_locks_orientation() {
        let mut s = reader(b"abc");
        assert_eq!(s.fwide(0), 0);
        assert_eq!(s.fwide(-5), -1);
        assert_eq!(s.fwide(1), -1);
        assert_eq!(s.orientation(), Orientation::Byte);
    }

    #[test]
    fn test_memory_region_stream() {
        let flags = parse_mode(b"r").unwrap();
        let backend = MemBackend::new(b"mem".to_vec(), &flags);
        let mut s = StdioStream::new(Box::new(backend), flags, BufMode::Full).unwrap();
        let mut out = Vec::new();
        assert_eq!(s.read_delim(b'\n', &mut out), Ok(Some(3)));
        assert_eq!(out, b"mem");
    }
}
