//! Buffered I/O engine.
//!
//! Clean-room implementation of POSIX stdio buffering semantics.
//! Three modes: fully-buffered (_IOFBF), line-buffered (_IOLBF),
//! and unbuffered (_IONBF).
//!
//! Reference: POSIX.1-2024 setvbuf, ISO C11 7.21.3
//!
//! The buffer holds either unread input or unflushed output, never both.
//! [`Direction`] records which; the stream switches direction only through
//! [`StreamBuffer::drain`] or [`StreamBuffer::discard_input`].

use log::trace;

use super::backend::RawIo;
use crate::errno;

/// Default buffer size (POSIX BUFSIZ).
pub const BUFSIZ: usize = 8192;

/// Buffering mode constants matching POSIX `_IOFBF`, `_IOLBF`, `_IONBF`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufMode {
    /// Fully buffered: flush when buffer is full.
    Full,
    /// Line buffered: flush on newline or buffer full.
    Line,
    /// Unbuffered: no buffering, immediate I/O.
    None,
}

/// POSIX constant values for setvbuf mode argument.
pub const IOFBF: i32 = 0;
pub const IOLBF: i32 = 1;
pub const IONBF: i32 = 2;

impl BufMode {
    /// Convert from POSIX integer constant.
    pub fn from_posix(mode: i32) -> Option<BufMode> {
        match mode {
            IOFBF => Some(BufMode::Full),
            IOLBF => Some(BufMode::Line),
            IONBF => Some(BufMode::None),
            _ => Option::None,
        }
    }
}

/// What the buffer currently holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Idle,
    /// `data[pos..filled]` is unread input.
    Reading,
    /// `data[..pos]` is unflushed output.
    Writing,
}

/// Stream buffer.
///
/// Invariants:
/// - `pos <= filled <= data.len()` while reading
/// - `pos <= data.len()` while writing, `filled == 0`
#[derive(Debug)]
pub struct StreamBuffer {
    data: Vec<u8>,
    pos: usize,
    filled: usize,
    mode: BufMode,
    direction: Direction,
    /// Whether any I/O has occurred (disables setvbuf changes per POSIX).
    io_started: bool,
}

fn alloc(capacity: usize) -> Result<Vec<u8>, i32> {
    let mut data = Vec::new();
    data.try_reserve_exact(capacity).map_err(|_| errno::ENOMEM)?;
    data.resize(capacity, 0);
    Ok(data)
}

/// Unbuffered streams still stage one byte so reads and pushback share a path.
fn effective_capacity(mode: BufMode, requested: usize) -> usize {
    match mode {
        BufMode::None => 1,
        _ => requested.max(1),
    }
}

impl StreamBuffer {
    /// Allocate a buffer for `mode`, sized by `hint` or the configured default.
    pub fn acquire(mode: BufMode, hint: Option<usize>) -> Result<Self, i32> {
        let size = hint.unwrap_or_else(|| crate::config::stdio_config().buffer_size);
        Ok(Self {
            data: alloc(effective_capacity(mode, size))?,
            pos: 0,
            filled: 0,
            mode,
            direction: Direction::Idle,
            io_started: false,
        })
    }

    /// Current buffering mode.
    pub fn mode(&self) -> BufMode {
        self.mode
    }

    /// Buffer capacity.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn io_started(&self) -> bool {
        self.io_started
    }

    /// Record I/O that bypassed the buffer.
    pub fn mark_io_started(&mut self) {
        self.io_started = true;
    }

    /// Change buffering mode and optionally resize.
    ///
    /// Returns `Ok(false)` if I/O has already occurred (POSIX disallows this).
    pub fn set_mode(&mut self, mode: BufMode, size: Option<usize>) -> Result<bool, i32> {
        if self.io_started {
            return Ok(false);
        }
        let cap = effective_capacity(mode, size.unwrap_or(self.data.len().max(BUFSIZ)));
        if cap != self.data.len() {
            self.data = alloc(cap)?;
        }
        self.mode = mode;
        self.pos = 0;
        self.filled = 0;
        self.direction = Direction::Idle;
        Ok(true)
    }

    // -----------------------------------------------------------------------
    // Read-side operations
    // -----------------------------------------------------------------------

    /// Number of buffered bytes available for reading.
    pub fn readable(&self) -> usize {
        match self.direction {
            Direction::Reading => self.filled - self.pos,
            _ => 0,
        }
    }

    /// Next unread byte without consuming it.
    pub fn peek_byte(&self) -> Option<u8> {
        (self.readable() > 0).then(|| self.data[self.pos])
    }

    /// Consume one buffered byte.
    pub fn pop_byte(&mut self) -> Option<u8> {
        let b = self.peek_byte()?;
        self.pos += 1;
        Some(b)
    }

    /// Unread input as a slice.
    pub fn unread(&self) -> &[u8] {
        match self.direction {
            Direction::Reading => &self.data[self.pos..self.filled],
            _ => &[],
        }
    }

    /// Consume `n` buffered bytes (after inspecting [`Self::unread`]).
    pub fn consume(&mut self, n: usize) {
        debug_assert!(n <= self.readable());
        self.pos += n.min(self.readable());
    }

    /// Copy buffered input into `out`, returning the count.
    pub fn take(&mut self, out: &mut [u8]) -> usize {
        let n = out.len().min(self.readable());
        out[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    /// Perform one backend read into the (empty) buffer.
    ///
    /// Returns the number of bytes now readable; 0 means end of input.
    pub fn fill(&mut self, io: &mut dyn RawIo) -> Result<usize, i32> {
        debug_assert_eq!(self.readable(), 0);
        debug_assert_ne!(self.direction, Direction::Writing);
        self.io_started = true;
        self.pos = 0;
        self.filled = 0;
        let n = io.raw_read(&mut self.data)?;
        trace!("stdio buffer fill: {n} bytes");
        self.filled = n.min(self.data.len());
        self.direction = if n == 0 {
            Direction::Idle
        } else {
            Direction::Reading
        };
        Ok(self.filled)
    }

    /// Drop unread input, returning how many bytes were discarded.
    pub fn discard_input(&mut self) -> usize {
        let dropped = self.readable();
        if self.direction == Direction::Reading {
            self.direction = Direction::Idle;
        }
        self.pos = 0;
        self.filled = 0;
        dropped
    }

    // -----------------------------------------------------------------------
    // Write-side operations
    // -----------------------------------------------------------------------

    /// Bytes staged for output.
    pub fn pending(&self) -> &[u8] {
        match self.direction {
            Direction::Writing => &self.data[..self.pos],
            _ => &[],
        }
    }

    /// Free space for output.
    pub fn space(&self) -> usize {
        match self.direction {
            Direction::Reading => 0,
            _ => self.data.len() - self.pending().len(),
        }
    }

    fn begin_write(&mut self) {
        if self.direction != Direction::Writing {
            debug_assert_eq!(self.readable(), 0);
            self.direction = Direction::Writing;
            self.pos = 0;
            self.filled = 0;
        }
        self.io_started = true;
    }

    /// Stage one byte. Returns `false` if the buffer is full.
    pub fn push_byte(&mut self, b: u8) -> bool {
        self.begin_write();
        if self.pos == self.data.len() {
            return false;
        }
        self.data[self.pos] = b;
        self.pos += 1;
        true
    }

    /// Stage as much of `bytes` as fits, returning the count staged.
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        self.begin_write();
        let n = bytes.len().min(self.data.len() - self.pos);
        self.data[self.pos..self.pos + n].copy_from_slice(&bytes[..n]);
        self.pos += n;
        n
    }

    /// Write all pending output to the backend, looping over short writes.
    ///
    /// On failure the unwritten remainder stays staged.
    pub fn drain(&mut self, io: &mut dyn RawIo) -> Result<usize, i32> {
        if self.direction != Direction::Writing {
            return Ok(0);
        }
        let mut done = 0;
        let result = loop {
            if done == self.pos {
                break Ok(done);
            }
            match io.raw_write(&self.data[done..self.pos]) {
                Ok(0) => break Err(errno::EIO),
                Ok(n) => done += n,
                Err(e) => break Err(e),
            }
        };
        trace!("stdio buffer drain: {done} of {} bytes", self.pos);
        self.data.copy_within(done..self.pos, 0);
        self.pos -= done;
        if self.pos == 0 {
            self.direction = Direction::Idle;
        }
        result
    }
}

/// Write `bytes` straight to the backend, looping over short writes.
pub fn write_through(io: &mut dyn RawIo, bytes: &[u8]) -> Result<usize, (usize, i32)> {
    let mut done = 0;
    while done < bytes.len() {
        match io.raw_write(&bytes[done..]) {
            Ok(0) => return Err((done, errno::EIO)),
            Ok(n) => done += n,
            Err(e) => return Err((done, e)),
        }
    }
    Ok(done)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
