//! Raw I/O seam beneath the stream buffer.
//!
//! A stream never touches a file descriptor directly; it reads, writes and
//! seeks through a [`RawIo`] implementation. The fd-backed implementation
//! lives in the ABI crate. This module provides the in-process ones:
//! fixed memory regions (`fmemopen`), growable memory streams
//! (`open_memstream`), and a non-seekable pipe used for testing.
//!
//! Contract for implementors: errors are errno values, `EINTR` is retried
//! inside the implementation, and a read of 0 bytes means end of input.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::errno;

/// Seek origin (`SEEK_SET`, `SEEK_CUR`, `SEEK_END`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Whence {
    Set,
    Cur,
    End,
}

pub const SEEK_SET: i32 = 0;
pub const SEEK_CUR: i32 = 1;
pub const SEEK_END: i32 = 2;

impl Whence {
    /// Convert from POSIX integer constant.
    pub fn from_posix(whence: i32) -> Option<Self> {
        match whence {
            SEEK_SET => Some(Self::Set),
            SEEK_CUR => Some(Self::Cur),
            SEEK_END => Some(Self::End),
            _ => None,
        }
    }
}

/// Low-level I/O collaborator.
pub trait RawIo: Send {
    /// Read up to `buf.len()` bytes. `Ok(0)` is end of input.
    fn raw_read(&mut self, buf: &mut [u8]) -> Result<usize, i32>;

    /// Write some prefix of `buf`, returning how much was accepted.
    fn raw_write(&mut self, buf: &[u8]) -> Result<usize, i32>;

    /// Reposition, returning the new absolute offset.
    fn raw_seek(&mut self, offset: i64, whence: Whence) -> Result<u64, i32>;

    /// Release the underlying resource.
    fn raw_close(&mut self) -> Result<(), i32>;

    /// Publish buffered state after a flush (memory streams update the
    /// caller's view here).
    fn sync(&mut self) -> Result<(), i32> {
        Ok(())
    }

    /// Underlying descriptor, if any.
    fn fd(&self) -> Option<i32> {
        None
    }

    /// Whether the backend is an interactive device.
    fn is_tty(&self) -> bool {
        false
    }
}

fn resolve_seek(offset: i64, whence: Whence, pos: usize, end: usize) -> Result<usize, i32> {
    let base = match whence {
        Whence::Set => 0i64,
        Whence::Cur => pos as i64,
        Whence::End => end as i64,
    };
    let target = base.checked_add(offset).ok_or(errno::EOVERFLOW)?;
    if target < 0 {
        return Err(errno::EINVAL);
    }
    Ok(target as usize)
}

// ---------------------------------------------------------------------------
// Fixed memory region (fmemopen)
// ---------------------------------------------------------------------------

/// Byte storage a [`MemBackend`] operates on.
pub trait Region: Send {
    fn bytes(&self) -> &[u8];
    fn bytes_mut(&mut self) -> &mut [u8];
}

impl Region for Vec<u8> {
    fn bytes(&self) -> &[u8] {
        self
    }
    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }
}

impl Region for Box<[u8]> {
    fn bytes(&self) -> &[u8] {
        self
    }
    fn bytes_mut(&mut self) -> &mut [u8] {
        self
    }
}

/// Position bookkeeping shared by the `fmemopen` backends.
///
/// Reads stop at the current content length; writes stop at the region
/// size and keep a NUL terminator after the content while space remains.
#[derive(Debug, Clone, Copy)]
struct MemCursor {
    pos: usize,
    len: usize,
    append: bool,
}

impl MemCursor {
    fn open(bytes: &mut [u8], flags: &super::file::OpenFlags) -> Self {
        let size = bytes.len();
        let len = if flags.truncate {
            if size > 0 {
                bytes[0] = 0;
            }
            0
        } else if flags.append {
            bytes.iter().position(|&b| b == 0).unwrap_or(size)
        } else {
            size
        };
        Self {
            pos: if flags.append { len } else { 0 },
            len,
            append: flags.append,
        }
    }

    fn read(&mut self, bytes: &[u8], buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.len.saturating_sub(self.pos));
        buf[..n].copy_from_slice(&bytes[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    fn write(&mut self, bytes: &mut [u8], buf: &[u8]) -> Result<usize, i32> {
        if self.append {
            self.pos = self.len;
        }
        let size = bytes.len();
        let n = buf.len().min(size.saturating_sub(self.pos));
        if n == 0 && !buf.is_empty() {
            return Err(errno::ENOSPC);
        }
        bytes[self.pos..self.pos + n].copy_from_slice(&buf[..n]);
        self.pos += n;
        if self.pos > self.len {
            self.len = self.pos;
            if self.len < size {
                bytes[self.len] = 0;
            }
        }
        Ok(n)
    }

    fn seek(&mut self, size: usize, offset: i64, whence: Whence) -> Result<u64, i32> {
        let target = resolve_seek(offset, whence, self.pos, self.len)?;
        if target > size {
            return Err(errno::EINVAL);
        }
        self.pos = target;
        Ok(target as u64)
    }
}

/// `fmemopen` backend over a fixed-size region.
#[derive(Debug)]
pub struct MemBackend<R: Region> {
    region: R,
    cursor: MemCursor,
}

impl<R: Region> MemBackend<R> {
    /// Open `region` with an `fopen`-style mode.
    pub fn new(mut region: R, flags: &super::file::OpenFlags) -> Self {
        let cursor = MemCursor::open(region.bytes_mut(), flags);
        Self { region, cursor }
    }

    pub fn region(&self) -> &R {
        &self.region
    }
}

impl<R: Region> RawIo for MemBackend<R> {
    fn raw_read(&mut self, buf: &mut [u8]) -> Result<usize, i32> {
        Ok(self.cursor.read(self.region.bytes(), buf))
    }

    fn raw_write(&mut self, buf: &[u8]) -> Result<usize, i32> {
        self.cursor.write(self.region.bytes_mut(), buf)
    }

    fn raw_seek(&mut self, offset: i64, whence: Whence) -> Result<u64, i32> {
        let size = self.region.bytes().len();
        self.cursor.seek(size, offset, whence)
    }

    fn raw_close(&mut self) -> Result<(), i32> {
        Ok(())
    }
}

/// A region shared between a stream and an observer.
#[derive(Debug, Clone, Default)]
pub struct SharedRegion(Arc<Mutex<Vec<u8>>>);

impl SharedRegion {
    pub fn new(size: usize) -> Self {
        Self(Arc::new(Mutex::new(vec![0; size])))
    }

    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(Arc::new(Mutex::new(bytes.to_vec())))
    }

    pub fn snapshot(&self) -> Vec<u8> {
        self.0.lock().clone()
    }
}

/// `fmemopen` over a [`SharedRegion`], so tests and the harness can
/// observe what the stream wrote.
#[derive(Debug)]
pub struct SharedRegionBackend {
    shared: SharedRegion,
    cursor: MemCursor,
}

impl SharedRegionBackend {
    pub fn new(shared: SharedRegion, flags: &super::file::OpenFlags) -> Self {
        let cursor = MemCursor::open(&mut shared.0.lock(), flags);
        Self { shared, cursor }
    }
}

impl RawIo for SharedRegionBackend {
    fn raw_read(&mut self, buf: &mut [u8]) -> Result<usize, i32> {
        Ok(self.cursor.read(&self.shared.0.lock(), buf))
    }

    fn raw_write(&mut self, buf: &[u8]) -> Result<usize, i32> {
        self.cursor.write(&mut self.shared.0.lock(), buf)
    }

    fn raw_seek(&mut self, offset: i64, whence: Whence) -> Result<u64, i32> {
        let size = self.shared.0.lock().len();
        self.cursor.seek(size, offset, whence)
    }

    fn raw_close(&mut self) -> Result<(), i32> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Growable memory stream (open_memstream)
// ---------------------------------------------------------------------------

/// Callback receiving the published contents of a memory stream.
pub type SyncHook = Box<dyn FnMut(&[u8]) -> Result<(), i32> + Send>;

/// `open_memstream` backend: a write-only growable buffer.
///
/// After every flush the contents up to the smaller of the buffer length
/// and the current position are published to the observer.
pub struct MemStreamBackend {
    data: Arc<Mutex<Vec<u8>>>,
    pos: usize,
    hook: Option<SyncHook>,
}

impl std::fmt::Debug for MemStreamBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemStreamBackend")
            .field("pos", &self.pos)
            .field("len", &self.data.lock().len())
            .finish()
    }
}

impl MemStreamBackend {
    /// New empty stream; the returned handle observes the contents.
    pub fn new() -> (Self, Arc<Mutex<Vec<u8>>>) {
        let data = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                data: Arc::clone(&data),
                pos: 0,
                hook: None,
            },
            data,
        )
    }

    /// Call `hook` with the published contents after each flush.
    pub fn with_sync_hook(mut self, hook: SyncHook) -> Self {
        self.hook = Some(hook);
        self
    }

    /// Size reported to the observer.
    pub fn published_len(&self) -> usize {
        self.data.lock().len().min(self.pos)
    }
}

impl RawIo for MemStreamBackend {
    fn raw_read(&mut self, _buf: &mut [u8]) -> Result<usize, i32> {
        Err(errno::EBADF)
    }

    fn raw_write(&mut self, buf: &[u8]) -> Result<usize, i32> {
        let mut data = self.data.lock();
        let end = self.pos.checked_add(buf.len()).ok_or(errno::EOVERFLOW)?;
        if end > data.len() {
            let extra = end - data.len();
            data.try_reserve(extra).map_err(|_| errno::ENOMEM)?;
            data.resize(end, 0);
        }
        data[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(buf.len())
    }

    fn raw_seek(&mut self, offset: i64, whence: Whence) -> Result<u64, i32> {
        let len = self.data.lock().len();
        let target = resolve_seek(offset, whence, self.pos, len)?;
        self.pos = target;
        Ok(target as u64)
    }

    fn raw_close(&mut self) -> Result<(), i32> {
        self.sync()
    }

    fn sync(&mut self) -> Result<(), i32> {
        let len = self.published_len();
        if let Some(hook) = self.hook.as_mut() {
            let data = self.data.lock();
            hook(&data[..len])?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Pipe (non-seekable)
// ---------------------------------------------------------------------------

/// In-process FIFO: reads drain a preloaded input queue, writes append to a
/// shared output vector, seeks fail with `ESPIPE`.
///
/// Optional knobs inject short transfers and errors.
#[derive(Debug, Default)]
pub struct PipeBackend {
    input: VecDeque<u8>,
    output: Arc<Mutex<Vec<u8>>>,
    max_chunk: Option<usize>,
    read_error: Option<i32>,
    write_error: Option<i32>,
    read_calls: usize,
    closed: bool,
}

impl PipeBackend {
    pub fn new(input: &[u8]) -> Self {
        Self {
            input: input.iter().copied().collect(),
            ..Self::default()
        }
    }

    /// Handle on everything written to the pipe.
    pub fn output(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.output)
    }

    /// Transfer at most `n` bytes per call.
    pub fn with_max_chunk(mut self, n: usize) -> Self {
        self.max_chunk = Some(n.max(1));
        self
    }

    /// Fail every read once the input is exhausted.
    pub fn with_read_error(mut self, err: i32) -> Self {
        self.read_error = Some(err);
        self
    }

    /// Fail every write.
    pub fn with_write_error(mut self, err: i32) -> Self {
        self.write_error = Some(err);
        self
    }

    /// Number of `raw_read` calls made so far.
    pub fn read_calls(&self) -> usize {
        self.read_calls
    }
}

impl RawIo for PipeBackend {
    fn raw_read(&mut self, buf: &mut [u8]) -> Result<usize, i32> {
        self.read_calls += 1;
        if self.input.is_empty() {
            return match self.read_error {
                Some(err) => Err(err),
                None => Ok(0),
            };
        }
        let limit = self.max_chunk.unwrap_or(usize::MAX);
        let n = buf.len().min(self.input.len()).min(limit);
        for (slot, byte) in buf.iter_mut().zip(self.input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn raw_write(&mut self, buf: &[u8]) -> Result<usize, i32> {
        if let Some(err) = self.write_error {
            return Err(err);
        }
        let limit = self.max_chunk.unwrap_or(usize::MAX);
        let n = buf.len().min(limit);
        self.output.lock().extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn raw_seek(&mut self, _offset: i64, _whence: Whence) -> Result<u64, i32> {
        Err(errno::ESPIPE)
    }

    fn raw_close(&mut self) -> Result<(), i32> {
        if self.closed {
            return Err(errno::EBADF);
        }
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stdio::file::parse_mode;

    #[test]
    fn whence_from_posix() {
        assert_eq!(Whence::from_posix(0), Some(Whence::Set));
        assert_eq!(Whence::from_posix(2), Some(Whence::End));
        assert_eq!(Whence::from_posix(9), None);
    }

    #[test]
    fn mem_backend_write_keeps_nul_terminator() {
        let flags = parse_mode(b"w").unwrap();
        let mut mem = MemBackend::new(vec![b'x'; 8], &flags);
        assert_eq!(mem.raw_write(b"abc"), Ok(3));
        assert_eq!(&mem.region()[..4], b"abc\0");
        assert_eq!(mem.raw_write(b"defghij"), Ok(5));
        assert_eq!(mem.raw_write(b"z"), Err(errno::ENOSPC));
        assert_eq!(mem.region().as_slice(), b"abcdefgh");
    }

    #[test]
    fn mem_backend_append_starts_at_nul() {
        let flags = parse_mode(b"a+").unwrap();
        let mut mem = MemBackend::new(b"hi\0\0\0\0".to_vec(), &flags);
        assert_eq!(mem.raw_seek(0, Whence::Cur), Ok(2));
        assert_eq!(mem.raw_write(b"!"), Ok(1));
        assert_eq!(&mem.region()[..4], b"hi!\0");
    }

    #[test]
    fn mem_backend_read_and_seek_bounds() {
        let flags = parse_mode(b"r").unwrap();
        let mut mem = MemBackend::new(b"hello".to_vec(), &flags);
        let mut buf = [0u8; 3];
        assert_eq!(mem.raw_read(&mut buf), Ok(3));
        assert_eq!(&buf, b"hel");
        assert_eq!(mem.raw_seek(-1, Whence::End), Ok(4));
        assert_eq!(mem.raw_read(&mut buf), Ok(1));
        assert_eq!(mem.raw_seek(-1, Whence::Set), Err(errno::EINVAL));
        assert_eq!(mem.raw_seek(6, Whence::Set), Err(errno::EINVAL));
    }

    #[test]
    fn shared_region_is_observable() {
        let shared = SharedRegion::new(6);
        let flags = parse_mode(b"w").unwrap();
        let mut backend = SharedRegionBackend::new(shared.clone(), &flags);
        assert_eq!(backend.raw_write(b"ok"), Ok(2));
        assert_eq!(&shared.snapshot()[..3], b"ok\0");
    }

    #[test]
    fn memstream_grows_and_publishes() {
        let (backend, data) = MemStreamBackend::new();
        let published = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&published);
        let mut backend = backend.with_sync_hook(Box::new(move |bytes| {
            *sink.lock() = bytes.to_vec();
            Ok(())
        }));
        assert_eq!(backend.raw_write(b"hello world"), Ok(11));
        assert_eq!(backend.raw_seek(5, Whence::Set), Ok(5));
        backend.sync().unwrap();
        assert_eq!(published.lock().as_slice(), b"hello");
        assert_eq!(data.lock().as_slice(), b"hello world");
        let mut buf = [0u8; 1];
        assert_eq!(backend.raw_read(&mut buf), Err(errno::EBADF));
    }

    #[test]
    fn pipe_is_not_seekable_and_chunks() {
        let mut pipe = PipeBackend::new(b"abcdef").with_max_chunk(2);
        let mut buf = [0u8; 8];
        assert_eq!(pipe.raw_read(&mut buf), Ok(2));
        assert_eq!(pipe.raw_seek(0, Whence::Cur), Err(errno::ESPIPE));
        assert_eq!(pipe.raw_write(b"xyz"), Ok(2));
        assert_eq!(pipe.output().lock().as_slice(), b"xy");
        assert_eq!(pipe.raw_close(), Ok(()));
        assert_eq!(pipe.raw_close(), Err(errno::EBADF));
    }
}
