//! Process-wide stream table.
//!
//! Maps opaque stream ids (the values handed out as `FILE*`) to shared
//! stream handles. The standard streams live at fixed sentinel ids; every
//! other stream gets a fresh id from a monotonically increasing counter.
//!
//! Locking: the table lock and the per-stream locks are independent. The
//! table lock is never held while a stream lock is taken, so a thread
//! blocked inside a stream operation cannot stall `fopen` or `fflush(NULL)`
//! on another thread. The `flockfile` table is taken after a stream lock,
//! never before one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, ThreadId};

use log::debug;
use parking_lot::{Condvar, Mutex, MutexGuard};

use super::error::StdioError;
use super::file::StdioStream;

/// Opaque stream id.
pub type StreamId = usize;

/// Shared, internally locked stream.
pub type StreamHandle = Arc<Mutex<StdioStream>>;

/// Sentinel ids for the three standard streams. Distinct non-null values
/// that cannot collide with heap pointers.
pub const STDIN_ID: StreamId = 0x1000_0001;
pub const STDOUT_ID: StreamId = 0x1000_0002;
pub const STDERR_ID: StreamId = 0x1000_0003;

/// First id handed to dynamically opened streams.
const FIRST_DYNAMIC_ID: StreamId = 0x1000_0010;

/// Holder of a `flockfile` lock and its recursion depth.
#[derive(Debug, Clone, Copy)]
struct FileLock {
    owner: ThreadId,
    depth: usize,
}

/// Table of open streams plus `popen` child bookkeeping and the
/// `flockfile` ownership table.
#[derive(Debug)]
pub struct StreamRegistry {
    streams: Mutex<HashMap<StreamId, StreamHandle>>,
    children: Mutex<HashMap<StreamId, i32>>,
    file_locks: Mutex<HashMap<StreamId, FileLock>>,
    lock_released: Condvar,
    next_id: AtomicUsize,
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            children: Mutex::new(HashMap::new()),
            file_locks: Mutex::new(HashMap::new()),
            lock_released: Condvar::new(),
            next_id: AtomicUsize::new(FIRST_DYNAMIC_ID),
        }
    }

    /// Register a new stream and return its id.
    pub fn register(&self, stream: StdioStream) -> StreamId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.streams.lock().insert(id, Arc::new(Mutex::new(stream)));
        debug!("stdio registry: register {id:#x}");
        id
    }

    /// Install a stream at a fixed id (standard streams, `freopen`).
    /// Returns the handle previously registered there.
    pub fn install(&self, id: StreamId, stream: StdioStream) -> Option<StreamHandle> {
        self.streams.lock().insert(id, Arc::new(Mutex::new(stream)))
    }

    /// Install the standard streams unless already present.
    pub fn install_standard<F>(&self, make: F)
    where
        F: Fn(StreamId) -> Option<StdioStream>,
    {
        for id in [STDIN_ID, STDOUT_ID, STDERR_ID] {
            if self.streams.lock().contains_key(&id) {
                continue;
            }
            if let Some(stream) = make(id) {
                self.streams.lock().entry(id).or_insert_with(|| Arc::new(Mutex::new(stream)));
            }
        }
    }

    /// Look up a stream.
    pub fn get(&self, id: StreamId) -> Option<StreamHandle> {
        self.streams.lock().get(&id).cloned()
    }

    /// Remove a stream from the table, returning its handle.
    pub fn deregister(&self, id: StreamId) -> Option<StreamHandle> {
        let handle = self.streams.lock().remove(&id);
        if handle.is_some() {
            debug!("stdio registry: deregister {id:#x}");
        }
        handle
    }

    /// Number of registered streams.
    pub fn len(&self) -> usize {
        self.streams.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of every registered stream, sorted.
    pub fn ids(&self) -> Vec<StreamId> {
        let mut ids: Vec<StreamId> = self.streams.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    fn snapshot(&self) -> Vec<(StreamId, StreamHandle)> {
        let mut all: Vec<(StreamId, StreamHandle)> = self
            .streams
            .lock()
            .iter()
            .map(|(&id, h)| (id, Arc::clone(h)))
            .collect();
        all.sort_unstable_by_key(|(id, _)| *id);
        all
    }

    /// `fflush(NULL)`: flush every writable stream. Every stream is
    /// attempted; the first failure is returned.
    pub fn flush_all(&self) -> Result<(), StdioError> {
        let mut first = None;
        for (_, handle) in self.snapshot() {
            let mut stream = handle.lock();
            if stream.is_closed() || !stream.is_writable() {
                continue;
            }
            if let Err(e) = stream.flush() {
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Exit-time teardown: flush and close every stream, standard streams
    /// included (their descriptors are borrowed and stay open).
    pub fn close_all(&self) -> Result<(), StdioError> {
        let all: Vec<StreamHandle> = self.streams.lock().drain().map(|(_, h)| h).collect();
        let mut first = None;
        for handle in all {
            let mut stream = handle.lock();
            if stream.is_closed() {
                continue;
            }
            if let Err(e) = stream.close() {
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Record the child process behind a `popen` stream.
    pub fn set_child(&self, id: StreamId, pid: i32) {
        self.children.lock().insert(id, pid);
    }

    /// Take the child process recorded for `id` (`pclose`).
    pub fn take_child(&self, id: StreamId) -> Option<i32> {
        self.children.lock().remove(&id)
    }

    // -----------------------------------------------------------------------
    // flockfile
    // -----------------------------------------------------------------------

    /// `flockfile`: take ownership of `id` for the calling thread, waiting
    /// while another thread holds it. Recursive. A fresh acquisition also
    /// waits out any operation already running on the stream.
    pub fn lock_file(&self, id: StreamId) {
        let me = thread::current().id();
        let mut locks = self.file_locks.lock();
        loop {
            match locks.get_mut(&id) {
                Some(held) if held.owner == me => {
                    held.depth += 1;
                    return;
                }
                Some(_) => self.lock_released.wait(&mut locks),
                None => {
                    locks.insert(id, FileLock { owner: me, depth: 1 });
                    break;
                }
            }
        }
        drop(locks);
        if let Some(handle) = self.get(id) {
            drop(handle.lock());
        }
    }

    /// `ftrylockfile`: like [`Self::lock_file`] but fails instead of
    /// waiting, including when an operation is running on the stream.
    pub fn try_lock_file(&self, id: StreamId) -> bool {
        let me = thread::current().id();
        let handle = self.get(id);
        let _in_flight = match &handle {
            Some(h) => match h.try_lock() {
                Some(guard) => Some(guard),
                None => return false,
            },
            None => None,
        };
        let mut locks = self.file_locks.lock();
        match locks.get_mut(&id) {
            Some(held) if held.owner == me => {
                held.depth += 1;
                true
            }
            Some(_) => false,
            None => {
                locks.insert(id, FileLock { owner: me, depth: 1 });
                true
            }
        }
    }

    /// `funlockfile`. Returns false when the caller does not hold the lock.
    pub fn unlock_file(&self, id: StreamId) -> bool {
        let me = thread::current().id();
        let mut locks = self.file_locks.lock();
        let Some(held) = locks.get_mut(&id) else {
            return false;
        };
        if held.owner != me {
            return false;
        }
        held.depth -= 1;
        if held.depth == 0 {
            locks.remove(&id);
            self.lock_released.notify_all();
        }
        true
    }

    /// Lock `handle` (the stream registered as `id`) for one operation.
    /// Waits while another thread holds the `flockfile` lock, and checks
    /// again under the stream mutex so a `flockfile` that lands in between
    /// is honoured. Every stream operation at the C boundary goes through
    /// here.
    pub fn lock_for_op<'h>(&self, id: StreamId, handle: &'h StreamHandle) -> MutexGuard<'h, StdioStream> {
        loop {
            self.wait_file_unlocked(id);
            let guard = handle.lock();
            if !self.held_by_other(id) {
                return guard;
            }
            drop(guard);
        }
    }

    fn held_by_other(&self, id: StreamId) -> bool {
        let me = thread::current().id();
        self.file_locks.lock().get(&id).is_some_and(|held| held.owner != me)
    }

    /// Block until no other thread holds the `flockfile` lock on `id`.
    fn wait_file_unlocked(&self, id: StreamId) {
        let me = thread::current().id();
        let mut locks = self.file_locks.lock();
        while locks.get(&id).is_some_and(|held| held.owner != me) {
            self.lock_released.wait(&mut locks);
        }
    }
}

/// The process-wide registry.
pub fn registry() -> &'static StreamRegistry {
    static REG: OnceLock<StreamRegistry> = OnceLock::new();
    REG.get_or_init(StreamRegistry::new)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
