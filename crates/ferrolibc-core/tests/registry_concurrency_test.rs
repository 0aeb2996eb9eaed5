use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use ferrolibc_core::stdio::backend::MemStreamBackend;
use ferrolibc_core::stdio::printf::{FormatArg, fprintf};
use ferrolibc_core::stdio::{BufMode, StdioStream, StreamRegistry, parse_mode};

const THREADS: usize = 8;
const LINES: usize = 200;

#[test]
fn concurrent_writers_never_interleave_within_a_call() {
    let registry = Arc::new(StreamRegistry::new());
    let (backend, contents) = MemStreamBackend::new();
    let flags = parse_mode(b"w").unwrap();
    let stream = StdioStream::new(Box::new(backend), flags, BufMode::Full).unwrap();
    let id = registry.register(stream);

    let workers: Vec<_> = (0..THREADS)
        .map(|t| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for i in 0..LINES {
                    let handle = registry.get(id).unwrap();
                    let mut s = handle.lock();
                    fprintf(
                        &mut s,
                        b"thread %02d line %04d\n",
                        [FormatArg::SignedInt(t as i64), FormatArg::SignedInt(i as i64)],
                    )
                    .unwrap();
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    registry.flush_all().unwrap();

    let text = String::from_utf8(contents.lock().clone()).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), THREADS * LINES);
    for line in &lines {
        assert!(line.starts_with("thread ") && line.len() == "thread 00 line 0000".len(), "{line}");
    }
    for t in 0..THREADS {
        let mine: Vec<&&str> = lines
            .iter()
            .filter(|l| l.starts_with(&format!("thread {t:02} ")))
            .collect();
        assert_eq!(mine.len(), LINES);
        // Per-thread order is preserved.
        for (i, l) in mine.iter().enumerate() {
            assert!(l.ends_with(&format!("{i:04}")));
        }
    }
}

#[test]
fn concurrent_open_and_close_keep_ids_unique() {
    let registry = Arc::new(StreamRegistry::new());
    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let mut ids = Vec::new();
                for _ in 0..50 {
                    let (backend, _) = MemStreamBackend::new();
                    let flags = parse_mode(b"w").unwrap();
                    let s = StdioStream::new(Box::new(backend), flags, BufMode::Full).unwrap();
                    ids.push(registry.register(s));
                }
                for &id in ids.iter().step_by(2) {
                    let handle = registry.deregister(id).unwrap();
                    handle.lock().close().unwrap();
                }
                ids
            })
        })
        .collect();
    let mut all: Vec<usize> = workers.into_iter().flat_map(|w| w.join().unwrap()).collect();
    let total = all.len();
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), total);
    assert_eq!(registry.len(), THREADS * 25);
    registry.flush_all().unwrap();
}

#[test]
fn locked_sequence_excludes_other_threads() {
    const ROUNDS: usize = 100;
    let registry = Arc::new(StreamRegistry::new());
    let (backend, contents) = MemStreamBackend::new();
    let flags = parse_mode(b"w").unwrap();
    let stream = StdioStream::new(Box::new(backend), flags, BufMode::Full).unwrap();
    let id = registry.register(stream);
    let handle = registry.get(id).unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let others: Vec<_> = (0..4)
        .map(|_| {
            let (registry, handle, done) = (Arc::clone(&registry), Arc::clone(&handle), Arc::clone(&done));
            thread::spawn(move || {
                while !done.load(Ordering::Relaxed) {
                    registry.lock_for_op(id, &handle).putc(b'b').unwrap();
                }
            })
        })
        .collect();

    for _ in 0..ROUNDS {
        registry.lock_file(id);
        for &c in b"[aaaa]" {
            registry.lock_for_op(id, &handle).putc(c).unwrap();
            thread::yield_now();
        }
        assert!(registry.unlock_file(id));
    }
    done.store(true, Ordering::Relaxed);
    for t in others {
        t.join().unwrap();
    }
    registry.flush_all().unwrap();

    let text = contents.lock().clone();
    let mut inside = false;
    let mut sequences = 0;
    for &c in &text {
        match c {
            b'[' => inside = true,
            b']' => {
                inside = false;
                sequences += 1;
            }
            b'b' => assert!(!inside, "foreign write inside a locked sequence"),
            _ => {}
        }
    }
    assert_eq!(sequences, ROUNDS);
}

#[test]
fn flockfile_waits_for_running_operation() {
    let registry = Arc::new(StreamRegistry::new());
    let (backend, _) = MemStreamBackend::new();
    let flags = parse_mode(b"w").unwrap();
    let id = registry.register(StdioStream::new(Box::new(backend), flags, BufMode::Full).unwrap());
    let handle = registry.get(id).unwrap();

    let finished = Arc::new(AtomicBool::new(false));
    let guard = registry.lock_for_op(id, &handle);
    let locker = {
        let (registry, finished) = (Arc::clone(&registry), Arc::clone(&finished));
        thread::spawn(move || {
            registry.lock_file(id);
            let saw_finish = finished.load(Ordering::SeqCst);
            assert!(registry.unlock_file(id));
            saw_finish
        })
    };
    thread::sleep(Duration::from_millis(20));
    assert!(!registry.try_lock_file(id));
    finished.store(true, Ordering::SeqCst);
    drop(guard);
    assert!(locker.join().unwrap());
}
