use ferrolibc_core::errno;
use ferrolibc_core::stdio::backend::{PipeBackend, SharedRegion, SharedRegionBackend};
use ferrolibc_core::stdio::{BufMode, Orientation, StdioError, StdioStream, Whence, parse_mode};

fn region_stream(contents: &[u8], mode: &[u8], buf: BufMode) -> (StdioStream, SharedRegion) {
    let flags = parse_mode(mode).unwrap();
    let shared = SharedRegion::from_bytes(contents);
    let backend = SharedRegionBackend::new(shared.clone(), &flags);
    (StdioStream::new(Box::new(backend), flags, buf).unwrap(), shared)
}

#[derive(Clone, Copy, Debug)]
enum Op {
    ByteRead,
    ByteWrite,
    WideRead,
    WideWrite,
    Fwide(i32),
}

fn apply(s: &mut StdioStream, op: Op) -> Result<(), StdioError> {
    match op {
        Op::ByteRead => s.getc().map(|_| ()),
        Op::ByteWrite => s.putc(b'b'),
        Op::WideRead => s.getwc().map(|_| ()),
        Op::WideWrite => s.putwc(u32::from('w')),
        Op::Fwide(mode) => {
            s.fwide(mode);
            Ok(())
        }
    }
}

fn orientation_of(op: Op) -> Orientation {
    match op {
        Op::ByteRead | Op::ByteWrite => Orientation::Byte,
        Op::WideRead | Op::WideWrite => Orientation::Wide,
        Op::Fwide(m) if m > 0 => Orientation::Wide,
        Op::Fwide(m) if m < 0 => Orientation::Byte,
        Op::Fwide(_) => Orientation::Unset,
    }
}

#[test]
fn orientation_lock_matrix() {
    let ops = [
        Op::ByteRead,
        Op::ByteWrite,
        Op::WideRead,
        Op::WideWrite,
        Op::Fwide(1),
        Op::Fwide(-1),
    ];
    for first in ops {
        for second in ops {
            let (mut s, _) = region_stream(b"abcdef", b"r+", BufMode::Full);
            apply(&mut s, first).unwrap();
            let locked = orientation_of(first);
            assert_eq!(s.orientation(), locked, "{first:?}");

            let result = apply(&mut s, second);
            let wanted = orientation_of(second);
            let conflict = matches!(second, Op::ByteRead | Op::ByteWrite | Op::WideRead | Op::WideWrite)
                && wanted != locked;
            if conflict {
                assert_eq!(result, Err(StdioError::Orientation), "{first:?} then {second:?}");
                assert!(s.is_error(), "{first:?} then {second:?}");
            } else {
                assert!(result.is_ok(), "{first:?} then {second:?}");
            }
            // fwide never changes an established orientation.
            assert_eq!(s.orientation(), locked, "{first:?} then {second:?}");
        }
    }
}

#[test]
fn ungetc_restores_logical_position() {
    let (mut s, _) = region_stream(b"0123456789", b"r", BufMode::Full);
    for _ in 0..4 {
        s.getc().unwrap();
    }
    let before = s.tell().unwrap();
    let c = s.getc().unwrap().unwrap();
    assert_eq!(c, b'4');
    s.ungetc(c).unwrap();
    assert_eq!(s.tell().unwrap(), before);
    assert_eq!(s.getc(), Ok(Some(b'4')));
}

#[test]
fn flush_leaves_input_untouched() {
    for buf in [BufMode::Full, BufMode::Line, BufMode::None] {
        let (mut s, _) = region_stream(b"abcdef", b"r", buf);
        assert_eq!(s.getc(), Ok(Some(b'a')));
        assert_eq!(s.getc(), Ok(Some(b'b')));
        s.ungetc(b'Q').unwrap();
        s.flush().unwrap();
        assert_eq!(s.tell(), Ok(1), "{buf:?}");
        assert_eq!(s.getc(), Ok(Some(b'Q')), "{buf:?}");
        assert_eq!(s.getc(), Ok(Some(b'c')), "{buf:?}");
    }

    let (mut s, _) = region_stream(b"", b"r", BufMode::Full);
    assert_eq!(s.getc(), Ok(None));
    s.flush().unwrap();
    assert!(s.is_eof());
}

#[test]
fn scanf_keeps_count_when_later_read_fails() {
    use ferrolibc_core::stdio::scanf::{ScanArg, fscanf};
    let flags = parse_mode(b"r").unwrap();
    let pipe = PipeBackend::new(b"12 34 ").with_read_error(errno::EIO);
    let mut s = StdioStream::new(Box::new(pipe), flags, BufMode::Full).unwrap();
    let (mut a, mut b, mut c) = (0i64, 0i64, 0i64);
    let got = fscanf(&mut s, b"%d %d %d", [
        ScanArg::Int(&mut a),
        ScanArg::Int(&mut b),
        ScanArg::Int(&mut c),
    ]);
    assert_eq!(got, Ok(2));
    assert_eq!((a, b), (12, 34));
    assert!(s.is_error());
}

#[test]
fn eof_is_sticky_until_cleared() {
    let (mut s, _) = region_stream(b"x", b"r", BufMode::Full);
    assert_eq!(s.getc(), Ok(Some(b'x')));
    assert_eq!(s.getc(), Ok(None));
    assert!(s.is_eof());
    assert_eq!(s.getc(), Ok(None));
    s.clear_err();
    assert!(!s.is_eof());
}

#[test]
fn buffered_writes_reach_region_on_flush() {
    let (mut s, shared) = region_stream(&[0u8; 16], b"w", BufMode::Full);
    s.write_all(b"hello").unwrap();
    assert_eq!(&shared.snapshot()[..5], &[0u8; 5]);
    s.flush().unwrap();
    assert_eq!(&shared.snapshot()[..6], b"hello\0");
}

#[test]
fn seek_then_overwrite_in_update_mode() {
    let (mut s, shared) = region_stream(b"abcdef", b"r+", BufMode::Full);
    assert_eq!(s.getc(), Ok(Some(b'a')));
    s.seek(2, Whence::Set).unwrap();
    s.write_all(b"ZZ").unwrap();
    s.seek(0, Whence::Set).unwrap();
    let mut all = [0u8; 6];
    assert_eq!(s.read(&mut all), 6);
    assert_eq!(&all, b"abZZef");
    s.close().unwrap();
    assert_eq!(shared.snapshot(), b"abZZef");
}

#[test]
fn pipe_short_reads_and_espipe() {
    let pipe = PipeBackend::new(b"abcdefghij").with_max_chunk(3);
    let flags = parse_mode(b"r").unwrap();
    let mut s = StdioStream::new(Box::new(pipe), flags, BufMode::Full).unwrap();
    let mut out = [0u8; 10];
    let mut got = 0;
    while got < out.len() {
        let n = s.read(&mut out[got..]);
        if n == 0 {
            break;
        }
        got += n;
    }
    assert_eq!(&out[..got], b"abcdefghij");
    assert_eq!(s.seek(0, Whence::Set), Err(StdioError::NotSeekable));
    assert_eq!(errno::get_errno(), errno::ESPIPE);
    assert!(!s.is_error());
}

#[test]
fn closed_stream_rejects_operations() {
    let (mut s, _) = region_stream(b"abc", b"r", BufMode::Full);
    s.close().unwrap();
    assert!(s.is_closed());
    assert_eq!(s.getc(), Err(StdioError::Closed));
    assert_eq!(s.close(), Err(StdioError::Closed));
}
