//! Buffered stream benchmarks.

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use ferrolibc_core::stdio::backend::{SharedRegion, SharedRegionBackend};
use ferrolibc_core::stdio::{BufMode, StdioStream, parse_mode};

const LEN: usize = 4096;

fn region_stream(mode: BufMode) -> StdioStream {
    let flags = parse_mode(b"w+").unwrap();
    let backend = SharedRegionBackend::new(SharedRegion::new(LEN + 1), &flags);
    StdioStream::new(Box::new(backend), flags, mode).unwrap()
}

fn bench_putc_by_mode(c: &mut Criterion) {
    let mut group = c.benchmark_group("putc_4k");
    group.throughput(Throughput::Bytes(LEN as u64));
    for (name, mode) in [("full", BufMode::Full), ("line", BufMode::Line), ("none", BufMode::None)] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &mode, |b, &mode| {
            b.iter(|| {
                let mut s = region_stream(mode);
                for i in 0..LEN {
                    let byte = if i % 64 == 63 { b'\n' } else { b'a' };
                    s.putc(byte).unwrap();
                }
                s.close().unwrap();
            });
        });
    }
    group.finish();
}

fn bench_read_back(c: &mut Criterion) {
    let payload = vec![b'z'; LEN];
    c.bench_function("write_then_read_4k", |b| {
        b.iter(|| {
            let mut s = region_stream(BufMode::Full);
            s.write_all(&payload).unwrap();
            s.rewind();
            let mut out = vec![0u8; LEN];
            black_box(s.read(&mut out));
            s.close().unwrap();
        });
    });
}

criterion_group!(benches, bench_putc_by_mode, bench_read_back);
criterion_main!(benches);
