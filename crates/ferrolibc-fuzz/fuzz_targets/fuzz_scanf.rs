#![no_main]
use ferrolibc_core::stdio::scanf::{self, ScanArg};
use libfuzzer_sys::fuzz_target;

// First byte splits the data into format and input.
fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let (fmt, input) = rest.split_at(usize::from(split).min(rest.len()));
    let (mut i, mut u, mut f, mut p, mut n) = (0i64, 0u64, 0f64, 0usize, 0i64);
    let (mut s, mut w) = (Vec::new(), Vec::new());
    let assigned = scanf::sscanf(
        input,
        fmt,
        [
            ScanArg::Int(&mut i),
            ScanArg::UInt(&mut u),
            ScanArg::Float(&mut f),
            ScanArg::Bytes(&mut s),
            ScanArg::Wide(&mut w),
            ScanArg::Pointer(&mut p),
            ScanArg::Count(&mut n),
        ],
    );
    if let Ok(assigned) = assigned {
        assert!(assigned <= 7);
    }
    assert!(s.len() <= input.len());
});
