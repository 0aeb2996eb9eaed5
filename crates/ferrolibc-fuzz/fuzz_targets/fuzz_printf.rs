#![no_main]
use std::cell::Cell;

use ferrolibc_core::stdio::printf::{self, FormatArg};
use libfuzzer_sys::fuzz_target;

// Arbitrary formats against a fixed argument pool: the engine must fail
// cleanly on bad directives and never overrun the snprintf buffer.
fuzz_target!(|data: &[u8]| {
    let count = Cell::new(0);
    let args = || {
        [
            FormatArg::SignedInt(-7),
            FormatArg::UnsignedInt(u64::MAX),
            FormatArg::Float(1.5e-300),
            FormatArg::Char(0x20AC),
            FormatArg::Str(Some(b"fuzz")),
            FormatArg::Str(None),
            FormatArg::Pointer(0x1000),
            FormatArg::Count(&count),
        ]
    };
    let full = printf::sprintf(data, args());
    let mut buf = [0u8; 16];
    let bounded = printf::snprintf(Some(&mut buf), data, args());
    if let (Ok(out), Ok(n)) = (&full, bounded) {
        assert_eq!(out.len(), n);
        let kept = n.min(buf.len() - 1);
        assert_eq!(&buf[..kept], &out[..kept]);
        assert_eq!(buf[kept], 0);
    }
});
