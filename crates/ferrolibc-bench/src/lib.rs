//! Shared inputs for the ferrolibc benchmarks.

/// Formats exercised by the formatting benchmarks.
pub const PRINTF_FORMATS: &[(&str, &[u8])] = &[
    ("int", b"%d"),
    ("padded", b"%.4d|%5.2f|%-8s|"),
    ("hex_alt", b"%#018lx"),
    ("float_g", b"%g"),
];

/// A line of numbers for the scanning benchmarks.
pub const SCAN_LINE: &[u8] = b"123 0x321 -77 3.25 token";
