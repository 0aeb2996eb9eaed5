//! Numeric conversion functions (atoi, atol, strtol, strtoul) and their
//! wide-character counterparts (wcstol, wcstoul).
//!
//! The parsers are generic over the code unit so the narrow and wide entry
//! points share one implementation: `&[u8]` for `strtol`, `&[u32]` for
//! `wcstol`. Input ends at the first NUL unit or the end of the slice.

/// Result of a string-to-number conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStatus {
    Success,
    Overflow,
    Underflow,
    InvalidBase,
}

/// A code unit the numeric parsers can read.
pub trait NumUnit: Copy {
    fn code(self) -> u32;
}

impl NumUnit for u8 {
    #[inline]
    fn code(self) -> u32 {
        u32::from(self)
    }
}

impl NumUnit for u32 {
    #[inline]
    fn code(self) -> u32 {
        self
    }
}

#[inline]
pub(crate) fn is_space_code(c: u32) -> bool {
    c == 0x20 || (0x09..=0x0d).contains(&c)
}

#[inline]
fn digit_value(c: u32) -> Option<u64> {
    match c {
        0x30..=0x39 => Some(u64::from(c - 0x30)),
        0x61..=0x7a => Some(u64::from(c - 0x61 + 10)),
        0x41..=0x5a => Some(u64::from(c - 0x41 + 10)),
        _ => None,
    }
}

#[inline]
fn unit_at<T: NumUnit>(s: &[T], i: usize) -> u32 {
    s.get(i).map_or(0, |u| u.code())
}

// ----------------------------------------------------------------------------
// Shared prefix scanning
// ----------------------------------------------------------------------------

/// Leading whitespace, sign and radix prefix, resolved.
struct Prefix {
    start: usize,
    negative: bool,
    base: u64,
}

fn scan_prefix<T: NumUnit>(s: &[T], base: i32) -> Option<Prefix> {
    let mut i = 0;
    while is_space_code(unit_at(s, i)) {
        i += 1;
    }

    let mut negative = false;
    match unit_at(s, i) {
        0x2d => {
            negative = true;
            i += 1;
        }
        0x2b => i += 1,
        _ => {}
    }

    // "0x" counts as a prefix only when a hex digit follows it.
    let has_0x_prefix = unit_at(s, i) == u32::from(b'0')
        && matches!(unit_at(s, i + 1), 0x78 | 0x58)
        && digit_value(unit_at(s, i + 2)).is_some_and(|d| d < 16);

    let effective_base = match base {
        0 if has_0x_prefix => {
            i += 2;
            16
        }
        0 if unit_at(s, i) == u32::from(b'0') => 8,
        0 => 10,
        16 if has_0x_prefix => {
            i += 2;
            16
        }
        b if (2..=36).contains(&b) => b as u64,
        _ => return None,
    };

    Some(Prefix {
        start: i,
        negative,
        base: effective_base,
    })
}

/// Accumulate digits up to `abs_max`. Returns (magnitude, end, any_digits, overflow).
fn accumulate<T: NumUnit>(s: &[T], mut i: usize, base: u64, abs_max: u64) -> (u64, usize, bool, bool) {
    let cutoff = abs_max / base;
    let cutlim = abs_max % base;

    let mut acc: u64 = 0;
    let mut any_digits = false;
    let mut overflow = false;

    while let Some(digit) = digit_value(unit_at(s, i)) {
        if digit >= base {
            break;
        }
        any_digits = true;
        if !overflow {
            if acc > cutoff || (acc == cutoff && digit > cutlim) {
                overflow = true;
            } else {
                acc = acc * base + digit;
            }
        }
        i += 1;
    }
    (acc, i, any_digits, overflow)
}

// ----------------------------------------------------------------------------
// Concrete Implementations
// ----------------------------------------------------------------------------

pub fn atoi(s: &[u8]) -> i32 {
    let (val, _, _) = strtol_impl(s, 10);
    val as i32
}

pub fn atol(s: &[u8]) -> i64 {
    let (val, _, _) = strtol_impl(s, 10);
    val
}

/// Helper for strtol: returns (value, consumed_units, status)
pub fn strtol_impl<T: NumUnit>(s: &[T], base: i32) -> (i64, usize, ConversionStatus) {
    let Some(prefix) = scan_prefix(s, base) else {
        return (0, 0, ConversionStatus::InvalidBase);
    };

    let abs_max = if prefix.negative {
        9_223_372_036_854_775_808u64
    } else {
        9_223_372_036_854_775_807u64
    };
    let (acc, end, any_digits, overflow) = accumulate(s, prefix.start, prefix.base, abs_max);

    if !any_digits {
        return (0, 0, ConversionStatus::Success);
    }

    if overflow {
        if prefix.negative {
            return (i64::MIN, end, ConversionStatus::Underflow);
        } else {
            return (i64::MAX, end, ConversionStatus::Overflow);
        }
    }

    let val = if prefix.negative {
        (acc as i64).wrapping_neg()
    } else {
        acc as i64
    };

    (val, end, ConversionStatus::Success)
}

pub fn strtol(s: &[u8], base: i32) -> (i64, usize) {
    let (val, len, _) = strtol_impl(s, base);
    (val, len)
}

/// Helper for strtoul. A leading minus negates the magnitude modulo 2^64.
pub fn strtoul_impl<T: NumUnit>(s: &[T], base: i32) -> (u64, usize, ConversionStatus) {
    let Some(prefix) = scan_prefix(s, base) else {
        return (0, 0, ConversionStatus::InvalidBase);
    };

    let (acc, end, any_digits, overflow) = accumulate(s, prefix.start, prefix.base, u64::MAX);

    if !any_digits {
        return (0, 0, ConversionStatus::Success);
    }

    if overflow {
        return (u64::MAX, end, ConversionStatus::Overflow);
    }

    let val = if prefix.negative { acc.wrapping_neg() } else { acc };

    (val, end, ConversionStatus::Success)
}

pub fn strtoul(s: &[u8], base: i32) -> (u64, usize) {
    let (val, len, _) = strtoul_impl(s, base);
    (val, len)
}

/// `wcstol` over wide code units.
pub fn wcstol_impl(s: &[u32], base: i32) -> (i64, usize, ConversionStatus) {
    strtol_impl(s, base)
}

/// `wcstoul` over wide code units.
pub fn wcstoul_impl(s: &[u32], base: i32) -> (u64, usize, ConversionStatus) {
    strtoul_impl(s, base)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wide(s: &str) -> Vec<u32> {
        s.chars().map(u32::from).collect()
    }

    #[test]
    fn test_atoi_basic() {
        assert_eq!(atoi(b"42"), 42);
        assert_eq!(atoi(b"-42"), -42);
        assert_eq!(atoi(b"   123"), 123);
    }

    #[test]
    fn test_strtol_base10() {
        let (val, len) = strtol(b"123456", 10);
        assert_eq!(val, 123456);
        assert_eq!(len, 6);
    }

    #[test]
    fn test_strtol_base16() {
        let (val, len) = strtol(b"0xFF", 16);
        assert_eq!(val, 255);
        assert_eq!(len, 4);

        let (val, len) = strtol(b"FF", 16);
        assert_eq!(val, 255);
        assert_eq!(len, 2);
    }

    #[test]
    fn test_strtol_auto_base() {
        let (val, _) = strtol(b"0x10", 0);
        assert_eq!(val, 16);
        let (val, _) = strtol(b"010", 0);
        assert_eq!(val, 8);
        let (val, _) = strtol(b"10", 0);
        assert_eq!(val, 10);
    }

    #[test]
    fn test_strtol_overflow() {
        let s_over = "9223372036854775808";
        let (val, _, status) = strtol_impl(s_over.as_bytes(), 10);
        assert_eq!(val, i64::MAX);
        assert_eq!(status, ConversionStatus::Overflow);

        let s_min = format!("{}", i64::MIN);
        let (val, _, status) = strtol_impl(s_min.as_bytes(), 10);
        assert_eq!(val, i64::MIN);
        assert_eq!(status, ConversionStatus::Success);

        let s_under = "-9223372036854775809";
        let (val, len, status) = strtol_impl(s_under.as_bytes(), 10);
        assert_eq!(val, i64::MIN);
        assert_eq!(len, s_under.len());
        assert_eq!(status, ConversionStatus::Underflow);
    }

    #[test]
    fn test_strtoul_overflow_and_negation() {
        let (val, _, status) = strtoul_impl(b"18446744073709551616", 10);
        assert_eq!(val, u64::MAX);
        assert_eq!(status, ConversionStatus::Overflow);

        let (val, len, status) = strtoul_impl(b"-1", 10);
        assert_eq!(val, u64::MAX);
        assert_eq!(len, 2);
        assert_eq!(status, ConversionStatus::Success);
    }

    #[test]
    fn test_strtol_0x_edge_cases() {
        assert_eq!(strtol(b"0xz", 0), (0, 1));
        assert_eq!(strtol(b"0xz", 16), (0, 1));
        assert_eq!(strtol(b"0x", 0), (0, 1));
        assert_eq!(strtol(b"0x1", 0), (1, 3));
    }

    #[test]
    fn test_invalid_base() {
        let (val, len, status) = strtol_impl(b"12", 1);
        assert_eq!((val, len), (0, 0));
        assert_eq!(status, ConversionStatus::InvalidBase);
        let (_, _, status) = strtoul_impl(b"12", 37);
        assert_eq!(status, ConversionStatus::InvalidBase);
    }

    #[test]
    fn test_stops_at_nul() {
        assert_eq!(strtol(b"12\x0034", 10), (12, 2));
    }

    #[test]
    fn test_wcstol_leaves_end_at_remainder() {
        let s = wide("2001 60c0c0");
        let (val, end, status) = wcstol_impl(&s, 10);
        assert_eq!(val, 2001);
        assert_eq!(status, ConversionStatus::Success);
        assert_eq!(&s[end..], wide(" 60c0c0").as_slice());

        let rest = &s[end..];
        let (val, end2, _) = wcstol_impl(rest, 16);
        assert_eq!(val, 0x60c0c0);
        assert_eq!(end2, rest.len());
    }

    #[test]
    fn test_wcstoul_auto_base() {
        let s = wide("  0x1F!");
        let (val, end, _) = wcstoul_impl(&s, 0);
        assert_eq!(val, 31);
        assert_eq!(end, 6);
    }
}
