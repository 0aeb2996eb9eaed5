//! Floating-point parsing (strtod, strtof, wcstod).
//!
//! Decimal input is collected into an ASCII buffer and handed to Rust's
//! correctly rounded parser. Hexadecimal input (`0x1.8p3`) is assembled
//! exactly from its bits with round-half-even.

use super::conversion::{ConversionStatus, NumUnit, is_space_code};

/// Target binary format for hexadecimal assembly.
#[derive(Debug, Clone, Copy)]
struct BinaryFormat {
    /// Significand bits including the implicit one.
    mant_bits: u32,
    min_exp: i64,
    max_exp: i64,
}

const F64_FORMAT: BinaryFormat = BinaryFormat {
    mant_bits: 53,
    min_exp: -1022,
    max_exp: 1023,
};

const F32_FORMAT: BinaryFormat = BinaryFormat {
    mant_bits: 24,
    min_exp: -126,
    max_exp: 127,
};

/// Parsed syntactic shape of a floating-point literal.
enum Literal {
    Decimal(String),
    Hex { mant: u64, exp2: i64, sticky: bool },
    Infinity,
    Nan,
}

#[inline]
fn unit_at<T: NumUnit>(s: &[T], i: usize) -> u32 {
    s.get(i).map_or(0, |u| u.code())
}

#[inline]
fn lower(c: u32) -> u32 {
    if (0x41..=0x5a).contains(&c) { c + 0x20 } else { c }
}

fn matches_word<T: NumUnit>(s: &[T], at: usize, word: &[u8]) -> bool {
    word.iter()
        .enumerate()
        .all(|(k, &w)| lower(unit_at(s, at + k)) == u32::from(w))
}

#[inline]
fn hex_digit(c: u32) -> Option<u64> {
    match c {
        0x30..=0x39 => Some(u64::from(c - 0x30)),
        0x61..=0x66 => Some(u64::from(c - 0x61 + 10)),
        0x41..=0x46 => Some(u64::from(c - 0x41 + 10)),
        _ => None,
    }
}

#[inline]
fn is_digit(c: u32) -> bool {
    (0x30..=0x39).contains(&c)
}

/// Parse an optional exponent (`e`/`p` already matched at `i`).
/// Returns (exponent, end) or None when no digits follow.
fn parse_exponent<T: NumUnit>(s: &[T], mut i: usize) -> Option<(i64, usize)> {
    let mut negative = false;
    match unit_at(s, i) {
        0x2d => {
            negative = true;
            i += 1;
        }
        0x2b => i += 1,
        _ => {}
    }
    if !is_digit(unit_at(s, i)) {
        return None;
    }
    let mut exp: i64 = 0;
    while is_digit(unit_at(s, i)) {
        exp = (exp * 10 + i64::from(unit_at(s, i) - 0x30)).min(1_000_000_000);
        i += 1;
    }
    Some((if negative { -exp } else { exp }, i))
}

fn scan_hex<T: NumUnit>(s: &[T], mut i: usize, point: u32) -> (Literal, usize) {
    let mut mant: u64 = 0;
    let mut exp2: i64 = 0;
    let mut sticky = false;
    let mut seen_point = false;

    loop {
        let c = unit_at(s, i);
        if c == point && !seen_point {
            seen_point = true;
            i += 1;
            continue;
        }
        let Some(d) = hex_digit(c) else { break };
        if mant >> 60 == 0 {
            mant = (mant << 4) | d;
            if seen_point {
                exp2 -= 4;
            }
        } else {
            sticky |= d != 0;
            if !seen_point {
                exp2 += 4;
            }
        }
        i += 1;
    }

    if matches!(unit_at(s, i), 0x70 | 0x50) {
        if let Some((e, end)) = parse_exponent(s, i + 1) {
            exp2 = exp2.saturating_add(e);
            i = end;
        }
    }
    (Literal::Hex { mant, exp2, sticky }, i)
}

fn scan_decimal<T: NumUnit>(s: &[T], mut i: usize, point: u32) -> Option<(Literal, usize)> {
    let mut text = String::new();
    let mut digits = 0usize;
    while is_digit(unit_at(s, i)) {
        text.push(char::from(unit_at(s, i) as u8));
        digits += 1;
        i += 1;
    }
    if unit_at(s, i) == point {
        let mut j = i + 1;
        let mut frac = String::new();
        while is_digit(unit_at(s, j)) {
            frac.push(char::from(unit_at(s, j) as u8));
            j += 1;
        }
        if digits > 0 || !frac.is_empty() {
            digits += frac.len();
            text.push('.');
            text.push_str(&frac);
            i = j;
        }
    }
    if digits == 0 {
        return None;
    }
    if matches!(unit_at(s, i), 0x65 | 0x45) {
        if let Some((e, end)) = parse_exponent(s, i + 1) {
            text.push('e');
            text.push_str(&e.to_string());
            i = end;
        }
    }
    Some((Literal::Decimal(text), i))
}

/// Recognize a literal after whitespace and sign. Returns (negative, literal, end).
fn scan_literal<T: NumUnit>(s: &[T], point: u32) -> Option<(bool, Literal, usize)> {
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

    if matches_word(s, i, b"inf") {
        let end = if matches_word(s, i, b"infinity") { i + 8 } else { i + 3 };
        return Some((negative, Literal::Infinity, end));
    }
    if matches_word(s, i, b"nan") {
        let mut end = i + 3;
        if unit_at(s, end) == u32::from(b'(') {
            let mut j = end + 1;
            loop {
                let c = unit_at(s, j);
                let alnum = is_digit(c) || (0x41..=0x5a).contains(&c) || (0x61..=0x7a).contains(&c);
                if alnum || c == u32::from(b'_') {
                    j += 1;
                } else {
                    break;
                }
            }
            if unit_at(s, j) == u32::from(b')') {
                end = j + 1;
            }
        }
        return Some((negative, Literal::Nan, end));
    }

    if unit_at(s, i) == u32::from(b'0') && matches!(unit_at(s, i + 1), 0x78 | 0x58) {
        let after = unit_at(s, i + 2);
        let hex_follows = hex_digit(after).is_some()
            || (after == point && hex_digit(unit_at(s, i + 3)).is_some());
        if hex_follows {
            let (lit, end) = scan_hex(s, i + 2, point);
            return Some((negative, lit, end));
        }
    }

    scan_decimal(s, i, point).map(|(lit, end)| (negative, lit, end))
}

/// Assemble `mant * 2^exp2` into the bit pattern of `fmt`, rounding half to even.
fn assemble_bits(mant: u64, exp2: i64, sticky: bool, fmt: BinaryFormat) -> (u64, ConversionStatus) {
    if mant == 0 {
        return (0, ConversionStatus::Success);
    }
    let lz = mant.leading_zeros();
    let m = mant << lz;
    let e = exp2 - i64::from(lz) + 63;
    let frac_bits = fmt.mant_bits - 1;
    let inf_bits = ((2 * fmt.max_exp + 1) as u64) << frac_bits;

    if e > fmt.max_exp {
        return (inf_bits, ConversionStatus::Overflow);
    }

    let keep: i64 = if e >= fmt.min_exp {
        i64::from(fmt.mant_bits)
    } else {
        i64::from(fmt.mant_bits) - (fmt.min_exp - e)
    };
    if keep < 0 {
        return (0, ConversionStatus::Underflow);
    }

    let drop = (64 - keep) as u32;
    let (mut kept, half, rest) = if drop >= 64 {
        (0u64, m >> 63, (m << 1) != 0 || sticky)
    } else {
        (
            m >> drop,
            (m >> (drop - 1)) & 1,
            (m & ((1u64 << (drop - 1)) - 1)) != 0 || sticky,
        )
    };
    if half == 1 && (rest || kept & 1 == 1) {
        kept += 1;
    }

    if e >= fmt.min_exp {
        let mut e = e;
        if kept == 1u64 << fmt.mant_bits {
            kept >>= 1;
            e += 1;
        }
        if e > fmt.max_exp {
            return (inf_bits, ConversionStatus::Overflow);
        }
        let biased = (e + fmt.max_exp) as u64;
        (
            (biased << frac_bits) | (kept & ((1u64 << frac_bits) - 1)),
            ConversionStatus::Success,
        )
    } else {
        // Subnormal; a carry into bit `frac_bits` lands on the smallest normal.
        let status = if kept >> frac_bits == 0 {
            ConversionStatus::Underflow
        } else {
            ConversionStatus::Success
        };
        (kept, status)
    }
}

fn decimal_has_nonzero_digit(text: &str) -> bool {
    text.bytes()
        .take_while(|&b| b != b'e')
        .any(|b| (b'1'..=b'9').contains(&b))
}

/// `strtod` with an explicit decimal-point unit: returns (value, consumed, status).
pub fn strtod_with_point<T: NumUnit>(s: &[T], point: u32) -> (f64, usize, ConversionStatus) {
    let Some((negative, lit, end)) = scan_literal(s, point) else {
        return (0.0, 0, ConversionStatus::Success);
    };
    let (magnitude, status) = match lit {
        Literal::Infinity => (f64::INFINITY, ConversionStatus::Success),
        Literal::Nan => (f64::NAN, ConversionStatus::Success),
        Literal::Hex { mant, exp2, sticky } => {
            let (bits, status) = assemble_bits(mant, exp2, sticky, F64_FORMAT);
            (f64::from_bits(bits), status)
        }
        Literal::Decimal(text) => {
            let v: f64 = text.parse().unwrap_or(0.0);
            let status = if v.is_infinite() {
                ConversionStatus::Overflow
            } else if (v == 0.0 || v.is_subnormal()) && decimal_has_nonzero_digit(&text) {
                ConversionStatus::Underflow
            } else {
                ConversionStatus::Success
            };
            (v, status)
        }
    };
    let val = if negative { -magnitude } else { magnitude };
    (val, end, status)
}

/// `strtof` with an explicit decimal-point unit.
pub fn strtof_with_point<T: NumUnit>(s: &[T], point: u32) -> (f32, usize, ConversionStatus) {
    let Some((negative, lit, end)) = scan_literal(s, point) else {
        return (0.0, 0, ConversionStatus::Success);
    };
    let (magnitude, status) = match lit {
        Literal::Infinity => (f32::INFINITY, ConversionStatus::Success),
        Literal::Nan => (f32::NAN, ConversionStatus::Success),
        Literal::Hex { mant, exp2, sticky } => {
            let (bits, status) = assemble_bits(mant, exp2, sticky, F32_FORMAT);
            (f32::from_bits(bits as u32), status)
        }
        Literal::Decimal(text) => {
            let v: f32 = text.parse().unwrap_or(0.0);
            let status = if v.is_infinite() {
                ConversionStatus::Overflow
            } else if (v == 0.0 || v.is_subnormal()) && decimal_has_nonzero_digit(&text) {
                ConversionStatus::Underflow
            } else {
                ConversionStatus::Success
            };
            (v, status)
        }
    };
    let val = if negative { -magnitude } else { magnitude };
    (val, end, status)
}

/// `strtod` using the current locale's decimal point.
pub fn strtod_impl<T: NumUnit>(s: &[T]) -> (f64, usize, ConversionStatus) {
    let point = crate::locale::current().decimal_point;
    strtod_with_point(s, u32::from(point))
}

/// `strtof` using the current locale's decimal point.
pub fn strtof_impl<T: NumUnit>(s: &[T]) -> (f32, usize, ConversionStatus) {
    let point = crate::locale::current().decimal_point;
    strtof_with_point(s, u32::from(point))
}

/// `wcstod` over wide code units.
pub fn wcstod_impl(s: &[u32]) -> (f64, usize, ConversionStatus) {
    strtod_impl(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dot(s: &[u8]) -> (f64, usize, ConversionStatus) {
        strtod_with_point(s, u32::from(b'.'))
    }

    #[test]
    fn decimal_forms() {
        assert_eq!(dot(b"3.25"), (3.25, 4, ConversionStatus::Success));
        assert_eq!(dot(b"  -1e3x"), (-1000.0, 6, ConversionStatus::Success));
        assert_eq!(dot(b".5"), (0.5, 2, ConversionStatus::Success));
        assert_eq!(dot(b"5."), (5.0, 2, ConversionStatus::Success));
        assert_eq!(dot(b"1e"), (1.0, 1, ConversionStatus::Success));
        assert_eq!(dot(b"1e+"), (1.0, 1, ConversionStatus::Success));
    }

    #[test]
    fn no_digits_consumes_nothing() {
        assert_eq!(dot(b"."), (0.0, 0, ConversionStatus::Success));
        assert_eq!(dot(b"-x"), (0.0, 0, ConversionStatus::Success));
        assert_eq!(dot(b""), (0.0, 0, ConversionStatus::Success));
    }

    #[test]
    fn special_values() {
        let (v, n, _) = dot(b"-Infinity!");
        assert!(v.is_infinite() && v < 0.0);
        assert_eq!(n, 9);
        let (v, n, _) = dot(b"INFx");
        assert!(v.is_infinite());
        assert_eq!(n, 3);
        let (v, n, _) = dot(b"nan(0x1f)z");
        assert!(v.is_nan());
        assert_eq!(n, 9);
        let (v, n, _) = dot(b"nan(");
        assert!(v.is_nan());
        assert_eq!(n, 3);
    }

    #[test]
    fn hex_floats_are_exact() {
        assert_eq!(dot(b"0x1.8p3"), (12.0, 7, ConversionStatus::Success));
        assert_eq!(dot(b"0X.8"), (0.5, 4, ConversionStatus::Success));
        assert_eq!(dot(b"0x1p-1074").0, f64::from_bits(1));
        assert_eq!(dot(b"0x1.fffffffffffffp1023").0, f64::MAX);
        // "0x" without hex digits parses the leading zero only.
        assert_eq!(dot(b"0xg"), (0.0, 1, ConversionStatus::Success));
    }

    #[test]
    fn hex_rounding_half_even() {
        // 1 + 2^-53 is a tie between 1 and 1 + 2^-52: rounds to even (1).
        assert_eq!(dot(b"0x1.00000000000008p0").0, 1.0);
        // 1 + 3*2^-53 ties upward to 1 + 2^-51.
        assert_eq!(dot(b"0x1.00000000000018p0").0, 1.0 + f64::EPSILON * 2.0);
        // Sticky bits beyond the tie break it upward.
        assert_eq!(dot(b"0x1.000000000000080000001p0").0, 1.0 + f64::EPSILON);
    }

    #[test]
    fn range_errors() {
        let (v, _, status) = dot(b"1e400");
        assert!(v.is_infinite());
        assert_eq!(status, ConversionStatus::Overflow);
        let (v, _, status) = dot(b"1e-400");
        assert_eq!(v, 0.0);
        assert_eq!(status, ConversionStatus::Underflow);
        let (_, _, status) = dot(b"0e-400");
        assert_eq!(status, ConversionStatus::Success);
        let (v, _, status) = dot(b"0x1p2000");
        assert!(v.is_infinite());
        assert_eq!(status, ConversionStatus::Overflow);
    }

    #[test]
    fn comma_decimal_point() {
        let (v, n, _) = strtod_with_point(b"2,5", u32::from(b','));
        assert_eq!((v, n), (2.5, 3));
        let (v, n, _) = strtod_with_point(b"2.5", u32::from(b','));
        assert_eq!((v, n), (2.0, 1));
    }

    #[test]
    fn strtof_rounds_once() {
        let (v, _, _) = strtof_with_point(b"0.1", u32::from(b'.'));
        assert_eq!(v, 0.1f32);
        let (v, _, _) = strtof_with_point(b"0x1.000001p0", u32::from(b'.'));
        assert_eq!(v, 1.0f32);
        let (v, _, status) = strtof_with_point(b"1e39", u32::from(b'.'));
        assert!(v.is_infinite());
        assert_eq!(status, ConversionStatus::Overflow);
    }

    #[test]
    fn wide_input() {
        let s: Vec<u32> = "  6.5e1 rest".chars().map(u32::from).collect();
        let (v, n, _) = strtod_with_point(&s, u32::from(b'.'));
        assert_eq!(v, 65.0);
        assert_eq!(n, 7);
    }
}
