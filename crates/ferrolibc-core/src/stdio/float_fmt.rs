//! Floating-point digit generation for `%f`, `%e`, `%g` and `%a`.
//!
//! Every function here takes a finite, non-negative magnitude and returns
//! ASCII text with `.` as the radix character. Sign, padding, grouping and
//! the locale decimal point are applied by the printf engine.
//!
//! Decimal digits come from Rust's exact float formatting, which rounds the
//! exact binary value half-to-even, matching glibc under the default
//! rounding mode.

/// Default precision when none is given.
pub const DEFAULT_PRECISION: usize = 6;

/// `%f`: fixed-point with `prec` fractional digits.
pub fn fixed(abs: f64, prec: usize, alt: bool) -> String {
    let mut s = format!("{abs:.prec$}");
    if prec == 0 && alt {
        s.push('.');
    }
    s
}

/// Split Rust's `{:e}` output into mantissa text and decimal exponent.
fn rust_exp(abs: f64, prec: usize) -> (String, i32) {
    let s = format!("{abs:.prec$e}");
    match s.split_once('e') {
        Some((mant, exp)) => (mant.to_string(), exp.parse().unwrap_or(0)),
        None => (s, 0),
    }
}

fn push_exponent(out: &mut String, exp: i32, upper: bool) {
    out.push(if upper { 'E' } else { 'e' });
    out.push(if exp < 0 { '-' } else { '+' });
    let mag = exp.unsigned_abs();
    if mag < 10 {
        out.push('0');
    }
    out.push_str(&mag.to_string());
}

/// `%e`: one integer digit, `prec` fractional digits, and an exponent of
/// at least two digits.
pub fn exponential(abs: f64, prec: usize, upper: bool, alt: bool) -> String {
    let (mut out, exp) = rust_exp(abs, prec);
    if prec == 0 && alt {
        out.push('.');
    }
    push_exponent(&mut out, exp, upper);
    out
}

fn strip_fraction_zeros(s: &mut String) {
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
}

/// `%g`: C99 style selection.
///
/// With P the precision (6 if absent, 1 if zero) and X the decimal
/// exponent after rounding to P significant digits: fixed style with
/// precision P-1-X when P > X >= -4, otherwise exponential with precision
/// P-1. Trailing fractional zeros and a bare point go unless `alt`.
pub fn general(abs: f64, prec: usize, upper: bool, alt: bool) -> String {
    let p = prec.max(1);
    let x = if abs == 0.0 {
        0
    } else {
        rust_exp(abs, p - 1).1
    };
    if (p as i64) > i64::from(x) && x >= -4 {
        let frac = (p as i64 - 1 - i64::from(x)) as usize;
        let mut s = fixed(abs, frac, alt);
        if !alt {
            strip_fraction_zeros(&mut s);
        }
        s
    } else {
        let (mut mant, exp) = rust_exp(abs, p - 1);
        if alt {
            if !mant.contains('.') {
                mant.push('.');
            }
        } else {
            strip_fraction_zeros(&mut mant);
        }
        push_exponent(&mut mant, exp, upper);
        mant
    }
}

const MANT_BITS: u32 = 52;
const MANT_NIBBLES: usize = 13;

/// `%a` without the `0x` prefix: `h.hhhp±d`.
///
/// Normal numbers print a leading `1`, subnormals a leading `0` with
/// exponent -1022. With an explicit precision the value is rounded
/// half-to-even on the dropped bits; a carry may turn the leading digit
/// into `2`. Without precision the digits are exact with trailing zeros
/// removed.
pub fn hex(abs: f64, prec: Option<usize>, upper: bool, alt: bool) -> String {
    let bits = abs.to_bits();
    let exp_bits = ((bits >> MANT_BITS) & 0x7ff) as i32;
    let frac = bits & ((1u64 << MANT_BITS) - 1);
    let (lead, exp) = match (exp_bits, frac) {
        (0, 0) => (0u64, 0),
        (0, _) => (0, -1022),
        _ => (1, exp_bits - 1023),
    };

    let combined = (lead << MANT_BITS) | frac;
    let (lead, digits, ndigits) = match prec {
        Some(p) if p < MANT_NIBBLES => {
            let shift = ((MANT_NIBBLES - p) * 4) as u32;
            let mut kept = combined >> shift;
            let rem = combined & ((1u64 << shift) - 1);
            let half = 1u64 << (shift - 1);
            if rem > half || (rem == half && kept & 1 == 1) {
                kept += 1;
            }
            let low = (p * 4) as u32;
            let mask = if low == 0 { 0 } else { (1u64 << low) - 1 };
            (kept >> low, kept & mask, p)
        }
        Some(p) => (lead, frac, p),
        None => {
            let mut f = frac;
            let mut n = MANT_NIBBLES;
            while n > 0 && f & 0xf == 0 {
                f >>= 4;
                n -= 1;
            }
            (lead, f, n)
        }
    };

    let mut out = String::with_capacity(ndigits + 8);
    out.push_str(&lead.to_string());
    if ndigits > 0 || alt {
        out.push('.');
    }
    let shown = ndigits.min(MANT_NIBBLES);
    let frac_digits = if upper {
        format!("{digits:0shown$X}")
    } else {
        format!("{digits:0shown$x}")
    };
    if shown > 0 {
        out.push_str(&frac_digits);
    }
    for _ in shown..ndigits {
        out.push('0');
    }
    out.push(if upper { 'P' } else { 'p' });
    out.push(if exp < 0 { '-' } else { '+' });
    out.push_str(&exp.unsigned_abs().to_string());
    out
}

#[cfg(test)]
#[allow(clippy::approx_constant)]
mod tests {
    use super::*;

    #[test]
    fn fixed_rounds_and_pads() {
        assert_eq!(fixed(3.14159, 2, false), "3.14");
        assert_eq!(fixed(2.75, 1, false), "2.8");
        assert_eq!(fixed(2.0, 0, true), "2.");
        assert_eq!(fixed(0.1, 20, false), "0.10000000000000000555");
    }

    #[test]
    fn exponential_has_two_digit_exponent() {
        assert_eq!(exponential(1234.5678, 2, false, false), "1.23e+03");
        assert_eq!(exponential(0.0, 3, true, false), "0.000E+00");
        assert_eq!(exponential(1e-300, 0, false, true), "1.e-300");
        assert_eq!(exponential(9.99, 1, false, false), "1.0e+01");
    }

    #[test]
    fn general_picks_style() {
        assert_eq!(general(100000.0, 6, false, false), "100000");
        assert_eq!(general(1000000.0, 6, false, false), "1e+06");
        assert_eq!(general(0.0001, 6, false, false), "0.0001");
        assert_eq!(general(0.00001, 6, false, false), "1e-05");
        assert_eq!(general(0.0, 6, false, false), "0");
        assert_eq!(general(1.5, 0, false, false), "2");
        assert_eq!(general(123456789.0, 6, true, false), "1.23457E+08");
    }

    #[test]
    fn general_alt_keeps_zeros() {
        assert_eq!(general(1.0, 6, false, true), "1.00000");
        assert_eq!(general(1e10, 3, false, true), "1.00e+10");
        assert_eq!(general(0.0, 1, false, true), "0.");
    }

    #[test]
    fn general_rounding_moves_exponent() {
        assert_eq!(general(999999.5, 6, false, false), "1e+06");
        assert_eq!(general(9.9999e-5, 3, false, false), "0.0001");
    }

    #[test]
    fn hex_exact_and_rounded() {
        assert_eq!(hex(1.0, None, false, false), "1p+0");
        assert_eq!(hex(0.5, None, false, false), "1p-1");
        assert_eq!(hex(3.0, None, false, false), "1.8p+1");
        assert_eq!(hex(0.0, None, false, false), "0p+0");
        assert_eq!(hex(1.0, Some(2), true, false), "1.00P+0");
        assert_eq!(hex(1.5, Some(0), false, false), "2p+0");
        assert_eq!(hex(1.0 + 2f64.powi(-52), Some(3), false, false), "1.000p+0");
        assert_eq!(hex(f64::MIN_POSITIVE / 2.0, None, false, false), "0.8p-1022");
        assert_eq!(hex(1.0, None, false, true), "1.p+0");
    }

    #[test]
    fn hex_round_half_even_on_nibble() {
        // 1.08 rounded to one digit: half, kept digit 0 is even.
        assert_eq!(hex(f64::from_bits(0x3FF0_8000_0000_0000), Some(1), false, false), "1.0p+0");
        // 1.18 rounded: half, kept digit 1 is odd.
        assert_eq!(hex(f64::from_bits(0x3FF1_8000_0000_0000), Some(1), false, false), "1.2p+0");
    }
}
