//! Multibyte/wide character conversion (`<wchar.h>` conversion functions).
//!
//! The `*_with` functions take the encoding explicitly; the short names use
//! the current locale's `LC_CTYPE` encoding. Calls that C makes with a null
//! `mbstate_t*` use one thread-local state per function, as POSIX requires.

pub mod engine;

use std::cell::Cell;

use thiserror::Error;

pub use engine::{Decoded, MB_LEN_MAX, MbState, Unrepresentable, decode_one, encode_one};

use crate::errno;
use crate::locale::{self, Encoding};

/// `WEOF` as a `wint_t` bit pattern.
pub const WEOF: u32 = 0xFFFF_FFFF;

/// `(size_t)-1` returned by the restartable functions on EILSEQ.
pub const MB_INVALID: usize = usize::MAX;
/// `(size_t)-2` returned when the input ends inside a character.
pub const MB_INCOMPLETE: usize = usize::MAX - 1;

/// Conversion failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MbError {
    #[error("incomplete multibyte sequence")]
    Incomplete,
    #[error("invalid or incomplete multibyte or wide character")]
    Invalid,
}

impl MbError {
    /// The `size_t` sentinel C callers expect.
    #[must_use]
    pub const fn c_size(self) -> usize {
        match self {
            Self::Incomplete => MB_INCOMPLETE,
            Self::Invalid => MB_INVALID,
        }
    }

    #[must_use]
    pub const fn errno(self) -> i32 {
        errno::EILSEQ
    }
}

/// Collapse a conversion result into the C `size_t` convention, setting
/// `EILSEQ` on invalid input.
pub fn c_size(result: Result<usize, MbError>) -> usize {
    match result {
        Ok(n) => n,
        Err(MbError::Invalid) => {
            errno::set_errno(errno::EILSEQ);
            MB_INVALID
        }
        Err(MbError::Incomplete) => MB_INCOMPLETE,
    }
}

/// Which function owns a thread-local fallback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalState {
    Mbrtowc,
    Mbrlen,
    Wcrtomb,
    Mbsrtowcs,
    Wcsrtombs,
    Mbtowc,
}

thread_local! {
    static INTERNAL_STATES: [Cell<MbState>; 6] = const {
        [
            Cell::new(MbState::new()),
            Cell::new(MbState::new()),
            Cell::new(MbState::new()),
            Cell::new(MbState::new()),
            Cell::new(MbState::new()),
            Cell::new(MbState::new()),
        ]
    };
}

/// Run `f` against the thread-local state for `which` (C null `ps`).
pub fn with_internal_state<R>(which: InternalState, f: impl FnOnce(&mut MbState) -> R) -> R {
    INTERNAL_STATES.with(|states| {
        let cell = &states[which as usize];
        let mut state = cell.get();
        let out = f(&mut state);
        cell.set(state);
        out
    })
}

// ---------------------------------------------------------------------------
// Single character
// ---------------------------------------------------------------------------

/// `mbrtowc`: returns (wide char, C return value). The return value is 0 for
/// the NUL character, otherwise the bytes consumed from `s`.
pub fn mbrtowc_with(
    s: &[u8],
    state: &mut MbState,
    encoding: Encoding,
) -> Result<(u32, usize), MbError> {
    match decode_one(s, state, encoding) {
        Decoded::Char { consumed, wc } => Ok((wc, if wc == 0 { 0 } else { consumed })),
        Decoded::Incomplete { .. } | Decoded::EndOfInput => Err(MbError::Incomplete),
        Decoded::Invalid => Err(MbError::Invalid),
    }
}

pub fn mbrtowc(s: &[u8], state: &mut MbState) -> Result<(u32, usize), MbError> {
    mbrtowc_with(s, state, locale::current_encoding())
}

/// `mbrlen`: `mbrtowc` without storing the character.
pub fn mbrlen(s: &[u8], state: &mut MbState) -> Result<usize, MbError> {
    mbrtowc(s, state).map(|(_, n)| n)
}

/// `wcrtomb`: encode `wc` into `out`.
pub fn wcrtomb_with(
    wc: u32,
    state: &mut MbState,
    encoding: Encoding,
    out: &mut [u8; MB_LEN_MAX],
) -> Result<usize, MbError> {
    encode_one(wc, state, encoding, out).map_err(|_| MbError::Invalid)
}

pub fn wcrtomb(wc: u32, state: &mut MbState, out: &mut [u8; MB_LEN_MAX]) -> Result<usize, MbError> {
    wcrtomb_with(wc, state, locale::current_encoding(), out)
}

/// `mbsinit`.
#[must_use]
pub fn mbsinit(state: Option<&MbState>) -> bool {
    state.is_none_or(MbState::is_initial)
}

/// `btowc`: widen a single byte, or `WEOF` if it does not form a whole
/// character by itself (or is `EOF`).
pub fn btowc_with(c: i32, encoding: Encoding) -> u32 {
    if !(0..=255).contains(&c) {
        return WEOF;
    }
    let mut state = MbState::new();
    match decode_one(&[c as u8], &mut state, encoding) {
        Decoded::Char { wc, .. } => wc,
        _ => WEOF,
    }
}

pub fn btowc(c: i32) -> u32 {
    btowc_with(c, locale::current_encoding())
}

/// `wctob`: narrow a wide character that encodes as exactly one byte, else EOF (-1).
pub fn wctob_with(wc: u32, encoding: Encoding) -> i32 {
    let mut state = MbState::new();
    let mut out = [0u8; MB_LEN_MAX];
    match encode_one(wc, &mut state, encoding, &mut out) {
        Ok(1) => i32::from(out[0]),
        _ => -1,
    }
}

pub fn wctob(wc: u32) -> i32 {
    wctob_with(wc, locale::current_encoding())
}

/// `mbtowc`: stateless single conversion. An incomplete sequence is an
/// error here, since there is no state to carry it.
pub fn mbtowc_with(s: &[u8], encoding: Encoding) -> Result<(u32, usize), MbError> {
    let mut state = MbState::new();
    match decode_one(s, &mut state, encoding) {
        Decoded::Char { consumed, wc } => Ok((wc, if wc == 0 { 0 } else { consumed })),
        _ => Err(MbError::Invalid),
    }
}

/// `mblen`: length of the character at `s`, 0 for NUL.
pub fn mblen_with(s: &[u8], encoding: Encoding) -> Result<usize, MbError> {
    mbtowc_with(s, encoding).map(|(_, n)| n)
}

/// `wctomb`: stateless single conversion.
pub fn wctomb_with(wc: u32, encoding: Encoding, out: &mut [u8; MB_LEN_MAX]) -> Result<usize, MbError> {
    let mut state = MbState::new();
    wcrtomb_with(wc, &mut state, encoding, out)
}

// ---------------------------------------------------------------------------
// Strings
// ---------------------------------------------------------------------------

/// Result of a string conversion: units written (excluding the terminator)
/// and where the source stopped. `None` means the terminating NUL was
/// converted (C sets `*src = NULL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrConversion {
    pub written: usize,
    pub next: Option<usize>,
}

/// `mbsrtowcs`: convert the NUL-terminated (or slice-terminated) multibyte
/// string `src`. With `dst = None` the full length is counted.
pub fn mbsrtowcs_with(
    src: &[u8],
    mut dst: Option<&mut [u32]>,
    state: &mut MbState,
    encoding: Encoding,
) -> Result<StrConversion, MbError> {
    let mut pos = 0;
    let mut written = 0;
    loop {
        if dst.as_deref().is_some_and(|d| written == d.len()) {
            return Ok(StrConversion {
                written,
                next: Some(pos),
            });
        }
        let rest = &src[pos.min(src.len())..];
        let (wc, consumed) = match decode_one(rest, state, encoding) {
            Decoded::Char { consumed, wc } => (wc, consumed),
            Decoded::EndOfInput => (0, 0),
            Decoded::Incomplete { .. } | Decoded::Invalid => {
                state.reset();
                return Err(MbError::Invalid);
            }
        };
        if wc == 0 {
            if let Some(d) = dst.as_deref_mut() {
                d[written] = 0;
            }
            state.reset();
            return Ok(StrConversion {
                written,
                next: None,
            });
        }
        if let Some(d) = dst.as_deref_mut() {
            d[written] = wc;
        }
        written += 1;
        pos += consumed;
    }
}

/// `wcsrtombs`: convert a wide string. A character that does not fit
/// entirely in `dst` stops the conversion before it.
pub fn wcsrtombs_with(
    src: &[u32],
    mut dst: Option<&mut [u8]>,
    state: &mut MbState,
    encoding: Encoding,
) -> Result<StrConversion, MbError> {
    let mut written = 0;
    let mut buf = [0u8; MB_LEN_MAX];
    for (pos, &wc) in src.iter().chain(std::iter::once(&0)).enumerate() {
        if wc == 0 {
            if let Some(d) = dst.as_deref_mut() {
                if written == d.len() {
                    return Ok(StrConversion {
                        written,
                        next: Some(pos),
                    });
                }
                d[written] = 0;
            }
            state.reset();
            return Ok(StrConversion {
                written,
                next: None,
            });
        }
        let n = encode_one(wc, state, encoding, &mut buf).map_err(|_| MbError::Invalid)?;
        if let Some(d) = dst.as_deref_mut() {
            if written + n > d.len() {
                return Ok(StrConversion {
                    written,
                    next: Some(pos),
                });
            }
            d[written..written + n].copy_from_slice(&buf[..n]);
        }
        written += n;
    }
    Ok(StrConversion {
        written,
        next: None,
    })
}

/// `mbstowcs`: `mbsrtowcs` with a fresh state.
pub fn mbstowcs_with(src: &[u8], dst: Option<&mut [u32]>, encoding: Encoding) -> Result<usize, MbError> {
    let mut state = MbState::new();
    mbsrtowcs_with(src, dst, &mut state, encoding).map(|c| c.written)
}

/// `wcstombs`: `wcsrtombs` with a fresh state.
pub fn wcstombs_with(src: &[u32], dst: Option<&mut [u8]>, encoding: Encoding) -> Result<usize, MbError> {
    let mut state = MbState::new();
    wcsrtombs_with(src, dst, &mut state, encoding).map(|c| c.written)
}

/// Decode a whole byte string into wide characters (stops at NUL).
pub fn decode_bytes(src: &[u8], encoding: Encoding) -> Result<Vec<u32>, MbError> {
    let mut out = Vec::with_capacity(src.len());
    let mut state = MbState::new();
    let mut rest = src;
    loop {
        match decode_one(rest, &mut state, encoding) {
            Decoded::Char { wc: 0, .. } | Decoded::EndOfInput => break,
            Decoded::Char { consumed, wc } => {
                out.push(wc);
                rest = &rest[consumed..];
            }
            Decoded::Incomplete { .. } | Decoded::Invalid => return Err(MbError::Invalid),
        }
    }
    Ok(out)
}

/// Encode wide characters into bytes (stops at NUL).
pub fn encode_wide(src: &[u32], encoding: Encoding) -> Result<Vec<u8>, MbError> {
    let mut out = Vec::with_capacity(src.len());
    let mut state = MbState::new();
    let mut buf = [0u8; MB_LEN_MAX];
    for &wc in src.iter().take_while(|&&wc| wc != 0) {
        let n = encode_one(wc, &mut state, encoding, &mut buf).map_err(|_| MbError::Invalid)?;
        out.extend_from_slice(&buf[..n]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const U: Encoding = Encoding::Utf8;

    #[test]
    fn mbrtowc_reports_nul_as_zero() {
        let mut st = MbState::new();
        assert_eq!(mbrtowc_with(b"\0x", &mut st, U), Ok((0, 0)));
        assert_eq!(mbrtowc_with(b"Ab", &mut st, U), Ok((u32::from(b'A'), 1)));
    }

    #[test]
    fn mbrtowc_incomplete_then_complete() {
        let mut st = MbState::new();
        assert_eq!(mbrtowc_with(&[0xF0, 0x9F], &mut st, U), Err(MbError::Incomplete));
        assert!(!mbsinit(Some(&st)));
        assert_eq!(mbrtowc_with(&[0x98, 0x80], &mut st, U), Ok((0x1F600, 2)));
        assert!(mbsinit(Some(&st)));
        assert!(mbsinit(None));
    }

    #[test]
    fn c_size_sets_eilseq() {
        errno::set_errno(0);
        assert_eq!(c_size(Err(MbError::Invalid)), MB_INVALID);
        assert_eq!(errno::get_errno(), errno::EILSEQ);
        assert_eq!(c_size(Err(MbError::Incomplete)), MB_INCOMPLETE);
        assert_eq!(c_size(Ok(3)), 3);
    }

    #[test]
    fn btowc_and_wctob() {
        assert_eq!(btowc_with(i32::from(b'a'), U), u32::from(b'a'));
        assert_eq!(btowc_with(0xC3, U), WEOF);
        assert_eq!(btowc_with(-1, U), WEOF);
        assert_eq!(btowc_with(0xC3, Encoding::SingleByte), 0xDFC3);
        assert_eq!(wctob_with(u32::from(b'z'), U), i32::from(b'z'));
        assert_eq!(wctob_with(0xE9, U), -1);
        assert_eq!(wctob_with(0xDFC3, Encoding::SingleByte), 0xC3);
    }

    #[test]
    fn mbsrtowcs_counts_and_converts() {
        let src = "h\u{e9}llo\0tail".as_bytes();
        let mut st = MbState::new();
        let counted = mbsrtowcs_with(src, None, &mut st, U).unwrap();
        assert_eq!(counted, StrConversion { written: 5, next: None });

        let mut dst = [0u32; 3];
        let partial = mbsrtowcs_with(src, Some(&mut dst), &mut st, U).unwrap();
        assert_eq!(partial.written, 3);
        assert_eq!(partial.next, Some(4));
        assert_eq!(dst, [u32::from(b'h'), 0xE9, u32::from(b'l')]);
    }

    #[test]
    fn mbsrtowcs_rejects_truncated_tail() {
        let mut st = MbState::new();
        assert_eq!(
            mbsrtowcs_with(&[b'a', 0xE2, 0x82], None, &mut st, U),
            Err(MbError::Invalid)
        );
    }

    #[test]
    fn wcsrtombs_stops_before_partial_character() {
        let src: Vec<u32> = "a\u{20ac}b".chars().map(u32::from).collect();
        let mut st = MbState::new();
        let mut dst = [0u8; 3];
        let conv = wcsrtombs_with(&src, Some(&mut dst), &mut st, U).unwrap();
        assert_eq!(conv, StrConversion { written: 1, next: Some(1) });

        let mut dst = [0u8; 8];
        let conv = wcsrtombs_with(&src, Some(&mut dst), &mut st, U).unwrap();
        assert_eq!(conv, StrConversion { written: 5, next: None });
        assert_eq!(&dst[..6], "a\u{20ac}b\0".as_bytes());

        assert_eq!(wcstombs_with(&[0xD800], None, U), Err(MbError::Invalid));
    }

    #[test]
    fn stateless_variants() {
        assert_eq!(mbtowc_with(&[0xC3, 0xA9], U), Ok((0xE9, 2)));
        assert_eq!(mbtowc_with(&[0xC3], U), Err(MbError::Invalid));
        let mut out = [0u8; MB_LEN_MAX];
        assert_eq!(wctomb_with(0xE9, U, &mut out), Ok(2));
        assert_eq!(mbstowcs_with(b"abc", None, U), Ok(3));
        assert_eq!(mblen_with(&[0xE2, 0x82, 0xAC, b'x'], U), Ok(3));
        assert_eq!(mblen_with(b"\0", U), Ok(0));
    }

    #[test]
    fn internal_states_are_independent() {
        with_internal_state(InternalState::Mbrtowc, |st| {
            assert_eq!(mbrtowc_with(&[0xE2], st, U), Err(MbError::Incomplete));
        });
        with_internal_state(InternalState::Mbrlen, |st| assert!(st.is_initial()));
        with_internal_state(InternalState::Mbrtowc, |st| {
            assert_eq!(mbrtowc_with(&[0x82, 0xAC], st, U), Ok((0x20AC, 2)));
        });
    }

    #[test]
    fn whole_string_helpers() {
        assert_eq!(decode_bytes("\u{e9}t\u{e9}".as_bytes(), U), Ok(vec![0xE9, 0x74, 0xE9]));
        assert_eq!(encode_wide(&[0xE9, 0x74, 0, 0x41], U), Ok("\u{e9}t".as_bytes().to_vec()));
    }
}
