//! ABI layer for `<wchar.h>`: wide-character stream I/O, the multibyte
//! conversion functions and the wide numeric parsers.
//!
//! Conversion state crosses the boundary as the 8-byte C `mbstate_t`; a
//! null state pointer selects the function's own thread-local state.

use std::ffi::{c_char, c_int, c_long, c_ulong};
use std::ptr;

use libc::FILE;

use ferrolibc_core::errno;
use ferrolibc_core::locale;
use ferrolibc_core::stdlib::conversion::ConversionStatus;
use ferrolibc_core::stdlib::{wcstod_impl, wcstol_impl, wcstoul_impl};
use ferrolibc_core::wchar::{
    InternalState, MB_INVALID, MB_LEN_MAX, MbState, WEOF, btowc_with, c_size, mblen_with, mbrtowc_with,
    mbsrtowcs_with, mbstowcs_with, mbtowc_with, wcrtomb_with, wcsrtombs_with, wcstombs_with, wctob_with,
    wctomb_with, with_internal_state,
};

use crate::stdio_abi::with_stream;
use crate::util::{WcharT, WintT, c_bytes, c_wide, set_abi_errno};

/// C `mbstate_t` (glibc layout: 8 bytes, 4-byte aligned).
#[repr(C, align(4))]
#[derive(Debug, Clone, Copy, Default)]
pub struct MbStateT {
    raw: [u8; 8],
}

/// Run `f` against the caller's state, or the thread-local one for `which`
/// when `ps` is null.
unsafe fn with_state<R>(ps: *mut MbStateT, which: InternalState, f: impl FnOnce(&mut MbState) -> R) -> R {
    if ps.is_null() {
        return with_internal_state(which, f);
    }
    let mut state = MbState::from_raw(unsafe { (*ps).raw });
    let out = f(&mut state);
    unsafe { (*ps).raw = state.to_raw() };
    out
}

// ---------------------------------------------------------------------------
// Wide stream I/O
// ---------------------------------------------------------------------------

fn getwc_impl(fp: *mut FILE) -> WintT {
    match with_stream(fp, |s| s.getwc()) {
        Some(Ok(Some(wc))) => wc,
        _ => WEOF,
    }
}

fn putwc_impl(wc: WintT, fp: *mut FILE) -> WintT {
    match with_stream(fp, |s| s.putwc(wc)) {
        Some(Ok(())) => wc,
        _ => WEOF,
    }
}

abi_fn! {
    /// ISO C `fgetwc`.
    fn fgetwc(fp: *mut FILE) -> WintT {
        getwc_impl(fp)
    }
}

abi_fn! {
    /// ISO C `getwc`.
    fn getwc(fp: *mut FILE) -> WintT {
        getwc_impl(fp)
    }
}

abi_fn! {
    /// ISO C `fputwc`.
    fn fputwc(wc: WcharT, fp: *mut FILE) -> WintT {
        putwc_impl(wc as WintT, fp)
    }
}

abi_fn! {
    /// ISO C `putwc`.
    fn putwc(wc: WcharT, fp: *mut FILE) -> WintT {
        putwc_impl(wc as WintT, fp)
    }
}

abi_fn! {
    /// ISO C `ungetwc`.
    fn ungetwc(wc: WintT, fp: *mut FILE) -> WintT {
        if wc == WEOF {
            return WEOF;
        }
        match with_stream(fp, |s| s.ungetwc(wc)) {
            Some(Ok(())) => wc,
            _ => WEOF,
        }
    }
}

abi_fn! {
    /// ISO C `fgetws`.
    fn fgetws(ws: *mut WcharT, n: c_int, fp: *mut FILE) -> *mut WcharT {
        if ws.is_null() || n <= 0 {
            set_abi_errno(errno::EINVAL);
            return ptr::null_mut();
        }
        let out = std::slice::from_raw_parts_mut(ws.cast::<u32>(), n as usize);
        match with_stream(fp, |s| s.getws(out)) {
            Some(Some(_)) => ws,
            _ => ptr::null_mut(),
        }
    }
}

abi_fn! {
    /// ISO C `fputws`.
    fn fputws(ws: *const WcharT, fp: *mut FILE) -> c_int {
        if ws.is_null() {
            set_abi_errno(errno::EINVAL);
            return -1;
        }
        let text = c_wide(ws);
        match with_stream(fp, |s| s.putws(text)) {
            Some(Ok(_)) => 1,
            _ => -1,
        }
    }
}

// ---------------------------------------------------------------------------
// Restartable conversions
// ---------------------------------------------------------------------------

abi_fn! {
    /// ISO C `mbrtowc`.
    fn mbrtowc(pwc: *mut WcharT, s: *const c_char, n: usize, ps: *mut MbStateT) -> usize {
        let encoding = locale::current_encoding();
        if s.is_null() {
            return with_state(ps, InternalState::Mbrtowc, |st| {
                st.reset();
                0
            });
        }
        let bytes = std::slice::from_raw_parts(s.cast::<u8>(), n);
        let result = with_state(ps, InternalState::Mbrtowc, |st| mbrtowc_with(bytes, st, encoding));
        c_size(result.map(|(wc, len)| {
            if !pwc.is_null() {
                *pwc = wc as WcharT;
            }
            len
        }))
    }
}

abi_fn! {
    /// ISO C `mbrlen`.
    fn mbrlen(s: *const c_char, n: usize, ps: *mut MbStateT) -> usize {
        if s.is_null() {
            return with_state(ps, InternalState::Mbrlen, |st| {
                st.reset();
                0
            });
        }
        let encoding = locale::current_encoding();
        let bytes = std::slice::from_raw_parts(s.cast::<u8>(), n);
        c_size(with_state(ps, InternalState::Mbrlen, |st| {
            mbrtowc_with(bytes, st, encoding).map(|(_, len)| len)
        }))
    }
}

abi_fn! {
    /// ISO C `wcrtomb`.
    fn wcrtomb(s: *mut c_char, wc: WcharT, ps: *mut MbStateT) -> usize {
        let encoding = locale::current_encoding();
        let (wc, dest) = if s.is_null() { (0, None) } else { (wc as u32, Some(s)) };
        let mut buf = [0u8; MB_LEN_MAX];
        let result = with_state(ps, InternalState::Wcrtomb, |st| wcrtomb_with(wc, st, encoding, &mut buf));
        c_size(result.map(|len| {
            if let Some(dest) = dest {
                ptr::copy_nonoverlapping(buf.as_ptr(), dest.cast::<u8>(), len);
            }
            len
        }))
    }
}

abi_fn! {
    /// ISO C `mbsinit`.
    fn mbsinit(ps: *const MbStateT) -> c_int {
        if ps.is_null() {
            return 1;
        }
        c_int::from(MbState::from_raw((*ps).raw).is_initial())
    }
}

abi_fn! {
    /// ISO C `btowc`.
    fn btowc(c: c_int) -> WintT {
        btowc_with(c, locale::current_encoding())
    }
}

abi_fn! {
    /// ISO C `wctob`.
    fn wctob(wc: WintT) -> c_int {
        wctob_with(wc, locale::current_encoding())
    }
}

abi_fn! {
    /// ISO C `mbtowc`. Both supported encodings are stateless, so a null
    /// `s` reports 0.
    fn mbtowc(pwc: *mut WcharT, s: *const c_char, n: usize) -> c_int {
        if s.is_null() {
            return 0;
        }
        let bytes = std::slice::from_raw_parts(s.cast::<u8>(), n);
        match mbtowc_with(bytes, locale::current_encoding()) {
            Ok((wc, len)) => {
                if !pwc.is_null() {
                    *pwc = wc as WcharT;
                }
                len as c_int
            }
            Err(e) => {
                set_abi_errno(e.errno());
                -1
            }
        }
    }
}

abi_fn! {
    /// ISO C `mblen`.
    fn mblen(s: *const c_char, n: usize) -> c_int {
        if s.is_null() {
            return 0;
        }
        let bytes = std::slice::from_raw_parts(s.cast::<u8>(), n);
        match mblen_with(bytes, locale::current_encoding()) {
            Ok(len) => len as c_int,
            Err(e) => {
                set_abi_errno(e.errno());
                -1
            }
        }
    }
}

abi_fn! {
    /// ISO C `wctomb`.
    fn wctomb(s: *mut c_char, wc: WcharT) -> c_int {
        if s.is_null() {
            return 0;
        }
        let mut buf = [0u8; MB_LEN_MAX];
        match wctomb_with(wc as u32, locale::current_encoding(), &mut buf) {
            Ok(len) => {
                ptr::copy_nonoverlapping(buf.as_ptr(), s.cast::<u8>(), len);
                len as c_int
            }
            Err(e) => {
                set_abi_errno(e.errno());
                -1
            }
        }
    }
}

// ---------------------------------------------------------------------------
// String conversions
// ---------------------------------------------------------------------------

abi_fn! {
    /// ISO C `mbstowcs`.
    fn mbstowcs(dst: *mut WcharT, src: *const c_char, n: usize) -> usize {
        if src.is_null() {
            set_abi_errno(errno::EINVAL);
            return MB_INVALID;
        }
        let src = c_bytes(src);
        let dst = (!dst.is_null()).then(|| std::slice::from_raw_parts_mut(dst.cast::<u32>(), n));
        c_size(mbstowcs_with(src, dst, locale::current_encoding()))
    }
}

abi_fn! {
    /// ISO C `wcstombs`.
    fn wcstombs(dst: *mut c_char, src: *const WcharT, n: usize) -> usize {
        if src.is_null() {
            set_abi_errno(errno::EINVAL);
            return MB_INVALID;
        }
        let src = c_wide(src);
        let dst = (!dst.is_null()).then(|| std::slice::from_raw_parts_mut(dst.cast::<u8>(), n));
        c_size(wcstombs_with(src, dst, locale::current_encoding()))
    }
}

abi_fn! {
    /// ISO C `mbsrtowcs`. With a destination, `*src` advances past what was
    /// converted, or becomes null once the terminator is reached.
    fn mbsrtowcs(dst: *mut WcharT, src: *mut *const c_char, len: usize, ps: *mut MbStateT) -> usize {
        if src.is_null() || (*src).is_null() {
            set_abi_errno(errno::EINVAL);
            return MB_INVALID;
        }
        let start = *src;
        let bytes = c_bytes(start);
        let encoding = locale::current_encoding();
        let out = (!dst.is_null()).then(|| std::slice::from_raw_parts_mut(dst.cast::<u32>(), len));
        let has_dst = out.is_some();
        let result = with_state(ps, InternalState::Mbsrtowcs, |st| mbsrtowcs_with(bytes, out, st, encoding));
        c_size(result.map(|conv| {
            if has_dst {
                *src = conv.next.map_or(ptr::null(), |p| start.add(p));
            }
            conv.written
        }))
    }
}

abi_fn! {
    /// ISO C `wcsrtombs`.
    fn wcsrtombs(dst: *mut c_char, src: *mut *const WcharT, len: usize, ps: *mut MbStateT) -> usize {
        if src.is_null() || (*src).is_null() {
            set_abi_errno(errno::EINVAL);
            return MB_INVALID;
        }
        let start = *src;
        let wide = c_wide(start);
        let encoding = locale::current_encoding();
        let out = (!dst.is_null()).then(|| std::slice::from_raw_parts_mut(dst.cast::<u8>(), len));
        let has_dst = out.is_some();
        let result = with_state(ps, InternalState::Wcsrtombs, |st| wcsrtombs_with(wide, out, st, encoding));
        c_size(result.map(|conv| {
            if has_dst {
                *src = conv.next.map_or(ptr::null(), |p| start.add(p));
            }
            conv.written
        }))
    }
}

abi_fn! {
    /// glibc's `MB_CUR_MAX` accessor.
    fn __ctype_get_mb_cur_max() -> usize {
        locale::current_encoding().mb_cur_max()
    }
}

// ---------------------------------------------------------------------------
// Wide numeric parsing
// ---------------------------------------------------------------------------

fn report_status(status: ConversionStatus) {
    match status {
        ConversionStatus::Success => {}
        ConversionStatus::Overflow | ConversionStatus::Underflow => set_abi_errno(errno::ERANGE),
        ConversionStatus::InvalidBase => set_abi_errno(errno::EINVAL),
    }
}

unsafe fn store_end(nptr: *const WcharT, endptr: *mut *mut WcharT, consumed: usize) {
    if !endptr.is_null() {
        unsafe { *endptr = nptr.add(consumed).cast_mut() };
    }
}

abi_fn! {
    /// ISO C `wcstol`.
    fn wcstol(nptr: *const WcharT, endptr: *mut *mut WcharT, base: c_int) -> c_long {
        if nptr.is_null() {
            set_abi_errno(errno::EINVAL);
            return 0;
        }
        let (value, end, status) = wcstol_impl(c_wide(nptr), base);
        report_status(status);
        store_end(nptr, endptr, end);
        value as c_long
    }
}

abi_fn! {
    /// ISO C `wcstoul`.
    fn wcstoul(nptr: *const WcharT, endptr: *mut *mut WcharT, base: c_int) -> c_ulong {
        if nptr.is_null() {
            set_abi_errno(errno::EINVAL);
            return 0;
        }
        let (value, end, status) = wcstoul_impl(c_wide(nptr), base);
        report_status(status);
        store_end(nptr, endptr, end);
        value as c_ulong
    }
}

abi_fn! {
    /// ISO C `wcstod`.
    fn wcstod(nptr: *const WcharT, endptr: *mut *mut WcharT) -> f64 {
        if nptr.is_null() {
            set_abi_errno(errno::EINVAL);
            return 0.0;
        }
        let (value, end, status) = wcstod_impl(c_wide(nptr));
        report_status(status);
        store_end(nptr, endptr, end);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wide(s: &str) -> Vec<WcharT> {
        s.chars().map(|c| c as WcharT).chain(std::iter::once(0)).collect()
    }

    #[test]
    fn test_wcstol_end_pointer() {
        let text = wide("2001 60c0c0");
        let mut end: *mut WcharT = ptr::null_mut();
        let v = unsafe { wcstol(text.as_ptr(), &mut end, 10) };
        assert_eq!(v, 2001);
        let offset = unsafe { end.offset_from(text.as_ptr()) };
        assert_eq!(offset, 4);
        let rest = unsafe { c_wide(end) };
        let rest: String = rest.iter().filter_map(|&c| char::from_u32(c)).collect();
        assert_eq!(rest, " 60c0c0");
    }

    #[test]
    fn test_wcstol_no_digits_leaves_end_at_start() {
        let text = wide("  xyz");
        let mut end: *mut WcharT = ptr::null_mut();
        assert_eq!(unsafe { wcstol(text.as_ptr(), &mut end, 0) }, 0);
        assert_eq!(end.cast_const(), text.as_ptr());
    }

    #[test]
    fn test_wcstoul_overflow_sets_erange() {
        let text = wide("99999999999999999999999");
        errno::set_errno(0);
        assert_eq!(unsafe { wcstoul(text.as_ptr(), ptr::null_mut(), 10) }, c_ulong::MAX);
        assert_eq!(errno::get_errno(), errno::ERANGE);
    }

    #[test]
    fn test_wcstod_hex_and_end() {
        let text = wide("0x1.8p1 rest");
        let mut end: *mut WcharT = ptr::null_mut();
        assert_eq!(unsafe { wcstod(text.as_ptr(), &mut end) }, 3.0);
        assert_eq!(unsafe { end.offset_from(text.as_ptr()) }, 7);
    }

    #[test]
    fn test_mbrtowc_restarts_with_caller_state() {
        if locale::current_encoding() != locale::Encoding::Utf8 {
            return;
        }
        let euro = "\u{20ac}".as_bytes();
        let mut state = MbStateT::default();
        let mut wc: WcharT = 0;
        let first = unsafe { mbrtowc(&mut wc, euro.as_ptr().cast(), 1, &mut state) };
        assert_eq!(first, ferrolibc_core::wchar::MB_INCOMPLETE);
        assert_eq!(unsafe { mbsinit(&state) }, 0);
        let rest = unsafe { mbrtowc(&mut wc, euro[1..].as_ptr().cast(), 2, &mut state) };
        assert_eq!(rest, 2);
        assert_eq!(wc, 0x20AC);
        assert_eq!(unsafe { mbsinit(&state) }, 1);
    }

    #[test]
    fn test_invalid_sequence_sets_eilseq() {
        if locale::current_encoding() != locale::Encoding::Utf8 {
            return;
        }
        let bad = [0xFFu8, 0];
        errno::set_errno(0);
        let r = unsafe { mbrtowc(ptr::null_mut(), bad.as_ptr().cast(), 1, ptr::null_mut()) };
        assert_eq!(r, MB_INVALID);
        assert_eq!(errno::get_errno(), errno::EILSEQ);
        assert_eq!(unsafe { mblen(bad.as_ptr().cast(), 1) }, -1);
    }

    #[test]
    fn test_wcrtomb_and_wctomb() {
        if locale::current_encoding() != locale::Encoding::Utf8 {
            return;
        }
        let mut buf = [0 as c_char; MB_LEN_MAX];
        let n = unsafe { wcrtomb(buf.as_mut_ptr(), 0xE9, ptr::null_mut()) };
        assert_eq!(n, 2);
        assert_eq!(buf[..2].iter().map(|&b| b as u8).collect::<Vec<_>>(), "\u{e9}".as_bytes());
        assert_eq!(unsafe { wcrtomb(ptr::null_mut(), 0x41, ptr::null_mut()) }, 1);
        assert_eq!(unsafe { wctomb(buf.as_mut_ptr(), 0x41) }, 1);
        assert_eq!(unsafe { wctomb(ptr::null_mut(), 0x41) }, 0);
    }

    #[test]
    fn test_string_conversions_advance_source() {
        if locale::current_encoding() != locale::Encoding::Utf8 {
            return;
        }
        let text = "h\u{e9}llo\0";
        let mut src: *const c_char = text.as_ptr().cast();
        let mut out = [0 as WcharT; 3];
        let n = unsafe { mbsrtowcs(out.as_mut_ptr(), &mut src, 3, ptr::null_mut()) };
        assert_eq!(n, 3);
        assert_eq!(out, [0x68, 0xE9, 0x6C]);
        assert_eq!(unsafe { src.offset_from(text.as_ptr().cast()) }, 4);
        let mut rest = [0 as WcharT; 8];
        let n = unsafe { mbsrtowcs(rest.as_mut_ptr(), &mut src, 8, ptr::null_mut()) };
        assert_eq!(n, 2);
        assert!(src.is_null());

        let w = wide("h\u{e9}");
        assert_eq!(unsafe { wcstombs(ptr::null_mut(), w.as_ptr(), 0) }, 3);
        assert_eq!(unsafe { mbstowcs(ptr::null_mut(), text.as_ptr().cast(), 0) }, 5);
    }

    #[test]
    fn test_single_byte_helpers() {
        assert_eq!(unsafe { btowc(c_int::from(b'A')) }, 0x41);
        assert_eq!(unsafe { btowc(-1) }, WEOF);
        assert_eq!(unsafe { wctob(0x41) }, 0x41);
        assert_eq!(unsafe { mbsinit(ptr::null()) }, 1);
        assert!(unsafe { __ctype_get_mb_cur_max() } >= 1);
    }
}
