//! printf formatting engine.
//!
//! Implementation of the POSIX printf format string interpreter. Parses
//! format directives and renders typed arguments with full
//! width/precision/flag support into a [`Sink`].
//!
//! Reference: POSIX.1-2024 fprintf, ISO C11 7.21.6.1 and 7.29.2.1
//!
//! The engine is generic over the code unit: `u8` for the narrow family
//! (`printf`, `snprintf`, ...) and `u32` for the wide family (`wprintf`,
//! `swprintf`, ...). Arguments arrive as an iterator of [`FormatArg`]
//! consumed once, in order.
//!
//! On a format error (unknown conversion, truncated directive, missing or
//! mismatched argument) rendering stops; whatever was already emitted stays
//! in the sink and the call fails with `EINVAL`.

use std::cell::Cell;

use log::{error, warn};
use thiserror::Error;

use super::error::StdioError;
use super::file::{Orientation, StdioStream};
use super::float_fmt;
use crate::config::{self, NullStrPolicy};
use crate::errno;
use crate::locale::{self, Encoding, LocaleContext};
use crate::stdlib::NumUnit;
use crate::wchar::{MB_LEN_MAX, MbState, WEOF, btowc_with, decode_bytes, encode_one};

// ---------------------------------------------------------------------------
// Format spec types
// ---------------------------------------------------------------------------

/// Flags parsed from a printf format directive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatFlags {
    pub left_justify: bool, // '-'
    pub force_sign: bool,   // '+'
    pub space_sign: bool,   // ' '
    pub alt_form: bool,     // '#'
    pub zero_pad: bool,     // '0'
    pub grouping: bool,     // '\''
}

/// Width specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    None,
    Fixed(usize),
    FromArg, // '*'
}

/// Precision specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    None,
    Fixed(usize),
    FromArg, // '.*'
}

/// Length modifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LengthMod {
    None,
    Hh,   // 'hh'
    H,    // 'h'
    L,    // 'l'
    Ll,   // 'll'
    Q,    // 'q' (BSD spelling of 'll')
    Z,    // 'z'
    T,    // 't'
    J,    // 'j'
    BigL, // 'L'
}

/// Conversion specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conversion {
    /// `d`, `i`
    Signed,
    /// `u`
    Unsigned,
    /// `o`
    Octal,
    /// `x`, `X`
    Hex { upper: bool },
    /// `f`, `F`
    Fixed { upper: bool },
    /// `e`, `E`
    Exp { upper: bool },
    /// `g`, `G`
    General { upper: bool },
    /// `a`, `A`
    HexFloat { upper: bool },
    /// `c`, `C`
    Char,
    /// `s`, `S`
    Str,
    /// `p`
    Pointer,
    /// `n`
    Count,
}

/// A parsed printf format specifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSpec {
    pub flags: FormatFlags,
    pub width: Width,
    pub precision: Precision,
    pub length: LengthMod,
    pub conversion: Conversion,
}

/// What a conversion consumes from the argument list, so the C boundary
/// can pull the right type out of a `va_list`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Signed,
    Unsigned,
    Float,
    Char,
    WideChar,
    Str,
    WideStr,
    Pointer,
    Count,
}

impl FormatSpec {
    /// Whether `%c`/`%s` take wide arguments (`l` modifier or `C`/`S`).
    pub fn wide_arg(&self) -> bool {
        self.length == LengthMod::L
    }

    pub fn arg_kind(&self) -> ArgKind {
        match self.conversion {
            Conversion::Signed => ArgKind::Signed,
            Conversion::Unsigned | Conversion::Octal | Conversion::Hex { .. } => ArgKind::Unsigned,
            Conversion::Fixed { .. }
            | Conversion::Exp { .. }
            | Conversion::General { .. }
            | Conversion::HexFloat { .. } => ArgKind::Float,
            Conversion::Char if self.wide_arg() => ArgKind::WideChar,
            Conversion::Char => ArgKind::Char,
            Conversion::Str if self.wide_arg() => ArgKind::WideStr,
            Conversion::Str => ArgKind::Str,
            Conversion::Pointer => ArgKind::Pointer,
            Conversion::Count => ArgKind::Count,
        }
    }
}

// ---------------------------------------------------------------------------
// Format argument types
// ---------------------------------------------------------------------------

/// Typed argument value.
///
/// Strings are borrowed without their NUL terminator; `None` is a null
/// pointer. `Count` is the destination of `%n`.
#[derive(Debug, Clone, Copy)]
pub enum FormatArg<'a> {
    SignedInt(i64),
    UnsignedInt(u64),
    Float(f64),
    /// `int` for `%c`, `wint_t` for `%lc`.
    Char(u32),
    Str(Option<&'a [u8]>),
    WideStr(Option<&'a [u32]>),
    Pointer(usize),
    Count(&'a Cell<i64>),
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure of a formatted output call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PrintfError {
    #[error("invalid conversion specification at offset {0}")]
    InvalidSpec(usize),
    #[error("missing argument for conversion {0}")]
    MissingArg(usize),
    #[error("argument {0} does not match its conversion")]
    ArgMismatch(usize),
    #[error("null string argument")]
    NullString,
    #[error("character not representable in the current encoding")]
    IllegalSequence,
    #[error("output length overflows")]
    Overflow,
    #[error("output does not fit the destination")]
    Truncated,
    #[error("cannot allocate memory")]
    NoMemory,
    #[error(transparent)]
    Io(#[from] StdioError),
}

impl PrintfError {
    /// Errors caused by the format string or its arguments.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidSpec(_) | Self::MissingArg(_) | Self::ArgMismatch(_) | Self::NullString
        )
    }

    /// errno value reported to C callers.
    pub fn errno(&self) -> i32 {
        match self {
            Self::InvalidSpec(_) | Self::MissingArg(_) | Self::ArgMismatch(_) | Self::NullString => {
                errno::EINVAL
            }
            Self::IllegalSequence => errno::EILSEQ,
            Self::Overflow | Self::Truncated => errno::EOVERFLOW,
            Self::NoMemory => errno::ENOMEM,
            Self::Io(e) => e.errno(),
        }
    }
}

// ---------------------------------------------------------------------------
// Code units
// ---------------------------------------------------------------------------

/// A character type the engine can emit: `u8` (narrow) or `u32` (wide).
///
/// The conversions between narrow and wide text for `%c`, `%s`, `%lc` and
/// `%ls` depend on the output width, so they live here.
pub trait FormatUnit: NumUnit + Default + PartialEq + std::fmt::Debug + 'static {
    fn from_ascii(b: u8) -> Self;

    /// `%c` argument (an `int` converted to `unsigned char`).
    fn narrow_char(c: u8, enc: Encoding) -> Result<Vec<Self>, PrintfError>;

    /// `%lc` argument.
    fn wide_char(wc: u32, enc: Encoding) -> Result<Vec<Self>, PrintfError>;

    /// `%s` argument; precision limits output units.
    fn narrow_text(s: &[u8], prec: Option<usize>, enc: Encoding) -> Result<Vec<Self>, PrintfError>;

    /// `%ls` argument; precision limits output units, whole characters only.
    fn wide_text(s: &[u32], prec: Option<usize>, enc: Encoding) -> Result<Vec<Self>, PrintfError>;
}

fn until_nul<T: NumUnit>(s: &[T]) -> &[T] {
    let end = s.iter().position(|u| u.code() == 0).unwrap_or(s.len());
    &s[..end]
}

impl FormatUnit for u8 {
    fn from_ascii(b: u8) -> Self {
        b
    }

    fn narrow_char(c: u8, _enc: Encoding) -> Result<Vec<Self>, PrintfError> {
        Ok(vec![c])
    }

    fn wide_char(wc: u32, enc: Encoding) -> Result<Vec<Self>, PrintfError> {
        let mut out = [0u8; MB_LEN_MAX];
        let n = encode_one(wc, &mut MbState::new(), enc, &mut out)
            .map_err(|_| PrintfError::IllegalSequence)?;
        Ok(out[..n].to_vec())
    }

    fn narrow_text(s: &[u8], prec: Option<usize>, _enc: Encoding) -> Result<Vec<Self>, PrintfError> {
        let s = until_nul(s);
        let n = prec.map_or(s.len(), |p| p.min(s.len()));
        Ok(s[..n].to_vec())
    }

    fn wide_text(s: &[u32], prec: Option<usize>, enc: Encoding) -> Result<Vec<Self>, PrintfError> {
        let limit = prec.unwrap_or(usize::MAX);
        let mut out = Vec::new();
        let mut buf = [0u8; MB_LEN_MAX];
        let mut state = MbState::new();
        for &wc in until_nul(s) {
            let n = encode_one(wc, &mut state, enc, &mut buf).map_err(|_| PrintfError::IllegalSequence)?;
            if out.len() + n > limit {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        Ok(out)
    }
}

impl FormatUnit for u32 {
    fn from_ascii(b: u8) -> Self {
        u32::from(b)
    }

    fn narrow_char(c: u8, enc: Encoding) -> Result<Vec<Self>, PrintfError> {
        match btowc_with(i32::from(c), enc) {
            WEOF => Err(PrintfError::IllegalSequence),
            wc => Ok(vec![wc]),
        }
    }

    fn wide_char(wc: u32, _enc: Encoding) -> Result<Vec<Self>, PrintfError> {
        Ok(vec![wc])
    }

    fn narrow_text(s: &[u8], prec: Option<usize>, enc: Encoding) -> Result<Vec<Self>, PrintfError> {
        let mut wide = decode_bytes(until_nul(s), enc).map_err(|_| PrintfError::IllegalSequence)?;
        if let Some(p) = prec {
            wide.truncate(p);
        }
        Ok(wide)
    }

    fn wide_text(s: &[u32], prec: Option<usize>, _enc: Encoding) -> Result<Vec<Self>, PrintfError> {
        let s = until_nul(s);
        let n = prec.map_or(s.len(), |p| p.min(s.len()));
        Ok(s[..n].to_vec())
    }
}

// ---------------------------------------------------------------------------
// Segment: parsed pieces of a format string
// ---------------------------------------------------------------------------

/// A segment of a parsed format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatSegment<'a, T> {
    /// Literal units to emit verbatim.
    Literal(&'a [T]),
    /// A `%%` escape (emit a single '%').
    Percent,
    /// A conversion specifier requiring an argument.
    Spec(FormatSpec),
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

#[inline]
fn code_at<T: NumUnit>(fmt: &[T], i: usize) -> u32 {
    fmt.get(i).map_or(0, |u| u.code())
}

#[inline]
fn is(c: u32, b: u8) -> bool {
    c == u32::from(b)
}

fn parse_decimal<T: NumUnit>(fmt: &[T], pos: &mut usize) -> Option<usize> {
    let start = *pos;
    let mut result = 0_usize;
    while let c @ 0x30..=0x39 = code_at(fmt, *pos) {
        result = result.saturating_mul(10).saturating_add((c - 0x30) as usize);
        *pos += 1;
    }
    (*pos > start).then_some(result)
}

/// Parse a single format specifier starting after the '%' character.
///
/// `fmt` points to the first unit AFTER '%'. Returns `(spec, consumed)`
/// where `consumed` counts from `fmt[0]`. Returns `None` if malformed.
pub fn parse_format_spec<T: NumUnit>(fmt: &[T]) -> Option<(FormatSpec, usize)> {
    let mut pos = 0;

    // --- flags ---
    let mut flags = FormatFlags::default();
    loop {
        match char::from_u32(code_at(fmt, pos)) {
            Some('-') => flags.left_justify = true,
            Some('+') => flags.force_sign = true,
            Some(' ') => flags.space_sign = true,
            Some('#') => flags.alt_form = true,
            Some('0') => flags.zero_pad = true,
            Some('\'') => flags.grouping = true,
            _ => break,
        }
        pos += 1;
    }
    // POSIX: '+' overrides ' '; '-' overrides '0'.
    if flags.force_sign {
        flags.space_sign = false;
    }
    if flags.left_justify {
        flags.zero_pad = false;
    }

    // --- width ---
    let width = if is(code_at(fmt, pos), b'*') {
        pos += 1;
        Width::FromArg
    } else {
        parse_decimal(fmt, &mut pos).map_or(Width::None, Width::Fixed)
    };

    // --- precision ---
    let precision = if is(code_at(fmt, pos), b'.') {
        pos += 1;
        if is(code_at(fmt, pos), b'*') {
            pos += 1;
            Precision::FromArg
        } else {
            Precision::Fixed(parse_decimal(fmt, &mut pos).unwrap_or(0))
        }
    } else {
        Precision::None
    };

    // --- length modifier (longest match) ---
    let c = code_at(fmt, pos);
    let next = code_at(fmt, pos + 1);
    let (mut length, len_units) = match char::from_u32(c) {
        Some('h') if is(next, b'h') => (LengthMod::Hh, 2),
        Some('h') => (LengthMod::H, 1),
        Some('l') if is(next, b'l') => (LengthMod::Ll, 2),
        Some('l') => (LengthMod::L, 1),
        Some('q') => (LengthMod::Q, 1),
        Some('z') => (LengthMod::Z, 1),
        Some('t') => (LengthMod::T, 1),
        Some('j') => (LengthMod::J, 1),
        Some('L') => (LengthMod::BigL, 1),
        _ => (LengthMod::None, 0),
    };
    pos += len_units;

    // --- conversion specifier ---
    if pos >= fmt.len() {
        return None;
    }
    let conversion = match char::from_u32(code_at(fmt, pos))? {
        'd' | 'i' => Conversion::Signed,
        'u' => Conversion::Unsigned,
        'o' => Conversion::Octal,
        'x' => Conversion::Hex { upper: false },
        'X' => Conversion::Hex { upper: true },
        'f' => Conversion::Fixed { upper: false },
        'F' => Conversion::Fixed { upper: true },
        'e' => Conversion::Exp { upper: false },
        'E' => Conversion::Exp { upper: true },
        'g' => Conversion::General { upper: false },
        'G' => Conversion::General { upper: true },
        'a' => Conversion::HexFloat { upper: false },
        'A' => Conversion::HexFloat { upper: true },
        'c' => Conversion::Char,
        's' => Conversion::Str,
        'C' => {
            length = LengthMod::L;
            Conversion::Char
        }
        'S' => {
            length = LengthMod::L;
            Conversion::Str
        }
        'p' => Conversion::Pointer,
        'n' => Conversion::Count,
        _ => return None,
    };
    pos += 1;

    Some((
        FormatSpec {
            flags,
            width,
            precision,
            length,
            conversion,
        },
        pos,
    ))
}

/// Lazy iterator over the segments of a format string.
///
/// Yields `Err(PrintfError::InvalidSpec(offset))` for a malformed
/// directive (including a trailing lone `%`) and then stops.
#[derive(Debug, Clone)]
pub struct FormatParser<'a, T> {
    fmt: &'a [T],
    pos: usize,
    failed: bool,
}

impl<'a, T: NumUnit> FormatParser<'a, T> {
    pub fn new(fmt: &'a [T]) -> Self {
        Self {
            fmt,
            pos: 0,
            failed: false,
        }
    }
}

impl<'a, T: NumUnit> Iterator for FormatParser<'a, T> {
    type Item = Result<FormatSegment<'a, T>, PrintfError>;

    fn next(&mut self) -> Option<Self::Item> {
        let fmt = self.fmt;
        if self.failed || self.pos >= fmt.len() {
            return None;
        }
        let start = self.pos;
        let run = fmt[start..]
            .iter()
            .position(|u| is(u.code(), b'%'))
            .unwrap_or(fmt.len() - start);
        if run > 0 {
            self.pos += run;
            return Some(Ok(FormatSegment::Literal(&fmt[start..start + run])));
        }
        // At a '%'.
        self.pos += 1;
        if is(code_at(fmt, self.pos), b'%') {
            self.pos += 1;
            return Some(Ok(FormatSegment::Percent));
        }
        match parse_format_spec(&fmt[self.pos..]) {
            Some((spec, consumed)) => {
                self.pos += consumed;
                Some(Ok(FormatSegment::Spec(spec)))
            }
            None => {
                self.failed = true;
                Some(Err(PrintfError::InvalidSpec(start)))
            }
        }
    }
}

/// Parse a whole format string.
pub fn parse_format_string<T: NumUnit>(fmt: &[T]) -> Result<Vec<FormatSegment<'_, T>>, PrintfError> {
    FormatParser::new(fmt).collect()
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Destination of formatted output.
pub trait Sink<T: Copy> {
    fn write_units(&mut self, units: &[T]) -> Result<(), PrintfError>;

    fn write_repeat(&mut self, unit: T, count: usize) -> Result<(), PrintfError> {
        let chunk = [unit; 64];
        let mut left = count;
        while left > 0 {
            let n = left.min(chunk.len());
            self.write_units(&chunk[..n])?;
            left -= n;
        }
        Ok(())
    }
}

/// Narrow output into a byte-oriented stream.
#[derive(Debug)]
pub struct StreamSink<'s> {
    stream: &'s mut StdioStream,
}

impl<'s> StreamSink<'s> {
    /// Fixes the stream's orientation to byte.
    pub fn new(stream: &'s mut StdioStream) -> Result<Self, PrintfError> {
        stream.claim(Orientation::Byte)?;
        Ok(Self { stream })
    }
}

impl Sink<u8> for StreamSink<'_> {
    fn write_units(&mut self, units: &[u8]) -> Result<(), PrintfError> {
        self.stream.write_bytes(units).map_err(|short| short.error.into())
    }
}

/// Wide output into a wide-oriented stream.
#[derive(Debug)]
pub struct WideStreamSink<'s> {
    stream: &'s mut StdioStream,
}

impl<'s> WideStreamSink<'s> {
    /// Fixes the stream's orientation to wide.
    pub fn new(stream: &'s mut StdioStream) -> Result<Self, PrintfError> {
        stream.claim(Orientation::Wide)?;
        Ok(Self { stream })
    }
}

impl Sink<u32> for WideStreamSink<'_> {
    fn write_units(&mut self, units: &[u32]) -> Result<(), PrintfError> {
        for &wc in units {
            self.stream.putwc(wc)?;
        }
        Ok(())
    }
}

/// Bounded buffer (`snprintf`, `swprintf`): keeps what fits, leaving room
/// for the terminator, and drops the rest.
#[derive(Debug)]
pub struct BufferSink<'b, T> {
    buf: &'b mut [T],
    len: usize,
    wanted: usize,
}

impl<'b, T: Copy + Default> BufferSink<'b, T> {
    pub fn new(buf: &'b mut [T]) -> Self {
        Self {
            buf,
            len: 0,
            wanted: 0,
        }
    }

    /// Whether output was dropped.
    pub fn truncated(&self) -> bool {
        self.wanted > self.len
    }

    /// Write the terminator. Returns the number of units stored before it.
    pub fn finish(self) -> usize {
        if let Some(slot) = self.buf.get_mut(self.len) {
            *slot = T::default();
        }
        self.len
    }
}

impl<T: Copy + Default> Sink<T> for BufferSink<'_, T> {
    fn write_units(&mut self, units: &[T]) -> Result<(), PrintfError> {
        self.wanted += units.len();
        let room = self.buf.len().saturating_sub(1).saturating_sub(self.len);
        let n = units.len().min(room);
        self.buf[self.len..self.len + n].copy_from_slice(&units[..n]);
        self.len += n;
        Ok(())
    }
}

/// Size-only mode (`snprintf(NULL, 0, ...)`).
#[derive(Debug, Default, Clone, Copy)]
pub struct CountingSink;

impl<T: Copy> Sink<T> for CountingSink {
    fn write_units(&mut self, _units: &[T]) -> Result<(), PrintfError> {
        Ok(())
    }

    fn write_repeat(&mut self, _unit: T, _count: usize) -> Result<(), PrintfError> {
        Ok(())
    }
}

/// Growable output (`asprintf`, `open_memstream`-style callers).
#[derive(Debug, Default)]
pub struct VecSink<T> {
    pub out: Vec<T>,
}

impl<T: Copy> Sink<T> for VecSink<T> {
    fn write_units(&mut self, units: &[T]) -> Result<(), PrintfError> {
        self.out
            .try_reserve(units.len())
            .map_err(|_| PrintfError::NoMemory)?;
        self.out.extend_from_slice(units);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Per-call rendering state.
struct Renderer<'f, T, S: ?Sized> {
    sink: &'f mut S,
    total: usize,
    arg_index: usize,
    locale: LocaleContext,
    null_str: NullStrPolicy,
    _unit: std::marker::PhantomData<T>,
}

/// Laid-out field: `[pad][prefix][zeros][body][pad]`.
struct Field<T> {
    prefix: Vec<T>,
    zeros: usize,
    body: Vec<T>,
    /// Pad with zeros between prefix and body instead of leading spaces.
    zero_fill: bool,
}

impl<T: FormatUnit> Field<T> {
    fn text(body: Vec<T>) -> Self {
        Self {
            prefix: Vec::new(),
            zeros: 0,
            body,
            zero_fill: false,
        }
    }
}

fn widen<T: FormatUnit>(ascii: &[u8]) -> Vec<T> {
    ascii.iter().map(|&b| T::from_ascii(b)).collect()
}

fn render_digits(mut value: u64, base: u64, upper: bool) -> Vec<u8> {
    if value == 0 {
        return vec![b'0'];
    }
    let alpha = if upper { b'A' } else { b'a' };
    let mut digits = Vec::with_capacity(22);
    while value > 0 {
        let d = (value % base) as u8;
        digits.push(if d < 10 { b'0' + d } else { alpha + d - 10 });
        value /= base;
    }
    digits.reverse();
    digits
}

/// Insert `sep` between groups of three digits.
fn group_digits(digits: &[u8], sep: &[u8]) -> Vec<u8> {
    if sep.is_empty() || digits.len() <= 3 {
        return digits.to_vec();
    }
    let mut out = Vec::with_capacity(digits.len() + digits.len() / 3 * sep.len());
    for (i, &d) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.extend_from_slice(sep);
        }
        out.push(d);
    }
    out
}

fn truncate_signed(v: i64, length: LengthMod) -> i64 {
    match length {
        LengthMod::Hh => i64::from(v as i8),
        LengthMod::H => i64::from(v as i16),
        LengthMod::None => i64::from(v as i32),
        _ => v,
    }
}

fn truncate_unsigned(v: u64, length: LengthMod) -> u64 {
    match length {
        LengthMod::Hh => u64::from(v as u8),
        LengthMod::H => u64::from(v as u16),
        LengthMod::None => u64::from(v as u32),
        _ => v,
    }
}

fn sign_char(negative: bool, flags: &FormatFlags) -> Option<u8> {
    if negative {
        Some(b'-')
    } else if flags.force_sign {
        Some(b'+')
    } else if flags.space_sign {
        Some(b' ')
    } else {
        None
    }
}

impl<'f, T, S> Renderer<'f, T, S>
where
    T: FormatUnit,
    S: Sink<T> + ?Sized,
{
    fn new(sink: &'f mut S) -> Self {
        Self {
            sink,
            total: 0,
            arg_index: 0,
            locale: locale::current(),
            null_str: config::stdio_config().null_str,
            _unit: std::marker::PhantomData,
        }
    }

    fn emit(&mut self, units: &[T]) -> Result<(), PrintfError> {
        self.total = self.total.checked_add(units.len()).ok_or(PrintfError::Overflow)?;
        self.sink.write_units(units)
    }

    fn emit_repeat(&mut self, unit: T, count: usize) -> Result<(), PrintfError> {
        if count == 0 {
            return Ok(());
        }
        self.total = self.total.checked_add(count).ok_or(PrintfError::Overflow)?;
        self.sink.write_repeat(unit, count)
    }

    fn next_arg<'a>(&mut self, args: &mut impl Iterator<Item = FormatArg<'a>>) -> Result<FormatArg<'a>, PrintfError> {
        let index = self.arg_index;
        self.arg_index += 1;
        args.next().ok_or(PrintfError::MissingArg(index))
    }

    fn int_arg<'a>(&mut self, args: &mut impl Iterator<Item = FormatArg<'a>>) -> Result<i64, PrintfError> {
        match self.next_arg(args)? {
            FormatArg::SignedInt(v) => Ok(v),
            FormatArg::UnsignedInt(v) => Ok(v as i64),
            _ => Err(PrintfError::ArgMismatch(self.arg_index - 1)),
        }
    }

    fn write_field(&mut self, width: usize, left: bool, field: Field<T>) -> Result<(), PrintfError> {
        let content = field.prefix.len() + field.zeros + field.body.len();
        let pad = width.saturating_sub(content);
        let space = T::from_ascii(b' ');
        let zero = T::from_ascii(b'0');
        if !left && !field.zero_fill {
            self.emit_repeat(space, pad)?;
        }
        self.emit(&field.prefix)?;
        if !left && field.zero_fill {
            self.emit_repeat(zero, pad)?;
        }
        self.emit_repeat(zero, field.zeros)?;
        self.emit(&field.body)?;
        if left {
            self.emit_repeat(space, pad)?;
        }
        Ok(())
    }

    fn render<'a>(&mut self, fmt: &[T], args: impl IntoIterator<Item = FormatArg<'a>>) -> Result<(), PrintfError> {
        let mut args = args.into_iter();
        for segment in FormatParser::new(fmt) {
            match segment? {
                FormatSegment::Literal(units) => self.emit(units)?,
                FormatSegment::Percent => self.emit(&[T::from_ascii(b'%')])?,
                FormatSegment::Spec(spec) => self.conversion(&spec, &mut args)?,
            }
        }
        Ok(())
    }

    fn conversion<'a>(
        &mut self,
        spec: &FormatSpec,
        args: &mut impl Iterator<Item = FormatArg<'a>>,
    ) -> Result<(), PrintfError> {
        let mut flags = spec.flags;
        let width = match spec.width {
            Width::None => 0,
            Width::Fixed(w) => w,
            Width::FromArg => {
                let w = self.int_arg(args)? as i32;
                if w < 0 {
                    flags.left_justify = true;
                    flags.zero_pad = false;
                }
                w.unsigned_abs() as usize
            }
        };
        let precision = match spec.precision {
            Precision::None => None,
            Precision::Fixed(p) => Some(p),
            Precision::FromArg => usize::try_from(self.int_arg(args)? as i32).ok(),
        };

        let index = self.arg_index;
        let arg = self.next_arg(args)?;
        let mismatch = PrintfError::ArgMismatch(index);
        let enc = self.locale.encoding;

        let field = match spec.conversion {
            Conversion::Signed => {
                let raw = match arg {
                    FormatArg::SignedInt(v) => v,
                    FormatArg::UnsignedInt(v) => v as i64,
                    _ => return Err(mismatch),
                };
                let v = truncate_signed(raw, spec.length);
                self.integer(&flags, precision, v < 0, v.unsigned_abs(), 10, false)
            }
            Conversion::Unsigned | Conversion::Octal | Conversion::Hex { .. } => {
                let raw = match arg {
                    FormatArg::UnsignedInt(v) => v,
                    FormatArg::SignedInt(v) => v as u64,
                    _ => return Err(mismatch),
                };
                let v = truncate_unsigned(raw, spec.length);
                let (base, upper) = match spec.conversion {
                    Conversion::Octal => (8, false),
                    Conversion::Hex { upper } => (16, upper),
                    _ => (10, false),
                };
                let mut unsigned_flags = flags;
                unsigned_flags.force_sign = false;
                unsigned_flags.space_sign = false;
                self.integer(&unsigned_flags, precision, false, v, base, upper)
            }
            Conversion::Fixed { .. }
            | Conversion::Exp { .. }
            | Conversion::General { .. }
            | Conversion::HexFloat { .. } => {
                let FormatArg::Float(v) = arg else {
                    return Err(mismatch);
                };
                self.float(&flags, precision, spec.conversion, v)
            }
            Conversion::Char => {
                let body = match arg {
                    FormatArg::Char(c) if spec.wide_arg() => T::wide_char(c, enc)?,
                    FormatArg::Char(c) => T::narrow_char(c as u8, enc)?,
                    FormatArg::SignedInt(c) if !spec.wide_arg() => T::narrow_char(c as u8, enc)?,
                    _ => return Err(mismatch),
                };
                Field::text(body)
            }
            Conversion::Str => {
                let body = match arg {
                    FormatArg::Str(Some(s)) if !spec.wide_arg() => T::narrow_text(s, precision, enc)?,
                    FormatArg::WideStr(Some(s)) if spec.wide_arg() => T::wide_text(s, precision, enc)?,
                    FormatArg::Str(None) | FormatArg::WideStr(None) => self.null_text(precision)?,
                    _ => return Err(mismatch),
                };
                Field::text(body)
            }
            Conversion::Pointer => {
                let addr = match arg {
                    FormatArg::Pointer(p) => p as u64,
                    FormatArg::UnsignedInt(v) => v,
                    FormatArg::SignedInt(v) => v as u64,
                    _ => return Err(mismatch),
                };
                if addr == 0 {
                    Field::text(widen(b"(nil)"))
                } else {
                    let mut field = self.integer(&flags, precision, false, addr, 16, false);
                    let mut prefix = Vec::new();
                    if let Some(s) = sign_char(false, &flags) {
                        prefix.push(T::from_ascii(s));
                    }
                    prefix.extend(widen::<T>(b"0x"));
                    field.prefix = prefix;
                    field
                }
            }
            Conversion::Count => {
                let FormatArg::Count(slot) = arg else {
                    return Err(mismatch);
                };
                slot.set(self.total as i64);
                return Ok(());
            }
        };
        self.write_field(width, flags.left_justify, field)
    }

    fn null_text(&self, precision: Option<usize>) -> Result<Vec<T>, PrintfError> {
        if self.null_str == NullStrPolicy::Fail {
            return Err(PrintfError::NullString);
        }
        // glibc prints nothing when the precision cannot fit "(null)".
        Ok(match precision {
            Some(p) if p < 6 => Vec::new(),
            _ => widen(b"(null)"),
        })
    }

    fn integer(
        &self,
        flags: &FormatFlags,
        precision: Option<usize>,
        negative: bool,
        magnitude: u64,
        base: u64,
        upper: bool,
    ) -> Field<T> {
        let mut digits = if magnitude == 0 && precision == Some(0) {
            Vec::new()
        } else {
            render_digits(magnitude, base, upper)
        };
        let mut zeros = precision.unwrap_or(1).saturating_sub(digits.len());
        if base == 10 && flags.grouping {
            digits = group_digits(&digits, &self.locale.thousands_sep);
        }

        let mut prefix = Vec::new();
        if let Some(s) = sign_char(negative, flags) {
            prefix.push(T::from_ascii(s));
        }
        if flags.alt_form {
            match (base, upper) {
                (8, _) => {
                    if zeros == 0 && digits.first() != Some(&b'0') {
                        zeros = 1;
                    }
                }
                (16, false) if magnitude != 0 => prefix.extend(widen::<T>(b"0x")),
                (16, true) if magnitude != 0 => prefix.extend(widen::<T>(b"0X")),
                _ => {}
            }
        }

        Field {
            prefix,
            zeros,
            body: widen(&digits),
            zero_fill: flags.zero_pad && !flags.left_justify && precision.is_none(),
        }
    }

    fn float(&self, flags: &FormatFlags, precision: Option<usize>, conv: Conversion, v: f64) -> Field<T> {
        let upper = matches!(
            conv,
            Conversion::Fixed { upper: true }
                | Conversion::Exp { upper: true }
                | Conversion::General { upper: true }
                | Conversion::HexFloat { upper: true }
        );
        let mut prefix = Vec::new();
        if let Some(s) = sign_char(v.is_sign_negative(), flags) {
            prefix.push(T::from_ascii(s));
        }

        if !v.is_finite() {
            let text: &[u8] = match (v.is_nan(), upper) {
                (true, false) => b"nan",
                (true, true) => b"NAN",
                (false, false) => b"inf",
                (false, true) => b"INF",
            };
            return Field {
                prefix,
                zeros: 0,
                body: widen(text),
                zero_fill: false,
            };
        }

        let abs = v.abs();
        let alt = flags.alt_form;
        let prec = precision.unwrap_or(float_fmt::DEFAULT_PRECISION);
        let text = match conv {
            Conversion::Fixed { .. } => float_fmt::fixed(abs, prec, alt),
            Conversion::Exp { .. } => float_fmt::exponential(abs, prec, upper, alt),
            Conversion::General { .. } => float_fmt::general(abs, prec, upper, alt),
            _ => {
                prefix.extend(widen::<T>(if upper { b"0X" } else { b"0x" }));
                float_fmt::hex(abs, precision, upper, alt)
            }
        };

        let text = text.into_bytes();
        let int_end = text
            .iter()
            .position(|&b| !b.is_ascii_digit())
            .unwrap_or(text.len());
        let has_exponent = text.iter().any(|&b| matches!(b, b'e' | b'E' | b'p' | b'P'));
        let mut body = Vec::with_capacity(text.len() + 8);
        if flags.grouping && !has_exponent {
            body.extend(group_digits(&text[..int_end], &self.locale.thousands_sep));
        } else {
            body.extend_from_slice(&text[..int_end]);
        }
        for &b in &text[int_end..] {
            body.push(if b == b'.' { self.locale.decimal_point } else { b });
        }

        Field {
            prefix,
            zeros: 0,
            body: widen(&body),
            zero_fill: flags.zero_pad && !flags.left_justify,
        }
    }
}

/// Log a failed call and apply the configured format-error policy.
fn report(err: PrintfError) -> PrintfError {
    warn!("printf: {err}");
    if err.is_format_error() && config::stdio_config().format_errors.aborts() {
        error!("printf: aborting on format error: {err}");
        std::process::abort();
    }
    errno::set_errno(err.errno());
    err
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Render `fmt` with `args` into `sink`. Returns the number of units the
/// full output has, whether or not the sink kept all of them.
pub fn format_into<'a, T, S>(
    sink: &mut S,
    fmt: &[T],
    args: impl IntoIterator<Item = FormatArg<'a>>,
) -> Result<usize, PrintfError>
where
    T: FormatUnit,
    S: Sink<T> + ?Sized,
{
    let mut renderer = Renderer::new(sink);
    match renderer.render(fmt, args) {
        Ok(()) => Ok(renderer.total),
        Err(e) => Err(report(e)),
    }
}

/// `asprintf`-style: render into a fresh byte vector.
pub fn sprintf<'a>(fmt: &[u8], args: impl IntoIterator<Item = FormatArg<'a>>) -> Result<Vec<u8>, PrintfError> {
    let mut sink = VecSink::default();
    format_into(&mut sink, fmt, args)?;
    Ok(sink.out)
}

/// `snprintf`: `None` (or an empty buffer) only measures. The buffer is
/// always terminated when it has room, even after a failure.
pub fn snprintf<'a>(
    buf: Option<&mut [u8]>,
    fmt: &[u8],
    args: impl IntoIterator<Item = FormatArg<'a>>,
) -> Result<usize, PrintfError> {
    match buf {
        Some(buf) if !buf.is_empty() => {
            let mut sink = BufferSink::new(buf);
            let result = format_into(&mut sink, fmt, args);
            sink.finish();
            result
        }
        _ => format_into(&mut CountingSink, fmt, args),
    }
}

/// `fprintf` on a stream; fixes byte orientation.
pub fn fprintf<'a>(
    stream: &mut StdioStream,
    fmt: &[u8],
    args: impl IntoIterator<Item = FormatArg<'a>>,
) -> Result<usize, PrintfError> {
    let mut sink = StreamSink::new(stream).map_err(report)?;
    format_into(&mut sink, fmt, args)
}

/// `fwprintf` on a stream; fixes wide orientation.
pub fn fwprintf<'a>(
    stream: &mut StdioStream,
    fmt: &[u32],
    args: impl IntoIterator<Item = FormatArg<'a>>,
) -> Result<usize, PrintfError> {
    let mut sink = WideStreamSink::new(stream).map_err(report)?;
    format_into(&mut sink, fmt, args)
}

/// `swprintf`: unlike `snprintf`, output that does not fit is an error.
pub fn swprintf<'a>(
    buf: &mut [u32],
    fmt: &[u32],
    args: impl IntoIterator<Item = FormatArg<'a>>,
) -> Result<usize, PrintfError> {
    let mut sink = BufferSink::new(buf);
    let result = format_into(&mut sink, fmt, args);
    let truncated = sink.truncated() || sink.buf.is_empty();
    sink.finish();
    match result {
        Ok(_) if truncated => Err(report(PrintfError::Truncated)),
        other => other,
    }
}

/// Wide rendering into a fresh vector.
pub fn wide_sprintf<'a>(fmt: &[u32], args: impl IntoIterator<Item = FormatArg<'a>>) -> Result<Vec<u32>, PrintfError> {
    let mut sink = VecSink::default();
    format_into(&mut sink, fmt, args)?;
    Ok(sink.out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
#[allow(clippy::approx_constant)]
mod tests {
    use super::*;
    use crate::stdio::backend::PipeBackend;
    use crate::stdio::buffer::BufMode;
    use crate::stdio::file::parse_mode;

    fn fmt(f: &str, args: Vec<FormatArg<'_>>) -> String {
        String::from_utf8(sprintf(f.as_bytes(), args).unwrap()).unwrap()
    }

    fn wide(s: &str) -> Vec<u32> {
        s.chars().map(u32::from).collect()
    }

    use FormatArg::{Float, SignedInt as I, Str, UnsignedInt as U};

    #[test]
    fn test_parse_simple_int() {
        let (spec, consumed) = parse_format_spec(b"d").unwrap();
        assert_eq!(consumed, 1);
        assert_eq!(spec.conversion, Conversion::Signed);
        assert_eq!(spec.width, Width::None);
        assert_eq!(spec.precision, Precision::None);
    }

    #[test]
    fn test_parse_width_precision() {
        let (spec, consumed) = parse_format_spec(b"10.5f").unwrap();
        assert_eq!(consumed, 5);
        assert_eq!(spec.conversion, Conversion::Fixed { upper: false });
        assert_eq!(spec.width, Width::Fixed(10));
        assert_eq!(spec.precision, Precision::Fixed(5));
    }

    #[test]
    fn test_parse_flags() {
        let (spec, _) = parse_format_spec(b"-+#0'10d").unwrap();
        assert!(spec.flags.left_justify);
        assert!(spec.flags.force_sign);
        assert!(spec.flags.alt_form);
        assert!(spec.flags.grouping);
        assert!(!spec.flags.zero_pad);
    }

    #[test]
    fn test_parse_length_modifiers() {
        let cases: [(&[u8], LengthMod); 9] = [
            (b"hhd", LengthMod::Hh),
            (b"hd", LengthMod::H),
            (b"ld", LengthMod::L),
            (b"lld", LengthMod::Ll),
            (b"qd", LengthMod::Q),
            (b"jd", LengthMod::J),
            (b"zu", LengthMod::Z),
            (b"td", LengthMod::T),
            (b"Lf", LengthMod::BigL),
        ];
        for (text, want) in cases {
            assert_eq!(parse_format_spec(text).unwrap().0.length, want);
        }
    }

    #[test]
    fn test_parse_capital_c_s_are_wide() {
        let (spec, _) = parse_format_spec(b"S").unwrap();
        assert_eq!(spec.arg_kind(), ArgKind::WideStr);
        let (spec, _) = parse_format_spec(b"C").unwrap();
        assert_eq!(spec.arg_kind(), ArgKind::WideChar);
    }

    #[test]
    fn test_parse_star_width_and_precision() {
        let (spec, _) = parse_format_spec(b"*.*f").unwrap();
        assert_eq!(spec.width, Width::FromArg);
        assert_eq!(spec.precision, Precision::FromArg);
    }

    #[test]
    fn test_parse_format_string_segments() {
        let segments = parse_format_string(b"hello %d world %s!").unwrap();
        assert_eq!(segments.len(), 5);
        assert!(matches!(segments[0], FormatSegment::Literal(b"hello ")));
        assert!(matches!(&segments[1], FormatSegment::Spec(s) if s.conversion == Conversion::Signed));
        assert!(matches!(segments[4], FormatSegment::Literal(b"!")));
    }

    #[test]
    fn test_parse_rejects_bad_directives() {
        assert_eq!(parse_format_string(b"ok %y").unwrap_err(), PrintfError::InvalidSpec(3));
        assert_eq!(parse_format_string(b"tail %").unwrap_err(), PrintfError::InvalidSpec(5));
        assert_eq!(parse_format_string(b"%5").unwrap_err(), PrintfError::InvalidSpec(0));
    }

    #[test]
    fn test_mixed_directives_scenario() {
        assert_eq!(
            fmt("%.4d|%5.2f|%-8s|", vec![I(3), Float(3.14159), Str(Some(b"hi"))]),
            "0003| 3.14|hi      |"
        );
    }

    #[test]
    fn test_signed_rendering() {
        assert_eq!(fmt("%d", vec![I(42)]), "42");
        assert_eq!(fmt("%d", vec![I(-123)]), "-123");
        assert_eq!(fmt("%8d", vec![I(42)]), "      42");
        assert_eq!(fmt("%08d", vec![I(-42)]), "-0000042");
        assert_eq!(fmt("%-8d|", vec![I(42)]), "42      |");
        assert_eq!(fmt("%+d % d", vec![I(5), I(5)]), "+5  5");
        assert_eq!(fmt("%lld", vec![I(i64::MIN)]), "-9223372036854775808");
        assert_eq!(fmt("%08.3d", vec![I(7)]), "     007");
    }

    #[test]
    fn test_length_truncation() {
        assert_eq!(fmt("%hhd", vec![I(300)]), "44");
        assert_eq!(fmt("%hu", vec![I(-1)]), "65535");
        assert_eq!(fmt("%u", vec![I(-1)]), "4294967295");
        assert_eq!(fmt("%lu", vec![I(-1)]), "18446744073709551615");
    }

    #[test]
    fn test_precision_zero_with_zero_value() {
        assert_eq!(fmt("[%.0d]", vec![I(0)]), "[]");
        assert_eq!(fmt("[%5.0x]", vec![U(0)]), "[     ]");
        assert_eq!(fmt("[%#.0o]", vec![U(0)]), "[0]");
        assert_eq!(fmt("[%#x]", vec![U(0)]), "[0]");
    }

    #[test]
    fn test_alt_forms() {
        assert_eq!(fmt("%#x %#X %#o", vec![U(255), U(255), U(8)]), "0xff 0XFF 010");
        assert_eq!(fmt("%#010x", vec![U(255)]), "0x000000ff");
    }

    #[test]
    fn test_star_width_negative_left_justifies() {
        assert_eq!(fmt("[%*d]", vec![I(-6), I(42)]), "[42    ]");
        assert_eq!(fmt("[%.*f]", vec![I(-1), Float(1.5)]), "[1.500000]");
        assert_eq!(fmt("[%*s]", vec![I(4), Str(Some(b"ab"))]), "[  ab]");
    }

    #[test]
    fn test_strings_and_chars() {
        assert_eq!(fmt("%.3s", vec![Str(Some(b"hello"))]), "hel");
        assert_eq!(fmt("%5c|", vec![FormatArg::Char(u32::from(b'A'))]), "    A|");
        assert_eq!(fmt("%s", vec![Str(None)]), "(null)");
        assert_eq!(fmt("[%.3s]", vec![Str(None)]), "[]");
        assert_eq!(fmt("%s", vec![Str(Some(b"ab\0cd"))]), "ab");
    }

    #[test]
    fn test_wide_args_in_narrow_output() {
        if locale::current_encoding() != Encoding::Utf8 {
            return;
        }
        let w = wide("h€llo");
        assert_eq!(fmt("%ls", vec![FormatArg::WideStr(Some(&w))]), "h€llo");
        // Precision counts bytes and never splits a character.
        assert_eq!(fmt("%.2ls", vec![FormatArg::WideStr(Some(&w))]), "h");
        assert_eq!(fmt("%lc", vec![FormatArg::Char(u32::from('é'))]), "é");
    }

    #[test]
    fn test_pointer() {
        assert_eq!(fmt("%p", vec![FormatArg::Pointer(0)]), "(nil)");
        assert_eq!(fmt("%p", vec![FormatArg::Pointer(0xdead)]), "0xdead");
        assert_eq!(fmt("%10p|", vec![FormatArg::Pointer(0x1f)]), "      0x1f|");
    }

    #[test]
    fn test_floats() {
        assert_eq!(fmt("%f", vec![Float(1.5)]), "1.500000");
        assert_eq!(fmt("%e", vec![Float(12345.678)]), "1.234568e+04");
        assert_eq!(fmt("%G", vec![Float(0.000012345)]), "1.2345E-05");
        assert_eq!(fmt("%g", vec![Float(100.0)]), "100");
        assert_eq!(fmt("%#g", vec![Float(100.0)]), "100.000");
        assert_eq!(fmt("%a", vec![Float(1.0)]), "0x1p+0");
        assert_eq!(fmt("%010.2f", vec![Float(-3.14159)]), "-000003.14");
        assert_eq!(fmt("%+.1f", vec![Float(0.0)]), "+0.0");
        assert_eq!(fmt("%.1f", vec![Float(-0.0)]), "-0.0");
    }

    #[test]
    fn test_float_specials() {
        assert_eq!(fmt("%f", vec![Float(f64::NAN)]), "nan");
        assert_eq!(fmt("%F", vec![Float(f64::INFINITY)]), "INF");
        assert_eq!(fmt("%06f", vec![Float(f64::NEG_INFINITY)]), "  -inf");
        assert_eq!(fmt("%+e", vec![Float(f64::INFINITY)]), "+inf");
    }

    #[test]
    fn test_g_strips_trailing_zeros() {
        for (v, want) in [(0.5, "0.5"), (1.25, "1.25"), (1e-4, "0.0001"), (123456.0, "123456"), (1234567.0, "1.23457e+06")] {
            assert_eq!(fmt("%g", vec![Float(v)]), want);
        }
    }

    #[test]
    fn test_count_directive() {
        let n = Cell::new(-1);
        assert_eq!(fmt("abc%n|", vec![FormatArg::Count(&n)]), "abc|");
        assert_eq!(n.get(), 3);
    }

    #[test]
    fn test_percent_escape() {
        assert_eq!(fmt("100%%", vec![]), "100%");
    }

    #[test]
    fn test_missing_argument_fails_after_partial_output() {
        let mut sink = VecSink::default();
        let err = format_into(&mut sink, b"x=%d y=%d", vec![I(1)]).unwrap_err();
        assert_eq!(err, PrintfError::MissingArg(1));
        assert_eq!(sink.out, b"x=1 y=");
        assert_eq!(errno::get_errno(), errno::EINVAL);
    }

    #[test]
    fn test_mismatched_argument() {
        assert_eq!(
            sprintf(b"%f", vec![I(1)]).unwrap_err(),
            PrintfError::ArgMismatch(0)
        );
        assert_eq!(
            sprintf(b"%s", vec![Float(1.0)]).unwrap_err(),
            PrintfError::ArgMismatch(0)
        );
    }

    #[test]
    fn test_snprintf_truncates_but_reports_full_length() {
        let mut buf = [0xffu8; 6];
        assert_eq!(snprintf(Some(&mut buf[..]), b"%s", vec![Str(Some(b"hello world"))]), Ok(11));
        assert_eq!(&buf, b"hello\0");
    }

    #[test]
    fn test_snprintf_null_counts_only() {
        assert_eq!(snprintf(None, b"%d-%s", vec![I(12345), Str(Some(b"abc"))]), Ok(9));
        let mut empty: [u8; 0] = [];
        assert_eq!(snprintf(Some(&mut empty[..]), b"%5d", vec![I(1)]), Ok(5));
    }

    #[test]
    fn test_huge_width_counts_without_storing() {
        assert_eq!(snprintf(None, b"%100000d", vec![I(1)]), Ok(100000));
    }

    #[test]
    fn test_grouping_uses_locale_separator() {
        let mut sink = VecSink::default();
        let mut r: Renderer<'_, u8, VecSink<u8>> = Renderer::new(&mut sink);
        r.locale = LocaleContext::from_name("en_US.UTF-8").unwrap();
        r.render(b"%'d %'.2f", vec![I(1234567), Float(1234.5)]).unwrap();
        assert_eq!(sink.out, b"1,234,567 1,234.50");
    }

    #[test]
    fn test_decimal_point_from_locale() {
        let mut sink = VecSink::default();
        let mut r: Renderer<'_, u8, VecSink<u8>> = Renderer::new(&mut sink);
        r.locale = LocaleContext::from_name("de_DE.UTF-8").unwrap();
        r.render(b"%.2f", vec![Float(2.5)]).unwrap();
        assert_eq!(sink.out, b"2,50");
    }

    #[test]
    fn test_wide_format() {
        let out = wide_sprintf(&wide("%ls=%d %s"), vec![
            FormatArg::WideStr(Some(&wide("k€y"))),
            I(7),
            Str(Some("ü".as_bytes())),
        ])
        .unwrap();
        if locale::current_encoding() == Encoding::Utf8 {
            assert_eq!(out, wide("k€y=7 ü"));
        }
    }

    #[test]
    fn test_swprintf_overflow_is_error() {
        let mut buf = [0u32; 4];
        assert_eq!(swprintf(&mut buf, &wide("%d"), vec![I(42)]), Ok(2));
        assert_eq!(&buf[..3], &[u32::from('4'), u32::from('2'), 0]);
        assert_eq!(
            swprintf(&mut buf, &wide("%d"), vec![I(123456)]),
            Err(PrintfError::Truncated)
        );
        assert_eq!(buf[3], 0);
    }

    #[test]
    fn test_fprintf_writes_stream_and_fixes_orientation() {
        let pipe = PipeBackend::new(b"");
        let out = pipe.output();
        let flags = parse_mode(b"w").unwrap();
        let mut s = StdioStream::new(Box::new(pipe), flags, BufMode::None).unwrap();
        assert_eq!(fprintf(&mut s, b"%s=%d\n", vec![Str(Some(b"n")), I(5)]), Ok(4));
        assert_eq!(out.lock().as_slice(), b"n=5\n");
        assert_eq!(s.orientation(), Orientation::Byte);
        assert_eq!(
            fwprintf(&mut s, &wide("x"), Vec::<FormatArg>::new()),
            Err(PrintfError::Io(StdioError::Orientation))
        );
    }
}
