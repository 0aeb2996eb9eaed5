//! scanf formatting engine.
//!
//! Clean-room implementation of the POSIX formatted input interpreter.
//!
//! Reference: POSIX.1-2024 fscanf, ISO C11 7.21.6.2 and 7.29.2.2
//!
//! The engine reads code units from a [`ScanInput`] (a string or a stream,
//! narrow or wide) and hands each converted value to a [`ScanTarget`]. The
//! Rust entry points take [`ScanArg`] slots; the C boundary implements
//! `ScanTarget` over its `va_list` so pointers are fetched one by one in
//! assignment order.
//!
//! Return convention: the number of assignments made. An input failure
//! (end of input or a read error) before the first assignment is reported
//! as [`ScanError::EndOfInput`] or [`ScanError::Io`], which the C surface
//! turns into `EOF`.

use log::{debug, error, warn};
use thiserror::Error;

use super::error::StdioError;
use super::file::{Orientation, StdioStream};
use super::printf::LengthMod;
use crate::config;
use crate::errno;
use crate::locale::{self, Encoding};
use crate::stdlib::conversion::is_space_code;
use crate::stdlib::{NumUnit, strtod_with_point, strtol_impl, strtoul_impl};
use crate::wchar::{Decoded, MB_LEN_MAX, MbState, decode_one, encode_wide};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Failure of a formatted input call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScanError {
    #[error("end of input before the first conversion")]
    EndOfInput,
    #[error("invalid conversion specification at offset {0}")]
    InvalidSpec(usize),
    #[error("missing argument for conversion {0}")]
    MissingArg(usize),
    #[error("argument {0} does not match its conversion")]
    ArgMismatch(usize),
    #[error("invalid or incomplete multibyte or wide character")]
    IllegalSequence,
    #[error("cannot allocate memory")]
    NoMemory,
    #[error(transparent)]
    Io(#[from] StdioError),
}

impl ScanError {
    pub fn is_format_error(&self) -> bool {
        matches!(self, Self::InvalidSpec(_) | Self::MissingArg(_) | Self::ArgMismatch(_))
    }

    /// errno value reported to C callers; `None` leaves errno untouched.
    pub fn errno(&self) -> Option<i32> {
        match self {
            Self::EndOfInput => None,
            Self::InvalidSpec(_) | Self::MissingArg(_) | Self::ArgMismatch(_) => Some(errno::EINVAL),
            Self::IllegalSequence => Some(errno::EILSEQ),
            Self::NoMemory => Some(errno::ENOMEM),
            Self::Io(e) => Some(e.errno()),
        }
    }
}

// ---------------------------------------------------------------------------
// Directives
// ---------------------------------------------------------------------------

/// Scanset of a `%[` directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSet {
    negated: bool,
    ranges: Vec<(u32, u32)>,
}

impl ScanSet {
    pub fn contains(&self, c: u32) -> bool {
        self.ranges.iter().any(|&(lo, hi)| (lo..=hi).contains(&c)) != self.negated
    }
}

/// Conversion of a scanf directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanConv {
    /// `d` (base 10), `i` (base 0), `o`, `u`, `x`/`X`.
    Int { base: u32, signed: bool },
    /// `a e f g` and upper-case forms.
    Float,
    /// `c`, `C`
    Char,
    /// `s`, `S`
    Str,
    /// `[`
    Set(ScanSet),
    /// `p`
    Pointer,
    /// `n`
    Count,
}

/// A parsed scanf conversion specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSpec {
    /// `*`: convert but do not assign.
    pub suppress: bool,
    /// `m`: allocate the destination (strings are always owned here).
    pub alloc: bool,
    pub width: Option<usize>,
    pub length: LengthMod,
    pub conv: ScanConv,
}

impl ScanSpec {
    /// Whether `%c`, `%s` and `%[` store wide characters.
    pub fn wide_dest(&self) -> bool {
        self.length == LengthMod::L
    }

    /// Whether a successful conversion counts toward the return value.
    pub fn assigns(&self) -> bool {
        !self.suppress && self.conv != ScanConv::Count
    }
}

/// A piece of a scanf format string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanDirective {
    /// One or more white-space units: skip any input white space.
    Space,
    /// An ordinary unit that must match the input (`%%` included).
    Literal(u32),
    Convert(ScanSpec),
}

fn unit(fmt: &[impl NumUnit], i: usize) -> u32 {
    fmt.get(i).map_or(0, |u| u.code())
}

fn ascii(c: u32) -> Option<char> {
    if c < 0x80 { char::from_u32(c) } else { None }
}

/// Parse the set body after `[`. Returns the set and units consumed
/// including the closing `]`.
fn parse_set<T: NumUnit>(fmt: &[T]) -> Option<(ScanSet, usize)> {
    let mut pos = 0;
    let negated = ascii(unit(fmt, pos)) == Some('^');
    if negated {
        pos += 1;
    }
    let mut ranges = Vec::new();
    // A ']' right after '[' or '[^' is a member.
    if ascii(unit(fmt, pos)) == Some(']') {
        ranges.push((u32::from(b']'), u32::from(b']')));
        pos += 1;
    }
    loop {
        let c = unit(fmt, pos);
        if pos >= fmt.len() || c == 0 {
            return None;
        }
        pos += 1;
        if c == u32::from(b']') {
            break;
        }
        let hi = unit(fmt, pos + 1);
        let is_range = ascii(unit(fmt, pos)) == Some('-')
            && pos + 1 < fmt.len()
            && hi != u32::from(b']')
            && hi != 0
            && hi >= c;
        if is_range {
            ranges.push((c, hi));
            pos += 2;
        } else {
            ranges.push((c, c));
        }
    }
    Some((ScanSet { negated, ranges }, pos))
}

/// Parse one conversion after `%`. Returns the spec and units consumed.
pub fn parse_scan_spec<T: NumUnit>(fmt: &[T]) -> Option<(ScanSpec, usize)> {
    let mut pos = 0;
    let suppress = ascii(unit(fmt, pos)) == Some('*');
    if suppress {
        pos += 1;
    }
    let mut width = None;
    while let c @ 0x30..=0x39 = unit(fmt, pos) {
        let w: usize = width.unwrap_or(0);
        width = Some(w.saturating_mul(10).saturating_add((c - 0x30) as usize));
        pos += 1;
    }
    if width == Some(0) {
        return None;
    }
    let alloc = ascii(unit(fmt, pos)) == Some('m');
    if alloc {
        pos += 1;
    }
    let next = ascii(unit(fmt, pos + 1));
    let (mut length, len_units) = match ascii(unit(fmt, pos)) {
        Some('h') if next == Some('h') => (LengthMod::Hh, 2),
        Some('h') => (LengthMod::H, 1),
        Some('l') if next == Some('l') => (LengthMod::Ll, 2),
        Some('l') => (LengthMod::L, 1),
        Some('q') => (LengthMod::Q, 1),
        Some('j') => (LengthMod::J, 1),
        Some('z') => (LengthMod::Z, 1),
        Some('t') => (LengthMod::T, 1),
        Some('L') => (LengthMod::BigL, 1),
        _ => (LengthMod::None, 0),
    };
    pos += len_units;
    if pos >= fmt.len() {
        return None;
    }
    let conv = match ascii(unit(fmt, pos))? {
        'd' => ScanConv::Int { base: 10, signed: true },
        'i' => ScanConv::Int { base: 0, signed: true },
        'o' => ScanConv::Int { base: 8, signed: false },
        'u' => ScanConv::Int { base: 10, signed: false },
        'x' | 'X' => ScanConv::Int { base: 16, signed: false },
        'a' | 'A' | 'e' | 'E' | 'f' | 'F' | 'g' | 'G' => ScanConv::Float,
        'c' => ScanConv::Char,
        's' => ScanConv::Str,
        'C' => {
            length = LengthMod::L;
            ScanConv::Char
        }
        'S' => {
            length = LengthMod::L;
            ScanConv::Str
        }
        '[' => {
            let (set, used) = parse_set(&fmt[pos + 1..])?;
            pos += used;
            ScanConv::Set(set)
        }
        'p' => ScanConv::Pointer,
        'n' => ScanConv::Count,
        _ => return None,
    };
    pos += 1;
    Some((
        ScanSpec {
            suppress,
            alloc,
            width,
            length,
            conv,
        },
        pos,
    ))
}

/// Parse a whole scanf format string.
pub fn parse_scan_format<T: NumUnit>(fmt: &[T]) -> Result<Vec<ScanDirective>, ScanError> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < fmt.len() && unit(fmt, pos) != 0 {
        let c = unit(fmt, pos);
        if is_space_code(c) {
            while is_space_code(unit(fmt, pos)) {
                pos += 1;
            }
            out.push(ScanDirective::Space);
            continue;
        }
        if c != u32::from(b'%') {
            out.push(ScanDirective::Literal(c));
            pos += 1;
            continue;
        }
        if unit(fmt, pos + 1) == u32::from(b'%') {
            out.push(ScanDirective::Literal(c));
            pos += 2;
            continue;
        }
        let (spec, used) = parse_scan_spec(&fmt[pos + 1..]).ok_or(ScanError::InvalidSpec(pos))?;
        out.push(ScanDirective::Convert(spec));
        pos += 1 + used;
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Input sources
// ---------------------------------------------------------------------------

/// Where scanf reads from.
pub trait ScanInput {
    /// Next code unit; `None` at end of input.
    fn next_unit(&mut self) -> Result<Option<u32>, ScanError>;

    /// Give back the unit just read. Several calls give back several
    /// units, most recent first.
    fn unread(&mut self, unit: u32);

    /// Units consumed so far (`%n`).
    fn consumed(&self) -> usize;

    /// Whether units are wide characters rather than bytes.
    fn is_wide(&self) -> bool;

    fn encoding(&self) -> Encoding;
}

/// A NUL-terminated (or slice-bounded) string.
#[derive(Debug, Clone)]
pub struct SliceInput<'a, T> {
    src: &'a [T],
    pos: usize,
    encoding: Encoding,
}

impl<'a, T: NumUnit> SliceInput<'a, T> {
    pub fn new(src: &'a [T]) -> Self {
        Self {
            src,
            pos: 0,
            encoding: locale::current_encoding(),
        }
    }
}

impl<T: NumUnit> ScanInput for SliceInput<'_, T> {
    fn next_unit(&mut self) -> Result<Option<u32>, ScanError> {
        match self.src.get(self.pos).map(|u| u.code()) {
            Some(c) if c != 0 => {
                self.pos += 1;
                Ok(Some(c))
            }
            _ => Ok(None),
        }
    }

    fn unread(&mut self, _unit: u32) {
        self.pos = self.pos.saturating_sub(1);
    }

    fn consumed(&self) -> usize {
        self.pos
    }

    fn is_wide(&self) -> bool {
        std::mem::size_of::<T>() > 1
    }

    fn encoding(&self) -> Encoding {
        self.encoding
    }
}

/// A stream, read bytewise (`fscanf`) or by wide character (`fwscanf`).
#[derive(Debug)]
pub struct StreamInput<'s> {
    stream: &'s mut StdioStream,
    wide: bool,
    consumed: usize,
}

impl<'s> StreamInput<'s> {
    /// Fixes the stream's orientation.
    pub fn new(stream: &'s mut StdioStream, wide: bool) -> Result<Self, ScanError> {
        stream.claim(if wide { Orientation::Wide } else { Orientation::Byte })?;
        Ok(Self {
            stream,
            wide,
            consumed: 0,
        })
    }
}

impl ScanInput for StreamInput<'_> {
    fn next_unit(&mut self) -> Result<Option<u32>, ScanError> {
        let c = if self.wide {
            self.stream.getwc()?
        } else {
            self.stream.next_byte()?.map(u32::from)
        };
        if c.is_some() {
            self.consumed += 1;
        }
        Ok(c)
    }

    fn unread(&mut self, unit: u32) {
        let result = if self.wide {
            self.stream.ungetwc(unit)
        } else {
            self.stream.push_back(&[unit as u8])
        };
        match result {
            Ok(()) => self.consumed = self.consumed.saturating_sub(1),
            Err(e) => debug!("scanf: pushback lost: {e}"),
        }
    }

    fn consumed(&self) -> usize {
        self.consumed
    }

    fn is_wide(&self) -> bool {
        self.wide
    }

    fn encoding(&self) -> Encoding {
        self.stream.encoding()
    }
}

// ---------------------------------------------------------------------------
// Targets
// ---------------------------------------------------------------------------

/// A converted value on its way to the caller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScanValue<'v> {
    Signed(i64),
    Unsigned(u64),
    Float(f64),
    Bytes(&'v [u8]),
    Wide(&'v [u32]),
    Pointer(usize),
    Count(usize),
}

/// Receives assignments in order.
pub trait ScanTarget {
    fn assign(&mut self, spec: &ScanSpec, value: ScanValue<'_>) -> Result<(), ScanError>;
}

/// Destination slot for the Rust entry points.
#[derive(Debug)]
pub enum ScanArg<'a> {
    Int(&'a mut i64),
    UInt(&'a mut u64),
    Float(&'a mut f64),
    /// `%c`, `%s`, `%[`; replaced, not appended.
    Bytes(&'a mut Vec<u8>),
    /// `%lc`, `%ls`, `%l[`
    Wide(&'a mut Vec<u32>),
    Pointer(&'a mut usize),
    Count(&'a mut i64),
}

/// Adapter feeding [`ScanArg`] slots to the engine.
#[derive(Debug)]
pub struct ArgTargets<I> {
    args: I,
    index: usize,
}

impl<I> ArgTargets<I> {
    pub fn new(args: I) -> Self {
        Self { args, index: 0 }
    }
}

impl<'a, I> ScanTarget for ArgTargets<I>
where
    I: Iterator<Item = ScanArg<'a>>,
{
    fn assign(&mut self, _spec: &ScanSpec, value: ScanValue<'_>) -> Result<(), ScanError> {
        let index = self.index;
        self.index += 1;
        let slot = self.args.next().ok_or(ScanError::MissingArg(index))?;
        match (slot, value) {
            (ScanArg::Int(p), ScanValue::Signed(v)) => *p = v,
            (ScanArg::Int(p), ScanValue::Unsigned(v)) => *p = v as i64,
            (ScanArg::UInt(p), ScanValue::Unsigned(v)) => *p = v,
            (ScanArg::UInt(p), ScanValue::Signed(v)) => *p = v as u64,
            (ScanArg::UInt(p), ScanValue::Pointer(v)) => *p = v as u64,
            (ScanArg::Float(p), ScanValue::Float(v)) => *p = v,
            (ScanArg::Bytes(p), ScanValue::Bytes(v)) => {
                p.clear();
                p.try_reserve(v.len()).map_err(|_| ScanError::NoMemory)?;
                p.extend_from_slice(v);
            }
            (ScanArg::Wide(p), ScanValue::Wide(v)) => {
                p.clear();
                p.try_reserve(v.len()).map_err(|_| ScanError::NoMemory)?;
                p.extend_from_slice(v);
            }
            (ScanArg::Pointer(p), ScanValue::Pointer(v)) => *p = v,
            (ScanArg::Count(p), ScanValue::Count(v)) => *p = v as i64,
            (ScanArg::Int(p), ScanValue::Count(v)) => *p = v as i64,
            _ => return Err(ScanError::ArgMismatch(index)),
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Lexing helpers
// ---------------------------------------------------------------------------

#[inline]
fn is_char(c: u32, b: u8) -> bool {
    c == u32::from(b)
}

fn digit_in_base(c: u32, base: u32) -> bool {
    char::from_u32(c).and_then(|ch| ch.to_digit(base)).is_some()
}

/// Field reader bounded by the directive width.
struct Field<'i, I: ?Sized> {
    input: &'i mut I,
    left: usize,
    text: Vec<u32>,
}

impl<'i, I: ScanInput + ?Sized> Field<'i, I> {
    fn new(input: &'i mut I, width: Option<usize>) -> Self {
        Self {
            input,
            left: width.unwrap_or(usize::MAX),
            text: Vec::new(),
        }
    }

    /// Consume the next unit if it satisfies `pred`; otherwise give it back.
    fn accept(&mut self, pred: impl Fn(u32) -> bool) -> Result<Option<u32>, ScanError> {
        if self.left == 0 {
            return Ok(None);
        }
        match self.input.next_unit()? {
            Some(c) if pred(c) => {
                self.left -= 1;
                self.text.push(c);
                Ok(Some(c))
            }
            Some(c) => {
                self.input.unread(c);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Consume `word` case-insensitively as far as it matches.
    fn accept_word(&mut self, word: &[u8]) -> Result<usize, ScanError> {
        let mut n = 0;
        for &w in word {
            let hit = self.accept(|c| char::from_u32(c).is_some_and(|ch| ch.eq_ignore_ascii_case(&char::from(w))))?;
            if hit.is_none() {
                break;
            }
            n += 1;
        }
        Ok(n)
    }

    fn accept_digits(&mut self, base: u32) -> Result<usize, ScanError> {
        let mut n = 0;
        while self.accept(|c| digit_in_base(c, base))?.is_some() {
            n += 1;
        }
        Ok(n)
    }
}

/// Longest prefix of an integer in `base` (0 = detect).
fn lex_integer<I: ScanInput + ?Sized>(input: &mut I, width: Option<usize>, base: u32) -> Result<Vec<u32>, ScanError> {
    let mut f = Field::new(input, width);
    f.accept(|c| is_char(c, b'+') || is_char(c, b'-'))?;
    let mut base = base;
    if base == 0 || base == 16 {
        if f.accept(|c| is_char(c, b'0'))?.is_some() {
            if f.accept(|c| is_char(c, b'x') || is_char(c, b'X'))?.is_some() {
                base = 16;
            } else if base == 0 {
                base = 8;
            }
        } else if base == 0 {
            base = 10;
        }
    }
    f.accept_digits(base)?;
    Ok(f.text)
}

/// Longest prefix of a floating-point number.
fn lex_float<I: ScanInput + ?Sized>(input: &mut I, width: Option<usize>, point: u32) -> Result<Vec<u32>, ScanError> {
    let mut f = Field::new(input, width);
    f.accept(|c| is_char(c, b'+') || is_char(c, b'-'))?;

    if let Some(c) = f.accept(|c| matches!(char::from_u32(c), Some('i' | 'I' | 'n' | 'N')))? {
        if is_char(c | 0x20, b'i') {
            if f.accept_word(b"nf")? == 2 {
                f.accept_word(b"inity")?;
            }
        } else if f.accept_word(b"an")? == 2 && f.accept(|c| is_char(c, b'('))?.is_some() {
            while f
                .accept(|c| char::from_u32(c).is_some_and(|ch| ch.is_ascii_alphanumeric() || ch == '_'))?
                .is_some()
            {}
            f.accept(|c| is_char(c, b')'))?;
        }
        return Ok(f.text);
    }

    let mut base = 10;
    let mut digits = 0;
    if f.accept(|c| is_char(c, b'0'))?.is_some() {
        digits += 1;
        if f.accept(|c| is_char(c, b'x') || is_char(c, b'X'))?.is_some() {
            base = 16;
            digits = 0;
        }
    }
    digits += f.accept_digits(base)?;
    if f.accept(|c| c == point)?.is_some() {
        digits += f.accept_digits(base)?;
    }
    let exp_marks: [u8; 2] = if base == 16 { [b'p', b'P'] } else { [b'e', b'E'] };
    if digits > 0 && f.accept(|c| is_char(c, exp_marks[0]) || is_char(c, exp_marks[1]))?.is_some() {
        f.accept(|c| is_char(c, b'+') || is_char(c, b'-'))?;
        f.accept_digits(10)?;
    }
    Ok(f.text)
}

/// One character of a string conversion with its raw units, so it can be
/// given back whole.
struct Item {
    code: u32,
    raw: [u32; MB_LEN_MAX],
    len: usize,
}

/// Read one character. When `decode` is set the input is narrow and the
/// destination wide: bytes are gathered into a complete multibyte
/// character.
fn read_item<I: ScanInput + ?Sized>(input: &mut I, decode: bool) -> Result<Option<Item>, ScanError> {
    let Some(first) = input.next_unit()? else {
        return Ok(None);
    };
    let mut item = Item {
        code: first,
        raw: [0; MB_LEN_MAX],
        len: 1,
    };
    item.raw[0] = first;
    if !decode {
        return Ok(Some(item));
    }
    let encoding = input.encoding();
    let mut state = MbState::new();
    let mut unit = first;
    loop {
        match decode_one(&[unit as u8], &mut state, encoding) {
            Decoded::Char { wc, .. } => {
                item.code = wc;
                return Ok(Some(item));
            }
            Decoded::Incomplete { .. } | Decoded::EndOfInput if item.len < MB_LEN_MAX => {
                match input.next_unit()? {
                    Some(next) => {
                        unit = next;
                        item.raw[item.len] = next;
                        item.len += 1;
                    }
                    None => return Err(ScanError::IllegalSequence),
                }
            }
            _ => return Err(ScanError::IllegalSequence),
        }
    }
}

fn unread_item<I: ScanInput + ?Sized>(input: &mut I, item: &Item) {
    for &u in item.raw[..item.len].iter().rev() {
        input.unread(u);
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// How a directive ended.
enum Step {
    Done,
    /// Input did not match; stop and return the count.
    Mismatch,
    /// End of input or a read error.
    InputFailure(Option<StdioError>),
    /// Invalid multibyte sequence in the input.
    IllegalSequence,
}

/// Turn an encoding error into a step so earlier assignments still count.
fn encoding_step(result: Result<Step, ScanError>) -> Result<Step, ScanError> {
    match result {
        Err(ScanError::IllegalSequence) => Ok(Step::IllegalSequence),
        other => other,
    }
}

fn skip_space<I: ScanInput + ?Sized>(input: &mut I) -> Result<bool, ScanError> {
    loop {
        match input.next_unit()? {
            Some(c) if is_space_code(c) => {}
            Some(c) => {
                input.unread(c);
                return Ok(true);
            }
            None => return Ok(false),
        }
    }
}

struct Scanner<'t, I: ?Sized, S: ?Sized> {
    input: &'t mut I,
    target: &'t mut S,
    assigned: usize,
    point: u32,
}

impl<I, S> Scanner<'_, I, S>
where
    I: ScanInput + ?Sized,
    S: ScanTarget + ?Sized,
{
    fn next_checked(&mut self) -> Result<Result<Option<u32>, StdioError>, ScanError> {
        match self.input.next_unit() {
            Ok(c) => Ok(Ok(c)),
            Err(ScanError::Io(e)) => Ok(Err(e)),
            Err(e) => Err(e),
        }
    }

    fn literal(&mut self, want: u32) -> Result<Step, ScanError> {
        match self.next_checked()? {
            Ok(Some(c)) if c == want => Ok(Step::Done),
            Ok(Some(c)) => {
                self.input.unread(c);
                Ok(Step::Mismatch)
            }
            Ok(None) => Ok(Step::InputFailure(None)),
            Err(e) => Ok(Step::InputFailure(Some(e))),
        }
    }

    fn store(&mut self, spec: &ScanSpec, value: ScanValue<'_>) -> Result<(), ScanError> {
        if spec.suppress {
            return Ok(());
        }
        self.target.assign(spec, value)?;
        if spec.assigns() {
            self.assigned += 1;
        }
        Ok(())
    }

    /// Hand collected characters to the target in the destination's width.
    fn store_text(&mut self, spec: &ScanSpec, codes: &[u32]) -> Result<(), ScanError> {
        if spec.suppress {
            return Ok(());
        }
        if spec.wide_dest() {
            return self.store(spec, ScanValue::Wide(codes));
        }
        if self.input.is_wide() {
            let bytes = encode_wide(codes, self.input.encoding()).map_err(|_| ScanError::IllegalSequence)?;
            return self.store(spec, ScanValue::Bytes(&bytes));
        }
        let bytes: Vec<u8> = codes.iter().map(|&c| c as u8).collect();
        self.store(spec, ScanValue::Bytes(&bytes))
    }

    fn convert(&mut self, spec: &ScanSpec) -> Result<Step, ScanError> {
        if spec.conv == ScanConv::Count {
            let n = self.input.consumed();
            self.store(spec, ScanValue::Count(n))?;
            return Ok(Step::Done);
        }

        let skips = !matches!(spec.conv, ScanConv::Char | ScanConv::Set(_));
        if skips {
            match skip_space(&mut *self.input) {
                Ok(true) => {}
                Ok(false) => return Ok(Step::InputFailure(None)),
                Err(ScanError::Io(e)) => return Ok(Step::InputFailure(Some(e))),
                Err(e) => return Err(e),
            }
        }

        match &spec.conv {
            ScanConv::Int { base, signed } => {
                let text = match lex_integer(&mut *self.input, spec.width, *base) {
                    Ok(t) => t,
                    Err(ScanError::Io(e)) => return Ok(Step::InputFailure(Some(e))),
                    Err(e) => return Err(e),
                };
                let value = if *signed {
                    let (v, used, _) = strtol_impl(&text, *base as i32);
                    (used > 0).then_some(ScanValue::Signed(v))
                } else {
                    let (v, used, _) = strtoul_impl(&text, *base as i32);
                    (used > 0).then_some(ScanValue::Unsigned(v))
                };
                match value {
                    Some(v) => self.store(spec, v).map(|()| Step::Done),
                    None => Ok(Step::Mismatch),
                }
            }
            ScanConv::Pointer => {
                let text = match lex_integer(&mut *self.input, spec.width, 16) {
                    Ok(t) => t,
                    Err(ScanError::Io(e)) => return Ok(Step::InputFailure(Some(e))),
                    Err(e) => return Err(e),
                };
                let (v, used, _) = strtoul_impl(&text, 16);
                if used == 0 {
                    return Ok(Step::Mismatch);
                }
                self.store(spec, ScanValue::Pointer(v as usize)).map(|()| Step::Done)
            }
            ScanConv::Float => {
                let text = match lex_float(&mut *self.input, spec.width, self.point) {
                    Ok(t) => t,
                    Err(ScanError::Io(e)) => return Ok(Step::InputFailure(Some(e))),
                    Err(e) => return Err(e),
                };
                let (v, used, _) = strtod_with_point(&text, self.point);
                if used == 0 {
                    return Ok(Step::Mismatch);
                }
                self.store(spec, ScanValue::Float(v)).map(|()| Step::Done)
            }
            ScanConv::Char | ScanConv::Str | ScanConv::Set(_) => self.text(spec),
            ScanConv::Count => Ok(Step::Done),
        }
    }

    /// `%c`, `%s`, `%[`.
    fn text(&mut self, spec: &ScanSpec) -> Result<Step, ScanError> {
        let decode = spec.wide_dest() && !self.input.is_wide();
        let limit = match spec.conv {
            ScanConv::Char => spec.width.unwrap_or(1),
            _ => spec.width.unwrap_or(usize::MAX),
        };
        let mut codes = Vec::new();
        let mut io_error = None;
        while codes.len() < limit {
            let item = match read_item(&mut *self.input, decode) {
                Ok(Some(item)) => item,
                Ok(None) => break,
                Err(ScanError::Io(e)) => {
                    io_error = Some(e);
                    break;
                }
                Err(e) => return Err(e),
            };
            let keep = match &spec.conv {
                ScanConv::Char => true,
                ScanConv::Str => !is_space_code(item.code),
                ScanConv::Set(set) => set.contains(item.code),
                _ => false,
            };
            if !keep {
                unread_item(&mut *self.input, &item);
                break;
            }
            codes.try_reserve(1).map_err(|_| ScanError::NoMemory)?;
            codes.push(item.code);
        }
        if codes.is_empty() {
            if let Some(e) = io_error {
                return Ok(Step::InputFailure(Some(e)));
            }
            if matches!(spec.conv, ScanConv::Set(_)) && !self.at_end()? {
                return Ok(Step::Mismatch);
            }
            return Ok(Step::InputFailure(None));
        }
        self.store_text(spec, &codes)?;
        Ok(Step::Done)
    }

    fn at_end(&mut self) -> Result<bool, ScanError> {
        match self.input.next_unit()? {
            Some(c) => {
                self.input.unread(c);
                Ok(false)
            }
            None => Ok(true),
        }
    }

    fn run<T: NumUnit>(&mut self, fmt: &[T]) -> Result<usize, ScanError> {
        for directive in parse_scan_format(fmt)? {
            let step = match directive {
                ScanDirective::Space => match skip_space(&mut *self.input) {
                    Ok(_) => Step::Done,
                    Err(ScanError::Io(e)) => Step::InputFailure(Some(e)),
                    Err(e) => return Err(e),
                },
                ScanDirective::Literal(c) => {
                    if c == u32::from(b'%') {
                        match skip_space(&mut *self.input) {
                            Ok(_) => {}
                            Err(ScanError::Io(e)) => return self.input_failure(Some(e)),
                            Err(e) => return Err(e),
                        }
                    }
                    encoding_step(self.literal(c))?
                }
                ScanDirective::Convert(spec) => encoding_step(self.convert(&spec))?,
            };
            match step {
                Step::Done => {}
                Step::Mismatch => return Ok(self.assigned),
                Step::InputFailure(e) => return self.input_failure(e),
                Step::IllegalSequence => return self.illegal_sequence(),
            }
        }
        Ok(self.assigned)
    }

    fn input_failure(&self, err: Option<StdioError>) -> Result<usize, ScanError> {
        if self.assigned > 0 {
            return Ok(self.assigned);
        }
        Err(err.map_or(ScanError::EndOfInput, ScanError::Io))
    }

    /// EILSEQ is reported either way; the call fails only when nothing was
    /// assigned.
    fn illegal_sequence(&self) -> Result<usize, ScanError> {
        if self.assigned > 0 {
            warn!("scanf: invalid multibyte sequence after {} assignments", self.assigned);
            errno::set_errno(errno::EILSEQ);
            return Ok(self.assigned);
        }
        Err(ScanError::IllegalSequence)
    }
}

/// Log a failed call and apply the configured format-error policy.
fn report(err: ScanError) -> ScanError {
    if err == ScanError::EndOfInput {
        debug!("scanf: {err}");
        return err;
    }
    warn!("scanf: {err}");
    if err.is_format_error() && config::stdio_config().format_errors.aborts() {
        error!("scanf: aborting on format error: {err}");
        std::process::abort();
    }
    if let Some(e) = err.errno() {
        errno::set_errno(e);
    }
    err
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Run `fmt` against `input`, delivering values to `target`. Returns the
/// number of assignments.
pub fn scan_into<T, I, S>(input: &mut I, fmt: &[T], target: &mut S) -> Result<usize, ScanError>
where
    T: NumUnit,
    I: ScanInput + ?Sized,
    S: ScanTarget + ?Sized,
{
    let point = u32::from(locale::current().decimal_point);
    let mut scanner = Scanner {
        input,
        target,
        assigned: 0,
        point,
    };
    scanner.run(fmt).map_err(report)
}

/// `sscanf`
pub fn sscanf<'a>(input: &[u8], fmt: &[u8], args: impl IntoIterator<Item = ScanArg<'a>>) -> Result<usize, ScanError> {
    scan_into(&mut SliceInput::new(input), fmt, &mut ArgTargets::new(args.into_iter()))
}

/// `swscanf`
pub fn swscanf<'a>(input: &[u32], fmt: &[u32], args: impl IntoIterator<Item = ScanArg<'a>>) -> Result<usize, ScanError> {
    scan_into(&mut SliceInput::new(input), fmt, &mut ArgTargets::new(args.into_iter()))
}

/// Scan from a stream, fixing its orientation (wide when `wide`).
pub fn stream_scan_into<T, S>(stream: &mut StdioStream, wide: bool, fmt: &[T], target: &mut S) -> Result<usize, ScanError>
where
    T: NumUnit,
    S: ScanTarget + ?Sized,
{
    let mut input = StreamInput::new(stream, wide).map_err(report)?;
    scan_into(&mut input, fmt, target)
}

/// `fscanf`; fixes byte orientation.
pub fn fscanf<'a>(
    stream: &mut StdioStream,
    fmt: &[u8],
    args: impl IntoIterator<Item = ScanArg<'a>>,
) -> Result<usize, ScanError> {
    stream_scan_into(stream, false, fmt, &mut ArgTargets::new(args.into_iter()))
}

/// `fwscanf`; fixes wide orientation.
pub fn fwscanf<'a>(
    stream: &mut StdioStream,
    fmt: &[u32],
    args: impl IntoIterator<Item = ScanArg<'a>>,
) -> Result<usize, ScanError> {
    stream_scan_into(stream, true, fmt, &mut ArgTargets::new(args.into_iter()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
