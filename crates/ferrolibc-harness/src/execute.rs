//! Fixture execution against the core engines.
//!
//! Each supported function takes a JSON `inputs` object and renders its
//! result as a compact string so fixtures can state the expectation
//! literally. errno is cleared before each case and reported after it.

use std::cell::Cell;

use serde::Deserialize;
use serde::de::DeserializeOwned;

use ferrolibc_core::errno;
use ferrolibc_core::locale::Encoding;
use ferrolibc_core::stdio::backend::{SharedRegion, SharedRegionBackend};
use ferrolibc_core::stdio::printf::{self, FormatArg};
use ferrolibc_core::stdio::scanf::{self, ScanArg, ScanError};
use ferrolibc_core::stdio::{BufMode, StdioStream, Whence, parse_mode};
use ferrolibc_core::stdlib::{ConversionStatus, strtod_impl, strtol_impl, strtoul_impl, wcstol_impl};
use ferrolibc_core::wchar::{MbError, MbState, mbrtowc_with};

use crate::HarnessError;

/// Functions the executor understands.
pub const SUPPORTED: &[&str] = &[
    "sprintf", "snprintf", "swprintf", "sscanf", "swscanf", "strtol", "strtoul", "wcstol", "strtod", "mbrtowc",
    "stream",
];

/// Outcome of one executed case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub output: String,
    pub errno: i32,
}

/// A printf argument as written in a fixture: `{"int": 3}`, `"null_str"`, ...
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureArg {
    Int(i64),
    Uint(u64),
    Float(f64),
    Char(u32),
    Str(String),
    WideStr(String),
    NullStr,
    Ptr(usize),
    Count,
}

/// A scanf destination kind.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanDest {
    Int,
    Uint,
    Float,
    Bytes,
    Wide,
    Ptr,
    Count,
}

#[derive(Debug, Deserialize)]
struct PrintfInputs {
    format: String,
    #[serde(default)]
    args: Vec<FixtureArg>,
    #[serde(default)]
    size: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ScanInputs {
    input: String,
    format: String,
    #[serde(default)]
    dests: Vec<ScanDest>,
}

#[derive(Debug, Deserialize)]
struct NumberInputs {
    input: String,
    #[serde(default = "default_base")]
    base: i32,
}

fn default_base() -> i32 {
    10
}

#[derive(Debug, Deserialize)]
struct MbInputs {
    bytes: Vec<u8>,
    #[serde(default = "default_chunk")]
    chunk: usize,
    #[serde(default)]
    single_byte: bool,
}

fn default_chunk() -> usize {
    usize::MAX
}

#[derive(Debug, Deserialize)]
struct StreamInputs {
    mode: String,
    #[serde(default)]
    initial: String,
    #[serde(default)]
    size: Option<usize>,
    ops: Vec<StreamOp>,
}

/// One step of a `stream` case.
#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum StreamOp {
    Puts { data: String },
    Putc { c: char },
    Getc,
    Ungetc { c: char },
    Read { n: usize },
    Gets { n: usize },
    Seek { offset: i64, whence: String },
    Tell,
    Rewind,
    Flush,
    Fwide { mode: i32 },
    Putwc { c: char },
    Getwc,
    Printf { format: String, #[serde(default)] args: Vec<FixtureArg> },
    Scanf { format: String, #[serde(default)] dests: Vec<ScanDest> },
    Eof,
    Error,
    ClearErr,
    Contents,
}

fn parse_inputs<T: DeserializeOwned>(function: &str, inputs: &serde_json::Value) -> Result<T, HarnessError> {
    serde_json::from_value(inputs.clone()).map_err(|e| HarnessError::bad_inputs(function, e.to_string()))
}

/// Run one case.
pub fn execute_case(function: &str, inputs: &serde_json::Value) -> Result<Execution, HarnessError> {
    errno::set_errno(0);
    let output = match function {
        "sprintf" => run_sprintf(&parse_inputs(function, inputs)?),
        "snprintf" => run_snprintf(&parse_inputs(function, inputs)?),
        "swprintf" => run_swprintf(&parse_inputs(function, inputs)?),
        "sscanf" => run_sscanf(&parse_inputs(function, inputs)?, false),
        "swscanf" => run_sscanf(&parse_inputs(function, inputs)?, true),
        "strtol" | "strtoul" | "wcstol" | "strtod" => run_number(function, &parse_inputs(function, inputs)?),
        "mbrtowc" => run_mbrtowc(&parse_inputs(function, inputs)?),
        "stream" => run_stream(&parse_inputs(function, inputs)?)?,
        other => return Err(HarnessError::UnsupportedFunction(other.to_string())),
    };
    Ok(Execution {
        output,
        errno: errno::get_errno(),
    })
}

// ---------------------------------------------------------------------------
// Formatted output
// ---------------------------------------------------------------------------

fn widen(s: &str) -> Vec<u32> {
    s.chars().map(u32::from).collect()
}

fn narrow(units: &[u32]) -> String {
    units.iter().map(|&u| char::from_u32(u).unwrap_or('\u{fffd}')).collect()
}

/// Owned backing for borrowed [`FormatArg`]s.
struct ArgStore {
    wide: Vec<Vec<u32>>,
    counts: Vec<Cell<i64>>,
}

impl ArgStore {
    fn new(args: &[FixtureArg]) -> Self {
        let wide = args
            .iter()
            .filter_map(|a| match a {
                FixtureArg::WideStr(s) => Some(widen(s)),
                _ => None,
            })
            .collect();
        let counts = args
            .iter()
            .filter(|a| matches!(a, FixtureArg::Count))
            .map(|_| Cell::new(-1))
            .collect();
        Self { wide, counts }
    }

    fn format_args<'a>(&'a self, args: &'a [FixtureArg]) -> Vec<FormatArg<'a>> {
        let mut wide = self.wide.iter();
        let mut counts = self.counts.iter();
        args.iter()
            .filter_map(|a| {
                Some(match a {
                    FixtureArg::Int(v) => FormatArg::SignedInt(*v),
                    FixtureArg::Uint(v) => FormatArg::UnsignedInt(*v),
                    FixtureArg::Float(v) => FormatArg::Float(*v),
                    FixtureArg::Char(c) => FormatArg::Char(*c),
                    FixtureArg::Str(s) => FormatArg::Str(Some(s.as_bytes())),
                    FixtureArg::WideStr(_) => FormatArg::WideStr(Some(wide.next()?.as_slice())),
                    FixtureArg::NullStr => FormatArg::Str(None),
                    FixtureArg::Ptr(p) => FormatArg::Pointer(*p),
                    FixtureArg::Count => FormatArg::Count(counts.next()?),
                })
            })
            .collect()
    }

    /// `|n=3,7` suffix when the format stored counts.
    fn count_suffix(&self) -> String {
        if self.counts.is_empty() {
            return String::new();
        }
        let values: Vec<String> = self.counts.iter().map(|c| c.get().to_string()).collect();
        format!("|n={}", values.join(","))
    }
}

fn run_sprintf(inputs: &PrintfInputs) -> String {
    let store = ArgStore::new(&inputs.args);
    match printf::sprintf(inputs.format.as_bytes(), store.format_args(&inputs.args)) {
        Ok(out) => format!("{}{}", String::from_utf8_lossy(&out), store.count_suffix()),
        Err(_) => "error".to_string(),
    }
}

fn run_snprintf(inputs: &PrintfInputs) -> String {
    let store = ArgStore::new(&inputs.args);
    let size = inputs.size.unwrap_or(0);
    let mut buf = vec![0u8; size];
    let dest = (size > 0).then_some(&mut buf[..]);
    match printf::snprintf(dest, inputs.format.as_bytes(), store.format_args(&inputs.args)) {
        Ok(n) => {
            let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
            format!("{n}:{}", String::from_utf8_lossy(&buf[..end]))
        }
        Err(_) => "-1:".to_string(),
    }
}

fn run_swprintf(inputs: &PrintfInputs) -> String {
    let store = ArgStore::new(&inputs.args);
    let mut buf = vec![0u32; inputs.size.unwrap_or(0)];
    let fmt = widen(&inputs.format);
    match printf::swprintf(&mut buf, &fmt, store.format_args(&inputs.args)) {
        Ok(n) => format!("{n}:{}", narrow(&buf[..n])),
        Err(_) => "-1:".to_string(),
    }
}

// ---------------------------------------------------------------------------
// Formatted input
// ---------------------------------------------------------------------------

/// Destination slots for one scanf call.
#[derive(Debug, Default)]
struct ScanSlots {
    ints: Vec<i64>,
    uints: Vec<u64>,
    floats: Vec<f64>,
    bytes: Vec<Vec<u8>>,
    wides: Vec<Vec<u32>>,
    ptrs: Vec<usize>,
}

impl ScanSlots {
    fn new(dests: &[ScanDest]) -> Self {
        let count = |want: fn(&ScanDest) -> bool| dests.iter().filter(|d| want(d)).count();
        Self {
            ints: vec![0; count(|d| matches!(d, ScanDest::Int | ScanDest::Count))],
            uints: vec![0; count(|d| matches!(d, ScanDest::Uint))],
            floats: vec![0.0; count(|d| matches!(d, ScanDest::Float))],
            bytes: vec![Vec::new(); count(|d| matches!(d, ScanDest::Bytes))],
            wides: vec![Vec::new(); count(|d| matches!(d, ScanDest::Wide))],
            ptrs: vec![0; count(|d| matches!(d, ScanDest::Ptr))],
        }
    }

    fn args(&mut self, dests: &[ScanDest]) -> Vec<ScanArg<'_>> {
        let mut ints = self.ints.iter_mut();
        let mut uints = self.uints.iter_mut();
        let mut floats = self.floats.iter_mut();
        let mut bytes = self.bytes.iter_mut();
        let mut wides = self.wides.iter_mut();
        let mut ptrs = self.ptrs.iter_mut();
        dests
            .iter()
            .filter_map(|d| {
                Some(match d {
                    ScanDest::Int => ScanArg::Int(ints.next()?),
                    ScanDest::Count => ScanArg::Count(ints.next()?),
                    ScanDest::Uint => ScanArg::UInt(uints.next()?),
                    ScanDest::Float => ScanArg::Float(floats.next()?),
                    ScanDest::Bytes => ScanArg::Bytes(bytes.next()?),
                    ScanDest::Wide => ScanArg::Wide(wides.next()?),
                    ScanDest::Ptr => ScanArg::Pointer(ptrs.next()?),
                })
            })
            .collect()
    }

    /// Values in destination order, quoted when textual.
    fn render(&self, dests: &[ScanDest]) -> String {
        let (mut i, mut u, mut f, mut b, mut w, mut p) = (0, 0, 0, 0, 0, 0);
        let mut parts = Vec::with_capacity(dests.len());
        for d in dests {
            let part = match d {
                ScanDest::Int | ScanDest::Count => {
                    i += 1;
                    self.ints[i - 1].to_string()
                }
                ScanDest::Uint => {
                    u += 1;
                    self.uints[u - 1].to_string()
                }
                ScanDest::Float => {
                    f += 1;
                    self.floats[f - 1].to_string()
                }
                ScanDest::Bytes => {
                    b += 1;
                    format!("{:?}", String::from_utf8_lossy(&self.bytes[b - 1]))
                }
                ScanDest::Wide => {
                    w += 1;
                    format!("{:?}", narrow(&self.wides[w - 1]))
                }
                ScanDest::Ptr => {
                    p += 1;
                    format!("{:#x}", self.ptrs[p - 1])
                }
            };
            parts.push(part);
        }
        format!("[{}]", parts.join(", "))
    }
}

fn scan_result(result: Result<usize, ScanError>, slots: &ScanSlots, dests: &[ScanDest]) -> String {
    match result {
        Ok(n) => format!("{n}:{}", slots.render(dests)),
        Err(ScanError::EndOfInput) => "EOF".to_string(),
        Err(_) => "error".to_string(),
    }
}

fn run_sscanf(inputs: &ScanInputs, wide: bool) -> String {
    let mut slots = ScanSlots::new(&inputs.dests);
    let result = if wide {
        let (input, fmt) = (widen(&inputs.input), widen(&inputs.format));
        scanf::swscanf(&input, &fmt, slots.args(&inputs.dests))
    } else {
        scanf::sscanf(inputs.input.as_bytes(), inputs.format.as_bytes(), slots.args(&inputs.dests))
    };
    scan_result(result, &slots, &inputs.dests)
}

// ---------------------------------------------------------------------------
// Numeric parsing and conversion
// ---------------------------------------------------------------------------

fn status_errno(status: ConversionStatus) {
    match status {
        ConversionStatus::Success => {}
        ConversionStatus::Overflow | ConversionStatus::Underflow => errno::set_errno(errno::ERANGE),
        ConversionStatus::InvalidBase => errno::set_errno(errno::EINVAL),
    }
}

fn run_number(function: &str, inputs: &NumberInputs) -> String {
    let bytes = inputs.input.as_bytes();
    let (value, end, status) = match function {
        "strtol" => {
            let (v, end, st) = strtol_impl(bytes, inputs.base);
            (v.to_string(), end, st)
        }
        "strtoul" => {
            let (v, end, st) = strtoul_impl(bytes, inputs.base);
            (v.to_string(), end, st)
        }
        "wcstol" => {
            let (v, end, st) = wcstol_impl(&widen(&inputs.input), inputs.base);
            (v.to_string(), end, st)
        }
        _ => {
            let (v, end, st) = strtod_impl(bytes);
            (format!("{v:?}"), end, st)
        }
    };
    status_errno(status);
    format!("{value}:{end}")
}

fn run_mbrtowc(inputs: &MbInputs) -> String {
    let encoding = if inputs.single_byte { Encoding::SingleByte } else { Encoding::Utf8 };
    let mut state = MbState::new();
    let mut out = Vec::new();
    for chunk in inputs.bytes.chunks(inputs.chunk.max(1)) {
        let mut rest = chunk;
        while !rest.is_empty() {
            match mbrtowc_with(rest, &mut state, encoding) {
                Ok((wc, n)) => {
                    out.push(format!("U+{wc:04X}"));
                    rest = &rest[n.max(1)..];
                }
                Err(MbError::Incomplete) => {
                    out.push("-2".to_string());
                    break;
                }
                Err(MbError::Invalid) => {
                    errno::set_errno(errno::EILSEQ);
                    out.push("-1".to_string());
                    state.reset();
                    rest = &rest[1..];
                }
            }
        }
    }
    out.join(" ")
}

// ---------------------------------------------------------------------------
// Stream scripts
// ---------------------------------------------------------------------------

fn open_script_stream(inputs: &StreamInputs) -> Result<(StdioStream, SharedRegion), HarnessError> {
    let flags = parse_mode(inputs.mode.as_bytes())
        .ok_or_else(|| HarnessError::bad_inputs("stream", format!("invalid mode {:?}", inputs.mode)))?;
    let mut initial = inputs.initial.as_bytes().to_vec();
    let default_size = if inputs.mode.starts_with('r') { initial.len() } else { 64 };
    let size = inputs.size.unwrap_or(default_size).max(initial.len());
    initial.resize(size, 0);
    let region = SharedRegion::from_bytes(&initial);
    let backend = SharedRegionBackend::new(region.clone(), &flags);
    let stream = StdioStream::new(Box::new(backend), flags, BufMode::Full)
        .map_err(|e| HarnessError::bad_inputs("stream", e.to_string()))?;
    Ok((stream, region))
}

fn byte_result(r: Result<Option<u8>, impl std::fmt::Debug>) -> String {
    match r {
        Ok(Some(b)) => format!("{:?}", char::from(b)),
        Ok(None) => "EOF".to_string(),
        Err(_) => "ERR".to_string(),
    }
}

fn unit_result<E>(r: Result<(), E>) -> String {
    if r.is_ok() { "ok".to_string() } else { "ERR".to_string() }
}

fn run_stream(inputs: &StreamInputs) -> Result<String, HarnessError> {
    let (mut stream, region) = open_script_stream(inputs)?;
    let mut log = Vec::with_capacity(inputs.ops.len());
    for op in &inputs.ops {
        let entry = match op {
            StreamOp::Puts { data } => match stream.puts(data.as_bytes()) {
                Ok(n) => n.to_string(),
                Err(_) => "ERR".to_string(),
            },
            StreamOp::Putc { c } => unit_result(stream.putc(*c as u8)),
            StreamOp::Getc => byte_result(stream.getc()),
            StreamOp::Ungetc { c } => unit_result(stream.ungetc(*c as u8)),
            StreamOp::Read { n } => {
                let mut buf = vec![0u8; *n];
                let got = stream.read(&mut buf);
                format!("{:?}", String::from_utf8_lossy(&buf[..got]))
            }
            StreamOp::Gets { n } => {
                let mut buf = vec![0u8; *n];
                match stream.gets(&mut buf) {
                    Some(len) => format!("{:?}", String::from_utf8_lossy(&buf[..len])),
                    None => "NULL".to_string(),
                }
            }
            StreamOp::Seek { offset, whence } => {
                let whence = match whence.as_str() {
                    "set" => Whence::Set,
                    "cur" => Whence::Cur,
                    "end" => Whence::End,
                    other => return Err(HarnessError::bad_inputs("stream", format!("bad whence {other:?}"))),
                };
                match stream.seek(*offset, whence) {
                    Ok(pos) => pos.to_string(),
                    Err(_) => "ERR".to_string(),
                }
            }
            StreamOp::Tell => match stream.tell() {
                Ok(pos) => pos.to_string(),
                Err(_) => "ERR".to_string(),
            },
            StreamOp::Rewind => {
                stream.rewind();
                "ok".to_string()
            }
            StreamOp::Flush => unit_result(stream.flush()),
            StreamOp::Fwide { mode } => stream.fwide(*mode).to_string(),
            StreamOp::Putwc { c } => unit_result(stream.putwc(u32::from(*c))),
            StreamOp::Getwc => match stream.getwc() {
                Ok(Some(wc)) => format!("U+{wc:04X}"),
                Ok(None) => "WEOF".to_string(),
                Err(_) => "ERR".to_string(),
            },
            StreamOp::Printf { format, args } => {
                let store = ArgStore::new(args);
                match printf::fprintf(&mut stream, format.as_bytes(), store.format_args(args)) {
                    Ok(n) => n.to_string(),
                    Err(_) => "-1".to_string(),
                }
            }
            StreamOp::Scanf { format, dests } => {
                let mut slots = ScanSlots::new(dests);
                let result = scanf::fscanf(&mut stream, format.as_bytes(), slots.args(dests));
                scan_result(result, &slots, dests)
            }
            StreamOp::Eof => stream.is_eof().to_string(),
            StreamOp::Error => stream.is_error().to_string(),
            StreamOp::ClearErr => {
                stream.clear_err();
                "ok".to_string()
            }
            StreamOp::Contents => {
                let bytes = region.snapshot();
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                format!("{:?}", String::from_utf8_lossy(&bytes[..end]))
            }
        };
        log.push(entry);
    }
    let _ = stream.close();
    Ok(log.join(";"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(function: &str, inputs: serde_json::Value) -> Execution {
        execute_case(function, &inputs).unwrap()
    }

    #[test]
    fn sprintf_mixed_conversions() {
        let got = run(
            "sprintf",
            json!({"format": "%.4d|%5.2f|%-8s|", "args": [{"int": 3}, {"float": 3.14159}, {"str": "hi"}]}),
        );
        assert_eq!(got.output, "0003| 3.14|hi      |");
        assert_eq!(got.errno, 0);
    }

    #[test]
    fn sprintf_reports_count_and_missing_args() {
        let got = run("sprintf", json!({"format": "ab%n%d", "args": ["count", {"int": 5}]}));
        assert_eq!(got.output, "ab5|n=2");
        let missing = run("sprintf", json!({"format": "%d"}));
        assert_eq!(missing.output, "error");
        assert_eq!(missing.errno, errno::EINVAL);
    }

    #[test]
    fn snprintf_measure_only() {
        let got = run("snprintf", json!({"format": "%s-%d", "args": [{"str": "abc"}, {"int": 42}]}));
        assert_eq!(got.output, "6:");
        let cut = run("snprintf", json!({"format": "%s", "size": 3, "args": [{"str": "abcdef"}]}));
        assert_eq!(cut.output, "6:ab");
    }

    #[test]
    fn sscanf_integer_prefixes() {
        let got = run("sscanf", json!({"input": "123 0x321", "format": "%d %i", "dests": ["int", "int"]}));
        assert_eq!(got.output, "2:[123, 801]");
        let eof = run("sscanf", json!({"input": "", "format": "%d", "dests": ["int"]}));
        assert_eq!(eof.output, "EOF");
    }

    #[test]
    fn wcstol_end_offset() {
        let got = run("wcstol", json!({"input": "2001 60c0c0", "base": 10}));
        assert_eq!(got.output, "2001:4");
        let big = run("strtol", json!({"input": "99999999999999999999"}));
        assert_eq!(big.output, format!("{}:20", i64::MAX));
        assert_eq!(big.errno, errno::ERANGE);
    }

    #[test]
    fn mbrtowc_split_sequence() {
        let got = run("mbrtowc", json!({"bytes": [0xE2, 0x82, 0xAC, 0x41], "chunk": 1}));
        assert_eq!(got.output, "-2 -2 U+20AC U+0041");
        let bad = run("mbrtowc", json!({"bytes": [0xFF]}));
        assert_eq!(bad.output, "-1");
        assert_eq!(bad.errno, errno::EILSEQ);
    }

    #[test]
    fn stream_script_round_trip() {
        let got = run(
            "stream",
            json!({"mode": "w+", "ops": [
                {"op": "puts", "data": "hello"},
                {"op": "rewind"},
                {"op": "getc"},
                {"op": "ungetc", "c": "j"},
                {"op": "read", "n": 8},
                {"op": "eof"},
                {"op": "contents"}
            ]}),
        );
        assert_eq!(got.output, "5;ok;'h';ok;\"jello\";true;\"hello\"");
    }

    #[test]
    fn unknown_function_is_rejected() {
        let err = execute_case("gets", &json!({})).unwrap_err();
        assert!(matches!(err, HarnessError::UnsupportedFunction(_)));
        let err = execute_case("sprintf", &json!({"args": []})).unwrap_err();
        assert!(matches!(err, HarnessError::BadInputs { .. }));
    }
}
