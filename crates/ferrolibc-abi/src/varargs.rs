//! Bridging C argument lists to the format engines.
//!
//! A C `va_list` carries no type information, so the format string is
//! parsed first into a plan of machine slots. The variadic entry points
//! pull one value per slot (see `collect_va!`), then the raw values are
//! turned into engine arguments here. This half needs no nightly features
//! and is tested directly.

use std::cell::Cell;
use std::ffi::{c_char, c_int, c_void};

use ferrolibc_core::stdio::printf::{
    ArgKind, FormatArg, FormatSegment, LengthMod, Precision, PrintfError, Width, parse_format_string,
};
use ferrolibc_core::stdio::scanf::{
    ScanConv, ScanDirective, ScanError, ScanSpec, ScanTarget, ScanValue, parse_scan_format,
};
use ferrolibc_core::stdlib::NumUnit;

use crate::util::{WcharT, c_bytes, c_wide, scan_c_string};

/// How a value is read out of the argument list after default promotion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    /// `int`-sized integer.
    Int,
    /// `long`-sized integer.
    Long,
    Double,
    Ptr,
}

/// A value pulled out of the argument list.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawArg {
    Int(c_int),
    Long(i64),
    Double(f64),
    Ptr(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Width,
    Precision,
    Value {
        kind: ArgKind,
        length: LengthMod,
        precision: Precision,
    },
}

/// One argument the format string consumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Planned {
    pub slot: Slot,
    role: Role,
}

fn int_slot(length: LengthMod) -> Slot {
    match length {
        LengthMod::None | LengthMod::Hh | LengthMod::H => Slot::Int,
        _ => Slot::Long,
    }
}

/// Argument plan of a printf format.
pub fn printf_plan<T: NumUnit>(fmt: &[T]) -> Result<Vec<Planned>, PrintfError> {
    let mut plan = Vec::new();
    for segment in parse_format_string(fmt)? {
        let FormatSegment::Spec(spec) = segment else {
            continue;
        };
        if spec.width == Width::FromArg {
            plan.push(Planned {
                slot: Slot::Int,
                role: Role::Width,
            });
        }
        if spec.precision == Precision::FromArg {
            plan.push(Planned {
                slot: Slot::Int,
                role: Role::Precision,
            });
        }
        let kind = spec.arg_kind();
        let slot = match kind {
            ArgKind::Signed | ArgKind::Unsigned => int_slot(spec.length),
            ArgKind::Float => Slot::Double,
            ArgKind::Char | ArgKind::WideChar => Slot::Int,
            ArgKind::Str | ArgKind::WideStr | ArgKind::Pointer | ArgKind::Count => Slot::Ptr,
        };
        plan.push(Planned {
            slot,
            role: Role::Value {
                kind,
                length: spec.length,
                precision: spec.precision,
            },
        });
    }
    Ok(plan)
}

impl RawArg {
    fn as_i64(self) -> i64 {
        match self {
            Self::Int(v) => i64::from(v),
            Self::Long(v) => v,
            Self::Double(v) => v as i64,
            Self::Ptr(v) => v as i64,
        }
    }

    fn as_ptr(self) -> usize {
        match self {
            Self::Ptr(v) => v,
            other => other.as_i64() as usize,
        }
    }
}

/// Arguments of one printf call, with storage for `%n` results.
#[derive(Debug)]
pub struct PrintfArgs {
    items: Vec<(Planned, RawArg)>,
    counts: Vec<Cell<i64>>,
}

impl PrintfArgs {
    /// Pair a plan with the values pulled for it.
    pub fn new(plan: Vec<Planned>, raw: Vec<RawArg>) -> Self {
        let counts = plan
            .iter()
            .filter(|p| matches!(p.role, Role::Value { kind: ArgKind::Count, .. }))
            .map(|_| Cell::new(0))
            .collect();
        Self {
            items: plan.into_iter().zip(raw).collect(),
            counts,
        }
    }

    /// Engine arguments borrowing the caller's strings.
    ///
    /// # Safety
    ///
    /// Every non-null `%s`/`%ls` pointer must reference a string that is
    /// NUL-terminated or, for `%s` with a precision, readable up to that
    /// precision, and must outlive the returned arguments.
    pub unsafe fn format_args(&self) -> Vec<FormatArg<'_>> {
        let mut out = Vec::with_capacity(self.items.len());
        let mut counts = self.counts.iter();
        let mut star_precision: Option<usize> = None;
        for &(planned, raw) in &self.items {
            let arg = match planned.role {
                Role::Width => FormatArg::SignedInt(raw.as_i64()),
                Role::Precision => {
                    star_precision = usize::try_from(raw.as_i64() as c_int).ok();
                    FormatArg::SignedInt(raw.as_i64())
                }
                Role::Value { kind, length, precision } => {
                    let bound = match precision {
                        Precision::Fixed(p) => Some(p),
                        Precision::FromArg => star_precision,
                        Precision::None => None,
                    };
                    match kind {
                        ArgKind::Signed => FormatArg::SignedInt(raw.as_i64()),
                        ArgKind::Unsigned => match (raw, length) {
                            (RawArg::Int(v), _) => FormatArg::UnsignedInt(u64::from(v as u32)),
                            _ => FormatArg::UnsignedInt(raw.as_i64() as u64),
                        },
                        ArgKind::Float => match raw {
                            RawArg::Double(v) => FormatArg::Float(v),
                            other => FormatArg::Float(other.as_i64() as f64),
                        },
                        ArgKind::Char | ArgKind::WideChar => FormatArg::Char(raw.as_i64() as u32),
                        ArgKind::Str => {
                            let p = raw.as_ptr() as *const c_char;
                            FormatArg::Str((!p.is_null()).then(|| unsafe { bounded_bytes(p, bound) }))
                        }
                        ArgKind::WideStr => {
                            let p = raw.as_ptr() as *const WcharT;
                            FormatArg::WideStr((!p.is_null()).then(|| unsafe { c_wide(p) }))
                        }
                        ArgKind::Pointer => FormatArg::Pointer(raw.as_ptr()),
                        ArgKind::Count => match counts.next() {
                            Some(cell) => FormatArg::Count(cell),
                            None => continue,
                        },
                    }
                }
            };
            out.push(arg);
        }
        out
    }

    /// Store `%n` results through the caller's pointers.
    ///
    /// # Safety
    ///
    /// Every non-null `%n` pointer must be valid for a write of the type
    /// its length modifier names.
    pub unsafe fn write_counts(&self) {
        let mut counts = self.counts.iter();
        for &(planned, raw) in &self.items {
            let Role::Value { kind: ArgKind::Count, length, .. } = planned.role else {
                continue;
            };
            let Some(cell) = counts.next() else {
                break;
            };
            let dest = raw.as_ptr() as *mut c_void;
            if !dest.is_null() {
                unsafe { store_int(dest, length, cell.get()) };
            }
        }
    }
}

unsafe fn bounded_bytes<'a>(p: *const c_char, bound: Option<usize>) -> &'a [u8] {
    match bound {
        Some(limit) => {
            let (len, _) = unsafe { scan_c_string(p, Some(limit)) };
            unsafe { std::slice::from_raw_parts(p.cast::<u8>(), len) }
        }
        None => unsafe { c_bytes(p) },
    }
}

/// Write an integer through `dest` sized by the length modifier.
unsafe fn store_int(dest: *mut c_void, length: LengthMod, value: i64) {
    unsafe {
        match length {
            LengthMod::Hh => *dest.cast::<i8>() = value as i8,
            LengthMod::H => *dest.cast::<i16>() = value as i16,
            LengthMod::None => *dest.cast::<i32>() = value as i32,
            _ => *dest.cast::<i64>() = value,
        }
    }
}

// ---------------------------------------------------------------------------
// scanf
// ---------------------------------------------------------------------------

/// Number of destination pointers a scanf format consumes.
pub fn scanf_pointer_count<T: NumUnit>(fmt: &[T]) -> Result<usize, ScanError> {
    Ok(parse_scan_format(fmt)?
        .iter()
        .filter(|d| matches!(d, ScanDirective::Convert(spec) if !spec.suppress))
        .count())
}

/// Scan target writing through C destination pointers.
#[derive(Debug)]
pub struct CScanTarget {
    dests: Vec<*mut c_void>,
    index: usize,
}

impl CScanTarget {
    /// # Safety
    ///
    /// Each pointer must be valid for the write its directive implies:
    /// integers and floats sized by their length modifier, `%c` for its
    /// width, `%s`/`%[` for the match plus a terminator, and a `char **`
    /// (or `wchar_t **`) for the `m` modifier.
    pub unsafe fn new(dests: Vec<*mut c_void>) -> Self {
        Self { dests, index: 0 }
    }
}

/// Copy `units` to `dest`, or to a fresh `malloc` block stored through
/// `dest` when the directive allocates.
unsafe fn store_units<U: Copy + Default>(
    dest: *mut c_void,
    spec: &ScanSpec,
    units: &[U],
    terminate: bool,
) -> Result<(), ScanError> {
    let len = units.len() + usize::from(terminate);
    let out = if spec.alloc {
        let block = unsafe { libc::malloc(len.max(1) * size_of::<U>()) }.cast::<U>();
        if block.is_null() {
            return Err(ScanError::NoMemory);
        }
        unsafe { *dest.cast::<*mut U>() = block };
        block
    } else {
        dest.cast::<U>()
    };
    unsafe {
        std::ptr::copy_nonoverlapping(units.as_ptr(), out, units.len());
        if terminate {
            *out.add(units.len()) = U::default();
        }
    }
    Ok(())
}

impl ScanTarget for CScanTarget {
    fn assign(&mut self, spec: &ScanSpec, value: ScanValue<'_>) -> Result<(), ScanError> {
        let index = self.index;
        self.index += 1;
        let dest = *self.dests.get(index).ok_or(ScanError::MissingArg(index))?;
        if dest.is_null() {
            return Err(ScanError::ArgMismatch(index));
        }
        let terminate = spec.conv != ScanConv::Char;
        // SAFETY: `new`'s contract covers every directive-shaped write below.
        unsafe {
            match value {
                ScanValue::Signed(v) => store_int(dest, spec.length, v),
                ScanValue::Unsigned(v) => store_int(dest, spec.length, v as i64),
                ScanValue::Count(n) => store_int(dest, spec.length, n as i64),
                ScanValue::Float(v) => match spec.length {
                    LengthMod::None => *dest.cast::<f32>() = v as f32,
                    _ => *dest.cast::<f64>() = v,
                },
                ScanValue::Pointer(v) => *dest.cast::<usize>() = v,
                ScanValue::Bytes(b) => store_units(dest, spec, b, terminate)?,
                ScanValue::Wide(w) => store_units(dest, spec, w, terminate)?,
            }
        }
        Ok(())
    }
}

/// Pull one value per slot out of a C argument list (`VaListImpl` or
/// `VaList`). Must be expanded inside an `unsafe` context.
#[cfg(feature = "c-variadic")]
macro_rules! collect_va {
    ($ap:expr, $plan:expr) => {{
        let mut raw = Vec::with_capacity($plan.len());
        for planned in $plan.iter() {
            raw.push(match planned.slot {
                $crate::varargs::Slot::Int => $crate::varargs::RawArg::Int($ap.arg::<::std::ffi::c_int>()),
                $crate::varargs::Slot::Long => $crate::varargs::RawArg::Long($ap.arg::<i64>()),
                $crate::varargs::Slot::Double => $crate::varargs::RawArg::Double($ap.arg::<f64>()),
                $crate::varargs::Slot::Ptr => $crate::varargs::RawArg::Ptr($ap.arg::<usize>()),
            });
        }
        raw
    }};
}

/// Pull `$count` destination pointers out of a C argument list.
#[cfg(feature = "c-variadic")]
macro_rules! collect_va_ptrs {
    ($ap:expr, $count:expr) => {{
        let mut dests = Vec::with_capacity($count);
        for _ in 0..$count {
            dests.push($ap.arg::<*mut ::std::ffi::c_void>());
        }
        dests
    }};
}
