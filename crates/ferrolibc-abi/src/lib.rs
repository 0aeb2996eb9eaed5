#![cfg_attr(feature = "c-variadic", feature(c_variadic))]
// Every extern "C" entry point takes raw pointers from C callers; the
// contracts are the C standard's, so per-function safety docs are omitted.
#![allow(clippy::missing_safety_doc)]
//! # ferrolibc-abi
//!
//! extern "C" boundary for the ferrolibc stdio subsystem.
//!
//! This crate produces a `cdylib` exposing `<stdio.h>`, the stream and
//! conversion half of `<wchar.h>`, `<errno.h>` and `setlocale`. Each entry
//! point validates its raw arguments, delegates to the safe engines in
//! `ferrolibc-core`, and maps typed errors to the C sentinel plus errno.
//!
//! ```text
//! C caller -> ABI entry (this crate) -> registry lookup -> core engine -> return
//! ```
//!
//! `FILE*` values are opaque stream ids from the core registry, never real
//! addresses. Symbols are exported unmangled only in release builds, so
//! debug test binaries keep the host libc underneath them.
//!
//! The printf and scanf families need C variadics and are only built with
//! the `c-variadic` feature on a nightly toolchain.

#[macro_use]
mod macros;

pub mod errno_abi;
pub mod fd_backend;
pub mod locale_abi;
pub mod stdio_abi;
pub mod util;
#[macro_use]
pub mod varargs;
pub mod wchar_abi;

#[cfg(feature = "c-variadic")]
pub mod printf_abi;
#[cfg(feature = "c-variadic")]
pub mod scanf_abi;
