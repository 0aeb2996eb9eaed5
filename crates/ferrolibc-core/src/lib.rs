//! # ferrolibc-core
//!
//! Safe Rust implementation of the C standard I/O subsystem.
//!
//! This crate holds the engines behind `<stdio.h>` and `<wchar.h>`: stream
//! buffering, the stream state machine, the process-wide stream registry,
//! the multibyte/wide conversion engine and the `printf`/`scanf` format
//! interpreters. No `unsafe` code is permitted at the crate level; the C
//! boundary lives in `ferrolibc-abi`.

#![deny(unsafe_code)]

pub mod config;
pub mod errno;
pub mod locale;
pub mod stdio;
pub mod stdlib;
pub mod wchar;
