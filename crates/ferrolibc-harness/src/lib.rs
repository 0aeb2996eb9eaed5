//! Conformance harness for the ferrolibc stdio engines.
//!
//! This crate provides:
//! - Fixtures: JSON case sets describing calls and their expected results
//! - Execution: drives `ferrolibc-core` for each supported function
//! - Verification: compares outputs and errno, renders diffs
//! - Reports: markdown + JSON, with SHA-256 digests of the inputs
//! - Structured logs: one JSONL record per executed case

#![forbid(unsafe_code)]

pub mod diff;
pub mod error;
pub mod execute;
pub mod fixtures;
pub mod report;
pub mod runner;
pub mod structured_log;
pub mod verify;

pub use error::HarnessError;
pub use fixtures::{FixtureCase, FixtureSet};
pub use report::ConformanceReport;
pub use runner::TestRunner;
pub use verify::VerificationResult;
