//! Runtime stdio configuration.
//!
//! Settings are read once from the environment:
//! - `FERROLIBC_BUFSIZ`: default stream buffer size in bytes (64..=1 MiB,
//!   default [`crate::stdio::BUFSIZ`]).
//! - `FERROLIBC_NULL_STR`: `substitute` (default) renders a null `%s`
//!   argument as `(null)`; `fail` treats it as a format error.
//! - `FERROLIBC_FORMAT_ERRORS`: `fail` (default) makes a malformed format
//!   string return -1 with `EINVAL`; `abort` aborts the process with a
//!   diagnostic.

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use crate::stdio::BUFSIZ;

/// Smallest buffer size accepted from the environment.
pub const MIN_BUFSIZ: usize = 64;
/// Largest buffer size accepted from the environment.
pub const MAX_BUFSIZ: usize = 1 << 20;

/// Policy for a null pointer passed to `%s`/`%ls`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NullStrPolicy {
    /// Render `(null)`, like glibc and musl.
    #[default]
    Substitute,
    /// Treat as a format error.
    Fail,
}

impl NullStrPolicy {
    /// Parse from string (case-insensitive). Unknown values keep the default.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "fail" | "error" | "strict" => Self::Fail,
            _ => Self::Substitute,
        }
    }
}

/// What a malformed format string does to the calling `printf`/`scanf`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatErrorPolicy {
    /// Stop, keep partial output, return -1 and set `EINVAL`.
    #[default]
    Fail,
    /// Print a diagnostic to stderr and abort.
    Abort,
}

impl FormatErrorPolicy {
    /// Parse from string (case-insensitive). Unknown values keep the default.
    #[must_use]
    pub fn from_str_loose(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "abort" | "trap" | "panic" => Self::Abort,
            _ => Self::Fail,
        }
    }

    #[must_use]
    pub const fn aborts(self) -> bool {
        matches!(self, Self::Abort)
    }
}

/// Resolved stdio configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StdioConfig {
    pub buffer_size: usize,
    pub null_str: NullStrPolicy,
    pub format_errors: FormatErrorPolicy,
}

impl Default for StdioConfig {
    fn default() -> Self {
        Self {
            buffer_size: BUFSIZ,
            null_str: NullStrPolicy::Substitute,
            format_errors: FormatErrorPolicy::Fail,
        }
    }
}

impl StdioConfig {
    /// Build a configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();
        if let Some(raw) = lookup("FERROLIBC_BUFSIZ") {
            cfg.buffer_size = parse_buffer_size(&raw);
        }
        if let Some(raw) = lookup("FERROLIBC_NULL_STR") {
            cfg.null_str = NullStrPolicy::from_str_loose(&raw);
        }
        if let Some(raw) = lookup("FERROLIBC_FORMAT_ERRORS") {
            cfg.format_errors = FormatErrorPolicy::from_str_loose(&raw);
        }
        cfg
    }
}

fn parse_buffer_size(raw: &str) -> usize {
    match raw.trim().parse::<usize>() {
        Ok(n) => n.clamp(MIN_BUFSIZ, MAX_BUFSIZ),
        Err(_) => BUFSIZ,
    }
}

// Atomic cache: 0=unresolved, 1=resolved, 255=resolving.
// Not a OnceLock: std::env::var may re-enter our exported symbols while the
// value is being resolved, and a blocking init would deadlock there.
static STATE: AtomicU8 = AtomicU8::new(0);
static BUFFER_SIZE: AtomicUsize = AtomicUsize::new(BUFSIZ);
static NULL_STR: AtomicU8 = AtomicU8::new(0);
static FORMAT_ERRORS: AtomicU8 = AtomicU8::new(0);

const STATE_UNRESOLVED: u8 = 0;
const STATE_RESOLVED: u8 = 1;
const STATE_RESOLVING: u8 = 255;

fn load_cached() -> StdioConfig {
    StdioConfig {
        buffer_size: BUFFER_SIZE.load(Ordering::Relaxed),
        null_str: match NULL_STR.load(Ordering::Relaxed) {
            1 => NullStrPolicy::Fail,
            _ => NullStrPolicy::Substitute,
        },
        format_errors: match FORMAT_ERRORS.load(Ordering::Relaxed) {
            1 => FormatErrorPolicy::Abort,
            _ => FormatErrorPolicy::Fail,
        },
    }
}

fn store_cached(cfg: StdioConfig) {
    BUFFER_SIZE.store(cfg.buffer_size, Ordering::Relaxed);
    NULL_STR.store(
        matches!(cfg.null_str, NullStrPolicy::Fail) as u8,
        Ordering::Relaxed,
    );
    FORMAT_ERRORS.store(cfg.format_errors.aborts() as u8, Ordering::Relaxed);
}

/// Get the process configuration (reads the environment on first call).
///
/// A call that arrives while another caller is resolving gets the defaults.
#[must_use]
pub fn stdio_config() -> StdioConfig {
    match STATE.load(Ordering::Acquire) {
        STATE_RESOLVED => return load_cached(),
        STATE_RESOLVING => return StdioConfig::default(),
        _ => {}
    }

    if STATE
        .compare_exchange(
            STATE_UNRESOLVED,
            STATE_RESOLVING,
            Ordering::SeqCst,
            Ordering::Relaxed,
        )
        .is_err()
    {
        return if STATE.load(Ordering::Acquire) == STATE_RESOLVED {
            load_cached()
        } else {
            StdioConfig::default()
        };
    }

    let cfg = StdioConfig::from_lookup(|key| std::env::var(key).ok());
    store_cached(cfg);
    STATE.store(STATE_RESOLVED, Ordering::Release);
    cfg
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |k| map.get(k).cloned()
    }

    #[test]
    fn defaults_without_environment() {
        let cfg = StdioConfig::from_lookup(|_| None);
        assert_eq!(cfg, StdioConfig::default());
        assert_eq!(cfg.buffer_size, 8192);
    }

    #[test]
    fn buffer_size_is_clamped() {
        let cfg = StdioConfig::from_lookup(lookup_from(&[("FERROLIBC_BUFSIZ", "1")]));
        assert_eq!(cfg.buffer_size, MIN_BUFSIZ);
        let cfg = StdioConfig::from_lookup(lookup_from(&[("FERROLIBC_BUFSIZ", "99999999")]));
        assert_eq!(cfg.buffer_size, MAX_BUFSIZ);
        let cfg = StdioConfig::from_lookup(lookup_from(&[("FERROLIBC_BUFSIZ", "4096")]));
        assert_eq!(cfg.buffer_size, 4096);
        let cfg = StdioConfig::from_lookup(lookup_from(&[("FERROLIBC_BUFSIZ", "lots")]));
        assert_eq!(cfg.buffer_size, BUFSIZ);
    }

    #[test]
    fn policies_parse_loosely() {
        assert_eq!(NullStrPolicy::from_str_loose("FAIL"), NullStrPolicy::Fail);
        assert_eq!(
            NullStrPolicy::from_str_loose("whatever"),
            NullStrPolicy::Substitute
        );
        assert_eq!(
            FormatErrorPolicy::from_str_loose("abort"),
            FormatErrorPolicy::Abort
        );
        assert_eq!(
            FormatErrorPolicy::from_str_loose("fail"),
            FormatErrorPolicy::Fail
        );
        assert!(FormatErrorPolicy::Abort.aborts());
    }

    #[test]
    fn cached_config_is_sticky() {
        let first = stdio_config();
        let second = stdio_config();
        assert_eq!(first, second);
    }
}
