//! Structured JSONL logging for conformance runs.
//!
//! Provides:
//! - [`LogEntry`]: one JSONL record with required + optional fields.
//! - [`ArtifactIndex`]: links a run to its inputs and outputs by SHA-256.
//! - [`LogEmitter`]: writes JSONL lines to any writer.
//! - [`validate_log_line`]: checks a single line against the schema.

use std::io::Write;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Severity level for log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// Verification outcome of a case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
    Error,
}

/// Canonical structured log entry.
///
/// Required fields: `timestamp`, `trace_id`, `level`, `event`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: String,
    pub trace_id: String,
    pub level: LogLevel,
    pub event: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub campaign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub standard_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errno: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ns: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl LogEntry {
    /// Create a new log entry with required fields only.
    #[must_use]
    pub fn new(trace_id: impl Into<String>, level: LogLevel, event: impl Into<String>) -> Self {
        Self {
            timestamp: now_utc(),
            trace_id: trace_id.into(),
            level,
            event: event.into(),
            campaign: None,
            case_name: None,
            function: None,
            standard_ref: None,
            outcome: None,
            errno: None,
            latency_ns: None,
            details: None,
        }
    }

    #[must_use]
    pub fn with_case(mut self, name: impl Into<String>, function: impl Into<String>) -> Self {
        self.case_name = Some(name.into());
        self.function = Some(function.into());
        self
    }

    #[must_use]
    pub fn with_standard_ref(mut self, reference: impl Into<String>) -> Self {
        self.standard_ref = Some(reference.into());
        self
    }

    #[must_use]
    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    #[must_use]
    pub fn with_errno(mut self, errno: i32) -> Self {
        self.errno = Some(errno);
        self
    }

    #[must_use]
    pub fn with_latency_ns(mut self, ns: u64) -> Self {
        self.latency_ns = Some(ns);
        self
    }

    #[must_use]
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Serialize to a single JSONL line (no trailing newline).
    pub fn to_jsonl(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ---------------------------------------------------------------------------
// Artifact index
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEntry {
    pub path: String,
    pub kind: String,
    pub sha256: String,
    pub size_bytes: u64,
}

/// Artifact index linking a run to the files it read and wrote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactIndex {
    pub index_version: u32,
    pub run_id: String,
    pub generated_utc: String,
    pub artifacts: Vec<ArtifactEntry>,
}

impl ArtifactIndex {
    #[must_use]
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            index_version: 1,
            run_id: run_id.into(),
            generated_utc: now_utc(),
            artifacts: Vec::new(),
        }
    }

    /// Record an artifact by content.
    pub fn add(&mut self, path: impl Into<String>, kind: impl Into<String>, content: &[u8]) -> &mut Self {
        self.artifacts.push(ArtifactEntry {
            path: path.into(),
            kind: kind.into(),
            sha256: sha256_hex(content),
            size_bytes: content.len() as u64,
        });
        self
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Lowercase hex SHA-256 of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes).iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Log emitter
// ---------------------------------------------------------------------------

/// Writes structured JSONL log entries.
pub struct LogEmitter<W: Write> {
    writer: W,
    seq: u64,
    campaign: String,
    run_id: String,
}

impl<W: Write> LogEmitter<W> {
    pub fn new(writer: W, campaign: &str, run_id: &str) -> Self {
        Self {
            writer,
            seq: 0,
            campaign: campaign.to_string(),
            run_id: run_id.to_string(),
        }
    }

    fn next_trace_id(&mut self) -> String {
        self.seq += 1;
        format!("{}::{}::{:03}", self.campaign, self.run_id, self.seq)
    }

    /// Emit a bare event with a generated trace id.
    pub fn emit(&mut self, level: LogLevel, event: &str) -> std::io::Result<LogEntry> {
        let trace_id = self.next_trace_id();
        let entry = LogEntry::new(trace_id, level, event);
        self.emit_entry(entry.clone())?;
        Ok(entry)
    }

    /// Emit a fully populated entry, filling in trace id and campaign.
    pub fn emit_entry(&mut self, mut entry: LogEntry) -> std::io::Result<()> {
        if entry.trace_id.is_empty() {
            entry.trace_id = self.next_trace_id();
        }
        if entry.campaign.is_none() {
            entry.campaign = Some(self.campaign.clone());
        }
        let line = entry.to_jsonl().map_err(std::io::Error::other)?;
        writeln!(self.writer, "{line}")
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct LogValidationError {
    pub line_number: usize,
    pub field: String,
    pub message: String,
}

impl std::fmt::Display for LogValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line {}: field '{}': {}", self.line_number, self.field, self.message)
    }
}

const REQUIRED_FIELDS: [&str; 4] = ["timestamp", "trace_id", "level", "event"];

/// Validate a single JSONL line against the schema.
pub fn validate_log_line(line: &str, line_number: usize) -> Result<LogEntry, Vec<LogValidationError>> {
    let error = |field: &str, message: String| LogValidationError {
        line_number,
        field: field.to_string(),
        message,
    };
    let value: serde_json::Value = serde_json::from_str(line).map_err(|e| vec![error("<json>", format!("invalid JSON: {e}"))])?;

    let mut errors: Vec<LogValidationError> = REQUIRED_FIELDS
        .iter()
        .filter(|field| !value.get(**field).is_some_and(serde_json::Value::is_string))
        .map(|field| error(field, "missing or not a string".to_string()))
        .collect();
    if let Some(trace_id) = value.get("trace_id").and_then(|v| v.as_str())
        && trace_id.split("::").count() != 3
    {
        errors.push(error("trace_id", format!("expected campaign::run::seq, got {trace_id:?}")));
    }
    if !errors.is_empty() {
        return Err(errors);
    }
    serde_json::from_value(value).map_err(|e| vec![error("<schema>", e.to_string())])
}

/// RFC 3339 UTC timestamp with millisecond precision.
#[must_use]
pub fn now_utc() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    format_utc(now.as_secs(), now.subsec_millis())
}

fn format_utc(secs: u64, millis: u32) -> String {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    // Civil date from days since the epoch (proleptic Gregorian).
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1_460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = yoe + era * 400 + i64::from(month <= 2);
    format!(
        "{year:04}-{month:02}-{day:02}T{:02}:{:02}:{:02}.{millis:03}Z",
        rem / 3_600,
        (rem % 3_600) / 60,
        rem % 60,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_serializes_required_fields_only() {
        let entry = LogEntry::new("stdio::run-1::001", LogLevel::Info, "case_start");
        let parsed: serde_json::Value = serde_json::from_str(&entry.to_jsonl().unwrap()).unwrap();
        assert_eq!(parsed["trace_id"], "stdio::run-1::001");
        assert_eq!(parsed["level"], "info");
        assert!(parsed.get("outcome").is_none());
        assert!(parsed.get("errno").is_none());
    }

    #[test]
    fn emitter_numbers_trace_ids() {
        let mut emitter = LogEmitter::new(Vec::new(), "stdio", "run-7");
        emitter.emit(LogLevel::Info, "start").unwrap();
        emitter
            .emit_entry(
                LogEntry::new("", LogLevel::Info, "case")
                    .with_case("c", "sprintf")
                    .with_outcome(Outcome::Pass)
                    .with_errno(0),
            )
            .unwrap();
        let out = String::from_utf8(emitter.into_inner()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        let second = validate_log_line(lines[1], 2).unwrap();
        assert_eq!(second.trace_id, "stdio::run-7::002");
        assert_eq!(second.outcome, Some(Outcome::Pass));
        assert_eq!(second.campaign.as_deref(), Some("stdio"));
    }

    #[test]
    fn validation_flags_missing_fields_and_bad_levels() {
        let errs = validate_log_line(r#"{"timestamp":"t","level":"info"}"#, 3).unwrap_err();
        let fields: Vec<&str> = errs.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, ["trace_id", "event"]);
        assert!(validate_log_line("not json", 1).is_err());
        let bad_level = r#"{"timestamp":"t","trace_id":"a::b::001","level":"loud","event":"e"}"#;
        assert_eq!(validate_log_line(bad_level, 4).unwrap_err()[0].field, "<schema>");
    }

    #[test]
    fn sha256_of_empty_input() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        let mut index = ArtifactIndex::new("run-1");
        index.add("fixtures/a.json", "fixture", b"abc");
        assert_eq!(index.artifacts[0].size_bytes, 3);
    }

    #[test]
    fn utc_formatting_matches_known_instants() {
        assert_eq!(format_utc(0, 0), "1970-01-01T00:00:00.000Z");
        assert_eq!(format_utc(951_782_400, 5), "2000-02-29T00:00:00.005Z");
        assert_eq!(format_utc(1_792_108_800, 0), "2026-10-16T00:00:00.000Z");
    }
}
