//! Report generation for conformance results.

use serde::{Deserialize, Serialize};

use crate::structured_log::{now_utc, sha256_hex};
use crate::verify::VerificationSummary;

/// A fixture file that contributed to a report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixtureDigest {
    pub path: String,
    pub family: String,
    pub sha256: String,
}

impl FixtureDigest {
    #[must_use]
    pub fn new(path: impl Into<String>, family: impl Into<String>, content: &[u8]) -> Self {
        Self {
            path: path.into(),
            family: family.into(),
            sha256: sha256_hex(content),
        }
    }
}

/// A conformance report over one or more fixture sets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConformanceReport {
    pub title: String,
    /// Timestamp (UTC).
    pub timestamp: String,
    pub fixtures: Vec<FixtureDigest>,
    pub summary: VerificationSummary,
}

impl ConformanceReport {
    #[must_use]
    pub fn new(title: impl Into<String>, fixtures: Vec<FixtureDigest>, summary: VerificationSummary) -> Self {
        Self {
            title: title.into(),
            timestamp: now_utc(),
            fixtures,
            summary,
        }
    }

    /// Render the report as markdown.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", self.title));
        out.push_str(&format!("- Timestamp: {}\n", self.timestamp));
        out.push_str(&format!("- Total: {}\n", self.summary.total));
        out.push_str(&format!("- Passed: {}\n", self.summary.passed));
        out.push_str(&format!("- Failed: {}\n\n", self.summary.failed));

        if !self.fixtures.is_empty() {
            out.push_str("## Fixtures\n\n");
            for f in &self.fixtures {
                out.push_str(&format!("- `{}` ({}) sha256:{}\n", f.path, f.family, f.sha256));
            }
            out.push('\n');
        }

        out.push_str("| Case | Function | Reference | Status |\n");
        out.push_str("|------|----------|-----------|--------|\n");
        for r in &self.summary.results {
            let status = if r.passed { "PASS" } else { "FAIL" };
            out.push_str(&format!("| {} | {} | {} | {} |\n", r.case_name, r.function, r.standard_ref, status));
        }

        let failures: Vec<_> = self.summary.results.iter().filter(|r| !r.passed).collect();
        if !failures.is_empty() {
            out.push_str("\n## Failures\n");
            for r in failures {
                out.push_str(&format!("\n### {}\n\n```diff\n", r.case_name));
                out.push_str(r.diff.as_deref().unwrap_or(&r.actual));
                if !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str("```\n");
            }
        }
        out
    }

    /// Render the report as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execute::Execution;
    use crate::fixtures::FixtureCase;
    use crate::verify::VerificationResult;

    fn summary() -> VerificationSummary {
        let case = FixtureCase {
            name: "width".into(),
            function: "sprintf".into(),
            standard_ref: "C11 7.21.6.1p4".into(),
            inputs: serde_json::Value::Null,
            expected_output: "[  7]".into(),
            expected_errno: 0,
        };
        let exec = Execution {
            output: "[7]".into(),
            errno: 0,
        };
        VerificationSummary::from_results(vec![VerificationResult::compare(&case, &exec)])
    }

    #[test]
    fn markdown_lists_fixtures_and_failures() {
        let report = ConformanceReport::new(
            "stdio conformance",
            vec![FixtureDigest::new("fixtures/a.json", "stdio/printf", b"{}")],
            summary(),
        );
        let md = report.to_markdown();
        assert!(md.starts_with("# stdio conformance\n"));
        assert!(md.contains("- Failed: 1"));
        assert!(md.contains("| width | sprintf | C11 7.21.6.1p4 | FAIL |"));
        assert!(md.contains("sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a"));
        assert!(md.contains("-[  7]\n+[7]"));
    }

    #[test]
    fn json_round_trips() {
        let report = ConformanceReport::new("r", Vec::new(), summary());
        let back: ConformanceReport = serde_json::from_str(&report.to_json()).unwrap();
        assert_eq!(back.summary.failed, 1);
    }
}
