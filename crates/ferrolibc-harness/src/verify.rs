//! Output comparison and verification.

use serde::{Deserialize, Serialize};

use crate::diff::render_diff;
use crate::execute::Execution;
use crate::fixtures::FixtureCase;

/// Result of verifying a single fixture case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Name of the test case.
    pub case_name: String,
    /// Function exercised.
    pub function: String,
    /// ISO C / POSIX clause reference.
    pub standard_ref: String,
    /// Whether the case passed.
    pub passed: bool,
    /// Expected output.
    pub expected: String,
    /// Actual output from our implementation.
    pub actual: String,
    pub expected_errno: i32,
    pub actual_errno: i32,
    /// Diff if the case failed.
    pub diff: Option<String>,
}

impl VerificationResult {
    /// Compare an execution against the case's expectation. Output and
    /// errno must both match.
    #[must_use]
    pub fn compare(case: &FixtureCase, execution: &Execution) -> Self {
        let passed = case.expected_output == execution.output && case.expected_errno == execution.errno;
        let diff = (!passed).then(|| {
            render_diff(
                &expectation_text(&case.expected_output, case.expected_errno),
                &expectation_text(&execution.output, execution.errno),
            )
        });
        Self {
            case_name: case.name.clone(),
            function: case.function.clone(),
            standard_ref: case.standard_ref.clone(),
            passed,
            expected: case.expected_output.clone(),
            actual: execution.output.clone(),
            expected_errno: case.expected_errno,
            actual_errno: execution.errno,
            diff,
        }
    }

    /// A case the harness could not run at all.
    #[must_use]
    pub fn harness_failure(case: &FixtureCase, reason: &str) -> Self {
        Self {
            case_name: case.name.clone(),
            function: case.function.clone(),
            standard_ref: case.standard_ref.clone(),
            passed: false,
            expected: case.expected_output.clone(),
            actual: format!("<harness error: {reason}>"),
            expected_errno: case.expected_errno,
            actual_errno: 0,
            diff: None,
        }
    }
}

fn expectation_text(output: &str, errno: i32) -> String {
    format!("{output}\nerrno={errno}")
}

/// Aggregate verification summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSummary {
    /// Total cases run.
    pub total: usize,
    /// Cases passed.
    pub passed: usize,
    /// Cases failed.
    pub failed: usize,
    /// Individual results.
    pub results: Vec<VerificationResult>,
}

impl VerificationSummary {
    /// Build a summary from a list of results.
    #[must_use]
    pub fn from_results(results: Vec<VerificationResult>) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();
        let failed = total - passed;
        Self {
            total,
            passed,
            failed,
            results,
        }
    }

    /// Returns true if all cases passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(expected: &str, errno: i32) -> FixtureCase {
        FixtureCase {
            name: "c".into(),
            function: "sprintf".into(),
            standard_ref: "C11 7.21.6.1".into(),
            inputs: serde_json::Value::Null,
            expected_output: expected.into(),
            expected_errno: errno,
        }
    }

    #[test]
    fn errno_mismatch_fails_even_when_output_matches() {
        let exec = Execution {
            output: "x".into(),
            errno: 34,
        };
        let ok = VerificationResult::compare(&case("x", 34), &exec);
        assert!(ok.passed && ok.diff.is_none());
        let bad = VerificationResult::compare(&case("x", 0), &exec);
        assert!(!bad.passed);
        assert!(bad.diff.unwrap().contains("-errno=0\n+errno=34"));
    }

    #[test]
    fn summary_counts_failures() {
        let exec = Execution {
            output: "a".into(),
            errno: 0,
        };
        let summary = VerificationSummary::from_results(vec![
            VerificationResult::compare(&case("a", 0), &exec),
            VerificationResult::compare(&case("b", 0), &exec),
            VerificationResult::harness_failure(&case("c", 0), "unsupported"),
        ]);
        assert_eq!((summary.total, summary.passed, summary.failed), (3, 1, 2));
        assert!(!summary.all_passed());
    }
}
