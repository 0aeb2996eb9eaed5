//! Test execution engine.

use std::io::Write;
use std::time::Instant;

use log::{debug, warn};

use crate::execute::execute_case;
use crate::fixtures::{FixtureCase, FixtureSet};
use crate::structured_log::{LogEmitter, LogEntry, LogLevel, Outcome};
use crate::verify::VerificationResult;

/// Runs fixture sets and collects verification results.
pub struct TestRunner {
    /// Name of the test campaign.
    pub campaign: String,
}

impl TestRunner {
    #[must_use]
    pub fn new(campaign: impl Into<String>) -> Self {
        Self {
            campaign: campaign.into(),
        }
    }

    /// Run all cases in a set.
    pub fn run(&self, fixture_set: &FixtureSet) -> Vec<VerificationResult> {
        fixture_set.cases.iter().map(|case| self.run_case(case).0).collect()
    }

    /// Run all cases, writing one JSONL record per case.
    pub fn run_logged<W: Write>(
        &self,
        fixture_set: &FixtureSet,
        emitter: &mut LogEmitter<W>,
    ) -> std::io::Result<Vec<VerificationResult>> {
        let mut results = Vec::with_capacity(fixture_set.cases.len());
        for case in &fixture_set.cases {
            let (result, outcome, latency_ns) = self.run_case(case);
            let level = if outcome == Outcome::Pass { LogLevel::Info } else { LogLevel::Error };
            let mut entry = LogEntry::new("", level, "case_result")
                .with_case(&case.name, &case.function)
                .with_standard_ref(&case.standard_ref)
                .with_outcome(outcome)
                .with_errno(result.actual_errno)
                .with_latency_ns(latency_ns);
            if let Some(diff) = &result.diff {
                entry = entry.with_details(serde_json::json!({ "family": fixture_set.family, "diff": diff }));
            }
            emitter.emit_entry(entry)?;
            results.push(result);
        }
        emitter.flush()?;
        Ok(results)
    }

    fn run_case(&self, case: &FixtureCase) -> (VerificationResult, Outcome, u64) {
        let started = Instant::now();
        let execution = execute_case(&case.function, &case.inputs);
        let latency_ns = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);
        match execution {
            Ok(run) => {
                let result = VerificationResult::compare(case, &run);
                let outcome = if result.passed {
                    debug!("{}: {} passed", self.campaign, case.name);
                    Outcome::Pass
                } else {
                    warn!("{}: {} failed: expected {:?}, got {:?}", self.campaign, case.name, case.expected_output, run.output);
                    Outcome::Fail
                };
                (result, outcome, latency_ns)
            }
            Err(err) => {
                warn!("{}: {} could not run: {err}", self.campaign, case.name);
                (VerificationResult::harness_failure(case, &err.to_string()), Outcome::Error, latency_ns)
            }
        }
    }
}
