//! CLI entrypoint for the ferrolibc conformance harness.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::{LevelFilter, Metadata, Record, info};

use ferrolibc_harness::fixtures::fixture_paths;
use ferrolibc_harness::report::FixtureDigest;
use ferrolibc_harness::structured_log::{ArtifactIndex, LogEmitter, validate_log_line};
use ferrolibc_harness::verify::VerificationSummary;
use ferrolibc_harness::{ConformanceReport, FixtureSet, TestRunner};

/// Conformance tooling for ferrolibc.
#[derive(Debug, Parser)]
#[command(name = "ferrolibc-harness")]
#[command(about = "Fixture-driven conformance harness for the ferrolibc stdio engines")]
struct Cli {
    /// Log progress to stderr (repeat for more detail).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Verify the implementation against fixture files.
    Verify {
        /// Fixture JSON file or directory of them.
        #[arg(long)]
        fixture: PathBuf,
        /// Output report path (markdown).
        #[arg(long)]
        report: Option<PathBuf>,
        /// Output report path (JSON).
        #[arg(long)]
        json: Option<PathBuf>,
        /// Structured JSONL log of every case.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Artifact index with SHA-256 digests of inputs and outputs.
        #[arg(long)]
        artifacts: Option<PathBuf>,
    },
    /// Check a JSONL log against the structured log schema.
    ValidateLog {
        #[arg(long)]
        log: PathBuf,
    },
}

/// Minimal stderr logger.
struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl log::Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Verify {
            fixture,
            report,
            json,
            log,
            artifacts,
        } => {
            info!("verifying against fixtures in {}", fixture.display());
            let runner = TestRunner::new("fixture-verify");
            let run_id = format!("run-{}", std::process::id());
            let mut emitter = match &log {
                Some(path) => Some(LogEmitter::new(BufWriter::new(File::create(path)?), "fixture-verify", &run_id)),
                None => None,
            };
            let mut index = ArtifactIndex::new(&run_id);
            let mut digests = Vec::new();
            let mut results = Vec::new();

            for path in fixture_paths(&fixture)? {
                let content = std::fs::read(&path)?;
                let set = FixtureSet::from_json(&String::from_utf8_lossy(&content))?;
                info!("{}: {} cases ({})", path.display(), set.cases.len(), set.family);
                digests.push(FixtureDigest::new(path.display().to_string(), &set.family, &content));
                index.add(path.display().to_string(), "fixture", &content);
                match emitter.as_mut() {
                    Some(emitter) => results.extend(runner.run_logged(&set, emitter)?),
                    None => results.extend(runner.run(&set)),
                }
            }

            let summary = VerificationSummary::from_results(results);
            let all_passed = summary.all_passed();
            let conformance = ConformanceReport::new("ferrolibc stdio conformance", digests, summary);
            eprintln!(
                "{} cases: {} passed, {} failed",
                conformance.summary.total, conformance.summary.passed, conformance.summary.failed
            );
            for r in conformance.summary.results.iter().filter(|r| !r.passed) {
                eprintln!("FAIL {} ({})", r.case_name, r.standard_ref);
                if let Some(diff) = &r.diff {
                    eprintln!("{diff}");
                }
            }

            if let Some(path) = report {
                let md = conformance.to_markdown();
                std::fs::write(&path, &md)?;
                index.add(path.display().to_string(), "report_md", md.as_bytes());
            }
            if let Some(path) = json {
                let body = conformance.to_json();
                std::fs::write(&path, &body)?;
                index.add(path.display().to_string(), "report_json", body.as_bytes());
            }
            drop(emitter);
            if let Some(path) = &artifacts {
                if let Some(log_path) = &log {
                    index.add(log_path.display().to_string(), "log_jsonl", &std::fs::read(log_path)?);
                }
                std::fs::write(path, index.to_json()?)?;
            }

            Ok(if all_passed { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
        Command::ValidateLog { log } => {
            let content = std::fs::read_to_string(&log)?;
            let mut lines = 0;
            let mut errors = 0;
            for (i, line) in content.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()) {
                lines += 1;
                if let Err(errs) = validate_log_line(line, i + 1) {
                    errors += errs.len();
                    for err in errs {
                        eprintln!("{err}");
                    }
                }
            }
            eprintln!("{lines} lines, {errors} errors");
            Ok(if errors == 0 { ExitCode::SUCCESS } else { ExitCode::FAILURE })
        }
    }
}
