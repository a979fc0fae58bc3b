/// Result Interpreter - Transcript to Grading Result
///
/// **Core Responsibility:**
/// Turn a raw sandbox transcript into a typed `GradingResult`.
///
/// **Critical Properties:**
/// - Never fails: malformed output is a first-class `status=error` result.
/// - Knows nothing about HTTP, sandboxes or harness source.
/// - Trusts the harness for per-test outcomes only; the summary and
///   `allIssuesFixed` are always recomputed here.
///
/// **Decision Table:**
/// - exit 2 + harness error record → propagate record (user code failed to load)
/// - other non-zero exit → "Execution error", details from stderr, else stdout
/// - exit 0 + unparseable stdout → "Failed to parse test results", raw stdout
/// - exit 0 + error record → propagate record
/// - exit 0 + completed record for other test cases → "Test results do not match the problem"
/// - exit 0 + completed record → outcomes + inferred issues

use dailybug_common::types::{
    GradingResult, GradingStatus, Problem, SandboxTranscript, Summary, TestOutcome,
};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::harness::LOAD_FAILURE_EXIT_CODE;
use crate::issues::{infer_issues_fixed, IssueKeywordTable};

pub const EXECUTION_ERROR_MESSAGE: &str = "Execution error";
pub const PARSE_FAILURE_MESSAGE: &str = "Failed to parse test results";
pub const REPORT_MISMATCH_MESSAGE: &str = "Test results do not match the problem";

/// The one JSON record a harness prints
#[derive(Debug, Clone, Deserialize)]
pub struct HarnessReport {
    pub status: GradingStatus,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<String>,
    #[serde(default)]
    pub outcomes: Vec<TestOutcome>,
    #[serde(default)]
    pub summary: Option<Summary>,
}

#[derive(Debug, Error)]
pub enum ReportParseError {
    #[error("harness produced no output")]
    Empty,

    #[error("expected exactly one report line, found {0}")]
    TooManyLines(usize),

    #[error("malformed report: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Parse stdout as exactly one non-empty line holding one JSON record
pub fn parse_report(stdout: &str) -> Result<HarnessReport, ReportParseError> {
    let lines: Vec<&str> = stdout.lines().filter(|line| !line.trim().is_empty()).collect();
    match lines.as_slice() {
        [] => Err(ReportParseError::Empty),
        [line] => Ok(serde_json::from_str(line.trim())?),
        many => Err(ReportParseError::TooManyLines(many.len())),
    }
}

/// Interpret a transcript against the problem it was graded for
pub fn interpret(transcript: &SandboxTranscript, problem: &Problem) -> GradingResult {
    interpret_with(transcript, problem, &IssueKeywordTable::default())
}

/// Like [`interpret`], with deployment-wide keyword rules merged into the
/// problem's own
pub fn interpret_with(
    transcript: &SandboxTranscript,
    problem: &Problem,
    extra_rules: &IssueKeywordTable,
) -> GradingResult {
    if transcript.exit_code != 0 {
        return interpret_abnormal_exit(transcript);
    }

    let report = match parse_report(&transcript.stdout) {
        Ok(report) => report,
        Err(e) => {
            warn!(error = %e, stdout_bytes = transcript.stdout.len(), "Unparseable harness output");
            return GradingResult::error(PARSE_FAILURE_MESSAGE, Some(transcript.stdout.clone()));
        }
    };

    match report.status {
        GradingStatus::Error => propagate_error(report),
        GradingStatus::Completed => {
            let outcomes = report.outcomes;
            if let Err(reason) = check_against_problem(&outcomes, problem) {
                warn!(%reason, "Harness report does not match the problem's test cases");
                return GradingResult::error(REPORT_MISMATCH_MESSAGE, Some(reason));
            }
            if let Some(embedded) = report.summary {
                let actual = Summary::from_outcomes(&outcomes);
                if embedded != actual {
                    warn!(?embedded, ?actual, "Harness summary disagrees with outcomes; recomputed");
                }
            }

            let issues_fixed = if problem.issues.is_empty() {
                BTreeMap::new()
            } else {
                let mut table = IssueKeywordTable::from_issues(&problem.issues);
                table.extend(extra_rules);
                infer_issues_fixed(&outcomes, &problem.issues, &table)
            };

            let result = GradingResult::completed(outcomes, issues_fixed);
            debug!(
                total = result.summary.total,
                passed = result.summary.passed,
                failed = result.summary.failed,
                "Harness report interpreted"
            );
            result
        }
    }
}

fn interpret_abnormal_exit(transcript: &SandboxTranscript) -> GradingResult {
    // The harness exits with LOAD_FAILURE_EXIT_CODE after printing its own
    // error record; only an *error* record is accepted on that path.
    if transcript.exit_code == LOAD_FAILURE_EXIT_CODE {
        if let Ok(report) = parse_report(&transcript.stdout) {
            if report.status == GradingStatus::Error {
                return propagate_error(report);
            }
        }
    }

    let details = if transcript.stderr.trim().is_empty() {
        transcript.stdout.clone()
    } else {
        transcript.stderr.clone()
    };
    debug!(exit_code = transcript.exit_code, "Abnormal sandbox exit");
    GradingResult::error(EXECUTION_ERROR_MESSAGE, Some(details))
}

/// One outcome per test case, in order, echoing the case's expected value
fn check_against_problem(outcomes: &[TestOutcome], problem: &Problem) -> Result<(), String> {
    if outcomes.len() != problem.test_cases.len() {
        return Err(format!(
            "expected {} outcomes, found {}",
            problem.test_cases.len(),
            outcomes.len()
        ));
    }
    for (position, (outcome, case)) in outcomes.iter().zip(&problem.test_cases).enumerate() {
        if outcome.index != position {
            return Err(format!("outcome {} reports index {}", position, outcome.index));
        }
        if !same_json(&outcome.expected, &case.expected) {
            return Err(format!("outcome {} reports a different expected value", position));
        }
    }
    Ok(())
}

/// JSON equality where `1` and `1.0` are the same number
fn same_json(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => match (x.as_u64(), y.as_u64()) {
                (Some(x), Some(y)) => x == y,
                _ => x.as_f64() == y.as_f64(),
            },
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| same_json(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| same_json(x, y)))
        }
        _ => a == b,
    }
}

fn propagate_error(report: HarnessReport) -> GradingResult {
    let message = report
        .message
        .unwrap_or_else(|| EXECUTION_ERROR_MESSAGE.to_string());
    GradingResult::error(message, report.details)
}
