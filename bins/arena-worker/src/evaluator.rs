/// Evaluator - Aggregation Policy
///
/// **Core Responsibility:**
/// Turn the ordered per-test outcomes of one submission into its terminal
/// `EvaluationRecord`.
///
/// **Critical Properties:**
/// - Knows nothing about processes, compilers or the filesystem
/// - Pure function: (submission, outcomes, memory limit) → record
///
/// **Classification Rules:**
/// - First non-passing outcome wins (catalog order), not the worst one
/// - `TimedOut` → `TimedOut`
/// - `NonZeroExit` / `LaunchFailure` → `RuntimeError`
/// - `WrongOutput` → `Failed("wrong output on <test> (<n>/<m> tests passed)")`
/// - All passed → `Passed` with mean time and max memory
/// - All passed but peak memory over the limit → `Failed("memory limit exceeded")`
///   (post hoc; measured values are kept)
/// - No outcomes → `Failed("no test cases")`
///
/// Records that did not pass report zero time and memory, except for the
/// memory downgrade.

use arena_common::types::{
    Classification, EvaluationRecord, ExecutionOutcome, OutcomeStatus, Submission, TestOutcome,
};

pub const NO_TEST_CASES: &str = "no test cases";
pub const MEMORY_LIMIT_EXCEEDED: &str = "memory limit exceeded";

/// Classification for a single non-passing outcome
///
/// `passed` is how many of `total` test cases passed overall.
pub fn classify_outcome(test: &str, outcome: &ExecutionOutcome, passed: usize, total: usize) -> Classification {
    match outcome.status {
        OutcomeStatus::Passed => Classification::Passed,
        OutcomeStatus::TimedOut => Classification::TimedOut,
        OutcomeStatus::NonZeroExit | OutcomeStatus::LaunchFailure => Classification::RuntimeError,
        OutcomeStatus::WrongOutput => Classification::Failed(format!(
            "wrong output on {} ({}/{} tests passed)",
            test, passed, total
        )),
    }
}

/// Aggregate ordered outcomes into the submission's record
pub fn aggregate(
    submission: Submission,
    outcomes: Vec<TestOutcome>,
    memory_limit_bytes: u64,
) -> EvaluationRecord {
    if outcomes.is_empty() {
        return no_tests_record(submission);
    }

    let total = outcomes.len();
    let passed = outcomes.iter().filter(|o| o.outcome.is_passed()).count();

    if let Some(first_failure) = outcomes.iter().find(|o| !o.outcome.is_passed()) {
        let classification = classify_outcome(&first_failure.test, &first_failure.outcome, passed, total);
        let mut diagnostic = format!("{}: {}", first_failure.test, first_failure.outcome.status);
        if let Some(detail) = &first_failure.outcome.detail {
            diagnostic.push_str(" - ");
            diagnostic.push_str(detail);
        }

        let mut record = EvaluationRecord::terminal(submission, true, classification);
        record.diagnostics = vec![diagnostic];
        record.outcomes = outcomes;
        return record;
    }

    let time_sum: u128 = outcomes
        .iter()
        .map(|o| o.outcome.wall_time_nanos as u128)
        .sum();
    let representative_time_nanos = (time_sum / total as u128) as u64;
    let peak_memory_bytes = outcomes
        .iter()
        .map(|o| o.outcome.memory_bytes)
        .max()
        .unwrap_or(0);

    let (classification, diagnostics) = if peak_memory_bytes > memory_limit_bytes {
        (
            Classification::Failed(MEMORY_LIMIT_EXCEEDED.to_string()),
            vec![format!(
                "peak memory {} bytes exceeds limit of {} bytes",
                peak_memory_bytes, memory_limit_bytes
            )],
        )
    } else {
        (Classification::Passed, Vec::new())
    };

    EvaluationRecord {
        submission,
        compiled: true,
        classification,
        representative_time_nanos,
        peak_memory_bytes,
        outcomes,
        diagnostics,
    }
}

/// Record for a submission whose compilation failed
pub fn compile_error_record(submission: Submission, diagnostics: Vec<String>) -> EvaluationRecord {
    EvaluationRecord::terminal(submission, false, Classification::CompileError).with_diagnostics(diagnostics)
}

/// Record for a compiled submission whose task has no test cases
pub fn no_tests_record(submission: Submission) -> EvaluationRecord {
    EvaluationRecord::terminal(submission, true, Classification::Failed(NO_TEST_CASES.to_string()))
}
