use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// One submitted program, as produced by discovery.
///
/// Identity is `(owner, task_id)`. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Submission {
    pub owner: String,
    pub task_id: String,
    pub source_path: PathBuf,
}

impl Submission {
    pub fn new(owner: impl Into<String>, task_id: impl Into<String>, source_path: impl Into<PathBuf>) -> Self {
        Self {
            owner: owner.into(),
            task_id: task_id.into(),
            source_path: source_path.into(),
        }
    }

    /// File stem of the source, used as the entry point name by the toolchain.
    pub fn main_name(&self) -> String {
        self.source_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

impl fmt::Display for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.task_id)
    }
}

/// One input/expected-output pair resolved from the test catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub name: String,
    pub input_path: PathBuf,
    pub expected_output_path: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutcomeStatus {
    Passed,
    WrongOutput,
    TimedOut,
    NonZeroExit,
    LaunchFailure,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutcomeStatus::Passed => "passed",
            OutcomeStatus::WrongOutput => "wrong output",
            OutcomeStatus::TimedOut => "timed out",
            OutcomeStatus::NonZeroExit => "non-zero exit",
            OutcomeStatus::LaunchFailure => "launch failure",
        };
        f.write_str(s)
    }
}

/// Result of running one compiled program against one test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: OutcomeStatus,
    pub wall_time_nanos: u64,
    pub memory_bytes: u64,
    pub detail: Option<String>,
}

impl ExecutionOutcome {
    pub fn passed(wall_time_nanos: u64, memory_bytes: u64) -> Self {
        Self {
            status: OutcomeStatus::Passed,
            wall_time_nanos,
            memory_bytes,
            detail: None,
        }
    }

    /// Timed-out runs never report timing or memory.
    pub fn timed_out(detail: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::TimedOut,
            wall_time_nanos: 0,
            memory_bytes: 0,
            detail: Some(detail.into()),
        }
    }

    pub fn launch_failure(detail: impl Into<String>) -> Self {
        Self {
            status: OutcomeStatus::LaunchFailure,
            wall_time_nanos: 0,
            memory_bytes: 0,
            detail: Some(detail.into()),
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == OutcomeStatus::Passed
    }
}

/// An outcome tagged with the test case it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub test: String,
    pub outcome: ExecutionOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason")]
pub enum Classification {
    CompileError,
    Failed(String),
    TimedOut,
    RuntimeError,
    Passed,
}

impl Classification {
    pub fn is_passed(&self) -> bool {
        matches!(self, Classification::Passed)
    }

    /// Short label used for grouping in reports.
    pub fn label(&self) -> &'static str {
        match self {
            Classification::CompileError => "Compilation error",
            Classification::Failed(_) => "Failed",
            Classification::TimedOut => "Timeout",
            Classification::RuntimeError => "Runtime error",
            Classification::Passed => "Passed",
        }
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Classification::Failed(reason) => write!(f, "Failed ({})", reason),
            other => f.write_str(other.label()),
        }
    }
}

/// Terminal artifact of one submission's evaluation.
///
/// `classification == Passed` implies `compiled` and every outcome passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub submission: Submission,
    pub compiled: bool,
    pub classification: Classification,
    pub representative_time_nanos: u64,
    pub peak_memory_bytes: u64,
    #[serde(default)]
    pub outcomes: Vec<TestOutcome>,
    #[serde(default)]
    pub diagnostics: Vec<String>,
}

impl EvaluationRecord {
    /// Record for a submission that never produced per-test outcomes.
    pub fn terminal(submission: Submission, compiled: bool, classification: Classification) -> Self {
        Self {
            submission,
            compiled,
            classification,
            representative_time_nanos: 0,
            peak_memory_bytes: 0,
            outcomes: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    pub fn with_diagnostics(mut self, diagnostics: Vec<String>) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn is_passed(&self) -> bool {
        self.classification.is_passed()
    }
}

/// Everything one grading run produced, as persisted for the reporting side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub records: Vec<EvaluationRecord>,
}

impl RunSummary {
    pub fn new(started_at: DateTime<Utc>, records: Vec<EvaluationRecord>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at,
            finished_at: Utc::now(),
            records,
        }
    }
}
