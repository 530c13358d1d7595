/// Submission Executor - per-submission state machine
///
/// **Responsibility:**
/// Drive one submission through
/// `Discovered → Compiling → (CompileError | Running) → Aggregating → Terminal`
/// and always come out with exactly one `EvaluationRecord`.
///
/// **Architecture:**
/// 1. Compile once (compiler.rs)
/// 2. Resolve the task's test cases (catalog.rs)
/// 3. Run them sequentially in catalog order (engine.rs)
/// 4. Aggregate (evaluator.rs)
///
/// This module is the glue layer - it knows nothing about:
/// - How a program is run (engine's job)
/// - How outcomes are classified (evaluator's job)

use crate::catalog::TestCatalog;
use crate::compiler::Compiler;
use crate::engine::ExecutionCell;
use crate::evaluator;
use arena_common::config::Configuration;
use arena_common::types::{Classification, EvaluationRecord, Submission, TestOutcome};
use anyhow::{Context, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Discovered,
    Compiling,
    CompileError,
    Running,
    Aggregating,
    Terminal,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Discovered => "discovered",
            Stage::Compiling => "compiling",
            Stage::CompileError => "compile_error",
            Stage::Running => "running",
            Stage::Aggregating => "aggregating",
            Stage::Terminal => "terminal",
        };
        f.write_str(s)
    }
}

pub struct SubmissionEvaluator {
    config: Arc<Configuration>,
    compiler: Compiler,
    catalog: TestCatalog,
    cell: ExecutionCell,
}

impl SubmissionEvaluator {
    pub fn new(config: Arc<Configuration>) -> Self {
        Self {
            compiler: Compiler::from_config(&config),
            catalog: TestCatalog::from_config(&config),
            cell: ExecutionCell::new().with_max_output(config.max_output_bytes),
            config,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_compiler(mut self, compiler: Compiler) -> Self {
        self.compiler = compiler;
        self
    }

    /// Evaluate one submission to its terminal record.
    ///
    /// Infrastructure failures are reported as `RuntimeError` for this
    /// submission only.
    #[tracing::instrument(skip(self, submission), fields(owner = %submission.owner, task = %submission.task_id))]
    pub async fn evaluate(&self, submission: &Submission) -> EvaluationRecord {
        let start = Instant::now();
        let record = match self.run_stages(submission).await {
            Ok(record) => record,
            Err(e) => {
                error!(error = %format!("{:#}", e), "Evaluation failed");
                EvaluationRecord::terminal(submission.clone(), false, Classification::RuntimeError)
                    .with_diagnostics(vec![format!("{:#}", e)])
            }
        };

        info!(
            stage = %Stage::Terminal,
            classification = %record.classification,
            compiled = record.compiled,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Evaluation completed"
        );
        record
    }

    async fn run_stages(&self, submission: &Submission) -> Result<EvaluationRecord> {
        info!(stage = %Stage::Discovered, source = %submission.source_path.display(), "Submission accepted");

        info!(stage = %Stage::Compiling, "Compiling submission");
        let artifact = match self.compiler.compile(submission).await {
            Ok(artifact) => artifact,
            Err(e) if e.is_infrastructure() => {
                return Err(anyhow::Error::new(e).context("Compilation could not be attempted"));
            }
            Err(e) => {
                warn!(stage = %Stage::CompileError, error = %e, "Compilation failed");
                return Ok(evaluator::compile_error_record(submission.clone(), e.diagnostics()));
            }
        };

        let catalog = self.catalog.clone();
        let task_id = submission.task_id.clone();
        let locations = self.config.test_locations.clone();
        let tests = tokio::task::spawn_blocking(move || catalog.resolve(&task_id, &locations))
            .await
            .context("Test case resolution aborted")?;
        if tests.is_empty() {
            warn!(stage = %Stage::Running, "No test cases found for task");
            return Ok(evaluator::no_tests_record(submission.clone()));
        }

        info!(stage = %Stage::Running, test_count = tests.len(), "Running test cases");
        let mut outcomes = Vec::with_capacity(tests.len());
        for (idx, test) in tests.iter().enumerate() {
            let outcome = self
                .cell
                .run(
                    &artifact,
                    test,
                    self.config.execution_timeout,
                    self.config.memory_limit_bytes,
                )
                .await;
            info!(
                test_num = idx + 1,
                test = %test.name,
                status = %outcome.status,
                elapsed_ms = outcome.wall_time_nanos / 1_000_000,
                memory_bytes = outcome.memory_bytes,
                "Test result"
            );
            outcomes.push(TestOutcome {
                test: test.name.clone(),
                outcome,
            });
        }

        // Build directory is reclaimed here, before aggregation
        let warnings = artifact.diagnostics().to_vec();
        drop(artifact);

        info!(stage = %Stage::Aggregating, "Aggregating outcomes");
        let mut record = evaluator::aggregate(submission.clone(), outcomes, self.config.memory_limit_bytes);
        if record.diagnostics.is_empty() {
            record.diagnostics = warnings;
        }
        Ok(record)
    }
}
