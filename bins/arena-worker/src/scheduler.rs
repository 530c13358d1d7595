/// Scheduler - bounded-parallelism driver over the submission evaluator
///
/// A fixed pool of worker tasks pulls submissions from a shared queue. Each
/// worker evaluates one submission at a time under the submission deadline;
/// a submission that overruns is aborted (its process group dies with the
/// dropped cell) and recorded as `TimedOut`, and the worker moves on.

use crate::executor::SubmissionEvaluator;
use arena_common::config::Configuration;
use arena_common::types::{Classification, EvaluationRecord, Submission};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

pub struct Scheduler {
    evaluator: Arc<SubmissionEvaluator>,
    concurrency: usize,
    submission_timeout: Duration,
}

impl Scheduler {
    pub fn new(evaluator: Arc<SubmissionEvaluator>, concurrency: usize, submission_timeout: Duration) -> Self {
        Self {
            evaluator,
            concurrency: concurrency.max(1),
            submission_timeout,
        }
    }

    pub fn from_config(config: Arc<Configuration>) -> Self {
        let concurrency = config.concurrency;
        let submission_timeout = config.submission_timeout;
        Self::new(Arc::new(SubmissionEvaluator::new(config)), concurrency, submission_timeout)
    }

    /// Evaluate every submission, returning exactly one record per submission.
    ///
    /// Record order follows completion and carries no meaning.
    pub async fn run(&self, submissions: Vec<Submission>) -> Vec<EvaluationRecord> {
        let evaluator = Arc::clone(&self.evaluator);
        self.run_with(submissions, move |submission| {
            let evaluator = Arc::clone(&evaluator);
            async move { evaluator.evaluate(&submission).await }
        })
        .await
    }

    /// Drive `evaluate` over the pool with the same deadline and panic
    /// containment as `run`.
    pub(crate) async fn run_with<F, Fut>(&self, submissions: Vec<Submission>, evaluate: F) -> Vec<EvaluationRecord>
    where
        F: Fn(Submission) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = EvaluationRecord> + Send + 'static,
    {
        let total = submissions.len();
        if total == 0 {
            info!("No submissions to evaluate");
            return Vec::new();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        for submission in submissions {
            // Receiver is alive until the pool finishes
            let _ = tx.send(submission);
        }
        drop(tx);

        let queue = Arc::new(Mutex::new(rx));
        let records = Arc::new(Mutex::new(Vec::with_capacity(total)));
        let workers = self.concurrency.min(total);

        info!(total, workers, timeout_ms = self.submission_timeout.as_millis() as u64, "Starting evaluation pool");
        let start = Instant::now();

        let evaluate = Arc::new(evaluate);
        let mut pool = JoinSet::new();
        for worker_id in 0..workers {
            let queue = Arc::clone(&queue);
            let records = Arc::clone(&records);
            let evaluate = Arc::clone(&evaluate);
            let timeout = self.submission_timeout;

            pool.spawn(async move {
                loop {
                    let next = queue.lock().await.recv().await;
                    let submission = match next {
                        Some(submission) => submission,
                        None => break,
                    };

                    let record = evaluate_with_deadline(evaluate(submission.clone()), submission, timeout).await;

                    let mut records = records.lock().await;
                    records.push(record);
                    info!(worker_id, completed = records.len(), total, "Submission finished");
                }
            });
        }

        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Worker task failed");
            }
        }

        let records = std::mem::take(&mut *records.lock().await);
        info!(
            evaluated = records.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Evaluation pool finished"
        );
        records
    }
}

/// Run one evaluation in its own task so a panic or overrun stays contained
async fn evaluate_with_deadline<Fut>(evaluation: Fut, submission: Submission, timeout: Duration) -> EvaluationRecord
where
    Fut: Future<Output = EvaluationRecord> + Send + 'static,
{
    let mut handle = tokio::spawn(evaluation);

    match tokio::time::timeout(timeout, &mut handle).await {
        Ok(Ok(record)) => record,
        Ok(Err(e)) => {
            error!(owner = %submission.owner, task = %submission.task_id, error = %e, "Evaluation task aborted");
            EvaluationRecord::terminal(submission, false, Classification::RuntimeError)
                .with_diagnostics(vec![format!("evaluation aborted: {}", e)])
        }
        Err(_) => {
            handle.abort();
            // Wait for the task to be dropped so its processes are reclaimed
            let _ = handle.await;
            warn!(
                owner = %submission.owner,
                task = %submission.task_id,
                timeout_ms = timeout.as_millis() as u64,
                "Submission exceeded its evaluation deadline"
            );
            EvaluationRecord::terminal(submission, false, Classification::TimedOut).with_diagnostics(vec![
                format!("evaluation exceeded {}ms", timeout.as_millis()),
            ])
        }
    }
}
