/// Execution Cell - runs one compiled program against one test case
///
/// **Core Responsibility:**
/// Spawn the artifact's run command with stdin bound to the test input,
/// capture stdout/stderr to cell-scoped files, enforce the deadline, and hand
/// the captured output to the Comparator.
///
/// **Boundary:**
/// - The cell knows HOW to run a program and observe it
/// - The cell does NOT aggregate or classify submissions (see `evaluator`)
/// - Every failure becomes an `ExecutionOutcome`, never an error
///
/// **Cleanup:**
/// The child runs in its own process group. A guard kills the whole group
/// when the run ends or the future is dropped, and the cell directory holding
/// the captured streams is removed with it.

use crate::comparator::{self, MAX_EXCERPT_BYTES};
use crate::compiler::CompiledArtifact;
use crate::memory::{self, PeakTracker};
use arena_common::types::{ExecutionOutcome, OutcomeStatus, TestCase};
use std::fs::File;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::process::Command;
use tracing::{debug, warn};

/// How often the child's resident set is sampled
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Captured stdout larger than this is never read back
const DEFAULT_MAX_OUTPUT_BYTES: u64 = 64 * 1024 * 1024;

/// Bytes of stderr read back for a failing run's diagnostic
const STDERR_READ_BYTES: u64 = 2 * MAX_EXCERPT_BYTES as u64;

/// Kills the child's process group on drop.
///
/// Covers the deadline path, the ctrl-c path and a scheduler-level abort of
/// the enclosing task. Killing an already-empty group is a harmless ESRCH.
struct ProcessGroupGuard {
    pgid: Option<u32>,
}

impl ProcessGroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid }
    }

    fn kill(&self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            // SAFETY: killpg only sends a signal; pgid came from our own spawn
            unsafe {
                libc::killpg(pgid as libc::pid_t, libc::SIGKILL);
            }
        }
    }
}

impl Drop for ProcessGroupGuard {
    fn drop(&mut self) {
        self.kill();
    }
}

pub struct ExecutionCell {
    poll_interval: Duration,
    max_output_bytes: u64,
}

impl Default for ExecutionCell {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionCell {
    pub fn new() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
        }
    }

    pub fn with_max_output(mut self, bytes: u64) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    /// Run `artifact` once against `test`.
    ///
    /// `memory_limit_bytes` is observed, not enforced: overage is logged here
    /// and judged by the aggregate check in the evaluator.
    #[tracing::instrument(skip(self, artifact, test), fields(owner = %artifact.owner(), test = %test.name))]
    pub async fn run(
        &self,
        artifact: &CompiledArtifact,
        test: &TestCase,
        time_limit: Duration,
        memory_limit_bytes: u64,
    ) -> ExecutionOutcome {
        if !artifact.build_dir().is_dir() {
            return ExecutionOutcome::launch_failure(format!(
                "artifact directory missing: {}",
                artifact.build_dir().display()
            ));
        }

        let (program, args) = match artifact.command().split_first() {
            Some(split) => split,
            None => return ExecutionOutcome::launch_failure("empty run command"),
        };

        let input = match File::open(&test.input_path) {
            Ok(file) => file,
            Err(e) => {
                return ExecutionOutcome::launch_failure(format!(
                    "cannot open input {}: {}",
                    test.input_path.display(),
                    e
                ))
            }
        };

        let cell_dir = match tempfile::Builder::new().prefix("cell_").tempdir() {
            Ok(dir) => dir,
            Err(e) => return ExecutionOutcome::launch_failure(format!("cannot create cell directory: {}", e)),
        };
        let stdout_path = cell_dir.path().join("stdout.txt");
        let stderr_path = cell_dir.path().join("stderr.txt");

        let (stdout, stderr) = match (File::create(&stdout_path), File::create(&stderr_path)) {
            (Ok(out), Ok(err)) => (out, err),
            (Err(e), _) | (_, Err(e)) => {
                return ExecutionOutcome::launch_failure(format!("cannot create capture files: {}", e))
            }
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(cell_dir.path())
            .stdin(Stdio::from(input))
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::from(stderr))
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let baseline_rss = memory::self_rss_bytes().await;

        // Timer covers launch through observed termination
        let start = Instant::now();
        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return ExecutionOutcome::launch_failure(format!("failed to launch {}: {}", program, e))
            }
        };

        let pid = child.id();
        let guard = ProcessGroupGuard::new(pid);
        debug!(pid = ?pid, "Process started");

        let mut tracker = PeakTracker::default();
        let poll_interval = self.poll_interval;
        let watch = async {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                tokio::select! {
                    status = child.wait() => return status,
                    _ = ticker.tick() => {
                        if let Some(pid) = pid {
                            tracker.observe(memory::peak_rss_bytes(pid).await);
                        }
                    }
                }
            }
        };

        let waited = tokio::time::timeout(time_limit, watch).await;
        let elapsed = start.elapsed();

        let status = match waited {
            Ok(Ok(status)) => status,
            Ok(Err(e)) => {
                return ExecutionOutcome::launch_failure(format!("failed to wait for process: {}", e))
            }
            Err(_) => {
                guard.kill();
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "Child already reaped after group kill");
                }
                warn!(
                    timeout_ms = time_limit.as_millis() as u64,
                    "Test execution timed out - process group killed"
                );
                return ExecutionOutcome::timed_out(format!(
                    "exceeded time limit of {}ms",
                    time_limit.as_millis()
                ));
            }
        };
        drop(guard);

        let wall_time_nanos = elapsed.as_nanos().min(u64::MAX as u128) as u64;
        let memory_bytes = match tracker.peak() {
            Some(peak) => peak,
            None => match (memory::self_rss_bytes().await, baseline_rss) {
                (Some(after), Some(before)) => after.saturating_sub(before),
                _ => 0,
            },
        };

        debug!(
            elapsed_ms = elapsed.as_millis() as u64,
            memory_bytes,
            exit = %status,
            "Process finished"
        );

        if memory_bytes > memory_limit_bytes {
            warn!(memory_bytes, memory_limit_bytes, "Memory limit exceeded");
        }

        if !status.success() {
            let stderr = tokio::task::spawn_blocking(move || {
                comparator::read_excerpt(&stderr_path, STDERR_READ_BYTES)
            })
            .await
            .ok()
            .and_then(Result::ok)
            .unwrap_or_default();
            let mut detail = describe_exit(&status);
            if !stderr.is_empty() {
                detail.push_str(": ");
                detail.push_str(&comparator::truncate(&stderr, MAX_EXCERPT_BYTES));
            }
            return ExecutionOutcome {
                status: OutcomeStatus::NonZeroExit,
                wall_time_nanos,
                memory_bytes,
                detail: Some(detail),
            };
        }

        let expected_path = test.expected_output_path.clone();
        let max_output_bytes = self.max_output_bytes;
        let mismatch = tokio::task::spawn_blocking(move || {
            output_mismatch(&stdout_path, &expected_path, max_output_bytes)
        })
        .await
        .unwrap_or_else(|e| Some(format!("output comparison failed: {}", e)));

        match mismatch {
            None => ExecutionOutcome::passed(wall_time_nanos, memory_bytes),
            Some(detail) => ExecutionOutcome {
                status: OutcomeStatus::WrongOutput,
                wall_time_nanos,
                memory_bytes,
                detail: Some(detail),
            },
        }
    }
}

/// Why the captured output is wrong, or `None` when it matches.
///
/// Blocking; oversized output is rejected from its length alone.
fn output_mismatch(actual: &Path, expected: &Path, max_output_bytes: u64) -> Option<String> {
    if let Ok(meta) = std::fs::metadata(actual) {
        if meta.len() > max_output_bytes {
            warn!(output_bytes = meta.len(), max_output_bytes, "Output limit exceeded");
            return Some(format!("output exceeds {} bytes", max_output_bytes));
        }
    }
    if comparator::equal(actual, expected) {
        None
    } else {
        Some(comparator::describe_mismatch(actual, expected))
    }
}

/// "exit code N", or the terminating signal on unix
fn describe_exit(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {}", code);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("terminated by signal {} ({})", signal, signal_name(signal));
        }
    }
    "terminated abnormally".to_string()
}

#[cfg(unix)]
fn signal_name(signal: i32) -> &'static str {
    match signal {
        libc::SIGKILL => "SIGKILL",
        libc::SIGSEGV => "SIGSEGV",
        libc::SIGABRT => "SIGABRT",
        libc::SIGTERM => "SIGTERM",
        libc::SIGFPE => "SIGFPE",
        libc::SIGBUS => "SIGBUS",
        libc::SIGINT => "SIGINT",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Artifact whose run command is `sh -c <script>`
    fn script_artifact(script: &str) -> CompiledArtifact {
        let build_dir = tempfile::tempdir().unwrap();
        CompiledArtifact::new(
            "tester".to_string(),
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            Vec::new(),
            build_dir,
        )
    }

    fn test_case(dir: &TempDir, name: &str, input: &str, expected: &str) -> TestCase {
        let input_path = dir.path().join(format!("{}.in", name));
        let expected_output_path = dir.path().join(format!("{}.out", name));
        fs::write(&input_path, input).unwrap();
        fs::write(&expected_output_path, expected).unwrap();
        TestCase {
            name: name.to_string(),
            input_path,
            expected_output_path,
        }
    }

    const LIMIT: u64 = 1024 * 1024 * 1024;

    #[tokio::test]
    async fn test_echo_input_passes() {
        let dir = tempfile::tempdir().unwrap();
        let test = test_case(&dir, "echo1", "hello\nworld\n", "hello\r\nworld\r\n\r\n");
        let outcome = ExecutionCell::new()
            .run(&script_artifact("cat"), &test, Duration::from_secs(5), LIMIT)
            .await;
        assert_eq!(outcome.status, OutcomeStatus::Passed, "{:?}", outcome.detail);
        assert!(outcome.wall_time_nanos > 0);
        assert!(outcome.detail.is_none());
    }

    #[tokio::test]
    async fn test_wrong_output_carries_excerpt() {
        let dir = tempfile::tempdir().unwrap();
        let test = test_case(&dir, "wrong1", "", "42\n");
        let outcome = ExecutionCell::new()
            .run(&script_artifact("echo 41"), &test, Duration::from_secs(5), LIMIT)
            .await;
        assert_eq!(outcome.status, OutcomeStatus::WrongOutput);
        let detail = outcome.detail.unwrap();
        assert!(detail.contains("\"42\""));
        assert!(detail.contains("\"41\""));
    }

    #[tokio::test]
    async fn test_oversized_output_is_wrong_without_reading_it() {
        let dir = tempfile::tempdir().unwrap();
        let test = test_case(&dir, "flood1", "", "tiny\n");
        let outcome = ExecutionCell::new()
            .with_max_output(64)
            .run(
                &script_artifact("i=0; while [ $i -lt 100 ]; do echo line$i; i=$((i+1)); done"),
                &test,
                Duration::from_secs(5),
                LIMIT,
            )
            .await;
        assert_eq!(outcome.status, OutcomeStatus::WrongOutput);
        assert_eq!(outcome.detail.as_deref(), Some("output exceeds 64 bytes"));
        assert!(outcome.wall_time_nanos > 0);

        // Output at the limit is still compared
        let exact = test_case(&dir, "exact1", "", "tiny\n");
        let outcome = ExecutionCell::new()
            .with_max_output(5)
            .run(&script_artifact("echo tiny"), &exact, Duration::from_secs(5), LIMIT)
            .await;
        assert_eq!(outcome.status, OutcomeStatus::Passed, "{:?}", outcome.detail);
    }

    #[tokio::test]
    async fn test_nonzero_exit_captures_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let test = test_case(&dir, "crash1", "", "ok\n");
        let outcome = ExecutionCell::new()
            .run(
                &script_artifact("echo ok; echo boom >&2; exit 3"),
                &test,
                Duration::from_secs(5),
                LIMIT,
            )
            .await;
        // Correct partial output does not rescue a failing exit
        assert_eq!(outcome.status, OutcomeStatus::NonZeroExit);
        let detail = outcome.detail.unwrap();
        assert!(detail.contains("exit code 3"));
        assert!(detail.contains("boom"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_signal_termination_is_named() {
        let dir = tempfile::tempdir().unwrap();
        let test = test_case(&dir, "sig1", "", "");
        let outcome = ExecutionCell::new()
            .run(&script_artifact("kill -9 $$"), &test, Duration::from_secs(5), LIMIT)
            .await;
        assert_eq!(outcome.status, OutcomeStatus::NonZeroExit);
        assert!(outcome.detail.unwrap().contains("SIGKILL"));
    }

    #[tokio::test]
    async fn test_timeout_reports_zero_metrics() {
        let dir = tempfile::tempdir().unwrap();
        let test = test_case(&dir, "loop1", "", "never\n");
        let start = Instant::now();
        let outcome = ExecutionCell::new()
            .run(
                &script_artifact("while :; do :; done"),
                &test,
                Duration::from_millis(300),
                LIMIT,
            )
            .await;
        assert_eq!(outcome.status, OutcomeStatus::TimedOut);
        assert_eq!(outcome.wall_time_nanos, 0);
        assert_eq!(outcome.memory_bytes, 0);
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_timeout_kills_background_children() {
        let dir = tempfile::tempdir().unwrap();
        let test = test_case(&dir, "bg1", "", "");
        let marker = dir.path().join("survivor");
        let script = format!("(sleep 1; touch {}) & wait", marker.display());
        let outcome = ExecutionCell::new()
            .run(&script_artifact(&script), &test, Duration::from_millis(200), LIMIT)
            .await;
        assert_eq!(outcome.status, OutcomeStatus::TimedOut);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(!marker.exists(), "grandchild outlived the process group kill");
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let test = test_case(&dir, "nolaunch", "", "");
        let artifact = CompiledArtifact::new(
            "tester".to_string(),
            vec!["arena-no-such-runtime-binary".to_string()],
            Vec::new(),
            tempfile::tempdir().unwrap(),
        );
        let outcome = ExecutionCell::new()
            .run(&artifact, &test, Duration::from_secs(1), LIMIT)
            .await;
        assert_eq!(outcome.status, OutcomeStatus::LaunchFailure);
        assert_eq!(outcome.wall_time_nanos, 0);
    }

    #[tokio::test]
    async fn test_missing_input_is_launch_failure() {
        let dir = tempfile::tempdir().unwrap();
        let test = TestCase {
            name: "ghost".to_string(),
            input_path: dir.path().join("ghost.in"),
            expected_output_path: dir.path().join("ghost.out"),
        };
        let outcome = ExecutionCell::new()
            .run(&script_artifact("cat"), &test, Duration::from_secs(1), LIMIT)
            .await;
        assert_eq!(outcome.status, OutcomeStatus::LaunchFailure);
    }

    #[tokio::test]
    async fn test_child_runs_in_scratch_directory() {
        let dir = tempfile::tempdir().unwrap();
        let test = test_case(&dir, "cwd1", "", "");
        // Whatever the program drops in its cwd must not land next to the tests
        let outcome = ExecutionCell::new()
            .run(&script_artifact("touch scratch.tmp"), &test, Duration::from_secs(5), LIMIT)
            .await;
        assert_eq!(outcome.status, OutcomeStatus::Passed, "{:?}", outcome.detail);
        assert!(!Path::new(&dir.path().join("scratch.tmp")).exists());
    }

    #[tokio::test]
    async fn test_memory_is_reported_for_sampled_run() {
        let dir = tempfile::tempdir().unwrap();
        let test = test_case(&dir, "mem1", "", "");
        let outcome = ExecutionCell::new()
            .run(&script_artifact("sleep 0.1"), &test, Duration::from_secs(5), LIMIT)
            .await;
        assert_eq!(outcome.status, OutcomeStatus::Passed);
        #[cfg(target_os = "linux")]
        assert!(outcome.memory_bytes > 0);
    }
}
