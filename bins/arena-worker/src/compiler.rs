/// Compiler - turns one submission's source into a runnable artifact.
///
/// Each compilation gets a fresh build directory owned by the returned
/// [`CompiledArtifact`]; dropping the artifact removes the directory.
/// Toolchain failures come back as [`CompileError`] values and are never
/// retried.

use arena_common::config::{Configuration, Toolchain};
use arena_common::types::Submission;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("source file {path} is not readable: {reason}")]
    Source { path: PathBuf, reason: String },

    #[error("failed to create build directory: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("compiler could not be launched ({program}): {reason}")]
    Toolchain { program: String, reason: String },

    #[error("compilation failed: {}", .diagnostics.join("; "))]
    Rejected { diagnostics: Vec<String> },

    #[error("compilation timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),
}

impl CompileError {
    /// Diagnostic lines suitable for the evaluation record
    pub fn diagnostics(&self) -> Vec<String> {
        match self {
            CompileError::Rejected { diagnostics } => diagnostics.clone(),
            other => vec![other.to_string()],
        }
    }

    /// True when the failure is the grader's environment, not the submission
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, CompileError::Workspace(_))
    }
}

/// A compiled submission ready to run.
#[derive(Debug)]
pub struct CompiledArtifact {
    owner: String,
    command: Vec<String>,
    diagnostics: Vec<String>,
    build_dir: TempDir,
}

impl CompiledArtifact {
    pub(crate) fn new(owner: String, command: Vec<String>, diagnostics: Vec<String>, build_dir: TempDir) -> Self {
        Self {
            owner,
            command,
            diagnostics,
            build_dir,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Fully expanded run command (program followed by arguments)
    pub fn command(&self) -> &[String] {
        &self.command
    }

    /// Compiler output produced by a successful build (warnings)
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }

    pub fn build_dir(&self) -> &Path {
        self.build_dir.path()
    }
}

/// Values substituted into toolchain command templates
struct TemplateVars<'a> {
    source: &'a Path,
    out_dir: &'a Path,
    main: &'a str,
}

fn expand_template(template: &[String], vars: &TemplateVars<'_>) -> Vec<String> {
    let source = vars.source.to_string_lossy();
    let out_dir = vars.out_dir.to_string_lossy();
    template
        .iter()
        .map(|arg| {
            arg.replace("{source}", &source)
                .replace("{out_dir}", &out_dir)
                .replace("{main}", vars.main)
        })
        .collect()
}

/// Non-empty output lines from both compiler streams, stdout first
fn collect_diagnostics(stdout: &[u8], stderr: &[u8]) -> Vec<String> {
    let stdout = String::from_utf8_lossy(stdout);
    let stderr = String::from_utf8_lossy(stderr);
    stdout
        .lines()
        .chain(stderr.lines())
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .map(str::to_string)
        .collect()
}

fn dir_prefix(owner: &str) -> String {
    let safe: String = owner
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("compiled_{}_", safe)
}

pub struct Compiler {
    toolchain: Toolchain,
    timeout: Duration,
    /// Parent of build directories; the system temp dir when unset
    build_root: Option<PathBuf>,
}

impl Compiler {
    pub fn new(toolchain: Toolchain, timeout: Duration) -> Self {
        Self {
            toolchain,
            timeout,
            build_root: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_build_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.build_root = Some(root.into());
        self
    }

    pub fn from_config(config: &Configuration) -> Self {
        Self::new(config.toolchain.clone(), config.compile_timeout)
    }

    /// Compile one submission into a fresh, submission-scoped build directory
    #[tracing::instrument(skip(self, submission), fields(owner = %submission.owner, task = %submission.task_id))]
    pub async fn compile(&self, submission: &Submission) -> Result<CompiledArtifact, CompileError> {
        let source = tokio::fs::canonicalize(&submission.source_path)
            .await
            .map_err(|e| CompileError::Source {
                path: submission.source_path.clone(),
                reason: e.to_string(),
            })?;
        tokio::fs::File::open(&source)
            .await
            .map_err(|e| CompileError::Source {
                path: source.clone(),
                reason: e.to_string(),
            })?;

        let prefix = dir_prefix(&submission.owner);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let build_dir = match &self.build_root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(CompileError::Workspace)?;
        debug!(build_dir = %build_dir.path().display(), "Created build directory");

        let main = submission.main_name();
        let vars = TemplateVars {
            source: &source,
            out_dir: build_dir.path(),
            main: &main,
        };

        let argv = expand_template(&self.toolchain.compile, &vars);
        let (program, args) = argv.split_first().ok_or_else(|| CompileError::Toolchain {
            program: String::new(),
            reason: "empty compile command".to_string(),
        })?;

        let start = Instant::now();
        let child = Command::new(program)
            .args(args)
            .current_dir(build_dir.path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CompileError::Toolchain {
                program: program.clone(),
                reason: e.to_string(),
            })?;

        // Dropping the wait future on timeout drops the child, which kills it
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                return Err(CompileError::Toolchain {
                    program: program.clone(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "Compilation timed out");
                return Err(CompileError::TimedOut(self.timeout));
            }
        };

        let compilation_time_ms = start.elapsed().as_millis() as u64;
        let mut diagnostics = collect_diagnostics(&output.stdout, &output.stderr);

        if !output.status.success() {
            if diagnostics.is_empty() {
                diagnostics.push(format!("compiler exited with {}", output.status));
            }
            warn!(
                compilation_time_ms,
                error_preview = diagnostics.first().map(String::as_str).unwrap_or(""),
                "Compilation failed"
            );
            return Err(CompileError::Rejected { diagnostics });
        }

        info!(compilation_time_ms, "Compilation succeeded");

        let command = expand_template(&self.toolchain.run, &vars);
        Ok(CompiledArtifact::new(
            submission.owner.clone(),
            command,
            diagnostics,
            build_dir,
        ))
    }
}
