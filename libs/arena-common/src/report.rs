/// Report rendering - pure consumer of evaluation records.
///
/// Produces the human-readable run report and the CSV leaderboard.
/// Ordering used everywhere: passed records first, then by representative
/// time ascending, then by owner.

use crate::types::{Classification, EvaluationRecord};
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

const LEADERBOARD_HEADER: &str =
    "Rank,Username,Task,Execution Time (ns),Memory Usage (KB),Compilation Success";

/// Records in ranking order
pub fn ranked(records: &[EvaluationRecord]) -> Vec<&EvaluationRecord> {
    let mut sorted: Vec<&EvaluationRecord> = records.iter().collect();
    sorted.sort_by(|a, b| {
        b.is_passed()
            .cmp(&a.is_passed())
            .then(a.representative_time_nanos.cmp(&b.representative_time_nanos))
            .then_with(|| a.submission.owner.cmp(&b.submission.owner))
            .then_with(|| a.submission.task_id.cmp(&b.submission.task_id))
    });
    sorted
}

/// Human-readable duration for nanosecond timings
pub fn format_duration(nanos: u64) -> String {
    if nanos < 1_000 {
        format!("{} ns", nanos)
    } else if nanos < 1_000_000 {
        format!("{:.2} μs", nanos as f64 / 1_000.0)
    } else if nanos < 1_000_000_000 {
        format!("{:.2} ms", nanos as f64 / 1_000_000.0)
    } else {
        format!("{:.2} s", nanos as f64 / 1_000_000_000.0)
    }
}

/// Human-readable byte count
pub fn format_memory(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes < KB {
        format!("{} B", bytes)
    } else if bytes < MB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    }
}

fn count(records: &[EvaluationRecord], pred: impl Fn(&Classification) -> bool) -> usize {
    records.iter().filter(|r| pred(&r.classification)).count()
}

/// Render the full text report
pub fn render_text(records: &[EvaluationRecord], generated_at: DateTime<Local>) -> String {
    TextReport { records, generated_at }.to_string()
}

/// Render the CSV leaderboard. Only passed records are ranked.
pub fn render_leaderboard_csv(records: &[EvaluationRecord]) -> String {
    Leaderboard { records }.to_string()
}

struct TextReport<'a> {
    records: &'a [EvaluationRecord],
    generated_at: DateTime<Local>,
}

impl TextReport<'_> {
    fn write_summary(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let records = self.records;
        writeln!(f, "SUMMARY STATISTICS")?;
        writeln!(f, "{}", "-".repeat(40))?;
        writeln!(f, "Total submissions: {}", records.len())?;
        writeln!(f, "Successful: {}", count(records, |c| c.is_passed()))?;
        writeln!(f, "Failed: {}", count(records, |c| matches!(c, Classification::Failed(_))))?;
        writeln!(
            f,
            "Compilation errors: {}",
            count(records, |c| matches!(c, Classification::CompileError))
        )?;
        writeln!(
            f,
            "Runtime errors: {}",
            count(records, |c| matches!(c, Classification::RuntimeError))
        )?;
        writeln!(f, "Timeouts: {}", count(records, |c| matches!(c, Classification::TimedOut)))?;
        writeln!(f)
    }

    fn write_performance(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let passed: Vec<&EvaluationRecord> = self.records.iter().filter(|r| r.is_passed()).collect();
        if passed.is_empty() {
            return Ok(());
        }
        let n = passed.len() as f64;
        let avg_time = passed.iter().map(|r| r.representative_time_nanos as f64).sum::<f64>() / n;
        let avg_memory = passed.iter().map(|r| r.peak_memory_bytes as f64).sum::<f64>() / n;

        writeln!(f, "PERFORMANCE STATISTICS (Successful Submissions Only)")?;
        writeln!(f, "{}", "-".repeat(50))?;
        writeln!(
            f,
            "Average execution time: {:.2} ms ({:.0} ns)",
            avg_time / 1_000_000.0,
            avg_time
        )?;
        writeln!(f, "Average memory usage: {:.2} KB", avg_memory / 1024.0)?;
        writeln!(f)
    }

    fn write_details(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "DETAILED RESULTS")?;
        writeln!(f, "{}", "-".repeat(40))?;
        writeln!(
            f,
            "{:<20} | {:<10} | {:<36} | {:<10} | {:<10} | {:<8}",
            "User", "Task", "Result", "Time", "Memory", "Compiled"
        )?;
        for record in ranked(self.records) {
            let time = if record.representative_time_nanos == 0 {
                "N/A".to_string()
            } else {
                format_duration(record.representative_time_nanos)
            };
            let memory = if record.peak_memory_bytes == 0 {
                "N/A".to_string()
            } else {
                format_memory(record.peak_memory_bytes)
            };
            writeln!(
                f,
                "{:<20} | {:<10} | {:<36} | {:<10} | {:<10} | {:<8}",
                record.submission.owner,
                record.submission.task_id,
                record.classification.to_string(),
                time,
                memory,
                if record.compiled { "YES" } else { "NO" }
            )?;
            if let Some(first) = record.diagnostics.first() {
                writeln!(f, "    {}", first.lines().next().unwrap_or(""))?;
            }
        }
        writeln!(f)
    }
}

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(80);
        writeln!(f, "{}", rule)?;
        writeln!(f, "SUBMISSION TEST REPORT")?;
        writeln!(f, "Generated: {}", self.generated_at.format("%Y-%m-%d %H:%M:%S"))?;
        writeln!(f, "{}", rule)?;
        writeln!(f)?;

        self.write_summary(f)?;
        self.write_performance(f)?;
        self.write_details(f)?;

        writeln!(f, "LEGEND")?;
        writeln!(f, "{}", "-".repeat(20))?;
        writeln!(f, "Time: mean wall-clock time over passed test cases")?;
        writeln!(f, "Memory: peak resident memory observed over passed test cases")?;
        writeln!(f, "Compiled: Whether compilation was successful")
    }
}

struct Leaderboard<'a> {
    records: &'a [EvaluationRecord],
}

impl fmt::Display for Leaderboard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", LEADERBOARD_HEADER)?;
        for (idx, record) in ranked(self.records).into_iter().filter(|r| r.is_passed()).enumerate() {
            writeln!(
                f,
                "{},{},{},{},{:.2},{}",
                idx + 1,
                record.submission.owner,
                record.submission.task_id,
                record.representative_time_nanos,
                record.peak_memory_bytes as f64 / 1024.0,
                if record.compiled { "YES" } else { "NO" }
            )?;
        }
        Ok(())
    }
}

/// Files written by [`write_reports`]
#[derive(Debug, Clone)]
pub struct ReportFiles {
    pub report: PathBuf,
    pub leaderboard: Option<PathBuf>,
}

/// Write the text report and, when anything passed, the CSV leaderboard
pub fn write_reports(
    dir: &Path,
    records: &[EvaluationRecord],
    generated_at: DateTime<Local>,
) -> Result<ReportFiles> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create reports directory {}", dir.display()))?;

    let stamp = generated_at.format("%Y%m%d_%H%M%S");

    let report = dir.join(format!("submission_report_{}.txt", stamp));
    fs::write(&report, render_text(records, generated_at))
        .with_context(|| format!("Failed to write {}", report.display()))?;

    let leaderboard = if records.iter().any(|r| r.is_passed()) {
        let path = dir.join(format!("leaderboard_{}.csv", stamp));
        fs::write(&path, render_leaderboard_csv(records))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Some(path)
    } else {
        tracing::warn!("No successful submissions to include in leaderboard");
        None
    };

    Ok(ReportFiles { report, leaderboard })
}
