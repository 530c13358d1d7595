// Persisted run summaries: file naming and on-disk format shared by the
// worker and the CLI.
use crate::types::RunSummary;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const RECORDS_PREFIX: &str = "records";

/// Deterministic file name for a run's records
pub fn records_file_name(run_id: &Uuid) -> String {
    format!("{}_{}.json", RECORDS_PREFIX, run_id)
}

/// Store a run summary as pretty JSON in `dir`, returning the file written
pub fn store_summary(dir: &Path, summary: &RunSummary) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create reports directory {}", dir.display()))?;

    let path = dir.join(records_file_name(&summary.run_id));
    let payload = serde_json::to_string_pretty(summary).context("Failed to serialize run summary")?;
    fs::write(&path, payload).with_context(|| format!("Failed to write {}", path.display()))?;

    tracing::debug!(path = %path.display(), records = summary.records.len(), "Run summary stored");
    Ok(path)
}

/// Load a previously stored run summary
pub fn load_summary(path: &Path) -> Result<RunSummary> {
    let payload = fs::read_to_string(path)
        .with_context(|| format!("Failed to read records file {}", path.display()))?;
    serde_json::from_str(&payload)
        .with_context(|| format!("Failed to parse records file {}", path.display()))
}
