// Submission discovery: recursive scan of the submissions directory for
// source files carrying a `/* USER: <owner> TASK: <task> */` header.

use arena_common::config::Configuration;
use arena_common::types::Submission;
use anyhow::Result;
use lazy_static::lazy_static;
use regex::Regex;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Only this many leading lines are searched for the header
const HEADER_SEARCH_LINES: usize = 10;

lazy_static! {
    static ref HEADER: Regex =
        Regex::new(r"/\*\s*USER:\s*(\w+)\s+TASK:\s*(\w+)\s*\*/").expect("header pattern compiles");
}

/// `(owner, task)` from the first header within the leading lines
pub fn parse_header<'a, I>(lines: I) -> Option<(String, String)>
where
    I: IntoIterator<Item = &'a str>,
{
    lines
        .into_iter()
        .take(HEADER_SEARCH_LINES)
        .find_map(|line| {
            let caps = HEADER.captures(line)?;
            Some((caps[1].to_string(), caps[2].to_string()))
        })
}

fn read_header(path: &Path) -> std::io::Result<Option<(String, String)>> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = Vec::with_capacity(HEADER_SEARCH_LINES);
    for line in reader.lines().take(HEADER_SEARCH_LINES) {
        lines.push(line?);
    }
    Ok(parse_header(lines.iter().map(String::as_str)))
}

/// All valid submissions under the configured submissions directory, by path
pub fn discover(config: &Configuration) -> Result<Vec<Submission>> {
    let dir = &config.submissions_dir;
    if !dir.is_dir() {
        anyhow::bail!("Submissions directory does not exist: {}", dir.display());
    }

    let extension = &config.toolchain.source_extension;
    let mut submissions = Vec::new();

    for entry in WalkDir::new(dir).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Unreadable entry - skipping");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_source = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(|name| name.ends_with(extension.as_str()))
            .unwrap_or(false);
        if !is_source {
            continue;
        }

        match read_header(path) {
            Ok(Some((owner, task_id))) => {
                debug!(owner = %owner, task = %task_id, path = %path.display(), "Found submission");
                submissions.push(Submission::new(owner, task_id, path));
            }
            Ok(None) => {
                warn!(path = %path.display(), "No valid USER/TASK header - skipping file");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable submission - skipping file");
            }
        }
    }

    info!(count = submissions.len(), dir = %dir.display(), "Discovered submissions");
    Ok(submissions)
}

/// Submissions for a single task
pub fn discover_for_task(config: &Configuration, task_id: &str) -> Result<Vec<Submission>> {
    Ok(discover(config)?
        .into_iter()
        .filter(|s| s.task_id == task_id)
        .collect())
}
