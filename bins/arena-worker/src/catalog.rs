use arena_common::config::Configuration;
use arena_common::types::TestCase;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Resolves input/expected-output pairs for a task from the search locations.
///
/// Resolution is recomputed on every call; nothing is cached across tasks.
/// It reads directories synchronously, so async callers run it on the
/// blocking pool.
#[derive(Debug, Clone)]
pub struct TestCatalog {
    input_suffix: String,
    output_suffix: String,
}

impl TestCatalog {
    pub fn new(input_suffix: impl Into<String>, output_suffix: impl Into<String>) -> Self {
        Self {
            input_suffix: input_suffix.into(),
            output_suffix: output_suffix.into(),
        }
    }

    pub fn from_config(config: &Configuration) -> Self {
        Self::new(config.input_suffix.clone(), config.output_suffix.clone())
    }

    /// Ordered test cases for `task_id`.
    ///
    /// Locations are searched in order and concatenated without deduplication;
    /// within a location, inputs are taken in file name order. An input without
    /// its expected output is skipped.
    pub fn resolve(&self, task_id: &str, locations: &[PathBuf]) -> Vec<TestCase> {
        let mut cases = Vec::new();
        for location in locations {
            cases.extend(self.resolve_in(task_id, location));
        }
        debug!(task = task_id, count = cases.len(), "Resolved test cases");
        cases
    }

    fn resolve_in(&self, task_id: &str, location: &Path) -> Vec<TestCase> {
        let entries = match fs::read_dir(location) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(location = %location.display(), error = %e, "Skipping test location");
                return Vec::new();
            }
        };

        let mut inputs: Vec<(String, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
            .filter_map(|entry| {
                let name = entry.file_name().to_str()?.to_string();
                (name.starts_with(task_id) && name.ends_with(&self.input_suffix))
                    .then(|| (name, entry.path()))
            })
            .collect();
        inputs.sort_by(|a, b| a.0.cmp(&b.0));

        let mut cases = Vec::with_capacity(inputs.len());
        for (file_name, input_path) in inputs {
            let stem = &file_name[..file_name.len() - self.input_suffix.len()];
            let expected_output_path = location.join(format!("{}{}", stem, self.output_suffix));

            if !expected_output_path.is_file() {
                warn!(
                    input = %input_path.display(),
                    expected = %expected_output_path.display(),
                    "Expected output missing - skipping test case"
                );
                continue;
            }

            cases.push(TestCase {
                name: stem.to_string(),
                input_path,
                expected_output_path,
            });
        }
        cases
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn touch(dir: &Path, name: &str) {
        fs::write(dir.join(name), "x").unwrap();
    }

    fn catalog() -> TestCatalog {
        TestCatalog::new(".in", ".out")
    }

    #[test]
    fn test_resolves_pairs_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "bankacc2.in");
        touch(dir.path(), "bankacc2.out");
        touch(dir.path(), "bankacc1.in");
        touch(dir.path(), "bankacc1.out");
        touch(dir.path(), "other1.in");
        touch(dir.path(), "other1.out");

        let cases = catalog().resolve("bankacc", &[dir.path().to_path_buf()]);
        let names: Vec<&str> = cases.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["bankacc1", "bankacc2"]);
        assert_eq!(cases[0].expected_output_path, dir.path().join("bankacc1.out"));
    }

    #[test]
    fn test_missing_expected_output_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "t1.in");
        touch(dir.path(), "t2.in");
        touch(dir.path(), "t2.out");

        let cases = catalog().resolve("t", &[dir.path().to_path_buf()]);
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].name, "t2");
    }

    #[test]
    fn test_suffix_substitution_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        // A global replace would look for "t.out.out"
        touch(dir.path(), "t.in.in");
        touch(dir.path(), "t.in.out");

        let cases = catalog().resolve("t", &[dir.path().to_path_buf()]);
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].expected_output_path, dir.path().join("t.in.out"));
    }

    #[test]
    fn test_locations_concatenate_without_dedup() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        for dir in [&first, &second] {
            touch(dir.path(), "sum1.in");
            touch(dir.path(), "sum1.out");
        }
        touch(second.path(), "sum0.in");
        touch(second.path(), "sum0.out");

        let cases = catalog().resolve(
            "sum",
            &[first.path().to_path_buf(), second.path().to_path_buf()],
        );
        assert_eq!(cases.len(), 3);
        assert!(cases[0].input_path.starts_with(first.path()));
        assert_eq!(cases[1].name, "sum0");
        assert_eq!(cases[2].name, "sum1");
    }

    #[test]
    fn test_missing_location_and_no_matches_yield_empty() {
        let dir = tempfile::tempdir().unwrap();
        touch(dir.path(), "x1.in");
        let cases = catalog().resolve(
            "bankacc",
            &[dir.path().join("does-not-exist"), dir.path().to_path_buf()],
        );
        assert!(cases.is_empty());
    }

    #[test]
    fn test_directories_are_ignored() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("t1.in")).unwrap();
        touch(dir.path(), "t1.out");
        assert!(catalog().resolve("t", &[dir.path().to_path_buf()]).is_empty());
    }
}
