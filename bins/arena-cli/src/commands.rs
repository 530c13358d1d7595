// CLI commands for managing a competition root
use anyhow::{bail, Context, Result};
use arena_common::config::{Configuration, Settings, CONFIG_FILE};
use arena_common::records;
use arena_common::report;
use std::fs;
use std::path::{Path, PathBuf};

/// Sample task shipped with a fresh competition root
const SAMPLE_TASK_INPUT: &str = "8\nd 6 1000\nq 4\nd 4 500\nq 4\nw 4 750\nw 6 200\nq 6\nq 4\n";
const SAMPLE_TASK_OUTPUT: &str = "s\n0\ns\n500\nf\ns\n800\n500\n";

/// Initialize a new competition root
pub fn init_project(path: &str) -> Result<()> {
    println!("🚀 Initializing competition root at: {}", path);

    let project_path = Path::new(path);

    // Create directories
    let dirs = ["config", "submissions", "tests", "reports"];

    for dir in &dirs {
        let dir_path = project_path.join(dir);
        fs::create_dir_all(&dir_path)
            .with_context(|| format!("Failed to create directory: {}", dir))?;
        println!("  ✅ Created: {}", dir);
    }

    // Create default arena.json
    let config_path = project_path.join(CONFIG_FILE);
    if !config_path.exists() {
        let json_content = serde_json::to_string_pretty(&Settings::default())
            .context("Failed to serialize default settings")?;
        fs::write(&config_path, json_content)
            .with_context(|| format!("Failed to write {}", config_path.display()))?;
        println!("  ✅ Created: {}", CONFIG_FILE);
    }

    // Sample test pair
    let sample_input = project_path.join("tests/bankacc1.in");
    let sample_output = project_path.join("tests/bankacc1.out");
    if !sample_input.exists() && !sample_output.exists() {
        fs::write(&sample_input, SAMPLE_TASK_INPUT)?;
        fs::write(&sample_output, SAMPLE_TASK_OUTPUT)?;
        println!("  ✅ Created: tests/bankacc1.in, tests/bankacc1.out");
    }

    println!("✅ Competition root initialized successfully!");
    println!("\n📋 Next steps:");
    println!("  1. Drop submissions into submissions/ with a header: /* USER: <name> TASK: <task> */");
    println!("  2. Add test pairs as tests/<task><n>.in and tests/<task><n>.out");
    println!("  3. Run: arena-worker {}", path);

    Ok(())
}

/// Re-render the text report and leaderboard from a persisted run
///
/// Returns the files written.
pub fn render_report(records_path: &Path, out_dir: Option<&Path>) -> Result<Vec<PathBuf>> {
    let summary = records::load_summary(records_path)?;
    println!(
        "📄 Run {} ({} records, finished {})",
        summary.run_id,
        summary.records.len(),
        summary.finished_at.format("%Y-%m-%d %H:%M:%S")
    );

    let out_dir = match out_dir {
        Some(dir) => dir.to_path_buf(),
        None => match records_path.parent() {
            Some(parent) => parent.to_path_buf(),
            None => bail!("Cannot determine output directory for {}", records_path.display()),
        },
    };

    let generated_at = summary.finished_at.with_timezone(&chrono::Local);
    let files = report::write_reports(&out_dir, &summary.records, generated_at)?;

    let mut written = vec![files.report];
    println!("  ✅ Report: {}", written[0].display());
    if let Some(leaderboard) = files.leaderboard {
        println!("  ✅ Leaderboard: {}", leaderboard.display());
        written.push(leaderboard);
    } else {
        println!("  ⚠️  No successful submissions - leaderboard skipped");
    }

    Ok(written)
}

/// Print the effective, validated configuration for a root
pub fn show_config(root: &str, config_path: Option<&Path>) -> Result<Configuration> {
    let config = Configuration::load(root, config_path)
        .with_context(|| format!("Invalid configuration for root {}", root))?;
    println!("⚙️  Effective configuration");
    println!("{}", config);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_common::types::{Classification, EvaluationRecord, RunSummary, Submission};

    #[test]
    fn test_init_project_scaffolds_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_str().unwrap();
        init_project(root).unwrap();

        for sub in ["config", "submissions", "tests", "reports"] {
            assert!(dir.path().join(sub).is_dir(), "{} missing", sub);
        }
        assert!(dir.path().join("tests/bankacc1.in").is_file());

        // The written defaults load and validate
        let config = show_config(root, None).unwrap();
        assert_eq!(config.memory_limit_bytes, 64 * 1024 * 1024);
    }

    #[test]
    fn test_init_project_keeps_existing_config() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("config")).unwrap();
        fs::write(dir.path().join(CONFIG_FILE), r#"{ "concurrency": 3 }"#).unwrap();

        init_project(dir.path().to_str().unwrap()).unwrap();

        let content = fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(content, r#"{ "concurrency": 3 }"#);
    }

    #[test]
    fn test_render_report_from_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut passed = EvaluationRecord::terminal(
            Submission::new("alice", "bankacc", "/subs/alice.java"),
            true,
            Classification::Passed,
        );
        passed.representative_time_nanos = 1_000;
        let summary = RunSummary::new(chrono::Utc::now(), vec![passed]);
        let records_path = records::store_summary(dir.path(), &summary).unwrap();

        let out = dir.path().join("rendered");
        let written = render_report(&records_path, Some(&out)).unwrap();
        assert_eq!(written.len(), 2);
        assert!(written.iter().all(|p| p.starts_with(&out) && p.exists()));
    }

    #[test]
    fn test_show_config_rejects_missing_root() {
        assert!(show_config("/definitely/not/a/root", None).is_err());
    }
}
