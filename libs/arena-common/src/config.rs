// Competition configuration: defaults, arena.json overlay, validation
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "config/arena.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(PathBuf),

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("root directory does not exist or is not a directory: {0}")]
    RootMissing(PathBuf),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Compile/run command templates for the single competition language.
///
/// Placeholders: `{source}`, `{out_dir}`, `{main}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Toolchain {
    pub source_extension: String,
    pub compile: Vec<String>,
    pub run: Vec<String>,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self {
            source_extension: ".java".to_string(),
            compile: ["javac", "-d", "{out_dir}", "{source}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            run: ["java", "-cp", "{out_dir}", "{main}"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// On-disk shape of `config/arena.json`. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub submissions_dir: String,
    pub reports_dir: String,
    pub execution_timeout_ms: u64,
    pub submission_timeout_ms: u64,
    pub compile_timeout_ms: u64,
    pub memory_limit_bytes: u64,
    /// Captured stdout beyond this size is judged wrong without comparing.
    pub max_output_bytes: u64,
    pub test_locations: Vec<String>,
    pub input_suffix: String,
    pub output_suffix: String,
    /// 0 means "use available parallelism".
    pub concurrency: u32,
    pub toolchain: Toolchain,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            submissions_dir: "submissions".to_string(),
            reports_dir: "reports".to_string(),
            execution_timeout_ms: 10_000,
            submission_timeout_ms: 120_000,
            compile_timeout_ms: 60_000,
            memory_limit_bytes: 64 * 1024 * 1024,
            max_output_bytes: 64 * 1024 * 1024,
            test_locations: ["tests", "test-data", "test_files", "."]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            input_suffix: ".in".to_string(),
            output_suffix: ".out".to_string(),
            concurrency: 0,
            toolchain: Toolchain::default(),
        }
    }
}

/// Immutable configuration handed to every pipeline component at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub root_dir: PathBuf,
    pub submissions_dir: PathBuf,
    pub reports_dir: PathBuf,
    pub execution_timeout: Duration,
    pub submission_timeout: Duration,
    pub compile_timeout: Duration,
    pub memory_limit_bytes: u64,
    pub max_output_bytes: u64,
    pub test_locations: Vec<PathBuf>,
    pub input_suffix: String,
    pub output_suffix: String,
    pub concurrency: usize,
    pub toolchain: Toolchain,
}

impl Configuration {
    /// Default configuration rooted at `root`.
    pub fn for_root(root: impl AsRef<Path>) -> Self {
        Self::from_settings(root, Settings::default())
    }

    /// Resolve settings against a root directory. Does not validate.
    pub fn from_settings(root: impl AsRef<Path>, settings: Settings) -> Self {
        let root = root.as_ref().to_path_buf();
        let test_locations = settings
            .test_locations
            .iter()
            .map(|location| {
                if location == "." {
                    root.clone()
                } else {
                    root.join(location)
                }
            })
            .collect();

        let concurrency = match settings.concurrency {
            0 => default_concurrency(),
            n => n as usize,
        };

        Self {
            submissions_dir: root.join(&settings.submissions_dir),
            reports_dir: root.join(&settings.reports_dir),
            root_dir: root,
            execution_timeout: Duration::from_millis(settings.execution_timeout_ms),
            submission_timeout: Duration::from_millis(settings.submission_timeout_ms),
            compile_timeout: Duration::from_millis(settings.compile_timeout_ms),
            memory_limit_bytes: settings.memory_limit_bytes,
            max_output_bytes: settings.max_output_bytes,
            test_locations,
            input_suffix: settings.input_suffix,
            output_suffix: settings.output_suffix,
            concurrency,
            toolchain: settings.toolchain,
        }
    }

    /// Load `config_path` if given (it must exist), otherwise `<root>/config/arena.json`
    /// when present, otherwise defaults. The result is validated.
    pub fn load(root: impl AsRef<Path>, config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let root = root.as_ref();
        let settings = match config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                read_settings(path)?
            }
            None => {
                let default_path = root.join(CONFIG_FILE);
                if default_path.exists() {
                    read_settings(&default_path)?
                } else {
                    Settings::default()
                }
            }
        };

        let config = Self::from_settings(root, settings);
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.root_dir.is_dir() {
            return Err(ConfigError::RootMissing(self.root_dir.clone()));
        }
        if self.execution_timeout.is_zero() {
            return Err(ConfigError::Invalid("execution timeout must be positive".into()));
        }
        if self.submission_timeout.is_zero() {
            return Err(ConfigError::Invalid("submission timeout must be positive".into()));
        }
        if self.compile_timeout.is_zero() {
            return Err(ConfigError::Invalid("compile timeout must be positive".into()));
        }
        if self.memory_limit_bytes == 0 {
            return Err(ConfigError::Invalid("memory limit must be positive".into()));
        }
        if self.max_output_bytes == 0 {
            return Err(ConfigError::Invalid("output limit must be positive".into()));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid("concurrency must be at least 1".into()));
        }
        if self.input_suffix.is_empty() || self.output_suffix.is_empty() {
            return Err(ConfigError::Invalid("test file suffixes must not be empty".into()));
        }
        if self.input_suffix == self.output_suffix {
            return Err(ConfigError::Invalid(format!(
                "input and output suffix are both '{}'",
                self.input_suffix
            )));
        }
        if self.toolchain.compile.is_empty() || self.toolchain.run.is_empty() {
            return Err(ConfigError::Invalid("toolchain compile and run commands must not be empty".into()));
        }
        Ok(())
    }

    /// Create the submissions and reports directories if they are missing.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        fs::create_dir_all(&self.submissions_dir)?;
        fs::create_dir_all(&self.reports_dir)?;
        Ok(())
    }

    pub fn with_execution_timeout(mut self, timeout: Duration) -> Self {
        self.execution_timeout = timeout;
        self
    }

    pub fn with_submission_timeout(mut self, timeout: Duration) -> Self {
        self.submission_timeout = timeout;
        self
    }

    pub fn with_memory_limit(mut self, bytes: u64) -> Self {
        self.memory_limit_bytes = bytes;
        self
    }

    pub fn with_max_output(mut self, bytes: u64) -> Self {
        self.max_output_bytes = bytes;
        self
    }

    pub fn with_test_locations(mut self, locations: Vec<PathBuf>) -> Self {
        self.test_locations = locations;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_toolchain(mut self, toolchain: Toolchain) -> Self {
        self.toolchain = toolchain;
        self
    }
}

impl fmt::Display for Configuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Root directory: {}", self.root_dir.display())?;
        writeln!(f, "Submissions directory: {}", self.submissions_dir.display())?;
        writeln!(f, "Reports directory: {}", self.reports_dir.display())?;
        writeln!(f, "Execution timeout: {} ms", self.execution_timeout.as_millis())?;
        writeln!(f, "Submission timeout: {} ms", self.submission_timeout.as_millis())?;
        writeln!(
            f,
            "Memory limit: {} bytes ({:.2} MB)",
            self.memory_limit_bytes,
            self.memory_limit_bytes as f64 / (1024.0 * 1024.0)
        )?;
        writeln!(f, "Output limit: {} bytes", self.max_output_bytes)?;
        let locations: Vec<String> = self
            .test_locations
            .iter()
            .map(|p| p.display().to_string())
            .collect();
        writeln!(f, "Test locations: {}", locations.join(", "))?;
        writeln!(f, "Test files: *{} -> *{}", self.input_suffix, self.output_suffix)?;
        writeln!(f, "Concurrency: {}", self.concurrency)?;
        write!(
            f,
            "Toolchain: compile `{}`, run `{}`",
            self.toolchain.compile.join(" "),
            self.toolchain.run.join(" ")
        )
    }
}

fn read_settings(path: &Path) -> Result<Settings, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
