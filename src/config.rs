//! Stomper repository configuration (`.stomper.toml`) and session settings.
//!
//! Defines the typed configuration for `.stomper.toml` — quality-tool and
//! agent commands, test-runner settings — and [`SessionConfig`], the
//! validated settings one fix session runs with. Missing file → all
//! defaults (no error).

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Upper bound on `max_parallel_files`.
pub const MAX_PARALLEL_FILES_LIMIT: u32 = 32;

// ---------------------------------------------------------------------------
// TestValidation
// ---------------------------------------------------------------------------

/// When and how tests are run to validate a fix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestValidation {
    /// Run the full test suite in the sandbox, per file.
    Full,
    /// Run tests selected by proximity to the changed file.
    #[default]
    Quick,
    /// Skip per-file tests; the driver runs the suite once after the session.
    Final,
    /// Never run tests.
    None,
}

impl TestValidation {
    /// Whether per-file test validation happens inside the sandbox.
    #[must_use]
    pub const fn runs_in_sandbox(self) -> bool {
        matches!(self, Self::Full | Self::Quick)
    }
}

impl fmt::Display for TestValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Quick => write!(f, "quick"),
            Self::Final => write!(f, "final"),
            Self::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for TestValidation {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "quick" => Ok(Self::Quick),
            "final" => Ok(Self::Final),
            "none" => Ok(Self::None),
            _ => Err(ConfigError {
                path: None,
                message: format!(
                    "invalid test_validation '{s}'. Use: full, quick, final, or none"
                ),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Validated settings for one fix session.
#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Names of the quality tools to run (must match configured tools).
    pub enabled_tools: Vec<String>,
    /// Root of the repository to fix.
    pub target_root: PathBuf,
    /// Concurrency bound on fix branches, in `[1, 32]`.
    pub max_parallel_files: u32,
    /// Per-file attempt budget.
    pub max_attempts_per_file: u32,
    /// Test validation mode.
    pub test_validation: TestValidation,
    /// Keep dispatching branches after a file fails.
    pub continue_on_error: bool,
    /// Isolate each branch in an ephemeral sandbox. When false, branches
    /// operate on the main workspace directly and the apply mutex is the
    /// only thing protecting it.
    pub use_sandbox: bool,
}

impl SessionConfig {
    /// Create a config with defaults for everything but the target root.
    #[must_use]
    pub fn new(target_root: PathBuf) -> Self {
        Self {
            enabled_tools: Vec::new(),
            target_root,
            max_parallel_files: default_max_parallel_files(),
            max_attempts_per_file: default_max_attempts(),
            test_validation: TestValidation::default(),
            continue_on_error: true,
            use_sandbox: true,
        }
    }

    /// Validate bounds.
    ///
    /// # Errors
    /// Returns an error when `max_parallel_files` is outside `[1, 32]` or
    /// `max_attempts_per_file` is zero.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_parallel_files < 1 || self.max_parallel_files > MAX_PARALLEL_FILES_LIMIT {
            return Err(ConfigError {
                path: None,
                message: format!(
                    "max_parallel_files must be between 1 and {MAX_PARALLEL_FILES_LIMIT}, got {}",
                    self.max_parallel_files
                ),
            });
        }
        if self.max_attempts_per_file == 0 {
            return Err(ConfigError {
                path: None,
                message: "max_attempts_per_file must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File-backed configuration
// ---------------------------------------------------------------------------

/// Top-level `.stomper.toml` configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StomperConfig {
    /// Session defaults.
    #[serde(default)]
    pub session: SessionSettings,

    /// Quality tools available to sessions.
    #[serde(default)]
    pub tools: Vec<ToolSettings>,

    /// Fixing-agent command.
    #[serde(default)]
    pub agent: AgentSettings,

    /// Test-runner command and quick-selection globs.
    #[serde(default)]
    pub tests: TestSettings,
}

/// `[session]` table.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSettings {
    /// Concurrency bound on fix branches (default: 4).
    #[serde(default = "default_max_parallel_files")]
    pub max_parallel_files: u32,

    /// Per-file attempt budget (default: 3).
    #[serde(default = "default_max_attempts")]
    pub max_attempts_per_file: u32,

    /// Test validation mode (default: `"quick"`).
    #[serde(default)]
    pub test_validation: TestValidation,

    /// Keep going after a file fails (default: true).
    #[serde(default = "default_true")]
    pub continue_on_error: bool,

    /// Isolate branches in sandboxes (default: true).
    #[serde(default = "default_true")]
    pub use_sandbox: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_parallel_files: default_max_parallel_files(),
            max_attempts_per_file: default_max_attempts(),
            test_validation: TestValidation::default(),
            continue_on_error: true,
            use_sandbox: true,
        }
    }
}

/// One `[[tools]]` entry.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolSettings {
    /// Tool name, referenced by `enabled_tools`.
    pub name: String,
    /// Command argv; the target path is appended on invocation.
    pub command: Vec<String>,
}

/// `[agent]` table.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentSettings {
    /// Agent command argv; the prompt is piped to stdin.
    #[serde(default)]
    pub command: Vec<String>,

    /// Per-invocation timeout in seconds (default: 300).
    #[serde(default = "default_agent_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            timeout_secs: default_agent_timeout_secs(),
        }
    }
}

/// `[tests]` table.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TestSettings {
    /// Test-runner argv; selected test paths are appended in quick mode.
    #[serde(default)]
    pub command: Vec<String>,

    /// Glob patterns for quick-mode test selection. `{stem}` is replaced
    /// with the changed file's stem.
    #[serde(default = "default_quick_globs")]
    pub quick_globs: Vec<String>,
}

impl Default for TestSettings {
    fn default() -> Self {
        Self {
            command: Vec::new(),
            quick_globs: default_quick_globs(),
        }
    }
}

impl StomperConfig {
    /// Load config from `<root>/.stomper.toml`.
    ///
    /// Missing file → defaults. Parse failures are configuration errors.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let path = root.join(".stomper.toml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|e| ConfigError {
            path: Some(path.clone()),
            message: format!("failed to read: {e}"),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError {
            path: Some(path),
            message: e.to_string(),
        })
    }

    /// Look up a configured tool by name.
    #[must_use]
    pub fn tool(&self, name: &str) -> Option<&ToolSettings> {
        self.tools.iter().find(|t| t.name == name)
    }
}

fn default_max_parallel_files() -> u32 {
    4
}

fn default_max_attempts() -> u32 {
    3
}

const fn default_true() -> bool {
    true
}

const fn default_agent_timeout_secs() -> u64 {
    300
}

fn default_quick_globs() -> Vec<String> {
    vec![
        "tests/**/*{stem}*".to_owned(),
        "**/{stem}_test.*".to_owned(),
        "**/test_{stem}.*".to_owned(),
    ]
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// A configuration file could not be loaded, or a setting is out of bounds.
#[derive(Debug)]
pub struct ConfigError {
    /// Path to the configuration file, when the error came from one.
    pub path: Option<PathBuf>,
    /// Human-readable description of the problem.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) => write!(
                f,
                "configuration error in '{}': {}\n  To fix: edit the config file and correct the issue.",
                path.display(),
                self.message
            ),
            None => write!(f, "configuration error: {}", self.message),
        }
    }
}

impl std::error::Error for ConfigError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
