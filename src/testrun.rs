//! Test-runner capability.
//!
//! Runs the project's tests inside a sandbox to validate a fix. The quick
//! mode narrows the run to tests near the changed file via glob patterns;
//! when nothing matches, it falls back to the full suite rather than
//! skipping validation silently.

use std::fmt;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::config::TestValidation;

/// How much captured output to keep in failure details.
const OUTPUT_TAIL: usize = 2000;

// ---------------------------------------------------------------------------
// TestOutcome / TestRunError
// ---------------------------------------------------------------------------

/// Result of a validation test run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TestOutcome {
    /// Tests passed (or validation was skipped for this mode).
    Passed,
    /// Tests failed.
    Failed {
        /// Tail of the runner's output, for retry feedback.
        detail: String,
    },
}

/// The test runner itself could not run.
#[derive(Debug)]
pub struct TestRunError {
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for TestRunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "test runner failed: {}", self.message)
    }
}

impl std::error::Error for TestRunError {}

// ---------------------------------------------------------------------------
// TestRunner
// ---------------------------------------------------------------------------

/// Runs validation tests in a working directory.
pub trait TestRunner: Send + Sync {
    /// Run tests appropriate for `mode` after a change to `changed_file`.
    ///
    /// # Errors
    /// Returns an error when the runner cannot execute at all; test
    /// failures are reported through [`TestOutcome::Failed`].
    fn run(
        &self,
        workdir: &Path,
        changed_file: &Path,
        mode: TestValidation,
    ) -> Result<TestOutcome, TestRunError>;
}

// ---------------------------------------------------------------------------
// CommandTestRunner
// ---------------------------------------------------------------------------

/// Command-backed test runner.
///
/// `full` runs the configured argv as-is. `quick` appends test files whose
/// names share the changed file's stem, selected by glob patterns with
/// `{stem}` substituted; an empty selection falls back to the full suite.
pub struct CommandTestRunner {
    argv: Vec<String>,
    quick_globs: Vec<String>,
}

impl CommandTestRunner {
    /// Create a runner from a command argv and quick-selection patterns.
    #[must_use]
    pub const fn new(argv: Vec<String>, quick_globs: Vec<String>) -> Self {
        Self { argv, quick_globs }
    }

    /// Test files near `changed_file`, relative to `workdir`.
    fn quick_selection(&self, workdir: &Path, changed_file: &Path) -> Vec<String> {
        let stem = changed_file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if stem.is_empty() {
            return Vec::new();
        }

        let mut selected = Vec::new();
        for pattern in &self.quick_globs {
            let pattern = pattern.replace("{stem}", &stem);
            let absolute = workdir.join(&pattern);
            let Ok(paths) = glob::glob(&absolute.to_string_lossy()) else {
                debug!(%pattern, "invalid quick-test glob, skipping");
                continue;
            };
            for path in paths.flatten() {
                if let Ok(rel) = path.strip_prefix(workdir) {
                    let rel = rel.to_string_lossy().into_owned();
                    if !selected.contains(&rel) {
                        selected.push(rel);
                    }
                }
            }
        }
        selected.sort();
        selected
    }
}

impl TestRunner for CommandTestRunner {
    fn run(
        &self,
        workdir: &Path,
        changed_file: &Path,
        mode: TestValidation,
    ) -> Result<TestOutcome, TestRunError> {
        if !mode.runs_in_sandbox() {
            return Ok(TestOutcome::Passed);
        }

        let Some((program, args)) = self.argv.split_first() else {
            // No test command configured: nothing to validate with.
            return Ok(TestOutcome::Passed);
        };

        let mut command = Command::new(program);
        command.args(args).current_dir(workdir);

        if mode == TestValidation::Quick {
            let selection = self.quick_selection(workdir, changed_file);
            debug!(selected = selection.len(), "quick test selection");
            command.args(&selection);
        }

        let output = command.output().map_err(|e| TestRunError {
            message: format!("failed to run '{program}': {e}"),
        })?;

        if output.status.success() {
            Ok(TestOutcome::Passed)
        } else {
            let mut detail = String::from_utf8_lossy(&output.stdout).into_owned();
            detail.push_str(&String::from_utf8_lossy(&output.stderr));
            Ok(TestOutcome::Failed {
                detail: tail(detail.trim(), OUTPUT_TAIL).to_owned(),
            })
        }
    }
}

/// Last `max` bytes of `s`, rounded forward to a character boundary.
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
