//! Quality-tool capability.
//!
//! [`QualityTool`] is the seam between the orchestrator and whatever
//! produces findings (lint, type checker, test-quality checker). The
//! collector runs tools project-wide against the main workspace; the
//! verifier re-runs them file-scoped inside a sandbox. Tool invocations are
//! side-effect-free on the working tree.
//!
//! [`CommandTool`] is the stock adapter: it runs a configured command and
//! parses findings from stdout as JSON lines.

use std::fmt;
use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::model::finding::Finding;

// ---------------------------------------------------------------------------
// ToolScope
// ---------------------------------------------------------------------------

/// What a tool invocation should examine.
#[derive(Clone, Copy, Debug)]
pub enum ToolScope<'a> {
    /// The whole project under the working directory.
    Project,
    /// A single file, given relative to the working directory.
    File(&'a Path),
}

// ---------------------------------------------------------------------------
// ToolError
// ---------------------------------------------------------------------------

/// A quality tool crashed or produced unusable output.
#[derive(Debug)]
pub struct ToolError {
    /// Name of the tool.
    pub tool: String,
    /// What went wrong.
    pub message: String,
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "quality tool '{}' failed: {}", self.tool, self.message)
    }
}

impl std::error::Error for ToolError {}

// ---------------------------------------------------------------------------
// QualityTool
// ---------------------------------------------------------------------------

/// A source of structured findings.
///
/// Implementations must be safe to invoke concurrently from multiple
/// branches (each against its own working directory).
pub trait QualityTool: Send + Sync {
    /// The tool's name, used in `enabled_tools` and finding records.
    fn name(&self) -> &str;

    /// Run the tool in `workdir` with the given scope.
    ///
    /// File paths in the returned findings are relative to `workdir`.
    ///
    /// # Errors
    /// Returns an error when the tool cannot be run or its output is
    /// unusable; "findings exist" is not an error.
    fn run(&self, workdir: &Path, scope: ToolScope<'_>) -> Result<Vec<Finding>, ToolError>;
}

// ---------------------------------------------------------------------------
// CommandTool
// ---------------------------------------------------------------------------

/// Command-backed quality tool.
///
/// Runs `argv... <target>` with `workdir` as the current directory and
/// parses each stdout line as a JSON [`Finding`]. Malformed lines are
/// skipped (tools interleave human chatter with machine output). Lint tools
/// conventionally exit non-zero when findings exist, so the exit code alone
/// is not a failure; a non-zero exit with no parseable output is.
pub struct CommandTool {
    name: String,
    argv: Vec<String>,
}

impl CommandTool {
    /// Create a tool adapter from a name and command argv.
    #[must_use]
    pub const fn new(name: String, argv: Vec<String>) -> Self {
        Self { name, argv }
    }
}

impl QualityTool for CommandTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, workdir: &Path, scope: ToolScope<'_>) -> Result<Vec<Finding>, ToolError> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(ToolError {
                tool: self.name.clone(),
                message: "tool command is empty".to_owned(),
            });
        };

        let target = match scope {
            ToolScope::Project => Path::new("."),
            ToolScope::File(path) => path,
        };

        let output = Command::new(program)
            .args(args)
            .arg(target)
            .current_dir(workdir)
            .output()
            .map_err(|e| ToolError {
                tool: self.name.clone(),
                message: format!("failed to run '{program}': {e}"),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut findings = Vec::new();
        for line in stdout.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Finding>(line) {
                Ok(mut finding) => {
                    // Normalize absolute paths to workdir-relative.
                    if let Ok(rel) = finding.file_path.strip_prefix(workdir) {
                        finding.file_path = rel.to_path_buf();
                    }
                    if finding.tool.is_empty() {
                        finding.tool = self.name.clone();
                    }
                    findings.push(finding);
                }
                Err(e) => debug!(tool = %self.name, %line, error = %e, "skipping unparseable tool output line"),
            }
        }

        if findings.is_empty() && !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();
            if !stderr.is_empty() || stdout.trim().is_empty() {
                return Err(ToolError {
                    tool: self.name.clone(),
                    message: format!(
                        "exited with {} and produced no findings: {stderr}",
                        output
                            .status
                            .code()
                            .map_or_else(|| "signal".to_owned(), |c| c.to_string())
                    ),
                });
            }
        }

        Ok(findings)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
