//! Structured quality-tool diagnostics.
//!
//! A [`Finding`] is one machine-readable diagnostic reported by a quality
//! tool (lint, type checker, test-quality checker). Findings are immutable:
//! the collector produces them and the per-file pipeline only reads them.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Severity
// ---------------------------------------------------------------------------

/// Severity of a finding, as reported by the tool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational; tools rarely emit these for fixable findings.
    Info,
    /// A warning-level finding.
    Warning,
    /// An error-level finding.
    #[default]
    Error,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
        }
    }
}

// ---------------------------------------------------------------------------
// Finding
// ---------------------------------------------------------------------------

/// One diagnostic from a quality tool.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Name of the tool that produced this finding (e.g. `"ruff"`).
    pub tool: String,
    /// The tool's diagnostic code (e.g. `"E501"`, `"no-untyped-def"`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Path of the offending file, relative to the session target root.
    #[serde(rename = "file")]
    pub file_path: PathBuf,
    /// 1-based line number, if the tool reported one.
    pub line: Option<u32>,
    /// 1-based column number, if the tool reported one.
    pub column: Option<u32>,
    /// Severity as reported by the tool.
    #[serde(default)]
    pub severity: Severity,
    /// Whether the tool advertises an automatic fix for this finding.
    #[serde(default)]
    pub auto_fixable: bool,
}

impl Finding {
    /// Render the finding as a single prompt-friendly line.
    ///
    /// Format: `tool code at line:col — message`. Missing positions render
    /// as `?`.
    #[must_use]
    pub fn summary(&self) -> String {
        let line = self
            .line
            .map_or_else(|| "?".to_owned(), |l| l.to_string());
        let column = self
            .column
            .map_or_else(|| "?".to_owned(), |c| c.to_string());
        format!(
            "{} {} at {}:{} - {}",
            self.tool, self.code, line, column, self.message
        )
    }
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.file_path.display(), self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Finding {
        Finding {
            tool: "ruff".to_owned(),
            code: "E501".to_owned(),
            message: "line too long".to_owned(),
            file_path: PathBuf::from("src/app.py"),
            line: Some(12),
            column: Some(89),
            severity: Severity::Error,
            auto_fixable: true,
        }
    }

    #[test]
    fn summary_includes_tool_code_and_position() {
        let s = sample().summary();
        assert!(s.contains("ruff"));
        assert!(s.contains("E501"));
        assert!(s.contains("12:89"));
        assert!(s.contains("line too long"));
    }

    #[test]
    fn summary_renders_missing_position_as_question_mark() {
        let mut f = sample();
        f.line = None;
        f.column = None;
        assert!(f.summary().contains("?:?"));
    }

    #[test]
    fn display_prefixes_file_path() {
        let rendered = format!("{}", sample());
        assert!(rendered.starts_with("src/app.py:"));
    }

    #[test]
    fn severity_ordering_puts_error_last() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn finding_deserializes_with_defaults() {
        let json = r#"{
            "tool": "mypy",
            "code": "arg-type",
            "message": "bad argument",
            "file": "src/app.py",
            "line": 3,
            "column": null
        }"#;
        let f: Finding = serde_json::from_str(json).unwrap();
        assert_eq!(f.severity, Severity::Error);
        assert!(!f.auto_fixable);
        assert_eq!(f.line, Some(3));
        assert_eq!(f.column, None);
    }
}
