//! Error types for fix sessions.
//!
//! Defines [`FailureReason`], the per-file failure classification recorded in
//! session results, and [`SessionError`], the unified error type for
//! session-level operations. Branch failures never propagate as errors — they
//! are classified at the branch boundary and folded into the session
//! aggregates; `SessionError` covers only faults that prevent a session from
//! running at all (bad configuration, unusable repository).

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::model::types::ValidationError;
use crate::vcs::GitError;

// ---------------------------------------------------------------------------
// FailureReason
// ---------------------------------------------------------------------------

/// Why a per-file fix branch failed.
///
/// One of these is recorded for every file that ends up in `failed_fixes`.
/// The wording of `Display` is what users see in reports, so each variant
/// reads as a short diagnosis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// The file disappeared between error collection and branch start.
    FileMissing,

    /// The sandbox could not be created.
    SandboxFailed {
        /// What the sandbox backend reported.
        detail: String,
    },

    /// The agent errored or timed out on its final attempt.
    AgentUnableToFix {
        /// What the agent reported on the last attempt.
        detail: String,
    },

    /// Verification never saw a strict improvement within the retry budget.
    NoProgress,

    /// The test run inside the sandbox failed on the final attempt.
    TestsRegressed,

    /// The agent produced no textual change and findings remain.
    NoChange,

    /// The extracted patch no longer applies to the main workspace.
    PatchConflict,

    /// The branch panicked or hit an unclassified internal fault.
    Internal {
        /// Short description of the fault.
        detail: String,
    },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FileMissing => write!(f, "file missing"),
            Self::SandboxFailed { detail } => write!(f, "sandbox creation failed: {detail}"),
            Self::AgentUnableToFix { detail } => write!(f, "agent unable to fix: {detail}"),
            Self::NoProgress => write!(f, "no progress"),
            Self::TestsRegressed => write!(f, "tests regressed"),
            Self::NoChange => write!(f, "agent produced no change"),
            Self::PatchConflict => write!(f, "patch no longer applies"),
            Self::Internal { detail } => write!(f, "internal error: {detail}"),
        }
    }
}

// ---------------------------------------------------------------------------
// SessionError
// ---------------------------------------------------------------------------

/// Unified error type for session-level failures.
///
/// Each variant carries enough context to act on without digging through
/// logs: the failed command, the offending path, or the rejected value.
#[derive(Debug)]
pub enum SessionError {
    /// The target root is not usable (missing, or not a git repository).
    InvalidTarget {
        /// The path that was rejected.
        path: PathBuf,
        /// Why it was rejected.
        reason: String,
    },

    /// A git operation against the main workspace failed.
    Git(GitError),

    /// The session configuration is invalid.
    Config(ConfigError),

    /// An identifier failed validation.
    Validation(ValidationError),

    /// The branch scheduler could not be constructed.
    Scheduler {
        /// What the scheduling substrate reported.
        detail: String,
    },

    /// An I/O error occurred during session setup or cleanup.
    Io(std::io::Error),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTarget { path, reason } => {
                write!(
                    f,
                    "target root '{}' is not usable: {reason}\n  To fix: point stomper at the root of a git repository.",
                    path.display()
                )
            }
            Self::Git(e) => write!(f, "{e}"),
            Self::Config(e) => write!(f, "{e}"),
            Self::Validation(e) => write!(f, "{e}"),
            Self::Scheduler { detail } => {
                write!(f, "failed to start the branch scheduler: {detail}")
            }
            Self::Io(e) => {
                write!(
                    f,
                    "I/O error: {e}\n  To fix: check file permissions and disk space."
                )
            }
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Git(e) => Some(e),
            Self::Config(e) => Some(e),
            Self::Validation(e) => Some(e),
            Self::Io(e) => Some(e),
            Self::InvalidTarget { .. } | Self::Scheduler { .. } => None,
        }
    }
}

impl From<GitError> for SessionError {
    fn from(e: GitError) -> Self {
        Self::Git(e)
    }
}

impl From<ConfigError> for SessionError {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<ValidationError> for SessionError {
    fn from(e: ValidationError) -> Self {
        Self::Validation(e)
    }
}

impl From<std::io::Error> for SessionError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
