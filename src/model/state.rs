//! Session and branch state records.
//!
//! The orchestrator's state model: per-file work items produced by the
//! collector, per-branch outcomes produced by the file processor, and the
//! merge-reduced session aggregates the aggregator observes once every
//! branch has terminated.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::FailureReason;
use crate::model::finding::Finding;
use crate::model::types::{Revision, SessionId};

// ---------------------------------------------------------------------------
// FileWorkItem
// ---------------------------------------------------------------------------

/// One file with findings, queued for a fix branch.
///
/// Created by the error collector; mutated only by the branch that owns it
/// (attempt counter and feedback accumulate across retries).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileWorkItem {
    /// Path of the file, relative to the session target root.
    pub file_path: PathBuf,
    /// Findings reported against this file, in tool order.
    pub findings: Vec<Finding>,
    /// How many fix attempts have been started.
    pub attempts_used: u32,
    /// Attempt budget for this file.
    pub max_attempts: u32,
    /// Feedback from the previous attempt, used to augment the next prompt.
    pub last_feedback: Option<String>,
}

impl FileWorkItem {
    /// Create a work item with a fresh attempt budget.
    #[must_use]
    pub const fn new(file_path: PathBuf, findings: Vec<Finding>, max_attempts: u32) -> Self {
        Self {
            file_path,
            findings,
            attempts_used: 0,
            max_attempts,
            last_feedback: None,
        }
    }

    /// Whether another attempt may be started.
    #[must_use]
    pub const fn attempts_remaining(&self) -> bool {
        self.attempts_used < self.max_attempts
    }

    /// The file stem used in sandbox ids (file name without extension).
    #[must_use]
    pub fn file_stem(&self) -> String {
        self.file_path
            .file_stem()
            .map_or_else(|| "file".to_owned(), |s| s.to_string_lossy().into_owned())
    }
}

// ---------------------------------------------------------------------------
// Branch outcomes
// ---------------------------------------------------------------------------

/// A successful fix recorded for one file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixRecord {
    /// Path of the fixed file, relative to the target root.
    pub file_path: PathBuf,
    /// How many of the original findings were resolved.
    pub errors_fixed: u32,
    /// Attempts consumed, including the successful one.
    pub attempts_used: u32,
    /// The commit created on the main workspace.
    ///
    /// `None` when the findings vanished without a textual diff (tool-side
    /// auto-fix), in which case no commit exists for this file.
    pub revision: Option<Revision>,
}

/// A failed fix recorded for one file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    /// Path of the file, relative to the target root.
    pub file_path: PathBuf,
    /// Classified failure reason.
    pub reason: FailureReason,
    /// Attempts consumed before giving up.
    pub attempts_used: u32,
}

/// Terminal state of one fix branch.
///
/// Every dispatched branch resolves to exactly one of these; the scheduler
/// folds them into [`SessionAggregates`] after all branches terminate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BranchOutcome {
    /// The file was fixed (and committed, unless the fix was diff-free).
    Fixed(FixRecord),
    /// The file could not be fixed.
    Failed(FailureRecord),
    /// The branch was never started (halt or cancellation before dispatch).
    Skipped {
        /// Path of the file whose branch was skipped.
        file_path: PathBuf,
    },
}

impl BranchOutcome {
    /// The file this outcome belongs to.
    #[must_use]
    pub fn file_path(&self) -> &PathBuf {
        match self {
            Self::Fixed(r) => &r.file_path,
            Self::Failed(r) => &r.file_path,
            Self::Skipped { file_path } => file_path,
        }
    }
}

// ---------------------------------------------------------------------------
// SessionAggregates
// ---------------------------------------------------------------------------

/// The merge-reduced aggregate fields of the session state.
///
/// Reducers: concatenation for the two lists, sum for the counter. Both are
/// associative, and commutative up to element order, so branch partial
/// results can be folded in any completion order.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionAggregates {
    /// Files fixed this session, in branch completion order.
    pub successful_fixes: Vec<FixRecord>,
    /// Files that failed this session, in branch completion order.
    pub failed_fixes: Vec<FailureRecord>,
    /// Total findings resolved across all successful fixes.
    pub total_errors_fixed: u64,
}

impl SessionAggregates {
    /// Fold one branch outcome into the aggregates.
    pub fn absorb(&mut self, outcome: BranchOutcome) {
        match outcome {
            BranchOutcome::Fixed(record) => {
                self.total_errors_fixed += u64::from(record.errors_fixed);
                self.successful_fixes.push(record);
            }
            BranchOutcome::Failed(record) => self.failed_fixes.push(record),
            BranchOutcome::Skipped { .. } => {}
        }
    }

    /// Merge two partial aggregates.
    ///
    /// Associative; commutative up to element order within the lists.
    #[must_use]
    pub fn merge(mut self, other: Self) -> Self {
        self.successful_fixes.extend(other.successful_fixes);
        self.failed_fixes.extend(other.failed_fixes);
        self.total_errors_fixed += other.total_errors_fixed;
        self
    }

    /// Count invariant check: a file resolves at most once.
    ///
    /// Returns `true` when `|successful| + |failed| ≤ total_files`.
    #[must_use]
    pub fn within_bounds(&self, total_files: usize) -> bool {
        self.successful_fixes.len() + self.failed_fixes.len() <= total_files
    }
}

// ---------------------------------------------------------------------------
// SessionResult
// ---------------------------------------------------------------------------

/// Final report of one fix session.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionResult {
    /// The session identifier.
    pub session_id: SessionId,
    /// The base revision all sandboxes were created from.
    pub base_revision: Revision,
    /// Number of files that had findings (dispatched branches plus skips).
    pub files_with_errors: usize,
    /// Files fixed, in branch completion order.
    pub successful_fixes: Vec<FixRecord>,
    /// Files that failed, with reasons.
    pub failed_fixes: Vec<FailureRecord>,
    /// Total findings resolved.
    pub total_errors_fixed: u64,
    /// Session-level warnings (e.g. a quality tool that crashed).
    pub warnings: Vec<String>,
    /// Wall-clock duration of the session in milliseconds.
    pub wall_time_ms: u64,
}

impl SessionResult {
    /// Whether any file failed to fix.
    #[must_use]
    pub const fn has_failures(&self) -> bool {
        !self.failed_fixes.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
