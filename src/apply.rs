//! Diff application — the session's critical section.
//!
//! Parallel branches all fix concurrently, but their patches land serially:
//! only one branch at a time may apply a patch and commit it to the main
//! workspace. A single session-scoped mutex enforces this. Serialization
//! keeps the index from being corrupted by concurrent stagings and
//! guarantees each commit contains exactly one file's fix.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, instrument};

use crate::model::types::Revision;
use crate::vcs::{ApplyOutcome, GitError, Vcs};

// ---------------------------------------------------------------------------
// LandError
// ---------------------------------------------------------------------------

/// A patch could not be landed on the main workspace.
#[derive(Debug)]
pub enum LandError {
    /// The patch no longer applies (a prior branch or outside change drifted
    /// the context). The main workspace was not modified.
    Conflict {
        /// What the dry-run check reported.
        detail: String,
    },
    /// A git operation failed.
    Git(GitError),
}

impl fmt::Display for LandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Conflict { detail } => write!(f, "patch no longer applies: {detail}"),
            Self::Git(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for LandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Git(e) => Some(e),
            Self::Conflict { .. } => None,
        }
    }
}

impl From<GitError> for LandError {
    fn from(e: GitError) -> Self {
        Self::Git(e)
    }
}

// ---------------------------------------------------------------------------
// DiffApplicator
// ---------------------------------------------------------------------------

/// Serializes patch application and commits on the main workspace.
///
/// The exclusion bound is independent of the session's branch parallelism:
/// any number of branches may be fixing at once, but `land` admits one at a
/// time. Branches acquire the lock at most once per attempt and never hold
/// it across any other suspension point.
pub struct DiffApplicator {
    vcs: Arc<dyn Vcs>,
    main_root: PathBuf,
    lock: Mutex<()>,
}

impl DiffApplicator {
    /// Create the applicator for a session's main workspace.
    #[must_use]
    pub fn new(vcs: Arc<dyn Vcs>, main_root: PathBuf) -> Self {
        Self {
            vcs,
            main_root,
            lock: Mutex::new(()),
        }
    }

    /// Apply `patch` to the main workspace and commit `file_path`.
    ///
    /// The apply is dry-run-checked first; a conflict leaves the workspace
    /// byte-identical to its prior state and is terminal for the branch
    /// (drift will not resolve by retrying).
    ///
    /// # Errors
    /// [`LandError::Conflict`] when the patch is rejected; [`LandError::Git`]
    /// for other git faults.
    #[instrument(skip_all, fields(file = %file_path.display()))]
    pub fn land(&self, file_path: &Path, patch: &str) -> Result<Revision, LandError> {
        let _guard = self.acquire();
        debug!("applying patch under exclusion");

        match self.vcs.apply_patch(&self.main_root, patch)? {
            ApplyOutcome::Applied => {}
            ApplyOutcome::Conflict { detail } => return Err(LandError::Conflict { detail }),
        }

        let revision = self.commit(file_path)?;
        Ok(revision)
    }

    /// Commit `file_path` as-is, without applying a patch first.
    ///
    /// Used in direct (sandbox-less) mode, where the agent already edited
    /// the main workspace in place and there is nothing to apply.
    ///
    /// # Errors
    /// [`LandError::Git`] if the commit fails.
    #[instrument(skip_all, fields(file = %file_path.display()))]
    pub fn land_in_place(&self, file_path: &Path) -> Result<Revision, LandError> {
        let _guard = self.acquire();
        let revision = self.commit(file_path)?;
        Ok(revision)
    }

    fn commit(&self, file_path: &Path) -> Result<Revision, GitError> {
        let message = commit_message(file_path);
        self.vcs
            .commit_paths(&self.main_root, &[file_path], &message)
    }

    /// Take the exclusion, recovering from a holder that panicked mid-apply.
    /// That branch's failure is recorded at its own boundary; later branches
    /// proceed against whatever state the workspace is in, where their own
    /// dry-run check decides.
    fn acquire(&self) -> std::sync::MutexGuard<'_, ()> {
        self.lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Commit message for one file's fix. Uses the workspace-relative path so
/// same-named files in different directories stay distinguishable.
#[must_use]
pub fn commit_message(file_path: &Path) -> String {
    format!("fix(quality): {}", file_path.display())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
