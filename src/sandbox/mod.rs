//! Sandbox backend trait and dispatcher.
//!
//! Defines the interface for creating and destroying the ephemeral working
//! copies that fix branches run in. This is the contract between the
//! orchestrator and the underlying isolation mechanism.

pub mod direct;
pub mod worktree;

use std::path::PathBuf;

use crate::model::types::{Revision, SandboxId};

use direct::DirectSandbox;
use worktree::WorktreeSandbox;

/// A sandbox backend implementation.
///
/// # Key Invariants
///
/// - **Isolation**: mutations inside a sandbox never affect the main
///   workspace or any other sandbox (the direct backend intentionally
///   waives this — see [`DirectSandbox`]).
/// - **Pinned base**: a freshly created sandbox's working copy equals the
///   base revision exactly.
/// - **Uniqueness**: distinct ids never share a working directory.
/// - **Idempotent destroy**: destroying an absent or half-created sandbox
///   is a no-op.
#[allow(clippy::missing_errors_doc)]
pub trait SandboxBackend {
    /// The error type returned by backend operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Create a sandbox pinned to `base` and return its working directory.
    ///
    /// On failure there is nothing to clean up: partial state is removed
    /// before the error is returned.
    fn create(&self, id: &SandboxId, base: &Revision) -> Result<PathBuf, Self::Error>;

    /// Destroy a sandbox. Idempotent; safe after a failed create.
    fn destroy(&self, id: &SandboxId) -> Result<(), Self::Error>;

    /// The working directory a sandbox with this id would occupy.
    /// Does not verify existence.
    fn sandbox_path(&self, id: &SandboxId) -> PathBuf;
}

// ---------------------------------------------------------------------------
// AnySandboxError
// ---------------------------------------------------------------------------

/// Error type for [`AnySandbox`] — boxes the underlying backend error.
#[derive(Debug)]
pub struct AnySandboxError(pub Box<dyn std::error::Error + Send + Sync + 'static>);

impl std::fmt::Display for AnySandboxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for AnySandboxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

fn wrap_err<E>(e: E) -> AnySandboxError
where
    E: std::error::Error + Send + Sync + 'static,
{
    AnySandboxError(Box::new(e))
}

// ---------------------------------------------------------------------------
// AnySandbox
// ---------------------------------------------------------------------------

/// A concrete sandbox backend selected at session start.
///
/// Using an enum (rather than `Box<dyn SandboxBackend>`) avoids dynamic
/// dispatch and keeps the `Error` associated type monomorphic.
pub enum AnySandbox {
    /// Git worktree sandboxes — the default.
    Worktree(WorktreeSandbox),
    /// No isolation: every "sandbox" is the main workspace itself.
    Direct(DirectSandbox),
}

impl AnySandbox {
    /// Select the backend for a session.
    #[must_use]
    pub const fn for_session(root: PathBuf, use_sandbox: bool) -> Self {
        if use_sandbox {
            Self::Worktree(WorktreeSandbox::new(root))
        } else {
            Self::Direct(DirectSandbox::new(root))
        }
    }
}

impl SandboxBackend for AnySandbox {
    type Error = AnySandboxError;

    fn create(&self, id: &SandboxId, base: &Revision) -> Result<PathBuf, Self::Error> {
        match self {
            Self::Worktree(b) => b.create(id, base).map_err(wrap_err),
            Self::Direct(b) => b.create(id, base).map_err(wrap_err),
        }
    }

    fn destroy(&self, id: &SandboxId) -> Result<(), Self::Error> {
        match self {
            Self::Worktree(b) => b.destroy(id).map_err(wrap_err),
            Self::Direct(b) => b.destroy(id).map_err(wrap_err),
        }
    }

    fn sandbox_path(&self, id: &SandboxId) -> PathBuf {
        match self {
            Self::Worktree(b) => b.sandbox_path(id),
            Self::Direct(b) => b.sandbox_path(id),
        }
    }
}
