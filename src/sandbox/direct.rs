//! No-isolation sandbox backend.
//!
//! Used when a session runs with `use_sandbox = false`: every "sandbox" is
//! the main workspace itself. Create and destroy are no-ops. With this
//! backend the diff-application mutex is the only thing protecting the
//! working tree, so the orchestrator forces `max_parallel_files = 1`
//! semantics at the apply step and callers accept that agents share the
//! tree.

use std::convert::Infallible;
use std::path::PathBuf;

use super::SandboxBackend;
use crate::model::types::{Revision, SandboxId};

/// Sandbox backend that hands out the main workspace path.
pub struct DirectSandbox {
    root: PathBuf,
}

impl DirectSandbox {
    /// Create a backend rooted at the main repository.
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

impl SandboxBackend for DirectSandbox {
    type Error = Infallible;

    fn create(&self, _id: &SandboxId, _base: &Revision) -> Result<PathBuf, Self::Error> {
        Ok(self.root.clone())
    }

    fn destroy(&self, _id: &SandboxId) -> Result<(), Self::Error> {
        Ok(())
    }

    fn sandbox_path(&self, _id: &SandboxId) -> PathBuf {
        self.root.clone()
    }
}
