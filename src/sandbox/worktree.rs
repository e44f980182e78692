//! Git worktree sandbox backend.
//!
//! Implements [`SandboxBackend`] using `git worktree` for isolation. Each
//! sandbox is a detached worktree under `.stomper/sandboxes/<id>`, pinned to
//! the session's base revision. Worktrees share history with the main
//! repository, so create and destroy are O(working tree), not O(history).

use std::fmt;
use std::path::PathBuf;
use std::process::Command;

use super::SandboxBackend;
use crate::model::types::{Revision, SandboxId};

/// Directory under the repo root that holds sandbox worktrees.
const SANDBOX_DIR: &str = ".stomper/sandboxes";

// ---------------------------------------------------------------------------
// WorktreeError
// ---------------------------------------------------------------------------

/// Errors from the worktree sandbox backend.
#[derive(Debug)]
pub enum WorktreeError {
    /// A git command failed.
    GitCommand {
        /// The command that was run (e.g. `"git worktree add"`).
        command: String,
        /// Captured stderr from git.
        stderr: String,
        /// The process exit code, if any.
        exit_code: Option<i32>,
    },
    /// An I/O error occurred.
    Io(std::io::Error),
}

impl fmt::Display for WorktreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GitCommand {
                command,
                stderr,
                exit_code,
            } => {
                write!(f, "`{command}` failed")?;
                if let Some(code) = exit_code {
                    write!(f, " (exit code {code})")?;
                }
                if !stderr.is_empty() {
                    write!(f, ": {stderr}")?;
                }
                Ok(())
            }
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for WorktreeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::GitCommand { .. } => None,
        }
    }
}

impl From<std::io::Error> for WorktreeError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// WorktreeSandbox
// ---------------------------------------------------------------------------

/// Sandbox backend using `git worktree`.
pub struct WorktreeSandbox {
    /// The root directory of the main repository.
    root: PathBuf,
}

impl WorktreeSandbox {
    /// Create a backend rooted at the main repository.
    #[must_use]
    pub const fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// The directory holding all sandbox worktrees.
    fn sandboxes_dir(&self) -> PathBuf {
        self.root.join(SANDBOX_DIR)
    }
}

impl SandboxBackend for WorktreeSandbox {
    type Error = WorktreeError;

    /// Create a detached worktree pinned to `base`.
    ///
    /// A leftover directory from a crashed prior session is removed first;
    /// stale worktree registrations are pruned so git accepts the path.
    fn create(&self, id: &SandboxId, base: &Revision) -> Result<PathBuf, Self::Error> {
        let path = self.sandbox_path(id);

        if path.exists() {
            std::fs::remove_dir_all(&path)?;
        }
        let _ = Command::new("git")
            .args(["worktree", "prune"])
            .current_dir(&self.root)
            .output();

        std::fs::create_dir_all(self.sandboxes_dir())?;

        let path_str = path.to_string_lossy().into_owned();
        let output = Command::new("git")
            .args(["worktree", "add", "--detach", &path_str, base.as_str()])
            .current_dir(&self.root)
            .output()
            .map_err(WorktreeError::Io)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_owned();

            // Clean up partial state so destroy stays a no-op.
            if path.exists() {
                let _ = std::fs::remove_dir_all(&path);
            }

            return Err(WorktreeError::GitCommand {
                command: "git worktree add".to_owned(),
                stderr,
                exit_code: output.status.code(),
            });
        }

        Ok(path)
    }

    /// Destroy a sandbox worktree.
    ///
    /// Idempotent:
    /// - Step 1: `git worktree remove --force <path>` (handles dirty trees).
    /// - Step 2: if that fails, remove the directory manually.
    /// - Step 3: `git worktree prune` to drop the stale registration.
    fn destroy(&self, id: &SandboxId) -> Result<(), Self::Error> {
        let path = self.sandbox_path(id);

        if path.exists() {
            let path_str = path.to_string_lossy().into_owned();
            let remove = Command::new("git")
                .args(["worktree", "remove", "--force", &path_str])
                .current_dir(&self.root)
                .output()
                .map_err(WorktreeError::Io)?;

            if !remove.status.success() && path.exists() {
                std::fs::remove_dir_all(&path)?;
            }
        }

        let _ = Command::new("git")
            .args(["worktree", "prune"])
            .current_dir(&self.root)
            .output();

        Ok(())
    }

    fn sandbox_path(&self, id: &SandboxId) -> PathBuf {
        self.sandboxes_dir().join(id.as_str())
    }
}

impl WorktreeSandbox {
    /// Remove the sandboxes directory itself once a session is done.
    ///
    /// Called by session cleanup after all sandboxes are destroyed; a
    /// non-empty directory is left in place (some branch is still using it).
    pub fn remove_container_if_empty(&self) -> Result<(), WorktreeError> {
        let dir = self.sandboxes_dir();
        if dir.exists() && std::fs::read_dir(&dir)?.next().is_none() {
            std::fs::remove_dir(&dir)?;
            // `.stomper` itself may now be empty too.
            let parent = self.root.join(".stomper");
            if parent.exists() && std::fs::read_dir(&parent)?.next().is_none() {
                std::fs::remove_dir(&parent)?;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;
    use crate::model::types::SessionId;

    fn run_git(root: &Path, args: &[&str]) {
        let out = Command::new("git")
            .args(args)
            .current_dir(root)
            .output()
            .expect("failed to spawn git");
        assert!(
            out.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&out.stderr)
        );
    }

    fn setup_repo() -> (TempDir, Revision) {
        let dir = TempDir::new().expect("failed to create temp dir");
        let root = dir.path();
        run_git(root, &["init", "-b", "main"]);
        run_git(root, &["config", "user.email", "test@example.com"]);
        run_git(root, &["config", "user.name", "Test"]);
        std::fs::write(root.join("a.txt"), "base content\n").unwrap();
        run_git(root, &["add", "."]);
        run_git(root, &["commit", "-m", "initial"]);

        let out = Command::new("git")
            .args(["rev-parse", "HEAD"])
            .current_dir(root)
            .output()
            .unwrap();
        let base = Revision::new(String::from_utf8_lossy(&out.stdout).trim()).unwrap();
        (dir, base)
    }

    fn sandbox_id(stem: &str) -> SandboxId {
        SandboxId::for_file(&SessionId::new("fix-00000001").unwrap(), stem)
    }

    #[test]
    fn create_yields_working_copy_at_base() {
        let (dir, base) = setup_repo();
        let backend = WorktreeSandbox::new(dir.path().to_path_buf());
        let id = sandbox_id("a");

        let path = backend.create(&id, &base).unwrap();
        assert!(path.exists());
        assert_eq!(
            std::fs::read_to_string(path.join("a.txt")).unwrap(),
            "base content\n"
        );

        backend.destroy(&id).unwrap();
    }

    #[test]
    fn sandbox_mutations_do_not_leak_to_main() {
        let (dir, base) = setup_repo();
        let backend = WorktreeSandbox::new(dir.path().to_path_buf());
        let id = sandbox_id("a");

        let path = backend.create(&id, &base).unwrap();
        std::fs::write(path.join("a.txt"), "sandbox edit\n").unwrap();

        assert_eq!(
            std::fs::read_to_string(dir.path().join("a.txt")).unwrap(),
            "base content\n"
        );

        backend.destroy(&id).unwrap();
    }

    #[test]
    fn distinct_ids_get_distinct_paths() {
        let (dir, base) = setup_repo();
        let backend = WorktreeSandbox::new(dir.path().to_path_buf());
        let id_a = sandbox_id("a");
        let id_b = sandbox_id("a");

        let path_a = backend.create(&id_a, &base).unwrap();
        let path_b = backend.create(&id_b, &base).unwrap();
        assert_ne!(path_a, path_b);

        backend.destroy(&id_a).unwrap();
        backend.destroy(&id_b).unwrap();
    }

    #[test]
    fn destroy_is_idempotent_and_safe_when_absent() {
        let (dir, base) = setup_repo();
        let backend = WorktreeSandbox::new(dir.path().to_path_buf());
        let id = sandbox_id("a");

        // Destroy before create: no-op.
        backend.destroy(&id).unwrap();

        backend.create(&id, &base).unwrap();
        backend.destroy(&id).unwrap();
        assert!(!backend.sandbox_path(&id).exists());

        // Destroy again: still fine.
        backend.destroy(&id).unwrap();
    }

    #[test]
    fn destroy_handles_dirty_sandbox() {
        let (dir, base) = setup_repo();
        let backend = WorktreeSandbox::new(dir.path().to_path_buf());
        let id = sandbox_id("a");

        let path = backend.create(&id, &base).unwrap();
        std::fs::write(path.join("untracked.txt"), "dirty\n").unwrap();
        std::fs::write(path.join("a.txt"), "modified\n").unwrap();

        backend.destroy(&id).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn create_over_leftover_directory_succeeds() {
        let (dir, base) = setup_repo();
        let backend = WorktreeSandbox::new(dir.path().to_path_buf());
        let id = sandbox_id("a");

        // Simulate a crashed prior session: stale directory, no registration.
        let stale = backend.sandbox_path(&id);
        std::fs::create_dir_all(&stale).unwrap();
        std::fs::write(stale.join("junk.txt"), "stale\n").unwrap();

        let path = backend.create(&id, &base).unwrap();
        assert!(path.join("a.txt").exists());
        assert!(!path.join("junk.txt").exists());

        backend.destroy(&id).unwrap();
    }

    #[test]
    fn container_cleanup_removes_empty_dirs() {
        let (dir, base) = setup_repo();
        let backend = WorktreeSandbox::new(dir.path().to_path_buf());
        let id = sandbox_id("a");

        backend.create(&id, &base).unwrap();
        backend.destroy(&id).unwrap();
        backend.remove_container_if_empty().unwrap();
        assert!(!dir.path().join(".stomper").exists());
    }
}
