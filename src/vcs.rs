//! Git plumbing for fix sessions.
//!
//! Thin wrapper over the `git` CLI covering exactly what the orchestrator
//! needs: resolving the base revision, extracting a path-scoped unified
//! patch from a sandbox, dry-run-checked patch application, and per-file
//! commits on the main workspace.

use std::fmt;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::model::types::Revision;

// ---------------------------------------------------------------------------
// GitError
// ---------------------------------------------------------------------------

/// Errors from git operations.
#[derive(Debug)]
pub enum GitError {
    /// A git command failed.
    Command {
        /// The command that was run (e.g. `"git diff"`).
        command: String,
        /// Captured stderr from git.
        stderr: String,
        /// The process exit code, if any.
        exit_code: Option<i32>,
    },
    /// Git produced output that is not a valid revision.
    BadRevision {
        /// The raw output that failed to parse.
        output: String,
    },
    /// An I/O error occurred.
    Io(std::io::Error),
}

impl fmt::Display for GitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command {
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
            Self::BadRevision { output } => {
                write!(f, "git returned an invalid revision: '{output}'")
            }
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for GitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for GitError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// ApplyOutcome
// ---------------------------------------------------------------------------

/// Result of attempting to apply a patch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The patch applied cleanly.
    Applied,
    /// The patch did not apply (context drift or conflicting change).
    /// The working tree was left untouched.
    Conflict {
        /// What `git apply --check` reported.
        detail: String,
    },
}

// ---------------------------------------------------------------------------
// GitWorkspace
// ---------------------------------------------------------------------------

/// A git working directory (the main workspace or a sandbox worktree).
#[derive(Clone, Debug)]
pub struct GitWorkspace {
    root: PathBuf,
}

impl GitWorkspace {
    /// Open a working directory, verifying it belongs to a git repository.
    ///
    /// # Errors
    /// Returns an error if `root` is not inside a git working tree.
    pub fn open(root: PathBuf) -> Result<Self, GitError> {
        let ws = Self { root };
        ws.git_stdout(&["rev-parse", "--is-inside-work-tree"])?;
        Ok(ws)
    }

    /// Wrap a directory that is already known to be a git working tree
    /// (e.g. a worktree this process just created).
    #[must_use]
    pub const fn at(root: PathBuf) -> Self {
        Self { root }
    }

    /// The working directory path.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `HEAD` to a revision.
    ///
    /// # Errors
    /// Returns an error if the repository has no commits or git fails.
    pub fn head_revision(&self) -> Result<Revision, GitError> {
        let out = self.git_stdout(&["rev-parse", "HEAD"])?;
        let trimmed = out.trim();
        Revision::new(trimmed).map_err(|_| GitError::BadRevision {
            output: trimmed.to_owned(),
        })
    }

    /// Unified patch for a single path between `base` and the working tree.
    ///
    /// Changes to any other path are excluded, which is what discards agent
    /// edits outside the file under repair. Returns an empty string when the
    /// path is unchanged.
    ///
    /// # Errors
    /// Returns an error if git fails (e.g. unknown base revision).
    pub fn diff_path(&self, base: &Revision, path: &Path) -> Result<String, GitError> {
        let path_str = path.to_string_lossy();
        self.git_stdout(&["diff", "--binary", base.as_str(), "--", &path_str])
    }

    /// Apply a unified patch to the working tree, with a dry-run check first.
    ///
    /// The check-then-apply sequence guarantees the working tree is never
    /// left half-patched: a patch that fails the check leaves no trace.
    ///
    /// # Errors
    /// Returns an error for I/O or git faults other than a clean rejection;
    /// a rejected patch is reported as [`ApplyOutcome::Conflict`].
    pub fn apply_patch(&self, patch: &str) -> Result<ApplyOutcome, GitError> {
        let mut file = tempfile::NamedTempFile::new()?;
        file.write_all(patch.as_bytes())?;
        file.flush()?;
        let patch_path = file.path().to_string_lossy().into_owned();

        let check = Command::new("git")
            .args(["apply", "--check", &patch_path])
            .current_dir(&self.root)
            .output()
            .map_err(GitError::Io)?;
        if !check.status.success() {
            return Ok(ApplyOutcome::Conflict {
                detail: String::from_utf8_lossy(&check.stderr).trim().to_owned(),
            });
        }

        self.git_run(&["apply", &patch_path])?;
        Ok(ApplyOutcome::Applied)
    }

    /// Stage the given paths and create one commit containing only them.
    ///
    /// # Errors
    /// Returns an error if staging or committing fails.
    pub fn commit_paths(&self, paths: &[&Path], message: &str) -> Result<Revision, GitError> {
        let mut add_args = vec!["add".to_owned(), "--".to_owned()];
        add_args.extend(paths.iter().map(|p| p.to_string_lossy().into_owned()));
        let add_refs: Vec<&str> = add_args.iter().map(String::as_str).collect();
        self.git_run(&add_refs)?;

        let mut commit_args = vec![
            "commit".to_owned(),
            "-m".to_owned(),
            message.to_owned(),
            "--".to_owned(),
        ];
        commit_args.extend(paths.iter().map(|p| p.to_string_lossy().into_owned()));
        let commit_refs: Vec<&str> = commit_args.iter().map(String::as_str).collect();
        self.git_run(&commit_refs)?;

        self.head_revision()
    }

    /// Whether the working tree has no uncommitted changes.
    ///
    /// # Errors
    /// Returns an error if git fails.
    pub fn is_clean(&self) -> Result<bool, GitError> {
        let out = self.git_stdout(&["status", "--porcelain"])?;
        Ok(out.trim().is_empty())
    }

    /// Number of commits reachable from `HEAD` but not from `base`.
    ///
    /// # Errors
    /// Returns an error if git fails or the count is unparseable.
    pub fn commits_since(&self, base: &Revision) -> Result<u32, GitError> {
        let range = format!("{}..HEAD", base.as_str());
        let out = self.git_stdout(&["rev-list", "--count", &range])?;
        out.trim().parse().map_err(|_| GitError::BadRevision {
            output: out.trim().to_owned(),
        })
    }

    /// Run a git command in this workspace and return its stdout.
    pub(crate) fn git_stdout(&self, args: &[&str]) -> Result<String, GitError> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(GitError::Io)?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        } else {
            Err(GitError::Command {
                command: format!("git {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
                exit_code: output.status.code(),
            })
        }
    }

    /// Run a git command, ignoring stdout.
    pub(crate) fn git_run(&self, args: &[&str]) -> Result<(), GitError> {
        self.git_stdout(args)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Vcs capability
// ---------------------------------------------------------------------------

/// Version-control operations the orchestrator consumes.
///
/// Stateless over working directories: the same instance serves the main
/// workspace and every sandbox. [`GitCli`] is the stock implementation;
/// tests substitute instrumented fakes.
pub trait Vcs: Send + Sync {
    /// Resolve `HEAD` of `workdir`.
    ///
    /// # Errors
    /// Returns an error if the directory is not a usable repository.
    fn head_revision(&self, workdir: &Path) -> Result<Revision, GitError>;

    /// Unified patch for `path` between `base` and `workdir`'s working tree.
    ///
    /// # Errors
    /// Returns an error if git fails.
    fn diff_path(&self, workdir: &Path, base: &Revision, path: &Path) -> Result<String, GitError>;

    /// Apply a patch to `workdir`, leaving the tree untouched on conflict.
    ///
    /// # Errors
    /// Returns an error for faults other than a clean rejection.
    fn apply_patch(&self, workdir: &Path, patch: &str) -> Result<ApplyOutcome, GitError>;

    /// Stage `paths` in `workdir` and commit only them.
    ///
    /// # Errors
    /// Returns an error if staging or committing fails.
    fn commit_paths(
        &self,
        workdir: &Path,
        paths: &[&Path],
        message: &str,
    ) -> Result<Revision, GitError>;
}

/// [`Vcs`] implementation backed by the `git` CLI.
pub struct GitCli;

impl Vcs for GitCli {
    fn head_revision(&self, workdir: &Path) -> Result<Revision, GitError> {
        GitWorkspace::at(workdir.to_path_buf()).head_revision()
    }

    fn diff_path(&self, workdir: &Path, base: &Revision, path: &Path) -> Result<String, GitError> {
        GitWorkspace::at(workdir.to_path_buf()).diff_path(base, path)
    }

    fn apply_patch(&self, workdir: &Path, patch: &str) -> Result<ApplyOutcome, GitError> {
        GitWorkspace::at(workdir.to_path_buf()).apply_patch(patch)
    }

    fn commit_paths(
        &self,
        workdir: &Path,
        paths: &[&Path],
        message: &str,
    ) -> Result<Revision, GitError> {
        GitWorkspace::at(workdir.to_path_buf()).commit_paths(paths, message)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
