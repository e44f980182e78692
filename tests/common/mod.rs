//! Shared test helpers for stomper integration tests.
//!
//! All tests use temp directories — no side effects on the real repo. Each
//! test gets its own git repo via [`TestRepo::new`], plus in-process
//! capability fakes: a marker-scanning quality tool, scripted agents, and
//! probe wrappers that observe concurrency.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tempfile::TempDir;

use stomper::agent::{Agent, AgentError};
use stomper::config::{SessionConfig, TestValidation};
use stomper::model::finding::{Finding, Severity};
use stomper::prompt::TemplatePromptBuilder;
use stomper::session::SessionDeps;
use stomper::testrun::{TestOutcome, TestRunError, TestRunner};
use stomper::tools::{QualityTool, ToolError, ToolScope};
use stomper::vcs::{ApplyOutcome, GitCli, GitError, Vcs};

/// The marker the fake tool scans for. A line like
/// `x = 1  # LINT:E501` is one finding with code `E501`.
pub const MARKER: &str = "# LINT:";

// ---------------------------------------------------------------------------
// TestRepo
// ---------------------------------------------------------------------------

/// A throwaway git repository.
pub struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    /// Create a fresh repo with one seed commit.
    pub fn new() -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let repo = Self { dir };
        repo.git(&["init", "-b", "main"]);
        repo.git(&["config", "user.email", "test@example.com"]);
        repo.git(&["config", "user.name", "Test"]);
        repo.write_file("README.md", "# test repo\n");
        repo.commit_all("initial commit");
        repo
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write_file(&self, rel: &str, content: &str) {
        let path = self.dir.path().join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create parent dirs");
        }
        std::fs::write(path, content).expect("write file");
    }

    pub fn read_file(&self, rel: &str) -> String {
        std::fs::read_to_string(self.dir.path().join(rel)).expect("read file")
    }

    pub fn commit_all(&self, message: &str) {
        self.git(&["add", "."]);
        self.git(&["commit", "-m", message]);
    }

    pub fn head(&self) -> String {
        self.git_stdout(&["rev-parse", "HEAD"]).trim().to_owned()
    }

    /// Commits reachable from HEAD but not from `base`.
    pub fn commits_since(&self, base: &str) -> u32 {
        self.git_stdout(&["rev-list", "--count", &format!("{base}..HEAD")])
            .trim()
            .parse()
            .expect("parse commit count")
    }

    /// Commit subjects, newest first.
    pub fn log_subjects(&self) -> Vec<String> {
        self.git_stdout(&["log", "--format=%s"])
            .lines()
            .map(ToOwned::to_owned)
            .collect()
    }

    pub fn git(&self, args: &[&str]) {
        self.git_stdout(args);
    }

    pub fn git_stdout(&self, args: &[&str]) -> String {
        let out = Command::new("git")
            .args(args)
            .current_dir(self.dir.path())
            .output()
            .expect("failed to spawn git");
        assert!(
            out.status.success(),
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&out.stderr)
        );
        String::from_utf8_lossy(&out.stdout).into_owned()
    }
}

// ---------------------------------------------------------------------------
// MarkerTool — quality tool fake
// ---------------------------------------------------------------------------

/// Reports one finding per `# LINT:<code>` marker in `.py` files.
pub struct MarkerTool;

impl MarkerTool {
    fn scan_file(workdir: &Path, path: &Path, findings: &mut Vec<Finding>) {
        let Ok(content) = std::fs::read_to_string(path) else {
            return;
        };
        let rel = path.strip_prefix(workdir).unwrap_or(path).to_path_buf();
        for (idx, line) in content.lines().enumerate() {
            if let Some(pos) = line.find(MARKER) {
                let code = line[pos + MARKER.len()..]
                    .split_whitespace()
                    .next()
                    .unwrap_or("UNKNOWN")
                    .to_owned();
                findings.push(Finding {
                    tool: "marker".to_owned(),
                    code,
                    message: "lint marker present".to_owned(),
                    file_path: rel.clone(),
                    line: Some(u32::try_from(idx + 1).expect("line fits")),
                    column: None,
                    severity: Severity::Error,
                    auto_fixable: false,
                });
            }
        }
    }

    fn walk(dir: &Path, workdir: &Path, findings: &mut Vec<Finding>) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            if path.is_dir() {
                if name != ".git" && name != ".stomper" {
                    Self::walk(&path, workdir, findings);
                }
            } else if path.extension().is_some_and(|e| e == "py") {
                Self::scan_file(workdir, &path, findings);
            }
        }
    }
}

impl QualityTool for MarkerTool {
    fn name(&self) -> &str {
        "marker"
    }

    fn run(&self, workdir: &Path, scope: ToolScope<'_>) -> Result<Vec<Finding>, ToolError> {
        let mut findings = Vec::new();
        match scope {
            ToolScope::Project => Self::walk(workdir, workdir, &mut findings),
            ToolScope::File(rel) => Self::scan_file(workdir, &workdir.join(rel), &mut findings),
        }
        Ok(findings)
    }
}

// ---------------------------------------------------------------------------
// Agent fakes
// ---------------------------------------------------------------------------

/// Remove every lint marker from `.py` files under `workdir`.
pub fn strip_markers(workdir: &Path) {
    fn strip_dir(dir: &Path) {
        let Ok(entries) = std::fs::read_dir(dir) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            let name = entry.file_name();
            if path.is_dir() {
                if name != ".git" && name != ".stomper" {
                    strip_dir(&path);
                }
            } else if path.extension().is_some_and(|e| e == "py") {
                let Ok(content) = std::fs::read_to_string(&path) else {
                    continue;
                };
                let stripped: String = content
                    .lines()
                    .map(|line| {
                        line.find(MARKER)
                            .map_or(line, |pos| line[..pos].trim_end())
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                std::fs::write(&path, format!("{stripped}\n")).expect("rewrite file");
            }
        }
    }
    strip_dir(workdir);
}

/// Remove lint markers from one file.
pub fn strip_markers_in(path: &Path) {
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    let stripped: String = content
        .lines()
        .map(|line| {
            line.find(MARKER)
                .map_or(line, |pos| line[..pos].trim_end())
        })
        .collect::<Vec<_>>()
        .join("\n");
    std::fs::write(path, format!("{stripped}\n")).expect("rewrite file");
}

/// Run a git command in an arbitrary directory (for agents that need to
/// mutate the main repo mid-session).
pub fn git_in(root: &Path, args: &[&str]) {
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

/// Agent driven by a per-invocation closure receiving
/// (call index, prompt, workdir).
pub struct ClosureAgent {
    calls: AtomicU32,
    behavior: Box<dyn Fn(u32, &str, &Path) -> Result<(), AgentError> + Send + Sync>,
}

impl ClosureAgent {
    pub fn new(
        behavior: impl Fn(u32, &str, &Path) -> Result<(), AgentError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: AtomicU32::new(0),
            behavior: Box::new(behavior),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Agent for ClosureAgent {
    fn invoke(&self, prompt: &str, working_dir: &Path) -> Result<(), AgentError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.behavior)(call, prompt, working_dir)
    }
}

/// Agent that fixes everything on every invocation.
pub fn fixing_agent() -> ClosureAgent {
    ClosureAgent::new(|_, _, workdir| {
        strip_markers(workdir);
        Ok(())
    })
}

/// Agent that always reports failure without touching anything.
pub fn failing_agent() -> ClosureAgent {
    ClosureAgent::new(|_, _, _| {
        Err(AgentError::Failed {
            exit_code: Some(1),
            stderr: "cannot comply".to_owned(),
        })
    })
}

/// Wrapper that records how many agent invocations overlap in time.
pub struct ProbeAgent<A> {
    inner: A,
    hold: Duration,
    active: AtomicU32,
    peak: AtomicU32,
}

impl<A: Agent> ProbeAgent<A> {
    pub fn new(inner: A, hold: Duration) -> Self {
        Self {
            inner,
            hold,
            active: AtomicU32::new(0),
            peak: AtomicU32::new(0),
        }
    }

    pub fn peak(&self) -> u32 {
        self.peak.load(Ordering::SeqCst)
    }
}

impl<A: Agent> Agent for ProbeAgent<A> {
    fn invoke(&self, prompt: &str, working_dir: &Path) -> Result<(), AgentError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.hold);
        let result = self.inner.invoke(prompt, working_dir);
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

// ---------------------------------------------------------------------------
// Test runner fakes
// ---------------------------------------------------------------------------

/// Test runner that always passes.
pub struct NullTests;

impl TestRunner for NullTests {
    fn run(
        &self,
        _workdir: &Path,
        _changed_file: &Path,
        _mode: TestValidation,
    ) -> Result<TestOutcome, TestRunError> {
        Ok(TestOutcome::Passed)
    }
}

/// Test runner that fails a fixed number of times, then passes.
pub struct FlakyTests {
    pub failures_left: Mutex<u32>,
}

impl TestRunner for FlakyTests {
    fn run(
        &self,
        _workdir: &Path,
        _changed_file: &Path,
        _mode: TestValidation,
    ) -> Result<TestOutcome, TestRunError> {
        let mut left = self.failures_left.lock().expect("lock");
        if *left > 0 {
            *left -= 1;
            Ok(TestOutcome::Failed {
                detail: "1 failed".to_owned(),
            })
        } else {
            Ok(TestOutcome::Passed)
        }
    }
}

// ---------------------------------------------------------------------------
// VCS probe
// ---------------------------------------------------------------------------

/// Real git operations with concurrency observation around the critical
/// section (apply + commit).
pub struct ProbeVcs {
    inner: GitCli,
    active: AtomicU32,
    peak: AtomicU32,
}

impl ProbeVcs {
    pub fn new() -> Self {
        Self {
            inner: GitCli,
            active: AtomicU32::new(0),
            peak: AtomicU32::new(0),
        }
    }

    pub fn peak_critical(&self) -> u32 {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(5));
    }

    fn exit(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Vcs for ProbeVcs {
    fn head_revision(&self, workdir: &Path) -> Result<stomper::model::types::Revision, GitError> {
        self.inner.head_revision(workdir)
    }

    fn diff_path(
        &self,
        workdir: &Path,
        base: &stomper::model::types::Revision,
        path: &Path,
    ) -> Result<String, GitError> {
        self.inner.diff_path(workdir, base, path)
    }

    fn apply_patch(&self, workdir: &Path, patch: &str) -> Result<ApplyOutcome, GitError> {
        self.enter();
        let result = self.inner.apply_patch(workdir, patch);
        self.exit();
        result
    }

    fn commit_paths(
        &self,
        workdir: &Path,
        paths: &[&Path],
        message: &str,
    ) -> Result<stomper::model::types::Revision, GitError> {
        self.enter();
        let result = self.inner.commit_paths(workdir, paths, message);
        self.exit();
        result
    }
}

// ---------------------------------------------------------------------------
// Session wiring
// ---------------------------------------------------------------------------

/// Standard deps: marker tool, template prompts, real git, always-pass tests.
pub fn deps_with_agent(agent: impl Agent + 'static) -> SessionDeps {
    SessionDeps {
        tools: vec![std::sync::Arc::new(MarkerTool)],
        prompt_builder: std::sync::Arc::new(TemplatePromptBuilder),
        agent: std::sync::Arc::new(agent),
        test_runner: std::sync::Arc::new(NullTests),
        vcs: std::sync::Arc::new(GitCli),
    }
}

/// Session config over a test repo with the given parallelism.
pub fn config_for(repo: &TestRepo, max_parallel: u32) -> SessionConfig {
    let mut config = SessionConfig::new(repo.root().to_path_buf());
    config.max_parallel_files = max_parallel;
    config.test_validation = TestValidation::None;
    config
}

/// Sorted file-path strings from a list of records, for order-insensitive
/// assertions.
pub fn sorted_paths<T>(records: &[T], path_of: impl Fn(&T) -> PathBuf) -> Vec<String> {
    let mut paths: Vec<String> = records
        .iter()
        .map(|r| path_of(r).to_string_lossy().into_owned())
        .collect();
    paths.sort();
    paths
}
