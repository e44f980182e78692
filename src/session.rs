//! Session orchestration — fan-out, aggregation, cleanup.
//!
//! A session is one run over a fixed file set and base revision:
//! `initialize → collect_errors → fan_out(files) ⇉ [process_file × N] →
//! aggregate → cleanup`. Fan-out is bounded: branches execute on a dedicated
//! thread pool sized to `max_parallel_files`, so at most that many files are
//! being fixed at any instant regardless of how many were collected.
//!
//! Aggregation is deferred by construction: the fold over branch outcomes
//! runs only after the parallel collect has joined every branch, so the
//! aggregator always observes fully merged state. Branch faults never escape
//! the fan-out — a panicking branch is caught at its boundary and recorded
//! as that file's failure.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use tracing::{info, instrument, warn};

use crate::agent::{Agent, CommandAgent};
use crate::apply::DiffApplicator;
use crate::collect::collect_work_items;
use crate::config::{SessionConfig, StomperConfig};
use crate::error::{FailureReason, SessionError};
use crate::model::state::{
    BranchOutcome, FailureRecord, FileWorkItem, SessionAggregates, SessionResult,
};
use crate::model::types::{Revision, SessionId};
use crate::processor::{BranchContext, process_file};
use crate::prompt::{PromptBuilder, TemplatePromptBuilder};
use crate::sandbox::AnySandbox;
use crate::testrun::{CommandTestRunner, TestRunner};
use crate::tools::{CommandTool, QualityTool};
use crate::vcs::{GitCli, Vcs};

// ---------------------------------------------------------------------------
// SessionDeps
// ---------------------------------------------------------------------------

/// The external capabilities a session consumes.
pub struct SessionDeps {
    /// All available quality tools; `enabled_tools` selects among them.
    pub tools: Vec<Arc<dyn QualityTool>>,
    /// Prompt builder.
    pub prompt_builder: Arc<dyn PromptBuilder>,
    /// Fixing agent.
    pub agent: Arc<dyn Agent>,
    /// Validation test runner.
    pub test_runner: Arc<dyn TestRunner>,
    /// Version control.
    pub vcs: Arc<dyn Vcs>,
}

impl SessionDeps {
    /// Build the stock command-backed capabilities from a `.stomper.toml`.
    #[must_use]
    pub fn from_config(config: &StomperConfig) -> Self {
        let tools = config
            .tools
            .iter()
            .map(|t| {
                Arc::new(CommandTool::new(t.name.clone(), t.command.clone()))
                    as Arc<dyn QualityTool>
            })
            .collect();
        Self {
            tools,
            prompt_builder: Arc::new(TemplatePromptBuilder),
            agent: Arc::new(CommandAgent::new(
                config.agent.command.clone(),
                std::time::Duration::from_secs(config.agent.timeout_secs),
            )),
            test_runner: Arc::new(CommandTestRunner::new(
                config.tests.command.clone(),
                config.tests.quick_globs.clone(),
            )),
            vcs: Arc::new(GitCli),
        }
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One fix session over a target repository.
pub struct Session {
    config: SessionConfig,
    deps: SessionDeps,
}

impl Session {
    /// Create a session from validated-on-run config and capabilities.
    #[must_use]
    pub const fn new(config: SessionConfig, deps: SessionDeps) -> Self {
        Self { config, deps }
    }

    /// Run the session to completion.
    ///
    /// # Errors
    /// Returns an error only when the session cannot start (bad config,
    /// unusable target). Per-file failures are reported in the result, never
    /// as errors.
    pub fn run(&self) -> Result<SessionResult, SessionError> {
        self.run_with_cancel(&AtomicBool::new(false))
    }

    /// Run the session with an external cancellation flag.
    ///
    /// When the flag is raised, branches not yet started are skipped and
    /// in-flight branches finish their current step, destroy their
    /// sandboxes, and terminate. The aggregator runs either way.
    ///
    /// # Errors
    /// Same contract as [`Session::run`].
    #[instrument(skip_all, fields(target = %self.config.target_root.display()))]
    pub fn run_with_cancel(&self, cancel: &AtomicBool) -> Result<SessionResult, SessionError> {
        let started = Instant::now();
        self.config.validate()?;

        let root = &self.config.target_root;
        let base_revision = self.deps.vcs.head_revision(root).map_err(|e| {
            SessionError::InvalidTarget {
                path: root.clone(),
                reason: e.to_string(),
            }
        })?;
        let session_id = SessionId::generate();

        info!(
            session = %session_id,
            base = %base_revision,
            max_parallel = self.config.max_parallel_files,
            "session starting"
        );

        let tools = self.enabled_tools();
        if tools.is_empty() {
            warn!("no quality tools enabled; nothing to collect");
        }

        let collected = collect_work_items(root, &tools, self.config.max_attempts_per_file);
        let files_with_errors = collected.items.len();
        info!(
            files = files_with_errors,
            findings = collected.total_findings,
            "error collection complete"
        );

        let aggregates = if collected.items.is_empty() {
            // Short-circuit: no dispatches, straight to aggregation.
            SessionAggregates::default()
        } else {
            self.fan_out(&session_id, &base_revision, tools, collected.items, cancel)?
        };

        // Aggregator: log totals and post-validate the count invariant.
        if !aggregates.within_bounds(files_with_errors) {
            warn!(
                successes = aggregates.successful_fixes.len(),
                failures = aggregates.failed_fixes.len(),
                files = files_with_errors,
                "aggregate counts exceed dispatched files"
            );
        }
        info!(
            fixed = aggregates.successful_fixes.len(),
            failed = aggregates.failed_fixes.len(),
            errors_fixed = aggregates.total_errors_fixed,
            "session complete"
        );

        Ok(SessionResult {
            session_id,
            base_revision,
            files_with_errors,
            successful_fixes: aggregates.successful_fixes,
            failed_fixes: aggregates.failed_fixes,
            total_errors_fixed: aggregates.total_errors_fixed,
            warnings: collected.warnings,
            wall_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    /// Dispatch one branch per work item on a pool sized to the concurrency
    /// bound, then fold the outcomes (the parallel collect is the barrier
    /// that makes aggregation deferred).
    fn fan_out(
        &self,
        session_id: &SessionId,
        base_revision: &Revision,
        tools: Vec<Arc<dyn QualityTool>>,
        items: Vec<FileWorkItem>,
        cancel: &AtomicBool,
    ) -> Result<SessionAggregates, SessionError> {
        let root = &self.config.target_root;
        let sandbox = AnySandbox::for_session(root.clone(), self.config.use_sandbox);
        let applicator = DiffApplicator::new(Arc::clone(&self.deps.vcs), root.clone());
        let halted = AtomicBool::new(false);

        let ctx = BranchContext {
            session_id,
            base_revision,
            main_root: root,
            tools: &tools,
            prompt_builder: self.deps.prompt_builder.as_ref(),
            agent: self.deps.agent.as_ref(),
            test_runner: self.deps.test_runner.as_ref(),
            vcs: self.deps.vcs.as_ref(),
            sandbox: &sandbox,
            applicator: &applicator,
            test_validation: self.config.test_validation,
            use_sandbox: self.config.use_sandbox,
            cancel,
        };

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.max_parallel_files as usize)
            .build()
            .map_err(|e| SessionError::Scheduler {
                detail: e.to_string(),
            })?;

        let continue_on_error = self.config.continue_on_error;
        let outcomes: Vec<BranchOutcome> = pool.install(|| {
            items
                .into_par_iter()
                .map(|item| {
                    if halted.load(Ordering::SeqCst) || cancel.load(Ordering::Relaxed) {
                        return BranchOutcome::Skipped {
                            file_path: item.file_path,
                        };
                    }

                    let file_path = item.file_path.clone();
                    let outcome = catch_unwind(AssertUnwindSafe(|| process_file(&ctx, item)))
                        .unwrap_or_else(|payload| {
                            BranchOutcome::Failed(FailureRecord {
                                file_path,
                                reason: FailureReason::Internal {
                                    detail: panic_message(payload.as_ref()),
                                },
                                attempts_used: 0,
                            })
                        });

                    if !continue_on_error && matches!(outcome, BranchOutcome::Failed(_)) {
                        halted.store(true, Ordering::SeqCst);
                    }
                    outcome
                })
                .collect()
        });

        let mut aggregates = SessionAggregates::default();
        for outcome in outcomes {
            aggregates.absorb(outcome);
        }

        // Cleanup: all branches destroyed their own sandboxes; remove the
        // now-empty container directory.
        if let AnySandbox::Worktree(worktree) = &sandbox
            && let Err(e) = worktree.remove_container_if_empty()
        {
            warn!(error = %e, "failed to remove sandbox container");
        }

        Ok(aggregates)
    }

    /// Resolve `enabled_tools` names against the provided tool set.
    /// An empty selection means "all provided tools".
    fn enabled_tools(&self) -> Vec<Arc<dyn QualityTool>> {
        if self.config.enabled_tools.is_empty() {
            return self.deps.tools.clone();
        }
        self.deps
            .tools
            .iter()
            .filter(|tool| {
                self.config
                    .enabled_tools
                    .iter()
                    .any(|name| name == tool.name())
            })
            .cloned()
            .collect()
    }
}

/// Best-effort panic payload rendering for failure records.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload.downcast_ref::<&str>().map_or_else(
        || {
            payload
                .downcast_ref::<String>()
                .cloned()
                .unwrap_or_else(|| "branch panicked".to_owned())
        },
        |s| (*s).to_owned(),
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
