//! Per-file fix pipeline.
//!
//! One branch runs this pipeline to completion for one file:
//! `create_sandbox → build_prompt → invoke_agent → verify → run_tests →
//! extract_diff → land (apply + commit under exclusion) → destroy_sandbox`.
//!
//! Retry is a self-loop from verify back to build_prompt: the sandbox is
//! kept (partial progress from a prior attempt is deliberately preserved)
//! and the next prompt carries feedback about what is still wrong. Every
//! exit path, success or failure, destroys the sandbox.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, instrument, warn};

use crate::agent::Agent;
use crate::apply::{DiffApplicator, LandError};
use crate::config::TestValidation;
use crate::error::FailureReason;
use crate::model::finding::Finding;
use crate::model::state::{BranchOutcome, FailureRecord, FileWorkItem, FixRecord};
use crate::model::types::{Revision, SandboxId, SessionId};
use crate::prompt::PromptBuilder;
use crate::sandbox::{AnySandbox, SandboxBackend as _};
use crate::testrun::{TestOutcome, TestRunner};
use crate::tools::{QualityTool, ToolScope};
use crate::vcs::Vcs;

// ---------------------------------------------------------------------------
// BranchContext
// ---------------------------------------------------------------------------

/// Everything a branch needs, shared read-only across all branches.
pub struct BranchContext<'a> {
    /// The session id, used in sandbox ids.
    pub session_id: &'a SessionId,
    /// The base revision sandboxes are pinned to.
    pub base_revision: &'a Revision,
    /// Root of the main workspace.
    pub main_root: &'a Path,
    /// Enabled quality tools, used for in-sandbox verification.
    pub tools: &'a [Arc<dyn QualityTool>],
    /// Builds fix prompts.
    pub prompt_builder: &'a dyn PromptBuilder,
    /// The fixing agent.
    pub agent: &'a dyn Agent,
    /// Validation test runner.
    pub test_runner: &'a dyn TestRunner,
    /// Version control operations.
    pub vcs: &'a dyn Vcs,
    /// Sandbox backend for this session.
    pub sandbox: &'a AnySandbox,
    /// The serialized apply + commit path.
    pub applicator: &'a DiffApplicator,
    /// Test validation mode.
    pub test_validation: TestValidation,
    /// Whether branches run in real sandboxes (false = direct mode, where
    /// the agent edits the main workspace and landing is commit-only).
    pub use_sandbox: bool,
    /// External cancellation flag; branches check it between steps.
    pub cancel: &'a AtomicBool,
}

impl BranchContext<'_> {
    fn cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// process_file
// ---------------------------------------------------------------------------

/// Run the full fix pipeline for one file.
///
/// Never panics outward by contract (the scheduler still guards the branch
/// boundary); every outcome is classified into [`BranchOutcome`].
#[instrument(skip_all, fields(file = %item.file_path.display()))]
pub fn process_file(ctx: &BranchContext<'_>, item: FileWorkItem) -> BranchOutcome {
    if ctx.cancelled() {
        return BranchOutcome::Skipped {
            file_path: item.file_path,
        };
    }

    if !ctx.main_root.join(&item.file_path).exists() {
        return BranchOutcome::Failed(FailureRecord {
            file_path: item.file_path,
            reason: FailureReason::FileMissing,
            attempts_used: 0,
        });
    }

    let sandbox_id = SandboxId::for_file(ctx.session_id, &item.file_stem());
    let sandbox_path = match ctx.sandbox.create(&sandbox_id, ctx.base_revision) {
        Ok(path) => path,
        Err(e) => {
            return BranchOutcome::Failed(FailureRecord {
                file_path: item.file_path,
                reason: FailureReason::SandboxFailed {
                    detail: e.to_string(),
                },
                attempts_used: 0,
            });
        }
    };

    // Destroy on every exit path, including an unwinding branch; a failed
    // destroy never changes the outcome.
    let _guard = SandboxGuard {
        sandbox: ctx.sandbox,
        id: sandbox_id,
    };

    run_attempts(ctx, item, &sandbox_path)
}

struct SandboxGuard<'a> {
    sandbox: &'a AnySandbox,
    id: SandboxId,
}

impl Drop for SandboxGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.sandbox.destroy(&self.id) {
            warn!(sandbox = %self.id, error = %e, "failed to destroy sandbox");
        }
    }
}

/// The attempt loop: build prompt, invoke agent, verify, test, extract, land.
fn run_attempts(
    ctx: &BranchContext<'_>,
    mut item: FileWorkItem,
    sandbox_path: &Path,
) -> BranchOutcome {
    loop {
        if ctx.cancelled() {
            return BranchOutcome::Skipped {
                file_path: item.file_path,
            };
        }

        item.attempts_used += 1;
        debug!(attempt = item.attempts_used, max = item.max_attempts, "starting fix attempt");

        let prompt = ctx.prompt_builder.build(
            &item.file_path,
            &item.findings,
            item.last_feedback.as_deref(),
        );

        if let Err(e) = ctx.agent.invoke(&prompt, sandbox_path) {
            if item.attempts_remaining() {
                item.last_feedback = Some(format!("The fixing agent failed to run: {e}"));
                continue;
            }
            return fail(item, FailureReason::AgentUnableToFix {
                detail: e.to_string(),
            });
        }

        // Verify: re-run the enabled tools against just this file, inside
        // the sandbox, and compare against the original findings.
        let post = match verify_findings(ctx, sandbox_path, &item.file_path) {
            Ok(findings) => findings,
            Err(detail) => {
                if item.attempts_remaining() {
                    item.last_feedback = Some(format!("Verification could not run: {detail}"));
                    continue;
                }
                return fail(item, FailureReason::NoProgress);
            }
        };

        let report = evaluate_verification(&item.findings, &post);
        if !report.strictly_improved() {
            debug!(
                remaining = report.remaining.len(),
                introduced = report.introduced.len(),
                "verification not strictly improved"
            );
            if item.attempts_remaining() {
                item.last_feedback = Some(report.feedback());
                continue;
            }
            return fail(item, FailureReason::NoProgress);
        }

        // Test validation (full/quick run here; final/none are skipped).
        if ctx.test_validation.runs_in_sandbox() {
            let tested = ctx
                .test_runner
                .run(sandbox_path, &item.file_path, ctx.test_validation);
            match tested {
                Ok(TestOutcome::Passed) => {}
                Ok(TestOutcome::Failed { detail }) => {
                    if item.attempts_remaining() {
                        item.last_feedback =
                            Some(format!("The fix broke tests:\n{detail}"));
                        continue;
                    }
                    return fail(item, FailureReason::TestsRegressed);
                }
                Err(e) => {
                    if item.attempts_remaining() {
                        item.last_feedback = Some(format!("Tests could not run: {e}"));
                        continue;
                    }
                    return fail(item, FailureReason::TestsRegressed);
                }
            }
        }

        // Extract the patch, scoped to this file. Agent edits to any other
        // path are discarded here by construction.
        let patch = match ctx
            .vcs
            .diff_path(sandbox_path, ctx.base_revision, &item.file_path)
        {
            Ok(patch) => patch,
            Err(e) => {
                return fail(item, FailureReason::Internal {
                    detail: format!("diff extraction failed: {e}"),
                });
            }
        };

        if patch.is_empty() {
            // No textual change. If every finding is gone anyway (tool-side
            // auto-fix), that is a success with nothing to commit; otherwise
            // the agent did nothing useful.
            if post.is_empty() {
                info!(errors_fixed = report.resolved, "findings resolved without a textual diff");
                return fixed(item, report.resolved, None);
            }
            return fail(item, FailureReason::NoChange);
        }

        // Critical section: apply + commit, serialized across the session.
        // In direct mode the "sandbox" is the main workspace and the change
        // is already in place, so landing is commit-only.
        let landed = if ctx.use_sandbox {
            ctx.applicator.land(&item.file_path, &patch)
        } else {
            ctx.applicator.land_in_place(&item.file_path)
        };

        return match landed {
            Ok(revision) => {
                info!(revision = %revision, errors_fixed = report.resolved, "fix landed");
                fixed(item, report.resolved, Some(revision))
            }
            Err(LandError::Conflict { detail }) => {
                // Base drifted; retrying the same patch cannot help.
                debug!(%detail, "patch rejected by main workspace");
                fail(item, FailureReason::PatchConflict)
            }
            Err(LandError::Git(e)) => fail(item, FailureReason::Internal {
                detail: format!("landing failed: {e}"),
            }),
        };
    }
}

fn fixed(item: FileWorkItem, errors_fixed: u32, revision: Option<Revision>) -> BranchOutcome {
    BranchOutcome::Fixed(FixRecord {
        file_path: item.file_path,
        errors_fixed,
        attempts_used: item.attempts_used,
        revision,
    })
}

fn fail(item: FileWorkItem, reason: FailureReason) -> BranchOutcome {
    BranchOutcome::Failed(FailureRecord {
        file_path: item.file_path,
        reason,
        attempts_used: item.attempts_used,
    })
}

/// Run every enabled tool file-scoped in the sandbox and pool the findings.
fn verify_findings(
    ctx: &BranchContext<'_>,
    sandbox_path: &Path,
    file_path: &Path,
) -> Result<Vec<Finding>, String> {
    let mut findings = Vec::new();
    for tool in ctx.tools {
        let mut found = tool
            .run(sandbox_path, ToolScope::File(file_path))
            .map_err(|e| e.to_string())?;
        findings.append(&mut found);
    }
    Ok(findings)
}

// ---------------------------------------------------------------------------
// Verification comparison
// ---------------------------------------------------------------------------

/// Comparison of post-agent findings against the originals.
#[derive(Debug)]
pub struct VerifyReport {
    /// Post-agent findings whose codes were in the original set.
    pub remaining: Vec<Finding>,
    /// Post-agent findings with codes the original set never had.
    pub introduced: Vec<Finding>,
    /// How many original findings are gone.
    pub resolved: u32,
}

impl VerifyReport {
    /// Strict improvement: something resolved, nothing new introduced.
    #[must_use]
    pub const fn strictly_improved(&self) -> bool {
        self.resolved > 0 && self.introduced.is_empty()
    }

    /// Feedback text for the next attempt's prompt.
    #[must_use]
    pub fn feedback(&self) -> String {
        let mut text = String::new();
        if self.remaining.is_empty() && self.introduced.is_empty() {
            text.push_str("No findings changed.");
            return text;
        }
        if !self.remaining.is_empty() {
            text.push_str("Still unresolved:\n");
            for finding in &self.remaining {
                text.push_str(&format!("  - {}\n", finding.summary()));
            }
        }
        if !self.introduced.is_empty() {
            text.push_str("Newly introduced (these must not appear):\n");
            for finding in &self.introduced {
                text.push_str(&format!("  - {}\n", finding.summary()));
            }
        }
        text
    }
}

/// Compare findings by code multiset.
///
/// Each post-agent finding consumes one budget slot for its code; findings
/// beyond the original per-code count (or with unseen codes) are
/// "introduced". Line numbers are ignored — a fix legitimately shifts them.
#[must_use]
pub fn evaluate_verification(original: &[Finding], post: &[Finding]) -> VerifyReport {
    let mut budget: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
    for finding in original {
        *budget.entry(finding.code.as_str()).or_insert(0) += 1;
    }

    let mut remaining = Vec::new();
    let mut introduced = Vec::new();
    for finding in post {
        match budget.get_mut(finding.code.as_str()) {
            Some(count) if *count > 0 => {
                *count -= 1;
                remaining.push(finding.clone());
            }
            _ => introduced.push(finding.clone()),
        }
    }

    let resolved =
        u32::try_from(original.len().saturating_sub(remaining.len())).unwrap_or(u32::MAX);

    VerifyReport {
        remaining,
        introduced,
        resolved,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
