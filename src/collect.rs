//! Error collection — the session's initial work list.
//!
//! Runs each enabled quality tool once against the main workspace, groups
//! the findings by file, and emits one work item per file with at least one
//! finding. Collection has no side effects on the working tree. A tool that
//! crashes contributes no findings and is surfaced as a session warning, not
//! a session failure.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use crate::model::finding::Finding;
use crate::model::state::FileWorkItem;
use crate::tools::{QualityTool, ToolScope};

/// The collector's output: work items plus session warnings.
#[derive(Default)]
pub struct CollectedErrors {
    /// One work item per file with findings, ordered by path.
    pub items: Vec<FileWorkItem>,
    /// Warnings from tools that failed to run.
    pub warnings: Vec<String>,
    /// Total findings across all files.
    pub total_findings: usize,
}

/// Run `tools` project-wide in `workdir` and group findings into work items.
#[must_use]
pub fn collect_work_items(
    workdir: &Path,
    tools: &[Arc<dyn QualityTool>],
    max_attempts: u32,
) -> CollectedErrors {
    let mut by_file: BTreeMap<std::path::PathBuf, Vec<Finding>> = BTreeMap::new();
    let mut warnings = Vec::new();
    let mut total_findings = 0;

    for tool in tools {
        match tool.run(workdir, ToolScope::Project) {
            Ok(findings) => {
                info!(tool = tool.name(), count = findings.len(), "collected findings");
                total_findings += findings.len();
                for finding in findings {
                    by_file
                        .entry(finding.file_path.clone())
                        .or_default()
                        .push(finding);
                }
            }
            Err(e) => {
                warn!(tool = tool.name(), error = %e, "quality tool failed, skipping its findings");
                warnings.push(e.to_string());
            }
        }
    }

    let items = by_file
        .into_iter()
        .map(|(file_path, findings)| FileWorkItem::new(file_path, findings, max_attempts))
        .collect();

    CollectedErrors {
        items,
        warnings,
        total_findings,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::model::finding::Severity;
    use crate::tools::ToolError;

    struct StaticTool {
        name: String,
        findings: Result<Vec<Finding>, String>,
    }

    impl QualityTool for StaticTool {
        fn name(&self) -> &str {
            &self.name
        }

        fn run(&self, _workdir: &Path, _scope: ToolScope<'_>) -> Result<Vec<Finding>, ToolError> {
            match &self.findings {
                Ok(f) => Ok(f.clone()),
                Err(msg) => Err(ToolError {
                    tool: self.name.clone(),
                    message: msg.clone(),
                }),
            }
        }
    }

    fn finding(tool: &str, code: &str, file: &str) -> Finding {
        Finding {
            tool: tool.to_owned(),
            code: code.to_owned(),
            message: "m".to_owned(),
            file_path: PathBuf::from(file),
            line: Some(1),
            column: None,
            severity: Severity::Error,
            auto_fixable: false,
        }
    }

    fn tool(name: &str, findings: Vec<Finding>) -> Arc<dyn QualityTool> {
        Arc::new(StaticTool {
            name: name.to_owned(),
            findings: Ok(findings),
        })
    }

    #[test]
    fn groups_findings_by_file_across_tools() {
        let tools = vec![
            tool("lint", vec![finding("lint", "E1", "a.py"), finding("lint", "E2", "b.py")]),
            tool("types", vec![finding("types", "T1", "a.py")]),
        ];
        let collected = collect_work_items(Path::new("."), &tools, 3);

        assert_eq!(collected.total_findings, 3);
        assert_eq!(collected.items.len(), 2);

        let a = &collected.items[0];
        assert_eq!(a.file_path, PathBuf::from("a.py"));
        assert_eq!(a.findings.len(), 2);
        assert_eq!(a.max_attempts, 3);
        assert_eq!(a.attempts_used, 0);

        let b = &collected.items[1];
        assert_eq!(b.file_path, PathBuf::from("b.py"));
        assert_eq!(b.findings.len(), 1);
    }

    #[test]
    fn clean_tree_produces_no_items() {
        let tools = vec![tool("lint", vec![])];
        let collected = collect_work_items(Path::new("."), &tools, 3);
        assert!(collected.items.is_empty());
        assert!(collected.warnings.is_empty());
    }

    #[test]
    fn failed_tool_becomes_a_warning_and_others_still_count() {
        let tools: Vec<Arc<dyn QualityTool>> = vec![
            Arc::new(StaticTool {
                name: "broken".to_owned(),
                findings: Err("segfault".to_owned()),
            }),
            tool("lint", vec![finding("lint", "E1", "a.py")]),
        ];
        let collected = collect_work_items(Path::new("."), &tools, 3);
        assert_eq!(collected.warnings.len(), 1);
        assert!(collected.warnings[0].contains("broken"));
        assert_eq!(collected.items.len(), 1);
    }
}
