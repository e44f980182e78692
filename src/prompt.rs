//! Prompt-builder capability.
//!
//! Turns a file's findings (and, on retries, feedback about the previous
//! attempt) into the instruction text handed to the fixing agent. Builders
//! must be deterministic: the same findings and feedback always produce the
//! same prompt, so retries differ only through the feedback channel.

use std::path::Path;

use crate::model::finding::Finding;

/// Produces fix instructions for the agent.
pub trait PromptBuilder: Send + Sync {
    /// Build the prompt for one attempt on one file.
    fn build(&self, file_path: &Path, findings: &[Finding], feedback: Option<&str>) -> String;
}

/// The stock prompt builder.
///
/// Emits a fixed-shape instruction: the file under repair, one line per
/// finding, the ground rules (fix only this file, no history rewrites), and
/// the previous attempt's feedback when present.
pub struct TemplatePromptBuilder;

impl PromptBuilder for TemplatePromptBuilder {
    fn build(&self, file_path: &Path, findings: &[Finding], feedback: Option<&str>) -> String {
        let mut prompt = String::new();
        prompt.push_str(&format!(
            "Fix the following quality issues in `{}`.\n\n",
            file_path.display()
        ));
        prompt.push_str("Issues:\n");
        for finding in findings {
            prompt.push_str(&format!("  - {}\n", finding.summary()));
        }
        prompt.push_str(
            "\nRules:\n\
             - Edit only the file named above; changes elsewhere are discarded.\n\
             - Preserve behavior; fix the reported issues, nothing else.\n\
             - Do not run version-control commands or rewrite history.\n",
        );
        if let Some(feedback) = feedback {
            prompt.push_str(&format!(
                "\nYour previous attempt did not resolve everything:\n{feedback}\n"
            ));
        }
        prompt
    }
}
