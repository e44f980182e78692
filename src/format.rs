//! Output format selection for the CLI.

use std::str::FromStr;

use anyhow::{Result, bail};
use serde::Serialize;

/// Output format for session reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Compact human-readable text.
    #[default]
    Text,
    /// Machine-parseable JSON.
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            _ => bail!("Invalid format '{s}'. Use: text or json"),
        }
    }
}

impl OutputFormat {
    /// Serialize data for the JSON format.
    ///
    /// # Errors
    /// Returns an error for the text format (which uses custom printing) or
    /// if serialization fails.
    pub fn serialize<T: Serialize>(self, data: &T) -> Result<String> {
        match self {
            Self::Json => serde_json::to_string_pretty(data)
                .map_err(|e| anyhow::anyhow!("JSON serialization failed: {e}")),
            Self::Text => bail!("text format should not use serialize()"),
        }
    }
}
