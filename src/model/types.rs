//! Core identifier types for fix sessions.
//!
//! Foundation types used throughout stomper: git revisions, session
//! identifiers, and sandbox identifiers. All are validated at construction
//! so the rest of the code can pass them around without re-checking.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Revision
// ---------------------------------------------------------------------------

/// A validated 40-character lowercase hex Git object ID (SHA-1).
///
/// Used for the session's base revision and for commit ids returned by the
/// diff applicator.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Revision(String);

impl Revision {
    /// Create a new `Revision` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the string is not exactly 40 lowercase hex characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Return the inner hex string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.len() != 40 {
            return Err(ValidationError {
                kind: ErrorKind::Revision,
                value: s.to_owned(),
                reason: format!("expected 40 hex characters, got {}", s.len()),
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase())
        {
            return Err(ValidationError {
                kind: ErrorKind::Revision,
                value: s.to_owned(),
                reason: "must contain only lowercase hex characters (0-9, a-f)".to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Revision {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Revision {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<Revision> for String {
    fn from(rev: Revision) -> Self {
        rev.0
    }
}

// ---------------------------------------------------------------------------
// SessionId
// ---------------------------------------------------------------------------

/// A validated session identifier.
///
/// Session ids are lowercase alphanumeric with hyphens, 1–64 characters.
/// Generated ids look like `fix-3f9a2c41`; callers may supply their own.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// The maximum length of a session id.
    pub const MAX_LEN: usize = 64;

    /// Create a new `SessionId` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the id is empty, too long, or contains invalid characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Generate a fresh session id with a random nonce.
    #[must_use]
    pub fn generate() -> Self {
        let nonce: u32 = rand::random();
        Self(format!("fix-{nonce:08x}"))
    }

    /// Return the session id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.is_empty() {
            return Err(ValidationError {
                kind: ErrorKind::SessionId,
                value: s.to_owned(),
                reason: "session id must not be empty".to_owned(),
            });
        }
        if s.len() > Self::MAX_LEN {
            return Err(ValidationError {
                kind: ErrorKind::SessionId,
                value: s.to_owned(),
                reason: format!(
                    "session id must be at most {} characters, got {}",
                    Self::MAX_LEN,
                    s.len()
                ),
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ValidationError {
                kind: ErrorKind::SessionId,
                value: s.to_owned(),
                reason:
                    "session id must contain only lowercase letters (a-z), digits (0-9), and hyphens (-)"
                        .to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SessionId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// SandboxId
// ---------------------------------------------------------------------------

/// A validated sandbox identifier.
///
/// Sandbox ids are unique within a session and double as directory names, so
/// the character set is restricted the same way as [`SessionId`]. The
/// orchestrator builds them as `<session>-<file-stem>-<nonce>`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SandboxId(String);

impl SandboxId {
    /// The maximum length of a sandbox id.
    pub const MAX_LEN: usize = 128;

    /// Create a new `SandboxId` from a string, validating format.
    ///
    /// # Errors
    /// Returns an error if the id is empty, too long, or contains invalid characters.
    pub fn new(s: &str) -> Result<Self, ValidationError> {
        Self::validate(s)?;
        Ok(Self(s.to_owned()))
    }

    /// Build a sandbox id for one file within a session.
    ///
    /// The file stem is lowercased and sanitized to the id character set;
    /// a random nonce keeps ids unique even if two files share a stem.
    #[must_use]
    pub fn for_file(session: &SessionId, file_stem: &str) -> Self {
        let stem: String = file_stem
            .chars()
            .map(|c| {
                let c = c.to_ascii_lowercase();
                if c.is_ascii_lowercase() || c.is_ascii_digit() {
                    c
                } else {
                    '-'
                }
            })
            .collect();
        let stem = stem.trim_matches('-');
        let stem = if stem.is_empty() { "file" } else { stem };
        let nonce: u32 = rand::random();
        let mut id = format!("{session}-{stem}-{nonce:08x}");
        id.truncate(Self::MAX_LEN);
        Self(id)
    }

    /// Return the sandbox id as a string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(s: &str) -> Result<(), ValidationError> {
        if s.is_empty() {
            return Err(ValidationError {
                kind: ErrorKind::SandboxId,
                value: s.to_owned(),
                reason: "sandbox id must not be empty".to_owned(),
            });
        }
        if s.len() > Self::MAX_LEN {
            return Err(ValidationError {
                kind: ErrorKind::SandboxId,
                value: s.to_owned(),
                reason: format!(
                    "sandbox id must be at most {} characters, got {}",
                    Self::MAX_LEN,
                    s.len()
                ),
            });
        }
        if !s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        {
            return Err(ValidationError {
                kind: ErrorKind::SandboxId,
                value: s.to_owned(),
                reason:
                    "sandbox id must contain only lowercase letters (a-z), digits (0-9), and hyphens (-)"
                        .to_owned(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for SandboxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SandboxId {
    type Err = ValidationError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SandboxId {
    type Error = ValidationError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::validate(&s)?;
        Ok(Self(s))
    }
}

impl From<SandboxId> for String {
    fn from(id: SandboxId) -> Self {
        id.0
    }
}

// ---------------------------------------------------------------------------
// ValidationError
// ---------------------------------------------------------------------------

/// Which identifier kind failed validation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A git revision (40-char hex OID).
    Revision,
    /// A session identifier.
    SessionId,
    /// A sandbox identifier.
    SandboxId,
}

/// An identifier failed validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidationError {
    /// Which identifier kind was being validated.
    pub kind: ErrorKind,
    /// The rejected input.
    pub value: String,
    /// Why the input is invalid.
    pub reason: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.kind {
            ErrorKind::Revision => "revision",
            ErrorKind::SessionId => "session id",
            ErrorKind::SandboxId => "sandbox id",
        };
        write!(f, "invalid {what} '{}': {}", self.value, self.reason)
    }
}

impl std::error::Error for ValidationError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_OID: &str = "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3";

    #[test]
    fn revision_accepts_lowercase_hex() {
        let rev = Revision::new(SAMPLE_OID).unwrap();
        assert_eq!(rev.as_str(), SAMPLE_OID);
        assert_eq!(format!("{rev}"), SAMPLE_OID);
    }

    #[test]
    fn revision_rejects_wrong_length() {
        let err = Revision::new("abc123").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Revision);
        assert!(err.reason.contains("40 hex characters"));
    }

    #[test]
    fn revision_rejects_uppercase() {
        let upper = SAMPLE_OID.to_uppercase();
        let err = Revision::new(&upper).unwrap_err();
        assert!(err.reason.contains("lowercase"));
    }

    #[test]
    fn revision_serde_round_trip() {
        let rev = Revision::new(SAMPLE_OID).unwrap();
        let json = serde_json::to_string(&rev).unwrap();
        assert_eq!(json, format!("\"{SAMPLE_OID}\""));
        let back: Revision = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rev);
    }

    #[test]
    fn revision_serde_rejects_invalid() {
        let res: Result<Revision, _> = serde_json::from_str("\"not-a-revision\"");
        assert!(res.is_err());
    }

    #[test]
    fn session_id_generate_is_valid() {
        let id = SessionId::generate();
        assert!(SessionId::new(id.as_str()).is_ok());
        assert!(id.as_str().starts_with("fix-"));
    }

    #[test]
    fn session_id_rejects_uppercase_and_empty() {
        assert!(SessionId::new("Fix-1").is_err());
        assert!(SessionId::new("").is_err());
    }

    #[test]
    fn session_id_rejects_too_long() {
        let long = "a".repeat(SessionId::MAX_LEN + 1);
        let err = SessionId::new(&long).unwrap_err();
        assert!(err.reason.contains("at most"));
    }

    #[test]
    fn sandbox_id_for_file_sanitizes_stem() {
        let session = SessionId::new("fix-00000001").unwrap();
        let id = SandboxId::for_file(&session, "My_Module.Name");
        assert!(SandboxId::new(id.as_str()).is_ok());
        assert!(id.as_str().contains("my-module-name"));
        assert!(id.as_str().starts_with("fix-00000001-"));
    }

    #[test]
    fn sandbox_id_for_file_handles_degenerate_stem() {
        let session = SessionId::new("fix-00000001").unwrap();
        let id = SandboxId::for_file(&session, "___");
        assert!(id.as_str().contains("-file-"));
    }

    #[test]
    fn sandbox_ids_for_same_stem_differ() {
        let session = SessionId::new("fix-00000001").unwrap();
        let a = SandboxId::for_file(&session, "main");
        let b = SandboxId::for_file(&session, "main");
        assert_ne!(a, b);
    }

    #[test]
    fn validation_error_display_names_the_kind() {
        let err = SandboxId::new("UPPER").unwrap_err();
        let msg = format!("{err}");
        assert!(msg.contains("sandbox id"));
        assert!(msg.contains("UPPER"));
    }
}
