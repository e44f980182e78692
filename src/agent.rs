//! Fixing-agent capability.
//!
//! [`Agent`] is the seam to whatever actually edits files — typically an AI
//! coding CLI. The orchestrator treats invocation as an opaque, time-bounded
//! procedure: the agent gets a prompt and a working directory, may mutate
//! files there, and must not touch git history. Everything else (model,
//! shell, platform quirks) is the agent's own business.

use std::fmt;
use std::io::{Read as _, Seek as _, Write as _};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::debug;

/// How long to sleep between child exit polls.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How much captured stderr to keep in error messages.
const STDERR_TAIL: usize = 2000;

// ---------------------------------------------------------------------------
// AgentError
// ---------------------------------------------------------------------------

/// An agent invocation failed.
#[derive(Debug)]
pub enum AgentError {
    /// The agent process could not be spawned.
    Spawn {
        /// The program that failed to start.
        program: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },
    /// The agent exceeded its time budget and was killed.
    TimedOut {
        /// The budget that was exceeded.
        after: Duration,
    },
    /// The agent exited with a failure status.
    Failed {
        /// The process exit code, if any.
        exit_code: Option<i32>,
        /// Tail of the agent's stderr.
        stderr: String,
    },
    /// An I/O error occurred while driving the agent.
    Io(std::io::Error),
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Spawn { program, source } => {
                write!(f, "failed to start agent '{program}': {source}")
            }
            Self::TimedOut { after } => {
                write!(f, "agent timed out after {}s", after.as_secs())
            }
            Self::Failed { exit_code, stderr } => {
                match exit_code {
                    Some(code) => write!(f, "agent exited with code {code}")?,
                    None => write!(f, "agent was killed by a signal")?,
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

impl std::error::Error for AgentError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn { source, .. } => Some(source),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for AgentError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

// ---------------------------------------------------------------------------
// Agent
// ---------------------------------------------------------------------------

/// Something that can attempt a fix in a working directory.
pub trait Agent: Send + Sync {
    /// Run one fix attempt. Success means the agent believes it is done;
    /// verification decides whether the fix is real.
    ///
    /// # Errors
    /// Returns an error when the agent cannot run, times out, or reports
    /// failure.
    fn invoke(&self, prompt: &str, working_dir: &Path) -> Result<(), AgentError>;
}

// ---------------------------------------------------------------------------
// CommandAgent
// ---------------------------------------------------------------------------

/// Command-backed agent.
///
/// Spawns the configured argv with the sandbox as its working directory and
/// the prompt piped to stdin. The timeout is enforced by polling: on expiry
/// the child is killed and the attempt reported as timed out. stderr goes to
/// a temp file rather than a pipe so a chatty agent cannot deadlock against
/// an unread pipe buffer.
pub struct CommandAgent {
    argv: Vec<String>,
    timeout: Duration,
}

impl CommandAgent {
    /// Create an agent adapter from a command argv and time budget.
    #[must_use]
    pub const fn new(argv: Vec<String>, timeout: Duration) -> Self {
        Self { argv, timeout }
    }
}

impl Agent for CommandAgent {
    fn invoke(&self, prompt: &str, working_dir: &Path) -> Result<(), AgentError> {
        let Some((program, args)) = self.argv.split_first() else {
            return Err(AgentError::Spawn {
                program: "<empty>".to_owned(),
                source: std::io::Error::other("agent command is empty"),
            });
        };

        let mut stderr_file = tempfile::tempfile()?;
        let stderr_handle = stderr_file.try_clone()?;

        let mut child = Command::new(program)
            .args(args)
            .current_dir(working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::from(stderr_handle))
            .spawn()
            .map_err(|source| AgentError::Spawn {
                program: program.clone(),
                source,
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // A dead child closes the pipe; that is not our failure.
            let _ = stdin.write_all(prompt.as_bytes());
        }

        let started = Instant::now();
        let status = loop {
            if let Some(status) = child.try_wait()? {
                break status;
            }
            if started.elapsed() >= self.timeout {
                debug!(timeout_secs = self.timeout.as_secs(), "killing timed-out agent");
                let _ = child.kill();
                let _ = child.wait();
                return Err(AgentError::TimedOut {
                    after: self.timeout,
                });
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        if status.success() {
            Ok(())
        } else {
            let mut stderr = String::new();
            stderr_file.rewind()?;
            stderr_file.read_to_string(&mut stderr)?;
            Err(AgentError::Failed {
                exit_code: status.code(),
                stderr: tail(stderr.trim(), STDERR_TAIL).to_owned(),
            })
        }
    }
}

/// Last `max` bytes of `s`, rounded forward to a character boundary.
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
