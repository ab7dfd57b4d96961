//! Error types for shell execution

use thiserror::Error;

/// Unified error type for shell execution
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to spawn a process
    #[error("failed to spawn process: {reason}")]
    SpawnFailed {
        /// The reason for the spawn failure
        reason: String,
    },

    /// Command not found
    #[error("command not found: {command}")]
    CommandNotFound {
        /// The command that was not found
        command: String,
    },

    /// Failed to write the temporary script for a multi-line command
    #[error("failed to materialize script: {reason}")]
    ScriptFailed {
        /// The reason the script could not be written or made executable
        reason: String,
    },

    /// Process finished with a nonzero exit code while `throw_on_nonzero` was set
    #[error("shell exit with code {code}, {stderr}")]
    NonZeroExit {
        /// The command text that was run
        command: String,
        /// The exit code reported for the process
        code: i32,
        /// Everything the process wrote to stderr
        stderr: String,
    },

    /// The child's stdin is no longer writable
    #[error("stdin of the process is closed")]
    StdinClosed,

    /// Failed to send signal to process
    #[error("failed to send signal {signal}: {reason}")]
    SignalFailed {
        /// The signal number that failed to send
        signal: i32,
        /// The reason for the signal failure
        reason: String,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Nix error (Unix signal handling)
    #[cfg(unix)]
    #[error(transparent)]
    Nix(#[from] nix::Error),
}

impl Error {
    /// Create a spawn failed error
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }

    /// Create a script failed error
    pub fn script_failed(reason: impl Into<String>) -> Self {
        Self::ScriptFailed {
            reason: reason.into(),
        }
    }

    /// Create a signal failed error
    pub fn signal_failed(signal: i32, reason: impl Into<String>) -> Self {
        Self::SignalFailed {
            signal,
            reason: reason.into(),
        }
    }

    /// Whether this error happened before a request existed
    pub fn is_launch_failure(&self) -> bool {
        matches!(
            self,
            Error::SpawnFailed { .. } | Error::CommandNotFound { .. } | Error::ScriptFailed { .. }
        )
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_non_zero_exit_message_carries_stderr() {
        let err = Error::NonZeroExit {
            command: "exit 3".to_string(),
            code: 3,
            stderr: "boom\n".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("code 3"));
        assert!(message.contains("boom"));
        assert!(!err.is_launch_failure());
    }

    #[test]
    fn test_launch_failures() {
        assert!(Error::spawn_failed("nope").is_launch_failure());
        assert!(Error::script_failed("read-only").is_launch_failure());
        assert!(
            Error::CommandNotFound {
                command: "missing".into()
            }
            .is_launch_failure()
        );
    }
}
