//! Process management traits and types

use async_trait::async_trait;
use crate::error::Result;

/// A handle to control a started remote process
#[async_trait]
pub trait ProcessHandle: Send + Sync {
    /// Wait for the process to complete and return its exit status
    ///
    /// Idempotent: once terminated, the cached status is returned.
    async fn wait(&self) -> Result<ExitStatus>;

    /// Forcibly end the process without waiting for its output
    ///
    /// A no-op once the process has terminated.
    async fn destroy(&self) -> Result<()>;

    /// Exit status of a terminated process
    ///
    /// Fails with [`Error::StillRunning`](crate::Error::StillRunning) while
    /// the process is still running.
    async fn exit_value(&self) -> Result<ExitStatus>;

    /// Exit status if the process has terminated, `None` while it runs
    async fn try_wait(&self) -> Option<ExitStatus> {
        self.exit_value().await.ok()
    }
}

/// How a process reached its terminal state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitOutcome {
    /// The remote command finished producing output normally
    Completed,
    /// Output could not be drained; the exit code may be missing or stale
    Failed {
        /// The error that ended the output drain
        reason: String,
    },
    /// The process was destroyed before it finished
    Destroyed,
    /// Waiting for the output drain was cut short
    Interrupted {
        /// Why the wait did not complete
        reason: String,
    },
}

/// Process exit status
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitStatus {
    /// Exit code reported by the remote shell, if it reported one
    pub code: Option<i32>,
    /// How the process terminated
    pub outcome: ExitOutcome,
}

impl ExitStatus {
    /// Returns true if the command completed with exit code 0
    pub fn success(&self) -> bool {
        self.outcome == ExitOutcome::Completed && self.code == Some(0)
    }

    /// Returns true if the process was destroyed by the caller
    pub fn destroyed(&self) -> bool {
        self.outcome == ExitOutcome::Destroyed
    }
}

/// Result of running a command to completion
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    /// The exit status
    pub status: ExitStatus,
    /// Everything written to standard output
    pub stdout: Vec<u8>,
    /// Everything written to standard error
    pub stderr: Vec<u8>,
}

impl ExecutionResult {
    /// Standard output decoded lossily as UTF-8
    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    /// Standard error decoded lossily as UTF-8
    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_requires_completion() {
        let ok = ExitStatus {
            code: Some(0),
            outcome: ExitOutcome::Completed,
        };
        assert!(ok.success());

        let failed = ExitStatus {
            code: Some(0),
            outcome: ExitOutcome::Failed {
                reason: "timeout".into(),
            },
        };
        assert!(!failed.success());

        let destroyed = ExitStatus {
            code: None,
            outcome: ExitOutcome::Destroyed,
        };
        assert!(!destroyed.success());
        assert!(destroyed.destroyed());
    }
}
