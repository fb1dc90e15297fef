//! Error types for remote process execution

use thiserror::Error;

/// Unified error type for remote process execution
#[derive(Error, Debug)]
pub enum Error {
    /// Connection options could not be resolved into a usable target
    #[error("invalid connection configuration: {reason}")]
    Config {
        /// The reason the configuration was rejected
        reason: String,
    },

    /// The transport to the remote shell failed
    #[error("transport error talking to remote shell: {reason}")]
    Transport {
        /// The detailed reason for the transport failure
        reason: String,
    },

    /// The remote shell answered with something the session could not use
    #[error("remote shell protocol error: {reason}")]
    Protocol {
        /// The detailed reason for the protocol failure
        reason: String,
    },

    /// The exit status was requested before the process terminated
    #[error("process for command [{command}] is still running")]
    StillRunning {
        /// The obfuscated command line of the running process
        command: String,
    },

    /// Waiting for the output drain could not complete
    #[error("cannot execute command [{command}]: {reason}")]
    Interrupted {
        /// The obfuscated command line of the process
        command: String,
        /// Why the wait was cut short
        reason: String,
    },

    /// I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Options file could not be parsed
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

// For convenience, re-export specific error constructors
impl Error {
    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Create a transport error
    pub fn transport(reason: impl Into<String>) -> Self {
        Self::Transport {
            reason: reason.into(),
        }
    }

    /// Create a protocol error
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    /// Prefix the error message with the command it happened for
    pub fn with_command_context(self, command: &str) -> Self {
        match self {
            Error::Transport { reason } => Error::Transport {
                reason: format!("cannot execute command [{}]: {}", command, reason),
            },
            Error::Protocol { reason } => Error::Protocol {
                reason: format!("cannot execute command [{}]: {}", command, reason),
            },
            other => other,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
