//! Local process handles for commands running in a remote shell
//!
//! Remote shell protocols such as WinRM offer no blocking reads or writes:
//! a client creates a shell, submits a command, polls for chunks of output,
//! signals and finally deletes the shell. This crate hides that protocol
//! behind a conventional process handle with stdout/stderr pipes, `wait`,
//! `destroy` and an exit status.
//!
//! The protocol itself is provided by an implementation of [`ShellSession`];
//! [`RemoteShellConnection`] starts a command on a fresh session, drains its
//! output in the background and hands back a [`RemoteProcess`].

#![warn(missing_docs)]

pub mod command;
pub mod config;
pub mod connection;
pub mod drain;
pub mod error;
pub mod handle;
pub mod pipe;
pub mod process;
pub mod session;
pub mod spawn;

pub use command::{CommandArgument, CommandInvocation, CommandLine};
pub use config::ConnectionOptions;
pub use connection::RemoteShellConnection;
pub use drain::DrainOutcome;
pub use error::{Error, Result};
pub use handle::{ProcessState, RemoteProcess};
pub use pipe::{pipe, PipeConfig, PipeReader, PipeWriter};
pub use process::{ExecutionResult, ExitOutcome, ExitStatus, ProcessHandle};
pub use session::{SessionFactory, SessionSettings, ShellSession};
pub use spawn::{Spawner, ThreadSpawner};

/// Endpoint URL type used by sessions and options
pub use reqwest::Url;

#[cfg(feature = "smol")]
pub use spawn::SmolSpawner;
#[cfg(feature = "tokio")]
pub use spawn::TokioSpawner;
