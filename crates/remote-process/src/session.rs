//! The remote shell capability consumed by the bridge
//!
//! A [`ShellSession`] wraps one remote shell created for one command. The
//! protocol behind it is poll-based: the bridge submits a command, then keeps
//! asking for the next chunk of output until the session says it is done. The
//! wire format, transport and authentication all live behind this trait.

use async_trait::async_trait;
use reqwest::Url;
use std::sync::Arc;

use crate::error::Result;
use crate::pipe::PipeWriter;

/// One remote shell running (at most) one command
///
/// All methods take `&self`: the drain loop polls for output while the process
/// handle may concurrently signal or delete the shell, so implementations use
/// interior mutability for their own bookkeeping.
#[async_trait]
pub trait ShellSession: Send + Sync {
    /// Submit the command for execution in the remote shell
    async fn start_cmd(&self, command: &str) -> Result<()>;

    /// Write whatever output is currently available to the sinks
    ///
    /// Returns `true` if more output may still be produced and the caller
    /// should poll again, `false` once the remote command has finished.
    async fn receive_output(
        &self,
        stdout: &mut PipeWriter,
        stderr: &mut PipeWriter,
    ) -> Result<bool>;

    /// Ask the remote side to terminate the running command
    async fn signal(&self) -> Result<()>;

    /// Release the remote shell
    ///
    /// Must tolerate shells that were already deleted or never fully started.
    async fn delete_shell(&self) -> Result<()>;

    /// Exit code reported by the remote side, once output production ended
    fn exit_value(&self) -> Option<i32>;
}

/// Per-shell settings passed through to the session untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Operation timeout, as the protocol expects it (e.g. `PT60.000S`)
    pub timeout: String,
    /// Maximum size of a response envelope in bytes
    pub envelope_size: u32,
    /// Locale requested for the remote shell
    pub locale: String,
}

/// Creates a fresh [`ShellSession`] for every started process
pub trait SessionFactory: Send + Sync {
    /// Create a session talking to `endpoint`
    fn create(&self, endpoint: &Url, settings: &SessionSettings) -> Result<Arc<dyn ShellSession>>;
}

impl<F> SessionFactory for F
where
    F: Fn(&Url, &SessionSettings) -> Result<Arc<dyn ShellSession>> + Send + Sync,
{
    fn create(&self, endpoint: &Url, settings: &SessionSettings) -> Result<Arc<dyn ShellSession>> {
        self(endpoint, settings)
    }
}
