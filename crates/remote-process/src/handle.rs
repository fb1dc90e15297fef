//! Process handle over a remote shell
//!
//! [`RemoteProcess`] presents a started remote command as a conventional
//! process: output pipes, wait, destroy and an exit status. Its state is a
//! two-state machine (`Running` → `Terminated`) behind a single lock per
//! handle. Every transition happens under that lock together with the remote
//! shell deletion, and the deletion is recorded before it is awaited, so the
//! shell is deleted at most once no matter how `wait`, `destroy` and drop race
//! or get cancelled.
//!
//! The lock is not held while joining the output drain, so `destroy` is never
//! stuck behind a pending `wait`.

use async_trait::async_trait;
use futures::io::Sink;
use futures::lock::Mutex;
use futures::FutureExt;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::command::CommandInvocation;
use crate::drain::{DrainJoin, DrainOutcome};
use crate::error::{Error, Result};
use crate::pipe::PipeReader;
use crate::process::{ExitOutcome, ExitStatus, ProcessHandle};
use crate::session::ShellSession;
use crate::spawn::Spawner;

/// Lifecycle of a remote process; never goes back to `Running`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessState {
    /// The remote shell exists and may still produce output
    Running,
    /// The remote shell was deleted; the status is final
    Terminated(ExitStatus),
}

/// Everything guarded by the per-handle lock
struct Lifecycle {
    state: ProcessState,
    /// Set before the remote delete is awaited, so a caller dropped mid-delete
    /// never leaves the shell to be deleted a second time
    shell_deleted: bool,
}

/// State shared with background cleanup tasks
struct Shared {
    session: Arc<dyn ShellSession>,
    invocation: Arc<CommandInvocation>,
    lifecycle: Mutex<Lifecycle>,
}

impl Shared {
    /// Delete the remote shell unless that was already attempted
    async fn delete_shell(&self, lifecycle: &mut Lifecycle) {
        if lifecycle.shell_deleted {
            return;
        }
        lifecycle.shell_deleted = true;
        match self.session.delete_shell().await {
            Ok(()) => debug!(command = %self.invocation, "Deleted remote shell"),
            Err(e) => warn!(command = %self.invocation, error = %e, "Failed to delete remote shell"),
        }
    }

    fn status(&self, outcome: ExitOutcome) -> ExitStatus {
        ExitStatus {
            code: self.session.exit_value(),
            outcome,
        }
    }

    /// Signal and delete under an already held lock
    async fn destroy_locked(&self, lifecycle: &mut Lifecycle) -> Result<()> {
        if matches!(lifecycle.state, ProcessState::Terminated(_)) {
            return Ok(());
        }

        info!(command = %self.invocation, "Destroying remote process");
        let mut signalled = Ok(());
        if !lifecycle.shell_deleted {
            signalled = self.session.signal().await;
            if let Err(e) = &signalled {
                warn!(command = %self.invocation, error = %e, "Failed to signal remote process");
            }
        }
        self.delete_shell(lifecycle).await;
        lifecycle.state = ProcessState::Terminated(self.status(ExitOutcome::Destroyed));

        signalled.map_err(|e| e.with_command_context(self.invocation.obfuscated()))
    }

    /// Delete and mark interrupted unless something else terminated us first
    async fn interrupt(&self, reason: &str) -> ExitStatus {
        let mut lifecycle = self.lifecycle.lock().await;
        if let ProcessState::Terminated(status) = &lifecycle.state {
            return status.clone();
        }
        self.delete_shell(&mut lifecycle).await;
        let status = self.status(ExitOutcome::Interrupted {
            reason: reason.to_string(),
        });
        lifecycle.state = ProcessState::Terminated(status.clone());
        status
    }
}

/// Finishes an abandoned `wait` in the background
///
/// Armed while `wait` is joining the drain; if the wait future is dropped
/// before it disarms, the shell is still deleted.
struct WaitGuard {
    shared: Arc<Shared>,
    spawner: Arc<dyn Spawner>,
    armed: bool,
}

impl WaitGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for WaitGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let shared = self.shared.clone();
        let name = "remote shell cleanup after cancelled wait";
        let task = async move {
            shared.interrupt("wait was cancelled").await;
        };
        if let Err(e) = self.spawner.spawn(name, task.boxed()) {
            warn!(command = %self.shared.invocation, error = %e, "Cannot clean up remote shell");
        }
    }
}

/// A command running in a remote shell
pub struct RemoteProcess {
    shared: Arc<Shared>,
    drain: DrainJoin,
    stdout: Option<PipeReader>,
    stderr: Option<PipeReader>,
    spawner: Arc<dyn Spawner>,
    kill_on_drop: bool,
}

impl RemoteProcess {
    pub(crate) fn new(
        session: Arc<dyn ShellSession>,
        invocation: Arc<CommandInvocation>,
        drain: DrainJoin,
        stdout: PipeReader,
        stderr: PipeReader,
        spawner: Arc<dyn Spawner>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                session,
                invocation,
                lifecycle: Mutex::new(Lifecycle {
                    state: ProcessState::Running,
                    shell_deleted: false,
                }),
            }),
            drain,
            stdout: Some(stdout),
            stderr: Some(stderr),
            spawner,
            kill_on_drop: true,
        }
    }

    /// Destroy the remote process in the background if dropped while running
    pub fn kill_on_drop(mut self, kill_on_drop: bool) -> Self {
        self.kill_on_drop = kill_on_drop;
        self
    }

    /// The started command
    pub fn command(&self) -> &CommandInvocation {
        &self.shared.invocation
    }

    /// Sink for standard input
    ///
    /// The remote shell protocol offers no way to stream input to a command
    /// after it was started. Writes succeed but are discarded locally.
    pub fn stdin(&self) -> Sink {
        futures::io::sink()
    }

    /// Standard output, unless it was taken
    pub fn stdout(&mut self) -> Option<&mut PipeReader> {
        self.stdout.as_mut()
    }

    /// Standard error, unless it was taken
    pub fn stderr(&mut self) -> Option<&mut PipeReader> {
        self.stderr.as_mut()
    }

    /// Move standard output out of the handle
    pub fn take_stdout(&mut self) -> Option<PipeReader> {
        self.stdout.take()
    }

    /// Move standard error out of the handle
    pub fn take_stderr(&mut self) -> Option<PipeReader> {
        self.stderr.take()
    }

    /// Current lifecycle state
    pub async fn state(&self) -> ProcessState {
        self.shared.lifecycle.lock().await.state.clone()
    }

    /// Whether the process has not terminated yet
    pub async fn is_running(&self) -> bool {
        matches!(self.shared.lifecycle.lock().await.state, ProcessState::Running)
    }
}

#[async_trait]
impl ProcessHandle for RemoteProcess {
    async fn wait(&self) -> Result<ExitStatus> {
        if let ProcessState::Terminated(status) = &self.shared.lifecycle.lock().await.state {
            return Ok(status.clone());
        }

        let guard = WaitGuard {
            shared: self.shared.clone(),
            spawner: self.spawner.clone(),
            armed: true,
        };

        let outcome = self.drain.clone().await;

        let mut lifecycle = self.shared.lifecycle.lock().await;
        let result = match &lifecycle.state {
            ProcessState::Terminated(status) => Ok(status.clone()),
            ProcessState::Running => {
                self.shared.delete_shell(&mut lifecycle).await;
                match outcome {
                    Some(DrainOutcome::Completed) => {
                        let status = self.shared.status(ExitOutcome::Completed);
                        lifecycle.state = ProcessState::Terminated(status.clone());
                        Ok(status)
                    }
                    Some(DrainOutcome::Failed { reason }) => {
                        let status = self.shared.status(ExitOutcome::Failed { reason });
                        lifecycle.state = ProcessState::Terminated(status.clone());
                        Ok(status)
                    }
                    None => {
                        let reason = "output drain ended without reporting".to_string();
                        lifecycle.state = ProcessState::Terminated(
                            self.shared.status(ExitOutcome::Interrupted {
                                reason: reason.clone(),
                            }),
                        );
                        Err(Error::Interrupted {
                            command: self.shared.invocation.obfuscated().to_string(),
                            reason,
                        })
                    }
                }
            }
        };
        drop(lifecycle);
        guard.disarm();

        if let Ok(status) = &result {
            debug!(command = %self.shared.invocation, code = ?status.code, "Remote process terminated");
        }
        result
    }

    async fn destroy(&self) -> Result<()> {
        let mut lifecycle = self.shared.lifecycle.lock().await;
        self.shared.destroy_locked(&mut lifecycle).await
    }

    async fn exit_value(&self) -> Result<ExitStatus> {
        match &self.shared.lifecycle.lock().await.state {
            ProcessState::Terminated(status) => Ok(status.clone()),
            ProcessState::Running => Err(Error::StillRunning {
                command: self.shared.invocation.obfuscated().to_string(),
            }),
        }
    }
}

impl Drop for RemoteProcess {
    fn drop(&mut self) {
        if !self.kill_on_drop {
            return;
        }
        if let Some(lifecycle) = self.shared.lifecycle.try_lock() {
            if matches!(lifecycle.state, ProcessState::Terminated(_)) {
                return;
            }
        }

        debug!(command = %self.shared.invocation, "Process handle dropped while running");
        let shared = self.shared.clone();
        let task = async move {
            let mut lifecycle = shared.lifecycle.lock().await;
            let _ = shared.destroy_locked(&mut lifecycle).await;
        };
        if let Err(e) = self.spawner.spawn("remote shell cleanup on drop", task.boxed()) {
            warn!(command = %self.shared.invocation, error = %e, "Cannot clean up remote shell");
        }
    }
}

impl fmt::Debug for RemoteProcess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteProcess")
            .field("command", &self.shared.invocation)
            .field("kill_on_drop", &self.kill_on_drop)
            .finish_non_exhaustive()
    }
}
