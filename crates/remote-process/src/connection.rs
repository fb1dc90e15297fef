//! Starting remote processes

use futures::io::AsyncReadExt;
use reqwest::Url;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::command::{CommandInvocation, CommandLine};
use crate::config::ConnectionOptions;
use crate::drain::spawn_drain;
use crate::error::{Error, Result};
use crate::handle::RemoteProcess;
use crate::pipe::{pipe, PipeReader};
use crate::process::{ExecutionResult, ProcessHandle};
use crate::session::{SessionFactory, ShellSession};
use crate::spawn::{Spawner, ThreadSpawner};

/// A resolved remote shell endpoint that can start processes
///
/// Every started process gets its own [`ShellSession`] from the factory; sessions
/// are never reused across commands.
pub struct RemoteShellConnection<F> {
    options: ConnectionOptions,
    target_url: Url,
    factory: F,
    spawner: Arc<dyn Spawner>,
}

impl<F: SessionFactory> RemoteShellConnection<F> {
    /// Resolve `options` into a connection
    ///
    /// Invalid options fail here, before anything is started.
    pub fn new(options: ConnectionOptions, factory: F) -> Result<Self> {
        options.validate()?;
        let target_url = options.target_url()?;
        debug!(target = %target_url, "Resolved remote shell endpoint");

        Ok(Self {
            options,
            target_url,
            factory,
            spawner: Arc::new(ThreadSpawner),
        })
    }

    /// Use `spawner` to run output drains and background cleanup
    pub fn with_spawner(mut self, spawner: impl Spawner + 'static) -> Self {
        self.spawner = Arc::new(spawner);
        self
    }

    /// The endpoint sessions are created for
    pub fn target_url(&self) -> &Url {
        &self.target_url
    }

    /// The factory creating sessions for this connection
    pub fn factory(&self) -> &F {
        &self.factory
    }

    /// The options this connection was built from
    pub fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    /// Start `command_line` in the configured working directory
    pub async fn start_process(&self, command_line: &CommandLine) -> Result<RemoteProcess> {
        if command_line.is_empty() {
            return Err(Error::config("cannot start an empty command line"));
        }
        let invocation =
            CommandInvocation::new(command_line, self.options.working_directory.as_deref());
        self.start(invocation).await
    }

    /// Start an already rendered command string
    pub async fn start_command(&self, command: impl Into<String>) -> Result<RemoteProcess> {
        let invocation =
            CommandInvocation::raw(command, self.options.working_directory.as_deref());
        self.start(invocation).await
    }

    /// Run `command_line` to completion, collecting its output
    pub async fn execute(&self, command_line: &CommandLine) -> Result<ExecutionResult> {
        let mut process = self.start_process(command_line).await?;
        collect(&mut process).await
    }

    async fn start(&self, invocation: CommandInvocation) -> Result<RemoteProcess> {
        let invocation = Arc::new(invocation);
        let settings = self.options.session_settings();
        let session = self.factory.create(&self.target_url, &settings)?;

        let pipe_config = self.options.pipe_config();
        let (stdout_writer, stdout_reader) = pipe(pipe_config);
        let (stderr_writer, stderr_reader) = pipe(pipe_config);

        if let Err(e) = session.start_cmd(invocation.command()).await {
            abandon(session.as_ref(), &invocation).await;
            return Err(e.with_command_context(invocation.obfuscated()));
        }
        info!(command = %invocation, target = %self.target_url, "Started remote command");

        let drain = match spawn_drain(
            self.spawner.as_ref(),
            session.clone(),
            invocation.clone(),
            stdout_writer,
            stderr_writer,
        ) {
            Ok(drain) => drain,
            Err(e) => {
                abandon(session.as_ref(), &invocation).await;
                return Err(e);
            }
        };

        Ok(RemoteProcess::new(
            session,
            invocation,
            drain,
            stdout_reader,
            stderr_reader,
            self.spawner.clone(),
        )
        .kill_on_drop(self.options.kill_on_drop))
    }
}

/// Release a shell whose process never got a handle
async fn abandon(session: &dyn ShellSession, invocation: &CommandInvocation) {
    if let Err(e) = session.delete_shell().await {
        warn!(command = %invocation, error = %e, "Failed to delete remote shell after failed start");
    }
}

async fn read_all(reader: Option<PipeReader>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        // An abnormal close still leaves everything read so far in `buf`.
        let _ = reader.read_to_end(&mut buf).await;
    }
    buf
}

/// Drain both pipes concurrently, then wait
async fn collect(process: &mut RemoteProcess) -> Result<ExecutionResult> {
    let stdout = process.take_stdout();
    let stderr = process.take_stderr();
    let (stdout, stderr) = futures::join!(read_all(stdout), read_all(stderr));
    let status = process.wait().await?;

    Ok(ExecutionResult {
        status,
        stdout,
        stderr,
    })
}

impl<F> fmt::Debug for RemoteShellConnection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteShellConnection")
            .field("target_url", &self.target_url.as_str())
            .field("options", &self.options)
            .field("spawner", &self.spawner)
            .finish_non_exhaustive()
    }
}

impl<F> fmt::Display for RemoteShellConnection<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.options, f)
    }
}
