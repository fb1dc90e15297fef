//! Common test utilities

#![allow(dead_code)]

use async_trait::async_trait;
use remote_process::{
    ConnectionOptions, Error, PipeWriter, RemoteShellConnection, Result, SessionFactory,
    SessionSettings, ShellSession, Url,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One scripted answer of [`ScriptedSession::receive_output`]
pub enum Step {
    /// Write bytes to stdout
    Stdout(&'static [u8]),
    /// Write bytes to stderr
    Stderr(&'static [u8]),
    /// Fail with a transport error
    Fail(&'static str),
    /// Suspend the poll until the sender is used or dropped
    Block(async_channel::Receiver<()>),
}

/// A shell session double that replays a script and counts calls
#[derive(Default)]
pub struct ScriptedSession {
    script: Mutex<Vec<Step>>,
    exit_code: Option<i32>,
    fail_start: bool,
    fail_signal: AtomicBool,
    fail_delete: AtomicBool,
    delete_gate: Mutex<Option<async_channel::Receiver<()>>>,
    deleted: AtomicBool,
    started_commands: Mutex<Vec<String>>,
    /// Number of `start_cmd` calls
    pub starts: AtomicUsize,
    /// Number of `receive_output` calls
    pub polls: AtomicUsize,
    /// Number of `signal` calls
    pub signals: AtomicUsize,
    /// Number of `delete_shell` calls
    pub deletes: AtomicUsize,
}

impl ScriptedSession {
    /// A session replaying `script`, then reporting `exit_code`
    pub fn new(script: Vec<Step>, exit_code: i32) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script),
            exit_code: Some(exit_code),
            ..Self::default()
        })
    }

    /// A session whose `start_cmd` fails
    pub fn failing_start() -> Arc<Self> {
        Arc::new(Self {
            fail_start: true,
            ..Self::default()
        })
    }

    /// Commands submitted through `start_cmd`
    pub fn started_commands(&self) -> Vec<String> {
        self.started_commands.lock().unwrap().clone()
    }

    /// Make every `signal` call fail with a transport error
    pub fn fail_signals(&self) {
        self.fail_signal.store(true, Ordering::SeqCst);
    }

    /// Make every `delete_shell` call fail with a transport error
    pub fn fail_deletes(&self) {
        self.fail_delete.store(true, Ordering::SeqCst);
    }

    /// Suspend the next `delete_shell` until the sender is used or dropped
    pub fn block_next_delete(&self, gate: async_channel::Receiver<()>) {
        *self.delete_gate.lock().unwrap() = Some(gate);
    }

    /// Number of `delete_shell` calls so far
    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// Number of `signal` calls so far
    pub fn signal_count(&self) -> usize {
        self.signals.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShellSession for ScriptedSession {
    async fn start_cmd(&self, command: &str) -> Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        self.started_commands.lock().unwrap().push(command.to_string());
        if self.fail_start {
            return Err(Error::transport("shell refused command"));
        }
        Ok(())
    }

    async fn receive_output(
        &self,
        stdout: &mut PipeWriter,
        stderr: &mut PipeWriter,
    ) -> Result<bool> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() { None } else { Some(script.remove(0)) }
        };

        match step {
            Some(Step::Stdout(bytes)) => stdout.write_all(bytes).await?,
            Some(Step::Stderr(bytes)) => stderr.write_all(bytes).await?,
            Some(Step::Fail(reason)) => return Err(Error::transport(reason)),
            Some(Step::Block(gate)) => {
                let _ = gate.recv().await;
            }
            None => return Ok(false),
        }

        if self.deleted.load(Ordering::SeqCst) {
            return Err(Error::protocol("shell was deleted"));
        }
        Ok(true)
    }

    async fn signal(&self) -> Result<()> {
        self.signals.fetch_add(1, Ordering::SeqCst);
        if self.fail_signal.load(Ordering::SeqCst) {
            return Err(Error::transport("signal refused"));
        }
        Ok(())
    }

    async fn delete_shell(&self) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let gate = self.delete_gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.recv().await;
        }
        self.deleted.store(true, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Error::transport("shell already gone"));
        }
        Ok(())
    }

    fn exit_value(&self) -> Option<i32> {
        self.exit_code
    }
}

/// Hands out the same scripted session and records what it was asked for
pub struct ScriptedFactory {
    session: Arc<ScriptedSession>,
    /// Endpoints and settings sessions were created with
    pub created: Mutex<Vec<(Url, SessionSettings)>>,
}

impl ScriptedFactory {
    /// A factory handing out `session`
    pub fn new(session: Arc<ScriptedSession>) -> Self {
        Self {
            session,
            created: Mutex::new(Vec::new()),
        }
    }
}

impl SessionFactory for ScriptedFactory {
    fn create(&self, endpoint: &Url, settings: &SessionSettings) -> Result<Arc<dyn ShellSession>> {
        self.created
            .lock()
            .unwrap()
            .push((endpoint.clone(), settings.clone()));
        let session: Arc<dyn ShellSession> = self.session.clone();
        Ok(session)
    }
}

/// Options for a test host
pub fn test_options() -> ConnectionOptions {
    ConnectionOptions::new("win-host").with_credentials("tester@EXAMPLE", "secret")
}

/// A connection backed by `session`
pub fn connection(session: Arc<ScriptedSession>) -> RemoteShellConnection<ScriptedFactory> {
    RemoteShellConnection::new(test_options(), ScriptedFactory::new(session)).unwrap()
}

/// Print library logs for failing tests (`RUST_LOG`-independent, debug level)
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// Poll `condition` until it holds or two seconds pass
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        smol::Timer::after(Duration::from_millis(10)).await;
    }
    condition()
}
