//! Background loop moving remote output into local pipes

use futures::channel::oneshot;
use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::command::CommandInvocation;
use crate::error::Result;
use crate::pipe::PipeWriter;
use crate::session::ShellSession;
use crate::spawn::Spawner;

/// How the drain loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The session reported that no more output will be produced
    Completed,
    /// A session call failed; the pipes were closed abnormally
    Failed {
        /// The error that ended the loop
        reason: String,
    },
}

/// Resolves once the drain loop has exited and released both pipes
///
/// Cloneable so concurrent waiters can all join the same loop. Resolves to
/// `None` if the loop vanished without reporting an outcome.
pub(crate) type DrainJoin = Shared<BoxFuture<'static, Option<DrainOutcome>>>;

/// Owns the output sinks for the lifetime of the loop
///
/// The sinks are released on every exit path: explicitly through
/// [`SinkGuard::finish`], or abnormally on drop if the loop never got there.
struct SinkGuard {
    sinks: Option<(PipeWriter, PipeWriter)>,
    done: Option<oneshot::Sender<DrainOutcome>>,
}

impl SinkGuard {
    fn finish(mut self, outcome: DrainOutcome) {
        if let Some((stdout, stderr)) = self.sinks.take() {
            match &outcome {
                DrainOutcome::Completed => {
                    stdout.close();
                    stderr.close();
                }
                DrainOutcome::Failed { reason } => {
                    stdout.fail(reason.clone());
                    stderr.fail(reason.clone());
                }
            }
        }
        // Sinks are closed before joiners are released.
        if let Some(done) = self.done.take() {
            let _ = done.send(outcome);
        }
    }
}

impl Drop for SinkGuard {
    fn drop(&mut self) {
        if let Some((stdout, stderr)) = self.sinks.take() {
            stdout.fail("output drain aborted");
            stderr.fail("output drain aborted");
        }
    }
}

impl fmt::Debug for SinkGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkGuard")
            .field("released", &self.sinks.is_none())
            .finish()
    }
}

/// Poll `session` until it reports the end of output
pub(crate) async fn drain_output(
    session: &dyn ShellSession,
    stdout: &mut PipeWriter,
    stderr: &mut PipeWriter,
) -> Result<()> {
    while session.receive_output(stdout, stderr).await? {}
    Ok(())
}

/// Start the drain loop for `invocation` on `spawner`
pub(crate) fn spawn_drain(
    spawner: &dyn Spawner,
    session: Arc<dyn ShellSession>,
    invocation: Arc<CommandInvocation>,
    stdout: PipeWriter,
    stderr: PipeWriter,
) -> Result<DrainJoin> {
    let (done_tx, done_rx) = oneshot::channel();
    let mut guard = SinkGuard {
        sinks: Some((stdout, stderr)),
        done: Some(done_tx),
    };

    let name = format!("output drain for [{}]", invocation.obfuscated()).replace('\0', " ");

    let task = async move {
        let result = match guard.sinks.as_mut() {
            Some((stdout, stderr)) => drain_output(session.as_ref(), stdout, stderr).await,
            None => Ok(()),
        };

        let outcome = match result {
            Ok(()) => {
                debug!(command = %invocation, "Remote command finished producing output");
                DrainOutcome::Completed
            }
            Err(e) => {
                let e = e.with_command_context(invocation.obfuscated());
                warn!(command = %invocation, error = %e, "Output drain failed");
                DrainOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        guard.finish(outcome);
    };

    spawner.spawn(&name, task.boxed())?;

    Ok(done_rx.map(|outcome| outcome.ok()).boxed().shared())
}
