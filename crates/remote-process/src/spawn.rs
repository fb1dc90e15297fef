//! Runtime-agnostic spawning of background work
//!
//! The output drain loop and kill-on-drop cleanup run detached from the caller.
//! Which executor runs them is decided by a [`Spawner`]; the default
//! [`ThreadSpawner`] gives every task its own named OS thread, so a session
//! that blocks inside its network calls never stalls an async runtime.

use futures::future::BoxFuture;
use std::fmt;

use crate::error::Result;

/// A spawner that can run futures in the background
pub trait Spawner: Send + Sync + fmt::Debug {
    /// Spawn `future` and let it run to completion detached from the caller
    ///
    /// `name` identifies the task in thread names and logs.
    fn spawn(&self, name: &str, future: BoxFuture<'static, ()>) -> Result<()>;
}

/// Runs each future on a dedicated OS thread
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSpawner;

impl Spawner for ThreadSpawner {
    fn spawn(&self, name: &str, future: BoxFuture<'static, ()>) -> Result<()> {
        std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || futures::executor::block_on(future))?;
        Ok(())
    }
}

/// Spawner for the Smol runtime
#[cfg(feature = "smol")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SmolSpawner;

#[cfg(feature = "smol")]
impl Spawner for SmolSpawner {
    fn spawn(&self, _name: &str, future: BoxFuture<'static, ()>) -> Result<()> {
        smol::spawn(future).detach();
        Ok(())
    }
}

/// Spawner for the Tokio runtime
///
/// Must be used from within a Tokio runtime context.
#[cfg(feature = "tokio")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSpawner;

#[cfg(feature = "tokio")]
impl Spawner for TokioSpawner {
    fn spawn(&self, _name: &str, future: BoxFuture<'static, ()>) -> Result<()> {
        let handle = tokio::runtime::Handle::try_current().map_err(|e| {
            crate::error::Error::Io(std::io::Error::other(format!(
                "no tokio runtime available: {}",
                e
            )))
        })?;
        handle.spawn(future);
        Ok(())
    }
}
