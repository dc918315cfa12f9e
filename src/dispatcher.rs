//! Shared readiness dispatcher and per-connection registrations.
//!
//! The dispatcher is a Tokio runtime handle: its reactor multiplexes the
//! readiness of every registered socket (epoll, kqueue or IOCP underneath)
//! and its workers run each connection's event task. Owning the runtime is
//! the caller's business; a connection only registers with it and
//! deregisters from it.

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::warn;

use crate::connection::Command;
use crate::error::{Error, Result};

/// Handle to the shared event dispatcher.
///
/// Cheap to clone; every clone refers to the same runtime.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    handle: Handle,
}

impl Dispatcher {
    /// Use the given runtime as the dispatcher.
    ///
    /// The runtime must have its I/O and time drivers enabled.
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DispatcherRegistration`] when called outside a Tokio
    /// runtime.
    pub fn current() -> Result<Self> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|err| Error::DispatcherRegistration(err.to_string()))
    }

    /// The underlying runtime handle.
    #[must_use]
    pub fn handle(&self) -> &Handle {
        &self.handle
    }

    /// Hand a socket to the reactor.
    ///
    /// The reactor reports the socket's current readiness on registration, so
    /// a connect that already completed is not missed.
    pub(crate) fn register(&self, socket: std::net::TcpStream) -> Result<TcpStream> {
        let _guard = self.handle.enter();
        TcpStream::from_std(socket).map_err(|err| Error::DispatcherRegistration(err.to_string()))
    }

    pub(crate) fn spawn<F>(&self, task: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(task)
    }
}

/// A connection's live registration with the dispatcher.
///
/// Holds the control channel into the connection's event task and the task
/// itself. Dropping the registration closes the channel, which the event task
/// treats as a silent close.
#[derive(Debug)]
pub(crate) struct Registration {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
    peer: SocketAddr,
    timeout: Option<Duration>,
}

impl Registration {
    pub(crate) fn new(
        commands: mpsc::UnboundedSender<Command>,
        task: JoinHandle<()>,
        peer: SocketAddr,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            commands,
            task,
            peer,
            timeout,
        }
    }

    /// Queue a command for the event task.
    ///
    /// Returns `false` once the event task has finished.
    pub(crate) fn post(&self, command: Command) -> bool {
        self.commands.send(command).is_ok()
    }

    pub(crate) fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Wait for the event task to return, i.e. for any in-flight callback to
    /// finish and every resource of the connection to be released.
    pub(crate) async fn join(self) {
        let peer = self.peer;
        drop(self.commands);
        if let Err(err) = self.task.await {
            warn!(%peer, %err, "connection task ended abnormally");
        }
    }
}
