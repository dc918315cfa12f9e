//! The per-connection event task.
//!
//! A [`Driver`] owns the socket, the outbound buffer and the receive scratch
//! area. It is the only code that touches them: API calls reach it as
//! [`Command`]s, readiness reaches it from the reactor, and both are handled
//! one at a time in [`Driver::run`]. Teardown consumes the driver, so the
//! socket is closed exactly once.

use std::io;
use std::net::{Shutdown, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use socket2::SockRef;
use tokio::io::{Interest, Ready};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, Sleep};
use tracing::{debug, trace, warn};

use crate::buffer::{InboundScratch, OutboundBuffer};
use crate::connection::{ConnectionState, Handler};
use crate::error::{Error, Result};

/// State visible to both the caller-facing handle and the event task.
#[derive(Debug)]
pub(crate) struct Shared {
    state: watch::Sender<ConnectionState>,
    /// Bytes accepted by `send` and not yet written to the kernel.
    queued: AtomicUsize,
}

impl Shared {
    pub(crate) fn new() -> Self {
        let (state, _) = watch::channel(ConnectionState::Idle);
        Self {
            state,
            queued: AtomicUsize::new(0),
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    pub(crate) fn publish(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub(crate) fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Account for `n` more queued bytes, returning the new total.
    pub(crate) fn enqueue(&self, n: usize) -> usize {
        self.queued.fetch_add(n, Ordering::AcqRel) + n
    }

    /// Saturates at zero: a handle may give back bytes the event task
    /// already wrote off at teardown.
    pub(crate) fn dequeue(&self, n: usize) {
        let _ = self
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |queued| {
                Some(queued.saturating_sub(n))
            });
    }

    fn reset_queued(&self) {
        self.queued.store(0, Ordering::Release);
    }
}

/// Requests posted to the event task by the connection handle.
#[derive(Debug)]
pub(crate) enum Command {
    /// Write these bytes after everything queued before them.
    Send(Bytes),
    /// Half-close both directions, reporting the outcome.
    Shutdown(oneshot::Sender<Result<()>>),
    /// Tear down, raising `on_disconnected(None)` if `notify`.
    ///
    /// `ack` is signalled once the request is taken; it is dropped unsignalled
    /// if the session ends on its own first.
    Close {
        notify: bool,
        ack: oneshot::Sender<()>,
    },
}

enum Wake {
    Command(Option<Command>),
    Ready(io::Result<Ready>),
    Elapsed,
}

/// How the session ended and whether the consumer hears about it.
#[derive(Debug)]
struct Teardown {
    reason: Option<Error>,
    notify: bool,
}

impl Teardown {
    fn notify(reason: Option<Error>) -> Self {
        Self {
            reason,
            notify: true,
        }
    }

    fn failed(err: Error) -> Self {
        Self::notify(Some(err))
    }

    fn silent() -> Self {
        Self {
            reason: None,
            notify: false,
        }
    }
}

pub(crate) struct Driver<H> {
    stream: TcpStream,
    peer: SocketAddr,
    state: ConnectionState,
    outbound: OutboundBuffer,
    scratch: InboundScratch,
    handler: H,
    commands: mpsc::UnboundedReceiver<Command>,
    timeout: Option<Duration>,
    /// Expiry of the current wait. Only readiness re-arms it.
    deadline: Option<Pin<Box<Sleep>>>,
    shared: Arc<Shared>,
}

impl<H: Handler> Driver<H> {
    pub(crate) fn new(
        stream: TcpStream,
        peer: SocketAddr,
        handler: H,
        commands: mpsc::UnboundedReceiver<Command>,
        timeout: Option<Duration>,
        receive_buffer_size: usize,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            stream,
            peer,
            state: ConnectionState::Connecting,
            outbound: OutboundBuffer::new(),
            scratch: InboundScratch::new(receive_buffer_size),
            handler,
            commands,
            timeout,
            deadline: None,
            shared,
        }
    }

    /// Process commands and readiness until the session ends, then tear down.
    pub(crate) async fn run(mut self) {
        self.deadline = self
            .timeout
            .map(|timeout| Box::pin(tokio::time::sleep(timeout)));
        let teardown = loop {
            if let Err(teardown) = self.step().await {
                break teardown;
            }
        };
        self.teardown(teardown);
    }

    /// Wait once and handle what woke us.
    ///
    /// Commands do not count as activity: only a readiness batch pushes the
    /// deadline out by another full timeout.
    async fn step(&mut self) -> std::result::Result<(), Teardown> {
        let interest = self.interest();
        let wake = tokio::select! {
            command = self.commands.recv() => Wake::Command(command),
            ready = self.stream.ready(interest) => Wake::Ready(ready),
            () = expired(&mut self.deadline) => Wake::Elapsed,
        };

        match wake {
            Wake::Command(Some(command)) => self.on_command(command),
            Wake::Command(None) => {
                debug!(peer = %self.peer, "connection handle dropped");
                Err(Teardown::silent())
            }
            Wake::Ready(Ok(ready)) => {
                self.on_ready(ready)?;
                self.rearm();
                Ok(())
            }
            Wake::Ready(Err(err)) => Err(Teardown::failed(Error::Receive(err.into()))),
            Wake::Elapsed => {
                let timeout = self.timeout.unwrap_or_default();
                debug!(peer = %self.peer, state = %self.state, ?timeout, "wait timed out");
                Err(Teardown::failed(Error::Timeout(timeout)))
            }
        }
    }

    fn rearm(&mut self) {
        if let (Some(deadline), Some(timeout)) = (self.deadline.as_mut(), self.timeout) {
            deadline.as_mut().reset(Instant::now() + timeout);
        }
    }

    fn interest(&self) -> Interest {
        match self.state {
            // Connect completion shows up as writability.
            ConnectionState::Connecting => Interest::WRITABLE,
            ConnectionState::Connected if !self.outbound.is_empty() => {
                Interest::READABLE.add(Interest::WRITABLE)
            }
            _ => Interest::READABLE,
        }
    }

    fn on_command(&mut self, command: Command) -> std::result::Result<(), Teardown> {
        match command {
            Command::Send(data) => self.enqueue(data),
            Command::Shutdown(reply) => {
                let _ = reply.send(self.shutdown());
                Ok(())
            }
            Command::Close { notify, ack } => {
                let _ = ack.send(());
                Err(Teardown {
                    reason: None,
                    notify,
                })
            }
        }
    }

    fn on_ready(&mut self, ready: Ready) -> std::result::Result<(), Teardown> {
        trace!(peer = %self.peer, state = %self.state, ?ready, "readiness");

        if self.state == ConnectionState::Connecting {
            return self.on_connect_ready(ready);
        }
        if ready.is_writable() && self.state == ConnectionState::Connected {
            self.flush()?;
        }
        if ready.is_readable() && self.state.can_receive() {
            self.drain()?;
        }
        Ok(())
    }

    fn on_connect_ready(&mut self, ready: Ready) -> std::result::Result<(), Teardown> {
        match self.stream.take_error() {
            Ok(None) => {}
            Ok(Some(err)) | Err(err) => return Err(Teardown::failed(Error::Connect(err.into()))),
        }

        match self.stream.peer_addr() {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::NotConnected && !ready.is_write_closed() => {
                trace!(peer = %self.peer, "spurious connect readiness");
                let _ = self
                    .stream
                    .try_io(Interest::WRITABLE, || Err::<(), _>(io::ErrorKind::WouldBlock.into()));
                return Ok(());
            }
            Err(err) => return Err(Teardown::failed(Error::Connect(err.into()))),
        }

        self.state = ConnectionState::Connected;
        self.shared.publish(ConnectionState::Connected);
        debug!(peer = %self.peer, queued = self.outbound.len(), "connected");

        if let Err(err) = self.handler.on_connected() {
            return Err(Teardown::failed(err));
        }
        // Bytes submitted during the handshake go out now.
        self.flush()
    }

    fn enqueue(&mut self, data: Bytes) -> std::result::Result<(), Teardown> {
        match self.state {
            ConnectionState::Connected if self.outbound.is_empty() => {
                let written = match self.stream.try_write(&data) {
                    Ok(n) => n,
                    Err(err) if is_retryable(&err) => 0,
                    Err(err) => return Err(Teardown::failed(Error::Send(err.into()))),
                };
                self.shared.dequeue(written);
                if written < data.len() {
                    self.outbound.push(&data[written..]);
                    trace!(peer = %self.peer, written, buffered = self.outbound.len(), "partial send");
                }
            }
            ConnectionState::Connecting | ConnectionState::Connected => {
                self.outbound.push(&data);
            }
            state => {
                warn!(peer = %self.peer, %state, bytes = data.len(), "dropping bytes submitted after shutdown");
                self.shared.dequeue(data.len());
            }
        }
        Ok(())
    }

    /// One non-blocking write of everything buffered.
    fn flush(&mut self) -> std::result::Result<(), Teardown> {
        if self.outbound.is_empty() {
            return Ok(());
        }
        match self.stream.try_write(self.outbound.chunk()) {
            Ok(n) => {
                self.outbound.consume(n);
                self.shared.dequeue(n);
                trace!(peer = %self.peer, written = n, remaining = self.outbound.len(), "flushed");
                Ok(())
            }
            Err(err) if is_retryable(&err) => Ok(()),
            Err(err) => Err(Teardown::failed(Error::Send(err.into()))),
        }
    }

    /// Receive until the socket would block, forwarding each chunk.
    fn drain(&mut self) -> std::result::Result<(), Teardown> {
        loop {
            match self.stream.try_read(&mut self.scratch[..]) {
                Ok(0) => {
                    debug!(peer = %self.peer, state = %self.state, "peer closed");
                    return Err(Teardown::notify(None));
                }
                Ok(n) => {
                    trace!(peer = %self.peer, bytes = n, "received");
                    if let Err(err) = self.handler.on_data_received(self.scratch.filled(n)) {
                        return Err(Teardown::failed(err));
                    }
                }
                Err(err) if is_retryable(&err) => return Ok(()),
                Err(err) => return Err(Teardown::failed(Error::Receive(err.into()))),
            }
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.state != ConnectionState::Connected {
            return Err(Error::InvalidState(self.state));
        }
        SockRef::from(&self.stream)
            .shutdown(Shutdown::Both)
            .map_err(|err| Error::Send(err.into()))?;

        let discarded = self.outbound.release();
        self.shared.dequeue(discarded);
        self.state = ConnectionState::Closing;
        self.shared.publish(ConnectionState::Closing);
        debug!(peer = %self.peer, discarded, "half-closed");
        Ok(())
    }

    fn teardown(self, teardown: Teardown) {
        let Driver {
            stream,
            peer,
            state,
            mut outbound,
            scratch,
            mut handler,
            commands,
            shared,
            ..
        } = self;

        drop(commands);
        drop(stream);
        let discarded = outbound.release();
        drop(scratch);
        shared.reset_queued();
        shared.publish(ConnectionState::Closed);

        debug!(
            %peer,
            from = %state,
            discarded,
            reason = ?teardown.reason,
            notify = teardown.notify,
            "closed"
        );
        // Peer and network failures are routine; anything else is a local fault.
        if let Some(err) = teardown.reason.as_ref().filter(|err| !err.is_transport()) {
            warn!(%peer, %err, "session ended by a local failure");
        }

        if teardown.notify {
            if let Err(err) = handler.on_disconnected(teardown.reason) {
                warn!(%peer, %err, "disconnect handler failed");
            }
        }
    }
}

fn is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

async fn expired(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}
