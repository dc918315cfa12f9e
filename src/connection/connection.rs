use std::io;
use std::mem;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use socket2::{Domain, Protocol, Socket, Type};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, instrument, warn};

use crate::config::Config;
use crate::connection::driver::{Command, Driver, Shared};
use crate::connection::{ConnectionState, Handler};
use crate::dispatcher::{Dispatcher, Registration};
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};

/// Options for [`Connection::close_with`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CloseOptions {
    /// Raise [`Handler::on_disconnected`] with no error.
    pub notify: bool,
    /// Wait until the event task has released every resource.
    pub join: bool,
}

impl CloseOptions {
    /// Skip the disconnect callback but wait for the event task.
    ///
    /// What [`Connection::close`] uses.
    pub const SILENT: Self = Self {
        notify: false,
        join: true,
    };
}

impl Default for CloseOptions {
    fn default() -> Self {
        Self {
            notify: true,
            join: true,
        }
    }
}

enum Slot<H> {
    Idle(H),
    Registered(Registration),
    Closed,
}

/// A non-blocking TCP connection driven by a shared dispatcher.
///
/// `Connection` is the caller-facing half: it validates API calls and posts
/// them to the connection's event task, which owns the socket and buffers and
/// invokes the [`Handler`]. Every method takes `&self`, so a connection can be
/// shared across threads behind an `Arc`.
///
/// ## Example
///
/// ```rust,ignore
/// use rsconn::{Connection, Dispatcher, Endpoint, Handler, Result};
///
/// struct Printer;
///
/// impl Handler for Printer {
///     fn on_data_received(&mut self, data: &[u8]) -> Result<()> {
///         println!("{}", String::from_utf8_lossy(data));
///         Ok(())
///     }
/// }
///
/// let conn = Connection::new(Dispatcher::current()?, Printer);
/// conn.connect(&Endpoint::ipv4("127.0.0.1", 9000), 30_000)?;
/// conn.send(b"ping")?;
/// conn.wait_connected().await?;
/// conn.close().await?;
/// ```
pub struct Connection<H> {
    dispatcher: Dispatcher,
    config: Config,
    shared: Arc<Shared>,
    slot: Mutex<Slot<H>>,
}

impl<H> Connection<H> {
    /// Create an idle connection with the default configuration.
    pub fn new(dispatcher: Dispatcher, handler: H) -> Self {
        Self::with_config(dispatcher, handler, Config::default())
    }

    /// Create an idle connection.
    pub fn with_config(dispatcher: Dispatcher, handler: H, config: Config) -> Self {
        Self {
            dispatcher,
            config,
            shared: Arc::new(Shared::new()),
            slot: Mutex::new(Slot::Idle(handler)),
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Check if the handshake has completed and the connection is not shutting down.
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// The connection configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bytes accepted by [`send`](Self::send) that the kernel has not taken yet.
    pub fn outbound_len(&self) -> usize {
        self.shared.queued()
    }

    /// Address this connection was opened to, while it is registered.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match &*self.lock_slot() {
            Slot::Registered(registration) => Some(registration.peer()),
            _ => None,
        }
    }

    /// Wait timeout applied on every re-arm, while registered.
    ///
    /// `None` if the connection waits without a timeout or is not registered.
    pub fn timeout(&self) -> Option<Duration> {
        match &*self.lock_slot() {
            Slot::Registered(registration) => registration.timeout(),
            _ => None,
        }
    }

    /// Queue bytes for sending.
    ///
    /// Copies `data`; see [`send_bytes`](Self::send_bytes) to hand over an
    /// owned buffer.
    ///
    /// ## Errors
    ///
    /// See [`send_bytes`](Self::send_bytes).
    pub fn send(&self, data: &[u8]) -> Result<()> {
        self.send_bytes(Bytes::copy_from_slice(data))
    }

    /// Queue bytes for sending.
    ///
    /// Never blocks. Bytes submitted while `Connecting` are held and written
    /// once the handshake completes; all bytes reach the peer in submission
    /// order. Write failures are not reported here: they end the session and
    /// reach [`Handler::on_disconnected`].
    ///
    /// ## Errors
    ///
    /// - `Error::InvalidState` if the connection is not `Connecting` or `Connected`
    /// - `Error::OutboundLimit` if the configured outbound limit would be exceeded
    pub fn send_bytes(&self, data: Bytes) -> Result<()> {
        let slot = self.lock_slot();
        let Slot::Registered(registration) = &*slot else {
            return Err(Error::InvalidState(self.state()));
        };
        let state = self.state();
        if !state.can_send() {
            return Err(Error::InvalidState(state));
        }
        if data.is_empty() {
            return Ok(());
        }

        let len = data.len();
        let queued = self.shared.enqueue(len);
        if let Err(err) = self.config.check_outbound_size(queued) {
            self.shared.dequeue(len);
            return Err(err);
        }
        if !registration.post(Command::Send(data)) {
            self.shared.dequeue(len);
            return Err(Error::InvalidState(ConnectionState::Closed));
        }
        Ok(())
    }

    /// Wait until the handshake completes.
    ///
    /// Resolves immediately if it already has.
    ///
    /// ## Errors
    ///
    /// `Error::InvalidState` if the connection is idle or closed before
    /// connecting.
    pub async fn wait_connected(&self) -> Result<()> {
        let mut state = self.shared.subscribe();
        let settled = match state
            .wait_for(|state| *state != ConnectionState::Connecting)
            .await
        {
            Ok(state) => *state,
            Err(_) => ConnectionState::Closed,
        };
        match settled {
            ConnectionState::Connected | ConnectionState::Closing => Ok(()),
            other => Err(Error::InvalidState(other)),
        }
    }

    /// Wait until the connection holds no socket (idle or closed).
    pub async fn closed(&self) {
        let mut state = self.shared.subscribe();
        let _ = state.wait_for(|state| !state.is_active()).await;
    }

    /// Close the connection without raising the disconnect callback, waiting
    /// for the event task to release everything.
    ///
    /// ## Errors
    ///
    /// `Error::InvalidState` if there is nothing to close; calling this twice
    /// is harmless.
    pub async fn close(&self) -> Result<()> {
        self.close_with(CloseOptions::SILENT).await
    }

    /// End the session.
    ///
    /// - `immediate == true`: close now and raise
    ///   [`Handler::on_disconnected`] with no error. Does not wait for the
    ///   event task.
    /// - `immediate == false`: half-close both directions and move to
    ///   `Closing`. The socket stays open; pending reads still complete, and
    ///   the connection reaches `Closed` on the close notification.
    ///
    /// ## Errors
    ///
    /// - `Error::InvalidState` if there is no socket, or for a graceful
    ///   disconnect outside `Connected`
    /// - `Error::Send` if the half-close fails
    pub async fn disconnect(&self, immediate: bool) -> Result<()> {
        if immediate {
            return self
                .close_with(CloseOptions {
                    notify: true,
                    join: false,
                })
                .await;
        }

        let reply = {
            let slot = self.lock_slot();
            let Slot::Registered(registration) = &*slot else {
                return Err(Error::InvalidState(self.state()));
            };
            let (tx, rx) = oneshot::channel();
            if !registration.post(Command::Shutdown(tx)) {
                return Err(Error::InvalidState(ConnectionState::Closed));
            }
            rx
        };
        reply
            .await
            .unwrap_or(Err(Error::InvalidState(ConnectionState::Closed)))
    }

    /// Close the connection.
    ///
    /// Deregisters from the dispatcher, closes the socket and frees the
    /// buffers. Safe to call from any thread and concurrently: exactly one
    /// call performs the close; the others get `Error::InvalidState`.
    ///
    /// ## Errors
    ///
    /// `Error::InvalidState` if the connection is idle or already closed.
    pub async fn close_with(&self, options: CloseOptions) -> Result<()> {
        let registration = {
            let mut slot = self.lock_slot();
            match mem::replace(&mut *slot, Slot::Closed) {
                Slot::Registered(registration) => registration,
                Slot::Idle(handler) => {
                    *slot = Slot::Idle(handler);
                    return Err(Error::InvalidState(ConnectionState::Idle));
                }
                Slot::Closed => return Err(Error::InvalidState(ConnectionState::Closed)),
            }
        };

        // The event task may already have ended the session on its own, in
        // which case it drops the request without acknowledging it.
        let (ack, acked) = oneshot::channel();
        let posted = registration.post(Command::Close {
            notify: options.notify,
            ack,
        });
        let taken = posted && acked.await.is_ok();
        let peer = registration.peer();

        if options.join || !taken {
            registration.join().await;
        }
        if !taken {
            return Err(Error::InvalidState(ConnectionState::Closed));
        }
        debug!(peer = %peer, ?options, "close requested");
        Ok(())
    }

    fn lock_slot(&self) -> MutexGuard<'_, Slot<H>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<H: Handler> Connection<H> {
    /// Start connecting to `endpoint`.
    ///
    /// Returns once the non-blocking connect has been issued and the socket
    /// is registered with the dispatcher; completion is reported through
    /// [`Handler::on_connected`] (or [`Handler::on_disconnected`] on failure).
    /// `timeout_ms` bounds every wait for socket activity, including the
    /// handshake; a wait that elapses ends the session with `Error::Timeout`.
    /// Zero disables the timeout.
    ///
    /// ## Errors
    ///
    /// - `Error::InvalidState` unless the connection is `Idle`
    /// - `Error::AddressParse` if the address is not valid for its family;
    ///   the connection stays `Idle`
    /// - `Error::SocketCreate`, `Error::Connect`, `Error::DispatcherRegistration`
    ///   if opening fails; the connection is then `Closed` and
    ///   `on_disconnected` is not raised
    #[instrument(level = "debug", skip(self), fields(endpoint = %endpoint))]
    pub fn connect(&self, endpoint: &Endpoint, timeout_ms: u32) -> Result<()> {
        let mut slot = self.lock_slot();
        if !matches!(*slot, Slot::Idle(_)) {
            return Err(Error::InvalidState(self.state()));
        }
        let addr = endpoint.socket_addr()?;

        let handler = match mem::replace(&mut *slot, Slot::Closed) {
            Slot::Idle(handler) => handler,
            other => {
                *slot = other;
                return Err(Error::InvalidState(self.state()));
            }
        };

        let timeout = (timeout_ms > 0).then(|| Duration::from_millis(u64::from(timeout_ms)));
        match self.open(addr, handler, timeout) {
            Ok(registration) => {
                *slot = Slot::Registered(registration);
                Ok(())
            }
            Err(err) => {
                debug!(%addr, %err, "connect aborted");
                self.shared.publish(ConnectionState::Closed);
                Err(err)
            }
        }
    }

    fn open(&self, addr: SocketAddr, handler: H, timeout: Option<Duration>) -> Result<Registration> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))
            .map_err(|err| Error::SocketCreate(err.into()))?;
        socket
            .set_nonblocking(true)
            .map_err(|err| Error::SocketCreate(err.into()))?;

        match socket.connect(&addr.into()) {
            Ok(()) => {}
            Err(err) if connect_pending(&err) => {}
            Err(err) => return Err(Error::Connect(err.into())),
        }

        let stream = self.dispatcher.register(socket.into())?;
        if let Err(err) = stream.set_nodelay(true) {
            warn!(%addr, %err, "failed to enable no-delay");
        }

        self.shared.publish(ConnectionState::Connecting);
        let (commands, receiver) = mpsc::unbounded_channel();
        let driver = Driver::new(
            stream,
            addr,
            handler,
            receiver,
            timeout,
            self.config.receive_buffer_size,
            self.shared.clone(),
        );
        let task = self.dispatcher.spawn(driver.run());
        debug!(%addr, ?timeout, "connecting");

        Ok(Registration::new(commands, task, addr, timeout))
    }
}

impl<H> std::fmt::Debug for Connection<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("state", &self.state())
            .field("outbound_len", &self.outbound_len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// A non-blocking connect that has not finished yet.
fn connect_pending(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::WouldBlock || in_progress(err)
}

#[cfg(unix)]
fn in_progress(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EINPROGRESS)
}

#[cfg(not(unix))]
fn in_progress(_: &io::Error) -> bool {
    false
}
