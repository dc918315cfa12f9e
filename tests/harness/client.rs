//! Recording test client.
//!
//! Wraps a [`Connection`] whose handler forwards every callback to a channel
//! so tests can observe the exact sequence of events.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use rsconn::{Config, Connection, Dispatcher, Endpoint, Error, Handler, Result};
use tokio::sync::mpsc;

/// How long a test waits for the next callback before giving up.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Connected,
    Data(Vec<u8>),
    Disconnected(Option<Error>),
}

/// Callback at which a [`Recorder`] reports failure after recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Connected,
    Data,
}

/// Handler that forwards every callback as an [`Event`].
pub struct Recorder {
    events: mpsc::UnboundedSender<Event>,
    fail_at: Option<FailAt>,
}

impl Recorder {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (events, rx) = mpsc::unbounded_channel();
        (
            Self {
                events,
                fail_at: None,
            },
            rx,
        )
    }

    /// A recorder whose `at` callback returns [`Error::Handler`].
    pub fn failing(at: FailAt) -> (Self, mpsc::UnboundedReceiver<Event>) {
        let (mut recorder, rx) = Self::new();
        recorder.fail_at = Some(at);
        (recorder, rx)
    }

    fn outcome(&self, at: FailAt) -> Result<()> {
        match (self.fail_at, at) {
            (Some(FailAt::Connected), FailAt::Connected) => Err(Error::handler("rejected on connect")),
            (Some(FailAt::Data), FailAt::Data) => Err(Error::handler("rejected data")),
            _ => Ok(()),
        }
    }
}

impl Handler for Recorder {
    fn on_connected(&mut self) -> Result<()> {
        let _ = self.events.send(Event::Connected);
        self.outcome(FailAt::Connected)
    }

    fn on_data_received(&mut self, data: &[u8]) -> Result<()> {
        let _ = self.events.send(Event::Data(data.to_vec()));
        self.outcome(FailAt::Data)
    }

    fn on_disconnected(&mut self, reason: Option<Error>) -> Result<()> {
        let _ = self.events.send(Event::Disconnected(reason));
        Ok(())
    }
}

pub struct TestClient {
    id: usize,
    conn: Arc<Connection<Recorder>>,
    events: mpsc::UnboundedReceiver<Event>,
    pending: Vec<u8>,
}

impl TestClient {
    /// Create a client without connecting it.
    pub fn idle(config: Config) -> Self {
        Self::idle_with(Recorder::new(), config)
    }

    /// Create an unconnected client around a prepared recorder.
    pub fn idle_with(
        (handler, events): (Recorder, mpsc::UnboundedReceiver<Event>),
        config: Config,
    ) -> Self {
        let dispatcher = Dispatcher::current().unwrap();
        Self {
            id: 0,
            conn: Arc::new(Connection::with_config(dispatcher, handler, config)),
            events,
            pending: Vec::new(),
        }
    }

    pub async fn connect(addr: SocketAddr) -> Result<Self> {
        Self::connect_with_id(addr, 0).await
    }

    /// Connect and wait for the connected callback.
    pub async fn connect_with_id(addr: SocketAddr, id: usize) -> Result<Self> {
        let mut client = Self::idle(Config::default());
        client.id = id;
        client.conn.connect(&Endpoint::from(addr), 10_000)?;
        match client.next_event().await {
            Some(Event::Connected) => Ok(client),
            Some(Event::Disconnected(Some(err))) => Err(err),
            other => panic!("client {id}: unexpected first event {other:?}"),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn connection(&self) -> &Connection<Recorder> {
        &self.conn
    }

    /// A shared reference to the connection, for use from other tasks.
    pub fn shared(&self) -> Arc<Connection<Recorder>> {
        self.conn.clone()
    }

    pub fn send(&self, data: &[u8]) -> Result<()> {
        self.conn.send(data)
    }

    pub fn send_text(&self, text: &str) -> Result<()> {
        self.conn.send(text.as_bytes())
    }

    /// Next callback, failing the test if none arrives in time.
    ///
    /// `None` once the connection has released its handler.
    pub async fn next_event(&mut self) -> Option<Event> {
        tokio::time::timeout(EVENT_TIMEOUT, self.events.recv())
            .await
            .unwrap_or_else(|_| panic!("client {}: no event within {EVENT_TIMEOUT:?}", self.id))
    }

    /// Next callback if one arrives within `wait`.
    pub async fn try_next_event(&mut self, wait: Duration) -> Option<Event> {
        tokio::time::timeout(wait, self.events.recv())
            .await
            .ok()
            .flatten()
    }

    /// Collect exactly `len` inbound bytes across data callbacks.
    ///
    /// `None` if the session ends first.
    pub async fn recv_exact(&mut self, len: usize) -> Option<Vec<u8>> {
        while self.pending.len() < len {
            match self.next_event().await? {
                Event::Data(chunk) => self.pending.extend_from_slice(&chunk),
                Event::Disconnected(_) => return None,
                Event::Connected => panic!("client {}: connected twice", self.id),
            }
        }
        let rest = self.pending.split_off(len);
        Some(std::mem::replace(&mut self.pending, rest))
    }

    pub async fn recv_text(&mut self, len: usize) -> Option<String> {
        self.recv_exact(len)
            .await
            .map(|bytes| String::from_utf8(bytes).unwrap())
    }

    /// Send `text` and wait for the echo.
    pub async fn echo(&mut self, text: &str) -> Result<Option<String>> {
        self.send_text(text)?;
        Ok(self.recv_text(text.len()).await)
    }

    /// Skip data until the disconnect callback; `None` if the handler was
    /// released without one.
    pub async fn wait_disconnected(&mut self) -> Option<Option<Error>> {
        loop {
            match self.next_event().await? {
                Event::Disconnected(reason) => return Some(reason),
                Event::Data(chunk) => self.pending.extend_from_slice(&chunk),
                Event::Connected => panic!("client {}: connected twice", self.id),
            }
        }
    }

    pub async fn close(&self) -> Result<()> {
        self.conn.close().await
    }

    /// Assert that the handler has been released with no further callbacks.
    pub async fn assert_released(&mut self) {
        assert_eq!(self.next_event().await, None, "client {}: extra callback", self.id);
    }
}
