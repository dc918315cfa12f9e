//! TCP connection management and state machine.
//!
//! A connection is split in two. [`Connection`] is the handle the caller
//! holds; it validates calls and posts commands. The driver is an event task
//! on the dispatcher that exclusively owns the socket, the outbound buffer,
//! the receive scratch and the [`Handler`], and is the only place callbacks
//! are invoked from.
//!
//! ## Connection Lifecycle
//!
//! 1. **Idle** - Created, no socket
//! 2. **Connecting** - Non-blocking connect issued and registered
//! 3. **Connected** - Handshake completed, data flows
//! 4. **Closing** - Graceful disconnect requested, waiting for the peer's close
//! 5. **Closed** - Socket released; terminal
//!
//! ## Example
//!
//! ```rust,ignore
//! use rsconn::{Connection, Dispatcher, Endpoint};
//!
//! let conn = Connection::new(Dispatcher::current()?, MyHandler::default());
//! conn.connect(&Endpoint::ipv4("127.0.0.1", 7000), 10_000)?;
//! conn.wait_connected().await?;
//! conn.send(b"ping")?;
//! conn.disconnect(false).await?;
//! conn.closed().await;
//! ```

#[allow(clippy::module_inception)]
mod connection;
mod driver;
mod handler;
mod state;

pub use connection::{CloseOptions, Connection};
pub(crate) use driver::Command;
pub use handler::Handler;
pub use state::ConnectionState;
