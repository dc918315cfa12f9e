//! # rsconn - Non-blocking TCP client connections on a shared dispatcher
//!
//! `rsconn` connects to a TCP peer without blocking the caller, buffers
//! outbound bytes until the kernel accepts them, and reports lifecycle
//! events and inbound data through a [`Handler`].
//!
//! ## Features
//!
//! - **Non-blocking connect** with an optional per-wait timeout
//! - **Ordered, buffered sends** accepted before the handshake completes
//! - **Exactly-once close** safe from any thread, with or without notification
//! - **Graceful half-close** that still drains pending reads
//! - **Shared dispatcher**: many connections on one Tokio runtime
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use rsconn::{Connection, Dispatcher, Endpoint, Handler, Result};
//!
//! struct Echo;
//!
//! impl Handler for Echo {
//!     fn on_data_received(&mut self, data: &[u8]) -> Result<()> {
//!         println!("received {} bytes", data.len());
//!         Ok(())
//!     }
//! }
//!
//! let conn = Connection::new(Dispatcher::current()?, Echo);
//! conn.connect(&Endpoint::ipv4("127.0.0.1", 7000), 5_000)?;
//! conn.send(b"hello")?;
//! ```

pub mod buffer;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod endpoint;
pub mod error;

pub use buffer::{InboundScratch, OutboundBuffer};
pub use config::Config;
pub use connection::{CloseOptions, Connection, ConnectionState, Handler};
pub use dispatcher::Dispatcher;
pub use endpoint::{AddressFamily, Endpoint};
pub use error::{Error, OsError, Result};
