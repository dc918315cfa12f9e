//! Error types for the connection primitive.
//!
//! Every OS-level failure is folded into this taxonomy. Errors raised while a
//! session is active travel through the teardown path and reach the consumer
//! once, via [`Handler::on_disconnected`](crate::Handler::on_disconnected);
//! errors raised before a session exists are returned to the caller.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

use crate::connection::ConnectionState;
use crate::endpoint::AddressFamily;

/// Result type alias for connection operations.
pub type Result<T> = std::result::Result<T, Error>;

/// An OS error captured in a cloneable, comparable form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OsError {
    kind: io::ErrorKind,
    code: Option<i32>,
    message: String,
}

impl OsError {
    /// Create an error from a kind and message, without an OS code.
    pub fn new(kind: io::ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    /// The portable error kind.
    #[must_use]
    pub fn kind(&self) -> io::ErrorKind {
        self.kind
    }

    /// The raw OS error code, if the error came from the OS.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        self.code
    }

    /// Human-readable description.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for OsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl From<io::Error> for OsError {
    fn from(err: io::Error) -> Self {
        Self {
            kind: err.kind(),
            code: err.raw_os_error(),
            message: err.to_string(),
        }
    }
}

/// Errors that can occur while driving a connection.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The textual address is not valid for the requested family.
    #[error("Invalid {family} address: {address:?}")]
    AddressParse {
        /// Address as supplied by the caller.
        address: String,
        /// Family the address was parsed for.
        family: AddressFamily,
    },

    /// The socket could not be created or configured.
    #[error("Socket creation failed: {0}")]
    SocketCreate(OsError),

    /// The connect attempt failed.
    ///
    /// Never carries would-block or in-progress; those are not errors.
    #[error("Connect failed: {0}")]
    Connect(OsError),

    /// Sending (or half-closing) failed.
    #[error("Send failed: {0}")]
    Send(OsError),

    /// Receiving failed.
    #[error("Receive failed: {0}")]
    Receive(OsError),

    /// A wait elapsed without any readiness event.
    #[error("Timed out after {0:?} without socket activity")]
    Timeout(Duration),

    /// Operation not valid in the current state.
    #[error("Invalid state: {0}")]
    InvalidState(ConnectionState),

    /// The dispatcher is unavailable or refused the registration.
    #[error("Dispatcher registration failed: {0}")]
    DispatcherRegistration(String),

    /// Accepting the bytes would exceed the configured outbound limit.
    #[error("Outbound buffer limit exceeded: {size} bytes (max: {max})")]
    OutboundLimit {
        /// Bytes that would be queued.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// A consumer callback reported a failure.
    #[error("Handler error: {0}")]
    Handler(String),
}

impl Error {
    /// Shorthand for a consumer callback failure.
    pub fn handler(message: impl Into<String>) -> Self {
        Error::Handler(message.into())
    }

    /// Check if this error ended a session because of the peer or the network,
    /// as opposed to misuse of the API.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Connect(_) | Error::Send(_) | Error::Receive(_) | Error::Timeout(_)
        )
    }
}
