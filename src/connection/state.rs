//! Connection lifecycle states.

/// Lifecycle state of a [`Connection`](crate::Connection).
///
/// ```text
/// Idle ──connect──▶ Connecting ──connect ok──▶ Connected ──disconnect(false)──▶ Closing
///                        │                         │                              │
///                        └──── error / close / timeout / peer close ─────────────┴──▶ Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum ConnectionState {
    /// Created, no socket allocated yet.
    #[default]
    Idle,
    /// Non-blocking connect issued, waiting for the connect event.
    Connecting,
    /// Handshake completed; data flows both ways.
    Connected,
    /// Both directions half-closed, waiting for the close notification.
    Closing,
    /// Socket released. Terminal.
    Closed,
}

impl ConnectionState {
    /// Check if a socket descriptor exists in this state.
    ///
    /// Returns `true` for `Connecting`, `Connected`, or `Closing` states.
    #[must_use]
    #[inline]
    pub const fn is_active(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Connected | ConnectionState::Closing
        )
    }

    /// Check if `send` accepts bytes in this state.
    ///
    /// Bytes submitted while `Connecting` are held until the handshake
    /// completes.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Connecting | ConnectionState::Connected)
    }

    /// Check if inbound data is still delivered in this state.
    #[must_use]
    #[inline]
    pub const fn can_receive(&self) -> bool {
        matches!(self, ConnectionState::Connected | ConnectionState::Closing)
    }

    /// Check if this is the terminal state.
    #[must_use]
    #[inline]
    pub const fn is_closed(&self) -> bool {
        matches!(self, ConnectionState::Closed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Idle => write!(f, "Idle"),
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Connected => write!(f, "Connected"),
            ConnectionState::Closing => write!(f, "Closing"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}
