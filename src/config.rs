//! Configuration for connections.

/// Default size of the inbound scratch buffer: 128 KiB.
pub const DEFAULT_RECEIVE_BUFFER_SIZE: usize = 128 * 1024;

/// Connection configuration.
///
/// The defaults reproduce the fixed socket configuration: a 128 KiB receive
/// scratch buffer and no cap on queued outbound bytes. No-delay is always on
/// and is not configurable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Size of the scratch buffer each receive drains into (in bytes).
    ///
    /// Inbound chunks handed to the consumer are never larger than this.
    ///
    /// Default: 128 KB (128 * 1024)
    pub receive_buffer_size: usize,

    /// Maximum number of bytes accepted by `send` but not yet handed to the
    /// kernel.
    ///
    /// If `None`, outbound data is buffered without limit; a peer that never
    /// reads can then grow memory without bound.
    ///
    /// Default: None
    pub outbound_limit: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            receive_buffer_size: DEFAULT_RECEIVE_BUFFER_SIZE,
            outbound_limit: None,
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the receive scratch buffer size.
    ///
    /// A size of zero is bumped to one byte.
    #[must_use]
    pub const fn with_receive_buffer_size(mut self, size: usize) -> Self {
        self.receive_buffer_size = if size == 0 { 1 } else { size };
        self
    }

    /// Cap the bytes queued for sending.
    #[must_use]
    pub const fn with_outbound_limit(mut self, limit: usize) -> Self {
        self.outbound_limit = Some(limit);
        self
    }

    /// Remove the cap on queued outbound bytes.
    #[must_use]
    pub const fn without_outbound_limit(mut self) -> Self {
        self.outbound_limit = None;
        self
    }

    /// Validate that `size` queued bytes are within the outbound limit.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutboundLimit`](crate::Error::OutboundLimit) if `size`
    /// exceeds the configured maximum.
    pub const fn check_outbound_size(&self, size: usize) -> Result<(), crate::Error> {
        match self.outbound_limit {
            Some(max) if size > max => Err(crate::Error::OutboundLimit { size, max }),
            _ => Ok(()),
        }
    }
}
