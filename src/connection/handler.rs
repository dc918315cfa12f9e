//! Consumer callbacks.

use crate::error::{Error, Result};

/// Callbacks invoked by a connection's event task.
///
/// Callbacks run on the dispatcher, one at a time, never concurrently with
/// each other or with teardown. They must not block. Returning an error from
/// [`on_connected`](Self::on_connected) or
/// [`on_data_received`](Self::on_data_received) tears the connection down
/// and the error is passed to [`on_disconnected`](Self::on_disconnected).
pub trait Handler: Send + 'static {
    /// The handshake completed.
    fn on_connected(&mut self) -> Result<()> {
        Ok(())
    }

    /// A chunk of inbound bytes arrived.
    ///
    /// Chunks are delivered in arrival order and the slice is only valid for
    /// the duration of the call.
    fn on_data_received(&mut self, data: &[u8]) -> Result<()>;

    /// The session ended.
    ///
    /// `reason` is `None` for a clean close (peer FIN, completed graceful
    /// shutdown, immediate disconnect) and the failure otherwise. Called at
    /// most once per connection; not called for silent closes or when the
    /// connect call itself failed.
    fn on_disconnected(&mut self, reason: Option<Error>) -> Result<()> {
        let _ = reason;
        Ok(())
    }
}

impl<H: Handler + ?Sized> Handler for Box<H> {
    fn on_connected(&mut self) -> Result<()> {
        (**self).on_connected()
    }

    fn on_data_received(&mut self, data: &[u8]) -> Result<()> {
        (**self).on_data_received(data)
    }

    fn on_disconnected(&mut self, reason: Option<Error>) -> Result<()> {
        (**self).on_disconnected(reason)
    }
}
