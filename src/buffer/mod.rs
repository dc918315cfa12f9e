//! Byte buffers owned by a connection.
//!
//! - [`OutboundBuffer`] queues bytes the kernel has not accepted yet.
//! - [`InboundScratch`] is the fixed-size area each receive drains into.

mod outbound;
mod scratch;

pub use outbound::OutboundBuffer;
pub use scratch::InboundScratch;
