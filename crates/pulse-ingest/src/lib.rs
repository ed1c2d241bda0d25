//! Single-feed ingestion path.
//!
//! Byte buffers arrive from a [`Transport`], the [`StreamParser`] turns them
//! into timestamped [`Slot`](pulse_proto::Slot)s on a lock-free ring, and the
//! [`IngestClient`] ties the two together with a reception thread and the
//! zero-copy pending-packet ring. [`IngestSession`] is the complete
//! single-feed run loop.

mod client;
mod parser;
mod pending;
mod session;
pub mod tcp;
pub mod testing;
mod transport;

pub use client::IngestClient;
pub use parser::{StreamParser, MAX_PARTIAL_BYTES};
pub use pending::{PendingPacketRing, PENDING_CAPACITY};
pub use session::{IngestConfig, IngestSession};
pub use tcp::TcpSource;
pub use transport::{
    NoopRelease, PacketRelease, PacketToken, PacketView, Transport, TransportError, TransportState,
};
