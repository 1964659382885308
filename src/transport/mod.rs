//! Byte-stream transport abstraction.
//!
//! The session engine only needs a way to dial `host:port` and get
//! back split read/write halves of a plain byte stream. Production
//! uses TCP; tests substitute in-memory duplex pipes through the same
//! [`Connector`] seam.

mod tcp;

pub use tcp::TcpConnector;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Boxed read half of an open transport.
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Boxed write half of an open transport.
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Split halves of one open connection.
pub struct TransportPair {
    /// Read half, handed to the session's reader task.
    pub reader: BoxedReader,
    /// Write half, kept by the session for outbound lines.
    pub writer: BoxedWriter,
}

/// Opens byte-stream connections to the game server.
///
/// No protocol-option negotiation happens at this layer; whatever
/// telnet noise the server sends is treated as ordinary bytes and
/// cleaned up downstream.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection and return its split halves.
    async fn open(&self, host: &str, port: u16) -> std::io::Result<TransportPair>;
}
