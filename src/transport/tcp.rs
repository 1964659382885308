//! TCP transport for production use.

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::debug;

use super::{Connector, TransportPair};

/// Dials the game server over plain TCP.
///
/// Host names are resolved through the system resolver; the stream is
/// split into owned halves so reading and writing can proceed from
/// different tasks.
#[derive(Debug, Default, Clone, Copy)]
pub struct TcpConnector;

impl TcpConnector {
    /// Create a new TCP connector.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn open(&self, host: &str, port: u16) -> std::io::Result<TransportPair> {
        debug!("dialing {}:{}", host, port);
        let stream = TcpStream::connect((host, port)).await?;
        let _ = stream.set_nodelay(true);
        let (reader, writer) = stream.into_split();
        Ok(TransportPair {
            reader: Box::new(reader),
            writer: Box::new(writer),
        })
    }
}
