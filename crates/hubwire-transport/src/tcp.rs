//! TCP connector.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::debug;

use crate::traits::{BoxedStream, Connector, TransportError};

/// Opens plain TCP streams to the hub.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl TcpConnector {
    /// A shared connector, ready to hand to a [`HubConnection`](crate::HubConnection).
    #[must_use]
    pub fn shared() -> Arc<dyn Connector> {
        Arc::new(TcpConnector)
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(&self, host: &str, port: u16) -> Result<BoxedStream, TransportError> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;

        debug!(
            local = ?stream.local_addr().ok(),
            remote = ?stream.peer_addr().ok(),
            "TCP stream established"
        );

        Ok(Box::new(stream))
    }

    fn name(&self) -> &'static str {
        "tcp"
    }
}
