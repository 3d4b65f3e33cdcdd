// =============================================================================
// Gateway Transport — message-oriented full-duplex connection
// =============================================================================
//
// The connection manager talks to the gateway through these two traits so the
// lifecycle logic can be driven by an in-memory transport in tests. The
// production implementation is a tokio-tungstenite WebSocket.
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

/// Opens new connections to a fixed endpoint.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Connection>>;
}

/// One open connection. Dropping it closes the transport.
#[async_trait]
pub trait Connection: Send {
    /// Send one UTF-8 text frame.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Next text frame. `None` means the peer closed the connection;
    /// `Some(Err(_))` is a transport fault.
    async fn recv(&mut self) -> Option<Result<String>>;
}

// ---------------------------------------------------------------------------
// WebSocket implementation
// ---------------------------------------------------------------------------

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Connection>> {
        let (stream, _response) = connect_async(endpoint)
            .await
            .context("failed to connect to gateway WebSocket")?;
        Ok(Box::new(WsConnection { stream }))
    }
}

struct WsConnection {
    stream: WsStream,
}

#[async_trait]
impl Connection for WsConnection {
    async fn send(&mut self, text: String) -> Result<()> {
        self.stream
            .send(Message::Text(text))
            .await
            .context("failed to send gateway frame")
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Close(frame)) => {
                    debug!(frame = ?frame, "gateway sent close frame");
                    return None;
                }
                // Ping / Pong / Binary: tungstenite answers pings itself.
                Ok(_) => continue,
                Err(e) => return Some(Err(anyhow::Error::new(e).context("gateway read error"))),
            }
        }
    }
}
