//! WebSocket transport to a DevTools endpoint.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};

use super::Transport;

// ============================================================================
// WebSocketTransport
// ============================================================================

/// Transport over a `tokio-tungstenite` client stream.
///
/// Text and binary frames are both delivered as text; ping/pong frames are
/// answered by the WebSocket layer and never surface.
pub struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WebSocketTransport {
    /// Opens a WebSocket to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WebSocket`] if the handshake fails.
    pub async fn connect(url: &Url) -> Result<Self> {
        let (stream, response) = connect_async(url.as_str()).await?;
        debug!(%url, status = %response.status(), "WebSocket connected");
        Ok(Self { stream })
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        self.stream.send(Message::Text(text.into())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(text.as_str().to_owned())),

                Some(Ok(Message::Binary(bytes))) => {
                    return Some(
                        String::from_utf8(bytes.to_vec())
                            .map_err(|e| Error::malformed(format!("binary frame is not UTF-8: {e}"))),
                    );
                }

                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "WebSocket closed by remote");
                    return None;
                }

                // Ping, Pong, raw frames
                Some(Ok(other)) => {
                    trace!(kind = ?other, "Ignoring control frame");
                }

                Some(Err(e)) => return Some(Err(e.into())),

                None => return None,
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        self.stream.close(None).await?;
        Ok(())
    }
}
