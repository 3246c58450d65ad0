//! In-process transport.
//!
//! [`channel_pair`] returns a [`ChannelTransport`] for the connection and a
//! [`RemoteEnd`] that plays the browser: it reads the commands the client
//! writes and pushes replies and events back. Useful for driving the full
//! connection stack without a browser and for replaying recorded traffic.

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::identifiers::{CommandId, SessionId};

use super::Transport;

// ============================================================================
// channel_pair
// ============================================================================

/// Creates a connected transport/remote pair.
#[must_use]
pub fn channel_pair() -> (ChannelTransport, RemoteEnd) {
    let (to_remote, from_client) = mpsc::unbounded_channel();
    let (to_client, from_remote) = mpsc::unbounded_channel();

    (
        ChannelTransport {
            outgoing: Some(to_remote),
            incoming: from_remote,
        },
        RemoteEnd {
            incoming: from_client,
            outgoing: Some(to_client),
        },
    )
}

// ============================================================================
// ChannelTransport
// ============================================================================

/// Client half of an in-process transport.
pub struct ChannelTransport {
    outgoing: Option<mpsc::UnboundedSender<String>>,
    incoming: mpsc::UnboundedReceiver<String>,
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, text: String) -> Result<()> {
        let outgoing = self.outgoing.as_ref().ok_or(Error::ConnectionClosed)?;
        outgoing.send(text).map_err(|_| Error::ConnectionClosed)
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        self.incoming.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<()> {
        self.outgoing = None;
        Ok(())
    }
}

// ============================================================================
// RemoteEnd
// ============================================================================

/// Browser half of an in-process transport.
pub struct RemoteEnd {
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: Option<mpsc::UnboundedSender<String>>,
}

impl RemoteEnd {
    /// Receives the next raw frame written by the client.
    ///
    /// Returns `None` once the client closed its side.
    pub async fn recv_text(&mut self) -> Option<String> {
        self.incoming.recv().await
    }

    /// Receives and parses the next command written by the client.
    ///
    /// Frames that are not JSON are skipped.
    pub async fn recv_command(&mut self) -> Option<Value> {
        loop {
            let text = self.incoming.recv().await?;
            if let Ok(value) = serde_json::from_str(&text) {
                return Some(value);
            }
        }
    }

    /// Returns a command already written by the client, without waiting.
    pub fn try_recv_command(&mut self) -> Option<Value> {
        loop {
            let text = self.incoming.try_recv().ok()?;
            if let Ok(value) = serde_json::from_str(&text) {
                return Some(value);
            }
        }
    }

    /// Pushes a raw frame to the client.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the client is gone or the
    /// remote end was closed.
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        let outgoing = self.outgoing.as_ref().ok_or(Error::ConnectionClosed)?;
        outgoing.send(text.into()).map_err(|_| Error::ConnectionClosed)
    }

    /// Pushes a JSON frame to the client.
    ///
    /// # Errors
    ///
    /// See [`send_text`](Self::send_text).
    pub fn send_json(&self, value: &Value) -> Result<()> {
        self.send_text(value.to_string())
    }

    /// Replies to a command with a result.
    ///
    /// # Errors
    ///
    /// See [`send_text`](Self::send_text).
    pub fn reply(&self, id: CommandId, result: Value) -> Result<()> {
        self.send_json(&json!({ "id": id, "result": result }))
    }

    /// Replies to a command with an error object.
    ///
    /// # Errors
    ///
    /// See [`send_text`](Self::send_text).
    pub fn reply_error(&self, id: CommandId, code: i64, message: &str) -> Result<()> {
        self.send_json(&json!({ "id": id, "error": { "code": code, "message": message } }))
    }

    /// Emits an event, on a session or on the root when `session_id` is `None`.
    ///
    /// # Errors
    ///
    /// See [`send_text`](Self::send_text).
    pub fn event(&self, method: &str, params: Value, session_id: Option<&SessionId>) -> Result<()> {
        let mut frame = json!({ "method": method, "params": params });
        if let Some(session_id) = session_id {
            frame["sessionId"] = json!(session_id);
        }
        self.send_json(&frame)
    }

    /// Closes the browser side; the client sees the transport end.
    pub fn close(&mut self) {
        self.outgoing = None;
    }
}

/// Extracts the command ID from a received command.
#[must_use]
pub fn command_id(command: &Value) -> Option<CommandId> {
    command.get("id").and_then(Value::as_u64).map(CommandId::new)
}

// ============================================================================
// Test Support
// ============================================================================


// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pair_delivers_both_ways() {
        let (mut transport, mut remote) = channel_pair();

        transport
            .send(r#"{"id":1,"method":"Page.enable","params":{}}"#.to_string())
            .await
            .expect("send");
        let command = remote.recv_command().await.expect("command");
        assert_eq!(command_id(&command), Some(CommandId::new(1)));

        remote.reply(CommandId::new(1), json!({})).expect("reply");
        let text = transport.recv().await.expect("frame").expect("text");
        assert!(text.contains(r#""id":1"#));
    }

    #[tokio::test]
    async fn test_remote_close_ends_stream() {
        let (mut transport, mut remote) = channel_pair();
        remote.close();
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_client_close_ends_remote() {
        let (mut transport, mut remote) = channel_pair();
        transport.close().await.expect("close");
        assert!(remote.recv_text().await.is_none());
        assert!(transport.send("x".to_string()).await.is_err());
    }
}
