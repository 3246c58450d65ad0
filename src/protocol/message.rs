//! Wire envelope types.
//!
//! Every frame in both directions is a single JSON object. Outgoing frames
//! are commands; incoming frames are either replies (carry `id`) or events
//! (carry `method`, no `id`).

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{CommandId, SessionId};

// ============================================================================
// CommandMessage
// ============================================================================

/// A command from the client to the browser.
///
/// # Format
///
/// ```json
/// {
///   "id": 1,
///   "method": "Page.navigate",
///   "params": { "url": "https://example.com" },
///   "sessionId": "8E1F..."
/// }
/// ```
///
/// `sessionId` is omitted for commands on the root browser session.
#[derive(Debug, Clone, Serialize)]
pub struct CommandMessage<'a> {
    /// Correlation ID.
    pub id: CommandId,

    /// Method in `Domain.command` format.
    pub method: &'a str,

    /// Command parameters.
    pub params: &'a Value,

    /// Owning session, if not the root session.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a SessionId>,
}

impl<'a> CommandMessage<'a> {
    /// Creates a command envelope.
    #[inline]
    #[must_use]
    pub fn new(
        id: CommandId,
        method: &'a str,
        params: &'a Value,
        session_id: Option<&'a SessionId>,
    ) -> Self {
        Self {
            id,
            method,
            params,
            session_id,
        }
    }

    /// Serializes the envelope to its wire text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the params fail to serialize.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// RemoteError
// ============================================================================

/// Error object carried by a failed reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteError {
    /// Remote error code.
    pub code: i64,

    /// Remote error message.
    pub message: String,

    /// Optional detail.
    #[serde(default)]
    pub data: Option<Value>,
}

// ============================================================================
// Reply
// ============================================================================

/// A reply to a previously sent command.
///
/// # Format
///
/// ```json
/// { "id": 1, "result": { ... } }
/// { "id": 1, "error": { "code": -32000, "message": "..." } }
/// ```
#[derive(Debug, Clone)]
pub struct Reply {
    /// Matches the command `id`.
    pub id: CommandId,

    /// Session the command was sent on, if any.
    pub session_id: Option<SessionId>,

    /// Success payload.
    pub result: Option<Value>,

    /// Failure payload.
    pub error: Option<RemoteError>,
}

impl Reply {
    /// Returns `true` if the reply carries an error object.
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Extracts the result, mapping an error object to [`Error::Protocol`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] with the remote code and message verbatim.
    pub fn into_result(self, method: &str) -> Result<Value> {
        match self.error {
            Some(err) => Err(Error::protocol(method, err.code, err.message, err.data)),
            None => Ok(self.result.unwrap_or_else(|| Value::Object(Default::default()))),
        }
    }
}

// ============================================================================
// EventMessage
// ============================================================================

/// An unsolicited event from the browser.
///
/// # Format
///
/// ```json
/// { "method": "Page.frameNavigated", "params": { ... }, "sessionId": "..." }
/// ```
#[derive(Debug, Clone)]
pub struct EventMessage {
    /// Event name in `Domain.event` format.
    pub method: String,

    /// Event parameters.
    pub params: Value,

    /// Session the event belongs to; `None` for the root session.
    pub session_id: Option<SessionId>,
}

impl EventMessage {
    /// Returns the domain part of the method.
    #[inline]
    #[must_use]
    pub fn domain(&self) -> &str {
        self.method.split('.').next().unwrap_or_default()
    }

    /// Decodes the params into a typed payload.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if the params do not match `T`.
    pub fn decode<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(T::deserialize(&self.params)?)
    }
}

// ============================================================================
// Message
// ============================================================================

/// A classified incoming frame.
#[derive(Debug, Clone)]
pub enum Message {
    /// Command reply.
    Reply(Reply),
    /// Event.
    Event(EventMessage),
}

/// Shape of any incoming frame before classification.
#[derive(Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<CommandId>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RemoteError>,
    #[serde(rename = "sessionId", default)]
    session_id: Option<SessionId>,
}

impl Message {
    /// Parses and classifies an incoming frame.
    ///
    /// Frames with an `id` are replies; frames with a `method` and no `id`
    /// are events.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedFrame`] if the text is not a JSON object of
    /// either shape.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawMessage =
            serde_json::from_str(text).map_err(|e| Error::malformed(format!("invalid JSON: {e}")))?;

        match (raw.id, raw.method) {
            (Some(id), _) => Ok(Self::Reply(Reply {
                id,
                session_id: raw.session_id,
                result: raw.result,
                error: raw.error,
            })),
            (None, Some(method)) => Ok(Self::Event(EventMessage {
                method,
                params: raw.params.unwrap_or(Value::Null),
                session_id: raw.session_id,
            })),
            (None, None) => Err(Error::malformed("frame has neither id nor method")),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
