//! Error types for the DevTools protocol client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use cdp_session::{Error, Result};
//!
//! async fn example(session: &Session) -> Result<()> {
//!     match session.send("Page.reload", json!({})).await {
//!         Err(e) if e.is_closed() => println!("target went away"),
//!         other => { other?; }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`] |
//! | Remote | [`Error::Protocol`], [`Error::NavigationFailed`], [`Error::TargetCrashed`] |
//! | Closed | [`Error::ConnectionClosed`], [`Error::SessionDetached`] |
//! | Budget | [`Error::Timeout`], [`Error::RequestTimeout`], [`Error::TooManyPending`] |
//! | Local state | [`Error::FrameNotFound`], [`Error::ExecutionContextDestroyed`], [`Error::InterceptionHandled`], [`Error::InterceptionDisabled`] |
//! | Wire | [`Error::MalformedFrame`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{CommandId, ExecutionContextId, FrameId, RequestId, SessionId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when connection options fail validation.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument passed to an API call.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Remote Errors
    // ========================================================================
    /// The remote replied with an error object.
    ///
    /// Code and message are surfaced verbatim.
    #[error("Protocol error ({method}): {code} {message}")]
    Protocol {
        /// Method of the failed command.
        method: String,
        /// Remote error code.
        code: i64,
        /// Remote error message.
        message: String,
        /// Optional remote error detail.
        data: Option<Value>,
    },

    /// `Page.navigate` reported a network-level failure.
    #[error("Navigation to {url} failed: {reason}")]
    NavigationFailed {
        /// URL being navigated to.
        url: String,
        /// Remote `errorText`.
        reason: String,
    },

    /// The target crashed while an operation was pending.
    #[error("Target crashed")]
    TargetCrashed,

    // ========================================================================
    // Closed Errors
    // ========================================================================
    /// Connection closed while an operation was pending.
    #[error("Connection closed")]
    ConnectionClosed,

    /// The owning session was detached while an operation was pending.
    #[error("Session detached: {session_id}")]
    SessionDetached {
        /// The detached session.
        session_id: SessionId,
    },

    // ========================================================================
    // Budget Errors
    // ========================================================================
    /// A wait exceeded its budget.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// A command reply did not arrive in time.
    ///
    /// The command may still complete remotely.
    #[error("Command {id} ({method}) timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The command ID that timed out.
        id: CommandId,
        /// The command method.
        method: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Too many commands are awaiting replies.
    #[error("Too many pending commands: {pending}/{max}")]
    TooManyPending {
        /// Current number of pending commands.
        pending: usize,
        /// Configured maximum.
        max: usize,
    },

    // ========================================================================
    // Local State Errors
    // ========================================================================
    /// Frame not found in the frame tree.
    #[error("Frame not found: {frame_id}")]
    FrameNotFound {
        /// The missing frame ID.
        frame_id: FrameId,
    },

    /// The execution context was destroyed before the evaluation completed.
    #[error("Execution context destroyed: {context_id}")]
    ExecutionContextDestroyed {
        /// The destroyed context.
        context_id: ExecutionContextId,
    },

    /// The intercepted request already received its decision.
    #[error("Request {request_id} is already handled")]
    InterceptionHandled {
        /// The request ID.
        request_id: RequestId,
    },

    /// The request was not intercepted.
    #[error("Request interception is not enabled for {request_id}")]
    InterceptionDisabled {
        /// The request ID.
        request_id: RequestId,
    },

    /// A wait predicate panicked while evaluating an event.
    #[error("Predicate panicked while waiting for '{topic}'")]
    PredicatePanicked {
        /// Topic being waited on.
        topic: String,
    },

    // ========================================================================
    // Wire Errors
    // ========================================================================
    /// An incoming frame could not be parsed or routed.
    #[error("Malformed frame: {message}")]
    MalformedFrame {
        /// Description of the problem.
        message: String,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a protocol error from a remote error object.
    #[inline]
    pub fn protocol(
        method: impl Into<String>,
        code: i64,
        message: impl Into<String>,
        data: Option<Value>,
    ) -> Self {
        Self::Protocol {
            method: method.into(),
            code,
            message: message.into(),
            data,
        }
    }

    /// Creates a navigation failure error.
    #[inline]
    pub fn navigation_failed(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::NavigationFailed {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a session detached error.
    #[inline]
    pub fn session_detached(session_id: SessionId) -> Self {
        Self::SessionDetached { session_id }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a command reply timeout error.
    #[inline]
    pub fn request_timeout(id: CommandId, method: impl Into<String>, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            id,
            method: method.into(),
            timeout_ms,
        }
    }

    /// Creates a frame not found error.
    #[inline]
    pub fn frame_not_found(frame_id: FrameId) -> Self {
        Self::FrameNotFound { frame_id }
    }

    /// Creates a malformed frame error.
    #[inline]
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedFrame {
            message: message.into(),
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::RequestTimeout { .. })
    }

    /// Returns `true` if the connection or the owning session went away.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed | Self::SessionDetached { .. })
    }

    /// Returns `true` if the remote replied with an error object.
    #[inline]
    #[must_use]
    pub fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol { .. })
    }

    /// Returns the remote error code, if this is a protocol error.
    #[inline]
    #[must_use]
    pub fn protocol_code(&self) -> Option<i64> {
        match self {
            Self::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
