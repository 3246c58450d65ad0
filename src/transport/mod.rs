//! Transport and session multiplexing.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   send()    ┌──────────────┐   frames   ┌──────────┐
//! │ Session (S1) │────────────►│  Connection  │◄──────────►│ Browser  │
//! │ Session (S2) │◄── emit ────│  reader task │  Transport │          │
//! │ Root session │             └──────────────┘            └──────────┘
//! └──────────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | Command correlation, reader loop, session table |
//! | `session` | Per-target channel and event emitter |
//! | `websocket` | WebSocket transport |
//! | `channel` | In-process transport pair |

// ============================================================================
// Imports
// ============================================================================

use async_trait::async_trait;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// In-process transport pair.
pub mod channel;

/// Connection and reader loop.
pub mod connection;

/// Per-target sessions.
pub mod session;

/// WebSocket transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use channel::{ChannelTransport, RemoteEnd, channel_pair};
pub use connection::Connection;
pub use session::{Session, TargetType};
pub use websocket::WebSocketTransport;

// ============================================================================
// Transport
// ============================================================================

/// A bidirectional stream of text frames.
///
/// The connection's reader task owns the transport exclusively and
/// interleaves `recv` with `send` via `select!`, so `recv` must be
/// cancel-safe: dropping an unfinished `recv` future must not lose a frame.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Writes one frame.
    async fn send(&mut self, text: String) -> Result<()>;

    /// Reads the next frame; `None` once the peer closed.
    async fn recv(&mut self) -> Option<Result<String>>;

    /// Closes the transport.
    async fn close(&mut self) -> Result<()>;
}
