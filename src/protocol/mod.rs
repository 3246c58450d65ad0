//! DevTools protocol message types.
//!
//! # Protocol Overview
//!
//! | Message | Direction | Shape |
//! |---------|-----------|-------|
//! | Command | Client → Browser | `{id, method, params, sessionId?}` |
//! | Reply | Browser → Client | `{id, result}` or `{id, error: {code, message}}` |
//! | Event | Browser → Client | `{method, params, sessionId?}` |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `message` | Envelopes and incoming-frame classification |
//! | `command` | Typed commands by domain |
//! | `event` | Typed event payloads and command results |

// ============================================================================
// Submodules
// ============================================================================

/// Typed commands by domain.
pub mod command;

/// Typed event payloads.
pub mod event;

/// Wire envelopes.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{
    AuthChallengeResponse, AuthResponse, Command, ErrorReason, FetchCommand, HeaderEntry,
    NetworkCommand, PageCommand, RequestPattern, RuntimeCommand, SecurityCommand, TargetCommand,
};
pub use event::{Headers, methods};
pub use message::{CommandMessage, EventMessage, Message, RemoteError, Reply};
