//! Event fan-out and event waits.
//!
//! - [`EventEmitter`] is the synchronous pub/sub table every component owns
//! - [`wait_for_event`] suspends a caller until a matching event, the
//!   emitter closing, or a timeout

// ============================================================================
// Submodules
// ============================================================================

/// Topic-based publish/subscribe.
pub mod emitter;

/// Single-event waits with timeout and close handling.
pub mod wait;

// ============================================================================
// Re-exports
// ============================================================================

pub use emitter::{Callback, CloseReason, EventEmitter, EventStream, ListenerGuard};
pub use wait::wait_for_event;
