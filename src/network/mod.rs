//! Network request tracking and interception.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `manager` | Event correlation, interception control, network config |
//! | `request` | [`Request`] / [`Response`] handles and request state |
//! | `interception` | [`InterceptDecision`] and its payload types |

// ============================================================================
// Submodules
// ============================================================================

/// Interception decisions.
pub mod interception;

/// Network manager.
pub mod manager;

/// Request and response handles.
pub mod request;

// ============================================================================
// Re-exports
// ============================================================================

pub use interception::{ContinueOverrides, Credentials, InterceptDecision, SyntheticResponse};
pub use manager::{NetworkEvent, NetworkManager, RequestHandler};
pub use request::{RemoteAddress, Request, RequestState, Response};
