//! Frame tree, execution contexts and navigation waits.
//!
//! | Module | Description |
//! |--------|-------------|
//! | `tree` | Pure [`FrameTree`] arena updated from page events |
//! | `manager` | [`FrameManager`] keeping the tree in sync with a session |
//! | `lifecycle` | [`LifecycleWatcher`] for `load` / `networkidle` waits |
//! | `idle` | Quiet-window tracking behind the network-idle conditions |

// ============================================================================
// Submodules
// ============================================================================

/// Network quiescence tracking.
pub mod idle;

/// Navigation lifecycle waits.
pub mod lifecycle;

/// Frame manager.
pub mod manager;

/// Frame tree arena.
pub mod tree;

// ============================================================================
// Re-exports
// ============================================================================

pub use idle::{ALMOST_IDLE_THRESHOLD, IdleTracker, QUIET_WINDOW};
pub use lifecycle::{LifecycleWatcher, NavigationOutcome, WaitMode, WaitUntil};
pub use manager::{FrameEvent, FrameManager, topics};
pub use tree::{ExecutionContext, Frame, FrameTree, UTILITY_WORLD, World};
