//! Chrome DevTools Protocol client core.
//!
//! This library multiplexes many target sessions over one DevTools
//! connection and keeps per-page network and frame state in sync with the
//! browser's event stream.
//!
//! # Architecture
//!
//! ```text
//!  Connection ── reader task ──► Session ──► NetworkManager ─┐
//!      ▲                            │                         ├──► Page
//!      └──── commands ◄─────────────┴──────► FrameManager ───┘
//!                                               └─ LifecycleWatcher
//! ```
//!
//! Key design principles:
//!
//! - One reader task per connection dispatches every frame in arrival order
//! - Each component owns an [`EventEmitter`]; components subscribe to each
//!   other's topics instead of sharing fields
//! - Every wait resolves exactly once: match, timeout, or close
//! - A navigation overtaken by a newer one ends as
//!   [`NavigationOutcome::Superseded`], not as an error
//!
//! # Quick Start
//!
//! ```no_run
//! use cdp_session::{ConnectOptions, Connection, NavigateOptions, Page, Result, TargetId, WaitUntil};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let connection = Connection::connect(
//!         "ws://127.0.0.1:9222/devtools/browser/abc",
//!         ConnectOptions::default(),
//!     )
//!     .await?;
//!
//!     let session = connection.create_session(TargetId::from("TARGET")).await?;
//!     let page = Page::attach(session).await?;
//!
//!     let outcome = page
//!         .goto("https://example.com", NavigateOptions::new().wait_until(WaitUntil::NetworkIdle0))
//!         .await?;
//!     println!("status: {:?}", outcome.response().map(|r| r.status()));
//!
//!     connection.close();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`transport`] | [`Connection`], [`Session`], transports |
//! | [`events`] | [`EventEmitter`] and [`wait_for_event`] |
//! | [`network`] | [`NetworkManager`], requests, interception |
//! | [`frames`] | [`FrameManager`], frame tree, [`LifecycleWatcher`] |
//! | [`page`] | [`Page`] facade |
//! | [`task_queue`] | [`TaskQueue`] FIFO serializer |
//! | [`protocol`] | Wire envelopes, typed commands and event payloads |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`options`] | [`ConnectOptions`] |

// ============================================================================
// Modules
// ============================================================================

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Event fan-out and event waits.
pub mod events;

/// Frame tree, execution contexts and navigation waits.
pub mod frames;

/// Type-safe identifiers for protocol entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Network request tracking and interception.
pub mod network;

/// Connection options.
pub mod options;

/// Page facade.
pub mod page;

/// DevTools protocol message types.
pub mod protocol;

/// FIFO task serializer.
pub mod task_queue;

/// Transport and session multiplexing.
pub mod transport;

// ============================================================================
// Re-exports
// ============================================================================

// Error types
pub use error::{Error, Result};

// Event types
pub use events::{CloseReason, EventEmitter, EventStream, ListenerGuard, wait_for_event};

// Frame types
pub use frames::{
    ExecutionContext, Frame, FrameEvent, FrameManager, LifecycleWatcher, NavigationOutcome,
    WaitMode, WaitUntil, World,
};

// Identifier types
pub use identifiers::{
    CommandId, ExecutionContextId, FrameId, InterceptionId, ListenerId, LoaderId, RequestId,
    SessionId, TargetId,
};

// Network types
pub use network::{
    ContinueOverrides, Credentials, InterceptDecision, NetworkEvent, NetworkManager, Request,
    RequestState, Response, SyntheticResponse,
};

// Option types
pub use options::{ConnectOptions, ConnectOptionsBuilder};

// Page types
pub use page::{ImageFormat, NavigateOptions, Page, UrlMatcher};

// Protocol types
pub use protocol::{ErrorReason, Headers};

// Task queue
pub use task_queue::TaskQueue;

// Transport types
pub use transport::{ChannelTransport, Connection, RemoteEnd, Session, TargetType, Transport};
