//! Page facade over one attached target session.
//!
//! A [`Page`] wires a [`Session`](crate::Session) to its
//! [`NetworkManager`](crate::NetworkManager) and
//! [`FrameManager`](crate::FrameManager) and exposes the navigation calls
//! built on them.
//!
//! # Module Structure
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | Page struct, attach, accessors, close |
//! | `navigation` | goto, reload, history, navigation waits |
//! | `network` | Request/response waits, network configuration |
//! | `screenshot` | Serialized screenshot capture |
//!
//! # Example
//!
//! ```ignore
//! let page = Page::attach(session).await?;
//!
//! let outcome = page
//!     .goto("https://example.com", NavigateOptions::new().wait_until(WaitUntil::NetworkIdle0))
//!     .await?;
//! let status = outcome.response().map(Response::status);
//!
//! let png = page.screenshot().png().capture_bytes().await?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

mod core;
mod navigation;
mod network;
mod screenshot;

// ============================================================================
// Re-exports
// ============================================================================

pub use core::Page;
pub use navigation::NavigateOptions;
pub use network::UrlMatcher;
pub use screenshot::{ImageFormat, ScreenshotBuilder};
