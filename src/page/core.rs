//! Core Page struct and accessors.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::frames::{Frame, FrameManager};
use crate::identifiers::{FrameId, TargetId};
use crate::network::NetworkManager;
use crate::options::ConnectOptions;
use crate::protocol::TargetCommand;
use crate::task_queue::TaskQueue;
use crate::transport::Session;

// ============================================================================
// Types
// ============================================================================

/// Internal shared state for a page.
pub(crate) struct PageInner {
    pub session: Session,
    pub network: NetworkManager,
    pub frames: FrameManager,
    /// Serializes operations the target runs one at a time.
    pub queue: TaskQueue,
    pub navigation_timeout: Duration,
    pub wait_timeout: Duration,
}

// ============================================================================
// Page
// ============================================================================

/// A handle to an attached page target.
///
/// Cloning shares the page.
#[derive(Clone)]
pub struct Page {
    pub(crate) inner: Arc<PageInner>,
}

impl fmt::Debug for Page {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Page")
            .field("session", &self.inner.session.id())
            .field("target", &self.inner.session.target_id())
            .finish_non_exhaustive()
    }
}

impl Page {
    /// Attaches to `session`, enabling the page, runtime and network domains.
    ///
    /// Timeouts default to the connection's [`ConnectOptions`].
    ///
    /// # Errors
    ///
    /// Returns the first failing setup command's error.
    pub async fn attach(session: Session) -> Result<Self> {
        let options = session
            .connection()
            .map(|connection| connection.options().clone())
            .unwrap_or_default();
        Self::attach_with(session, &options).await
    }

    /// Attaches to `session` with explicit timeouts.
    ///
    /// # Errors
    ///
    /// Returns the first failing setup command's error.
    pub async fn attach_with(session: Session, options: &ConnectOptions) -> Result<Self> {
        if session.is_root() {
            return Err(Error::invalid_argument("a page needs a target session"));
        }

        let network = NetworkManager::new(session.clone());
        let frames = FrameManager::new(session.clone(), network.clone());
        frames.initialize().await?;
        network.initialize().await?;

        info!(session = ?session.id(), target = ?session.target_id(), "Page attached");

        Ok(Self {
            inner: Arc::new(PageInner {
                session,
                network,
                frames,
                queue: TaskQueue::new(),
                navigation_timeout: options.navigation_timeout(),
                wait_timeout: options.wait_timeout(),
            }),
        })
    }
}

// ============================================================================
// Page - Accessors
// ============================================================================

impl Page {
    /// Returns the target session.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Returns the network manager.
    #[inline]
    #[must_use]
    pub fn network(&self) -> &NetworkManager {
        &self.inner.network
    }

    /// Returns the frame manager.
    #[inline]
    #[must_use]
    pub fn frames(&self) -> &FrameManager {
        &self.inner.frames
    }

    /// Returns the queue serializing one-at-a-time operations.
    #[inline]
    #[must_use]
    pub fn task_queue(&self) -> &TaskQueue {
        &self.inner.queue
    }

    /// Returns a snapshot of the main frame.
    #[must_use]
    pub fn main_frame(&self) -> Option<Frame> {
        self.inner.frames.main_frame()
    }

    /// Returns the main frame's URL, empty before the tree is known.
    #[must_use]
    pub fn url(&self) -> String {
        self.main_frame()
            .map(|frame| frame.url().to_string())
            .unwrap_or_default()
    }

    /// Returns `true` once the session is detached or the connection closed.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.session.is_detached()
    }

    /// Default navigation timeout.
    #[inline]
    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        self.inner.navigation_timeout
    }

    /// Default timeout for request and response waits.
    #[inline]
    #[must_use]
    pub fn wait_timeout(&self) -> Duration {
        self.inner.wait_timeout
    }
}

// ============================================================================
// Page - Lifecycle
// ============================================================================

impl Page {
    /// Closes the target.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`] if the connection is gone, or the
    /// command error.
    pub async fn close(&self) -> Result<()> {
        let target_id = self.target_id()?;
        debug!(%target_id, "Closing page");

        let connection = self
            .inner
            .session
            .connection()
            .ok_or(Error::ConnectionClosed)?;
        connection
            .root()
            .send_command(TargetCommand::CloseTarget { target_id })
            .await?;
        Ok(())
    }
}

// ============================================================================
// Page - Internal
// ============================================================================

impl Page {
    pub(crate) fn main_frame_id(&self) -> Result<FrameId> {
        self.main_frame()
            .map(|frame| frame.id().clone())
            .ok_or_else(|| Error::invalid_argument("page has no main frame"))
    }

    fn target_id(&self) -> Result<TargetId> {
        self.inner
            .session
            .target_id()
            .cloned()
            .ok_or_else(|| Error::invalid_argument("session has no target"))
    }
}

// ============================================================================
// Test Support
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use serde_json::json;

    use crate::frames::manager::testing::frame_tree;
    use crate::transport::channel::testing::{answer, attached_page};
    use crate::transport::channel::command_id;
    use crate::transport::{Connection, RemoteEnd};

    use super::Page;

    /// Attached page with main frame `M` (loader `L0`) and child `A`.
    pub(crate) async fn page() -> (Connection, Page, RemoteEnd) {
        let (connection, session, mut remote) = attached_page().await;
        let attach = tokio::spawn(Page::attach(session));

        answer(&mut remote, "Page.enable", json!({})).await;
        answer(&mut remote, "Page.getFrameTree", frame_tree()).await;
        answer(&mut remote, "Page.setLifecycleEventsEnabled", json!({})).await;
        answer(&mut remote, "Runtime.enable", json!({})).await;
        answer(&mut remote, "Page.addScriptToEvaluateOnNewDocument", json!({ "identifier": "1" })).await;
        for _ in 0..2 {
            let command = remote.recv_command().await.expect("isolated world");
            remote
                .reply(command_id(&command).expect("id"), json!({ "executionContextId": 9 }))
                .expect("reply");
        }
        answer(&mut remote, "Network.enable", json!({})).await;

        let page = attach.await.expect("join").expect("attach");
        (connection, page, remote)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::transport::channel::testing::{answer, attached_page};

    use super::testing::page;

    #[tokio::test]
    async fn test_attach_loads_frame_tree() {
        let (_connection, page, _remote) = page().await;

        assert_eq!(page.url(), "https://a.test/");
        assert_eq!(page.frames().frames().len(), 2);
        assert_eq!(page.navigation_timeout(), Duration::from_secs(30));
        assert!(!page.is_closed());
    }

    #[tokio::test]
    async fn test_attach_rejects_root_session() {
        let (connection, _session, _remote) = attached_page().await;
        let err = Page::attach(connection.root().clone()).await.unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
    }

    #[tokio::test]
    async fn test_close_targets_root_session() {
        let (_connection, page, mut remote) = page().await;
        let close = tokio::spawn({
            let page = page.clone();
            async move { page.close().await }
        });

        let command = answer(&mut remote, "Target.closeTarget", json!({ "success": true })).await;
        assert_eq!(command["params"]["targetId"], "T1");
        assert!(command.get("sessionId").is_none());
        close.await.expect("join").expect("close");
    }

    #[tokio::test]
    async fn test_connection_close_marks_page_closed() {
        let (connection, page, _remote) = page().await;
        connection.close();
        connection.closed().await;
        assert!(page.is_closed());
    }
}
