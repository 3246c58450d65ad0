//! Logical channel to one target.
//!
//! A [`Session`] tags outgoing commands with its session ID and owns the
//! emitter for events scoped to its target. Once detached, every operation
//! fails fast with [`Error::SessionDetached`].

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::events::{EventEmitter, EventStream, wait_for_event};
use crate::identifiers::{CommandId, ListenerId, SessionId, TargetId};
use crate::protocol::{Command, TargetCommand};

use super::connection::{Connection, ConnectionInner};

// ============================================================================
// TargetType
// ============================================================================

/// Kind of target a session is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetType {
    /// The browser itself (root session).
    Browser,
    /// Top-level page.
    Page,
    /// Out-of-process iframe.
    Iframe,
    /// Dedicated worker.
    Worker,
    /// Shared worker.
    SharedWorker,
    /// Service worker.
    ServiceWorker,
    /// Anything else.
    Other,
}

impl From<&str> for TargetType {
    fn from(value: &str) -> Self {
        match value {
            "browser" => Self::Browser,
            "page" => Self::Page,
            "iframe" => Self::Iframe,
            "worker" => Self::Worker,
            "shared_worker" => Self::SharedWorker,
            "service_worker" => Self::ServiceWorker,
            _ => Self::Other,
        }
    }
}

// ============================================================================
// SessionInner
// ============================================================================

pub(crate) struct SessionInner {
    id: Option<SessionId>,
    target_id: Option<TargetId>,
    target_type: TargetType,
    connection: Weak<ConnectionInner>,
    emitter: EventEmitter<Value>,
    detached: AtomicBool,
}

impl SessionInner {
    pub(crate) fn id(&self) -> Option<&SessionId> {
        self.id.as_ref()
    }

    /// Raw detached flag; only written under the connection state lock.
    pub(crate) fn is_detached_flag(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_detached(&self) {
        self.detached.store(true, Ordering::SeqCst);
    }

    fn connection(&self) -> Result<Arc<ConnectionInner>> {
        self.connection.upgrade().ok_or(Error::ConnectionClosed)
    }
}

// ============================================================================
// Session
// ============================================================================

/// Handle to a session. Cheap to clone.
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Arc<SessionInner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("target_type", &self.inner.target_type)
            .field("detached", &self.is_detached())
            .finish()
    }
}

impl PartialEq for Session {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Session {
    pub(crate) fn root(connection: Weak<ConnectionInner>) -> Self {
        Self::new(None, None, TargetType::Browser, connection)
    }

    pub(crate) fn attached(
        id: SessionId,
        target_id: TargetId,
        target_type: TargetType,
        connection: Weak<ConnectionInner>,
    ) -> Self {
        Self::new(Some(id), Some(target_id), target_type, connection)
    }

    fn new(
        id: Option<SessionId>,
        target_id: Option<TargetId>,
        target_type: TargetType,
        connection: Weak<ConnectionInner>,
    ) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                id,
                target_id,
                target_type,
                connection,
                emitter: EventEmitter::new(),
                detached: AtomicBool::new(false),
            }),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Session ID; `None` for the root session.
    #[inline]
    #[must_use]
    pub fn id(&self) -> Option<&SessionId> {
        self.inner.id.as_ref()
    }

    /// Target ID; `None` for the root session.
    #[inline]
    #[must_use]
    pub fn target_id(&self) -> Option<&TargetId> {
        self.inner.target_id.as_ref()
    }

    /// Kind of target.
    #[inline]
    #[must_use]
    pub fn target_type(&self) -> TargetType {
        self.inner.target_type
    }

    /// Returns `true` for the root browser session.
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.inner.id.is_none()
    }

    /// Returns `true` once detached or once the connection closed.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.inner.is_detached_flag() || self.inner.emitter.is_closed()
    }

    /// Returns the owning connection while it is alive.
    #[must_use]
    pub fn connection(&self) -> Option<Connection> {
        self.inner
            .connection
            .upgrade()
            .map(|inner| Connection { inner })
    }

    /// Emitter carrying this session's raw events, keyed by method name.
    #[inline]
    #[must_use]
    pub fn emitter(&self) -> &EventEmitter<Value> {
        &self.inner.emitter
    }

    // ========================================================================
    // Commands
    // ========================================================================

    /// Sends a command and waits for the reply, within the connection's
    /// command timeout.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the remote replied with an error object
    /// - [`Error::RequestTimeout`] if no reply arrived in time
    /// - [`Error::ConnectionClosed`] / [`Error::SessionDetached`] if the
    ///   channel went away first
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        let connection = self.inner.connection()?;
        let timeout = connection.options().command_timeout();
        connection.call(&self.inner, method, params, timeout).await
    }

    /// Sends a command with an explicit reply timeout (zero waits forever).
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_with_timeout(
        &self,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value> {
        let connection = self.inner.connection()?;
        connection.call(&self.inner, method, params, timeout).await
    }

    /// Sends a typed command.
    ///
    /// # Errors
    ///
    /// See [`send`](Self::send).
    pub async fn send_command(&self, command: impl Into<Command>) -> Result<Value> {
        let (method, params) = command.into().into_parts()?;
        self.send(&method, params).await
    }

    /// Sends a command without waiting for a reply; returns once written.
    ///
    /// # Errors
    ///
    /// Returns a closed error if the channel is gone, or the transport error
    /// if the write failed.
    pub async fn send_no_reply(&self, method: &str, params: Value) -> Result<()> {
        let connection = self.inner.connection()?;
        connection.send_no_reply(&self.inner, method, params).await
    }

    /// Queues a command without waiting at all.
    ///
    /// Safe to call from event listeners running on the reader task.
    ///
    /// # Errors
    ///
    /// Returns a closed error if the channel is already gone.
    pub fn post(&self, method: &str, params: &Value) -> Result<CommandId> {
        let connection = self.inner.connection()?;
        connection.enqueue(&self.inner, method, params, None)
    }

    /// Queues a typed command without waiting.
    ///
    /// # Errors
    ///
    /// See [`post`](Self::post).
    pub fn post_command(&self, command: impl Into<Command>) -> Result<CommandId> {
        let (method, params) = command.into().into_parts()?;
        self.post(&method, &params)
    }

    /// Detaches from the target.
    ///
    /// The session is torn down when the browser confirms with
    /// `Target.detachedFromTarget`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for the root session.
    pub async fn detach(&self) -> Result<()> {
        let Some(session_id) = self.inner.id.clone() else {
            return Err(Error::invalid_argument("the root session cannot be detached"));
        };
        let connection = self.connection().ok_or(Error::ConnectionClosed)?;

        debug!(%session_id, "Detaching session");
        connection
            .root()
            .send_command(TargetCommand::DetachFromTarget { session_id })
            .await?;
        Ok(())
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Registers a listener for `event`.
    pub fn on<F>(&self, event: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.emitter.on(event, callback)
    }

    /// Registers a listener receiving `event` params decoded as `T`.
    ///
    /// Params that fail to decode are logged and skipped.
    pub fn on_typed<T, F>(&self, event: &'static str, callback: F) -> ListenerId
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        self.inner.emitter.on(event, move |params: &Value| {
            match T::deserialize(params) {
                Ok(payload) => callback(payload),
                Err(e) => warn!(event, error = %e, "Dropping undecodable event"),
            }
        })
    }

    /// Registers a listener for the next `event` only.
    pub fn once<F>(&self, event: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.inner.emitter.once(event, callback)
    }

    /// Removes a listener.
    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.emitter.off(id)
    }

    /// Streams every `event` until the session closes.
    #[must_use]
    pub fn events(&self, event: &str) -> EventStream<Value> {
        self.inner.emitter.subscribe(event)
    }

    /// Waits for the first `event` whose params satisfy `predicate`.
    ///
    /// A zero `timeout` waits until the event or closure.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if nothing matched in time
    /// - [`Error::SessionDetached`] / [`Error::ConnectionClosed`] if the
    ///   session closed first
    pub async fn wait_for<P>(&self, event: &str, predicate: P, timeout: Duration) -> Result<Value>
    where
        P: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        wait_for_event(&self.inner.emitter, event, predicate, timeout).await
    }
}

// ============================================================================
// Tests
// ============================================================================
