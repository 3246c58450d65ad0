//! Connection and reader loop.
//!
//! One [`Connection`] owns one transport. A spawned reader task pumps the
//! transport and performs all dispatch, in arrival order:
//!
//! - replies resolve the pending command with the same ID
//! - events are emitted on the emitter of the session named by `sessionId`
//!   (the root session when absent)
//! - `Target.attachedToTarget` / `Target.detachedFromTarget` maintain the
//!   session table before the event itself is emitted
//!
//! Outgoing frames are queued on a channel and written by the same task, so
//! listeners running on the reader can post commands without awaiting.
//!
//! When the transport ends, every pending command fails with
//! [`Error::ConnectionClosed`] and every session emitter is closed, which in
//! turn resolves all event waits.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Error, Result};
use crate::events::{CloseReason, ListenerGuard};
use crate::identifiers::{CommandId, SessionId, TargetId};
use crate::options::{ConnectOptions, validate_ws_url};
use crate::protocol::event::{AttachToTargetResult, AttachedToTarget, DetachedFromTarget};
use crate::protocol::{CommandMessage, EventMessage, Message, Reply, TargetCommand, methods};

use super::session::{Session, SessionInner};
use super::{Transport, WebSocketTransport};

// ============================================================================
// Types
// ============================================================================

/// A command awaiting its reply.
struct PendingCall {
    method: String,
    session_id: Option<SessionId>,
    created_at: Instant,
    tx: oneshot::Sender<Result<Value>>,
}

/// State guarded by a single lock so that registration, detach and close
/// are totally ordered.
#[derive(Default)]
struct ConnectionState {
    pending: FxHashMap<CommandId, PendingCall>,
    closed: bool,
}

impl ConnectionState {
    fn check_open(&self, session: &SessionInner) -> Result<()> {
        if self.closed {
            return Err(Error::ConnectionClosed);
        }
        if session.is_detached_flag()
            && let Some(id) = session.id()
        {
            return Err(Error::session_detached(id.clone()));
        }
        Ok(())
    }
}

/// Internal commands for the reader loop.
enum ConnectionCommand {
    /// Write a frame.
    Write {
        text: String,
        /// Command whose pending record fails if the write fails.
        id: Option<CommandId>,
        /// Write confirmation for fire-and-forget sends.
        written: Option<oneshot::Sender<Result<()>>>,
    },
    /// Close the transport.
    Shutdown,
}

// ============================================================================
// ConnectionInner
// ============================================================================

pub(crate) struct ConnectionInner {
    command_tx: mpsc::UnboundedSender<ConnectionCommand>,
    next_id: AtomicU64,
    state: Mutex<ConnectionState>,
    sessions: RwLock<FxHashMap<SessionId, Session>>,
    root: Session,
    options: ConnectOptions,
}

/// Removes a pending record when the waiting caller goes away.
struct PendingGuard<'a> {
    inner: &'a ConnectionInner,
    id: CommandId,
}

impl PendingGuard<'_> {
    /// Removes the record, returning `true` if it was still pending.
    fn remove(&self) -> bool {
        self.inner.state.lock().pending.remove(&self.id).is_some()
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.remove();
    }
}

impl ConnectionInner {
    pub(crate) fn options(&self) -> &ConnectOptions {
        &self.options
    }

    fn next_command_id(&self) -> CommandId {
        CommandId::new(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    async fn apply_slow_mo(&self) {
        let delay = self.options.slow_mo();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Sends a command and waits for its reply.
    pub(crate) async fn call(
        &self,
        session: &SessionInner,
        method: &str,
        params: Value,
        reply_timeout: Duration,
    ) -> Result<Value> {
        self.apply_slow_mo().await;

        let id = self.next_command_id();
        let text = CommandMessage::new(id, method, &params, session.id()).to_text()?;
        let (tx, rx) = oneshot::channel();

        {
            let mut state = self.state.lock();
            state.check_open(session)?;

            let max = self.options.max_pending();
            if state.pending.len() >= max {
                warn!(pending = state.pending.len(), max, "Too many pending commands");
                return Err(Error::TooManyPending {
                    pending: state.pending.len(),
                    max,
                });
            }

            state.pending.insert(
                id,
                PendingCall {
                    method: method.to_string(),
                    session_id: session.id().cloned(),
                    created_at: Instant::now(),
                    tx,
                },
            );
        }
        let guard = PendingGuard { inner: self, id };

        self.command_tx
            .send(ConnectionCommand::Write {
                text,
                id: Some(id),
                written: None,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        trace!(%id, method, session_id = ?session.id(), "Command queued");

        self.await_reply(guard, method, rx, reply_timeout).await
    }

    async fn await_reply(
        &self,
        guard: PendingGuard<'_>,
        method: &str,
        mut rx: oneshot::Receiver<Result<Value>>,
        reply_timeout: Duration,
    ) -> Result<Value> {
        if reply_timeout.is_zero() {
            return rx.await.unwrap_or(Err(Error::ConnectionClosed));
        }

        match tokio::time::timeout(reply_timeout, &mut rx).await {
            Ok(outcome) => outcome.unwrap_or(Err(Error::ConnectionClosed)),
            Err(_) => {
                if guard.remove() {
                    let timeout_ms = reply_timeout.as_millis() as u64;
                    debug!(id = %guard.id, method, timeout_ms, "Command timed out");
                    Err(Error::request_timeout(guard.id, method, timeout_ms))
                } else {
                    // Resolved by the reader between the timer firing and the removal.
                    rx.await.unwrap_or(Err(Error::ConnectionClosed))
                }
            }
        }
    }

    /// Queues a command without registering for a reply.
    ///
    /// With `written`, the caller is told whether the write succeeded.
    pub(crate) fn enqueue(
        &self,
        session: &SessionInner,
        method: &str,
        params: &Value,
        written: Option<oneshot::Sender<Result<()>>>,
    ) -> Result<CommandId> {
        self.state.lock().check_open(session)?;

        let id = self.next_command_id();
        let text = CommandMessage::new(id, method, params, session.id()).to_text()?;

        self.command_tx
            .send(ConnectionCommand::Write {
                text,
                id: None,
                written,
            })
            .map_err(|_| Error::ConnectionClosed)?;

        trace!(%id, method, session_id = ?session.id(), "Command posted");
        Ok(id)
    }

    /// Sends a command and waits only until it is written.
    pub(crate) async fn send_no_reply(
        &self,
        session: &SessionInner,
        method: &str,
        params: Value,
    ) -> Result<()> {
        self.apply_slow_mo().await;
        let (tx, rx) = oneshot::channel();
        self.enqueue(session, method, &params, Some(tx))?;
        rx.await.unwrap_or(Err(Error::ConnectionClosed))
    }

    pub(crate) fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

// ============================================================================
// ConnectionInner - Dispatch
// ============================================================================

impl ConnectionInner {
    fn dispatch(self: &Arc<Self>, text: &str) {
        match Message::parse(text) {
            Ok(Message::Reply(reply)) => self.resolve_reply(reply),
            Ok(Message::Event(event)) => self.route_event(event),
            Err(e) => warn!(error = %e, len = text.len(), "Dropping malformed frame"),
        }
    }

    fn resolve_reply(&self, reply: Reply) {
        let id = reply.id;
        let Some(call) = self.state.lock().pending.remove(&id) else {
            debug!(%id, "Reply for unknown or expired command");
            return;
        };

        let outcome = reply.into_result(&call.method);
        trace!(
            %id,
            method = %call.method,
            session_id = ?call.session_id,
            elapsed_ms = call.created_at.elapsed().as_millis() as u64,
            ok = outcome.is_ok(),
            "Command resolved"
        );
        let _ = call.tx.send(outcome);
    }

    fn route_event(self: &Arc<Self>, event: EventMessage) {
        match event.method.as_str() {
            methods::ATTACHED_TO_TARGET => self.on_attached(&event),
            methods::DETACHED_FROM_TARGET => self.on_detached(&event),
            _ => {}
        }

        let session = match &event.session_id {
            None => Some(self.root.clone()),
            Some(id) => self.sessions.read().get(id).cloned(),
        };

        match session {
            Some(session) => {
                let listeners = session.emitter().emit(&event.method, &event.params);
                trace!(method = %event.method, session_id = ?event.session_id, listeners, "Event dispatched");
            }
            None => {
                warn!(
                    method = %event.method,
                    session_id = ?event.session_id,
                    "Dropping event for unknown session"
                );
            }
        }
    }

    fn on_attached(self: &Arc<Self>, event: &EventMessage) {
        let payload: AttachedToTarget = match event.decode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Malformed attachedToTarget");
                return;
            }
        };

        let mut sessions = self.sessions.write();
        if sessions.contains_key(&payload.session_id) {
            return;
        }

        let session = Session::attached(
            payload.session_id.clone(),
            payload.target_info.target_id.clone(),
            payload.target_info.target_type.as_str().into(),
            Arc::downgrade(self),
        );
        sessions.insert(payload.session_id.clone(), session);

        debug!(
            session_id = %payload.session_id,
            target_id = %payload.target_info.target_id,
            target_type = %payload.target_info.target_type,
            "Session attached"
        );
    }

    fn on_detached(&self, event: &EventMessage) {
        let payload: DetachedFromTarget = match event.decode() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Malformed detachedFromTarget");
                return;
            }
        };

        let removed = self.sessions.write().remove(&payload.session_id);
        match removed {
            Some(session) => self.mark_detached(&session, payload.session_id),
            None => debug!(session_id = %payload.session_id, "Detach for unknown session"),
        }
    }

    /// Fails the session's pending commands and closes its emitter.
    fn mark_detached(&self, session: &Session, session_id: SessionId) {
        let failed: Vec<PendingCall> = {
            let mut state = self.state.lock();
            session.inner.mark_detached();
            state
                .pending
                .extract_if(|_, call| call.session_id.as_ref() == Some(&session_id))
                .map(|(_, call)| call)
                .collect()
        };

        let count = failed.len();
        for call in failed {
            let _ = call.tx.send(Err(Error::session_detached(session_id.clone())));
        }

        session
            .emitter()
            .close(CloseReason::SessionDetached(session_id.clone()));

        debug!(%session_id, failed = count, "Session detached");
    }

    /// Broadcasts closure to every pending command and session.
    fn on_closed(&self) {
        let failed: Vec<PendingCall> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.pending.drain().map(|(_, call)| call).collect()
        };

        let count = failed.len();
        for call in failed {
            let _ = call.tx.send(Err(Error::ConnectionClosed));
        }

        let sessions: Vec<Session> = self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in &sessions {
            session.emitter().close(CloseReason::ConnectionClosed);
        }
        self.root.emitter().close(CloseReason::ConnectionClosed);

        info!(failed = count, sessions = sessions.len(), "Connection closed");
    }
}

// ============================================================================
// Reader Loop
// ============================================================================

async fn run_event_loop<T: Transport>(
    mut transport: T,
    mut command_rx: mpsc::UnboundedReceiver<ConnectionCommand>,
    inner: Arc<ConnectionInner>,
) {
    loop {
        tokio::select! {
            frame = transport.recv() => {
                match frame {
                    Some(Ok(text)) => inner.dispatch(&text),

                    Some(Err(e)) if matches!(e, Error::MalformedFrame { .. }) => {
                        warn!(error = %e, "Dropping unreadable frame");
                    }

                    Some(Err(e)) => {
                        error!(error = %e, "Transport error");
                        break;
                    }

                    None => {
                        debug!("Transport ended");
                        break;
                    }
                }
            }

            command = command_rx.recv() => {
                match command {
                    Some(ConnectionCommand::Write { text, id, written }) => {
                        let outcome = transport.send(text).await;
                        if let Err(e) = &outcome {
                            warn!(error = %e, ?id, "Failed to write frame");
                        }
                        match (id, written) {
                            (Some(id), _) => {
                                if let Err(e) = outcome
                                    && let Some(call) = inner.state.lock().pending.remove(&id)
                                {
                                    let _ = call.tx.send(Err(e));
                                }
                            }
                            (None, Some(written)) => {
                                let _ = written.send(outcome);
                            }
                            (None, None) => {}
                        }
                    }

                    Some(ConnectionCommand::Shutdown) | None => {
                        debug!("Shutdown requested");
                        if let Err(e) = transport.close().await {
                            debug!(error = %e, "Transport close failed");
                        }
                        break;
                    }
                }
            }
        }
    }

    inner.on_closed();
}

// ============================================================================
// Connection
// ============================================================================

/// A multiplexed DevTools connection.
///
/// Cheap to clone; all clones share the same transport and session table.
/// The reader task keeps running until the transport ends or
/// [`close`](Self::close) is called; dropping handles does not close it.
#[derive(Clone)]
pub struct Connection {
    pub(crate) inner: Arc<ConnectionInner>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("pending", &self.pending_count())
            .field("sessions", &self.inner.sessions.read().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    /// Connects to a DevTools WebSocket endpoint.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the endpoint is not a `ws`/`wss` URL or no
    ///   runtime is available
    /// - [`Error::WebSocket`] if the handshake fails
    pub async fn connect(endpoint: &str, options: ConnectOptions) -> Result<Self> {
        let url = validate_ws_url(endpoint)?;
        let transport = WebSocketTransport::connect(&url).await?;
        Self::with_transport(transport, options)
    }

    /// Wraps an already-open transport and spawns the reader task.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no runtime is available.
    pub fn with_transport<T: Transport>(transport: T, options: ConnectOptions) -> Result<Self> {
        let runtime = options.runtime()?;
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let inner = Arc::new_cyclic(|weak| ConnectionInner {
            command_tx,
            next_id: AtomicU64::new(1),
            state: Mutex::new(ConnectionState::default()),
            sessions: RwLock::new(FxHashMap::default()),
            root: Session::root(weak.clone()),
            options,
        });

        runtime.spawn(run_event_loop(transport, command_rx, Arc::clone(&inner)));
        info!("Connection established");

        Ok(Self { inner })
    }

    /// Returns the root (browser) session.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Session {
        &self.inner.root
    }

    /// Looks up an attached session.
    #[must_use]
    pub fn session(&self, id: &SessionId) -> Option<Session> {
        self.inner.sessions.read().get(id).cloned()
    }

    /// Returns every attached session.
    #[must_use]
    pub fn sessions(&self) -> Vec<Session> {
        self.inner.sessions.read().values().cloned().collect()
    }

    /// Attaches to a target and returns its session.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if the target cannot be attached
    /// - [`Error::SessionDetached`] if the session detached before the reply
    ///   was processed
    pub async fn create_session(&self, target_id: TargetId) -> Result<Session> {
        let result = self
            .root()
            .send_command(TargetCommand::AttachToTarget {
                target_id,
                flatten: true,
            })
            .await?;
        let AttachToTargetResult { session_id } = serde_json::from_value(result)?;

        self.session(&session_id)
            .ok_or_else(|| Error::session_detached(session_id))
    }

    /// Sends a command on the root session.
    ///
    /// # Errors
    ///
    /// See [`Session::send`].
    pub async fn send(&self, method: &str, params: Value) -> Result<Value> {
        self.root().send(method, params).await
    }

    /// Returns the number of commands awaiting a reply.
    #[inline]
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending_count()
    }

    /// Returns `true` once the transport has ended.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Returns the options the connection was created with.
    #[inline]
    #[must_use]
    pub fn options(&self) -> &ConnectOptions {
        self.inner.options()
    }

    /// Closes the transport.
    ///
    /// Pending commands and waits resolve with [`Error::ConnectionClosed`].
    pub fn close(&self) {
        let _ = self.inner.command_tx.send(ConnectionCommand::Shutdown);
    }

    /// Waits until the reader task has shut down.
    pub async fn closed(&self) {
        let (tx, rx) = oneshot::channel();
        let slot = Mutex::new(Some(tx));
        let emitter = self.root().emitter();
        let Some(hook) = emitter.on_close(move |_| {
            if let Some(tx) = slot.lock().take() {
                let _ = tx.send(());
            }
        }) else {
            return;
        };
        let mut guard = ListenerGuard::new(emitter.clone());
        guard.push(hook);
        let _ = rx.await;
    }
}

// ============================================================================
// Tests
// ============================================================================
