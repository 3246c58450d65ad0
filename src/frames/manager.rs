//! Per-session frame tree maintenance.
//!
//! The manager applies `Page.*` and `Runtime.*` events to a [`FrameTree`]
//! and re-publishes each applied change as a [`FrameEvent`]. The tree is
//! always updated before the event is emitted, so listeners observe the
//! post-event state.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::{Error, Result};
use crate::events::{EventEmitter, EventStream, ListenerGuard};
use crate::identifiers::{ExecutionContextId, FrameId, ListenerId};
use crate::network::NetworkManager;
use crate::protocol::event::{
    EvaluateResult, ExecutionContextCreated, ExecutionContextDestroyed, FrameAttached,
    FrameDetached, FrameNavigated, FrameStoppedLoading, FrameTreeResult, LifecycleEvent,
    NavigatedWithinDocument,
};
use crate::protocol::{PageCommand, RuntimeCommand, methods};
use crate::transport::Session;

use super::lifecycle::{LifecycleWatcher, WaitMode, WaitUntil};
use super::tree::{ExecutionContext, Frame, FrameTree, UTILITY_WORLD, World};

// ============================================================================
// FrameEvent
// ============================================================================

/// Topic names published by [`FrameManager`].
pub mod topics {
    pub const FRAME_ATTACHED: &str = "frameattached";
    pub const FRAME_NAVIGATED: &str = "framenavigated";
    pub const FRAME_DETACHED: &str = "framedetached";
    pub const LIFECYCLE_EVENT: &str = "lifecycleevent";
    pub const CONTEXT_CREATED: &str = "executioncontextcreated";
    pub const CONTEXT_DESTROYED: &str = "executioncontextdestroyed";
    pub const TARGET_CRASHED: &str = "targetcrashed";

    /// Topics that can change a navigation wait's outcome.
    pub const TREE_CHANGES: [&str; 4] = [FRAME_ATTACHED, FRAME_NAVIGATED, FRAME_DETACHED, LIFECYCLE_EVENT];
}

/// A change applied to the frame tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A child frame was attached.
    Attached {
        /// New frame.
        frame_id: FrameId,
        /// Its parent.
        parent_id: FrameId,
    },
    /// A frame committed a new document, or navigated within its document.
    Navigated {
        /// Navigated frame.
        frame_id: FrameId,
        /// New URL.
        url: String,
        /// `true` for a same-document navigation.
        same_document: bool,
    },
    /// A frame and its descendants were removed.
    Detached {
        /// Removed frame.
        frame_id: FrameId,
    },
    /// A lifecycle event was recorded.
    Lifecycle {
        /// Frame.
        frame_id: FrameId,
        /// Event name (`load`, `DOMContentLoaded`, ...).
        name: String,
    },
    /// An execution context was created.
    ContextCreated(ExecutionContext),
    /// An execution context was destroyed.
    ContextDestroyed {
        /// Destroyed context.
        context_id: ExecutionContextId,
    },
    /// The target crashed.
    Crashed,
}

impl FrameEvent {
    /// Topic this event is published on.
    #[must_use]
    pub fn topic(&self) -> &'static str {
        match self {
            Self::Attached { .. } => topics::FRAME_ATTACHED,
            Self::Navigated { .. } => topics::FRAME_NAVIGATED,
            Self::Detached { .. } => topics::FRAME_DETACHED,
            Self::Lifecycle { .. } => topics::LIFECYCLE_EVENT,
            Self::ContextCreated(_) => topics::CONTEXT_CREATED,
            Self::ContextDestroyed { .. } => topics::CONTEXT_DESTROYED,
            Self::Crashed => topics::TARGET_CRASHED,
        }
    }
}

// ============================================================================
// FrameInner
// ============================================================================

pub(crate) struct FrameInner {
    session: Session,
    network: NetworkManager,
    emitter: EventEmitter<FrameEvent>,
    tree: Mutex<FrameTree>,
    _listeners: ListenerGuard<Value>,
}

impl FrameInner {
    fn publish(&self, events: Vec<FrameEvent>) {
        for event in &events {
            self.emitter.emit(event.topic(), event);
        }
    }

    fn on_frame_attached(&self, event: FrameAttached) {
        let attached = self
            .tree
            .lock()
            .attach(event.frame_id.clone(), event.parent_frame_id.clone());
        if attached {
            trace!(frame_id = %event.frame_id, parent_id = %event.parent_frame_id, "Frame attached");
            self.publish(vec![FrameEvent::Attached {
                frame_id: event.frame_id,
                parent_id: event.parent_frame_id,
            }]);
        }
    }

    fn on_frame_navigated(&self, event: FrameNavigated) {
        let Some(navigated) = self.tree.lock().navigated(&event.frame) else {
            debug!(frame_id = %event.frame.id, "Navigation for unknown frame");
            return;
        };
        trace!(frame_id = %navigated.frame_id, url = %event.frame.url, "Frame navigated");

        let mut events: Vec<FrameEvent> = navigated
            .destroyed_contexts
            .into_iter()
            .map(|context_id| FrameEvent::ContextDestroyed { context_id })
            .collect();
        events.extend(
            navigated
                .detached
                .into_iter()
                .map(|frame_id| FrameEvent::Detached { frame_id }),
        );
        events.push(FrameEvent::Navigated {
            frame_id: navigated.frame_id,
            url: event.frame.full_url(),
            same_document: false,
        });
        self.publish(events);
    }

    fn on_navigated_within_document(&self, event: NavigatedWithinDocument) {
        if self
            .tree
            .lock()
            .navigated_within_document(&event.frame_id, &event.url)
        {
            self.publish(vec![FrameEvent::Navigated {
                frame_id: event.frame_id,
                url: event.url,
                same_document: true,
            }]);
        }
    }

    fn on_frame_detached(&self, event: FrameDetached) {
        trace!(frame_id = %event.frame_id, reason = ?event.reason, "Frame detached");
        let detached = self.tree.lock().detach(&event.frame_id);
        let mut events: Vec<FrameEvent> = detached
            .contexts
            .into_iter()
            .map(|context_id| FrameEvent::ContextDestroyed { context_id })
            .collect();
        events.extend(
            detached
                .frames
                .into_iter()
                .map(|frame_id| FrameEvent::Detached { frame_id }),
        );
        self.publish(events);
    }

    fn on_lifecycle_event(&self, event: LifecycleEvent) {
        let changed =
            self.tree
                .lock()
                .lifecycle_event(&event.frame_id, &event.loader_id, &event.name);
        if changed {
            self.publish(vec![FrameEvent::Lifecycle {
                frame_id: event.frame_id,
                name: event.name,
            }]);
        }
    }

    fn on_frame_stopped_loading(&self, event: FrameStoppedLoading) {
        if self.tree.lock().stopped_loading(&event.frame_id) {
            self.publish(vec![FrameEvent::Lifecycle {
                frame_id: event.frame_id,
                name: "load".to_string(),
            }]);
        }
    }

    fn on_context_created(&self, event: ExecutionContextCreated) {
        if let Some(context) = self.tree.lock().context_created(&event.context) {
            trace!(context_id = %context.id, frame_id = %context.frame_id, world = ?context.world, "Execution context created");
            self.publish(vec![FrameEvent::ContextCreated(context)]);
        }
    }

    fn on_context_destroyed(&self, event: ExecutionContextDestroyed) {
        if self
            .tree
            .lock()
            .context_destroyed(event.execution_context_id)
            .is_some()
        {
            self.publish(vec![FrameEvent::ContextDestroyed {
                context_id: event.execution_context_id,
            }]);
        }
    }

    fn on_contexts_cleared(&self) {
        let cleared = self.tree.lock().contexts_cleared();
        self.publish(
            cleared
                .into_iter()
                .map(|context_id| FrameEvent::ContextDestroyed { context_id })
                .collect(),
        );
    }

    fn on_target_crashed(&self) {
        warn!(session = ?self.session.id(), "Target crashed");
        self.publish(vec![FrameEvent::Crashed]);
    }
}

// ============================================================================
// FrameManager
// ============================================================================

/// Frame tree and navigation waits for one session. Cheap to clone.
#[derive(Clone)]
pub struct FrameManager {
    pub(crate) inner: Arc<FrameInner>,
}

impl fmt::Debug for FrameManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FrameManager")
            .field("session", &self.inner.session.id())
            .field("frames", &self.inner.tree.lock().len())
            .finish_non_exhaustive()
    }
}

impl FrameManager {
    /// Creates a manager listening on `session`.
    ///
    /// `network` supplies the in-flight count for network-idle waits.
    #[must_use]
    pub fn new(session: Session, network: NetworkManager) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<FrameInner>| {
            let emitter = EventEmitter::new();
            let mut listeners = ListenerGuard::new(session.emitter().clone());

            macro_rules! route {
                ($method:expr, $payload:ty, $handler:ident) => {{
                    let weak = weak.clone();
                    listeners.push(session.on_typed($method, move |event: $payload| {
                        if let Some(inner) = weak.upgrade() {
                            inner.$handler(event);
                        }
                    }));
                }};
            }

            route!(methods::FRAME_ATTACHED, FrameAttached, on_frame_attached);
            route!(methods::FRAME_NAVIGATED, FrameNavigated, on_frame_navigated);
            route!(methods::NAVIGATED_WITHIN_DOCUMENT, NavigatedWithinDocument, on_navigated_within_document);
            route!(methods::FRAME_DETACHED, FrameDetached, on_frame_detached);
            route!(methods::FRAME_STOPPED_LOADING, FrameStoppedLoading, on_frame_stopped_loading);
            route!(methods::LIFECYCLE_EVENT, LifecycleEvent, on_lifecycle_event);
            route!(methods::EXECUTION_CONTEXT_CREATED, ExecutionContextCreated, on_context_created);
            route!(methods::EXECUTION_CONTEXT_DESTROYED, ExecutionContextDestroyed, on_context_destroyed);

            for (method, handler) in [
                (methods::EXECUTION_CONTEXTS_CLEARED, FrameInner::on_contexts_cleared as fn(&FrameInner)),
                (methods::TARGET_CRASHED, FrameInner::on_target_crashed),
            ] {
                let weak = weak.clone();
                listeners.push(session.on(method, move |_| {
                    if let Some(inner) = weak.upgrade() {
                        handler(&inner);
                    }
                }));
            }

            let forward: EventEmitter<FrameEvent> = emitter.clone();
            let hook = session.emitter().on_close(move |reason| {
                forward.close(reason.clone());
            });
            match hook {
                Some(id) => listeners.push(id),
                None => {
                    if let Some(reason) = session.emitter().closed_reason() {
                        emitter.close(reason);
                    }
                }
            }

            FrameInner {
                session: session.clone(),
                network,
                emitter,
                tree: Mutex::new(FrameTree::new()),
                _listeners: listeners,
            }
        });

        Self { inner }
    }

    /// Loads the frame tree and enables lifecycle and runtime events.
    ///
    /// Also creates the utility world in every frame; failures there are
    /// logged, as frames may detach while it is being created.
    ///
    /// # Errors
    ///
    /// Returns the first failing required command's error.
    pub async fn initialize(&self) -> Result<()> {
        let session = &self.inner.session;
        session.send_command(PageCommand::Enable).await?;

        let tree: FrameTreeResult =
            serde_json::from_value(session.send_command(PageCommand::GetFrameTree).await?)?;
        self.inner.tree.lock().load(&tree.frame_tree);

        session
            .send_command(PageCommand::SetLifecycleEventsEnabled { enabled: true })
            .await?;
        session.send_command(RuntimeCommand::Enable).await?;

        self.ensure_utility_world().await;
        Ok(())
    }

    async fn ensure_utility_world(&self) {
        let session = &self.inner.session;
        let script = PageCommand::AddScriptToEvaluateOnNewDocument {
            source: format!("//# sourceURL={UTILITY_WORLD}"),
            world_name: Some(UTILITY_WORLD.to_string()),
        };
        if let Err(e) = session.send_command(script).await {
            debug!(error = %e, "Failed to register utility world script");
        }

        for frame_id in self.frames().into_iter().map(|frame| frame.id().clone()) {
            let command = PageCommand::CreateIsolatedWorld {
                frame_id: frame_id.clone(),
                world_name: UTILITY_WORLD.to_string(),
                grant_universal_access: true,
            };
            if let Err(e) = session.send_command(command).await {
                debug!(%frame_id, error = %e, "Failed to create utility world");
            }
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Session this manager tracks.
    #[inline]
    #[must_use]
    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    /// Network manager of the same session.
    #[inline]
    #[must_use]
    pub fn network(&self) -> &NetworkManager {
        &self.inner.network
    }

    /// Snapshot of the main frame.
    #[must_use]
    pub fn main_frame(&self) -> Option<Frame> {
        self.inner.tree.lock().main_frame().cloned()
    }

    /// Snapshot of a frame, following main-frame re-anchoring.
    #[must_use]
    pub fn frame(&self, id: &FrameId) -> Option<Frame> {
        self.inner.tree.lock().get(id).cloned()
    }

    /// Snapshots of every frame, main frame first.
    #[must_use]
    pub fn frames(&self) -> Vec<Frame> {
        self.inner
            .tree
            .lock()
            .frames()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Looks up an execution context.
    #[must_use]
    pub fn execution_context(&self, id: ExecutionContextId) -> Option<ExecutionContext> {
        self.inner.tree.lock().context(id).cloned()
    }

    /// Returns `true` if `events` all fired for `frame_id` and its descendants.
    #[must_use]
    pub fn lifecycle_complete(&self, frame_id: &FrameId, events: &[&str]) -> bool {
        self.inner.tree.lock().lifecycle_complete(frame_id, events)
    }

    /// Emitter carrying [`FrameEvent`]s.
    #[inline]
    #[must_use]
    pub fn emitter(&self) -> &EventEmitter<FrameEvent> {
        &self.inner.emitter
    }

    /// Registers a listener on a topic from [`topics`].
    pub fn on<F>(&self, topic: &str, callback: F) -> ListenerId
    where
        F: Fn(&FrameEvent) + Send + Sync + 'static,
    {
        self.inner.emitter.on(topic, callback)
    }

    /// Streams a topic from [`topics`] until the session closes.
    #[must_use]
    pub fn events(&self, topic: &str) -> EventStream<FrameEvent> {
        self.inner.emitter.subscribe(topic)
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    /// Starts watching `frame_id` for `wait_until`.
    ///
    /// Create the watcher before triggering a navigation so no event is
    /// missed. A zero `timeout` waits indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameNotFound`] for an unknown frame.
    pub fn watch(
        &self,
        frame_id: &FrameId,
        mode: WaitMode,
        wait_until: &[WaitUntil],
        timeout: Duration,
    ) -> Result<LifecycleWatcher> {
        LifecycleWatcher::new(self.clone(), frame_id, mode, wait_until, timeout)
    }

    /// Starts watching the main frame.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FrameNotFound`] before the frame tree is loaded.
    pub fn watch_main_frame(
        &self,
        mode: WaitMode,
        wait_until: &[WaitUntil],
        timeout: Duration,
    ) -> Result<LifecycleWatcher> {
        let main = self
            .main_frame()
            .ok_or_else(|| Error::invalid_argument("no main frame"))?;
        self.watch(main.id(), mode, wait_until, timeout)
    }

    // ========================================================================
    // Execution Contexts
    // ========================================================================

    /// Returns the context of `world` in `frame_id`, waiting for its creation
    /// if needed.
    ///
    /// # Errors
    ///
    /// - [`Error::FrameNotFound`] for an unknown frame, or one detached
    ///   while waiting
    /// - [`Error::Timeout`] if no context appeared in time
    /// - a closed error if the session closed first
    pub async fn wait_for_execution_context(
        &self,
        frame_id: &FrameId,
        world: World,
        timeout: Duration,
    ) -> Result<ExecutionContextId> {
        let mut listeners = ListenerGuard::new(self.inner.emitter.clone());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        for topic in [topics::CONTEXT_CREATED, topics::FRAME_DETACHED] {
            let tx = tx.clone();
            listeners.push(self.inner.emitter.on(topic, move |event| {
                let _ = tx.send(event.clone());
            }));
        }
        drop(tx);

        let resolved = {
            let tree = self.inner.tree.lock();
            let frame = tree
                .get(frame_id)
                .ok_or_else(|| Error::frame_not_found(frame_id.clone()))?;
            frame.context(world)
        };
        if let Some(id) = resolved {
            return Ok(id);
        }

        let target = frame_id.clone();
        let frames = self.clone();
        let wait = async move {
            while let Some(event) = rx.recv().await {
                let (owner, attached) = {
                    let tree = frames.inner.tree.lock();
                    let owner = tree.resolve(&target).clone();
                    let attached = tree.get(&owner).is_some();
                    (owner, attached)
                };
                match event {
                    FrameEvent::ContextCreated(context)
                        if context.frame_id == owner && context.world == world =>
                    {
                        return Ok(context.id);
                    }
                    FrameEvent::Detached { .. } if !attached => {
                        return Err(Error::frame_not_found(owner));
                    }
                    _ => {}
                }
            }
            Err(frames
                .inner
                .emitter
                .closed_reason()
                .map_or(Error::ConnectionClosed, |reason| reason.to_error()))
        };

        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        if timeout.is_zero() {
            return wait.await;
        }
        match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result,
            Err(_) => Err(self
                .inner
                .emitter
                .closed_reason()
                .map_or_else(|| Error::timeout("execution context", timeout_ms), |r| r.to_error())),
        }
    }

    /// Evaluates `expression` in an execution context and returns its value.
    ///
    /// The evaluation is raced against the context's destruction so a
    /// navigation never leaves it hanging.
    ///
    /// # Errors
    ///
    /// - [`Error::ExecutionContextDestroyed`] if the context is unknown or
    ///   destroyed before the reply
    /// - [`Error::Protocol`] if the script threw
    /// - any command error
    pub async fn evaluate(&self, context_id: ExecutionContextId, expression: &str) -> Result<Value> {
        let destroyed = Error::ExecutionContextDestroyed { context_id };

        // Listen before the existence check so no destruction slips between.
        let mut listeners = ListenerGuard::new(self.inner.emitter.clone());
        let (tx, mut gone) = tokio::sync::mpsc::unbounded_channel();
        listeners.push(self.inner.emitter.on(topics::CONTEXT_DESTROYED, move |event| {
            if matches!(event, FrameEvent::ContextDestroyed { context_id: id } if *id == context_id) {
                let _ = tx.send(());
            }
        }));

        if self.execution_context(context_id).is_none() {
            return Err(destroyed);
        }

        let command = RuntimeCommand::Evaluate {
            expression: expression.to_string(),
            context_id: Some(context_id),
            return_by_value: true,
            await_promise: true,
        };

        tokio::select! {
            reply = self.inner.session.send_command(command) => {
                let result: EvaluateResult = serde_json::from_value(reply?)?;
                if let Some(details) = result.exception_details {
                    let text = details
                        .pointer("/exception/description")
                        .or_else(|| details.get("text"))
                        .and_then(Value::as_str)
                        .unwrap_or("Evaluation failed")
                        .to_string();
                    return Err(Error::protocol("Runtime.evaluate", 0, text, Some(details)));
                }
                Ok(result.result.get("value").cloned().unwrap_or(Value::Null))
            }
            signal = gone.recv() => match signal {
                Some(()) => Err(destroyed),
                None => Err(self
                    .inner
                    .emitter
                    .closed_reason()
                    .map_or(Error::ConnectionClosed, |reason| reason.to_error())),
            },
        }
    }
}

// ============================================================================
// Test Support
// ============================================================================

#[cfg(test)]
pub(crate) mod testing {
    use serde_json::{Value, json};

    use crate::network::NetworkManager;
    use crate::transport::channel::command_id;
    use crate::transport::channel::testing::{answer, attached_page};
    use crate::transport::{Connection, RemoteEnd};

    use super::FrameManager;

    /// Main frame `M` (loader `L0`) with one child `A`.
    pub(crate) fn frame_tree() -> Value {
        json!({
            "frameTree": {
                "frame": { "id": "M", "loaderId": "L0", "url": "https://a.test/" },
                "childFrames": [
                    { "frame": { "id": "A", "parentId": "M", "loaderId": "LA", "url": "https://a.test/a" } }
                ]
            }
        })
    }

    /// Answers the command sequence of [`FrameManager::initialize`].
    pub(crate) async fn initialized(remote: &mut RemoteEnd, frames: &FrameManager) {
        let init = tokio::spawn({
            let frames = frames.clone();
            async move { frames.initialize().await }
        });
        answer(remote, "Page.enable", json!({})).await;
        answer(remote, "Page.getFrameTree", frame_tree()).await;
        answer(remote, "Page.setLifecycleEventsEnabled", json!({})).await;
        answer(remote, "Runtime.enable", json!({})).await;
        answer(remote, "Page.addScriptToEvaluateOnNewDocument", json!({ "identifier": "1" })).await;
        let first = answer(remote, "Page.createIsolatedWorld", json!({ "executionContextId": 9 })).await;
        assert_eq!(first["params"]["frameId"], "M");
        assert_eq!(first["params"]["grantUniveralAccess"], true);

        let second = remote.recv_command().await.expect("second world");
        let id = command_id(&second).expect("id");
        remote.reply_error(id, -32000, "Frame detached").expect("reply");
        init.await.expect("join").expect("initialize");
    }

    /// Attached page session with initialized network and frame managers.
    pub(crate) async fn setup() -> (Connection, FrameManager, RemoteEnd) {
        let (connection, session, mut remote) = attached_page().await;
        let network = NetworkManager::new(session.clone());
        let frames = FrameManager::new(session, network);
        initialized(&mut remote, &frames).await;
        (connection, frames, remote)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::transport::channel::testing::{answer, page_event};

    use super::testing::setup;

    #[tokio::test]
    async fn test_initialize_loads_tree() {
        let (_connection, frames, _remote) = setup().await;

        let main = frames.main_frame().expect("main");
        assert_eq!(main.id().as_str(), "M");
        assert_eq!(main.child_ids(), &[FrameId::from("A")]);
        assert_eq!(frames.frames().len(), 2);
    }

    #[tokio::test]
    async fn test_events_update_tree_before_publish() {
        let (_connection, frames, remote) = setup().await;
        let mut detached = frames.events(topics::FRAME_DETACHED);
        let mut attached = frames.events(topics::FRAME_ATTACHED);

        page_event(&remote, methods::FRAME_ATTACHED, json!({ "frameId": "B", "parentFrameId": "A" }));
        page_event(&remote, methods::FRAME_ATTACHED, json!({ "frameId": "B", "parentFrameId": "A" }));
        page_event(&remote, methods::FRAME_DETACHED, json!({ "frameId": "A" }));

        assert_eq!(
            attached.next_event().await,
            Some(FrameEvent::Attached {
                frame_id: FrameId::from("B"),
                parent_id: FrameId::from("A"),
            })
        );
        let first = detached.next_event().await.expect("detached");
        assert_eq!(first, FrameEvent::Detached { frame_id: FrameId::from("B") });
        assert!(frames.frame(&FrameId::from("A")).is_none());
        assert_eq!(frames.frames().len(), 1);
    }

    #[tokio::test]
    async fn test_lifecycle_and_stopped_loading() {
        let (_connection, frames, remote) = setup().await;
        let mut lifecycle = frames.events(topics::LIFECYCLE_EVENT);

        page_event(
            &remote,
            methods::LIFECYCLE_EVENT,
            json!({ "frameId": "M", "loaderId": "L0", "name": "DOMContentLoaded", "timestamp": 1.0 }),
        );
        page_event(&remote, methods::FRAME_STOPPED_LOADING, json!({ "frameId": "A" }));
        lifecycle.next_event().await.expect("dcl");
        lifecycle.next_event().await.expect("stopped");

        let main = FrameId::from("M");
        assert!(frames.lifecycle_complete(&main, &["DOMContentLoaded"]));
        assert!(!frames.lifecycle_complete(&main, &["load"]));
    }

    #[tokio::test]
    async fn test_wait_for_execution_context() {
        let (_connection, frames, remote) = setup().await;

        let wait = tokio::spawn({
            let frames = frames.clone();
            async move {
                frames
                    .wait_for_execution_context(&FrameId::from("M"), World::Main, Duration::from_secs(5))
                    .await
            }
        });
        tokio::task::yield_now().await;

        page_event(
            &remote,
            methods::EXECUTION_CONTEXT_CREATED,
            json!({ "context": { "id": 3, "origin": "", "name": "", "auxData": { "frameId": "A", "isDefault": true } } }),
        );
        page_event(
            &remote,
            methods::EXECUTION_CONTEXT_CREATED,
            json!({ "context": { "id": 4, "origin": "", "name": "", "auxData": { "frameId": "M", "isDefault": true } } }),
        );

        let id = wait.await.expect("join").expect("context");
        assert_eq!(id, ExecutionContextId::new(4));
        assert_eq!(frames.main_frame().expect("main").main_world(), Some(id));
    }

    #[tokio::test]
    async fn test_evaluate_fails_when_context_destroyed() {
        let (_connection, frames, mut remote) = setup().await;
        page_event(
            &remote,
            methods::EXECUTION_CONTEXT_CREATED,
            json!({ "context": { "id": 5, "origin": "", "name": "", "auxData": { "frameId": "M", "isDefault": true } } }),
        );
        let id = frames
            .wait_for_execution_context(&FrameId::from("M"), World::Main, Duration::from_secs(5))
            .await
            .expect("context");

        let eval = tokio::spawn({
            let frames = frames.clone();
            async move { frames.evaluate(id, "new Promise(() => {})").await }
        });
        let command = remote.recv_command().await.expect("evaluate");
        assert_eq!(command["method"], "Runtime.evaluate");
        assert_eq!(command["params"]["contextId"], 5);

        page_event(&remote, methods::EXECUTION_CONTEXT_DESTROYED, json!({ "executionContextId": 5 }));
        let err = eval.await.expect("join").unwrap_err();
        assert!(matches!(err, Error::ExecutionContextDestroyed { .. }));

        assert!(matches!(
            frames.evaluate(id, "1").await,
            Err(Error::ExecutionContextDestroyed { .. })
        ));
    }

    #[tokio::test]
    async fn test_wait_for_execution_context_fails_on_detach() {
        let (_connection, frames, remote) = setup().await;
        let created = frames.inner.emitter.listener_count(topics::CONTEXT_CREATED);
        let detached = frames.inner.emitter.listener_count(topics::FRAME_DETACHED);

        let wait = tokio::spawn({
            let frames = frames.clone();
            async move {
                frames
                    .wait_for_execution_context(&FrameId::from("A"), World::Main, Duration::from_secs(30))
                    .await
            }
        });
        tokio::task::yield_now().await;

        page_event(&remote, methods::FRAME_DETACHED, json!({ "frameId": "A" }));

        let err = wait.await.expect("join").unwrap_err();
        assert!(matches!(err, Error::FrameNotFound { ref frame_id } if frame_id.as_str() == "A"));
        assert_eq!(frames.inner.emitter.listener_count(topics::CONTEXT_CREATED), created);
        assert_eq!(frames.inner.emitter.listener_count(topics::FRAME_DETACHED), detached);
    }

    #[tokio::test]
    async fn test_evaluate_listens_for_destruction_before_sending() {
        let (_connection, frames, mut remote) = setup().await;
        page_event(
            &remote,
            methods::EXECUTION_CONTEXT_CREATED,
            json!({ "context": { "id": 6, "origin": "", "name": "", "auxData": { "frameId": "M", "isDefault": true } } }),
        );
        let id = frames
            .wait_for_execution_context(&FrameId::from("M"), World::Main, Duration::from_secs(5))
            .await
            .expect("context");
        let baseline = frames.inner.emitter.listener_count(topics::CONTEXT_DESTROYED);

        let eval = tokio::spawn({
            let frames = frames.clone();
            async move { frames.evaluate(id, "document.title").await }
        });
        let command = remote.recv_command().await.expect("evaluate");
        assert_eq!(command["method"], "Runtime.evaluate");
        assert_eq!(
            frames.inner.emitter.listener_count(topics::CONTEXT_DESTROYED),
            baseline + 1
        );

        // Destruction published while the context is still in the tree.
        frames.inner.emitter.emit(
            topics::CONTEXT_DESTROYED,
            &FrameEvent::ContextDestroyed { context_id: id },
        );
        let err = eval.await.expect("join").unwrap_err();
        assert!(matches!(err, Error::ExecutionContextDestroyed { .. }));
        assert_eq!(frames.inner.emitter.listener_count(topics::CONTEXT_DESTROYED), baseline);

        // An unknown context fails without leaving its listener behind.
        let unknown = frames.evaluate(ExecutionContextId::new(99), "1").await;
        assert!(matches!(unknown, Err(Error::ExecutionContextDestroyed { .. })));
        assert_eq!(frames.inner.emitter.listener_count(topics::CONTEXT_DESTROYED), baseline);
    }

    #[tokio::test]
    async fn test_evaluate_returns_value_and_exceptions() {
        let (_connection, frames, mut remote) = setup().await;
        page_event(
            &remote,
            methods::EXECUTION_CONTEXT_CREATED,
            json!({ "context": { "id": 5, "origin": "", "name": "", "auxData": { "frameId": "M", "isDefault": true } } }),
        );
        let id = frames
            .wait_for_execution_context(&FrameId::from("M"), World::Main, Duration::from_secs(5))
            .await
            .expect("context");

        let eval = tokio::spawn({
            let frames = frames.clone();
            async move { frames.evaluate(id, "1 + 1").await }
        });
        answer(&mut remote, "Runtime.evaluate", json!({ "result": { "type": "number", "value": 2 } })).await;
        assert_eq!(eval.await.expect("join").expect("value"), json!(2));

        let eval = tokio::spawn({
            let frames = frames.clone();
            async move { frames.evaluate(id, "boom()").await }
        });
        answer(
            &mut remote,
            "Runtime.evaluate",
            json!({
                "result": { "type": "object" },
                "exceptionDetails": { "text": "Uncaught", "exception": { "description": "ReferenceError: boom is not defined" } }
            }),
        )
        .await;
        let err = eval.await.expect("join").unwrap_err();
        assert!(err.to_string().contains("boom is not defined"));
    }

    #[tokio::test]
    async fn test_crash_is_published() {
        let (_connection, frames, remote) = setup().await;
        let mut crashed = frames.events(topics::TARGET_CRASHED);
        page_event(&remote, methods::TARGET_CRASHED, json!({}));
        assert_eq!(crashed.next_event().await, Some(FrameEvent::Crashed));
    }
}
