//! Synchronous topic-based publish/subscribe.
//!
//! Every component owns one [`EventEmitter`]: sessions publish raw protocol
//! events keyed by method name, the network manager publishes request
//! lifecycle events, the frame manager publishes frame-tree changes.
//!
//! Listeners run on the emitting task (normally the connection reader) and
//! must not block. The emitter lock is released before callbacks run, so a
//! listener may register or remove listeners, including itself.
//!
//! An emitter can be closed exactly once. Closing drops every topic listener
//! and runs the close hooks with the [`CloseReason`], which is how waits learn
//! that their session or connection went away.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::Stream;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tracing::{trace, warn};

use crate::error::Error;
use crate::identifiers::{ListenerId, SessionId};

// ============================================================================
// Types
// ============================================================================

/// Listener callback.
pub type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Close hook callback.
type CloseHook = Arc<dyn Fn(&CloseReason) + Send + Sync>;

// ============================================================================
// CloseReason
// ============================================================================

/// Why an emitter was closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The underlying connection closed.
    ConnectionClosed,
    /// The owning session detached.
    SessionDetached(SessionId),
}

impl CloseReason {
    /// Converts the reason into the error surfaced to pending operations.
    #[must_use]
    pub fn to_error(&self) -> Error {
        match self {
            Self::ConnectionClosed => Error::ConnectionClosed,
            Self::SessionDetached(id) => Error::session_detached(id.clone()),
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionClosed => f.write_str("connection closed"),
            Self::SessionDetached(id) => write!(f, "session {id} detached"),
        }
    }
}

// ============================================================================
// Internal State
// ============================================================================

struct Listener<T> {
    id: ListenerId,
    once: bool,
    callback: Callback<T>,
}

struct EmitterState<T> {
    topics: FxHashMap<String, Vec<Listener<T>>>,
    close_hooks: Vec<(ListenerId, CloseHook)>,
    closed: Option<CloseReason>,
}

impl<T> Default for EmitterState<T> {
    fn default() -> Self {
        Self {
            topics: FxHashMap::default(),
            close_hooks: Vec::new(),
            closed: None,
        }
    }
}

// ============================================================================
// EventEmitter
// ============================================================================

/// Named-topic event emitter with many-listener fan-out.
///
/// Cloning yields another handle to the same listener table.
pub struct EventEmitter<T> {
    state: Arc<Mutex<EmitterState<T>>>,
}

impl<T> Clone for EventEmitter<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> Default for EventEmitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for EventEmitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EventEmitter")
            .field("topics", &state.topics.len())
            .field("close_hooks", &state.close_hooks.len())
            .field("closed", &state.closed)
            .finish()
    }
}

// ============================================================================
// EventEmitter - Registration
// ============================================================================

impl<T> EventEmitter<T> {
    /// Creates an empty emitter.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(EmitterState::default())),
        }
    }

    /// Registers a listener for every event on `topic`.
    pub fn on<F>(&self, topic: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.add(topic.into(), Arc::new(callback), false)
    }

    /// Registers a listener that is removed after its first invocation.
    pub fn once<F>(&self, topic: impl Into<String>, callback: F) -> ListenerId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.add(topic.into(), Arc::new(callback), true)
    }

    fn add(&self, topic: String, callback: Callback<T>, once: bool) -> ListenerId {
        let id = ListenerId::next();
        let mut state = self.state.lock();
        if state.closed.is_some() {
            trace!(%topic, "Listener registered on closed emitter");
            return id;
        }
        state.topics.entry(topic).or_default().push(Listener {
            id,
            once,
            callback,
        });
        id
    }

    /// Registers a hook that runs once when the emitter closes.
    ///
    /// Returns `None` when the emitter is already closed; the hook is not
    /// retained in that case.
    pub fn on_close<F>(&self, hook: F) -> Option<ListenerId>
    where
        F: Fn(&CloseReason) + Send + Sync + 'static,
    {
        let mut state = self.state.lock();
        if state.closed.is_some() {
            return None;
        }
        let id = ListenerId::next();
        state.close_hooks.push((id, Arc::new(hook)));
        Some(id)
    }

    /// Removes a listener or close hook.
    ///
    /// Returns `false` if it was not registered (already fired once-listener,
    /// already removed, or belonging to another emitter).
    pub fn off(&self, id: ListenerId) -> bool {
        let mut state = self.state.lock();

        let before = state.close_hooks.len();
        state.close_hooks.retain(|(hook_id, _)| *hook_id != id);
        if state.close_hooks.len() != before {
            return true;
        }

        let mut removed = false;
        state.topics.retain(|_, listeners| {
            let len = listeners.len();
            listeners.retain(|l| l.id != id);
            removed |= listeners.len() != len;
            !listeners.is_empty()
        });
        removed
    }

    /// Removes every listener on `topic`, returning how many were removed.
    pub fn remove_all_listeners(&self, topic: &str) -> usize {
        self.state
            .lock()
            .topics
            .remove(topic)
            .map_or(0, |listeners| listeners.len())
    }

    /// Returns the number of listeners on `topic`.
    #[must_use]
    pub fn listener_count(&self, topic: &str) -> usize {
        self.state.lock().topics.get(topic).map_or(0, Vec::len)
    }

    /// Returns the number of listeners on all topics plus close hooks.
    #[must_use]
    pub fn total_listener_count(&self) -> usize {
        let state = self.state.lock();
        state.topics.values().map(Vec::len).sum::<usize>() + state.close_hooks.len()
    }
}

// ============================================================================
// EventEmitter - Dispatch
// ============================================================================

impl<T> EventEmitter<T> {
    /// Invokes every listener on `topic` with `event`.
    ///
    /// Returns the number of listeners invoked. A panicking listener is logged
    /// and does not prevent the remaining listeners from running.
    pub fn emit(&self, topic: &str, event: &T) -> usize {
        let callbacks: Vec<Callback<T>> = {
            let mut state = self.state.lock();
            let Some(listeners) = state.topics.get_mut(topic) else {
                return 0;
            };
            let callbacks = listeners.iter().map(|l| Arc::clone(&l.callback)).collect();
            listeners.retain(|l| !l.once);
            if listeners.is_empty() {
                state.topics.remove(topic);
            }
            callbacks
        };

        for callback in &callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                warn!(topic, "Event listener panicked");
            }
        }

        callbacks.len()
    }

    /// Closes the emitter.
    ///
    /// Drops every topic listener and runs the close hooks. Only the first
    /// call has any effect; it returns `true`.
    pub fn close(&self, reason: CloseReason) -> bool {
        let hooks = {
            let mut state = self.state.lock();
            if state.closed.is_some() {
                return false;
            }
            state.closed = Some(reason.clone());
            state.topics.clear();
            std::mem::take(&mut state.close_hooks)
        };

        trace!(%reason, hooks = hooks.len(), "Emitter closed");

        for (_, hook) in hooks {
            if catch_unwind(AssertUnwindSafe(|| hook(&reason))).is_err() {
                warn!(%reason, "Close hook panicked");
            }
        }

        true
    }

    /// Returns why the emitter was closed, if it was.
    #[must_use]
    pub fn closed_reason(&self) -> Option<CloseReason> {
        self.state.lock().closed.clone()
    }

    /// Returns `true` once [`close`](Self::close) has run.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed.is_some()
    }
}

impl<T: Clone + Send + 'static> EventEmitter<T> {
    /// Subscribes to `topic` as an asynchronous stream.
    ///
    /// The stream ends when the emitter closes. Dropping the stream removes
    /// its listener.
    #[must_use]
    pub fn subscribe(&self, topic: impl Into<String>) -> EventStream<T> {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.on(topic, move |event: &T| {
            let _ = tx.send(event.clone());
        });
        let mut guard = ListenerGuard::new(self.clone());
        guard.push(id);
        EventStream { rx, _guard: guard }
    }
}

// ============================================================================
// ListenerGuard
// ============================================================================

/// Removes a set of listeners from an emitter when dropped.
///
/// Waits hold one of these so that every exit path, including the waiting
/// future being dropped, deregisters what it registered.
pub struct ListenerGuard<T> {
    emitter: EventEmitter<T>,
    ids: Vec<ListenerId>,
}

impl<T> ListenerGuard<T> {
    /// Creates an empty guard for `emitter`.
    #[must_use]
    pub fn new(emitter: EventEmitter<T>) -> Self {
        Self {
            emitter,
            ids: Vec::new(),
        }
    }

    /// Tracks another listener ID.
    pub fn push(&mut self, id: ListenerId) {
        self.ids.push(id);
    }
}

impl<T> Drop for ListenerGuard<T> {
    fn drop(&mut self) {
        for id in self.ids.drain(..) {
            self.emitter.off(id);
        }
    }
}

// ============================================================================
// EventStream
// ============================================================================

/// Stream of events from one topic.
pub struct EventStream<T> {
    rx: mpsc::UnboundedReceiver<T>,
    _guard: ListenerGuard<T>,
}

impl<T> EventStream<T> {
    /// Receives the next event, or `None` once the emitter closed.
    pub async fn next_event(&mut self) -> Option<T> {
        self.rx.recv().await
    }
}

impl<T> Stream for EventStream<T> {
    type Item = T;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<T>> {
        self.rx.poll_recv(cx)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&u32) + Send + Sync + 'static) {
        let count = Arc::new(AtomicUsize::new(0));
        let clone = Arc::clone(&count);
        (count, move |_: &u32| {
            clone.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_fan_out_to_all_listeners() {
        let emitter = EventEmitter::<u32>::new();
        let (a, cb_a) = counter();
        let (b, cb_b) = counter();
        emitter.on("tick", cb_a);
        emitter.on("tick", cb_b);

        assert_eq!(emitter.emit("tick", &1), 2);
        assert_eq!(emitter.emit("other", &1), 0);
        assert_eq!(a.load(Ordering::SeqCst), 1);
        assert_eq!(b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_once_fires_a_single_time() {
        let emitter = EventEmitter::<u32>::new();
        let (count, cb) = counter();
        let id = emitter.once("tick", cb);

        emitter.emit("tick", &1);
        emitter.emit("tick", &2);

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count("tick"), 0);
        assert!(!emitter.off(id));
    }

    #[test]
    fn test_off_removes_listener() {
        let emitter = EventEmitter::<u32>::new();
        let (count, cb) = counter();
        let id = emitter.on("tick", cb);

        assert!(emitter.off(id));
        assert!(!emitter.off(id));
        emitter.emit("tick", &1);
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_listener_may_remove_itself() {
        let emitter = EventEmitter::<u32>::new();
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let inner = emitter.clone();
        let inner_slot = Arc::clone(&slot);
        let id = emitter.on("tick", move |_| {
            if let Some(id) = *inner_slot.lock() {
                inner.off(id);
            }
        });
        *slot.lock() = Some(id);

        emitter.emit("tick", &1);
        assert_eq!(emitter.listener_count("tick"), 0);
    }

    #[test]
    fn test_panicking_listener_does_not_stop_fan_out() {
        let emitter = EventEmitter::<u32>::new();
        let (count, cb) = counter();
        emitter.on("tick", |_| panic!("boom"));
        emitter.on("tick", cb);

        emitter.emit("tick", &1);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_close_runs_hooks_once_and_drops_listeners() {
        let emitter = EventEmitter::<u32>::new();
        let (_, cb) = counter();
        emitter.on("tick", cb);

        let hooks = Arc::new(AtomicUsize::new(0));
        let hooks_clone = Arc::clone(&hooks);
        emitter
            .on_close(move |reason| {
                assert_eq!(*reason, CloseReason::ConnectionClosed);
                hooks_clone.fetch_add(1, Ordering::SeqCst);
            })
            .expect("open emitter");

        assert!(emitter.close(CloseReason::ConnectionClosed));
        assert!(!emitter.close(CloseReason::ConnectionClosed));
        assert_eq!(hooks.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.total_listener_count(), 0);
        assert!(emitter.on_close(|_| {}).is_none());
    }

    #[test]
    fn test_guard_removes_on_drop() {
        let emitter = EventEmitter::<u32>::new();
        {
            let mut guard = ListenerGuard::new(emitter.clone());
            guard.push(emitter.on("a", |_| {}));
            guard.push(emitter.on_close(|_| {}).expect("open"));
            assert_eq!(emitter.total_listener_count(), 2);
        }
        assert_eq!(emitter.total_listener_count(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_stream_ends_on_close() {
        let emitter = EventEmitter::<u32>::new();
        let mut stream = emitter.subscribe("tick");

        emitter.emit("tick", &7);
        assert_eq!(stream.next_event().await, Some(7));

        emitter.close(CloseReason::ConnectionClosed);
        assert_eq!(stream.next_event().await, None);
    }

    #[tokio::test]
    async fn test_dropping_stream_deregisters() {
        let emitter = EventEmitter::<u32>::new();
        let stream = emitter.subscribe("tick");
        assert_eq!(emitter.listener_count("tick"), 1);
        drop(stream);
        assert_eq!(emitter.listener_count("tick"), 0);
    }
}
