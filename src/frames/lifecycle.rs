//! Navigation lifecycle waits.
//!
//! A [`LifecycleWatcher`] resolves once a frame has reached every requested
//! [`WaitUntil`] condition for the expected document:
//!
//! ```text
//!              ┌──────── generation advanced again ───────► Superseded
//!  watching ───┼──────── frame removed ─────────────────────► FrameDetached
//!              ├──────── all conditions hold ──────────────► Satisfied
//!              └──────── crash / close / deadline ─────────► Err(..)
//! ```
//!
//! Lifecycle events only count for the frame's current generation, and the
//! network-idle conditions must hold for a full quiet window.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};

use crate::error::{Error, Result};
use crate::events::{CloseReason, ListenerGuard};
use crate::identifiers::FrameId;
use crate::network::{NetworkEvent, Request, Response};

use super::idle::IdleTracker;
use super::manager::{FrameEvent, FrameManager, topics};

// ============================================================================
// WaitUntil
// ============================================================================

/// A condition a navigation wait requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitUntil {
    /// The `load` event fired.
    Load,
    /// The `DOMContentLoaded` event fired.
    DomContentLoaded,
    /// No request in flight for the quiet window.
    NetworkIdle0,
    /// At most two requests in flight for the quiet window.
    NetworkIdle2,
}

impl WaitUntil {
    /// Option spelling (`load`, `domcontentloaded`, `networkidle0`, `networkidle2`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::DomContentLoaded => "domcontentloaded",
            Self::NetworkIdle0 => "networkidle0",
            Self::NetworkIdle2 => "networkidle2",
        }
    }

    /// Protocol lifecycle event name, for the document conditions.
    #[must_use]
    pub const fn lifecycle_event(self) -> Option<&'static str> {
        match self {
            Self::Load => Some("load"),
            Self::DomContentLoaded => Some("DOMContentLoaded"),
            Self::NetworkIdle0 | Self::NetworkIdle2 => None,
        }
    }
}

impl fmt::Display for WaitUntil {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WaitUntil {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "load" => Ok(Self::Load),
            "domcontentloaded" => Ok(Self::DomContentLoaded),
            "networkidle0" => Ok(Self::NetworkIdle0),
            "networkidle2" => Ok(Self::NetworkIdle2),
            other => Err(Error::invalid_argument(format!(
                "unknown wait condition '{other}'"
            ))),
        }
    }
}

// ============================================================================
// WaitMode / NavigationOutcome
// ============================================================================

/// Which document the watcher waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitMode {
    /// The next navigation of the frame, new-document or same-document.
    NextNavigation,
    /// The frame's current document.
    CurrentDocument,
}

/// Terminal state of a navigation wait.
#[derive(Debug, Clone, PartialEq)]
pub enum NavigationOutcome {
    /// Every condition held.
    Satisfied {
        /// Response to the navigation request, when one was observed.
        response: Option<Response>,
    },
    /// A newer navigation started before the conditions held.
    Superseded,
    /// The frame was removed before the conditions held.
    FrameDetached,
}

impl NavigationOutcome {
    /// Returns `true` for [`Satisfied`](Self::Satisfied).
    #[inline]
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        matches!(self, Self::Satisfied { .. })
    }

    /// Navigation response of a satisfied wait.
    #[must_use]
    pub fn response(&self) -> Option<&Response> {
        match self {
            Self::Satisfied { response } => response.as_ref(),
            Self::Superseded | Self::FrameDetached => None,
        }
    }

    /// Consumes the outcome, returning the navigation response.
    #[must_use]
    pub fn into_response(self) -> Option<Response> {
        match self {
            Self::Satisfied { response } => response,
            Self::Superseded | Self::FrameDetached => None,
        }
    }
}

// ============================================================================
// LifecycleWatcher
// ============================================================================

enum Wake {
    Tree,
    RequestStarted,
    RequestDone,
    Crashed,
    Closed(CloseReason),
}

/// A pending navigation wait. Dropping it removes its listeners.
pub struct LifecycleWatcher {
    frames: FrameManager,
    frame_id: FrameId,
    mode: WaitMode,
    new_document_only: bool,
    baseline_generation: u64,
    baseline_same_document: u64,
    lifecycle: Vec<&'static str>,
    idle: Vec<IdleTracker>,
    timeout: Duration,
    deadline: Option<Instant>,
    wake_rx: mpsc::UnboundedReceiver<Wake>,
    navigation_request: Arc<Mutex<Option<Request>>>,
    _frame_listeners: ListenerGuard<FrameEvent>,
    _network_listeners: ListenerGuard<Request>,
}

impl fmt::Debug for LifecycleWatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleWatcher")
            .field("frame_id", &self.frame_id)
            .field("mode", &self.mode)
            .field("lifecycle", &self.lifecycle)
            .field("idle", &self.idle)
            .field("deadline", &self.deadline)
            .finish_non_exhaustive()
    }
}

impl LifecycleWatcher {
    pub(crate) fn new(
        frames: FrameManager,
        frame_id: &FrameId,
        mode: WaitMode,
        wait_until: &[WaitUntil],
        timeout: Duration,
    ) -> Result<Self> {
        let (tx, wake_rx) = mpsc::unbounded_channel();

        let mut frame_listeners = ListenerGuard::new(frames.emitter().clone());
        for topic in topics::TREE_CHANGES {
            let tx = tx.clone();
            frame_listeners.push(frames.on(topic, move |_| {
                let _ = tx.send(Wake::Tree);
            }));
        }
        {
            let tx = tx.clone();
            frame_listeners.push(frames.on(topics::TARGET_CRASHED, move |_| {
                let _ = tx.send(Wake::Crashed);
            }));
        }
        {
            let tx = tx.clone();
            if let Some(id) = frames.emitter().on_close(move |reason| {
                let _ = tx.send(Wake::Closed(reason.clone()));
            }) {
                frame_listeners.push(id);
            }
        }

        let frame = frames
            .frame(frame_id)
            .ok_or_else(|| Error::frame_not_found(frame_id.clone()))?;

        let network = frames.network().clone();
        let navigation_request = Arc::new(Mutex::new(None));
        let mut network_listeners = ListenerGuard::new(network.emitter().clone());
        {
            let tx = tx.clone();
            let slot = Arc::clone(&navigation_request);
            let target = frame.id().clone();
            network_listeners.push(network.on(NetworkEvent::Request, move |request: &Request| {
                if request.is_navigation_request() && request.frame_id() == Some(&target) {
                    *slot.lock() = Some(request.clone());
                }
                let _ = tx.send(Wake::RequestStarted);
            }));
        }
        for event in [NetworkEvent::RequestFinished, NetworkEvent::RequestFailed] {
            let tx = tx.clone();
            network_listeners.push(network.on(event, move |_| {
                let _ = tx.send(Wake::RequestDone);
            }));
        }

        let wait_until = if wait_until.is_empty() {
            &[WaitUntil::Load][..]
        } else {
            wait_until
        };
        let mut lifecycle: Vec<&'static str> =
            wait_until.iter().filter_map(|w| w.lifecycle_event()).collect();
        lifecycle.dedup();

        let now = Instant::now();
        let in_flight = network.in_flight_count();
        let mut idle = Vec::new();
        if wait_until.contains(&WaitUntil::NetworkIdle0) {
            idle.push(IdleTracker::idle());
        }
        if wait_until.contains(&WaitUntil::NetworkIdle2) {
            idle.push(IdleTracker::almost_idle());
        }
        for tracker in &mut idle {
            tracker.observe(in_flight, now);
        }

        trace!(frame_id = %frame.id(), ?mode, ?wait_until, "Watching frame lifecycle");

        Ok(Self {
            frame_id: frame.id().clone(),
            mode,
            new_document_only: false,
            baseline_generation: frame.generation(),
            baseline_same_document: frame.same_document_navigations(),
            lifecycle,
            idle,
            timeout,
            deadline: (!timeout.is_zero()).then(|| now + timeout),
            wake_rx,
            navigation_request,
            _frame_listeners: frame_listeners,
            _network_listeners: network_listeners,
            frames,
        })
    }

    /// Frame being watched.
    #[inline]
    #[must_use]
    pub fn frame_id(&self) -> &FrameId {
        &self.frame_id
    }

    /// Budget the wait was created with; zero when unbounded.
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Instant after which the wait fails; `None` when unbounded.
    #[inline]
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Ignores same-document navigations; only a committed new document
    /// satisfies a [`WaitMode::NextNavigation`] wait.
    pub fn expect_new_document(&mut self) {
        self.new_document_only = true;
    }

    /// Waits for the outcome.
    ///
    /// # Errors
    ///
    /// - [`Error::TargetCrashed`] if the target crashed
    /// - [`Error::Timeout`] if the deadline passed
    /// - [`Error::SessionDetached`] / [`Error::ConnectionClosed`] if the
    ///   session closed; a close wins over a simultaneous deadline
    pub async fn wait(mut self) -> Result<NavigationOutcome> {
        loop {
            if let Some(reason) = self.frames.emitter().closed_reason() {
                return Err(reason.to_error());
            }

            let now = Instant::now();
            if let Some(outcome) = self.check(now) {
                debug!(frame_id = %self.frame_id, ?outcome, "Navigation wait resolved");
                return Ok(outcome);
            }

            let idle_at = self
                .idle
                .iter()
                .filter(|tracker| !tracker.is_idle(now))
                .filter_map(IdleTracker::deadline)
                .min();
            let deadline = self.deadline;

            tokio::select! {
                wake = self.wake_rx.recv() => match wake {
                    Some(Wake::Tree) => {}
                    Some(Wake::RequestStarted) => self.observe_network(true),
                    Some(Wake::RequestDone) => self.observe_network(false),
                    Some(Wake::Crashed) => return Err(Error::TargetCrashed),
                    Some(Wake::Closed(reason)) => return Err(reason.to_error()),
                    None => return Err(Error::ConnectionClosed),
                },
                () = sleep_until(idle_at.unwrap_or(now)), if idle_at.is_some() => {}
                () = sleep_until(deadline.unwrap_or(now)), if deadline.is_some() => {
                    if let Some(reason) = self.frames.emitter().closed_reason() {
                        return Err(reason.to_error());
                    }
                    let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                    return Err(Error::timeout(
                        format!("navigation of frame {}", self.frame_id),
                        timeout_ms,
                    ));
                }
            }
        }
    }

    fn observe_network(&mut self, started: bool) {
        let in_flight = self.frames.network().in_flight_count();
        let now = Instant::now();
        for tracker in &mut self.idle {
            if started {
                tracker.request_started(in_flight, now);
            } else {
                tracker.observe(in_flight, now);
            }
        }
    }

    fn check(&self, now: Instant) -> Option<NavigationOutcome> {
        let Some(frame) = self.frames.frame(&self.frame_id) else {
            return Some(NavigationOutcome::FrameDetached);
        };

        match self.mode {
            WaitMode::NextNavigation => {
                let committed = self.baseline_generation + 1;
                if frame.generation() > committed {
                    return Some(NavigationOutcome::Superseded);
                }
                let same_document = !self.new_document_only
                    && frame.same_document_navigations() > self.baseline_same_document;
                if frame.generation() != committed && !same_document {
                    return None;
                }
            }
            WaitMode::CurrentDocument => {
                if frame.generation() != self.baseline_generation {
                    return Some(NavigationOutcome::Superseded);
                }
            }
        }

        if !self.frames.lifecycle_complete(frame.id(), &self.lifecycle) {
            return None;
        }
        if !self.idle.iter().all(|tracker| tracker.is_idle(now)) {
            return None;
        }

        let response = self
            .navigation_request
            .lock()
            .as_ref()
            .and_then(Request::response);
        Some(NavigationOutcome::Satisfied { response })
    }
}

// ============================================================================
// Tests
// ============================================================================
