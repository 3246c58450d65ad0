//! Waiting for a single matching event.
//!
//! [`wait_for_event`] turns a listener registration into a future with three
//! resolution sources: a matching event, the emitter closing, or the timeout
//! elapsing. Exactly one source wins. Both listeners it registers are removed
//! before it returns, and also if the future is dropped mid-wait.

// ============================================================================
// Imports
// ============================================================================

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{Error, Result};

use super::emitter::{EventEmitter, ListenerGuard};

// ============================================================================
// Types
// ============================================================================

/// Single-use resolution slot shared by the event listener and close hook.
type Slot<T> = Arc<Mutex<Option<oneshot::Sender<Result<T>>>>>;

/// Resolves the slot if nobody has yet.
fn resolve<T>(slot: &Slot<T>, outcome: Result<T>) -> bool {
    match slot.lock().take() {
        Some(tx) => {
            let _ = tx.send(outcome);
            true
        }
        None => false,
    }
}

// ============================================================================
// wait_for_event
// ============================================================================

/// Waits for the first event on `topic` satisfying `predicate`.
///
/// A zero `timeout` waits indefinitely.
///
/// # Errors
///
/// - [`Error::Timeout`] if nothing matched within `timeout`
/// - [`Error::ConnectionClosed`] / [`Error::SessionDetached`] if the emitter
///   closed first, or is found closed when the timeout fires
/// - [`Error::PredicatePanicked`] if `predicate` panicked
pub async fn wait_for_event<T, P>(
    emitter: &EventEmitter<T>,
    topic: &str,
    predicate: P,
    timeout: Duration,
) -> Result<T>
where
    T: Clone + Send + 'static,
    P: Fn(&T) -> bool + Send + Sync + 'static,
{
    let (tx, mut rx) = oneshot::channel::<Result<T>>();
    let slot: Slot<T> = Arc::new(Mutex::new(Some(tx)));
    let mut guard = ListenerGuard::new(emitter.clone());

    let event_slot = Arc::clone(&slot);
    let event_topic = topic.to_string();
    guard.push(emitter.on(topic, move |event: &T| {
        if event_slot.lock().is_none() {
            return;
        }
        let outcome = match catch_unwind(AssertUnwindSafe(|| predicate(event))) {
            Ok(true) => Ok(event.clone()),
            Ok(false) => return,
            Err(_) => {
                warn!(topic = %event_topic, "Wait predicate panicked");
                Err(Error::PredicatePanicked {
                    topic: event_topic.clone(),
                })
            }
        };
        resolve(&event_slot, outcome);
    }));

    let close_slot = Arc::clone(&slot);
    let hook = emitter.on_close(move |reason| {
        resolve(&close_slot, Err(reason.to_error()));
    });
    match hook {
        Some(id) => guard.push(id),
        None => {
            drop(guard);
            return Err(closed_error(emitter));
        }
    }

    let outcome = if timeout.is_zero() {
        (&mut rx).await
    } else {
        tokio::select! {
            biased;
            outcome = &mut rx => outcome,
            () = tokio::time::sleep(timeout) => {
                if resolve(&slot, Err(timeout_error(emitter, topic, timeout))) {
                    debug!(topic, timeout_ms = timeout.as_millis() as u64, "Wait timed out");
                }
                rx.await
            }
        }
    };

    drop(guard);
    outcome.unwrap_or_else(|_| Err(closed_error(emitter)))
}

/// Error for a wait that ran out of time, preferring closed over timeout.
fn timeout_error<T>(emitter: &EventEmitter<T>, topic: &str, timeout: Duration) -> Error {
    match emitter.closed_reason() {
        Some(reason) => reason.to_error(),
        None => Error::timeout(format!("waiting for '{topic}'"), timeout.as_millis() as u64),
    }
}

fn closed_error<T>(emitter: &EventEmitter<T>) -> Error {
    emitter
        .closed_reason()
        .map_or(Error::ConnectionClosed, |reason| reason.to_error())
}

// ============================================================================
// Tests
// ============================================================================
