//! Network quiescence tracking.
//!
//! An [`IdleTracker`] watches the in-flight request count and reports idle
//! once the count has stayed at or below its threshold for the whole quiet
//! window. A request starting inside the window restarts it.

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::time::Instant;

// ============================================================================
// Constants
// ============================================================================

/// How long the count must stay low before the network counts as idle.
pub const QUIET_WINDOW: Duration = Duration::from_millis(500);

/// In-flight threshold for `networkidle2`.
pub const ALMOST_IDLE_THRESHOLD: usize = 2;

// ============================================================================
// IdleTracker
// ============================================================================

/// Quiet-window state for one in-flight threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdleTracker {
    threshold: usize,
    window: Duration,
    quiet_since: Option<Instant>,
}

impl IdleTracker {
    /// Tracker for `networkidle0`: no request in flight.
    #[must_use]
    pub fn idle() -> Self {
        Self::with_threshold(0)
    }

    /// Tracker for `networkidle2`: at most two requests in flight.
    #[must_use]
    pub fn almost_idle() -> Self {
        Self::with_threshold(ALMOST_IDLE_THRESHOLD)
    }

    fn with_threshold(threshold: usize) -> Self {
        Self {
            threshold,
            window: QUIET_WINDOW,
            quiet_since: None,
        }
    }

    /// In-flight threshold.
    #[inline]
    #[must_use]
    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Records the count after a request finished or failed, or a plain
    /// sample. Starts the window when the count drops to the threshold.
    pub fn observe(&mut self, in_flight: usize, now: Instant) {
        if in_flight > self.threshold {
            self.quiet_since = None;
        } else if self.quiet_since.is_none() {
            self.quiet_since = Some(now);
        }
    }

    /// Records the count after a request started. Restarts the window.
    pub fn request_started(&mut self, in_flight: usize, now: Instant) {
        self.quiet_since = (in_flight <= self.threshold).then_some(now);
    }

    /// Returns `true` once the count stayed low for the full window.
    #[must_use]
    pub fn is_idle(&self, now: Instant) -> bool {
        self.quiet_since
            .is_some_and(|since| now.saturating_duration_since(since) >= self.window)
    }

    /// Instant at which the tracker turns idle if nothing changes.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.quiet_since.map(|since| since + self.window)
    }
}

// ============================================================================
// Tests
// ============================================================================
