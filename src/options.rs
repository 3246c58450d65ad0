//! Connection configuration.
//!
//! Provides a fluent API for configuring a [`Connection`](crate::Connection).
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use cdp_session::{ConnectOptions, Connection};
//!
//! # async fn example() -> cdp_session::Result<()> {
//! let options = ConnectOptions::builder()
//!     .command_timeout(Duration::from_secs(10))
//!     .slow_mo(Duration::from_millis(50))
//!     .build()?;
//!
//! let connection = Connection::connect("ws://127.0.0.1:9222/devtools/browser/abc", options).await?;
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use tokio::runtime::Handle;
use url::Url;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default budget for command replies, navigations and event waits.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default cap on commands awaiting a reply.
pub const DEFAULT_MAX_PENDING: usize = 1024;

// ============================================================================
// ConnectOptions
// ============================================================================

/// Validated connection configuration.
///
/// A zero timeout disables that budget.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    command_timeout: Duration,
    navigation_timeout: Duration,
    wait_timeout: Duration,
    slow_mo: Duration,
    ignore_https_errors: bool,
    max_pending: usize,
    runtime: Option<Handle>,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            command_timeout: DEFAULT_TIMEOUT,
            navigation_timeout: DEFAULT_TIMEOUT,
            wait_timeout: DEFAULT_TIMEOUT,
            slow_mo: Duration::ZERO,
            ignore_https_errors: false,
            max_pending: DEFAULT_MAX_PENDING,
            runtime: None,
        }
    }
}

impl ConnectOptions {
    /// Creates a builder with default values.
    #[inline]
    #[must_use]
    pub fn builder() -> ConnectOptionsBuilder {
        ConnectOptionsBuilder::new()
    }

    /// Budget for a command reply.
    #[inline]
    #[must_use]
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Budget for a navigation wait.
    #[inline]
    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        self.navigation_timeout
    }

    /// Budget for an event wait.
    #[inline]
    #[must_use]
    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Delay applied before every outgoing command.
    #[inline]
    #[must_use]
    pub fn slow_mo(&self) -> Duration {
        self.slow_mo
    }

    /// Whether pages ignore certificate errors.
    #[inline]
    #[must_use]
    pub fn ignore_https_errors(&self) -> bool {
        self.ignore_https_errors
    }

    /// Cap on commands awaiting a reply.
    #[inline]
    #[must_use]
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    /// Runtime the reader task is spawned on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when no runtime was configured and the
    /// caller is not inside one.
    pub fn runtime(&self) -> Result<Handle> {
        match &self.runtime {
            Some(handle) => Ok(handle.clone()),
            None => Handle::try_current()
                .map_err(|e| Error::config(format!("no tokio runtime available: {e}"))),
        }
    }
}

// ============================================================================
// ConnectOptionsBuilder
// ============================================================================

/// Builder for [`ConnectOptions`].
#[derive(Debug, Default, Clone)]
pub struct ConnectOptionsBuilder {
    options: ConnectOptions,
}

impl ConnectOptionsBuilder {
    /// Creates a builder with default values.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the command reply budget.
    #[inline]
    #[must_use]
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.options.command_timeout = timeout;
        self
    }

    /// Sets the navigation wait budget.
    #[inline]
    #[must_use]
    pub fn navigation_timeout(mut self, timeout: Duration) -> Self {
        self.options.navigation_timeout = timeout;
        self
    }

    /// Sets the event wait budget.
    #[inline]
    #[must_use]
    pub fn wait_timeout(mut self, timeout: Duration) -> Self {
        self.options.wait_timeout = timeout;
        self
    }

    /// Delays every outgoing command, for watching automation run.
    #[inline]
    #[must_use]
    pub fn slow_mo(mut self, delay: Duration) -> Self {
        self.options.slow_mo = delay;
        self
    }

    /// Makes attached pages ignore certificate errors.
    #[inline]
    #[must_use]
    pub fn ignore_https_errors(mut self, ignore: bool) -> Self {
        self.options.ignore_https_errors = ignore;
        self
    }

    /// Sets the cap on commands awaiting a reply.
    #[inline]
    #[must_use]
    pub fn max_pending(mut self, max: usize) -> Self {
        self.options.max_pending = max;
        self
    }

    /// Spawns the reader task on `handle` instead of the current runtime.
    #[inline]
    #[must_use]
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.options.runtime = Some(handle);
        self
    }

    /// Validates and returns the options.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `max_pending` is zero.
    pub fn build(self) -> Result<ConnectOptions> {
        if self.options.max_pending == 0 {
            return Err(Error::config(
                "max_pending must be at least 1.\n\
                 Example: ConnectOptions::builder().max_pending(256)",
            ));
        }
        Ok(self.options)
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Validates a DevTools WebSocket endpoint.
///
/// # Errors
///
/// Returns [`Error::Config`] if the URL does not parse or is not `ws`/`wss`.
pub fn validate_ws_url(endpoint: &str) -> Result<Url> {
    let url = Url::parse(endpoint)
        .map_err(|e| Error::config(format!("Invalid WebSocket URL '{endpoint}': {e}")))?;

    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => Err(Error::config(format!(
            "Unsupported scheme '{other}' in '{endpoint}'.\n\
             Expected a DevTools endpoint such as ws://127.0.0.1:9222/devtools/browser/<id>"
        ))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ConnectOptions::default();
        assert_eq!(options.command_timeout(), DEFAULT_TIMEOUT);
        assert_eq!(options.navigation_timeout(), DEFAULT_TIMEOUT);
        assert_eq!(options.wait_timeout(), DEFAULT_TIMEOUT);
        assert_eq!(options.slow_mo(), Duration::ZERO);
        assert_eq!(options.max_pending(), DEFAULT_MAX_PENDING);
        assert!(!options.ignore_https_errors());
    }

    #[test]
    fn test_builder_sets_values() {
        let options = ConnectOptions::builder()
            .command_timeout(Duration::from_secs(5))
            .navigation_timeout(Duration::ZERO)
            .slow_mo(Duration::from_millis(20))
            .ignore_https_errors(true)
            .max_pending(8)
            .build()
            .expect("valid");

        assert_eq!(options.command_timeout(), Duration::from_secs(5));
        assert!(options.navigation_timeout().is_zero());
        assert_eq!(options.slow_mo(), Duration::from_millis(20));
        assert!(options.ignore_https_errors());
        assert_eq!(options.max_pending(), 8);
    }

    #[test]
    fn test_zero_max_pending_rejected() {
        let err = ConnectOptions::builder().max_pending(0).build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_runtime_outside_tokio_is_config_error() {
        let err = ConnectOptions::default().runtime().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[tokio::test]
    async fn test_runtime_inside_tokio() {
        assert!(ConnectOptions::default().runtime().is_ok());
    }

    #[test]
    fn test_validate_ws_url() {
        assert!(validate_ws_url("ws://127.0.0.1:9222/devtools/browser/x").is_ok());
        assert!(validate_ws_url("http://127.0.0.1:9222").is_err());
        assert!(validate_ws_url("not a url").is_err());
    }
}
