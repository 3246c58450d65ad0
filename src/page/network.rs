//! Request/response waits and network configuration.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use crate::error::{Error, Result};
use crate::events::wait_for_event;
use crate::network::{Credentials, InterceptDecision, NetworkEvent, Request, Response};
use crate::protocol::Headers;

use super::Page;

// ============================================================================
// UrlMatcher
// ============================================================================

/// URL condition for request and response waits.
///
/// # Example
///
/// ```ignore
/// page.wait_for_request("https://a.test/api", None).await?;
/// page.wait_for_request(UrlMatcher::glob("*/api/*")?, None).await?;
/// page.wait_for_response(UrlMatcher::predicate(|url| url.ends_with(".js")), None).await?;
/// ```
#[derive(Clone)]
pub enum UrlMatcher {
    /// Exact URL.
    Exact(String),
    /// Regular expression searched in the URL.
    Pattern(Regex),
    /// Arbitrary URL predicate.
    Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl UrlMatcher {
    /// Matches URLs against a glob where `*` stands for any run of characters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the pattern cannot be compiled.
    pub fn glob(pattern: &str) -> Result<Self> {
        let source = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        Regex::new(&format!("^{source}$"))
            .map(Self::Pattern)
            .map_err(|e| Error::invalid_argument(format!("invalid URL glob '{pattern}': {e}")))
    }

    /// Matches URLs accepted by `predicate`.
    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(predicate))
    }

    /// Returns `true` if `url` satisfies the matcher.
    #[must_use]
    pub fn matches(&self, url: &str) -> bool {
        match self {
            Self::Exact(expected) => expected == url,
            Self::Pattern(regex) => regex.is_match(url),
            Self::Predicate(predicate) => predicate(url),
        }
    }
}

impl fmt::Debug for UrlMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(url) => f.debug_tuple("Exact").field(url).finish(),
            Self::Pattern(regex) => f.debug_tuple("Pattern").field(&regex.as_str()).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl From<&str> for UrlMatcher {
    fn from(url: &str) -> Self {
        Self::Exact(url.to_string())
    }
}

impl From<String> for UrlMatcher {
    fn from(url: String) -> Self {
        Self::Exact(url)
    }
}

impl From<Regex> for UrlMatcher {
    fn from(regex: Regex) -> Self {
        Self::Pattern(regex)
    }
}

// ============================================================================
// Page - Waits
// ============================================================================

impl Page {
    /// Waits for a request whose URL matches.
    ///
    /// `None` uses the page's default wait timeout; zero waits indefinitely.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`], or a closed error if the session went away.
    pub async fn wait_for_request(
        &self,
        matcher: impl Into<UrlMatcher>,
        timeout: Option<Duration>,
    ) -> Result<Request> {
        let matcher = matcher.into();
        debug!(?matcher, "Waiting for request");
        self.wait_for_request_where(move |request| matcher.matches(request.url()), timeout)
            .await
    }

    /// Waits for a request accepted by `predicate`.
    ///
    /// # Errors
    ///
    /// Same as [`wait_for_request`](Self::wait_for_request), plus
    /// [`Error::PredicatePanicked`].
    pub async fn wait_for_request_where<P>(
        &self,
        predicate: P,
        timeout: Option<Duration>,
    ) -> Result<Request>
    where
        P: Fn(&Request) -> bool + Send + Sync + 'static,
    {
        wait_for_event(
            self.inner.network.emitter(),
            NetworkEvent::Request.as_str(),
            predicate,
            timeout.unwrap_or(self.inner.wait_timeout),
        )
        .await
    }

    /// Waits for a response whose URL matches.
    ///
    /// # Errors
    ///
    /// Same as [`wait_for_request`](Self::wait_for_request).
    pub async fn wait_for_response(
        &self,
        matcher: impl Into<UrlMatcher>,
        timeout: Option<Duration>,
    ) -> Result<Response> {
        let matcher = matcher.into();
        debug!(?matcher, "Waiting for response");
        self.wait_for_response_where(move |response| matcher.matches(response.url()), timeout)
            .await
    }

    /// Waits for a response accepted by `predicate`.
    ///
    /// # Errors
    ///
    /// Same as [`wait_for_request_where`](Self::wait_for_request_where).
    pub async fn wait_for_response_where<P>(
        &self,
        predicate: P,
        timeout: Option<Duration>,
    ) -> Result<Response>
    where
        P: Fn(&Response) -> bool + Send + Sync + 'static,
    {
        let request = wait_for_event(
            self.inner.network.emitter(),
            NetworkEvent::Response.as_str(),
            move |request: &Request| request.response().is_some_and(|r| predicate(&r)),
            timeout.unwrap_or(self.inner.wait_timeout),
        )
        .await?;
        request
            .response()
            .ok_or_else(|| Error::invalid_argument("response event without a response"))
    }
}

// ============================================================================
// Page - Network Configuration
// ============================================================================

impl Page {
    /// Sets headers sent with every request.
    ///
    /// # Errors
    ///
    /// Returns the command error.
    pub async fn set_extra_http_headers(&self, headers: Headers) -> Result<()> {
        self.inner.network.set_extra_http_headers(headers).await
    }

    /// Toggles offline emulation.
    ///
    /// # Errors
    ///
    /// Returns the command error.
    pub async fn set_offline_mode(&self, offline: bool) -> Result<()> {
        self.inner.network.set_offline_mode(offline).await
    }

    /// Overrides the user agent.
    ///
    /// # Errors
    ///
    /// Returns the command error.
    pub async fn set_user_agent(&self, user_agent: impl Into<String>) -> Result<()> {
        self.inner.network.set_user_agent(user_agent).await
    }

    /// Enables or disables the browser cache.
    ///
    /// # Errors
    ///
    /// Returns the command error.
    pub async fn set_cache_enabled(&self, enabled: bool) -> Result<()> {
        self.inner.network.set_cache_enabled(enabled).await
    }

    /// Sets or clears HTTP authentication credentials.
    ///
    /// # Errors
    ///
    /// Returns the command error.
    pub async fn authenticate(&self, credentials: Option<Credentials>) -> Result<()> {
        self.inner.network.authenticate(credentials).await
    }

    /// Intercepts every request with `handler`.
    ///
    /// # Example
    ///
    /// ```ignore
    /// page.intercept_requests(|request| {
    ///     if request.url().contains("ads") {
    ///         InterceptDecision::abort(ErrorReason::BlockedByClient)
    ///     } else {
    ///         InterceptDecision::proceed()
    ///     }
    /// })
    /// .await?;
    /// ```
    ///
    /// # Errors
    ///
    /// Returns the command error.
    pub async fn intercept_requests<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(&Request) -> InterceptDecision + Send + Sync + 'static,
    {
        self.inner.network.set_request_handler(handler);
        self.inner.network.set_request_interception(true).await
    }

    /// Stops intercepting requests.
    ///
    /// # Errors
    ///
    /// Returns the command error.
    pub async fn stop_intercepting(&self) -> Result<()> {
        self.inner.network.clear_request_handler();
        self.inner.network.set_request_interception(false).await
    }
}

// ============================================================================
// Tests
// ============================================================================
