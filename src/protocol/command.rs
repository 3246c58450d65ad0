//! Typed command definitions organized by domain.
//!
//! Each domain enum serializes to `{"method": "...", "params": {...}}`, which
//! [`Command::into_parts`] splits into the two halves of the wire envelope.
//! Commands not listed here can always be sent as raw `(method, params)`.
//!
//! # Domains
//!
//! | Domain | Commands |
//! |--------|----------|
//! | `Target` | attach, detach, close, auto-attach |
//! | `Page` | enable, frame tree, lifecycle events, navigation, history, isolated worlds, screenshots |
//! | `Runtime` | enable, evaluate |
//! | `Network` | enable, extra headers, conditions, user agent, cache |
//! | `Fetch` | interception and auth decisions |
//! | `Security` | certificate errors |

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::identifiers::{ExecutionContextId, FrameId, InterceptionId, SessionId, TargetId};

// ============================================================================
// Command Wrapper
// ============================================================================

/// All typed commands.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Command {
    /// Target domain.
    Target(TargetCommand),
    /// Page domain.
    Page(PageCommand),
    /// Runtime domain.
    Runtime(RuntimeCommand),
    /// Network domain.
    Network(NetworkCommand),
    /// Fetch domain.
    Fetch(FetchCommand),
    /// Security domain.
    Security(SecurityCommand),
}

impl Command {
    /// Splits the command into method name and params object.
    ///
    /// Commands without parameters yield an empty object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails, or
    /// [`Error::InvalidArgument`] if the command lacks a method tag.
    pub fn into_parts(self) -> Result<(String, Value)> {
        let mut value = serde_json::to_value(&self)?;
        let method = value
            .get("method")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| Error::invalid_argument("command has no method"))?;
        let params = value
            .get_mut("params")
            .map(Value::take)
            .unwrap_or_else(|| Value::Object(Default::default()));
        Ok((method, params))
    }
}

macro_rules! impl_from_domain {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        $(
            impl From<$ty> for Command {
                #[inline]
                fn from(cmd: $ty) -> Self {
                    Self::$variant(cmd)
                }
            }
        )*
    };
}

impl_from_domain! {
    Target(TargetCommand),
    Page(PageCommand),
    Runtime(RuntimeCommand),
    Network(NetworkCommand),
    Fetch(FetchCommand),
    Security(SecurityCommand),
}

// ============================================================================
// Target Commands
// ============================================================================

/// Target domain commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum TargetCommand {
    /// Attach to a target, creating a session.
    #[serde(rename = "Target.attachToTarget")]
    AttachToTarget {
        /// Target to attach to.
        #[serde(rename = "targetId")]
        target_id: TargetId,
        /// Multiplex the session over this connection.
        flatten: bool,
    },

    /// Detach a session.
    #[serde(rename = "Target.detachFromTarget")]
    DetachFromTarget {
        /// Session to detach.
        #[serde(rename = "sessionId")]
        session_id: SessionId,
    },

    /// Close a target.
    #[serde(rename = "Target.closeTarget")]
    CloseTarget {
        /// Target to close.
        #[serde(rename = "targetId")]
        target_id: TargetId,
    },

    /// Attach to related targets automatically.
    #[serde(rename = "Target.setAutoAttach")]
    SetAutoAttach {
        /// Enable auto-attach.
        #[serde(rename = "autoAttach")]
        auto_attach: bool,
        /// Pause new targets until resumed.
        #[serde(rename = "waitForDebuggerOnStart")]
        wait_for_debugger_on_start: bool,
        /// Multiplex sessions over this connection.
        flatten: bool,
    },
}

// ============================================================================
// Page Commands
// ============================================================================

/// Page domain commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum PageCommand {
    /// Enable page events.
    #[serde(rename = "Page.enable")]
    Enable,

    /// Fetch the current frame tree.
    #[serde(rename = "Page.getFrameTree")]
    GetFrameTree,

    /// Toggle `Page.lifecycleEvent` reporting.
    #[serde(rename = "Page.setLifecycleEventsEnabled")]
    SetLifecycleEventsEnabled {
        /// Enable reporting.
        enabled: bool,
    },

    /// Navigate a frame.
    #[serde(rename = "Page.navigate")]
    Navigate {
        /// Destination URL.
        url: String,
        /// Referrer.
        #[serde(skip_serializing_if = "Option::is_none")]
        referrer: Option<String>,
        /// Frame to navigate; main frame when absent.
        #[serde(rename = "frameId", skip_serializing_if = "Option::is_none")]
        frame_id: Option<FrameId>,
    },

    /// Reload the page.
    #[serde(rename = "Page.reload")]
    Reload {
        /// Bypass the cache.
        #[serde(rename = "ignoreCache")]
        ignore_cache: bool,
    },

    /// Fetch session history.
    #[serde(rename = "Page.getNavigationHistory")]
    GetNavigationHistory,

    /// Navigate to a history entry.
    #[serde(rename = "Page.navigateToHistoryEntry")]
    NavigateToHistoryEntry {
        /// Entry ID from the history.
        #[serde(rename = "entryId")]
        entry_id: i64,
    },

    /// Create an isolated world in a frame.
    #[serde(rename = "Page.createIsolatedWorld")]
    CreateIsolatedWorld {
        /// Frame.
        #[serde(rename = "frameId")]
        frame_id: FrameId,
        /// World name.
        #[serde(rename = "worldName")]
        world_name: String,
        /// Grant universal access.
        #[serde(rename = "grantUniveralAccess")]
        grant_universal_access: bool,
    },

    /// Register a script for every new document, in a named world.
    #[serde(rename = "Page.addScriptToEvaluateOnNewDocument")]
    AddScriptToEvaluateOnNewDocument {
        /// Script source.
        source: String,
        /// World name.
        #[serde(rename = "worldName", skip_serializing_if = "Option::is_none")]
        world_name: Option<String>,
    },

    /// Capture a screenshot.
    #[serde(rename = "Page.captureScreenshot")]
    CaptureScreenshot {
        /// `png`, `jpeg` or `webp`.
        format: String,
        /// Compression quality for lossy formats.
        #[serde(skip_serializing_if = "Option::is_none")]
        quality: Option<u8>,
        /// Capture from the surface rather than the view.
        #[serde(rename = "fromSurface")]
        from_surface: bool,
    },
}

// ============================================================================
// Runtime Commands
// ============================================================================

/// Runtime domain commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum RuntimeCommand {
    /// Enable execution context events.
    #[serde(rename = "Runtime.enable")]
    Enable,

    /// Evaluate an expression.
    #[serde(rename = "Runtime.evaluate")]
    Evaluate {
        /// Expression.
        expression: String,
        /// Context; default context of the inspected page when absent.
        #[serde(rename = "contextId", skip_serializing_if = "Option::is_none")]
        context_id: Option<ExecutionContextId>,
        /// Return the result by value.
        #[serde(rename = "returnByValue")]
        return_by_value: bool,
        /// Await a returned promise.
        #[serde(rename = "awaitPromise")]
        await_promise: bool,
    },
}

// ============================================================================
// Network Commands
// ============================================================================

/// Network domain commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum NetworkCommand {
    /// Enable network events.
    #[serde(rename = "Network.enable")]
    Enable,

    /// Headers added to every request.
    #[serde(rename = "Network.setExtraHTTPHeaders")]
    SetExtraHttpHeaders {
        /// Header map.
        headers: super::Headers,
    },

    /// Emulate network conditions.
    #[serde(rename = "Network.emulateNetworkConditions")]
    EmulateNetworkConditions {
        /// Emulate being offline.
        offline: bool,
        /// Added latency in ms.
        latency: f64,
        /// Download throughput in bytes/s, `-1` disables throttling.
        #[serde(rename = "downloadThroughput")]
        download_throughput: f64,
        /// Upload throughput in bytes/s, `-1` disables throttling.
        #[serde(rename = "uploadThroughput")]
        upload_throughput: f64,
    },

    /// Override the user agent.
    #[serde(rename = "Network.setUserAgentOverride")]
    SetUserAgentOverride {
        /// User agent.
        #[serde(rename = "userAgent")]
        user_agent: String,
    },

    /// Toggle the cache.
    #[serde(rename = "Network.setCacheDisabled")]
    SetCacheDisabled {
        /// Disable the cache.
        #[serde(rename = "cacheDisabled")]
        cache_disabled: bool,
    },
}

// ============================================================================
// Fetch Commands
// ============================================================================

/// Fetch domain commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum FetchCommand {
    /// Start pausing requests.
    #[serde(rename = "Fetch.enable")]
    Enable {
        /// Pause on auth challenges.
        #[serde(rename = "handleAuthRequests")]
        handle_auth_requests: bool,
        /// URL patterns to pause.
        patterns: Vec<RequestPattern>,
    },

    /// Stop pausing requests.
    #[serde(rename = "Fetch.disable")]
    Disable,

    /// Resume a paused request, optionally modified.
    #[serde(rename = "Fetch.continueRequest")]
    ContinueRequest {
        /// Interception ID.
        #[serde(rename = "requestId")]
        request_id: InterceptionId,
        /// Replacement URL.
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        /// Replacement method.
        #[serde(skip_serializing_if = "Option::is_none")]
        method: Option<String>,
        /// Replacement body, base64.
        #[serde(rename = "postData", skip_serializing_if = "Option::is_none")]
        post_data: Option<String>,
        /// Replacement headers.
        #[serde(skip_serializing_if = "Option::is_none")]
        headers: Option<Vec<HeaderEntry>>,
    },

    /// Fail a paused request.
    #[serde(rename = "Fetch.failRequest")]
    FailRequest {
        /// Interception ID.
        #[serde(rename = "requestId")]
        request_id: InterceptionId,
        /// Network error to report.
        #[serde(rename = "errorReason")]
        error_reason: ErrorReason,
    },

    /// Answer a paused request with a synthetic response.
    #[serde(rename = "Fetch.fulfillRequest")]
    FulfillRequest {
        /// Interception ID.
        #[serde(rename = "requestId")]
        request_id: InterceptionId,
        /// HTTP status.
        #[serde(rename = "responseCode")]
        response_code: u16,
        /// Response headers.
        #[serde(rename = "responseHeaders")]
        response_headers: Vec<HeaderEntry>,
        /// Body, base64.
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<String>,
    },

    /// Answer an auth challenge.
    #[serde(rename = "Fetch.continueWithAuth")]
    ContinueWithAuth {
        /// Interception ID.
        #[serde(rename = "requestId")]
        request_id: InterceptionId,
        /// Decision.
        #[serde(rename = "authChallengeResponse")]
        auth_challenge_response: AuthChallengeResponse,
    },
}

// ============================================================================
// Security Commands
// ============================================================================

/// Security domain commands.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "method", content = "params")]
pub enum SecurityCommand {
    /// Ignore certificate errors.
    #[serde(rename = "Security.setIgnoreCertificateErrors")]
    SetIgnoreCertificateErrors {
        /// Ignore.
        ignore: bool,
    },
}

// ============================================================================
// Parameter Types
// ============================================================================

/// Header name/value pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    /// Header name.
    pub name: String,
    /// Header value.
    pub value: String,
}

impl HeaderEntry {
    /// Creates a header entry.
    #[inline]
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Pattern selecting which requests `Fetch` pauses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequestPattern {
    /// Wildcard URL pattern.
    #[serde(rename = "urlPattern")]
    pub url_pattern: String,
}

impl RequestPattern {
    /// Pattern matching every request.
    #[must_use]
    pub fn all() -> Self {
        Self {
            url_pattern: "*".to_string(),
        }
    }
}

/// Answer to an authentication challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthChallengeResponse {
    /// Decision.
    pub response: AuthResponse,
    /// Username, for `ProvideCredentials`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Password, for `ProvideCredentials`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

/// Auth challenge decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AuthResponse {
    /// Let the browser handle it (shows a prompt or fails).
    Default,
    /// Cancel the challenge.
    CancelAuth,
    /// Supply credentials.
    ProvideCredentials,
}

/// Network error reported when aborting an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorReason {
    /// Generic failure.
    Failed,
    /// Request aborted.
    Aborted,
    /// Timed out.
    TimedOut,
    /// Access denied.
    AccessDenied,
    /// Connection closed.
    ConnectionClosed,
    /// Connection reset.
    ConnectionReset,
    /// Connection refused.
    ConnectionRefused,
    /// Connection aborted.
    ConnectionAborted,
    /// Connection failed.
    ConnectionFailed,
    /// Name not resolved.
    NameNotResolved,
    /// Internet disconnected.
    InternetDisconnected,
    /// Address unreachable.
    AddressUnreachable,
    /// Blocked by client.
    BlockedByClient,
    /// Blocked by response.
    BlockedByResponse,
}

impl ErrorReason {
    /// Returns the protocol spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Failed => "Failed",
            Self::Aborted => "Aborted",
            Self::TimedOut => "TimedOut",
            Self::AccessDenied => "AccessDenied",
            Self::ConnectionClosed => "ConnectionClosed",
            Self::ConnectionReset => "ConnectionReset",
            Self::ConnectionRefused => "ConnectionRefused",
            Self::ConnectionAborted => "ConnectionAborted",
            Self::ConnectionFailed => "ConnectionFailed",
            Self::NameNotResolved => "NameNotResolved",
            Self::InternetDisconnected => "InternetDisconnected",
            Self::AddressUnreachable => "AddressUnreachable",
            Self::BlockedByClient => "BlockedByClient",
            Self::BlockedByResponse => "BlockedByResponse",
        }
    }
}

impl std::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
