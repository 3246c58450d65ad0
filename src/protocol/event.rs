//! Typed event payloads.
//!
//! Only the events consumed by the session, network and frame state
//! machines are modelled; everything else stays a raw [`Value`] on the
//! session emitter.
//!
//! # Events
//!
//! | Domain | Events |
//! |--------|--------|
//! | `Target` | `attachedToTarget`, `detachedFromTarget` |
//! | `Page` | `frameAttached`, `frameNavigated`, `navigatedWithinDocument`, `frameDetached`, `frameStoppedLoading`, `lifecycleEvent` |
//! | `Runtime` | `executionContextCreated`, `executionContextDestroyed`, `executionContextsCleared` |
//! | `Network` | `requestWillBeSent`, `responseReceived`, `loadingFinished`, `loadingFailed`, `requestServedFromCache` |
//! | `Fetch` | `requestPaused`, `authRequired` |
//! | `Inspector` | `targetCrashed` |

// ============================================================================
// Imports
// ============================================================================

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::{
    ExecutionContextId, FrameId, InterceptionId, LoaderId, RequestId, SessionId, TargetId,
};

// ============================================================================
// Method Names
// ============================================================================

/// Event method names.
pub mod methods {
    pub const ATTACHED_TO_TARGET: &str = "Target.attachedToTarget";
    pub const DETACHED_FROM_TARGET: &str = "Target.detachedFromTarget";

    pub const FRAME_ATTACHED: &str = "Page.frameAttached";
    pub const FRAME_NAVIGATED: &str = "Page.frameNavigated";
    pub const NAVIGATED_WITHIN_DOCUMENT: &str = "Page.navigatedWithinDocument";
    pub const FRAME_DETACHED: &str = "Page.frameDetached";
    pub const FRAME_STOPPED_LOADING: &str = "Page.frameStoppedLoading";
    pub const LIFECYCLE_EVENT: &str = "Page.lifecycleEvent";

    pub const EXECUTION_CONTEXT_CREATED: &str = "Runtime.executionContextCreated";
    pub const EXECUTION_CONTEXT_DESTROYED: &str = "Runtime.executionContextDestroyed";
    pub const EXECUTION_CONTEXTS_CLEARED: &str = "Runtime.executionContextsCleared";

    pub const REQUEST_WILL_BE_SENT: &str = "Network.requestWillBeSent";
    pub const RESPONSE_RECEIVED: &str = "Network.responseReceived";
    pub const LOADING_FINISHED: &str = "Network.loadingFinished";
    pub const LOADING_FAILED: &str = "Network.loadingFailed";
    pub const REQUEST_SERVED_FROM_CACHE: &str = "Network.requestServedFromCache";

    pub const REQUEST_PAUSED: &str = "Fetch.requestPaused";
    pub const AUTH_REQUIRED: &str = "Fetch.authRequired";

    pub const TARGET_CRASHED: &str = "Inspector.targetCrashed";
}

/// HTTP header map as sent on the wire.
pub type Headers = FxHashMap<String, String>;

// ============================================================================
// Target Events
// ============================================================================

/// Description of a target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    /// Target ID.
    pub target_id: TargetId,
    /// Target type (`page`, `iframe`, `worker`, ...).
    #[serde(rename = "type")]
    pub target_type: String,
    /// Current URL.
    #[serde(default)]
    pub url: String,
    /// Title.
    #[serde(default)]
    pub title: String,
}

/// `Target.attachedToTarget`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachedToTarget {
    /// Newly assigned session.
    pub session_id: SessionId,
    /// Attached target.
    pub target_info: TargetInfo,
    /// Whether the target is paused waiting for `Runtime.runIfWaitingForDebugger`.
    #[serde(default)]
    pub waiting_for_debugger: bool,
}

/// `Target.detachedFromTarget`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachedFromTarget {
    /// Detached session.
    pub session_id: SessionId,
    /// Target the session was attached to.
    #[serde(default)]
    pub target_id: Option<TargetId>,
}

// ============================================================================
// Page Events
// ============================================================================

/// Frame description in `frameNavigated` and `getFrameTree`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FramePayload {
    /// Frame ID.
    pub id: FrameId,
    /// Parent frame, absent for the main frame.
    #[serde(default)]
    pub parent_id: Option<FrameId>,
    /// Loader of the committed document.
    pub loader_id: LoaderId,
    /// Frame name attribute.
    #[serde(default)]
    pub name: Option<String>,
    /// Document URL without fragment.
    pub url: String,
    /// Fragment, including `#`.
    #[serde(default)]
    pub url_fragment: Option<String>,
}

impl FramePayload {
    /// Returns the URL including its fragment.
    #[must_use]
    pub fn full_url(&self) -> String {
        match &self.url_fragment {
            Some(fragment) => format!("{}{}", self.url, fragment),
            None => self.url.clone(),
        }
    }
}

/// Node of `Page.getFrameTree`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameTree {
    /// This frame.
    pub frame: FramePayload,
    /// Child frames.
    #[serde(default)]
    pub child_frames: Vec<FrameTree>,
}

/// `Page.frameAttached`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameAttached {
    /// Attached frame.
    pub frame_id: FrameId,
    /// Parent frame.
    pub parent_frame_id: FrameId,
}

/// `Page.frameNavigated`.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameNavigated {
    /// Committed frame state.
    pub frame: FramePayload,
}

/// `Page.navigatedWithinDocument`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigatedWithinDocument {
    /// Frame.
    pub frame_id: FrameId,
    /// New URL.
    pub url: String,
}

/// `Page.frameDetached`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameDetached {
    /// Detached frame.
    pub frame_id: FrameId,
    /// `remove` or `swap`.
    #[serde(default)]
    pub reason: Option<String>,
}

/// `Page.frameStoppedLoading`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameStoppedLoading {
    /// Frame.
    pub frame_id: FrameId,
}

/// `Page.lifecycleEvent`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleEvent {
    /// Frame.
    pub frame_id: FrameId,
    /// Loader the milestone belongs to.
    pub loader_id: LoaderId,
    /// Milestone name (`init`, `DOMContentLoaded`, `load`, ...).
    pub name: String,
    /// Monotonic timestamp in seconds.
    #[serde(default)]
    pub timestamp: f64,
}

// ============================================================================
// Runtime Events
// ============================================================================

/// Auxiliary data attached to an execution context.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextAuxData {
    /// Owning frame.
    #[serde(default)]
    pub frame_id: Option<FrameId>,
    /// Whether this is the frame's main world.
    #[serde(default)]
    pub is_default: bool,
    /// `default` or `isolated`.
    #[serde(rename = "type", default)]
    pub context_type: Option<String>,
}

/// Execution context description.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContextDescription {
    /// Context ID.
    pub id: ExecutionContextId,
    /// Origin.
    #[serde(default)]
    pub origin: String,
    /// World name for isolated worlds.
    #[serde(default)]
    pub name: String,
    /// Auxiliary data.
    #[serde(default)]
    pub aux_data: Option<ContextAuxData>,
}

/// `Runtime.executionContextCreated`.
#[derive(Debug, Clone, Deserialize)]
pub struct ExecutionContextCreated {
    /// New context.
    pub context: ExecutionContextDescription,
}

/// `Runtime.executionContextDestroyed`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionContextDestroyed {
    /// Destroyed context.
    pub execution_context_id: ExecutionContextId,
}

// ============================================================================
// Network Events
// ============================================================================

/// Request description.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    /// URL without fragment.
    pub url: String,
    /// Fragment, including `#`.
    #[serde(default)]
    pub url_fragment: Option<String>,
    /// HTTP method.
    pub method: String,
    /// Request headers.
    #[serde(default)]
    pub headers: Headers,
    /// Request body, when small enough to be inlined.
    #[serde(default)]
    pub post_data: Option<String>,
    /// Whether a body exists.
    #[serde(default)]
    pub has_post_data: bool,
}

/// Response description.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePayload {
    /// Final URL.
    pub url: String,
    /// HTTP status.
    pub status: u16,
    /// HTTP status text.
    #[serde(default)]
    pub status_text: String,
    /// Response headers.
    #[serde(default)]
    pub headers: Headers,
    /// Remote IP.
    #[serde(rename = "remoteIPAddress", default)]
    pub remote_ip_address: Option<String>,
    /// Remote port.
    #[serde(default)]
    pub remote_port: Option<u16>,
    /// Served from the disk cache.
    #[serde(default)]
    pub from_disk_cache: bool,
    /// Served by a service worker.
    #[serde(default)]
    pub from_service_worker: bool,
    /// MIME type.
    #[serde(default)]
    pub mime_type: String,
    /// Protocol (`http/1.1`, `h2`, ...).
    #[serde(default)]
    pub protocol: Option<String>,
}

/// `Network.requestWillBeSent`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestWillBeSent {
    /// Request ID.
    pub request_id: RequestId,
    /// Loader ID; equals the request ID for navigation requests.
    #[serde(default)]
    pub loader_id: Option<LoaderId>,
    /// URL of the document this request is loaded for.
    #[serde(rename = "documentURL", default)]
    pub document_url: Option<String>,
    /// Request data.
    pub request: RequestPayload,
    /// Response of the previous hop when this is a redirect.
    #[serde(default)]
    pub redirect_response: Option<ResponsePayload>,
    /// Resource type.
    #[serde(rename = "type", default)]
    pub resource_type: Option<String>,
    /// Frame.
    #[serde(default)]
    pub frame_id: Option<FrameId>,
}

/// `Network.responseReceived`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseReceived {
    /// Request ID.
    pub request_id: RequestId,
    /// Response data.
    pub response: ResponsePayload,
    /// Resource type.
    #[serde(rename = "type", default)]
    pub resource_type: Option<String>,
    /// Frame.
    #[serde(default)]
    pub frame_id: Option<FrameId>,
}

/// `Network.loadingFinished`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFinished {
    /// Request ID.
    pub request_id: RequestId,
    /// Total bytes received.
    #[serde(default)]
    pub encoded_data_length: f64,
}

/// `Network.loadingFailed`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadingFailed {
    /// Request ID.
    pub request_id: RequestId,
    /// Failure description, e.g. `net::ERR_FAILED`.
    #[serde(default)]
    pub error_text: String,
    /// Whether the load was cancelled.
    #[serde(default)]
    pub canceled: bool,
}

/// `Network.requestServedFromCache`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestServedFromCache {
    /// Request ID.
    pub request_id: RequestId,
}

// ============================================================================
// Fetch Events
// ============================================================================

/// `Fetch.requestPaused`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPaused {
    /// Interception ID used to resume the request.
    pub request_id: InterceptionId,
    /// Request data.
    pub request: RequestPayload,
    /// Frame.
    #[serde(default)]
    pub frame_id: Option<FrameId>,
    /// Resource type.
    #[serde(default)]
    pub resource_type: Option<String>,
    /// Matching `Network` request ID.
    #[serde(default)]
    pub network_id: Option<RequestId>,
}

/// Authentication challenge.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthChallenge {
    /// `Server` or `Proxy`.
    #[serde(default)]
    pub source: Option<String>,
    /// Origin of the challenger.
    pub origin: String,
    /// Scheme (`basic`, `digest`, ...).
    #[serde(default)]
    pub scheme: String,
    /// Realm.
    #[serde(default)]
    pub realm: String,
}

/// `Fetch.authRequired`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequired {
    /// Interception ID.
    pub request_id: InterceptionId,
    /// Request data.
    pub request: RequestPayload,
    /// Challenge.
    pub auth_challenge: AuthChallenge,
}

// ============================================================================
// Command Results
// ============================================================================

/// Result of `Page.navigate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateResult {
    /// Navigated frame.
    pub frame_id: FrameId,
    /// Loader of the new document; absent for same-document navigation.
    #[serde(default)]
    pub loader_id: Option<LoaderId>,
    /// Network-level failure.
    #[serde(default)]
    pub error_text: Option<String>,
}

/// Result of `Page.getFrameTree`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameTreeResult {
    /// Root of the tree.
    pub frame_tree: FrameTree,
}

/// Entry of `Page.getNavigationHistory`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationEntry {
    /// Entry ID.
    pub id: i64,
    /// URL.
    pub url: String,
}

/// Result of `Page.getNavigationHistory`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationHistory {
    /// Index of the current entry.
    pub current_index: usize,
    /// History entries.
    pub entries: Vec<NavigationEntry>,
}

/// Result of `Target.attachToTarget`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTargetResult {
    /// Session for the target.
    pub session_id: SessionId,
}

/// Result of `Runtime.evaluate`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
    /// Remote object, with `value` when returned by value.
    pub result: Value,
    /// Present when the script threw.
    #[serde(default)]
    pub exception_details: Option<Value>,
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_attached_to_target() {
        let payload: AttachedToTarget = serde_json::from_value(json!({
            "sessionId": "S1",
            "targetInfo": {
                "targetId": "T1",
                "type": "iframe",
                "url": "https://a.test/",
                "title": "",
                "attached": true
            },
            "waitingForDebugger": false
        }))
        .expect("decode");

        assert_eq!(payload.session_id.as_str(), "S1");
        assert_eq!(payload.target_info.target_type, "iframe");
    }

    #[test]
    fn test_frame_payload_full_url() {
        let payload: FrameNavigated = serde_json::from_value(json!({
            "frame": {
                "id": "F",
                "loaderId": "L",
                "url": "https://a.test/",
                "urlFragment": "#top",
                "securityOrigin": "https://a.test"
            }
        }))
        .expect("decode");

        assert_eq!(payload.frame.full_url(), "https://a.test/#top");
        assert!(payload.frame.parent_id.is_none());
    }

    #[test]
    fn test_request_will_be_sent_with_redirect() {
        let payload: RequestWillBeSent = serde_json::from_value(json!({
            "requestId": "R",
            "loaderId": "R",
            "documentURL": "https://a.test/",
            "request": {
                "url": "https://a.test/next",
                "method": "GET",
                "headers": { "Accept": "*/*" }
            },
            "redirectResponse": {
                "url": "https://a.test/",
                "status": 302,
                "statusText": "Found",
                "headers": { "location": "/next" },
                "remoteIPAddress": "127.0.0.1",
                "remotePort": 443
            },
            "type": "Document",
            "frameId": "F"
        }))
        .expect("decode");

        let redirect = payload.redirect_response.expect("redirect");
        assert_eq!(redirect.status, 302);
        assert_eq!(redirect.remote_ip_address.as_deref(), Some("127.0.0.1"));
        assert_eq!(payload.resource_type.as_deref(), Some("Document"));
        assert_eq!(payload.request.headers.get("Accept").map(String::as_str), Some("*/*"));
    }

    #[test]
    fn test_execution_context_aux_data() {
        let payload: ExecutionContextCreated = serde_json::from_value(json!({
            "context": {
                "id": 7,
                "origin": "https://a.test",
                "name": "",
                "auxData": { "frameId": "F", "isDefault": true, "type": "default" }
            }
        }))
        .expect("decode");

        let aux = payload.context.aux_data.expect("aux");
        assert!(aux.is_default);
        assert_eq!(aux.frame_id, Some(FrameId::from("F")));
        assert_eq!(payload.context.id, ExecutionContextId::new(7));
    }
}
