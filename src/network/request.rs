//! Network request and response handles.
//!
//! A [`Request`] moves through
//!
//! ```text
//! Created ──► Responded ──► Finished
//!    │            │
//!    └────────────┴───────► Failed
//!    └────────────────────► Finished
//! ```
//!
//! `Finished` and `Failed` are terminal; transitions out of them are
//! rejected.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::identifiers::{FrameId, InterceptionId, RequestId};
use crate::protocol::Headers;
use crate::protocol::event::{RequestWillBeSent, ResponsePayload};

// ============================================================================
// RequestState
// ============================================================================

/// Lifecycle phase of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    /// Sent, no response headers yet.
    Created,
    /// Response headers received.
    Responded,
    /// Failed; terminal.
    Failed,
    /// Completed; terminal.
    Finished,
}

impl RequestState {
    /// Returns `true` for `Failed` and `Finished`.
    #[inline]
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Finished)
    }
}

// ============================================================================
// Response
// ============================================================================

/// Remote endpoint of a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteAddress {
    /// IP address.
    pub ip: String,
    /// Port.
    pub port: u16,
}

/// Response to a request. Exactly one per responded request.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    request_id: RequestId,
    url: String,
    status: u16,
    status_text: String,
    headers: Headers,
    remote_address: Option<RemoteAddress>,
    from_cache: bool,
    from_service_worker: bool,
    mime_type: String,
}

impl Response {
    pub(crate) fn from_payload(
        request_id: RequestId,
        payload: &ResponsePayload,
        from_memory_cache: bool,
    ) -> Self {
        let remote_address = payload.remote_ip_address.as_ref().map(|ip| RemoteAddress {
            ip: ip.clone(),
            port: payload.remote_port.unwrap_or_default(),
        });

        Self {
            request_id,
            url: payload.url.clone(),
            status: payload.status,
            status_text: payload.status_text.clone(),
            headers: lowercase_headers(&payload.headers),
            remote_address,
            from_cache: payload.from_disk_cache || from_memory_cache,
            from_service_worker: payload.from_service_worker,
            mime_type: payload.mime_type.clone(),
        }
    }

    /// ID of the request this answers.
    #[inline]
    #[must_use]
    pub fn request_id(&self) -> &RequestId {
        &self.request_id
    }

    /// Response URL.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// HTTP status.
    #[inline]
    #[must_use]
    pub fn status(&self) -> u16 {
        self.status
    }

    /// HTTP status text.
    #[inline]
    #[must_use]
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// Returns `true` for 2xx statuses (and status 0 for non-HTTP schemes).
    #[inline]
    #[must_use]
    pub fn ok(&self) -> bool {
        self.status == 0 || (200..300).contains(&self.status)
    }

    /// Headers with lower-cased names.
    #[inline]
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Remote endpoint, when known.
    #[inline]
    #[must_use]
    pub fn remote_address(&self) -> Option<&RemoteAddress> {
        self.remote_address.as_ref()
    }

    /// Served from the disk or memory cache.
    #[inline]
    #[must_use]
    pub fn from_cache(&self) -> bool {
        self.from_cache
    }

    /// Served by a service worker.
    #[inline]
    #[must_use]
    pub fn from_service_worker(&self) -> bool {
        self.from_service_worker
    }

    /// MIME type.
    #[inline]
    #[must_use]
    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }
}

fn lowercase_headers(headers: &Headers) -> Headers {
    headers
        .iter()
        .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
        .collect()
}

// ============================================================================
// Request
// ============================================================================

struct Progress {
    state: RequestState,
    response: Option<Response>,
    failure: Option<String>,
    from_memory_cache: bool,
}

pub(crate) struct RequestInner {
    id: RequestId,
    interception_id: Option<InterceptionId>,
    url: String,
    method: String,
    headers: Headers,
    post_data: Option<String>,
    resource_type: String,
    frame_id: Option<FrameId>,
    is_navigation: bool,
    redirect_chain: Vec<Request>,
    progress: Mutex<Progress>,
    handled: AtomicBool,
}

/// Handle to a network request. Cheap to clone.
#[derive(Clone)]
pub struct Request {
    pub(crate) inner: Arc<RequestInner>,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.inner.id)
            .field("method", &self.inner.method)
            .field("url", &self.inner.url)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Request {
    pub(crate) fn from_event(
        event: &RequestWillBeSent,
        interception_id: Option<InterceptionId>,
        redirect_chain: Vec<Request>,
    ) -> Self {
        let resource_type = event
            .resource_type
            .clone()
            .unwrap_or_else(|| "Other".to_string());
        let is_navigation = resource_type == "Document"
            && event
                .loader_id
                .as_ref()
                .is_some_and(|loader| loader.as_str() == event.request_id.as_str());

        let url = match &event.request.url_fragment {
            Some(fragment) => format!("{}{}", event.request.url, fragment),
            None => event.request.url.clone(),
        };

        Self {
            inner: Arc::new(RequestInner {
                id: event.request_id.clone(),
                interception_id,
                url,
                method: event.request.method.clone(),
                headers: lowercase_headers(&event.request.headers),
                post_data: event.request.post_data.clone(),
                resource_type,
                frame_id: event.frame_id.clone(),
                is_navigation,
                redirect_chain,
                progress: Mutex::new(Progress {
                    state: RequestState::Created,
                    response: None,
                    failure: None,
                    from_memory_cache: false,
                }),
                handled: AtomicBool::new(false),
            }),
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Request ID; shared by every hop of a redirect chain.
    #[inline]
    #[must_use]
    pub fn id(&self) -> &RequestId {
        &self.inner.id
    }

    /// Interception ID when the request was paused.
    #[inline]
    #[must_use]
    pub fn interception_id(&self) -> Option<&InterceptionId> {
        self.inner.interception_id.as_ref()
    }

    /// Request URL, including fragment.
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// HTTP method.
    #[inline]
    #[must_use]
    pub fn method(&self) -> &str {
        &self.inner.method
    }

    /// Headers with lower-cased names.
    #[inline]
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.inner.headers
    }

    /// Request body, when inlined by the browser.
    #[inline]
    #[must_use]
    pub fn post_data(&self) -> Option<&str> {
        self.inner.post_data.as_deref()
    }

    /// Resource type (`Document`, `Script`, `XHR`, ...).
    #[inline]
    #[must_use]
    pub fn resource_type(&self) -> &str {
        &self.inner.resource_type
    }

    /// Frame that issued the request.
    #[inline]
    #[must_use]
    pub fn frame_id(&self) -> Option<&FrameId> {
        self.inner.frame_id.as_ref()
    }

    /// Returns `true` for the document request driving a navigation.
    #[inline]
    #[must_use]
    pub fn is_navigation_request(&self) -> bool {
        self.inner.is_navigation
    }

    /// Earlier hops, oldest first.
    #[inline]
    #[must_use]
    pub fn redirect_chain(&self) -> &[Request] {
        &self.inner.redirect_chain
    }

    /// Current phase.
    #[must_use]
    pub fn state(&self) -> RequestState {
        self.inner.progress.lock().state
    }

    /// Response, once responded.
    #[must_use]
    pub fn response(&self) -> Option<Response> {
        self.inner.progress.lock().response.clone()
    }

    /// Failure text, once failed.
    #[must_use]
    pub fn failure(&self) -> Option<String> {
        self.inner.progress.lock().failure.clone()
    }

    /// Returns `true` once an interception decision was issued.
    #[inline]
    #[must_use]
    pub fn is_handled(&self) -> bool {
        self.inner.handled.load(Ordering::SeqCst)
    }

    pub(crate) fn from_memory_cache(&self) -> bool {
        self.inner.progress.lock().from_memory_cache
    }

    pub(crate) fn mark_memory_cache(&self) {
        self.inner.progress.lock().from_memory_cache = true;
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// `Created` → `Responded`.
    pub(crate) fn respond(&self, response: Response) -> bool {
        let mut progress = self.inner.progress.lock();
        if progress.state != RequestState::Created {
            return false;
        }
        progress.state = RequestState::Responded;
        progress.response = Some(response);
        true
    }

    /// `Created | Responded` → `Finished`.
    pub(crate) fn finish(&self) -> bool {
        let mut progress = self.inner.progress.lock();
        if progress.state.is_terminal() {
            return false;
        }
        progress.state = RequestState::Finished;
        true
    }

    /// `Created | Responded` → `Failed`.
    pub(crate) fn fail(&self, reason: impl Into<String>) -> bool {
        let mut progress = self.inner.progress.lock();
        if progress.state.is_terminal() {
            return false;
        }
        progress.state = RequestState::Failed;
        progress.failure = Some(reason.into());
        true
    }

    /// Claims the single interception decision for this request.
    ///
    /// # Errors
    ///
    /// - [`Error::InterceptionDisabled`] if the request was never paused
    /// - [`Error::InterceptionHandled`] if a decision was already issued
    pub(crate) fn claim_interception(&self) -> Result<InterceptionId> {
        let Some(id) = &self.inner.interception_id else {
            return Err(Error::InterceptionDisabled {
                request_id: self.inner.id.clone(),
            });
        };
        if self.inner.handled.swap(true, Ordering::SeqCst) {
            return Err(Error::InterceptionHandled {
                request_id: self.inner.id.clone(),
            });
        }
        Ok(id.clone())
    }

    /// Records a decision issued on the caller's behalf.
    pub(crate) fn mark_handled(&self) {
        self.inner.handled.store(true, Ordering::SeqCst);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    fn event(id: &str, loader: &str, kind: &str) -> RequestWillBeSent {
        serde_json::from_value(json!({
            "requestId": id,
            "loaderId": loader,
            "request": {
                "url": "https://a.test/",
                "urlFragment": "#x",
                "method": "GET",
                "headers": { "Accept-Language": "en" }
            },
            "type": kind,
            "frameId": "F"
        }))
        .expect("event")
    }

    fn response(status: u16) -> Response {
        let payload: ResponsePayload = serde_json::from_value(json!({
            "url": "https://a.test/",
            "status": status,
            "headers": { "Content-Type": "text/html" },
            "remoteIPAddress": "10.0.0.1",
            "remotePort": 443
        }))
        .expect("payload");
        Response::from_payload(RequestId::from("R"), &payload, false)
    }

    #[test]
    fn test_navigation_detection() {
        assert!(Request::from_event(&event("R", "R", "Document"), None, vec![]).is_navigation_request());
        assert!(!Request::from_event(&event("R", "L", "Document"), None, vec![]).is_navigation_request());
        assert!(!Request::from_event(&event("R", "R", "Script"), None, vec![]).is_navigation_request());
    }

    #[test]
    fn test_url_and_headers_normalized() {
        let request = Request::from_event(&event("R", "L", "XHR"), None, vec![]);
        assert_eq!(request.url(), "https://a.test/#x");
        assert_eq!(request.headers().get("accept-language").map(String::as_str), Some("en"));
    }

    #[test]
    fn test_transitions() {
        let request = Request::from_event(&event("R", "L", "XHR"), None, vec![]);
        assert_eq!(request.state(), RequestState::Created);

        assert!(request.respond(response(200)));
        assert!(!request.respond(response(500)));
        assert_eq!(request.response().map(|r| r.status()), Some(200));

        assert!(request.finish());
        assert!(!request.fail("net::ERR_FAILED"));
        assert!(!request.finish());
        assert_eq!(request.state(), RequestState::Finished);
        assert!(request.failure().is_none());
    }

    #[test]
    fn test_created_can_fail_directly() {
        let request = Request::from_event(&event("R", "L", "XHR"), None, vec![]);
        assert!(request.fail("net::ERR_ABORTED"));
        assert_eq!(request.state(), RequestState::Failed);
        assert!(request.response().is_none());
        assert!(!request.respond(response(200)));
    }

    #[test]
    fn test_claim_interception_once() {
        let paused = Request::from_event(
            &event("R", "L", "XHR"),
            Some(InterceptionId::from("I")),
            vec![],
        );
        assert_eq!(paused.claim_interception().expect("first"), InterceptionId::from("I"));
        assert!(matches!(
            paused.claim_interception(),
            Err(Error::InterceptionHandled { .. })
        ));

        let plain = Request::from_event(&event("R", "L", "XHR"), None, vec![]);
        assert!(matches!(
            plain.claim_interception(),
            Err(Error::InterceptionDisabled { .. })
        ));
    }

    #[test]
    fn test_response_accessors() {
        let response = response(204);
        assert!(response.ok());
        assert_eq!(response.headers().get("content-type").map(String::as_str), Some("text/html"));
        assert_eq!(
            response.remote_address(),
            Some(&RemoteAddress {
                ip: "10.0.0.1".to_string(),
                port: 443
            })
        );
    }
}
