//! Per-session request tracking and interception.
//!
//! The manager assembles `Network.*` and `Fetch.*` events into [`Request`]
//! lifecycles and re-publishes them on its own emitter:
//!
//! | Topic | When |
//! |-------|------|
//! | `request` | request created |
//! | `response` | response headers received |
//! | `requestfinished` | request completed (also for each redirect hop) |
//! | `requestfailed` | request failed |
//!
//! With interception on, `Network.requestWillBeSent` and `Fetch.requestPaused`
//! may arrive in either order; the request is only published once both are
//! known, so the `request` listener always sees a pausable request.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::events::{EventEmitter, EventStream, ListenerGuard};
use crate::identifiers::{InterceptionId, ListenerId, RequestId};
use crate::protocol::event::{
    AuthRequired, LoadingFailed, LoadingFinished, RequestPaused, RequestServedFromCache,
    RequestWillBeSent, ResponseReceived,
};
use crate::protocol::{
    AuthChallengeResponse, AuthResponse, ErrorReason, FetchCommand, Headers, NetworkCommand,
    RequestPattern, SecurityCommand, methods,
};
use crate::transport::Session;

use super::interception::{ContinueOverrides, Credentials, InterceptDecision, SyntheticResponse};
use super::request::{Request, Response};

// ============================================================================
// Types
// ============================================================================

/// Synchronous interception handler.
pub type RequestHandler = Arc<dyn Fn(&Request) -> InterceptDecision + Send + Sync>;

/// Topics published by [`NetworkManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NetworkEvent {
    /// Request created.
    Request,
    /// Response received.
    Response,
    /// Request finished.
    RequestFinished,
    /// Request failed.
    RequestFailed,
}

impl NetworkEvent {
    /// Topic name on the manager's emitter.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Response => "response",
            Self::RequestFinished => "requestfinished",
            Self::RequestFailed => "requestfailed",
        }
    }
}

impl fmt::Display for NetworkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A `requestPaused` not yet matched with its request.
#[derive(Debug, Clone)]
struct Paused {
    interception_id: InterceptionId,
    /// Already continued on the protocol's behalf; nobody may decide it again.
    continued: bool,
}

#[derive(Default)]
struct NetworkState {
    /// In-flight requests. Entries leave only on finish or failure.
    in_flight: FxHashMap<RequestId, Request>,
    /// `requestWillBeSent` events waiting for their `requestPaused`.
    will_be_sent: FxHashMap<RequestId, RequestWillBeSent>,
    /// `requestPaused` interceptions waiting for their `requestWillBeSent`.
    paused: FxHashMap<RequestId, Paused>,
    attempted_auth: FxHashSet<InterceptionId>,

    extra_headers: Headers,
    offline: bool,
    credentials: Option<Credentials>,
    user_intercept: bool,
    protocol_intercept: bool,
    user_cache_disabled: bool,
    handler: Option<RequestHandler>,
}

struct NetworkInner {
    session: Session,
    emitter: EventEmitter<Request>,
    state: Mutex<NetworkState>,
    _listeners: ListenerGuard<Value>,
}

// ============================================================================
// NetworkManager
// ============================================================================

/// Request/response correlation for one session. Cheap to clone.
#[derive(Clone)]
pub struct NetworkManager {
    inner: Arc<NetworkInner>,
}

impl fmt::Debug for NetworkManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkManager")
            .field("session", &self.inner.session.id())
            .field("in_flight", &self.in_flight_count())
            .finish_non_exhaustive()
    }
}

impl NetworkManager {
    /// Creates a manager listening on `session`.
    ///
    /// No command is sent until [`initialize`](Self::initialize).
    #[must_use]
    pub fn new(session: Session) -> Self {
        let inner = Arc::new_cyclic(|weak: &Weak<NetworkInner>| {
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

            route!(methods::REQUEST_WILL_BE_SENT, RequestWillBeSent, on_request_will_be_sent);
            route!(methods::REQUEST_PAUSED, RequestPaused, on_request_paused);
            route!(methods::AUTH_REQUIRED, AuthRequired, on_auth_required);
            route!(methods::REQUEST_SERVED_FROM_CACHE, RequestServedFromCache, on_served_from_cache);
            route!(methods::RESPONSE_RECEIVED, ResponseReceived, on_response_received);
            route!(methods::LOADING_FINISHED, LoadingFinished, on_loading_finished);
            route!(methods::LOADING_FAILED, LoadingFailed, on_loading_failed);

            let forward: EventEmitter<Request> = emitter.clone();
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

            NetworkInner {
                session: session.clone(),
                emitter,
                state: Mutex::new(NetworkState::default()),
                _listeners: listeners,
            }
        });

        Self { inner }
    }

    /// Enables the network domain.
    ///
    /// # Errors
    ///
    /// Returns the first failing command's error.
    pub async fn initialize(&self) -> Result<()> {
        let session = &self.inner.session;
        session.send_command(NetworkCommand::Enable).await?;

        let ignore_https_errors = session
            .connection()
            .is_some_and(|connection| connection.options().ignore_https_errors());
        if ignore_https_errors {
            session
                .send_command(SecurityCommand::SetIgnoreCertificateErrors { ignore: true })
                .await?;
        }
        Ok(())
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

    /// Number of requests started but not yet finished or failed.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }

    /// Looks up an in-flight request.
    #[must_use]
    pub fn request(&self, id: &RequestId) -> Option<Request> {
        self.inner.state.lock().in_flight.get(id).cloned()
    }

    /// Snapshot of in-flight requests.
    #[must_use]
    pub fn in_flight_requests(&self) -> Vec<Request> {
        self.inner.state.lock().in_flight.values().cloned().collect()
    }

    /// Extra headers currently applied.
    #[must_use]
    pub fn extra_http_headers(&self) -> Headers {
        self.inner.state.lock().extra_headers.clone()
    }

    /// Returns `true` while offline emulation is on.
    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.inner.state.lock().offline
    }

    /// Returns `true` while requests are paused for a decision.
    #[must_use]
    pub fn is_intercepting(&self) -> bool {
        self.inner.state.lock().user_intercept
    }

    /// Emitter carrying [`NetworkEvent`] topics.
    #[inline]
    #[must_use]
    pub fn emitter(&self) -> &EventEmitter<Request> {
        &self.inner.emitter
    }

    /// Registers a listener for `event`.
    pub fn on<F>(&self, event: NetworkEvent, callback: F) -> ListenerId
    where
        F: Fn(&Request) + Send + Sync + 'static,
    {
        self.inner.emitter.on(event.as_str(), callback)
    }

    /// Removes a listener.
    pub fn off(&self, id: ListenerId) -> bool {
        self.inner.emitter.off(id)
    }

    /// Streams every `event` until the session closes.
    #[must_use]
    pub fn events(&self, event: NetworkEvent) -> EventStream<Request> {
        self.inner.emitter.subscribe(event.as_str())
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Sets headers sent with every subsequent request. Names are lower-cased.
    ///
    /// # Errors
    ///
    /// Returns the command error.
    pub async fn set_extra_http_headers(&self, headers: Headers) -> Result<()> {
        let headers: Headers = headers
            .into_iter()
            .map(|(name, value)| (name.to_ascii_lowercase(), value))
            .collect();
        self.inner.state.lock().extra_headers = headers.clone();

        self.inner
            .session
            .send_command(NetworkCommand::SetExtraHttpHeaders { headers })
            .await?;
        Ok(())
    }

    /// Toggles offline emulation.
    ///
    /// # Errors
    ///
    /// Returns the command error.
    pub async fn set_offline_mode(&self, offline: bool) -> Result<()> {
        {
            let mut state = self.inner.state.lock();
            if state.offline == offline {
                return Ok(());
            }
            state.offline = offline;
        }

        self.inner
            .session
            .send_command(NetworkCommand::EmulateNetworkConditions {
                offline,
                latency: 0.0,
                download_throughput: -1.0,
                upload_throughput: -1.0,
            })
            .await?;
        Ok(())
    }

    /// Overrides the user agent.
    ///
    /// # Errors
    ///
    /// Returns the command error.
    pub async fn set_user_agent(&self, user_agent: impl Into<String>) -> Result<()> {
        self.inner
            .session
            .send_command(NetworkCommand::SetUserAgentOverride {
                user_agent: user_agent.into(),
            })
            .await?;
        Ok(())
    }

    /// Enables or disables the browser cache.
    ///
    /// The cache stays disabled while interception is active.
    ///
    /// # Errors
    ///
    /// Returns the command error.
    pub async fn set_cache_enabled(&self, enabled: bool) -> Result<()> {
        self.inner.state.lock().user_cache_disabled = !enabled;
        self.update_protocol_cache_disabled().await
    }

    /// Sets or clears HTTP authentication credentials.
    ///
    /// Credentials turn on protocol-level interception so challenges can be
    /// answered.
    ///
    /// # Errors
    ///
    /// Returns the command error.
    pub async fn authenticate(&self, credentials: Option<Credentials>) -> Result<()> {
        self.inner.state.lock().credentials = credentials;
        self.update_protocol_interception().await
    }

    /// Turns request interception on or off.
    ///
    /// While on, every request is paused until it receives exactly one
    /// [`InterceptDecision`], either from the handler installed with
    /// [`set_request_handler`](Self::set_request_handler) or through
    /// [`continue_request`](Self::continue_request),
    /// [`abort_request`](Self::abort_request) or
    /// [`respond_request`](Self::respond_request).
    ///
    /// # Errors
    ///
    /// Returns the command error.
    pub async fn set_request_interception(&self, enabled: bool) -> Result<()> {
        self.inner.state.lock().user_intercept = enabled;
        self.update_protocol_interception().await
    }

    /// Installs the handler deciding every paused request.
    ///
    /// The handler runs on the connection's reader task after the `request`
    /// event; it must not block. A panicking handler aborts the request.
    pub fn set_request_handler<F>(&self, handler: F)
    where
        F: Fn(&Request) -> InterceptDecision + Send + Sync + 'static,
    {
        self.inner.state.lock().handler = Some(Arc::new(handler));
    }

    /// Removes the request handler. Paused requests then wait for an
    /// explicit decision.
    pub fn clear_request_handler(&self) {
        self.inner.state.lock().handler = None;
    }

    async fn update_protocol_interception(&self) -> Result<()> {
        let (enabled, stashed) = {
            let mut state = self.inner.state.lock();
            let enabled = state.user_intercept || state.credentials.is_some();
            if enabled == state.protocol_intercept {
                return Ok(());
            }
            state.protocol_intercept = enabled;
            if enabled {
                (enabled, Vec::new())
            } else {
                // No further pauses will arrive to match these.
                state.paused.clear();
                state.attempted_auth.clear();
                let stashed: Vec<_> = state.will_be_sent.drain().map(|(_, event)| event).collect();
                (enabled, stashed)
            }
        };

        debug!(
            session = ?self.inner.session.id(),
            enabled,
            released = stashed.len(),
            "Updating request interception"
        );
        for event in stashed {
            self.inner.on_request(event, None);
        }

        self.update_protocol_cache_disabled().await?;
        let command = if enabled {
            FetchCommand::Enable {
                handle_auth_requests: true,
                patterns: vec![RequestPattern::all()],
            }
        } else {
            FetchCommand::Disable
        };
        self.inner.session.send_command(command).await?;
        Ok(())
    }

    async fn update_protocol_cache_disabled(&self) -> Result<()> {
        let cache_disabled = {
            let state = self.inner.state.lock();
            state.user_cache_disabled || state.protocol_intercept
        };
        self.inner
            .session
            .send_command(NetworkCommand::SetCacheDisabled { cache_disabled })
            .await?;
        Ok(())
    }

    // ========================================================================
    // Interception Decisions
    // ========================================================================

    /// Issues `decision` for a paused request.
    ///
    /// # Errors
    ///
    /// - [`Error::InterceptionDisabled`](crate::Error::InterceptionDisabled)
    ///   if the request was not paused
    /// - [`Error::InterceptionHandled`](crate::Error::InterceptionHandled)
    ///   if a decision was already issued
    /// - the command error otherwise
    pub async fn decide(&self, request: &Request, decision: InterceptDecision) -> Result<()> {
        let interception_id = request.claim_interception()?;
        trace!(request_id = %request.id(), ?decision, "Interception decision");
        self.inner
            .session
            .send_command(decision.into_command(interception_id))
            .await?;
        Ok(())
    }

    /// Continues a paused request with `overrides`.
    ///
    /// # Errors
    ///
    /// See [`decide`](Self::decide).
    pub async fn continue_request(
        &self,
        request: &Request,
        overrides: ContinueOverrides,
    ) -> Result<()> {
        self.decide(request, InterceptDecision::Continue(overrides)).await
    }

    /// Fails a paused request with `reason`.
    ///
    /// # Errors
    ///
    /// See [`decide`](Self::decide).
    pub async fn abort_request(&self, request: &Request, reason: ErrorReason) -> Result<()> {
        self.decide(request, InterceptDecision::Abort(reason)).await
    }

    /// Answers a paused request with `response`.
    ///
    /// # Errors
    ///
    /// See [`decide`](Self::decide).
    pub async fn respond_request(&self, request: &Request, response: SyntheticResponse) -> Result<()> {
        self.decide(request, InterceptDecision::Respond(response)).await
    }
}

// ============================================================================
// NetworkInner - Event Handlers
// ============================================================================

impl NetworkInner {
    fn emit(&self, event: NetworkEvent, request: &Request) {
        self.emitter.emit(event.as_str(), request);
    }

    fn on_request_will_be_sent(&self, event: RequestWillBeSent) {
        let paused = {
            let mut state = self.state.lock();
            if state.protocol_intercept && !event.request.url.starts_with("data:") {
                let Some(paused) = state.paused.remove(&event.request_id) else {
                    state.will_be_sent.insert(event.request_id.clone(), event);
                    return;
                };
                Some(paused)
            } else {
                None
            }
        };
        self.on_request(event, paused);
    }

    fn on_request_paused(&self, event: RequestPaused) {
        let (user_intercept, protocol_intercept) = {
            let state = self.state.lock();
            (state.user_intercept, state.protocol_intercept)
        };

        // Paused only for auth handling.
        let continued = !user_intercept && protocol_intercept;
        if continued {
            self.post_decision(&event.request_id, InterceptDecision::proceed());
        }
        let paused = Paused {
            interception_id: event.request_id.clone(),
            continued,
        };

        let Some(request_id) = event.network_id else {
            if user_intercept {
                debug!(interception_id = %event.request_id, "Continuing uncorrelated paused request");
                self.post_decision(&event.request_id, InterceptDecision::proceed());
            }
            return;
        };

        let pending = {
            let mut state = self.state.lock();
            match state.will_be_sent.remove(&request_id) {
                Some(pending) => Some(pending),
                None => {
                    state.paused.insert(request_id, paused.clone());
                    None
                }
            }
        };

        if let Some(pending) = pending {
            self.on_request(pending, Some(paused));
        }
    }

    fn on_request(&self, event: RequestWillBeSent, paused: Option<Paused>) {
        let mut redirect_chain = Vec::new();

        if let Some(redirect_response) = &event.redirect_response {
            let previous = self.state.lock().in_flight.remove(&event.request_id);
            if let Some(previous) = previous {
                let response = Response::from_payload(
                    event.request_id.clone(),
                    redirect_response,
                    previous.from_memory_cache(),
                );
                if previous.respond(response) {
                    self.emit(NetworkEvent::Response, &previous);
                }
                if previous.finish() {
                    self.emit(NetworkEvent::RequestFinished, &previous);
                }
                redirect_chain = previous.redirect_chain().to_vec();
                redirect_chain.push(previous);
            }
        }

        let continued = paused.as_ref().is_some_and(|paused| paused.continued);
        let interception_id = paused.map(|paused| paused.interception_id);
        let request = Request::from_event(&event, interception_id, redirect_chain);
        if continued {
            request.mark_handled();
        }
        trace!(
            request_id = %request.id(),
            method = request.method(),
            url = request.url(),
            paused = request.interception_id().is_some(),
            "Request created"
        );

        let handler = {
            let mut state = self.state.lock();
            state
                .in_flight
                .insert(request.id().clone(), request.clone());
            if state.user_intercept {
                state.handler.clone()
            } else {
                None
            }
        };

        self.emit(NetworkEvent::Request, &request);

        if let Some(handler) = handler
            && request.interception_id().is_some()
            && !request.is_handled()
        {
            let decision = catch_unwind(AssertUnwindSafe(|| handler(&request))).unwrap_or_else(|_| {
                warn!(request_id = %request.id(), "Request handler panicked, aborting request");
                InterceptDecision::abort(ErrorReason::Failed)
            });
            self.apply_decision(&request, decision);
        }
    }

    /// Posts a handler decision without waiting for the reply.
    fn apply_decision(&self, request: &Request, decision: InterceptDecision) {
        let Ok(interception_id) = request.claim_interception() else {
            return;
        };
        if let Err(e) = self
            .session
            .post_command(decision.into_command(interception_id))
        {
            warn!(request_id = %request.id(), error = %e, "Failed to post interception decision");
            self.fail_locally(request, &e.to_string());
        }
    }

    fn post_decision(&self, interception_id: &InterceptionId, decision: InterceptDecision) {
        if let Err(e) = self
            .session
            .post_command(decision.into_command(interception_id.clone()))
        {
            debug!(%interception_id, error = %e, "Failed to post interception decision");
        }
    }

    fn fail_locally(&self, request: &Request, reason: &str) {
        let removed = {
            let mut state = self.state.lock();
            match state.in_flight.get(request.id()) {
                Some(current) if Arc::ptr_eq(&current.inner, &request.inner) => {
                    state.in_flight.remove(request.id())
                }
                _ => None,
            }
        };
        if removed.is_some() && request.fail(reason) {
            self.emit(NetworkEvent::RequestFailed, request);
        }
    }

    fn on_auth_required(&self, event: AuthRequired) {
        let (response, username, password) = {
            let mut state = self.state.lock();
            if state.attempted_auth.contains(&event.request_id) {
                (AuthResponse::CancelAuth, None, None)
            } else if let Some(credentials) = state.credentials.clone() {
                state.attempted_auth.insert(event.request_id.clone());
                (
                    AuthResponse::ProvideCredentials,
                    Some(credentials.username),
                    Some(credentials.password),
                )
            } else {
                (AuthResponse::Default, None, None)
            }
        };

        debug!(interception_id = %event.request_id, ?response, "Answering auth challenge");

        let command = FetchCommand::ContinueWithAuth {
            request_id: event.request_id.clone(),
            auth_challenge_response: AuthChallengeResponse {
                response,
                username,
                password,
            },
        };
        if let Err(e) = self.session.post_command(command) {
            debug!(interception_id = %event.request_id, error = %e, "Failed to answer auth challenge");
        }
    }

    fn on_served_from_cache(&self, event: RequestServedFromCache) {
        if let Some(request) = self.state.lock().in_flight.get(&event.request_id) {
            request.mark_memory_cache();
        }
    }

    fn on_response_received(&self, event: ResponseReceived) {
        let Some(request) = self.state.lock().in_flight.get(&event.request_id).cloned() else {
            return;
        };
        let response = Response::from_payload(
            event.request_id,
            &event.response,
            request.from_memory_cache(),
        );
        if request.respond(response) {
            self.emit(NetworkEvent::Response, &request);
        }
    }

    /// Removes `request_id` from the in-flight table and drops any
    /// correlation entries that will never be matched now.
    fn settle(&self, request_id: &RequestId) -> Option<Request> {
        let mut state = self.state.lock();
        state.will_be_sent.remove(request_id);
        if let Some(paused) = state.paused.remove(request_id) {
            state.attempted_auth.remove(&paused.interception_id);
        }
        let request = state.in_flight.remove(request_id)?;
        if let Some(interception_id) = request.interception_id() {
            state.attempted_auth.remove(interception_id);
        }
        Some(request)
    }

    fn on_loading_finished(&self, event: LoadingFinished) {
        // Some request IDs never get a `requestWillBeSent`.
        let Some(request) = self.settle(&event.request_id) else {
            return;
        };
        if request.finish() {
            self.emit(NetworkEvent::RequestFinished, &request);
        }
    }

    fn on_loading_failed(&self, event: LoadingFailed) {
        let Some(request) = self.settle(&event.request_id) else {
            return;
        };
        if request.fail(event.error_text) {
            self.emit(NetworkEvent::RequestFailed, &request);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use crate::error::Error;
    use crate::network::request::RequestState;
    use crate::transport::RemoteEnd;
    use crate::transport::channel::command_id;
    use crate::transport::channel::testing::{answer, attached_page, expect_command, page_event};

    fn will_be_sent(id: &str, url: &str) -> Value {
        json!({
            "requestId": id,
            "loaderId": "L1",
            "documentURL": url,
            "request": { "url": url, "method": "GET", "headers": {} },
            "type": "XHR",
            "frameId": "F1"
        })
    }

    fn response(url: &str, status: u16) -> Value {
        json!({ "url": url, "status": status, "statusText": "", "headers": {}, "mimeType": "text/html" })
    }

    fn counter(manager: &NetworkManager, event: NetworkEvent) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        manager.on(event, {
            let count = Arc::clone(&count);
            move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            }
        });
        count
    }

    async fn enable_interception(manager: &NetworkManager, remote: &mut RemoteEnd) {
        let task = tokio::spawn({
            let manager = manager.clone();
            async move { manager.set_request_interception(true).await }
        });
        let cache = answer(remote, "Network.setCacheDisabled", json!({})).await;
        assert_eq!(cache["params"]["cacheDisabled"], true);
        let fetch = answer(remote, "Fetch.enable", json!({})).await;
        assert_eq!(fetch["params"]["handleAuthRequests"], true);
        task.await.expect("join").expect("interception");
    }

    /// Waits until the reader task processed everything sent so far.
    async fn sync(manager: &NetworkManager, remote: &mut RemoteEnd) {
        let session = manager.session().clone();
        let ping = tokio::spawn(async move { session.send("Runtime.ping", json!({})).await });
        answer(remote, "Runtime.ping", json!({})).await;
        ping.await.expect("join").expect("ping");
    }

    #[tokio::test]
    async fn test_initialize_enables_network() {
        let (_connection, session, mut remote) = attached_page().await;
        let manager = NetworkManager::new(session);

        let init = tokio::spawn({
            let manager = manager.clone();
            async move { manager.initialize().await }
        });
        let command = answer(&mut remote, "Network.enable", json!({})).await;
        assert_eq!(command["sessionId"], "S1");
        init.await.expect("join").expect("initialize");
    }

    #[tokio::test]
    async fn test_request_lifecycle() {
        let (_connection, session, mut remote) = attached_page().await;
        let manager = NetworkManager::new(session);
        let requests = counter(&manager, NetworkEvent::Request);
        let responses = counter(&manager, NetworkEvent::Response);
        let finished = counter(&manager, NetworkEvent::RequestFinished);

        page_event(&remote, methods::REQUEST_WILL_BE_SENT, will_be_sent("R1", "https://a.test/"));
        page_event(
            &remote,
            methods::RESPONSE_RECEIVED,
            json!({ "requestId": "R1", "response": response("https://a.test/", 200) }),
        );
        sync(&manager, &mut remote).await;

        let request = manager.request(&RequestId::from("R1")).expect("in flight");
        assert_eq!(request.state(), RequestState::Responded);
        assert_eq!(manager.in_flight_count(), 1);

        page_event(&remote, methods::LOADING_FINISHED, json!({ "requestId": "R1" }));
        sync(&manager, &mut remote).await;

        assert_eq!(request.state(), RequestState::Finished);
        assert_eq!(manager.in_flight_count(), 0);
        assert_eq!(requests.load(Ordering::SeqCst), 1);
        assert_eq!(responses.load(Ordering::SeqCst), 1);
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_loading_failed_without_response() {
        let (_connection, session, mut remote) = attached_page().await;
        let manager = NetworkManager::new(session);
        let mut failed = manager.events(NetworkEvent::RequestFailed);

        page_event(&remote, methods::REQUEST_WILL_BE_SENT, will_be_sent("R1", "https://a.test/"));
        page_event(
            &remote,
            methods::LOADING_FAILED,
            json!({ "requestId": "R1", "errorText": "net::ERR_CONNECTION_REFUSED" }),
        );

        let request = failed.next_event().await.expect("failed");
        assert_eq!(request.state(), RequestState::Failed);
        assert_eq!(request.failure().as_deref(), Some("net::ERR_CONNECTION_REFUSED"));
        assert!(request.response().is_none());
        assert_eq!(manager.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_intercepted_abort_fails_without_response() {
        let (_connection, session, mut remote) = attached_page().await;
        let manager = NetworkManager::new(session);
        enable_interception(&manager, &mut remote).await;
        let responses = counter(&manager, NetworkEvent::Response);
        let failed = counter(&manager, NetworkEvent::RequestFailed);
        let mut created = manager.events(NetworkEvent::Request);

        page_event(&remote, methods::REQUEST_WILL_BE_SENT, will_be_sent("R1", "https://a.test/ad.js"));
        page_event(
            &remote,
            methods::REQUEST_PAUSED,
            json!({
                "requestId": "interception-1",
                "request": { "url": "https://a.test/ad.js", "method": "GET", "headers": {} },
                "networkId": "R1"
            }),
        );

        let request = created.next_event().await.expect("request");
        assert_eq!(request.interception_id().map(InterceptionId::as_str), Some("interception-1"));

        let abort = tokio::spawn({
            let manager = manager.clone();
            let request = request.clone();
            async move { manager.abort_request(&request, ErrorReason::Aborted).await }
        });
        let command = answer(&mut remote, "Fetch.failRequest", json!({})).await;
        assert_eq!(command["params"]["requestId"], "interception-1");
        assert_eq!(command["params"]["errorReason"], "Aborted");
        abort.await.expect("join").expect("abort");

        page_event(
            &remote,
            methods::LOADING_FAILED,
            json!({ "requestId": "R1", "errorText": "net::ERR_ABORTED" }),
        );
        sync(&manager, &mut remote).await;

        assert_eq!(request.state(), RequestState::Failed);
        assert_eq!(request.failure().as_deref(), Some("net::ERR_ABORTED"));
        assert_eq!(manager.in_flight_count(), 0);
        assert_eq!(responses.load(Ordering::SeqCst), 0);
        assert_eq!(failed.load(Ordering::SeqCst), 1);

        let again = manager.abort_request(&request, ErrorReason::Failed).await;
        assert!(matches!(again, Err(Error::InterceptionHandled { .. })));
    }

    #[tokio::test]
    async fn test_paused_before_will_be_sent() {
        let (_connection, session, mut remote) = attached_page().await;
        let manager = NetworkManager::new(session);
        enable_interception(&manager, &mut remote).await;
        let requests = counter(&manager, NetworkEvent::Request);

        page_event(
            &remote,
            methods::REQUEST_PAUSED,
            json!({
                "requestId": "interception-7",
                "request": { "url": "https://a.test/", "method": "GET", "headers": {} },
                "networkId": "R7"
            }),
        );
        sync(&manager, &mut remote).await;
        assert_eq!(requests.load(Ordering::SeqCst), 0);

        page_event(&remote, methods::REQUEST_WILL_BE_SENT, will_be_sent("R7", "https://a.test/"));
        sync(&manager, &mut remote).await;

        assert_eq!(requests.load(Ordering::SeqCst), 1);
        let request = manager.request(&RequestId::from("R7")).expect("request");
        assert_eq!(request.interception_id().map(InterceptionId::as_str), Some("interception-7"));
        assert!(!request.is_handled());
    }

    #[tokio::test]
    async fn test_handler_decides_each_request_once() {
        let (_connection, session, mut remote) = attached_page().await;
        let manager = NetworkManager::new(session);
        enable_interception(&manager, &mut remote).await;

        manager.set_request_handler(|request| {
            if request.url().ends_with(".png") {
                InterceptDecision::abort(ErrorReason::BlockedByClient)
            } else {
                InterceptDecision::respond(SyntheticResponse::new(200).body("ok"))
            }
        });

        for (id, url) in [("R1", "https://a.test/x.png"), ("R2", "https://a.test/api")] {
            page_event(&remote, methods::REQUEST_WILL_BE_SENT, will_be_sent(id, url));
            page_event(
                &remote,
                methods::REQUEST_PAUSED,
                json!({
                    "requestId": format!("i-{id}"),
                    "request": { "url": url, "method": "GET", "headers": {} },
                    "networkId": id
                }),
            );
        }

        let first = expect_command(&mut remote, "Fetch.failRequest").await;
        assert_eq!(first["params"]["requestId"], "i-R1");
        assert_eq!(first["params"]["errorReason"], "BlockedByClient");
        let second = expect_command(&mut remote, "Fetch.fulfillRequest").await;
        assert_eq!(second["params"]["requestId"], "i-R2");
        assert_eq!(second["params"]["body"], "b2s=");

        assert!(manager.request(&RequestId::from("R1")).expect("R1").is_handled());
        assert!(remote.try_recv_command().is_none());
    }

    #[tokio::test]
    async fn test_panicking_handler_aborts_request() {
        let (_connection, session, mut remote) = attached_page().await;
        let manager = NetworkManager::new(session);
        enable_interception(&manager, &mut remote).await;
        manager.set_request_handler(|_| panic!("handler bug"));

        page_event(&remote, methods::REQUEST_WILL_BE_SENT, will_be_sent("R1", "https://a.test/"));
        page_event(
            &remote,
            methods::REQUEST_PAUSED,
            json!({
                "requestId": "i-1",
                "request": { "url": "https://a.test/", "method": "GET", "headers": {} },
                "networkId": "R1"
            }),
        );

        let command = expect_command(&mut remote, "Fetch.failRequest").await;
        assert_eq!(command["params"]["errorReason"], "Failed");
    }

    #[tokio::test]
    async fn test_data_urls_are_not_paused() {
        let (_connection, session, mut remote) = attached_page().await;
        let manager = NetworkManager::new(session);
        enable_interception(&manager, &mut remote).await;
        let requests = counter(&manager, NetworkEvent::Request);

        page_event(&remote, methods::REQUEST_WILL_BE_SENT, will_be_sent("R1", "data:text/plain,hi"));
        sync(&manager, &mut remote).await;

        assert_eq!(requests.load(Ordering::SeqCst), 1);
        let request = manager.request(&RequestId::from("R1")).expect("request");
        assert!(request.interception_id().is_none());
    }

    #[tokio::test]
    async fn test_redirect_chain() {
        let (_connection, session, mut remote) = attached_page().await;
        let manager = NetworkManager::new(session);
        let finished = counter(&manager, NetworkEvent::RequestFinished);

        page_event(&remote, methods::REQUEST_WILL_BE_SENT, will_be_sent("R1", "http://a.test/"));
        let mut hop = will_be_sent("R1", "https://a.test/");
        hop["redirectResponse"] = response("http://a.test/", 301);
        page_event(&remote, methods::REQUEST_WILL_BE_SENT, hop);
        sync(&manager, &mut remote).await;

        let request = manager.request(&RequestId::from("R1")).expect("request");
        assert_eq!(request.url(), "https://a.test/");
        assert_eq!(request.redirect_chain().len(), 1);

        let first = &request.redirect_chain()[0];
        assert_eq!(first.state(), RequestState::Finished);
        assert_eq!(first.response().map(|r| r.status()), Some(301));
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(manager.in_flight_count(), 1);
    }

    #[tokio::test]
    async fn test_served_from_cache_marks_response() {
        let (_connection, session, mut remote) = attached_page().await;
        let manager = NetworkManager::new(session);
        let mut responses = manager.events(NetworkEvent::Response);

        page_event(&remote, methods::REQUEST_WILL_BE_SENT, will_be_sent("R1", "https://a.test/"));
        page_event(&remote, methods::REQUEST_SERVED_FROM_CACHE, json!({ "requestId": "R1" }));
        page_event(
            &remote,
            methods::RESPONSE_RECEIVED,
            json!({ "requestId": "R1", "response": response("https://a.test/", 200) }),
        );

        let request = responses.next_event().await.expect("response");
        assert!(request.response().expect("response").from_cache());
    }

    #[tokio::test]
    async fn test_auth_challenge_answers() {
        let (_connection, session, mut remote) = attached_page().await;
        let manager = NetworkManager::new(session);

        let auth = tokio::spawn({
            let manager = manager.clone();
            async move { manager.authenticate(Some(Credentials::new("user", "pass"))).await }
        });
        answer(&mut remote, "Network.setCacheDisabled", json!({})).await;
        answer(&mut remote, "Fetch.enable", json!({})).await;
        auth.await.expect("join").expect("authenticate");

        let challenge = json!({
            "requestId": "i-1",
            "request": { "url": "https://a.test/", "method": "GET", "headers": {} },
            "authChallenge": { "origin": "https://a.test", "scheme": "basic", "realm": "r" }
        });

        page_event(&remote, methods::AUTH_REQUIRED, challenge.clone());
        let first = expect_command(&mut remote, "Fetch.continueWithAuth").await;
        assert_eq!(first["params"]["authChallengeResponse"]["response"], "ProvideCredentials");
        assert_eq!(first["params"]["authChallengeResponse"]["username"], "user");

        page_event(&remote, methods::AUTH_REQUIRED, challenge);
        let second = expect_command(&mut remote, "Fetch.continueWithAuth").await;
        assert_eq!(second["params"]["authChallengeResponse"]["response"], "CancelAuth");
    }

    #[tokio::test]
    async fn test_auth_only_interception_continues_paused_requests() {
        let (_connection, session, mut remote) = attached_page().await;
        let manager = NetworkManager::new(session);

        let auth = tokio::spawn({
            let manager = manager.clone();
            async move { manager.authenticate(Some(Credentials::new("u", "p"))).await }
        });
        answer(&mut remote, "Network.setCacheDisabled", json!({})).await;
        answer(&mut remote, "Fetch.enable", json!({})).await;
        auth.await.expect("join").expect("authenticate");

        page_event(
            &remote,
            methods::REQUEST_PAUSED,
            json!({
                "requestId": "i-9",
                "request": { "url": "https://a.test/", "method": "GET", "headers": {} },
                "networkId": "R9"
            }),
        );
        let command = expect_command(&mut remote, "Fetch.continueRequest").await;
        assert_eq!(command["params"], json!({ "requestId": "i-9" }));
        assert!(command_id(&command).is_some());
    }

    #[tokio::test]
    async fn test_auth_only_pauses_reject_a_second_decision() {
        let (_connection, session, mut remote) = attached_page().await;
        let manager = NetworkManager::new(session);

        let auth = tokio::spawn({
            let manager = manager.clone();
            async move { manager.authenticate(Some(Credentials::new("u", "p"))).await }
        });
        answer(&mut remote, "Network.setCacheDisabled", json!({})).await;
        answer(&mut remote, "Fetch.enable", json!({})).await;
        auth.await.expect("join").expect("authenticate");

        // R1 announced before its pause, R2 paused before its announcement.
        page_event(&remote, methods::REQUEST_WILL_BE_SENT, will_be_sent("R1", "https://a.test/"));
        page_event(
            &remote,
            methods::REQUEST_PAUSED,
            json!({
                "requestId": "i-1",
                "request": { "url": "https://a.test/", "method": "GET", "headers": {} },
                "networkId": "R1"
            }),
        );
        page_event(
            &remote,
            methods::REQUEST_PAUSED,
            json!({
                "requestId": "i-2",
                "request": { "url": "https://a.test/b", "method": "GET", "headers": {} },
                "networkId": "R2"
            }),
        );
        page_event(&remote, methods::REQUEST_WILL_BE_SENT, will_be_sent("R2", "https://a.test/b"));

        let first = expect_command(&mut remote, "Fetch.continueRequest").await;
        assert_eq!(first["params"]["requestId"], "i-1");
        let second = expect_command(&mut remote, "Fetch.continueRequest").await;
        assert_eq!(second["params"]["requestId"], "i-2");
        sync(&manager, &mut remote).await;

        for id in ["R1", "R2"] {
            let request = manager.request(&RequestId::from(id)).expect("in flight");
            assert!(request.interception_id().is_some());
            assert!(request.is_handled());

            let again = manager.abort_request(&request, ErrorReason::Failed).await;
            assert!(matches!(again, Err(Error::InterceptionHandled { .. })));
        }
        assert!(remote.try_recv_command().is_none());
    }

    #[tokio::test]
    async fn test_unmatched_correlation_entries_are_dropped() {
        let (_connection, session, mut remote) = attached_page().await;
        let manager = NetworkManager::new(session);
        enable_interception(&manager, &mut remote).await;
        let requests = counter(&manager, NetworkEvent::Request);

        // Announced, then failed before it was ever paused.
        page_event(&remote, methods::REQUEST_WILL_BE_SENT, will_be_sent("R1", "https://a.test/"));
        page_event(
            &remote,
            methods::LOADING_FAILED,
            json!({ "requestId": "R1", "errorText": "net::ERR_ABORTED" }),
        );
        // Paused, then finished without an announcement.
        page_event(
            &remote,
            methods::REQUEST_PAUSED,
            json!({
                "requestId": "i-2",
                "request": { "url": "https://a.test/b", "method": "GET", "headers": {} },
                "networkId": "R2"
            }),
        );
        page_event(&remote, methods::LOADING_FINISHED, json!({ "requestId": "R2" }));
        sync(&manager, &mut remote).await;

        {
            let state = manager.inner.state.lock();
            assert!(state.will_be_sent.is_empty());
            assert!(state.paused.is_empty());
        }

        // Still waiting for a pause when interception goes off.
        page_event(&remote, methods::REQUEST_WILL_BE_SENT, will_be_sent("R3", "https://a.test/c"));
        sync(&manager, &mut remote).await;
        assert_eq!(requests.load(Ordering::SeqCst), 0);

        let disable = tokio::spawn({
            let manager = manager.clone();
            async move { manager.set_request_interception(false).await }
        });
        let cache = answer(&mut remote, "Network.setCacheDisabled", json!({})).await;
        assert_eq!(cache["params"]["cacheDisabled"], false);
        answer(&mut remote, "Fetch.disable", json!({})).await;
        disable.await.expect("join").expect("disable");

        assert_eq!(requests.load(Ordering::SeqCst), 1);
        let request = manager.request(&RequestId::from("R3")).expect("released");
        assert!(request.interception_id().is_none());
        assert!(manager.inner.state.lock().will_be_sent.is_empty());
    }

    #[tokio::test]
    async fn test_config_commands() {
        let (_connection, session, mut remote) = attached_page().await;
        let manager = NetworkManager::new(session);

        let task = tokio::spawn({
            let manager = manager.clone();
            async move {
                let mut headers = Headers::default();
                headers.insert("X-Trace".to_string(), "1".to_string());
                manager.set_extra_http_headers(headers).await?;
                manager.set_offline_mode(true).await?;
                manager.set_offline_mode(true).await?;
                manager.set_user_agent("bot/1.0").await?;
                manager.set_cache_enabled(false).await
            }
        });

        let headers = answer(&mut remote, "Network.setExtraHTTPHeaders", json!({})).await;
        assert_eq!(headers["params"]["headers"], json!({ "x-trace": "1" }));
        let offline = answer(&mut remote, "Network.emulateNetworkConditions", json!({})).await;
        assert_eq!(offline["params"]["offline"], true);
        assert_eq!(offline["params"]["downloadThroughput"], -1.0);
        answer(&mut remote, "Network.setUserAgentOverride", json!({})).await;
        let cache = answer(&mut remote, "Network.setCacheDisabled", json!({})).await;
        assert_eq!(cache["params"]["cacheDisabled"], true);

        task.await.expect("join").expect("config");
        assert!(manager.is_offline());
        assert!(manager.extra_http_headers().contains_key("x-trace"));
    }

    #[tokio::test]
    async fn test_session_close_closes_emitter() {
        let (connection, session, _remote) = attached_page().await;
        let manager = NetworkManager::new(session);
        let mut stream = manager.events(NetworkEvent::Request);

        connection.close();
        assert!(stream.next_event().await.is_none());
        assert!(manager.emitter().is_closed());
    }
}
