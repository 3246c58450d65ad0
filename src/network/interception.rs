//! Interception decision types.
//!
//! Every paused request receives exactly one [`InterceptDecision`]:
//!
//! ```ignore
//! use cdp_session::{ErrorReason, InterceptDecision, SyntheticResponse};
//!
//! network.set_request_handler(|req| {
//!     if req.url().contains("ads") {
//!         InterceptDecision::abort(ErrorReason::BlockedByClient)
//!     } else if req.url().ends_with("/config.json") {
//!         InterceptDecision::respond(SyntheticResponse::new(200).json(r#"{"mock":true}"#))
//!     } else {
//!         InterceptDecision::proceed()
//!     }
//! });
//! ```

// ============================================================================
// Imports
// ============================================================================

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

use crate::identifiers::InterceptionId;
use crate::protocol::{ErrorReason, FetchCommand, HeaderEntry, Headers};

// ============================================================================
// Credentials
// ============================================================================

/// HTTP authentication credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Username.
    pub username: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Creates credentials.
    #[inline]
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

// ============================================================================
// ContinueOverrides
// ============================================================================

/// Changes applied when continuing a paused request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContinueOverrides {
    /// Replacement URL.
    pub url: Option<String>,
    /// Replacement method.
    pub method: Option<String>,
    /// Replacement body.
    pub post_data: Option<Vec<u8>>,
    /// Replacement headers.
    pub headers: Option<Headers>,
}

impl ContinueOverrides {
    /// Sets the URL.
    #[inline]
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the method.
    #[inline]
    #[must_use]
    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    /// Sets the body.
    #[inline]
    #[must_use]
    pub fn post_data(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.post_data = Some(body.into());
        self
    }

    /// Sets the full header set.
    #[inline]
    #[must_use]
    pub fn headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }
}

// ============================================================================
// SyntheticResponse
// ============================================================================

/// A response served in place of the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticResponse {
    /// HTTP status.
    pub status: u16,
    /// Response headers.
    pub headers: Headers,
    /// `Content-Type`, added to the headers when set.
    pub content_type: Option<String>,
    /// Body bytes.
    pub body: Vec<u8>,
}

impl SyntheticResponse {
    /// Creates an empty response with `status`.
    #[must_use]
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Headers::default(),
            content_type: None,
            body: Vec::new(),
        }
    }

    /// Adds a header.
    #[inline]
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Sets the content type.
    #[inline]
    #[must_use]
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets the body.
    #[inline]
    #[must_use]
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Sets a JSON body and content type.
    #[must_use]
    pub fn json(self, body: impl Into<Vec<u8>>) -> Self {
        self.content_type("application/json").body(body)
    }

    /// Header list sent on the wire, including `content-type` and
    /// `content-length` when not given explicitly.
    fn header_entries(&self) -> Vec<HeaderEntry> {
        let mut entries: Vec<HeaderEntry> = self
            .headers
            .iter()
            .map(|(name, value)| HeaderEntry::new(name.clone(), value.clone()))
            .collect();

        let has = |name: &str| self.headers.keys().any(|k| k.eq_ignore_ascii_case(name));

        if let Some(content_type) = &self.content_type
            && !has("content-type")
        {
            entries.push(HeaderEntry::new("content-type", content_type.clone()));
        }
        if !self.body.is_empty() && !has("content-length") {
            entries.push(HeaderEntry::new("content-length", self.body.len().to_string()));
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }
}

// ============================================================================
// InterceptDecision
// ============================================================================

/// What to do with a paused request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterceptDecision {
    /// Let the request proceed, optionally modified.
    Continue(ContinueOverrides),
    /// Fail the request with a network error.
    Abort(ErrorReason),
    /// Answer with a synthetic response.
    Respond(SyntheticResponse),
}

impl InterceptDecision {
    /// Continues unchanged.
    #[inline]
    #[must_use]
    pub fn proceed() -> Self {
        Self::Continue(ContinueOverrides::default())
    }

    /// Aborts with `reason`.
    #[inline]
    #[must_use]
    pub fn abort(reason: ErrorReason) -> Self {
        Self::Abort(reason)
    }

    /// Responds with `response`.
    #[inline]
    #[must_use]
    pub fn respond(response: SyntheticResponse) -> Self {
        Self::Respond(response)
    }

    /// Builds the `Fetch` command that carries this decision.
    #[must_use]
    pub fn into_command(self, interception_id: InterceptionId) -> FetchCommand {
        match self {
            Self::Continue(overrides) => FetchCommand::ContinueRequest {
                request_id: interception_id,
                url: overrides.url,
                method: overrides.method,
                post_data: overrides.post_data.map(|body| BASE64.encode(body)),
                headers: overrides.headers.map(|headers| {
                    let mut entries: Vec<HeaderEntry> = headers
                        .into_iter()
                        .map(|(name, value)| HeaderEntry::new(name, value))
                        .collect();
                    entries.sort_by(|a, b| a.name.cmp(&b.name));
                    entries
                }),
            },

            Self::Abort(reason) => FetchCommand::FailRequest {
                request_id: interception_id,
                error_reason: reason,
            },

            Self::Respond(response) => FetchCommand::FulfillRequest {
                request_id: interception_id,
                response_code: response.status,
                response_headers: response.header_entries(),
                body: (!response.body.is_empty()).then(|| BASE64.encode(&response.body)),
            },
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
