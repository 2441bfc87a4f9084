use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ApiError;

/// Whether the dispatcher attaches the stored access token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthMode {
    /// Attach `Authorization: Bearer <access token>` when a token is held,
    /// and recover from 401 via the refresh protocol.
    #[default]
    Bearer,
    /// Send the request as-is. Escape hatch for calls that must go out
    /// anonymously (public reference data, Basic-auth login). 401s on these
    /// requests pass through untouched.
    None,
}

/// A fully-formed request description, relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
    pub auth: AuthMode,
    /// Set once the request has been replayed after a refresh. A 401 on a
    /// marked request is terminal; it never triggers a second refresh.
    pub(crate) retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            query: Vec::new(),
            body: None,
            auth: AuthMode::default(),
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Attach a JSON body.
    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Insert an arbitrary header. Invalid names or values are skipped.
    pub fn header(mut self, key: &str, value: &str) -> Self {
        match (HeaderName::try_from(key), HeaderValue::from_str(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => {
                debug!(key, "Invalid header; skipping");
            }
        }
        self
    }

    /// Opt out of auto-authentication for this request.
    pub fn anonymous(mut self) -> Self {
        self.auth = AuthMode::None;
        self
    }

    pub(crate) fn mark_retried(mut self) -> Self {
        self.retried = true;
        self
    }
}

/// A terminal HTTP response: status, headers, and the buffered body.
///
/// Non-2xx statuses are still plain responses; callers that want them as
/// errors use [`error_for_status`](ApiResponse::error_for_status).
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn bytes(&self) -> &Bytes {
        &self.body
    }

    /// Deserialize the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        Ok(serde_json::from_slice(&self.body)?)
    }

    /// Map non-2xx statuses to [`ApiError::HttpStatus`]. `url` names the
    /// endpoint for the error message; the body is dropped.
    pub fn error_for_status(self, url: &str) -> Result<ApiResponse, ApiError> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(ApiError::http_status(self.status, url))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_collects_query_and_headers() {
        let request = ApiRequest::get("/auth/tokens")
            .query("state", "xyz")
            .header("x-request-id", "42")
            .anonymous();

        assert_eq!(request.method, Method::GET);
        assert_eq!(request.query, vec![("state".into(), "xyz".into())]);
        assert_eq!(request.headers.get("x-request-id").unwrap(), "42");
        assert_eq!(request.auth, AuthMode::None);
        assert!(!request.retried);
    }

    #[test]
    fn invalid_header_is_skipped() {
        let request = ApiRequest::get("/x").header("bad name", "v");
        assert!(request.headers.is_empty());
    }

    #[test]
    fn error_for_status_passes_success_and_maps_failures() {
        let ok = ApiResponse::new(StatusCode::OK, HeaderMap::new(), Bytes::new());
        assert!(ok.error_for_status("/x").is_ok());

        let bad = ApiResponse::new(StatusCode::BAD_REQUEST, HeaderMap::new(), Bytes::new());
        assert!(matches!(
            bad.error_for_status("/x"),
            Err(ApiError::HttpStatus { status, .. }) if status == StatusCode::BAD_REQUEST
        ));
    }
}
