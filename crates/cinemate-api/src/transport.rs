use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderValue};
use url::Url;

use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::request::ApiResponse;

/// A fully prepared outbound request: absolute URL, final headers, and a
/// serialized body. Everything above this layer deals in [`crate::ApiRequest`].
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

impl WireRequest {
    /// Value of the `Authorization` header, if any. Used by tests and logs.
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .get(reqwest::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
    }
}

/// The seam between the dispatcher and the actual HTTP stack.
///
/// Production uses [`ReqwestTransport`]; tests inject scripted backends to
/// drive 401/refresh interleavings deterministically.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute(&self, request: WireRequest) -> Result<ApiResponse, ApiError>;
}

/// Transport backed by a shared `reqwest::Client` built from [`ApiConfig`].
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(config: &ApiConfig) -> Result<Self, ApiError> {
        let user_agent = HeaderValue::from_str(&config.user_agent)
            .map_err(|e| ApiError::invalid_header(e.to_string()))?;

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(config.timeout)
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute(&self, request: WireRequest) -> Result<ApiResponse, ApiError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(ApiResponse::new(status, headers, body))
    }
}
