use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use url::Url;

use crate::error::ApiError;

pub const DEFAULT_USER_AGENT: &str = concat!("cinemate-api/", env!("CARGO_PKG_VERSION"));

/// Well-known backend address, used when no valid override is configured.
pub const DEFAULT_BASE_URL: &str = "http://cinemate.ddns.net:8081/api/v1";

/// Environment variable that overrides the backend base URL. Honored only
/// when it holds an absolute http(s) URL.
pub const BASE_URL_ENV: &str = "CINEMATE_API_BASE_URL";

/// Configurable options for the API client.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Base URL all request paths are joined onto, e.g.
    /// `http://cinemate.ddns.net:8081/api/v1`.
    pub base_url: String,

    /// Overall timeout for the entire HTTP request.
    ///
    /// Also bounds a hung refresh call: when the transport times out, the
    /// refresh is treated as failed and the dispatcher leaves `REFRESHING`.
    pub timeout: Duration,

    /// Connection timeout (time to establish the initial connection).
    pub connect_timeout: Duration,

    /// User agent string.
    pub user_agent: String,

    /// Headers attached to every request. Per-request headers take
    /// precedence on conflict.
    pub default_headers: HeaderMap,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            default_headers: ApiConfig::get_default_headers(),
        }
    }
}

impl ApiConfig {
    /// Build a config from the environment, falling back to the well-known
    /// backend address when the override is absent or not an absolute
    /// http(s) URL.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = std::env::var(BASE_URL_ENV) {
            let value = value.trim();
            if value.to_ascii_lowercase().starts_with("http") {
                config.base_url = value.trim_end_matches('/').to_owned();
            }
        }
        config
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Self {
            base_url,
            ..Self::default()
        }
    }

    /// Join a request path onto the base URL.
    pub fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
        let joined = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        Url::parse(&joined).map_err(|e| ApiError::invalid_url(joined.clone(), e.to_string()))
    }

    pub fn get_default_headers() -> HeaderMap {
        let mut default_headers = HeaderMap::new();

        default_headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        default_headers.insert(
            reqwest::header::ACCEPT,
            HeaderValue::from_static("application/json"),
        );

        default_headers
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_paths_onto_base() {
        let config = ApiConfig::with_base_url("http://example.com/api/v1/");
        let url = config.endpoint("/auth/login").unwrap();
        assert_eq!(url.as_str(), "http://example.com/api/v1/auth/login");

        let url = config.endpoint("contents").unwrap();
        assert_eq!(url.as_str(), "http://example.com/api/v1/contents");
    }

    #[test]
    fn default_base_url_points_at_backend() {
        let config = ApiConfig::default();
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn endpoint_rejects_relative_base() {
        let config = ApiConfig::with_base_url("not-a-url");
        assert!(matches!(
            config.endpoint("/auth/login"),
            Err(ApiError::InvalidUrl { .. })
        ));
    }
}
