use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("request failed with HTTP {status} for {url}")]
    HttpStatus { status: StatusCode, url: String },

    #[error("failed to decode response body: {source}")]
    Decode {
        #[from]
        source: serde_json::Error,
    },

    #[error("invalid header value: {reason}")]
    InvalidHeader { reason: String },

    /// The session can no longer be recovered: the refresh call failed, or a
    /// request replayed with a fresh token was rejected again. Credentials
    /// have been cleared; the caller must route the user back to login.
    #[error("re-authentication required")]
    SessionExpired,

    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl ApiError {
    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }

    pub fn http_status(status: StatusCode, url: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            url: url.into(),
        }
    }

    pub fn invalid_header(reason: impl Into<String>) -> Self {
        Self::InvalidHeader {
            reason: reason.into(),
        }
    }

    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// True when the caller should redirect to a login surface.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}

/// Failure of the credential persistence backend. Non-fatal by design: the
/// in-memory copy stays authoritative for the current session.
#[derive(Debug, thiserror::Error)]
#[error("credential storage error: {reason}")]
pub struct StorageError {
    pub reason: String,
}

impl StorageError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        Self::new(err.to_string())
    }
}
