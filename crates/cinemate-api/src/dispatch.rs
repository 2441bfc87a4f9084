use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use serde::Deserialize;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::ApiConfig;
use crate::credentials::CredentialStore;
use crate::error::ApiError;
use crate::request::{ApiRequest, ApiResponse, AuthMode};
use crate::transport::{HttpTransport, ReqwestTransport, WireRequest};

/// Token refresh endpoint, relative to the base URL.
pub const REFRESH_PATH: &str = "/auth/update-access-token";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    /// The backend may rotate the refresh token or keep the old one valid,
    /// in which case this field is omitted.
    #[serde(default)]
    refresh_token: Option<String>,
}

/// A request that observed a 401 while a refresh was already in flight.
/// Replayed (or rejected) exactly once, when that refresh settles.
struct PendingRequest {
    request: ApiRequest,
    done: oneshot::Sender<Result<ApiResponse, ApiError>>,
}

#[derive(Default)]
struct RefreshState {
    /// True for the entire span of the single in-flight refresh call.
    in_progress: bool,
    queue: Vec<PendingRequest>,
}

/// Authenticated request dispatcher.
///
/// Every outbound call goes through [`dispatch`](Dispatcher::dispatch): the
/// stored access token is attached, a 401 triggers at most one concurrent
/// token refresh, and requests that hit 401 during the refresh window are
/// queued and replayed in arrival order once the new pair is stored. A
/// failed refresh clears the credentials and surfaces
/// [`ApiError::SessionExpired`] to every affected caller.
///
/// One instance per application process; all state is owned by the instance
/// so tests can construct a fresh one per case.
pub struct Dispatcher {
    config: ApiConfig,
    transport: Arc<dyn HttpTransport>,
    credentials: Arc<CredentialStore>,
    refresh: Mutex<RefreshState>,
}

impl Dispatcher {
    pub fn new(config: ApiConfig, credentials: Arc<CredentialStore>) -> Result<Self, ApiError> {
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        Ok(Self::with_transport(config, transport, credentials))
    }

    pub fn with_transport(
        config: ApiConfig,
        transport: Arc<dyn HttpTransport>,
        credentials: Arc<CredentialStore>,
    ) -> Self {
        Self {
            config,
            transport,
            credentials,
            refresh: Mutex::new(RefreshState::default()),
        }
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Issue a request, refreshing the access token transparently on 401.
    ///
    /// Terminal HTTP responses are returned as-is, whatever their status;
    /// only transport failures and an unrecoverable session map to `Err`.
    pub async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let response = self.send(&request).await?;

        // Anonymous calls carry no token, so a 401 on them is not an expiry
        // signal. Everything except an authenticated 401 is the caller's
        // problem, not ours.
        if request.auth == AuthMode::None || response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        // Refresh-or-queue. The lock is never held across an await.
        let waiter = {
            let mut state = self.refresh.lock();
            if state.in_progress {
                let (tx, rx) = oneshot::channel();
                state.queue.push(PendingRequest {
                    request: request.clone().mark_retried(),
                    done: tx,
                });
                Some(rx)
            } else {
                state.in_progress = true;
                None
            }
        };

        match waiter {
            Some(rx) => {
                debug!(path = %request.path, "Queued behind in-flight token refresh");
                rx.await.map_err(|_| {
                    ApiError::internal("pending request dropped before refresh settled")
                })?
            }
            None => self.refresh_and_replay(request).await,
        }
    }

    /// Run the single refresh cycle: call the refresh endpoint, settle the
    /// flag, drain the queue, then replay the triggering request.
    async fn refresh_and_replay(&self, original: ApiRequest) -> Result<ApiResponse, ApiError> {
        info!(path = %original.path, "Access token rejected; refreshing");
        let outcome = self.call_refresh_endpoint().await;

        // Settle before touching the network again: from here on, new 401s
        // start their own cycle instead of piling into a dead queue.
        let drained = {
            let mut state = self.refresh.lock();
            state.in_progress = false;
            std::mem::take(&mut state.queue)
        };

        match outcome {
            Ok(tokens) => {
                self.credentials
                    .rotate(tokens.access_token, tokens.refresh_token);
                info!(queued = drained.len(), "Token refresh succeeded; replaying");
                for pending in drained {
                    let result = self.resend(pending.request).await;
                    // A closed receiver means the caller stopped waiting.
                    let _ = pending.done.send(result);
                }
                self.resend(original.mark_retried()).await
            }
            Err(e) => {
                warn!(queued = drained.len(), error = %e, "Token refresh failed; session invalid");
                self.credentials.clear();
                for pending in drained {
                    let _ = pending.done.send(Err(ApiError::SessionExpired));
                }
                Err(ApiError::SessionExpired)
            }
        }
    }

    /// Exchange the stored refresh token for a new pair. Goes straight
    /// through the transport so it can never re-enter the dispatcher.
    async fn call_refresh_endpoint(&self) -> Result<RefreshResponse, ApiError> {
        let Some(refresh_token) = self.credentials.refresh_token() else {
            return Err(ApiError::SessionExpired);
        };

        // The endpoint expects the refresh token under the `accessToken`
        // field; that is the backend's contract, odd as it reads.
        let request = ApiRequest::post(REFRESH_PATH)
            .json(serde_json::json!({ "accessToken": refresh_token }))
            .anonymous();

        let response = self.transport.execute(self.prepare(&request)?).await?;
        if !response.status().is_success() {
            return Err(ApiError::http_status(response.status(), REFRESH_PATH));
        }
        response.json::<RefreshResponse>()
    }

    /// Replay a request after a successful refresh. A second 401 here means
    /// the server rejects even the fresh token: terminal, no further
    /// refresh.
    async fn resend(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        debug_assert!(request.retried);
        let response = self.send(&request).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(path = %request.path, "Replayed request rejected again; session invalid");
            self.credentials.clear();
            return Err(ApiError::SessionExpired);
        }
        Ok(response)
    }

    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let wire = self.prepare(request)?;
        self.transport.execute(wire).await
    }

    /// Resolve the request against the base URL and attach the bearer token
    /// unless the caller opted out or pre-set `Authorization` itself.
    fn prepare(&self, request: &ApiRequest) -> Result<WireRequest, ApiError> {
        let mut url = self.config.endpoint(&request.path)?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(
                request
                    .query
                    .iter()
                    .map(|(k, v)| (k.as_str(), v.as_str())),
            );
        }

        let mut headers = self.config.default_headers.clone();
        for (name, value) in request.headers.iter() {
            headers.insert(name.clone(), value.clone());
        }

        if request.auth == AuthMode::Bearer
            && !headers.contains_key(AUTHORIZATION)
            && let Some(token) = self.credentials.access_token()
        {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| ApiError::invalid_header(e.to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }

        let body = match &request.body {
            Some(value) => Some(Bytes::from(serde_json::to_vec(value)?)),
            None => None,
        };

        Ok(WireRequest {
            method: request.method.clone(),
            url,
            headers,
            body,
        })
    }
}
