use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::credentials::TokenPair;
use crate::dispatch::Dispatcher;
use crate::error::ApiError;
use crate::request::ApiRequest;

/// JWT pair as returned by the auth endpoints.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthTokens {
    access_token: String,
    refresh_token: String,
}

/// Typed wrapper over the backend's `/auth/*` endpoints.
///
/// Successful register/login/OAuth-pickup calls store the returned pair in
/// the dispatcher's credential store; logout clears it.
pub struct AuthApi {
    dispatcher: Arc<Dispatcher>,
}

impl AuthApi {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }

    /// `POST /auth/register`, returns and stores the issued pair.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<TokenPair, ApiError> {
        let request = ApiRequest::post("/auth/register").json(json!({
            "email": email,
            "password": password,
            "confirmPassword": confirm_password,
        }));
        self.fetch_and_store("/auth/register", request).await
    }

    /// `POST /auth/login` with HTTP Basic credentials. Opts out of bearer
    /// auth so a stale stored token cannot leak into the login call.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair, ApiError> {
        let basic = BASE64.encode(format!("{email}:{password}"));
        let request = ApiRequest::post("/auth/login")
            .header("authorization", &format!("Basic {basic}"))
            .anonymous();
        self.fetch_and_store("/auth/login", request).await
    }

    /// `GET /auth/tokens?state=…` — anonymous pickup of the pair minted by
    /// an OAuth callback.
    pub async fn tokens_by_state(&self, state: &str) -> Result<TokenPair, ApiError> {
        let request = ApiRequest::get("/auth/tokens")
            .query("state", state)
            .anonymous();
        self.fetch_and_store("/auth/tokens", request).await
    }

    /// `POST /auth/logout`, then wipe local credentials. The local wipe
    /// happens even when the backend call fails; a dead session is not
    /// worth keeping either way.
    pub async fn logout(&self) -> Result<(), ApiError> {
        if let Some(refresh_token) = self.dispatcher.credentials().refresh_token() {
            let request =
                ApiRequest::post("/auth/logout").json(json!({ "refreshToken": refresh_token }));
            match self.dispatcher.dispatch(request).await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    warn!(status = %response.status(), "Logout rejected by backend; clearing locally");
                }
                Err(e) => {
                    warn!(error = %e, "Logout call failed; clearing locally");
                }
            }
        }
        self.dispatcher.credentials().clear();
        Ok(())
    }

    /// `POST /auth/forgot-password` — emails a reset link.
    pub async fn forgot_password(&self, email: &str) -> Result<(), ApiError> {
        let request = ApiRequest::post("/auth/forgot-password").json(json!({ "email": email }));
        self.dispatcher
            .dispatch(request)
            .await?
            .error_for_status("/auth/forgot-password")?;
        Ok(())
    }

    /// `POST /auth/reset-password` with the token from the reset link.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), ApiError> {
        let request = ApiRequest::post("/auth/reset-password").json(json!({
            "token": token,
            "newPassword": new_password,
        }));
        self.dispatcher
            .dispatch(request)
            .await?
            .error_for_status("/auth/reset-password")?;
        Ok(())
    }

    async fn fetch_and_store(
        &self,
        endpoint: &str,
        request: ApiRequest,
    ) -> Result<TokenPair, ApiError> {
        let response = self
            .dispatcher
            .dispatch(request)
            .await?
            .error_for_status(endpoint)?;
        let tokens: AuthTokens = response.json()?;
        let pair = TokenPair::new(tokens.access_token, tokens.refresh_token);
        self.dispatcher.credentials().set(pair.clone());
        Ok(pair)
    }
}
