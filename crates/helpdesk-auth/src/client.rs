//! REST calls that issue, validate, and refresh sessions.
//!
//! All endpoints live under the configured API base URL:
//!
//! | call | method + path | body → response |
//! |---|---|---|
//! | login | `POST /auth/login` | `{username, password}` → `{access_token, token_type}` |
//! | current user | `GET /auth/me` | bearer → `User` |
//! | refresh | `POST /auth/refresh` | bearer → `{access_token, token_type}` |
//!
//! Error responses carry a JSON `detail` string.

use std::time::Duration;

use helpdesk_core::User;
use serde::Deserialize;
use tracing::{info, warn};

use crate::errors::AuthError;
use crate::session::SessionStore;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: serde_json::Value,
}

/// Thin client over the help-desk auth endpoints.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client for `base_url` (e.g. `http://127.0.0.1:8000/api/v1`).
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, AuthError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(AuthError::InvalidUrl("empty base URL".into()));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Exchange credentials for a bearer token.
    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<String, AuthError> {
        let resp = self
            .http
            .post(self.url("/auth/login"))
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await?;
        let data: TokenResponse = parse_response(resp).await?;
        Ok(data.access_token)
    }

    /// Fetch the account a token belongs to.
    #[tracing::instrument(skip_all)]
    pub async fn current_user(&self, token: &str) -> Result<User, AuthError> {
        let resp = self
            .http
            .get(self.url("/auth/me"))
            .bearer_auth(token)
            .send()
            .await?;
        parse_response(resp).await
    }

    /// Trade a still-valid token for a fresh one.
    #[tracing::instrument(skip_all)]
    pub async fn refresh_token(&self, token: &str) -> Result<String, AuthError> {
        let resp = self
            .http
            .post(self.url("/auth/refresh"))
            .bearer_auth(token)
            .send()
            .await?;
        let data: TokenResponse = parse_response(resp).await?;
        Ok(data.access_token)
    }

    /// Log in and install the resulting session in `store`.
    pub async fn sign_in(
        &self,
        store: &SessionStore,
        username: &str,
        password: &str,
    ) -> Result<User, AuthError> {
        let token = self.login(username, password).await?;
        let user = self.current_user(&token).await?;
        store.establish(token, user.clone());
        Ok(user)
    }

    /// Validate a saved token and install it as the session.
    ///
    /// An invalid token leaves the store logged out.
    pub async fn restore(&self, store: &SessionStore, token: &str) -> Result<User, AuthError> {
        match self.current_user(token).await {
            Ok(user) => {
                store.establish(token, user.clone());
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, "saved token rejected, clearing session");
                store.clear();
                Err(e)
            }
        }
    }

    /// Refresh the active session's token. Failure logs the user out.
    pub async fn refresh(&self, store: &SessionStore) -> Result<(), AuthError> {
        let token = store.token().ok_or(AuthError::NotAuthenticated)?;
        match self.refresh_token(&token).await {
            Ok(fresh) => {
                store.replace_token(fresh);
                info!("session token refreshed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "token refresh failed, logging out");
                store.clear();
                Err(e)
            }
        }
    }
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    resp: reqwest::Response,
) -> Result<T, AuthError> {
    let status = resp.status();
    let body = resp.text().await?;
    if !status.is_success() {
        return Err(AuthError::Rejected {
            status: status.as_u16(),
            detail: error_detail(&body),
        });
    }
    Ok(serde_json::from_str(&body)?)
}

/// Pull a readable message out of an error body.
///
/// Validation errors arrive with `detail` as an array of objects; those are
/// passed through as JSON text.
fn error_detail(body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            detail: serde_json::Value::String(s),
        }) => s,
        Ok(ErrorBody { detail }) => detail.to_string(),
        Err(_) => body.to_string(),
    }
}
