//! Explicitly constructed backend client shared by the storage, table and
//! reachability services.

use std::sync::Arc;

use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::assets::path::normalize_base_url;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub access_token: String,
    pub user_id: String,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("sign-in rejected: HTTP {status} {body}")]
    Rejected { status: u16, body: String },
    #[error("sign-in response did not include a user")]
    MissingUser,
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    user: Option<TokenUser>,
}

#[derive(Debug, Deserialize)]
struct TokenUser {
    id: String,
}

#[derive(Clone, Debug)]
pub struct BackendClient {
    http: Client,
    base_url: String,
    api_key: String,
    session: Arc<RwLock<Option<Session>>>,
}

impl BackendClient {
    pub fn new(base_url: &str, api_key: impl Into<String>) -> Self {
        Self {
            http: Client::new(),
            base_url: normalize_base_url(base_url),
            api_key: api_key.into(),
            session: Arc::new(RwLock::new(None)),
        }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn set_session(&self, session: Option<Session>) {
        *self.session.write().await = session;
    }

    pub async fn user_id(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|session| session.user_id.clone())
    }

    /// Attach the project key and the caller's bearer token (or the project
    /// key when signed out).
    pub async fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let token = self
            .session
            .read()
            .await
            .as_ref()
            .map(|session| session.access_token.clone())
            .unwrap_or_else(|| self.api_key.clone());
        request.header("apikey", &self.api_key).bearer_auth(token)
    }

    pub async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, AuthError> {
        let response = self
            .http
            .post(self.endpoint("auth/v1/token?grant_type=password"))
            .header("apikey", &self.api_key)
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        let payload: TokenResponse = response.json().await?;
        let user = payload.user.ok_or(AuthError::MissingUser)?;
        let session = Session {
            access_token: payload.access_token,
            user_id: user.id,
        };
        info!(user_id = %session.user_id, "signed in");
        self.set_session(Some(session.clone())).await;
        Ok(session)
    }
}
