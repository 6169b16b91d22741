// Copyright (c) 2024-2025 Jesse Morgan
// Licensed under the MIT License. See LICENSE file for details.

//! Portal auth API integration.
//!
//! Thin client over the portal's auth endpoints. The credential itself is an
//! opaque cookie managed by the reqwest cookie jar; this module never reads
//! or stores it directly.
//!
//! # Example
//!
//! ```no_run
//! use tokenwatch::auth::{AuthApi, HttpAuthClient};
//! use std::time::Duration;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = HttpAuthClient::new("https://portal.example.com", Duration::from_secs(30))?;
//!
//! // Validate whatever credential the cookie jar holds
//! let response = client.validate_session().await?;
//! if response.success {
//!     println!("signed in as {:?}", response.session_user());
//! }
//! # Ok(())
//! # }
//! ```

use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::types::{SessionUser, UserRole};

/// Login endpoint path.
const LOGIN_PATH: &str = "/api/v1/auth/login";
/// Credential validation endpoint path.
const VALIDATE_PATH: &str = "/api/v1/auth/validate";
/// Credential refresh endpoint path.
const REFRESH_PATH: &str = "/api/v1/auth/refresh";
/// Logout endpoint path.
const LOGOUT_PATH: &str = "/api/v1/auth/logout";

/// Error types specific to portal auth operations.
#[derive(Debug, Clone)]
pub enum AuthError {
    /// No usable credential (HTTP 400/401). This is the expected state when
    /// nobody is signed in, not a fault.
    Unauthenticated,
    /// The portal answered with an unexpected status or a malformed body.
    Api(String),
    /// Transport-level failure (DNS, connect, timeout).
    Network(String),
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unauthenticated => write!(f, "not authenticated"),
            Self::Api(msg) => write!(f, "portal API error: {}", msg),
            Self::Network(msg) => write!(f, "network error: {}", msg),
        }
    }
}

impl std::error::Error for AuthError {}

/// Response shape shared by the login / validate / refresh endpoints.
///
/// Field names follow the portal's camelCase JSON. Everything beyond
/// `success` is optional: a well-formed "not authenticated" answer carries
/// only `success=false` and a message.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenResponse {
    pub success: bool,
    pub message: String,
    pub user_id: Option<u64>,
    pub email: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    pub expires_in: Option<u64>,
    pub company_id: Option<u64>,
}

impl TokenResponse {
    /// Build a normalized [`SessionUser`] from this response.
    ///
    /// Returns `None` unless both `user_id` and `role` are present — a
    /// success flag without an identity is not an authenticated session.
    pub fn session_user(&self) -> Option<SessionUser> {
        let user_id = self.user_id?;
        let role = self.role.as_deref()?;
        Some(SessionUser {
            user_id: user_id.to_string(),
            email: self.email.clone().unwrap_or_default(),
            name: self.name.clone().unwrap_or_default(),
            role: UserRole::normalize(role),
        })
    }
}

/// The portal auth operations the session layer depends on.
///
/// Defined as a trait so tests can script the remote side. Production code
/// uses [`HttpAuthClient`].
#[async_trait]
pub trait AuthApi: Send + Sync {
    /// Sign in with email and password. The portal sets the credential
    /// cookie on success.
    async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, AuthError>;

    /// Ask the portal whether the current credential is valid, and for whom.
    async fn validate_session(&self) -> Result<TokenResponse, AuthError>;

    /// Silently renew the current credential, resetting its validity window.
    async fn refresh_credential(&self) -> Result<TokenResponse, AuthError>;

    /// Invalidate the credential server-side. Best-effort.
    async fn logout(&self) -> Result<(), AuthError>;
}

/// Client for the portal auth endpoints.
#[derive(Debug, Clone)]
pub struct HttpAuthClient {
    base_url: String,
    client: reqwest::Client,
}

impl HttpAuthClient {
    /// Create a client for the given portal base URL.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(timeout)
            .build()
            .context("Could not build HTTP client")?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// POST to an auth endpoint and decode a [`TokenResponse`].
    ///
    /// 400/401 map to [`AuthError::Unauthenticated`]; every other non-2xx
    /// status is an API error.
    async fn post_token(
        &self,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<TokenResponse, AuthError> {
        let started = Instant::now();
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.client.post(&url);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        let status = response.status();

        tracing::debug!(
            "AUTH_CALL | path={} status={} elapsed_ms={}",
            path,
            status.as_u16(),
            started.elapsed().as_millis()
        );

        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNAUTHORIZED {
            return Err(AuthError::Unauthenticated);
        }
        if !status.is_success() {
            return Err(AuthError::Api(format!(
                "{} returned HTTP {}",
                path,
                status.as_u16()
            )));
        }

        response
            .json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::Api(format!("malformed response from {}: {}", path, e)))
    }
}

#[async_trait]
impl AuthApi for HttpAuthClient {
    async fn login(&self, email: &str, password: &str) -> Result<TokenResponse, AuthError> {
        self.post_token(
            LOGIN_PATH,
            Some(serde_json::json!({ "email": email, "password": password })),
        )
        .await
    }

    async fn validate_session(&self) -> Result<TokenResponse, AuthError> {
        self.post_token(VALIDATE_PATH, None).await
    }

    async fn refresh_credential(&self) -> Result<TokenResponse, AuthError> {
        self.post_token(REFRESH_PATH, None).await
    }

    async fn logout(&self) -> Result<(), AuthError> {
        let started = Instant::now();
        let url = format!("{}{}", self.base_url, LOGOUT_PATH);

        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;
        let status = response.status();

        tracing::debug!(
            "AUTH_CALL | path={} status={} elapsed_ms={}",
            LOGOUT_PATH,
            status.as_u16(),
            started.elapsed().as_millis()
        );

        // An already-dead credential is as good as a logged-out one.
        if status.is_success() || status == StatusCode::UNAUTHORIZED {
            Ok(())
        } else {
            Err(AuthError::Api(format!(
                "{} returned HTTP {}",
                LOGOUT_PATH,
                status.as_u16()
            )))
        }
    }
}
