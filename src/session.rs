//! Bearer-token session against the vendor's identity endpoint.
//!
//! A [`TokenSession`] owns the HTTP transport (connection pool, cookie jar,
//! default headers) and the bearer token. Every authenticated call made by the
//! directory and attendance clients goes through [`TokenSession::get`].

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use anyhow::{Context, Result as AnyResult};
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::config::{ApiConfig, NetworkConfig};
use crate::error::{MonitorError, Result};

const BRAND_HEADER: HeaderName = HeaderName::from_static("x-purebrand");

/// Member identity and PIN, fixed for the lifetime of a client.
#[derive(Debug)]
pub struct Credentials {
    identity: String,
    secret: SecretString,
}

impl Credentials {
    pub fn new(identity: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            secret: SecretString::from(secret.into()),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// The secret rendered as one `*` per character, safe for display.
    pub fn masked_secret(&self) -> String {
        "*".repeat(self.secret.expose_secret().chars().count())
    }
}

/// Response of the password-grant token exchange; only the token is used.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

/// HTTP session that attaches the bearer token once authenticated.
///
/// Cloning yields another handle onto the same transport and token; the
/// monitor uses this to hand the session to its spawned checks.
#[derive(Clone, Debug)]
pub struct TokenSession {
    client: reqwest::Client,
    auth_url: String,
    base_url: String,
    scope: String,
    client_id: String,
    token: Arc<RwLock<Option<SecretString>>>,
}

impl TokenSession {
    /// Create an unauthenticated session with the vendor's default headers.
    pub fn new(api: &ApiConfig, network: &NetworkConfig) -> AnyResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&api.user_agent).context("Invalid user agent")?,
        );
        headers.insert(
            BRAND_HEADER,
            HeaderValue::from_str(&api.brand).context("Invalid brand header")?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-GB"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .gzip(true)
            .deflate(true)
            .brotli(true)
            .timeout(Duration::from_secs(network.request_timeout_secs))
            .connect_timeout(Duration::from_secs(network.connect_timeout_secs))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            auth_url: api.auth_url.clone(),
            base_url: api.base_url.trim_end_matches('/').to_string(),
            scope: api.scope.clone(),
            client_id: api.client_id.clone(),
            token: Arc::new(RwLock::new(None)),
        })
    }

    pub fn is_authenticated(&self) -> bool {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Exchange credentials for a bearer token.
    ///
    /// Any token from an earlier exchange is dropped first, so the session is
    /// unauthenticated unless this exchange succeeds. Returns `Ok(false)` when
    /// the endpoint rejects the request or the body carries no token. Only
    /// I/O faults surface as errors.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<bool> {
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = None;

        let response = self
            .client
            .post(&self.auth_url)
            .form(&[
                ("grant_type", "password"),
                ("username", credentials.identity()),
                ("password", credentials.secret.expose_secret()),
                ("scope", self.scope.as_str()),
                ("client_id", self.client_id.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        tracing::debug!(%status, "Token endpoint responded");

        let body = response.text().await?;
        if !status.is_success() {
            tracing::debug!("Token endpoint error body: {}", truncate(&body, 500));
            return Ok(false);
        }
        tracing::debug!(length = body.len(), "Token response received");

        let token = match serde_json::from_str::<TokenResponse>(&body) {
            Ok(TokenResponse {
                access_token: Some(token),
                ..
            }) if !token.is_empty() => token,
            Ok(_) => {
                tracing::debug!("Token response carried no access_token");
                return Ok(false);
            }
            Err(e) => {
                tracing::debug!("Failed to parse token response: {}", e);
                return Ok(false);
            }
        };

        *self.token.write().unwrap_or_else(PoisonError::into_inner) =
            Some(SecretString::from(token));
        Ok(true)
    }

    /// Issue an authenticated GET against the API base.
    ///
    /// Fails with [`MonitorError::AuthRequired`] before any I/O when no token
    /// is held.
    pub(crate) async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let token = self.bearer()?;
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "GET");

        let response = self.client.get(&url).bearer_auth(token).send().await?;
        tracing::debug!(status = %response.status(), %url, "API responded");
        Ok(response)
    }

    fn bearer(&self) -> Result<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|t| t.expose_secret().to_string())
            .ok_or(MonitorError::AuthRequired)
    }
}

/// Cut a response body down for diagnostics without splitting a character.
pub(crate) fn truncate(body: &str, max_chars: usize) -> &str {
    match body.char_indices().nth(max_chars) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
