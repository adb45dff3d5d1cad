//! On-behalf-of token exchange
//!
//! Swaps a verified inbound token for a token scoped to a downstream resource
//! using the JWT-bearer grant with `requested_token_use=on_behalf_of`.
//! One call is one logical attempt. Retrying transient failures is left to the
//! caller, which is safe because the exchange is idempotent.

use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};

use super::verifier::VerifiedToken;
use crate::config::ExchangeConfig;
use crate::{Error, Result};

/// Grant type for on-behalf-of requests.
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Exchange failures, split by who caused them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExchangeError {
    /// The identity provider rejected the grant, scope or consent. Not retryable.
    #[error("Exchange rejected: {code}")]
    Client {
        /// OAuth `error` code, e.g. `invalid_grant`
        code: String,
        /// OAuth `error_description`, if any
        description: Option<String>,
    },

    /// The provider refused this gate's own client credential
    /// (`invalid_client`, `unauthorized_client`). Not retryable.
    #[error("Exchange credential rejected: {code}")]
    Credential {
        /// OAuth `error` code
        code: String,
        /// OAuth `error_description`, if any
        description: Option<String>,
    },

    /// Network failure, timeout or provider-side error. Safe to retry.
    #[error("Exchange unavailable: {0}")]
    Transient(String),
}

impl ExchangeError {
    /// Whether a caller-level retry may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// A downstream-scoped token.
#[derive(Clone)]
pub struct ExchangeResult {
    /// The downstream access token
    pub access_token: String,
    /// Usually `Bearer`
    pub token_type: String,
    /// Expiry (Unix seconds)
    pub expires_at: u64,
    /// Scopes granted
    pub scopes: Vec<String>,
}

impl fmt::Debug for ExchangeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExchangeResult")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .finish()
    }
}

/// Performs on-behalf-of exchanges.
#[async_trait]
pub trait TokenExchangeClient: Send + Sync {
    /// Exchange `token` for one scoped to `scopes`.
    async fn exchange_on_behalf_of(
        &self,
        token: &VerifiedToken,
        scopes: &[String],
    ) -> std::result::Result<ExchangeResult, ExchangeError>;
}

/// Successful token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<ExpiresIn>,
    #[serde(default)]
    scope: Option<String>,
}

/// Some providers send `expires_in` as a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
    Seconds(u64),
    Text(String),
}

impl ExpiresIn {
    fn seconds(&self) -> Option<u64> {
        match self {
            Self::Seconds(secs) => Some(*secs),
            Self::Text(text) => text.trim().parse().ok(),
        }
    }
}

/// OAuth error response body.
#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// [`TokenExchangeClient`] against an identity provider's token endpoint.
pub struct OboExchanger {
    http_client: Client,
    token_endpoint: String,
    client_id: String,
    client_secret: String,
}

impl OboExchanger {
    /// Create an exchanger posting to `token_endpoint` as `client_id`.
    ///
    /// Every request is bounded by `timeout`.
    pub fn new(
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        timeout: Duration,
        require_https: bool,
    ) -> Result<Self> {
        let http_client = Client::builder()
            .timeout(timeout)
            .https_only(require_https)
            .build()?;

        Ok(Self {
            http_client,
            token_endpoint: token_endpoint.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        })
    }

    /// Build from the `exchange` config section.
    pub fn from_config(config: &ExchangeConfig, require_https: bool) -> Result<Self> {
        let client_secret = config.resolve_client_secret();
        if client_secret.is_empty() {
            return Err(Error::config("exchange.client_secret resolved to an empty value"));
        }
        Self::new(
            config.token_endpoint.clone(),
            config.client_id.clone(),
            client_secret,
            config.timeout,
            require_https,
        )
    }
}

impl fmt::Debug for OboExchanger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OboExchanger")
            .field("token_endpoint", &self.token_endpoint)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenExchangeClient for OboExchanger {
    async fn exchange_on_behalf_of(
        &self,
        token: &VerifiedToken,
        scopes: &[String],
    ) -> std::result::Result<ExchangeResult, ExchangeError> {
        let scope = scopes.join(" ");
        let mut params = HashMap::new();
        params.insert("grant_type", JWT_BEARER_GRANT);
        params.insert("client_id", &self.client_id);
        params.insert("client_secret", &self.client_secret);
        params.insert("assertion", token.raw());
        params.insert("scope", &scope);
        params.insert("requested_token_use", "on_behalf_of");

        let response = self
            .http_client
            .post(&self.token_endpoint)
            .form(&params)
            .send()
            .await
            .map_err(|e| {
                let kind = if e.is_timeout() { "timed out" } else { "failed" };
                ExchangeError::Transient(format!("token request {kind}: {e}"))
            })?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| ExchangeError::Transient(format!("reading token response: {e}")))?;

        if !status.is_success() {
            let err = classify_failure(status, &body);
            warn!(status = %status, error = %err, "On-behalf-of exchange failed");
            return Err(err);
        }

        let parsed: TokenResponse = serde_json::from_slice(&body).map_err(|e| {
            ExchangeError::Transient(format!("unparsable token response: {e}"))
        })?;
        let result = into_result(parsed, scopes, now_secs());
        debug!(
            subject = %token.claims().subject,
            expires_at = result.expires_at,
            "On-behalf-of exchange succeeded"
        );
        Ok(result)
    }
}

/// Codes that blame the confidential client rather than the caller's assertion.
const CREDENTIAL_ERRORS: [&str; 2] = ["invalid_client", "unauthorized_client"];

/// 5xx and 429 are the provider's problem, credential errors are ours, other
/// 4xx are the caller's.
fn classify_failure(status: StatusCode, body: &[u8]) -> ExchangeError {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return ExchangeError::Transient(format!("HTTP {status}"));
    }
    if !status.is_client_error() {
        return ExchangeError::Transient(format!("unexpected HTTP {status}"));
    }
    match serde_json::from_slice::<ErrorResponse>(body) {
        Ok(err) if CREDENTIAL_ERRORS.contains(&err.error.as_str()) => ExchangeError::Credential {
            code: err.error,
            description: err.error_description,
        },
        Ok(err) => ExchangeError::Client {
            code: err.error,
            description: err.error_description,
        },
        Err(_) => ExchangeError::Client {
            code: format!("http_{}", status.as_u16()),
            description: None,
        },
    }
}

fn into_result(response: TokenResponse, requested: &[String], now: u64) -> ExchangeResult {
    let scopes = response.scope.as_deref().map_or_else(
        || requested.to_vec(),
        |scope| scope.split_whitespace().map(str::to_string).collect(),
    );
    let expires_in = response
        .expires_in
        .as_ref()
        .and_then(ExpiresIn::seconds)
        .unwrap_or(0);

    ExchangeResult {
        access_token: response.access_token,
        token_type: response.token_type.unwrap_or_else(|| "Bearer".to_string()),
        expires_at: now.saturating_add(expires_in),
        scopes,
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
