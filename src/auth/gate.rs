//! Request gate: bearer extraction, verification, optional exchange
//!
//! Each request moves through a fixed sequence:
//!
//! ```text
//! no header        -> 401 MissingToken
//! malformed header -> 401 MalformedHeader
//! verify fails     -> 401 (or 502 when key discovery is down)
//! exchange fails   -> 401 caller-caused / 502 provider- or credential-caused
//! otherwise        -> Principal attached, handler runs
//! ```
//!
//! Verification always completes before an exchange is attempted.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json,
    body::Body,
    extract::State,
    http::{Request, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use backon::{ExponentialBuilder, Retryable};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, warn};

use super::exchange::{ExchangeError, ExchangeResult, OboExchanger, TokenExchangeClient};
use super::keys::KeySource;
use super::verifier::{TokenVerifier, ValidationPolicy, VerifiedToken, VerifyError};
use crate::Result;
use crate::config::Config;

/// The authenticated caller, attached to request extensions.
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    /// Display name (`name`)
    pub name: Option<String>,
    /// Sign-in name (`preferred_username`)
    pub preferred_username: Option<String>,
    /// Subject (`sub`)
    pub subject: String,
    /// Directory object ID (`oid`)
    pub object_id: Option<String>,
    /// Directory tenant ID (`tid`)
    pub tenant_id: Option<String>,
    /// App roles (`roles`)
    pub roles: Vec<String>,
    /// Delegated scopes (`scp`)
    pub scopes: Vec<String>,
    /// Expiry of the downstream token, when an exchange happened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downstream_token_expires_at: Option<u64>,
    #[serde(skip)]
    downstream: Option<ExchangeResult>,
}

impl Principal {
    /// Build from the inbound token's claims, never the exchanged token.
    fn new(token: &VerifiedToken, downstream: Option<ExchangeResult>) -> Self {
        let claims = token.claims();
        Self {
            name: claims.name().map(str::to_string),
            preferred_username: claims.preferred_username().map(str::to_string),
            subject: claims.subject.clone(),
            object_id: claims.object_id().map(str::to_string),
            tenant_id: claims.tenant_id().map(str::to_string),
            roles: claims.roles(),
            scopes: claims.scopes(),
            downstream_token_expires_at: downstream.as_ref().map(|d| d.expires_at),
            downstream,
        }
    }

    /// The downstream token obtained on the caller's behalf, if any.
    #[must_use]
    pub fn downstream_token(&self) -> Option<&ExchangeResult> {
        self.downstream.as_ref()
    }

    /// Whether the caller holds `role`.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// A rejected request: HTTP status plus a stable reason code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    status: StatusCode,
    reason: &'static str,
}

impl Rejection {
    const fn unauthorized(reason: &'static str) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            reason,
        }
    }

    const fn bad_gateway(reason: &'static str) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            reason,
        }
    }

    /// No `Authorization` header.
    pub const MISSING_TOKEN: Self = Self::unauthorized("MissingToken");
    /// `Authorization` present but not `Bearer <token>`.
    pub const MALFORMED_HEADER: Self = Self::unauthorized("MalformedHeader");

    /// HTTP status for the response.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Reason code reported to the caller.
    #[must_use]
    pub fn reason(&self) -> &'static str {
        self.reason
    }
}

impl From<&VerifyError> for Rejection {
    fn from(err: &VerifyError) -> Self {
        match err {
            VerifyError::Malformed(_) => Self::unauthorized("Malformed"),
            VerifyError::BadSignature => Self::unauthorized("BadSignature"),
            VerifyError::ClaimRejected(_) => Self::unauthorized("ClaimRejected"),
            VerifyError::KeyNotFound(_) => Self::unauthorized("KeyNotFound"),
            VerifyError::DiscoveryUnavailable(_) => Self::bad_gateway("DiscoveryUnavailable"),
        }
    }
}

impl From<&ExchangeError> for Rejection {
    fn from(err: &ExchangeError) -> Self {
        match err {
            ExchangeError::Client { .. } => Self::unauthorized("ExchangeFailure.Client"),
            ExchangeError::Credential { .. } => Self::bad_gateway("ExchangeFailure.Credential"),
            ExchangeError::Transient(_) => Self::bad_gateway("ExchangeFailure.Transient"),
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        let body = Json(json!({ "error": self.reason }));
        if self.status == StatusCode::UNAUTHORIZED {
            (self.status, [(header::WWW_AUTHENTICATE, "Bearer")], body).into_response()
        } else {
            (self.status, body).into_response()
        }
    }
}

/// The exchange step: client, scopes, per-attempt timeout, retry budget.
pub struct ExchangeStage {
    client: Arc<dyn TokenExchangeClient>,
    scopes: Vec<String>,
    timeout: Duration,
    max_retries: usize,
    retry_backoff: Duration,
}

impl ExchangeStage {
    /// A stage that makes one attempt bounded by `timeout`.
    pub fn new(client: Arc<dyn TokenExchangeClient>, scopes: Vec<String>, timeout: Duration) -> Self {
        Self {
            client,
            scopes,
            timeout,
            max_retries: 0,
            retry_backoff: Duration::from_millis(200),
        }
    }

    /// Retry transient failures up to `max_retries` times with exponential backoff.
    #[must_use]
    pub fn with_retries(mut self, max_retries: usize, backoff: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_backoff = backoff;
        self
    }

    async fn attempt(&self, token: &VerifiedToken) -> std::result::Result<ExchangeResult, ExchangeError> {
        match tokio::time::timeout(
            self.timeout,
            self.client.exchange_on_behalf_of(token, &self.scopes),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => Err(ExchangeError::Transient(format!(
                "exchange timed out after {}ms",
                self.timeout.as_millis()
            ))),
        }
    }

    async fn run(&self, token: &VerifiedToken) -> std::result::Result<ExchangeResult, ExchangeError> {
        if self.max_retries == 0 {
            return self.attempt(token).await;
        }

        let backoff = ExponentialBuilder::default()
            .with_min_delay(self.retry_backoff)
            .with_max_times(self.max_retries);

        (|| self.attempt(token))
            .retry(backoff)
            .when(ExchangeError::is_transient)
            .notify(|err: &ExchangeError, delay: Duration| {
                debug!(
                    error = %err,
                    delay_ms = delay.as_millis(),
                    "Retrying on-behalf-of exchange after backoff"
                );
            })
            .await
    }
}

/// Verifies bearer tokens, optionally exchanges them, and yields a [`Principal`].
pub struct AuthGate {
    verifier: TokenVerifier,
    exchange: Option<ExchangeStage>,
    public_paths: Vec<String>,
}

impl AuthGate {
    /// A gate that only verifies.
    pub fn new(verifier: TokenVerifier) -> Self {
        Self {
            verifier,
            exchange: None,
            public_paths: Vec::new(),
        }
    }

    /// Exchange every verified token through `stage`.
    #[must_use]
    pub fn with_exchange(mut self, stage: ExchangeStage) -> Self {
        self.exchange = Some(stage);
        self
    }

    /// Paths (by prefix) that bypass the gate.
    #[must_use]
    pub fn with_public_paths(mut self, paths: Vec<String>) -> Self {
        self.public_paths = paths;
        self
    }

    /// Build from configuration over an existing key source.
    pub fn from_config(config: &Config, keys: Arc<dyn KeySource>) -> Result<Self> {
        let verifier = TokenVerifier::new(keys, ValidationPolicy::from(&config.identity));
        let mut gate = Self::new(verifier).with_public_paths(config.server.public_paths.clone());

        let exchange = &config.exchange;
        if exchange.enabled {
            let client = OboExchanger::from_config(exchange, config.identity.require_https)?;
            let stage = ExchangeStage::new(Arc::new(client), exchange.scopes.clone(), exchange.timeout)
                .with_retries(exchange.max_retries, exchange.retry_backoff);
            gate = gate.with_exchange(stage);
        }
        Ok(gate)
    }

    /// Check if a path is public (bypasses auth)
    #[must_use]
    pub fn is_public_path(&self, path: &str) -> bool {
        self.public_paths.iter().any(|p| path.starts_with(p))
    }

    /// Whether verified tokens are exchanged.
    #[must_use]
    pub fn exchanges(&self) -> bool {
        self.exchange.is_some()
    }

    /// Authenticate from the raw `Authorization` header value.
    ///
    /// # Errors
    ///
    /// Returns the [`Rejection`] to send instead of running the handler.
    pub async fn authenticate(&self, authorization: Option<&str>) -> std::result::Result<Principal, Rejection> {
        let Some(value) = authorization else {
            return Err(Rejection::MISSING_TOKEN);
        };
        let token = bearer_token(value).ok_or(Rejection::MALFORMED_HEADER)?;

        let verified = self.verifier.verify(token).await.map_err(|e| {
            warn!(error = %e, "Token verification failed");
            Rejection::from(&e)
        })?;

        let downstream = match &self.exchange {
            Some(stage) => Some(stage.run(&verified).await.map_err(|e| {
                warn!(subject = %verified.claims().subject, error = %e, "Token exchange failed");
                Rejection::from(&e)
            })?),
            None => None,
        };

        let principal = Principal::new(&verified, downstream);
        debug!(subject = %principal.subject, exchanged = principal.downstream.is_some(), "Authenticated request");
        Ok(principal)
    }
}

/// `Bearer <token>` with a case-insensitive scheme and a single opaque token.
fn bearer_token(value: &str) -> Option<&str> {
    let (scheme, token) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    if token.is_empty() || token.contains(char::is_whitespace) {
        return None;
    }
    Some(token)
}

/// Authentication middleware
pub async fn auth_middleware(
    State(gate): State<Arc<AuthGate>>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if gate.is_public_path(path) {
        debug!(path = %path, "Public path, skipping auth");
        return next.run(request).await;
    }

    let authorization = match request.headers().get(header::AUTHORIZATION) {
        None => None,
        Some(value) => match value.to_str() {
            Ok(value) => Some(value.to_string()),
            Err(_) => return Rejection::MALFORMED_HEADER.into_response(),
        },
    };

    match gate.authenticate(authorization.as_deref()).await {
        Ok(principal) => {
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(rejection) => {
            warn!(
                path = %request.uri().path(),
                status = rejection.status().as_u16(),
                reason = rejection.reason(),
                "Request rejected"
            );
            rejection.into_response()
        }
    }
}
