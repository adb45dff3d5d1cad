//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load after parsing the config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    /// Variables land in the process environment for `env:VAR` secret resolution.
    pub env_files: Vec<String>,
    /// HTTP host configuration
    pub server: ServerConfig,
    /// Identity provider and token validation settings
    pub identity: IdentityConfig,
    /// Signing key cache settings
    pub keys: KeysConfig,
    /// On-behalf-of exchange settings
    pub exchange: ExchangeConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Browser origins allowed by CORS (credentials are allowed)
    pub cors_origins: Vec<String>,
    /// Paths that bypass authentication
    pub public_paths: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            cors_origins: vec!["http://localhost:3000".to_string()],
            public_paths: vec!["/health".to_string()],
        }
    }
}

/// Identity provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Expected `iss` claim, compared exactly
    pub issuer: String,
    /// Expected `aud` claim (usually this API's client ID)
    pub audience: String,
    /// Key-discovery endpoint; derived from the issuer when unset
    pub jwks_uri: Option<String>,
    /// Tolerated clock skew for `exp`, `nbf` and `iat`
    #[serde(with = "humantime_serde")]
    pub clock_skew: Duration,
    /// Refuse plain-HTTP identity provider URLs
    pub require_https: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            issuer: String::new(),
            audience: String::new(),
            jwks_uri: None,
            clock_skew: Duration::from_secs(60),
            require_https: true,
        }
    }
}

impl IdentityConfig {
    /// The configured JWKS URI, or one derived from the issuer.
    #[must_use]
    pub fn resolved_jwks_uri(&self) -> String {
        self.jwks_uri
            .clone()
            .unwrap_or_else(|| default_jwks_uri(&self.issuer))
    }
}

/// Signing key cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeysConfig {
    /// How long a fetched key set is considered fresh
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,
    /// Minimum spacing between fetches triggered by unknown key IDs
    #[serde(with = "humantime_serde")]
    pub min_refresh_interval: Duration,
    /// Upper bound on a single key-discovery fetch
    #[serde(with = "humantime_serde")]
    pub fetch_timeout: Duration,
    /// Fetch keys once at startup
    pub warm_on_start: bool,
}

impl Default for KeysConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600),
            min_refresh_interval: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(5),
            warm_on_start: true,
        }
    }
}

/// On-behalf-of exchange configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Exchange every verified inbound token for a downstream token
    pub enabled: bool,
    /// Identity provider token endpoint
    pub token_endpoint: String,
    /// This API's client ID
    pub client_id: String,
    /// This API's client secret (literal value or `env:VAR_NAME`)
    pub client_secret: String,
    /// Scopes requested for the downstream resource
    pub scopes: Vec<String>,
    /// Upper bound on a single exchange attempt
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Extra attempts for transient failures (0 = no retry)
    pub max_retries: usize,
    /// First backoff delay between transient retries
    #[serde(with = "humantime_serde")]
    pub retry_backoff: Duration,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            token_endpoint: String::new(),
            client_id: String::new(),
            client_secret: String::new(),
            scopes: Vec::new(),
            timeout: Duration::from_secs(5),
            max_retries: 0,
            retry_backoff: Duration::from_millis(200),
        }
    }
}

impl ExchangeConfig {
    /// Resolve the client secret (expand `env:VAR_NAME`)
    #[must_use]
    pub fn resolve_client_secret(&self) -> String {
        if let Some(var_name) = self.client_secret.strip_prefix("env:") {
            env::var(var_name).unwrap_or_default()
        } else {
            self.client_secret.clone()
        }
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist, cannot be parsed,
    /// or fails validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // OBO_GATE_IDENTITY__ISSUER=... style overrides
        figment = figment.merge(Env::prefixed("OBO_GATE_").split("__"));

        let config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.validate()?;

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Files that don't exist are skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = if path_str.starts_with('~') {
                match dirs::home_dir() {
                    Some(home) => path_str.replacen('~', &home.display().to_string(), 1),
                    None => path_str.clone(),
                }
            } else {
                path_str.clone()
            };

            let path = Path::new(&expanded);
            if !path.exists() {
                tracing::debug!("Env file not found (skipped): {expanded}");
                continue;
            }
            match dotenvy::from_path(path) {
                Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
            }
        }
    }

    /// Check required fields and URL shapes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        let identity = &self.identity;
        if identity.issuer.trim().is_empty() {
            return Err(Error::config("identity.issuer is required"));
        }
        if identity.audience.trim().is_empty() {
            return Err(Error::config("identity.audience is required"));
        }
        check_url(
            "identity.jwks_uri",
            &identity.resolved_jwks_uri(),
            identity.require_https,
        )?;

        let exchange = &self.exchange;
        if exchange.enabled {
            check_url(
                "exchange.token_endpoint",
                &exchange.token_endpoint,
                identity.require_https,
            )?;
            if exchange.client_id.trim().is_empty() {
                return Err(Error::config("exchange.client_id is required"));
            }
            if exchange.resolve_client_secret().is_empty() {
                return Err(Error::config(
                    "exchange.client_secret is required (literal or env:VAR)",
                ));
            }
            if exchange.scopes.is_empty() {
                return Err(Error::config("exchange.scopes must not be empty"));
            }
        }

        Ok(())
    }
}

fn check_url(field: &str, value: &str, require_https: bool) -> Result<()> {
    let url = Url::parse(value).map_err(|e| Error::Config(format!("{field}: {e}")))?;
    if require_https && url.scheme() != "https" {
        return Err(Error::Config(format!("{field} must use https: {value}")));
    }
    Ok(())
}

/// Derive the key-discovery URI from the issuer.
///
/// `https://login.example/{tenant}/v2.0` publishes its keys at
/// `https://login.example/{tenant}/discovery/v2.0/keys`; everything else
/// falls back to the `/.well-known/jwks.json` convention.
#[must_use]
pub fn default_jwks_uri(issuer: &str) -> String {
    let base = issuer.trim_end_matches('/');
    match base.strip_suffix("/v2.0") {
        Some(tenant_base) => format!("{tenant_base}/discovery/v2.0/keys"),
        None => format!("{base}/.well-known/jwks.json"),
    }
}
