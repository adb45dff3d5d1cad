//! OBO Gate Library
//!
//! Guards an HTTP API with identity-provider bearer tokens and, when the API
//! calls a second resource, exchanges the caller's token for one scoped to
//! that resource (on-behalf-of flow).
//!
//! # Features
//!
//! - **Key discovery**: JWKS cache with coalesced refresh and key rotation
//! - **Verification**: RS256 only, issuer/audience/lifetime checks with clock skew
//! - **On-behalf-of exchange**: JWT-bearer grant with a confidential client
//! - **Middleware**: axum layer attaching a [`auth::Principal`] to each request

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod server;

pub use error::{Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    }
    .map_err(|e| Error::Internal(format!("tracing already initialized: {e}")))
}
