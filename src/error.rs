//! Error types for the OBO gate
//!
//! Request-path failures have their own typed errors next to the component
//! that produces them ([`KeyError`](crate::auth::KeyError),
//! [`VerifyError`](crate::auth::VerifyError),
//! [`ExchangeError`](crate::auth::ExchangeError)). This type covers startup:
//! loading configuration, building HTTP clients, binding the listener.

use std::io;

use thiserror::Error;

/// Result type alias for the OBO gate
pub type Result<T> = std::result::Result<T, Error>;

/// Startup and hosting errors
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// HTTP client construction error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
