//! Bearer-token authentication with on-behalf-of exchange
//!
//! - [`keys`]: signing-key discovery and caching
//! - [`verifier`]: signature and claim verification
//! - [`exchange`]: on-behalf-of token exchange
//! - [`gate`]: request gating and the axum middleware

pub mod exchange;
pub mod gate;
pub mod keys;
pub mod verifier;

#[cfg(test)]
pub(crate) mod testing;

pub use exchange::{ExchangeError, ExchangeResult, OboExchanger, TokenExchangeClient};
pub use gate::{AuthGate, ExchangeStage, Principal, Rejection, auth_middleware};
pub use keys::{
    HttpJwksFetcher, HttpKeySource, JwksFetcher, JwksKeySource, KeyDocument, KeyError, KeySet,
    KeySource, KeySourceSettings, SigningKey,
};
pub use verifier::{
    RejectedClaim, TokenVerifier, ValidationPolicy, VerifiedClaims, VerifiedToken, VerifyError,
};
