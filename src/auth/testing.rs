//! Shared fixtures for auth unit tests

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, jwk::Jwk};
use serde_json::{Value, json};

use super::keys::{KeyError, KeySource, SigningKey};
use super::verifier::{TokenVerifier, ValidationPolicy};

pub(crate) const ISSUER: &str = "https://issuer.example/v2.0";
pub(crate) const AUDIENCE: &str = "c1fa6099-9cb7-4f30-aa4b-c22b3739e129";
pub(crate) const PRIMARY_PEM: &[u8] = include_bytes!("../../tests/fixtures/primary_rsa.pem");
pub(crate) const ROTATED_PEM: &[u8] = include_bytes!("../../tests/fixtures/rotated_rsa.pem");

/// Key source over fixed keys that counts lookups.
pub(crate) struct FixedKeys {
    pub keys: Vec<Arc<SigningKey>>,
    pub failure: Option<KeyError>,
    pub lookups: AtomicUsize,
}

impl FixedKeys {
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeySource for FixedKeys {
    async fn resolve(&self, kid: &str) -> Result<Arc<SigningKey>, KeyError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        self.keys
            .iter()
            .find(|key| key.kid == kid)
            .cloned()
            .ok_or_else(|| KeyError::NotFound(kid.to_string()))
    }
}

pub(crate) fn fixed_keys() -> Arc<FixedKeys> {
    let jwk: Jwk =
        serde_json::from_str(include_str!("../../tests/fixtures/primary_jwk.json")).unwrap();
    Arc::new(FixedKeys {
        keys: vec![Arc::new(SigningKey::from_jwk(&jwk).unwrap())],
        failure: None,
        lookups: AtomicUsize::new(0),
    })
}

pub(crate) fn failing_keys(err: KeyError) -> Arc<FixedKeys> {
    Arc::new(FixedKeys {
        keys: Vec::new(),
        failure: Some(err),
        lookups: AtomicUsize::new(0),
    })
}

pub(crate) fn policy() -> ValidationPolicy {
    ValidationPolicy {
        issuer: ISSUER.to_string(),
        audience: AUDIENCE.to_string(),
        clock_skew: Duration::from_secs(60),
    }
}

pub(crate) fn verifier(keys: &Arc<FixedKeys>) -> TokenVerifier {
    TokenVerifier::new(Arc::clone(keys) as Arc<dyn KeySource>, policy())
}

pub(crate) fn now() -> i64 {
    i64::try_from(jsonwebtoken::get_current_timestamp()).unwrap()
}

pub(crate) fn claims() -> Value {
    json!({
        "iss": ISSUER,
        "aud": AUDIENCE,
        "sub": "AAAAAAAAAAAAAAAAAAAAAIkzqFVrSaSaFHy782bbtaQ",
        "oid": "00000000-0000-0000-66f3-3332eca7ea81",
        "tid": "9188040d-6c67-4c5b-b112-36a304b66dad",
        "name": "Megan Bowen",
        "preferred_username": "megan@contoso.example",
        "roles": ["Reader", "Writer"],
        "scp": "access_as_user profile",
        "iat": now() - 10,
        "nbf": now() - 10,
        "exp": now() + 3600,
    })
}

pub(crate) fn sign_with(kid: &str, pem: &[u8], claims: &Value) -> String {
    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some(kid.to_string());
    jsonwebtoken::encode(&header, claims, &EncodingKey::from_rsa_pem(pem).unwrap()).unwrap()
}

pub(crate) fn sign(claims: &Value) -> String {
    sign_with("primary-key", PRIMARY_PEM, claims)
}
