//! Bearer token verification: signature and claim checks.
//!
//! # Verification flow
//!
//! 1. Split the compact token into header, payload and signature; any
//!    structural problem is [`VerifyError::Malformed`].
//! 2. Reject any `alg` other than RS256 before touching the key source. The
//!    token never chooses the algorithm used for verification.
//! 3. Pre-screen the unverified `iss` and `aud` so tokens minted for someone
//!    else never trigger a key fetch.
//! 4. Resolve the signing key by `kid`.
//! 5. Verify the signature with `jsonwebtoken`, then `iss`, `aud`, `exp`, `nbf`
//!    (with clock skew) and `iat` on the now-trusted payload.
//! 6. Build [`VerifiedClaims`] from the trusted payload only.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, Validation, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use super::keys::{KeyError, KeySource};
use crate::config::IdentityConfig;

/// The only signature algorithm accepted for inbound tokens.
pub const ALLOWED_ALGORITHM: Algorithm = Algorithm::RS256;

/// The claim that caused a rejection.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RejectedClaim {
    /// Header `alg` is not the allow-listed algorithm.
    #[error("algorithm {0} is not allowed")]
    Algorithm(String),
    /// `iss` does not equal the expected issuer.
    #[error("issuer mismatch")]
    Issuer,
    /// `aud` does not contain the expected audience.
    #[error("audience mismatch")]
    Audience,
    /// `exp` is in the past beyond the skew tolerance.
    #[error("token expired")]
    Expired,
    /// `nbf` is in the future beyond the skew tolerance.
    #[error("token not yet valid")]
    NotYetValid,
    /// `iat` is in the future beyond the skew tolerance.
    #[error("token issued in the future")]
    IssuedInFuture,
    /// A required claim is absent.
    #[error("missing claim {0}")]
    Missing(String),
}

/// Verification failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerifyError {
    /// Not a structurally valid compact token.
    #[error("Malformed token: {0}")]
    Malformed(String),

    /// The signature does not verify with the resolved key.
    #[error("Signature verification failed")]
    BadSignature,

    /// A claim failed validation.
    #[error("Claim rejected: {0}")]
    ClaimRejected(RejectedClaim),

    /// The `kid` is not in the published key set.
    #[error("Signing key not found: {0}")]
    KeyNotFound(String),

    /// The key-discovery endpoint is unavailable.
    #[error("Key discovery unavailable: {0}")]
    DiscoveryUnavailable(String),
}

impl From<KeyError> for VerifyError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::NotFound(kid) => Self::KeyNotFound(kid),
            KeyError::DiscoveryUnavailable(reason) => Self::DiscoveryUnavailable(reason),
        }
    }
}

impl From<RejectedClaim> for VerifyError {
    fn from(claim: RejectedClaim) -> Self {
        Self::ClaimRejected(claim)
    }
}

/// Unverified JOSE header.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenHeader {
    /// Declared algorithm
    pub alg: String,
    /// Key identifier
    #[serde(default)]
    pub kid: Option<String>,
}

/// A compact token split into its unverified parts.
///
/// Only used to route to a signing key; nothing here is trusted.
#[derive(Clone)]
pub struct InboundToken {
    /// Decoded header
    pub header: TokenHeader,
    /// Decoded payload
    pub payload: Map<String, Value>,
}

impl InboundToken {
    /// Split and decode a compact token without verifying it.
    ///
    /// # Errors
    ///
    /// Returns [`VerifyError::Malformed`] unless the token has exactly three
    /// base64url segments with a JSON-object header and payload.
    pub fn parse(raw: &str) -> Result<Self, VerifyError> {
        let mut segments = raw.split('.');
        let (Some(header), Some(payload), Some(signature), None) = (
            segments.next(),
            segments.next(),
            segments.next(),
            segments.next(),
        ) else {
            return Err(VerifyError::Malformed("expected three segments".to_string()));
        };
        if header.is_empty() || payload.is_empty() {
            return Err(VerifyError::Malformed("empty segment".to_string()));
        }

        let header: TokenHeader = decode_segment(header, "header")?;
        let payload: Map<String, Value> = decode_segment(payload, "payload")?;
        URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| VerifyError::Malformed("signature is not base64url".to_string()))?;

        Ok(Self { header, payload })
    }
}

impl fmt::Debug for InboundToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InboundToken")
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}

fn decode_segment<T: for<'de> Deserialize<'de>>(segment: &str, part: &str) -> Result<T, VerifyError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| VerifyError::Malformed(format!("{part} is not base64url")))?;
    serde_json::from_slice(&bytes).map_err(|_| VerifyError::Malformed(format!("{part} is not a JSON object")))
}

/// `aud` may be a single string or an array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum AudienceClaim {
    One(String),
    Many(Vec<String>),
}

impl AudienceClaim {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(aud) => vec![aud],
            Self::Many(auds) => auds,
        }
    }
}

/// Payload shape handed to `jsonwebtoken::decode`. Everything is optional so
/// absence surfaces as a rejected claim rather than a JSON error.
#[derive(Debug, Deserialize)]
struct PayloadClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Option<AudienceClaim>,
    #[serde(default)]
    exp: Option<u64>,
    #[serde(default)]
    iat: Option<u64>,
    #[serde(default)]
    nbf: Option<u64>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Claims of a token whose signature and registered claims checked out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerifiedClaims {
    /// `sub`
    pub subject: String,
    /// `iss`
    pub issuer: String,
    /// `aud`, normalized to a list
    pub audience: Vec<String>,
    /// `exp` (Unix seconds)
    pub expires_at: u64,
    /// `iat` (Unix seconds)
    pub issued_at: u64,
    /// `nbf` (Unix seconds), if present
    pub not_before: Option<u64>,
    /// Every other claim, untouched
    pub extra: Map<String, Value>,
}

impl VerifiedClaims {
    fn string_claim(&self, name: &str) -> Option<&str> {
        self.extra.get(name).and_then(Value::as_str)
    }

    /// `name`
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.string_claim("name")
    }

    /// `preferred_username`
    #[must_use]
    pub fn preferred_username(&self) -> Option<&str> {
        self.string_claim("preferred_username")
    }

    /// `oid`, the directory object ID
    #[must_use]
    pub fn object_id(&self) -> Option<&str> {
        self.string_claim("oid")
    }

    /// `tid`, the directory tenant ID
    #[must_use]
    pub fn tenant_id(&self) -> Option<&str> {
        self.string_claim("tid")
    }

    /// `roles`, empty when absent
    #[must_use]
    pub fn roles(&self) -> Vec<String> {
        self.extra
            .get("roles")
            .and_then(Value::as_array)
            .map(|roles| {
                roles
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// `scp`, split on whitespace
    #[must_use]
    pub fn scopes(&self) -> Vec<String> {
        self.string_claim("scp")
            .map(|scp| scp.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }
}

/// A verified token: the original compact string plus its trusted claims.
///
/// Only [`TokenVerifier`] constructs these, so holding one proves verification
/// happened. The exchange step requires it.
#[derive(Clone)]
pub struct VerifiedToken {
    raw: String,
    claims: VerifiedClaims,
}

impl VerifiedToken {
    /// The compact token, for use as an on-behalf-of assertion.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// The trusted claims.
    #[must_use]
    pub fn claims(&self) -> &VerifiedClaims {
        &self.claims
    }

    /// Drop the token and keep the claims.
    #[must_use]
    pub fn into_claims(self) -> VerifiedClaims {
        self.claims
    }
}

impl fmt::Debug for VerifiedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifiedToken")
            .field("subject", &self.claims.subject)
            .field("raw", &"<redacted>")
            .finish()
    }
}

/// What a token must satisfy.
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    /// Exact expected `iss`
    pub issuer: String,
    /// Audience that `aud` must contain
    pub audience: String,
    /// Tolerance applied to `exp`, `nbf` and `iat`
    pub clock_skew: Duration,
}

impl From<&IdentityConfig> for ValidationPolicy {
    fn from(config: &IdentityConfig) -> Self {
        Self {
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            clock_skew: config.clock_skew,
        }
    }
}

impl ValidationPolicy {
    fn to_validation(&self) -> Validation {
        let mut validation = Validation::new(ALLOWED_ALGORITHM);
        validation.leeway = self.clock_skew.as_secs();
        validation.validate_exp = true;
        validation.validate_nbf = true;
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_audience(&[self.audience.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);
        validation
    }

    /// Cheap checks on unverified `iss` / `aud`. Only ever narrows what is accepted.
    fn prescreen(&self, payload: &Map<String, Value>) -> Result<(), RejectedClaim> {
        match payload.get("iss") {
            Some(Value::String(iss)) if *iss == self.issuer => {}
            Some(_) => return Err(RejectedClaim::Issuer),
            None => return Err(RejectedClaim::Missing("iss".to_string())),
        }
        let audience_ok = match payload.get("aud") {
            Some(Value::String(aud)) => *aud == self.audience,
            Some(Value::Array(auds)) => auds.iter().any(|aud| aud.as_str() == Some(&self.audience)),
            Some(_) => false,
            None => return Err(RejectedClaim::Missing("aud".to_string())),
        };
        if audience_ok {
            Ok(())
        } else {
            Err(RejectedClaim::Audience)
        }
    }
}

/// Verifies inbound bearer tokens against one issuer and audience.
pub struct TokenVerifier {
    keys: Arc<dyn KeySource>,
    policy: ValidationPolicy,
}

impl TokenVerifier {
    /// Create a verifier over `keys` enforcing `policy`.
    pub fn new(keys: Arc<dyn KeySource>, policy: ValidationPolicy) -> Self {
        Self { keys, policy }
    }

    /// Verify `raw` against the configured policy.
    ///
    /// # Errors
    ///
    /// Returns the specific [`VerifyError`]; a failure is final for this token.
    pub async fn verify(&self, raw: &str) -> Result<VerifiedToken, VerifyError> {
        self.verify_with(raw, &self.policy).await
    }

    /// Verify `raw` against an explicit audience, issuer and skew.
    ///
    /// # Errors
    ///
    /// Returns the specific [`VerifyError`]; a failure is final for this token.
    pub async fn verify_with(
        &self,
        raw: &str,
        policy: &ValidationPolicy,
    ) -> Result<VerifiedToken, VerifyError> {
        let inbound = InboundToken::parse(raw)?;

        if inbound.header.alg != "RS256" {
            return Err(RejectedClaim::Algorithm(inbound.header.alg).into());
        }
        let kid = inbound
            .header
            .kid
            .as_deref()
            .filter(|kid| !kid.is_empty())
            .ok_or_else(|| VerifyError::Malformed("header has no kid".to_string()))?;

        policy.prescreen(&inbound.payload)?;

        let key = self.keys.resolve(kid).await?;
        if key.algorithm != ALLOWED_ALGORITHM {
            debug!(kid = %kid, algorithm = ?key.algorithm, "Resolved key cannot verify RS256");
            return Err(VerifyError::BadSignature);
        }

        let data = jsonwebtoken::decode::<PayloadClaims>(raw, key.decoding_key(), &policy.to_validation())
            .map_err(map_jwt_error)?;
        let claims = data.claims;

        let issued_at = claims
            .iat
            .ok_or_else(|| RejectedClaim::Missing("iat".to_string()))?;
        let now = jsonwebtoken::get_current_timestamp();
        if issued_at > now.saturating_add(policy.clock_skew.as_secs()) {
            return Err(RejectedClaim::IssuedInFuture.into());
        }

        let missing = |name: &str| VerifyError::from(RejectedClaim::Missing(name.to_string()));

        Ok(VerifiedToken {
            raw: raw.to_string(),
            claims: VerifiedClaims {
                subject: claims.sub.ok_or_else(|| missing("sub"))?,
                issuer: claims.iss.ok_or_else(|| missing("iss"))?,
                audience: claims.aud.ok_or_else(|| missing("aud"))?.into_vec(),
                expires_at: claims.exp.ok_or_else(|| missing("exp"))?,
                issued_at,
                not_before: claims.nbf,
                extra: claims.extra,
            },
        })
    }
}

fn map_jwt_error(err: jsonwebtoken::errors::Error) -> VerifyError {
    match err.kind() {
        ErrorKind::InvalidSignature => VerifyError::BadSignature,
        ErrorKind::ExpiredSignature => RejectedClaim::Expired.into(),
        ErrorKind::ImmatureSignature => RejectedClaim::NotYetValid.into(),
        ErrorKind::InvalidIssuer => RejectedClaim::Issuer.into(),
        ErrorKind::InvalidAudience => RejectedClaim::Audience.into(),
        ErrorKind::MissingRequiredClaim(claim) => RejectedClaim::Missing(claim.clone()).into(),
        ErrorKind::InvalidAlgorithm => RejectedClaim::Algorithm("mismatch".to_string()).into(),
        _ => VerifyError::Malformed(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use crate::auth::testing::{
        AUDIENCE, ISSUER, PRIMARY_PEM, ROTATED_PEM, claims, fixed_keys, now, policy, sign,
        sign_with, verifier,
    };

    fn unsigned(header: &Value, claims: &Value) -> String {
        format!(
            "{}.{}.",
            URL_SAFE_NO_PAD.encode(header.to_string()),
            URL_SAFE_NO_PAD.encode(claims.to_string())
        )
    }

    #[tokio::test]
    async fn valid_token_yields_claims() {
        let keys = fixed_keys();
        let token = verifier(&keys).verify(&sign(&claims())).await.unwrap();

        let claims = token.claims();
        assert_eq!(claims.subject, "AAAAAAAAAAAAAAAAAAAAAIkzqFVrSaSaFHy782bbtaQ");
        assert_eq!(claims.issuer, ISSUER);
        assert_eq!(claims.audience, vec![AUDIENCE.to_string()]);
        assert_eq!(claims.name(), Some("Megan Bowen"));
        assert_eq!(claims.preferred_username(), Some("megan@contoso.example"));
        assert_eq!(claims.object_id(), Some("00000000-0000-0000-66f3-3332eca7ea81"));
        assert_eq!(claims.roles(), vec!["Reader".to_string(), "Writer".to_string()]);
        assert_eq!(claims.scopes(), vec!["access_as_user".to_string(), "profile".to_string()]);
        assert!(!claims.extra.contains_key("exp"));
    }

    #[tokio::test]
    async fn verify_is_idempotent() {
        let keys = fixed_keys();
        let verifier = verifier(&keys);
        let token = sign(&claims());

        let first = verifier.verify(&token).await.unwrap().into_claims();
        let second = verifier.verify(&token).await.unwrap().into_claims();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn audience_array_containing_expected_is_accepted() {
        let keys = fixed_keys();
        let mut claims = claims();
        claims["aud"] = json!(["api://other", AUDIENCE]);

        let token = verifier(&keys).verify(&sign(&claims)).await.unwrap();
        assert_eq!(token.claims().audience.len(), 2);
    }

    #[tokio::test]
    async fn structural_garbage_is_malformed() {
        let keys = fixed_keys();
        let verifier = verifier(&keys);

        for raw in ["", "abc", "a.b", "a.b.c.d", "!!!.###.$$$", "e30.e30"] {
            let err = verifier.verify(raw).await.unwrap_err();
            assert!(matches!(err, VerifyError::Malformed(_)), "{raw}: {err:?}");
        }
        let not_object = unsigned(&json!({"alg": "RS256", "kid": "primary-key"}), &json!([1, 2]));
        assert!(matches!(
            verifier.verify(&not_object).await,
            Err(VerifyError::Malformed(_))
        ));
        assert_eq!(keys.lookups(), 0);
    }

    #[tokio::test]
    async fn none_algorithm_is_rejected_without_key_lookup() {
        let keys = fixed_keys();
        let token = unsigned(&json!({"alg": "none", "kid": "primary-key"}), &claims());

        let err = verifier(&keys).verify(&token).await.unwrap_err();

        assert_eq!(
            err,
            VerifyError::ClaimRejected(RejectedClaim::Algorithm("none".to_string()))
        );
        assert_eq!(keys.lookups(), 0);
    }

    #[tokio::test]
    async fn symmetric_algorithm_is_rejected_without_key_lookup() {
        // GIVEN: an HS256 token keyed with the public modulus (classic confusion attack)
        let keys = fixed_keys();
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("primary-key".to_string());
        let token = jsonwebtoken::encode(
            &header,
            &claims(),
            &EncodingKey::from_secret(include_bytes!("../../tests/fixtures/primary_jwk.json")),
        )
        .unwrap();

        // WHEN
        let err = verifier(&keys).verify(&token).await.unwrap_err();

        // THEN
        assert!(matches!(err, VerifyError::ClaimRejected(RejectedClaim::Algorithm(ref alg)) if alg == "HS256"));
        assert_eq!(keys.lookups(), 0);
    }

    #[tokio::test]
    async fn missing_kid_is_malformed() {
        let keys = fixed_keys();
        let token = jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &claims(),
            &EncodingKey::from_rsa_pem(PRIMARY_PEM).unwrap(),
        )
        .unwrap();

        assert!(matches!(
            verifier(&keys).verify(&token).await,
            Err(VerifyError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn unknown_kid_propagates_key_not_found() {
        let keys = fixed_keys();
        let token = sign_with(
            "rotated-key",
            ROTATED_PEM,
            &claims(),
        );

        let err = verifier(&keys).verify(&token).await.unwrap_err();
        assert_eq!(err, VerifyError::KeyNotFound("rotated-key".to_string()));
    }

    #[tokio::test]
    async fn signature_from_another_key_is_bad_signature() {
        // GIVEN: signed by the rotated key but claiming the primary kid
        let keys = fixed_keys();
        let token = sign_with(
            "primary-key",
            ROTATED_PEM,
            &claims(),
        );

        let err = verifier(&keys).verify(&token).await.unwrap_err();
        assert_eq!(err, VerifyError::BadSignature);
    }

    #[tokio::test]
    async fn tampered_payload_is_bad_signature() {
        let keys = fixed_keys();
        let token = sign(&claims());
        let mut parts: Vec<String> = token.split('.').map(str::to_string).collect();
        let mut forged = claims();
        forged["roles"] = json!(["Admin"]);
        parts[1] = URL_SAFE_NO_PAD.encode(forged.to_string());

        let err = verifier(&keys).verify(&parts.join(".")).await.unwrap_err();
        assert_eq!(err, VerifyError::BadSignature);
    }

    #[tokio::test]
    async fn wrong_audience_is_rejected_regardless_of_signature() {
        let keys = fixed_keys();
        let mut claims = claims();
        claims["aud"] = json!("api://someone-else");

        // Validly signed
        let err = verifier(&keys).verify(&sign(&claims)).await.unwrap_err();
        assert_eq!(err, VerifyError::ClaimRejected(RejectedClaim::Audience));

        // Signed by a key we do not trust
        let forged = sign_with(
            "primary-key",
            ROTATED_PEM,
            &claims,
        );
        let err = verifier(&keys).verify(&forged).await.unwrap_err();
        assert_eq!(err, VerifyError::ClaimRejected(RejectedClaim::Audience));
    }

    #[tokio::test]
    async fn issuer_must_match_exactly() {
        let keys = fixed_keys();
        let mut claims = claims();
        claims["iss"] = json!("https://issuer.example/v2.0/");

        let err = verifier(&keys).verify(&sign(&claims)).await.unwrap_err();
        assert_eq!(err, VerifyError::ClaimRejected(RejectedClaim::Issuer));
    }

    #[tokio::test]
    async fn expiry_honors_clock_skew() {
        let keys = fixed_keys();
        let verifier = verifier(&keys);

        let mut within_skew = claims();
        within_skew["exp"] = json!(now() - 30);
        assert!(verifier.verify(&sign(&within_skew)).await.is_ok());

        let mut expired = claims();
        expired["exp"] = json!(now() - 120);
        let err = verifier.verify(&sign(&expired)).await.unwrap_err();
        assert_eq!(err, VerifyError::ClaimRejected(RejectedClaim::Expired));
    }

    #[tokio::test]
    async fn future_nbf_and_iat_are_rejected() {
        let keys = fixed_keys();
        let verifier = verifier(&keys);

        let mut early = claims();
        early["nbf"] = json!(now() + 600);
        assert_eq!(
            verifier.verify(&sign(&early)).await.unwrap_err(),
            VerifyError::ClaimRejected(RejectedClaim::NotYetValid)
        );

        let mut future_iat = claims();
        future_iat["iat"] = json!(now() + 600);
        assert_eq!(
            verifier.verify(&sign(&future_iat)).await.unwrap_err(),
            VerifyError::ClaimRejected(RejectedClaim::IssuedInFuture)
        );
    }

    #[tokio::test]
    async fn missing_required_claims_are_rejected() {
        let keys = fixed_keys();
        let verifier = verifier(&keys);

        for claim in ["sub", "exp", "iat"] {
            let mut claims = claims();
            claims.as_object_mut().unwrap().remove(claim);
            let err = verifier.verify(&sign(&claims)).await.unwrap_err();
            assert_eq!(
                err,
                VerifyError::ClaimRejected(RejectedClaim::Missing(claim.to_string())),
                "{claim}"
            );
        }
    }

    #[tokio::test]
    async fn explicit_policy_overrides_configured_one() {
        let keys = fixed_keys();
        let mut claims = claims();
        claims["aud"] = json!("api://downstream");
        let token = sign(&claims);

        let other = ValidationPolicy {
            audience: "api://downstream".to_string(),
            ..policy()
        };
        let verified = verifier(&keys).verify_with(&token, &other).await.unwrap();
        assert_eq!(verified.claims().audience, vec!["api://downstream".to_string()]);
    }

    #[test]
    fn key_errors_map_onto_verify_errors() {
        assert_eq!(
            VerifyError::from(KeyError::DiscoveryUnavailable("HTTP 500".to_string())),
            VerifyError::DiscoveryUnavailable("HTTP 500".to_string())
        );
        assert_eq!(
            VerifyError::from(KeyError::NotFound("k".to_string())),
            VerifyError::KeyNotFound("k".to_string())
        );
    }

    #[test]
    fn verified_token_debug_redacts_raw() {
        let token = VerifiedToken {
            raw: "secret.token.value".to_string(),
            claims: VerifiedClaims {
                subject: "s".to_string(),
                issuer: ISSUER.to_string(),
                audience: vec![AUDIENCE.to_string()],
                expires_at: 0,
                issued_at: 0,
                not_before: None,
                extra: Map::new(),
            },
        };
        let debug = format!("{token:?}");
        assert!(!debug.contains("secret.token.value"));
        assert!(debug.contains("redacted"));
    }
}
