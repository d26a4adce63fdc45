//! HS256 JSON Web Tokens.
//!
//! Tokens are `header.payload.signature`, each part base64url encoded without
//! padding, signed with HMAC-SHA256 over `header.payload`.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::Sha256;

use crate::Claims;

type HmacSha256 = Hmac<Sha256>;

/// Errors from signing or verifying a token.
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    /// The token is not three base64url parts holding JSON objects.
    #[error("jwt malformed")]
    Malformed,

    /// The header names an algorithm other than HS256.
    #[error("invalid algorithm")]
    InvalidAlgorithm,

    /// The signature does not match the secret.
    #[error("invalid signature")]
    InvalidSignature,

    /// The `exp` claim is in the past.
    #[error("jwt expired")]
    Expired,

    /// The `iss` claim does not match the expected issuer.
    #[error("jwt issuer invalid. expected: {expected}")]
    IssuerMismatch {
        /// The issuer the verifier asked for.
        expected: String,
    },

    /// The secret could not be used as an HMAC key.
    #[error("invalid secret")]
    InvalidKey,

    /// The claims could not be serialized.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Options applied when signing.
#[derive(Debug, Clone, Default)]
pub struct SignOptions {
    /// Lifetime of the token; sets the `exp` claim.
    pub expires_in: Option<Duration>,
    /// Sets the `iss` claim.
    pub issuer: Option<String>,
}

/// Options applied when verifying.
#[derive(Debug, Clone, Default)]
pub struct VerifyOptions {
    /// Require the `iss` claim to equal this value.
    pub issuer: Option<String>,
}

/// Sign `claims` with `secret`. `iat` is always set to the current time.
pub fn sign(claims: &Claims, secret: &[u8], opts: &SignOptions) -> Result<String, TokenError> {
    let now = unix_now();
    let mut claims = claims.clone();
    claims.insert("iat".to_owned(), json!(now));
    if let Some(expires_in) = opts.expires_in {
        claims.insert("exp".to_owned(), json!(now + expires_in.as_secs()));
    }
    if let Some(issuer) = &opts.issuer {
        claims.insert("iss".to_owned(), json!(issuer));
    }

    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&json!({"alg": "HS256", "typ": "JWT"}))?);
    let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&claims)?);
    let signing_input = format!("{}.{}", header, payload);

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::InvalidKey)?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", signing_input, signature))
}

/// Verify `token` against `secret` and return its claims.
pub fn verify(token: &str, secret: &[u8], opts: &VerifyOptions) -> Result<Claims, TokenError> {
    let mut parts = token.split('.');
    let (header, payload, signature) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(h), Some(p), Some(s), None) => (h, p, s),
        _ => return Err(TokenError::Malformed),
    };

    let signing_input = &token[..header.len() + 1 + payload.len()];
    let header = decode_object(header)?;
    if header.get("alg").and_then(Value::as_str) != Some("HS256") {
        return Err(TokenError::InvalidAlgorithm);
    }

    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| TokenError::Malformed)?;
    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| TokenError::InvalidKey)?;
    mac.update(signing_input.as_bytes());
    mac.verify_slice(&signature)
        .map_err(|_| TokenError::InvalidSignature)?;

    let claims = decode_object(payload)?;
    if let Some(exp) = claims.get("exp") {
        let exp = exp.as_u64().ok_or(TokenError::Malformed)?;
        if unix_now() >= exp {
            return Err(TokenError::Expired);
        }
    }
    if let Some(expected) = &opts.issuer {
        if claims.get("iss").and_then(Value::as_str) != Some(expected.as_str()) {
            return Err(TokenError::IssuerMismatch {
                expected: expected.clone(),
            });
        }
    }

    Ok(claims)
}

fn decode_object(part: &str) -> Result<Claims, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|_| TokenError::Malformed)?;
    match serde_json::from_slice(&bytes) {
        Ok(Value::Object(map)) => Ok(map),
        _ => Err(TokenError::Malformed),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
