//! Identity claims carried inside an access token.
//!
//! Tokens are three dot-separated segments; the middle one is a base64url
//! JSON payload. Nothing here checks the signature: the decoded claims drive
//! personalization and client-side gating only, and every protected call is
//! still authorized by the server.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;

use super::DecodeError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub username: String,
    pub member_index: i64,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ClaimsRepr {
    username: String,
    #[serde(alias = "memberIndex")]
    member_index: i64,
    exp: i64,
}

impl TryFrom<ClaimsRepr> for Claims {
    type Error = DecodeError;

    fn try_from(value: ClaimsRepr) -> Result<Self, DecodeError> {
        if value.username.trim().is_empty() {
            return Err(DecodeError::malformed("empty username claim"));
        }

        let expires_at = Utc
            .timestamp_opt(value.exp, 0)
            .single()
            .ok_or_else(|| DecodeError::malformed(format!("exp out of range: {}", value.exp)))?;

        Ok(Self {
            username: value.username,
            member_index: value.member_index,
            expires_at,
        })
    }
}

pub struct ClaimsDecoder;

impl ClaimsDecoder {
    /// Decode the payload segment of `token` into claims.
    pub fn decode(token: &str) -> Result<Claims, DecodeError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(DecodeError::malformed("empty token"));
        }

        let segments: Vec<&str> = token.split('.').collect();
        if segments.len() != 3 {
            return Err(DecodeError::malformed(format!(
                "expected 3 segments, found {}",
                segments.len()
            )));
        }

        // Some issuers pad the payload; the engine rejects padding.
        let payload = segments[1].trim_end_matches('=');
        let bytes = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|e| DecodeError::malformed(format!("payload is not base64url: {}", e)))?;

        let repr: ClaimsRepr = serde_json::from_slice(&bytes)
            .map_err(|e| DecodeError::malformed(format!("invalid claims payload: {}", e)))?;

        Claims::try_from(repr)
    }
}

/// Build an unsigned token around `payload`. Test helper shared by the crate.
#[cfg(test)]
pub(crate) fn encode_test_token(payload: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(payload.to_string());
    format!("{}.{}.signature", header, body)
}

/// Every call yields a distinct token, even for the same identity.
#[cfg(test)]
pub(crate) fn test_token(username: &str, member_index: i64) -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static NEXT_JTI: AtomicU64 = AtomicU64::new(1);

    let exp = (Utc::now() + chrono::Duration::minutes(30)).timestamp();
    encode_test_token(&serde_json::json!({
        "username": username,
        "member_index": member_index,
        "exp": exp,
        "jti": NEXT_JTI.fetch_add(1, Ordering::Relaxed),
    }))
}

// ============================================================================
// Tests
// ============================================================================
