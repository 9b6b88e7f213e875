// src/token.rs

//! Structural checks on a compact-serialized JWT, before any key or
//! signature is involved.

use crate::error::AuthError;
use base64::engine::{general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::Deserialize;
use serde_json::{Map, Value};

/// The parts of the JOSE header the validator needs.
///
/// `alg` is kept as a raw string: values the crate cannot verify
/// (including `none`) must still parse so they can be rejected as a
/// signature failure rather than as a malformed token.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenHeader {
    pub alg: String,
    #[serde(default)]
    pub kid: Option<String>,
}

/// A token that is well-formed but whose signature has not been checked.
#[derive(Debug)]
pub struct UnverifiedToken {
    pub header: TokenHeader,
}

impl UnverifiedToken {
    /// Checks that `token` is three dot-separated base64url segments whose
    /// header and payload are JSON objects.
    pub fn parse(token: &str) -> Result<Self, AuthError> {
        let segments: Vec<&str> = token.split('.').collect();
        let [header, payload, signature] = segments.as_slice() else {
            return Err(AuthError::MalformedToken(format!(
                "expected 3 segments, found {}",
                segments.len()
            )));
        };

        let header_json = decode_segment("header", header)?;
        let payload_json = decode_segment("payload", payload)?;
        URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::MalformedToken("signature is not base64url".to_string()))?;

        let header: TokenHeader = serde_json::from_slice(&header_json)
            .map_err(|e| AuthError::MalformedToken(format!("invalid header: {}", e)))?;
        serde_json::from_slice::<Map<String, Value>>(&payload_json)
            .map_err(|_| AuthError::MalformedToken("payload is not a JSON object".to_string()))?;

        Ok(Self { header })
    }

    pub fn key_id(&self) -> Option<&str> {
        self.header.kid.as_deref()
    }

    pub fn algorithm(&self) -> &str {
        &self.header.alg
    }
}

fn decode_segment(name: &str, segment: &str) -> Result<Vec<u8>, AuthError> {
    if segment.is_empty() {
        return Err(AuthError::MalformedToken(format!("empty {}", name)));
    }
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| AuthError::MalformedToken(format!("{} is not base64url", name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn segment(value: Value) -> String {
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&value).unwrap())
    }

    fn token(header: Value, payload: Value, signature: &str) -> String {
        format!("{}.{}.{}", segment(header), segment(payload), signature)
    }

    #[test]
    fn test_parses_well_formed_token() {
        let raw = token(
            json!({ "alg": "RS256", "kid": "key-1", "typ": "JWT" }),
            json!({ "sub": "user-1" }),
            "c2lnbmF0dXJl",
        );
        let parsed = UnverifiedToken::parse(&raw).unwrap();
        assert_eq!(parsed.algorithm(), "RS256");
        assert_eq!(parsed.key_id(), Some("key-1"));
    }

    #[test]
    fn test_rejects_wrong_segment_count() {
        for input in ["not-a-jwt", "a.b", "a.b.c.d", ""] {
            assert!(
                matches!(UnverifiedToken::parse(input), Err(AuthError::MalformedToken(_))),
                "{input:?} should be malformed"
            );
        }
    }

    #[test]
    fn test_rejects_non_base64url_segments() {
        let payload = segment(json!({ "sub": "x" }));
        let raw = format!("!!!.{}.sig", payload);
        assert!(matches!(UnverifiedToken::parse(&raw), Err(AuthError::MalformedToken(_))));

        let header = segment(json!({ "alg": "RS256" }));
        let raw = format!("{}.{}.not+base64url=", header, payload);
        assert!(matches!(UnverifiedToken::parse(&raw), Err(AuthError::MalformedToken(_))));
    }

    #[test]
    fn test_rejects_non_object_payload_and_header_without_alg() {
        let raw = token(json!({ "alg": "RS256" }), json!("just a string"), "");
        assert!(matches!(UnverifiedToken::parse(&raw), Err(AuthError::MalformedToken(_))));

        let raw = token(json!({ "kid": "key-1" }), json!({ "sub": "x" }), "");
        assert!(matches!(UnverifiedToken::parse(&raw), Err(AuthError::MalformedToken(_))));
    }

    #[test]
    fn test_unverifiable_algorithms_still_parse() {
        let raw = token(json!({ "alg": "none" }), json!({ "sub": "x" }), "");
        let parsed = UnverifiedToken::parse(&raw).unwrap();
        assert_eq!(parsed.algorithm(), "none");
        assert_eq!(parsed.key_id(), None);
    }
}
