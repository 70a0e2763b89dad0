//! Access token payload decoding.
//!
//! Tokens are three dot-separated base64url segments. Only the middle one is
//! read, and the signature is never checked: the claims are a hint for
//! expiry display, the server remains the only authority on validity.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::debug;

/// Claims decoded from a token payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// `exp` as a timestamp, when present and numeric.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let exp = self.0.get("exp")?;
        let secs = exp.as_i64().or_else(|| exp.as_f64().map(|f| f as i64))?;
        DateTime::from_timestamp(secs, 0)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> Option<bool> {
        self.expires_at().map(|exp| exp <= now)
    }
}

/// Decode the payload of a compact token. Any malformed input yields `None`.
pub fn decode(token: &str) -> Option<Claims> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        debug!(segments = segments.len(), "Token does not have three segments");
        return None;
    }

    let mut payload: String = segments[1]
        .chars()
        .map(|c| match c {
            '-' => '+',
            '_' => '/',
            other => other,
        })
        .collect();
    while payload.len() % 4 != 0 {
        payload.push('=');
    }

    let bytes = STANDARD.decode(payload.as_bytes()).ok()?;
    let text = String::from_utf8(bytes).ok()?;
    match serde_json::from_str::<Value>(&text).ok()? {
        Value::Object(map) => Some(Claims(map)),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
