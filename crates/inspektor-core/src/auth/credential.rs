use std::fmt;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::models::null_as_default;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("credential is not three dot-separated segments")]
    Structure,

    #[error("claims segment is not base64url: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("claims segment is not a JSON claims object: {0}")]
    Json(#[from] serde_json::Error),

    #[error("claims carry no expiration")]
    MissingExpiry,

    #[error("expiration claim is out of range")]
    InvalidExpiry,
}

/// The signed token representing an authenticated principal.
///
/// Opaque to everything except claim decoding. `Debug` never prints it.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode the middle segment into claims. Does not verify the signature;
    /// the control plane does that on every request.
    pub fn claims(&self) -> Result<Claims, DecodeError> {
        let mut segments = self.0.split('.');
        let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
            (Some(_), Some(payload), Some(_), None) => payload,
            _ => return Err(DecodeError::Structure),
        };

        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('='))?;
        let raw: RawClaims = serde_json::from_slice(&bytes)?;

        let exp = raw.exp.ok_or(DecodeError::MissingExpiry)?;
        if !exp.is_finite() {
            return Err(DecodeError::InvalidExpiry);
        }
        let expires_at =
            DateTime::from_timestamp(exp.floor() as i64, 0).ok_or(DecodeError::InvalidExpiry)?;

        Ok(Claims {
            username: raw.username,
            roles: raw.roles,
            object_id: raw.object_id,
            exp,
            expires_at,
        })
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<redacted>, {} bytes)", self.0.len())
    }
}

/// Claims as the control plane signs them.
#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(rename = "UserName", default, deserialize_with = "null_as_default")]
    username: String,
    #[serde(rename = "Roles", default, deserialize_with = "null_as_default")]
    roles: Vec<String>,
    #[serde(rename = "ObjectID", default)]
    object_id: u64,
    #[serde(default)]
    exp: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    pub username: String,
    pub roles: Vec<String>,
    pub object_id: u64,
    /// Expiration in seconds since the epoch
    pub exp: f64,
    pub expires_at: DateTime<Utc>,
}

impl Claims {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }

    /// Expired means strictly past: a credential is still good during its `exp` second.
    pub fn is_expired_at(&self, now_secs: i64) -> bool {
        now_secs as f64 > self.exp
    }
}
