use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::null_as_default;
use super::Datasource;

/// `expiresAt` value marking a standing (non-expiring) grant.
pub const STANDING_GRANT_EXPIRY: i64 = 0;

/// Connection details and lifetime of a grant.
///
/// Standing grants carry an explicit `expiresAt` of 0. Temporary grants carry
/// the expiry instant in nanoseconds since the epoch. A missing or null
/// `expiresAt` is neither.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMeta {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub postgres_username: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub postgres_password: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub temp_roles: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub context: serde_json::Value,
    #[serde(default, deserialize_with = "null_as_default")]
    pub temp_created_by: String,
    #[serde(default)]
    pub passthrough: bool,
}

impl SessionMeta {
    pub fn is_standing(&self) -> bool {
        self.expires_at == Some(STANDING_GRANT_EXPIRY)
    }
}

impl fmt::Debug for SessionMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionMeta")
            .field("kind", &self.kind)
            .field("postgres_username", &self.postgres_username)
            .field("postgres_password", &"<redacted>")
            .field("temp_roles", &self.temp_roles)
            .field("expires_at", &self.expires_at)
            .field("temp_created_by", &self.temp_created_by)
            .field("passthrough", &self.passthrough)
            .finish()
    }
}

/// A session record as returned by `GET /api/session`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessSession {
    #[serde(rename = "ID", alias = "id", default)]
    pub id: u64,
    /// Id of the datasource this session grants access to
    #[serde(rename = "objectID")]
    pub object_id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: SessionMeta,
}

impl AccessSession {
    pub fn is_standing(&self) -> bool {
        self.meta.is_standing()
    }
}

/// A temporary credential as returned by `GET /api/session/temp`.
///
/// Carries its own snapshot of the datasource it was issued for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TempCredential {
    #[serde(rename = "ID", alias = "id", default)]
    pub id: u64,
    #[serde(rename = "objectID")]
    pub object_id: u64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub meta: SessionMeta,
    pub datasource: Datasource,
}

impl TempCredential {
    /// Expiry instant, or `None` if the backend sent no expiry.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.meta
            .expires_at
            .filter(|&nanos| nanos > STANDING_GRANT_EXPIRY)
            .map(DateTime::from_timestamp_nanos)
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().map(|at| now < at).unwrap_or(false)
    }

    pub fn is_active(&self) -> bool {
        self.is_active_at(Utc::now())
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        self.expires_at()
            .map(|at| (at - Utc::now()).num_minutes().max(0))
            .unwrap_or(0)
    }
}
