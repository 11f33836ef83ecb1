//! Data models for control plane entities.
//!
//! This module contains the wire shapes the control plane returns and
//! accepts, plus the reconciled view types built from them:
//!
//! - `Datasource`, `SessionAttachment`: datasources and what access they carry
//! - `AccessSession`, `SessionMeta`, `TempCredential`: standing and temporary grants
//! - `User`, `ServiceAccount`, `AppConfig`: directory and admin configuration
//! - Request payloads with client-side validation

pub mod admin;
pub mod datasource;
pub mod request;
pub mod session;
pub mod user;

pub use admin::{AppConfig, OauthProvider};
pub use datasource::{Datasource, SessionAttachment};
pub use request::{
    AddRolesRequest, AuditLogConfig, CloudWatchConfig, CreateDatasourceRequest,
    CreateServiceAccountRequest, CreateSessionRequest, CreateTempCredentialRequest,
    CreateUserRequest, DeleteDatasourceRequest, ObjectKind, TeamsConfig, ValidationError,
};
pub use session::{AccessSession, SessionMeta, TempCredential, STANDING_GRANT_EXPIRY};
pub use user::{ServiceAccount, User};

use serde::{Deserialize, Deserializer};

/// The control plane serializes empty Go slices and maps as `null`.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
