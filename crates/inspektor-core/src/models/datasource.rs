use serde::{Deserialize, Serialize};

use super::null_as_default;
use super::{SessionMeta, TempCredential};

/// What access a reconciled datasource carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "grant", rename_all = "lowercase")]
pub enum SessionAttachment {
    /// Meta of a standing session joined onto a persistent datasource
    Standing(SessionMeta),
    /// The temporary credential a projected datasource was cloned from
    Temporary(Box<TempCredential>),
}

impl SessionAttachment {
    pub fn meta(&self) -> &SessionMeta {
        match self {
            SessionAttachment::Standing(meta) => meta,
            SessionAttachment::Temporary(temp) => &temp.meta,
        }
    }

    pub fn is_temporary(&self) -> bool {
        matches!(self, SessionAttachment::Temporary(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Datasource {
    #[serde(alias = "ID")]
    pub id: u64,
    #[serde(default, alias = "Name", deserialize_with = "null_as_default")]
    pub name: String,
    /// Provider kind, e.g. `postgres`
    #[serde(rename = "type", default, alias = "Type", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(
        rename = "sidecarHostname",
        alias = "SideCarHostName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub sidecar_hostname: Option<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub roles: Vec<String>,
    /// Set by reconciliation, never by the backend
    #[serde(rename = "sessionMeta", skip_deserializing, skip_serializing_if = "Option::is_none")]
    pub session_meta: Option<SessionAttachment>,
}

impl Datasource {
    pub fn has_access(&self) -> bool {
        self.session_meta.is_some()
    }

    pub fn display_kind(&self) -> &str {
        if self.kind.is_empty() {
            "unknown"
        } else {
            &self.kind
        }
    }
}
