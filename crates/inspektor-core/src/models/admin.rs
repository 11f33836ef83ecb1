use serde::{Deserialize, Serialize};

/// Admin-only control plane configuration from `GET /api/config`.
///
/// Stays at its default for non-admin sessions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub policy_repo_url: String,
    #[serde(default)]
    pub policy_hash: String,
}

impl AppConfig {
    pub fn is_empty(&self) -> bool {
        self.policy_repo_url.is_empty() && self.policy_hash.is_empty()
    }
}

/// Identity provider entry point, from `GET /api/oauth` when the control
/// plane answers with a body instead of redirecting.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OauthProvider {
    #[serde(default)]
    pub provider: String,
    #[serde(default)]
    pub url: String,
}

impl OauthProvider {
    /// The control plane has no identity provider configured.
    pub fn is_disabled(&self) -> bool {
        self.url.is_empty()
    }
}
