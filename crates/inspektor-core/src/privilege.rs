use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info, warn};

use crate::api::{ApiResult, ControlPlane};
use crate::auth::TokenStore;
use crate::models::AppConfig;

/// Role that unlocks the admin configuration.
pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Clone, PartialEq)]
pub enum PrivilegeMode {
    Standard,
    Admin(AppConfig),
}

impl PrivilegeMode {
    pub fn is_admin(&self) -> bool {
        matches!(self, PrivilegeMode::Admin(_))
    }

    /// The admin configuration; empty for standard users.
    pub fn config(&self) -> AppConfig {
        match self {
            PrivilegeMode::Admin(config) => config.clone(),
            PrivilegeMode::Standard => AppConfig::default(),
        }
    }
}

/// Decides whether the current user gets admin mode, fetching the admin
/// configuration only once the role set proves it is allowed.
pub struct PrivilegeGate<B: ControlPlane> {
    backend: Arc<B>,
    store: TokenStore,
    last: Mutex<Option<PrivilegeMode>>,
}

impl<B: ControlPlane> PrivilegeGate<B> {
    pub fn new(backend: Arc<B>, store: TokenStore) -> Self {
        Self {
            backend,
            store,
            last: Mutex::new(None),
        }
    }

    /// Decide the mode for the current credential.
    ///
    /// The previous result is dropped first, so a failed evaluation leaves
    /// no mode behind for `refresh_config` to act on.
    pub async fn evaluate(&self) -> ApiResult<PrivilegeMode> {
        self.reset();
        if let Err(e) = self.store.promote_from_cookie() {
            warn!(error = %e, "Handoff cookie promotion failed");
        }

        let roles = self.backend.roles().await?;
        let mode = if roles.iter().any(|role| role == ADMIN_ROLE) {
            let config = self.backend.admin_config().await?;
            info!(roles = ?roles, "Admin mode enabled");
            PrivilegeMode::Admin(config)
        } else {
            debug!(roles = ?roles, "Standard mode");
            PrivilegeMode::Standard
        };

        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(mode.clone());
        Ok(mode)
    }

    /// Re-fetch the admin configuration. Returns `None` without calling
    /// the backend unless the last evaluation granted admin mode.
    pub async fn refresh_config(&self) -> ApiResult<Option<AppConfig>> {
        if !self.last().is_some_and(|mode| mode.is_admin()) {
            debug!("Skipping config refresh, not in admin mode");
            return Ok(None);
        }

        let config = self.backend.admin_config().await?;
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(PrivilegeMode::Admin(config.clone()));
        Ok(Some(config))
    }

    /// Result of the most recent successful evaluation.
    pub fn last(&self) -> Option<PrivilegeMode> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn reset(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}
