//! The console session context.
//!
//! `Console` owns one token store and wires the lifecycle evaluator,
//! navigation guard, privilege gate and reconciliation engine around it.
//! Front ends hold a `Console` instead of reaching for global state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError, AuthSlot, ControlPlane, SsoEntry};
use crate::auth::{
    Claims, Credential, FileStorage, JarCookieSource, KeyringStorage, LocalStorage, MemoryStorage,
    Promotion, StaticCookieSource, TokenLifecycle, TokenStatus, TokenStore,
};
use crate::config::{Config, StorageBackend};
use crate::guard::{AuthState, GuardDecision, GuardError, NavigationGuard};
use crate::privilege::{PrivilegeGate, PrivilegeMode};
use crate::reconcile::{AccessReconciler, AccessView, ReconcileError, RefreshOutcome};

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error("local storage failure: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl ConsoleError {
    /// True when the user should log in again.
    pub fn is_auth_failure(&self) -> bool {
        match self {
            ConsoleError::Api(e) => e.is_auth_failure(),
            ConsoleError::Reconcile(e) => e.api_error().is_auth_failure(),
            _ => false,
        }
    }
}

/// Options that override the config file for one run.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Act as if the SSO handoff cookie carried this token
    pub handoff: Option<String>,
    /// Keep the credential in memory only
    pub ephemeral: bool,
}

/// What `Console::initialize` produced. Each half fails independently.
#[derive(Debug)]
pub struct Initialized {
    pub privilege: Result<PrivilegeMode, ApiError>,
    pub access: Result<RefreshOutcome, ReconcileError>,
}

#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub token: TokenStatus,
    pub claims: Option<Claims>,
    pub base_url: String,
}

impl SessionStatus {
    pub fn auth_state(&self) -> AuthState {
        self.token.into()
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self.token {
            TokenStatus::Valid { expires_at } => Some(expires_at),
            _ => None,
        }
    }
}

pub struct Console<B: ControlPlane = ApiClient> {
    backend: Arc<B>,
    store: TokenStore,
    lifecycle: TokenLifecycle,
    guard: NavigationGuard,
    gate: PrivilegeGate<B>,
    reconciler: AccessReconciler<B>,
    base_url: String,
}

impl Console<ApiClient> {
    /// Build a console talking to the configured control plane.
    pub fn open(config: &Config, options: OpenOptions) -> anyhow::Result<Self> {
        let base_url = config.base_url();
        let auth = AuthSlot::new();
        let client = ApiClient::new(&base_url, config.request_timeout(), auth.clone())?;

        let backend = if options.ephemeral {
            StorageBackend::Memory
        } else {
            config.storage
        };
        let storage: Box<dyn LocalStorage> = match backend {
            StorageBackend::File => Box::new(FileStorage::new(&config.data_dir()?)),
            StorageBackend::Keyring => Box::new(KeyringStorage::new()),
            StorageBackend::Memory => Box::new(MemoryStorage::new()),
        };
        info!(base_url = %base_url, storage = ?backend, "Opening console");

        let store = match options.handoff {
            Some(token) => TokenStore::new(storage, StaticCookieSource::new(Some(token)), auth),
            None => TokenStore::new(
                storage,
                JarCookieSource::new(client.cookie_jar(), client.base_url().clone()),
                auth,
            ),
        };

        Ok(Self::with_backend(Arc::new(client), store, base_url))
    }

    /// Where the user should authenticate with the identity provider.
    pub async fn sso_entry(&self) -> Result<SsoEntry, ConsoleError> {
        Ok(self.backend.sso_entry().await?)
    }

    /// Finish single sign-on from the URL the identity provider redirected
    /// to, then adopt the handoff cookie the control plane set.
    pub async fn complete_sso(&self, redirected_to: &str) -> Result<Credential, ConsoleError> {
        self.backend.complete_sso(redirected_to).await?;
        self.adopt_handoff()
    }
}

impl<B: ControlPlane> Console<B> {
    pub fn with_backend(backend: Arc<B>, store: TokenStore, base_url: impl Into<String>) -> Self {
        let lifecycle = TokenLifecycle::new(store.clone());
        Self {
            guard: NavigationGuard::new(store.clone(), lifecycle.clone()),
            gate: PrivilegeGate::new(Arc::clone(&backend), store.clone()),
            reconciler: AccessReconciler::new(Arc::clone(&backend)),
            backend,
            store,
            lifecycle,
            base_url: base_url.into(),
        }
    }

    pub fn client(&self) -> &B {
        &self.backend
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Authenticate and replace the stored credential. Privilege and access
    /// state belonged to the previous principal and is dropped.
    pub async fn login(&self, username: &str, password: &str) -> Result<Credential, ConsoleError> {
        let credential = self.backend.authenticate(username, password).await?;
        self.reconciler.reset();
        self.gate.reset();
        self.store.set(&credential)?;
        info!(username = %username, "Logged in");
        Ok(credential)
    }

    /// Promote the SSO handoff cookie into the credential slot. When it
    /// replaces the stored credential, state of the previous principal is
    /// dropped.
    pub fn adopt_handoff(&self) -> Result<Credential, ConsoleError> {
        let promotion = self.store.promote_from_cookie()?;
        if promotion == Promotion::NoCookie {
            return Err(ApiError::InvalidResponse(
                "control plane did not set the handoff cookie".to_string(),
            )
            .into());
        }
        if promotion == Promotion::Promoted {
            self.reconciler.reset();
            self.gate.reset();
        }
        let credential = self.store.current().ok_or_else(|| {
            ApiError::InvalidResponse("handoff cookie was empty".to_string())
        })?;
        info!(promotion = ?promotion, "Adopted handoff credential");
        Ok(credential)
    }

    pub fn logout(&self) -> Result<(), ConsoleError> {
        self.reconciler.reset();
        self.gate.reset();
        self.store.clear()?;
        info!("Logged out");
        Ok(())
    }

    pub fn navigate(&self, path: &str) -> Result<GuardDecision, ConsoleError> {
        Ok(self.guard.navigate(path)?)
    }

    /// Run the privilege gate and an access refresh side by side.
    pub async fn initialize(&self) -> Initialized {
        let (privilege, access) = tokio::join!(self.gate.evaluate(), self.reconciler.refresh());
        if let Err(e) = &privilege {
            warn!(error = %e, "Privilege evaluation failed");
        }
        Initialized { privilege, access }
    }

    pub async fn evaluate_privileges(&self) -> Result<PrivilegeMode, ConsoleError> {
        Ok(self.gate.evaluate().await?)
    }

    pub async fn refresh_config(&self) -> Result<Option<crate::models::AppConfig>, ConsoleError> {
        Ok(self.gate.refresh_config().await?)
    }

    pub async fn refresh_access(&self) -> Result<RefreshOutcome, ConsoleError> {
        Ok(self.reconciler.refresh().await?)
    }

    pub fn access(&self) -> AccessView {
        self.reconciler.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<AccessView> {
        self.reconciler.subscribe()
    }

    /// Promote any handoff cookie, then evaluate the stored credential.
    pub fn status(&self) -> SessionStatus {
        if let Err(e) = self.store.promote_from_cookie() {
            warn!(error = %e, "Handoff cookie promotion failed");
        }
        let current = self.store.current();
        let claims = current.as_ref().and_then(|c| c.claims().ok());
        let token = self.lifecycle.evaluate(current.as_ref());
        SessionStatus {
            claims: claims.filter(|_| token.is_valid()),
            token,
            base_url: self.base_url.clone(),
        }
    }
}
