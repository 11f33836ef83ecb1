//! Route admission for the console.
//!
//! Every navigation first promotes the SSO handoff cookie, then evaluates
//! the stored credential exactly once and decides whether the target is
//! admitted or redirected.

use std::fmt;

use thiserror::Error;
use tracing::{debug, warn};

use crate::auth::{TokenLifecycle, TokenStatus, TokenStore};

/// Landing page for signed-out users.
pub const PUBLIC_HOME: &str = "/";

/// Landing page for signed-in users.
pub const DASHBOARD: &str = "/dashboard";

/// Paths reachable without a credential.
const PUBLIC_PATHS: &[&str] = &[PUBLIC_HOME, "/login"];

/// Redirects followed by `navigate` before giving up.
const MAX_REDIRECTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Public,
    Protected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    path: String,
    region: Region,
}

impl Route {
    /// Classify a path. Query strings and trailing slashes are ignored.
    pub fn from_path(path: &str) -> Self {
        let path = path.split(['?', '#']).next().unwrap_or_default();
        let trimmed = path.trim_end_matches('/');
        let normalized = if trimmed.is_empty() {
            PUBLIC_HOME.to_string()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };

        let region = if PUBLIC_PATHS.contains(&normalized.as_str()) {
            Region::Public
        } else {
            Region::Protected
        };
        Self {
            path: normalized,
            region,
        }
    }

    pub fn home() -> Self {
        Self::from_path(PUBLIC_HOME)
    }

    pub fn dashboard() -> Self {
        Self::from_path(DASHBOARD)
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn region(&self) -> Region {
        self.region
    }

    pub fn is_protected(&self) -> bool {
        self.region == Region::Protected
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Unauthenticated,
    AuthenticatedValid,
}

impl From<TokenStatus> for AuthState {
    fn from(status: TokenStatus) -> Self {
        if status.is_valid() {
            AuthState::AuthenticatedValid
        } else {
            AuthState::Unauthenticated
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Admit(Route),
    Redirect(Route),
}

impl Navigation {
    pub fn route(&self) -> &Route {
        match self {
            Navigation::Admit(route) | Navigation::Redirect(route) => route,
        }
    }
}

/// One guard decision plus the credential status it was based on.
#[derive(Debug, Clone, PartialEq)]
pub struct GuardDecision {
    pub navigation: Navigation,
    pub status: TokenStatus,
}

impl GuardDecision {
    pub fn auth_state(&self) -> AuthState {
        self.status.into()
    }
}

#[derive(Debug, Error)]
pub enum GuardError {
    #[error("navigation to {target} did not settle after {hops} redirects")]
    RedirectLoop { target: String, hops: usize },
}

#[derive(Clone)]
pub struct NavigationGuard {
    store: TokenStore,
    lifecycle: TokenLifecycle,
}

impl NavigationGuard {
    pub fn new(store: TokenStore, lifecycle: TokenLifecycle) -> Self {
        Self { store, lifecycle }
    }

    /// Decide a single navigation attempt.
    pub fn check(&self, path: &str) -> GuardDecision {
        if let Err(e) = self.store.promote_from_cookie() {
            warn!(error = %e, "Handoff cookie promotion failed");
        }

        let target = Route::from_path(path);
        let status = self.lifecycle.check_current();
        let state = AuthState::from(status);

        let navigation = match (target.region(), state) {
            (Region::Public, AuthState::AuthenticatedValid) => {
                Navigation::Redirect(Route::dashboard())
            }
            (Region::Protected, AuthState::Unauthenticated) => Navigation::Redirect(Route::home()),
            _ => Navigation::Admit(target),
        };

        debug!(path = %path, ?state, decision = ?navigation, "Navigation checked");
        GuardDecision { navigation, status }
    }

    /// Follow redirects until a route is admitted.
    pub fn navigate(&self, path: &str) -> Result<GuardDecision, GuardError> {
        let mut decision = self.check(path);
        for _ in 0..MAX_REDIRECTS {
            let next = match &decision.navigation {
                Navigation::Admit(_) => return Ok(decision),
                Navigation::Redirect(route) => route.path().to_string(),
            };
            decision = self.check(&next);
        }
        match decision.navigation {
            Navigation::Admit(_) => Ok(decision),
            Navigation::Redirect(_) => Err(GuardError::RedirectLoop {
                target: path.to_string(),
                hops: MAX_REDIRECTS,
            }),
        }
    }
}
