use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::api::AuthSlot;

use super::cookie::HandoffCookieSource;
use super::storage::LocalStorage;
use super::Credential;

/// Storage slot the credential lives in.
pub const ACCESS_TOKEN_SLOT: &str = "access-token";

/// What `promote_from_cookie` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Promotion {
    /// No handoff cookie present; nothing touched
    NoCookie,
    /// Cookie matches the stored credential; nothing written
    Unchanged,
    /// Cookie value written over the stored credential
    Promoted,
}

/// Single owner of the current credential.
///
/// Clone is cheap and every clone refers to the same store. All writes to
/// the credential slot go through here, and every write re-attaches the
/// outgoing `Auth-Token` header.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<Inner>,
}

struct Inner {
    storage: Box<dyn LocalStorage>,
    cookies: Box<dyn HandoffCookieSource>,
    auth: AuthSlot,
}

impl TokenStore {
    /// Build the store and attach whatever credential is already persisted.
    pub fn new(
        storage: impl LocalStorage + 'static,
        cookies: impl HandoffCookieSource + 'static,
        auth: AuthSlot,
    ) -> Self {
        let store = Self {
            inner: Arc::new(Inner {
                storage: Box::new(storage),
                cookies: Box::new(cookies),
                auth,
            }),
        };
        let current = store.current();
        debug!(has_credential = current.is_some(), "Token store opened");
        store.attach_to_outgoing_requests(current.as_ref());
        store
    }

    fn read_slot(&self) -> Result<Option<String>> {
        self.inner
            .storage
            .get(ACCESS_TOKEN_SLOT)
            .context("Failed to read credential slot")
    }

    /// Copy the SSO handoff cookie into the credential slot.
    ///
    /// Safe to call on every navigation: the same cookie value twice
    /// results in one write.
    pub fn promote_from_cookie(&self) -> Result<Promotion> {
        let Some(token) = self.inner.cookies.handoff_token() else {
            return Ok(Promotion::NoCookie);
        };

        if self.read_slot()?.as_deref() == Some(token.as_str()) {
            return Ok(Promotion::Unchanged);
        }

        self.inner
            .storage
            .set(ACCESS_TOKEN_SLOT, &token)
            .context("Failed to store handoff credential")?;
        let credential = Credential::new(token);
        self.attach_to_outgoing_requests(Some(&credential));
        info!("Handoff credential promoted into local storage");
        Ok(Promotion::Promoted)
    }

    /// The stored credential. Unreadable storage counts as no credential.
    pub fn current(&self) -> Option<Credential> {
        match self.read_slot() {
            Ok(token) => token.filter(|t| !t.is_empty()).map(Credential::new),
            Err(e) => {
                warn!(error = %e, "Credential slot unreadable, treating as signed out");
                None
            }
        }
    }

    /// Store a credential obtained by login.
    pub fn set(&self, credential: &Credential) -> Result<()> {
        self.inner
            .storage
            .set(ACCESS_TOKEN_SLOT, credential.as_str())
            .context("Failed to store credential")?;
        self.attach_to_outgoing_requests(Some(credential));
        info!("Credential stored");
        Ok(())
    }

    /// Wipe all locally persisted session state, not just the credential.
    pub fn clear(&self) -> Result<()> {
        self.attach_to_outgoing_requests(None);
        self.inner
            .storage
            .clear()
            .context("Failed to clear local storage")?;
        info!("Local session state cleared");
        Ok(())
    }

    /// Make every subsequent backend call authenticate with `credential`.
    pub fn attach_to_outgoing_requests(&self, credential: Option<&Credential>) {
        self.inner.auth.attach(credential.map(Credential::as_str));
    }

    pub fn auth_slot(&self) -> &AuthSlot {
        &self.inner.auth
    }
}
