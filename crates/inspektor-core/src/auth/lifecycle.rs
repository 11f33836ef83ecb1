use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use super::{Credential, TokenStore};

/// Outcome of evaluating a credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenStatus {
    /// No credential stored
    Absent,
    Valid { expires_at: DateTime<Utc> },
    /// Decoded fine, expiration in the past
    Expired,
    /// Present but not decodable into claims
    Malformed,
}

impl TokenStatus {
    /// Anything but `Valid` counts as expired.
    pub fn is_expired(&self) -> bool {
        !self.is_valid()
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, TokenStatus::Valid { .. })
    }

    /// Get minutes remaining until expiry (for display)
    pub fn minutes_until_expiry(&self) -> i64 {
        match self {
            TokenStatus::Valid { expires_at } => (*expires_at - Utc::now()).num_minutes().max(0),
            _ => 0,
        }
    }
}

/// Current time rounded to the nearest second.
fn now_secs() -> i64 {
    (Utc::now().timestamp_millis() + 500).div_euclid(1000)
}

/// Decides whether a credential is usable and enforces what expiry means.
///
/// A present but unusable credential triggers `TokenStore::clear()` as
/// part of the check, once per check, so no caller ever sees "expired"
/// while stale state is still on disk.
#[derive(Clone)]
pub struct TokenLifecycle {
    store: TokenStore,
}

impl TokenLifecycle {
    pub fn new(store: TokenStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub fn is_expired(&self, credential: Option<&Credential>) -> bool {
        self.evaluate(credential).is_expired()
    }

    pub fn evaluate(&self, credential: Option<&Credential>) -> TokenStatus {
        self.evaluate_at(credential, now_secs())
    }

    pub fn evaluate_at(&self, credential: Option<&Credential>, now: i64) -> TokenStatus {
        let Some(credential) = credential else {
            return TokenStatus::Absent;
        };

        let status = match credential.claims() {
            Ok(claims) if claims.is_expired_at(now) => TokenStatus::Expired,
            Ok(claims) => TokenStatus::Valid {
                expires_at: claims.expires_at,
            },
            Err(e) => {
                debug!(error = %e, "Credential failed to decode");
                TokenStatus::Malformed
            }
        };

        if !status.is_valid() {
            info!(?status, "Credential unusable, resetting local session state");
            if let Err(e) = self.store.clear() {
                error!(error = %e, "Failed to clear local session state");
            }
        }
        status
    }

    /// Evaluate whatever the store currently holds.
    pub fn check_current(&self) -> TokenStatus {
        let current = self.store.current();
        self.evaluate(current.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::AuthSlot;
    use crate::auth::{LocalStorage, MemoryStorage, StaticCookieSource, ACCESS_TOKEN_SLOT};
    use crate::testing::mint_credential;
    use std::sync::Arc;

    fn lifecycle() -> (TokenLifecycle, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let store = TokenStore::new(
            Arc::clone(&storage),
            StaticCookieSource::default(),
            AuthSlot::new(),
        );
        (TokenLifecycle::new(store), storage)
    }

    #[test]
    fn test_past_expiry_is_expired_and_clears_state() {
        let (lifecycle, storage) = lifecycle();
        let credential = mint_credential(Utc::now().timestamp() - 60);
        lifecycle.store().set(&credential).unwrap();
        storage.set("other-slot", "value").unwrap();

        assert!(lifecycle.is_expired(Some(&credential)));
        assert!(storage.is_empty());
        assert!(!lifecycle.store().auth_slot().is_attached());
    }

    #[test]
    fn test_future_expiry_is_valid_and_keeps_state() {
        let (lifecycle, storage) = lifecycle();
        let credential = mint_credential(Utc::now().timestamp() + 3600);
        lifecycle.store().set(&credential).unwrap();

        assert!(!lifecycle.is_expired(Some(&credential)));
        assert_eq!(storage.get(ACCESS_TOKEN_SLOT).unwrap().as_deref(), Some(credential.as_str()));
        assert!(matches!(lifecycle.check_current(), TokenStatus::Valid { .. }));
    }

    #[test]
    fn test_malformed_fails_closed() {
        let (lifecycle, storage) = lifecycle();
        let credential = Credential::new("definitely-not-a-jwt");
        lifecycle.store().set(&credential).unwrap();

        assert_eq!(lifecycle.evaluate(Some(&credential)), TokenStatus::Malformed);
        assert!(lifecycle.is_expired(Some(&Credential::new("a.b"))));
        assert!(storage.is_empty());
    }

    #[test]
    fn test_absent_is_expired_without_clearing() {
        let (lifecycle, storage) = lifecycle();
        storage.set("other-slot", "value").unwrap();

        assert_eq!(lifecycle.evaluate(None), TokenStatus::Absent);
        assert!(lifecycle.is_expired(None));
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn test_recheck_after_clear_is_absent() {
        let (lifecycle, _storage) = lifecycle();
        let credential = mint_credential(1_000);
        lifecycle.store().set(&credential).unwrap();

        assert_eq!(lifecycle.check_current(), TokenStatus::Expired);
        assert_eq!(lifecycle.check_current(), TokenStatus::Absent);
    }

    #[test]
    fn test_evaluate_at_boundary() {
        let (lifecycle, _storage) = lifecycle();
        let credential = mint_credential(5_000);
        assert!(lifecycle.evaluate_at(Some(&credential), 5_000).is_valid());
        assert_eq!(lifecycle.evaluate_at(Some(&credential), 5_001), TokenStatus::Expired);
    }

    #[test]
    fn test_minutes_until_expiry() {
        let valid = TokenStatus::Valid {
            expires_at: Utc::now() + chrono::Duration::minutes(90),
        };
        assert!(valid.minutes_until_expiry() >= 89);
        assert_eq!(TokenStatus::Expired.minutes_until_expiry(), 0);
    }
}
