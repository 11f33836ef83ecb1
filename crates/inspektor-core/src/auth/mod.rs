//! Credential handling for the control plane client.
//!
//! This module provides:
//! - `Credential`, `Claims`: the signed token and its decoded claims
//! - `LocalStorage`: persisted slots (file, OS keychain, or memory)
//! - `HandoffCookieSource`: where the SSO `servertoken` cookie is read from
//! - `TokenStore`: the single owner of the current credential
//! - `TokenLifecycle`: expiry evaluation that resets local state on expiry

pub mod cookie;
pub mod credential;
pub mod lifecycle;
pub mod storage;
pub mod token_store;

pub use cookie::{HandoffCookieSource, JarCookieSource, StaticCookieSource, HANDOFF_COOKIE};
pub use credential::{Claims, Credential, DecodeError};
pub use lifecycle::{TokenLifecycle, TokenStatus};
pub use storage::{FileStorage, KeyringStorage, LocalStorage, MemoryStorage};
pub use token_store::{Promotion, TokenStore, ACCESS_TOKEN_SLOT};
