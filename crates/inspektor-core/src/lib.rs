//! Inspektor console core.
//!
//! Session and access logic for the Inspektor control plane console:
//! credential storage and SSO handoff, expiry evaluation, route guarding,
//! admin privilege gating and access reconciliation. Front ends build a
//! [`Console`] and drive it; nothing here renders anything.

pub mod api;
pub mod auth;
pub mod config;
pub mod console;
pub mod guard;
pub mod models;
pub mod privilege;
pub mod reconcile;

pub use api::{ApiClient, ApiError, ApiResult, ControlPlane, SsoEntry};
pub use auth::{Credential, TokenLifecycle, TokenStatus, TokenStore};
pub use config::{Config, StorageBackend};
pub use console::{Console, ConsoleError, Initialized, OpenOptions, SessionStatus};
pub use guard::{AuthState, GuardDecision, Navigation, NavigationGuard, Route};
pub use privilege::{PrivilegeGate, PrivilegeMode};
pub use reconcile::{AccessReconciler, AccessView, ReconcileError, RefreshOutcome};
