//! REST API client module for the Inspektor control plane.
//!
//! This module provides the `ApiClient` for talking to the control plane,
//! the `ControlPlane` trait the core components are written against, and
//! the typed `ApiError` every call returns on failure.
//!
//! Requests authenticate with the `Auth-Token` header, whose value lives in
//! a shared `AuthSlot` maintained by the token store.

pub mod client;
pub mod control_plane;
pub mod error;

pub use client::{ApiClient, AuthSlot, SsoEntry, AUTH_HEADER};
pub use control_plane::ControlPlane;
pub use error::{ApiError, ApiResult};
