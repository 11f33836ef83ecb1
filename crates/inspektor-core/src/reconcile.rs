//! Access reconciliation.
//!
//! Fetches datasources, sessions and temporary credentials, joins standing
//! sessions onto the datasources they grant, projects temporary
//! credentials into their own list, and publishes both lists in a single
//! commit through a `watch` channel.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::TryFutureExt;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::api::{ApiError, ControlPlane};
use crate::models::{AccessSession, Datasource, SessionAttachment, TempCredential};

/// The reconciled access state the console renders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AccessView {
    /// Persistent datasources; those with a standing session carry its meta
    pub datasources: Vec<Datasource>,
    /// One entry per temporary credential, cloned from its datasource snapshot
    pub temp_datasources: Vec<Datasource>,
    /// Generation of the cycle that produced this view; 0 before any commit
    pub generation: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl AccessView {
    pub fn accessible(&self) -> impl Iterator<Item = &Datasource> {
        self.datasources.iter().filter(|d| d.has_access())
    }

    pub fn is_empty(&self) -> bool {
        self.datasources.is_empty() && self.temp_datasources.is_empty()
    }

    pub fn age_display(&self) -> String {
        let Some(refreshed_at) = self.refreshed_at else {
            return "never".to_string();
        };
        let minutes = (Utc::now() - refreshed_at).num_minutes();
        if minutes < 1 {
            "just now".to_string()
        } else if minutes < 60 {
            format!("{}m ago", minutes)
        } else if minutes < 1440 {
            format!("{}h ago", minutes / 60)
        } else {
            format!("{}d ago", minutes / 1440)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Datasources,
    Sessions,
    TempCredentials,
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Collection::Datasources => write!(f, "datasources"),
            Collection::Sessions => write!(f, "sessions"),
            Collection::TempCredentials => write!(f, "temporary credentials"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to fetch {collection}: {source}")]
    Fetch {
        collection: Collection,
        #[source]
        source: ApiError,
    },
}

impl ReconcileError {
    pub fn api_error(&self) -> &ApiError {
        match self {
            ReconcileError::Fetch { source, .. } => source,
        }
    }
}

fn fetch_failed(collection: Collection) -> impl FnOnce(ApiError) -> ReconcileError {
    move |source| ReconcileError::Fetch { collection, source }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Committed(u64),
    /// A newer cycle was issued while this one was in flight
    Superseded,
}

// ============================================================================
// Merge
// ============================================================================

/// Attach each standing session to the datasources it grants.
///
/// Only sessions whose `expiresAt` is exactly 0 count as standing; the rest
/// are ignored here. Every datasource carrying the session's object id gets
/// the meta. When two standing sessions point at the same datasource the
/// later one wins.
pub fn attach_standing_sessions(datasources: &mut [Datasource], sessions: &[AccessSession]) {
    for session in sessions.iter().filter(|s| s.is_standing()) {
        let mut attached = false;
        for datasource in datasources.iter_mut().filter(|d| d.id == session.object_id) {
            if datasource.session_meta.is_some() {
                warn!(
                    datasource_id = datasource.id,
                    session_id = session.id,
                    "Multiple standing sessions on one datasource, keeping the last"
                );
            }
            datasource.session_meta = Some(SessionAttachment::Standing(session.meta.clone()));
            attached = true;
        }
        if !attached {
            debug!(
                session_id = session.id,
                datasource_id = session.object_id,
                "Standing session for unknown datasource"
            );
        }
    }
}

/// One datasource per temporary credential, carrying the credential itself.
pub fn project_temp_credentials(temps: Vec<TempCredential>) -> Vec<Datasource> {
    temps
        .into_iter()
        .map(|temp| {
            let mut datasource = temp.datasource.clone();
            datasource.session_meta = Some(SessionAttachment::Temporary(Box::new(temp)));
            datasource
        })
        .collect()
}

// ============================================================================
// Engine
// ============================================================================

pub struct AccessReconciler<B: ControlPlane> {
    backend: Arc<B>,
    view: watch::Sender<AccessView>,
    generation: AtomicU64,
}

impl<B: ControlPlane> AccessReconciler<B> {
    pub fn new(backend: Arc<B>) -> Self {
        let (view, _) = watch::channel(AccessView::default());
        Self {
            backend,
            view,
            generation: AtomicU64::new(0),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<AccessView> {
        self.view.subscribe()
    }

    pub fn snapshot(&self) -> AccessView {
        self.view.borrow().clone()
    }

    /// Run one reconciliation cycle.
    pub async fn refresh(&self) -> Result<RefreshOutcome, ReconcileError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, "Reconciliation started");

        let (datasources, sessions, temps) = tokio::join!(
            self.backend
                .datasources()
                .map_err(fetch_failed(Collection::Datasources)),
            self.backend
                .sessions()
                .map_err(fetch_failed(Collection::Sessions)),
            self.backend
                .temp_credentials()
                .map_err(fetch_failed(Collection::TempCredentials)),
        );

        let result = datasources.and_then(|d| Ok((d, sessions?, temps?)));
        let (mut datasources, sessions, temps) = match result {
            Ok(fetched) => fetched,
            Err(e) => {
                error!(generation, error = %e, "Reconciliation aborted");
                return Err(e);
            }
        };

        attach_standing_sessions(&mut datasources, &sessions);
        let temp_datasources = project_temp_credentials(temps);

        let committed = self.view.send_if_modified(|view| {
            if self.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            view.datasources.clear();
            view.datasources.extend(datasources);
            view.temp_datasources.clear();
            view.temp_datasources.extend(temp_datasources);
            view.generation = generation;
            view.refreshed_at = Some(Utc::now());
            true
        });

        if committed {
            let view = self.view.borrow();
            info!(
                generation,
                datasources = view.datasources.len(),
                accessible = view.accessible().count(),
                temporary = view.temp_datasources.len(),
                "Access view committed"
            );
            Ok(RefreshOutcome::Committed(generation))
        } else {
            debug!(generation, "Reconciliation superseded, discarding result");
            Ok(RefreshOutcome::Superseded)
        }
    }

    /// Empty the view and supersede any cycle still in flight.
    pub fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.view.send_modify(|view| {
            view.datasources.clear();
            view.temp_datasources.clear();
            view.generation = 0;
            view.refreshed_at = None;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionMeta;
    use crate::testing::{datasource, session, temp_credential, FakeControlPlane};
    use tokio::sync::oneshot;

    fn reconciler(backend: FakeControlPlane) -> (Arc<AccessReconciler<FakeControlPlane>>, Arc<FakeControlPlane>) {
        let backend = Arc::new(backend);
        (Arc::new(AccessReconciler::new(Arc::clone(&backend))), backend)
    }

    #[test]
    fn test_only_standing_sessions_attach() {
        let mut datasources = vec![datasource(1), datasource(2)];
        let sessions = vec![session(10, 1, 0), session(11, 2, 99_999)];

        attach_standing_sessions(&mut datasources, &sessions);

        assert!(matches!(
            datasources[0].session_meta,
            Some(SessionAttachment::Standing(ref meta)) if meta.expires_at == Some(0)
        ));
        assert_eq!(datasources[1].session_meta, None);
    }

    #[test]
    fn test_last_standing_session_wins() {
        let mut datasources = vec![datasource(1)];
        let mut first = session(10, 1, 0);
        first.meta.postgres_username = "first".to_string();
        let mut second = session(11, 1, 0);
        second.meta.postgres_username = "second".to_string();

        attach_standing_sessions(&mut datasources, &[first, second]);

        let meta = datasources[0].session_meta.as_ref().unwrap().meta();
        assert_eq!(meta.postgres_username, "second");
    }

    #[test]
    fn test_sessions_without_expiry_never_attach() {
        let sessions: Vec<AccessSession> = serde_json::from_str(
            r#"[{"ID": 5, "objectID": 1, "meta": null},
                {"ID": 6, "objectID": 2, "meta": {"type": "postgres"}}]"#,
        )
        .unwrap();
        let mut datasources = vec![datasource(1), datasource(2)];

        attach_standing_sessions(&mut datasources, &sessions);

        assert!(datasources.iter().all(|d| d.session_meta.is_none()));
    }

    #[test]
    fn test_duplicate_datasource_ids_all_attach() {
        let mut datasources = vec![datasource(1), datasource(1), datasource(2)];

        attach_standing_sessions(&mut datasources, &[session(10, 1, 0)]);

        assert!(datasources[0].has_access());
        assert!(datasources[1].has_access());
        assert!(!datasources[2].has_access());
    }

    #[test]
    fn test_unknown_datasource_sessions_are_ignored() {
        let mut datasources = vec![datasource(1)];
        attach_standing_sessions(&mut datasources, &[session(10, 42, 0)]);
        assert!(!datasources[0].has_access());
    }

    #[test]
    fn test_projection_clones_snapshot_and_attaches_credential() {
        let temp = temp_credential(7, 3, 1_900_000_000_000_000_000);
        let projected = project_temp_credentials(vec![temp.clone()]);

        assert_eq!(projected.len(), 1);
        assert_eq!(projected[0].id, 3);
        match &projected[0].session_meta {
            Some(SessionAttachment::Temporary(attached)) => assert_eq!(**attached, temp),
            other => panic!("expected temporary attachment, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_refresh_commits_both_lists() {
        let (reconciler, _backend) = reconciler(
            FakeControlPlane::new()
                .with_datasources(vec![datasource(1), datasource(2)])
                .with_sessions(vec![session(10, 1, 0), session(11, 2, 99_999)])
                .with_temp_credentials(vec![temp_credential(20, 2, 1_900_000_000_000_000_000)]),
        );
        let mut rx = reconciler.subscribe();

        let outcome = reconciler.refresh().await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Committed(1));
        assert!(rx.has_changed().unwrap());

        let view = rx.borrow_and_update().clone();
        assert_eq!(view.generation, 1);
        assert!(view.refreshed_at.is_some());
        assert_eq!(view.accessible().map(|d| d.id).collect::<Vec<_>>(), vec![1]);
        assert_eq!(view.temp_datasources.len(), 1);
        assert!(view.temp_datasources[0].session_meta.as_ref().unwrap().is_temporary());
    }

    #[tokio::test]
    async fn test_temp_credentials_never_enter_persistent_list() {
        let (reconciler, _backend) = reconciler(
            FakeControlPlane::new()
                .with_datasources(vec![datasource(1)])
                .with_temp_credentials(vec![
                    temp_credential(20, 1, 1_900_000_000_000_000_000),
                    temp_credential(21, 5, 1_900_000_000_000_000_000),
                ]),
        );
        reconciler.refresh().await.unwrap();

        let view = reconciler.snapshot();
        assert_eq!(view.datasources.len(), 1);
        assert!(view
            .datasources
            .iter()
            .all(|d| !d.session_meta.as_ref().is_some_and(SessionAttachment::is_temporary)));
        assert_eq!(view.temp_datasources.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_fetch_keeps_previous_view() {
        let (reconciler, backend) = reconciler(
            FakeControlPlane::new()
                .with_datasources(vec![datasource(1)])
                .with_sessions(vec![session(10, 1, 0)]),
        );
        reconciler.refresh().await.unwrap();
        let before = reconciler.snapshot();

        backend.fail_sessions(ApiError::ServerError("boom".to_string()));
        let err = reconciler.refresh().await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Fetch {
                collection: Collection::Sessions,
                ..
            }
        ));
        assert_eq!(reconciler.snapshot(), before);
    }

    #[tokio::test]
    async fn test_failed_datasource_fetch_keeps_previous_view() {
        let (reconciler, backend) = reconciler(
            FakeControlPlane::new()
                .with_datasources(vec![datasource(1)])
                .with_sessions(vec![session(10, 1, 0)])
                .with_temp_credentials(vec![temp_credential(20, 1, 1_900_000_000_000_000_000)]),
        );
        reconciler.refresh().await.unwrap();
        let before = reconciler.snapshot();

        backend.set_datasources(vec![datasource(1), datasource(2)]);
        backend.fail_datasources(ApiError::ServerError("boom".to_string()));
        let err = reconciler.refresh().await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Fetch {
                collection: Collection::Datasources,
                ..
            }
        ));
        assert_eq!(reconciler.snapshot(), before);
    }

    #[tokio::test]
    async fn test_failed_temp_fetch_commits_nothing() {
        let (reconciler, backend) = reconciler(
            FakeControlPlane::new()
                .with_datasources(vec![datasource(1)])
                .with_sessions(vec![session(10, 1, 0)]),
        );
        reconciler.refresh().await.unwrap();
        let before = reconciler.snapshot();
        let mut rx = reconciler.subscribe();

        // Datasources and sessions succeed with new data; the merged list
        // must not be published without the temporary list.
        backend.set_datasources(vec![datasource(1), datasource(2)]);
        backend.fail_temp_credentials(ApiError::Unauthorized);
        let err = reconciler.refresh().await.unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::Fetch {
                collection: Collection::TempCredentials,
                ..
            }
        ));
        assert!(err.api_error().is_auth_failure());
        assert!(!rx.has_changed().unwrap());
        assert_eq!(reconciler.snapshot(), before);

        let outcome = reconciler.refresh().await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Committed(3));
        assert_eq!(reconciler.snapshot().datasources.len(), 2);
    }

    #[tokio::test]
    async fn test_superseded_cycle_never_commits() {
        let (reconciler, backend) = reconciler(
            FakeControlPlane::new().with_datasources(vec![datasource(1)]),
        );

        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        backend.hold_datasources(entered_tx, release_rx);

        let stale = tokio::spawn({
            let reconciler = Arc::clone(&reconciler);
            async move { reconciler.refresh().await }
        });
        entered_rx.await.unwrap();

        backend.set_datasources(vec![datasource(2), datasource(3)]);
        let fresh = reconciler.refresh().await.unwrap();
        assert_eq!(fresh, RefreshOutcome::Committed(2));

        release_tx.send(()).unwrap();
        let stale = stale.await.unwrap().unwrap();
        assert_eq!(stale, RefreshOutcome::Superseded);

        let view = reconciler.snapshot();
        assert_eq!(view.generation, 2);
        assert_eq!(view.datasources.iter().map(|d| d.id).collect::<Vec<_>>(), vec![2, 3]);
    }

    #[tokio::test]
    async fn test_reset_clears_view() {
        let (reconciler, _backend) = reconciler(
            FakeControlPlane::new()
                .with_datasources(vec![datasource(1)])
                .with_sessions(vec![AccessSession {
                    id: 1,
                    object_id: 1,
                    meta: SessionMeta::default(),
                }]),
        );
        reconciler.refresh().await.unwrap();
        assert!(!reconciler.snapshot().is_empty());

        reconciler.reset();
        let view = reconciler.snapshot();
        assert!(view.is_empty());
        assert_eq!(view.age_display(), "never");

        let outcome = reconciler.refresh().await.unwrap();
        assert_eq!(outcome, RefreshOutcome::Committed(3));
    }
}
