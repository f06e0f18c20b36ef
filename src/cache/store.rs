//! State store and fetch pipeline.

use chrono::{DateTime, Utc};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::api::types::{BillsSnapshot, User};

use super::freshness::FreshnessPolicy;
use super::projections::ProjectionMemo;
use super::traits::BillsSource;

/// Message stored when a failed fetch carried no server explanation
const FETCH_FAILED: &str = "Failed to fetch bills";

/// Everything the cache knows, guarded by a single mutex.
#[derive(Default)]
pub(super) struct CacheState {
  pub(super) snapshot: Option<Arc<BillsSnapshot>>,
  pub(super) loading: bool,
  pub(super) error: Option<String>,
  pub(super) last_fetch: Option<DateTime<Utc>>,
  /// Bumped on every snapshot write; projections are memoized against it
  pub(super) revision: u64,
  pub(super) projections: ProjectionMemo,
}

/// Shared state plus the revision broadcast.
///
/// Split out of `BillsCache` so a `Rollback` can hold it without keeping the
/// background machinery alive.
pub(super) struct Store {
  state: Mutex<CacheState>,
  revisions: watch::Sender<u64>,
}

impl Store {
  fn new() -> Self {
    let (revisions, _) = watch::channel(0);
    Self {
      state: Mutex::new(CacheState::default()),
      revisions,
    }
  }

  /// Lock the state. No code panics while holding the lock, so a poisoned
  /// mutex still holds consistent data.
  pub(super) fn lock(&self) -> MutexGuard<'_, CacheState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Replace the snapshot and announce the new revision.
  pub(super) fn commit(&self, state: &mut CacheState, snapshot: Option<Arc<BillsSnapshot>>) {
    state.snapshot = snapshot;
    state.revision += 1;
    self.revisions.send_replace(state.revision);
  }
}

/// Process-wide cache of the signed-in user's bills.
///
/// Construct once with [`BillsCache::new`] and share the returned `Arc`
/// between every consumer; all of them observe each other's writes.
pub struct BillsCache {
  pub(super) store: Arc<Store>,
  pub(super) source: Arc<dyn BillsSource>,
  pub(super) policy: FreshnessPolicy,
  pub(super) triggers_installed: AtomicBool,
  pub(super) initial_fetch_started: AtomicBool,
}

impl BillsCache {
  pub fn new(source: Arc<dyn BillsSource>, policy: FreshnessPolicy) -> Arc<Self> {
    Arc::new(Self {
      store: Arc::new(Store::new()),
      source,
      policy,
      triggers_installed: AtomicBool::new(false),
      initial_fetch_started: AtomicBool::new(false),
    })
  }

  /// Current snapshot, if any fetch or optimistic edit produced one
  pub fn snapshot(&self) -> Option<Arc<BillsSnapshot>> {
    self.store.lock().snapshot.clone()
  }

  pub fn is_loading(&self) -> bool {
    self.store.lock().loading
  }

  /// Message from the last failed fetch, cleared when a new fetch starts
  pub fn error(&self) -> Option<String> {
    self.store.lock().error.clone()
  }

  pub fn last_fetch_time(&self) -> Option<DateTime<Utc>> {
    self.store.lock().last_fetch
  }

  pub fn revision(&self) -> u64 {
    self.store.lock().revision
  }

  /// Receiver that wakes whenever the snapshot changes
  pub fn subscribe(&self) -> watch::Receiver<u64> {
    self.store.revisions.subscribe()
  }

  /// Load the authoritative snapshot and replace the local one.
  ///
  /// Never fails: errors land in [`BillsCache::error`] and the previous
  /// snapshot is kept. Concurrent calls are allowed and the last one to
  /// complete wins, discarding any unreconciled optimistic edits.
  pub async fn fetch_bills(&self) {
    {
      let mut state = self.store.lock();
      state.loading = true;
      state.error = None;
    }

    let result = self.source.fetch_bills().await;

    let mut state = self.store.lock();
    match result {
      Ok(mut snapshot) => {
        snapshot.link_shared();
        info!(
          owns = snapshot.owns.len(),
          owes = snapshot.owes.len(),
          "Fetched bills"
        );
        state.last_fetch = Some(Utc::now());
        self.store.commit(&mut state, Some(Arc::new(snapshot)));
      }
      Err(e) => {
        error!(error = %e, "Failed to fetch bills");
        state.error = Some(e.user_message(FETCH_FAILED));
      }
    }
    state.loading = false;
  }

  /// Look up one user in the directory. Best effort: failures are logged
  /// and reported as `None`.
  pub async fn fetch_user_details(&self, user_id: &str) -> Option<User> {
    match self.source.fetch_users().await {
      Ok(users) => users.into_iter().find(|u| u.id == user_id),
      Err(e) => {
        warn!(error = %e, user_id, "Failed to fetch user details");
        None
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::error::ApiError;
  use crate::cache::testing::{bill, participant, ScriptedSource};
  use reqwest::StatusCode;

  fn snapshot_with(ids: &[&str]) -> BillsSnapshot {
    BillsSnapshot {
      owns: ids
        .iter()
        .map(|id| Arc::new(bill(id, "u1", vec![participant("u2", "5.00")])))
        .collect(),
      owes: Vec::new(),
    }
  }

  #[tokio::test]
  async fn test_fetch_success_replaces_snapshot() {
    let source = ScriptedSource::new();
    source.push_bills(Ok(snapshot_with(&["b1", "b2"])));
    let cache = BillsCache::new(source.clone(), FreshnessPolicy::default());

    assert!(cache.snapshot().is_none());
    cache.fetch_bills().await;

    let snapshot = cache.snapshot().unwrap();
    assert_eq!(snapshot.owns.len(), 2);
    assert!(!cache.is_loading());
    assert!(cache.error().is_none());
    assert!(cache.last_fetch_time().is_some());
    assert_eq!(cache.revision(), 1);
  }

  #[tokio::test]
  async fn test_fetch_failure_keeps_previous_snapshot() {
    let source = ScriptedSource::new();
    source.push_bills(Ok(snapshot_with(&["b1"])));
    source.push_bills(Err(ApiError::from_status(
      StatusCode::UNAUTHORIZED,
      Some("Unauthorized".into()),
    )));
    let cache = BillsCache::new(source.clone(), FreshnessPolicy::default());

    cache.fetch_bills().await;
    let fetched_at = cache.last_fetch_time();
    cache.fetch_bills().await;

    assert_eq!(cache.error().as_deref(), Some("Unauthorized"));
    assert_eq!(cache.snapshot().unwrap().owns[0].id.as_str(), "b1");
    assert_eq!(cache.last_fetch_time(), fetched_at);
    assert!(!cache.is_loading());
  }

  #[tokio::test]
  async fn test_fetch_failure_without_message_uses_fallback() {
    let source = ScriptedSource::new();
    source.push_bills(Err(ApiError::Decode("truncated".into())));
    let cache = BillsCache::new(source.clone(), FreshnessPolicy::default());

    cache.fetch_bills().await;

    assert_eq!(cache.error().as_deref(), Some("Failed to fetch bills"));
    assert!(cache.snapshot().is_none());
  }

  #[tokio::test]
  async fn test_new_fetch_clears_previous_error() {
    let source = ScriptedSource::new();
    source.push_bills(Err(ApiError::Decode("truncated".into())));
    source.push_bills(Ok(snapshot_with(&["b1"])));
    let cache = BillsCache::new(source.clone(), FreshnessPolicy::default());

    cache.fetch_bills().await;
    assert!(cache.error().is_some());
    cache.fetch_bills().await;
    assert!(cache.error().is_none());
  }

  #[tokio::test]
  async fn test_loading_is_visible_while_in_flight() {
    let source = ScriptedSource::gated();
    source.push_bills(Ok(snapshot_with(&["b1"])));
    let cache = BillsCache::new(source.clone(), FreshnessPolicy::default());

    let task = tokio::spawn({
      let cache = Arc::clone(&cache);
      async move { cache.fetch_bills().await }
    });
    tokio::task::yield_now().await;
    while source.calls() == 0 {
      tokio::task::yield_now().await;
    }

    assert!(cache.is_loading());
    source.release();
    task.await.unwrap();
    assert!(!cache.is_loading());
  }

  #[tokio::test]
  async fn test_subscribers_see_revisions() {
    let source = ScriptedSource::new();
    source.push_bills(Ok(snapshot_with(&["b1"])));
    let cache = BillsCache::new(source.clone(), FreshnessPolicy::default());
    let mut rx = cache.subscribe();

    cache.fetch_bills().await;

    assert!(rx.has_changed().unwrap());
    assert_eq!(*rx.borrow_and_update(), 1);
  }

  #[tokio::test]
  async fn test_fetch_user_details() {
    let source = ScriptedSource::new();
    source.set_users(Ok(vec![User {
      id: "u2".into(),
      email: "bo@example.com".into(),
      display_name: "Bo".into(),
    }]));
    let cache = BillsCache::new(source.clone(), FreshnessPolicy::default());

    let user = cache.fetch_user_details("u2").await.unwrap();
    assert_eq!(user.display_name, "Bo");
    assert!(cache.fetch_user_details("u9").await.is_none());
  }

  #[tokio::test]
  async fn test_fetch_user_details_swallows_errors() {
    let source = ScriptedSource::new();
    source.set_users(Err(ApiError::Decode("bad json".into())));
    let cache = BillsCache::new(source.clone(), FreshnessPolicy::default());

    assert!(cache.fetch_user_details("u2").await.is_none());
    assert!(cache.error().is_none());
  }
}
