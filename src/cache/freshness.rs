//! Staleness checks and background refresh triggers.

use chrono::{DateTime, TimeDelta, Utc};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::debug;

use crate::config::CacheConfig;

use super::store::BillsCache;

/// Shortest refresh period the timer accepts
const MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(1);

/// Whether the client is currently in front of the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
  Visible,
  Hidden,
}

/// When the snapshot goes stale and how often to refresh it.
#[derive(Debug, Clone, Copy)]
pub struct FreshnessPolicy {
  pub stale_threshold: Duration,
  pub refresh_interval: Duration,
}

impl Default for FreshnessPolicy {
  fn default() -> Self {
    Self {
      stale_threshold: Duration::from_secs(45),
      refresh_interval: Duration::from_secs(45),
    }
  }
}

impl From<&CacheConfig> for FreshnessPolicy {
  fn from(config: &CacheConfig) -> Self {
    Self {
      stale_threshold: config.stale_threshold(),
      refresh_interval: config.refresh_interval().max(MIN_REFRESH_INTERVAL),
    }
  }
}

/// Owns the background refresh task; stopping or dropping it cancels the task.
///
/// Fetches already started by the task run to completion.
#[derive(Debug)]
pub struct RefreshHandle {
  task: JoinHandle<()>,
}

impl RefreshHandle {
  pub fn stop(self) {
    // Drop aborts the task
  }
}

impl Drop for RefreshHandle {
  fn drop(&mut self) {
    self.task.abort();
  }
}

impl BillsCache {
  /// Check if the snapshot is stale: never fetched, or older than the threshold.
  pub fn is_stale(&self) -> bool {
    self.is_stale_at(Utc::now())
  }

  pub fn is_stale_at(&self, now: DateTime<Utc>) -> bool {
    let threshold = TimeDelta::from_std(self.policy.stale_threshold).unwrap_or(TimeDelta::MAX);
    match self.last_fetch_time() {
      Some(fetched) => now - fetched > threshold,
      None => true,
    }
  }

  /// Start the refresh timer and the visibility watcher.
  ///
  /// Runs at most once per cache; later calls return `None` so repeated
  /// consumers never stack duplicate timers.
  pub fn install_triggers(
    self: &Arc<Self>,
    visibility: watch::Receiver<Visibility>,
  ) -> Option<RefreshHandle> {
    if self.triggers_installed.swap(true, Ordering::SeqCst) {
      debug!("Refresh triggers already installed");
      return None;
    }

    let task = tokio::spawn(run_triggers(
      Arc::downgrade(self),
      self.policy.refresh_interval.max(MIN_REFRESH_INTERVAL),
      visibility,
    ));
    Some(RefreshHandle { task })
  }

  /// Kick off the first fetch if nothing has been loaded or requested yet.
  ///
  /// Returns whether a fetch was started. Happens at most once per cache.
  pub fn ensure_initial_fetch(self: &Arc<Self>) -> bool {
    if self.snapshot().is_some() || self.is_loading() {
      return false;
    }
    if self.initial_fetch_started.swap(true, Ordering::SeqCst) {
      return false;
    }

    spawn_fetch(Arc::clone(self));
    true
  }

  /// Entry point for consumers: install triggers and load initial data.
  ///
  /// Only the first caller receives the `RefreshHandle`.
  pub fn attach(self: &Arc<Self>, visibility: watch::Receiver<Visibility>) -> Option<RefreshHandle> {
    let handle = self.install_triggers(visibility);
    self.ensure_initial_fetch();
    handle
  }
}

fn spawn_fetch(cache: Arc<BillsCache>) {
  tokio::spawn(async move { cache.fetch_bills().await });
}

async fn run_triggers(
  cache: Weak<BillsCache>,
  period: Duration,
  mut visibility: watch::Receiver<Visibility>,
) {
  let mut ticker = interval_at(Instant::now() + period, period);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

  let mut current = *visibility.borrow_and_update();
  let mut watching = true;

  loop {
    tokio::select! {
      _ = ticker.tick() => {
        let Some(live) = cache.upgrade() else { break };
        if live.is_loading() {
          debug!("Fetch in flight, skipping timed refresh");
          continue;
        }
        spawn_fetch(live);
      }
      changed = visibility.changed(), if watching => {
        if changed.is_err() {
          // Sender gone; keep refreshing on the timer alone
          watching = false;
          continue;
        }
        let next = *visibility.borrow_and_update();
        let became_visible = current == Visibility::Hidden && next == Visibility::Visible;
        current = next;

        if became_visible {
          let Some(live) = cache.upgrade() else { break };
          if live.is_stale() {
            debug!("Visible again with stale data, refreshing");
            spawn_fetch(live);
          }
        }
      }
    }
  }
}
