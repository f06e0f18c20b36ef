//! Test doubles and fixtures for the bills cache.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::api::error::{ApiError, ApiResult};
use crate::api::types::{Bill, BillId, BillsSnapshot, Participant, User};

use super::traits::BillsSource;

/// `BillsSource` that replays queued results.
///
/// An empty queue yields an empty snapshot. A gated source parks every
/// fetch until [`ScriptedSource::release`] is called.
pub(crate) struct ScriptedSource {
  bills: Mutex<VecDeque<ApiResult<BillsSnapshot>>>,
  users: Mutex<Result<Vec<User>, String>>,
  calls: AtomicUsize,
  gate: Option<Notify>,
}

impl ScriptedSource {
  pub(crate) fn new() -> Arc<Self> {
    Arc::new(Self::build(None))
  }

  pub(crate) fn gated() -> Arc<Self> {
    Arc::new(Self::build(Some(Notify::new())))
  }

  fn build(gate: Option<Notify>) -> Self {
    Self {
      bills: Mutex::new(VecDeque::new()),
      users: Mutex::new(Ok(Vec::new())),
      calls: AtomicUsize::new(0),
      gate,
    }
  }

  pub(crate) fn push_bills(&self, result: ApiResult<BillsSnapshot>) {
    self.bills.lock().unwrap().push_back(result);
  }

  pub(crate) fn set_users(&self, result: ApiResult<Vec<User>>) {
    *self.users.lock().unwrap() = result.map_err(|e| e.to_string());
  }

  /// Number of bills fetches started so far
  pub(crate) fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  /// Let one parked (or the next) fetch complete
  pub(crate) fn release(&self) {
    if let Some(gate) = &self.gate {
      gate.notify_one();
    }
  }
}

#[async_trait]
impl BillsSource for ScriptedSource {
  async fn fetch_bills(&self) -> ApiResult<BillsSnapshot> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    if let Some(gate) = &self.gate {
      gate.notified().await;
    }
    self
      .bills
      .lock()
      .unwrap()
      .pop_front()
      .unwrap_or_else(|| Ok(BillsSnapshot::default()))
  }

  async fn fetch_users(&self) -> ApiResult<Vec<User>> {
    self.users.lock().unwrap().clone().map_err(ApiError::Decode)
  }
}

pub(crate) fn participant(user_id: &str, amount: &str) -> Participant {
  Participant {
    user_id: user_id.to_string(),
    amount_owed: amount.parse().unwrap(),
    email: format!("{}@example.com", user_id),
    display_name: format!("User {}", user_id.to_uppercase()),
  }
}

pub(crate) fn bill(id: &str, owner: &str, participants: Vec<Participant>) -> Bill {
  Bill {
    id: BillId::from(id),
    owner_user_id: owner.to_string(),
    title: format!("Bill {}", id),
    total_amount: "30.00".parse().unwrap(),
    due_date: None,
    created_at: Utc.with_ymd_and_hms(2025, 1, 15, 9, 30, 0).unwrap(),
    participants,
  }
}
