//! Speculative edits applied ahead of server confirmation.
//!
//! Every edit builds a new snapshot next to the current one instead of
//! mutating it. Bills are shared through `Arc`, so the previous snapshot
//! stays intact and restoring it is a pointer swap.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::debug;

use crate::api::types::{
  Amount, Bill, BillId, BillsSnapshot, OwedBill, Participant, ParticipantRecord,
};

use super::store::{BillsCache, Store};

/// Fields for a bill created locally before the server has seen it
#[derive(Debug, Clone)]
pub struct NewBillDraft {
  /// Leave `None` to get a fresh temporary id
  pub id: Option<BillId>,
  pub owner_user_id: String,
  pub title: String,
  pub total_amount: Amount,
  pub due_date: Option<DateTime<Utc>>,
  /// Defaults to now
  pub created_at: Option<DateTime<Utc>>,
}

/// Partial update of a bill's own fields
#[derive(Debug, Clone, Default)]
pub struct BillUpdate {
  pub title: Option<String>,
  pub total_amount: Option<Amount>,
  /// `Some(None)` clears the due date
  pub due_date: Option<Option<DateTime<Utc>>>,
}

/// Server-assigned fields of a freshly created bill
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmedBill {
  pub id: BillId,
  pub created_at: DateTime<Utc>,
  pub due_date: Option<DateTime<Utc>>,
  pub total_amount: Option<Amount>,
}

impl From<&Bill> for ConfirmedBill {
  fn from(bill: &Bill) -> Self {
    Self {
      id: bill.id.clone(),
      created_at: bill.created_at,
      due_date: bill.due_date,
      total_amount: Some(bill.total_amount.clone()),
    }
  }
}

/// Undo for one optimistic edit.
///
/// Applying it puts back the snapshot captured right before the edit,
/// including "no snapshot at all".
#[must_use = "keep the rollback until the server confirms the edit"]
pub struct Rollback {
  restore: Option<(Arc<Store>, Option<Arc<BillsSnapshot>>)>,
}

impl Rollback {
  /// A rollback that does nothing
  pub fn noop() -> Self {
    Self { restore: None }
  }

  fn restoring(store: &Arc<Store>, previous: Option<Arc<BillsSnapshot>>) -> Self {
    Self {
      restore: Some((Arc::clone(store), previous)),
    }
  }

  pub fn is_noop(&self) -> bool {
    self.restore.is_none()
  }

  pub fn apply(self) {
    if let Some((store, previous)) = self.restore {
      let mut state = store.lock();
      store.commit(&mut state, previous);
      debug!("Rolled back optimistic edit");
    }
  }
}

impl std::fmt::Debug for Rollback {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Rollback")
      .field("noop", &self.is_noop())
      .finish()
  }
}

impl BillsCache {
  /// Append a locally created bill to `owns`.
  ///
  /// If someone other than the owner participates, the first such
  /// participant's share is also appended to `owes` so it shows up before
  /// the next fetch. Returns the bill's id (temporary unless one was given).
  /// A given id that is already in `owns` leaves the cache untouched.
  pub fn optimistically_add_bill(
    &self,
    draft: NewBillDraft,
    participants: Vec<Participant>,
  ) -> (BillId, Rollback) {
    let id = draft.id.unwrap_or_else(BillId::temporary);
    let mut state = self.store.lock();
    if let Some(existing) = &state.snapshot {
      if existing.find_owned(&id).is_some() {
        debug!(bill_id = %id, "Bill already cached, skipping optimistic add");
        return (id, Rollback::noop());
      }
    }

    let bill = Arc::new(Bill {
      id: id.clone(),
      owner_user_id: draft.owner_user_id,
      title: draft.title,
      total_amount: draft.total_amount,
      due_date: draft.due_date,
      created_at: draft.created_at.unwrap_or_else(Utc::now),
      participants,
    });

    let owed = bill
      .non_owner_participants()
      .next()
      .map(|p| OwedBill {
        bill: Arc::clone(&bill),
        participant: ParticipantRecord {
          bill_id: id.clone(),
          user_id: p.user_id.clone(),
          amount_owed: p.amount_owed.clone(),
        },
      });

    let previous = state.snapshot.clone();
    let mut next = previous.as_deref().cloned().unwrap_or_default();
    next.owns.push(bill);
    next.owes.extend(owed);
    self.store.commit(&mut state, Some(Arc::new(next)));

    debug!(bill_id = %id, "Optimistically added bill");
    (id, Rollback::restoring(&self.store, previous))
  }

  /// Merge `update` into the owned bill with `id`, optionally replacing its
  /// participants, and re-point matching `owes` entries at the result.
  ///
  /// Does nothing and returns a no-op rollback when there is no snapshot or
  /// the bill is not known locally.
  pub fn optimistically_update_bill(
    &self,
    id: &BillId,
    update: BillUpdate,
    participants: Option<Vec<Participant>>,
  ) -> Rollback {
    let mut state = self.store.lock();
    let Some(current) = state.snapshot.clone() else {
      debug!(bill_id = %id, "No snapshot, skipping optimistic update");
      return Rollback::noop();
    };
    let Some(index) = current.owns.iter().position(|b| &b.id == id) else {
      debug!(bill_id = %id, "Bill not found locally, skipping optimistic update");
      return Rollback::noop();
    };

    let mut bill = Bill::clone(&current.owns[index]);
    if let Some(title) = update.title {
      bill.title = title;
    }
    if let Some(total_amount) = update.total_amount {
      bill.total_amount = total_amount;
    }
    if let Some(due_date) = update.due_date {
      bill.due_date = due_date;
    }
    if let Some(participants) = participants {
      bill.participants = participants;
    }
    let bill = Arc::new(bill);

    let mut next = BillsSnapshot::clone(&current);
    next.owns[index] = Arc::clone(&bill);
    for entry in next.owes.iter_mut().filter(|e| &e.bill.id == id) {
      entry.bill = Arc::clone(&bill);
    }
    self.store.commit(&mut state, Some(Arc::new(next)));

    debug!(bill_id = %id, "Optimistically updated bill");
    Rollback::restoring(&self.store, Some(current))
  }

  /// Drop the bill with `id` from both `owns` and `owes`.
  pub fn optimistically_remove_bill(&self, id: &BillId) -> Rollback {
    let mut state = self.store.lock();
    let Some(current) = state.snapshot.clone() else {
      debug!(bill_id = %id, "No snapshot, skipping optimistic removal");
      return Rollback::noop();
    };

    let mut next = BillsSnapshot::clone(&current);
    next.owns.retain(|b| &b.id != id);
    next.owes.retain(|e| &e.bill.id != id);
    if next.owns.len() == current.owns.len() && next.owes.len() == current.owes.len() {
      debug!(bill_id = %id, "Bill not found locally, skipping optimistic removal");
      return Rollback::noop();
    }
    self.store.commit(&mut state, Some(Arc::new(next)));

    debug!(bill_id = %id, "Optimistically removed bill");
    Rollback::restoring(&self.store, Some(current))
  }

  /// Swap a temporary id for the server's once a create succeeds.
  ///
  /// Only `id`, `created_at`, `due_date` and (when provided) `total_amount`
  /// are taken from the server; participants and the rest stay as they
  /// were. Matching `owes` entries are re-pointed and their `bill_id`
  /// rewritten. This is a confirmation, so there is nothing to roll back.
  pub fn replace_temp_bill_with_real_bill(&self, temp_id: &BillId, confirmed: ConfirmedBill) {
    let mut state = self.store.lock();
    let Some(current) = state.snapshot.clone() else {
      debug!(bill_id = %temp_id, "No snapshot, skipping reconciliation");
      return;
    };
    let Some(index) = current.owns.iter().position(|b| &b.id == temp_id) else {
      debug!(bill_id = %temp_id, "Temporary bill not found, skipping reconciliation");
      return;
    };

    let mut bill = Bill::clone(&current.owns[index]);
    bill.id = confirmed.id.clone();
    bill.created_at = confirmed.created_at;
    bill.due_date = confirmed.due_date;
    if let Some(total_amount) = confirmed.total_amount {
      bill.total_amount = total_amount;
    }
    let bill = Arc::new(bill);

    let mut next = BillsSnapshot::clone(&current);
    next.owns[index] = Arc::clone(&bill);
    for entry in next.owes.iter_mut().filter(|e| &e.bill.id == temp_id) {
      entry.bill = Arc::clone(&bill);
      entry.participant.bill_id = confirmed.id.clone();
    }
    self.store.commit(&mut state, Some(Arc::new(next)));

    debug!(temp_id = %temp_id, bill_id = %confirmed.id, "Reconciled bill");
  }
}
