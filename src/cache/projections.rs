//! Read models derived from the bills snapshot.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::api::types::{Amount, BillId, BillsSnapshot};

use super::store::BillsCache;

/// Shown when no participant name can be found
const UNKNOWN_NAME: &str = "Unknown";

/// A bill the current user owns and others owe money on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwedToMe {
  pub id: BillId,
  pub title: String,
  pub total_amount: Amount,
  pub due_date: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  /// First participant other than the owner
  pub participant_name: String,
  /// Participants other than the owner
  pub participant_count: usize,
}

/// A bill someone else owns where the current user owes a share
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IOwe {
  pub id: BillId,
  pub title: String,
  pub total_amount: Amount,
  pub due_date: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  /// The bill owner's name
  pub participant_name: String,
  pub amount_owed: Amount,
}

/// Last computed views, tagged with the store revision they were built from
#[derive(Default)]
pub(super) struct ProjectionMemo {
  owed_to_me: Option<(u64, Arc<Vec<OwedToMe>>)>,
  i_owe: Option<(u64, Arc<Vec<IOwe>>)>,
}

pub fn owed_to_me(snapshot: Option<&BillsSnapshot>) -> Vec<OwedToMe> {
  let Some(snapshot) = snapshot else {
    return Vec::new();
  };

  snapshot
    .owns
    .iter()
    .map(|bill| {
      let named = bill
        .non_owner_participants()
        .next()
        .or_else(|| bill.participants.first());

      OwedToMe {
        id: bill.id.clone(),
        title: bill.title.clone(),
        total_amount: bill.total_amount.clone(),
        due_date: bill.due_date,
        created_at: bill.created_at,
        participant_name: display_name(named.map(|p| p.display_name.as_str())),
        participant_count: bill.non_owner_participants().count(),
      }
    })
    .collect()
}

pub fn i_owe(snapshot: Option<&BillsSnapshot>) -> Vec<IOwe> {
  let Some(snapshot) = snapshot else {
    return Vec::new();
  };

  snapshot
    .owes
    .iter()
    // owners never owe themselves
    .filter(|entry| entry.participant.user_id != entry.bill.owner_user_id)
    .map(|entry| {
      let bill = &entry.bill;
      IOwe {
        id: bill.id.clone(),
        title: bill.title.clone(),
        total_amount: bill.total_amount.clone(),
        due_date: bill.due_date,
        created_at: bill.created_at,
        participant_name: display_name(bill.owner_participant().map(|p| p.display_name.as_str())),
        amount_owed: entry.participant.amount_owed.clone(),
      }
    })
    .collect()
}

fn display_name(name: Option<&str>) -> String {
  match name {
    Some(n) if !n.is_empty() => n.to_string(),
    _ => UNKNOWN_NAME.to_string(),
  }
}

impl BillsCache {
  /// Bills the current user owns, recomputed only when the snapshot changed
  pub fn owed_to_me(&self) -> Arc<Vec<OwedToMe>> {
    let mut state = self.store.lock();
    let revision = state.revision;
    if let Some((built_at, view)) = &state.projections.owed_to_me {
      if *built_at == revision {
        return Arc::clone(view);
      }
    }

    let view = Arc::new(owed_to_me(state.snapshot.as_deref()));
    state.projections.owed_to_me = Some((revision, Arc::clone(&view)));
    view
  }

  /// Bills the current user owes on, recomputed only when the snapshot changed
  pub fn i_owe(&self) -> Arc<Vec<IOwe>> {
    let mut state = self.store.lock();
    let revision = state.revision;
    if let Some((built_at, view)) = &state.projections.i_owe {
      if *built_at == revision {
        return Arc::clone(view);
      }
    }

    let view = Arc::new(i_owe(state.snapshot.as_deref()));
    state.projections.i_owe = Some((revision, Arc::clone(&view)));
    view
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::{OwedBill, ParticipantRecord};
  use crate::cache::testing::{bill, participant, ScriptedSource};
  use crate::cache::{FreshnessPolicy, NewBillDraft};

  fn owes_entry(bill: crate::api::types::Bill, user: &str, amount: &str) -> OwedBill {
    OwedBill {
      participant: ParticipantRecord {
        bill_id: bill.id.clone(),
        user_id: user.to_string(),
        amount_owed: amount.parse().unwrap(),
      },
      bill: Arc::new(bill),
    }
  }

  #[test]
  fn test_owed_to_me_names_first_non_owner() {
    let snapshot = BillsSnapshot {
      owns: vec![Arc::new(bill(
        "b1",
        "u1",
        vec![
          participant("u1", "10.00"),
          participant("u2", "10.00"),
          participant("u3", "10.00"),
        ],
      ))],
      owes: Vec::new(),
    };

    let view = owed_to_me(Some(&snapshot));
    assert_eq!(view.len(), 1);
    assert_eq!(view[0].participant_name, "User U2");
    assert_eq!(view[0].participant_count, 2);
  }

  #[test]
  fn test_owed_to_me_name_fallbacks() {
    let snapshot = BillsSnapshot {
      owns: vec![
        Arc::new(bill("solo", "u1", vec![participant("u1", "30.00")])),
        Arc::new(bill("empty", "u1", Vec::new())),
      ],
      owes: Vec::new(),
    };

    let view = owed_to_me(Some(&snapshot));
    assert_eq!(view[0].participant_name, "User U1");
    assert_eq!(view[0].participant_count, 0);
    assert_eq!(view[1].participant_name, "Unknown");
    assert_eq!(view[1].participant_count, 0);
  }

  #[test]
  fn test_i_owe_excludes_self_owed_entries() {
    let shared = bill(
      "b1",
      "u1",
      vec![participant("u1", "10.00"), participant("me", "20.00")],
    );
    let snapshot = BillsSnapshot {
      owns: Vec::new(),
      owes: vec![
        owes_entry(shared.clone(), "me", "20.00"),
        owes_entry(shared, "u1", "10.00"),
        owes_entry(bill("b2", "u5", Vec::new()), "me", "3.50"),
      ],
    };

    let view = i_owe(Some(&snapshot));
    assert_eq!(view.len(), 2);
    assert_eq!(view[0].participant_name, "User U1");
    assert_eq!(view[0].amount_owed.as_str(), "20.00");
    assert_eq!(view[1].participant_name, "Unknown");
    assert_eq!(view[1].amount_owed.as_str(), "3.50");
  }

  #[test]
  fn test_empty_without_snapshot() {
    assert!(owed_to_me(None).is_empty());
    assert!(i_owe(None).is_empty());
  }

  #[test]
  fn test_views_recompute_only_on_change() {
    let cache = BillsCache::new(ScriptedSource::new(), FreshnessPolicy::default());
    let first = cache.owed_to_me();
    assert!(first.is_empty());
    assert!(Arc::ptr_eq(&first, &cache.owed_to_me()));

    let (_, _rollback) = cache.optimistically_add_bill(
      NewBillDraft {
        id: None,
        owner_user_id: "u1".into(),
        title: "Taxi".into(),
        total_amount: "12.00".parse().unwrap(),
        due_date: None,
        created_at: None,
      },
      vec![participant("u1", "6.00"), participant("u2", "6.00")],
    );

    let second = cache.owed_to_me();
    assert!(!Arc::ptr_eq(&first, &second));
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].participant_count, 1);

    let owes = cache.i_owe();
    assert_eq!(owes.len(), 1);
    assert_eq!(owes[0].amount_owed.as_str(), "6.00");
    assert!(Arc::ptr_eq(&owes, &cache.i_owe()));
  }
}
