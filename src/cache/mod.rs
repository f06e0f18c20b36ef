//! Process-wide bills cache with optimistic edits.
//!
//! This module keeps a local copy of the signed-in user's bills that:
//! - Refreshes in the background on a timer and when the client becomes visible
//! - Applies speculative edits before the server confirms them
//! - Hands back a `Rollback` for every speculative edit
//! - Derives the "owed to me" and "I owe" views on demand

mod freshness;
mod optimistic;
mod projections;
mod store;
mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use freshness::{FreshnessPolicy, Visibility};
pub use optimistic::{BillUpdate, ConfirmedBill, NewBillDraft};
pub use projections::{IOwe, OwedToMe};
pub use store::BillsCache;
pub use traits::BillsSource;
