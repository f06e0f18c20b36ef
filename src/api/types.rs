use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Prefix for client-generated bill ids that still await a server id
const TEMP_ID_PREFIX: &str = "temp-";

static TEMP_ID_SEQ: AtomicU64 = AtomicU64::new(0);

/// Bill identifier: either server-assigned or a temporary client id
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BillId(String);

impl BillId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  /// Generate a fresh temporary id, unique within this process.
  pub fn temporary() -> Self {
    let seq = TEMP_ID_SEQ.fetch_add(1, Ordering::Relaxed);
    Self(format!(
      "{}{}-{}",
      TEMP_ID_PREFIX,
      Utc::now().timestamp_millis(),
      seq
    ))
  }

  pub fn is_temporary(&self) -> bool {
    self.0.starts_with(TEMP_ID_PREFIX)
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for BillId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for BillId {
  fn from(id: &str) -> Self {
    Self::new(id)
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid amount {0:?}: expected a decimal number like 12.50")]
pub struct AmountError(String);

/// Money amount kept in its exact decimal text form.
///
/// Amounts are never converted to floating point; the server stores them
/// as `numeric(12, 2)` and the client only displays and forwards them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Amount(String);

impl Amount {
  #[cfg(test)]
  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl FromStr for Amount {
  type Err = AmountError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let text = s.trim();
    if is_decimal(text) {
      Ok(Self(text.to_string()))
    } else {
      Err(AmountError(s.to_string()))
    }
  }
}

fn is_decimal(text: &str) -> bool {
  let unsigned = text.strip_prefix('-').unwrap_or(text);
  let all_digits = |part: &str| !part.is_empty() && part.chars().all(|c| c.is_ascii_digit());

  match unsigned.split_once('.') {
    Some((int, frac)) => all_digits(int) && all_digits(frac),
    None => all_digits(unsigned),
  }
}

impl fmt::Display for Amount {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl<'de> Deserialize<'de> for Amount {
  fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
  where
    D: Deserializer<'de>,
  {
    // numeric columns may arrive as JSON strings or numbers; with
    // arbitrary_precision a Number keeps its source text
    let text = match serde_json::Value::deserialize(deserializer)? {
      serde_json::Value::String(s) => s,
      serde_json::Value::Number(n) => n.to_string(),
      other => {
        return Err(de::Error::custom(format!(
          "expected a decimal string or number, got {}",
          other
        )))
      }
    };
    text.parse().map_err(de::Error::custom)
  }
}

/// User directory entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
  pub id: String,
  pub email: String,
  pub display_name: String,
}

/// Participant embedded in a bill, joined with the user's identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
  pub user_id: String,
  pub amount_owed: Amount,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub display_name: String,
}

impl Participant {
  pub fn for_user(user: &User, amount_owed: Amount) -> Self {
    Self {
      user_id: user.id.clone(),
      amount_owed,
      email: user.email.clone(),
      display_name: user.display_name.clone(),
    }
  }
}

/// Normalized bill/participant link, keyed by `(bill_id, user_id)`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantRecord {
  pub bill_id: BillId,
  pub user_id: String,
  pub amount_owed: Amount,
}

/// A shared expense owned by one user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
  pub id: BillId,
  pub owner_user_id: String,
  pub title: String,
  pub total_amount: Amount,
  pub due_date: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub participants: Vec<Participant>,
}

impl Bill {
  pub fn non_owner_participants(&self) -> impl Iterator<Item = &Participant> {
    self
      .participants
      .iter()
      .filter(move |p| p.user_id != self.owner_user_id)
  }

  pub fn owner_participant(&self) -> Option<&Participant> {
    self
      .participants
      .iter()
      .find(|p| p.user_id == self.owner_user_id)
  }
}

/// A bill the current user owes money on, with their participant link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwedBill {
  pub bill: Arc<Bill>,
  pub participant: ParticipantRecord,
}

/// Everything the client knows about the current user's bills
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillsSnapshot {
  #[serde(default)]
  pub owns: Vec<Arc<Bill>>,
  #[serde(default)]
  pub owes: Vec<OwedBill>,
}

impl BillsSnapshot {
  pub fn find_owned(&self, id: &BillId) -> Option<&Arc<Bill>> {
    self.owns.iter().find(|b| &b.id == id)
  }

  /// Point every `owes` entry at the `owns` allocation with the same id,
  /// so both lists observe a single bill.
  pub fn link_shared(&mut self) {
    let owned: HashMap<&BillId, &Arc<Bill>> = self.owns.iter().map(|b| (&b.id, b)).collect();
    for entry in &mut self.owes {
      if let Some(bill) = owned.get(&entry.bill.id) {
        entry.bill = Arc::clone(bill);
      }
    }
  }
}
