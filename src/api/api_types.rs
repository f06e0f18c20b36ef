//! Serde types matching the bills/users API request and response bodies.
//!
//! These are kept apart from the domain types in `types` so the cache never
//! depends on envelope shapes like `{success, bill}`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::types::{Amount, Bill, Participant};

/// `{error}` body returned with every non-2xx status
#[derive(Debug, Deserialize)]
pub struct ApiErrorBody {
  pub error: String,
}

/// One participant share in a create/update request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiParticipantShare {
  pub user_id: String,
  pub amount_owed: Amount,
}

impl From<&Participant> for ApiParticipantShare {
  fn from(p: &Participant) -> Self {
    Self {
      user_id: p.user_id.clone(),
      amount_owed: p.amount_owed.clone(),
    }
  }
}

/// Body of `POST /api/bills` and `PUT /api/bills/{id}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillRequest {
  pub title: String,
  pub total_amount: Amount,
  pub due_date: Option<DateTime<Utc>>,
  pub participants: Vec<ApiParticipantShare>,
}

impl BillRequest {
  /// Same checks the server applies before accepting a bill.
  pub fn validate(&self) -> Result<(), String> {
    if self.title.trim().is_empty() {
      return Err("Title and total amount are required".to_string());
    }
    if self.participants.is_empty() {
      return Err("At least one participant is required".to_string());
    }
    Ok(())
  }
}

/// Response of create/update: `{success, bill}`
#[derive(Debug, Deserialize)]
pub struct ApiBillResponse {
  #[serde(default)]
  pub success: bool,
  pub bill: Bill,
}

/// Response of delete: `{success}`
#[derive(Debug, Deserialize)]
pub struct ApiDeleteResponse {
  #[serde(default)]
  pub success: bool,
}
