//! Seam between the bills cache and the network.

use async_trait::async_trait;

use crate::api::error::ApiResult;
use crate::api::types::{BillsSnapshot, User};

/// Where the cache loads authoritative data from.
///
/// Implemented by the REST client; tests plug in scripted sources.
#[async_trait]
pub trait BillsSource: Send + Sync {
  /// Full bills snapshot for the signed-in user
  async fn fetch_bills(&self) -> ApiResult<BillsSnapshot>;

  /// The whole user directory
  async fn fetch_users(&self) -> ApiResult<Vec<User>>;
}
