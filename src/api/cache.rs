//! Wires the REST client into the bills cache.

use async_trait::async_trait;

use crate::cache::BillsSource;

use super::client::ApiClient;
use super::error::ApiResult;
use super::types::{BillsSnapshot, User};

#[async_trait]
impl BillsSource for ApiClient {
  async fn fetch_bills(&self) -> ApiResult<BillsSnapshot> {
    self.get_bills().await
  }

  async fn fetch_users(&self) -> ApiResult<Vec<User>> {
    self.get_users().await
  }
}
