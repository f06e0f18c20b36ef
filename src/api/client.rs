use crate::api::api_types::{ApiBillResponse, ApiDeleteResponse, ApiErrorBody, BillRequest};
use crate::api::error::{ApiError, ApiResult};
use crate::api::types::{Bill, BillId, BillsSnapshot, User};
use crate::config::Config;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Bills/users REST API client
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base: Url,
}

impl ApiClient {
  pub fn new(config: &Config) -> Result<Self> {
    let token = Config::get_session_token()?;
    Self::with_session(
      &config.api.url,
      &config.api.session_cookie,
      &token,
      Duration::from_secs(config.api.timeout_secs),
    )
  }

  /// Build a client that sends `cookie_name=token` with every request.
  pub fn with_session(
    base_url: &str,
    cookie_name: &str,
    token: &str,
    timeout: Duration,
  ) -> Result<Self> {
    let mut base =
      Url::parse(base_url).map_err(|e| eyre!("Invalid API url {}: {}", base_url, e))?;
    // Url::join replaces the last path segment unless the base ends with '/'
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }

    let cookie = HeaderValue::from_str(&format!("{}={}", cookie_name, token))
      .map_err(|e| eyre!("Session token is not a valid header value: {}", e))?;
    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, cookie);

    let http = reqwest::Client::builder()
      .default_headers(headers)
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base })
  }

  fn endpoint(&self, path: &str) -> ApiResult<Url> {
    Ok(self.base.join(path)?)
  }

  fn bill_endpoint(&self, id: &BillId) -> ApiResult<Url> {
    if id.is_temporary() {
      return Err(ApiError::TemporaryId(id.clone()));
    }
    self.endpoint(&format!("api/bills/{}", id.as_str()))
  }

  /// Send a request and decode a JSON body, mapping error statuses to `ApiError`.
  async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> ApiResult<T> {
    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
      let message = response.json::<ApiErrorBody>().await.ok().map(|b| b.error);
      debug!(%status, ?message, "API request failed");
      return Err(ApiError::from_status(status, message));
    }

    let bytes = response.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| ApiError::Decode(e.to_string()))
  }

  /// Get the full bills snapshot for the signed-in user
  pub async fn get_bills(&self) -> ApiResult<BillsSnapshot> {
    let url = self.endpoint("api/bills")?;
    self.send(self.http.get(url)).await
  }

  /// Get the user directory
  pub async fn get_users(&self) -> ApiResult<Vec<User>> {
    let url = self.endpoint("api/users")?;
    self.send(self.http.get(url)).await
  }

  /// Get a single bill with joined participant identities
  pub async fn get_bill(&self, id: &BillId) -> ApiResult<Bill> {
    let url = self.bill_endpoint(id)?;
    self.send(self.http.get(url)).await
  }

  /// Create a bill; the returned bill carries the server id and createdAt
  pub async fn create_bill(&self, body: &BillRequest) -> ApiResult<Bill> {
    let url = self.endpoint("api/bills")?;
    let response: ApiBillResponse = self.send(self.http.post(url).json(body)).await?;
    Self::confirmed(response.success)?;
    Ok(response.bill)
  }

  /// Replace a bill's fields and all of its participants
  pub async fn update_bill(&self, id: &BillId, body: &BillRequest) -> ApiResult<Bill> {
    let url = self.bill_endpoint(id)?;
    let response: ApiBillResponse = self.send(self.http.put(url).json(body)).await?;
    Self::confirmed(response.success)?;
    Ok(response.bill)
  }

  /// Delete a bill and its participant links
  pub async fn delete_bill(&self, id: &BillId) -> ApiResult<()> {
    let url = self.bill_endpoint(id)?;
    let response: ApiDeleteResponse = self.send(self.http.delete(url)).await?;
    Self::confirmed(response.success)
  }

  fn confirmed(success: bool) -> ApiResult<()> {
    if success {
      Ok(())
    } else {
      Err(ApiError::Decode(
        "server did not confirm the operation".to_string(),
      ))
    }
  }
}
