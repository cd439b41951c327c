//! HTTP seam between the Jira client and the network.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::header::{ACCEPT, AUTHORIZATION};
use url::Url;

/// Status and raw body of one GET.
#[derive(Debug, Clone)]
pub struct HttpResponse {
  pub status: u16,
  pub body: String,
}

impl HttpResponse {
  pub fn is_success(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn is_auth_failure(&self) -> bool {
    self.status == 401 || self.status == 403
  }
}

/// A single authenticated GET. Transport errors (DNS, TLS, timeouts) are
/// `Err`; any HTTP status, including 4xx/5xx, is `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn get(&self, url: &Url, authorization: &str) -> Result<HttpResponse>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
  client: reqwest::Client,
}

impl ReqwestTransport {
  pub fn new() -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("jira-sprint-report/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;
    Ok(Self { client })
  }
}

#[async_trait]
impl Transport for ReqwestTransport {
  async fn get(&self, url: &Url, authorization: &str) -> Result<HttpResponse> {
    let response = self
      .client
      .get(url.clone())
      .header(AUTHORIZATION, authorization)
      .header(ACCEPT, "application/json")
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", url.path(), e))?;

    let status = response.status().as_u16();
    let body = response
      .text()
      .await
      .map_err(|e| eyre!("Failed to read body from {}: {}", url.path(), e))?;

    Ok(HttpResponse { status, body })
  }
}
