//! # disparo-gateway
//!
//! HTTP clients for the messaging gateway (instance status, message sends)
//! and the account webhooks.

pub mod account;
mod send;
mod status;

use disparo_core::{config::GatewayConfig, error::DisparoError};
use std::time::Duration;

pub use account::AccountClient;

/// Longest response-body excerpt kept in error messages.
const ERROR_BODY_LIMIT: usize = 200;

/// Client for one messaging gateway: the status webhook plus the
/// `/message/send<Kind>/<instance>` endpoints.
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: reqwest::Client,
    backend_url: String,
    status_url: String,
    api_key: Option<String>,
}

impl GatewayClient {
    /// Create a client from config.
    pub fn new(config: &GatewayConfig) -> Result<Self, DisparoError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DisparoError::Config(format!("HTTP client init failed: {e}")))?;

        Ok(Self {
            client,
            backend_url: config.backend_url.trim_end_matches('/').to_string(),
            status_url: config.status_url.clone(),
            api_key: (!config.api_key.is_empty()).then(|| config.api_key.clone()),
        })
    }

    /// Add the `apikey` header when one is configured.
    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.api_key {
            Some(ref key) => request.header("apikey", key),
            None => request,
        }
    }
}

/// Turn a non-2xx response into a `Network` error with a body excerpt.
pub(crate) async fn ensure_success(
    resp: reqwest::Response,
    what: &str,
) -> Result<reqwest::Response, DisparoError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(ERROR_BODY_LIMIT).collect();
    Err(DisparoError::Network(format!(
        "{what} returned {status}: {excerpt}"
    )))
}
