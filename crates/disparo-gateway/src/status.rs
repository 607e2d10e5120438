//! Instance-status webhook.

use super::{ensure_success, GatewayClient};
use async_trait::async_trait;
use disparo_core::{error::DisparoError, status::StatusReply, traits::StatusGateway};
use serde_json::{json, Value};
use tracing::debug;

#[async_trait]
impl StatusGateway for GatewayClient {
    async fn instance_status(&self, instance: &str) -> Result<StatusReply, DisparoError> {
        let body = json!({ "username": instance.trim() });
        let resp = self
            .authorize(self.client.post(&self.status_url))
            .json(&body)
            .send()
            .await
            .map_err(|e| DisparoError::Network(format!("status request failed: {e}")))?;

        let resp = ensure_success(resp, "status endpoint").await?;

        let value: Value = resp.json().await.map_err(|e| {
            DisparoError::UnexpectedResponse(format!("status body is not JSON: {e}"))
        })?;

        let reply = StatusReply::from_json(&value);
        debug!("instance {instance} status: {reply:?}");
        Ok(reply)
    }
}
