//! Asaas REST client: customer → subscriptions lookup.

use super::{provider_json, stripe::any_status_in, SubscriptionProvider};
use async_trait::async_trait;
use disparo_core::error::DisparoError;
use tracing::debug;

/// Asaas reports paying subscriptions as `ACTIVE`.
const ACTIVE_STATUSES: &[&str] = &["ACTIVE"];

/// Asaas API client authenticated with the `access_token` header.
#[derive(Debug, Clone)]
pub struct AsaasProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl AsaasProvider {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl SubscriptionProvider for AsaasProvider {
    fn name(&self) -> &str {
        "asaas"
    }

    async fn has_active_subscription(&self, email: &str) -> Result<bool, DisparoError> {
        let result = self
            .client
            .get(format!("{}/customers", self.base_url))
            .header("access_token", &self.api_key)
            .query(&[("email", email)])
            .send()
            .await;
        let customers = provider_json("asaas", "customer lookup", result).await?;

        let Some(customer) = customers["data"]
            .as_array()
            .and_then(|d| d.first())
            .and_then(|c| c["id"].as_str())
        else {
            debug!("asaas: no customer for {email}");
            return Ok(false);
        };

        let result = self
            .client
            .get(format!("{}/subscriptions", self.base_url))
            .header("access_token", &self.api_key)
            .query(&[("customer", customer)])
            .send()
            .await;
        let subs = provider_json("asaas", "subscription lookup", result).await?;

        Ok(any_status_in(&subs, ACTIVE_STATUSES))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_asaas_active() {
        let mut server = mockito::Server::new_async().await;
        let customers = server
            .mock("GET", "/customers")
            .match_header("access_token", "asaas-key")
            .match_query(Matcher::UrlEncoded("email".into(), "ana@example.com".into()))
            .with_status(200)
            .with_body(r#"{"data":[{"id":"cus_000005"}]}"#)
            .create_async()
            .await;
        let subs = server
            .mock("GET", "/subscriptions")
            .match_query(Matcher::UrlEncoded("customer".into(), "cus_000005".into()))
            .with_status(200)
            .with_body(r#"{"data":[{"status":"INACTIVE"},{"status":"ACTIVE"}]}"#)
            .create_async()
            .await;

        let provider = AsaasProvider::new(reqwest::Client::new(), &server.url(), "asaas-key");
        assert!(provider
            .has_active_subscription("ana@example.com")
            .await
            .unwrap());

        customers.assert_async().await;
        subs.assert_async().await;
    }

    #[tokio::test]
    async fn test_asaas_no_subscriptions() {
        let mut server = mockito::Server::new_async().await;
        let _customers = server
            .mock("GET", "/customers")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"data":[{"id":"cus_1"}]}"#)
            .create_async()
            .await;
        let _subs = server
            .mock("GET", "/subscriptions")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"data":[]}"#)
            .create_async()
            .await;

        let provider = AsaasProvider::new(reqwest::Client::new(), &server.url(), "k");
        assert!(!provider.has_active_subscription("ana@example.com").await.unwrap());
    }

    #[tokio::test]
    async fn test_asaas_subscription_error() {
        let mut server = mockito::Server::new_async().await;
        let _customers = server
            .mock("GET", "/customers")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"data":[{"id":"cus_1"}]}"#)
            .create_async()
            .await;
        let _subs = server
            .mock("GET", "/subscriptions")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let provider = AsaasProvider::new(reqwest::Client::new(), &server.url(), "k");
        let err = provider
            .has_active_subscription("ana@example.com")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("subscription lookup"));
    }
}
