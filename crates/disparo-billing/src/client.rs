//! Client side of the billing API exposed by `disparo serve`.

use disparo_core::error::DisparoError;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// How long a subscription answer is reused before asking again.
pub const SUBSCRIPTION_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionBody {
    has_active_subscription: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentIntentBody {
    client_secret: String,
}

/// Asks the billing backend about subscriptions, caching answers per email.
pub struct SubscriptionClient {
    client: reqwest::Client,
    backend_url: String,
    ttl: Duration,
    cache: Mutex<HashMap<String, (bool, Instant)>>,
}

impl SubscriptionClient {
    pub fn new(client: reqwest::Client, backend_url: &str) -> Self {
        Self {
            client,
            backend_url: backend_url.trim_end_matches('/').to_string(),
            ttl: SUBSCRIPTION_TTL,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `email` has a paying subscription. An empty email is simply
    /// not subscribed and costs no request.
    pub async fn has_active_subscription(&self, email: &str) -> Result<bool, DisparoError> {
        let email = email.trim();
        if email.is_empty() {
            return Ok(false);
        }

        {
            let cache = self.cache.lock().await;
            if let Some((active, at)) = cache.get(email) {
                if at.elapsed() < self.ttl {
                    debug!("subscription cache hit for {email}");
                    return Ok(*active);
                }
            }
        }

        let resp = self
            .client
            .post(format!("{}/api/check-subscription", self.backend_url))
            .json(&json!({ "email": email }))
            .send()
            .await
            .map_err(|e| DisparoError::Network(format!("subscription check failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            return Err(DisparoError::Network(format!(
                "subscription check returned {status}"
            )));
        }
        let body: SubscriptionBody = resp
            .json()
            .await
            .map_err(|e| DisparoError::UnexpectedResponse(format!("subscription body: {e}")))?;

        self.cache.lock().await.insert(
            email.to_string(),
            (body.has_active_subscription, Instant::now()),
        );
        Ok(body.has_active_subscription)
    }

    /// Create a card payment intent through the backend; returns the client
    /// secret.
    pub async fn create_payment_intent(&self, amount: i64) -> Result<String, DisparoError> {
        let resp = self
            .client
            .post(format!("{}/api/create-payment-intent", self.backend_url))
            .json(&json!({ "amount": amount }))
            .send()
            .await
            .map_err(|e| DisparoError::Network(format!("payment intent failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(DisparoError::Network(format!(
                "payment intent returned {status}: {text}"
            )));
        }
        let body: PaymentIntentBody = resp
            .json()
            .await
            .map_err(|e| DisparoError::UnexpectedResponse(format!("payment intent body: {e}")))?;
        Ok(body.client_secret)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    #[tokio::test]
    async fn test_subscription_cached() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/check-subscription")
            .match_body(Matcher::Json(json!({"email": "ana@example.com"})))
            .with_status(200)
            .with_body(r#"{"hasActiveSubscription":true}"#)
            .expect(1)
            .create_async()
            .await;

        let client = SubscriptionClient::new(reqwest::Client::new(), &server.url());
        assert!(client.has_active_subscription("ana@example.com").await.unwrap());
        assert!(client.has_active_subscription(" ana@example.com ").await.unwrap());

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_subscription_refetched_after_ttl() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/check-subscription")
            .with_status(200)
            .with_body(r#"{"hasActiveSubscription":false}"#)
            .expect(2)
            .create_async()
            .await;

        let client = SubscriptionClient {
            ttl: Duration::ZERO,
            ..SubscriptionClient::new(reqwest::Client::new(), &server.url())
        };
        assert!(!client.has_active_subscription("ana@example.com").await.unwrap());
        assert!(!client.has_active_subscription("ana@example.com").await.unwrap());

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_empty_email_not_subscribed() {
        let server = mockito::Server::new_async().await;
        let client = SubscriptionClient::new(reqwest::Client::new(), &server.url());
        assert!(!client.has_active_subscription("  ").await.unwrap());
    }

    #[tokio::test]
    async fn test_payment_intent_error() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/api/create-payment-intent")
            .with_status(400)
            .with_body(r#"{"error":"Amount is required and must be a number."}"#)
            .create_async()
            .await;

        let client = SubscriptionClient::new(reqwest::Client::new(), &server.url());
        let err = client.create_payment_intent(-5).await.unwrap_err();
        assert!(err.to_string().contains("400"));
    }

    #[tokio::test]
    async fn test_payment_intent_secret() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/api/create-payment-intent")
            .match_body(Matcher::Json(json!({"amount": 4990})))
            .with_status(200)
            .with_body(r#"{"clientSecret":"pi_9_secret"}"#)
            .create_async()
            .await;

        let client = SubscriptionClient::new(reqwest::Client::new(), &server.url());
        assert_eq!(client.create_payment_intent(4990).await.unwrap(), "pi_9_secret");
    }
}
