//! Stripe REST client: customer → subscriptions lookup and payment intents.

use super::{provider_json, PaymentProvider, SubscriptionProvider};
use async_trait::async_trait;
use disparo_core::error::DisparoError;
use serde_json::Value;
use tracing::{debug, info};

/// Subscription statuses that still grant access.
pub const ACTIVE_STATUSES: &[&str] = &["active", "trialing", "past_due"];

/// Stripe API client using a secret key.
#[derive(Debug, Clone)]
pub struct StripeProvider {
    client: reqwest::Client,
    base_url: String,
    secret_key: String,
    currency: String,
}

impl StripeProvider {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        secret_key: &str,
        currency: &str,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
            currency: currency.to_string(),
        }
    }

    async fn first_customer_id(&self, email: &str) -> Result<Option<String>, DisparoError> {
        let result = self
            .client
            .get(format!("{}/customers", self.base_url))
            .bearer_auth(&self.secret_key)
            .query(&[("email", email), ("limit", "1")])
            .send()
            .await;
        let body = provider_json("stripe", "customer lookup", result).await?;
        Ok(body["data"]
            .as_array()
            .and_then(|d| d.first())
            .and_then(|c| c["id"].as_str())
            .map(str::to_string))
    }
}

#[async_trait]
impl SubscriptionProvider for StripeProvider {
    fn name(&self) -> &str {
        "stripe"
    }

    async fn has_active_subscription(&self, email: &str) -> Result<bool, DisparoError> {
        let Some(customer) = self.first_customer_id(email).await? else {
            debug!("stripe: no customer for {email}");
            return Ok(false);
        };

        let result = self
            .client
            .get(format!("{}/subscriptions", self.base_url))
            .bearer_auth(&self.secret_key)
            .query(&[
                ("customer", customer.as_str()),
                ("status", "all"),
                ("limit", "10"),
            ])
            .send()
            .await;
        let body = provider_json("stripe", "subscription lookup", result).await?;

        Ok(any_status_in(&body, ACTIVE_STATUSES))
    }
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_payment_intent(&self, amount: i64) -> Result<String, DisparoError> {
        if amount <= 0 {
            return Err(DisparoError::invalid("amount", "must be a positive number"));
        }

        let amount_str = amount.to_string();
        let result = self
            .client
            .post(format!("{}/payment_intents", self.base_url))
            .bearer_auth(&self.secret_key)
            .form(&[
                ("amount", amount_str.as_str()),
                ("currency", self.currency.as_str()),
                ("payment_method_types[]", "card"),
            ])
            .send()
            .await;
        let body = provider_json("stripe", "payment intent", result).await?;

        let secret = body["client_secret"].as_str().ok_or_else(|| {
            DisparoError::UnexpectedResponse("payment intent has no client_secret".into())
        })?;
        info!("stripe: created payment intent for {amount} {}", self.currency);
        Ok(secret.to_string())
    }
}

/// Whether any element of `body.data` has a `status` in `statuses`.
pub(crate) fn any_status_in(body: &Value, statuses: &[&str]) -> bool {
    body["data"].as_array().is_some_and(|subs| {
        subs.iter()
            .filter_map(|s| s["status"].as_str())
            .any(|status| statuses.contains(&status))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn provider_for(server: &mockito::Server) -> StripeProvider {
        StripeProvider::new(reqwest::Client::new(), &server.url(), "sk_test_abc", "brl")
    }

    #[test]
    fn test_any_status_in() {
        let body = json!({"data": [{"status": "canceled"}, {"status": "past_due"}]});
        assert!(any_status_in(&body, ACTIVE_STATUSES));
        let body = json!({"data": [{"status": "canceled"}, {"status": "incomplete"}]});
        assert!(!any_status_in(&body, ACTIVE_STATUSES));
        assert!(!any_status_in(&json!({}), ACTIVE_STATUSES));
    }

    #[tokio::test]
    async fn test_active_subscription() {
        let mut server = mockito::Server::new_async().await;
        let customers = server
            .mock("GET", "/customers")
            .match_header("authorization", "Bearer sk_test_abc")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("email".into(), "ana@example.com".into()),
                Matcher::UrlEncoded("limit".into(), "1".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"data":[{"id":"cus_123"}]}"#)
            .create_async()
            .await;
        let subs = server
            .mock("GET", "/subscriptions")
            .match_query(Matcher::UrlEncoded("customer".into(), "cus_123".into()))
            .with_status(200)
            .with_body(r#"{"data":[{"status":"trialing"}]}"#)
            .create_async()
            .await;

        let active = provider_for(&server)
            .has_active_subscription("ana@example.com")
            .await
            .unwrap();

        customers.assert_async().await;
        subs.assert_async().await;
        assert!(active);
    }

    #[tokio::test]
    async fn test_unknown_customer_skips_subscription_lookup() {
        let mut server = mockito::Server::new_async().await;
        let _customers = server
            .mock("GET", "/customers")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"data":[]}"#)
            .create_async()
            .await;
        let subs = server
            .mock("GET", "/subscriptions")
            .match_query(Matcher::Any)
            .expect(0)
            .create_async()
            .await;

        let active = provider_for(&server)
            .has_active_subscription("nobody@example.com")
            .await
            .unwrap();

        subs.assert_async().await;
        assert!(!active);
    }

    #[tokio::test]
    async fn test_provider_error() {
        let mut server = mockito::Server::new_async().await;
        let _customers = server
            .mock("GET", "/customers")
            .match_query(Matcher::Any)
            .with_status(401)
            .with_body(r#"{"error":{"message":"Invalid API Key"}}"#)
            .create_async()
            .await;

        let err = provider_for(&server)
            .has_active_subscription("ana@example.com")
            .await
            .unwrap_err();
        assert!(matches!(err, DisparoError::Provider(_)));
    }

    #[tokio::test]
    async fn test_payment_intent() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/payment_intents")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("amount".into(), "1000".into()),
                Matcher::UrlEncoded("currency".into(), "brl".into()),
                Matcher::UrlEncoded("payment_method_types[]".into(), "card".into()),
            ]))
            .with_status(200)
            .with_body(json!({"id": "pi_1", "client_secret": "pi_1_secret_x"}).to_string())
            .create_async()
            .await;

        let secret = provider_for(&server).create_payment_intent(1000).await.unwrap();

        mock.assert_async().await;
        assert_eq!(secret, "pi_1_secret_x");
    }

    #[tokio::test]
    async fn test_payment_intent_rejects_non_positive() {
        let server = mockito::Server::new_async().await;
        let err = provider_for(&server)
            .create_payment_intent(0)
            .await
            .unwrap_err();
        assert_eq!(err.fields(), &["amount"]);
    }
}
