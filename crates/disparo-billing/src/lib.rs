//! # disparo-billing
//!
//! Subscription status and payment intents. The provider clients run inside
//! `disparo serve`; [`SubscriptionClient`] is what the CLI uses to ask that
//! backend.

pub mod asaas;
pub mod client;
pub mod stripe;

use async_trait::async_trait;
use disparo_core::error::DisparoError;

pub use asaas::AsaasProvider;
pub use client::SubscriptionClient;
pub use stripe::StripeProvider;

/// Looks up whether a customer email has a paying subscription.
#[async_trait]
pub trait SubscriptionProvider: Send + Sync {
    /// Provider name for logs and errors.
    fn name(&self) -> &str;

    async fn has_active_subscription(&self, email: &str) -> Result<bool, DisparoError>;
}

/// Creates card payment intents for client-side confirmation.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Returns the intent's client secret. `amount` is in the currency's
    /// minor unit (centavos).
    async fn create_payment_intent(&self, amount: i64) -> Result<String, DisparoError>;
}

/// Map a reqwest failure or non-2xx status into a provider error.
pub(crate) async fn provider_json(
    provider: &str,
    what: &str,
    result: Result<reqwest::Response, reqwest::Error>,
) -> Result<serde_json::Value, DisparoError> {
    let resp =
        result.map_err(|e| DisparoError::Provider(format!("{provider} {what} failed: {e}")))?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        tracing::error!("{provider} {what} returned {status}: {body}");
        return Err(DisparoError::Provider(format!(
            "{provider} {what} returned {status}"
        )));
    }
    resp.json()
        .await
        .map_err(|e| DisparoError::Provider(format!("{provider} {what} parse failed: {e}")))
}
