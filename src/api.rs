//! HTTP backend for the dashboard: subscription checks, payment intents and
//! a health probe.
//!
//! Providers whose keys are missing are left out; their endpoints answer 503
//! instead of the server refusing to start.

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use disparo_billing::{AsaasProvider, PaymentProvider, StripeProvider, SubscriptionProvider};
use disparo_core::config::{ApiConfig, BillingConfig};
use disparo_core::error::DisparoError;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

type ApiError = (StatusCode, Json<Value>);

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    stripe: Option<Arc<dyn SubscriptionProvider>>,
    asaas: Option<Arc<dyn SubscriptionProvider>>,
    payments: Option<Arc<dyn PaymentProvider>>,
    uptime: Instant,
}

impl ApiState {
    /// Build provider clients from whatever keys are configured.
    pub fn from_config(config: &BillingConfig, timeout: Duration) -> Result<Self, DisparoError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DisparoError::Config(format!("HTTP client init failed: {e}")))?;

        let (stripe, payments) = if config.stripe_secret_key.is_empty() {
            warn!("STRIPE_SECRET_KEY is not set; Stripe endpoints will answer 503");
            (None, None)
        } else {
            let provider = Arc::new(StripeProvider::new(
                client.clone(),
                &config.stripe_base_url,
                &config.stripe_secret_key,
                &config.currency,
            ));
            (
                Some(provider.clone() as Arc<dyn SubscriptionProvider>),
                Some(provider as Arc<dyn PaymentProvider>),
            )
        };

        let asaas = if config.asaas_api_key.is_empty() {
            warn!("ASAAS_API_KEY is not set; Asaas endpoint will answer 503");
            None
        } else {
            Some(Arc::new(AsaasProvider::new(
                client,
                &config.asaas_base_url,
                &config.asaas_api_key,
            )) as Arc<dyn SubscriptionProvider>)
        };

        Ok(Self {
            stripe,
            asaas,
            payments,
            uptime: Instant::now(),
        })
    }
}

fn api_error(status: StatusCode, message: &str) -> ApiError {
    (status, Json(json!({ "error": message })))
}

fn unavailable(provider: &str) -> ApiError {
    api_error(
        StatusCode::SERVICE_UNAVAILABLE,
        &format!("{provider} is not configured"),
    )
}

/// The request's `email`, if it is a non-blank string.
fn email_from(body: &Value) -> Result<String, ApiError> {
    body.get("email")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .ok_or_else(|| api_error(StatusCode::BAD_REQUEST, "Email is required"))
}

/// The request's `amount` in minor units. Fractional amounts are rejected.
fn amount_from(body: &Value) -> Result<i64, ApiError> {
    let amount = body.get("amount").and_then(|v| {
        v.as_i64()
            .or_else(|| v.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))
    });
    match amount {
        Some(a) if a > 0 => Ok(a),
        _ => Err(api_error(
            StatusCode::BAD_REQUEST,
            "Amount is required and must be a number",
        )),
    }
}

async fn subscription_reply<F>(provider: &str, email: &str, lookup: F) -> Result<Json<Value>, ApiError>
where
    F: Future<Output = Result<bool, DisparoError>>,
{
    match lookup.await {
        Ok(active) => {
            info!("{provider}: {email} active={active}");
            Ok(Json(json!({ "hasActiveSubscription": active })))
        }
        Err(e) => {
            error!("{provider}: subscription check for {email} failed: {e}");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
            ))
        }
    }
}

/// `GET /api/health`
async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "uptime_secs": state.uptime.elapsed().as_secs(),
        "stripe": state.stripe.is_some(),
        "asaas": state.asaas.is_some(),
    }))
}

/// `POST /api/check-subscription`: Stripe.
async fn check_subscription(
    State(state): State<ApiState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let email = email_from(&body)?;
    let provider = state.stripe.as_ref().ok_or_else(|| unavailable("stripe"))?;
    subscription_reply(provider.name(), &email, provider.has_active_subscription(&email)).await
}

/// `POST /api/check-subscription-asaas`
async fn check_subscription_asaas(
    State(state): State<ApiState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let email = email_from(&body)?;
    let provider = state.asaas.as_ref().ok_or_else(|| unavailable("asaas"))?;
    subscription_reply(provider.name(), &email, provider.has_active_subscription(&email)).await
}

/// `POST /api/create-payment-intent`
async fn create_payment_intent(
    State(state): State<ApiState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, ApiError> {
    let amount = amount_from(&body)?;
    let payments = state.payments.as_ref().ok_or_else(|| unavailable("stripe"))?;
    match payments.create_payment_intent(amount).await {
        Ok(secret) => Ok(Json(json!({ "clientSecret": secret }))),
        Err(e) => {
            error!("payment intent for {amount} failed: {e}");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
            ))
        }
    }
}

fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/check-subscription", post(check_subscription))
        .route("/api/check-subscription-asaas", post(check_subscription_asaas))
        .route("/api/create-payment-intent", post(create_payment_intent))
        .layer(axum::extract::DefaultBodyLimit::max(64 * 1024))
        .with_state(state)
}

/// Serve until `shutdown` resolves.
pub async fn serve<F>(config: &ApiConfig, state: ApiState, shutdown: F) -> Result<(), DisparoError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);

    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        error!("API server failed to bind to {addr}: {e}");
        DisparoError::Io(e)
    })?;

    info!("API server listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    info!("API server stopped");
    Ok(())
}
