mod defaults;

#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::DisparoError;
use defaults::*;

/// Top-level Disparo configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub disparo: DisparoConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub account: AccountConfig,
    #[serde(default)]
    pub poller: PollerConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub billing: BillingConfig,
    #[serde(default)]
    pub api: ApiConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisparoConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for DisparoConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Messaging gateway (status + send endpoints).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Base URL for `/message/send<Kind>/<instance>`.
    #[serde(default)]
    pub backend_url: String,
    /// Instance-status webhook, `POST {username}`.
    #[serde(default = "default_status_url")]
    pub status_url: String,
    /// Instance used for sends when no instance was connected this session.
    #[serde(default = "default_instance_id")]
    pub instance_id: String,
    /// Sent as the `apikey` header when non-empty.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            status_url: default_status_url(),
            instance_id: default_instance_id(),
            api_key: String::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Login / registration webhooks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountConfig {
    #[serde(default = "default_login_url")]
    pub login_url: String,
    #[serde(default = "default_register_url")]
    pub register_url: String,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            login_url: default_login_url(),
            register_url: default_register_url(),
        }
    }
}

/// Instance-status polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Wait between a QR reply and the next status request.
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
        }
    }
}

impl PollerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Bulk dispatch defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Seconds between recipients when the form leaves it blank.
    #[serde(default)]
    pub default_delay_secs: f64,
}

/// Subscription and payment providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BillingConfig {
    /// Where `disparo serve` runs, for the subscription client.
    #[serde(default)]
    pub backend_url: String,
    #[serde(default)]
    pub stripe_secret_key: String,
    #[serde(default = "default_stripe_base_url")]
    pub stripe_base_url: String,
    #[serde(default)]
    pub asaas_api_key: String,
    #[serde(default = "default_asaas_base_url")]
    pub asaas_base_url: String,
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl Default for BillingConfig {
    fn default() -> Self {
        Self {
            backend_url: String::new(),
            stripe_secret_key: String::new(),
            stripe_base_url: default_stripe_base_url(),
            asaas_api_key: String::new(),
            asaas_base_url: default_asaas_base_url(),
            currency: default_currency(),
        }
    }
}

/// HTTP API served by `disparo serve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Apply environment overrides through `lookup` (normally `std::env::var`).
///
/// Empty values are ignored. `DISPARO_BACKEND_URL` wins over the legacy
/// `VITE_BACKEND_URL`, and either one also seeds the billing backend when
/// that is unset.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), DisparoError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = get("DISPARO_BACKEND_URL").or_else(|| get("VITE_BACKEND_URL")) {
        config.gateway.backend_url = url.clone();
        if config.billing.backend_url.is_empty() {
            config.billing.backend_url = url;
        }
    }
    if let Some(url) = get("DISPARO_STATUS_URL") {
        config.gateway.status_url = url;
    }
    if let Some(id) = get("DISPARO_INSTANCE_ID") {
        config.gateway.instance_id = id;
    }
    if let Some(key) = get("DISPARO_GATEWAY_API_KEY") {
        config.gateway.api_key = key;
    }
    if let Some(key) = get("STRIPE_SECRET_KEY") {
        config.billing.stripe_secret_key = key;
    }
    if let Some(key) = get("ASAAS_API_KEY") {
        config.billing.asaas_api_key = key;
    }
    if let Some(port) = get("PORT") {
        config.api.port = port
            .trim()
            .parse()
            .map_err(|e| DisparoError::Config(format!("invalid PORT '{port}': {e}")))?;
    }
    Ok(())
}

/// Load configuration from a TOML file, then apply environment overrides.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, DisparoError> {
    let file = Path::new(path);
    let mut config = if file.exists() {
        let content = std::fs::read_to_string(file).map_err(|e| {
            DisparoError::Config(format!("failed to read {}: {}", file.display(), e))
        })?;
        toml::from_str(&content)
            .map_err(|e| DisparoError::Config(format!("failed to parse config: {}", e)))?
    } else {
        info!(
            "Config file not found at {}, using defaults",
            file.display()
        );
        Config::default()
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}
