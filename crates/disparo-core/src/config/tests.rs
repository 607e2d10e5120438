use super::*;
use std::collections::HashMap;

fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[test]
fn test_defaults() {
    let cfg = Config::default();
    assert_eq!(cfg.poller.interval_ms, 29_000);
    assert_eq!(cfg.poller.interval(), Duration::from_secs(29));
    assert_eq!(cfg.api.port, 3000);
    assert_eq!(cfg.billing.currency, "brl");
    assert_eq!(cfg.gateway.instance_id, "instance-id-placeholder");
    assert_eq!(cfg.dispatch.default_delay_secs, 0.0);
}

#[test]
fn test_partial_toml_keeps_defaults() {
    let toml_str = r#"
        [gateway]
        backend_url = "https://evo.example.com"

        [poller]
        interval_ms = 5000
    "#;
    let cfg: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(cfg.gateway.backend_url, "https://evo.example.com");
    assert_eq!(cfg.gateway.timeout_secs, 30);
    assert_eq!(cfg.poller.interval_ms, 5000);
    assert_eq!(cfg.disparo.log_level, "info");
}

#[test]
fn test_env_overrides() {
    let vars = env(&[
        ("VITE_BACKEND_URL", "https://legacy.example.com"),
        ("DISPARO_BACKEND_URL", "https://evo.example.com"),
        ("STRIPE_SECRET_KEY", "sk_test_123"),
        ("ASAAS_API_KEY", ""),
        ("PORT", "8080"),
    ]);
    let mut cfg = Config::default();
    apply_env_overrides(&mut cfg, |k| vars.get(k).cloned()).unwrap();

    assert_eq!(cfg.gateway.backend_url, "https://evo.example.com");
    assert_eq!(cfg.billing.backend_url, "https://evo.example.com");
    assert_eq!(cfg.billing.stripe_secret_key, "sk_test_123");
    assert!(cfg.billing.asaas_api_key.is_empty(), "empty values are ignored");
    assert_eq!(cfg.api.port, 8080);
}

#[test]
fn test_env_keeps_explicit_billing_backend() {
    let vars = env(&[("VITE_BACKEND_URL", "https://evo.example.com")]);
    let mut cfg = Config::default();
    cfg.billing.backend_url = "http://localhost:3000".to_string();
    apply_env_overrides(&mut cfg, |k| vars.get(k).cloned()).unwrap();
    assert_eq!(cfg.billing.backend_url, "http://localhost:3000");
}

#[test]
fn test_env_bad_port() {
    let vars = env(&[("PORT", "eighty")]);
    let mut cfg = Config::default();
    let err = apply_env_overrides(&mut cfg, |k| vars.get(k).cloned()).unwrap_err();
    assert!(err.to_string().contains("invalid PORT"));
}

#[test]
fn test_load_missing_file_uses_defaults() {
    let cfg = load("/nonexistent/__disparo_test__/config.toml").unwrap();
    assert_eq!(cfg.disparo.name, "Disparo");
}

#[test]
fn test_load_rejects_bad_toml() {
    let tmp = std::env::temp_dir().join("__disparo_test_bad_config__.toml");
    std::fs::write(&tmp, "[poller\ninterval_ms = ").unwrap();
    let err = load(tmp.to_str().unwrap()).unwrap_err();
    assert!(err.to_string().contains("failed to parse config"));
    let _ = std::fs::remove_file(&tmp);
}

#[test]
fn test_shellexpand_plain_path() {
    assert_eq!(shellexpand("/var/lib/disparo"), "/var/lib/disparo");
}
