//! Instance-status reply shapes returned by the gateway-status endpoint.

use serde_json::Value;

/// What the gateway said about an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReply {
    /// The session is authenticated (`connectionStatus: "open"`).
    Open,
    /// Not yet paired; a fresh QR image (base64 PNG, no data-URI prefix).
    Qr(String),
    /// Anything else; carries a short description for logs.
    Unexpected(String),
}

const DATA_URI_PREFIX: &str = "base64,";

impl StatusReply {
    /// Interpret the status endpoint's JSON body.
    ///
    /// The body is an array whose first element has a `data` member that is
    /// either the status object itself or an array holding it.
    pub fn from_json(body: &Value) -> Self {
        let Some(first) = body.as_array().and_then(|a| a.first()) else {
            return Self::Unexpected("expected a non-empty array".to_string());
        };
        let data = match first.get("data") {
            Some(Value::Array(items)) => items.first(),
            Some(other) => Some(other),
            None => None,
        };
        let Some(data) = data.and_then(Value::as_object) else {
            return Self::Unexpected("missing data object".to_string());
        };

        if data.get("connectionStatus").and_then(Value::as_str) == Some("open") {
            return Self::Open;
        }

        match data.get("base64").and_then(Value::as_str) {
            Some(b64) if !b64.trim().is_empty() => {
                let raw = match b64.find(DATA_URI_PREFIX) {
                    Some(idx) if b64.starts_with("data:") => &b64[idx + DATA_URI_PREFIX.len()..],
                    _ => b64,
                };
                Self::Qr(raw.trim().to_string())
            }
            _ => {
                let keys: Vec<&str> = data.keys().map(String::as_str).collect();
                Self::Unexpected(format!("unrecognised data keys: {}", keys.join(",")))
            }
        }
    }
}
