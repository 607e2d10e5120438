use thiserror::Error;

/// Top-level error type for Disparo.
#[derive(Debug, Error)]
pub enum DisparoError {
    /// Bad or missing user input, caught before any I/O.
    #[error("invalid {}: {message}", fields.join(", "))]
    Validation {
        fields: Vec<String>,
        message: String,
    },

    /// Transport failure or non-2xx response.
    #[error("network error: {0}")]
    Network(String),

    /// Response JSON didn't match any recognised shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// A bulk job was aborted by a failed send.
    #[error("dispatch error: {0}")]
    Dispatch(String),

    /// A request is already outstanding for this session.
    #[error("busy: {0}")]
    Busy(String),

    /// Payment provider error (Stripe, Asaas).
    #[error("provider error: {0}")]
    Provider(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DisparoError {
    /// Single-field validation error.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        Self::Validation {
            fields: vec![field.to_string()],
            message: message.into(),
        }
    }

    /// Names of the offending fields, empty for non-validation errors.
    pub fn fields(&self) -> &[String] {
        match self {
            Self::Validation { fields, .. } => fields,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display_names_fields() {
        let err = DisparoError::Validation {
            fields: vec!["recipients".into(), "text".into()],
            message: "required".into(),
        };
        assert_eq!(err.to_string(), "invalid recipients, text: required");
        assert_eq!(err.fields(), &["recipients", "text"]);
    }

    #[test]
    fn test_non_validation_has_no_fields() {
        let err = DisparoError::Network("connection refused".into());
        assert!(err.fields().is_empty());
        assert!(err.to_string().contains("connection refused"));
    }
}
