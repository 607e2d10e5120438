//! Login and registration webhooks.

use super::ensure_success;
use disparo_core::{config::AccountConfig, error::DisparoError};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

/// Client for the account webhooks (`{email, senha}` bodies).
#[derive(Debug, Clone)]
pub struct AccountClient {
    client: reqwest::Client,
    login_url: String,
    register_url: String,
}

impl AccountClient {
    pub fn new(config: &AccountConfig, timeout: Duration) -> Result<Self, DisparoError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DisparoError::Config(format!("HTTP client init failed: {e}")))?;
        Ok(Self {
            client,
            login_url: config.login_url.clone(),
            register_url: config.register_url.clone(),
        })
    }

    /// Check credentials. `Ok(false)` means the webhook answered but the
    /// credentials did not match.
    pub async fn login(&self, email: &str, password: &str) -> Result<bool, DisparoError> {
        check_credentials(email, password)?;

        let resp = self
            .client
            .post(&self.login_url)
            .json(&json!({ "email": email, "senha": password }))
            .send()
            .await
            .map_err(|e| DisparoError::Network(format!("login request failed: {e}")))?;
        let resp = ensure_success(resp, "login endpoint").await?;

        let body: Value = resp
            .json()
            .await
            .map_err(|e| DisparoError::UnexpectedResponse(format!("login body: {e}")))?;

        let matched = body
            .as_array()
            .and_then(|a| a.first())
            .is_some_and(|first| {
                first.get("email").and_then(Value::as_str) == Some(email)
                    && first.get("senha").and_then(Value::as_str) == Some(password)
            });

        if matched {
            info!("login accepted for {email}");
        } else {
            warn!("login rejected for {email}");
        }
        Ok(matched)
    }

    /// Create an account.
    pub async fn register(&self, email: &str, password: &str) -> Result<(), DisparoError> {
        check_credentials(email, password)?;

        let resp = self
            .client
            .post(&self.register_url)
            .json(&json!({ "email": email, "senha": password }))
            .send()
            .await
            .map_err(|e| DisparoError::Network(format!("register request failed: {e}")))?;
        ensure_success(resp, "register endpoint").await?;
        info!("account created for {email}");
        Ok(())
    }
}

fn check_credentials(email: &str, password: &str) -> Result<(), DisparoError> {
    let mut fields = Vec::new();
    if email.trim().is_empty() {
        fields.push("email".to_string());
    }
    if password.is_empty() {
        fields.push("password".to_string());
    }
    if fields.is_empty() {
        Ok(())
    } else {
        Err(DisparoError::Validation {
            fields,
            message: "email and password are required".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn client_for(server: &mockito::Server) -> AccountClient {
        let config = AccountConfig {
            login_url: format!("{}/webhook/login-app", server.url()),
            register_url: format!("{}/webhook/cadastrar-conta", server.url()),
        };
        AccountClient::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_login_match() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/webhook/login-app")
            .match_body(Matcher::Json(
                json!({"email": "ana@example.com", "senha": "s3cret"}),
            ))
            .with_status(200)
            .with_body(r#"[{"email":"ana@example.com","senha":"s3cret"}]"#)
            .create_async()
            .await;

        let ok = client_for(&server)
            .login("ana@example.com", "s3cret")
            .await
            .unwrap();

        mock.assert_async().await;
        assert!(ok);
    }

    #[tokio::test]
    async fn test_login_mismatch_and_empty() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/webhook/login-app")
            .with_status(200)
            .with_body("[]")
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server);
        assert!(!client.login("ana@example.com", "wrong").await.unwrap());

        let err = client.login(" ", "").await.unwrap_err();
        assert_eq!(err.fields(), &["email", "password"]);
    }

    #[tokio::test]
    async fn test_register_failure() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/webhook/cadastrar-conta")
            .with_status(409)
            .with_body("exists")
            .create_async()
            .await;

        let err = client_for(&server)
            .register("ana@example.com", "s3cret")
            .await
            .unwrap_err();

        mock.assert_async().await;
        assert!(err.to_string().contains("409"));
    }
}
