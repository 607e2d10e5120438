use crate::{error::DisparoError, message::Payload, status::StatusReply};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Gateway-status endpoint: asks whether an instance is paired.
#[async_trait]
pub trait StatusGateway: Send + Sync {
    /// Query the status of `instance`.
    ///
    /// Transport failures and non-2xx responses are `DisparoError::Network`.
    async fn instance_status(&self, instance: &str) -> Result<StatusReply, DisparoError>;
}

/// Message-send endpoints. One request delivers one payload to one number.
#[async_trait]
pub trait MessageGateway: Send + Sync {
    async fn send(
        &self,
        instance: &str,
        recipient: &str,
        payload: &Payload,
    ) -> Result<(), DisparoError>;
}

/// Severity of a user-facing notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Success,
    Info,
    Error,
}

/// A transient user-facing notice (the dashboard's toast).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub level: NotificationLevel,
    pub title: String,
    pub description: String,
}

impl Notification {
    pub fn success(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Success,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn info(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Info,
            title: title.into(),
            description: description.into(),
        }
    }

    pub fn error(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            level: NotificationLevel::Error,
            title: title.into(),
            description: description.into(),
        }
    }
}

/// Where notifications are surfaced (terminal, log, test recorder).
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}
