//! Explicit login/instance session shared by the poller and the dispatcher.

use chrono::{DateTime, Utc};
use std::sync::{PoisonError, RwLock};

use crate::error::DisparoError;

#[derive(Debug, Clone, Default)]
struct SessionState {
    user: Option<String>,
    logged_in_at: Option<DateTime<Utc>>,
    connected_instance: Option<String>,
}

/// Who is logged in and which gateway instance is connected.
///
/// Created once at startup and passed by `Arc` to whatever needs it.
#[derive(Debug, Default)]
pub struct Session {
    state: RwLock<SessionState>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login(&self, email: &str) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.user = Some(email.to_string());
        state.logged_in_at = Some(Utc::now());
    }

    /// Clears the user and the connected instance.
    pub fn logout(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        *state = SessionState::default();
    }

    pub fn user(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .user
            .clone()
    }

    pub fn logged_in_at(&self) -> Option<DateTime<Utc>> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .logged_in_at
    }

    /// The logged-in user, or a validation error for protected operations.
    pub fn require_user(&self) -> Result<String, DisparoError> {
        self.user()
            .ok_or_else(|| DisparoError::invalid("email", "login required"))
    }

    pub fn set_connected_instance(&self, instance: Option<String>) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.connected_instance = instance;
    }

    pub fn connected_instance(&self) -> Option<String> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .connected_instance
            .clone()
    }
}
