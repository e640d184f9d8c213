use crate::error::{Result, ScreeningError};
use serde::{Deserialize, Serialize};

/// Authentication as reported by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthState {
    pub authenticated: bool,
    pub user_id: Option<String>,
    pub sign_in_url: String,
}

impl AuthState {
    pub fn signed_in(user_id: impl Into<String>, sign_in_url: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            user_id: Some(user_id.into()),
            sign_in_url: sign_in_url.into(),
        }
    }

    pub fn signed_out(sign_in_url: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            user_id: None,
            sign_in_url: sign_in_url.into(),
        }
    }

    /// The signed-in user, or where to send the caller to sign in
    pub fn require_user(&self) -> Result<&str> {
        match (&self.user_id, self.authenticated) {
            (Some(user_id), true) if !user_id.trim().is_empty() => Ok(user_id),
            _ => Err(ScreeningError::Unauthenticated {
                redirect: self.sign_in_url.clone(),
            }),
        }
    }
}
