//! One-shot password-reset and email-verification tokens.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// What a stored token may be redeemed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenPurpose {
    PasswordReset,
    EmailVerification,
}

impl TokenPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenPurpose::PasswordReset => "password_reset",
            TokenPurpose::EmailVerification => "email_verification",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PasswordResetToken {
    pub id: String,
    pub user_id: String,
    pub token_hash: String,
    pub kind: String,
    pub used: i64,
    pub expires_at: String,
    pub created_at: String,
}

impl PasswordResetToken {
    /// A token is valid only while unused and unexpired
    pub fn is_valid(&self, now: &str) -> bool {
        self.used == 0 && now < self.expires_at.as_str()
    }
}
