//! User models and auth DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub active: i64,
    pub email_verified: i64,
    pub failed_login_attempts: i64,
    pub locked_until: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl User {
    /// Whether the account is currently locked out. Timestamps are RFC 3339
    /// strings written by this crate, so lexicographic comparison is safe.
    pub fn is_locked(&self, now: &str) -> bool {
        self.locked_until
            .as_deref()
            .map(|until| now < until)
            .unwrap_or(false)
    }
}

/// Response DTO that excludes the password hash and lockout bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub active: bool,
    pub email_verified: bool,
    pub roles: Vec<String>,
    pub created_at: String,
}

impl UserResponse {
    pub fn new(user: User, roles: Vec<String>) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            active: user.active != 0,
            email_verified: user.email_verified != 0,
            roles,
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct RefreshTokenResponse {
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct CheckEmailParams {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct CheckEmailResponse {
    pub exists: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub active: Option<bool>,
    pub roles: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct StatisticsResponse {
    pub total_users: i64,
    pub active_users: i64,
    pub verified_users: i64,
    pub admins: i64,
}
