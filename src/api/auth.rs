//! Authentication endpoints: register, login with lockout bookkeeping,
//! token refresh, password reset, and email verification.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    async_trait,
    extract::{FromRequestParts, Query, State},
    http::{request::Parts, HeaderMap, StatusCode},
    Json,
};
use rand::Rng;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::api::error::{ApiError, ValidationErrorBuilder};
use crate::api::validation;
use crate::db::{
    CheckEmailParams, CheckEmailResponse, DbPool, ForgotPasswordRequest, LoginRequest,
    LoginResponse, PasswordResetToken, RefreshTokenRequest, RefreshTokenResponse, RegisterRequest,
    ResetPasswordRequest, TokenPurpose, User, UserResponse, VerifyEmailRequest,
};
use crate::token::{Claims, Role};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    let hash = argon2.hash_password(password.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a password against a hash
pub fn verify_password(password: &str, hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(h) => h,
        Err(_) => return false,
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Generate a random one-shot token
fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();
    hex::encode(bytes)
}

/// Hash a token for storage
fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Extract the bearer token from request headers
fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

/// Role names assigned to a user
pub async fn roles_for_user(pool: &DbPool, user_id: &str) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT r.name FROM roles r \
         JOIN user_roles ur ON ur.role_id = r.id \
         WHERE ur.user_id = ? AND r.active = 1 \
         ORDER BY r.name",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

/// The authenticated caller, resolved from a verified access token.
/// A structurally valid refresh token is rejected here.
pub struct AuthUser {
    pub id: String,
    pub claims: Claims,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.claims.has_role(Role::Admin)
    }

    pub fn require_admin(&self) -> Result<(), ApiError> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Administrator role required"))
        }
    }

    /// Cart and profile endpoints are per-user; admins may act on any user
    pub fn require_self_or_admin(&self, user_id: &str) -> Result<(), ApiError> {
        if self.id == user_id || self.is_admin() {
            Ok(())
        } else {
            Err(ApiError::forbidden("Not allowed for this user"))
        }
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer(&parts.headers)
            .ok_or_else(|| ApiError::unauthorized("Missing bearer token"))?;
        let claims = state.tokens.verify_access(token)?;
        Ok(AuthUser {
            id: claims.sub.clone(),
            claims,
        })
    }
}

/// Create the seeded admin account if configured and missing
pub async fn ensure_admin_user(
    pool: &DbPool,
    email: &str,
    password: Option<&str>,
) -> anyhow::Result<()> {
    let Some(password) = password else {
        return Ok(());
    };

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(email)
        .fetch_optional(pool)
        .await?;
    if existing.is_some() {
        return Ok(());
    }

    let id = uuid::Uuid::new_v4().to_string();
    let password_hash =
        hash_password(password).map_err(|e| anyhow::anyhow!("Failed to hash password: {e}"))?;
    let ts = now();

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, name, active, email_verified, created_at, updated_at) \
         VALUES (?, ?, ?, 'Administrator', 1, 1, ?, ?)",
    )
    .bind(&id)
    .bind(email)
    .bind(&password_hash)
    .bind(&ts)
    .bind(&ts)
    .execute(pool)
    .await?;

    sqlx::query(
        "INSERT INTO user_roles (user_id, role_id) \
         SELECT ?, id FROM roles WHERE name = 'ADMIN'",
    )
    .bind(&id)
    .execute(pool)
    .await?;

    tracing::info!("Created admin user {}", email);
    Ok(())
}

/// Store a new one-shot token for the user and return the raw value
pub(crate) async fn create_reset_token(
    pool: &DbPool,
    user_id: &str,
    purpose: TokenPurpose,
    hours: i64,
) -> Result<String, sqlx::Error> {
    let raw = generate_token();
    let expires_at = (chrono::Utc::now() + chrono::Duration::hours(hours)).to_rfc3339();

    sqlx::query(
        "INSERT INTO password_reset_tokens (id, user_id, token_hash, kind, used, expires_at) \
         VALUES (?, ?, ?, ?, 0, ?)",
    )
    .bind(uuid::Uuid::new_v4().to_string())
    .bind(user_id)
    .bind(hash_token(&raw))
    .bind(purpose.as_str())
    .bind(&expires_at)
    .execute(pool)
    .await?;

    Ok(raw)
}

/// Bulk sweep of expired and consumed tokens. Not scheduled in-process;
/// invoked at startup and available to an external job runner.
pub async fn delete_expired_tokens(pool: &DbPool) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM password_reset_tokens WHERE expires_at < ? OR used = 1")
        .bind(now())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

// -------------------------------------------------------------------------
// Handlers
// -------------------------------------------------------------------------

/// Register a new customer account
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Err(e) = validation::validate_email(&req.email) {
        errors.add("email", e);
    }
    if let Err(e) = validation::validate_password(&req.password) {
        errors.add("password", e);
    }
    if let Err(e) = validation::validate_name(&req.name) {
        errors.add("name", e);
    }
    errors.finish()?;

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(&req.email)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(ApiError::conflict("An account with this email already exists"));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let password_hash = hash_password(&req.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;
    let ts = now();

    sqlx::query(
        "INSERT INTO users (id, email, password_hash, name, active, email_verified, created_at, updated_at) \
         VALUES (?, ?, ?, ?, 1, 0, ?, ?)",
    )
    .bind(&id)
    .bind(&req.email)
    .bind(&password_hash)
    .bind(req.name.trim())
    .bind(&ts)
    .bind(&ts)
    .execute(&state.db)
    .await?;

    sqlx::query(
        "INSERT INTO user_roles (user_id, role_id) \
         SELECT ?, id FROM roles WHERE name = 'CLIENTE'",
    )
    .bind(&id)
    .execute(&state.db)
    .await?;

    tracing::info!(user_id = %id, "Registered new user");

    // Verification email is best-effort; registration succeeds regardless
    let token = create_reset_token(
        &state.db,
        &id,
        TokenPurpose::EmailVerification,
        state.config.auth.reset_token_hours,
    )
    .await?;
    if let Err(e) = state.email.send_verification_email(&req.email, &token).await {
        tracing::warn!(error = %e, "Failed to send verification email");
    }

    let user: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;
    let roles = roles_for_user(&state.db, &id).await?;

    Ok((StatusCode::CREATED, Json(UserResponse::new(user, roles))))
}

/// Login endpoint with failed-attempt lockout
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&req.email)
        .fetch_optional(&state.db)
        .await?;

    let user = user.ok_or_else(|| ApiError::unauthorized("Invalid credentials"))?;

    if user.active == 0 {
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    // A locked account rejects even a correct password until the lock expires
    if user.is_locked(&now()) {
        return Err(ApiError::unauthorized(
            "Account is temporarily locked, try again later",
        ));
    }

    if !verify_password(&req.password, &user.password_hash) {
        record_login_failure(
            &state.db,
            &user,
            state.config.auth.max_failed_logins,
            state.config.auth.lockout_minutes,
        )
        .await?;
        return Err(ApiError::unauthorized("Invalid credentials"));
    }

    record_login_success(&state.db, &user.id).await?;

    let roles = roles_for_user(&state.db, &user.id).await?;
    let access_token = state.tokens.issue_access_token(&user.id, &roles)?;
    let refresh_token = state.tokens.issue_refresh_token(&user.id)?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(LoginResponse {
        access_token,
        refresh_token,
        user: UserResponse::new(user, roles),
    }))
}

/// Exchange a refresh token for a fresh access token
pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshTokenRequest>,
) -> Result<Json<RefreshTokenResponse>, ApiError> {
    let claims = state.tokens.verify_refresh(&req.refresh_token)?;

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(&claims.sub)
        .fetch_optional(&state.db)
        .await?;
    let user = user.ok_or_else(|| ApiError::unauthorized("Invalid or expired token"))?;

    if user.active == 0 {
        return Err(ApiError::unauthorized("Invalid or expired token"));
    }

    let roles = roles_for_user(&state.db, &user.id).await?;
    let access_token = state.tokens.issue_access_token(&user.id, &roles)?;

    Ok(Json(RefreshTokenResponse { access_token }))
}

/// Start a password reset. Responds identically whether or not the email
/// exists, to avoid account enumeration.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if let Err(e) = validation::validate_email(&req.email) {
        return Err(ApiError::validation_field("email", e));
    }

    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE email = ?")
        .bind(&req.email)
        .fetch_optional(&state.db)
        .await?;

    if let Some(user) = user {
        let token = create_reset_token(
            &state.db,
            &user.id,
            TokenPurpose::PasswordReset,
            state.config.auth.reset_token_hours,
        )
        .await?;
        if let Err(e) = state
            .email
            .send_password_reset_email(&user.email, &token)
            .await
        {
            tracing::warn!(error = %e, "Failed to send password reset email");
        }
    }

    Ok(Json(MessageResponse {
        message: "If the email exists, a reset link has been sent".to_string(),
    }))
}

/// Complete a password reset with a one-shot token
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    if let Err(e) = validation::validate_password(&req.password) {
        return Err(ApiError::validation_field("password", e));
    }

    let token = consume_token(&state.db, &req.token, TokenPurpose::PasswordReset).await?;

    let password_hash = hash_password(&req.password)
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;

    // A completed reset also clears any pending lockout
    sqlx::query(
        "UPDATE users SET password_hash = ?, failed_login_attempts = 0, locked_until = NULL, \
         updated_at = ? WHERE id = ?",
    )
    .bind(&password_hash)
    .bind(now())
    .bind(&token.user_id)
    .execute(&state.db)
    .await?;

    tracing::info!(user_id = %token.user_id, "Password reset completed");

    Ok(Json(MessageResponse {
        message: "Password updated".to_string(),
    }))
}

/// Confirm an email address with a one-shot token
pub async fn verify_email(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyEmailRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let token = consume_token(&state.db, &req.token, TokenPurpose::EmailVerification).await?;

    sqlx::query("UPDATE users SET email_verified = 1, updated_at = ? WHERE id = ?")
        .bind(now())
        .bind(&token.user_id)
        .execute(&state.db)
        .await?;

    Ok(Json(MessageResponse {
        message: "Email verified".to_string(),
    }))
}

/// Check whether an email is already registered
pub async fn check_email(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CheckEmailParams>,
) -> Result<Json<CheckEmailResponse>, ApiError> {
    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM users WHERE email = ?")
        .bind(&params.email)
        .fetch_optional(&state.db)
        .await?;

    Ok(Json(CheckEmailResponse {
        exists: existing.is_some(),
    }))
}

// -------------------------------------------------------------------------
// Lockout and token bookkeeping
// -------------------------------------------------------------------------

async fn record_login_failure(
    pool: &DbPool,
    user: &User,
    max_failed: i64,
    lockout_minutes: i64,
) -> Result<(), ApiError> {
    let attempts = user.failed_login_attempts + 1;

    if attempts >= max_failed {
        let locked_until = (chrono::Utc::now() + chrono::Duration::minutes(lockout_minutes))
            .to_rfc3339();
        sqlx::query(
            "UPDATE users SET failed_login_attempts = ?, locked_until = ?, updated_at = ? \
             WHERE id = ?",
        )
        .bind(attempts)
        .bind(&locked_until)
        .bind(now())
        .bind(&user.id)
        .execute(pool)
        .await?;
        tracing::warn!(user_id = %user.id, attempts, "Account locked after repeated failures");
    } else {
        sqlx::query("UPDATE users SET failed_login_attempts = ?, updated_at = ? WHERE id = ?")
            .bind(attempts)
            .bind(now())
            .bind(&user.id)
            .execute(pool)
            .await?;
    }

    Ok(())
}

async fn record_login_success(pool: &DbPool, user_id: &str) -> Result<(), ApiError> {
    sqlx::query(
        "UPDATE users SET failed_login_attempts = 0, locked_until = NULL, updated_at = ? \
         WHERE id = ?",
    )
    .bind(now())
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Look up a one-shot token by its raw value, validate it, and mark it used
async fn consume_token(
    pool: &DbPool,
    raw: &str,
    purpose: TokenPurpose,
) -> Result<PasswordResetToken, ApiError> {
    let token: Option<PasswordResetToken> = sqlx::query_as(
        "SELECT * FROM password_reset_tokens WHERE token_hash = ? AND kind = ?",
    )
    .bind(hash_token(raw))
    .bind(purpose.as_str())
    .fetch_optional(pool)
    .await?;

    let token = token.ok_or_else(|| ApiError::bad_request("Invalid or expired token"))?;
    if !token.is_valid(&now()) {
        return Err(ApiError::bad_request("Invalid or expired token"));
    }

    sqlx::query("UPDATE password_reset_tokens SET used = 1 WHERE id = ?")
        .bind(&token.id)
        .execute(pool)
        .await?;

    Ok(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db;

    async fn test_state() -> Arc<AppState> {
        let mut config = Config::default();
        config.auth.jwt_secret = "test-secret".to_string();
        let pool = db::init_test().await;
        Arc::new(AppState::new(config, pool))
    }

    async fn register_user(state: &Arc<AppState>, email: &str, password: &str) -> UserResponse {
        let (status, Json(user)) = register(
            State(state.clone()),
            Json(RegisterRequest {
                email: email.to_string(),
                password: password.to_string(),
                name: "Test User".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        user
    }

    #[test]
    fn test_hash_and_verify_password() {
        let hash = hash_password("correct-horse-1").unwrap();
        assert!(verify_password("correct-horse-1", &hash));
        assert!(!verify_password("wrong-password-1", &hash));
        assert!(!verify_password("correct-horse-1", "not-a-hash"));
    }

    #[tokio::test]
    async fn test_register_assigns_customer_role() {
        let state = test_state().await;
        let user = register_user(&state, "ana@example.com", "password1").await;

        assert_eq!(user.email, "ana@example.com");
        assert_eq!(user.roles, vec!["CLIENTE".to_string()]);
        assert!(!user.email_verified);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicate_email() {
        let state = test_state().await;
        register_user(&state, "ana@example.com", "password1").await;

        let result = register(
            State(state.clone()),
            Json(RegisterRequest {
                email: "ana@example.com".to_string(),
                password: "password2".to_string(),
                name: "Other".to_string(),
            }),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_login_returns_both_tokens() {
        let state = test_state().await;
        let user = register_user(&state, "ana@example.com", "password1").await;

        let Json(response) = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "ana@example.com".to_string(),
                password: "password1".to_string(),
            }),
        )
        .await
        .unwrap();

        assert_eq!(response.user.id, user.id);
        let claims = state.tokens.verify_access(&response.access_token).unwrap();
        assert_eq!(claims.sub, user.id);
        assert!(claims.has_role(Role::Cliente));
        assert!(state.tokens.verify_refresh(&response.refresh_token).is_ok());
    }

    #[tokio::test]
    async fn test_lockout_after_five_failures() {
        let state = test_state().await;
        let user = register_user(&state, "ana@example.com", "password1").await;

        for _ in 0..5 {
            let result = login(
                State(state.clone()),
                Json(LoginRequest {
                    email: "ana@example.com".to_string(),
                    password: "wrong-pass-9".to_string(),
                }),
            )
            .await;
            assert!(result.is_err());
        }

        // Correct password still fails while locked
        let result = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "ana@example.com".to_string(),
                password: "password1".to_string(),
            }),
        )
        .await;
        assert!(result.is_err());

        // Expire the lock, then login succeeds and the counter resets
        sqlx::query("UPDATE users SET locked_until = ? WHERE id = ?")
            .bind("2000-01-01T00:00:00+00:00")
            .bind(&user.id)
            .execute(&state.db)
            .await
            .unwrap();

        let result = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "ana@example.com".to_string(),
                password: "password1".to_string(),
            }),
        )
        .await;
        assert!(result.is_ok());

        let stored: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&user.id)
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(stored.failed_login_attempts, 0);
        assert!(stored.locked_until.is_none());
    }

    #[tokio::test]
    async fn test_refresh_token_exchange() {
        let state = test_state().await;
        register_user(&state, "ana@example.com", "password1").await;

        let Json(response) = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "ana@example.com".to_string(),
                password: "password1".to_string(),
            }),
        )
        .await
        .unwrap();

        let Json(refreshed) = refresh_token(
            State(state.clone()),
            Json(RefreshTokenRequest {
                refresh_token: response.refresh_token.clone(),
            }),
        )
        .await
        .unwrap();
        assert!(state.tokens.verify_access(&refreshed.access_token).is_ok());

        // An access token must not work as a refresh credential
        let result = refresh_token(
            State(state.clone()),
            Json(RefreshTokenRequest {
                refresh_token: response.access_token,
            }),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_password_reset_flow() {
        let state = test_state().await;
        let user = register_user(&state, "ana@example.com", "password1").await;

        let raw = create_reset_token(&state.db, &user.id, TokenPurpose::PasswordReset, 2)
            .await
            .unwrap();

        reset_password(
            State(state.clone()),
            Json(ResetPasswordRequest {
                token: raw.clone(),
                password: "newpassword2".to_string(),
            }),
        )
        .await
        .unwrap();

        // The token is one-shot
        let result = reset_password(
            State(state.clone()),
            Json(ResetPasswordRequest {
                token: raw,
                password: "anotherpass3".to_string(),
            }),
        )
        .await;
        assert!(result.is_err());

        let result = login(
            State(state.clone()),
            Json(LoginRequest {
                email: "ana@example.com".to_string(),
                password: "newpassword2".to_string(),
            }),
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_verify_email_flow() {
        let state = test_state().await;
        let user = register_user(&state, "ana@example.com", "password1").await;

        let raw = create_reset_token(&state.db, &user.id, TokenPurpose::EmailVerification, 2)
            .await
            .unwrap();

        // A verification token cannot reset a password
        let result = reset_password(
            State(state.clone()),
            Json(ResetPasswordRequest {
                token: raw.clone(),
                password: "newpassword2".to_string(),
            }),
        )
        .await;
        assert!(result.is_err());

        verify_email(
            State(state.clone()),
            Json(VerifyEmailRequest { token: raw }),
        )
        .await
        .unwrap();

        let stored: User = sqlx::query_as("SELECT * FROM users WHERE id = ?")
            .bind(&user.id)
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(stored.email_verified, 1);
    }

    #[tokio::test]
    async fn test_expired_token_sweep() {
        let state = test_state().await;
        let user = register_user(&state, "ana@example.com", "password1").await;

        // register already created one verification token; add an expired one
        create_reset_token(&state.db, &user.id, TokenPurpose::PasswordReset, -1)
            .await
            .unwrap();

        let deleted = delete_expired_tokens(&state.db).await.unwrap();
        assert_eq!(deleted, 1);

        let remaining: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM password_reset_tokens")
                .fetch_one(&state.db)
                .await
                .unwrap();
        assert_eq!(remaining.0, 1);
    }
}
