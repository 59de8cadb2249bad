//! User management endpoints: self-service profile plus admin CRUD.

use axum::{
    extract::{Path, State},
    Json,
};
use std::sync::Arc;

use crate::api::auth::{self, hash_password, AuthUser};
use crate::api::error::{ApiError, ValidationErrorBuilder};
use crate::api::validation;
use crate::db::{
    StatisticsResponse, UpdateProfileRequest, UpdateUserRequest, User, UserResponse,
};
use crate::AppState;

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

async fn load_user(state: &AppState, id: &str) -> Result<User, ApiError> {
    let user: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?;
    user.ok_or_else(|| ApiError::not_found("User not found"))
}

async fn user_response(state: &AppState, user: User) -> Result<UserResponse, ApiError> {
    let roles = auth::roles_for_user(&state.db, &user.id).await?;
    Ok(UserResponse::new(user, roles))
}

/// GET /usuarios/profile
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<UserResponse>, ApiError> {
    let user = load_user(&state, &auth.id).await?;
    Ok(Json(user_response(&state, user).await?))
}

/// PUT /usuarios/profile
pub async fn update_profile(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    if let Some(name) = &req.name {
        if let Err(e) = validation::validate_name(name) {
            errors.add("name", e);
        }
    }
    if let Some(password) = &req.password {
        if let Err(e) = validation::validate_password(password) {
            errors.add("password", e);
        }
    }
    errors.finish()?;

    let user = load_user(&state, &auth.id).await?;

    if let Some(name) = &req.name {
        sqlx::query("UPDATE users SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name.trim())
            .bind(now())
            .bind(&user.id)
            .execute(&state.db)
            .await?;
    }

    if let Some(password) = &req.password {
        let password_hash = hash_password(password)
            .map_err(|e| ApiError::internal(format!("Failed to hash password: {}", e)))?;
        sqlx::query("UPDATE users SET password_hash = ?, updated_at = ? WHERE id = ?")
            .bind(&password_hash)
            .bind(now())
            .bind(&user.id)
            .execute(&state.db)
            .await?;
    }

    let user = load_user(&state, &auth.id).await?;
    Ok(Json(user_response(&state, user).await?))
}

/// GET /usuarios (admin)
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    auth.require_admin()?;

    let users: Vec<User> = sqlx::query_as("SELECT * FROM users ORDER BY created_at DESC")
        .fetch_all(&state.db)
        .await?;

    let mut responses = Vec::with_capacity(users.len());
    for user in users {
        responses.push(user_response(&state, user).await?);
    }
    Ok(Json(responses))
}

/// GET /usuarios/{id} (self or admin)
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    auth.require_self_or_admin(&id)?;
    let user = load_user(&state, &id).await?;
    Ok(Json(user_response(&state, user).await?))
}

/// PUT /usuarios/{id} (admin)
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    auth.require_admin()?;

    let user = load_user(&state, &id).await?;

    if let Some(name) = &req.name {
        if let Err(e) = validation::validate_name(name) {
            return Err(ApiError::validation_field("name", e));
        }
        sqlx::query("UPDATE users SET name = ?, updated_at = ? WHERE id = ?")
            .bind(name.trim())
            .bind(now())
            .bind(&user.id)
            .execute(&state.db)
            .await?;
    }

    if let Some(active) = req.active {
        // Admins cannot deactivate their own account
        if !active && user.id == auth.id {
            return Err(ApiError::business("Cannot deactivate your own account"));
        }
        sqlx::query("UPDATE users SET active = ?, updated_at = ? WHERE id = ?")
            .bind(active as i64)
            .bind(now())
            .bind(&user.id)
            .execute(&state.db)
            .await?;
    }

    if let Some(roles) = &req.roles {
        replace_roles(&state, &user.id, roles).await?;
    }

    let user = load_user(&state, &id).await?;
    Ok(Json(user_response(&state, user).await?))
}

/// DELETE /usuarios/{id} (admin)
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    auth.require_admin()?;

    if id == auth.id {
        return Err(ApiError::business("Cannot delete your own account"));
    }

    let user = load_user(&state, &id).await?;

    // Role memberships, tokens, and carts cascade with the user row
    sqlx::query("DELETE FROM carritos WHERE usuario_id = ?")
        .bind(&user.id)
        .execute(&state.db)
        .await?;
    sqlx::query("DELETE FROM users WHERE id = ?")
        .bind(&user.id)
        .execute(&state.db)
        .await?;

    tracing::info!(user_id = %user.id, "Deleted user");
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// GET /usuarios/statistics (admin)
pub async fn statistics(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<StatisticsResponse>, ApiError> {
    auth.require_admin()?;

    let total_users: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
        .fetch_one(&state.db)
        .await?;
    let active_users: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE active = 1")
        .fetch_one(&state.db)
        .await?;
    let verified_users: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM users WHERE email_verified = 1")
            .fetch_one(&state.db)
            .await?;
    let admins: (i64,) = sqlx::query_as(
        "SELECT COUNT(DISTINCT ur.user_id) FROM user_roles ur \
         JOIN roles r ON r.id = ur.role_id WHERE r.name = 'ADMIN'",
    )
    .fetch_one(&state.db)
    .await?;

    Ok(Json(StatisticsResponse {
        total_users: total_users.0,
        active_users: active_users.0,
        verified_users: verified_users.0,
        admins: admins.0,
    }))
}

/// Replace a user's role memberships with the given role names. Every name
/// must refer to an existing active role.
async fn replace_roles(
    state: &AppState,
    user_id: &str,
    role_names: &[String],
) -> Result<(), ApiError> {
    let mut role_ids = Vec::with_capacity(role_names.len());
    for name in role_names {
        let role: Option<(String,)> =
            sqlx::query_as("SELECT id FROM roles WHERE name = ? AND active = 1")
                .bind(name)
                .fetch_optional(&state.db)
                .await?;
        match role {
            Some((id,)) => role_ids.push(id),
            None => {
                return Err(ApiError::validation_field(
                    "roles",
                    format!("Unknown role: {}", name),
                ))
            }
        }
    }

    let mut tx = state.db.begin().await?;
    sqlx::query("DELETE FROM user_roles WHERE user_id = ?")
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    for role_id in role_ids {
        sqlx::query("INSERT INTO user_roles (user_id, role_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(&role_id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::{register, AuthUser};
    use crate::config::Config;
    use crate::db::{self, RegisterRequest};
    use axum::http::StatusCode;

    async fn test_state() -> Arc<AppState> {
        let mut config = Config::default();
        config.auth.jwt_secret = "test-secret".to_string();
        let pool = db::init_test().await;
        Arc::new(AppState::new(config, pool))
    }

    async fn register_user(state: &Arc<AppState>, email: &str) -> UserResponse {
        let (status, Json(user)) = register(
            State(state.clone()),
            Json(RegisterRequest {
                email: email.to_string(),
                password: "password1".to_string(),
                name: "Test User".to_string(),
            }),
        )
        .await
        .unwrap();
        assert_eq!(status, StatusCode::CREATED);
        user
    }

    fn auth_as(state: &Arc<AppState>, user_id: &str, roles: &[&str]) -> AuthUser {
        let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
        let token = state.tokens.issue_access_token(user_id, &roles).unwrap();
        let claims = state.tokens.verify_access(&token).unwrap();
        AuthUser {
            id: claims.sub.clone(),
            claims,
        }
    }

    #[tokio::test]
    async fn test_profile_round_trip() {
        let state = test_state().await;
        let user = register_user(&state, "ana@example.com").await;

        let Json(profile) = get_profile(
            State(state.clone()),
            auth_as(&state, &user.id, &["CLIENTE"]),
        )
        .await
        .unwrap();
        assert_eq!(profile.email, "ana@example.com");

        let Json(profile) = update_profile(
            State(state.clone()),
            auth_as(&state, &user.id, &["CLIENTE"]),
            Json(UpdateProfileRequest {
                name: Some("Ana Pérez".to_string()),
                password: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(profile.name, "Ana Pérez");
    }

    #[tokio::test]
    async fn test_list_users_requires_admin() {
        let state = test_state().await;
        let user = register_user(&state, "ana@example.com").await;

        let result = list_users(
            State(state.clone()),
            auth_as(&state, &user.id, &["CLIENTE"]),
        )
        .await;
        assert!(result.is_err());

        let Json(users) = list_users(
            State(state.clone()),
            auth_as(&state, "admin-1", &["ADMIN"]),
        )
        .await
        .unwrap();
        assert_eq!(users.len(), 1);
    }

    #[tokio::test]
    async fn test_admin_replaces_roles() {
        let state = test_state().await;
        let user = register_user(&state, "ana@example.com").await;

        let Json(updated) = update_user(
            State(state.clone()),
            auth_as(&state, "admin-1", &["ADMIN"]),
            Path(user.id.clone()),
            Json(UpdateUserRequest {
                name: None,
                active: None,
                roles: Some(vec!["ADMIN".to_string(), "CLIENTE".to_string()]),
            }),
        )
        .await
        .unwrap();
        assert_eq!(
            updated.roles,
            vec!["ADMIN".to_string(), "CLIENTE".to_string()]
        );

        // Unknown role names are rejected
        let result = update_user(
            State(state.clone()),
            auth_as(&state, "admin-1", &["ADMIN"]),
            Path(user.id.clone()),
            Json(UpdateUserRequest {
                name: None,
                active: None,
                roles: Some(vec!["SUPERUSER".to_string()]),
            }),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_delete_user_removes_carts() {
        let state = test_state().await;
        let user = register_user(&state, "ana@example.com").await;

        crate::cart::get_or_create_active_cart(&state.db, &user.id)
            .await
            .unwrap();

        delete_user(
            State(state.clone()),
            auth_as(&state, "admin-1", &["ADMIN"]),
            Path(user.id.clone()),
        )
        .await
        .unwrap();

        let carts: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM carritos WHERE usuario_id = ?")
            .bind(&user.id)
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(carts.0, 0);
    }

    #[tokio::test]
    async fn test_statistics_counts() {
        let state = test_state().await;
        register_user(&state, "ana@example.com").await;
        register_user(&state, "ben@example.com").await;

        let Json(stats) = statistics(
            State(state.clone()),
            auth_as(&state, "admin-1", &["ADMIN"]),
        )
        .await
        .unwrap();
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.active_users, 2);
        assert_eq!(stats.verified_users, 0);
        assert_eq!(stats.admins, 0);
    }
}
