//! Role administration. The built-in ADMIN and CLIENTE roles are seeded at
//! startup and cannot be deleted.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use crate::api::auth::AuthUser;
use crate::api::error::ApiError;
use crate::api::validation;
use crate::db::{CreateRoleRequest, Role, UpdateRoleRequest};
use crate::AppState;

const BUILTIN_ROLES: [&str; 2] = ["ADMIN", "CLIENTE"];

async fn load_role(state: &AppState, id: &str) -> Result<Role, ApiError> {
    let role: Option<Role> = sqlx::query_as("SELECT * FROM roles WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?;
    role.ok_or_else(|| ApiError::not_found("Role not found"))
}

/// GET /roles (admin)
pub async fn list_roles(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<Vec<Role>>, ApiError> {
    auth.require_admin()?;

    let roles: Vec<Role> = sqlx::query_as("SELECT * FROM roles ORDER BY name")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(roles))
}

/// POST /roles (admin)
pub async fn create_role(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(req): Json<CreateRoleRequest>,
) -> Result<(StatusCode, Json<Role>), ApiError> {
    auth.require_admin()?;

    if let Err(e) = validation::validate_role_name(&req.name) {
        return Err(ApiError::validation_field("name", e));
    }

    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM roles WHERE name = ?")
        .bind(&req.name)
        .fetch_optional(&state.db)
        .await?;
    if existing.is_some() {
        return Err(ApiError::conflict("A role with this name already exists"));
    }

    let id = uuid::Uuid::new_v4().to_string();
    sqlx::query("INSERT INTO roles (id, name, description, active) VALUES (?, ?, ?, 1)")
        .bind(&id)
        .bind(&req.name)
        .bind(&req.description)
        .execute(&state.db)
        .await?;

    tracing::info!(role = %req.name, "Created role");

    let role = load_role(&state, &id).await?;
    Ok((StatusCode::CREATED, Json(role)))
}

/// GET /roles/{id} (admin)
pub async fn get_role(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<Role>, ApiError> {
    auth.require_admin()?;
    let role = load_role(&state, &id).await?;
    Ok(Json(role))
}

/// PUT /roles/{id} (admin). The name is immutable; tokens carry role names,
/// so renaming would silently strip the role from every outstanding token.
pub async fn update_role(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateRoleRequest>,
) -> Result<Json<Role>, ApiError> {
    auth.require_admin()?;

    let role = load_role(&state, &id).await?;

    if let Some(active) = req.active {
        if !active && BUILTIN_ROLES.contains(&role.name.as_str()) {
            return Err(ApiError::business("Built-in roles cannot be deactivated"));
        }
        sqlx::query("UPDATE roles SET active = ? WHERE id = ?")
            .bind(active as i64)
            .bind(&role.id)
            .execute(&state.db)
            .await?;
    }

    if let Some(description) = &req.description {
        sqlx::query("UPDATE roles SET description = ? WHERE id = ?")
            .bind(description)
            .bind(&role.id)
            .execute(&state.db)
            .await?;
    }

    let role = load_role(&state, &id).await?;
    Ok(Json(role))
}

/// DELETE /roles/{id} (admin). Memberships are removed with the role.
pub async fn delete_role(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    auth.require_admin()?;

    let role = load_role(&state, &id).await?;
    if BUILTIN_ROLES.contains(&role.name.as_str()) {
        return Err(ApiError::business("Built-in roles cannot be deleted"));
    }

    let mut tx = state.db.begin().await?;
    sqlx::query("DELETE FROM user_roles WHERE role_id = ?")
        .bind(&role.id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM roles WHERE id = ?")
        .bind(&role.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(role = %role.name, "Deleted role");
    Ok(Json(serde_json::json!({ "deleted": true })))
}
