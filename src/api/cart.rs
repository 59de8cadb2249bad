//! Cart endpoints. All routes are keyed by the cart owner's user id and
//! require the caller to be that user or an administrator.

use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

use crate::api::auth::AuthUser;
use crate::api::error::ApiError;
use crate::api::validation;
use crate::cart::{self, checkout};
use crate::db::{AddItemRequest, CarritoResponse, PedidoResponse, UpdateQuantityParams};
use crate::AppState;

/// GET /carrito/usuario/{usuario_id}
pub async fn get_cart(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(usuario_id): Path<String>,
) -> Result<Json<CarritoResponse>, ApiError> {
    auth.require_self_or_admin(&usuario_id)?;
    let cart = cart::get_or_create_active_cart(&state.db, &usuario_id).await?;
    Ok(Json(cart))
}

/// POST /carrito/usuario/{usuario_id}
pub async fn create_cart(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(usuario_id): Path<String>,
) -> Result<Json<CarritoResponse>, ApiError> {
    auth.require_self_or_admin(&usuario_id)?;
    let cart = cart::create_cart(&state.db, &usuario_id).await?;
    Ok(Json(cart))
}

/// POST /carrito/usuario/{usuario_id}/items
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(usuario_id): Path<String>,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CarritoResponse>, ApiError> {
    auth.require_self_or_admin(&usuario_id)?;

    if req.producto_id.trim().is_empty() {
        return Err(ApiError::validation_field(
            "producto_id",
            "Product id is required",
        ));
    }
    if let Err(e) = validation::validate_cantidad(req.cantidad) {
        return Err(ApiError::validation_field("cantidad", e));
    }
    if let Err(e) = validation::validate_precio(req.precio_unitario) {
        return Err(ApiError::validation_field("precio_unitario", e));
    }

    let cart = cart::add_item(&state.db, &usuario_id, &req).await?;
    Ok(Json(cart))
}

/// PUT /carrito/usuario/{usuario_id}/items/{item_id}?cantidad=N
pub async fn update_quantity(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((usuario_id, item_id)): Path<(String, String)>,
    Query(params): Query<UpdateQuantityParams>,
) -> Result<Json<CarritoResponse>, ApiError> {
    auth.require_self_or_admin(&usuario_id)?;

    if let Err(e) = validation::validate_cantidad(params.cantidad) {
        return Err(ApiError::validation_field("cantidad", e));
    }

    let cart = cart::update_quantity(&state.db, &usuario_id, &item_id, params.cantidad).await?;
    Ok(Json(cart))
}

/// DELETE /carrito/usuario/{usuario_id}/items/{item_id}
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path((usuario_id, item_id)): Path<(String, String)>,
) -> Result<Json<CarritoResponse>, ApiError> {
    auth.require_self_or_admin(&usuario_id)?;
    let cart = cart::remove_item(&state.db, &usuario_id, &item_id).await?;
    Ok(Json(cart))
}

/// DELETE /carrito/usuario/{usuario_id}
pub async fn clear_cart(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(usuario_id): Path<String>,
) -> Result<Json<CarritoResponse>, ApiError> {
    auth.require_self_or_admin(&usuario_id)?;
    let cart = cart::clear_cart(&state.db, &usuario_id).await?;
    Ok(Json(cart))
}

/// GET /carrito/usuario/{usuario_id}/pedido-whatsapp
///
/// Builds the order summary and wa.me link without touching the cart, so the
/// client can show a preview.
pub async fn pedido_whatsapp(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(usuario_id): Path<String>,
) -> Result<Json<PedidoResponse>, ApiError> {
    auth.require_self_or_admin(&usuario_id)?;
    let pedido = checkout::generate_order(&state.db, &state.config.checkout, &usuario_id).await?;
    Ok(Json(pedido))
}

/// POST /carrito/usuario/{usuario_id}/finalizar-compra
pub async fn finalizar_compra(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(usuario_id): Path<String>,
) -> Result<Json<PedidoResponse>, ApiError> {
    auth.require_self_or_admin(&usuario_id)?;
    let pedido = checkout::finalize(&state.db, &state.config.checkout, &usuario_id).await?;
    Ok(Json(pedido))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db;
    use crate::token::Claims;

    async fn test_state() -> Arc<AppState> {
        let mut config = Config::default();
        config.auth.jwt_secret = "test-secret".to_string();
        let pool = db::init_test().await;
        Arc::new(AppState::new(config, pool))
    }

    fn auth_as(state: &Arc<AppState>, user_id: &str, roles: &[&str]) -> AuthUser {
        let roles: Vec<String> = roles.iter().map(|r| r.to_string()).collect();
        let token = state.tokens.issue_access_token(user_id, &roles).unwrap();
        let claims: Claims = state.tokens.verify_access(&token).unwrap();
        AuthUser {
            id: claims.sub.clone(),
            claims,
        }
    }

    fn laptop() -> AddItemRequest {
        AddItemRequest {
            producto_id: "prod-1".to_string(),
            nombre_producto: "Laptop".to_string(),
            precio_unitario: 599990.0,
            cantidad: 1,
        }
    }

    #[tokio::test]
    async fn test_owner_can_read_own_cart() {
        let state = test_state().await;
        let auth = auth_as(&state, "user-1", &["CLIENTE"]);

        let Json(cart) = get_cart(
            State(state.clone()),
            auth,
            Path("user-1".to_string()),
        )
        .await
        .unwrap();
        assert_eq!(cart.usuario_id, "user-1");
        assert!(cart.items.is_empty());
    }

    #[tokio::test]
    async fn test_other_user_is_forbidden() {
        let state = test_state().await;
        let auth = auth_as(&state, "user-2", &["CLIENTE"]);

        let result = get_cart(
            State(state.clone()),
            auth,
            Path("user-1".to_string()),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_admin_can_read_any_cart() {
        let state = test_state().await;
        let auth = auth_as(&state, "admin-1", &["ADMIN"]);

        let result = get_cart(
            State(state.clone()),
            auth,
            Path("user-1".to_string()),
        )
        .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_add_item_validates_quantity() {
        let state = test_state().await;
        let auth = auth_as(&state, "user-1", &["CLIENTE"]);

        let mut req = laptop();
        req.cantidad = 0;
        let result = add_item(
            State(state.clone()),
            auth,
            Path("user-1".to_string()),
            Json(req),
        )
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_add_and_update_item() {
        let state = test_state().await;

        let Json(cart) = add_item(
            State(state.clone()),
            auth_as(&state, "user-1", &["CLIENTE"]),
            Path("user-1".to_string()),
            Json(laptop()),
        )
        .await
        .unwrap();
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.total, 599990.0);

        let item_id = cart.items[0].id.clone();
        let Json(cart) = update_quantity(
            State(state.clone()),
            auth_as(&state, "user-1", &["CLIENTE"]),
            Path(("user-1".to_string(), item_id)),
            Query(UpdateQuantityParams { cantidad: 2 }),
        )
        .await
        .unwrap();
        assert_eq!(cart.items[0].cantidad, 2);
        assert_eq!(cart.total, 1199980.0);
    }

    #[tokio::test]
    async fn test_finalize_deactivates_cart() {
        let state = test_state().await;

        add_item(
            State(state.clone()),
            auth_as(&state, "user-1", &["CLIENTE"]),
            Path("user-1".to_string()),
            Json(laptop()),
        )
        .await
        .unwrap();

        let Json(pedido) = finalizar_compra(
            State(state.clone()),
            auth_as(&state, "user-1", &["CLIENTE"]),
            Path("user-1".to_string()),
        )
        .await
        .unwrap();
        assert!(pedido.url.starts_with("https://wa.me/"));
        assert!(pedido.mensaje.contains("Laptop"));

        // The next read starts a fresh, empty cart
        let Json(cart) = get_cart(
            State(state.clone()),
            auth_as(&state, "user-1", &["CLIENTE"]),
            Path("user-1".to_string()),
        )
        .await
        .unwrap();
        assert!(cart.items.is_empty());
        assert_eq!(cart.total, 0.0);
    }

    #[tokio::test]
    async fn test_pedido_on_empty_cart_is_business_error() {
        let state = test_state().await;
        let auth = auth_as(&state, "user-1", &["CLIENTE"]);

        let result = pedido_whatsapp(
            State(state.clone()),
            auth,
            Path("user-1".to_string()),
        )
        .await;
        assert!(result.is_err());
    }
}
