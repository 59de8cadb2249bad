pub mod auth;
mod cart;
pub mod error;
mod roles;
mod users;
pub mod validation;

use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    // Auth routes (public)
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh-token", post(auth::refresh_token))
        .route("/forgot-password", post(auth::forgot_password))
        .route("/reset-password", post(auth::reset_password))
        .route("/verify-email", post(auth::verify_email))
        .route("/check-email", get(auth::check_email));

    // Cart routes (auth enforced per-handler, owner or admin)
    let cart_routes = Router::new()
        .route("/usuario/:usuario_id", get(cart::get_cart))
        .route("/usuario/:usuario_id", post(cart::create_cart))
        .route("/usuario/:usuario_id", delete(cart::clear_cart))
        .route("/usuario/:usuario_id/items", post(cart::add_item))
        .route("/usuario/:usuario_id/items/:item_id", put(cart::update_quantity))
        .route("/usuario/:usuario_id/items/:item_id", delete(cart::remove_item))
        .route("/usuario/:usuario_id/pedido-whatsapp", get(cart::pedido_whatsapp))
        .route("/usuario/:usuario_id/finalizar-compra", post(cart::finalizar_compra));

    let user_routes = Router::new()
        .route("/", get(users::list_users))
        .route("/profile", get(users::get_profile))
        .route("/profile", put(users::update_profile))
        .route("/statistics", get(users::statistics))
        .route("/:id", get(users::get_user))
        .route("/:id", put(users::update_user))
        .route("/:id", delete(users::delete_user));

    let role_routes = Router::new()
        .route("/", get(roles::list_roles))
        .route("/", post(roles::create_role))
        .route("/:id", get(roles::get_role))
        .route("/:id", put(roles::update_role))
        .route("/:id", delete(roles::delete_role));

    Router::new()
        .route("/health", get(health_check))
        .nest("/auth", auth_routes)
        .nest("/carrito", cart_routes)
        .nest("/usuarios", user_routes)
        .nest("/roles", role_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
