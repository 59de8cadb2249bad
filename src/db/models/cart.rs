//! Cart models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Carrito {
    pub id: String,
    pub usuario_id: String,
    pub total: f64,
    pub activo: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Carrito {
    pub fn is_active(&self) -> bool {
        self.activo != 0
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ItemCarrito {
    pub id: String,
    pub carrito_id: String,
    pub producto_id: String,
    pub nombre_producto: String,
    pub precio_unitario: f64,
    pub cantidad: i64,
    pub subtotal: f64,
    pub created_at: String,
}

/// Cart plus its items, the shape every cart endpoint returns
#[derive(Debug, Clone, Serialize)]
pub struct CarritoResponse {
    pub id: String,
    pub usuario_id: String,
    pub total: f64,
    pub activo: bool,
    pub items: Vec<ItemCarrito>,
    pub created_at: String,
    pub updated_at: String,
}

impl CarritoResponse {
    pub fn new(carrito: Carrito, items: Vec<ItemCarrito>) -> Self {
        Self {
            activo: carrito.is_active(),
            id: carrito.id,
            usuario_id: carrito.usuario_id,
            total: carrito.total,
            items,
            created_at: carrito.created_at,
            updated_at: carrito.updated_at,
        }
    }
}

// DTOs for API

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub producto_id: String,
    pub nombre_producto: String,
    pub precio_unitario: f64,
    pub cantidad: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityParams {
    pub cantidad: i64,
}

#[derive(Debug, Serialize)]
pub struct PedidoResponse {
    pub mensaje: String,
    pub url: String,
}
