//! Cart lifecycle service.
//!
//! Every operation runs in a single transaction against the store; that
//! transaction boundary is the only concurrency guard. Invariants enforced
//! here: at most one active cart per user, `total == Σ item.subtotal` after
//! every mutation, and `subtotal == precio_unitario × cantidad`.

pub mod checkout;

use sqlx::Sqlite;
use thiserror::Error;
use tracing::info;

use crate::db::{AddItemRequest, Carrito, CarritoResponse, DbPool, ItemCarrito};

#[derive(Debug, Error)]
pub enum CartError {
    #[error("no active cart for user")]
    CartNotFound,
    #[error("item not found in the user's active cart")]
    ItemNotFound,
    #[error("cart is empty")]
    EmptyCart,
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Return the user's active cart with items, creating an empty one if none exists
pub async fn get_or_create_active_cart(
    pool: &DbPool,
    usuario_id: &str,
) -> Result<CarritoResponse, CartError> {
    let mut tx = pool.begin().await?;
    let carrito = get_or_create_in_tx(&mut tx, usuario_id).await?;
    let items = items_for_cart(&mut tx, &carrito.id).await?;
    tx.commit().await?;

    Ok(CarritoResponse::new(carrito, items))
}

/// Create a fresh active cart, deactivating any prior active cart(s).
/// Supersedes rather than merges.
pub async fn create_cart(pool: &DbPool, usuario_id: &str) -> Result<CarritoResponse, CartError> {
    let mut tx = pool.begin().await?;

    deactivate_active_carts(&mut tx, usuario_id).await?;
    let carrito = insert_cart(&mut tx, usuario_id).await?;

    tx.commit().await?;

    info!(usuario_id = %usuario_id, carrito_id = %carrito.id, "Created new cart");
    Ok(CarritoResponse::new(carrito, Vec::new()))
}

/// Add an item to the user's active cart. If the product is already in the
/// cart, its quantity is incremented instead of inserting a second row.
pub async fn add_item(
    pool: &DbPool,
    usuario_id: &str,
    req: &AddItemRequest,
) -> Result<CarritoResponse, CartError> {
    let mut tx = pool.begin().await?;
    let carrito = get_or_create_in_tx(&mut tx, usuario_id).await?;

    let existing: Option<ItemCarrito> = sqlx::query_as(
        "SELECT * FROM items_carrito WHERE carrito_id = ? AND producto_id = ?",
    )
    .bind(&carrito.id)
    .bind(&req.producto_id)
    .fetch_optional(&mut *tx)
    .await?;

    match existing {
        Some(item) => {
            let cantidad = item.cantidad + req.cantidad;
            let subtotal = item.precio_unitario * cantidad as f64;
            sqlx::query("UPDATE items_carrito SET cantidad = ?, subtotal = ? WHERE id = ?")
                .bind(cantidad)
                .bind(subtotal)
                .bind(&item.id)
                .execute(&mut *tx)
                .await?;
        }
        None => {
            let subtotal = req.precio_unitario * req.cantidad as f64;
            sqlx::query(
                "INSERT INTO items_carrito \
                 (id, carrito_id, producto_id, nombre_producto, precio_unitario, cantidad, subtotal) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(&carrito.id)
            .bind(&req.producto_id)
            .bind(&req.nombre_producto)
            .bind(req.precio_unitario)
            .bind(req.cantidad)
            .bind(subtotal)
            .execute(&mut *tx)
            .await?;
        }
    }

    let carrito = recompute_total(&mut tx, &carrito.id).await?;
    let items = items_for_cart(&mut tx, &carrito.id).await?;
    tx.commit().await?;

    Ok(CarritoResponse::new(carrito, items))
}

/// Set an item's quantity. The item must belong to the caller's active cart;
/// an item id from any other cart is rejected as not found.
pub async fn update_quantity(
    pool: &DbPool,
    usuario_id: &str,
    item_id: &str,
    cantidad: i64,
) -> Result<CarritoResponse, CartError> {
    let mut tx = pool.begin().await?;
    let carrito = active_cart(&mut tx, usuario_id)
        .await?
        .ok_or(CartError::CartNotFound)?;

    let item = owned_item(&mut tx, &carrito.id, item_id).await?;

    let subtotal = item.precio_unitario * cantidad as f64;
    sqlx::query("UPDATE items_carrito SET cantidad = ?, subtotal = ? WHERE id = ?")
        .bind(cantidad)
        .bind(subtotal)
        .bind(&item.id)
        .execute(&mut *tx)
        .await?;

    let carrito = recompute_total(&mut tx, &carrito.id).await?;
    let items = items_for_cart(&mut tx, &carrito.id).await?;
    tx.commit().await?;

    Ok(CarritoResponse::new(carrito, items))
}

/// Remove an item from the caller's active cart, same ownership rule as
/// `update_quantity`
pub async fn remove_item(
    pool: &DbPool,
    usuario_id: &str,
    item_id: &str,
) -> Result<CarritoResponse, CartError> {
    let mut tx = pool.begin().await?;
    let carrito = active_cart(&mut tx, usuario_id)
        .await?
        .ok_or(CartError::CartNotFound)?;

    let item = owned_item(&mut tx, &carrito.id, item_id).await?;

    sqlx::query("DELETE FROM items_carrito WHERE id = ?")
        .bind(&item.id)
        .execute(&mut *tx)
        .await?;

    let carrito = recompute_total(&mut tx, &carrito.id).await?;
    let items = items_for_cart(&mut tx, &carrito.id).await?;
    tx.commit().await?;

    Ok(CarritoResponse::new(carrito, items))
}

/// Empty the active cart and reset its total to zero
pub async fn clear_cart(pool: &DbPool, usuario_id: &str) -> Result<CarritoResponse, CartError> {
    let mut tx = pool.begin().await?;
    let carrito = get_or_create_in_tx(&mut tx, usuario_id).await?;

    sqlx::query("DELETE FROM items_carrito WHERE carrito_id = ?")
        .bind(&carrito.id)
        .execute(&mut *tx)
        .await?;

    let carrito = recompute_total(&mut tx, &carrito.id).await?;
    tx.commit().await?;

    Ok(CarritoResponse::new(carrito, Vec::new()))
}

/// Mark the user's active cart inactive. Terminal for that cart instance;
/// the next get-or-create starts a new one.
pub async fn deactivate_cart(pool: &DbPool, usuario_id: &str) -> Result<(), CartError> {
    let mut tx = pool.begin().await?;
    deactivate_active_carts(&mut tx, usuario_id).await?;
    tx.commit().await?;

    info!(usuario_id = %usuario_id, "Cart deactivated");
    Ok(())
}

/// The user's active cart with items, without creating one
pub async fn active_cart_with_items(
    pool: &DbPool,
    usuario_id: &str,
) -> Result<Option<CarritoResponse>, CartError> {
    let mut tx = pool.begin().await?;
    let carrito = active_cart(&mut tx, usuario_id).await?;
    let response = match carrito {
        Some(carrito) => {
            let items = items_for_cart(&mut tx, &carrito.id).await?;
            Some(CarritoResponse::new(carrito, items))
        }
        None => None,
    };
    tx.commit().await?;
    Ok(response)
}

// -------------------------------------------------------------------------
// Store helpers, all scoped to one transaction
// -------------------------------------------------------------------------

type Tx<'a> = sqlx::Transaction<'a, Sqlite>;

async fn active_cart(tx: &mut Tx<'_>, usuario_id: &str) -> Result<Option<Carrito>, CartError> {
    let carrito = sqlx::query_as::<_, Carrito>(
        "SELECT * FROM carritos WHERE usuario_id = ? AND activo = 1",
    )
    .bind(usuario_id)
    .fetch_optional(&mut **tx)
    .await?;
    Ok(carrito)
}

async fn get_or_create_in_tx(tx: &mut Tx<'_>, usuario_id: &str) -> Result<Carrito, CartError> {
    if let Some(carrito) = active_cart(tx, usuario_id).await? {
        return Ok(carrito);
    }
    insert_cart(tx, usuario_id).await
}

async fn insert_cart(tx: &mut Tx<'_>, usuario_id: &str) -> Result<Carrito, CartError> {
    let id = uuid::Uuid::new_v4().to_string();
    let ts = now();
    sqlx::query(
        "INSERT INTO carritos (id, usuario_id, total, activo, created_at, updated_at) \
         VALUES (?, ?, 0, 1, ?, ?)",
    )
    .bind(&id)
    .bind(usuario_id)
    .bind(&ts)
    .bind(&ts)
    .execute(&mut **tx)
    .await?;

    let carrito = sqlx::query_as::<_, Carrito>("SELECT * FROM carritos WHERE id = ?")
        .bind(&id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(carrito)
}

async fn deactivate_active_carts(tx: &mut Tx<'_>, usuario_id: &str) -> Result<(), CartError> {
    sqlx::query("UPDATE carritos SET activo = 0, updated_at = ? WHERE usuario_id = ? AND activo = 1")
        .bind(now())
        .bind(usuario_id)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

async fn owned_item(
    tx: &mut Tx<'_>,
    carrito_id: &str,
    item_id: &str,
) -> Result<ItemCarrito, CartError> {
    let item = sqlx::query_as::<_, ItemCarrito>(
        "SELECT * FROM items_carrito WHERE id = ? AND carrito_id = ?",
    )
    .bind(item_id)
    .bind(carrito_id)
    .fetch_optional(&mut **tx)
    .await?;
    item.ok_or(CartError::ItemNotFound)
}

async fn items_for_cart(tx: &mut Tx<'_>, carrito_id: &str) -> Result<Vec<ItemCarrito>, CartError> {
    let items = sqlx::query_as::<_, ItemCarrito>(
        "SELECT * FROM items_carrito WHERE carrito_id = ? ORDER BY created_at, id",
    )
    .bind(carrito_id)
    .fetch_all(&mut **tx)
    .await?;
    Ok(items)
}

async fn recompute_total(tx: &mut Tx<'_>, carrito_id: &str) -> Result<Carrito, CartError> {
    sqlx::query(
        "UPDATE carritos SET \
         total = (SELECT COALESCE(SUM(subtotal), 0) FROM items_carrito WHERE carrito_id = ?), \
         updated_at = ? \
         WHERE id = ?",
    )
    .bind(carrito_id)
    .bind(now())
    .bind(carrito_id)
    .execute(&mut **tx)
    .await?;

    let carrito = sqlx::query_as::<_, Carrito>("SELECT * FROM carritos WHERE id = ?")
        .bind(carrito_id)
        .fetch_one(&mut **tx)
        .await?;
    Ok(carrito)
}
