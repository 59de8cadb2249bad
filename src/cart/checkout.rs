//! Checkout formatting and WhatsApp order handoff.
//!
//! Turns a non-empty cart into a human-readable order summary and a wa.me
//! deep link the frontend can open directly.

use tracing::info;

use super::CartError;
use crate::config::CheckoutConfig;
use crate::db::{CarritoResponse, DbPool, ItemCarrito, PedidoResponse};

/// Format an amount with no decimal places, per local currency convention
fn format_money(amount: f64) -> String {
    format!("{:.0}", amount)
}

/// One line per item: "• {nombre} x{cantidad} - ${subtotal}"
fn format_items(items: &[ItemCarrito]) -> String {
    items
        .iter()
        .map(|item| {
            format!(
                "• {} x{} - ${}",
                item.nombre_producto,
                item.cantidad,
                format_money(item.subtotal)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render the order message from the configured template. "{items}" and
/// "{total}" are the supported placeholders.
pub fn build_order_message(config: &CheckoutConfig, cart: &CarritoResponse) -> String {
    config
        .message_template
        .replace("{items}", &format_items(&cart.items))
        .replace("{total}", &format_money(cart.total))
}

/// Build the wa.me deep link: percent-encoded message, phone with the
/// leading '+' stripped
pub fn build_whatsapp_link(config: &CheckoutConfig, message: &str) -> String {
    let phone = config.whatsapp_phone.trim_start_matches('+');
    format!("https://wa.me/{}?text={}", phone, urlencoding::encode(message))
}

/// Generate the order summary and deep link for the user's active cart.
/// Fails with a business error when the cart is missing or empty; the cart
/// is left untouched.
pub async fn generate_order(
    pool: &DbPool,
    config: &CheckoutConfig,
    usuario_id: &str,
) -> Result<PedidoResponse, CartError> {
    let cart = super::active_cart_with_items(pool, usuario_id)
        .await?
        .ok_or(CartError::EmptyCart)?;

    if cart.items.is_empty() {
        return Err(CartError::EmptyCart);
    }

    let mensaje = build_order_message(config, &cart);
    let url = build_whatsapp_link(config, &mensaje);
    Ok(PedidoResponse { mensaje, url })
}

/// Finalize checkout: generate the summary, then deactivate the cart so the
/// next cart operation starts fresh
pub async fn finalize(
    pool: &DbPool,
    config: &CheckoutConfig,
    usuario_id: &str,
) -> Result<PedidoResponse, CartError> {
    let pedido = generate_order(pool, config, usuario_id).await?;
    super::deactivate_cart(pool, usuario_id).await?;

    info!(usuario_id = %usuario_id, "Checkout finalized");
    Ok(pedido)
}
