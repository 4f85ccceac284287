//! Cart commands. Mutations are synced when signed in.

use komorebi_core::ProductId;
use serde_json::json;

use super::{CommandResult, Context};

pub fn show(ctx: &Context) -> CommandResult {
    let cart = ctx.state.cart();
    let items = cart.items();
    let totals = cart.totals();

    ctx.emit(&json!({ "items": items, "totals": totals }), || {
        if items.is_empty() {
            println!("Cart is empty");
            return;
        }
        for item in &items {
            println!(
                "{:<32} x{:<4} {:>10}  {}",
                item.product.name,
                item.quantity,
                item.line_total().to_string(),
                item.sync
            );
        }
        println!("{:<38} {:>10}", "Subtotal", totals.subtotal.to_string());
        println!("{:<38} {:>10}", "Shipping", totals.shipping.to_string());
        println!("{:<38} {:>10}", "Tax", totals.tax.to_string());
        println!("{:<38} {:>10}", "Total", totals.total.to_string());
    });
    Ok(())
}

pub async fn add(ctx: &Context, product_id: &str) -> CommandResult {
    let product = ctx
        .state
        .catalog()
        .product(&ProductId::new(product_id))
        .await?;
    ctx.state.cart().add_item_with_sync(product);
    ctx.flush_outbox().await;
    show(ctx)
}

pub async fn remove(ctx: &Context, product_id: &str) -> CommandResult {
    ctx.state
        .cart()
        .remove_item_with_sync(&ProductId::new(product_id));
    ctx.flush_outbox().await;
    show(ctx)
}

pub async fn set(ctx: &Context, product_id: &str, quantity: i64) -> CommandResult {
    ctx.state
        .cart()
        .set_quantity_with_sync(&ProductId::new(product_id), quantity);
    ctx.flush_outbox().await;
    show(ctx)
}

pub async fn clear(ctx: &Context) -> CommandResult {
    ctx.state.cart().clear_with_sync();
    ctx.flush_outbox().await;
    show(ctx)
}

pub async fn pull(ctx: &Context) -> CommandResult {
    let user = ctx.require_user()?;
    ctx.state
        .cart()
        .load_from_remote(ctx.state.gateway(), &user.user_id)
        .await?;
    show(ctx)
}
