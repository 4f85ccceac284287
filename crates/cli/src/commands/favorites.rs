//! Favorites commands.

use komorebi_core::ProductId;

use super::catalog::print_product_line;
use super::{CommandResult, Context};

pub fn list(ctx: &Context) -> CommandResult {
    ctx.require_user()?;
    let favorites = ctx.state.favorites().list();
    ctx.emit(&favorites, || {
        for product in &favorites {
            print_product_line(product);
        }
        println!("{} favorite(s)", favorites.len());
    });
    Ok(())
}

pub async fn toggle(ctx: &Context, product_id: &str) -> CommandResult {
    ctx.require_user()?;
    let product = ctx
        .state
        .catalog()
        .product(&ProductId::new(product_id))
        .await?;
    let name = product.name.clone();
    let now_favorite = ctx.state.toggle_favorite(product).await?;
    ctx.emit(&now_favorite, || {
        if now_favorite {
            println!("Added {name} to favorites");
        } else {
            println!("Removed {name} from favorites");
        }
    });
    Ok(())
}
