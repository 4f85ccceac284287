//! Sell flow.

use std::path::PathBuf;

use komorebi_client::services::ListingImage;
use komorebi_core::{ListingDraft, Price};

use super::{CommandResult, Context};

/// Arguments of `komorebi sell`.
pub struct SellArgs {
    pub name: String,
    pub price: i64,
    pub category: String,
    pub description: Option<String>,
    pub image: Option<PathBuf>,
}

pub async fn create(ctx: &Context, args: SellArgs) -> CommandResult {
    ctx.require_user()?;
    let currency = ctx.state.policies().pricing.currency;
    let draft = ListingDraft::new(
        &args.name,
        Price::new(args.price, currency),
        &args.category,
        args.description,
    )?;

    let image = match &args.image {
        Some(path) => Some(ListingImage::from_path_bytes(
            path,
            tokio::fs::read(path).await?,
        )),
        None => None,
    };

    let product = ctx.state.create_listing(&draft, image).await?;
    ctx.emit(&product, || {
        println!("Listed {} ({}) at {}", product.name, product.id, product.price);
    });
    Ok(())
}
