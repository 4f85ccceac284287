//! Catalog browsing.

use komorebi_core::{Product, ProductId};

use super::{CommandResult, Context};

pub async fn list(ctx: &Context, category: Option<&str>, search: Option<&str>) -> CommandResult {
    let catalog = ctx.state.catalog();
    let products = match (category, search) {
        (Some(slug), query) => {
            let query = query.unwrap_or_default().to_lowercase();
            let mut products = catalog.products_in_category(slug).await?;
            products.retain(|p| {
                p.name.to_lowercase().contains(&query) || p.vendor.to_lowercase().contains(&query)
            });
            products
        }
        (None, Some(query)) => catalog.search(query).await?,
        (None, None) => catalog.list_products().await?,
    };

    ctx.emit(&products, || {
        for product in &products {
            print_product_line(product);
        }
        println!("{} product(s)", products.len());
    });
    Ok(())
}

pub async fn categories(ctx: &Context) -> CommandResult {
    let categories = ctx.state.catalog().categories().await?;
    ctx.emit(&categories, || {
        for category in &categories {
            println!("{:<20} {}", category.slug, category.name);
        }
    });
    Ok(())
}

pub async fn show(ctx: &Context, product_id: &str) -> CommandResult {
    let id = ProductId::new(product_id);
    let product = ctx.state.catalog().product(&id).await?;
    let comments = ctx.state.comments(&id).await?;

    ctx.emit(&(&product, &comments), || {
        println!("{} by {}", product.name, product.vendor);
        println!("  price:    {}", product.price);
        println!("  category: {}", product.category);
        if let Some(description) = &product.description {
            println!("  {description}");
        }
        if let Some(url) = &product.image_url {
            println!("  image:    {url}");
        }
        if ctx.state.favorites().is_favorite(&id) {
            println!("  ♥ favorite");
        }
        for comment in &comments {
            println!(
                "  [{}] {}: {}",
                comment.created_at.format("%Y-%m-%d"),
                comment.author_id,
                comment.text
            );
        }
    });
    Ok(())
}

pub async fn comment(ctx: &Context, product_id: &str, text: &str) -> CommandResult {
    ctx.require_user()?;
    let record = ctx
        .state
        .post_comment(&ProductId::new(product_id), text)
        .await?;
    ctx.emit(&record, || println!("Posted comment {}", record.id));
    Ok(())
}

pub fn print_product_line(product: &Product) {
    println!(
        "{:<38} {:<32} {:>10}  {}",
        product.id, product.name, product.price.to_string(), product.vendor
    );
}
