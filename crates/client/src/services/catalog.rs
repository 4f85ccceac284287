//! Product catalog reads.

use komorebi_core::{Category, Product, ProductId};
use tracing::instrument;

use crate::error::{ClientError, Result};
use crate::gateway::RemoteGateway;

/// Catalog queries.
pub struct CatalogService<'a, G> {
    gateway: &'a G,
}

impl<'a, G: RemoteGateway> CatalogService<'a, G> {
    #[must_use]
    pub const fn new(gateway: &'a G) -> Self {
        Self { gateway }
    }

    /// All products, newest first.
    ///
    /// # Errors
    ///
    /// Returns the gateway error.
    pub async fn list_products(&self) -> Result<Vec<Product>> {
        Ok(self.gateway.list_products().await?)
    }

    /// Products whose category slug matches, newest first.
    ///
    /// # Errors
    ///
    /// Returns the gateway error.
    #[instrument(skip(self))]
    pub async fn products_in_category(&self, slug: &str) -> Result<Vec<Product>> {
        let products = self.gateway.list_products().await?;
        Ok(products
            .into_iter()
            .filter(|p| p.category.eq_ignore_ascii_case(slug))
            .collect())
    }

    /// Case-insensitive substring match on name and vendor.
    ///
    /// # Errors
    ///
    /// Returns the gateway error.
    #[instrument(skip(self))]
    pub async fn search(&self, query: &str) -> Result<Vec<Product>> {
        let query = query.trim().to_lowercase();
        let products = self.gateway.list_products().await?;
        if query.is_empty() {
            return Ok(products);
        }
        Ok(products
            .into_iter()
            .filter(|p| {
                p.name.to_lowercase().contains(&query) || p.vendor.to_lowercase().contains(&query)
            })
            .collect())
    }

    /// One product by id.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` if no such product exists.
    #[instrument(skip(self))]
    pub async fn product(&self, id: &ProductId) -> Result<Product> {
        self.gateway
            .products_by_ids(std::slice::from_ref(id))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ClientError::NotFound(format!("product {id}")))
    }

    /// All categories, by name.
    ///
    /// # Errors
    ///
    /// Returns the gateway error.
    pub async fn categories(&self) -> Result<Vec<Category>> {
        Ok(self.gateway.list_categories().await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use komorebi_core::{CurrencyCode, Price};

    use super::*;
    use crate::gateway::InMemoryGateway;

    fn product(id: &str, name: &str, category: &str) -> Product {
        Product {
            id: ProductId::new(id),
            name: name.to_string(),
            vendor: "Kyoto Confections".to_string(),
            seller_id: None,
            price: Price::new(700, CurrencyCode::JPY),
            image_url: None,
            category: category.to_string(),
            description: None,
            created_at: None,
        }
    }

    fn seeded() -> InMemoryGateway {
        let gateway = InMemoryGateway::new();
        gateway.seed_product(product("p1", "Yuzu Mochi", "sweets"));
        gateway.seed_product(product("p2", "Nori Chips", "savory"));
        gateway
    }

    #[tokio::test]
    async fn test_category_filter_and_search() {
        let gateway = seeded();
        let catalog = CatalogService::new(&gateway);

        let sweets = catalog.products_in_category("sweets").await.unwrap();
        assert_eq!(sweets.len(), 1);
        assert_eq!(sweets[0].id, ProductId::new("p1"));

        let found = catalog.search("NORI").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(catalog.search("kyoto").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_missing_product_is_not_found() {
        let gateway = seeded();
        let catalog = CatalogService::new(&gateway);
        assert_eq!(
            catalog.product(&ProductId::new("p2")).await.unwrap().name,
            "Nori Chips"
        );
        assert!(matches!(
            catalog.product(&ProductId::new("nope")).await,
            Err(ClientError::NotFound(_))
        ));
    }
}
