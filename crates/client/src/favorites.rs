//! Favorites store: remote-confirmed favorite products.
//!
//! Unlike the cart, nothing changes locally until the remote store confirms
//! the write. A rejected add or remove leaves state untouched and returns the
//! error to the caller.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use komorebi_core::{Product, ProductId, UserId};
use tracing::instrument;

use crate::error::{Result, add_breadcrumb};
use crate::gateway::{GatewayError, RemoteGateway};
use crate::persistence::{LocalStore, keys, load_snapshot, save_snapshot};

/// The signed-in user's favorite products, cheaply cloneable.
#[derive(Clone)]
pub struct FavoritesStore {
    inner: Arc<FavoritesInner>,
}

struct FavoritesInner {
    products: Mutex<Vec<Product>>,
    store: Arc<dyn LocalStore>,
}

impl FavoritesStore {
    /// Create the store, restoring the last persisted snapshot if any.
    #[must_use]
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        let mut products: Vec<Product> =
            load_snapshot(store.as_ref(), keys::FAVORITES).unwrap_or_default();
        dedup(&mut products);
        Self {
            inner: Arc::new(FavoritesInner {
                products: Mutex::new(products),
                store,
            }),
        }
    }

    fn products(&self) -> MutexGuard<'_, Vec<Product>> {
        self.inner
            .products
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, products: &[Product]) {
        save_snapshot(self.inner.store.as_ref(), keys::FAVORITES, products);
    }

    /// Replace local state with the user's remote favorites.
    ///
    /// Ids whose product no longer exists are skipped.
    ///
    /// # Errors
    ///
    /// Returns the gateway error if either fetch fails.
    #[instrument(skip(self, gateway))]
    pub async fn load<G: RemoteGateway>(&self, gateway: &G, user: &UserId) -> Result<()> {
        let ids = gateway.fetch_favorite_ids(user).await?;
        let mut products = if ids.is_empty() {
            Vec::new()
        } else {
            gateway.products_by_ids(&ids).await?
        };
        dedup(&mut products);

        tracing::info!(count = products.len(), "Loaded favorites");
        let mut state = self.products();
        *state = products;
        self.persist(&state);
        Ok(())
    }

    /// Favorite a product once the remote store confirms.
    ///
    /// A remote conflict means the row already exists, which counts as
    /// success.
    ///
    /// # Errors
    ///
    /// Returns the gateway error; local state is then unchanged.
    #[instrument(skip(self, gateway, product), fields(product_id = %product.id))]
    pub async fn add<G: RemoteGateway>(
        &self,
        gateway: &G,
        user: &UserId,
        product: Product,
    ) -> Result<()> {
        match gateway.insert_favorite(user, &product.id).await {
            Ok(()) | Err(GatewayError::Conflict(_)) => {}
            Err(e) => {
                tracing::warn!(error = %e, "Failed to add favorite");
                return Err(e.into());
            }
        }

        let mut state = self.products();
        if !state.iter().any(|p| p.id == product.id) {
            add_breadcrumb(
                "favorites",
                "Added favorite",
                Some(&[("product_id", product.id.as_str())]),
            );
            state.push(product);
            self.persist(&state);
        }
        Ok(())
    }

    /// Unfavorite a product once the remote store confirms.
    ///
    /// # Errors
    ///
    /// Returns the gateway error; local state is then unchanged.
    #[instrument(skip(self, gateway))]
    pub async fn remove<G: RemoteGateway>(
        &self,
        gateway: &G,
        user: &UserId,
        product_id: &ProductId,
    ) -> Result<()> {
        if let Err(e) = gateway.delete_favorite(user, product_id).await {
            tracing::warn!(error = %e, "Failed to remove favorite");
            return Err(e.into());
        }

        let mut state = self.products();
        let before = state.len();
        state.retain(|p| p.id != *product_id);
        if state.len() != before {
            self.persist(&state);
        }
        Ok(())
    }

    /// Add if absent, remove if present. Returns whether the product is a
    /// favorite afterwards.
    ///
    /// # Errors
    ///
    /// Returns the gateway error; local state is then unchanged.
    pub async fn toggle<G: RemoteGateway>(
        &self,
        gateway: &G,
        user: &UserId,
        product: Product,
    ) -> Result<bool> {
        if self.is_favorite(&product.id) {
            self.remove(gateway, user, &product.id).await?;
            Ok(false)
        } else {
            self.add(gateway, user, product).await?;
            Ok(true)
        }
    }

    #[must_use]
    pub fn is_favorite(&self, product_id: &ProductId) -> bool {
        self.products().iter().any(|p| p.id == *product_id)
    }

    /// Favorite products in the order they were added.
    #[must_use]
    pub fn list(&self) -> Vec<Product> {
        self.products().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.products().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.products().is_empty()
    }

    /// Drop local state, e.g. on sign-out.
    pub fn reset(&self) {
        let mut state = self.products();
        state.clear();
        self.persist(&state);
    }
}

impl std::fmt::Debug for FavoritesStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FavoritesStore")
            .field("count", &self.len())
            .finish_non_exhaustive()
    }
}

fn dedup(products: &mut Vec<Product>) {
    let mut seen = std::collections::HashSet::new();
    products.retain(|p| seen.insert(p.id.clone()));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use komorebi_core::{CurrencyCode, Price};

    use super::*;
    use crate::error::ClientError;
    use crate::gateway::InMemoryGateway;
    use crate::persistence::MemoryStore;

    fn product(id: &str) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Snack {id}"),
            vendor: "Komorebi".to_string(),
            seller_id: None,
            price: Price::new(400, CurrencyCode::JPY),
            image_url: None,
            category: "savory".to_string(),
            description: None,
            created_at: None,
        }
    }

    #[tokio::test]
    async fn test_add_then_remove() {
        let gateway = InMemoryGateway::new();
        let favorites = FavoritesStore::new(Arc::new(MemoryStore::new()));
        let user = UserId::new("u1");
        let p1 = ProductId::new("p1");

        favorites.add(&gateway, &user, product("p1")).await.unwrap();
        assert!(favorites.is_favorite(&p1));
        assert_eq!(gateway.favorite_rows(&user), vec![p1.clone()]);

        favorites.remove(&gateway, &user, &p1).await.unwrap();
        assert!(!favorites.is_favorite(&p1));
        assert!(gateway.favorite_rows(&user).is_empty());
    }

    #[tokio::test]
    async fn test_rejected_add_leaves_state() {
        let gateway = InMemoryGateway::new();
        gateway.set_offline(true);
        let favorites = FavoritesStore::new(Arc::new(MemoryStore::new()));

        let result = favorites
            .add(&gateway, &UserId::new("u1"), product("p1"))
            .await;
        assert!(matches!(result, Err(ClientError::Gateway(_))));
        assert!(!favorites.is_favorite(&ProductId::new("p1")));
    }

    #[tokio::test]
    async fn test_rejected_remove_leaves_state() {
        let gateway = InMemoryGateway::new();
        let favorites = FavoritesStore::new(Arc::new(MemoryStore::new()));
        let user = UserId::new("u1");
        favorites.add(&gateway, &user, product("p1")).await.unwrap();

        gateway.set_offline(true);
        let p1 = ProductId::new("p1");
        assert!(favorites.remove(&gateway, &user, &p1).await.is_err());
        assert!(favorites.is_favorite(&p1));
    }

    #[tokio::test]
    async fn test_duplicate_add_is_single_entry() {
        let gateway = InMemoryGateway::new();
        let favorites = FavoritesStore::new(Arc::new(MemoryStore::new()));
        let user = UserId::new("u1");

        favorites.add(&gateway, &user, product("p1")).await.unwrap();
        favorites.add(&gateway, &user, product("p1")).await.unwrap();
        assert_eq!(favorites.len(), 1);
        assert_eq!(gateway.favorite_rows(&user).len(), 1);
    }

    #[tokio::test]
    async fn test_load_resolves_products() {
        let gateway = InMemoryGateway::new();
        let user = UserId::new("u1");
        gateway.seed_product(product("p1"));
        gateway.seed_favorite(&user, &ProductId::new("p1"));
        gateway.seed_favorite(&user, &ProductId::new("gone"));

        let favorites = FavoritesStore::new(Arc::new(MemoryStore::new()));
        favorites.load(&gateway, &user).await.unwrap();
        assert_eq!(favorites.list(), vec![product("p1")]);
    }

    #[tokio::test]
    async fn test_toggle_and_snapshot() {
        let gateway = InMemoryGateway::new();
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        let favorites = FavoritesStore::new(Arc::clone(&store));
        let user = UserId::new("u1");

        assert!(favorites.toggle(&gateway, &user, product("p1")).await.unwrap());
        let restored = FavoritesStore::new(Arc::clone(&store));
        assert!(restored.is_favorite(&ProductId::new("p1")));

        assert!(!favorites.toggle(&gateway, &user, product("p1")).await.unwrap());
        let restored = FavoritesStore::new(store);
        assert!(restored.is_empty());
    }
}
