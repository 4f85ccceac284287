//! Cart store: local-first cart state with outbox-backed remote sync.
//!
//! Every mutation applies to local state synchronously and persists a
//! snapshot. The `*_with_sync` variants additionally queue the resulting
//! remote write in the [`Outbox`] and mark the touched item
//! [`SyncStatus::Pending`]. Remote failures never roll local state back; an
//! item whose write is abandoned is marked [`SyncStatus::Failed`] until a later
//! mutation or [`CartStore::load_from_remote`] replaces it.
//!
//! Without a session owner the `*_with_sync` variants behave like their local
//! counterparts.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use komorebi_core::{Price, Product, ProductId, SyncStatus, UserId};
use serde::{Deserialize, Serialize};
use tracing::instrument;
use uuid::Uuid;

use crate::config::PricingPolicy;
use crate::error::add_breadcrumb;
use crate::gateway::{GatewayError, RemoteGateway};
use crate::outbox::{CartMutation, Outbox};
use crate::persistence::{LocalStore, keys, load_snapshot, save_snapshot};
use crate::pricing::{self, CartTotals};

/// A product in the cart with its quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product: Product,
    /// Always at least 1.
    pub quantity: u32,
    #[serde(default)]
    pub sync: SyncStatus,
}

impl CartItem {
    /// Unit price times quantity.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.product.price.times(self.quantity)
    }
}

/// Persisted cart state.
///
/// The owner is never written: it comes from the live session, so a restarted
/// process cannot queue writes for a user who has not signed in again.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct CartSnapshot {
    #[serde(skip)]
    owner: Option<UserId>,
    items: Vec<CartItem>,
}

impl CartSnapshot {
    fn item_mut(&mut self, product_id: &ProductId) -> Option<&mut CartItem> {
        self.items
            .iter_mut()
            .find(|item| item.product.id == *product_id)
    }

    fn quantity_of(&self, product_id: &ProductId) -> Option<u32> {
        self.items
            .iter()
            .find(|item| item.product.id == *product_id)
            .map(|item| item.quantity)
    }

    /// Returns the new quantity.
    fn add(&mut self, product: Product) -> u32 {
        if let Some(item) = self.item_mut(&product.id) {
            item.quantity = item.quantity.saturating_add(1);
            return item.quantity;
        }
        self.items.push(CartItem {
            product,
            quantity: 1,
            sync: SyncStatus::Synced,
        });
        1
    }

    /// Returns `true` if an item was removed.
    fn remove(&mut self, product_id: &ProductId) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.product.id != *product_id);
        self.items.len() != before
    }

    /// Returns the resulting quantity, `None` if the item is absent afterwards.
    fn set_quantity(&mut self, product_id: &ProductId, quantity: i64) -> Option<u32> {
        if quantity <= 0 {
            self.remove(product_id);
            return None;
        }
        let item = self.item_mut(product_id)?;
        item.quantity = u32::try_from(quantity).unwrap_or(u32::MAX);
        Some(item.quantity)
    }

    fn mark(&mut self, product_id: &ProductId, op: Uuid) {
        if let Some(item) = self.item_mut(product_id) {
            item.sync = SyncStatus::Pending { op };
        }
    }
}

/// Remote write implied by a local change, not yet bound to a user.
enum RemoteWrite {
    /// New quantity of a product, `None` once the item is gone.
    Quantity {
        product: ProductId,
        quantity: Option<u32>,
    },
    Clear,
}

impl RemoteWrite {
    /// The outbox mutation for `user` and the product whose item waits on it.
    fn bind(self, user: &UserId) -> (CartMutation, Option<ProductId>) {
        let user = user.clone();
        match self {
            Self::Quantity {
                product,
                quantity: Some(quantity),
            } => (
                CartMutation::Upsert {
                    user,
                    product: product.clone(),
                    quantity,
                },
                Some(product),
            ),
            Self::Quantity {
                product,
                quantity: None,
            } => (CartMutation::Remove { user, product }, None),
            Self::Clear => (CartMutation::Clear { user }, None),
        }
    }
}

/// The session cart, cheaply cloneable.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<CartInner>,
}

struct CartInner {
    state: Mutex<CartSnapshot>,
    store: Arc<dyn LocalStore>,
    outbox: Outbox,
    pricing: PricingPolicy,
}

impl CartStore {
    /// Create the store, restoring the last persisted snapshot if any.
    #[must_use]
    pub fn new(store: Arc<dyn LocalStore>, outbox: Outbox, pricing: PricingPolicy) -> Self {
        let snapshot: CartSnapshot = load_snapshot(store.as_ref(), keys::CART).unwrap_or_default();
        Self {
            inner: Arc::new(CartInner {
                state: Mutex::new(snapshot),
                store,
                outbox,
                pricing,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CartSnapshot> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &CartSnapshot) {
        save_snapshot(self.inner.store.as_ref(), keys::CART, state);
    }

    /// Run a local mutation, then persist.
    fn mutate<R>(&self, f: impl FnOnce(&mut CartSnapshot) -> R) -> R {
        let mut state = self.state();
        let result = f(&mut state);
        self.persist(&state);
        result
    }

    /// Run a mutation, queue the remote write it implies, then persist.
    ///
    /// The local change always applies. The write is queued only when the
    /// cart has a session owner; the cart lock is held while enqueueing so
    /// writes reach the outbox in the order they were applied.
    fn mutate_with_sync(
        &self,
        action: &str,
        f: impl FnOnce(&mut CartSnapshot) -> Option<RemoteWrite>,
    ) {
        let mut state = self.state();
        let write = f(&mut state);

        match (state.owner.clone(), write) {
            (Some(owner), Some(write)) => {
                let (mutation, product) = write.bind(&owner);
                let op = self.inner.outbox.enqueue(mutation);
                if let Some(product) = product {
                    state.mark(&product, op);
                }
            }
            (None, Some(_)) => {
                tracing::debug!(action, "No session owner, cart change stays local");
            }
            (_, None) => {}
        }
        self.persist(&state);
        drop(state);

        add_breadcrumb("cart", action, None);
    }

    // -------------------------------------------------------------------------
    // Local mutations
    // -------------------------------------------------------------------------

    /// Add one unit of a product, inserting it if absent.
    pub fn add_item(&self, product: Product) {
        self.mutate(|state| state.add(product));
    }

    /// Remove a product entirely.
    pub fn remove_item(&self, product_id: &ProductId) {
        self.mutate(|state| state.remove(product_id));
    }

    /// Set a quantity directly. Zero or negative removes the item.
    pub fn set_quantity(&self, product_id: &ProductId, quantity: i64) {
        self.mutate(|state| state.set_quantity(product_id, quantity));
    }

    pub fn increment(&self, product_id: &ProductId) {
        self.mutate(|state| {
            let current = state.quantity_of(product_id)?;
            state.set_quantity(product_id, i64::from(current) + 1)
        });
    }

    /// Decrementing a quantity of 1 removes the item.
    pub fn decrement(&self, product_id: &ProductId) {
        self.mutate(|state| {
            let current = state.quantity_of(product_id)?;
            state.set_quantity(product_id, i64::from(current) - 1)
        });
    }

    pub fn clear(&self) {
        self.mutate(|state| state.items.clear());
    }

    // -------------------------------------------------------------------------
    // Synced mutations
    // -------------------------------------------------------------------------

    /// [`add_item`](Self::add_item), then queue an upsert of the new quantity.
    #[instrument(skip(self, product), fields(product_id = %product.id))]
    pub fn add_item_with_sync(&self, product: Product) {
        self.mutate_with_sync("Added item", |state| {
            let product_id = product.id.clone();
            let quantity = state.add(product);
            Some(RemoteWrite::Quantity {
                product: product_id,
                quantity: Some(quantity),
            })
        });
    }

    /// [`remove_item`](Self::remove_item), then queue a remote delete.
    #[instrument(skip(self))]
    pub fn remove_item_with_sync(&self, product_id: &ProductId) {
        self.mutate_with_sync("Removed item", |state| {
            state.remove(product_id);
            Some(RemoteWrite::Quantity {
                product: product_id.clone(),
                quantity: None,
            })
        });
    }

    /// [`set_quantity`](Self::set_quantity), then queue the matching write.
    #[instrument(skip(self))]
    pub fn set_quantity_with_sync(&self, product_id: &ProductId, quantity: i64) {
        self.mutate_with_sync("Set quantity", |state| {
            state.quantity_of(product_id)?;
            Some(RemoteWrite::Quantity {
                product: product_id.clone(),
                quantity: state.set_quantity(product_id, quantity),
            })
        });
    }

    #[instrument(skip(self))]
    pub fn increment_with_sync(&self, product_id: &ProductId) {
        self.mutate_with_sync("Incremented item", |state| {
            let current = state.quantity_of(product_id)?;
            Some(RemoteWrite::Quantity {
                product: product_id.clone(),
                quantity: state.set_quantity(product_id, i64::from(current) + 1),
            })
        });
    }

    #[instrument(skip(self))]
    pub fn decrement_with_sync(&self, product_id: &ProductId) {
        self.mutate_with_sync("Decremented item", |state| {
            let current = state.quantity_of(product_id)?;
            Some(RemoteWrite::Quantity {
                product: product_id.clone(),
                quantity: state.set_quantity(product_id, i64::from(current) - 1),
            })
        });
    }

    /// [`clear`](Self::clear), then queue a remote delete of every row.
    #[instrument(skip(self))]
    pub fn clear_with_sync(&self) {
        self.mutate_with_sync("Cleared cart", |state| {
            state.items.clear();
            Some(RemoteWrite::Clear)
        });
    }

    // -------------------------------------------------------------------------
    // Remote reconciliation
    // -------------------------------------------------------------------------

    /// Replace local state with the user's remote cart.
    ///
    /// Items are marked synced and the user becomes the cart owner. A local
    /// mutation racing with the fetch is overwritten.
    ///
    /// # Errors
    ///
    /// Returns the gateway error if the fetch fails; local state is then
    /// untouched.
    #[instrument(skip(self, gateway))]
    pub async fn load_from_remote<G: RemoteGateway>(
        &self,
        gateway: &G,
        user: &UserId,
    ) -> Result<(), GatewayError> {
        let lines = gateway.fetch_cart(user).await?;
        let count = lines.len();

        self.mutate(|state| {
            state.owner = Some(user.clone());
            state.items = lines
                .into_iter()
                .filter(|line| line.quantity > 0)
                .map(|line| CartItem {
                    product: line.product,
                    quantity: line.quantity,
                    sync: SyncStatus::Synced,
                })
                .collect();
        });

        tracing::info!(items = count, "Loaded cart from remote");
        Ok(())
    }

    /// Set or clear the session owner without touching items.
    pub fn set_owner(&self, owner: Option<UserId>) {
        self.mutate(|state| state.owner = owner);
    }

    #[must_use]
    pub fn owner(&self) -> Option<UserId> {
        self.state().owner.clone()
    }

    /// Mark items waiting on `op` as synced.
    pub fn mark_delivered(&self, op: Uuid) {
        self.resolve(op, SyncStatus::Synced);
    }

    /// Mark items waiting on `op` as failed.
    pub fn mark_abandoned(&self, op: Uuid, reason: &str) {
        self.resolve(
            op,
            SyncStatus::Failed {
                reason: reason.to_owned(),
            },
        );
    }

    fn resolve(&self, op: Uuid, status: SyncStatus) {
        let mut state = self.state();
        let mut changed = false;
        for item in state.items.iter_mut().filter(|i| i.sync.is_waiting_on(op)) {
            item.sync = status.clone();
            changed = true;
        }
        if changed {
            self.persist(&state);
        }
    }

    // -------------------------------------------------------------------------
    // Selectors
    // -------------------------------------------------------------------------

    /// Items in insertion order.
    #[must_use]
    pub fn items(&self) -> Vec<CartItem> {
        self.state().items.clone()
    }

    /// Items whose latest write is not confirmed remotely.
    #[must_use]
    pub fn unsynced_items(&self) -> Vec<CartItem> {
        self.state()
            .items
            .iter()
            .filter(|item| !item.sync.is_synced())
            .cloned()
            .collect()
    }

    #[must_use]
    pub fn quantity_of(&self, product_id: &ProductId) -> Option<u32> {
        self.state().quantity_of(product_id)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state().items.is_empty()
    }

    #[must_use]
    pub fn pricing(&self) -> &PricingPolicy {
        &self.inner.pricing
    }

    #[must_use]
    pub fn totals(&self) -> CartTotals {
        pricing::totals(&self.state().items, &self.inner.pricing)
    }

    #[must_use]
    pub fn item_count(&self) -> u32 {
        pricing::item_count(&self.state().items)
    }

    #[must_use]
    pub fn subtotal(&self) -> Price {
        pricing::subtotal(&self.state().items, &self.inner.pricing)
    }

    #[must_use]
    pub fn shipping(&self) -> Price {
        self.totals().shipping
    }

    #[must_use]
    pub fn tax(&self) -> Price {
        self.totals().tax
    }

    #[must_use]
    pub fn total(&self) -> Price {
        self.totals().total
    }
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("CartStore")
            .field("owner", &state.owner)
            .field("items", &state.items.len())
            .finish_non_exhaustive()
    }
}
