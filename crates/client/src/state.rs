//! Application state shared across the client.
//!
//! [`AppState`] replaces module-level store singletons: every store, the
//! outbox and the session live in one container built from an injected
//! gateway and local store, so tests can build as many isolated instances as
//! they need.

use std::sync::Arc;

use chrono::Utc;
use komorebi_core::{
    CommentRecord, ListingDraft, Product, ProductId, Profile, ProfileUpdate, UserId,
};
use secrecy::SecretString;
use tracing::instrument;

use crate::auth::{AuthState, SessionUser};
use crate::cart::CartStore;
use crate::config::{KomorebiConfig, StorePolicies};
use crate::error::{ClientError, Result};
use crate::favorites::FavoritesStore;
use crate::gateway::{GatewayError, RemoteGateway, SupabaseClient};
use crate::notifications::NotificationCenter;
use crate::outbox::{DrainReport, Outbox};
use crate::persistence::{FileStore, LocalStore};
use crate::services::{
    CatalogService, CommentService, ListingImage, ListingService, ProfileService,
};

/// Application state, cheaply cloneable via `Arc`.
pub struct AppState<G> {
    inner: Arc<AppStateInner<G>>,
}

impl<G> Clone for AppState<G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct AppStateInner<G> {
    gateway: G,
    store: Arc<dyn LocalStore>,
    policies: StorePolicies,
    auth: AuthState,
    outbox: Outbox,
    cart: CartStore,
    favorites: FavoritesStore,
    notifications: NotificationCenter,
}

impl AppState<SupabaseClient> {
    /// Build the production state: HTTP gateway plus snapshots under
    /// `config.data_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the data
    /// directory cannot be created.
    pub fn from_config(config: &KomorebiConfig) -> Result<Self> {
        let gateway = SupabaseClient::new(&config.supabase, config.pricing.currency)?;
        let store = FileStore::open(&config.data_dir)?;
        Ok(Self::new(gateway, Arc::new(store), config.policies()))
    }
}

impl<G: RemoteGateway> AppState<G> {
    /// Create the state, restoring every store from `store`.
    #[must_use]
    pub fn new(gateway: G, store: Arc<dyn LocalStore>, policies: StorePolicies) -> Self {
        let outbox = Outbox::open(Arc::clone(&store), policies.retry);
        let cart = CartStore::new(Arc::clone(&store), outbox.clone(), policies.pricing);
        let favorites = FavoritesStore::new(Arc::clone(&store));
        let notifications = NotificationCenter::new(Arc::clone(&store), policies.notifications);

        Self {
            inner: Arc::new(AppStateInner {
                gateway,
                store,
                policies,
                auth: AuthState::new(),
                outbox,
                cart,
                favorites,
                notifications,
            }),
        }
    }

    #[must_use]
    pub fn gateway(&self) -> &G {
        &self.inner.gateway
    }

    #[must_use]
    pub fn local_store(&self) -> &Arc<dyn LocalStore> {
        &self.inner.store
    }

    #[must_use]
    pub fn policies(&self) -> &StorePolicies {
        &self.inner.policies
    }

    #[must_use]
    pub fn auth(&self) -> &AuthState {
        &self.inner.auth
    }

    #[must_use]
    pub fn outbox(&self) -> &Outbox {
        &self.inner.outbox
    }

    #[must_use]
    pub fn cart(&self) -> &CartStore {
        &self.inner.cart
    }

    #[must_use]
    pub fn favorites(&self) -> &FavoritesStore {
        &self.inner.favorites
    }

    #[must_use]
    pub fn notifications(&self) -> &NotificationCenter {
        &self.inner.notifications
    }

    #[must_use]
    pub fn catalog(&self) -> CatalogService<'_, G> {
        CatalogService::new(&self.inner.gateway)
    }

    /// The signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotSignedIn` if there is no session.
    pub fn require_user(&self) -> Result<SessionUser> {
        self.inner.auth.current_user().ok_or(ClientError::NotSignedIn)
    }

    // -------------------------------------------------------------------------
    // Session
    // -------------------------------------------------------------------------

    /// Create an account, then load the user's stores.
    ///
    /// # Errors
    ///
    /// Returns the auth error; stores are untouched on failure.
    pub async fn sign_up(&self, email: &str, password: &SecretString) -> Result<SessionUser> {
        let user = self
            .inner
            .auth
            .sign_up(&self.inner.gateway, email, password)
            .await?;
        self.load_user_state(&user.user_id).await;
        Ok(user)
    }

    /// Sign in, then load the user's cart, favorites and notifications.
    ///
    /// A store that fails to load keeps its local snapshot; the sign-in still
    /// succeeds.
    ///
    /// # Errors
    ///
    /// Returns the auth error; stores are untouched on failure.
    pub async fn sign_in(&self, email: &str, password: &SecretString) -> Result<SessionUser> {
        let user = self
            .inner
            .auth
            .sign_in(&self.inner.gateway, email, password)
            .await?;
        self.load_user_state(&user.user_id).await;
        Ok(user)
    }

    /// Deliver writes left over from an earlier session, then load the
    /// user's stores.
    #[instrument(skip(self))]
    async fn load_user_state(&self, user: &UserId) {
        self.inner.outbox.retry_now();
        let restored = self.sync_now().await;
        if !restored.delivered.is_empty() {
            tracing::info!(count = restored.delivered.len(), "Delivered restored cart writes");
        }

        let gateway = &self.inner.gateway;
        let (cart, favorites, notifications) = tokio::join!(
            self.load_cart(user),
            self.inner.favorites.load(gateway, user),
            self.inner.notifications.refresh(gateway, user),
        );

        if let Err(e) = cart {
            tracing::warn!(error = %e, "Keeping local cart, remote load failed");
            self.inner.cart.set_owner(Some(user.clone()));
        }
        if let Err(e) = favorites {
            tracing::warn!(error = %e, "Keeping local favorites, remote load failed");
        }
        if let Err(e) = notifications {
            tracing::warn!(error = %e, "Notification refresh failed");
        }
    }

    /// Load the remote cart unless the user still has queued writes, in which
    /// case the local cart is newer and is kept.
    async fn load_cart(&self, user: &UserId) -> std::result::Result<(), GatewayError> {
        if self.inner.outbox.next_due(user).is_some() {
            tracing::info!("Keeping local cart, writes still queued");
            self.inner.cart.set_owner(Some(user.clone()));
            return Ok(());
        }
        self.inner.cart.load_from_remote(&self.inner.gateway, user).await
    }

    /// Flush what can be flushed, end the session and clear user stores.
    ///
    /// Cart writes still queued after the final flush are dropped.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) {
        if let Some(user) = self.inner.auth.current_user_id() {
            self.sync_now().await;
            let dropped = self.inner.outbox.discard_user(&user);
            if !dropped.is_empty() {
                tracing::warn!(count = dropped.len(), "Dropping undelivered cart writes");
            }
        }

        self.inner.auth.sign_out(&self.inner.gateway).await;
        self.inner.cart.clear();
        self.inner.cart.set_owner(None);
        self.inner.favorites.reset();
        self.inner.notifications.reset();
    }

    // -------------------------------------------------------------------------
    // Sync
    // -------------------------------------------------------------------------

    /// Run one outbox pass for the signed-in user and apply its outcome to
    /// the cart. Without a session nothing is sent.
    pub async fn sync_now(&self) -> DrainReport {
        let Some(user) = self.inner.auth.current_user_id() else {
            return DrainReport {
                remaining: self.inner.outbox.len(),
                ..DrainReport::default()
            };
        };
        let report = self
            .inner
            .outbox
            .drain_due(&self.inner.gateway, &user, Utc::now())
            .await;
        self.apply_report(&report);
        report
    }

    /// Mark delivered and abandoned cart writes on their items.
    pub fn apply_report(&self, report: &DrainReport) {
        for op in &report.delivered {
            self.inner.cart.mark_delivered(*op);
        }
        for (op, reason) in &report.abandoned {
            self.inner.cart.mark_abandoned(*op, reason);
        }
    }

    // -------------------------------------------------------------------------
    // Signed-in operations
    // -------------------------------------------------------------------------

    /// Add or remove a favorite for the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotSignedIn` or the remote error.
    pub async fn toggle_favorite(&self, product: Product) -> Result<bool> {
        let user = self.require_user()?;
        self.inner
            .favorites
            .toggle(&self.inner.gateway, &user.user_id, product)
            .await
    }

    /// Rebuild the signed-in seller's notification feed.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotSignedIn` or the remote error.
    pub async fn refresh_notifications(&self) -> Result<usize> {
        let user = self.require_user()?;
        self.inner
            .notifications
            .refresh(&self.inner.gateway, &user.user_id)
            .await
    }

    /// Publish a listing as the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotSignedIn`, a validation error or the remote
    /// error.
    pub async fn create_listing(
        &self,
        draft: &ListingDraft,
        image: Option<ListingImage>,
    ) -> Result<Product> {
        let user = self.require_user()?;
        ListingService::new(&self.inner.gateway)
            .create_listing(&user.user_id, draft, image)
            .await
    }

    /// Comment on a product as the signed-in user.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotSignedIn`, a validation error or the remote
    /// error.
    pub async fn post_comment(&self, product: &ProductId, text: &str) -> Result<CommentRecord> {
        let user = self.require_user()?;
        CommentService::new(&self.inner.gateway)
            .post_comment(&user.user_id, product, text)
            .await
    }

    /// Comments on a product, newest first.
    ///
    /// # Errors
    ///
    /// Returns the remote error.
    pub async fn comments(&self, product: &ProductId) -> Result<Vec<CommentRecord>> {
        CommentService::new(&self.inner.gateway)
            .comments_for(product)
            .await
    }

    /// A user's profile.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotFound` or the remote error.
    pub async fn profile(&self, user: &UserId) -> Result<Profile> {
        ProfileService::new(&self.inner.gateway).profile(user).await
    }

    /// Update the signed-in user's profile.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotSignedIn`, a validation error or the remote
    /// error.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Profile> {
        let user = self.require_user()?;
        ProfileService::new(&self.inner.gateway)
            .update_profile(&user.user_id, update)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use komorebi_core::{CurrencyCode, Email, Price};

    use super::*;
    use crate::gateway::InMemoryGateway;
    use crate::persistence::MemoryStore;

    fn product(id: &str) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Snack {id}"),
            vendor: "Komorebi".to_string(),
            seller_id: None,
            price: Price::new(1000, CurrencyCode::JPY),
            image_url: None,
            category: "sweets".to_string(),
            description: None,
            created_at: None,
        }
    }

    fn state() -> (AppState<InMemoryGateway>, InMemoryGateway) {
        let gateway = InMemoryGateway::new();
        let state = AppState::new(
            gateway.clone(),
            Arc::new(MemoryStore::new()),
            StorePolicies::default(),
        );
        (state, gateway)
    }

    #[tokio::test]
    async fn test_signed_out_operations_fail() {
        let (state, _) = state();
        assert!(matches!(
            state.toggle_favorite(product("p1")).await,
            Err(ClientError::NotSignedIn)
        ));
        assert!(matches!(
            state.post_comment(&ProductId::new("p1"), "hi").await,
            Err(ClientError::NotSignedIn)
        ));
    }

    #[tokio::test]
    async fn test_sign_in_loads_remote_cart() {
        let (state, gateway) = state();
        let email = Email::parse("aiko@komorebi.jp").unwrap();
        let user = gateway.seed_account(&email, "matcha-latte");
        gateway.seed_product(product("p1"));
        gateway.seed_cart_row(&user, &ProductId::new("p1"), 2);

        state
            .sign_in("aiko@komorebi.jp", &SecretString::from("matcha-latte"))
            .await
            .unwrap();
        assert_eq!(state.cart().quantity_of(&ProductId::new("p1")), Some(2));
        assert_eq!(state.cart().owner(), Some(user));
    }

    #[tokio::test]
    async fn test_sync_now_marks_items_synced() {
        let (state, gateway) = state();
        let user = state
            .sign_up("ren@komorebi.jp", &SecretString::from("onigiri-9"))
            .await
            .unwrap();

        state.cart().add_item_with_sync(product("p1"));
        assert_eq!(state.cart().unsynced_items().len(), 1);

        let report = state.sync_now().await;
        assert_eq!(report.delivered.len(), 1);
        assert!(state.cart().unsynced_items().is_empty());
        assert_eq!(
            gateway.cart_rows(&user.user_id),
            vec![(ProductId::new("p1"), 1)]
        );
    }

    #[tokio::test]
    async fn test_sign_out_clears_stores() {
        let (state, gateway) = state();
        state
            .sign_up("ren@komorebi.jp", &SecretString::from("onigiri-9"))
            .await
            .unwrap();
        state.cart().add_item_with_sync(product("p1"));
        gateway.seed_product(product("p2"));
        state.toggle_favorite(product("p2")).await.unwrap();

        gateway.set_offline(true);
        state.sign_out().await;

        assert!(state.cart().is_empty());
        assert_eq!(state.cart().owner(), None);
        assert!(state.favorites().is_empty());
        assert!(state.outbox().is_empty());
        assert!(state.auth().current_user().is_none());
    }
}
