//! In-memory implementation of [`RemoteGateway`].
//!
//! Holds every table in a mutex-guarded struct so tests can seed data, inspect
//! what the stores wrote, and simulate an unreachable backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use komorebi_core::{
    Category, CommentId, CommentRecord, Email, Product, ProductId, Profile, ProfileUpdate,
    SaleRecord, UserId,
};
use secrecy::{ExposeSecret, SecretString};
use uuid::Uuid;

use super::{AuthSession, GatewayError, NewComment, NewProduct, RemoteCartLine, RemoteGateway};

/// A [`RemoteGateway`] backed by process memory.
#[derive(Clone, Default)]
pub struct InMemoryGateway {
    inner: Arc<Mutex<Tables>>,
}

#[derive(Default)]
struct Tables {
    /// email -> (password, user id)
    accounts: HashMap<String, (String, UserId)>,
    session: Option<UserId>,
    products: Vec<Product>,
    categories: Vec<Category>,
    /// (user, product) -> quantity, in insertion order per user
    cart: Vec<(UserId, ProductId, u32)>,
    favorites: Vec<(UserId, ProductId)>,
    sales: Vec<SaleRecord>,
    comments: Vec<CommentRecord>,
    profiles: BTreeMap<UserId, Profile>,
    buckets: BTreeMap<String, BTreeMap<String, (Vec<u8>, String)>>,
    offline: bool,
    fail_next: u32,
    calls: u64,
}

impl InMemoryGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lock the tables for a remote call, applying injected failures.
    fn call(&self) -> Result<MutexGuard<'_, Tables>, GatewayError> {
        let mut tables = self.tables();
        tables.calls += 1;
        if tables.offline {
            return Err(GatewayError::Unavailable("backend offline".to_string()));
        }
        if tables.fail_next > 0 {
            tables.fail_next -= 1;
            return Err(GatewayError::Status {
                status: 503,
                message: "injected failure".to_string(),
            });
        }
        Ok(tables)
    }

    // -------------------------------------------------------------------------
    // Failure injection
    // -------------------------------------------------------------------------

    /// Make every call fail with [`GatewayError::Unavailable`] until reset.
    pub fn set_offline(&self, offline: bool) {
        self.tables().offline = offline;
    }

    /// Make the next `count` calls fail with a 503.
    pub fn fail_next(&self, count: u32) {
        self.tables().fail_next = count;
    }

    /// Start or end a session without going through sign-in.
    pub fn set_session(&self, user: Option<UserId>) {
        self.tables().session = user;
    }

    /// Number of remote calls made so far, including failed ones.
    #[must_use]
    pub fn call_count(&self) -> u64 {
        self.tables().calls
    }

    // -------------------------------------------------------------------------
    // Seeding
    // -------------------------------------------------------------------------

    /// Register an account without starting a session.
    pub fn seed_account(&self, email: &Email, password: &str) -> UserId {
        let user_id = UserId::new(Uuid::new_v4().to_string());
        self.tables().accounts.insert(
            email.as_str().to_owned(),
            (password.to_owned(), user_id.clone()),
        );
        user_id
    }

    pub fn seed_product(&self, product: Product) {
        let mut tables = self.tables();
        tables.products.retain(|p| p.id != product.id);
        tables.products.push(product);
    }

    pub fn seed_category(&self, category: Category) {
        self.tables().categories.push(category);
    }

    pub fn seed_sale(&self, sale: SaleRecord) {
        self.tables().sales.push(sale);
    }

    pub fn seed_comment(&self, comment: CommentRecord) {
        self.tables().comments.push(comment);
    }

    pub fn seed_profile(&self, profile: Profile) {
        self.tables()
            .profiles
            .insert(profile.user_id.clone(), profile);
    }

    pub fn seed_cart_row(&self, user: &UserId, product: &ProductId, quantity: u32) {
        upsert_row(&mut self.tables().cart, user, product, quantity);
    }

    pub fn seed_favorite(&self, user: &UserId, product: &ProductId) {
        self.tables()
            .favorites
            .push((user.clone(), product.clone()));
    }

    // -------------------------------------------------------------------------
    // Inspection
    // -------------------------------------------------------------------------

    /// Remote cart rows of a user as (product, quantity), in insertion order.
    #[must_use]
    pub fn cart_rows(&self, user: &UserId) -> Vec<(ProductId, u32)> {
        self.tables()
            .cart
            .iter()
            .filter(|(u, _, _)| u == user)
            .map(|(_, p, q)| (p.clone(), *q))
            .collect()
    }

    /// Remote favorite product ids of a user.
    #[must_use]
    pub fn favorite_rows(&self, user: &UserId) -> Vec<ProductId> {
        self.tables()
            .favorites
            .iter()
            .filter(|(u, _)| u == user)
            .map(|(_, p)| p.clone())
            .collect()
    }

    /// Stored object bytes, if uploaded.
    #[must_use]
    pub fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.tables()
            .buckets
            .get(bucket)
            .and_then(|objects| objects.get(path))
            .map(|(bytes, _)| bytes.clone())
    }

    /// Currently signed-in user.
    #[must_use]
    pub fn session_user(&self) -> Option<UserId> {
        self.tables().session.clone()
    }
}

fn upsert_row(
    rows: &mut Vec<(UserId, ProductId, u32)>,
    user: &UserId,
    product: &ProductId,
    quantity: u32,
) {
    if let Some(row) = rows.iter_mut().find(|(u, p, _)| u == user && p == product) {
        row.2 = quantity;
    } else {
        rows.push((user.clone(), product.clone(), quantity));
    }
}

/// Row-level security on cart rows: only the session user may write them.
fn require_session(tables: &Tables, user: &UserId) -> Result<(), GatewayError> {
    if tables.session.as_ref() == Some(user) {
        Ok(())
    } else {
        Err(GatewayError::Unauthorized(format!("no session for user {user}")))
    }
}

fn session_for(email: &Email, user_id: UserId) -> AuthSession {
    AuthSession {
        user_id,
        email: email.clone(),
        access_token: SecretString::from(format!("memory-{}", Uuid::new_v4())),
    }
}

impl RemoteGateway for InMemoryGateway {
    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, GatewayError> {
        let mut tables = self.call()?;
        if tables.accounts.contains_key(email.as_str()) {
            return Err(GatewayError::Conflict("user already registered".to_string()));
        }
        let user_id = UserId::new(Uuid::new_v4().to_string());
        tables.accounts.insert(
            email.as_str().to_owned(),
            (password.expose_secret().to_owned(), user_id.clone()),
        );
        tables.profiles.insert(
            user_id.clone(),
            Profile {
                user_id: user_id.clone(),
                display_name: email.as_str().split('@').next().unwrap_or_default().to_owned(),
                avatar_url: None,
                bio: None,
            },
        );
        tables.session = Some(user_id.clone());
        Ok(session_for(email, user_id))
    }

    async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, GatewayError> {
        let mut tables = self.call()?;
        let user_id = match tables.accounts.get(email.as_str()) {
            Some((stored, user_id)) if stored == password.expose_secret() => user_id.clone(),
            _ => {
                return Err(GatewayError::Unauthorized(
                    "Invalid login credentials".to_string(),
                ));
            }
        };
        tables.session = Some(user_id.clone());
        Ok(session_for(email, user_id))
    }

    async fn sign_out(&self) -> Result<(), GatewayError> {
        let mut tables = self.call()?;
        tables.session = None;
        Ok(())
    }

    async fn list_products(&self) -> Result<Vec<Product>, GatewayError> {
        let tables = self.call()?;
        let mut products = tables.products.clone();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(products)
    }

    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, GatewayError> {
        let tables = self.call()?;
        Ok(ids
            .iter()
            .filter_map(|id| tables.products.iter().find(|p| p.id == *id).cloned())
            .collect())
    }

    async fn products_by_seller(&self, seller: &UserId) -> Result<Vec<Product>, GatewayError> {
        let tables = self.call()?;
        Ok(tables
            .products
            .iter()
            .filter(|p| p.seller_id.as_ref() == Some(seller))
            .cloned()
            .collect())
    }

    async fn list_categories(&self) -> Result<Vec<Category>, GatewayError> {
        let tables = self.call()?;
        let mut categories = tables.categories.clone();
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(categories)
    }

    async fn insert_product(&self, product: NewProduct) -> Result<Product, GatewayError> {
        let mut tables = self.call()?;
        let created = Product {
            id: ProductId::new(Uuid::new_v4().to_string()),
            name: product.name,
            vendor: product.vendor,
            seller_id: Some(product.seller_id),
            price: product.price,
            image_url: product.image_url,
            category: product.category,
            description: product.description,
            created_at: Some(Utc::now()),
        };
        tables.products.push(created.clone());
        Ok(created)
    }

    async fn fetch_cart(&self, user: &UserId) -> Result<Vec<RemoteCartLine>, GatewayError> {
        let tables = self.call()?;
        Ok(tables
            .cart
            .iter()
            .filter(|(u, _, q)| u == user && *q > 0)
            .filter_map(|(_, product_id, quantity)| {
                let product = tables.products.iter().find(|p| p.id == *product_id)?;
                Some(RemoteCartLine {
                    product: product.clone(),
                    quantity: *quantity,
                })
            })
            .collect())
    }

    async fn upsert_cart_item(
        &self,
        user: &UserId,
        product: &ProductId,
        quantity: u32,
    ) -> Result<(), GatewayError> {
        let mut tables = self.call()?;
        require_session(&tables, user)?;
        upsert_row(&mut tables.cart, user, product, quantity);
        Ok(())
    }

    async fn delete_cart_item(
        &self,
        user: &UserId,
        product: &ProductId,
    ) -> Result<(), GatewayError> {
        let mut tables = self.call()?;
        require_session(&tables, user)?;
        tables.cart.retain(|(u, p, _)| !(u == user && p == product));
        Ok(())
    }

    async fn clear_cart(&self, user: &UserId) -> Result<(), GatewayError> {
        let mut tables = self.call()?;
        require_session(&tables, user)?;
        tables.cart.retain(|(u, _, _)| u != user);
        Ok(())
    }

    async fn fetch_favorite_ids(&self, user: &UserId) -> Result<Vec<ProductId>, GatewayError> {
        let tables = self.call()?;
        Ok(tables
            .favorites
            .iter()
            .filter(|(u, _)| u == user)
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn insert_favorite(
        &self,
        user: &UserId,
        product: &ProductId,
    ) -> Result<(), GatewayError> {
        let mut tables = self.call()?;
        if tables.favorites.iter().any(|(u, p)| u == user && p == product) {
            return Err(GatewayError::Conflict(
                "duplicate key value violates unique constraint".to_string(),
            ));
        }
        tables.favorites.push((user.clone(), product.clone()));
        Ok(())
    }

    async fn delete_favorite(
        &self,
        user: &UserId,
        product: &ProductId,
    ) -> Result<(), GatewayError> {
        let mut tables = self.call()?;
        tables
            .favorites
            .retain(|(u, p)| !(u == user && p == product));
        Ok(())
    }

    async fn fetch_sales(&self, products: &[ProductId]) -> Result<Vec<SaleRecord>, GatewayError> {
        let tables = self.call()?;
        Ok(tables
            .sales
            .iter()
            .filter(|s| products.contains(&s.product_id))
            .cloned()
            .collect())
    }

    async fn fetch_comments(
        &self,
        products: &[ProductId],
    ) -> Result<Vec<CommentRecord>, GatewayError> {
        let tables = self.call()?;
        Ok(tables
            .comments
            .iter()
            .filter(|c| products.contains(&c.product_id))
            .cloned()
            .collect())
    }

    async fn insert_comment(&self, comment: NewComment) -> Result<CommentRecord, GatewayError> {
        let mut tables = self.call()?;
        let record = CommentRecord {
            id: CommentId::new(Uuid::new_v4().to_string()),
            author_id: comment.author_id,
            product_id: comment.product_id,
            text: comment.text,
            created_at: Utc::now(),
        };
        tables.comments.push(record.clone());
        Ok(record)
    }

    async fn fetch_profiles(&self, users: &[UserId]) -> Result<Vec<Profile>, GatewayError> {
        let tables = self.call()?;
        Ok(users
            .iter()
            .filter_map(|id| tables.profiles.get(id).cloned())
            .collect())
    }

    async fn update_profile(
        &self,
        user: &UserId,
        update: &ProfileUpdate,
    ) -> Result<Profile, GatewayError> {
        let mut tables = self.call()?;
        let profile = tables
            .profiles
            .get_mut(user)
            .ok_or_else(|| GatewayError::NotFound(format!("profile {user}")))?;
        update.apply_to(profile);
        Ok(profile.clone())
    }

    async fn ensure_bucket(&self, bucket: &str) -> Result<(), GatewayError> {
        let mut tables = self.call()?;
        tables.buckets.entry(bucket.to_owned()).or_default();
        Ok(())
    }

    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), GatewayError> {
        let mut tables = self.call()?;
        let objects = tables
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| GatewayError::NotFound(format!("bucket {bucket}")))?;
        objects.insert(path.to_owned(), (bytes, content_type.to_owned()));
        Ok(())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{bucket}/{path}")
    }
}
