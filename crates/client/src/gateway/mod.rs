//! Remote data gateway: auth, row storage and object storage.
//!
//! # Architecture
//!
//! - [`RemoteGateway`] names every remote call the stores and services make
//! - [`SupabaseClient`] speaks to a Supabase project over HTTP (`reqwest`),
//!   caching product reads in memory via `moka`
//! - [`InMemoryGateway`] keeps the same tables in process memory, with
//!   failure injection for tests and offline runs
//!
//! The backend is the system of record. Nothing here retries; callers decide
//! whether a failure is surfaced (favorites, services) or queued (cart outbox).
//!
//! # Tables
//!
//! - `products`, `categories`
//! - `cart` (`user_id`, `product_id`, `quantity`)
//! - `favorites` (`user_id`, `product_id`)
//! - `sales`, `comments`, `profiles`

mod memory;
mod supabase;

pub use memory::InMemoryGateway;
pub use supabase::SupabaseClient;

use std::future::Future;

use komorebi_core::{
    Category, CommentRecord, Email, Price, Product, ProductId, Profile, ProfileUpdate, SaleRecord,
    UserId,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when talking to the remote backend.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("backend returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error message or body excerpt.
        message: String,
    },

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// Credentials rejected or session missing.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Sign-up succeeded but the account must confirm its email first.
    #[error("email confirmation required")]
    ConfirmationRequired,

    /// Row already exists (unique constraint).
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rate limited by the backend.
    #[error("Rate limited, retry after {0} seconds")]
    RateLimited(u64),

    /// Backend unreachable.
    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl GatewayError {
    /// Returns `true` if a later retry of the same call may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::RateLimited(_) | Self::Unavailable(_) => true,
            Self::Status { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// An authenticated session returned by sign-up or sign-in.
///
/// Implements `Debug` manually to redact the access token.
#[derive(Clone)]
pub struct AuthSession {
    pub user_id: UserId,
    pub email: Email,
    pub access_token: SecretString,
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("access_token", &"[REDACTED]")
            .finish()
    }
}

/// A cart row joined with its product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCartLine {
    pub product: Product,
    pub quantity: u32,
}

/// Fields of a product about to be listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProduct {
    pub name: String,
    pub vendor: String,
    pub seller_id: UserId,
    pub price: Price,
    pub image_url: Option<String>,
    pub category: String,
    pub description: Option<String>,
}

/// Fields of a comment about to be posted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewComment {
    pub author_id: UserId,
    pub product_id: ProductId,
    pub text: String,
}

/// Every remote call made by the client state layer.
///
/// Implementations must be cheap to clone (share an `Arc` internally) so
/// stores and background tasks can each hold a handle.
pub trait RemoteGateway: Clone + Send + Sync + 'static {
    // -------------------------------------------------------------------------
    // Auth
    // -------------------------------------------------------------------------

    /// Create an account and start a session.
    fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> impl Future<Output = Result<AuthSession, GatewayError>> + Send;

    /// Start a session with email and password.
    fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> impl Future<Output = Result<AuthSession, GatewayError>> + Send;

    /// End the current session.
    fn sign_out(&self) -> impl Future<Output = Result<(), GatewayError>> + Send;

    // -------------------------------------------------------------------------
    // Catalog
    // -------------------------------------------------------------------------

    /// All listed products, newest first.
    fn list_products(&self) -> impl Future<Output = Result<Vec<Product>, GatewayError>> + Send;

    /// Products with the given ids. Unknown ids are skipped.
    fn products_by_ids(
        &self,
        ids: &[ProductId],
    ) -> impl Future<Output = Result<Vec<Product>, GatewayError>> + Send;

    /// Products listed by one seller.
    fn products_by_seller(
        &self,
        seller: &UserId,
    ) -> impl Future<Output = Result<Vec<Product>, GatewayError>> + Send;

    /// All categories.
    fn list_categories(&self)
    -> impl Future<Output = Result<Vec<Category>, GatewayError>> + Send;

    /// Insert a new product listing.
    fn insert_product(
        &self,
        product: NewProduct,
    ) -> impl Future<Output = Result<Product, GatewayError>> + Send;

    // -------------------------------------------------------------------------
    // Cart
    // -------------------------------------------------------------------------

    /// All cart rows of a user joined with product data, in insertion order.
    fn fetch_cart(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<Vec<RemoteCartLine>, GatewayError>> + Send;

    /// Insert or overwrite the quantity for a (user, product) pair.
    fn upsert_cart_item(
        &self,
        user: &UserId,
        product: &ProductId,
        quantity: u32,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Delete the row for a (user, product) pair.
    fn delete_cart_item(
        &self,
        user: &UserId,
        product: &ProductId,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Delete every cart row of a user.
    fn clear_cart(&self, user: &UserId) -> impl Future<Output = Result<(), GatewayError>> + Send;

    // -------------------------------------------------------------------------
    // Favorites
    // -------------------------------------------------------------------------

    /// Product ids favorited by a user.
    fn fetch_favorite_ids(
        &self,
        user: &UserId,
    ) -> impl Future<Output = Result<Vec<ProductId>, GatewayError>> + Send;

    /// Insert a favorite. Fails with [`GatewayError::Conflict`] if present.
    fn insert_favorite(
        &self,
        user: &UserId,
        product: &ProductId,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Delete a favorite.
    fn delete_favorite(
        &self,
        user: &UserId,
        product: &ProductId,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    // -------------------------------------------------------------------------
    // Sales, comments, profiles
    // -------------------------------------------------------------------------

    /// Sales of any of the given products.
    fn fetch_sales(
        &self,
        products: &[ProductId],
    ) -> impl Future<Output = Result<Vec<SaleRecord>, GatewayError>> + Send;

    /// Comments on any of the given products.
    fn fetch_comments(
        &self,
        products: &[ProductId],
    ) -> impl Future<Output = Result<Vec<CommentRecord>, GatewayError>> + Send;

    /// Insert a comment.
    fn insert_comment(
        &self,
        comment: NewComment,
    ) -> impl Future<Output = Result<CommentRecord, GatewayError>> + Send;

    /// Profiles of the given users. Unknown ids are skipped.
    fn fetch_profiles(
        &self,
        users: &[UserId],
    ) -> impl Future<Output = Result<Vec<Profile>, GatewayError>> + Send;

    /// Apply a partial update to a user's profile.
    fn update_profile(
        &self,
        user: &UserId,
        update: &ProfileUpdate,
    ) -> impl Future<Output = Result<Profile, GatewayError>> + Send;

    // -------------------------------------------------------------------------
    // Object storage
    // -------------------------------------------------------------------------

    /// Create a public bucket if it does not exist yet.
    fn ensure_bucket(&self, bucket: &str) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Upload (or overwrite) an object.
    fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;

    /// Public URL of an object in a public bucket.
    fn public_url(&self, bucket: &str, path: &str) -> String;
}
