//! Supabase implementation of [`RemoteGateway`].
//!
//! Talks to the project's `auth/v1`, `rest/v1` (PostgREST) and `storage/v1`
//! endpoints with `reqwest`. Product and category reads are cached using
//! `moka` for the configured TTL; listing a product invalidates the catalog.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use komorebi_core::{
    Category, CommentId, CommentRecord, CurrencyCode, Email, Price, Product, ProductId, Profile,
    ProfileUpdate, SaleId, SaleRecord, UserId,
};
use moka::future::Cache;
use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, instrument};

use super::{AuthSession, GatewayError, NewComment, NewProduct, RemoteCartLine, RemoteGateway};
use crate::config::SupabaseConfig;

const PRODUCT_COLUMNS: &str =
    "id,name,vendor,seller_id,price,image_url,category,description,created_at";

/// Cache key for catalog reads.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Catalog,
    Product(ProductId),
    Categories,
}

/// Cached value types.
#[derive(Debug, Clone)]
enum CacheValue {
    Products(Arc<Vec<Product>>),
    Product(Box<Product>),
    Categories(Arc<Vec<Category>>),
}

// =============================================================================
// SupabaseClient
// =============================================================================

/// Client for a Supabase project.
///
/// Cheap to clone; all clones share the HTTP connection pool, the cache and
/// the current session token.
#[derive(Clone)]
pub struct SupabaseClient {
    inner: Arc<SupabaseClientInner>,
}

struct SupabaseClientInner {
    client: reqwest::Client,
    base_url: String,
    anon_key: SecretString,
    currency: CurrencyCode,
    access_token: RwLock<Option<SecretString>>,
    cache: Cache<CacheKey, CacheValue>,
}

impl SupabaseClient {
    /// Create a new client.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Http` if the HTTP client cannot be built.
    pub fn new(config: &SupabaseConfig, currency: CurrencyCode) -> Result<Self, GatewayError> {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(config.product_cache_ttl)
            .build();

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(SupabaseClientInner {
                client,
                base_url: config.url.trim_end_matches('/').to_string(),
                anon_key: config.anon_key.clone(),
                currency,
                access_token: RwLock::new(None),
                cache,
            }),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.inner.base_url)
    }

    fn rest(&self, table: &str) -> String {
        self.url(&format!("rest/v1/{table}"))
    }

    fn set_access_token(&self, token: Option<SecretString>) {
        let mut guard = self
            .inner
            .access_token
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = token;
    }

    /// Attach the anon key and the session token (or the anon key when
    /// signed out) to a request.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self
            .inner
            .access_token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or_else(
                || self.inner.anon_key.expose_secret().to_string(),
                |token| token.expose_secret().to_string(),
            );

        request
            .header("apikey", self.inner.anon_key.expose_secret())
            .bearer_auth(bearer)
    }

    /// Send a request and return the response body, mapping failures.
    async fn send(&self, request: RequestBuilder) -> Result<String, GatewayError> {
        let response = self.authorize(request).send().await?;
        let status = response.status();

        // Check for rate limiting
        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .unwrap_or(1);
            return Err(GatewayError::RateLimited(retry_after));
        }

        let body = response.text().await?;

        if !status.is_success() {
            let message = error_message(&body);
            tracing::debug!(
                status = %status,
                body = %body.chars().take(500).collect::<String>(),
                "Backend returned non-success status"
            );
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    GatewayError::Unauthorized(message)
                }
                StatusCode::NOT_FOUND => GatewayError::NotFound(message),
                StatusCode::CONFLICT => GatewayError::Conflict(message),
                _ => GatewayError::Status {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        Ok(body)
    }

    /// Send a request and parse the JSON response.
    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, GatewayError> {
        let body = self.send(request).await?;
        serde_json::from_str(&body).map_err(|e| {
            tracing::error!(
                error = %e,
                body = %body.chars().take(500).collect::<String>(),
                "Failed to parse backend response"
            );
            GatewayError::Parse(e)
        })
    }

    async fn fetch_products(
        &self,
        filter: &[(&str, String)],
    ) -> Result<Vec<Product>, GatewayError> {
        let mut query = vec![
            ("select", PRODUCT_COLUMNS.to_string()),
            ("order", "created_at.desc".to_string()),
        ];
        query.extend(filter.iter().map(|(k, v)| (*k, v.clone())));

        let rows: Vec<ProductRow> = self
            .send_json(self.inner.client.get(self.rest("products")).query(&query))
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| row.into_product(self.inner.currency))
            .collect())
    }

    fn start_session(&self, response: AuthResponse) -> Result<AuthSession, GatewayError> {
        let token = response
            .access_token
            .ok_or(GatewayError::ConfirmationRequired)?;
        let user = response
            .user
            .ok_or_else(|| GatewayError::Unauthorized("no user in auth response".to_string()))?;
        let email = Email::parse(user.email.as_deref().unwrap_or_default())
            .map_err(|e| GatewayError::Unauthorized(format!("invalid account email: {e}")))?;

        let token = SecretString::from(token);
        self.set_access_token(Some(token.clone()));

        Ok(AuthSession {
            user_id: UserId::new(user.id),
            email,
            access_token: token,
        })
    }
}

impl RemoteGateway for SupabaseClient {
    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_up(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, GatewayError> {
        let body = json!({ "email": email.as_str(), "password": password.expose_secret() });
        let response: AuthResponse = self
            .send_json(self.inner.client.post(self.url("auth/v1/signup")).json(&body))
            .await?;
        self.start_session(response)
    }

    #[instrument(skip(self, password), fields(email = %email))]
    async fn sign_in(
        &self,
        email: &Email,
        password: &SecretString,
    ) -> Result<AuthSession, GatewayError> {
        let body = json!({ "email": email.as_str(), "password": password.expose_secret() });
        let request = self
            .inner
            .client
            .post(self.url("auth/v1/token"))
            .query(&[("grant_type", "password")])
            .json(&body);

        let response: AuthResponse = self.send_json(request).await.map_err(|e| match e {
            GatewayError::Status { status: 400, message } => GatewayError::Unauthorized(message),
            other => other,
        })?;
        self.start_session(response)
    }

    #[instrument(skip(self))]
    async fn sign_out(&self) -> Result<(), GatewayError> {
        let result = self
            .send(self.inner.client.post(self.url("auth/v1/logout")))
            .await
            .map(|_| ());
        // The local session ends even if the backend could not be reached
        self.set_access_token(None);
        result
    }

    #[instrument(skip(self))]
    async fn list_products(&self) -> Result<Vec<Product>, GatewayError> {
        if let Some(CacheValue::Products(products)) = self.inner.cache.get(&CacheKey::Catalog).await
        {
            debug!("Cache hit for catalog");
            return Ok(products.as_ref().clone());
        }

        let products = self.fetch_products(&[]).await?;
        for product in &products {
            self.inner
                .cache
                .insert(
                    CacheKey::Product(product.id.clone()),
                    CacheValue::Product(Box::new(product.clone())),
                )
                .await;
        }
        self.inner
            .cache
            .insert(
                CacheKey::Catalog,
                CacheValue::Products(Arc::new(products.clone())),
            )
            .await;
        Ok(products)
    }

    #[instrument(skip(self), fields(count = ids.len()))]
    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>, GatewayError> {
        let mut found = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match self.inner.cache.get(&CacheKey::Product(id.clone())).await {
                Some(CacheValue::Product(product)) => found.push(*product),
                _ => missing.push(id.as_str()),
            }
        }

        if !missing.is_empty() {
            let fetched = self
                .fetch_products(&[("id", in_filter(missing.iter().copied()))])
                .await?;
            for product in fetched {
                self.inner
                    .cache
                    .insert(
                        CacheKey::Product(product.id.clone()),
                        CacheValue::Product(Box::new(product.clone())),
                    )
                    .await;
                found.push(product);
            }
        }

        // Keep the caller's order
        found.sort_by_key(|p| ids.iter().position(|id| *id == p.id));
        Ok(found)
    }

    #[instrument(skip(self), fields(seller = %seller))]
    async fn products_by_seller(&self, seller: &UserId) -> Result<Vec<Product>, GatewayError> {
        self.fetch_products(&[("seller_id", format!("eq.{seller}"))])
            .await
    }

    #[instrument(skip(self))]
    async fn list_categories(&self) -> Result<Vec<Category>, GatewayError> {
        if let Some(CacheValue::Categories(categories)) =
            self.inner.cache.get(&CacheKey::Categories).await
        {
            return Ok(categories.as_ref().clone());
        }

        let request = self
            .inner
            .client
            .get(self.rest("categories"))
            .query(&[("select", "slug,name"), ("order", "name.asc")]);
        let categories: Vec<Category> = self.send_json(request).await?;
        self.inner
            .cache
            .insert(
                CacheKey::Categories,
                CacheValue::Categories(Arc::new(categories.clone())),
            )
            .await;
        Ok(categories)
    }

    #[instrument(skip(self, product), fields(name = %product.name))]
    async fn insert_product(&self, product: NewProduct) -> Result<Product, GatewayError> {
        let row = NewProductRow::from(&product);
        let request = self
            .inner
            .client
            .post(self.rest("products"))
            .query(&[("select", PRODUCT_COLUMNS)])
            .header("Prefer", "return=representation")
            .json(&row);

        let rows: Vec<ProductRow> = self.send_json(request).await?;
        let created = rows
            .into_iter()
            .next()
            .ok_or_else(|| GatewayError::NotFound("inserted product".to_string()))?
            .into_product(self.inner.currency);

        self.inner.cache.invalidate(&CacheKey::Catalog).await;
        Ok(created)
    }

    #[instrument(skip(self), fields(user = %user))]
    async fn fetch_cart(&self, user: &UserId) -> Result<Vec<RemoteCartLine>, GatewayError> {
        let select = format!("quantity,product:products({PRODUCT_COLUMNS})");
        let request = self.inner.client.get(self.rest("cart")).query(&[
            ("select", select),
            ("user_id", format!("eq.{user}")),
            ("order", "created_at.asc".to_string()),
        ]);
        let rows: Vec<CartRow> = self.send_json(request).await?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                // Rows whose product was deleted, or that carry a zero quantity, are skipped
                let quantity = u32::try_from(row.quantity).ok().filter(|q| *q > 0)?;
                let product = row.product?.into_product(self.inner.currency);
                Some(RemoteCartLine { product, quantity })
            })
            .collect())
    }

    #[instrument(skip(self), fields(user = %user, product = %product))]
    async fn upsert_cart_item(
        &self,
        user: &UserId,
        product: &ProductId,
        quantity: u32,
    ) -> Result<(), GatewayError> {
        let body = json!({
            "user_id": user.as_str(),
            "product_id": product.as_str(),
            "quantity": quantity,
        });
        let request = self
            .inner
            .client
            .post(self.rest("cart"))
            .query(&[("on_conflict", "user_id,product_id")])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&body);
        self.send(request).await.map(|_| ())
    }

    #[instrument(skip(self), fields(user = %user, product = %product))]
    async fn delete_cart_item(
        &self,
        user: &UserId,
        product: &ProductId,
    ) -> Result<(), GatewayError> {
        let request = self.inner.client.delete(self.rest("cart")).query(&[
            ("user_id", format!("eq.{user}")),
            ("product_id", format!("eq.{product}")),
        ]);
        self.send(request).await.map(|_| ())
    }

    #[instrument(skip(self), fields(user = %user))]
    async fn clear_cart(&self, user: &UserId) -> Result<(), GatewayError> {
        let request = self
            .inner
            .client
            .delete(self.rest("cart"))
            .query(&[("user_id", format!("eq.{user}"))]);
        self.send(request).await.map(|_| ())
    }

    #[instrument(skip(self), fields(user = %user))]
    async fn fetch_favorite_ids(&self, user: &UserId) -> Result<Vec<ProductId>, GatewayError> {
        let request = self.inner.client.get(self.rest("favorites")).query(&[
            ("select", "product_id".to_string()),
            ("user_id", format!("eq.{user}")),
            ("order", "created_at.asc".to_string()),
        ]);
        let rows: Vec<FavoriteRow> = self.send_json(request).await?;
        Ok(rows.into_iter().map(|row| ProductId::new(row.product_id)).collect())
    }

    #[instrument(skip(self), fields(user = %user, product = %product))]
    async fn insert_favorite(
        &self,
        user: &UserId,
        product: &ProductId,
    ) -> Result<(), GatewayError> {
        let body = json!({ "user_id": user.as_str(), "product_id": product.as_str() });
        let request = self
            .inner
            .client
            .post(self.rest("favorites"))
            .header("Prefer", "return=minimal")
            .json(&body);
        self.send(request).await.map(|_| ())
    }

    #[instrument(skip(self), fields(user = %user, product = %product))]
    async fn delete_favorite(
        &self,
        user: &UserId,
        product: &ProductId,
    ) -> Result<(), GatewayError> {
        let request = self.inner.client.delete(self.rest("favorites")).query(&[
            ("user_id", format!("eq.{user}")),
            ("product_id", format!("eq.{product}")),
        ]);
        self.send(request).await.map(|_| ())
    }

    #[instrument(skip(self), fields(count = products.len()))]
    async fn fetch_sales(&self, products: &[ProductId]) -> Result<Vec<SaleRecord>, GatewayError> {
        if products.is_empty() {
            return Ok(Vec::new());
        }
        let request = self.inner.client.get(self.rest("sales")).query(&[
            ("select", "id,buyer_id,product_id,quantity,created_at".to_string()),
            ("product_id", in_filter(products.iter().map(ProductId::as_str))),
            ("order", "created_at.desc".to_string()),
        ]);
        let rows: Vec<SaleRow> = self.send_json(request).await?;
        Ok(rows.into_iter().map(SaleRecord::from).collect())
    }

    #[instrument(skip(self), fields(count = products.len()))]
    async fn fetch_comments(
        &self,
        products: &[ProductId],
    ) -> Result<Vec<CommentRecord>, GatewayError> {
        if products.is_empty() {
            return Ok(Vec::new());
        }
        let request = self.inner.client.get(self.rest("comments")).query(&[
            ("select", "id,author_id,product_id,text,created_at".to_string()),
            ("product_id", in_filter(products.iter().map(ProductId::as_str))),
            ("order", "created_at.desc".to_string()),
        ]);
        let rows: Vec<CommentRow> = self.send_json(request).await?;
        Ok(rows.into_iter().map(CommentRecord::from).collect())
    }

    #[instrument(skip(self, comment), fields(product = %comment.product_id))]
    async fn insert_comment(&self, comment: NewComment) -> Result<CommentRecord, GatewayError> {
        let body = json!({
            "author_id": comment.author_id.as_str(),
            "product_id": comment.product_id.as_str(),
            "text": comment.text,
        });
        let request = self
            .inner
            .client
            .post(self.rest("comments"))
            .query(&[("select", "id,author_id,product_id,text,created_at")])
            .header("Prefer", "return=representation")
            .json(&body);
        let rows: Vec<CommentRow> = self.send_json(request).await?;
        rows.into_iter()
            .next()
            .map(CommentRecord::from)
            .ok_or_else(|| GatewayError::NotFound("inserted comment".to_string()))
    }

    #[instrument(skip(self), fields(count = users.len()))]
    async fn fetch_profiles(&self, users: &[UserId]) -> Result<Vec<Profile>, GatewayError> {
        if users.is_empty() {
            return Ok(Vec::new());
        }
        let request = self.inner.client.get(self.rest("profiles")).query(&[
            ("select", "id,display_name,avatar_url,bio".to_string()),
            ("id", in_filter(users.iter().map(UserId::as_str))),
        ]);
        let rows: Vec<ProfileRow> = self.send_json(request).await?;
        Ok(rows.into_iter().map(Profile::from).collect())
    }

    #[instrument(skip(self, update), fields(user = %user))]
    async fn update_profile(
        &self,
        user: &UserId,
        update: &ProfileUpdate,
    ) -> Result<Profile, GatewayError> {
        let request = self
            .inner
            .client
            .patch(self.rest("profiles"))
            .query(&[
                ("id", format!("eq.{user}")),
                ("select", "id,display_name,avatar_url,bio".to_string()),
            ])
            .header("Prefer", "return=representation")
            .json(update);
        let rows: Vec<ProfileRow> = self.send_json(request).await?;
        rows.into_iter()
            .next()
            .map(Profile::from)
            .ok_or_else(|| GatewayError::NotFound(format!("profile {user}")))
    }

    #[instrument(skip(self))]
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), GatewayError> {
        let body = json!({ "id": bucket, "name": bucket, "public": true });
        let request = self
            .inner
            .client
            .post(self.url("storage/v1/bucket"))
            .json(&body);

        match self.send(request).await {
            Ok(_) | Err(GatewayError::Conflict(_)) => Ok(()),
            // Storage reports an existing bucket as a 400 with a "Duplicate" error
            Err(GatewayError::Status { status: 400, message })
                if message.to_lowercase().contains("already exists")
                    || message.to_lowercase().contains("duplicate") =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    async fn upload_object(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<(), GatewayError> {
        let request = self
            .inner
            .client
            .post(self.url(&format!("storage/v1/object/{bucket}/{path}")))
            .header("Content-Type", content_type)
            .header("x-upsert", "true")
            .body(bytes);
        self.send(request).await.map(|_| ())
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        self.url(&format!("storage/v1/object/public/{bucket}/{path}"))
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Build a PostgREST `in.(...)` filter with every value quoted.
fn in_filter<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = values
        .map(|v| format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect();
    format!("in.({})", quoted.join(","))
}

/// Extract a readable message from a backend error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .ok()
        .and_then(|e| e.message.or(e.msg).or(e.error_description).or(e.error))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

// =============================================================================
// Wire types
// =============================================================================

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    msg: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: Option<String>,
    user: Option<AuthUser>,
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProductRow {
    id: String,
    name: String,
    #[serde(default)]
    vendor: Option<String>,
    #[serde(default)]
    seller_id: Option<String>,
    price: i64,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

impl ProductRow {
    fn into_product(self, currency: CurrencyCode) -> Product {
        Product {
            id: ProductId::new(self.id),
            name: self.name,
            vendor: self.vendor.unwrap_or_default(),
            seller_id: self.seller_id.map(UserId::new),
            price: Price::new(self.price, currency),
            image_url: self.image_url,
            category: self.category.unwrap_or_default(),
            description: self.description,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct NewProductRow<'a> {
    name: &'a str,
    vendor: &'a str,
    seller_id: &'a str,
    price: i64,
    image_url: Option<&'a str>,
    category: &'a str,
    description: Option<&'a str>,
}

impl<'a> From<&'a NewProduct> for NewProductRow<'a> {
    fn from(product: &'a NewProduct) -> Self {
        Self {
            name: &product.name,
            vendor: &product.vendor,
            seller_id: product.seller_id.as_str(),
            price: product.price.amount,
            image_url: product.image_url.as_deref(),
            category: &product.category,
            description: product.description.as_deref(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CartRow {
    quantity: i64,
    product: Option<ProductRow>,
}

#[derive(Debug, Deserialize)]
struct FavoriteRow {
    product_id: String,
}

#[derive(Debug, Deserialize)]
struct SaleRow {
    id: serde_json::Value,
    buyer_id: String,
    product_id: String,
    quantity: u32,
    created_at: DateTime<Utc>,
}

impl From<SaleRow> for SaleRecord {
    fn from(row: SaleRow) -> Self {
        Self {
            id: SaleId::new(json_id(row.id)),
            buyer_id: UserId::new(row.buyer_id),
            product_id: ProductId::new(row.product_id),
            quantity: row.quantity,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommentRow {
    id: serde_json::Value,
    author_id: String,
    product_id: String,
    text: String,
    created_at: DateTime<Utc>,
}

impl From<CommentRow> for CommentRecord {
    fn from(row: CommentRow) -> Self {
        Self {
            id: CommentId::new(json_id(row.id)),
            author_id: UserId::new(row.author_id),
            product_id: ProductId::new(row.product_id),
            text: row.text,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProfileRow {
    id: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    avatar_url: Option<String>,
    #[serde(default)]
    bio: Option<String>,
}

impl From<ProfileRow> for Profile {
    fn from(row: ProfileRow) -> Self {
        Self {
            user_id: UserId::new(row.id),
            display_name: row.display_name.unwrap_or_default(),
            avatar_url: row.avatar_url,
            bio: row.bio,
        }
    }
}

/// Row ids may be serial integers or UUID strings depending on the table.
fn json_id(value: serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}
