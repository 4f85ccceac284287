//! Integration tests for the Komorebi client state layer.
//!
//! Every test drives a full [`AppState`] against the [`InMemoryGateway`], so no
//! backend or network is needed.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p komorebi-integration-tests
//! ```
//!
//! # Test Categories
//!
//! - `cart_sync` - optimistic cart writes, outbox delivery and retries
//! - `favorites` - remote-confirmed favorites
//! - `notifications` - seller feed aggregation and read state
//! - `persistence` - snapshots surviving a restart

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use komorebi_client::config::RetryPolicy;
use komorebi_client::persistence::{FileStore, LocalStore, MemoryStore};
use komorebi_client::{AppState, InMemoryGateway, StorePolicies};
use komorebi_core::{CurrencyCode, Price, Product, ProductId, UserId};
use secrecy::SecretString;

/// Password used for every fixture account.
pub const PASSWORD: &str = "onigiri-42";

/// A gateway plus the state wired to it.
pub struct TestApp {
    pub gateway: InMemoryGateway,
    pub state: AppState<InMemoryGateway>,
}

impl TestApp {
    /// Fresh app with in-memory snapshots.
    #[must_use]
    pub fn new() -> Self {
        Self::with_store(InMemoryGateway::new(), Arc::new(MemoryStore::new()))
    }

    /// App over an existing gateway and store, e.g. to simulate a restart.
    #[must_use]
    pub fn with_store(gateway: InMemoryGateway, store: Arc<dyn LocalStore>) -> Self {
        let state = AppState::new(gateway.clone(), store, fast_policies());
        Self { gateway, state }
    }

    /// App whose snapshots live in `dir`.
    ///
    /// # Panics
    ///
    /// Panics if the directory cannot be created.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn on_disk(gateway: InMemoryGateway, dir: &Path) -> Self {
        Self::with_store(gateway, Arc::new(FileStore::open(dir).unwrap()))
    }

    /// Register `email` and sign in as it.
    ///
    /// # Panics
    ///
    /// Panics if sign-up fails.
    #[allow(clippy::unwrap_used)]
    pub async fn sign_up(&self, email: &str) -> UserId {
        self.state
            .sign_up(email, &SecretString::from(PASSWORD))
            .await
            .unwrap()
            .user_id
    }

    /// Sign in to an existing fixture account.
    ///
    /// # Panics
    ///
    /// Panics if sign-in fails.
    #[allow(clippy::unwrap_used)]
    pub async fn sign_in(&self, email: &str) -> UserId {
        self.state
            .sign_in(email, &SecretString::from(PASSWORD))
            .await
            .unwrap()
            .user_id
    }
}

impl Default for TestApp {
    fn default() -> Self {
        Self::new()
    }
}

/// Policies with millisecond backoff so retry tests stay fast.
#[must_use]
pub fn fast_policies() -> StorePolicies {
    StorePolicies {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
            poll_interval: Duration::from_millis(10),
        },
        ..StorePolicies::default()
    }
}

/// A JPY snack with the given id and unit price.
#[must_use]
pub fn snack(id: &str, yen: i64) -> Product {
    Product {
        id: ProductId::new(id),
        name: format!("Snack {id}"),
        vendor: "Komorebi Sweets".to_string(),
        seller_id: None,
        price: Price::new(yen, CurrencyCode::JPY),
        image_url: None,
        category: "sweets".to_string(),
        description: None,
        created_at: Some(at(0)),
    }
}

/// A snack listed by `seller`.
#[must_use]
pub fn listed_by(seller: &UserId, id: &str, name: &str, yen: i64) -> Product {
    Product {
        name: name.to_string(),
        seller_id: Some(seller.clone()),
        ..snack(id, yen)
    }
}

/// A fixed instant, `minutes` after 2024-04-01 09:00 UTC.
///
/// # Panics
///
/// Never in practice; the base timestamp is valid.
#[must_use]
#[allow(clippy::unwrap_used)]
pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap() + chrono::Duration::minutes(minutes)
}

/// Poll `done` until it holds or a second passes.
///
/// # Panics
///
/// Panics if the condition never holds.
pub async fn wait_until(mut done: impl FnMut() -> bool) {
    for _ in 0..100 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}
