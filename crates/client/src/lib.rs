//! Komorebi client state layer.
//!
//! Cart, favorites and notification state for the Komorebi snacks marketplace,
//! kept locally and reconciled with a Supabase backend.
//!
//! # Architecture
//!
//! - [`state::AppState`] - dependency-injected container for every store
//! - [`cart`] - local-first cart with per-item sync status
//! - [`outbox`] / [`sync`] - durable queue of cart writes and its worker
//! - [`favorites`] - remote-confirmed favorites
//! - [`notifications`] - feed aggregated from sales and comments
//! - [`gateway`] - remote backend trait, HTTP client and in-memory double
//! - [`persistence`] - local JSON snapshots

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod auth;
pub mod cart;
pub mod config;
pub mod error;
pub mod favorites;
pub mod gateway;
pub mod notifications;
pub mod outbox;
pub mod persistence;
pub mod pricing;
pub mod services;
pub mod state;
pub mod sync;

pub use auth::{AuthError, AuthState, SessionUser};
pub use cart::{CartItem, CartStore};
pub use config::{KomorebiConfig, StorePolicies};
pub use error::{ClientError, Result};
pub use favorites::FavoritesStore;
pub use gateway::{GatewayError, InMemoryGateway, RemoteGateway, SupabaseClient};
pub use notifications::{NotificationCenter, NotificationEntry, NotificationEvent};
pub use outbox::{CartMutation, DrainReport, Outbox, OutboxEntry};
pub use pricing::CartTotals;
pub use state::AppState;
pub use sync::{SyncWorker, spawn_sync_worker};
