//! Komorebi Core - Shared domain types.
//!
//! This crate provides the types shared by every Komorebi component:
//! - `client` - Client-side state layer (cart, favorites, notifications, sync)
//! - `cli` - Command-line harness over the client state
//!
//! # Architecture
//!
//! The core crate contains only types and pure validation - no I/O, no HTTP
//! clients, no persistence. This keeps it lightweight and allows it to be
//! used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Type-safe IDs, prices, emails, products, records and sync statuses

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
