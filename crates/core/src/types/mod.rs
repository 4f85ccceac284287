//! Core types for Komorebi.
//!
//! This module provides type-safe wrappers for the marketplace's domain concepts.

pub mod email;
pub mod id;
pub mod price;
pub mod product;
pub mod records;
pub mod status;

pub use email::{Email, EmailError};
pub use id::*;
pub use price::{CurrencyCode, Price};
pub use product::{Category, ListingDraft, ListingError, Product};
pub use records::{CommentRecord, Profile, ProfileUpdate, SaleRecord};
pub use status::SyncStatus;
