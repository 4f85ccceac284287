//! Local persistence for store snapshots.
//!
//! Every store writes a JSON snapshot of its full state under a fixed key after
//! each mutation and reads it once at initialization. Snapshots are advisory:
//! the remote store is the system of record, so any read failure degrades to
//! "no snapshot" instead of an error.
//!
//! # Keys
//!
//! - [`keys::CART`] - cart items and owner
//! - [`keys::FAVORITES`] - favorited products
//! - [`keys::NOTIFICATION_READS`] - notification read state
//! - [`keys::OUTBOX`] - pending remote mutations

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Fixed snapshot keys.
pub mod keys {
    /// Cart snapshot.
    pub const CART: &str = "komorebi.cart";

    /// Favorites snapshot.
    pub const FAVORITES: &str = "komorebi.favorites";

    /// Notification read-state map.
    pub const NOTIFICATION_READS: &str = "komorebi.notifications.read";

    /// Outbox entries.
    pub const OUTBOX: &str = "komorebi.outbox";
}

/// Errors from a [`LocalStore`] backend.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Filesystem operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Key contains characters the backend cannot store.
    #[error("invalid key: {0}")]
    InvalidKey(String),
}

/// A synchronous string key-value store on the device.
pub trait LocalStore: Send + Sync {
    /// Read the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, PersistenceError>;

    /// Store `value` under `key`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn set(&self, key: &str, value: &str) -> Result<(), PersistenceError>;

    /// Delete the value under `key`. Missing keys are not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be written.
    fn remove(&self, key: &str) -> Result<(), PersistenceError>;
}

/// Load a snapshot, treating every failure as "no snapshot".
pub fn load_snapshot<T: DeserializeOwned>(store: &dyn LocalStore, key: &str) -> Option<T> {
    let raw = match store.get(key) {
        Ok(Some(raw)) => raw,
        Ok(None) => return None,
        Err(e) => {
            tracing::warn!(key, error = %e, "Failed to read local snapshot");
            return None;
        }
    };

    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "Discarding unreadable local snapshot");
            None
        }
    }
}

/// Write a snapshot. Failures are logged and never surface to the caller.
pub fn save_snapshot<T: Serialize + ?Sized>(store: &dyn LocalStore, key: &str, value: &T) {
    let result = serde_json::to_string(value)
        .map_err(PersistenceError::from)
        .and_then(|json| store.set(key, &json));

    if let Err(e) = result {
        tracing::warn!(key, error = %e, "Failed to write local snapshot");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_roundtrip() {
        let store = MemoryStore::new();
        save_snapshot(&store, "k", &vec![1, 2, 3]);
        let loaded: Option<Vec<i32>> = load_snapshot(&store, "k");
        assert_eq!(loaded, Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_corrupt_snapshot_reads_as_none() {
        let store = MemoryStore::new();
        store.set("k", "{not json").unwrap();
        let loaded: Option<Vec<i32>> = load_snapshot(&store, "k");
        assert!(loaded.is_none());
    }

    #[test]
    fn test_missing_snapshot_reads_as_none() {
        let store = MemoryStore::new();
        let loaded: Option<String> = load_snapshot(&store, keys::CART);
        assert!(loaded.is_none());
    }
}
