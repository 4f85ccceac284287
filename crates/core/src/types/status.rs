//! Sync status for locally-first state.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether the latest local mutation of a cart item has reached the remote
/// store.
///
/// ```text
///            enqueue              delivered(op)
///  Synced ───────────► Pending ─────────────────► Synced
///                        │ ▲
///       abandoned(op)    │ │ enqueue
///                        ▼ │
///                       Failed
/// ```
///
/// A delivery or abandonment only applies when it refers to the operation the
/// item is currently waiting on; a newer mutation always wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncStatus {
    /// Local and remote agree.
    #[default]
    Synced,
    /// A remote write is queued in the outbox.
    Pending {
        /// Outbox entry carrying the write.
        op: Uuid,
    },
    /// The remote write was abandoned after exhausting retries.
    Failed {
        /// Last error reported by the remote store.
        reason: String,
    },
}

impl SyncStatus {
    /// Returns `true` if local state is confirmed remotely.
    #[must_use]
    pub const fn is_synced(&self) -> bool {
        matches!(self, Self::Synced)
    }

    /// Returns `true` if this status is waiting on the given outbox entry.
    #[must_use]
    pub fn is_waiting_on(&self, id: Uuid) -> bool {
        matches!(self, Self::Pending { op } if *op == id)
    }
}

impl std::fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Synced => write!(f, "synced"),
            Self::Pending { .. } => write!(f, "pending"),
            Self::Failed { .. } => write!(f, "failed"),
        }
    }
}
