//! Durable queue of pending remote cart writes.
//!
//! Cart mutations made while signed in are applied locally first, then
//! enqueued here. A background task (see [`crate::sync`]) drains the queue
//! with exponential backoff.
//!
//! # Ordering
//!
//! A pass only delivers entries of the signed-in user, strictly in enqueue
//! order. A failing entry blocks the rest of the pass until it succeeds or is
//! abandoned, so a `Clear` is never overtaken by a later `Upsert` for the same
//! user. Entries restored for another user wait for that user's next session.
//!
//! # Coalescing
//!
//! At most one `Upsert`/`Remove` is queued per (user, product): enqueueing a
//! newer one drops the older entry and appends the new one at the tail. A
//! `Clear` drops every queued entry of its user.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use komorebi_core::{ProductId, UserId};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tokio::sync::futures::Notified;
use uuid::Uuid;

use crate::config::RetryPolicy;
use crate::error::record_sync_failure;
use crate::gateway::{GatewayError, RemoteGateway};
use crate::persistence::{LocalStore, keys, load_snapshot, save_snapshot};

/// A remote cart write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CartMutation {
    /// Set the remote quantity of one product.
    Upsert {
        user: UserId,
        product: ProductId,
        quantity: u32,
    },
    /// Delete one product row.
    Remove { user: UserId, product: ProductId },
    /// Delete every row of a user.
    Clear { user: UserId },
}

impl CartMutation {
    #[must_use]
    pub const fn user(&self) -> &UserId {
        match self {
            Self::Upsert { user, .. } | Self::Remove { user, .. } | Self::Clear { user } => user,
        }
    }

    /// Product this mutation targets, `None` for a whole-cart clear.
    #[must_use]
    pub const fn product(&self) -> Option<&ProductId> {
        match self {
            Self::Upsert { product, .. } | Self::Remove { product, .. } => Some(product),
            Self::Clear { .. } => None,
        }
    }

    /// Returns `true` if `newer`, once queued, makes this entry redundant.
    fn superseded_by(&self, newer: &Self) -> bool {
        if self.user() != newer.user() {
            return false;
        }
        match newer.product() {
            None => true,
            Some(product) => self.product() == Some(product),
        }
    }

    async fn apply<G: RemoteGateway>(&self, gateway: &G) -> Result<(), GatewayError> {
        match self {
            Self::Upsert {
                user,
                product,
                quantity,
            } => gateway.upsert_cart_item(user, product, *quantity).await,
            Self::Remove { user, product } => gateway.delete_cart_item(user, product).await,
            Self::Clear { user } => gateway.clear_cart(user).await,
        }
    }
}

impl std::fmt::Display for CartMutation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Upsert {
                product, quantity, ..
            } => write!(f, "upsert {product} x{quantity}"),
            Self::Remove { product, .. } => write!(f, "remove {product}"),
            Self::Clear { .. } => write!(f, "clear"),
        }
    }
}

/// A queued mutation with its delivery bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxEntry {
    pub id: Uuid,
    pub mutation: CartMutation,
    /// Failed delivery attempts so far.
    pub attempts: u32,
    pub enqueued_at: DateTime<Utc>,
    /// Earliest time the next attempt may run.
    pub next_attempt_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Outcome of one [`Outbox::drain_due`] pass.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Entries confirmed by the remote store.
    pub delivered: Vec<Uuid>,
    /// Entry that failed and was rescheduled, with its error.
    pub failed: Option<(Uuid, String)>,
    /// Entries dropped after exhausting retries, with their last error.
    pub abandoned: Vec<(Uuid, String)>,
    /// Entries still queued after the pass.
    pub remaining: usize,
}

impl DrainReport {
    /// Returns `true` if the pass changed nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty() && self.failed.is_none() && self.abandoned.is_empty()
    }
}

/// Durable FIFO of [`CartMutation`]s, cheaply cloneable.
#[derive(Clone)]
pub struct Outbox {
    inner: Arc<OutboxInner>,
}

struct OutboxInner {
    entries: Mutex<VecDeque<OutboxEntry>>,
    store: Arc<dyn LocalStore>,
    policy: RetryPolicy,
    notify: Notify,
    /// Serializes drain passes.
    draining: tokio::sync::Mutex<()>,
}

impl Outbox {
    /// Open the outbox, restoring any entries persisted by a previous run.
    #[must_use]
    pub fn open(store: Arc<dyn LocalStore>, policy: RetryPolicy) -> Self {
        let entries: VecDeque<OutboxEntry> =
            load_snapshot(store.as_ref(), keys::OUTBOX).unwrap_or_default();
        if !entries.is_empty() {
            tracing::info!(count = entries.len(), "Restored pending cart writes");
        }

        Self {
            inner: Arc::new(OutboxInner {
                entries: Mutex::new(entries),
                store,
                policy,
                notify: Notify::new(),
                draining: tokio::sync::Mutex::new(()),
            }),
        }
    }

    fn entries(&self) -> MutexGuard<'_, VecDeque<OutboxEntry>> {
        self.inner
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, entries: &VecDeque<OutboxEntry>) {
        save_snapshot(self.inner.store.as_ref(), keys::OUTBOX, entries);
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.inner.policy
    }

    /// Queue a mutation for delivery and wake the sync worker.
    pub fn enqueue(&self, mutation: CartMutation) -> Uuid {
        let now = Utc::now();
        let entry = OutboxEntry {
            id: Uuid::new_v4(),
            mutation,
            attempts: 0,
            enqueued_at: now,
            next_attempt_at: now,
            last_error: None,
        };
        let id = entry.id;

        {
            let mut entries = self.entries();
            let before = entries.len();
            entries.retain(|queued| !queued.mutation.superseded_by(&entry.mutation));
            let coalesced = before - entries.len();
            tracing::debug!(op = %id, mutation = %entry.mutation, coalesced, "Queued cart write");
            entries.push_back(entry);
            self.persist(&entries);
        }

        self.inner.notify.notify_one();
        id
    }

    /// Snapshot of the queued entries, head first.
    #[must_use]
    pub fn pending(&self) -> Vec<OutboxEntry> {
        self.entries().iter().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// When the first entry of `user` becomes due, if any is queued.
    #[must_use]
    pub fn next_due(&self, user: &UserId) -> Option<DateTime<Utc>> {
        self.entries()
            .iter()
            .find(|entry| entry.mutation.user() == user)
            .map(|entry| entry.next_attempt_at)
    }

    /// Make every queued entry due immediately.
    pub fn retry_now(&self) {
        let now = Utc::now();
        {
            let mut entries = self.entries();
            for entry in entries.iter_mut() {
                entry.next_attempt_at = now;
            }
            self.persist(&entries);
        }
        self.inner.notify.notify_one();
    }

    /// Drop every queued entry of a user, returning their ids.
    pub fn discard_user(&self, user: &UserId) -> Vec<Uuid> {
        let mut entries = self.entries();
        let dropped: Vec<Uuid> = entries
            .iter()
            .filter(|entry| entry.mutation.user() == user)
            .map(|entry| entry.id)
            .collect();
        if !dropped.is_empty() {
            entries.retain(|entry| entry.mutation.user() != user);
            self.persist(&entries);
        }
        dropped
    }

    /// Future resolved when a new entry is enqueued.
    pub fn notified(&self) -> Notified<'_> {
        self.inner.notify.notified()
    }

    /// Deliver every due entry of `session` in order, stopping at the first
    /// failure.
    ///
    /// Only the signed-in user's entries are sent; entries of other users stay
    /// queued until that user signs in again. A failed entry keeps its place
    /// with its attempt count incremented and `next_attempt_at` pushed back by
    /// the retry policy. Entries reaching `max_attempts`, or failing with an
    /// error a retry cannot fix, are abandoned. Only one pass runs at a time.
    #[tracing::instrument(skip(self, gateway), fields(queued = self.len()))]
    pub async fn drain_due<G: RemoteGateway>(
        &self,
        gateway: &G,
        session: &UserId,
        now: DateTime<Utc>,
    ) -> DrainReport {
        let _pass = self.inner.draining.lock().await;
        let mut report = DrainReport::default();

        loop {
            let head = {
                let entries = self.entries();
                match entries
                    .iter()
                    .find(|entry| entry.mutation.user() == session)
                {
                    Some(entry) if entry.next_attempt_at <= now => entry.clone(),
                    _ => break,
                }
            };

            let result = head.mutation.apply(gateway).await;

            let mut entries = self.entries();
            let position = entries.iter().position(|entry| entry.id == head.id);

            match result {
                Ok(()) => {
                    tracing::debug!(
                        op = %head.id,
                        mutation = %head.mutation,
                        "Delivered cart write"
                    );
                    if let Some(index) = position {
                        entries.remove(index);
                        self.persist(&entries);
                    }
                    report.delivered.push(head.id);
                }
                Err(e) => {
                    let message = e.to_string();
                    record_sync_failure(&head.id.to_string(), &message);
                    let attempts = head.attempts.saturating_add(1);
                    let retryable =
                        e.is_transient() || matches!(e, GatewayError::Unauthorized(_));

                    if !retryable || attempts >= self.inner.policy.max_attempts {
                        tracing::warn!(
                            op = %head.id,
                            mutation = %head.mutation,
                            attempts,
                            error = %e,
                            "Abandoning cart write"
                        );
                        if let Some(index) = position {
                            entries.remove(index);
                            self.persist(&entries);
                        }
                        report.abandoned.push((head.id, message));
                        // The queue moved on; keep draining.
                        continue;
                    }

                    let delay = self.inner.policy.backoff(attempts);
                    let next_attempt_at =
                        now + chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::zero());
                    tracing::info!(
                        op = %head.id,
                        attempts,
                        retry_in_ms = delay.as_millis(),
                        error = %e,
                        "Cart write failed, will retry"
                    );
                    if let Some(entry) = position.and_then(|index| entries.get_mut(index)) {
                        entry.attempts = attempts;
                        entry.next_attempt_at = next_attempt_at;
                        entry.last_error = Some(message.clone());
                        self.persist(&entries);
                    }
                    report.failed = Some((head.id, message));
                    break;
                }
            }
        }

        report.remaining = self.len();
        report
    }
}

impl std::fmt::Debug for Outbox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("queued", &self.len())
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}
