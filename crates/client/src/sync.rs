//! Background outbox delivery.
//!
//! The worker sleeps until the outbox signals a new entry, the signed-in
//! user's next retry time arrives, or the poll interval elapses, whichever
//! is first. Each wake-up runs one [`AppState::sync_now`] pass.

use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::gateway::RemoteGateway;
use crate::state::AppState;

/// Handle to a running sync worker.
#[derive(Debug)]
pub struct SyncWorker {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl SyncWorker {
    /// Stop the worker after its current pass and wait for it to exit.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            tracing::error!(error = %e, "Sync worker panicked");
        }
    }
}

/// Spawn the outbox sync worker on the current tokio runtime.
#[must_use]
pub fn spawn_sync_worker<G: RemoteGateway>(state: AppState<G>) -> SyncWorker {
    let (shutdown, mut stop) = watch::channel(false);

    let handle = tokio::spawn(async move {
        tracing::info!("Sync worker started");
        loop {
            let report = state.sync_now().await;
            if !report.is_empty() {
                tracing::debug!(
                    delivered = report.delivered.len(),
                    abandoned = report.abandoned.len(),
                    failed = report.failed.is_some(),
                    remaining = report.remaining,
                    "Sync pass finished"
                );
            }

            let wait = next_wait(&state);
            tokio::select! {
                () = state.outbox().notified() => {}
                () = tokio::time::sleep(wait) => {}
                _ = stop.changed() => break,
            }
            if *stop.borrow() {
                break;
            }
        }
        tracing::info!("Sync worker stopped");
    });

    SyncWorker { shutdown, handle }
}

/// Time until the session user's next entry is due, bounded by the poll
/// interval.
fn next_wait<G: RemoteGateway>(state: &AppState<G>) -> Duration {
    let poll = state.policies().retry.poll_interval;
    let due = state
        .auth()
        .current_user_id()
        .and_then(|user| state.outbox().next_due(&user));
    due.map_or(poll, |due| {
        (due - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
            .min(poll)
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use komorebi_core::{CurrencyCode, Price, Product, ProductId};
    use secrecy::SecretString;

    use super::*;
    use crate::config::{RetryPolicy, StorePolicies};
    use crate::gateway::InMemoryGateway;
    use crate::persistence::MemoryStore;

    fn product(id: &str) -> Product {
        Product {
            id: ProductId::new(id),
            name: format!("Snack {id}"),
            vendor: "Komorebi".to_string(),
            seller_id: None,
            price: Price::new(250, CurrencyCode::JPY),
            image_url: None,
            category: "sweets".to_string(),
            description: None,
            created_at: None,
        }
    }

    fn fast_policies() -> StorePolicies {
        StorePolicies {
            retry: RetryPolicy {
                max_attempts: 5,
                base_delay: Duration::from_millis(10),
                max_delay: Duration::from_millis(50),
                poll_interval: Duration::from_millis(20),
            },
            ..StorePolicies::default()
        }
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_worker_delivers_after_outage() {
        let gateway = InMemoryGateway::new();
        let state = AppState::new(gateway.clone(), Arc::new(MemoryStore::new()), fast_policies());
        let user = state
            .sign_up("mei@komorebi.jp", &SecretString::from("dorayaki"))
            .await
            .unwrap();

        gateway.set_offline(true);
        let worker = spawn_sync_worker(state.clone());
        state.cart().add_item_with_sync(product("p1"));
        state.cart().add_item_with_sync(product("p1"));

        wait_until(|| {
            state
                .outbox()
                .pending()
                .first()
                .is_some_and(|e| e.attempts >= 1)
        })
        .await;
        assert_eq!(state.cart().quantity_of(&ProductId::new("p1")), Some(2));

        gateway.set_offline(false);
        wait_until(|| state.outbox().is_empty()).await;
        wait_until(|| state.cart().unsynced_items().is_empty()).await;
        assert_eq!(
            gateway.cart_rows(&user.user_id),
            vec![(ProductId::new("p1"), 2)]
        );

        worker.shutdown().await;
    }
}
