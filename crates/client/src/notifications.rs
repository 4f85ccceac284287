//! Seller notification feed built from sales and comments.
//!
//! There is no notifications table. The feed is recomputed from the seller's
//! sales and comment records on every refresh by the pure [`aggregate`]
//! function; only the read state is stored locally, keyed by event id. Ids are
//! derived from the underlying record ids, so read state survives
//! re-aggregation.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use komorebi_core::{CommentRecord, Product, ProductId, Profile, SaleRecord, UserId};
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::NotificationPolicy;
use crate::error::Result;
use crate::gateway::RemoteGateway;
use crate::persistence::{LocalStore, keys, load_snapshot, save_snapshot};

/// Label used when a buyer or author has no profile.
pub const UNKNOWN_USER: &str = "Unknown user";

/// Label used when a product no longer exists.
pub const UNKNOWN_PRODUCT: &str = "Unknown product";

/// Most read flags kept locally. Flags for events outside the current feed
/// are evicted first once this is exceeded.
pub const MAX_READ_FLAGS: usize = 1000;

/// What happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    Sale { quantity: u32 },
    Comment,
}

/// One feed entry, synthesized from a sale or comment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    /// `sale:<sale id>` or `comment:<comment id>`.
    pub id: String,
    #[serde(flatten)]
    pub kind: NotificationKind,
    pub actor_id: UserId,
    pub product_id: ProductId,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

/// A feed entry with its local read state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationEntry {
    #[serde(flatten)]
    pub event: NotificationEvent,
    pub read: bool,
}

/// Raw records the feed is built from.
#[derive(Debug, Clone, Default)]
pub struct NotificationSources {
    pub sales: Vec<SaleRecord>,
    pub comments: Vec<CommentRecord>,
    pub profiles: Vec<Profile>,
    pub products: Vec<Product>,
}

/// Build the feed: newest first, at most `policy.limit` events.
///
/// Never fails. Dangling buyer, author or product ids resolve to
/// [`UNKNOWN_USER`] / [`UNKNOWN_PRODUCT`]. Events with equal timestamps are
/// ordered by id.
#[must_use]
pub fn aggregate(
    sources: &NotificationSources,
    policy: &NotificationPolicy,
) -> Vec<NotificationEvent> {
    let users: HashMap<&UserId, &str> = sources
        .profiles
        .iter()
        .map(|p| (&p.user_id, p.display_name.as_str()))
        .collect();
    let products: HashMap<&ProductId, &str> = sources
        .products
        .iter()
        .map(|p| (&p.id, p.name.as_str()))
        .collect();

    let user_name = |id: &UserId| users.get(id).copied().unwrap_or(UNKNOWN_USER);
    let product_name = |id: &ProductId| products.get(id).copied().unwrap_or(UNKNOWN_PRODUCT);

    let sales = sources.sales.iter().map(|sale| NotificationEvent {
        id: format!("sale:{}", sale.id),
        kind: NotificationKind::Sale {
            quantity: sale.quantity,
        },
        actor_id: sale.buyer_id.clone(),
        product_id: sale.product_id.clone(),
        message: format!(
            "{} bought {} of {}",
            user_name(&sale.buyer_id),
            sale.quantity,
            product_name(&sale.product_id)
        ),
        created_at: sale.created_at,
    });

    let comments = sources.comments.iter().map(|comment| NotificationEvent {
        id: format!("comment:{}", comment.id),
        kind: NotificationKind::Comment,
        actor_id: comment.author_id.clone(),
        product_id: comment.product_id.clone(),
        message: format!(
            "{} commented on {}: \"{}\"",
            user_name(&comment.author_id),
            product_name(&comment.product_id),
            preview(&comment.text, policy.comment_preview_chars)
        ),
        created_at: comment.created_at,
    });

    let mut events: Vec<NotificationEvent> = sales.chain(comments).collect();
    events.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    events.truncate(policy.limit);
    events
}

/// Cut text longer than `max_chars` characters and append `...`.
fn preview(text: &str, max_chars: usize) -> String {
    let text = text.trim();
    if text.chars().count() <= max_chars {
        return text.to_owned();
    }
    let mut cut: String = text.chars().take(max_chars).collect();
    cut.push_str("...");
    cut
}

/// Drop flags for events outside `feed` until at most `cap` remain. Returns
/// `true` if anything was dropped.
fn evict_read_flags(
    reads: &mut BTreeMap<String, bool>,
    feed: &[NotificationEvent],
    cap: usize,
) -> bool {
    let excess = reads.len().saturating_sub(cap);
    if excess == 0 {
        return false;
    }
    let live: BTreeSet<&str> = feed.iter().map(|e| e.id.as_str()).collect();
    let stale: Vec<String> = reads
        .keys()
        .filter(|id| !live.contains(id.as_str()))
        .take(excess)
        .cloned()
        .collect();
    for id in &stale {
        reads.remove(id);
    }
    !stale.is_empty()
}

#[derive(Default)]
struct CenterState {
    feed: Vec<NotificationEvent>,
    reads: BTreeMap<String, bool>,
}

/// Current feed plus persisted read state, cheaply cloneable.
#[derive(Clone)]
pub struct NotificationCenter {
    inner: Arc<CenterInner>,
}

struct CenterInner {
    state: Mutex<CenterState>,
    store: Arc<dyn LocalStore>,
    policy: NotificationPolicy,
}

impl NotificationCenter {
    /// Create the center, restoring read state from the last run.
    #[must_use]
    pub fn new(store: Arc<dyn LocalStore>, policy: NotificationPolicy) -> Self {
        let reads = load_snapshot(store.as_ref(), keys::NOTIFICATION_READS).unwrap_or_default();
        Self {
            inner: Arc::new(CenterInner {
                state: Mutex::new(CenterState {
                    feed: Vec::new(),
                    reads,
                }),
                store,
                policy,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, CenterState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, reads: &BTreeMap<String, bool>) {
        save_snapshot(self.inner.store.as_ref(), keys::NOTIFICATION_READS, reads);
    }

    #[must_use]
    pub fn policy(&self) -> &NotificationPolicy {
        &self.inner.policy
    }

    /// Replace the feed. Read state is kept for events that fall out of the
    /// feed, so an event that comes back is still read.
    pub fn replace_feed(&self, feed: Vec<NotificationEvent>) {
        let mut state = self.state();
        state.feed = feed;
        let CenterState { feed, reads } = &mut *state;
        if evict_read_flags(reads, feed, MAX_READ_FLAGS) {
            self.persist(reads);
        }
    }

    /// Rebuild the feed from a seller's listings, their sales and comments.
    ///
    /// # Errors
    ///
    /// Returns the gateway error if any fetch fails; the current feed is then
    /// kept.
    #[instrument(skip(self, gateway))]
    pub async fn refresh<G: RemoteGateway>(&self, gateway: &G, seller: &UserId) -> Result<usize> {
        let products = gateway.products_by_seller(seller).await?;
        if products.is_empty() {
            self.replace_feed(Vec::new());
            return Ok(0);
        }

        let product_ids: Vec<ProductId> = products.iter().map(|p| p.id.clone()).collect();
        let (sales, comments) = tokio::try_join!(
            gateway.fetch_sales(&product_ids),
            gateway.fetch_comments(&product_ids),
        )?;

        let actors: BTreeSet<UserId> = sales
            .iter()
            .map(|s| s.buyer_id.clone())
            .chain(comments.iter().map(|c| c.author_id.clone()))
            .collect();
        let actors: Vec<UserId> = actors.into_iter().collect();
        let profiles = if actors.is_empty() {
            Vec::new()
        } else {
            gateway.fetch_profiles(&actors).await?
        };

        let feed = aggregate(
            &NotificationSources {
                sales,
                comments,
                profiles,
                products,
            },
            &self.inner.policy,
        );
        let count = feed.len();
        tracing::debug!(count, "Refreshed notification feed");
        self.replace_feed(feed);
        Ok(count)
    }

    /// Mark one event read. Unknown ids are ignored.
    pub fn mark_read(&self, id: &str) {
        let mut state = self.state();
        if !state.feed.iter().any(|e| e.id == id) {
            return;
        }
        state.reads.insert(id.to_owned(), true);
        self.persist(&state.reads);
    }

    pub fn mark_all_read(&self) {
        let mut state = self.state();
        let ids: Vec<String> = state.feed.iter().map(|e| e.id.clone()).collect();
        for id in ids {
            state.reads.insert(id, true);
        }
        self.persist(&state.reads);
    }

    /// Feed entries with read state, newest first.
    #[must_use]
    pub fn entries(&self) -> Vec<NotificationEntry> {
        let state = self.state();
        state
            .feed
            .iter()
            .map(|event| NotificationEntry {
                event: event.clone(),
                read: state.reads.get(&event.id).copied().unwrap_or(false),
            })
            .collect()
    }

    #[must_use]
    pub fn unread_count(&self) -> usize {
        let state = self.state();
        state
            .feed
            .iter()
            .filter(|e| !state.reads.get(&e.id).copied().unwrap_or(false))
            .count()
    }

    /// Drop the feed and read state, e.g. on sign-out.
    pub fn reset(&self) {
        let mut state = self.state();
        *state = CenterState::default();
        self.persist(&state.reads);
    }
}

impl std::fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationCenter")
            .field("unread", &self.unread_count())
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::TimeZone;
    use komorebi_core::{CommentId, CurrencyCode, Price, SaleId};

    use super::*;
    use crate::gateway::InMemoryGateway;
    use crate::persistence::MemoryStore;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 12, minute, 0).unwrap()
    }

    fn sale(id: &str, minute: u32) -> SaleRecord {
        SaleRecord {
            id: SaleId::new(id),
            buyer_id: UserId::new("buyer"),
            product_id: ProductId::new("p1"),
            quantity: 2,
            created_at: at(minute),
        }
    }

    fn comment(id: &str, minute: u32, text: &str) -> CommentRecord {
        CommentRecord {
            id: CommentId::new(id),
            author_id: UserId::new("author"),
            product_id: ProductId::new("p1"),
            text: text.to_string(),
            created_at: at(minute),
        }
    }

    fn product(id: &str, seller: &str) -> Product {
        Product {
            id: ProductId::new(id),
            name: "Matcha KitKat".to_string(),
            vendor: "Hana".to_string(),
            seller_id: Some(UserId::new(seller)),
            price: Price::new(600, CurrencyCode::JPY),
            image_url: None,
            category: "sweets".to_string(),
            description: None,
            created_at: None,
        }
    }

    fn profile(id: &str, name: &str) -> Profile {
        Profile {
            user_id: UserId::new(id),
            display_name: name.to_string(),
            avatar_url: None,
            bio: None,
        }
    }

    #[test]
    fn test_feed_is_newest_first_regardless_of_input_order() {
        let sources = NotificationSources {
            sales: vec![sale("s1", 1), sale("s2", 2)],
            comments: vec![comment("c1", 3, "Tasty")],
            ..Default::default()
        };
        let feed = aggregate(&sources, &NotificationPolicy::default());
        let ids: Vec<_> = feed.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["comment:c1", "sale:s2", "sale:s1"]);

        let reversed = NotificationSources {
            sales: vec![sale("s2", 2), sale("s1", 1)],
            ..sources
        };
        assert_eq!(aggregate(&reversed, &NotificationPolicy::default()), feed);
    }

    #[test]
    fn test_feed_is_capped() {
        let sources = NotificationSources {
            sales: (0..15).map(|i| sale(&format!("s{i}"), i)).collect(),
            comments: (0..15).map(|i| comment(&format!("c{i}"), 30 + i, "hi")).collect(),
            ..Default::default()
        };
        let policy = NotificationPolicy::default();
        let feed = aggregate(&sources, &policy);
        assert_eq!(feed.len(), policy.limit);
        assert_eq!(feed[0].id, "comment:c14");
    }

    #[test]
    fn test_dangling_references_use_placeholders() {
        let sources = NotificationSources {
            sales: vec![sale("s1", 1)],
            ..Default::default()
        };
        let feed = aggregate(&sources, &NotificationPolicy::default());
        assert_eq!(feed[0].message, "Unknown user bought 2 of Unknown product");
    }

    #[test]
    fn test_resolved_names_and_truncation() {
        let long = "a".repeat(60);
        let sources = NotificationSources {
            comments: vec![comment("c1", 1, &long)],
            profiles: vec![profile("author", "Kenji")],
            products: vec![product("p1", "seller")],
            ..Default::default()
        };
        let feed = aggregate(&sources, &NotificationPolicy::default());
        let expected = format!("Kenji commented on Matcha KitKat: \"{}...\"", "a".repeat(50));
        assert_eq!(feed[0].message, expected);
        assert_eq!(feed[0].kind, NotificationKind::Comment);
    }

    #[test]
    fn test_short_comment_is_not_truncated() {
        assert_eq!(preview("おいしい!", 50), "おいしい!");
        assert_eq!(preview("おいしい!", 3), "おいし...");
    }

    #[test]
    fn test_read_state_survives_reaggregation() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        let sources = NotificationSources {
            sales: vec![sale("s1", 1), sale("s2", 2)],
            ..Default::default()
        };
        let policy = NotificationPolicy::default();

        let center = NotificationCenter::new(Arc::clone(&store), policy);
        center.replace_feed(aggregate(&sources, &policy));
        center.mark_read("sale:s1");
        assert_eq!(center.unread_count(), 1);

        let restarted = NotificationCenter::new(store, policy);
        restarted.replace_feed(aggregate(&sources, &policy));
        let entries = restarted.entries();
        assert!(entries.iter().any(|e| e.event.id == "sale:s1" && e.read));
        assert_eq!(restarted.unread_count(), 1);

        restarted.mark_all_read();
        assert_eq!(restarted.unread_count(), 0);
    }

    #[test]
    fn test_read_state_kept_for_events_outside_feed() {
        let policy = NotificationPolicy {
            limit: 1,
            ..NotificationPolicy::default()
        };
        let center = NotificationCenter::new(Arc::new(MemoryStore::new()), policy);
        let older = NotificationSources {
            sales: vec![sale("s1", 1)],
            ..Default::default()
        };
        center.replace_feed(aggregate(&older, &policy));
        center.mark_read("sale:s1");

        let newer = NotificationSources {
            sales: vec![sale("s1", 1), sale("s2", 2)],
            ..Default::default()
        };
        center.replace_feed(aggregate(&newer, &policy));
        assert_eq!(center.entries()[0].event.id, "sale:s2");
        assert_eq!(center.unread_count(), 1);

        center.replace_feed(aggregate(&older, &policy));
        let entries = center.entries();
        assert_eq!(entries[0].event.id, "sale:s1");
        assert!(entries[0].read);
    }

    #[test]
    fn test_empty_feed_keeps_read_state() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        let policy = NotificationPolicy::default();
        let sources = NotificationSources {
            sales: vec![sale("s1", 1)],
            ..Default::default()
        };
        let center = NotificationCenter::new(Arc::clone(&store), policy);
        center.replace_feed(aggregate(&sources, &policy));
        center.mark_read("sale:s1");

        center.replace_feed(Vec::new());
        let restarted = NotificationCenter::new(store, policy);
        restarted.replace_feed(aggregate(&sources, &policy));
        assert_eq!(restarted.unread_count(), 0);
    }

    #[test]
    fn test_read_flag_eviction_spares_feed() {
        let policy = NotificationPolicy::default();
        let feed = aggregate(
            &NotificationSources {
                sales: vec![sale("s9", 9)],
                ..Default::default()
            },
            &policy,
        );
        let mut reads: BTreeMap<String, bool> = ["sale:s1", "sale:s2", "sale:s9"]
            .into_iter()
            .map(|id| (id.to_owned(), true))
            .collect();

        assert!(!evict_read_flags(&mut reads, &feed, 3));
        assert!(evict_read_flags(&mut reads, &feed, 1));
        assert_eq!(reads.keys().collect::<Vec<_>>(), vec!["sale:s9"]);
    }

    #[test]
    fn test_mark_read_ignores_unknown_ids() {
        let center = NotificationCenter::new(
            Arc::new(MemoryStore::new()),
            NotificationPolicy::default(),
        );
        center.mark_read("sale:missing");
        assert!(center.entries().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_from_gateway() {
        let gateway = InMemoryGateway::new();
        let seller = UserId::new("seller");
        gateway.seed_product(product("p1", "seller"));
        gateway.seed_profile(profile("buyer", "Aiko"));
        gateway.seed_sale(sale("s1", 5));
        gateway.seed_comment(comment("c1", 6, "Love it"));

        let center = NotificationCenter::new(
            Arc::new(MemoryStore::new()),
            NotificationPolicy::default(),
        );
        let count = center.refresh(&gateway, &seller).await.unwrap();
        assert_eq!(count, 2);

        let entries = center.entries();
        assert_eq!(
            entries[0].event.message,
            "Unknown user commented on Matcha KitKat: \"Love it\""
        );
        assert_eq!(entries[1].event.message, "Aiko bought 2 of Matcha KitKat");
    }

    #[tokio::test]
    async fn test_failed_refresh_keeps_feed() {
        let gateway = InMemoryGateway::new();
        gateway.seed_product(product("p1", "seller"));
        gateway.seed_sale(sale("s1", 5));
        let center = NotificationCenter::new(
            Arc::new(MemoryStore::new()),
            NotificationPolicy::default(),
        );
        center.refresh(&gateway, &UserId::new("seller")).await.unwrap();

        gateway.set_offline(true);
        assert!(center.refresh(&gateway, &UserId::new("seller")).await.is_err());
        assert_eq!(center.entries().len(), 1);
    }
}
