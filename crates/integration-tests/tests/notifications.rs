//! Seller notification feed built from sales and comments on their listings.

#![allow(clippy::unwrap_used)]

use komorebi_client::ClientError;
use komorebi_client::notifications::{UNKNOWN_PRODUCT, UNKNOWN_USER};
use komorebi_core::{CommentId, CommentRecord, ProductId, SaleId, SaleRecord, UserId};
use komorebi_integration_tests::{TestApp, at, listed_by};

fn sale(id: &str, buyer: &UserId, product: &str, quantity: u32, minute: i64) -> SaleRecord {
    SaleRecord {
        id: SaleId::new(id),
        buyer_id: buyer.clone(),
        product_id: ProductId::new(product),
        quantity,
        created_at: at(minute),
    }
}

fn comment(id: &str, author: &UserId, product: &str, text: &str, minute: i64) -> CommentRecord {
    CommentRecord {
        id: CommentId::new(id),
        author_id: author.clone(),
        product_id: ProductId::new(product),
        text: text.to_string(),
        created_at: at(minute),
    }
}

/// Buyer `mei` and seller `hana`, signed in as the seller.
async fn marketplace() -> (TestApp, UserId, UserId) {
    let app = TestApp::new();
    let buyer = app.sign_up("mei@komorebi.jp").await;
    app.state.sign_out().await;
    let seller = app.sign_up("hana@komorebi.jp").await;

    app.gateway
        .seed_product(listed_by(&seller, "yokan", "Chestnut Yokan", 900));
    (app, seller, buyer)
}

#[tokio::test]
async fn test_refresh_requires_session() {
    let app = TestApp::new();
    let result = app.state.refresh_notifications().await;
    assert!(matches!(result, Err(ClientError::NotSignedIn)));
}

#[tokio::test]
async fn test_feed_merges_sales_and_comments_newest_first() {
    let (app, _seller, buyer) = marketplace().await;
    app.gateway.seed_sale(sale("s1", &buyer, "yokan", 2, 10));
    app.gateway
        .seed_comment(comment("c1", &buyer, "yokan", "So smooth!", 20));

    let count = app.state.refresh_notifications().await.unwrap();
    assert_eq!(count, 2);

    let messages: Vec<String> = app
        .state
        .notifications()
        .entries()
        .into_iter()
        .map(|e| e.event.message)
        .collect();
    assert_eq!(
        messages,
        vec![
            "mei commented on Chestnut Yokan: \"So smooth!\"".to_string(),
            "mei bought 2 of Chestnut Yokan".to_string(),
        ]
    );
    assert_eq!(app.state.notifications().unread_count(), 2);
}

#[tokio::test]
async fn test_feed_ignores_other_sellers_listings() {
    let (app, _seller, buyer) = marketplace().await;
    let other = UserId::new("someone-else");
    app.gateway
        .seed_product(listed_by(&other, "pocky", "Pocky", 180));
    app.gateway.seed_sale(sale("s1", &buyer, "pocky", 1, 5));

    assert_eq!(app.state.refresh_notifications().await.unwrap(), 0);
    assert!(app.state.notifications().entries().is_empty());
}

#[tokio::test]
async fn test_feed_is_capped_and_previews_long_comments() {
    let (app, _seller, buyer) = marketplace().await;
    let limit = app.state.policies().notifications.limit;
    let preview = app.state.policies().notifications.comment_preview_chars;

    for minute in 0..15 {
        app.gateway
            .seed_sale(sale(&format!("s{minute:02}"), &buyer, "yokan", 1, minute));
    }
    let long_text = "あ".repeat(preview + 10);
    app.gateway
        .seed_comment(comment("c1", &buyer, "yokan", &long_text, 100));

    app.state.refresh_notifications().await.unwrap();
    let entries = app.state.notifications().entries();
    assert_eq!(entries.len(), limit);

    let expected = format!("{}...", "あ".repeat(preview));
    assert!(entries[0].event.message.ends_with(&format!("\"{expected}\"")));
    // Oldest sales fall off the end
    assert!(entries.iter().all(|e| e.event.created_at >= at(6)));
}

#[tokio::test]
async fn test_unknown_actor_renders_placeholder() {
    let (app, _seller, _buyer) = marketplace().await;
    let ghost = UserId::new("deleted-account");
    app.gateway.seed_sale(sale("s1", &ghost, "yokan", 1, 1));

    app.state.refresh_notifications().await.unwrap();
    let entries = app.state.notifications().entries();
    assert_eq!(
        entries[0].event.message,
        format!("{UNKNOWN_USER} bought 1 of Chestnut Yokan")
    );
    assert!(!entries[0].event.message.contains(UNKNOWN_PRODUCT));
}

#[tokio::test]
async fn test_read_state_survives_refresh() {
    let (app, _seller, buyer) = marketplace().await;
    app.gateway.seed_sale(sale("s1", &buyer, "yokan", 1, 1));
    app.state.refresh_notifications().await.unwrap();

    let id = app.state.notifications().entries()[0].event.id.clone();
    app.state.notifications().mark_read(&id);
    app.state.notifications().mark_read("sale:does-not-exist");
    assert_eq!(app.state.notifications().unread_count(), 0);

    app.gateway
        .seed_comment(comment("c1", &buyer, "yokan", "Again please", 2));
    app.state.refresh_notifications().await.unwrap();

    let entries = app.state.notifications().entries();
    assert_eq!(entries.len(), 2);
    assert!(!entries[0].read);
    assert!(entries[1].read);

    app.state.notifications().mark_all_read();
    assert_eq!(app.state.notifications().unread_count(), 0);
}

#[tokio::test]
async fn test_failed_refresh_keeps_current_feed() {
    let (app, _seller, buyer) = marketplace().await;
    app.gateway.seed_sale(sale("s1", &buyer, "yokan", 1, 1));
    app.state.refresh_notifications().await.unwrap();

    app.gateway.set_offline(true);
    assert!(app.state.refresh_notifications().await.is_err());
    assert_eq!(app.state.notifications().entries().len(), 1);
}
