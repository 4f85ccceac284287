//! Store snapshots on disk surviving a restart of the client.

#![allow(clippy::unwrap_used)]

use std::fs;

use komorebi_client::persistence::keys;
use komorebi_core::{ProductId, SyncStatus};
use komorebi_integration_tests::{TestApp, listed_by, snack};

fn p(id: &str) -> ProductId {
    ProductId::new(id)
}

#[tokio::test]
async fn test_guest_cart_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = komorebi_client::InMemoryGateway::new();

    {
        let app = TestApp::on_disk(gateway.clone(), dir.path());
        app.state.cart().add_item(snack("senbei", 200));
        app.state.cart().set_quantity(&p("senbei"), 3);
    }

    let app = TestApp::on_disk(gateway, dir.path());
    assert_eq!(app.state.cart().quantity_of(&p("senbei")), Some(3));
    assert_eq!(app.state.cart().subtotal().amount, 600);
}

#[tokio::test]
async fn test_queued_writes_survive_restart_and_deliver() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = komorebi_client::InMemoryGateway::new();

    let user = {
        let app = TestApp::on_disk(gateway.clone(), dir.path());
        let user = app.sign_up("hana@komorebi.jp").await;
        gateway.set_offline(true);
        app.state.cart().add_item_with_sync(snack("senbei", 200));
        app.state.cart().add_item_with_sync(snack("pocky", 180));
        app.state.sync_now().await;
        user
    };
    gateway.set_offline(false);

    let app = TestApp::on_disk(gateway.clone(), dir.path());
    assert_eq!(app.state.outbox().len(), 2);
    assert_eq!(app.state.outbox().pending()[0].attempts, 1);
    assert!(
        app.state
            .cart()
            .items()
            .iter()
            .all(|item| matches!(item.sync, SyncStatus::Pending { .. }))
    );

    // Signing in again delivers the restored writes before the remote load
    assert_eq!(app.sign_in("hana@komorebi.jp").await, user);
    assert!(app.state.outbox().is_empty());

    let mut rows = gateway.cart_rows(&user);
    rows.sort();
    assert_eq!(rows, vec![(p("pocky"), 1), (p("senbei"), 1)]);
    assert_eq!(app.state.cart().owner(), Some(user));
    assert!(app.state.cart().unsynced_items().is_empty());
}

#[tokio::test]
async fn test_restart_without_sign_in_sends_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = komorebi_client::InMemoryGateway::new();

    let user = {
        let app = TestApp::on_disk(gateway.clone(), dir.path());
        let user = app.sign_up("hana@komorebi.jp").await;
        gateway.set_offline(true);
        app.state.cart().add_item_with_sync(snack("senbei", 200));
        app.state.sync_now().await;
        user
    };
    gateway.set_offline(false);
    gateway.set_session(None);

    let app = TestApp::on_disk(gateway.clone(), dir.path());
    assert_eq!(app.state.cart().owner(), None);
    let calls = gateway.call_count();

    app.state.cart().add_item_with_sync(snack("pocky", 180));
    app.state.cart().remove_item_with_sync(&p("senbei"));
    assert_eq!(app.state.outbox().len(), 1);
    assert_eq!(app.state.cart().quantity_of(&p("pocky")), Some(1));

    app.state.outbox().retry_now();
    let report = app.state.sync_now().await;
    assert!(report.delivered.is_empty());
    assert_eq!(report.remaining, 1);
    assert_eq!(gateway.call_count(), calls);
    assert!(gateway.cart_rows(&user).is_empty());
}

#[tokio::test]
async fn test_favorites_and_read_state_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = komorebi_client::InMemoryGateway::new();

    let (seller, event_id) = {
        let app = TestApp::on_disk(gateway.clone(), dir.path());
        let seller = app.sign_up("hana@komorebi.jp").await;
        gateway.seed_product(listed_by(&seller, "yokan", "Chestnut Yokan", 900));
        gateway.seed_comment(komorebi_core::CommentRecord {
            id: komorebi_core::CommentId::new("c1"),
            author_id: seller.clone(),
            product_id: p("yokan"),
            text: "Restocked".to_string(),
            created_at: komorebi_integration_tests::at(0),
        });

        app.state.toggle_favorite(snack("senbei", 200)).await.unwrap();
        app.state.refresh_notifications().await.unwrap();
        let id = app.state.notifications().entries()[0].event.id.clone();
        app.state.notifications().mark_read(&id);
        (seller, id)
    };

    let app = TestApp::on_disk(gateway, dir.path());
    assert!(app.state.favorites().is_favorite(&p("senbei")));

    // The feed itself is rebuilt remotely; read flags come from disk
    app.sign_in("hana@komorebi.jp").await;
    assert_eq!(app.state.require_user().unwrap().user_id, seller);
    let entries = app.state.notifications().entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].event.id, event_id);
    assert!(entries[0].read);
}

#[tokio::test]
async fn test_corrupt_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join(format!("{}.json", keys::CART)), "{not json").unwrap();
    fs::write(dir.path().join(format!("{}.json", keys::OUTBOX)), "[1, 2").unwrap();
    fs::write(dir.path().join(format!("{}.json", keys::FAVORITES)), "null").unwrap();

    let app = TestApp::on_disk(komorebi_client::InMemoryGateway::new(), dir.path());
    assert!(app.state.cart().is_empty());
    assert!(app.state.outbox().is_empty());
    assert!(app.state.favorites().is_empty());

    // The store stays writable after discarding the bad snapshot
    app.state.cart().add_item(snack("senbei", 200));
    let raw = fs::read_to_string(dir.path().join(format!("{}.json", keys::CART))).unwrap();
    assert!(raw.contains("senbei"));
}

#[tokio::test]
async fn test_sign_out_wipes_user_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let gateway = komorebi_client::InMemoryGateway::new();

    {
        let app = TestApp::on_disk(gateway.clone(), dir.path());
        app.sign_up("hana@komorebi.jp").await;
        app.state.cart().add_item_with_sync(snack("senbei", 200));
        app.state.toggle_favorite(snack("senbei", 200)).await.unwrap();
        app.state.sign_out().await;
    }

    let app = TestApp::on_disk(gateway, dir.path());
    assert!(app.state.cart().is_empty());
    assert!(app.state.cart().owner().is_none());
    assert!(app.state.favorites().is_empty());
    assert!(app.state.outbox().is_empty());
}
