//! Favorites change locally only after the remote store confirms.

#![allow(clippy::unwrap_used)]

use komorebi_client::ClientError;
use komorebi_core::ProductId;
use komorebi_integration_tests::{TestApp, snack};

#[tokio::test]
async fn test_toggle_requires_session() {
    let app = TestApp::new();

    let result = app.state.toggle_favorite(snack("senbei", 200)).await;
    assert!(matches!(result, Err(ClientError::NotSignedIn)));
    assert!(app.state.favorites().is_empty());
}

#[tokio::test]
async fn test_toggle_adds_then_removes() {
    let app = TestApp::new();
    let user = app.sign_up("hana@komorebi.jp").await;

    assert!(app.state.toggle_favorite(snack("senbei", 200)).await.unwrap());
    assert!(app.state.favorites().is_favorite(&ProductId::new("senbei")));
    assert_eq!(app.gateway.favorite_rows(&user), vec![ProductId::new("senbei")]);

    assert!(!app.state.toggle_favorite(snack("senbei", 200)).await.unwrap());
    assert!(app.state.favorites().is_empty());
    assert!(app.gateway.favorite_rows(&user).is_empty());
}

#[tokio::test]
async fn test_failed_remote_write_leaves_favorites_unchanged() {
    let app = TestApp::new();
    let user = app.sign_up("hana@komorebi.jp").await;

    app.gateway.set_offline(true);
    let result = app.state.toggle_favorite(snack("senbei", 200)).await;
    assert!(result.is_err());
    assert!(!app.state.favorites().is_favorite(&ProductId::new("senbei")));

    app.gateway.set_offline(false);
    assert!(app.gateway.favorite_rows(&user).is_empty());
}

#[tokio::test]
async fn test_remote_duplicate_counts_as_favorited() {
    let app = TestApp::new();
    let user = app.sign_up("hana@komorebi.jp").await;

    // Favorited from another device since this session loaded
    app.gateway.seed_favorite(&user, &ProductId::new("senbei"));

    assert!(app.state.toggle_favorite(snack("senbei", 200)).await.unwrap());
    assert_eq!(app.state.favorites().len(), 1);
    assert_eq!(app.gateway.favorite_rows(&user).len(), 1);
}

#[tokio::test]
async fn test_sign_in_loads_remote_favorites_and_sign_out_clears() {
    let app = TestApp::new();
    let user = app.sign_up("hana@komorebi.jp").await;
    app.state.sign_out().await;

    app.gateway.seed_product(snack("senbei", 200));
    app.gateway.seed_product(snack("pocky", 180));
    app.gateway.seed_favorite(&user, &ProductId::new("pocky"));
    // Dangling row for a delisted product
    app.gateway.seed_favorite(&user, &ProductId::new("gone"));

    app.sign_in("hana@komorebi.jp").await;
    let ids: Vec<ProductId> = app
        .state
        .favorites()
        .list()
        .into_iter()
        .map(|p| p.id)
        .collect();
    assert_eq!(ids, vec![ProductId::new("pocky")]);

    app.state.sign_out().await;
    assert!(app.state.favorites().is_empty());
}
