//! Cart API behavior over HTTP.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use reqwest::{Method, StatusCode};

use tierline_core::api::{AddItemRequest, UpdateItemRequest};
use tierline_core::cart::LineKey;
use tierline_core::{Money, ProductId, Quantity, VariantId};
use tierline_integration_tests::TestApp;

fn add(product: &str, variant: Option<&str>, quantity: u32) -> AddItemRequest {
    AddItemRequest {
        product_id: ProductId::new(product),
        variant_id: variant.map(VariantId::new),
        quantity: Quantity::new(quantity).unwrap(),
    }
}

fn edit(quantity: &str, commit: bool) -> UpdateItemRequest {
    UpdateItemRequest {
        quantity: quantity.to_owned(),
        commit,
    }
}

#[tokio::test]
async fn test_new_shopper_has_empty_cart() {
    let app = TestApp::spawn().await;
    let cart = app.shopper().api.cart().await.unwrap();

    assert!(cart.items.is_empty());
    assert_eq!(cart.summary.subtotal, Money::ZERO);
    assert_eq!(cart.summary.item_count, 0);
    // The flat fee applies at any subtotal up to the threshold, zero included.
    assert_eq!(cart.summary.shipping, Money::from_cents(1500));
    assert_eq!(cart.summary.total, Money::from_cents(1500));
}

#[tokio::test]
async fn test_same_item_added_twice_is_one_line() {
    let app = TestApp::spawn().await;
    let shopper = app.shopper();

    shopper.api.add_item(&add("logo-tee", Some("m"), 2)).await.unwrap();
    let cart = shopper.api.add_item(&add("logo-tee", Some("m"), 3)).await.unwrap();

    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].id, "logo-tee:m");
    assert_eq!(cart.items[0].quantity, 5);
    assert_eq!(cart.items[0].unit_price, Money::from_cents(2000));
    // 100.00 is not above the free-shipping threshold.
    assert_eq!(cart.summary.subtotal, Money::from_cents(10_000));
    assert_eq!(cart.summary.shipping, Money::from_cents(1500));
    assert_eq!(cart.summary.total, Money::from_cents(11_500));
}

#[tokio::test]
async fn test_tier_price_follows_quantity() {
    let app = TestApp::spawn().await;
    let shopper = app.shopper();
    let tee = LineKey::new(ProductId::new("logo-tee"), Some(VariantId::new("m")));

    let cart = shopper.api.add_item(&add("logo-tee", Some("m"), 9)).await.unwrap();
    assert_eq!(cart.items[0].unit_price, Money::from_cents(2000));
    assert_eq!(cart.summary.discount, Money::ZERO);

    let cart = shopper.api.update_item(&tee, &edit("10", false)).await.unwrap();
    assert_eq!(cart.items[0].unit_price, Money::from_cents(1750));
    assert_eq!(cart.items[0].list_price, Money::from_cents(2000));
    assert_eq!(cart.summary.subtotal, Money::from_cents(17_500));
    assert_eq!(cart.summary.discount, Money::from_cents(2500));
    assert_eq!(cart.summary.shipping, Money::ZERO);
}

#[tokio::test]
async fn test_tier_price_overrides_variant_adjustment() {
    let app = TestApp::spawn().await;
    let cart = app
        .shopper()
        .api
        .add_item(&add("logo-tee", Some("xl"), 1))
        .await
        .unwrap();

    // The 1-9 tier price is absolute; the adjustment only shows in list price.
    assert_eq!(cart.items[0].unit_price, Money::from_cents(2000));
    assert_eq!(cart.items[0].list_price, Money::from_cents(2200));
    assert_eq!(cart.items[0].variant_title.as_deref(), Some("XL"));
}

#[tokio::test]
async fn test_quantity_field_edits() {
    let app = TestApp::spawn().await;
    let shopper = app.shopper();
    let mug = LineKey::new(ProductId::new("mug"), None);
    shopper.api.add_item(&add("mug", None, 4)).await.unwrap();

    // Typing garbage leaves the line alone.
    let cart = shopper.api.update_item(&mug, &edit("", false)).await.unwrap();
    assert_eq!(cart.items[0].quantity, 4);

    // Leaving the field with garbage reverts to one.
    let cart = shopper.api.update_item(&mug, &edit("abc", true)).await.unwrap();
    assert_eq!(cart.items[0].quantity, 1);

    let cart = shopper.api.update_item(&mug, &edit("0", false)).await.unwrap();
    assert!(cart.items.is_empty());
}

#[tokio::test]
async fn test_remove_and_clear() {
    let app = TestApp::spawn().await;
    let shopper = app.shopper();
    shopper.api.add_item(&add("mug", None, 1)).await.unwrap();
    shopper.api.add_item(&add("sticker", None, 50)).await.unwrap();

    let cart = shopper
        .api
        .remove_item(&LineKey::new(ProductId::new("mug"), None))
        .await
        .unwrap();
    assert_eq!(cart.items.len(), 1);
    assert_eq!(cart.items[0].unit_price, Money::from_cents(200));

    let response = shopper
        .request(Method::POST, "/api/cart/clear")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(shopper.api.cart().await.unwrap().items.is_empty());
}

#[tokio::test]
async fn test_carts_are_per_session() {
    let app = TestApp::spawn().await;
    let alice = app.shopper();
    let bob = app.shopper();

    alice.api.add_item(&add("mug", None, 1)).await.unwrap();

    assert_eq!(alice.api.cart().await.unwrap().items.len(), 1);
    assert!(bob.api.cart().await.unwrap().items.is_empty());
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let app = TestApp::spawn().await;
    let shopper = app.shopper();

    let response = shopper
        .request(Method::POST, "/api/cart/items")
        .json(&add("does-not-exist", None, 1))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = shopper
        .request(Method::POST, "/api/cart/items")
        .json(&add("logo-tee", Some("xxl"), 1))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_malformed_line_id_is_bad_request() {
    let app = TestApp::spawn().await;
    let response = app
        .shopper()
        .request(Method::DELETE, "/api/cart/items/:m")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
