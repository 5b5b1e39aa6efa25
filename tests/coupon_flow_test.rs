//! Coupon validation and redemption through the HTTP surface: the ordered
//! eligibility checks, applicability filters, discount arithmetic, and the
//! usage-limit bookkeeping behind `apply`.

mod common;

use axum::http::{Method, StatusCode};
use common::{decimal_of, expect_status, TestApp};
use rust_decimal_macros::dec;
use scentrise_api::entities::coupon::CouponKind;
use scentrise_api::entities::product::FragranceFamily;
use sea_orm::Set;
use serde_json::json;
use uuid::Uuid;

#[tokio::test]
async fn percentage_coupon_discounts_applicable_total() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let token = app.token_for(customer, "customer");

    let product = app.seed_product("Oud Royale", dec!(1000), 10).await;
    app.seed_coupon(app.coupon_template("WELCOME10", CouponKind::Percentage, dec!(10)))
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/coupons/validate",
            Some(&token),
            Some(json!({
                "code": "welcome10",
                "cart_items": [{"product_id": product.id, "quantity": 2, "price": 1000}],
                "cart_total": 2000,
            })),
        )
        .await;

    let body = expect_status(response, StatusCode::OK).await;
    let discount = &body["data"];
    assert_eq!(discount["code"], "WELCOME10");
    assert_eq!(decimal_of(&discount["discount_amount"]), dec!(200));
    assert_eq!(discount["free_shipping"], false);
    assert_eq!(discount["applicable_items"], 1);
    assert_eq!(decimal_of(&discount["total_applicable_amount"]), dec!(2000));
}

#[tokio::test]
async fn validation_is_repeatable_without_apply() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let token = app.token_for(customer, "customer");

    let product = app.seed_product("Citrus Bloom", dec!(500), 10).await;
    app.seed_coupon(app.coupon_template("REPEAT", CouponKind::Percentage, dec!(20)))
        .await;

    let payload = json!({
        "code": "REPEAT",
        "cart_items": [{"product_id": product.id, "quantity": 1, "price": 500}],
        "cart_total": 500,
    });

    let first = app
        .request(Method::POST, "/api/coupons/validate", Some(&token), Some(payload.clone()))
        .await;
    let first_body = expect_status(first, StatusCode::OK).await;

    let second = app
        .request(Method::POST, "/api/coupons/validate", Some(&token), Some(payload))
        .await;
    let second_body = expect_status(second, StatusCode::OK).await;

    assert_eq!(first_body["data"], second_body["data"]);
}

#[tokio::test]
async fn minimum_order_amount_enforced() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let token = app.token_for(customer, "customer");

    let product = app.seed_product("Everyday Fresh", dec!(750), 10).await;
    let mut coupon = app.coupon_template("SAVE500", CouponKind::Fixed, dec!(500));
    coupon.minimum_order_amount = Set(dec!(2000));
    app.seed_coupon(coupon).await;

    let response = app
        .request(
            Method::POST,
            "/api/coupons/validate",
            Some(&token),
            Some(json!({
                "code": "SAVE500",
                "cart_items": [{"product_id": product.id, "quantity": 2, "price": 750}],
                "cart_total": 1500,
            })),
        )
        .await;

    let body = expect_status(response, StatusCode::BAD_REQUEST).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Minimum order amount of ₹2000 required"));
}

#[tokio::test]
async fn expired_and_inactive_coupons_rejected() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let token = app.token_for(customer, "customer");

    let product = app.seed_product("Amber Noir", dec!(600), 10).await;

    let mut expired = app.coupon_template("BYGONE", CouponKind::Fixed, dec!(50));
    expired.valid_from = Set(chrono::Utc::now() - chrono::Duration::days(60));
    expired.valid_until = Set(chrono::Utc::now() - chrono::Duration::days(30));
    app.seed_coupon(expired).await;

    let mut inactive = app.coupon_template("PAUSED", CouponKind::Fixed, dec!(50));
    inactive.is_active = Set(false);
    app.seed_coupon(inactive).await;

    let cart = json!([{"product_id": product.id, "quantity": 1, "price": 600}]);

    let response = app
        .request(
            Method::POST,
            "/api/coupons/validate",
            Some(&token),
            Some(json!({"code": "BYGONE", "cart_items": cart.clone(), "cart_total": 600})),
        )
        .await;
    let body = expect_status(response, StatusCode::BAD_REQUEST).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("expired or is not yet active"));

    // Inactive codes are indistinguishable from unknown ones
    let response = app
        .request(
            Method::POST,
            "/api/coupons/validate",
            Some(&token),
            Some(json!({"code": "PAUSED", "cart_items": cart, "cart_total": 600})),
        )
        .await;
    let body = expect_status(response, StatusCode::NOT_FOUND).await;
    assert!(body["message"].as_str().unwrap().contains("Invalid coupon code"));
}

#[tokio::test]
async fn first_time_user_restriction() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let token = app.token_for(customer, "customer");

    let product = app.seed_product("Vetiver Sky", dec!(900), 10).await;
    let address = app.seed_address(customer).await;

    let mut coupon = app.coupon_template("FIRSTBUY", CouponKind::Percentage, dec!(15));
    coupon.first_time_user = Set(true);
    app.seed_coupon(coupon).await;

    let cart = json!([{"product_id": product.id, "quantity": 1, "price": 900}]);

    // No orders yet: eligible
    let response = app
        .request(
            Method::POST,
            "/api/coupons/validate",
            Some(&token),
            Some(json!({"code": "FIRSTBUY", "cart_items": cart, "cart_total": 900})),
        )
        .await;
    expect_status(response, StatusCode::OK).await;

    // Place an order, then the same coupon must be rejected
    let order = app
        .request(
            Method::POST,
            "/api/orders",
            Some(&token),
            Some(json!({
                "items": [{"product_id": product.id, "qty": 1}],
                "address_id": address.id,
                "provider": "cod",
            })),
        )
        .await;
    expect_status(order, StatusCode::CREATED).await;

    let response = app
        .request(
            Method::POST,
            "/api/coupons/validate",
            Some(&token),
            Some(json!({"code": "FIRSTBUY", "cart_items": cart, "cart_total": 900})),
        )
        .await;
    let body = expect_status(response, StatusCode::BAD_REQUEST).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("only for first-time users"));
}

#[tokio::test]
async fn brand_filter_limits_applicable_total() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let token = app.token_for(customer, "customer");

    let eligible = app
        .seed_product_full("House Blend", "Maison Lumen", FragranceFamily::Floral, dec!(1200), 5)
        .await;
    let ineligible = app
        .seed_product_full("Other Blend", "Rival Parfums", FragranceFamily::Floral, dec!(800), 5)
        .await;

    let mut coupon = app.coupon_template("LUMEN20", CouponKind::Percentage, dec!(20));
    coupon.applicable_brands = Set(json!(["Maison Lumen"]));
    app.seed_coupon(coupon).await;

    let response = app
        .request(
            Method::POST,
            "/api/coupons/validate",
            Some(&token),
            Some(json!({
                "code": "LUMEN20",
                "cart_items": [
                    {"product_id": eligible.id, "quantity": 1, "price": 1200},
                    {"product_id": ineligible.id, "quantity": 1, "price": 800},
                ],
                "cart_total": 2000,
            })),
        )
        .await;

    let body = expect_status(response, StatusCode::OK).await;
    // Only the Maison Lumen line counts: 20% of 1200
    assert_eq!(decimal_of(&body["data"]["discount_amount"]), dec!(240));
    assert_eq!(body["data"]["applicable_items"], 1);

    // A cart with no eligible lines is rejected outright
    let response = app
        .request(
            Method::POST,
            "/api/coupons/validate",
            Some(&token),
            Some(json!({
                "code": "LUMEN20",
                "cart_items": [{"product_id": ineligible.id, "quantity": 1, "price": 800}],
                "cart_total": 800,
            })),
        )
        .await;
    let body = expect_status(response, StatusCode::BAD_REQUEST).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("No items in your cart are eligible"));
}

#[tokio::test]
async fn excluded_products_knock_lines_out() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let token = app.token_for(customer, "customer");

    let excluded = app.seed_product("Limited Edition", dec!(5000), 3).await;
    let normal = app.seed_product("Core Range", dec!(700), 10).await;

    let mut coupon = app.coupon_template("ALMOSTALL", CouponKind::Percentage, dec!(10));
    coupon.excluded_products = Set(json!([excluded.id.to_string()]));
    app.seed_coupon(coupon).await;

    let response = app
        .request(
            Method::POST,
            "/api/coupons/validate",
            Some(&token),
            Some(json!({
                "code": "ALMOSTALL",
                "cart_items": [
                    {"product_id": excluded.id, "quantity": 1, "price": 5000},
                    {"product_id": normal.id, "quantity": 1, "price": 700},
                ],
                "cart_total": 5700,
            })),
        )
        .await;

    let body = expect_status(response, StatusCode::OK).await;
    // 10% of the non-excluded 700 only
    assert_eq!(decimal_of(&body["data"]["discount_amount"]), dec!(70));
}

#[tokio::test]
async fn percentage_discount_capped_at_maximum() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let token = app.token_for(customer, "customer");

    let product = app.seed_product("Grand Cru", dec!(10000), 5).await;

    let mut coupon = app.coupon_template("BIGSPEND", CouponKind::Percentage, dec!(25));
    coupon.maximum_discount_amount = Set(Some(dec!(500)));
    app.seed_coupon(coupon).await;

    let response = app
        .request(
            Method::POST,
            "/api/coupons/validate",
            Some(&token),
            Some(json!({
                "code": "BIGSPEND",
                "cart_items": [{"product_id": product.id, "quantity": 1, "price": 10000}],
                "cart_total": 10000,
            })),
        )
        .await;

    let body = expect_status(response, StatusCode::OK).await;
    // 25% of 10000 would be 2500; the cap wins
    assert_eq!(decimal_of(&body["data"]["discount_amount"]), dec!(500));
}

#[tokio::test]
async fn free_shipping_coupon_sets_flag_only() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let token = app.token_for(customer, "customer");

    let product = app.seed_product("Weekend Mist", dec!(450), 10).await;
    app.seed_coupon(app.coupon_template("SHIPFREE", CouponKind::FreeShipping, dec!(0)))
        .await;

    let response = app
        .request(
            Method::POST,
            "/api/coupons/validate",
            Some(&token),
            Some(json!({
                "code": "SHIPFREE",
                "cart_items": [{"product_id": product.id, "quantity": 1, "price": 450}],
                "cart_total": 450,
            })),
        )
        .await;

    let body = expect_status(response, StatusCode::OK).await;
    assert_eq!(decimal_of(&body["data"]["discount_amount"]), dec!(0));
    assert_eq!(body["data"]["free_shipping"], true);
}

#[tokio::test]
async fn apply_consumes_usage_and_enforces_global_limit() {
    let app = TestApp::new().await;
    let first_user = Uuid::new_v4();
    let second_user = Uuid::new_v4();
    let first_token = app.token_for(first_user, "customer");
    let second_token = app.token_for(second_user, "customer");
    let admin = app.token_for(Uuid::new_v4(), "admin");

    let mut coupon = app.coupon_template("SCARCE", CouponKind::Fixed, dec!(100));
    coupon.usage_limit = Set(1);
    let coupon = app.seed_coupon(coupon).await;

    // First redemption succeeds
    let response = app
        .request(
            Method::POST,
            "/api/coupons/apply",
            Some(&first_token),
            Some(json!({
                "coupon_id": coupon.id,
                "order_id": Uuid::new_v4(),
                "discount_amount": 100,
            })),
        )
        .await;
    expect_status(response, StatusCode::OK).await;

    // The global limit is exhausted; a second redemption conflicts
    let response = app
        .request(
            Method::POST,
            "/api/coupons/apply",
            Some(&second_token),
            Some(json!({
                "coupon_id": coupon.id,
                "order_id": Uuid::new_v4(),
                "discount_amount": 100,
            })),
        )
        .await;
    let body = expect_status(response, StatusCode::CONFLICT).await;
    assert!(body["message"].as_str().unwrap().contains("usage limit reached"));

    // Validation now also reports the exhausted limit
    let product = app.seed_product("Filler", dec!(300), 5).await;
    let response = app
        .request(
            Method::POST,
            "/api/coupons/validate",
            Some(&first_token),
            Some(json!({
                "code": "SCARCE",
                "cart_items": [{"product_id": product.id, "quantity": 1, "price": 300}],
                "cart_total": 300,
            })),
        )
        .await;
    expect_status(response, StatusCode::BAD_REQUEST).await;

    // Stats reflect the single redemption
    let stats = app
        .request(
            Method::GET,
            &format!("/api/coupons/{}/stats", coupon.id),
            Some(&admin),
            None,
        )
        .await;
    let stats_body = expect_status(stats, StatusCode::OK).await;
    assert_eq!(stats_body["data"]["total_usage"], 1);
    assert_eq!(stats_body["data"]["unique_users"], 1);
    assert_eq!(decimal_of(&stats_body["data"]["total_discount"]), dec!(100));
}

#[tokio::test]
async fn per_user_limit_counted_from_usage_rows() {
    let app = TestApp::new().await;
    let customer = Uuid::new_v4();
    let token = app.token_for(customer, "customer");

    let product = app.seed_product("Santal Drift", dec!(650), 10).await;

    let mut coupon = app.coupon_template("ONEEACH", CouponKind::Fixed, dec!(50));
    coupon.user_usage_limit = Set(1);
    let coupon = app.seed_coupon(coupon).await;

    let response = app
        .request(
            Method::POST,
            "/api/coupons/apply",
            Some(&token),
            Some(json!({
                "coupon_id": coupon.id,
                "order_id": Uuid::new_v4(),
                "discount_amount": 50,
            })),
        )
        .await;
    expect_status(response, StatusCode::OK).await;

    let response = app
        .request(
            Method::POST,
            "/api/coupons/validate",
            Some(&token),
            Some(json!({
                "code": "ONEEACH",
                "cart_items": [{"product_id": product.id, "quantity": 1, "price": 650}],
                "cart_total": 650,
            })),
        )
        .await;
    let body = expect_status(response, StatusCode::BAD_REQUEST).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("You have reached the usage limit"));
}

#[tokio::test]
async fn admin_coupon_crud_round_trip() {
    let app = TestApp::new().await;
    let admin = app.token_for(Uuid::new_v4(), "admin");
    let customer = app.token_for(Uuid::new_v4(), "customer");

    // Customers cannot create coupons
    let denied = app
        .request(
            Method::POST,
            "/api/coupons",
            Some(&customer),
            Some(json!({
                "code": "NOPE",
                "description": "should fail",
                "kind": "fixed",
                "value": 10,
                "valid_until": chrono::Utc::now() + chrono::Duration::days(10),
            })),
        )
        .await;
    expect_status(denied, StatusCode::FORBIDDEN).await;

    let created = app
        .request(
            Method::POST,
            "/api/coupons",
            Some(&admin),
            Some(json!({
                "code": "festive25",
                "description": "Festive season percentage discount",
                "kind": "percentage",
                "value": 25,
                "minimum_order_amount": 1000,
                "maximum_discount_amount": 750,
                "usage_limit": 500,
                "user_usage_limit": 2,
                "valid_until": chrono::Utc::now() + chrono::Duration::days(45),
            })),
        )
        .await;
    let body = expect_status(created, StatusCode::CREATED).await;
    // Codes are stored uppercased
    assert_eq!(body["data"]["code"], "FESTIVE25");
    let coupon_id = body["data"]["id"].as_str().unwrap().to_string();

    // Duplicate code conflicts
    let duplicate = app
        .request(
            Method::POST,
            "/api/coupons",
            Some(&admin),
            Some(json!({
                "code": "FESTIVE25",
                "description": "duplicate",
                "kind": "fixed",
                "value": 10,
                "valid_until": chrono::Utc::now() + chrono::Duration::days(10),
            })),
        )
        .await;
    expect_status(duplicate, StatusCode::CONFLICT).await;

    // Update then fetch
    let updated = app
        .request(
            Method::PUT,
            &format!("/api/coupons/{coupon_id}"),
            Some(&admin),
            Some(json!({"is_active": false})),
        )
        .await;
    let updated_body = expect_status(updated, StatusCode::OK).await;
    assert_eq!(updated_body["data"]["is_active"], false);

    let listed = app
        .request(
            Method::GET,
            "/api/coupons?is_active=false",
            Some(&admin),
            None,
        )
        .await;
    let listed_body = expect_status(listed, StatusCode::OK).await;
    assert_eq!(listed_body["data"]["total"], 1);

    // Delete and verify gone
    let deleted = app
        .request(
            Method::DELETE,
            &format!("/api/coupons/{coupon_id}"),
            Some(&admin),
            None,
        )
        .await;
    expect_status(deleted, StatusCode::OK).await;

    let missing = app
        .request(
            Method::GET,
            &format!("/api/coupons/{coupon_id}"),
            Some(&admin),
            None,
        )
        .await;
    expect_status(missing, StatusCode::NOT_FOUND).await;
}

#[tokio::test]
async fn coupon_write_rules_enforced() {
    let app = TestApp::new().await;
    let admin = app.token_for(Uuid::new_v4(), "admin");

    // Percentage outside 1..=100
    let response = app
        .request(
            Method::POST,
            "/api/coupons",
            Some(&admin),
            Some(json!({
                "code": "TOOBIG",
                "description": "invalid percentage",
                "kind": "percentage",
                "value": 150,
                "valid_until": chrono::Utc::now() + chrono::Duration::days(10),
            })),
        )
        .await;
    let body = expect_status(response, StatusCode::BAD_REQUEST).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Percentage value must be between 1 and 100"));

    // Window inverted
    let response = app
        .request(
            Method::POST,
            "/api/coupons",
            Some(&admin),
            Some(json!({
                "code": "BACKWARDS",
                "description": "inverted window",
                "kind": "fixed",
                "value": 100,
                "valid_from": chrono::Utc::now() + chrono::Duration::days(20),
                "valid_until": chrono::Utc::now() + chrono::Duration::days(10),
            })),
        )
        .await;
    let body = expect_status(response, StatusCode::BAD_REQUEST).await;
    assert!(body["message"]
        .as_str()
        .unwrap()
        .contains("Valid until date must be after valid from date"));
}
