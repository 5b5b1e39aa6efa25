//! Test harness: application state backed by an in-memory SQLite database,
//! exercised through the real router.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{header, Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, ConnectOptions, Database, EntityTrait, Set};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

use scentrise_api::{
    auth,
    config::AppConfig,
    db,
    entities::{
        coupon::{self, CouponKind},
        customer_address,
        order::{self, OrderStatus, PaymentProvider, PaymentStatus},
        order_item,
        product::{self, FragranceFamily, Gender},
    },
    events::{self, EventSender},
    AppServices, AppState,
};

pub const JWT_SECRET: &str =
    "integration_test_secret_key_that_is_at_least_64_characters_long_0000";
pub const RAZORPAY_SECRET: &str = "rzp_test_secret";

pub struct TestApp {
    router: Router,
    pub state: AppState,
}

impl TestApp {
    /// Fresh application over an in-memory SQLite database. A single pooled
    /// connection keeps the in-memory database alive and shared.
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            JWT_SECRET.to_string(),
            "127.0.0.1".to_string(),
            0,
            "test".to_string(),
        );
        cfg.razorpay_key_id = "rzp_test_key".to_string();
        cfg.razorpay_key_secret = RAZORPAY_SECRET.to_string();

        let mut opt = ConnectOptions::new(cfg.database_url.clone());
        opt.max_connections(1).min_connections(1).sqlx_logging(false);
        let conn = Database::connect(opt).await.expect("sqlite connection");
        db::run_migrations(&conn).await.expect("migrations");
        let db_arc = Arc::new(conn);

        let (event_tx, event_rx) = mpsc::channel(64);
        let event_sender = EventSender::new(event_tx);
        tokio::spawn(events::process_events(event_rx));

        let services = AppServices::new(db_arc.clone(), event_sender.clone(), &cfg);
        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = scentrise_api::app_router(state.clone());

        Self { router, state }
    }

    pub fn token_for(&self, customer_id: Uuid, role: &str) -> String {
        auth::issue_token(
            customer_id,
            "customer@example.com",
            "Test Customer",
            role,
            JWT_SECRET,
            3600,
        )
        .expect("token")
    }

    pub async fn request(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = match body {
            Some(json_body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json_body.to_string()))
                .expect("request"),
            None => builder.body(Body::empty()).expect("request"),
        };

        self.router.clone().oneshot(request).await.expect("response")
    }

    pub async fn seed_product(&self, title: &str, price: Decimal, stock: i32) -> product::Model {
        self.seed_product_full(title, "Scentrise", FragranceFamily::Woody, price, stock)
            .await
    }

    pub async fn seed_product_full(
        &self,
        title: &str,
        brand: &str,
        family: FragranceFamily,
        price: Decimal,
        stock: i32,
    ) -> product::Model {
        product::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(title.to_string()),
            slug: Set(format!(
                "{}-{}",
                title.to_lowercase().replace(' ', "-"),
                Uuid::new_v4().simple()
            )),
            brand: Set(brand.to_string()),
            gender: Set(Gender::Unisex),
            family: Set(family),
            notes: Set(json!(["oud", "amber"])),
            description: Set(format!("{title} eau de parfum")),
            price: Set(price),
            mrp: Set(price + dec!(200)),
            stock: Set(stock),
            rating_avg: Set(dec!(4.2)),
            rating_count: Set(12),
            is_featured: Set(false),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed product")
    }

    pub async fn seed_address(&self, customer_id: Uuid) -> customer_address::Model {
        customer_address::ActiveModel {
            id: Set(Uuid::new_v4()),
            customer_id: Set(customer_id),
            label: Set("Home".to_string()),
            line1: Set("14 Marine Drive".to_string()),
            line2: Set(None),
            city: Set("Mumbai".to_string()),
            state: Set("Maharashtra".to_string()),
            pincode: Set("400001".to_string()),
            phone: Set("+919800000000".to_string()),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed address")
    }

    /// Baseline coupon: active, valid for 30 days, unrestricted, generous
    /// limits. Tests tweak fields before inserting.
    pub fn coupon_template(&self, code: &str, kind: CouponKind, value: Decimal) -> coupon::ActiveModel {
        let now = Utc::now();
        coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_uppercase()),
            description: Set(format!("{code} test coupon")),
            kind: Set(kind),
            value: Set(value),
            minimum_order_amount: Set(Decimal::ZERO),
            maximum_discount_amount: Set(None),
            usage_limit: Set(100),
            usage_count: Set(0),
            user_usage_limit: Set(10),
            valid_from: Set(now - Duration::days(1)),
            valid_until: Set(now + Duration::days(30)),
            is_active: Set(true),
            applicable_products: Set(json!([])),
            applicable_categories: Set(json!([])),
            applicable_brands: Set(json!([])),
            excluded_products: Set(json!([])),
            first_time_user: Set(false),
            created_at: Set(now),
            updated_at: Set(now),
        }
    }

    pub async fn seed_coupon(&self, model: coupon::ActiveModel) -> coupon::Model {
        model.insert(&*self.state.db).await.expect("seed coupon")
    }

    /// A pending Razorpay order as the order pipeline leaves it before the
    /// gateway callback: stock not yet decremented.
    pub async fn seed_pending_razorpay_order(
        &self,
        customer_id: Uuid,
        gateway_order_id: &str,
        items: &[(product::Model, i32)],
    ) -> order::Model {
        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let subtotal: Decimal = items
            .iter()
            .map(|(p, qty)| p.price * Decimal::from(*qty))
            .sum();
        let shipping = if subtotal < dec!(999) { dec!(49) } else { Decimal::ZERO };
        let tax = (subtotal * dec!(0.18)).round();

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(format!("SC{}{:03}", now.timestamp_millis(), 421)),
            customer_id: Set(customer_id),
            status: Set(OrderStatus::Pending),
            subtotal: Set(subtotal),
            shipping: Set(shipping),
            tax: Set(tax),
            total: Set(subtotal + shipping + tax),
            estimated_delivery: Set(now + Duration::days(7)),
            tracking_number: Set(None),
            payment_provider: Set(PaymentProvider::Razorpay),
            payment_order_id: Set(Some(gateway_order_id.to_string())),
            payment_id: Set(None),
            payment_signature: Set(None),
            payment_status: Set(PaymentStatus::Pending),
            shipping_address: Set(json!({
                "label": "Home",
                "line1": "14 Marine Drive",
                "city": "Mumbai",
                "state": "Maharashtra",
                "pincode": "400001",
                "phone": "+919800000000",
            })),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        }
        .insert(&*self.state.db)
        .await
        .expect("seed order");

        for (product_model, qty) in items {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product_model.id),
                title: Set(product_model.title.clone()),
                quantity: Set(*qty),
                price_at_purchase: Set(product_model.price),
            }
            .insert(&*self.state.db)
            .await
            .expect("seed order item");
        }

        order_model
    }

    pub async fn product_stock(&self, product_id: Uuid) -> i32 {
        product::Entity::find_by_id(product_id)
            .one(&*self.state.db)
            .await
            .expect("query product")
            .expect("product exists")
            .stock
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub async fn expect_status(response: Response, status: StatusCode) -> Value {
    assert_eq!(response.status(), status, "unexpected response status");
    response_json(response).await
}

/// Monetary fields serialize as decimal strings; tolerate plain numbers too
/// so assertions are not coupled to the serializer.
pub fn decimal_of(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().expect("decimal string"),
        Value::Number(n) => n.to_string().parse().expect("decimal number"),
        other => panic!("not a decimal value: {other:?}"),
    }
}
