//! Scentrise Commerce API Library
//!
//! Order pipeline, coupon evaluation, payment verification, shipment
//! tracking, and inventory bookkeeping for the Scentrise storefront.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;

use std::sync::Arc;

use axum::{
    extract::State,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

pub use handlers::AppServices;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: AppServices,
}

// Common query parameters for list endpoints
#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
}

fn default_page() -> u64 {
    1
}
fn default_limit() -> u64 {
    20
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<String>>,
}

#[derive(Serialize, ToSchema)]
pub struct PaginatedResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            errors: None,
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            errors: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message: Some(message),
            errors: None,
        }
    }

    pub fn validation_errors(errors: Vec<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: Some("Validation failed".to_string()),
            errors: Some(errors),
        }
    }
}

/// Standard API result type for JSON responses
pub type ApiResult<T> = Result<Json<ApiResponse<T>>, errors::ServiceError>;

/// All `/api` routes.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        // Orders
        .route(
            "/orders",
            post(handlers::orders::create_order).get(handlers::orders::list_orders),
        )
        .route(
            "/orders/track/{tracking_id}",
            get(handlers::orders::track_order),
        )
        .route("/orders/{id}", get(handlers::orders::get_order))
        .route(
            "/orders/{id}/cancel",
            patch(handlers::orders::cancel_order),
        )
        .route(
            "/orders/{id}/status",
            patch(handlers::orders::update_order_status),
        )
        // Payments
        .route(
            "/payments/razorpay/verify",
            post(handlers::payments::verify_razorpay_payment),
        )
        // Coupons
        .route(
            "/coupons/validate",
            post(handlers::coupons::validate_coupon),
        )
        .route("/coupons/apply", post(handlers::coupons::apply_coupon))
        .route(
            "/coupons",
            post(handlers::coupons::create_coupon).get(handlers::coupons::list_coupons),
        )
        .route(
            "/coupons/{id}",
            get(handlers::coupons::get_coupon)
                .put(handlers::coupons::update_coupon)
                .delete(handlers::coupons::delete_coupon),
        )
        .route("/coupons/{id}/stats", get(handlers::coupons::coupon_stats))
        // Inventory
        .route(
            "/inventory/report",
            get(handlers::inventory::inventory_report),
        )
        .route("/inventory/low-stock", get(handlers::inventory::low_stock))
        .route(
            "/inventory/{product_id}/stock",
            patch(handlers::inventory::adjust_stock),
        )
}

/// Full application router: root, health, `/api`, and Swagger UI.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "scentrise-api up" }))
        .route("/health", get(health_check))
        .nest("/api", api_routes())
        .merge(openapi::swagger_ui())
        .with_state(state)
}

async fn api_status() -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let status_data = json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "service": "scentrise-api",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(status_data)))
}

async fn health_check(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Value>>, errors::ServiceError> {
    let db_status = match state.db.ping().await {
        Ok(_) => "healthy",
        Err(_) => "unhealthy",
    };

    let health_data = json!({
        "status": db_status,
        "checks": {
            "database": db_status,
        },
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    Ok(Json(ApiResponse::success(health_data)))
}
