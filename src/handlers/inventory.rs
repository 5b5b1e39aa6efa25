use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::product,
    errors::ServiceError,
    services::inventory::{AdjustOperation, InventoryReport, StockAdjustment},
    ApiResponse, AppState,
};

#[derive(Debug, Deserialize)]
pub struct ThresholdQuery {
    pub threshold: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdjustStockRequest {
    pub operation: AdjustOperation,
    pub quantity: i32,
    pub reason: Option<String>,
}

/// Stock-level report across the catalog (admin)
#[utoipa::path(
    get,
    path = "/api/inventory/report",
    params(("threshold" = Option<i32>, Query, description = "Low-stock threshold (default 10)")),
    responses(
        (status = 200, description = "Report generated", body = ApiResponse<InventoryReport>),
        (status = 403, description = "Admin only", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Inventory"
)]
pub async fn inventory_report(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<ThresholdQuery>,
) -> Result<Json<ApiResponse<InventoryReport>>, ServiceError> {
    auth_user.require_admin()?;
    let report = state.services.inventory.report(query.threshold).await?;
    Ok(Json(ApiResponse::success(report)))
}

/// Products running low (admin)
#[utoipa::path(
    get,
    path = "/api/inventory/low-stock",
    params(("threshold" = Option<i32>, Query, description = "Stock ceiling (default 10)")),
    responses(
        (status = 200, description = "Low-stock products", body = ApiResponse<Vec<product::Model>>),
    ),
    security(("Bearer" = [])),
    tag = "Inventory"
)]
pub async fn low_stock(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<ThresholdQuery>,
) -> Result<Json<ApiResponse<Vec<product::Model>>>, ServiceError> {
    auth_user.require_admin()?;
    let products = state
        .services
        .inventory
        .low_stock(query.threshold.unwrap_or(10))
        .await?;
    Ok(Json(ApiResponse::success(products)))
}

/// Manual stock adjustment (admin)
#[utoipa::path(
    patch,
    path = "/api/inventory/{product_id}/stock",
    request_body = AdjustStockRequest,
    params(("product_id" = Uuid, Path, description = "Product id")),
    responses(
        (status = 200, description = "Stock updated", body = ApiResponse<StockAdjustment>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Inventory"
)]
pub async fn adjust_stock(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(product_id): Path<Uuid>,
    Json(request): Json<AdjustStockRequest>,
) -> Result<Json<ApiResponse<StockAdjustment>>, ServiceError> {
    auth_user.require_admin()?;

    let adjustment = state
        .services
        .inventory
        .adjust_stock(product_id, request.operation, request.quantity, request.reason)
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        adjustment,
        "Stock updated successfully",
    )))
}
