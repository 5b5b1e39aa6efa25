use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::AuthUser,
    entities::order::OrderStatus,
    errors::ServiceError,
    services::order_status::TrackingProjection,
    services::orders::{
        CancelOrderRequest, CreateOrderRequest, CreatedOrder, OrderListResponse, OrderResponse,
    },
    ApiResponse, AppState, ListQuery,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
    pub message: Option<String>,
    pub location: Option<String>,
}

/// Create a new order
#[utoipa::path(
    post,
    path = "/api/orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = ApiResponse<CreatedOrder>),
        (status = 400, description = "Invalid request", body = crate::errors::ErrorResponse),
        (status = 422, description = "Insufficient stock", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment gateway unavailable", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn create_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<ApiResponse<CreatedOrder>>), ServiceError> {
    let created = state
        .services
        .orders
        .create_order(&auth_user, request)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(
            created,
            "Order created successfully",
        )),
    ))
}

/// Paginated list of the caller's orders
#[utoipa::path(
    get,
    path = "/api/orders",
    params(
        ("page" = Option<u64>, Query, description = "Page number (default 1)"),
        ("limit" = Option<u64>, Query, description = "Items per page (default 20)"),
    ),
    responses(
        (status = 200, description = "Orders retrieved", body = ApiResponse<OrderListResponse>),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn list_orders(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<OrderListResponse>>, ServiceError> {
    let result = state
        .services
        .orders
        .list_orders(auth_user.customer_id, query.page, query.limit)
        .await?;

    Ok(Json(ApiResponse::success(result)))
}

/// Fetch one order by row id, order number, or tracking number
#[utoipa::path(
    get,
    path = "/api/orders/{id}",
    params(("id" = String, Path, description = "Order id, order number, or tracking number")),
    responses(
        (status = 200, description = "Order retrieved", body = ApiResponse<OrderResponse>),
        (status = 403, description = "Order belongs to another customer", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn get_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state.services.orders.get_order(&auth_user, &id).await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Cancel an order
#[utoipa::path(
    patch,
    path = "/api/orders/{id}/cancel",
    request_body = CancelOrderRequest,
    params(("id" = String, Path, description = "Order id or order number")),
    responses(
        (status = 200, description = "Order cancelled", body = ApiResponse<OrderResponse>),
        (status = 400, description = "Order can no longer be cancelled", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn cancel_order(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<CancelOrderRequest>,
) -> Result<Json<ApiResponse<OrderResponse>>, ServiceError> {
    let order = state
        .services
        .orders
        .cancel_order(&auth_user, &id, request.reason)
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        order,
        "Order cancelled successfully",
    )))
}

/// Administrative status transition
#[utoipa::path(
    patch,
    path = "/api/orders/{id}/status",
    request_body = UpdateOrderStatusRequest,
    params(("id" = String, Path, description = "Order id or order number")),
    responses(
        (status = 200, description = "Status updated", body = ApiResponse<serde_json::Value>),
        (status = 400, description = "Invalid transition", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin only", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Orders"
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<String>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ServiceError> {
    auth_user.require_admin()?;

    let updated = state
        .services
        .order_status
        .update_status(&id, request.status, request.message, request.location)
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        serde_json::json!({
            "order_number": updated.order_number,
            "status": updated.status,
            "tracking_number": updated.tracking_number,
        }),
        "Order status updated successfully",
    )))
}

/// Public tracking lookup. Exposes only the restricted projection; no
/// address, payment, or customer fields.
#[utoipa::path(
    get,
    path = "/api/orders/track/{tracking_id}",
    params(("tracking_id" = String, Path, description = "Order number or tracking number")),
    responses(
        (status = 200, description = "Tracking information", body = ApiResponse<TrackingProjection>),
        (status = 404, description = "Unknown tracking id", body = crate::errors::ErrorResponse),
    ),
    tag = "Orders"
)]
pub async fn track_order(
    State(state): State<AppState>,
    Path(tracking_id): Path<String>,
) -> Result<Json<ApiResponse<TrackingProjection>>, ServiceError> {
    let projection = state.services.order_status.track(&tracking_id).await?;
    Ok(Json(ApiResponse::success(projection)))
}
