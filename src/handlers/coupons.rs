use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    entities::coupon::{self, CouponKind},
    errors::ServiceError,
    services::coupons::{
        ApplyCouponRequest, CouponListFilter, CouponStats, CreateCouponRequest,
        DiscountDescriptor, UpdateCouponRequest, ValidateCouponRequest,
    },
    ApiResponse, AppState, PaginatedResponse,
};

#[derive(Debug, Deserialize)]
pub struct CouponListQuery {
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_limit")]
    pub limit: u64,
    pub is_active: Option<bool>,
    pub kind: Option<CouponKind>,
    pub search: Option<String>,
}

fn default_page() -> u64 {
    1
}

fn default_limit() -> u64 {
    10
}

/// Check a coupon against the caller's cart
#[utoipa::path(
    post,
    path = "/api/coupons/validate",
    request_body = ValidateCouponRequest,
    responses(
        (status = 200, description = "Coupon is valid", body = ApiResponse<DiscountDescriptor>),
        (status = 400, description = "Coupon not applicable", body = crate::errors::ErrorResponse),
        (status = 404, description = "Unknown coupon code", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Coupons"
)]
pub async fn validate_coupon(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<ValidateCouponRequest>,
) -> Result<Json<ApiResponse<DiscountDescriptor>>, ServiceError> {
    let discount = state
        .services
        .coupons
        .validate(auth_user.customer_id, request)
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        discount,
        "Coupon is valid",
    )))
}

/// Record a redemption once the order is confirmed
#[utoipa::path(
    post,
    path = "/api/coupons/apply",
    request_body = ApplyCouponRequest,
    responses(
        (status = 200, description = "Coupon applied", body = ApiResponse<serde_json::Value>),
        (status = 409, description = "Usage limit exhausted", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Coupons"
)]
pub async fn apply_coupon(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<ApplyCouponRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ServiceError> {
    state
        .services
        .coupons
        .apply(auth_user.customer_id, request)
        .await?;

    Ok(Json(ApiResponse::success_with_message(
        serde_json::json!({}),
        "Coupon applied successfully",
    )))
}

/// Create a coupon (admin)
#[utoipa::path(
    post,
    path = "/api/coupons",
    request_body = CreateCouponRequest,
    responses(
        (status = 201, description = "Coupon created", body = ApiResponse<coupon::Model>),
        (status = 409, description = "Code already exists", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Coupons"
)]
pub async fn create_coupon(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Json(request): Json<CreateCouponRequest>,
) -> Result<(StatusCode, Json<ApiResponse<coupon::Model>>), ServiceError> {
    auth_user.require_admin()?;

    let created = state.services.coupons.create(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success_with_message(
            created,
            "Coupon created successfully",
        )),
    ))
}

/// List coupons (admin)
#[utoipa::path(
    get,
    path = "/api/coupons",
    params(
        ("page" = Option<u64>, Query, description = "Page number"),
        ("limit" = Option<u64>, Query, description = "Items per page"),
        ("is_active" = Option<bool>, Query, description = "Filter by active flag"),
        ("search" = Option<String>, Query, description = "Match code or description"),
    ),
    responses(
        (status = 200, description = "Coupons retrieved", body = ApiResponse<PaginatedResponse<coupon::Model>>),
    ),
    security(("Bearer" = [])),
    tag = "Coupons"
)]
pub async fn list_coupons(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Query(query): Query<CouponListQuery>,
) -> Result<Json<ApiResponse<PaginatedResponse<coupon::Model>>>, ServiceError> {
    auth_user.require_admin()?;

    let limit = query.limit.max(1);
    let filter = CouponListFilter {
        is_active: query.is_active,
        kind: query.kind,
        search: query.search,
    };

    let (coupons, total) = state
        .services
        .coupons
        .list(filter, query.page, limit)
        .await?;

    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: coupons,
        total,
        page: query.page,
        limit,
        total_pages: total.div_ceil(limit),
    })))
}

/// Fetch one coupon (admin)
#[utoipa::path(
    get,
    path = "/api/coupons/{id}",
    params(("id" = Uuid, Path, description = "Coupon id")),
    responses(
        (status = 200, description = "Coupon retrieved", body = ApiResponse<coupon::Model>),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Coupons"
)]
pub async fn get_coupon(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<coupon::Model>>, ServiceError> {
    auth_user.require_admin()?;
    let coupon = state.services.coupons.get(id).await?;
    Ok(Json(ApiResponse::success(coupon)))
}

/// Update a coupon (admin)
#[utoipa::path(
    put,
    path = "/api/coupons/{id}",
    request_body = UpdateCouponRequest,
    params(("id" = Uuid, Path, description = "Coupon id")),
    responses(
        (status = 200, description = "Coupon updated", body = ApiResponse<coupon::Model>),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Coupons"
)]
pub async fn update_coupon(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateCouponRequest>,
) -> Result<Json<ApiResponse<coupon::Model>>, ServiceError> {
    auth_user.require_admin()?;

    let updated = state.services.coupons.update(id, request).await?;

    Ok(Json(ApiResponse::success_with_message(
        updated,
        "Coupon updated successfully",
    )))
}

/// Delete a coupon (admin)
#[utoipa::path(
    delete,
    path = "/api/coupons/{id}",
    params(("id" = Uuid, Path, description = "Coupon id")),
    responses(
        (status = 200, description = "Coupon deleted", body = ApiResponse<serde_json::Value>),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Coupons"
)]
pub async fn delete_coupon(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ServiceError> {
    auth_user.require_admin()?;

    state.services.coupons.delete(id).await?;

    Ok(Json(ApiResponse::success_with_message(
        serde_json::json!({}),
        "Coupon deleted successfully",
    )))
}

/// Redemption statistics (admin)
#[utoipa::path(
    get,
    path = "/api/coupons/{id}/stats",
    params(("id" = Uuid, Path, description = "Coupon id")),
    responses(
        (status = 200, description = "Stats retrieved", body = ApiResponse<CouponStats>),
        (status = 404, description = "Coupon not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Coupons"
)]
pub async fn coupon_stats(
    State(state): State<AppState>,
    auth_user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<CouponStats>>, ServiceError> {
    auth_user.require_admin()?;
    let stats = state.services.coupons.stats(id).await?;
    Ok(Json(ApiResponse::success(stats)))
}
