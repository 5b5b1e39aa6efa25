use axum::{extract::State, response::Json};

use crate::{
    errors::ServiceError, services::payments::VerifyPaymentRequest, ApiResponse, AppState,
};

/// Verify a Razorpay checkout callback.
///
/// Public by design: the caller proves legitimacy through the HMAC
/// signature, not a session.
#[utoipa::path(
    post,
    path = "/api/payments/razorpay/verify",
    request_body = VerifyPaymentRequest,
    responses(
        (status = 200, description = "Payment verified", body = ApiResponse<serde_json::Value>),
        (status = 400, description = "Invalid signature or already captured", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "Payments"
)]
pub async fn verify_razorpay_payment(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ServiceError> {
    let order = state.services.payments.verify_razorpay(request).await?;

    Ok(Json(ApiResponse::success_with_message(
        serde_json::json!({
            "order_number": order.order_number,
            "status": order.status,
            "payment_status": order.payment_status,
        }),
        "Payment verified successfully",
    )))
}
