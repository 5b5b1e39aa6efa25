use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Scentrise Commerce API",
        version = "0.2.0",
        description = r#"
Backend API for the Scentrise perfume storefront.

Covers order creation and lifecycle, coupon validation and redemption,
payment verification (Razorpay / cash on delivery), public shipment
tracking, and inventory bookkeeping.

Authenticated endpoints expect `Authorization: Bearer <jwt>`; tokens are
issued by the identity service. Tracking lookup and payment verification
are public.
        "#,
        contact(name = "Scentrise Engineering", email = "dev@scentrise.com")
    ),
    tags(
        (name = "Orders", description = "Order creation, lifecycle, and tracking"),
        (name = "Coupons", description = "Coupon validation, redemption, and administration"),
        (name = "Payments", description = "Payment gateway callbacks"),
        (name = "Inventory", description = "Stock bookkeeping and reports")
    ),
    paths(
        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::cancel_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::track_order,
        // Payments
        crate::handlers::payments::verify_razorpay_payment,
        // Coupons
        crate::handlers::coupons::validate_coupon,
        crate::handlers::coupons::apply_coupon,
        crate::handlers::coupons::create_coupon,
        crate::handlers::coupons::list_coupons,
        crate::handlers::coupons::get_coupon,
        crate::handlers::coupons::update_coupon,
        crate::handlers::coupons::delete_coupon,
        crate::handlers::coupons::coupon_stats,
        // Inventory
        crate::handlers::inventory::inventory_report,
        crate::handlers::inventory::low_stock,
        crate::handlers::inventory::adjust_stock,
    )
)]
pub struct ApiDoc;

/// Swagger UI mounted at `/docs`, serving the spec at
/// `/api-docs/openapi.json`.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_builds_and_lists_core_paths() {
        let spec = ApiDoc::openapi();
        let paths = &spec.paths.paths;
        assert!(paths.contains_key("/api/orders"));
        assert!(paths.contains_key("/api/orders/track/{tracking_id}"));
        assert!(paths.contains_key("/api/payments/razorpay/verify"));
        assert!(paths.contains_key("/api/coupons/validate"));
    }
}
