use std::sync::Arc;

use chrono::Utc;
use hmac::{Hmac, Mac};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionTrait};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::order::{self, OrderStatus, PaymentStatus},
    entities::order_item::{self, Entity as OrderItemEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::{inventory, order_status},
};

type HmacSha256 = Hmac<Sha256>;

/// hex(HMAC-SHA256(secret, "<gateway order id>|<gateway payment id>")), the
/// signature scheme Razorpay uses for checkout callbacks.
pub fn compute_signature(secret: &str, gateway_order_id: &str, payment_id: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(gateway_order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time comparison of a supplied signature against the recomputed
/// one. Malformed hex fails closed.
pub fn verify_signature(
    secret: &str,
    gateway_order_id: &str,
    payment_id: &str,
    supplied: &str,
) -> bool {
    let Ok(supplied_bytes) = hex::decode(supplied) else {
        return false;
    };

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(gateway_order_id.as_bytes());
    mac.update(b"|");
    mac.update(payment_id.as_bytes());
    mac.verify_slice(&supplied_bytes).is_ok()
}

/// Gateway-side order, as returned by the Razorpay orders endpoint.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

/// Thin client for the Razorpay orders API. The base URL is injected so
/// tests can point it at a local stub instead of the real gateway.
#[derive(Clone)]
pub struct RazorpayClient {
    http: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

impl RazorpayClient {
    pub fn new(base_url: String, key_id: String, key_secret: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url,
            key_id,
            key_secret,
        }
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Creates a payment intent for the given amount (in paise).
    #[instrument(skip(self), fields(amount_paise, %local_order_id))]
    pub async fn create_order(
        &self,
        amount_paise: i64,
        currency: &str,
        local_order_id: Uuid,
    ) -> Result<GatewayOrder, ServiceError> {
        let url = format!("{}/orders", self.base_url);
        let body = json!({
            "amount": amount_paise,
            "currency": currency,
            "receipt": Uuid::new_v4().to_string(),
            "notes": { "orderId": local_order_id.to_string() },
        });

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                ServiceError::ExternalServiceError(format!(
                    "Failed to create Razorpay order: {}",
                    e
                ))
            })?;

        if !response.status().is_success() {
            return Err(ServiceError::ExternalServiceError(format!(
                "Razorpay order creation failed with status {}",
                response.status()
            )));
        }

        response.json::<GatewayOrder>().await.map_err(|e| {
            ServiceError::ExternalServiceError(format!("Invalid Razorpay response: {}", e))
        })
    }
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(deny_unknown_fields)]
pub struct VerifyPaymentRequest {
    /// Gateway-side order id
    #[validate(length(min = 1, message = "Order ID is required"))]
    pub order_id: String,

    /// Gateway-side payment id
    #[validate(length(min = 1, message = "Payment ID is required"))]
    pub payment_id: String,

    #[validate(length(min = 1, message = "Signature is required"))]
    pub signature: String,

    /// Our order: row uuid or order number
    #[validate(length(min = 1, message = "Local order ID is required"))]
    pub local_order_id: String,
}

/// Verifies gateway callbacks and finalizes asynchronous payments. This is
/// the only point at which razorpay-path stock is actually decremented.
#[derive(Clone)]
pub struct PaymentService {
    db: Arc<DbPool>,
    event_sender: EventSender,
    key_secret: String,
}

impl PaymentService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, key_secret: String) -> Self {
        Self {
            db,
            event_sender,
            key_secret,
        }
    }

    #[instrument(skip(self, request), fields(local_order_id = %request.local_order_id))]
    pub async fn verify_razorpay(
        &self,
        request: VerifyPaymentRequest,
    ) -> Result<order::Model, ServiceError> {
        request.validate()?;

        // Signature first; nothing is read or written for a forged callback.
        if !verify_signature(
            &self.key_secret,
            &request.order_id,
            &request.payment_id,
            &request.signature,
        ) {
            warn!("Rejected payment callback with invalid signature");
            return Err(ServiceError::ValidationError(
                "Invalid payment signature".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let existing = order_status::find_by_public_id(&txn, &request.local_order_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        // Replayed callbacks must not decrement stock a second time.
        if existing.payment_status == PaymentStatus::Captured {
            return Err(ServiceError::InvalidOperation(
                "Payment already captured".to_string(),
            ));
        }

        let order_id = existing.id;
        let old_status = existing.status;
        let version = existing.version;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;

        let mut active: order::ActiveModel = existing.into();
        active.payment_id = Set(Some(request.payment_id.clone()));
        active.payment_signature = Set(Some(request.signature.clone()));
        active.payment_status = Set(PaymentStatus::Captured);
        active.status = Set(OrderStatus::Confirmed);
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);
        let updated = active.update(&txn).await?;

        order_status::append_history(&txn, order_id, OrderStatus::Confirmed, None, None).await?;

        // The stock reserved conceptually at order creation is taken for
        // real only now that payment is in hand.
        for item in &items {
            inventory::decrement_stock(&txn, item.product_id, item.quantity, &item.title).await?;
        }

        txn.commit().await?;

        info!(order_id = %order_id, payment_id = %request.payment_id, "Payment verified");

        self.event_sender
            .send(Event::PaymentCaptured {
                order_id,
                payment_id: request.payment_id,
            })
            .await;
        self.event_sender
            .send(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.to_string(),
                new_status: OrderStatus::Confirmed.to_string(),
            })
            .await;

        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "rzp_test_secret";

    #[test]
    fn signature_round_trip() {
        let sig = compute_signature(SECRET, "order_abc", "pay_xyz");
        assert!(verify_signature(SECRET, "order_abc", "pay_xyz", &sig));
    }

    #[test]
    fn tampered_payment_id_fails() {
        let sig = compute_signature(SECRET, "order_abc", "pay_xyz");
        assert!(!verify_signature(SECRET, "order_abc", "pay_other", &sig));
    }

    #[test]
    fn wrong_secret_fails() {
        let sig = compute_signature("another_secret", "order_abc", "pay_xyz");
        assert!(!verify_signature(SECRET, "order_abc", "pay_xyz", &sig));
    }

    #[test]
    fn non_hex_signature_fails_closed() {
        assert!(!verify_signature(SECRET, "order_abc", "pay_xyz", "not-hex!"));
    }

    #[test]
    fn signature_is_deterministic() {
        assert_eq!(
            compute_signature(SECRET, "order_abc", "pay_xyz"),
            compute_signature(SECRET, "order_abc", "pay_xyz"),
        );
    }
}
