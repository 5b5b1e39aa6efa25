use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::AuthUser,
    db::DbPool,
    entities::customer_address::{self, Entity as CustomerAddressEntity},
    entities::order::{self, Entity as OrderEntity, OrderStatus, PaymentProvider, PaymentStatus},
    entities::order_item::{self, Entity as OrderItemEntity},
    entities::product::{self, Entity as ProductEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::notifications::Mailer,
    services::order_status::{self, find_by_public_id},
    services::payments::RazorpayClient,
    services::inventory,
};

/// Orders under this subtotal pay the flat shipping fee.
pub const FREE_SHIPPING_THRESHOLD: Decimal = dec!(999);
pub const SHIPPING_FEE: Decimal = dec!(49);
/// Flat GST approximation; no per-category rates.
pub const TAX_RATE: Decimal = dec!(0.18);
/// Handling surcharge for cash on delivery.
pub const COD_SURCHARGE: Decimal = dec!(25);

const ESTIMATED_DELIVERY_DAYS: i64 = 7;

/// `SC<epoch millis><3 random digits>`
pub fn generate_order_number() -> String {
    format!(
        "SC{}{:03}",
        Utc::now().timestamp_millis(),
        rand::thread_rng().gen_range(0..1000)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

/// Derives shipping, tax, and the grand total from a subtotal. Tax is
/// rounded half-away-from-zero to whole rupees.
pub fn compute_totals(subtotal: Decimal, provider: PaymentProvider) -> OrderTotals {
    let shipping = if subtotal < FREE_SHIPPING_THRESHOLD {
        SHIPPING_FEE
    } else {
        Decimal::ZERO
    };
    let tax = (subtotal * TAX_RATE).round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    let surcharge = if provider == PaymentProvider::Cod {
        COD_SURCHARGE
    } else {
        Decimal::ZERO
    };

    OrderTotals {
        subtotal,
        shipping,
        tax,
        total: subtotal + shipping + tax + surcharge,
    }
}

/// Shipping address snapshot embedded into the order row.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Address {
    pub label: String,
    pub line1: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    pub city: String,
    pub state: String,
    pub pincode: String,
    pub phone: String,
}

impl From<customer_address::Model> for Address {
    fn from(model: customer_address::Model) -> Self {
        Self {
            label: model.label,
            line1: model.line1,
            line2: model.line2,
            city: model.city,
            state: model.state,
            pincode: model.pincode,
            phone: model.phone,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Validate, ToSchema)]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    #[serde(alias = "quantity")]
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub qty: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, message = "At least one item is required"), nested)]
    pub items: Vec<OrderItemRequest>,
    pub address_id: Uuid,
    pub provider: PaymentProvider,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CancelOrderRequest {
    pub reason: Option<String>,
}

/// Client-side checkout parameters for the Razorpay flow.
#[derive(Debug, Serialize, ToSchema)]
pub struct RazorpayCheckout {
    pub key_id: String,
    pub order_id: String,
    /// Paise
    pub amount: i64,
    pub currency: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderItemResponse {
    pub product_id: Uuid,
    pub title: String,
    pub qty: i32,
    pub price_at_purchase: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentInfo {
    pub provider: PaymentProvider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_id: Option<String>,
    pub status: PaymentStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderResponse {
    pub id: Uuid,
    pub order_number: String,
    pub customer_id: Uuid,
    pub status: OrderStatus,
    pub items: Vec<OrderItemResponse>,
    pub subtotal: Decimal,
    pub shipping: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
    pub estimated_delivery: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    pub payment: PaymentInfo,
    #[schema(value_type = Object)]
    pub shipping_address: serde_json::Value,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CreatedOrder {
    pub order: OrderResponse,
    /// Present only for the Razorpay flow.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<RazorpayCheckout>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<OrderResponse>,
    pub total: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

/// Order creation and lifecycle. The single canonical pipeline: every order,
/// regardless of provider, flows through `create_order`.
#[derive(Clone)]
pub struct OrderService {
    db: Arc<DbPool>,
    event_sender: EventSender,
    razorpay: RazorpayClient,
    mailer: Mailer,
}

impl OrderService {
    pub fn new(
        db: Arc<DbPool>,
        event_sender: EventSender,
        razorpay: RazorpayClient,
        mailer: Mailer,
    ) -> Self {
        Self {
            db,
            event_sender,
            razorpay,
            mailer,
        }
    }

    /// Creates an order for the authenticated customer.
    ///
    /// Prices are snapshotted from the product store, never taken from the
    /// client. The COD path decrements stock inside the insert transaction;
    /// the Razorpay path defers the decrement to payment verification.
    #[instrument(skip(self, user, request), fields(customer_id = %user.customer_id))]
    pub async fn create_order(
        &self,
        user: &AuthUser,
        request: CreateOrderRequest,
    ) -> Result<CreatedOrder, ServiceError> {
        request.validate()?;
        let db = &*self.db;

        let address = CustomerAddressEntity::find_by_id(request.address_id)
            .filter(customer_address::Column::CustomerId.eq(user.customer_id))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::ValidationError("Address not found".to_string()))?;

        // Price snapshot and advisory stock check. The authoritative check
        // is the conditional decrement below; this one exists to fail fast
        // with a per-product message before anything is written.
        let mut lines: Vec<(product::Model, i32)> = Vec::with_capacity(request.items.len());
        let mut subtotal = Decimal::ZERO;
        for item in &request.items {
            let product = ProductEntity::find_by_id(item.product_id)
                .one(db)
                .await?
                .ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "Product not found: {}",
                        item.product_id
                    ))
                })?;

            if product.stock < item.qty {
                return Err(ServiceError::InsufficientStock(format!(
                    "Insufficient stock for {}",
                    product.title
                )));
            }

            subtotal += product.price * Decimal::from(item.qty);
            lines.push((product, item.qty));
        }

        let totals = compute_totals(subtotal, request.provider);
        let now = Utc::now();
        let order_id = Uuid::new_v4();
        let order_number = generate_order_number();

        let address_snapshot = serde_json::to_value(Address::from(address)).map_err(|e| {
            ServiceError::InternalError(format!("Failed to serialize address: {}", e))
        })?;

        let (initial_status, payment_status) = match request.provider {
            PaymentProvider::Cod => (OrderStatus::Confirmed, PaymentStatus::Captured),
            PaymentProvider::Razorpay | PaymentProvider::Stripe => {
                (OrderStatus::Pending, PaymentStatus::Pending)
            }
        };

        // Gateway intent before any row exists: a gateway failure must leave
        // no order behind.
        let gateway_order = match request.provider {
            PaymentProvider::Razorpay => {
                let amount_paise = (totals.total * Decimal::from(100))
                    .to_i64()
                    .ok_or_else(|| {
                        ServiceError::InternalError(
                            "Order total exceeds representable amount".to_string(),
                        )
                    })?;
                Some(
                    self.razorpay
                        .create_order(amount_paise, "INR", order_id)
                        .await?,
                )
            }
            _ => None,
        };

        let txn = db.begin().await?;

        order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            customer_id: Set(user.customer_id),
            status: Set(initial_status),
            subtotal: Set(totals.subtotal),
            shipping: Set(totals.shipping),
            tax: Set(totals.tax),
            total: Set(totals.total),
            estimated_delivery: Set(now + Duration::days(ESTIMATED_DELIVERY_DAYS)),
            tracking_number: Set(None),
            payment_provider: Set(request.provider),
            payment_order_id: Set(gateway_order.as_ref().map(|g| g.id.clone())),
            payment_id: Set(None),
            payment_signature: Set(None),
            payment_status: Set(payment_status),
            shipping_address: Set(address_snapshot.clone()),
            created_at: Set(now),
            updated_at: Set(Some(now)),
            version: Set(1),
        }
        .insert(&txn)
        .await?;

        let mut item_responses = Vec::with_capacity(lines.len());
        for (product, qty) in &lines {
            order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(product.id),
                title: Set(product.title.clone()),
                quantity: Set(*qty),
                price_at_purchase: Set(product.price),
            }
            .insert(&txn)
            .await?;

            item_responses.push(OrderItemResponse {
                product_id: product.id,
                title: product.title.clone(),
                qty: *qty,
                price_at_purchase: product.price,
            });
        }

        order_status::append_history(&txn, order_id, initial_status, None, None).await?;

        if request.provider == PaymentProvider::Cod {
            for (product, qty) in &lines {
                inventory::decrement_stock(&txn, product.id, *qty, &product.title).await?;
            }
        }

        txn.commit().await?;

        info!(
            order_id = %order_id,
            order_number = %order_number,
            provider = ?request.provider,
            total = %totals.total,
            "Order created"
        );

        self.event_sender
            .send(Event::OrderCreated {
                order_id,
                order_number: order_number.clone(),
            })
            .await;

        if request.provider == PaymentProvider::Cod {
            let mailer = self.mailer.clone();
            let email = user.email.clone();
            let name = user.name.clone();
            let number = order_number.clone();
            let total = totals.total;
            tokio::spawn(async move {
                mailer
                    .send_order_confirmation(&email, &name, &number, total)
                    .await;
            });
        }

        let payment = gateway_order.map(|g| RazorpayCheckout {
            key_id: self.razorpay.key_id().to_string(),
            order_id: g.id,
            amount: g.amount,
            currency: g.currency,
        });

        Ok(CreatedOrder {
            order: OrderResponse {
                id: order_id,
                order_number,
                customer_id: user.customer_id,
                status: initial_status,
                items: item_responses,
                subtotal: totals.subtotal,
                shipping: totals.shipping,
                tax: totals.tax,
                total: totals.total,
                estimated_delivery: now + Duration::days(ESTIMATED_DELIVERY_DAYS),
                tracking_number: None,
                payment: PaymentInfo {
                    provider: request.provider,
                    order_id: payment.as_ref().map(|p| p.order_id.clone()),
                    payment_id: None,
                    status: payment_status,
                },
                shipping_address: address_snapshot,
                created_at: now,
                updated_at: Some(now),
            },
            payment,
        })
    }

    /// Caller's orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(
        &self,
        customer_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<OrderListResponse, ServiceError> {
        let db = &*self.db;
        let limit = limit.clamp(1, 100);
        let page = page.max(1);

        let paginator = OrderEntity::find()
            .filter(order::Column::CustomerId.eq(customer_id))
            .order_by_desc(order::Column::CreatedAt)
            .paginate(db, limit);

        let total = paginator.num_items().await?;
        let orders = paginator.fetch_page(page - 1).await?;

        let mut responses = Vec::with_capacity(orders.len());
        for order_model in orders {
            let items = OrderItemEntity::find()
                .filter(order_item::Column::OrderId.eq(order_model.id))
                .all(db)
                .await?;
            responses.push(model_to_response(order_model, items));
        }

        Ok(OrderListResponse {
            orders: responses,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        })
    }

    /// Fetch one order by row id, order number, or tracking number, scoped
    /// to the owner (admins may read any order).
    #[instrument(skip(self, user))]
    pub async fn get_order(
        &self,
        user: &AuthUser,
        public_id: &str,
    ) -> Result<OrderResponse, ServiceError> {
        let db = &*self.db;

        let order_model = find_by_public_id(db, public_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        if order_model.customer_id != user.customer_id && !user.is_admin() {
            return Err(ServiceError::Forbidden("Access denied".to_string()));
        }

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_model.id))
            .all(db)
            .await?;

        Ok(model_to_response(order_model, items))
    }

    /// Cancels an order, restoring exactly the quantities that were actually
    /// decremented: captured payments took stock, pending ones never did.
    #[instrument(skip(self, user), fields(order = %public_id))]
    pub async fn cancel_order(
        &self,
        user: &AuthUser,
        public_id: &str,
        reason: Option<String>,
    ) -> Result<OrderResponse, ServiceError> {
        let txn = self.db.begin().await?;

        let order_model = find_by_public_id(&txn, public_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        if order_model.customer_id != user.customer_id && !user.is_admin() {
            return Err(ServiceError::Forbidden("Access denied".to_string()));
        }

        match order_model.status {
            OrderStatus::Pending | OrderStatus::Confirmed => {}
            OrderStatus::Shipped | OrderStatus::Delivered => {
                return Err(ServiceError::InvalidOperation(
                    "Cannot cancel shipped or delivered orders".to_string(),
                ));
            }
            OrderStatus::Processing => {
                return Err(ServiceError::InvalidOperation(
                    "Cannot cancel an order that is being prepared for shipment".to_string(),
                ));
            }
            OrderStatus::Cancelled => {
                return Err(ServiceError::InvalidOperation(
                    "Order is already cancelled".to_string(),
                ));
            }
        }

        let order_id = order_model.id;
        let old_status = order_model.status;
        let version = order_model.version;
        let stock_was_taken = order_model.payment_status == PaymentStatus::Captured;

        let items = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&txn)
            .await?;

        if stock_was_taken {
            for item in &items {
                inventory::restore_stock(&txn, item.product_id, item.quantity).await?;
            }
        }

        let mut active: order::ActiveModel = order_model.into();
        active.status = Set(OrderStatus::Cancelled);
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);
        let updated = active.update(&txn).await?;

        order_status::append_history(
            &txn,
            order_id,
            OrderStatus::Cancelled,
            Some(reason.unwrap_or_else(|| "Order cancelled by customer".to_string())),
            None,
        )
        .await?;

        txn.commit().await?;

        info!(order_id = %order_id, restored_stock = stock_was_taken, "Order cancelled");

        self.event_sender.send(Event::OrderCancelled(order_id)).await;
        self.event_sender
            .send(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.to_string(),
                new_status: OrderStatus::Cancelled.to_string(),
            })
            .await;

        Ok(model_to_response(updated, items))
    }
}

fn model_to_response(model: order::Model, items: Vec<order_item::Model>) -> OrderResponse {
    OrderResponse {
        id: model.id,
        order_number: model.order_number,
        customer_id: model.customer_id,
        status: model.status,
        items: items
            .into_iter()
            .map(|i| OrderItemResponse {
                product_id: i.product_id,
                title: i.title,
                qty: i.quantity,
                price_at_purchase: i.price_at_purchase,
            })
            .collect(),
        subtotal: model.subtotal,
        shipping: model.shipping,
        tax: model.tax,
        total: model.total,
        estimated_delivery: model.estimated_delivery,
        tracking_number: model.tracking_number,
        payment: PaymentInfo {
            provider: model.payment_provider,
            order_id: model.payment_order_id,
            payment_id: model.payment_id,
            status: model.payment_status,
        },
        shipping_address: model.shipping_address,
        created_at: model.created_at,
        updated_at: model.updated_at,
    }
}
