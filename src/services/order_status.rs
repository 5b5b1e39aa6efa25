use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    entities::order_item::{self, Entity as OrderItemEntity},
    entities::order_status_history::{self, Entity as HistoryEntity},
    errors::ServiceError,
    events::{Event, EventSender},
};

pub const DEFAULT_SHIPPED_LOCATION: &str = "Warehouse - Mumbai";

/// Canned per-status messages, keyed by the closed status enum so a new
/// status cannot ship without a message.
pub fn canned_message(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Pending => "Order received and awaiting confirmation",
        OrderStatus::Confirmed => "Order confirmed and payment processed",
        OrderStatus::Processing => "Order is being prepared for shipment",
        OrderStatus::Shipped => "Order has been shipped and is on its way",
        OrderStatus::Delivered => "Order has been successfully delivered",
        OrderStatus::Cancelled => "Order has been cancelled",
    }
}

/// The happy path is linear: pending → confirmed → processing → shipped →
/// delivered. Cancellation is reachable from pending and confirmed only.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    matches!(
        (from, to),
        (OrderStatus::Pending, OrderStatus::Confirmed)
            | (OrderStatus::Pending, OrderStatus::Cancelled)
            | (OrderStatus::Confirmed, OrderStatus::Processing)
            | (OrderStatus::Confirmed, OrderStatus::Cancelled)
            | (OrderStatus::Processing, OrderStatus::Shipped)
            | (OrderStatus::Shipped, OrderStatus::Delivered)
    )
}

/// `TRK<epoch millis><4 random digits>`
pub fn generate_tracking_number() -> String {
    format!(
        "TRK{}{:04}",
        Utc::now().timestamp_millis(),
        rand::thread_rng().gen_range(0..10_000)
    )
}

/// Appends a status-history row. History is append-only: this is the only
/// write path, and nothing updates or deletes rows.
pub async fn append_history<C: ConnectionTrait>(
    db: &C,
    order_id: Uuid,
    status: OrderStatus,
    message: Option<String>,
    location: Option<String>,
) -> Result<(), ServiceError> {
    order_status_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        status: Set(status),
        message: Set(message.unwrap_or_else(|| canned_message(status).to_string())),
        location: Set(location),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await?;

    Ok(())
}

/// Resolves an order by row id, order number, or tracking number.
pub async fn find_by_public_id<C: ConnectionTrait>(
    db: &C,
    public_id: &str,
) -> Result<Option<order::Model>, ServiceError> {
    let mut condition = Condition::any()
        .add(order::Column::OrderNumber.eq(public_id))
        .add(order::Column::TrackingNumber.eq(public_id));

    if let Ok(uuid) = Uuid::parse_str(public_id) {
        condition = condition.add(order::Column::Id.eq(uuid));
    }

    let order = OrderEntity::find().filter(condition).one(db).await?;
    Ok(order)
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusHistoryEntry {
    pub status: OrderStatus,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl From<order_status_history::Model> for StatusHistoryEntry {
    fn from(model: order_status_history::Model) -> Self {
        Self {
            status: model.status,
            message: model.message,
            location: model.location,
            timestamp: model.created_at,
        }
    }
}

/// Public tracking projection. Deliberately narrow: the unauthenticated
/// endpoint must never expose the full address, payment fields, or the
/// customer's identity.
#[derive(Debug, Serialize, ToSchema)]
pub struct TrackingProjection {
    pub order_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    pub status: OrderStatus,
    pub status_history: Vec<StatusHistoryEntry>,
    pub estimated_delivery: DateTime<Utc>,
    pub item_count: u64,
    pub shipping_city: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl OrderStatusService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Administrative status transition. Validates against the transition
    /// table, appends history, and assigns the tracking number at the first
    /// transition to shipped.
    #[instrument(skip(self, message), fields(order_id = %public_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        public_id: &str,
        new_status: OrderStatus,
        message: Option<String>,
        location: Option<String>,
    ) -> Result<order::Model, ServiceError> {
        let txn = self.db.begin().await?;

        let existing = find_by_public_id(&txn, public_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Order not found".to_string()))?;

        let old_status = existing.status;
        if !is_valid_transition(old_status, new_status) {
            return Err(ServiceError::InvalidStatus(format!(
                "Cannot transition from status '{}' to '{}'",
                old_status, new_status
            )));
        }

        let order_id = existing.id;
        let tracking_number = existing.tracking_number.clone();
        let version = existing.version;

        let mut active: order::ActiveModel = existing.into();
        active.status = Set(new_status);
        active.updated_at = Set(Some(Utc::now()));
        active.version = Set(version + 1);

        // Tracking number is assigned exactly once and never overwritten.
        let mut history_location = location;
        if new_status == OrderStatus::Shipped {
            if tracking_number.is_none() {
                active.tracking_number = Set(Some(generate_tracking_number()));
            }
            if history_location.is_none() {
                history_location = Some(DEFAULT_SHIPPED_LOCATION.to_string());
            }
        }

        let updated = active.update(&txn).await?;

        append_history(&txn, order_id, new_status, message, history_location).await?;

        txn.commit().await?;

        info!(
            order_id = %order_id,
            old_status = %old_status,
            new_status = %new_status,
            "Order status updated"
        );

        self.event_sender
            .send(Event::OrderStatusChanged {
                order_id,
                old_status: old_status.to_string(),
                new_status: new_status.to_string(),
            })
            .await;

        Ok(updated)
    }

    /// Public tracking lookup by order number or tracking number.
    #[instrument(skip(self))]
    pub async fn track(&self, public_id: &str) -> Result<TrackingProjection, ServiceError> {
        let db = &*self.db;

        let order = OrderEntity::find()
            .filter(
                Condition::any()
                    .add(order::Column::OrderNumber.eq(public_id))
                    .add(order::Column::TrackingNumber.eq(public_id)),
            )
            .one(db)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(
                    "Order not found. Please check your tracking ID.".to_string(),
                )
            })?;

        let history = HistoryEntity::find()
            .filter(order_status_history::Column::OrderId.eq(order.id))
            .order_by_asc(order_status_history::Column::CreatedAt)
            .all(db)
            .await?;

        let item_count = OrderItemEntity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .all(db)
            .await?
            .len() as u64;

        let shipping_city = order
            .shipping_address
            .get("city")
            .and_then(|v| v.as_str())
            .map(|s| s.to_string());

        Ok(TrackingProjection {
            order_number: order.order_number,
            tracking_number: order.tracking_number,
            status: order.status,
            status_history: history.into_iter().map(Into::into).collect(),
            estimated_delivery: order.estimated_delivery,
            item_count,
            shipping_city,
            created_at: order.created_at,
        })
    }
}
