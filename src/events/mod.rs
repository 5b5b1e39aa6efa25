use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

/// Events emitted by the services after state changes commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    OrderCreated {
        order_id: Uuid,
        order_number: String,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: String,
        new_status: String,
    },
    OrderCancelled(Uuid),
    PaymentCaptured {
        order_id: Uuid,
        payment_id: String,
    },
    StockAdjusted {
        product_id: Uuid,
        old_stock: i32,
        new_stock: i32,
    },
    LowStock {
        product_id: Uuid,
        stock: i32,
    },
    CouponRedeemed {
        coupon_id: Uuid,
        order_id: Uuid,
        discount_amount: Decimal,
    },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event; a full or closed channel is logged, never surfaced,
    /// since events are strictly post-commit notifications.
    pub async fn send(&self, event: Event) {
        if let Err(e) = self.sender.send(event).await {
            warn!("Failed to send event: {}", e);
        }
    }
}

/// Drains the event channel for the lifetime of the process. Currently a
/// structured-logging sink; integrations subscribe here.
pub async fn process_events(mut receiver: mpsc::Receiver<Event>) {
    while let Some(event) = receiver.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                order_number,
            } => {
                info!(%order_id, %order_number, "event: order created");
            }
            Event::OrderStatusChanged {
                order_id,
                old_status,
                new_status,
            } => {
                info!(%order_id, %old_status, %new_status, "event: order status changed");
            }
            Event::OrderCancelled(order_id) => {
                info!(%order_id, "event: order cancelled");
            }
            Event::PaymentCaptured {
                order_id,
                payment_id,
            } => {
                info!(%order_id, %payment_id, "event: payment captured");
            }
            Event::StockAdjusted {
                product_id,
                old_stock,
                new_stock,
            } => {
                info!(%product_id, old_stock, new_stock, "event: stock adjusted");
            }
            Event::LowStock { product_id, stock } => {
                warn!(%product_id, stock, "event: low stock");
            }
            Event::CouponRedeemed {
                coupon_id,
                order_id,
                discount_amount,
            } => {
                info!(%coupon_id, %order_id, %discount_amount, "event: coupon redeemed");
            }
        }
    }
}
