pub mod coupons;
pub mod inventory;
pub mod orders;
pub mod payments;

use std::sync::Arc;

use crate::{
    config::AppConfig,
    db::DbPool,
    events::EventSender,
    services::{
        coupons::CouponService,
        inventory::InventoryService,
        notifications::Mailer,
        order_status::OrderStatusService,
        orders::OrderService,
        payments::{PaymentService, RazorpayClient},
    },
};

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: Arc<OrderService>,
    pub order_status: Arc<OrderStatusService>,
    pub coupons: Arc<CouponService>,
    pub payments: Arc<PaymentService>,
    pub inventory: Arc<InventoryService>,
}

impl AppServices {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, config: &AppConfig) -> Self {
        let mailer = Mailer::new(config.email_relay_url.clone(), config.admin_email.clone());
        let razorpay = RazorpayClient::new(
            config.razorpay_api_url.clone(),
            config.razorpay_key_id.clone(),
            config.razorpay_key_secret.clone(),
        );

        let orders = Arc::new(OrderService::new(
            db.clone(),
            event_sender.clone(),
            razorpay,
            mailer.clone(),
        ));
        let order_status = Arc::new(OrderStatusService::new(db.clone(), event_sender.clone()));
        let coupons = Arc::new(CouponService::new(db.clone(), event_sender.clone()));
        let payments = Arc::new(PaymentService::new(
            db.clone(),
            event_sender.clone(),
            config.razorpay_key_secret.clone(),
        ));
        let inventory = Arc::new(InventoryService::new(db, event_sender, mailer));

        Self {
            orders,
            order_status,
            coupons,
            payments,
            inventory,
        }
    }
}
