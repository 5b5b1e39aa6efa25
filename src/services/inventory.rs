use std::sync::Arc;

use rust_decimal::Decimal;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    db::DbPool,
    entities::product::{self, Entity as ProductEntity},
    errors::ServiceError,
    events::{Event, EventSender},
    services::notifications::Mailer,
};

/// Stock at or below this level triggers an alert after an admin adjustment.
const ALERT_THRESHOLD: i32 = 5;
const DEFAULT_REPORT_THRESHOLD: i32 = 10;

/// Decrements product stock, guarded by the stock level itself: the UPDATE
/// only matches while `stock >= quantity`, so two concurrent orders can
/// never drive stock negative. Zero rows affected means the stock ran out
/// between the caller's check and this write.
pub async fn decrement_stock<C: ConnectionTrait>(
    db: &C,
    product_id: Uuid,
    quantity: i32,
    title: &str,
) -> Result<(), ServiceError> {
    let result = ProductEntity::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).sub(quantity),
        )
        .filter(product::Column::Id.eq(product_id))
        .filter(product::Column::Stock.gte(quantity))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::InsufficientStock(format!(
            "Insufficient stock for {}",
            title
        )));
    }

    Ok(())
}

/// Returns previously decremented stock, e.g. on cancellation.
pub async fn restore_stock<C: ConnectionTrait>(
    db: &C,
    product_id: Uuid,
    quantity: i32,
) -> Result<(), ServiceError> {
    ProductEntity::update_many()
        .col_expr(
            product::Column::Stock,
            Expr::col(product::Column::Stock).add(quantity),
        )
        .filter(product::Column::Id.eq(product_id))
        .exec(db)
        .await?;

    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AdjustOperation {
    Add,
    Subtract,
    Set,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StockAdjustment {
    pub product_id: Uuid,
    pub title: String,
    pub old_stock: i32,
    pub new_stock: i32,
    pub operation: AdjustOperation,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InventorySummary {
    pub total_products: u64,
    pub in_stock: u64,
    pub low_stock: u64,
    pub out_of_stock: u64,
    pub total_value: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct InventoryReport {
    pub threshold: i32,
    pub summary: InventorySummary,
    pub low_stock: Vec<product::Model>,
    pub out_of_stock: Vec<product::Model>,
}

/// Administrative inventory bookkeeping over the product store.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DbPool>,
    event_sender: EventSender,
    mailer: Mailer,
}

impl InventoryService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender, mailer: Mailer) -> Self {
        Self {
            db,
            event_sender,
            mailer,
        }
    }

    /// Applies a manual stock adjustment. Subtract and set floor at zero;
    /// the stock invariant is never relaxed for admin edits.
    #[instrument(skip(self), fields(product_id = %product_id, operation = ?operation))]
    pub async fn adjust_stock(
        &self,
        product_id: Uuid,
        operation: AdjustOperation,
        quantity: i32,
        reason: Option<String>,
    ) -> Result<StockAdjustment, ServiceError> {
        if quantity < 0 {
            return Err(ServiceError::ValidationError(
                "Quantity must be non-negative".to_string(),
            ));
        }

        let txn = self.db.begin().await?;

        let prod = ProductEntity::find_by_id(product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Product not found".to_string()))?;

        let old_stock = prod.stock;
        let new_stock = match operation {
            AdjustOperation::Add => old_stock + quantity,
            AdjustOperation::Subtract => (old_stock - quantity).max(0),
            AdjustOperation::Set => quantity.max(0),
        };

        ProductEntity::update_many()
            .col_expr(product::Column::Stock, Expr::value(new_stock))
            .filter(product::Column::Id.eq(product_id))
            .exec(&txn)
            .await?;

        txn.commit().await?;

        info!(
            product_id = %product_id,
            old_stock,
            new_stock,
            reason = reason.as_deref().unwrap_or("unspecified"),
            "Stock adjusted"
        );

        self.event_sender
            .send(Event::StockAdjusted {
                product_id,
                old_stock,
                new_stock,
            })
            .await;

        if (1..=ALERT_THRESHOLD).contains(&new_stock) {
            self.event_sender
                .send(Event::LowStock {
                    product_id,
                    stock: new_stock,
                })
                .await;

            let mailer = self.mailer.clone();
            let title = prod.title.clone();
            tokio::spawn(async move {
                mailer.send_low_stock_alert(&title, new_stock).await;
            });
        }

        Ok(StockAdjustment {
            product_id,
            title: prod.title,
            old_stock,
            new_stock,
            operation,
        })
    }

    /// Buckets the catalog by stock level and totals the on-hand value.
    #[instrument(skip(self))]
    pub async fn report(&self, threshold: Option<i32>) -> Result<InventoryReport, ServiceError> {
        let threshold = threshold.unwrap_or(DEFAULT_REPORT_THRESHOLD);

        let products = ProductEntity::find()
            .order_by_asc(product::Column::Stock)
            .all(&*self.db)
            .await?;

        let total_value: Decimal = products
            .iter()
            .map(|p| p.price * Decimal::from(p.stock))
            .sum();

        let (mut in_stock, mut low, mut out) = (0u64, Vec::new(), Vec::new());
        for p in products.iter() {
            if p.stock == 0 {
                out.push(p.clone());
            } else if p.stock <= threshold {
                low.push(p.clone());
            } else {
                in_stock += 1;
            }
        }

        Ok(InventoryReport {
            threshold,
            summary: InventorySummary {
                total_products: products.len() as u64,
                in_stock,
                low_stock: low.len() as u64,
                out_of_stock: out.len() as u64,
                total_value,
            },
            low_stock: low,
            out_of_stock: out,
        })
    }

    /// Products with stock in 1..=threshold, lowest first.
    #[instrument(skip(self))]
    pub async fn low_stock(&self, threshold: i32) -> Result<Vec<product::Model>, ServiceError> {
        let products = ProductEntity::find()
            .filter(product::Column::Stock.lte(threshold))
            .filter(product::Column::Stock.gt(0))
            .order_by_asc(product::Column::Stock)
            .all(&*self.db)
            .await?;

        Ok(products)
    }
}
