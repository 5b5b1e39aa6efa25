use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, EntityTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    db::DbPool,
    entities::coupon::{self, CouponKind, Entity as CouponEntity},
    entities::coupon_usage::{self, Entity as CouponUsageEntity},
    entities::order::{self, Entity as OrderEntity},
    entities::product::Entity as ProductEntity,
    errors::ServiceError,
    events::{Event, EventSender},
};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CartItemInput {
    pub product_id: Uuid,
    #[serde(alias = "qty")]
    #[validate(range(min = 1))]
    pub quantity: i32,
    /// Client-side unit price; used only to weight applicability. The order
    /// pipeline re-prices from the product store before charging anyone.
    pub price: Decimal,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ValidateCouponRequest {
    #[validate(length(min = 1, message = "Coupon code is required"))]
    pub code: String,
    #[validate(length(min = 1, message = "Cart must not be empty"), nested)]
    pub cart_items: Vec<CartItemInput>,
    pub cart_total: Decimal,
}

/// Outcome of a successful validation. Purely descriptive: nothing is
/// consumed until `apply` records the redemption.
#[derive(Debug, Serialize, ToSchema)]
pub struct DiscountDescriptor {
    pub coupon_id: Uuid,
    pub code: String,
    pub description: String,
    pub kind: CouponKind,
    pub discount_amount: Decimal,
    pub free_shipping: bool,
    pub applicable_items: usize,
    pub total_applicable_amount: Decimal,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ApplyCouponRequest {
    pub coupon_id: Uuid,
    pub order_id: Uuid,
    pub discount_amount: Decimal,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCouponRequest {
    #[validate(length(min = 3, max = 20))]
    pub code: String,
    #[validate(length(min = 1, max = 200))]
    pub description: String,
    pub kind: CouponKind,
    #[serde(default)]
    pub value: Decimal,
    #[serde(default)]
    pub minimum_order_amount: Decimal,
    pub maximum_discount_amount: Option<Decimal>,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1))]
    pub usage_limit: i32,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1))]
    pub user_usage_limit: i32,
    pub valid_from: Option<DateTime<Utc>>,
    pub valid_until: DateTime<Utc>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub applicable_products: Vec<Uuid>,
    #[serde(default)]
    pub applicable_categories: Vec<String>,
    #[serde(default)]
    pub applicable_brands: Vec<String>,
    #[serde(default)]
    pub excluded_products: Vec<Uuid>,
    #[serde(default)]
    pub first_time_user: bool,
}

fn default_limit() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateCouponRequest {
    pub description: Option<String>,
    pub minimum_order_amount: Option<Decimal>,
    pub maximum_discount_amount: Option<Decimal>,
    #[validate(range(min = 1))]
    pub usage_limit: Option<i32>,
    #[validate(range(min = 1))]
    pub user_usage_limit: Option<i32>,
    pub valid_until: Option<DateTime<Utc>>,
    pub is_active: Option<bool>,
    pub first_time_user: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CouponListFilter {
    pub is_active: Option<bool>,
    pub kind: Option<CouponKind>,
    pub search: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CouponStats {
    pub total_usage: u64,
    pub total_discount: Decimal,
    pub unique_users: u64,
    /// Redemptions as a percentage of usage_limit
    pub usage_rate: Decimal,
    pub recent_usage: Vec<coupon_usage::Model>,
}

/// Discount for an eligible cart. Separated out so the arithmetic is
/// testable without a database.
pub fn compute_discount(
    kind: CouponKind,
    value: Decimal,
    maximum_discount_amount: Option<Decimal>,
    applicable_total: Decimal,
) -> (Decimal, bool) {
    match kind {
        CouponKind::Percentage => {
            let mut discount = applicable_total * value / Decimal::from(100);
            if let Some(cap) = maximum_discount_amount {
                discount = discount.min(cap);
            }
            (round_money(discount), false)
        }
        CouponKind::Fixed => (round_money(value.min(applicable_total)), false),
        // The shipping waiver is applied by the caller, not priced here.
        CouponKind::FreeShipping => (Decimal::ZERO, true),
    }
}

fn round_money(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

fn ids_from_json(value: &serde_json::Value) -> Vec<Uuid> {
    value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().and_then(|s| Uuid::parse_str(s).ok()))
                .collect()
        })
        .unwrap_or_default()
}

fn strings_from_json(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}

fn ids_to_json(ids: &[Uuid]) -> serde_json::Value {
    serde_json::Value::Array(
        ids.iter()
            .map(|id| serde_json::Value::String(id.to_string()))
            .collect(),
    )
}

fn strings_to_json(values: &[String]) -> serde_json::Value {
    serde_json::Value::Array(
        values
            .iter()
            .map(|s| serde_json::Value::String(s.clone()))
            .collect(),
    )
}

/// Write-time rules shared by create and update.
fn check_coupon_rules(
    kind: CouponKind,
    value: Decimal,
    valid_from: DateTime<Utc>,
    valid_until: DateTime<Utc>,
) -> Result<Decimal, ServiceError> {
    if valid_until <= valid_from {
        return Err(ServiceError::ValidationError(
            "Valid until date must be after valid from date".to_string(),
        ));
    }

    match kind {
        CouponKind::Percentage => {
            if value < Decimal::ONE || value > Decimal::from(100) {
                return Err(ServiceError::ValidationError(
                    "Percentage value must be between 1 and 100".to_string(),
                ));
            }
            Ok(value)
        }
        CouponKind::Fixed => {
            if value <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(
                    "Fixed discount value must be positive".to_string(),
                ));
            }
            Ok(value)
        }
        // Free-shipping codes carry no monetary value.
        CouponKind::FreeShipping => Ok(Decimal::ZERO),
    }
}

#[derive(Clone)]
pub struct CouponService {
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl CouponService {
    pub fn new(db: Arc<DbPool>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Eligibility check. Ordered, short-circuiting on the first failure;
    /// read-only, so calling it twice without an intervening `apply` yields
    /// identical results.
    #[instrument(skip(self, request), fields(customer_id = %customer_id, code = %request.code))]
    pub async fn validate(
        &self,
        customer_id: Uuid,
        request: ValidateCouponRequest,
    ) -> Result<DiscountDescriptor, ServiceError> {
        request.validate()?;
        let db = &*self.db;

        // 1. Lookup by uppercased code; must exist and be active.
        let coupon = CouponEntity::find()
            .filter(coupon::Column::Code.eq(request.code.trim().to_uppercase()))
            .filter(coupon::Column::IsActive.eq(true))
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Invalid coupon code".to_string()))?;

        // 2. Validity window.
        let now = Utc::now();
        if now < coupon.valid_from || now > coupon.valid_until {
            return Err(ServiceError::InvalidOperation(
                "Coupon has expired or is not yet active".to_string(),
            ));
        }

        // 3. Global usage limit.
        if coupon.usage_count >= coupon.usage_limit {
            return Err(ServiceError::InvalidOperation(
                "Coupon usage limit reached".to_string(),
            ));
        }

        // 4. Per-user usage limit.
        let user_usage = CouponUsageEntity::find()
            .filter(coupon_usage::Column::CouponId.eq(coupon.id))
            .filter(coupon_usage::Column::CustomerId.eq(customer_id))
            .count(db)
            .await?;
        if user_usage >= coupon.user_usage_limit as u64 {
            return Err(ServiceError::InvalidOperation(
                "You have reached the usage limit for this coupon".to_string(),
            ));
        }

        // 5. Minimum order amount.
        if request.cart_total < coupon.minimum_order_amount {
            return Err(ServiceError::InvalidOperation(format!(
                "Minimum order amount of ₹{} required",
                coupon.minimum_order_amount
            )));
        }

        // 6. First-time-user restriction.
        if coupon.first_time_user {
            let order_count = OrderEntity::find()
                .filter(order::Column::CustomerId.eq(customer_id))
                .count(db)
                .await?;
            if order_count > 0 {
                return Err(ServiceError::InvalidOperation(
                    "This coupon is only for first-time users".to_string(),
                ));
            }
        }

        // 7. Applicability filter per cart line.
        let applicable_products = ids_from_json(&coupon.applicable_products);
        let applicable_categories = strings_from_json(&coupon.applicable_categories);
        let applicable_brands = strings_from_json(&coupon.applicable_brands);
        let excluded_products = ids_from_json(&coupon.excluded_products);

        let mut applicable_total = Decimal::ZERO;
        let mut applicable_items = 0usize;

        for item in &request.cart_items {
            // A stale cart line for a deleted product simply does not count.
            let Some(product) = ProductEntity::find_by_id(item.product_id).one(db).await? else {
                continue;
            };

            if excluded_products.contains(&product.id) {
                continue;
            }
            if !applicable_products.is_empty() && !applicable_products.contains(&product.id) {
                continue;
            }
            if !applicable_categories.is_empty()
                && !applicable_categories
                    .iter()
                    .any(|c| c == product.family.as_str())
            {
                continue;
            }
            if !applicable_brands.is_empty() && !applicable_brands.contains(&product.brand) {
                continue;
            }

            applicable_items += 1;
            applicable_total += item.price * Decimal::from(item.quantity);
        }

        // 8. At least one eligible line.
        if applicable_total.is_zero() {
            return Err(ServiceError::InvalidOperation(
                "No items in your cart are eligible for this coupon".to_string(),
            ));
        }

        // 9. Discount.
        let (discount_amount, free_shipping) = compute_discount(
            coupon.kind,
            coupon.value,
            coupon.maximum_discount_amount,
            applicable_total,
        );

        Ok(DiscountDescriptor {
            coupon_id: coupon.id,
            code: coupon.code,
            description: coupon.description,
            kind: coupon.kind,
            discount_amount,
            free_shipping,
            applicable_items,
            total_applicable_amount: applicable_total,
        })
    }

    /// Records a redemption. The usage counter is bumped by a conditional
    /// update that only matches while `usage_count < usage_limit`, so
    /// concurrent redemptions cannot overrun the limit; when the counter is
    /// exhausted the usage row rolls back with the transaction.
    #[instrument(skip(self, request), fields(coupon_id = %request.coupon_id, order_id = %request.order_id))]
    pub async fn apply(
        &self,
        customer_id: Uuid,
        request: ApplyCouponRequest,
    ) -> Result<(), ServiceError> {
        request.validate()?;

        let txn = self.db.begin().await?;

        CouponEntity::find_by_id(request.coupon_id)
            .one(&txn)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Coupon not found".to_string()))?;

        coupon_usage::ActiveModel {
            id: Set(Uuid::new_v4()),
            coupon_id: Set(request.coupon_id),
            customer_id: Set(customer_id),
            order_id: Set(request.order_id),
            discount_amount: Set(request.discount_amount),
            used_at: Set(Utc::now()),
        }
        .insert(&txn)
        .await?;

        let result = CouponEntity::update_many()
            .col_expr(
                coupon::Column::UsageCount,
                Expr::col(coupon::Column::UsageCount).add(1),
            )
            .col_expr(coupon::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(coupon::Column::Id.eq(request.coupon_id))
            .filter(
                Expr::col(coupon::Column::UsageCount).lt(Expr::col(coupon::Column::UsageLimit)),
            )
            .exec(&txn)
            .await?;

        if result.rows_affected == 0 {
            return Err(ServiceError::Conflict(
                "Coupon usage limit reached".to_string(),
            ));
        }

        txn.commit().await?;

        info!(coupon_id = %request.coupon_id, order_id = %request.order_id, "Coupon applied");

        self.event_sender
            .send(Event::CouponRedeemed {
                coupon_id: request.coupon_id,
                order_id: request.order_id,
                discount_amount: request.discount_amount,
            })
            .await;

        Ok(())
    }

    #[instrument(skip(self, request), fields(code = %request.code))]
    pub async fn create(&self, request: CreateCouponRequest) -> Result<coupon::Model, ServiceError> {
        request.validate()?;

        let now = Utc::now();
        let valid_from = request.valid_from.unwrap_or(now);
        let value = check_coupon_rules(request.kind, request.value, valid_from, request.valid_until)?;

        let code = request.code.trim().to_uppercase();

        let existing = CouponEntity::find()
            .filter(coupon::Column::Code.eq(code.clone()))
            .one(&*self.db)
            .await?;
        if existing.is_some() {
            return Err(ServiceError::Conflict(
                "Coupon code already exists".to_string(),
            ));
        }

        let model = coupon::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code),
            description: Set(request.description),
            kind: Set(request.kind),
            value: Set(value),
            minimum_order_amount: Set(request.minimum_order_amount),
            maximum_discount_amount: Set(request.maximum_discount_amount),
            usage_limit: Set(request.usage_limit),
            usage_count: Set(0),
            user_usage_limit: Set(request.user_usage_limit),
            valid_from: Set(valid_from),
            valid_until: Set(request.valid_until),
            is_active: Set(request.is_active),
            applicable_products: Set(ids_to_json(&request.applicable_products)),
            applicable_categories: Set(strings_to_json(&request.applicable_categories)),
            applicable_brands: Set(strings_to_json(&request.applicable_brands)),
            excluded_products: Set(ids_to_json(&request.excluded_products)),
            first_time_user: Set(request.first_time_user),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db)
        .await?;

        info!(coupon_id = %model.id, code = %model.code, "Coupon created");

        Ok(model)
    }

    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: CouponListFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<coupon::Model>, u64), ServiceError> {
        let mut query = CouponEntity::find().order_by_desc(coupon::Column::CreatedAt);

        if let Some(active) = filter.is_active {
            query = query.filter(coupon::Column::IsActive.eq(active));
        }
        if let Some(kind) = filter.kind {
            query = query.filter(coupon::Column::Kind.eq(kind));
        }
        if let Some(search) = filter.search.filter(|s| !s.is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(coupon::Column::Code.contains(search.to_uppercase()))
                    .add(coupon::Column::Description.contains(search)),
            );
        }

        let paginator = query.paginate(&*self.db, limit.max(1));
        let total = paginator.num_items().await?;
        let coupons = paginator.fetch_page(page.saturating_sub(1)).await?;

        Ok((coupons, total))
    }

    pub async fn get(&self, coupon_id: Uuid) -> Result<coupon::Model, ServiceError> {
        CouponEntity::find_by_id(coupon_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Coupon not found".to_string()))
    }

    #[instrument(skip(self, request), fields(coupon_id = %coupon_id))]
    pub async fn update(
        &self,
        coupon_id: Uuid,
        request: UpdateCouponRequest,
    ) -> Result<coupon::Model, ServiceError> {
        request.validate()?;

        let existing = self.get(coupon_id).await?;

        let valid_until = request.valid_until.unwrap_or(existing.valid_until);
        check_coupon_rules(existing.kind, existing.value, existing.valid_from, valid_until)?;

        let mut active: coupon::ActiveModel = existing.into();
        if let Some(description) = request.description {
            active.description = Set(description);
        }
        if let Some(minimum) = request.minimum_order_amount {
            active.minimum_order_amount = Set(minimum);
        }
        if request.maximum_discount_amount.is_some() {
            active.maximum_discount_amount = Set(request.maximum_discount_amount);
        }
        if let Some(limit) = request.usage_limit {
            active.usage_limit = Set(limit);
        }
        if let Some(limit) = request.user_usage_limit {
            active.user_usage_limit = Set(limit);
        }
        if let Some(until) = request.valid_until {
            active.valid_until = Set(until);
        }
        if let Some(is_active) = request.is_active {
            active.is_active = Set(is_active);
        }
        if let Some(first_time) = request.first_time_user {
            active.first_time_user = Set(first_time);
        }
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db).await?;

        Ok(updated)
    }

    #[instrument(skip(self), fields(coupon_id = %coupon_id))]
    pub async fn delete(&self, coupon_id: Uuid) -> Result<(), ServiceError> {
        let existing = self.get(coupon_id).await?;
        let active: coupon::ActiveModel = existing.into();
        CouponEntity::delete(active).exec(&*self.db).await?;
        Ok(())
    }

    /// Redemption statistics for the admin dashboard.
    #[instrument(skip(self), fields(coupon_id = %coupon_id))]
    pub async fn stats(&self, coupon_id: Uuid) -> Result<CouponStats, ServiceError> {
        let coupon = self.get(coupon_id).await?;

        let usages = CouponUsageEntity::find()
            .filter(coupon_usage::Column::CouponId.eq(coupon_id))
            .order_by_desc(coupon_usage::Column::UsedAt)
            .all(&*self.db)
            .await?;

        let total_usage = usages.len() as u64;
        let total_discount: Decimal = usages.iter().map(|u| u.discount_amount).sum();
        let unique_users = usages
            .iter()
            .map(|u| u.customer_id)
            .collect::<HashSet<_>>()
            .len() as u64;
        let usage_rate = if coupon.usage_limit > 0 {
            round_money(
                Decimal::from(total_usage) / Decimal::from(coupon.usage_limit)
                    * Decimal::from(100),
            )
        } else {
            Decimal::ZERO
        };

        let recent_usage = usages.into_iter().take(10).collect();

        Ok(CouponStats {
            total_usage,
            total_discount,
            unique_users,
            usage_rate,
            recent_usage,
        })
    }
}
