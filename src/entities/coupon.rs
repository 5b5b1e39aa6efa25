use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Discount coupon.
///
/// The applicability columns are JSON arrays (product ids as strings, or
/// category/brand names); an empty array means "no restriction". The global
/// `usage_count` is only ever bumped through a conditional update that keeps
/// it below `usage_limit`.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, utoipa::ToSchema)]
#[sea_orm(table_name = "coupons")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    #[sea_orm(unique)]
    pub code: String,
    pub description: String,
    pub kind: CouponKind,
    /// Percentage (10 for 10%) or fixed amount; zero for free-shipping codes.
    pub value: Decimal,
    pub minimum_order_amount: Decimal,
    /// Caps percentage discounts when set.
    pub maximum_discount_amount: Option<Decimal>,
    pub usage_limit: i32,
    pub usage_count: i32,
    pub user_usage_limit: i32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    #[sea_orm(column_type = "Json")]
    #[schema(value_type = Object)]
    pub applicable_products: Json,
    #[sea_orm(column_type = "Json")]
    #[schema(value_type = Object)]
    pub applicable_categories: Json,
    #[sea_orm(column_type = "Json")]
    #[schema(value_type = Object)]
    pub applicable_brands: Json,
    #[sea_orm(column_type = "Json")]
    #[schema(value_type = Object)]
    pub excluded_products: Json,
    pub first_time_user: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::coupon_usage::Entity")]
    Usages,
}

impl Related<super::coupon_usage::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Usages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    EnumIter,
    DeriveActiveEnum,
    utoipa::ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
pub enum CouponKind {
    #[sea_orm(string_value = "percentage")]
    Percentage,
    #[sea_orm(string_value = "fixed")]
    Fixed,
    #[sea_orm(string_value = "free_shipping")]
    FreeShipping,
}
