use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Product entity for the fragrance catalog.
///
/// The order pipeline is the only consumer that mutates rows here, and it
/// does so exclusively through conditional stock updates; stock never goes
/// negative.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, utoipa::ToSchema)]
#[sea_orm(table_name = "products")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub title: String,
    #[sea_orm(unique)]
    pub slug: String,
    pub brand: String,
    pub gender: Gender,
    pub family: FragranceFamily,
    /// Fragrance notes, stored as a JSON array of strings.
    #[sea_orm(column_type = "Json")]
    #[schema(value_type = Object)]
    pub notes: Json,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    pub price: Decimal,
    /// List price; the storefront renders price against this.
    pub mrp: Decimal,
    pub stock: i32,
    pub rating_avg: Decimal,
    pub rating_count: i32,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::order_item::Entity")]
    OrderItems,
}

impl Related<super::order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::OrderItems.def()
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
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[sea_orm(string_value = "men")]
    Men,
    #[sea_orm(string_value = "women")]
    Women,
    #[sea_orm(string_value = "unisex")]
    Unisex,
}

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
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "lowercase")]
pub enum FragranceFamily {
    #[sea_orm(string_value = "citrus")]
    Citrus,
    #[sea_orm(string_value = "floral")]
    Floral,
    #[sea_orm(string_value = "woody")]
    Woody,
    #[sea_orm(string_value = "oriental")]
    Oriental,
    #[sea_orm(string_value = "fresh")]
    Fresh,
    #[sea_orm(string_value = "gourmand")]
    Gourmand,
}

impl FragranceFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Citrus => "citrus",
            Self::Floral => "floral",
            Self::Woody => "woody",
            Self::Oriental => "oriental",
            Self::Fresh => "fresh",
            Self::Gourmand => "gourmand",
        }
    }
}
