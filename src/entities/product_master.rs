use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::ActiveValue::Set;
use serde::{Deserialize, Serialize};

/// Authoritative product record, one row per canonical reference code.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "product_master")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub reference_code: String,

    pub ean: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,
    pub size: Option<String>,
    pub colour: Option<String>,
    pub family: Option<String>,
    pub brand: Option<String>,
    pub season: Option<String>,
    pub material: Option<String>,

    /// Stock hint taken from the last merged line or upsert
    pub quantity_on_hand: Option<Decimal>,
    /// Baseline for the cost plausibility rule
    pub unit_cost: Option<Decimal>,
    pub retail_price: Option<Decimal>,
    pub outlet_price: Option<Decimal>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        let now = Utc::now();
        if insert {
            active_model.created_at = Set(now);
        }
        active_model.updated_at = Set(now);
        Ok(active_model)
    }
}
