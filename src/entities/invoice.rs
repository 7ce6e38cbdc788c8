use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Supplier invoice header, one row per ingested document.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    /// Supplier tax id (CIF)
    pub supplier_id: String,
    pub supplier_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    pub total_amount: Option<Decimal>,
    pub invoice_type: Option<String>,

    /// Raw OCR text as returned by the extractor
    #[sea_orm(column_type = "Text", nullable)]
    pub raw_text: Option<String>,

    pub source_channel: Option<String>,
    pub source_thread_id: Option<String>,
    pub source_message_id: Option<String>,

    pub status: InvoiceStatus,
    pub error_code: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_message: Option<String>,

    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    /// Lower-case hex SHA-256 of the source document
    pub file_sha256: Option<String>,
    pub file_size: Option<i64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Review workflow state of an invoice.
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
    strum::Display,
    strum::EnumString,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InvoiceStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "needs_review")]
    NeedsReview,
    #[sea_orm(string_value = "reviewed")]
    Reviewed,
    #[sea_orm(string_value = "exported")]
    Exported,
}

impl InvoiceStatus {
    /// Exported invoices are final; every other state may move freely.
    pub fn can_transition_to(self, next: InvoiceStatus) -> bool {
        self != InvoiceStatus::Exported || next == InvoiceStatus::Exported
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::invoice_line::Entity")]
    Lines,
    #[sea_orm(has_many = "super::price_observation::Entity")]
    PriceObservations,
}

impl Related<super::invoice_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
    }
}

impl Related<super::price_observation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PriceObservations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
