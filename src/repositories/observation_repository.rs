use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, Set,
};

use crate::entities::price_observation::{
    ActiveModel as ObservationActiveModel, Column, Entity as PriceObservation,
    Model as ObservationModel,
};
use crate::errors::ServiceError;
use crate::services::pricing::PriceHistory;

/// Fields of one ledger entry.
#[derive(Debug, Clone)]
pub struct NewObservation<'a> {
    pub supplier_id: &'a str,
    pub reference_code: &'a str,
    pub observed_price: Decimal,
    pub invoice_id: i32,
    pub line_id: i32,
}

/// Repository for the append-only price ledger
#[derive(Debug, Clone, Copy, Default)]
pub struct ObservationRepository;

impl ObservationRepository {
    /// Appends an observation unless one already exists for the line.
    /// Returns whether a row was written.
    pub async fn append<C: ConnectionTrait>(
        conn: &C,
        observation: NewObservation<'_>,
    ) -> Result<bool, ServiceError> {
        let row = ObservationActiveModel {
            supplier_id: Set(observation.supplier_id.to_string()),
            reference_code: Set(observation.reference_code.to_string()),
            observed_price: Set(observation.observed_price),
            invoice_id: Set(observation.invoice_id),
            line_id: Set(observation.line_id),
            created_at: Set(Utc::now()),
            ..Default::default()
        };

        let inserted = PriceObservation::insert(row)
            .on_conflict(
                OnConflict::columns([Column::InvoiceId, Column::LineId])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
        Ok(inserted > 0)
    }

    /// Newest first
    pub async fn recent_for_code<C: ConnectionTrait>(
        conn: &C,
        reference_code: &str,
        limit: u64,
    ) -> Result<Vec<ObservationModel>, ServiceError> {
        Ok(PriceObservation::find()
            .filter(Column::ReferenceCode.eq(reference_code))
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id)
            .limit(limit)
            .all(conn)
            .await?)
    }
}

/// [`PriceHistory`] backed by the ledger, read through the caller's
/// connection so it sees the same transaction.
pub struct LedgerHistory<'a, C> {
    conn: &'a C,
}

impl<'a, C: ConnectionTrait> LedgerHistory<'a, C> {
    pub fn new(conn: &'a C) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl<'a, C: ConnectionTrait> PriceHistory for LedgerHistory<'a, C> {
    async fn recent_prices(
        &self,
        reference_code: &str,
        limit: u64,
    ) -> Result<Vec<Decimal>, ServiceError> {
        let rows = ObservationRepository::recent_for_code(self.conn, reference_code, limit).await?;
        Ok(rows.into_iter().map(|row| row.observed_price).collect())
    }
}
