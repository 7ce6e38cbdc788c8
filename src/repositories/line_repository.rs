use sea_orm::{
    ActiveModelTrait, ActiveValue, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Value,
};

use crate::entities::invoice_line::{
    ActiveModel as LineActiveModel, Column, Entity as InvoiceLine, Model as LineModel,
};
use crate::errors::{conflict_on_unique, ServiceError};

/// Repository for invoice lines
#[derive(Debug, Clone, Copy, Default)]
pub struct LineRepository;

impl LineRepository {
    /// Inserts a line; a duplicate `(invoice, reference code)` is a conflict.
    pub async fn insert<C: ConnectionTrait>(
        conn: &C,
        line: LineActiveModel,
    ) -> Result<LineModel, ServiceError> {
        let message = duplicate_message(&line);
        line.insert(conn)
            .await
            .map_err(|e| conflict_on_unique(e, || message))
    }

    pub async fn update<C: ConnectionTrait>(
        conn: &C,
        line: LineActiveModel,
    ) -> Result<LineModel, ServiceError> {
        let message = duplicate_message(&line);
        line.update(conn)
            .await
            .map_err(|e| conflict_on_unique(e, || message))
    }

    /// Line `line_id` of invoice `invoice_id`, or `NotFound`
    pub async fn get<C: ConnectionTrait>(
        conn: &C,
        invoice_id: i32,
        line_id: i32,
    ) -> Result<LineModel, ServiceError> {
        InvoiceLine::find_by_id(line_id)
            .filter(Column::InvoiceId.eq(invoice_id))
            .one(conn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Line {} not found on invoice {}",
                    line_id, invoice_id
                ))
            })
    }

    pub async fn list_for_invoice<C: ConnectionTrait>(
        conn: &C,
        invoice_id: i32,
    ) -> Result<Vec<LineModel>, ServiceError> {
        Ok(InvoiceLine::find()
            .filter(Column::InvoiceId.eq(invoice_id))
            .order_by_asc(Column::Id)
            .all(conn)
            .await?)
    }

    pub async fn delete_for_invoice<C: ConnectionTrait>(
        conn: &C,
        invoice_id: i32,
    ) -> Result<u64, ServiceError> {
        let result = InvoiceLine::delete_many()
            .filter(Column::InvoiceId.eq(invoice_id))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }
}

fn current<V>(value: &ActiveValue<V>) -> Option<V>
where
    V: Into<Value> + Clone,
{
    match value {
        ActiveValue::Set(v) | ActiveValue::Unchanged(v) => Some(v.clone()),
        ActiveValue::NotSet => None,
    }
}

fn duplicate_message(line: &LineActiveModel) -> String {
    let invoice = current(&line.invoice_id).map_or_else(|| "?".to_string(), |id| id.to_string());
    let code = current(&line.reference_code).flatten();
    format!(
        "Invoice {} already has a line with reference code {}",
        invoice,
        code.as_deref().unwrap_or("<none>")
    )
}
