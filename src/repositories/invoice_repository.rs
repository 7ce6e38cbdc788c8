use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set,
};
use tracing::error;

use crate::entities::invoice::{
    ActiveModel as InvoiceActiveModel, Column, Entity as Invoice, Model as InvoiceModel,
};
use crate::entities::InvoiceStatus;
use crate::errors::ServiceError;
use crate::models::{DocumentMetadata, InvoiceFilter, InvoiceHeader};

/// Error code stored when the extractor fails
pub const OCR_FAILED: &str = "ocr_failed";

/// Error code and message stored on an invoice that needs review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceError {
    pub code: String,
    pub message: String,
}

impl InvoiceError {
    /// Failure recorded when extraction did not produce usable data.
    pub fn ocr_failed(err: &ServiceError) -> Self {
        Self {
            code: OCR_FAILED.to_string(),
            message: err.to_string(),
        }
    }
}

/// Repository for invoice headers
#[derive(Debug, Clone, Copy, Default)]
pub struct InvoiceRepository;

impl InvoiceRepository {
    pub async fn create<C: ConnectionTrait>(
        conn: &C,
        header: &InvoiceHeader,
        status: InvoiceStatus,
        document: Option<&DocumentMetadata>,
        failure: Option<&InvoiceError>,
    ) -> Result<InvoiceModel, ServiceError> {
        let now = Utc::now();
        let invoice = InvoiceActiveModel {
            supplier_id: Set(header.supplier_id.trim().to_string()),
            supplier_name: Set(header.supplier_name.clone()),
            phone: Set(header.phone.clone()),
            email: Set(header.email.clone()),
            invoice_number: Set(header.invoice_number.clone()),
            invoice_date: Set(header.invoice_date),
            total_amount: Set(header.total_amount),
            invoice_type: Set(header.invoice_type.clone()),
            raw_text: Set(header.raw_text.clone()),
            source_channel: Set(header.source_channel.clone()),
            source_thread_id: Set(header.source_thread_id.clone()),
            source_message_id: Set(header.source_message_id.clone()),
            status: Set(status),
            error_code: Set(failure.map(|f| f.code.clone())),
            error_message: Set(failure.map(|f| f.message.clone())),
            file_name: Set(document.map(|d| d.file_name.clone())),
            mime_type: Set(document.and_then(|d| d.mime_type.clone())),
            file_sha256: Set(document.map(|d| d.sha256.clone())),
            file_size: Set(document.map(|d| d.size)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        };

        invoice.insert(conn).await.map_err(|e| {
            error!("Failed to create invoice: {}", e);
            ServiceError::DatabaseError(e)
        })
    }

    pub async fn find_by_id<C: ConnectionTrait>(
        conn: &C,
        id: i32,
    ) -> Result<Option<InvoiceModel>, ServiceError> {
        Ok(Invoice::find_by_id(id).one(conn).await?)
    }

    /// Like [`Self::find_by_id`], but a missing invoice is an error
    pub async fn get<C: ConnectionTrait>(conn: &C, id: i32) -> Result<InvoiceModel, ServiceError> {
        Self::find_by_id(conn, id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Invoice {} not found", id)))
    }

    /// Newest first, filtered and paged
    pub async fn list<C: ConnectionTrait>(
        conn: &C,
        filter: &InvoiceFilter,
    ) -> Result<(Vec<InvoiceModel>, u64), ServiceError> {
        let mut condition = Condition::all();
        if let Some(supplier_id) = &filter.supplier_id {
            condition = condition.add(Column::SupplierId.eq(supplier_id.clone()));
        }
        if let Some(status) = filter.status {
            condition = condition.add(Column::Status.eq(status));
        }
        if let Some(from) = filter.created_from {
            condition = condition.add(Column::CreatedAt.gte(from));
        }
        if let Some(to) = filter.created_to {
            condition = condition.add(Column::CreatedAt.lte(to));
        }

        let paginator = Invoice::find()
            .filter(condition)
            .order_by_desc(Column::CreatedAt)
            .order_by_desc(Column::Id)
            .paginate(conn, filter.per_page.max(1));

        let total = paginator.num_items().await?;
        let invoices = paginator.fetch_page(filter.page.max(1) - 1).await?;
        Ok((invoices, total))
    }

    /// Moves an invoice to `status`. `failure` replaces the stored error;
    /// `clear_error` wipes it.
    pub async fn update_status<C: ConnectionTrait>(
        conn: &C,
        invoice: InvoiceModel,
        status: InvoiceStatus,
        failure: Option<&InvoiceError>,
        clear_error: bool,
    ) -> Result<InvoiceModel, ServiceError> {
        let mut active: InvoiceActiveModel = invoice.into();
        active.status = Set(status);
        if let Some(failure) = failure {
            active.error_code = Set(Some(failure.code.clone()));
            active.error_message = Set(Some(failure.message.clone()));
        } else if clear_error {
            active.error_code = Set(None);
            active.error_message = Set(None);
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(conn).await?)
    }

    /// Overwrites header fields only where the extraction supplied a value.
    /// An unknown supplier id never replaces a known one.
    pub async fn apply_extracted_header<C: ConnectionTrait>(
        conn: &C,
        invoice: InvoiceModel,
        header: &InvoiceHeader,
        document: Option<&DocumentMetadata>,
    ) -> Result<InvoiceModel, ServiceError> {
        let mut active: InvoiceActiveModel = invoice.into();

        if header.has_known_supplier() {
            active.supplier_id = Set(header.supplier_id.trim().to_string());
        }
        macro_rules! overwrite_if_some {
            ($($field:ident),* $(,)?) => {
                $(
                    if let Some(value) = header.$field.clone() {
                        active.$field = Set(Some(value));
                    }
                )*
            };
        }
        overwrite_if_some!(
            supplier_name,
            phone,
            email,
            invoice_number,
            invoice_date,
            total_amount,
            invoice_type,
            raw_text,
        );

        if let Some(document) = document {
            active.file_name = Set(Some(document.file_name.clone()));
            active.mime_type = Set(document.mime_type.clone());
            active.file_sha256 = Set(Some(document.sha256.clone()));
            active.file_size = Set(Some(document.size));
        }
        active.updated_at = Set(Utc::now());
        Ok(active.update(conn).await?)
    }
}
