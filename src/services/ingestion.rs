//! Ingestion orchestrator.
//!
//! Every public operation is one database transaction. Per line the order is
//! fixed: resolve the reference code, read the pricing baseline as it stood
//! before the line, evaluate, insert the line, upsert the product master,
//! append the price observation, then write the decision onto the line.

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, Set, TransactionTrait};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

use crate::config::IngestConfig;
use crate::db::transaction::with_transaction;
use crate::db::DbPool;
use crate::entities::{invoice, invoice_line, price_observation, product_master};
use crate::entities::{InvoiceStatus, ReferenceOrigin};
use crate::errors::ServiceError;
use crate::models::{
    IngestOutcome, InvoiceFilter, InvoiceHeader, InvoicePage, MasterExportRow, NewLine,
    ProductUpsert,
};
use crate::repositories::{
    InvoiceError, InvoiceRepository, LedgerHistory, LineRepository, NewObservation,
    ObservationRepository, ProductMasterRepository,
};
use crate::services::extraction::{
    DocumentExtractor, DocumentUpload, ExtractedDocument, StubExtractor,
};
use crate::services::pricing::{apply_price_decision, PriceDecision, PriceEvaluator, PricedLine};
use crate::services::reference_code::{LineReference, ReferenceCodeResolver};

const MAX_REFERENCE_CODE_LEN: usize = 64;

/// What happened to one line inside a unit of work.
#[derive(Debug, Clone)]
struct LineIngest {
    line: invoice_line::Model,
    master_created: bool,
}

/// Service tying invoices, lines, the product master and the price ledger
/// together.
#[derive(Clone)]
pub struct IngestionService {
    db: Arc<DbPool>,
    config: Arc<IngestConfig>,
    resolver: ReferenceCodeResolver,
    evaluator: PriceEvaluator,
}

impl IngestionService {
    pub fn new(db: Arc<DbPool>, config: IngestConfig) -> Self {
        let resolver = ReferenceCodeResolver::new(&config);
        let evaluator = PriceEvaluator::new(&config);
        Self {
            db,
            config: Arc::new(config),
            resolver,
            evaluator,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Creates an empty `draft` invoice.
    #[instrument(skip(self, header), fields(supplier_id = %header.supplier_id))]
    pub async fn create_invoice(
        &self,
        header: InvoiceHeader,
    ) -> Result<invoice::Model, ServiceError> {
        header.validate()?;
        let invoice = InvoiceRepository::create(
            &*self.db,
            &header,
            InvoiceStatus::Draft,
            None,
            None,
        )
        .await?;
        info!(invoice_id = invoice.id, "Invoice created");
        Ok(invoice)
    }

    pub async fn get_invoice(&self, invoice_id: i32) -> Result<invoice::Model, ServiceError> {
        InvoiceRepository::get(&*self.db, invoice_id).await
    }

    pub async fn list_invoices(&self, filter: InvoiceFilter) -> Result<InvoicePage, ServiceError> {
        let (invoices, total) = InvoiceRepository::list(&*self.db, &filter).await?;
        Ok(InvoicePage {
            invoices,
            total,
            page: filter.page.max(1),
            per_page: filter.per_page.max(1),
        })
    }

    /// Manual workflow transition. This is the only way out of `needs_review`;
    /// `clear_error` drops the stored error code and message.
    #[instrument(skip(self))]
    pub async fn update_invoice_status(
        &self,
        invoice_id: i32,
        status: InvoiceStatus,
        clear_error: bool,
    ) -> Result<invoice::Model, ServiceError> {
        let invoice = with_transaction(&self.db, move |txn| {
            Box::pin(async move {
                let invoice = InvoiceRepository::get(txn, invoice_id).await?;
                if !invoice.status.can_transition_to(status) {
                    return Err(ServiceError::InvalidStatus(format!(
                        "Invoice {} cannot move from {} to {}",
                        invoice_id, invoice.status, status
                    )));
                }
                InvoiceRepository::update_status(txn, invoice, status, None, clear_error).await
            })
        })
        .await?;

        info!(invoice_id, status = %invoice.status, "Invoice status updated");
        Ok(invoice)
    }

    /// Creates a `draft` invoice with all its lines in one transaction. A
    /// duplicate reference code on any line rolls back everything.
    #[instrument(skip(self, header, lines), fields(supplier_id = %header.supplier_id, lines = lines.len()))]
    pub async fn ingest_invoice(
        &self,
        header: InvoiceHeader,
        lines: Vec<NewLine>,
    ) -> Result<IngestOutcome, ServiceError> {
        header.validate()?;
        for line in &lines {
            line.validate()?;
        }

        let txn = self.db.begin().await?;
        let invoice =
            InvoiceRepository::create(&txn, &header, InvoiceStatus::Draft, None, None).await?;
        let masters_created = self.ingest_lines(&txn, &invoice, &lines).await?;
        let lines = LineRepository::list_for_invoice(&txn, invoice.id).await?;
        txn.commit().await?;

        info!(
            invoice_id = invoice.id,
            lines = lines.len(),
            masters_created,
            "Invoice ingested"
        );
        Ok(IngestOutcome {
            invoice,
            lines,
            masters_created,
        })
    }

    /// Adds one line to an existing invoice as its own unit of work.
    #[instrument(skip(self, line))]
    pub async fn add_line(
        &self,
        invoice_id: i32,
        line: NewLine,
        origin: ReferenceOrigin,
    ) -> Result<invoice_line::Model, ServiceError> {
        line.validate()?;

        let txn = self.db.begin().await?;
        let invoice = InvoiceRepository::get(&txn, invoice_id).await?;
        let outcome = self.ingest_line(&txn, &invoice, &line, origin).await?;
        txn.commit().await?;

        Ok(outcome.line)
    }

    /// Assigns a reference code to an existing line by hand.
    #[instrument(skip(self))]
    pub async fn set_line_reference(
        &self,
        invoice_id: i32,
        line_id: i32,
        reference_code: &str,
    ) -> Result<invoice_line::Model, ServiceError> {
        let raw = reference_code.trim();
        if raw.is_empty() || raw.chars().count() > MAX_REFERENCE_CODE_LEN {
            return Err(ServiceError::ValidationError(format!(
                "Reference code must be between 1 and {} characters",
                MAX_REFERENCE_CODE_LEN
            )));
        }

        let txn = self.db.begin().await?;
        InvoiceRepository::get(&txn, invoice_id).await?;
        let stored = LineRepository::get(&txn, invoice_id, line_id).await?;

        let resolution = self.resolver.resolve(LineReference {
            raw_code: Some(raw),
            supplier_name: stored.supplier_name.as_deref(),
            description: stored.description.as_deref(),
            invoice_number: stored.invoice_number.as_deref(),
            origin: ReferenceOrigin::Manual,
        });
        let Some(code) = resolution.code.clone() else {
            return Err(ServiceError::ValidationError(
                "Reference code did not resolve".to_string(),
            ));
        };

        let master = ProductMasterRepository::find(&txn, &code).await?;
        let mut priced = PricedLine::from(&stored);
        priced.reference_code = Some(code.clone());
        let decision = self
            .evaluator
            .evaluate(&priced, master.as_ref(), &LedgerHistory::new(&txn))
            .await?;

        let observed_price = stored.unit_price;
        let supplier_id = stored.supplier_id.clone();
        let mut active: invoice_line::ActiveModel = stored.into();
        active.raw_reference_code = Set(resolution.raw_code.clone());
        active.reference_code = Set(Some(code.clone()));
        active.reference_origin = Set(resolution.origin);
        let updated = LineRepository::update(&txn, active).await.map_err(|e| {
            if e.is_conflict() {
                warn!(invoice_id, line_id, reference_code = %code, "Duplicate reference code on invoice");
            }
            e
        })?;

        self.upsert_master_for_line(
            &txn,
            &code,
            updated.description.clone(),
            updated.quantity,
            decision.effective_price(observed_price),
            master.is_some(),
        )
        .await?;

        if let Some(price) = observed_price {
            ObservationRepository::append(
                &txn,
                NewObservation {
                    supplier_id: &supplier_id,
                    reference_code: &code,
                    observed_price: price,
                    invoice_id,
                    line_id,
                },
            )
            .await?;
        }

        let updated = self.apply_decision(&txn, updated, &decision).await?;
        txn.commit().await?;

        info!(invoice_id, line_id, reference_code = %code, "Reference code assigned");
        Ok(updated)
    }

    pub async fn list_lines(
        &self,
        invoice_id: i32,
    ) -> Result<Vec<invoice_line::Model>, ServiceError> {
        InvoiceRepository::get(&*self.db, invoice_id).await?;
        LineRepository::list_for_invoice(&*self.db, invoice_id).await
    }

    /// Extracts `upload` and ingests the result as a new invoice. When the
    /// extractor fails the stub result is stored instead and the invoice
    /// opens as `needs_review`.
    #[instrument(skip(self, upload, extractor), fields(file_name = upload.display_name()))]
    pub async fn process_document(
        &self,
        upload: DocumentUpload,
        extractor: &dyn DocumentExtractor,
    ) -> Result<IngestOutcome, ServiceError> {
        let document = upload.metadata();
        let (extracted, failure) = self.extract_or_stub(&upload, extractor).await;
        let status = if failure.is_some() {
            InvoiceStatus::NeedsReview
        } else {
            InvoiceStatus::Draft
        };

        let txn = self.db.begin().await?;
        let invoice = InvoiceRepository::create(
            &txn,
            &extracted.header,
            status,
            Some(&document),
            failure.as_ref(),
        )
        .await?;
        let masters_created = self.ingest_lines(&txn, &invoice, &extracted.lines).await?;
        let lines = LineRepository::list_for_invoice(&txn, invoice.id).await?;
        txn.commit().await?;

        info!(
            invoice_id = invoice.id,
            status = %invoice.status,
            lines = lines.len(),
            "Document processed"
        );
        Ok(IngestOutcome {
            invoice,
            lines,
            masters_created,
        })
    }

    /// Re-extracts a document for an existing invoice and replaces its lines.
    ///
    /// Header fields change only where the extraction supplied a value. The
    /// product master and price ledger are only ever added to. A failed
    /// extraction keeps the current lines and moves the invoice to
    /// `needs_review`.
    #[instrument(skip(self, upload, extractor), fields(file_name = upload.display_name()))]
    pub async fn reprocess_document(
        &self,
        invoice_id: i32,
        upload: DocumentUpload,
        extractor: &dyn DocumentExtractor,
    ) -> Result<IngestOutcome, ServiceError> {
        let document = upload.metadata();
        let (extracted, failure) = self.extract_or_stub(&upload, extractor).await;

        let txn = self.db.begin().await?;
        let invoice = InvoiceRepository::get(&txn, invoice_id).await?;
        let mut invoice = InvoiceRepository::apply_extracted_header(
            &txn,
            invoice,
            &extracted.header,
            Some(&document),
        )
        .await?;

        let mut masters_created = 0;
        if let Some(failure) = failure.as_ref() {
            invoice = InvoiceRepository::update_status(
                &txn,
                invoice,
                InvoiceStatus::NeedsReview,
                Some(failure),
                false,
            )
            .await?;
        } else {
            let removed = LineRepository::delete_for_invoice(&txn, invoice_id).await?;
            info!(invoice_id, removed, "Replacing invoice lines");
            masters_created = self.ingest_lines(&txn, &invoice, &extracted.lines).await?;
        }

        let lines = LineRepository::list_for_invoice(&txn, invoice_id).await?;
        txn.commit().await?;

        Ok(IngestOutcome {
            invoice,
            lines,
            masters_created,
        })
    }

    /// Creates or non-destructively merges a product-master row.
    #[instrument(skip(self, upsert), fields(reference_code = %upsert.reference_code))]
    pub async fn upsert_product(
        &self,
        upsert: ProductUpsert,
    ) -> Result<product_master::Model, ServiceError> {
        upsert.validate()?;
        let outcome = with_transaction(&self.db, move |txn| {
            Box::pin(async move { ProductMasterRepository::upsert(txn, &upsert).await })
        })
        .await?;

        info!(created = outcome.created, "Product master upserted");
        Ok(outcome.product)
    }

    pub async fn get_product(
        &self,
        reference_code: &str,
    ) -> Result<product_master::Model, ServiceError> {
        ProductMasterRepository::get(&*self.db, reference_code.trim()).await
    }

    /// Most recent ledger entries for a code, newest first.
    pub async fn price_history(
        &self,
        reference_code: &str,
    ) -> Result<Vec<price_observation::Model>, ServiceError> {
        ObservationRepository::recent_for_code(
            &*self.db,
            reference_code.trim(),
            self.config.history_lookback,
        )
        .await
    }

    /// Product-master import rows for the resolved lines of an invoice.
    /// Read-only.
    pub async fn export_master_rows(
        &self,
        invoice_id: i32,
    ) -> Result<Vec<MasterExportRow>, ServiceError> {
        let lines = self.list_lines(invoice_id).await?;
        Ok(lines.iter().filter_map(MasterExportRow::from_line).collect())
    }

    async fn extract_or_stub(
        &self,
        upload: &DocumentUpload,
        extractor: &dyn DocumentExtractor,
    ) -> (ExtractedDocument, Option<InvoiceError>) {
        let extracted = extractor.extract(upload).await.and_then(|doc| {
            doc.header.validate()?;
            for line in &doc.lines {
                line.validate()?;
            }
            Ok(doc)
        });

        match extracted {
            Ok(doc) => (doc, None),
            Err(err) => {
                warn!(
                    file_name = upload.display_name(),
                    error = %err,
                    "Extraction failed; falling back to stub"
                );
                (
                    StubExtractor.extract_now(upload),
                    Some(InvoiceError::ocr_failed(&err)),
                )
            }
        }
    }

    async fn ingest_lines<C: ConnectionTrait>(
        &self,
        conn: &C,
        invoice: &invoice::Model,
        lines: &[NewLine],
    ) -> Result<usize, ServiceError> {
        let mut masters_created = 0;
        for line in lines {
            let outcome = self
                .ingest_line(conn, invoice, line, ReferenceOrigin::Ocr)
                .await?;
            if outcome.master_created {
                masters_created += 1;
            }
        }
        Ok(masters_created)
    }

    async fn ingest_line<C: ConnectionTrait>(
        &self,
        conn: &C,
        invoice: &invoice::Model,
        line: &NewLine,
        origin: ReferenceOrigin,
    ) -> Result<LineIngest, ServiceError> {
        let resolution = self.resolver.resolve(LineReference {
            raw_code: line.reference_code.as_deref(),
            supplier_name: invoice.supplier_name.as_deref(),
            description: line.description.as_deref(),
            invoice_number: invoice.invoice_number.as_deref(),
            origin,
        });

        let master = match resolution.code.as_deref() {
            Some(code) => ProductMasterRepository::find(conn, code).await?,
            None => None,
        };
        let priced = PricedLine {
            reference_code: resolution.code.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price,
            line_total: line.effective_total(),
            ..Default::default()
        };
        let decision = self
            .evaluator
            .evaluate(&priced, master.as_ref(), &LedgerHistory::new(conn))
            .await?;

        let active = invoice_line::ActiveModel {
            invoice_id: Set(invoice.id),
            supplier_id: Set(invoice.supplier_id.clone()),
            supplier_name: Set(invoice.supplier_name.clone()),
            invoice_number: Set(invoice.invoice_number.clone()),
            invoice_date: Set(invoice.invoice_date),
            raw_reference_code: Set(resolution.raw_code.clone()),
            reference_code: Set(resolution.code.clone()),
            reference_origin: Set(resolution.origin),
            description: Set(line.description.clone()),
            quantity: Set(line.quantity),
            unit_price: Set(line.unit_price),
            line_total: Set(priced.line_total),
            price_flag: Set(None),
            price_flag_reason: Set(None),
            created_at: Set(Utc::now()),
            ..Default::default()
        };
        let stored = LineRepository::insert(conn, active).await.map_err(|e| {
            if e.is_conflict() {
                warn!(
                    invoice_id = invoice.id,
                    reference_code = ?resolution.code,
                    "Duplicate reference code on invoice"
                );
            }
            e
        })?;

        let Some(code) = resolution.code else {
            return Ok(LineIngest {
                line: stored,
                master_created: false,
            });
        };

        let master_created = self
            .upsert_master_for_line(
                conn,
                &code,
                line.description.clone(),
                line.quantity,
                decision.effective_price(line.unit_price),
                master.is_some(),
            )
            .await?;

        if let Some(price) = line.unit_price {
            ObservationRepository::append(
                conn,
                NewObservation {
                    supplier_id: &invoice.supplier_id,
                    reference_code: &code,
                    observed_price: price,
                    invoice_id: invoice.id,
                    line_id: stored.id,
                },
            )
            .await?;
        }

        let line = self.apply_decision(conn, stored, &decision).await?;
        Ok(LineIngest {
            line,
            master_created,
        })
    }

    /// Returns whether this call created the master row.
    async fn upsert_master_for_line<C: ConnectionTrait>(
        &self,
        conn: &C,
        code: &str,
        description: Option<String>,
        quantity: Option<Decimal>,
        unit_cost: Option<Decimal>,
        existed: bool,
    ) -> Result<bool, ServiceError> {
        let incoming = ProductUpsert {
            reference_code: code.to_string(),
            description,
            quantity_on_hand: quantity,
            unit_cost,
            ..Default::default()
        };
        let outcome = if existed {
            ProductMasterRepository::upsert(conn, &incoming).await?
        } else {
            ProductMasterRepository::upsert_expecting_new(conn, &incoming).await?
        };
        Ok(outcome.created)
    }

    async fn apply_decision<C: ConnectionTrait>(
        &self,
        conn: &C,
        stored: invoice_line::Model,
        decision: &PriceDecision,
    ) -> Result<invoice_line::Model, ServiceError> {
        if decision.is_noop() {
            return Ok(stored);
        }

        let mut priced = PricedLine::from(&stored);
        apply_price_decision(&mut priced, decision);
        info!(
            invoice_id = stored.invoice_id,
            line_id = stored.id,
            reference_code = ?stored.reference_code,
            flag = ?decision.flag,
            reason = ?decision.reason,
            "Price flagged"
        );

        let mut active: invoice_line::ActiveModel = stored.into();
        active.unit_price = Set(priced.unit_price);
        active.line_total = Set(priced.line_total);
        active.price_flag = Set(priced.price_flag);
        active.price_flag_reason = Set(priced.price_flag_reason);
        LineRepository::update(conn, active).await
    }
}
