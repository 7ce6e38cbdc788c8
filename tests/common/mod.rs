#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use emmo_ingest::{
    config::{AppConfig, IngestConfig},
    db::{self, DbPool},
    entities::{price_observation, product_master},
    errors::ServiceError,
    models::{InvoiceHeader, NewLine},
    services::{DocumentExtractor, DocumentUpload, ExtractedDocument, IngestionService},
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};
use tempfile::TempDir;

pub const SUPPLIER_ID: &str = "B12345678";
pub const SUPPLIER_NAME: &str = "Proveedor SL";

/// Service backed by a fresh SQLite file in a temporary directory.
///
/// The pool has a single connection so concurrent units of work queue up
/// instead of hitting SQLite's writer lock.
pub struct TestContext {
    pub db: Arc<DbPool>,
    pub service: IngestionService,
    _dir: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_config(IngestConfig::default()).await
    }

    pub async fn with_config(ingest: IngestConfig) -> Self {
        let dir = TempDir::new().expect("failed to create temp dir");
        let path = dir.path().join("emmo_test.db");

        let mut cfg = AppConfig::new(format!("sqlite://{}?mode=rwc", path.display()));
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.ingest = ingest;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db = Arc::new(pool);
        let service = IngestionService::new(db.clone(), cfg.ingest.clone());
        Self {
            db,
            service,
            _dir: dir,
        }
    }

    pub async fn master_rows(&self, reference_code: &str) -> u64 {
        product_master::Entity::find()
            .filter(product_master::Column::ReferenceCode.eq(reference_code))
            .count(&*self.db)
            .await
            .expect("count master rows")
    }

    pub async fn observations_for_invoice(&self, invoice_id: i32) -> Vec<price_observation::Model> {
        price_observation::Entity::find()
            .filter(price_observation::Column::InvoiceId.eq(invoice_id))
            .all(&*self.db)
            .await
            .expect("load observations")
    }
}

pub fn header(number: &str) -> InvoiceHeader {
    InvoiceHeader::new(SUPPLIER_ID)
        .with_supplier_name(SUPPLIER_NAME)
        .with_invoice_number(number)
}

pub fn line(code: Option<&str>, quantity: i64, price: Decimal) -> NewLine {
    NewLine::new(code, Decimal::from(quantity), price)
}

pub fn upload(name: &str) -> DocumentUpload {
    DocumentUpload::new(name, Some("application/pdf".into()), b"%PDF-1.4 test".to_vec())
}

/// Extractor that always fails, as a broken OCR provider would.
pub struct FailingExtractor;

#[async_trait]
impl DocumentExtractor for FailingExtractor {
    async fn extract(&self, _upload: &DocumentUpload) -> Result<ExtractedDocument, ServiceError> {
        Err(ServiceError::ExtractionError("provider timeout".into()))
    }
}
