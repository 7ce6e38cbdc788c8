//! Persistence helpers. Every function takes the connection or transaction
//! to run on, so the orchestrator decides the unit of work.

pub mod invoice_repository;
pub mod line_repository;
pub mod observation_repository;
pub mod product_master_repository;

pub use invoice_repository::{InvoiceError, InvoiceRepository, OCR_FAILED};
pub use line_repository::LineRepository;
pub use observation_repository::{LedgerHistory, NewObservation, ObservationRepository};
pub use product_master_repository::{MasterUpsert, ProductMasterRepository};
