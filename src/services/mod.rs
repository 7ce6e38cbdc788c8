pub mod extraction;
pub mod ingestion;
pub mod pricing;
pub mod reference_code;

pub use extraction::{DocumentExtractor, DocumentUpload, ExtractedDocument, StubExtractor};
pub use ingestion::IngestionService;
pub use pricing::{evaluate_and_apply_price, PriceDecision, PriceEvaluator, PriceHistory};
pub use reference_code::{generate_reference_code, resolve_reference_code, ReferenceCodeResolver};
