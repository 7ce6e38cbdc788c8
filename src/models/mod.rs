//! Inbound payloads and outbound views of the ingestion services.

pub mod invoice;
pub mod product;

pub use invoice::{
    DocumentMetadata, IngestOutcome, InvoiceFilter, InvoiceHeader, InvoicePage, MasterExportRow,
    NewLine,
};
pub use product::ProductUpsert;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use validator::ValidationError;

/// Largest accepted price, quantity or total. Products of two amounts stay
/// well inside `Decimal`'s range.
pub const MAX_AMOUNT: Decimal = dec!(1000000000000);

pub(crate) fn validate_amount(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        let mut err = ValidationError::new("range");
        err.message = Some("Value cannot be negative".into());
        return Err(err);
    }
    if *value > MAX_AMOUNT {
        let mut err = ValidationError::new("range");
        err.message = Some("Value exceeds 1000000000000".into());
        return Err(err);
    }
    Ok(())
}
