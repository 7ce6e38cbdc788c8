use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::validate_amount;
use crate::entities::{invoice, invoice_line, InvoiceStatus};

/// Supplier id the stub extractor reports when it knows nothing.
pub const UNKNOWN_SUPPLIER: &str = "UNKNOWN";

/// Invoice header as supplied by an operator or an extractor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct InvoiceHeader {
    #[validate(length(
        min = 3,
        max = 32,
        message = "Supplier id must be between 3 and 32 characters"
    ))]
    pub supplier_id: String,
    pub supplier_name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub invoice_number: Option<String>,
    pub invoice_date: Option<NaiveDate>,
    #[validate(custom = "validate_amount")]
    pub total_amount: Option<Decimal>,
    pub invoice_type: Option<String>,
    pub raw_text: Option<String>,
    pub source_channel: Option<String>,
    pub source_thread_id: Option<String>,
    pub source_message_id: Option<String>,
}

impl InvoiceHeader {
    pub fn new(supplier_id: impl Into<String>) -> Self {
        Self {
            supplier_id: supplier_id.into(),
            ..Default::default()
        }
    }

    pub fn with_supplier_name(mut self, name: impl Into<String>) -> Self {
        self.supplier_name = Some(name.into());
        self
    }

    pub fn with_invoice_number(mut self, number: impl Into<String>) -> Self {
        self.invoice_number = Some(number.into());
        self
    }

    pub fn has_known_supplier(&self) -> bool {
        let id = self.supplier_id.trim();
        !id.is_empty() && id != UNKNOWN_SUPPLIER
    }
}

/// One line as extracted from a document or typed in by hand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewLine {
    /// Code as printed on the invoice, before canonicalization
    #[validate(length(
        min = 1,
        max = 64,
        message = "Reference code must be between 1 and 64 characters"
    ))]
    pub reference_code: Option<String>,
    pub description: Option<String>,
    #[validate(custom = "validate_amount")]
    pub quantity: Option<Decimal>,
    #[validate(custom = "validate_amount")]
    pub unit_price: Option<Decimal>,
    #[validate(custom = "validate_amount")]
    pub line_total: Option<Decimal>,
}

impl NewLine {
    pub fn new(reference_code: Option<&str>, quantity: Decimal, unit_price: Decimal) -> Self {
        Self {
            reference_code: reference_code.map(str::to_string),
            quantity: Some(quantity),
            unit_price: Some(unit_price),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Supplied total, or price times quantity when both are known and the
    /// product fits in a `Decimal`.
    pub fn effective_total(&self) -> Option<Decimal> {
        self.line_total.or(match (self.unit_price, self.quantity) {
            (Some(price), Some(quantity)) => price.checked_mul(quantity),
            _ => None,
        })
    }
}

/// Source document facts stored on the invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub file_name: String,
    pub mime_type: Option<String>,
    pub sha256: String,
    pub size: i64,
}

/// Filters for listing invoices. Pages are 1-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvoiceFilter {
    pub supplier_id: Option<String>,
    pub status: Option<InvoiceStatus>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub page: u64,
    pub per_page: u64,
}

impl Default for InvoiceFilter {
    fn default() -> Self {
        Self {
            supplier_id: None,
            status: None,
            created_from: None,
            created_to: None,
            page: 1,
            per_page: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct InvoicePage {
    pub invoices: Vec<invoice::Model>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
}

/// Result of ingesting or processing a whole invoice.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub invoice: invoice::Model,
    pub lines: Vec<invoice_line::Model>,
    pub masters_created: usize,
}

/// Row of the product-master import sheet derived from an invoice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MasterExportRow {
    pub reference_code: String,
    pub description: Option<String>,
    pub quantity: Option<Decimal>,
    pub unit_cost: Option<Decimal>,
}

impl MasterExportRow {
    /// Row for a resolved line; unresolved lines are not exported.
    pub fn from_line(line: &invoice_line::Model) -> Option<Self> {
        line.reference_code.as_ref().map(|code| Self {
            reference_code: code.clone(),
            description: line.description.clone(),
            quantity: line.quantity,
            unit_cost: line.unit_price,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn header_requires_reasonable_supplier_id() {
        assert!(InvoiceHeader::new("B12345678").validate().is_ok());
        assert!(InvoiceHeader::new("B1").validate().is_err());
        assert!(InvoiceHeader::new("X".repeat(33)).validate().is_err());
    }

    #[test]
    fn unknown_supplier_is_not_known() {
        assert!(!InvoiceHeader::new(UNKNOWN_SUPPLIER).has_known_supplier());
        assert!(InvoiceHeader::new("B12345678").has_known_supplier());
    }

    #[test]
    fn negative_amounts_are_rejected() {
        let line = NewLine::new(Some("abc"), dec!(1), dec!(-0.01));
        assert!(line.validate().is_err());

        let line = NewLine::new(Some("abc"), dec!(0), dec!(0));
        assert!(line.validate().is_ok());
    }

    #[test]
    fn empty_reference_code_is_rejected() {
        let line = NewLine::new(Some(""), dec!(1), dec!(1));
        assert!(line.validate().is_err());
        assert!(NewLine::new(None, dec!(1), dec!(1)).validate().is_ok());
    }

    #[test]
    fn total_falls_back_to_price_times_quantity() {
        let line = NewLine::new(Some("abc"), dec!(3), dec!(2.5));
        assert_eq!(line.effective_total(), Some(dec!(7.5)));

        let line = NewLine {
            line_total: Some(dec!(7)),
            ..line
        };
        assert_eq!(line.effective_total(), Some(dec!(7)));
    }

    #[test]
    fn oversized_amounts_are_rejected_without_panicking() {
        let line = NewLine::new(Some("BIG"), dec!(2), Decimal::MAX);
        assert!(line.validate().is_err());
        assert_eq!(line.effective_total(), None);
    }
}
