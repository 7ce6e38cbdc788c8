pub mod invoice;
pub mod invoice_line;
pub mod price_observation;
pub mod product_master;

pub use invoice::InvoiceStatus;
pub use invoice_line::{PriceFlag, ReferenceOrigin};
