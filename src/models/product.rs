use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::validate_amount;

/// Incoming product-master fields. `None` never overwrites a stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct ProductUpsert {
    #[validate(length(
        min = 1,
        max = 64,
        message = "Reference code must be between 1 and 64 characters"
    ))]
    pub reference_code: String,
    pub ean: Option<String>,
    pub description: Option<String>,
    pub size: Option<String>,
    pub colour: Option<String>,
    pub family: Option<String>,
    pub brand: Option<String>,
    pub season: Option<String>,
    pub material: Option<String>,
    #[validate(custom = "validate_amount")]
    pub quantity_on_hand: Option<Decimal>,
    #[validate(custom = "validate_amount")]
    pub unit_cost: Option<Decimal>,
    #[validate(custom = "validate_amount")]
    pub retail_price: Option<Decimal>,
    #[validate(custom = "validate_amount")]
    pub outlet_price: Option<Decimal>,
}

impl ProductUpsert {
    pub fn new(reference_code: impl Into<String>) -> Self {
        Self {
            reference_code: reference_code.into(),
            ..Default::default()
        }
    }
}
