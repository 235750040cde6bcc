//! Output types: the canonical record schema and the response envelope.

use crate::error::ErrorKind;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// The value of the envelope's `"type"` field on success.
pub const RESULT_TYPE: &str = "invoice";

/// One invoice line. Every field is a string, empty when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub serial_number: String,
    pub customer_name: String,
    pub product_name: String,
    pub qty: String,
    pub tax: String,
    pub total_amount: String,
    pub date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub product_name: String,
    pub category: String,
    pub unit_price: String,
    pub tax: String,
    pub price_with_tax: String,
    pub stock_quantity: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub customer_name: String,
    pub phone_number: String,
    pub total_purchase_amount: String,
}

/// The three ordered record arrays. All are always present, possibly empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StructuredRecordSet {
    pub invoices: Vec<Invoice>,
    pub products: Vec<Product>,
    pub customers: Vec<Customer>,
}

/// Outcome of processing one upload.
///
/// Serialises to `{"type":"invoice","data":{...}}` on success and
/// `{"error":"<message>"}` on failure.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionResult {
    Success(StructuredRecordSet),
    Failure(ErrorKind),
}

impl ExtractionResult {
    pub fn is_success(&self) -> bool {
        matches!(self, ExtractionResult::Success(_))
    }

    pub fn data(&self) -> Option<&StructuredRecordSet> {
        match self {
            ExtractionResult::Success(data) => Some(data),
            ExtractionResult::Failure(_) => None,
        }
    }

    /// HTTP status code for this envelope.
    pub fn status_code(&self) -> u16 {
        match self {
            ExtractionResult::Success(_) => 200,
            ExtractionResult::Failure(kind) => kind.status_code(),
        }
    }
}

impl Serialize for ExtractionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ExtractionResult::Success(data) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("type", RESULT_TYPE)?;
                map.serialize_entry("data", data)?;
                map.end()
            }
            ExtractionResult::Failure(kind) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("error", kind.message())?;
                map.end()
            }
        }
    }
}
