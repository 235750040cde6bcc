//! Response parsing and schema repair.
//!
//! The model is asked for JSON matching [`crate::prompts::SCHEMA_TEMPLATE`]
//! but nothing enforces that shape remotely. After a strict JSON decode,
//! every section is rebuilt from the declared key list:
//!
//! 1. A missing section becomes `[]`; a lone object becomes a one-element array
//! 2. Entries that are not objects are dropped
//! 3. Each record gets exactly the declared keys; missing keys become `""`
//! 4. Leaf values are coerced to trimmed strings: numbers and booleans via
//!    their JSON text, `null` as `""`, nested arrays and objects as compact JSON
//! 5. Records in which every field is empty (usually the echoed template) are dropped
//!
//! A reply that is not JSON, or whose top level is not an object, is a
//! schema-parse failure. The payload is logged (truncated) and discarded.

use crate::error::Doc2JsonError;
use crate::output::{Customer, Invoice, Product, StructuredRecordSet};
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Longest prefix of a malformed payload written to the log.
const LOG_PAYLOAD_LIMIT: usize = 512;

const INVOICE_KEYS: [&str; 7] = [
    "serialNumber",
    "customerName",
    "productName",
    "qty",
    "tax",
    "totalAmount",
    "date",
];

const PRODUCT_KEYS: [&str; 6] = [
    "productName",
    "category",
    "unitPrice",
    "tax",
    "priceWithTax",
    "stockQuantity",
];

const CUSTOMER_KEYS: [&str; 3] = ["customerName", "phoneNumber", "totalPurchaseAmount"];

/// Parse the model's reply into a repaired record set.
pub fn parse_response(text: &str) -> Result<StructuredRecordSet, Doc2JsonError> {
    let value: Value = serde_json::from_str(text).map_err(|e| {
        warn!(
            "Model response is not valid JSON ({}); payload: {:?}",
            e,
            truncate(text, LOG_PAYLOAD_LIMIT)
        );
        Doc2JsonError::SchemaParse {
            detail: e.to_string(),
        }
    })?;

    let Value::Object(root) = value else {
        warn!(
            "Model response is JSON but not an object; payload: {:?}",
            truncate(text, LOG_PAYLOAD_LIMIT)
        );
        return Err(Doc2JsonError::SchemaParse {
            detail: "top-level value is not an object".into(),
        });
    };

    Ok(repair(&root))
}

/// Rebuild all three sections from a decoded top-level object.
pub fn repair(root: &Map<String, Value>) -> StructuredRecordSet {
    let invoices = records(root, "invoices", &INVOICE_KEYS)
        .map(|[serial_number, customer_name, product_name, qty, tax, total_amount, date]| Invoice {
            serial_number,
            customer_name,
            product_name,
            qty,
            tax,
            total_amount,
            date,
        })
        .collect();

    let products = records(root, "products", &PRODUCT_KEYS)
        .map(
            |[product_name, category, unit_price, tax, price_with_tax, stock_quantity]| Product {
                product_name,
                category,
                unit_price,
                tax,
                price_with_tax,
                stock_quantity,
            },
        )
        .collect();

    let customers = records(root, "customers", &CUSTOMER_KEYS)
        .map(
            |[customer_name, phone_number, total_purchase_amount]| Customer {
                customer_name,
                phone_number,
                total_purchase_amount,
            },
        )
        .collect();

    let set = StructuredRecordSet {
        invoices,
        products,
        customers,
    };
    debug!(
        "Parsed {} invoices, {} products, {} customers",
        set.invoices.len(),
        set.products.len(),
        set.customers.len()
    );
    set
}

/// Yield each non-blank record of `section` as its fields in `keys` order.
fn records<'a, const N: usize>(
    root: &'a Map<String, Value>,
    section: &str,
    keys: &'a [&'static str; N],
) -> impl Iterator<Item = [String; N]> + 'a {
    let entries: Vec<&'a Value> = match root.get(section) {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(obj @ Value::Object(_)) => vec![obj],
        Some(other) => {
            debug!("Section '{}' has unexpected type {:?}; treating as empty", section, kind(other));
            Vec::new()
        }
        None => Vec::new(),
    };

    entries
        .into_iter()
        .filter_map(Value::as_object)
        .map(move |obj| (*keys).map(|key| coerce(obj.get(key))))
        .filter(|fields| fields.iter().any(|f| !f.is_empty()))
}

/// Coerce an arbitrary JSON leaf to the schema's string representation.
fn coerce(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => other.to_string(),
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_formed_response() {
        let text = r#"{
            "invoices": [{"serialNumber":"INV-1","customerName":"Acme","productName":"Widget",
                          "qty":"3","tax":"18","totalAmount":"354","date":"2024-01-02"}],
            "products": [{"productName":"Widget","category":"Tools","unitPrice":"100",
                          "tax":"18","priceWithTax":"118","stockQuantity":"40"}],
            "customers": [{"customerName":"Acme","phoneNumber":"555-0100","totalPurchaseAmount":"354"}]
        }"#;
        let set = parse_response(text).unwrap();
        assert_eq!(set.invoices.len(), 1);
        assert_eq!(set.invoices[0].serial_number, "INV-1");
        assert_eq!(set.products[0].price_with_tax, "118");
        assert_eq!(set.customers[0].phone_number, "555-0100");
    }

    #[test]
    fn non_json_is_schema_parse_error() {
        let err = parse_response("Sorry, I can't help with that.").unwrap_err();
        assert!(matches!(err, Doc2JsonError::SchemaParse { .. }));
        assert!(parse_response("").is_err());
        assert!(parse_response(r#"{"invoices": ["#).is_err());
    }

    #[test]
    fn non_object_top_level_is_schema_parse_error() {
        assert!(matches!(
            parse_response(r#"[{"serialNumber":"1"}]"#),
            Err(Doc2JsonError::SchemaParse { .. })
        ));
        assert!(parse_response(r#""just a string""#).is_err());
    }

    #[test]
    fn missing_sections_become_empty_arrays() {
        let set = parse_response(r#"{"invoices":[{"serialNumber":"A1"}]}"#).unwrap();
        assert_eq!(set.invoices.len(), 1);
        assert!(set.products.is_empty());
        assert!(set.customers.is_empty());
        let v = serde_json::to_value(&set).unwrap();
        assert_eq!(v["products"], serde_json::json!([]));
    }

    #[test]
    fn missing_keys_filled_and_extra_keys_dropped() {
        let set = parse_response(r#"{"customers":[{"customerName":"Acme","vip":true}]}"#).unwrap();
        let v = serde_json::to_value(&set.customers[0]).unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(obj.len(), 3);
        assert_eq!(obj["customerName"], "Acme");
        assert_eq!(obj["phoneNumber"], "");
        assert!(!obj.contains_key("vip"));
    }

    #[test]
    fn non_string_leaves_are_coerced() {
        let text = r#"{"invoices":[{"serialNumber":42,"qty":3,"tax":null,"totalAmount":99.5,
                       "date":["2024","01"],"customerName":false,"productName":{"n":"W"}}]}"#;
        let inv = &parse_response(text).unwrap().invoices[0];
        assert_eq!(inv.serial_number, "42");
        assert_eq!(inv.qty, "3");
        assert_eq!(inv.tax, "");
        assert_eq!(inv.total_amount, "99.5");
        assert_eq!(inv.date, r#"["2024","01"]"#);
        assert_eq!(inv.customer_name, "false");
        assert_eq!(inv.product_name, r#"{"n":"W"}"#);
    }

    #[test]
    fn single_object_section_is_wrapped() {
        let set = parse_response(r#"{"products":{"productName":"Bolt","unitPrice":"2"}}"#).unwrap();
        assert_eq!(set.products.len(), 1);
        assert_eq!(set.products[0].product_name, "Bolt");
    }

    #[test]
    fn blank_template_records_and_non_objects_dropped() {
        let text = r#"{"invoices":[{"serialNumber":"","customerName":"","productName":"",
                       "qty":"","tax":"","totalAmount":"","date":""}, "junk", 7,
                       {"serialNumber":"  INV-9  "}],
                       "customers":"none"}"#;
        let set = parse_response(text).unwrap();
        assert_eq!(set.invoices.len(), 1);
        assert_eq!(set.invoices[0].serial_number, "INV-9");
        assert!(set.customers.is_empty());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
