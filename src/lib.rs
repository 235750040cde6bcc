//! # doc2json
//!
//! Extract invoices, products and customers from business documents (PDF,
//! PNG/JPEG, XLSX/XLS) into a fixed JSON schema using an LLM.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (filename + bytes)
//!  │
//!  ├─ 1. Dispatch   suffix → PDF | image | spreadsheet, else "Unsupported file type"
//!  ├─ 2. Extract    pdfium text layer / tesseract OCR / calamine first sheet
//!  │                (CPU-bound, bounded spawn_blocking pool)
//!  ├─ 3. Normalise  allow-list filter + whitespace collapse
//!  ├─ 4. Prompt     5-rule system prompt + JSON template + text
//!  ├─ 5. LLM        JSON-mode chat completion, retry on transient errors
//!  └─ 6. Parse      strict decode, schema repair → {"type":"invoice","data":{…}}
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use doc2json::{DocumentExtractor, ExtractionConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GROQ_API_KEY; fails fast when it is missing
//!     let config = ExtractionConfig::from_env()?;
//!     let extractor = DocumentExtractor::new(config)?;
//!
//!     let bytes = std::fs::read("march.xlsx")?;
//!     let result = extractor.process("march.xlsx", bytes).await;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `server`  | via cli | axum router with `POST /upload/` |
//! | `cli`     | on      | The `doc2json` binary (clap + anyhow + tracing-subscriber) |
//!
//! ## External engines
//!
//! PDF text is read by pdfium (downloaded and cached by `pdfium-auto` on
//! first use, or `PDFIUM_LIB_PATH`). Images are recognised by the
//! `tesseract` executable, which must be on `PATH` (or `TESSERACT_BIN`).

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod format;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod prompts;
#[cfg(feature = "server")]
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ExtractionConfig, ExtractionConfigBuilder};
pub use error::{Doc2JsonError, ErrorKind, RemoteError};
pub use format::{DocumentFormat, UploadedDocument};
pub use output::{Customer, ExtractionResult, Invoice, Product, StructuredRecordSet};
pub use pipeline::extract::ExtractedText;
pub use pipeline::llm::{LlmCompletion, StructuredCompletion};
pub use process::DocumentExtractor;
pub use prompts::PromptPair;
