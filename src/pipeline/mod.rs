//! Pipeline stages for document-to-JSON extraction.
//!
//! Each submodule implements exactly one transformation step.
//!
//! ## Data Flow
//!
//! ```text
//! extract ──▶ normalize ──▶ prompts ──▶ llm ──▶ parse
//! (pdf/ocr/    (allow-list)  (schema)    (JSON   (decode +
//!  spreadsheet)                           mode)   repair)
//! ```
//!
//! 1. [`extract`]     : pick the extractor for the detected format and run it
//!    on the bounded blocking pool ([`pdf`], [`ocr`], [`spreadsheet`])
//! 2. [`normalize`]   : collapse whitespace and strip characters outside the
//!    allow-list
//! 3. [`crate::prompts`] : build the system + user message pair
//! 4. [`llm`]         : the remote structured-completion call with retry;
//!    the only stage with network I/O
//! 5. [`parse`]       : strict JSON decode followed by schema repair

pub mod extract;
pub mod llm;
pub mod normalize;
pub mod ocr;
pub mod parse;
pub mod pdf;
pub mod spreadsheet;
