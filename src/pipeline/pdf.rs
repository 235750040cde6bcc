//! PDF text-layer extraction via pdfium.
//!
//! Runs on the blocking pool: pdfium is not async-safe. Every page's text is
//! concatenated in document order with no separator. A document with no
//! pages, or a scanned document with no text layer, yields an empty string
//! rather than an error.

use crate::error::Doc2JsonError;
use crate::format::DocumentFormat;
use pdfium_render::prelude::*;
use std::path::Path;
use tracing::{debug, info};

/// Header marker of every PDF.
const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Readers accept the header anywhere in the first KiB (BOMs, mail headers).
const MAGIC_SEARCH_WINDOW: usize = 1024;

/// Bind to pdfium, preferring an explicit library path over auto-discovery.
fn bind(lib_path: Option<&Path>) -> Result<Pdfium, Doc2JsonError> {
    let bound = match lib_path {
        Some(path) => pdfium_auto::bind_pdfium_from_path(path),
        None => pdfium_auto::bind_pdfium_silent(),
    };
    bound.map_err(|e| Doc2JsonError::PdfiumBindingFailed(e.to_string()))
}

/// Reject bytes that cannot be a PDF before handing them to pdfium.
pub fn check_magic(bytes: &[u8]) -> Result<(), Doc2JsonError> {
    let window = &bytes[..bytes.len().min(MAGIC_SEARCH_WINDOW)];
    if !window.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC) {
        let mut magic = [0u8; 4];
        let n = bytes.len().min(4);
        magic[..n].copy_from_slice(&bytes[..n]);
        return Err(Doc2JsonError::extraction(
            DocumentFormat::Pdf,
            format!("not a PDF (first bytes: {magic:?})"),
        ));
    }
    Ok(())
}

/// Blocking: extract the text layer of every page.
pub fn extract_text_blocking(bytes: &[u8], lib_path: Option<&Path>) -> Result<String, Doc2JsonError> {
    check_magic(bytes)?;
    let pdfium = bind(lib_path)?;

    let document = pdfium.load_pdf_from_byte_slice(bytes, None).map_err(|e| {
        let err_str = format!("{:?}", e);
        let detail = if err_str.contains("Password") || err_str.contains("password") {
            "document is encrypted".to_string()
        } else {
            err_str
        };
        Doc2JsonError::extraction(DocumentFormat::Pdf, detail)
    })?;

    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let mut text = String::new();
    for (idx, page) in pages.iter().enumerate() {
        let page_text = page.text().map_err(|e| {
            Doc2JsonError::extraction(
                DocumentFormat::Pdf,
                format!("page {}: {:?}", idx + 1, e),
            )
        })?;
        let content = page_text.all();
        debug!("Page {} → {} chars", idx + 1, content.len());
        text.push_str(&content);
    }

    Ok(text)
}
