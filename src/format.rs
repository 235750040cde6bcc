//! Format detection for uploaded documents.
//!
//! The filename's suffix is the only routing signal. Matching is
//! case-sensitive and follows a fixed, ordered rule table so the full set of
//! accepted extensions lives in one place.

use serde::Serialize;
use std::fmt;

/// The document family an upload belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Pdf,
    Image,
    Spreadsheet,
    Unknown,
}

/// Suffix → format, checked in order.
const SUFFIX_RULES: &[(&str, DocumentFormat)] = &[
    (".pdf", DocumentFormat::Pdf),
    (".png", DocumentFormat::Image),
    (".jpg", DocumentFormat::Image),
    (".jpeg", DocumentFormat::Image),
    (".xlsx", DocumentFormat::Spreadsheet),
    (".xls", DocumentFormat::Spreadsheet),
];

impl DocumentFormat {
    /// Classify a filename by its suffix.
    pub fn detect(filename: &str) -> Self {
        SUFFIX_RULES
            .iter()
            .find(|(suffix, _)| filename.ends_with(suffix))
            .map(|(_, format)| *format)
            .unwrap_or(DocumentFormat::Unknown)
    }

    pub fn is_supported(self) -> bool {
        self != DocumentFormat::Unknown
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentFormat::Pdf => "PDF",
            DocumentFormat::Image => "image",
            DocumentFormat::Spreadsheet => "spreadsheet",
            DocumentFormat::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// A single upload, owned by the request that received it.
#[derive(Debug, Clone)]
pub struct UploadedDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
    pub format: DocumentFormat,
}

impl UploadedDocument {
    /// Wrap raw upload bytes, detecting the format from `filename`.
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        let filename = filename.into();
        let format = DocumentFormat::detect(&filename);
        Self {
            filename,
            bytes,
            format,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_suffixes() {
        assert_eq!(DocumentFormat::detect("invoice.pdf"), DocumentFormat::Pdf);
        assert_eq!(DocumentFormat::detect("scan.png"), DocumentFormat::Image);
        assert_eq!(DocumentFormat::detect("scan.jpg"), DocumentFormat::Image);
        assert_eq!(DocumentFormat::detect("scan.jpeg"), DocumentFormat::Image);
        assert_eq!(
            DocumentFormat::detect("ledger.xlsx"),
            DocumentFormat::Spreadsheet
        );
        assert_eq!(
            DocumentFormat::detect("ledger.xls"),
            DocumentFormat::Spreadsheet
        );
    }

    #[test]
    fn matching_is_case_sensitive() {
        assert_eq!(DocumentFormat::detect("INVOICE.PDF"), DocumentFormat::Unknown);
        assert_eq!(DocumentFormat::detect("scan.JPG"), DocumentFormat::Unknown);
    }

    #[test]
    fn unknown_suffixes() {
        assert_eq!(DocumentFormat::detect("report.txt"), DocumentFormat::Unknown);
        assert_eq!(DocumentFormat::detect("README"), DocumentFormat::Unknown);
        assert_eq!(DocumentFormat::detect(""), DocumentFormat::Unknown);
        assert_eq!(DocumentFormat::detect("notes.pdf.txt"), DocumentFormat::Unknown);
        assert_eq!(DocumentFormat::detect("archive.xlsm"), DocumentFormat::Unknown);
    }

    #[test]
    fn uploaded_document_detects_on_construction() {
        let doc = UploadedDocument::new("q3.xlsx", vec![1, 2, 3]);
        assert_eq!(doc.format, DocumentFormat::Spreadsheet);
        assert!(doc.format.is_supported());
        assert!(!UploadedDocument::new("a.doc", vec![]).format.is_supported());
    }
}
