//! Format dispatch onto a bounded blocking pool.
//!
//! PDF parsing, OCR and spreadsheet parsing are CPU-bound and blocking.
//! Each runs inside `tokio::task::spawn_blocking`, gated by a semaphore so
//! at most `extraction_workers` run at once; further requests queue on the
//! semaphore instead of piling onto the blocking pool.

use crate::config::ExtractionConfig;
use crate::error::Doc2JsonError;
use crate::format::{DocumentFormat, UploadedDocument};
use crate::pipeline::{normalize, ocr, pdf, spreadsheet};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::debug;

/// Raw and normalised text for one document. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractedText {
    pub raw: String,
    pub normalized: String,
}

impl ExtractedText {
    pub fn new(raw: String) -> Self {
        let normalized = normalize::normalize(&raw);
        Self { raw, normalized }
    }
}

/// The extractor selected for a supported format.
#[derive(Debug, Clone)]
pub enum TextExtractor {
    Pdf { lib_path: Option<PathBuf> },
    ImageOcr(ocr::TesseractOcr),
    Spreadsheet,
}

impl TextExtractor {
    /// Choose the extractor for `format`, or fail with `UnsupportedFormat`.
    pub fn for_format(
        format: DocumentFormat,
        filename: &str,
        config: &ExtractionConfig,
    ) -> Result<Self, Doc2JsonError> {
        match format {
            DocumentFormat::Pdf => Ok(TextExtractor::Pdf {
                lib_path: config.pdfium_lib_path.clone(),
            }),
            DocumentFormat::Image => Ok(TextExtractor::ImageOcr(ocr::TesseractOcr::new(
                config.tesseract_bin.clone(),
                config.ocr_language.clone(),
            ))),
            DocumentFormat::Spreadsheet => Ok(TextExtractor::Spreadsheet),
            DocumentFormat::Unknown => Err(Doc2JsonError::UnsupportedFormat {
                filename: filename.to_string(),
            }),
        }
    }

    pub fn format(&self) -> DocumentFormat {
        match self {
            TextExtractor::Pdf { .. } => DocumentFormat::Pdf,
            TextExtractor::ImageOcr(_) => DocumentFormat::Image,
            TextExtractor::Spreadsheet => DocumentFormat::Spreadsheet,
        }
    }

    /// Blocking: produce raw text from the uploaded bytes.
    pub fn extract_blocking(&self, bytes: &[u8]) -> Result<String, Doc2JsonError> {
        match self {
            TextExtractor::Pdf { lib_path } => pdf::extract_text_blocking(bytes, lib_path.as_deref()),
            TextExtractor::ImageOcr(engine) => ocr::extract_text_blocking(bytes, engine),
            TextExtractor::Spreadsheet => spreadsheet::extract_text_blocking(bytes),
        }
    }
}

/// Concurrency gate in front of `spawn_blocking`.
#[derive(Debug, Clone)]
pub struct ExtractionPool {
    semaphore: Arc<Semaphore>,
}

impl ExtractionPool {
    pub fn new(workers: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Run `job` on the blocking pool once a permit is free.
    pub async fn run<T, F>(&self, job: F) -> Result<T, Doc2JsonError>
    where
        F: FnOnce() -> Result<T, Doc2JsonError> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| Doc2JsonError::Internal(format!("extraction pool closed: {e}")))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| Doc2JsonError::Internal(format!("Extraction task panicked: {}", e)))?
    }
}

/// Dispatch `doc` to its extractor on `pool` and normalise the result.
pub async fn extract_document(
    doc: &UploadedDocument,
    config: &ExtractionConfig,
    pool: &ExtractionPool,
) -> Result<ExtractedText, Doc2JsonError> {
    let extractor = TextExtractor::for_format(doc.format, &doc.filename, config)?;
    let bytes = doc.bytes.clone();

    let raw = pool
        .run(move || extractor.extract_blocking(&bytes))
        .await?;
    debug!("Extracted {} raw chars from {}", raw.len(), doc.format);

    Ok(ExtractedText::new(raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn config() -> ExtractionConfig {
        ExtractionConfig::builder().api_key("k").build().unwrap()
    }

    #[test]
    fn dispatch_table() {
        let c = config();
        let pick = |name: &str| {
            TextExtractor::for_format(DocumentFormat::detect(name), name, &c).map(|e| e.format())
        };
        assert_eq!(pick("a.pdf").unwrap(), DocumentFormat::Pdf);
        assert_eq!(pick("a.png").unwrap(), DocumentFormat::Image);
        assert_eq!(pick("a.jpg").unwrap(), DocumentFormat::Image);
        assert_eq!(pick("a.jpeg").unwrap(), DocumentFormat::Image);
        assert_eq!(pick("a.xlsx").unwrap(), DocumentFormat::Spreadsheet);
        assert_eq!(pick("a.xls").unwrap(), DocumentFormat::Spreadsheet);
        for name in ["a.PDF", "report.txt", "noext"] {
            assert!(
                matches!(pick(name), Err(Doc2JsonError::UnsupportedFormat { .. })),
                "{name} should be unsupported"
            );
        }
    }

    #[test]
    fn extracted_text_normalises() {
        let t = ExtractedText::new("Total:\n\t$42".into());
        assert_eq!(t.raw, "Total:\n\t$42");
        assert_eq!(t.normalized, "Total 42");
    }

    #[tokio::test]
    async fn pool_bounds_concurrency() {
        let pool = ExtractionPool::new(2);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs = (0..6).map(|_| {
            let pool = pool.clone();
            let running = Arc::clone(&running);
            let peak = Arc::clone(&peak);
            tokio::spawn(async move {
                pool.run(move || {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    std::thread::sleep(Duration::from_millis(30));
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
            })
        });

        for job in futures::future::join_all(jobs).await {
            job.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available_permits(), 2);
    }

    #[tokio::test]
    async fn panicking_job_is_internal_error() {
        let pool = ExtractionPool::new(1);
        let err = pool
            .run::<(), _>(|| panic!("boom"))
            .await
            .unwrap_err();
        assert!(matches!(err, Doc2JsonError::Internal(_)));
        assert_eq!(pool.available_permits(), 1);
    }

    #[tokio::test]
    async fn unsupported_document_never_reaches_pool() {
        let pool = ExtractionPool::new(1);
        let doc = UploadedDocument::new("report.txt", b"hello".to_vec());
        let err = extract_document(&doc, &config(), &pool).await.unwrap_err();
        assert!(matches!(err, Doc2JsonError::UnsupportedFormat { .. }));
    }
}
