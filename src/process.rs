//! Request-level entry points.
//!
//! [`DocumentExtractor`] runs one upload through the whole pipeline:
//!
//! ```text
//! Received → FormatDetected → TextExtracted → Normalized → PromptBuilt
//!          → RemoteResponseReceived → Parsed → Success | Failure
//! ```
//!
//! No state is revisited. Unsupported formats, extraction failures and
//! remote failures exit early; nothing is persisted between requests.

use crate::config::ExtractionConfig;
use crate::error::{Doc2JsonError, ErrorKind};
use crate::format::UploadedDocument;
use crate::output::{ExtractionResult, StructuredRecordSet};
use crate::pipeline::extract::{self, ExtractedText, ExtractionPool};
use crate::pipeline::llm::{self, LlmCompletion, StructuredCompletion};
use crate::pipeline::parse;
use crate::prompts;
use edgequake_llm::LLMProvider;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// The extraction service shared by every request.
///
/// Cheap to clone; all fields are reference-counted and read-only.
#[derive(Clone)]
pub struct DocumentExtractor {
    config: Arc<ExtractionConfig>,
    completion: Arc<dyn StructuredCompletion>,
    pool: ExtractionPool,
}

impl DocumentExtractor {
    /// Build the service with an OpenAI-compatible provider from `config`.
    pub fn new(config: ExtractionConfig) -> Result<Self, Doc2JsonError> {
        let client = LlmCompletion::from_config(&config)?;
        Ok(Self::with_completion(config, Arc::new(client)))
    }

    /// Build the service over an already constructed LLM provider.
    pub fn with_provider(config: ExtractionConfig, provider: Arc<dyn LLMProvider>) -> Self {
        let client = LlmCompletion::new(provider, &config);
        Self::with_completion(config, Arc::new(client))
    }

    /// Build the service around a caller-supplied completion back-end.
    pub fn with_completion(
        config: ExtractionConfig,
        completion: Arc<dyn StructuredCompletion>,
    ) -> Self {
        let pool = ExtractionPool::new(config.extraction_workers);
        Self {
            config: Arc::new(config),
            completion,
            pool,
        }
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Process one upload. Every failure becomes a `Failure` envelope.
    pub async fn process(&self, filename: impl Into<String>, bytes: Vec<u8>) -> ExtractionResult {
        let doc = UploadedDocument::new(filename, bytes);
        match self.try_process(doc).await {
            Ok(data) => ExtractionResult::Success(data),
            Err(e) => {
                let kind = e.kind().unwrap_or(ErrorKind::ExtractionFailure);
                warn!("Extraction failed ({:?}): {}", kind, e);
                ExtractionResult::Failure(kind)
            }
        }
    }

    /// Stages up to and including normalisation.
    pub async fn extract_text(&self, doc: &UploadedDocument) -> Result<ExtractedText, Doc2JsonError> {
        extract::extract_document(doc, &self.config, &self.pool).await
    }

    /// Run the full pipeline, returning the first error encountered.
    pub async fn try_process(
        &self,
        doc: UploadedDocument,
    ) -> Result<StructuredRecordSet, Doc2JsonError> {
        let span = info_span!(
            "extract",
            filename = %doc.filename,
            format = %doc.format,
            bytes = doc.bytes.len()
        );
        self.run(doc).instrument(span).await
    }

    async fn run(&self, doc: UploadedDocument) -> Result<StructuredRecordSet, Doc2JsonError> {
        let start = Instant::now();
        info!("Received upload");

        // ── Extract + normalise ──────────────────────────────────────────
        let text = self.extract_text(&doc).await?;
        drop(doc);
        info!(
            "Text extracted: {} raw / {} normalised chars",
            text.raw.len(),
            text.normalized.len()
        );
        if text.normalized.is_empty() {
            warn!("Document produced no usable text; continuing with empty input");
        }

        // ── Prompt ───────────────────────────────────────────────────────
        let prompt = prompts::build_prompts(&text.normalized);
        debug!("Prompt built: {} chars", prompt.user.len());

        // ── Remote call ──────────────────────────────────────────────────
        let response =
            llm::complete_with_retry(self.completion.as_ref(), &prompt, &self.config).await?;
        info!("Remote response received: {} chars", response.len());

        // ── Parse + repair ───────────────────────────────────────────────
        let data = parse::parse_response(&response)?;
        info!(
            "Extraction complete: {} invoices, {} products, {} customers in {}ms",
            data.invoices.len(),
            data.products.len(),
            data.customers.len(),
            start.elapsed().as_millis()
        );
        Ok(data)
    }
}
