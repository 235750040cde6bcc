//! Configuration types for document extraction.
//!
//! All behaviour is controlled through [`ExtractionConfig`], built via its
//! [`ExtractionConfigBuilder`]. The config is constructed once at process
//! start, validated, and shared read-only (behind an `Arc`) with every
//! request. Business logic never reads the environment directly.

use crate::error::Doc2JsonError;
use std::fmt;
use std::path::PathBuf;

/// Environment variable holding the remote service credential.
pub const API_KEY_ENV: &str = "GROQ_API_KEY";

/// Default OpenAI-compatible endpoint (Groq).
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// Default model identifier.
pub const DEFAULT_MODEL: &str = "llama3-70b-8192";

/// Configuration for the extraction pipeline.
///
/// # Example
/// ```rust
/// use doc2json::ExtractionConfig;
///
/// let config = ExtractionConfig::builder()
///     .api_key("gsk_test")
///     .max_retries(1)
///     .extraction_workers(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.model, "llama3-70b-8192");
/// ```
#[derive(Clone)]
pub struct ExtractionConfig {
    /// Bearer credential for the completion endpoint. Required.
    pub api_key: String,

    /// Base URL of the OpenAI-compatible API, without a trailing slash.
    pub base_url: String,

    /// Model identifier sent with every request. Default: `llama3-70b-8192`.
    pub model: String,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Output-size ceiling per completion. Default: 4096.
    pub max_tokens: usize,

    /// Per-call timeout for the remote request in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Extra attempts on a transient remote failure. Default: 3.
    ///
    /// Authentication and other permanent 4xx errors are never retried.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled after each attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Number of blocking extraction tasks allowed to run at once. Default: 4.
    pub extraction_workers: usize,

    /// Tesseract language pack. Default: `eng`.
    pub ocr_language: String,

    /// Tesseract executable name or path. Default: `tesseract`.
    pub tesseract_bin: String,

    /// Explicit pdfium library path. If None, pdfium-auto locates or
    /// downloads one.
    pub pdfium_lib_path: Option<PathBuf>,

    /// Maximum accepted upload body in bytes. Default: 25 MiB.
    pub max_upload_bytes: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.2,
            max_tokens: 4096,
            api_timeout_secs: 60,
            max_retries: 3,
            retry_backoff_ms: 500,
            extraction_workers: 4,
            ocr_language: "eng".to_string(),
            tesseract_bin: "tesseract".to_string(),
            pdfium_lib_path: None,
            max_upload_bytes: 25 * 1024 * 1024,
        }
    }
}

impl fmt::Debug for ExtractionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtractionConfig")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("retry_backoff_ms", &self.retry_backoff_ms)
            .field("extraction_workers", &self.extraction_workers)
            .field("ocr_language", &self.ocr_language)
            .field("tesseract_bin", &self.tesseract_bin)
            .field("pdfium_lib_path", &self.pdfium_lib_path)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .finish()
    }
}

impl ExtractionConfig {
    /// Create a new builder for `ExtractionConfig`.
    pub fn builder() -> ExtractionConfigBuilder {
        ExtractionConfigBuilder {
            config: Self::default(),
        }
    }

    /// Defaults plus the credential read from `GROQ_API_KEY`.
    pub fn from_env() -> Result<Self, Doc2JsonError> {
        let mut builder = Self::builder();
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            builder = builder.api_key(key);
        }
        builder.build()
    }
}

/// Builder for [`ExtractionConfig`].
#[derive(Debug)]
pub struct ExtractionConfigBuilder {
    config: ExtractionConfig,
}

impl ExtractionConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn extraction_workers(mut self, n: usize) -> Self {
        self.config.extraction_workers = n.max(1);
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn tesseract_bin(mut self, bin: impl Into<String>) -> Self {
        self.config.tesseract_bin = bin.into();
        self
    }

    pub fn pdfium_lib_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_lib_path = Some(path.into());
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ExtractionConfig, Doc2JsonError> {
        let c = &self.config;
        if c.api_key.trim().is_empty() {
            return Err(Doc2JsonError::MissingCredential {
                var: API_KEY_ENV.to_string(),
            });
        }
        if c.model.trim().is_empty() {
            return Err(Doc2JsonError::InvalidConfig("model must not be empty".into()));
        }
        if c.max_tokens == 0 {
            return Err(Doc2JsonError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.ocr_language.trim().is_empty() {
            return Err(Doc2JsonError::InvalidConfig(
                "ocr_language must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
