//! Error types for the doc2json library.
//!
//! Two layers of error exist:
//!
//! * [`Doc2JsonError`] is what every fallible stage returns. It carries
//!   enough detail for logs (the failing format, the upstream status, the
//!   number of attempts made) but is never shown to the HTTP caller verbatim.
//!
//! * [`ErrorKind`] is the caller-facing classification. It fixes the message
//!   and status code placed in the response envelope, so internal detail such
//!   as a malformed model payload never leaks out.
//!
//! [`RemoteError`] describes a single failed call to the completion endpoint
//! and decides whether the call may be retried.

use crate::format::DocumentFormat;
use serde::Serialize;
use thiserror::Error;

/// All errors returned by the doc2json library.
#[derive(Debug, Error)]
pub enum Doc2JsonError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The filename's extension is not one of the supported suffixes.
    #[error("Unsupported file type: '{filename}'")]
    UnsupportedFormat { filename: String },

    /// The format-specific extractor could not produce text.
    #[error("Failed to extract text from {format} document: {detail}")]
    ExtractionFailed {
        format: DocumentFormat,
        detail: String,
    },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\
PDFium is normally downloaded automatically on first use.\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium to use an existing copy."
    )]
    PdfiumBindingFailed(String),

    /// The remote completion endpoint failed after all allowed attempts.
    #[error("Remote extraction service failed after {attempts} attempt(s): {source}")]
    RemoteService {
        #[source]
        source: RemoteError,
        attempts: u32,
    },

    /// The model's reply was not a JSON object.
    #[error("Model response is not valid JSON: {detail}")]
    SchemaParse { detail: String },

    // ── Startup errors ────────────────────────────────────────────────────
    /// The remote service credential was not provided.
    #[error("Missing API credential: set {var}")]
    MissingCredential { var: String },

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error (e.g. a blocking worker panicked).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Doc2JsonError {
    /// Envelope classification for a per-request error.
    ///
    /// Returns `None` for startup errors, which never reach a request.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Doc2JsonError::UnsupportedFormat { .. } => Some(ErrorKind::UnsupportedFormat),
            Doc2JsonError::ExtractionFailed { .. }
            | Doc2JsonError::PdfiumBindingFailed(_)
            | Doc2JsonError::Internal(_) => Some(ErrorKind::ExtractionFailure),
            Doc2JsonError::RemoteService { .. } => Some(ErrorKind::RemoteServiceError),
            Doc2JsonError::SchemaParse { .. } => Some(ErrorKind::SchemaParseError),
            Doc2JsonError::MissingCredential { .. } | Doc2JsonError::InvalidConfig(_) => None,
        }
    }

    pub(crate) fn extraction(format: DocumentFormat, detail: impl Into<String>) -> Self {
        Doc2JsonError::ExtractionFailed {
            format,
            detail: detail.into(),
        }
    }
}

/// Caller-facing failure classification carried by
/// [`crate::output::ExtractionResult::Failure`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    UnsupportedFormat,
    ExtractionFailure,
    RemoteServiceError,
    SchemaParseError,
}

impl ErrorKind {
    /// The message placed under `"error"` in the response envelope.
    pub fn message(self) -> &'static str {
        match self {
            ErrorKind::UnsupportedFormat => "Unsupported file type",
            ErrorKind::ExtractionFailure => "Failed to extract text from document",
            ErrorKind::RemoteServiceError => "Extraction service unavailable",
            ErrorKind::SchemaParseError => "Failed to extract invoice JSON",
        }
    }

    /// HTTP status code for this failure.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::UnsupportedFormat => 400,
            ErrorKind::ExtractionFailure | ErrorKind::SchemaParseError => 422,
            ErrorKind::RemoteServiceError => 502,
        }
    }
}

/// A single failed call to the structured-completion endpoint.
#[derive(Debug, Clone, Error)]
pub enum RemoteError {
    /// Connection refused, DNS failure, reset mid-body.
    #[error("network error: {0}")]
    Network(String),

    /// The call exceeded the configured timeout.
    #[error("request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// HTTP 429.
    #[error("rate limit exceeded")]
    RateLimited { retry_after_secs: Option<u64> },

    /// HTTP 401/403.
    #[error("authentication rejected (HTTP {status}): {detail}")]
    Auth { status: u16, detail: String },

    /// HTTP 5xx.
    #[error("upstream error (HTTP {status}): {detail}")]
    Upstream { status: u16, detail: String },

    /// Any other non-success status.
    #[error("API error (HTTP {status}): {detail}")]
    Api { status: u16, detail: String },

    /// A 2xx body without a usable `choices[0].message.content`.
    #[error("invalid response body: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Whether a later attempt could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::Network(_)
                | RemoteError::Timeout { .. }
                | RemoteError::RateLimited { .. }
                | RemoteError::Upstream { .. }
        )
    }

    /// Server-specified delay before the next attempt, if any.
    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            RemoteError::RateLimited { retry_after_secs } => *retry_after_secs,
            _ => None,
        }
    }
}
