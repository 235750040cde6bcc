//! HTTP boundary: one multipart upload endpoint plus a health check.
//!
//! `POST /upload/` expects a multipart part named `file`. The part's
//! filename drives format dispatch; its bytes are processed in memory and
//! dropped when the response is sent. Each envelope is paired with the
//! status code of its [`crate::error::ErrorKind`].

use crate::output::ExtractionResult;
use crate::process::DocumentExtractor;
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

/// Name of the multipart field carrying the document.
pub const FILE_FIELD: &str = "file";

impl IntoResponse for ExtractionResult {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

fn bad_request(message: &str) -> Response {
    error_response(StatusCode::BAD_REQUEST, message)
}

/// Build the application router.
pub fn router(extractor: Arc<DocumentExtractor>) -> Router {
    let body_limit = extractor.config().max_upload_bytes;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/upload/", post(upload_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(extractor)
}

/// Bind `addr` and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, extractor: Arc<DocumentExtractor>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);
    axum::serve(listener, router(extractor)).await
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn upload_handler(
    State(extractor): State<Arc<DocumentExtractor>>,
    mut multipart: Multipart,
) -> Response {
    loop {
        let field = match multipart.next_field().await {
            Ok(Some(field)) => field,
            Ok(None) => break,
            Err(e) => {
                warn!("Malformed multipart body: {}", e);
                return multipart_rejection(&e);
            }
        };

        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes.to_vec(),
            Err(e) => {
                warn!("Failed to read upload '{}': {}", filename, e);
                return multipart_rejection(&e);
            }
        };

        return extractor.process(filename, bytes).await.into_response();
    }

    bad_request("Missing file field")
}

/// Oversized bodies get 413; every other multipart problem is a 400.
fn multipart_rejection(e: &MultipartError) -> Response {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        error_response(StatusCode::PAYLOAD_TOO_LARGE, "File too large")
    } else {
        bad_request("Malformed multipart body")
    }
}
