//! Image OCR: decode with the `image` crate, recognise with tesseract.
//!
//! The upload is decoded first so corrupt images fail fast with a clear
//! error, then re-encoded as PNG and piped to `tesseract stdin stdout`.
//! The whole image is recognised in one pass with a fixed language pack;
//! no region segmentation is attempted.

use crate::error::Doc2JsonError;
use crate::format::DocumentFormat;
use image::DynamicImage;
use std::io::{Cursor, Write};
use std::process::{Command, Stdio};
use tracing::debug;

/// Decode uploaded image bytes (PNG or JPEG).
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, Doc2JsonError> {
    image::load_from_memory(bytes).map_err(|e| {
        Doc2JsonError::extraction(DocumentFormat::Image, format!("undecodable image: {e}"))
    })
}

/// Encode a decoded image as PNG for the OCR engine.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, Doc2JsonError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| Doc2JsonError::extraction(DocumentFormat::Image, e.to_string()))?;
    debug!(
        "Encoded {}x{} image → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}

/// Tesseract invoked as an external process.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    binary: String,
    language: String,
}

impl TesseractOcr {
    pub fn new(binary: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }

    /// Whether the configured binary can be executed.
    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Blocking: recognise text in PNG bytes.
    pub fn recognize(&self, png: &[u8]) -> Result<String, Doc2JsonError> {
        let ocr_err = |detail: String| Doc2JsonError::extraction(DocumentFormat::Image, detail);

        let mut child = Command::new(&self.binary)
            .args(["stdin", "stdout", "-l", &self.language])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| ocr_err(format!("failed to launch '{}': {e}", self.binary)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ocr_err("tesseract stdin unavailable".into()))?;

        // Feed stdin from a scoped thread so a large image cannot deadlock
        // against a full stdout pipe.
        let (output, written) = std::thread::scope(|scope| {
            let writer = scope.spawn(move || {
                let written = stdin.write_all(png);
                drop(stdin);
                written
            });
            let output = child.wait_with_output();
            let written = writer
                .join()
                .unwrap_or_else(|_| Err(std::io::Error::other("stdin writer panicked")));
            (output, written)
        });

        let output = output.map_err(|e| ocr_err(format!("tesseract failed: {e}")))?;
        if let Err(e) = written {
            debug!("tesseract closed stdin early: {e}");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ocr_err(format!("tesseract error: {}", stderr.trim())));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("OCR recognised {} chars", text.len());
        Ok(text)
    }
}

/// Blocking: decode, re-encode and recognise an uploaded image.
pub fn extract_text_blocking(bytes: &[u8], ocr: &TesseractOcr) -> Result<String, Doc2JsonError> {
    let img = decode_image(bytes)?;
    let png = encode_png(&img)?;
    ocr.recognize(&png)
}
