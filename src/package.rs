//! Packaging of signed documents for transport: gzip, then base64.

use std::io::Write;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use flate2::Compression;
use flate2::write::GzEncoder;
use thiserror::Error;

use crate::signature::SignedDocument;

#[derive(Debug, Error)]
pub enum PackageError {
    // Not expected with in-memory UTF-8 input; guards the io boundary.
    #[error("failed to compress signed document: {0}")]
    InternalEncoding(#[from] std::io::Error),
}

/// Compressed, base64-encoded form of a signed document. One-way: the core
/// never decodes payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportPayload(String);

impl TransportPayload {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Deterministically derives the transport payload: gzip at the default
/// level over the document's UTF-8 bytes, then standard base64.
pub fn package(document: &SignedDocument) -> Result<TransportPayload, PackageError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(document.as_str().as_bytes())?;
    let compressed = encoder.finish()?;
    Ok(TransportPayload(BASE64.encode(compressed)))
}
