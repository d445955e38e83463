//! Enveloped XML digital signatures for declaration documents.
//!
//! The signature covers a single `Id`-bearing element, referenced by URI
//! fragment, with fixed algorithm identifiers (inclusive C14N, SHA-256,
//! RSA-SHA256) matching the set the receiving system accepts.

pub mod constants;
mod signer;
mod types;
mod utils;

use thiserror::Error;

pub use signer::sign_document;

#[derive(Debug, Error)]
pub enum SignError {
    #[error("signature target element <{0}> with an Id attribute not found")]
    MissingSignatureTarget(String),
    #[error("the private key could not produce a signature: {0}")]
    SigningKeyRejected(String),
    #[error("failed to canonicalize document content: {0}")]
    CanonicalizationFailure(String),
    #[error("signature block was inserted inside the signed element")]
    SignaturePlacement,
}

/// An XML document carrying exactly one embedded signature block.
///
/// Only produced by [`sign_document`]; partially signed documents are never
/// handed out.
#[derive(Debug, Clone)]
pub struct SignedDocument(String);

impl SignedDocument {
    fn new(xml: String) -> Self {
        Self(xml)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for SignedDocument {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
