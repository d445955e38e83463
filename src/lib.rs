//! Client library for the Brazilian national NFS-e API.
//!
//! The crate covers the full submission pipeline for a service-tax
//! declaration (DPS): loading the A1 certificate from a PKCS#12 container,
//! rendering the declaration as the fixed national XML layout, embedding an
//! enveloped XMLDSig signature, compressing and encoding the result, and
//! posting it over mutually-authenticated TLS.

pub mod config;
pub mod document;
pub mod keystore;
pub mod package;
pub mod queries;
pub mod signature;
pub mod submission;
pub mod telemetry;
pub mod transport;

pub use config::{Config, Environment};
pub use document::{Declaration, build_document, document_id};
pub use keystore::{KeyMaterial, KeyStoreError};
pub use package::{TransportPayload, package};
pub use queries::{QueryError, fetch_declaration_status, fetch_invoice};
pub use signature::{SignError, SignedDocument, sign_document};
pub use submission::{SubmissionResult, SubmitError, submit};
pub use transport::{NfseClient, TransportError, TransportResponse, TransportSender};
