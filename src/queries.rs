//! Read-side lookups against the NFS-e API.
//!
//! Submission returns the issued invoice inline; these endpoints exist for
//! callers that need to re-fetch an invoice by access key later, or to check
//! whether a DPS number was already consumed before issuing.

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::transport::{TransportError, TransportSender};

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query failed in transit: {0}")]
    Send(#[from] TransportError),
    #[error("the server response could not be decoded: {0}")]
    Response(#[from] serde_json::Error),
}

/// An issued NFS-e fetched by its 50-character access key.
#[derive(Debug, Clone, Deserialize)]
pub struct IssuedInvoice {
    #[serde(rename = "chaveAcesso")]
    pub access_key: String,
    /// Compressed XML of the invoice, gzip then base64, as stored server-side.
    #[serde(rename = "nfseXmlGZipB64")]
    pub invoice_xml_gzip_b64: String,
}

/// Link from a DPS identifier to the invoice it produced.
#[derive(Debug, Clone, Deserialize)]
pub struct DeclarationStatus {
    #[serde(rename = "chaveAcesso")]
    pub access_key: String,
}

/// Fetches an issued invoice by access key (`GET /nfse/{key}`).
pub async fn fetch_invoice(
    transport: &dyn TransportSender,
    access_key: &str,
) -> Result<IssuedInvoice, QueryError> {
    let path = format!("/nfse/{access_key}");
    debug!(access_key, "fetching issued invoice");

    let response = transport.get(&path).await?;
    if !response.is_success() {
        return Err(QueryError::Send(response.into_failure()));
    }

    Ok(serde_json::from_str(&response.body)?)
}

/// Looks up whether a DPS identifier was already processed (`GET /dps/{id}`).
///
/// A 404 from the server means the identifier is still free; that surfaces
/// as a [`TransportError::Failure`] with status 404, which callers check
/// before reusing a number.
pub async fn fetch_declaration_status(
    transport: &dyn TransportSender,
    declaration_id: &str,
) -> Result<DeclarationStatus, QueryError> {
    let path = format!("/dps/{declaration_id}");
    debug!(declaration_id, "checking declaration status");

    let response = transport.get(&path).await?;
    if !response.is_success() {
        return Err(QueryError::Send(response.into_failure()));
    }

    Ok(serde_json::from_str(&response.body)?)
}
