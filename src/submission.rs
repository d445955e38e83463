//! Submission orchestration: build, sign, package, send, map.

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::document::{self, Declaration};
use crate::keystore::KeyMaterial;
use crate::package::{self, PackageError};
use crate::signature::{self, SignError};
use crate::transport::{TransportError, TransportSender};

/// Element of the DPS layout designated by the schema as the signing target.
const SIGNABLE_ELEMENT: &str = "infDPS";

const SUBMIT_PATH: &str = "/nfse";

/// Submission failure, tagged with the phase it originated in so callers can
/// tell a local document bug from a remote rejection.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("build phase failed: {0}")]
    Build(#[from] document::BuildError),
    #[error("signing phase failed: {0}")]
    Sign(#[from] SignError),
    #[error("packaging phase failed: {0}")]
    Package(#[from] PackageError),
    #[error("send phase failed: {0}")]
    Send(#[from] TransportError),
    #[error("the server response could not be decoded: {0}")]
    Response(#[from] serde_json::Error),
}

/// Warning or rejection detail attached to a processed submission.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessingMessage {
    #[serde(rename = "codigo", default)]
    pub code: Option<String>,
    #[serde(rename = "descricao", default)]
    pub description: Option<String>,
    #[serde(rename = "correcao", default)]
    pub correction: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSubmissionResponse {
    #[serde(rename = "tipoAmbiente")]
    environment_flag: u8,
    #[serde(rename = "versaoAplicativo")]
    application_version: String,
    #[serde(rename = "dataHoraProcessamento")]
    processed_at: String,
    #[serde(rename = "idDps")]
    declaration_id: String,
    #[serde(rename = "chaveAcesso")]
    access_key: String,
    #[serde(rename = "nfseXmlGZipB64", default)]
    invoice_xml_gzip_b64: Option<String>,
    #[serde(rename = "alertas", default)]
    warnings: Vec<ProcessingMessage>,
}

/// Outcome of a successfully processed submission.
#[derive(Debug, Clone)]
pub struct SubmissionResult {
    /// 50-character access key of the issued NFS-e.
    pub access_key: String,
    pub processed_at: String,
    pub environment_flag: u8,
    pub application_version: String,
    pub declaration_id: String,
    /// Compressed XML of the issued invoice, when the server returns it.
    pub invoice_xml_gzip_b64: Option<String>,
    pub warnings: Vec<ProcessingMessage>,
}

impl From<RawSubmissionResponse> for SubmissionResult {
    fn from(raw: RawSubmissionResponse) -> Self {
        SubmissionResult {
            access_key: raw.access_key,
            processed_at: raw.processed_at,
            environment_flag: raw.environment_flag,
            application_version: raw.application_version,
            declaration_id: raw.declaration_id,
            invoice_xml_gzip_b64: raw.invoice_xml_gzip_b64,
            warnings: raw.warnings,
        }
    }
}

/// Runs the full submission pipeline for one declaration.
///
/// Build, sign and package are synchronous and treated as atomic; the
/// transport call is the only suspension point. No step retries, and every
/// failure surfaces wrapped with its phase of origin.
pub async fn submit(
    declaration: &Declaration,
    keys: &KeyMaterial,
    transport: &dyn TransportSender,
) -> Result<SubmissionResult, SubmitError> {
    let document_id = document::document_id(declaration)?;
    debug!(%document_id, "building declaration document");

    let xml = document::build_document(declaration)?;
    let signed = signature::sign_document(&xml, keys, SIGNABLE_ELEMENT)?;
    let payload = package::package(&signed)?;

    let body = json!({ "dpsXmlGZipB64": payload.as_str() });
    let response = transport.post_json(SUBMIT_PATH, body).await?;
    if !response.is_success() {
        return Err(SubmitError::Send(response.into_failure()));
    }

    let raw: RawSubmissionResponse = serde_json::from_str(&response.body)?;
    let result = SubmissionResult::from(raw);
    info!(%document_id, access_key = %result.access_key, "declaration accepted");
    Ok(result)
}
