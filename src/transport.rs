//! Transport boundary: mutually-authenticated HTTP against the NFS-e API.
//!
//! The signing core only depends on the [`TransportSender`] trait;
//! [`NfseClient`] is the production implementation built on `reqwest`.

use async_trait::async_trait;
use openssl::pkcs12::Pkcs12;
use openssl::stack::Stack;
use openssl::x509::X509;
use rand::Rng;
use rand::distr::Alphanumeric;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::config::{ApiConfig, Environment};
use crate::keystore::KeyMaterial;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to assemble client credentials: {0}")]
    Credentials(#[from] openssl::error::ErrorStack),
    #[error("failed to construct HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("request to {path} failed: {source}")]
    Request {
        path: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("server rejected the request with status {status_code}: {body}")]
    Failure { status_code: u16, body: String },
}

/// Raw response handed back by a transport implementation.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Converts a non-success response into the typed failure the caller
    /// propagates unchanged.
    pub fn into_failure(self) -> TransportError {
        TransportError::Failure {
            status_code: self.status,
            body: self.body,
        }
    }
}

/// Capability to exchange bytes with the remote API.
///
/// The single suspension point of a submission; implementations may be
/// long-running and should honor cancellation.
#[async_trait]
pub trait TransportSender: Send + Sync {
    async fn post_json(&self, path: &str, body: Value) -> Result<TransportResponse, TransportError>;

    async fn get(&self, path: &str) -> Result<TransportResponse, TransportError>;
}

/// HTTP client presenting the A1 certificate for mutual authentication.
///
/// The client credential bundle is derived from [`KeyMaterial`] once, at
/// construction time: the key, leaf and chain are re-wrapped into an
/// ephemeral PKCS#12 protected by a random throwaway password that never
/// leaves this function. Rebuilding the bundle is cheap next to network
/// latency, so nothing is cached across clients.
pub struct NfseClient {
    http: reqwest::Client,
    base_url: String,
}

impl NfseClient {
    pub fn new(api: &ApiConfig, keys: &KeyMaterial) -> Result<Self, TransportError> {
        Self::with_base_url(api.environment.base_url(), api, keys)
    }

    pub fn with_base_url(
        base_url: &str,
        api: &ApiConfig,
        keys: &KeyMaterial,
    ) -> Result<Self, TransportError> {
        let identity = ephemeral_identity(keys)?;

        let http = reqwest::Client::builder()
            .identity(identity)
            .timeout(std::time::Duration::from_secs(api.timeout_secs))
            .build()
            .map_err(TransportError::Client)?;

        debug!(base_url, "constructed mTLS transport client");

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn for_environment(
        environment: Environment,
        keys: &KeyMaterial,
    ) -> Result<Self, TransportError> {
        let api = ApiConfig {
            environment,
            timeout_secs: 30,
        };
        Self::new(&api, keys)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn read_response(
        path: &str,
        response: reqwest::Response,
    ) -> Result<TransportResponse, TransportError> {
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|source| TransportError::Request {
            path: path.to_string(),
            source,
        })?;
        Ok(TransportResponse { status, body })
    }
}

fn ephemeral_identity(keys: &KeyMaterial) -> Result<reqwest::Identity, TransportError> {
    let password: String = rand::rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect();

    let mut chain = Stack::<X509>::new()?;
    for cert in keys.chain_certificates() {
        chain.push(cert.clone())?;
    }

    let mut builder = Pkcs12::builder();
    builder.name("nfse-client");
    builder.pkey(keys.private_key());
    builder.cert(keys.leaf_certificate());
    builder.ca(chain);
    let bundle = builder.build2(&password)?;
    let der = bundle.to_der()?;

    reqwest::Identity::from_pkcs12_der(&der, &password).map_err(TransportError::Client)
}

#[async_trait]
impl TransportSender for NfseClient {
    async fn post_json(&self, path: &str, body: Value) -> Result<TransportResponse, TransportError> {
        let url = self.url(path);
        let response = self
            .http
            .post(&url)
            .header("Content-Type", "application/json;charset=utf-8")
            .header("Accept", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                path: path.to_string(),
                source,
            })?;
        Self::read_response(path, response).await
    }

    async fn get(&self, path: &str) -> Result<TransportResponse, TransportError> {
        let url = self.url(path);
        let response = self
            .http
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|source| TransportError::Request {
                path: path.to_string(),
                source,
            })?;
        Self::read_response(path, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::test_support::key_material;

    #[test]
    fn client_construction_derives_an_ephemeral_identity() {
        let keys = key_material();
        let api = ApiConfig {
            environment: Environment::Homologacao,
            timeout_secs: 5,
        };

        let client = NfseClient::new(&api, &keys).expect("construct client");

        assert_eq!(
            client.url("/nfse"),
            "https://www.producaorestrita.nfse.gov.br/nfse"
        );
    }

    #[test]
    fn failure_response_preserves_status_and_body() {
        let response = TransportResponse {
            status: 422,
            body: "rejected".to_string(),
        };

        assert!(!response.is_success());
        match response.into_failure() {
            TransportError::Failure { status_code, body } => {
                assert_eq!(status_code, 422);
                assert_eq!(body, "rejected");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
