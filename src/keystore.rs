//! A1 certificate loading from PKCS#12 (PFX) containers.
//!
//! The container is a password-encrypted archive of bagged entries. A single
//! parse pass recovers the private key, the leaf (subject) certificate and
//! the issuing chain. Nothing is ever written back to disk.

use std::fmt;

use openssl::error::ErrorStack;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::X509;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum KeyStoreError {
    #[error("the provided key-store password is incorrect")]
    InvalidPassword,
    #[error("the key-store container could not be parsed as PKCS#12")]
    MalformedContainer(#[source] ErrorStack),
    #[error("no private key or certificate found in the key-store container")]
    MissingKeyMaterial,
}

/// Private key, leaf certificate and issuing chain extracted from a
/// key-store container.
///
/// Immutable after construction. Safe to share across concurrent
/// submissions; no submission ever mutates it.
pub struct KeyMaterial {
    private_key: PKey<Private>,
    leaf_certificate: X509,
    chain_certificates: Vec<X509>,
}

impl KeyMaterial {
    /// Loads key material from the raw bytes of a PKCS#12 container.
    ///
    /// Both shrouded (password-protected) and plain key bags are handled by
    /// the underlying parser; the certificate matching the key becomes the
    /// leaf and the remaining certificate bags form the chain.
    pub fn load(container: &[u8], password: &str) -> Result<Self, KeyStoreError> {
        let pkcs12 = Pkcs12::from_der(container).map_err(KeyStoreError::MalformedContainer)?;
        let parsed = pkcs12.parse2(password).map_err(classify_parse_error)?;

        let private_key = parsed.pkey.ok_or(KeyStoreError::MissingKeyMaterial)?;
        let leaf_certificate = parsed.cert.ok_or(KeyStoreError::MissingKeyMaterial)?;
        let chain_certificates: Vec<X509> = parsed
            .ca
            .map(|stack| stack.into_iter().collect())
            .unwrap_or_default();

        debug!(
            chain_len = chain_certificates.len(),
            "loaded key material from PKCS#12 container"
        );

        Ok(Self {
            private_key,
            leaf_certificate,
            chain_certificates,
        })
    }

    pub fn private_key(&self) -> &PKey<Private> {
        &self.private_key
    }

    pub fn leaf_certificate(&self) -> &X509 {
        &self.leaf_certificate
    }

    pub fn chain_certificates(&self) -> &[X509] {
        &self.chain_certificates
    }
}

// Key material must never leak through logs; only the certificate subject
// is printable.
impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("subject", &format_args!("{:?}", self.leaf_certificate.subject_name()))
            .field("chain_certificates", &self.chain_certificates.len())
            .finish_non_exhaustive()
    }
}

/// A wrong password surfaces as a MAC verification (or decrypt) failure in
/// the openssl error stack; anything else means the archive itself is
/// malformed.
fn classify_parse_error(stack: ErrorStack) -> KeyStoreError {
    let password_mismatch = stack.errors().iter().any(|err| {
        err.reason().is_some_and(|reason| {
            reason.contains("mac verify failure")
                || reason.contains("mac verify error")
                || reason.contains("cipher final")
                || reason.contains("cipherfinal")
        })
    });

    if password_mismatch {
        KeyStoreError::InvalidPassword
    } else {
        KeyStoreError::MalformedContainer(stack)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use openssl::hash::MessageDigest;
    use openssl::rsa::Rsa;
    use openssl::x509::X509NameBuilder;

    pub(crate) fn self_signed() -> (PKey<Private>, X509) {
        let rsa = Rsa::generate(2048).expect("generate RSA key");
        let key = PKey::from_rsa(rsa).expect("wrap RSA key");

        let mut name = X509NameBuilder::new().expect("name builder");
        name.append_entry_by_text("CN", "nfse-client test")
            .expect("append CN");
        let name = name.build();

        let mut builder = X509::builder().expect("x509 builder");
        builder.set_version(2).expect("version");
        builder.set_subject_name(&name).expect("subject");
        builder.set_issuer_name(&name).expect("issuer");
        builder.set_pubkey(&key).expect("pubkey");
        let not_before = openssl::asn1::Asn1Time::days_from_now(0).expect("not before");
        let not_after = openssl::asn1::Asn1Time::days_from_now(365).expect("not after");
        builder.set_not_before(&not_before).expect("not before");
        builder.set_not_after(&not_after).expect("not after");
        builder.sign(&key, MessageDigest::sha256()).expect("sign");

        (key, builder.build())
    }

    pub(crate) fn container(password: &str) -> Vec<u8> {
        let (key, cert) = self_signed();
        let mut builder = Pkcs12::builder();
        builder.name("test");
        builder.pkey(&key);
        builder.cert(&cert);
        let pkcs12 = builder.build2(password).expect("build PKCS#12");
        pkcs12.to_der().expect("encode PKCS#12")
    }

    pub(crate) fn key_material() -> KeyMaterial {
        let der = container("segredo");
        KeyMaterial::load(&der, "segredo").expect("load test key material")
    }
}
