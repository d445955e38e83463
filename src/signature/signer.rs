//! Enveloped XMLDSig signing of declaration documents.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private};
use openssl::sign::Signer as OpensslSigner;
use quick_xml::se::to_string;
use sha2::{Digest, Sha256};
use tracing::debug;

use super::constants::*;
use super::types::*;
use super::utils::{
    apply_inherited_namespaces, canonicalize, locate_element, remove_signature_blocks,
    signature_inside_element,
};
use super::{SignError, SignedDocument};
use crate::keystore::KeyMaterial;

fn reference(reference_id: &str, digest_value: String) -> Reference {
    Reference {
        uri: format!("#{reference_id}"),
        transforms: Transforms {
            transforms: vec![
                Transform {
                    algorithm: XMLDSIG_ENVELOPED_SIGNATURE.to_string(),
                },
                Transform {
                    algorithm: INCLUSIVE_C14N_ALGORITHM.to_string(),
                },
            ],
        },
        digest_method: DigestMethod {
            algorithm: SHA256_DIGEST_ALGORITHM.to_string(),
        },
        digest_value,
    }
}

fn signed_info(xmlns: Option<String>, reference: Reference) -> SignedInfo {
    SignedInfo {
        xmlns,
        canonicalization_method: CanonicalizationMethod {
            algorithm: INCLUSIVE_C14N_ALGORITHM.to_string(),
        },
        signature_method: SignatureMethod {
            algorithm: RSA_SHA256_ALGORITHM.to_string(),
        },
        reference,
    }
}

fn rsa_sha256_sign(key: &PKey<Private>, data: &[u8]) -> Result<Vec<u8>, SignError> {
    let mut signer = OpensslSigner::new(MessageDigest::sha256(), key)
        .map_err(|e| SignError::SigningKeyRejected(e.to_string()))?;
    signer
        .update(data)
        .map_err(|e| SignError::SigningKeyRejected(e.to_string()))?;
    signer
        .sign_to_vec()
        .map_err(|e| SignError::SigningKeyRejected(e.to_string()))
}

/// Signs the element named `target_element` inside `xml` and splices the
/// signature block back into the document.
///
/// The digest covers the canonicalized target element with the
/// enveloped-signature transform applied, computed before the signature
/// block exists. The block is then inserted right after the target's
/// closing tag, as its sibling; when the target is the document root, it
/// becomes the root's last child instead.
pub fn sign_document(
    xml: &str,
    keys: &KeyMaterial,
    target_element: &str,
) -> Result<SignedDocument, SignError> {
    let target = locate_element(xml, target_element)?
        .ok_or_else(|| SignError::MissingSignatureTarget(target_element.to_string()))?;
    let reference_id = target
        .id
        .clone()
        .ok_or_else(|| SignError::MissingSignatureTarget(target_element.to_string()))?;

    // Digest first, insert after: the signature block must never enter its
    // own reference digest. The fragment also re-declares the namespaces it
    // inherits from ancestor elements, because a verifier canonicalizing
    // the element in document context sees them rendered on its start tag.
    let fragment = &xml[target.start..target.end];
    let fragment =
        apply_inherited_namespaces(&remove_signature_blocks(fragment), &target.inherited_namespaces);
    let canonical_content = canonicalize(&fragment)?;
    let digest_b64 = BASE64.encode(Sha256::digest(canonical_content.as_bytes()));

    let reference = reference(&reference_id, digest_b64);

    // What gets signed is the canonicalized standalone SignedInfo, which
    // carries the xmldsig namespace itself. Verifiers recover the same
    // bytes because C14N propagates the namespace inherited from the
    // Signature parent.
    let standalone =
        to_string(&signed_info(Some(XMLDSIG_NAMESPACE.to_string()), reference.clone()))
            .map_err(|e| SignError::CanonicalizationFailure(e.to_string()))?;
    let canonical_signed_info = canonicalize(&standalone)?;

    let signature_bytes = rsa_sha256_sign(keys.private_key(), canonical_signed_info.as_bytes())?;
    let certificate_der = keys
        .leaf_certificate()
        .to_der()
        .map_err(|e| SignError::SigningKeyRejected(e.to_string()))?;

    let signature = Signature {
        xmlns: XMLDSIG_NAMESPACE.to_string(),
        signed_info: signed_info(None, reference),
        signature_value: SignatureValue {
            value: BASE64.encode(&signature_bytes),
        },
        key_info: KeyInfo {
            x509_data: X509Data {
                x509_certificate: X509Certificate {
                    certificate: BASE64.encode(&certificate_der),
                },
            },
        },
    };
    let signature_xml =
        to_string(&signature).map_err(|e| SignError::CanonicalizationFailure(e.to_string()))?;

    let insert_at = if target.is_root {
        target.close_start
    } else {
        target.end
    };
    let mut signed = String::with_capacity(xml.len() + signature_xml.len());
    signed.push_str(&xml[..insert_at]);
    signed.push_str(&signature_xml);
    signed.push_str(&xml[insert_at..]);

    if !target.is_root && signature_inside_element(&signed, target_element)? {
        return Err(SignError::SignaturePlacement);
    }

    debug!(reference = %reference_id, "document signed");
    Ok(SignedDocument::new(signed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::test_support::key_material;

    fn digest_value(signed: &SignedDocument) -> String {
        let xml = signed.as_str();
        let start = xml.find("<DigestValue>").expect("digest element") + "<DigestValue>".len();
        let end = xml[start..].find("</DigestValue>").expect("digest close") + start;
        xml[start..end].to_string()
    }

    #[test]
    fn inserts_signature_as_sibling_of_the_signed_element() {
        let keys = key_material();
        let xml = r#"<DPS><infDPS Id="DPS1"><tpAmb>2</tpAmb></infDPS></DPS>"#;

        let signed = sign_document(xml, &keys, "infDPS").expect("sign document");
        let signed = signed.as_str();

        assert_eq!(signed.matches("<Signature ").count(), 1);
        assert!(signed.contains(r##"<Reference URI="#DPS1">"##));
        let inf_end = signed.find("</infDPS>").expect("target close");
        let sig_start = signed.find("<Signature ").expect("signature");
        assert!(sig_start > inf_end);
        assert!(
            !signature_inside_element(signed, "infDPS").expect("well-formed"),
            "signature must not be a descendant of the signed element"
        );
    }

    #[test]
    fn root_target_gets_signature_as_last_child() {
        let keys = key_material();
        let xml = r#"<DPS Id="X"><info>A</info></DPS>"#;

        let signed = sign_document(xml, &keys, "DPS").expect("sign document");
        let signed = signed.as_str();

        assert_eq!(signed.matches("<Signature ").count(), 1);
        let info_end = signed.find("</info>").expect("child close");
        let sig_start = signed.find("<Signature ").expect("signature");
        assert!(sig_start > info_end);
        assert!(signed.ends_with("</DPS>"));
    }

    #[test]
    fn digest_changes_when_signed_content_changes() {
        let keys = key_material();

        let a = sign_document(r#"<DPS Id="X"><info>A</info></DPS>"#, &keys, "DPS")
            .expect("sign document");
        let b = sign_document(r#"<DPS Id="X"><info>B</info></DPS>"#, &keys, "DPS")
            .expect("sign document");

        assert_ne!(digest_value(&a), digest_value(&b));
    }

    #[test]
    fn digest_includes_the_namespace_inherited_from_the_root() {
        let keys = key_material();

        let with_ns = sign_document(
            r#"<DPS xmlns="urn:nfse"><infDPS Id="A"><v>1</v></infDPS></DPS>"#,
            &keys,
            "infDPS",
        )
        .expect("sign document");
        let without_ns = sign_document(
            r#"<DPS><infDPS Id="A"><v>1</v></infDPS></DPS>"#,
            &keys,
            "infDPS",
        )
        .expect("sign document");

        assert_ne!(digest_value(&with_ns), digest_value(&without_ns));
    }

    #[test]
    fn inherited_namespace_digests_like_an_explicit_redeclaration() {
        let keys = key_material();

        let inherited = sign_document(
            r#"<DPS xmlns="urn:nfse"><infDPS Id="A"><v>1</v></infDPS></DPS>"#,
            &keys,
            "infDPS",
        )
        .expect("sign document");
        let explicit = sign_document(
            r#"<DPS xmlns="urn:nfse"><infDPS xmlns="urn:nfse" Id="A"><v>1</v></infDPS></DPS>"#,
            &keys,
            "infDPS",
        )
        .expect("sign document");

        assert_eq!(digest_value(&inherited), digest_value(&explicit));
    }

    #[test]
    fn digest_ignores_a_previously_inserted_signature() {
        let keys = key_material();
        let xml = r#"<DPS><infDPS Id="DPS1"><tpAmb>2</tpAmb></infDPS></DPS>"#;

        let once = sign_document(xml, &keys, "infDPS").expect("first signing");
        let twice =
            sign_document(once.as_str(), &keys, "infDPS").expect("second signing");

        assert_eq!(digest_value(&once), digest_value(&twice));
    }

    #[test]
    fn missing_target_element_is_rejected() {
        let keys = key_material();

        let err = sign_document("<DPS><other/></DPS>", &keys, "infDPS")
            .expect_err("must fail");

        assert!(matches!(err, SignError::MissingSignatureTarget(_)));
    }

    #[test]
    fn target_without_id_attribute_is_rejected() {
        let keys = key_material();

        let err = sign_document("<DPS><infDPS><tpAmb>2</tpAmb></infDPS></DPS>", &keys, "infDPS")
            .expect_err("must fail");

        assert!(matches!(err, SignError::MissingSignatureTarget(_)));
    }

    #[test]
    fn reference_uri_resolves_to_the_id_attribute() {
        let keys = key_material();
        let xml = r#"<DPS><infDPS Id="DPS42"><v>1</v></infDPS></DPS>"#;

        let signed = sign_document(xml, &keys, "infDPS").expect("sign document");
        let signed = signed.as_str();

        let marker = "<Reference URI=\"#";
        let uri_start = signed.find(marker).expect("reference") + marker.len();
        let uri_end = signed[uri_start..].find('"').expect("uri close") + uri_start;
        let target_id = &signed[uri_start..uri_end];

        let target = locate_element(signed, "infDPS")
            .expect("well-formed")
            .expect("target present");
        assert_eq!(target.id.as_deref(), Some(target_id));
    }
}
