//! Fixed XMLDSig algorithm identifiers.
//!
//! The receiving system accepts exactly this algorithm set; the values are a
//! compatibility contract, not a configuration surface.

pub const XMLDSIG_NAMESPACE: &str = "http://www.w3.org/2000/09/xmldsig#";
pub const XMLDSIG_ENVELOPED_SIGNATURE: &str =
    "http://www.w3.org/2000/09/xmldsig#enveloped-signature";

pub const INCLUSIVE_C14N_ALGORITHM: &str = "http://www.w3.org/TR/2001/REC-xml-c14n-20010315";
pub const RSA_SHA256_ALGORITHM: &str = "http://www.w3.org/2001/04/xmldsig-more#rsa-sha256";
pub const SHA256_DIGEST_ALGORITHM: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

pub const SIGNATURE_ELEMENT: &str = "Signature";
pub const ID_ATTRIBUTE: &str = "Id";
