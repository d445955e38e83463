//! Shared fixtures for integration tests.

use chrono::{DateTime, FixedOffset, NaiveDate};
use openssl::hash::MessageDigest;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::PKey;
use openssl::rsa::Rsa;
use openssl::x509::{X509, X509NameBuilder};

use nfse_client::config::Environment;
use nfse_client::document::{
    Amounts, Declaration, Issuer, Recipient, Service, TaxId,
};
use nfse_client::keystore::KeyMaterial;

/// Builds an in-memory PKCS#12 container around a fresh self-signed
/// certificate and loads it through the public key-store API.
pub fn key_material() -> KeyMaterial {
    let rsa = Rsa::generate(2048).expect("generate RSA key");
    let key = PKey::from_rsa(rsa).expect("wrap RSA key");

    let mut name = X509NameBuilder::new().expect("name builder");
    name.append_entry_by_text("CN", "integration test")
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
    let cert = builder.build();

    let mut pfx = Pkcs12::builder();
    pfx.name("integration test");
    pfx.pkey(&key);
    pfx.cert(&cert);
    let der = pfx
        .build2("segredo")
        .expect("build PKCS#12")
        .to_der()
        .expect("encode PKCS#12");

    KeyMaterial::load(&der, "segredo").expect("load key material")
}

/// A minimal but complete declaration, mirroring a typical homologation
/// issuance.
pub fn declaration() -> Declaration {
    Declaration {
        environment: Environment::Homologacao,
        application_version: "1.0.0".to_string(),
        issued_at: DateTime::<FixedOffset>::parse_from_rfc3339("2026-02-04T12:00:00-03:00")
            .expect("valid timestamp"),
        competence: NaiveDate::from_ymd_opt(2026, 2, 4).expect("valid date"),
        series: "00001".to_string(),
        number: "1".to_string(),
        emitter_type: 1,
        municipality: "4125506".to_string(),
        issuer: Issuer {
            tax_id: TaxId::Cnpj("20.000.000/0000-00".to_string()),
            municipal_registration: None,
            simple_national_option: 1,
            sn_assessment_regime: None,
            special_tax_regime: None,
        },
        recipient: Recipient {
            tax_id: TaxId::Cpf("111.111.111-11".to_string()),
            municipal_registration: None,
            name: "Tomador Exemplo".to_string(),
            address: None,
        },
        service: Service {
            provision_municipality: "4125506".to_string(),
            national_code: "010101".to_string(),
            municipal_code: None,
            description: "Consultoria em sistemas".to_string(),
            nbs_code: None,
            internal_code: None,
        },
        amounts: Amounts {
            service_value: 1500.0,
            unconditional_discount: None,
            conditional_discount: None,
            deduction_reduction: None,
            issqn_taxation: 1,
            issqn_withholding: 2,
            issqn_rate: Some(2.0),
            federal_withholdings: None,
            sn_total_tax_rate: None,
            total_tax_detail: None,
        },
        construction: None,
        event: None,
    }
}
