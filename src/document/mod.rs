//! Declaration model and XML rendering for the national DPS layout.

pub mod id;
mod xml;

use chrono::{DateTime, FixedOffset, NaiveDate};
use thiserror::Error;

use crate::config::Environment;

pub use xml::DPS_NAMESPACE;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("failed to serialize declaration XML: {0}")]
    Serialize(#[from] quick_xml::se::SeError),
    #[error("failed to derive the document identifier: {0}")]
    Identifier(#[from] id::IdError),
    #[error("{field} must not be negative, got {value}")]
    NegativeAmount { field: &'static str, value: f64 },
}

/// Federal tax identifier of a party. The variant selects the element name
/// on the wire and the type flag inside the document identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaxId {
    Cpf(String),
    Cnpj(String),
}

impl TaxId {
    /// Type flag used in the document identifier: 1 for CPF, 2 for CNPJ.
    pub fn kind_flag(&self) -> u8 {
        match self {
            TaxId::Cpf(_) => 1,
            TaxId::Cnpj(_) => 2,
        }
    }

    /// The identifier with punctuation stripped.
    pub fn digits(&self) -> String {
        match self {
            TaxId::Cpf(value) | TaxId::Cnpj(value) => id::digits(value),
        }
    }
}

/// A service-tax declaration (DPS), the logical fiscal document.
///
/// Field values are held in domain form; serialization rules (digit
/// stripping, date formats, two-decimal money) are applied by
/// [`build_document`].
#[derive(Debug, Clone)]
pub struct Declaration {
    pub environment: Environment,
    pub application_version: String,
    pub issued_at: DateTime<FixedOffset>,
    pub competence: NaiveDate,
    pub series: String,
    pub number: String,
    /// 1 provider, 2 recipient, 3 intermediary.
    pub emitter_type: u8,
    /// 7-digit IBGE code of the issuing municipality.
    pub municipality: String,
    pub issuer: Issuer,
    pub recipient: Recipient,
    pub service: Service,
    pub amounts: Amounts,
    pub construction: Option<Construction>,
    pub event: Option<Event>,
}

#[derive(Debug, Clone)]
pub struct Issuer {
    pub tax_id: TaxId,
    pub municipal_registration: Option<String>,
    /// Simples Nacional option: 1 none, 2 MEI, 3 ME/EPP.
    pub simple_national_option: u8,
    pub sn_assessment_regime: Option<u8>,
    pub special_tax_regime: Option<u8>,
}

#[derive(Debug, Clone)]
pub struct Recipient {
    pub tax_id: TaxId,
    pub municipal_registration: Option<String>,
    pub name: String,
    pub address: Option<Address>,
}

#[derive(Debug, Clone)]
pub struct Address {
    pub street: String,
    pub number: String,
    pub complement: Option<String>,
    pub district: String,
    /// 7-digit IBGE municipality code.
    pub municipality: String,
    pub postal_code: String,
}

#[derive(Debug, Clone)]
pub struct Service {
    /// Municipality where the service was provided.
    pub provision_municipality: String,
    /// National taxation code (`cTribNac`).
    pub national_code: String,
    pub municipal_code: Option<String>,
    pub description: String,
    pub nbs_code: Option<String>,
    pub internal_code: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Amounts {
    pub service_value: f64,
    pub unconditional_discount: Option<f64>,
    pub conditional_discount: Option<f64>,
    pub deduction_reduction: Option<DeductionReduction>,
    /// ISSQN taxability: 1 taxable, 2 exempt, 3 immune.
    pub issqn_taxation: u8,
    /// ISSQN withholding: 1 by recipient, 2 not withheld, 3 by intermediary.
    pub issqn_withholding: u8,
    /// ISSQN rate as a percentage, not a fraction.
    pub issqn_rate: Option<f64>,
    pub federal_withholdings: Option<FederalWithholdings>,
    /// Simples Nacional total tax percentage (`pTotTribSN`).
    pub sn_total_tax_rate: Option<f64>,
    pub total_tax_detail: Option<TotalTaxDetail>,
}

#[derive(Debug, Clone)]
pub struct DeductionReduction {
    pub percentage: Option<f64>,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct FederalWithholdings {
    pub pis: Option<f64>,
    pub cofins: Option<f64>,
    pub inss: Option<f64>,
    pub irrf: Option<f64>,
    pub csll: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct TotalTaxDetail {
    pub federal: f64,
    pub state: f64,
    pub municipal: f64,
}

/// Construction-site block (`obra`).
#[derive(Debug, Clone)]
pub struct Construction {
    pub work_code: Option<String>,
    pub art: Option<String>,
}

/// Event block (`evento`).
#[derive(Debug, Clone)]
pub struct Event {
    pub name: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}

/// Derives the document identifier stamped on the `infDPS` element.
///
/// This is the same function the builder uses; callers that need to predict
/// the identifier ahead of building (correlation, logging) get an identical
/// value. Fails when a source field overflows its fixed width.
pub fn document_id(declaration: &Declaration) -> Result<String, BuildError> {
    Ok(id::generate(
        &declaration.municipality,
        &declaration.issuer.tax_id,
        &declaration.series,
        &declaration.number,
    )?)
}

/// Renders the declaration as the canonical single-line DPS document.
pub fn build_document(declaration: &Declaration) -> Result<String, BuildError> {
    validate_amounts(&declaration.amounts)?;
    xml::build(declaration)
}

fn non_negative(field: &'static str, value: Option<f64>) -> Result<(), BuildError> {
    match value {
        Some(value) if value < 0.0 => Err(BuildError::NegativeAmount { field, value }),
        _ => Ok(()),
    }
}

/// Monetary values and rates carry no sign on the wire; a negative amount
/// is a caller bug, caught before serialization.
fn validate_amounts(amounts: &Amounts) -> Result<(), BuildError> {
    non_negative("service value", Some(amounts.service_value))?;
    non_negative("unconditional discount", amounts.unconditional_discount)?;
    non_negative("conditional discount", amounts.conditional_discount)?;
    if let Some(dr) = &amounts.deduction_reduction {
        non_negative("deduction/reduction percentage", dr.percentage)?;
        non_negative("deduction/reduction value", dr.value)?;
    }
    non_negative("ISSQN rate", amounts.issqn_rate)?;
    if let Some(fed) = &amounts.federal_withholdings {
        non_negative("PIS withholding", fed.pis)?;
        non_negative("COFINS withholding", fed.cofins)?;
        non_negative("INSS withholding", fed.inss)?;
        non_negative("IRRF withholding", fed.irrf)?;
        non_negative("CSLL withholding", fed.csll)?;
    }
    non_negative("total tax rate", amounts.sn_total_tax_rate)?;
    if let Some(total) = &amounts.total_tax_detail {
        non_negative("federal tax total", Some(total.federal))?;
        non_negative("state tax total", Some(total.state))?;
        non_negative("municipal tax total", Some(total.municipal))?;
    }
    Ok(())
}
