//! Deterministic document identifier derivation.
//!
//! Layout: `"DPS"` + municipality (7) + tax-ID-type flag (1) + tax ID (14) +
//! series (5) + sequence number (15), every numeric field zero-padded to its
//! fixed width. The identifier doubles as the `Id` attribute of `infDPS` and
//! as the signature reference target, so it must come out identical for the
//! same inputs on every call.

use thiserror::Error;

use super::TaxId;

pub const ID_PREFIX: &str = "DPS";

/// Total identifier length: prefix plus the fixed-width numeric fields.
pub const ID_LEN: usize = 3 + 7 + 1 + 14 + 5 + 15;

#[derive(Debug, Error)]
pub enum IdError {
    #[error("{field} has {len} digits, which does not fit its {width}-digit identifier field")]
    OversizedField {
        field: &'static str,
        len: usize,
        width: usize,
    },
}

/// Strips everything but ASCII digits.
pub fn digits(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// Zero-pads a digit string to its field width; a value wider than the
/// field would silently break the fixed identifier length, so it is
/// rejected instead.
fn fit(field: &'static str, value: String, width: usize) -> Result<String, IdError> {
    if value.len() > width {
        return Err(IdError::OversizedField {
            field,
            len: value.len(),
            width,
        });
    }
    Ok(format!("{value:0>width$}"))
}

/// Derives the identifier from its source fields. Pure and idempotent;
/// fails only when a field overflows its fixed width.
pub fn generate(
    municipality: &str,
    tax_id: &TaxId,
    series: &str,
    number: &str,
) -> Result<String, IdError> {
    let municipality = fit("municipality code", digits(municipality), 7)?;
    let tax_digits = fit("tax identifier", tax_id.digits(), 14)?;
    let series = fit("series", digits(series), 5)?;
    let number = fit("document number", digits(number), 15)?;

    Ok(format!(
        "{ID_PREFIX}{municipality}{}{tax_digits}{series}{number}",
        tax_id.kind_flag(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_fixed_width_identifier() {
        let id = generate(
            "4125506",
            &TaxId::Cnpj("00.000.000/0000-00".to_string()),
            "1",
            "100",
        )
        .expect("generate identifier");

        assert_eq!(id, "DPS412550620000000000000000001000000000000100");
        assert_eq!(id.len(), ID_LEN);
    }

    #[test]
    fn is_deterministic() {
        let tax_id = TaxId::Cnpj("12345678000199".to_string());
        let first = generate("3550308", &tax_id, "900", "42").expect("generate identifier");
        let second = generate("3550308", &tax_id, "900", "42").expect("generate identifier");

        assert_eq!(first, second);
    }

    #[test]
    fn every_position_after_prefix_is_a_digit() {
        let id = generate(
            "123",
            &TaxId::Cpf("529.982.247-25".to_string()),
            "99999",
            "999999999999999",
        )
        .expect("generate identifier");

        assert_eq!(id.len(), ID_LEN);
        assert!(id.starts_with(ID_PREFIX));
        assert!(id[ID_PREFIX.len()..].chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn cpf_and_cnpj_select_the_type_flag() {
        let cpf = generate("4125506", &TaxId::Cpf("52998224725".to_string()), "1", "1")
            .expect("generate identifier");
        let cnpj = generate("4125506", &TaxId::Cnpj("12345678000199".to_string()), "1", "1")
            .expect("generate identifier");

        assert_eq!(&cpf[10..11], "1");
        assert_eq!(&cnpj[10..11], "2");
    }

    #[test]
    fn field_wider_than_its_slot_is_rejected() {
        let tax_id = TaxId::Cnpj("12345678000199".to_string());

        let err = generate("41255060", &tax_id, "1", "1").expect_err("must reject");
        assert!(matches!(
            err,
            IdError::OversizedField {
                field: "municipality code",
                len: 8,
                width: 7,
            }
        ));

        let err = generate("4125506", &tax_id, "123456", "1").expect_err("must reject");
        assert!(matches!(err, IdError::OversizedField { field: "series", .. }));

        let err = generate("4125506", &tax_id, "1", "1234567890123456").expect_err("must reject");
        assert!(matches!(
            err,
            IdError::OversizedField {
                field: "document number",
                ..
            }
        ));
    }
}
