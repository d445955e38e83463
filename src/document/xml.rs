//! Wire layout of the DPS document.
//!
//! The element names, nesting and order below are a byte-for-byte contract
//! with the receiving system; serialization goes through serde/quick-xml so
//! reserved characters are escaped centrally and absent optional fields
//! produce no element at all.

use serde::{Serialize, Serializer};

use super::{Declaration, id};

pub const DPS_NAMESPACE: &str = "http://www.sped.fazenda.gov.br/nfse";

const LAYOUT_VERSION: &str = "1.00";
const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Two-decimal rendering for monetary fields.
fn money<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format!("{value:.2}"))
}

fn opt_money<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.serialize_str(&format!("{v:.2}")),
        None => serializer.serialize_none(),
    }
}

/// Percentages and rates are undecorated: `2.0` renders as `2`.
fn opt_rate<S: Serializer>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error> {
    match value {
        Some(v) => serializer.serialize_str(&format!("{v}")),
        None => serializer.serialize_none(),
    }
}

#[derive(Serialize)]
#[serde(rename = "DPS")]
struct DpsEnvelope {
    #[serde(rename = "@xmlns")]
    xmlns: &'static str,
    #[serde(rename = "@versao")]
    versao: &'static str,
    #[serde(rename = "infDPS")]
    inf_dps: InfDps,
}

#[derive(Serialize)]
struct InfDps {
    #[serde(rename = "@Id")]
    id: String,
    #[serde(rename = "tpAmb")]
    tp_amb: u8,
    #[serde(rename = "dhEmi")]
    dh_emi: String,
    #[serde(rename = "verAplic")]
    ver_aplic: String,
    #[serde(rename = "serie")]
    serie: String,
    #[serde(rename = "nDPS")]
    n_dps: String,
    #[serde(rename = "dCompet")]
    d_compet: String,
    #[serde(rename = "tpEmit")]
    tp_emit: u8,
    #[serde(rename = "cLocEmi")]
    c_loc_emi: String,
    #[serde(rename = "prest")]
    prest: Prest,
    #[serde(rename = "toma")]
    toma: Toma,
    #[serde(rename = "serv")]
    serv: Serv,
    #[serde(rename = "valores")]
    valores: Valores,
    #[serde(rename = "obra", skip_serializing_if = "Option::is_none")]
    obra: Option<Obra>,
    #[serde(rename = "evento", skip_serializing_if = "Option::is_none")]
    evento: Option<Evento>,
}

#[derive(Serialize)]
struct Prest {
    #[serde(rename = "CNPJ", skip_serializing_if = "Option::is_none")]
    cnpj: Option<String>,
    #[serde(rename = "CPF", skip_serializing_if = "Option::is_none")]
    cpf: Option<String>,
    #[serde(rename = "IM", skip_serializing_if = "Option::is_none")]
    im: Option<String>,
    #[serde(rename = "regTrib")]
    reg_trib: RegTrib,
}

#[derive(Serialize)]
struct RegTrib {
    #[serde(rename = "opSimpNac")]
    op_simp_nac: u8,
    #[serde(rename = "regApTribSN", skip_serializing_if = "Option::is_none")]
    reg_ap_trib_sn: Option<u8>,
    #[serde(rename = "regEspTrib", skip_serializing_if = "Option::is_none")]
    reg_esp_trib: Option<u8>,
}

#[derive(Serialize)]
struct Toma {
    #[serde(rename = "CNPJ", skip_serializing_if = "Option::is_none")]
    cnpj: Option<String>,
    #[serde(rename = "CPF", skip_serializing_if = "Option::is_none")]
    cpf: Option<String>,
    #[serde(rename = "IM", skip_serializing_if = "Option::is_none")]
    im: Option<String>,
    #[serde(rename = "xNome")]
    x_nome: String,
    #[serde(rename = "end", skip_serializing_if = "Option::is_none")]
    end: Option<End>,
}

#[derive(Serialize)]
struct End {
    #[serde(rename = "endNac")]
    end_nac: EndNac,
    #[serde(rename = "xLgr")]
    x_lgr: String,
    #[serde(rename = "nro")]
    nro: String,
    #[serde(rename = "xCpl", skip_serializing_if = "Option::is_none")]
    x_cpl: Option<String>,
    #[serde(rename = "xBairro")]
    x_bairro: String,
}

#[derive(Serialize)]
struct EndNac {
    #[serde(rename = "cMun")]
    c_mun: String,
    #[serde(rename = "CEP")]
    cep: String,
}

#[derive(Serialize)]
struct Serv {
    #[serde(rename = "locPrest")]
    loc_prest: LocPrest,
    #[serde(rename = "cServ")]
    c_serv: CServ,
}

#[derive(Serialize)]
struct LocPrest {
    #[serde(rename = "cLocPrestacao")]
    c_loc_prestacao: String,
}

#[derive(Serialize)]
struct CServ {
    #[serde(rename = "cTribNac")]
    c_trib_nac: String,
    #[serde(rename = "cTribMun", skip_serializing_if = "Option::is_none")]
    c_trib_mun: Option<String>,
    #[serde(rename = "xDescServ")]
    x_desc_serv: String,
    #[serde(rename = "cNBS", skip_serializing_if = "Option::is_none")]
    c_nbs: Option<String>,
    #[serde(rename = "cIntContrib", skip_serializing_if = "Option::is_none")]
    c_int_contrib: Option<String>,
}

#[derive(Serialize)]
struct Valores {
    #[serde(rename = "vServPrest")]
    v_serv_prest: VServPrest,
    #[serde(rename = "vDescCondIncond", skip_serializing_if = "Option::is_none")]
    v_desc_cond_incond: Option<Discounts>,
    #[serde(rename = "vDedRed", skip_serializing_if = "Option::is_none")]
    v_ded_red: Option<VDedRed>,
    #[serde(rename = "trib")]
    trib: Trib,
}

#[derive(Serialize)]
struct VServPrest {
    #[serde(rename = "vServ", serialize_with = "money")]
    v_serv: f64,
}

#[derive(Serialize)]
struct Discounts {
    #[serde(
        rename = "vDescIncond",
        serialize_with = "opt_money",
        skip_serializing_if = "Option::is_none"
    )]
    v_desc_incond: Option<f64>,
    #[serde(
        rename = "vDescCond",
        serialize_with = "opt_money",
        skip_serializing_if = "Option::is_none"
    )]
    v_desc_cond: Option<f64>,
}

#[derive(Serialize)]
struct VDedRed {
    #[serde(
        rename = "pDR",
        serialize_with = "opt_rate",
        skip_serializing_if = "Option::is_none"
    )]
    p_dr: Option<f64>,
    #[serde(
        rename = "vDR",
        serialize_with = "opt_money",
        skip_serializing_if = "Option::is_none"
    )]
    v_dr: Option<f64>,
}

#[derive(Serialize)]
struct Trib {
    #[serde(rename = "tribMun")]
    trib_mun: TribMun,
    #[serde(rename = "tribFed", skip_serializing_if = "Option::is_none")]
    trib_fed: Option<TribFed>,
    #[serde(rename = "totTrib", skip_serializing_if = "Option::is_none")]
    tot_trib: Option<TotTrib>,
}

#[derive(Serialize)]
struct TribMun {
    #[serde(rename = "tribISSQN")]
    trib_issqn: u8,
    #[serde(rename = "tpRetISSQN")]
    tp_ret_issqn: u8,
    #[serde(
        rename = "pAliq",
        serialize_with = "opt_rate",
        skip_serializing_if = "Option::is_none"
    )]
    p_aliq: Option<f64>,
}

#[derive(Serialize)]
struct TribFed {
    #[serde(
        rename = "vRetPIS",
        serialize_with = "opt_money",
        skip_serializing_if = "Option::is_none"
    )]
    v_ret_pis: Option<f64>,
    #[serde(
        rename = "vRetCOFINS",
        serialize_with = "opt_money",
        skip_serializing_if = "Option::is_none"
    )]
    v_ret_cofins: Option<f64>,
    #[serde(
        rename = "vRetINSS",
        serialize_with = "opt_money",
        skip_serializing_if = "Option::is_none"
    )]
    v_ret_inss: Option<f64>,
    #[serde(
        rename = "vRetIRRF",
        serialize_with = "opt_money",
        skip_serializing_if = "Option::is_none"
    )]
    v_ret_irrf: Option<f64>,
    #[serde(
        rename = "vRetCSLL",
        serialize_with = "opt_money",
        skip_serializing_if = "Option::is_none"
    )]
    v_ret_csll: Option<f64>,
}

#[derive(Serialize)]
struct TotTrib {
    #[serde(
        rename = "pTotTribSN",
        serialize_with = "opt_rate",
        skip_serializing_if = "Option::is_none"
    )]
    p_tot_trib_sn: Option<f64>,
    #[serde(rename = "vTotTrib", skip_serializing_if = "Option::is_none")]
    v_tot_trib: Option<VTotTrib>,
}

#[derive(Serialize)]
struct VTotTrib {
    #[serde(rename = "vTotTribFed", serialize_with = "money")]
    v_tot_trib_fed: f64,
    #[serde(rename = "vTotTribEst", serialize_with = "money")]
    v_tot_trib_est: f64,
    #[serde(rename = "vTotTribMun", serialize_with = "money")]
    v_tot_trib_mun: f64,
}

#[derive(Serialize)]
struct Obra {
    #[serde(rename = "cObra", skip_serializing_if = "Option::is_none")]
    c_obra: Option<String>,
    #[serde(rename = "art", skip_serializing_if = "Option::is_none")]
    art: Option<String>,
}

#[derive(Serialize)]
struct Evento {
    #[serde(rename = "xNome")]
    x_nome: String,
    #[serde(rename = "dtIni")]
    dt_ini: String,
    #[serde(rename = "dtFim")]
    dt_fim: String,
}

fn split_tax_id(tax_id: &super::TaxId) -> (Option<String>, Option<String>) {
    match tax_id {
        super::TaxId::Cnpj(_) => (Some(tax_id.digits()), None),
        super::TaxId::Cpf(_) => (None, Some(tax_id.digits())),
    }
}

impl DpsEnvelope {
    fn from_declaration(d: &Declaration) -> Result<Self, super::BuildError> {
        let (prest_cnpj, prest_cpf) = split_tax_id(&d.issuer.tax_id);
        let (toma_cnpj, toma_cpf) = split_tax_id(&d.recipient.tax_id);

        Ok(DpsEnvelope {
            xmlns: DPS_NAMESPACE,
            versao: LAYOUT_VERSION,
            inf_dps: InfDps {
                id: super::document_id(d)?,
                tp_amb: d.environment.flag(),
                dh_emi: d.issued_at.to_rfc3339(),
                ver_aplic: d.application_version.clone(),
                serie: id::digits(&d.series),
                n_dps: id::digits(&d.number),
                d_compet: d.competence.format("%Y-%m-%d").to_string(),
                tp_emit: d.emitter_type,
                c_loc_emi: id::digits(&d.municipality),
                prest: Prest {
                    cnpj: prest_cnpj,
                    cpf: prest_cpf,
                    im: d.issuer.municipal_registration.as_deref().map(id::digits),
                    reg_trib: RegTrib {
                        op_simp_nac: d.issuer.simple_national_option,
                        reg_ap_trib_sn: d.issuer.sn_assessment_regime,
                        reg_esp_trib: d.issuer.special_tax_regime,
                    },
                },
                toma: Toma {
                    cnpj: toma_cnpj,
                    cpf: toma_cpf,
                    im: d.recipient.municipal_registration.as_deref().map(id::digits),
                    x_nome: d.recipient.name.clone(),
                    end: d.recipient.address.as_ref().map(|address| End {
                        end_nac: EndNac {
                            c_mun: id::digits(&address.municipality),
                            cep: id::digits(&address.postal_code),
                        },
                        x_lgr: address.street.clone(),
                        nro: address.number.clone(),
                        x_cpl: address.complement.clone(),
                        x_bairro: address.district.clone(),
                    }),
                },
                serv: Serv {
                    loc_prest: LocPrest {
                        c_loc_prestacao: id::digits(&d.service.provision_municipality),
                    },
                    c_serv: CServ {
                        c_trib_nac: id::digits(&d.service.national_code),
                        c_trib_mun: d.service.municipal_code.as_deref().map(id::digits),
                        x_desc_serv: d.service.description.clone(),
                        c_nbs: d.service.nbs_code.as_deref().map(id::digits),
                        c_int_contrib: d.service.internal_code.clone(),
                    },
                },
                valores: Valores {
                    v_serv_prest: VServPrest {
                        v_serv: d.amounts.service_value,
                    },
                    v_desc_cond_incond: (d.amounts.unconditional_discount.is_some()
                        || d.amounts.conditional_discount.is_some())
                    .then(|| Discounts {
                        v_desc_incond: d.amounts.unconditional_discount,
                        v_desc_cond: d.amounts.conditional_discount,
                    }),
                    v_ded_red: d.amounts.deduction_reduction.as_ref().map(|dr| VDedRed {
                        p_dr: dr.percentage,
                        v_dr: dr.value,
                    }),
                    trib: Trib {
                        trib_mun: TribMun {
                            trib_issqn: d.amounts.issqn_taxation,
                            tp_ret_issqn: d.amounts.issqn_withholding,
                            p_aliq: d.amounts.issqn_rate,
                        },
                        trib_fed: d.amounts.federal_withholdings.as_ref().map(|fed| TribFed {
                            v_ret_pis: fed.pis,
                            v_ret_cofins: fed.cofins,
                            v_ret_inss: fed.inss,
                            v_ret_irrf: fed.irrf,
                            v_ret_csll: fed.csll,
                        }),
                        tot_trib: (d.amounts.sn_total_tax_rate.is_some()
                            || d.amounts.total_tax_detail.is_some())
                        .then(|| TotTrib {
                            p_tot_trib_sn: d.amounts.sn_total_tax_rate,
                            v_tot_trib: d.amounts.total_tax_detail.as_ref().map(|t| VTotTrib {
                                v_tot_trib_fed: t.federal,
                                v_tot_trib_est: t.state,
                                v_tot_trib_mun: t.municipal,
                            }),
                        }),
                    },
                },
                obra: d.construction.as_ref().map(|c| Obra {
                    c_obra: c.work_code.clone(),
                    art: c.art.clone(),
                }),
                evento: d.event.as_ref().map(|e| Evento {
                    x_nome: e.name.clone(),
                    dt_ini: e.starts_on.format("%Y-%m-%d").to_string(),
                    dt_fim: e.ends_on.format("%Y-%m-%d").to_string(),
                }),
            },
        })
    }
}

pub(super) fn build(declaration: &Declaration) -> Result<String, super::BuildError> {
    let envelope = DpsEnvelope::from_declaration(declaration)?;
    let xml = quick_xml::se::to_string(&envelope)?;
    Ok(format!("{XML_DECLARATION}{xml}"))
}
