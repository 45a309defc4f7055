//! Data types for Câmara open data API responses.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An untyped row: column name to JSON value, in API field order.
pub type Record = Map<String, Value>;

/// Name of the envelope field wrapping every payload.
pub const ENVELOPE_FIELD: &str = "dados";

/// Foreign key attached to every row derived from one legislator.
pub const LEGISLATOR_FK: &str = "id_deputado";

/// One entry of a response's `links` collection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Link {
    pub rel: String,
    #[serde(default)]
    pub href: String,
}

/// A legislator as listed by the roster endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LegislatorSummary {
    pub id: i64,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub nome: String,
    #[serde(default)]
    pub sigla_partido: Option<String>,
    #[serde(default)]
    pub uri_partido: Option<String>,
    #[serde(default)]
    pub sigla_uf: Option<String>,
    #[serde(default)]
    pub id_legislatura: Option<i64>,
    #[serde(default)]
    pub url_foto: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// Fields the API adds that are not modelled above.
    #[serde(flatten)]
    pub extra: Record,
}

/// Office snapshot nested in a legislator's current status.
///
/// Most legislators leave several of these blank.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LegislatorOffice {
    #[serde(default)]
    pub nome: Option<String>,
    #[serde(default)]
    pub predio: Option<String>,
    #[serde(default)]
    pub sala: Option<String>,
    #[serde(default)]
    pub andar: Option<String>,
    #[serde(default)]
    pub telefone: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    pub id_deputado: i64,
}

impl LegislatorOffice {
    /// An office row with every attribute absent.
    #[must_use]
    pub fn empty(id_deputado: i64) -> Self {
        Self {
            id_deputado,
            ..Self::default()
        }
    }
}

/// One reimbursement document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseRecord {
    #[serde(rename = "id_deputado")]
    pub id_deputado: i64,
    #[serde(default)]
    pub ano: Option<i32>,
    #[serde(default)]
    pub mes: Option<u32>,
    #[serde(default)]
    pub tipo_despesa: Option<String>,
    #[serde(default)]
    pub data_documento: Option<String>,
    /// Absent when the API publishes a document without a value.
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub valor_documento: Option<Decimal>,
    #[serde(default)]
    pub url_documento: Option<String>,
    #[serde(default)]
    pub nome_fornecedor: Option<String>,
    #[serde(default)]
    pub cnpj_cpf_fornecedor: Option<String>,
    /// Remaining document fields (`codDocumento`, `valorLiquido`, ...).
    #[serde(flatten)]
    pub extra: Record,
}
