//! Common test utilities for integration tests.
//!
//! - [`http_mock::MockHttpServer`] - stub the open data API over HTTP
//! - [`fixtures`] - response bodies shaped like the real API
//! - [`temp_sink`] - a SQLite sink in a throwaway directory

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

pub mod http_mock;

use camara_etl::config::DatabaseConfig;
use camara_etl::sink::Sink;
use tempfile::TempDir;

/// A SQLite sink whose file lives as long as the returned directory.
pub async fn temp_sink() -> (Sink, TempDir) {
    let dir = tempfile::tempdir().expect("temp dir");
    let path = dir.path().join("database.db");
    let sink = Sink::sqlite(path.to_str().expect("utf-8 path"), &DatabaseConfig::default())
        .await
        .expect("sqlite sink");
    (sink, dir)
}

pub mod fixtures {
    use serde_json::{json, Value};

    /// One page of `dados` with an optional `next` link.
    pub fn page(dados: Value, next: Option<&str>) -> Value {
        let mut links = vec![json!({"rel": "self", "href": "ignored"})];
        if let Some(href) = next {
            links.push(json!({"rel": "next", "href": href}));
        }
        json!({"dados": dados, "links": links})
    }

    pub fn roster_entry(id: i64, nome: &str, partido: &str, uf: &str) -> Value {
        json!({
            "id": id,
            "uri": format!("https://dadosabertos.camara.leg.br/api/v2/deputados/{id}"),
            "nome": nome,
            "siglaPartido": partido,
            "uriPartido": format!("https://dadosabertos.camara.leg.br/api/v2/partidos/{partido}"),
            "siglaUf": uf,
            "idLegislatura": 56,
            "urlFoto": format!("https://www.camara.leg.br/internet/deputado/bandep/{id}.jpg"),
            "email": null
        })
    }

    pub fn detail(id: i64, nome: &str) -> Value {
        json!({
            "dados": {
                "id": id,
                "uri": format!("https://dadosabertos.camara.leg.br/api/v2/deputados/{id}"),
                "nomeCivil": nome.to_uppercase(),
                "cpf": "00000000000",
                "sexo": "F",
                "urlWebsite": null,
                "redeSocial": ["https://twitter.com/example"],
                "dataNascimento": "1970-01-01",
                "ufNascimento": "SP",
                "ultimoStatus": {
                    "id": id,
                    "nome": nome,
                    "siglaPartido": "PSD",
                    "siglaUf": "SP",
                    "idLegislatura": 56,
                    "situacao": "Exercício",
                    "gabinete": {
                        "nome": "401",
                        "predio": "4",
                        "sala": "401",
                        "andar": "4",
                        "telefone": "3215-5401",
                        "email": format!("dep{id}@camara.leg.br")
                    }
                }
            },
            "links": [{"rel": "self", "href": "ignored"}]
        })
    }

    pub fn expense(mes: u32, tipo: &str, fornecedor: &str, valor: f64) -> Value {
        json!({
            "ano": 2022,
            "mes": mes,
            "tipoDespesa": tipo,
            "codDocumento": 7_000_000 + i64::from(mes),
            "tipoDocumento": "Nota Fiscal",
            "dataDocumento": format!("2022-{mes:02}-15"),
            "numDocumento": "123",
            "valorDocumento": valor,
            "urlDocumento": null,
            "nomeFornecedor": fornecedor,
            "cnpjCpfFornecedor": format!("{:014}", fornecedor.len()),
            "valorLiquido": valor,
            "valorGlosa": 0.0
        })
    }
}
