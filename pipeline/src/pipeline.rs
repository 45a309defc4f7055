//! The extraction run: roster, then per-legislator detail, then expenses.
//!
//! Phases run strictly in sequence and each finishes (including pagination)
//! before the next starts. Legislators are visited in roster order.
//!
//! Failure policy per phase:
//! - roster: any error aborts the run;
//! - detail: a fetch error skips that legislator, a payload without the
//!   `dados` envelope aborts the run;
//! - expenses: any per-legislator error skips that legislator.
//!
//! Skipped legislators are recorded in the [`RunReport`].

use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::camara::{
    CamaraApiClient, ExpenseQuery, LegislatorOffice, LegislatorSummary, Record, LEGISLATOR_FK,
};
use crate::config::Config;
use crate::flatten::{ExtractionSchema, FlattenError};
use crate::pagination::{PaginationError, Paginator};
use crate::sink::{tables, Sink, SinkError};
use crate::table::Table;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("roster extraction failed: {0}")]
    Roster(#[source] PaginationError),

    #[error("roster entry is not a legislator: {0}")]
    MalformedRoster(#[source] serde_json::Error),

    #[error(transparent)]
    MalformedRecord(#[from] FlattenError),

    #[error("failed to encode rows for '{table}': {source}")]
    Encode {
        table: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Sink(#[from] SinkError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Detail,
    Expenses,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Detail => f.write_str("detail"),
            Self::Expenses => f.write_str("expenses"),
        }
    }
}

/// A legislator skipped by a tolerant phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    pub phase: Phase,
    pub id: i64,
    pub error: String,
}

/// What to extract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionSettings {
    pub legislature: u32,
    pub year: i32,
    pub max_pages: u32,
}

impl From<&Config> for ExtractionSettings {
    fn from(config: &Config) -> Self {
        Self {
            legislature: config.extraction.legislature,
            year: config.extraction.year,
            max_pages: config.api.max_pages,
        }
    }
}

/// Roster phase output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Roster {
    /// Raw roster rows, as listed by the API.
    pub records: Vec<Record>,
    /// Unique legislator ids in first-seen order.
    pub ids: Vec<i64>,
}

/// Detail phase output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LegislatorTables {
    pub details: Vec<Record>,
    pub statuses: Vec<Record>,
    pub offices: Vec<LegislatorOffice>,
}

/// Rows written per destination table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub roster: u64,
    pub detail: u64,
    pub status: u64,
    pub office: u64,
    pub expenses: u64,
}

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub written: TableCounts,
    pub failures: Vec<ItemFailure>,
}

impl RunReport {
    fn start() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            written: TableCounts::default(),
            failures: Vec::new(),
        }
    }

    /// Failures recorded for one phase.
    pub fn failures_in(&self, phase: Phase) -> impl Iterator<Item = &ItemFailure> {
        self.failures.iter().filter(move |f| f.phase == phase)
    }
}

/// Runs the three extraction phases against a client.
pub struct Extractor<'a, C: ?Sized> {
    client: &'a C,
    settings: ExtractionSettings,
    paginator: Paginator,
    schema: ExtractionSchema,
}

impl<'a, C> Extractor<'a, C>
where
    C: CamaraApiClient + ?Sized,
{
    pub fn new(client: &'a C, settings: ExtractionSettings) -> Self {
        Self {
            client,
            settings,
            paginator: Paginator::new(settings.max_pages),
            schema: ExtractionSchema::legislator(),
        }
    }

    /// Fetch every roster page for the configured legislature.
    ///
    /// # Errors
    ///
    /// Any fetch or page error, or a roster entry without a numeric `id`.
    pub async fn roster(&self) -> Result<Roster, PipelineError> {
        info!(legislature = self.settings.legislature, "extracting legislator roster");

        let first = self
            .client
            .list_legislators(self.settings.legislature)
            .await
            .map_err(|e| PipelineError::Roster(e.into()))?;
        let records = self
            .paginator
            .collect(self.client, first)
            .await
            .map_err(PipelineError::Roster)?;

        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for record in &records {
            let legislator: LegislatorSummary =
                serde_json::from_value(Value::Object(record.clone()))
                    .map_err(PipelineError::MalformedRoster)?;
            if seen.insert(legislator.id) {
                ids.push(legislator.id);
            }
        }

        info!(rows = records.len(), legislators = ids.len(), "roster extracted");
        Ok(Roster { records, ids })
    }

    /// Fetch and flatten the detail payload of each legislator.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::MalformedRecord`] for a payload without the
    /// `dados` envelope. Fetch errors are pushed to `failures` instead.
    pub async fn details(
        &self,
        ids: &[i64],
        failures: &mut Vec<ItemFailure>,
    ) -> Result<LegislatorTables, PipelineError> {
        let mut tables = LegislatorTables::default();

        for &id in ids {
            info!(id, "fetching legislator detail");
            let response = match self.client.get_legislator(id).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(id, error = %e, "legislator detail fetch failed; skipping");
                    failures.push(ItemFailure {
                        phase: Phase::Detail,
                        id,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            let flat = self
                .schema
                .flatten(id, response)
                .inspect_err(|e| error!(id, error = %e, "legislator detail is malformed; aborting"))?;
            tables.details.push(flat.detail);
            tables.statuses.push(flat.status);
            tables.offices.push(flat.office);
        }

        info!(
            legislators = tables.details.len(),
            skipped = ids.len() - tables.details.len(),
            "legislator details extracted"
        );
        Ok(tables)
    }

    /// Fetch every expense page of each legislator, tagging rows with `id_deputado`.
    ///
    /// Per-legislator failures are pushed to `failures`.
    pub async fn expenses(&self, ids: &[i64], failures: &mut Vec<ItemFailure>) -> Vec<Record> {
        let query = ExpenseQuery {
            year: self.settings.year,
            legislature: self.settings.legislature,
        };
        let mut expenses = Vec::new();

        for &id in ids {
            info!(id, year = query.year, "fetching legislator expenses");
            match self.legislator_expenses(id, query).await {
                Ok(records) if records.is_empty() => {
                    info!(id, "no expenses for legislator");
                }
                Ok(records) => {
                    info!(id, documents = records.len(), "expenses extracted");
                    expenses.extend(records);
                }
                Err(e) => {
                    error!(id, error = %e, "expense extraction failed; skipping");
                    failures.push(ItemFailure {
                        phase: Phase::Expenses,
                        id,
                        error: e.to_string(),
                    });
                }
            }
        }

        expenses
    }

    async fn legislator_expenses(
        &self,
        id: i64,
        query: ExpenseQuery,
    ) -> Result<Vec<Record>, PaginationError> {
        let first = self.client.list_expenses(id, query).await?;
        let mut records = self.paginator.collect(self.client, first).await?;
        for record in &mut records {
            record.insert(LEGISLATOR_FK.to_string(), Value::from(id));
        }
        Ok(records)
    }
}

/// Run the full extraction and write every destination table.
///
/// Tables are written as soon as their phase completes, so a failure in a later
/// phase leaves earlier tables from this run next to later tables from a
/// previous one.
///
/// # Errors
///
/// Returns the first fatal error: roster failure, malformed detail payload, or
/// a table write failure.
pub async fn run<C>(
    client: &C,
    sink: &Sink,
    settings: ExtractionSettings,
) -> Result<RunReport, PipelineError>
where
    C: CamaraApiClient + ?Sized,
{
    let report = RunReport::start();
    let span = tracing::info_span!("run", run_id = %report.run_id);
    run_phases(client, sink, settings, report)
        .instrument(span)
        .await
}

async fn run_phases<C>(
    client: &C,
    sink: &Sink,
    settings: ExtractionSettings,
    mut report: RunReport,
) -> Result<RunReport, PipelineError>
where
    C: CamaraApiClient + ?Sized,
{
    info!(
        legislature = settings.legislature,
        year = settings.year,
        backend = %sink.backend(),
        "extraction run started"
    );
    let extractor = Extractor::new(client, settings);

    let roster = extractor.roster().await?;
    report.written.roster = sink
        .replace_records(tables::ROSTER, &roster.records)
        .await?;

    let legislators = extractor.details(&roster.ids, &mut report.failures).await?;
    report.written.detail = sink
        .replace_records(tables::DETAIL, &legislators.details)
        .await?;
    report.written.status = sink
        .replace_records(tables::STATUS, &legislators.statuses)
        .await?;
    let offices = Table::from_rows(&legislators.offices).map_err(|source| PipelineError::Encode {
        table: tables::OFFICE,
        source,
    })?;
    report.written.office = sink.replace_table(tables::OFFICE, &offices).await?;

    let expenses = extractor.expenses(&roster.ids, &mut report.failures).await;
    report.written.expenses = sink.replace_records(tables::EXPENSES, &expenses).await?;

    report.finished_at = Some(Utc::now());
    info!(
        roster = report.written.roster,
        detail = report.written.detail,
        expenses = report.written.expenses,
        failures = report.failures.len(),
        "extraction run finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camara::mock::MockCamaraClient;
    use crate::camara::ApiError;
    use serde_json::json;

    const SETTINGS: ExtractionSettings = ExtractionSettings {
        legislature: 56,
        year: 2022,
        max_pages: 10,
    };

    fn detail(id: i64) -> Value {
        json!({
            "dados": {
                "id": id,
                "nomeCivil": format!("DEPUTADO {id}"),
                "redeSocial": [],
                "urlWebsite": null,
                "ultimoStatus": {
                    "nome": format!("Dep {id}"),
                    "siglaPartido": "PSD",
                    "gabinete": {"sala": format!("{id}"), "predio": "4"}
                }
            }
        })
    }

    #[tokio::test]
    async fn roster_deduplicates_ids_in_order() {
        let client = MockCamaraClient::new();
        client.on_list_legislators(
            56,
            Ok(json!({
                "dados": [{"id": 3, "nome": "C"}, {"id": 1, "nome": "A"}, {"id": 3, "nome": "C"}],
                "links": []
            })),
        );

        let roster = Extractor::new(&client, SETTINGS).roster().await.unwrap();
        assert_eq!(roster.ids, vec![3, 1]);
        assert_eq!(roster.records.len(), 3);
    }

    #[tokio::test]
    async fn roster_failures_are_fatal() {
        let client = MockCamaraClient::new();
        client.on_list_legislators(
            56,
            Err(ApiError::Status {
                status: 503,
                url: "roster".into(),
            }),
        );

        let err = Extractor::new(&client, SETTINGS).roster().await.unwrap_err();
        assert!(matches!(err, PipelineError::Roster(PaginationError::Api(_))));
    }

    #[tokio::test]
    async fn roster_entry_without_id_is_fatal() {
        let client = MockCamaraClient::new();
        client.on_list_legislators(56, Ok(json!({"dados": [{"nome": "sem id"}]})));

        let err = Extractor::new(&client, SETTINGS).roster().await.unwrap_err();
        assert!(matches!(err, PipelineError::MalformedRoster(_)));
    }

    #[tokio::test]
    async fn detail_fetch_failure_skips_only_that_legislator() {
        let client = MockCamaraClient::new();
        client.on_get_legislator(1, Ok(detail(1)));
        client.on_get_legislator(
            2,
            Err(ApiError::Status {
                status: 500,
                url: "detail".into(),
            }),
        );
        client.on_get_legislator(3, Ok(detail(3)));

        let mut failures = Vec::new();
        let tables = Extractor::new(&client, SETTINGS)
            .details(&[1, 2, 3], &mut failures)
            .await
            .unwrap();

        assert_eq!(tables.details.len(), 2);
        assert_eq!(tables.statuses.len(), 2);
        let office_ids: Vec<_> = tables.offices.iter().map(|o| o.id_deputado).collect();
        assert_eq!(office_ids, vec![1, 3]);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].phase, Phase::Detail);
        assert_eq!(failures[0].id, 2);
    }

    #[tokio::test]
    async fn detail_without_envelope_aborts_phase() {
        let client = MockCamaraClient::new();
        client.on_get_legislator(1, Ok(json!({"erro": "indisponível"})));
        client.on_get_legislator(2, Ok(detail(2)));

        let mut failures = Vec::new();
        let err = Extractor::new(&client, SETTINGS)
            .details(&[1, 2], &mut failures)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::MalformedRecord(FlattenError::MalformedRecord { id: 1, .. })
        ));
        assert_eq!(client.calls(), vec!["detail:1"]);
    }

    #[tokio::test]
    async fn expenses_are_tagged_and_paginated() {
        let client = MockCamaraClient::new();
        client.on_list_expenses(
            1,
            Ok(json!({
                "dados": [{"mes": 1, "valorDocumento": 10.5}],
                "links": [{"rel": "next", "href": "https://api/despesas?pagina=2"}]
            })),
        );
        client.on_follow(
            "https://api/despesas?pagina=2",
            Ok(json!({"dados": [{"mes": 2, "valorDocumento": 20.0}], "links": []})),
        );
        client.on_list_expenses(2, Ok(json!({"dados": [], "links": []})));

        let mut failures = Vec::new();
        let expenses = Extractor::new(&client, SETTINGS)
            .expenses(&[1, 2], &mut failures)
            .await;

        assert_eq!(expenses.len(), 2);
        assert!(expenses.iter().all(|e| e[LEGISLATOR_FK] == 1));
        assert!(failures.is_empty());
    }

    #[tokio::test]
    async fn expense_failures_are_recorded_and_skipped() {
        let client = MockCamaraClient::new();
        client.on_list_expenses(1, Ok(json!({"sem_dados": true})));
        client.on_list_expenses(2, Ok(json!({"dados": [{"mes": 3}]})));

        let mut failures = Vec::new();
        let expenses = Extractor::new(&client, SETTINGS)
            .expenses(&[1, 2, 3], &mut failures)
            .await;

        assert_eq!(expenses.len(), 1);
        assert_eq!(expenses[0][LEGISLATOR_FK], 2);
        let failed: Vec<_> = failures.iter().map(|f| (f.phase, f.id)).collect();
        assert_eq!(failed, vec![(Phase::Expenses, 1), (Phase::Expenses, 3)]);
    }
}
