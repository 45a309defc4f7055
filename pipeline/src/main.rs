#![deny(
    clippy::expect_used,
    clippy::panic,
    clippy::print_stdout,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used
)]

use std::time::Duration;

use camara_etl::{
    camara::HttpCamaraClient,
    config::Config,
    logging,
    pipeline::{self, ExtractionSettings, Phase},
    sink::Sink,
    summary::ExpenseSummary,
};
use clap::{Parser, Subcommand};

/// Extract Câmara dos Deputados legislator expenses into a relational store.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// YAML configuration file, layered under `ETL_` environment variables.
    #[arg(long, default_value = "config.yaml")]
    config: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the full extraction and replace every destination table.
    Run,
    /// Log aggregates over the stored expense table.
    Summary {
        /// Entries shown per ranking.
        #[arg(long, default_value_t = 10)]
        top: usize,

        /// Also rank suppliers within this expense type (e.g. "TELEFONIA").
        #[arg(long)]
        expense_type: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    // Load and validate configuration first (fail-fast)
    let (config, env) = Config::resolve(&cli.config).map_err(|e| anyhow::anyhow!("{e}"))?;

    let log_file = logging::init(&config.logging.level, &config.logging.dir)?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = %log_file.display(),
        "camara-etl starting up"
    );

    let sink = Sink::connect(&env, &config.database).await?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(&config, &sink).await,
        Command::Summary { top, expense_type } => {
            summary(&sink, top, expense_type.as_deref()).await
        }
    }
}

async fn run(config: &Config, sink: &Sink) -> Result<(), anyhow::Error> {
    let client = HttpCamaraClient::new(
        config.api.base_url.clone(),
        Duration::from_secs(config.api.timeout_secs),
    )?;

    let report = pipeline::run(&client, sink, ExtractionSettings::from(config))
        .await
        .inspect_err(|e| tracing::error!(error = %e, "extraction run aborted"))?;

    for failure in &report.failures {
        tracing::warn!(
            phase = %failure.phase,
            id = failure.id,
            error = %failure.error,
            "legislator skipped"
        );
    }
    tracing::info!(
        run_id = %report.run_id,
        roster = report.written.roster,
        detail = report.written.detail,
        status = report.written.status,
        office = report.written.office,
        expenses = report.written.expenses,
        skipped_detail = report.failures_in(Phase::Detail).count(),
        skipped_expenses = report.failures_in(Phase::Expenses).count(),
        "run complete"
    );
    Ok(())
}

async fn summary(
    sink: &Sink,
    top: usize,
    expense_type: Option<&str>,
) -> Result<(), anyhow::Error> {
    let expenses = sink.read_expenses().await?;
    let roster = sink.read_roster().await?;
    let summary = ExpenseSummary::from_records(&expenses, &roster);

    tracing::info!(
        total = %summary.total,
        documents = summary.documents,
        average = %summary.average_document(),
        suppliers = summary.suppliers,
        missing_values = summary.missing_values,
        legislators = summary.legislators,
        "expense summary"
    );
    for (month, amount) in &summary.by_month {
        tracing::info!(month, amount = %amount, "by month");
    }
    let rankings = [
        ("type", &summary.by_type),
        ("party", &summary.by_party),
        ("state", &summary.by_state),
        ("legislator", &summary.by_legislator),
    ];
    for (dimension, ranking) in rankings {
        for (rank, (label, amount)) in ranking.iter().take(top).enumerate() {
            tracing::info!(dimension, rank = rank + 1, %label, amount = %amount, "top spending");
        }
    }
    for (rank, (supplier, amount)) in summary.by_supplier.iter().take(top).enumerate() {
        tracing::info!(rank = rank + 1, %supplier, amount = %amount, "top supplier");
    }
    if let Some(expense_type) = expense_type {
        let ranking = summary.suppliers_for_type(expense_type);
        if ranking.is_empty() {
            tracing::warn!(expense_type, "no documents for expense type");
        }
        for (rank, (supplier, amount)) in ranking.iter().take(top).enumerate() {
            tracing::info!(
                expense_type,
                rank = rank + 1,
                %supplier,
                amount = %amount,
                "top supplier for expense type"
            );
        }
    }
    Ok(())
}
