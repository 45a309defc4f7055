//! Relational sink: backend selection, full-table replacement and reads.
//!
//! Both backends go through sqlx's `Any` driver so a single write path serves
//! PostgreSQL (primary) and SQLite (local fallback). The live pool is owned by
//! a [`Sink`] value that callers construct once and pass around.

use std::fmt;
use std::time::Duration;

use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, AnyPool, Column as _, Row};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::camara::{ExpenseRecord, LegislatorSummary, Record};
use crate::config::{ConfigError, DatabaseConfig};
use crate::env::{Environment, DB_HOST, DB_NAME, DB_PASS, DB_PORT, DB_USER};
use crate::table::{Cell, Table};

/// Destination table names and the columns each is created with when a run
/// yields no rows for it.
pub mod tables {
    use crate::table::{Column, ColumnKind};

    pub const ROSTER: &str = "deputados";
    pub const DETAIL: &str = "deputados_detalhado";
    pub const STATUS: &str = "deputados_ultimo_status";
    pub const OFFICE: &str = "deputados_ultimo_gabinete";
    pub const EXPENSES: &str = "deputados_despesas";

    const ROSTER_COLUMNS: &[(&str, ColumnKind)] = &[
        ("id", ColumnKind::Integer),
        ("uri", ColumnKind::Text),
        ("nome", ColumnKind::Text),
        ("siglaPartido", ColumnKind::Text),
        ("uriPartido", ColumnKind::Text),
        ("siglaUf", ColumnKind::Text),
        ("idLegislatura", ColumnKind::Integer),
        ("urlFoto", ColumnKind::Text),
        ("email", ColumnKind::Text),
    ];

    const DETAIL_COLUMNS: &[(&str, ColumnKind)] = &[
        ("id", ColumnKind::Integer),
        ("uri", ColumnKind::Text),
        ("nomeCivil", ColumnKind::Text),
        ("cpf", ColumnKind::Text),
        ("sexo", ColumnKind::Text),
        ("dataNascimento", ColumnKind::Text),
        ("ufNascimento", ColumnKind::Text),
    ];

    const STATUS_COLUMNS: &[(&str, ColumnKind)] = &[
        ("id", ColumnKind::Integer),
        ("nome", ColumnKind::Text),
        ("siglaPartido", ColumnKind::Text),
        ("siglaUf", ColumnKind::Text),
        ("idLegislatura", ColumnKind::Integer),
        ("situacao", ColumnKind::Text),
        ("id_deputado", ColumnKind::Integer),
    ];

    const OFFICE_COLUMNS: &[(&str, ColumnKind)] = &[
        ("nome", ColumnKind::Text),
        ("predio", ColumnKind::Text),
        ("sala", ColumnKind::Text),
        ("andar", ColumnKind::Text),
        ("telefone", ColumnKind::Text),
        ("email", ColumnKind::Text),
        ("id_deputado", ColumnKind::Integer),
    ];

    const EXPENSE_COLUMNS: &[(&str, ColumnKind)] = &[
        ("ano", ColumnKind::Integer),
        ("mes", ColumnKind::Integer),
        ("tipoDespesa", ColumnKind::Text),
        ("dataDocumento", ColumnKind::Text),
        ("valorDocumento", ColumnKind::Real),
        ("urlDocumento", ColumnKind::Text),
        ("nomeFornecedor", ColumnKind::Text),
        ("cnpjCpfFornecedor", ColumnKind::Text),
        ("id_deputado", ColumnKind::Integer),
    ];

    /// Columns `name` is created with when there are no rows to infer them from.
    ///
    /// Empty for tables this crate does not own.
    #[must_use]
    pub fn declared_columns(name: &str) -> Vec<Column> {
        let declared = match name {
            ROSTER => ROSTER_COLUMNS,
            DETAIL => DETAIL_COLUMNS,
            STATUS => STATUS_COLUMNS,
            OFFICE => OFFICE_COLUMNS,
            EXPENSES => EXPENSE_COLUMNS,
            _ => &[],
        };
        declared
            .iter()
            .map(|&(name, kind)| Column {
                name: name.to_string(),
                kind,
            })
            .collect()
    }
}

/// Bind parameters per INSERT statement; below SQLite's historical limit of 999.
const MAX_BIND_PARAMS: usize = 900;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Postgres,
    Sqlite,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Postgres => f.write_str("postgres"),
            Self::Sqlite => f.write_str("sqlite"),
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("invalid database configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to connect to {backend}: {source}")]
    Connection {
        backend: Backend,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to write table '{table}': {source}")]
    Write {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("failed to read table '{table}': {source}")]
    Read {
        table: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("rows of table '{table}' do not match the expected shape: {source}")]
    Decode {
        table: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Credentials for the primary (networked) backend.
#[derive(Clone, PartialEq, Eq)]
pub struct PrimaryCredentials {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl fmt::Debug for PrimaryCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimaryCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .finish()
    }
}

impl PrimaryCredentials {
    /// Read the five primary backend values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] or [`ConfigError::Empty`] for the first
    /// absent value, and [`ConfigError::Validation`] for a port that is not a
    /// non-zero `u16`.
    pub fn from_env(env: &Environment) -> Result<Self, ConfigError> {
        let host = env.require(DB_HOST)?;
        let port = env.require(DB_PORT)?;
        let user = env.require(DB_USER)?;
        let password = env.require(DB_PASS)?;
        let database = env.require(DB_NAME)?;

        let port = match port.trim().parse::<u16>() {
            Ok(port) if port != 0 => port,
            _ => {
                return Err(ConfigError::Validation(format!(
                    "{DB_PORT} must be a port number, got: '{port}'"
                )))
            }
        };

        Ok(Self {
            host: host.trim().to_string(),
            port,
            user,
            password,
            database: database.trim().to_string(),
        })
    }

    /// Assemble a `PostgreSQL` connection URL, percent-encoding user and password.
    #[must_use]
    pub fn connection_url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}",
            urlencoding::encode(&self.user),
            urlencoding::encode(&self.password),
            self.host,
            self.port,
            self.database
        )
    }
}

/// A connected relational store.
#[derive(Debug, Clone)]
pub struct Sink {
    backend: Backend,
    pool: AnyPool,
}

impl Sink {
    /// Pick and connect the backend for this run.
    ///
    /// The primary backend is used when all five `DB_*_ENV` values are present
    /// and non-blank; otherwise the SQLite file at `config.sqlite_path` is used.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Config`] for a malformed port and
    /// [`SinkError::Connection`] if the chosen backend is unreachable.
    pub async fn connect(env: &Environment, config: &DatabaseConfig) -> Result<Self, SinkError> {
        match PrimaryCredentials::from_env(env) {
            Ok(credentials) => {
                info!(
                    host = %credentials.host,
                    port = credentials.port,
                    database = %credentials.database,
                    "primary database configured"
                );
                Self::postgres(&credentials, config).await
            }
            Err(ConfigError::Missing { key }) => {
                warn!(%key, "primary database variable not set; falling back to SQLite");
                Self::sqlite(&config.sqlite_path, config).await
            }
            Err(ConfigError::Empty { key }) => {
                warn!(%key, "primary database variable is blank; falling back to SQLite");
                Self::sqlite(&config.sqlite_path, config).await
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Connect to the primary PostgreSQL backend.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Connection`] if the server is unreachable.
    pub async fn postgres(
        credentials: &PrimaryCredentials,
        config: &DatabaseConfig,
    ) -> Result<Self, SinkError> {
        Self::open(Backend::Postgres, &credentials.connection_url(), config).await
    }

    /// Open (creating if needed) a SQLite database file.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Connection`] if the file cannot be opened.
    pub async fn sqlite(path: &str, config: &DatabaseConfig) -> Result<Self, SinkError> {
        Self::open(Backend::Sqlite, &format!("sqlite://{path}?mode=rwc"), config).await
    }

    async fn open(backend: Backend, url: &str, config: &DatabaseConfig) -> Result<Self, SinkError> {
        sqlx::any::install_default_drivers();

        // SQLite connections cache the schema; one connection sees its own DDL.
        let max_connections = match backend {
            Backend::Postgres => config.max_connections,
            Backend::Sqlite => 1,
        };
        let pool = AnyPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(url)
            .await
            .map_err(|source| {
                error!(%backend, error = %source, "database connection failed");
                SinkError::Connection { backend, source }
            })?;

        info!(%backend, "database connection established");
        Ok(Self { backend, pool })
    }

    #[must_use]
    pub const fn backend(&self) -> Backend {
        self.backend
    }

    /// Replace `name` with the given records. See [`Sink::replace_table`].
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Write`] if any statement fails.
    pub async fn replace_records(&self, name: &str, records: &[Record]) -> Result<u64, SinkError> {
        self.replace_table(name, &Table::from_records(records)).await
    }

    /// Drop and recreate `name`, then insert every row of `table`.
    ///
    /// Runs in one transaction, so readers see either the previous contents
    /// or the new ones. A table without columns (no rows to infer them from)
    /// is recreated empty with [`tables::declared_columns`]; a name with no
    /// declared columns is only dropped. Returns the number of rows written.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Write`] if any statement fails; nothing is changed.
    pub async fn replace_table(&self, name: &str, table: &Table) -> Result<u64, SinkError> {
        let declared;
        let table = if table.columns.is_empty() {
            info!(table = name, "no rows to write; recreating table empty");
            declared = Table::empty(tables::declared_columns(name));
            &declared
        } else {
            table
        };

        let written = self.write(name, table).await.map_err(|source| {
            error!(table = name, error = %source, "failed to write table");
            SinkError::Write {
                table: name.to_string(),
                source,
            }
        })?;

        info!(table = name, rows = written, backend = %self.backend, "table replaced");
        Ok(written)
    }

    async fn write(&self, name: &str, table: &Table) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(&format!("DROP TABLE IF EXISTS {}", quote_ident(name)))
            .execute(&mut *tx)
            .await?;
        if table.columns.is_empty() {
            tx.commit().await?;
            return Ok(0);
        }
        sqlx::query(&create_table_sql(name, table))
            .execute(&mut *tx)
            .await?;

        let rows_per_batch = (MAX_BIND_PARAMS / table.columns.len()).max(1);
        let row_indices: Vec<usize> = (0..table.len()).collect();
        let mut written = 0;

        for batch in row_indices.chunks(rows_per_batch) {
            let sql = insert_sql(self.backend, name, table, batch.len());
            let mut query = sqlx::query(&sql);
            for &row in batch {
                for cell in table.cells(row) {
                    query = bind_cell(query, cell);
                }
            }
            written += query.execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(written)
    }

    /// Read the full contents of `name`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Read`] if the table does not exist or a value
    /// cannot be decoded.
    pub async fn read_table(&self, name: &str) -> Result<Table, SinkError> {
        let read_err = |source| SinkError::Read {
            table: name.to_string(),
            source,
        };

        let rows: Vec<AnyRow> = sqlx::query(&format!("SELECT * FROM {}", quote_ident(name)))
            .fetch_all(&self.pool)
            .await
            .map_err(read_err)?;

        let Some(first) = rows.first() else {
            return Ok(Table::default());
        };

        let names: Vec<String> = first
            .columns()
            .iter()
            .map(|column| column.name().to_string())
            .collect();

        let values = rows
            .iter()
            .map(|row| {
                (0..names.len())
                    .map(|index| decode_value(row, index))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()
            .map_err(read_err)?;

        let records: Vec<Record> = values
            .into_iter()
            .map(|row| names.iter().cloned().zip(row).collect())
            .collect();
        Ok(Table::from_records(&records))
    }

    /// Current contents of `deputados_despesas`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Read`] or [`SinkError::Decode`].
    pub async fn read_expenses(&self) -> Result<Vec<ExpenseRecord>, SinkError> {
        self.read_typed(tables::EXPENSES).await
    }

    /// Current contents of `deputados`.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Read`] or [`SinkError::Decode`].
    pub async fn read_roster(&self) -> Result<Vec<LegislatorSummary>, SinkError> {
        self.read_typed(tables::ROSTER).await
    }

    async fn read_typed<T: serde::de::DeserializeOwned>(
        &self,
        name: &str,
    ) -> Result<Vec<T>, SinkError> {
        self.read_table(name)
            .await?
            .to_typed()
            .map_err(|source| SinkError::Decode {
                table: name.to_string(),
                source,
            })
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn create_table_sql(name: &str, table: &Table) -> String {
    let columns = table
        .columns
        .iter()
        .map(|column| format!("{} {}", quote_ident(&column.name), column.kind.sql_type()))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({columns})", quote_ident(name))
}

fn insert_sql(backend: Backend, name: &str, table: &Table, rows: usize) -> String {
    let width = table.columns.len();
    let columns = table
        .columns
        .iter()
        .map(|column| quote_ident(&column.name))
        .collect::<Vec<_>>()
        .join(", ");

    let tuples = (0..rows)
        .map(|row| {
            let params = (0..width)
                .map(|col| match backend {
                    Backend::Postgres => format!("${}", row * width + col + 1),
                    Backend::Sqlite => "?".to_string(),
                })
                .collect::<Vec<_>>()
                .join(", ");
            format!("({params})")
        })
        .collect::<Vec<_>>()
        .join(", ");

    format!("INSERT INTO {} ({columns}) VALUES {tuples}", quote_ident(name))
}

fn bind_cell<'q>(
    query: Query<'q, Any, sqlx::any::AnyArguments<'q>>,
    cell: Cell,
) -> Query<'q, Any, sqlx::any::AnyArguments<'q>> {
    match cell {
        Cell::Integer(v) => query.bind(v),
        Cell::Real(v) => query.bind(v),
        Cell::Boolean(v) => query.bind(v),
        Cell::Text(v) => query.bind(v),
    }
}

fn decode_value(row: &AnyRow, index: usize) -> Result<serde_json::Value, sqlx::Error> {
    use serde_json::Value;

    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return Ok(v.map_or(Value::Null, Value::from));
    }
    if let Ok(v) = row.try_get::<Option<i32>, _>(index) {
        return Ok(v.map_or(Value::Null, Value::from));
    }
    if let Ok(v) = row.try_get::<Option<f64>, _>(index) {
        return Ok(v.map_or(Value::Null, Value::from));
    }
    if let Ok(v) = row.try_get::<Option<f32>, _>(index) {
        return Ok(v.map_or(Value::Null, |f| Value::from(f64::from(f))));
    }
    if let Ok(v) = row.try_get::<Option<bool>, _>(index) {
        return Ok(v.map_or(Value::Null, Value::from));
    }
    row.try_get::<Option<String>, _>(index)
        .map(|v| v.map_or(Value::Null, Value::from))
}
