//! Store adapters for the main and vector databases
//!
//! A store is either a SQLite file reached through `rusqlite` or a
//! PostgreSQL database reached through `sqlx`. Each session opens a
//! transaction as soon as it is established; nothing becomes durable until
//! [`MainStore::commit`] / [`VectorStore::commit`], and closing an
//! uncommitted session rolls its work back.
//!
//! Array bind parameters are one JSON array expanded with `json_each` on
//! SQLite, and one `TEXT[]` compared with `= ANY($1)` on PostgreSQL.
//!
//! When both URLs name the same database the vector store borrows the main
//! store's session, so a single transaction covers every table.

pub(crate) mod main_store;
pub(crate) mod vector_store;

pub use main_store::MainStore;
pub use vector_store::VectorStore;

use crate::error::{Result, SweepError};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, OpenFlags};
use sqlx::postgres::{PgArguments, PgConnection, PgRow};
use sqlx::query::Query;
use sqlx::{Connection as _, Postgres, Row};
use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Which of the two databases an operation touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreKind {
    Main,
    Vector,
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Main => "main",
            Self::Vector => "vector",
        })
    }
}

/// A JSON document column read from one row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDocument {
    pub id: String,
    /// `None` when the column is NULL
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Location {
    Memory,
    File(PathBuf),
    Postgres(String),
}

impl Location {
    /// Whether two locations name one database. Every `:memory:` connection
    /// is a database of its own.
    pub(crate) fn same_database(&self, other: &Location) -> bool {
        match (self, other) {
            (Self::File(a), Self::File(b)) => {
                let a = std::fs::canonicalize(a).unwrap_or_else(|_| a.clone());
                let b = std::fs::canonicalize(b).unwrap_or_else(|_| b.clone());
                a == b
            }
            (Self::Postgres(a), Self::Postgres(b)) => a == b,
            _ => false,
        }
    }
}

/// Parse `postgres://…`, `postgresql://…`, `sqlite://path`, `sqlite:path`,
/// a bare path, or `:memory:`
pub(crate) fn parse_url(url: &str) -> Result<Location> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(SweepError::Config("database URL is empty".to_string()));
    }

    if trimmed.starts_with("postgres://") || trimmed.starts_with("postgresql://") {
        return Ok(Location::Postgres(trimmed.to_string()));
    }

    let path = if let Some(rest) = trimmed.strip_prefix("sqlite://") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("sqlite:") {
        rest
    } else if let Some((scheme, _)) = trimmed.split_once("://") {
        return Err(SweepError::Config(format!(
            "unsupported database scheme '{}', expected sqlite or postgres",
            scheme
        )));
    } else {
        trimmed
    };

    match path {
        "" => Err(SweepError::Config(format!("database URL '{}' has no path", url))),
        ":memory:" => Ok(Location::Memory),
        _ => Ok(Location::File(PathBuf::from(path))),
    }
}

/// `url` with any password replaced, for error messages
pub(crate) fn redacted(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    let (authority, tail) = rest.split_at(authority_end);
    match authority.rsplit_once('@') {
        Some((userinfo, host)) => match userinfo.split_once(':') {
            Some((user, _)) => format!("{}://{}:***@{}{}", scheme, user, host, tail),
            None => url.to_string(),
        },
        None => url.to_string(),
    }
}

/// One SQL statement in both dialects
#[derive(Debug, Clone, Copy)]
pub(crate) struct Statement {
    pub sqlite: &'static str,
    pub postgres: &'static str,
}

/// The single bind parameter a statement takes, if any
#[derive(Debug, Clone, Copy)]
pub(crate) enum Bind<'a> {
    Nothing,
    Int(i64),
    Texts(&'a BTreeSet<String>),
}

impl Bind<'_> {
    fn sqlite_values(&self) -> Result<Vec<SqlValue>> {
        Ok(match self {
            Self::Nothing => Vec::new(),
            Self::Int(value) => vec![SqlValue::Integer(*value)],
            Self::Texts(items) => vec![SqlValue::Text(json_array(items)?)],
        })
    }

    fn postgres_query<'q>(&self, sql: &'q str) -> Query<'q, Postgres, PgArguments> {
        let query = sqlx::query(sql);
        match self {
            Self::Nothing => query,
            Self::Int(value) => query.bind(*value),
            Self::Texts(items) => query.bind(items.iter().cloned().collect::<Vec<String>>()),
        }
    }
}

/// A PostgreSQL connection driven from synchronous code
pub(crate) struct PgSession {
    // Declared before the runtime so it is dropped first.
    conn: RefCell<PgConnection>,
    runtime: Runtime,
}

impl PgSession {
    fn connect(url: &str) -> std::result::Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let conn = runtime.block_on(PgConnection::connect(url))?;
        Ok(Self {
            conn: RefCell::new(conn),
            runtime,
        })
    }

    fn fetch(&self, sql: &str, bind: Bind<'_>) -> Result<Vec<PgRow>> {
        let mut conn = self.conn.borrow_mut();
        let rows = self
            .runtime
            .block_on(bind.postgres_query(sql).fetch_all(&mut *conn))?;
        Ok(rows)
    }

    fn execute(&self, sql: &str, bind: Bind<'_>) -> Result<usize> {
        let mut conn = self.conn.borrow_mut();
        let done = self
            .runtime
            .block_on(bind.postgres_query(sql).execute(&mut *conn))?;
        Ok(done.rows_affected() as usize)
    }

    fn close(self) -> Result<()> {
        let Self { conn, runtime } = self;
        runtime.block_on(conn.into_inner().close())?;
        Ok(())
    }
}

/// An open connection with its run transaction
pub(crate) enum Session {
    Sqlite(Connection),
    Postgres(PgSession),
}

impl Session {
    /// Connect to an existing database and open its transaction
    pub(crate) fn connect(store: StoreKind, location: &Location, url: &str) -> Result<Self> {
        let failed = |source: Box<dyn std::error::Error + Send + Sync>| SweepError::Connection {
            store,
            url: redacted(url),
            source,
        };

        let session = match location {
            Location::Memory => {
                Self::Sqlite(Connection::open_in_memory().map_err(|err| failed(err.into()))?)
            }
            Location::File(path) => Self::Sqlite(
                Connection::open_with_flags(
                    path,
                    OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )
                .map_err(|err| failed(err.into()))?,
            ),
            Location::Postgres(pg_url) => Self::Postgres(PgSession::connect(pg_url).map_err(failed)?),
        };
        session.begin()?;
        Ok(session)
    }

    /// Wrap an already-open SQLite connection and open its transaction
    pub(crate) fn sqlite(conn: Connection) -> Result<Self> {
        let session = Self::Sqlite(conn);
        session.begin()?;
        Ok(session)
    }

    fn begin(&self) -> Result<()> {
        match self {
            Self::Sqlite(conn) => {
                conn.busy_timeout(BUSY_TIMEOUT)?;
                conn.execute_batch("BEGIN")?;
            }
            Self::Postgres(pg) => {
                pg.execute("BEGIN", Bind::Nothing)?;
            }
        }
        Ok(())
    }

    pub(crate) fn commit(&self) -> Result<()> {
        match self {
            Self::Sqlite(conn) => conn.execute_batch("COMMIT")?,
            Self::Postgres(pg) => {
                pg.execute("COMMIT", Bind::Nothing)?;
            }
        }
        Ok(())
    }

    pub(crate) fn close(self) -> Result<()> {
        match self {
            Self::Sqlite(conn) => conn.close().map_err(|(_, err)| SweepError::from(err)),
            Self::Postgres(pg) => pg.close(),
        }
    }

    /// First column of every row, as text; NULLs are dropped
    pub(crate) fn texts(&self, statement: Statement, bind: Bind<'_>) -> Result<Vec<String>> {
        match self {
            Self::Sqlite(conn) => {
                let mut stmt = conn.prepare(statement.sqlite)?;
                let values = stmt
                    .query_map(params_from_iter(bind.sqlite_values()?), |row| {
                        row.get::<_, SqlValue>(0)
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(values.into_iter().filter_map(value_text).collect())
            }
            Self::Postgres(pg) => {
                let mut values = Vec::new();
                for row in pg.fetch(statement.postgres, bind)? {
                    if let Some(value) = row.try_get::<Option<String>, _>(0)? {
                        values.push(value);
                    }
                }
                Ok(values)
            }
        }
    }

    /// `(id, document)` pairs from a two-column query
    pub(crate) fn documents(&self, statement: Statement) -> Result<Vec<RawDocument>> {
        match self {
            Self::Sqlite(conn) => {
                let mut stmt = conn.prepare(statement.sqlite)?;
                let docs = stmt
                    .query_map([], |row| {
                        Ok(RawDocument {
                            id: value_text(row.get(0)?).unwrap_or_default(),
                            body: value_text(row.get(1)?),
                        })
                    })?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                Ok(docs)
            }
            Self::Postgres(pg) => pg
                .fetch(statement.postgres, Bind::Nothing)?
                .iter()
                .map(|row| -> Result<RawDocument> {
                    Ok(RawDocument {
                        id: row.try_get::<Option<String>, _>(0)?.unwrap_or_default(),
                        body: row.try_get(1)?,
                    })
                })
                .collect(),
        }
    }

    /// Run a data-modifying statement and return the affected row count
    pub(crate) fn execute(&self, statement: Statement, bind: Bind<'_>) -> Result<usize> {
        match self {
            Self::Sqlite(conn) => {
                let rows = conn.execute(statement.sqlite, params_from_iter(bind.sqlite_values()?))?;
                Ok(rows)
            }
            Self::Postgres(pg) => pg.execute(statement.postgres, bind),
        }
    }

    /// The SQLite connection behind a test fixture
    #[cfg(test)]
    pub(crate) fn sqlite_connection(&self) -> &Connection {
        match self {
            Self::Sqlite(conn) => conn,
            Self::Postgres(_) => panic!("fixture session is not SQLite"),
        }
    }
}

/// Render an id-like column value as text
pub(crate) fn value_text(value: SqlValue) -> Option<String> {
    match value {
        SqlValue::Text(s) => Some(s),
        SqlValue::Integer(i) => Some(i.to_string()),
        SqlValue::Real(f) => Some(f.to_string()),
        SqlValue::Blob(bytes) => String::from_utf8(bytes).ok(),
        SqlValue::Null => None,
    }
}

/// Encode a set as the JSON array bound to `json_each(?1)`
pub(crate) fn json_array(items: &BTreeSet<String>) -> Result<String> {
    Ok(serde_json::to_string(items)?)
}
