//! `SQLite` table backend.
//!
//! Executes [`BuiltStatement`] bodies with named parameters. `SQLite` accepts
//! `$name` placeholders natively, so the body is sent unchanged and every
//! binding is passed under its placeholder token.

use super::connection::{acquire_lock, configure_connection};
use super::metrics::{record_operation_metrics, status_label};
use crate::models::{ColumnType, Filter, Row, Value, format_timestamp};
use crate::storage::dialect::SqlDialect;
use crate::storage::query::{BuiltStatement, QueryBuilder};
use crate::storage::schema::{SchemaRegistry, TableSchema};
use crate::storage::traits::TableBackend;
use crate::{Error, Result};
use rusqlite::types::ToSqlOutput;
use rusqlite::{Connection, ToSql};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::instrument;

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Integer(i) => ToSqlOutput::from(*i),
            Self::Text(s) => ToSqlOutput::from(s.as_str()),
            Self::Timestamp(t) => ToSqlOutput::from(format_timestamp(t)),
        })
    }
}

/// Maps a driver error to [`Error::StorageUnavailable`].
fn unavailable(operation: &'static str, table: &str, e: impl std::fmt::Display) -> Error {
    Error::StorageUnavailable {
        operation,
        table: table.to_string(),
        cause: e.to_string(),
    }
}

/// `SQLite`-based table backend.
pub struct SqliteBackend {
    /// Connection to the `SQLite` database.
    conn: Mutex<Connection>,
    /// Path to the database file (`None` for in-memory).
    db_path: Option<PathBuf>,
    /// Schemas used to build and decode statements.
    registry: Arc<SchemaRegistry>,
}

impl SqliteBackend {
    /// Opens (or creates) a database file with the built-in schemas.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the database cannot be
    /// opened or the tables cannot be created.
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_registry(db_path, Arc::new(SchemaRegistry::builtin()))
    }

    /// Opens (or creates) a database file with a custom schema registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the database cannot be
    /// opened or the tables cannot be created.
    pub fn with_registry(
        db_path: impl Into<PathBuf>,
        registry: Arc<SchemaRegistry>,
    ) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| unavailable("open", &db_path.display().to_string(), e))?;
        }
        let conn = Connection::open(&db_path)
            .map_err(|e| unavailable("open", &db_path.display().to_string(), e))?;
        Self::initialize(conn, Some(db_path), registry)
    }

    /// Creates an in-memory database with the built-in schemas.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the database cannot be created.
    pub fn in_memory() -> Result<Self> {
        Self::in_memory_with_registry(Arc::new(SchemaRegistry::builtin()))
    }

    /// Creates an in-memory database with a custom schema registry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the database cannot be created.
    pub fn in_memory_with_registry(registry: Arc<SchemaRegistry>) -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| unavailable("open", ":memory:", e))?;
        Self::initialize(conn, None, registry)
    }

    /// Configures the connection and creates every registered table.
    fn initialize(
        conn: Connection,
        db_path: Option<PathBuf>,
        registry: Arc<SchemaRegistry>,
    ) -> Result<Self> {
        configure_connection(&conn)?;

        let backend = Self {
            conn: Mutex::new(conn),
            db_path,
            registry,
        };
        for schema in backend.registry.tables() {
            backend.ensure_table(schema)?;
        }
        Ok(backend)
    }

    /// Returns the database path, if file-backed.
    #[must_use]
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn builder(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(&self.registry)
    }

    /// Runs a write statement and returns the number of affected rows.
    fn run(&self, stmt: &BuiltStatement) -> Result<usize> {
        let params: Vec<(&str, &dyn ToSql)> = stmt
            .params()
            .map(|(name, value)| (name, value as &dyn ToSql))
            .collect();

        let conn = acquire_lock(&self.conn);
        conn.execute(stmt.body(), params.as_slice())
            .map_err(|e| unavailable(stmt.kind().as_str(), stmt.table(), e))
    }

    /// Runs a select and decodes every row against its schema.
    fn query(&self, stmt: &BuiltStatement) -> Result<Vec<Row>> {
        let schema = self.registry.table(stmt.table())?;
        let params: Vec<(&str, &dyn ToSql)> = stmt
            .params()
            .map(|(name, value)| (name, value as &dyn ToSql))
            .collect();
        let op = stmt.kind().as_str();

        let conn = acquire_lock(&self.conn);
        let mut prepared = conn
            .prepare(stmt.body())
            .map_err(|e| unavailable(op, stmt.table(), e))?;
        let rows = prepared
            .query_map(params.as_slice(), |row| decode_row(schema, row))
            .map_err(|e| unavailable(op, stmt.table(), e))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| unavailable(op, stmt.table(), e))
    }
}

/// Reads the declared columns of `schema` from a result row, skipping NULLs.
fn decode_row(schema: &TableSchema, row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    let mut out = Row::new();
    for (column, column_type) in schema.columns() {
        let value = match column_type {
            ColumnType::Integer => row
                .get::<_, Option<i64>>(column.as_str())?
                .map(Value::Integer),
            ColumnType::Text => row
                .get::<_, Option<String>>(column.as_str())?
                .map(Value::Text),
        };
        if let Some(value) = value {
            out.set(column.as_str(), value);
        }
    }
    Ok(out)
}

/// Returns true for `CREATE TABLE` collisions with an existing table.
fn is_already_exists(e: &rusqlite::Error) -> bool {
    e.to_string().contains("already exists")
}

impl TableBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    #[instrument(skip(self, statement), fields(operation = "execute", backend = "sqlite"))]
    fn execute(&self, statement: &str) -> Result<()> {
        let start = Instant::now();

        let result = {
            let conn = acquire_lock(&self.conn);
            match conn.execute_batch(statement) {
                Ok(()) => Ok(()),
                Err(e) if is_already_exists(&e) => {
                    tracing::debug!("Object already exists, skipping");
                    Ok(())
                },
                Err(e) => Err(unavailable("execute", "-", e)),
            }
        };

        record_operation_metrics("sqlite", "execute", start, status_label(&result));
        result
    }

    fn ensure_table(&self, schema: &TableSchema) -> Result<()> {
        self.execute(&SqlDialect::Sqlite.create_table(schema))
            .map_err(|e| match e {
                Error::StorageUnavailable { cause, .. } => Error::StorageUnavailable {
                    operation: "ensure_table",
                    table: schema.name().to_string(),
                    cause,
                },
                other => other,
            })
    }

    #[instrument(skip(self, values), fields(operation = "insert", backend = "sqlite"))]
    fn insert(&self, table: &str, values: &Row) -> Result<bool> {
        let start = Instant::now();

        let result = (|| {
            let stmt = self.builder().build_insert(table, values)?;
            let inserted = self.run(&stmt)? > 0;
            if !inserted {
                tracing::debug!(table = stmt.table(), "Primary key exists, insert skipped");
            }
            Ok(inserted)
        })();

        record_operation_metrics("sqlite", "insert", start, status_label(&result));
        result
    }

    #[instrument(skip(self, filter), fields(operation = "select", backend = "sqlite"))]
    fn select(
        &self,
        table: &str,
        filter: Option<&Filter>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        let start = Instant::now();

        let result = (|| {
            let stmt = self.builder().build_select(table, filter, limit)?;
            self.query(&stmt)
        })();

        record_operation_metrics("sqlite", "select", start, status_label(&result));
        result
    }

    #[instrument(skip(self, filter, values), fields(operation = "update", backend = "sqlite"))]
    fn update(&self, table: &str, filter: &Filter, values: &Row) -> Result<bool> {
        let start = Instant::now();

        let result = (|| {
            let stmt = self.builder().build_update(table, filter, values)?;
            Ok(self.run(&stmt)? > 0)
        })();

        record_operation_metrics("sqlite", "update", start, status_label(&result));
        result
    }

    #[instrument(skip(self, filter), fields(operation = "delete", backend = "sqlite"))]
    fn delete(&self, table: &str, filter: &Filter) -> Result<bool> {
        let start = Instant::now();

        let result = (|| {
            let stmt = self.builder().build_delete(table, filter)?;
            Ok(self.run(&stmt)? > 0)
        })();

        record_operation_metrics("sqlite", "delete", start, status_label(&result));
        result
    }
}
