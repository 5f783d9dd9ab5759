//! Backend-agnostic storage entry point.

use super::memory::MemoryBackend;
use super::postgresql::PostgresBackend;
use super::schema::SchemaRegistry;
use super::sqlite::SqliteBackend;
use super::traits::TableBackend;
use crate::config::{StorageBackendType, StorageSettings};
use crate::models::{Filter, Row};
use crate::{Error, Result};
use secrecy::ExposeSecret;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Single entry point for table access.
///
/// Picks a backend once at construction and forwards every call unchanged.
/// Cloning is cheap and clones share the same backend.
#[derive(Clone)]
pub struct Storage {
    backend: Arc<dyn TableBackend>,
    registry: Arc<SchemaRegistry>,
}

impl fmt::Debug for Storage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Storage")
            .field("backend", &self.backend.name())
            .finish_non_exhaustive()
    }
}

impl Storage {
    /// Wraps an existing backend.
    ///
    /// `registry` must be the registry the backend was built with.
    #[must_use]
    pub fn new(backend: Arc<dyn TableBackend>, registry: Arc<SchemaRegistry>) -> Self {
        Self { backend, registry }
    }

    /// In-memory storage over the built-in schemas.
    #[must_use]
    pub fn in_memory() -> Self {
        let registry = Arc::new(SchemaRegistry::builtin());
        let backend = MemoryBackend::with_registry(Arc::clone(&registry));
        Self::new(Arc::new(backend), registry)
    }

    /// `SQLite` storage in a database file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the file cannot be opened.
    pub fn sqlite(path: impl Into<PathBuf>) -> Result<Self> {
        let registry = Arc::new(SchemaRegistry::builtin());
        let backend = SqliteBackend::with_registry(path, Arc::clone(&registry))?;
        Ok(Self::new(Arc::new(backend), registry))
    }

    /// `SQLite` storage in a private in-memory database.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if the database cannot be created.
    pub fn sqlite_in_memory() -> Result<Self> {
        let registry = Arc::new(SchemaRegistry::builtin());
        let backend = SqliteBackend::in_memory_with_registry(Arc::clone(&registry))?;
        Ok(Self::new(Arc::new(backend), registry))
    }

    /// PostgreSQL storage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FeatureNotEnabled`] without the `postgres` feature,
    /// or [`Error::StorageUnavailable`] if the store cannot be reached.
    pub fn postgres(
        url: &str,
        pool_max_size: Option<usize>,
        timeout: Duration,
    ) -> Result<Self> {
        let registry = Arc::new(SchemaRegistry::builtin());
        let backend =
            PostgresBackend::with_options(url, Arc::clone(&registry), pool_max_size, timeout)?;
        Ok(Self::new(Arc::new(backend), registry))
    }

    /// Builds storage from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the PostgreSQL backend is selected
    /// without a URL, plus any constructor error of the chosen backend.
    pub fn from_config(settings: &StorageSettings) -> Result<Self> {
        let storage = match settings.backend {
            StorageBackendType::Memory => Self::in_memory(),
            StorageBackendType::Sqlite => match &settings.sqlite_path {
                Some(path) => Self::sqlite(path)?,
                None => Self::sqlite_in_memory()?,
            },
            StorageBackendType::Postgres => {
                let url = settings.postgres_url.as_ref().ok_or_else(|| {
                    Error::InvalidInput("postgres backend requires postgres_url".to_string())
                })?;
                Self::postgres(url.expose_secret(), settings.pool_max_size, settings.timeout)?
            },
        };

        tracing::info!(backend = storage.backend_name(), "Storage backend selected");
        Ok(storage)
    }

    /// Name of the active backend.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Schemas known to this storage.
    #[must_use]
    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Creates every registered table; existing tables are left alone.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] if a table cannot be created.
    pub fn ensure_tables(&self) -> Result<()> {
        for schema in self.registry.tables() {
            self.backend.ensure_table(schema)?;
            tracing::info!(table = schema.name(), backend = self.backend_name(), "Table ready");
        }
        Ok(())
    }

    /// Creates one registered table.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTable`] or [`Error::StorageUnavailable`].
    pub fn ensure_table(&self, table: &str) -> Result<()> {
        let schema = self.registry.table(table)?;
        self.backend.ensure_table(schema)
    }

    /// Executes a raw schema statement.
    ///
    /// # Errors
    ///
    /// Returns [`Error::StorageUnavailable`] unless the store reports that
    /// the object already exists.
    pub fn execute(&self, statement: &str) -> Result<()> {
        self.observe("execute", "-", self.backend.execute(statement))
    }

    /// Inserts one row; `false` if its primary key already exists.
    ///
    /// # Errors
    ///
    /// Returns a validation error or [`Error::StorageUnavailable`].
    pub fn insert(&self, table: &str, values: &Row) -> Result<bool> {
        let result = self.backend.insert(table, values);
        self.observe("insert", table, result)
    }

    /// Selects rows matching `filter` in insertion order.
    ///
    /// # Errors
    ///
    /// Returns a validation error or [`Error::StorageUnavailable`].
    pub fn select(
        &self,
        table: &str,
        filter: Option<&Filter>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        let result = self.backend.select(table, filter, limit);
        if let Ok(rows) = &result {
            tracing::debug!(table, rows = rows.len(), "Selected rows");
        }
        self.observe("select", table, result)
    }

    /// Overwrites `values` in rows matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns a validation error or [`Error::StorageUnavailable`].
    pub fn update(&self, table: &str, filter: &Filter, values: &Row) -> Result<bool> {
        let result = self.backend.update(table, filter, values);
        self.observe("update", table, result)
    }

    /// Removes rows matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns a validation error or [`Error::StorageUnavailable`].
    pub fn delete(&self, table: &str, filter: &Filter) -> Result<bool> {
        let result = self.backend.delete(table, filter);
        self.observe("delete", table, result)
    }

    /// Logs the outcome of a forwarded call and passes it through.
    fn observe<T>(&self, operation: &str, table: &str, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => tracing::debug!(operation, table, backend = self.backend_name(), "Storage call ok"),
            Err(e) if e.is_validation() => {
                tracing::debug!(operation, table, error = %e, "Rejected storage call");
            },
            Err(e) => {
                tracing::warn!(operation, table, backend = self.backend_name(), error = %e, "Storage call failed");
            },
        }
        result
    }
}
