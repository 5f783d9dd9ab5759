//! PostgreSQL table backend.
//!
//! The managed store. Statements are rewritten to positional parameters and
//! prepared with explicit types (`INT8` / `TEXT`) taken from the schema, so
//! the server never infers a parameter type from a value.

use std::time::Duration;

/// Default per-operation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default maximum connections in pool.
pub const DEFAULT_POOL_MAX_SIZE: usize = 20;

#[cfg(feature = "postgres")]
mod implementation {
    use super::{DEFAULT_POOL_MAX_SIZE, DEFAULT_TIMEOUT};
    use crate::models::{ColumnType, Filter, Row, Value, format_timestamp};
    use crate::storage::dialect::SqlDialect;
    use crate::storage::query::{BuiltStatement, QueryBuilder};
    use crate::storage::schema::{SchemaRegistry, TableSchema};
    use crate::storage::sqlite::{record_operation_metrics, status_label};
    use crate::storage::traits::TableBackend;
    use crate::{Error, Result};
    use deadpool_postgres::{Config, Pool, Runtime};
    use std::future::Future;
    use std::sync::{Arc, mpsc};
    use std::time::{Duration, Instant};
    use tokio::runtime::Handle;
    use tokio::sync::oneshot;
    use tokio_postgres::NoTls;
    use tokio_postgres::error::SqlState;
    use tokio_postgres::types::{ToSql, Type};
    use tracing::instrument;

    /// Maps a pool, driver or timeout failure to [`Error::StorageUnavailable`].
    fn unavailable(operation: &'static str, table: &str, e: impl std::fmt::Display) -> Error {
        Error::StorageUnavailable {
            operation,
            table: table.to_string(),
            cause: e.to_string(),
        }
    }

    /// Explicit parameter type for a declared column type.
    const fn pg_type(column_type: ColumnType) -> Type {
        match column_type {
            ColumnType::Integer => Type::INT8,
            ColumnType::Text => Type::TEXT,
        }
    }

    /// Owned driver parameter for a bound value.
    fn to_param(value: &Value) -> Box<dyn ToSql + Sync + Send> {
        match value {
            Value::Integer(i) => Box::new(*i),
            Value::Text(s) => Box::new(s.clone()),
            Value::Timestamp(t) => Box::new(format_timestamp(t)),
        }
    }

    /// Thread that owns the Tokio runtime the pool lives on.
    ///
    /// Callers hand futures over and block on a channel for the result, so
    /// the synchronous trait works from plain threads and from inside any
    /// runtime flavour. The runtime is only ever dropped on the driver
    /// thread, after its `block_on` has returned.
    struct Driver {
        handle: Handle,
        shutdown: Option<oneshot::Sender<()>>,
    }

    impl Driver {
        fn start() -> Result<Self> {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| unavailable("connect", "-", e))?;
            let handle = runtime.handle().clone();
            let (shutdown, stopped) = oneshot::channel::<()>();

            std::thread::Builder::new()
                .name("spendlog-postgres".to_string())
                .spawn(move || {
                    runtime.block_on(async {
                        let _ = stopped.await;
                    });
                })
                .map_err(|e| unavailable("connect", "-", e))?;

            Ok(Self {
                handle,
                shutdown: Some(shutdown),
            })
        }

        /// Runs `f` on the driver thread and waits for its result.
        fn run<F, T>(&self, operation: &'static str, f: F) -> Result<T>
        where
            F: Future<Output = Result<T>> + Send + 'static,
            T: Send + 'static,
        {
            let (tx, rx) = mpsc::sync_channel(1);
            self.handle.spawn(async move {
                let _ = tx.send(f.await);
            });
            rx.recv()
                .map_err(|_| unavailable(operation, "-", "postgres driver thread stopped"))?
        }
    }

    impl Drop for Driver {
        fn drop(&mut self) {
            if let Some(shutdown) = self.shutdown.take() {
                let _ = shutdown.send(());
            }
        }
    }

    /// PostgreSQL-based table backend.
    pub struct PostgresBackend {
        /// Connection pool, driven by `driver`.
        pool: Pool,
        /// Schemas used to build and decode statements.
        registry: Arc<SchemaRegistry>,
        /// Upper bound for a single operation, including pool wait.
        timeout: Duration,
        /// Declared last so the pool is released before the driver stops.
        driver: Driver,
    }

    impl PostgresBackend {
        /// Connects with the built-in schemas and default pool settings.
        ///
        /// # Errors
        ///
        /// Returns [`Error::StorageUnavailable`] if the URL is invalid, the
        /// pool cannot be created or the tables cannot be created.
        pub fn new(connection_url: &str) -> Result<Self> {
            Self::with_options(
                connection_url,
                Arc::new(SchemaRegistry::builtin()),
                None,
                DEFAULT_TIMEOUT,
            )
        }

        /// Connects with a custom registry, pool size and operation timeout.
        ///
        /// Safe to call from synchronous code and from inside a Tokio
        /// runtime of either flavour; the calling thread blocks until the
        /// store answers or the timeout expires.
        ///
        /// # Arguments
        ///
        /// * `connection_url` - PostgreSQL connection URL
        /// * `registry` - Table schemas to create and query
        /// * `pool_max_size` - Maximum connections in pool (defaults to 20)
        /// * `timeout` - Per-operation timeout
        ///
        /// # Errors
        ///
        /// Returns [`Error::StorageUnavailable`] if the URL is invalid, the
        /// pool cannot be created or the tables cannot be created.
        pub fn with_options(
            connection_url: &str,
            registry: Arc<SchemaRegistry>,
            pool_max_size: Option<usize>,
            timeout: Duration,
        ) -> Result<Self> {
            let config = connection_url
                .parse::<tokio_postgres::Config>()
                .map_err(|e| unavailable("connect", "-", e))?;
            let cfg = Self::build_pool_config(&config, pool_max_size, timeout);

            let driver = Driver::start()?;
            let pool = {
                let _guard = driver.handle.enter();
                cfg.create_pool(Some(Runtime::Tokio1), NoTls)
                    .map_err(|e| unavailable("connect", "-", e))?
            };

            let backend = Self {
                pool,
                registry,
                timeout,
                driver,
            };
            for schema in backend.registry.tables() {
                backend.ensure_table(schema)?;
            }
            Ok(backend)
        }

        /// Extracts host string from tokio-postgres Host.
        #[cfg(unix)]
        fn host_to_string(h: &tokio_postgres::config::Host) -> String {
            match h {
                tokio_postgres::config::Host::Tcp(s) => s.clone(),
                tokio_postgres::config::Host::Unix(p) => p.to_string_lossy().to_string(),
            }
        }

        /// Extracts host string from tokio-postgres Host (Windows: Tcp only).
        #[cfg(not(unix))]
        fn host_to_string(h: &tokio_postgres::config::Host) -> String {
            let tokio_postgres::config::Host::Tcp(s) = h;
            s.clone()
        }

        /// Builds a deadpool config from tokio-postgres config.
        ///
        /// Pool waits, connection creation and recycling are all bounded by
        /// the operation timeout.
        fn build_pool_config(
            config: &tokio_postgres::Config,
            pool_max_size: Option<usize>,
            timeout: Duration,
        ) -> Config {
            let mut cfg = Config::new();
            cfg.host = config.get_hosts().first().map(Self::host_to_string);
            cfg.port = config.get_ports().first().copied();
            cfg.user = config.get_user().map(String::from);
            cfg.password = config
                .get_password()
                .map(|p| String::from_utf8_lossy(p).to_string());
            cfg.dbname = config.get_dbname().map(String::from);

            cfg.pool = Some(deadpool_postgres::PoolConfig {
                max_size: pool_max_size.unwrap_or(DEFAULT_POOL_MAX_SIZE),
                timeouts: deadpool_postgres::Timeouts {
                    wait: Some(timeout),
                    create: Some(timeout),
                    recycle: Some(timeout),
                },
                ..Default::default()
            });

            cfg.manager = Some(deadpool_postgres::ManagerConfig {
                recycling_method: deadpool_postgres::RecyclingMethod::Fast,
            });

            cfg
        }

        /// Runs `f` on the driver with the operation timeout applied.
        fn run_timed<F, T>(&self, operation: &'static str, table: &str, f: F) -> Result<T>
        where
            F: Future<Output = Result<T>> + Send + 'static,
            T: Send + 'static,
        {
            let timeout = self.timeout;
            let table = table.to_string();
            self.driver.run(operation, async move {
                tokio::time::timeout(timeout, f).await.map_err(|_| {
                    unavailable(
                        operation,
                        &table,
                        format!("timed out after {}ms", timeout.as_millis()),
                    )
                })?
            })
        }

        fn builder(&self) -> QueryBuilder<'_> {
            QueryBuilder::new(&self.registry)
        }

        /// Builds a write statement, runs it and reports whether any row
        /// was affected.
        fn write(
            &self,
            operation: &'static str,
            build: impl FnOnce(QueryBuilder<'_>) -> Result<BuiltStatement>,
        ) -> Result<bool> {
            let start = Instant::now();

            let result = (|| {
                let stmt = build(self.builder())?;
                let table = stmt.table().to_string();
                let affected =
                    self.run_timed(operation, &table, run_statement(self.pool.clone(), stmt))?;
                Ok(affected > 0)
            })();

            record_operation_metrics("postgres", operation, start, status_label(&result));
            result
        }
    }

    /// Executes a raw statement, treating "already exists" as success.
    async fn execute_statement(pool: Pool, statement: String) -> Result<()> {
        let client = pool
            .get()
            .await
            .map_err(|e| unavailable("execute", "-", e))?;

        match client.batch_execute(&statement).await {
            Ok(()) => Ok(()),
            Err(e)
                if e.code() == Some(&SqlState::DUPLICATE_TABLE)
                    || e.code() == Some(&SqlState::DUPLICATE_OBJECT) =>
            {
                tracing::debug!("Object already exists, skipping");
                Ok(())
            },
            Err(e) => Err(unavailable("execute", "-", e)),
        }
    }

    /// Prepares `stmt` with explicit parameter types on a pooled client.
    async fn prepare(
        pool: &Pool,
        stmt: &BuiltStatement,
    ) -> Result<(deadpool_postgres::Object, tokio_postgres::Statement)> {
        let op = stmt.kind().as_str();
        let client = pool
            .get()
            .await
            .map_err(|e| unavailable(op, stmt.table(), e))?;

        let types: Vec<Type> = stmt
            .bindings()
            .iter()
            .map(|b| pg_type(b.column_type()))
            .collect();
        let prepared = client
            .prepare_typed(&stmt.to_positional(), &types)
            .await
            .map_err(|e| unavailable(op, stmt.table(), e))?;

        Ok((client, prepared))
    }

    /// Runs a write statement and returns the affected row count.
    async fn run_statement(pool: Pool, stmt: BuiltStatement) -> Result<u64> {
        let (client, prepared) = prepare(&pool, &stmt).await?;

        let owned: Vec<_> = stmt.params().map(|(_, v)| to_param(v)).collect();
        let params: Vec<&(dyn ToSql + Sync)> = owned
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        client
            .execute(&prepared, &params)
            .await
            .map_err(|e| unavailable(stmt.kind().as_str(), stmt.table(), e))
    }

    /// Runs a select, decoding rows against the schema.
    async fn query_rows(
        pool: Pool,
        registry: Arc<SchemaRegistry>,
        stmt: BuiltStatement,
    ) -> Result<Vec<Row>> {
        let schema = registry.table(stmt.table())?;
        let (client, prepared) = prepare(&pool, &stmt).await?;

        let owned: Vec<_> = stmt.params().map(|(_, v)| to_param(v)).collect();
        let params: Vec<&(dyn ToSql + Sync)> = owned
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        let rows = client
            .query(&prepared, &params)
            .await
            .map_err(|e| unavailable("select", stmt.table(), e))?;

        rows.iter()
            .map(|row| decode_row(schema, row))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| unavailable("select", stmt.table(), e))
    }

    /// Reads the declared columns of `schema`, skipping NULLs.
    fn decode_row(
        schema: &TableSchema,
        row: &tokio_postgres::Row,
    ) -> std::result::Result<Row, tokio_postgres::Error> {
        let mut out = Row::new();
        for (column, column_type) in schema.columns() {
            let value = match column_type {
                ColumnType::Integer => row
                    .try_get::<_, Option<i64>>(column.as_str())?
                    .map(Value::Integer),
                ColumnType::Text => row
                    .try_get::<_, Option<String>>(column.as_str())?
                    .map(Value::Text),
            };
            if let Some(value) = value {
                out.set(column.as_str(), value);
            }
        }
        Ok(out)
    }

    impl TableBackend for PostgresBackend {
        fn name(&self) -> &'static str {
            "postgres"
        }

        #[instrument(skip(self, statement), fields(operation = "execute", backend = "postgres"))]
        fn execute(&self, statement: &str) -> Result<()> {
            let start = Instant::now();
            let result = self.run_timed(
                "execute",
                "-",
                execute_statement(self.pool.clone(), statement.to_string()),
            );
            record_operation_metrics("postgres", "execute", start, status_label(&result));
            result
        }

        fn ensure_table(&self, schema: &TableSchema) -> Result<()> {
            self.execute(&SqlDialect::Postgres.create_table(schema))
                .map_err(|e| match e {
                    Error::StorageUnavailable { cause, .. } => Error::StorageUnavailable {
                        operation: "ensure_table",
                        table: schema.name().to_string(),
                        cause,
                    },
                    other => other,
                })
        }

        #[instrument(skip(self, values), fields(operation = "insert", backend = "postgres"))]
        fn insert(&self, table: &str, values: &Row) -> Result<bool> {
            self.write("insert", |b| b.build_insert(table, values))
        }

        #[instrument(skip(self, filter), fields(operation = "select", backend = "postgres"))]
        fn select(
            &self,
            table: &str,
            filter: Option<&Filter>,
            limit: Option<usize>,
        ) -> Result<Vec<Row>> {
            let start = Instant::now();

            let result = (|| {
                let stmt = self.builder().build_select(table, filter, limit)?;
                let table = stmt.table().to_string();
                self.run_timed(
                    "select",
                    &table,
                    query_rows(self.pool.clone(), Arc::clone(&self.registry), stmt),
                )
            })();

            record_operation_metrics("postgres", "select", start, status_label(&result));
            result
        }

        #[instrument(skip(self, filter, values), fields(operation = "update", backend = "postgres"))]
        fn update(&self, table: &str, filter: &Filter, values: &Row) -> Result<bool> {
            self.write("update", |b| b.build_update(table, filter, values))
        }

        #[instrument(skip(self, filter), fields(operation = "delete", backend = "postgres"))]
        fn delete(&self, table: &str, filter: &Filter) -> Result<bool> {
            self.write("delete", |b| b.build_delete(table, filter))
        }
    }
}

#[cfg(feature = "postgres")]
pub use implementation::PostgresBackend;

#[cfg(not(feature = "postgres"))]
mod stub {
    use crate::models::{Filter, Row};
    use crate::storage::schema::{SchemaRegistry, TableSchema};
    use crate::storage::traits::TableBackend;
    use crate::{Error, Result};
    use std::sync::Arc;
    use std::time::Duration;

    fn not_enabled<T>() -> Result<T> {
        Err(Error::FeatureNotEnabled("postgres".to_string()))
    }

    /// Stub PostgreSQL backend when feature is not enabled.
    ///
    /// Construction always fails with [`Error::FeatureNotEnabled`].
    pub struct PostgresBackend {
        _private: (),
    }

    impl PostgresBackend {
        /// Creates a new PostgreSQL backend (stub).
        ///
        /// # Errors
        ///
        /// Always returns [`Error::FeatureNotEnabled`].
        pub fn new(_connection_url: &str) -> Result<Self> {
            not_enabled()
        }

        /// Creates a new PostgreSQL backend with options (stub).
        ///
        /// # Errors
        ///
        /// Always returns [`Error::FeatureNotEnabled`].
        pub fn with_options(
            _connection_url: &str,
            _registry: Arc<SchemaRegistry>,
            _pool_max_size: Option<usize>,
            _timeout: Duration,
        ) -> Result<Self> {
            not_enabled()
        }
    }

    impl TableBackend for PostgresBackend {
        fn name(&self) -> &'static str {
            "postgres"
        }

        fn execute(&self, _statement: &str) -> Result<()> {
            not_enabled()
        }

        fn ensure_table(&self, _schema: &TableSchema) -> Result<()> {
            not_enabled()
        }

        fn insert(&self, _table: &str, _values: &Row) -> Result<bool> {
            not_enabled()
        }

        fn select(
            &self,
            _table: &str,
            _filter: Option<&Filter>,
            _limit: Option<usize>,
        ) -> Result<Vec<Row>> {
            not_enabled()
        }

        fn update(&self, _table: &str, _filter: &Filter, _values: &Row) -> Result<bool> {
            not_enabled()
        }

        fn delete(&self, _table: &str, _filter: &Filter) -> Result<bool> {
            not_enabled()
        }
    }
}

#[cfg(not(feature = "postgres"))]
pub use stub::PostgresBackend;


#[cfg(all(test, feature = "postgres"))]
mod tests {
    use super::*;
    use crate::Error;
    use crate::models::Row;
    use crate::storage::{SchemaRegistry, TableBackend};
    use std::sync::Arc;

    /// Returns the test database URL, or `None` to skip.
    fn test_url() -> Option<String> {
        std::env::var("SPENDLOG_TEST_POSTGRES_URL").ok()
    }

    #[test]
    fn test_invalid_url_is_unavailable() {
        let result = PostgresBackend::new("not a url ::");
        assert!(matches!(result, Err(Error::StorageUnavailable { .. })));
    }

    /// Nothing listens on port 1, so connecting fails fast.
    const UNREACHABLE_URL: &str = "postgresql://spendlog@127.0.0.1:1/spendlog";

    fn connect_unreachable() -> crate::Result<PostgresBackend> {
        PostgresBackend::with_options(
            UNREACHABLE_URL,
            Arc::new(SchemaRegistry::builtin()),
            Some(2),
            Duration::from_secs(2),
        )
    }

    #[test]
    fn test_unreachable_store_is_unavailable() {
        assert!(matches!(
            connect_unreachable(),
            Err(Error::StorageUnavailable { .. })
        ));
    }

    #[test]
    fn test_unreachable_store_inside_current_thread_runtime() {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let result = rt.block_on(async { connect_unreachable() });
        assert!(matches!(result, Err(Error::StorageUnavailable { .. })));
    }

    #[test]
    fn test_unreachable_store_inside_multi_thread_runtime() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let result = rt.block_on(async {
            tokio::spawn(async { connect_unreachable().map(|_| ()) })
                .await
                .unwrap()
        });
        assert!(matches!(result, Err(Error::StorageUnavailable { .. })));
    }

    #[test]
    fn test_roundtrip_against_live_database() {
        let Some(url) = test_url() else {
            eprintln!("Skipping: SPENDLOG_TEST_POSTGRES_URL not set");
            return;
        };

        let backend = PostgresBackend::new(&url).unwrap();
        let id = i64::from(std::process::id());
        let filter = Row::new().with("id", id);
        let _ = backend.delete("users", &filter);

        assert!(backend
            .insert("users", &Row::new().with("id", id).with("name", "Alice"))
            .unwrap());
        assert!(!backend
            .insert("users", &Row::new().with("id", id).with("name", "Eve"))
            .unwrap());

        let rows = backend.select("users", Some(&filter), None).unwrap();
        assert_eq!(rows, vec![Row::new().with("id", id).with("name", "Alice")]);

        assert!(backend.delete("users", &filter).unwrap());
    }
}
