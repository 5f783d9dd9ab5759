//! In-memory table backend.
//!
//! Interprets the statements produced by [`QueryBuilder`] directly against
//! per-table row vectors. Validation is identical to the SQL backends
//! because the same builder runs first; only execution differs.

use super::query::{BuiltStatement, QueryBuilder};
use super::schema::{SchemaRegistry, TableSchema};
use super::sqlite::{acquire_lock, record_operation_metrics, status_label};
use super::traits::TableBackend;
use crate::Result;
use crate::models::{Filter, Row, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::instrument;

/// In-memory table backend.
///
/// Rows live in a `Mutex<HashMap<table, Vec<Row>>>`; vector order is
/// insertion order. Every registered table exists from construction.
pub struct MemoryBackend {
    registry: Arc<SchemaRegistry>,
    tables: Mutex<HashMap<String, Vec<Row>>>,
}

impl MemoryBackend {
    /// Creates a backend over the built-in schema registry.
    #[must_use]
    pub fn new() -> Self {
        Self::with_registry(Arc::new(SchemaRegistry::builtin()))
    }

    /// Creates a backend over a custom schema registry.
    #[must_use]
    pub fn with_registry(registry: Arc<SchemaRegistry>) -> Self {
        let tables = registry
            .tables()
            .map(|schema| (schema.name().to_string(), Vec::new()))
            .collect();

        Self {
            registry,
            tables: Mutex::new(tables),
        }
    }

    /// Number of rows currently stored in `table`.
    #[must_use]
    pub fn row_count(&self, table: &str) -> usize {
        acquire_lock(&self.tables).get(table).map_or(0, Vec::len)
    }

    fn builder(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(&self.registry)
    }

    fn schema(&self, stmt: &BuiltStatement) -> Result<&TableSchema> {
        self.registry.table(stmt.table())
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns true if `row` satisfies every filter binding of `stmt`.
///
/// A column absent from the row never matches, the same way `NULL = x`
/// is never true in SQL.
fn matches(row: &Row, stmt: &BuiltStatement) -> bool {
    stmt.filters()
        .all(|b| row.get(b.column()) == Some(b.value()))
}

/// Rebuilds a row with its columns in schema order, dropping absent ones.
fn normalize<'v>(
    schema: &TableSchema,
    lookup: impl Fn(&str) -> Option<&'v Value>,
) -> Row {
    let mut row = Row::new();
    for (column, _) in schema.columns() {
        if let Some(value) = lookup(column) {
            row.set(column.as_str(), value.clone());
        }
    }
    row
}

impl TableBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn execute(&self, statement: &str) -> Result<()> {
        tracing::trace!(statement, "Ignoring raw statement in memory backend");
        Ok(())
    }

    #[instrument(skip(self, schema), fields(operation = "ensure_table", backend = "memory", table = schema.name()))]
    fn ensure_table(&self, schema: &TableSchema) -> Result<()> {
        acquire_lock(&self.tables)
            .entry(schema.name().to_string())
            .or_default();
        Ok(())
    }

    #[instrument(skip(self, values), fields(operation = "insert", backend = "memory"))]
    fn insert(&self, table: &str, values: &Row) -> Result<bool> {
        let start = Instant::now();

        let result = (|| {
            let stmt = self.builder().build_insert(table, values)?;
            let schema = self.schema(&stmt)?;
            let row = normalize(schema, |column| {
                stmt.assignments()
                    .find(|b| b.column() == column)
                    .map(|b| b.value())
            });

            let mut tables = acquire_lock(&self.tables);
            let rows = tables.entry(stmt.table().to_string()).or_default();
            let conflict = !schema.primary_key().is_empty()
                && rows.iter().any(|existing| {
                    schema
                        .primary_key()
                        .iter()
                        .all(|key| existing.get(key) == row.get(key))
                });
            if conflict {
                tracing::debug!(table = stmt.table(), "Primary key exists, insert skipped");
                return Ok(false);
            }

            rows.push(row);
            Ok(true)
        })();

        record_operation_metrics("memory", "insert", start, status_label(&result));
        result
    }

    #[instrument(skip(self, filter), fields(operation = "select", backend = "memory"))]
    fn select(
        &self,
        table: &str,
        filter: Option<&Filter>,
        limit: Option<usize>,
    ) -> Result<Vec<Row>> {
        let start = Instant::now();

        let result = (|| {
            let stmt = self.builder().build_select(table, filter, limit)?;
            let tables = acquire_lock(&self.tables);
            let rows = tables
                .get(stmt.table())
                .map(Vec::as_slice)
                .unwrap_or_default()
                .iter()
                .filter(|row| matches(row, &stmt))
                .take(stmt.limit().unwrap_or(usize::MAX))
                .cloned()
                .collect();
            Ok(rows)
        })();

        record_operation_metrics("memory", "select", start, status_label(&result));
        result
    }

    #[instrument(skip(self, filter, values), fields(operation = "update", backend = "memory"))]
    fn update(&self, table: &str, filter: &Filter, values: &Row) -> Result<bool> {
        let start = Instant::now();

        let result = (|| {
            let stmt = self.builder().build_update(table, filter, values)?;
            let schema = self.schema(&stmt)?;

            let mut tables = acquire_lock(&self.tables);
            let Some(rows) = tables.get_mut(stmt.table()) else {
                return Ok(false);
            };

            let mut matched = 0_usize;
            for row in rows.iter_mut().filter(|row| matches(row, &stmt)) {
                let updated = normalize(schema, |column| {
                    stmt.assignments()
                        .find(|b| b.column() == column)
                        .map(|b| b.value())
                        .or_else(|| row.get(column))
                });
                *row = updated;
                matched += 1;
            }
            Ok(matched > 0)
        })();

        record_operation_metrics("memory", "update", start, status_label(&result));
        result
    }

    #[instrument(skip(self, filter), fields(operation = "delete", backend = "memory"))]
    fn delete(&self, table: &str, filter: &Filter) -> Result<bool> {
        let start = Instant::now();

        let result = (|| {
            let stmt = self.builder().build_delete(table, filter)?;

            let mut tables = acquire_lock(&self.tables);
            let Some(rows) = tables.get_mut(stmt.table()) else {
                return Ok(false);
            };

            let before = rows.len();
            rows.retain(|row| !matches(row, &stmt));
            Ok(rows.len() < before)
        })();

        record_operation_metrics("memory", "delete", start, status_label(&result));
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;

    fn user(id: i64, name: &str) -> Row {
        Row::new().with("id", id).with("name", name)
    }

    #[test]
    fn test_insert_and_select() {
        let backend = MemoryBackend::new();
        assert!(backend.insert("users", &user(1, "Alice")).unwrap());
        assert!(backend.insert("users", &user(2, "Bob")).unwrap());

        let rows = backend.select("users", None, None).unwrap();
        assert_eq!(rows, vec![user(1, "Alice"), user(2, "Bob")]);
        assert_eq!(backend.row_count("users"), 2);
    }

    #[test]
    fn test_select_filter_and_limit() {
        let backend = MemoryBackend::new();
        for id in 1..=5 {
            backend.insert("users", &user(id, "same")).unwrap();
        }

        let filter = Row::new().with("name", "same");
        let rows = backend.select("users", Some(&filter), Some(2)).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_i64("id"), Some(1));
        assert_eq!(rows[1].get_i64("id"), Some(2));

        let filter = Row::new().with("id", "4");
        let rows = backend.select("users", Some(&filter), None).unwrap();
        assert_eq!(rows, vec![user(4, "same")]);
    }

    #[test]
    fn test_rows_come_back_in_schema_order_and_coerced() {
        let backend = MemoryBackend::new();
        let values = Row::new().with("name", 42).with("id", "7");
        backend.insert("users", &values).unwrap();

        let rows = backend.select("users", None, None).unwrap();
        assert_eq!(rows, vec![Row::new().with("id", 7).with("name", "42")]);
    }

    #[test]
    fn test_absent_columns_are_omitted() {
        let backend = MemoryBackend::new();
        backend.insert("users", &Row::new().with("id", 1)).unwrap();

        let rows = backend.select("users", None, None).unwrap();
        assert_eq!(rows, vec![Row::new().with("id", 1)]);

        let filter = Row::new().with("name", "");
        assert!(backend.select("users", Some(&filter), None).unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_primary_key_is_skipped() {
        let backend = MemoryBackend::new();
        assert!(backend.insert("users", &user(1, "Alice")).unwrap());
        assert!(!backend.insert("users", &user(1, "Mallory")).unwrap());

        let rows = backend.select("users", None, None).unwrap();
        assert_eq!(rows, vec![user(1, "Alice")]);
    }

    #[test]
    fn test_update() {
        let backend = MemoryBackend::new();
        backend.insert("users", &user(1, "Alice")).unwrap();
        backend.insert("users", &user(2, "Bob")).unwrap();

        let filter = Row::new().with("id", 2);
        assert!(backend
            .update("users", &filter, &Row::new().with("name", "Robert"))
            .unwrap());

        let missing = Row::new().with("id", 9);
        assert!(!backend
            .update("users", &missing, &Row::new().with("name", "X"))
            .unwrap());

        let rows = backend.select("users", None, None).unwrap();
        assert_eq!(rows, vec![user(1, "Alice"), user(2, "Robert")]);
    }

    #[test]
    fn test_update_fills_absent_column_in_schema_order() {
        let backend = MemoryBackend::new();
        backend.insert("users", &Row::new().with("id", 1)).unwrap();

        let filter = Row::new().with("id", 1);
        backend
            .update("users", &filter, &Row::new().with("name", "Alice"))
            .unwrap();

        let rows = backend.select("users", None, None).unwrap();
        assert_eq!(rows, vec![user(1, "Alice")]);
    }

    #[test]
    fn test_delete() {
        let backend = MemoryBackend::new();
        backend.insert("users", &user(1, "Alice")).unwrap();
        backend.insert("users", &user(2, "Bob")).unwrap();

        assert!(backend.delete("users", &Row::new().with("id", 1)).unwrap());
        assert!(!backend.delete("users", &Row::new().with("id", 1)).unwrap());
        assert_eq!(backend.select("users", None, None).unwrap(), vec![user(2, "Bob")]);
    }

    #[test]
    fn test_validation_happens_before_state_changes() {
        let backend = MemoryBackend::new();
        backend.insert("users", &user(1, "Alice")).unwrap();

        assert!(matches!(
            backend.delete("users", &Row::new()),
            Err(Error::UnsafeOperation { .. })
        ));
        assert!(matches!(
            backend.delete("users; DROP TABLE users", &Row::new().with("id", 1)),
            Err(Error::InvalidIdentifier { .. })
        ));
        assert!(matches!(
            backend.insert("users", &Row::new().with("id", "one")),
            Err(Error::TypeMismatch { .. })
        ));
        assert_eq!(backend.row_count("users"), 1);
    }

    #[test]
    fn test_ensure_table_and_execute() {
        let registry = Arc::new(
            SchemaRegistry::new().with_table(
                TableSchema::new("notes", [("id", crate::ColumnType::Integer)], &["id"]).unwrap(),
            ),
        );
        let backend = MemoryBackend::with_registry(Arc::clone(&registry));
        let schema = registry.table("notes").unwrap();

        backend.ensure_table(schema).unwrap();
        backend.ensure_table(schema).unwrap();
        backend.execute("CREATE TABLE notes (id INTEGER)").unwrap();

        assert!(backend.insert("notes", &Row::new().with("id", 1)).unwrap());
        assert_eq!(backend.row_count("notes"), 1);
    }

    #[test]
    fn test_concurrent_inserts_into_shared_backend() {
        let backend = Arc::new(MemoryBackend::new());
        let mut handles = vec![];

        for worker in 0..8_i64 {
            let backend = Arc::clone(&backend);
            let handle = std::thread::spawn(move || {
                for n in 0..25_i64 {
                    let id = worker * 100 + n;
                    assert!(backend.insert("users", &user(id, "worker")).unwrap());
                }
                // Every worker also races on one shared key.
                backend.insert("users", &user(-1, "shared")).unwrap()
            });
            handles.push(handle);
        }

        let winners = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|inserted| *inserted)
            .count();

        assert_eq!(winners, 1);
        assert_eq!(backend.row_count("users"), 8 * 25 + 1);
        let shared = backend
            .select("users", Some(&Row::new().with("id", -1)), None)
            .unwrap();
        assert_eq!(shared.len(), 1);
    }
}
