//! Table backend trait.
//!
//! Every backend implements the same small data-access contract:
//! equality-filtered select/update/delete, single-row insert, and a raw
//! `execute` reserved for idempotent schema setup.
//!
//! # Available Implementations
//!
//! | Backend | Use Case | Parameter Binding |
//! |---------|----------|-------------------|
//! | `MemoryBackend` | Tests, local runs | Interprets bindings directly |
//! | `SqliteBackend` | Embedded, single host | Named (`$p_col`) |
//! | `PostgresBackend` | Managed store | Positional, explicitly typed |
//!
//! # Error Modes and Guarantees
//!
//! | Error Type | Raised | Recovery |
//! |------------|--------|----------|
//! | `InvalidIdentifier`, `UnknownTable`, `UnknownColumn`, `TypeMismatch`, `UnsafeOperation`, `InvalidInput` | Before any statement is sent | Fix the caller |
//! | `StorageUnavailable` | Driver, network, timeout | Caller may retry the user action |
//!
//! Backends never retry on their own. For the same schema and the same
//! sequence of calls, all implementations return the same rows and flags.

use crate::Result;
use crate::models::{Filter, Row};
use crate::storage::TableSchema;

/// Trait for table storage backends.
///
/// # Implementor Notes
///
/// - Methods use `&self` to enable sharing via `Arc<dyn TableBackend>`
/// - Use interior mutability (e.g., `Mutex<Connection>`) for mutable state
/// - Build every data statement through [`crate::storage::QueryBuilder`]
/// - Return rows with declared columns in schema order, omitting NULLs
pub trait TableBackend: Send + Sync {
    /// Short backend name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Executes a raw schema statement.
    ///
    /// An "already exists" outcome is treated as success.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` for any other store error.
    fn execute(&self, statement: &str) -> Result<()>;

    /// Creates the table for `schema` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns `StorageUnavailable` if the store rejects the definition.
    fn ensure_table(&self, schema: &TableSchema) -> Result<()>;

    /// Inserts one row.
    ///
    /// Returns `false` if a row with the same primary key already exists.
    ///
    /// # Errors
    ///
    /// Returns a validation error or `StorageUnavailable`.
    fn insert(&self, table: &str, values: &Row) -> Result<bool>;

    /// Selects rows matching every filter entry, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns a validation error or `StorageUnavailable`.
    fn select(&self, table: &str, filter: Option<&Filter>, limit: Option<usize>)
    -> Result<Vec<Row>>;

    /// Overwrites `values` in every row matching `filter`.
    ///
    /// Returns `true` if at least one row matched.
    ///
    /// # Errors
    ///
    /// Returns a validation error or `StorageUnavailable`.
    fn update(&self, table: &str, filter: &Filter, values: &Row) -> Result<bool>;

    /// Removes every row matching `filter`.
    ///
    /// Returns `true` if at least one row was removed.
    ///
    /// # Errors
    ///
    /// Returns a validation error or `StorageUnavailable`.
    fn delete(&self, table: &str, filter: &Filter) -> Result<bool>;
}
