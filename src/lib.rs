//! # Spendlog
//!
//! Storage layer for a conversational expense tracker.
//!
//! Chat messages are parsed elsewhere into structured spending records; this
//! crate is where those records are validated, turned into parameterized
//! statements and persisted.
//!
//! ## Features
//!
//! - Static field-type registry with `Integer`/`Text` column discipline
//! - Identifier validation before any name reaches statement text
//! - Parameterized statement builder (`DECLARE` manifest + bound values)
//! - Interchangeable backends: in-memory, `SQLite`, PostgreSQL
//! - Expense and budget services on top of a backend-agnostic facade
//!
//! ## Example
//!
//! ```rust
//! use spendlog::models::Row;
//! use spendlog::storage::Storage;
//!
//! let storage = Storage::in_memory();
//! storage.insert("users", &Row::new().with("id", 1).with("name", "Alice"))?;
//!
//! let rows = storage.select("users", None, None)?;
//! assert_eq!(rows.len(), 1);
//! # Ok::<(), spendlog::Error>(())
//! ```

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
#![forbid(unsafe_code)]
#![allow(clippy::multiple_crate_versions)]

use thiserror::Error as ThisError;

pub mod config;
pub mod models;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::{SpendlogConfig, StorageBackendType, StorageSettings};
pub use models::{ColumnType, Expense, Filter, Row, Value};
pub use services::{BudgetService, BudgetStatus, ExpenseService};
pub use storage::{
    BuiltStatement, MemoryBackend, QueryBuilder, SchemaRegistry, SqliteBackend, Storage,
    TableBackend, TableSchema,
};

/// Error type for spendlog operations.
///
/// # Error Variant Triggers
///
/// | Variant | Raised When |
/// |---------|-------------|
/// | `InvalidIdentifier` | Table or column name fails the identifier grammar |
/// | `UnknownTable` | Table is not part of the schema registry |
/// | `UnknownColumn` | Column is not declared for the table |
/// | `TypeMismatch` | Value cannot be converted losslessly to the column type |
/// | `UnsafeOperation` | Delete or update without a filter |
/// | `StorageUnavailable` | Driver, network, timeout or store-reported failure |
/// | `InvalidInput` | Malformed writes (missing key columns, empty write sets) |
/// | `OperationFailed` | Configuration or process setup failed |
/// | `FeatureNotEnabled` | Backend requires a cargo feature that is not compiled in |
///
/// Everything except `StorageUnavailable` is detected before a statement is
/// sent and will fail the same way on every retry.
#[derive(Debug, ThisError)]
pub enum Error {
    /// An identifier does not match `[A-Za-z_][A-Za-z0-9_]*` or is reserved.
    #[error("invalid identifier: {identifier:?}")]
    InvalidIdentifier {
        /// The rejected identifier, verbatim.
        identifier: String,
    },

    /// The table is not registered in the schema.
    #[error("unknown table '{table}'")]
    UnknownTable {
        /// Table name.
        table: String,
    },

    /// The column is not declared for the table.
    #[error("unknown column '{column}' in table '{table}'")]
    UnknownColumn {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },

    /// A value does not fit the declared column type.
    #[error("type mismatch for {table}.{column}: expected {expected}, got {value}")]
    TypeMismatch {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
        /// Declared column type.
        expected: ColumnType,
        /// Debug rendering of the rejected value.
        value: String,
    },

    /// The operation would touch every row of a table.
    #[error("unsafe operation: {operation} on '{table}' requires a non-empty filter")]
    UnsafeOperation {
        /// Operation name (`delete`, `update`).
        operation: &'static str,
        /// Table name.
        table: String,
    },

    /// The backing store could not complete the request.
    ///
    /// Raised when:
    /// - The connection pool cannot hand out a connection
    /// - A statement exceeds the configured timeout
    /// - The store reports an error (constraint, syntax, I/O)
    #[error("storage unavailable during {operation} on '{table}': {cause}")]
    StorageUnavailable {
        /// Operation name.
        operation: &'static str,
        /// Table name (or `-` for raw statements).
        table: String,
        /// The underlying cause.
        cause: String,
    },

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A non-storage operation failed.
    ///
    /// Raised when configuration files cannot be read or parsed, or when
    /// logging cannot be initialised.
    #[error("operation '{operation}' failed: {cause}")]
    OperationFailed {
        /// The operation that failed.
        operation: String,
        /// The underlying cause.
        cause: String,
    },

    /// Feature not enabled (requires feature flag).
    #[error("feature not enabled: {0} (compile with --features {0})")]
    FeatureNotEnabled(String),
}

impl Error {
    /// Returns true for input-validation failures.
    ///
    /// These are deterministic: the same call fails the same way every time.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdentifier { .. }
                | Self::UnknownTable { .. }
                | Self::UnknownColumn { .. }
                | Self::TypeMismatch { .. }
                | Self::UnsafeOperation { .. }
                | Self::InvalidInput(_)
        )
    }

    /// Returns true if the enclosing user action may be retried.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StorageUnavailable { .. })
    }
}

/// Result type alias for spendlog operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::InvalidIdentifier {
            identifier: "expenses; DROP".to_string(),
        };
        assert_eq!(err.to_string(), "invalid identifier: \"expenses; DROP\"");

        let err = Error::UnknownColumn {
            table: "expenses".to_string(),
            column: "nope".to_string(),
        };
        assert_eq!(err.to_string(), "unknown column 'nope' in table 'expenses'");

        let err = Error::UnsafeOperation {
            operation: "delete",
            table: "expenses".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "unsafe operation: delete on 'expenses' requires a non-empty filter"
        );

        let err = Error::TypeMismatch {
            table: "expenses".to_string(),
            column: "user_id".to_string(),
            expected: ColumnType::Integer,
            value: "Text(\"abc\")".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "type mismatch for expenses.user_id: expected Int64, got Text(\"abc\")"
        );
    }

    #[test]
    fn test_error_classification() {
        let validation = Error::UnsafeOperation {
            operation: "delete",
            table: "t".to_string(),
        };
        assert!(validation.is_validation());
        assert!(!validation.is_retryable());

        let env = Error::StorageUnavailable {
            operation: "select",
            table: "t".to_string(),
            cause: "connection refused".to_string(),
        };
        assert!(!env.is_validation());
        assert!(env.is_retryable());

        let config = Error::OperationFailed {
            operation: "read_config_file".to_string(),
            cause: "missing".to_string(),
        };
        assert!(!config.is_validation());
        assert!(!config.is_retryable());
    }
}
