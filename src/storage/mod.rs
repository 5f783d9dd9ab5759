//! Storage layer.
//!
//! Everything between a typed row and the table store:
//! - **Schema**: the field type registry ([`SchemaRegistry`], [`TableSchema`])
//! - **Query**: identifier validation and parameterized statement building
//! - **Backends**: in-memory, `SQLite` and PostgreSQL behind [`TableBackend`]
//! - **Facade**: [`Storage`], the backend-agnostic entry point

// Allow significant_drop_tightening - dropping database connections slightly early
// provides no meaningful benefit.
#![allow(clippy::significant_drop_tightening)]
// Allow redundant_closure_call for the instrumented `(|| { ... })()` bodies.
#![allow(clippy::redundant_closure_call)]

mod dialect;
mod facade;
mod identifier;
mod memory;
pub mod postgresql;
mod query;
mod schema;
pub mod sqlite;
pub mod traits;

pub use dialect::SqlDialect;
pub use facade::Storage;
pub use identifier::{MAX_IDENTIFIER_LEN, validate as validate_identifier};
pub use memory::MemoryBackend;
pub use postgresql::PostgresBackend;
pub use query::{Binding, BindingRole, BuiltStatement, QueryBuilder, StatementKind};
pub use schema::{ROW_SEQ_COLUMN, SchemaRegistry, TableSchema};
pub use sqlite::SqliteBackend;
pub use traits::TableBackend;
