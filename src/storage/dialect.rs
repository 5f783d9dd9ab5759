//! SQL dialect differences.
//!
//! Data statements are dialect-neutral; only table definitions and the
//! physical column types differ between `SQLite` and PostgreSQL.

use super::schema::{ROW_SEQ_COLUMN, TableSchema};
use crate::models::ColumnType;
use std::fmt::Write as _;

/// Target SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    /// `SQLite` 3.
    Sqlite,
    /// PostgreSQL.
    Postgres,
}

impl SqlDialect {
    /// Physical type for a declared column type.
    #[must_use]
    pub const fn column_type(self, column_type: ColumnType) -> &'static str {
        match (self, column_type) {
            (Self::Sqlite, ColumnType::Integer) => "INTEGER",
            (Self::Postgres, ColumnType::Integer) => "BIGINT",
            (_, ColumnType::Text) => "TEXT",
        }
    }

    /// Definition of the hidden insertion-sequence column.
    const fn row_seq_definition(self) -> &'static str {
        match self {
            Self::Sqlite => "INTEGER PRIMARY KEY AUTOINCREMENT",
            Self::Postgres => "BIGINT GENERATED ALWAYS AS IDENTITY PRIMARY KEY",
        }
    }

    /// Renders `CREATE TABLE` for `schema`.
    ///
    /// There is no `IF NOT EXISTS`; backends map the "already exists" error
    /// to success. Primary key columns become
    /// `NOT NULL` plus a `UNIQUE` constraint so that inserts can skip
    /// duplicates with `ON CONFLICT DO NOTHING`.
    #[must_use]
    pub fn create_table(self, schema: &TableSchema) -> String {
        let mut out = format!("CREATE TABLE {} (\n", schema.name());
        let _ = write!(
            out,
            "    {ROW_SEQ_COLUMN} {}",
            self.row_seq_definition()
        );

        for (column, column_type) in schema.columns() {
            let _ = write!(out, ",\n    {column} {}", self.column_type(*column_type));
            if schema.is_primary_key(column) {
                out.push_str(" NOT NULL");
            }
        }

        if !schema.primary_key().is_empty() {
            let _ = write!(out, ",\n    UNIQUE ({})", schema.primary_key().join(", "));
        }

        out.push_str("\n)");
        out
    }
}
