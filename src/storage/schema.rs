//! Field type registry.
//!
//! Static table schemas: which columns exist, what type each one has, and
//! which columns form the primary key. Schemas are built once at startup and
//! shared read-only through an `Arc`.

use super::identifier::validate;
use crate::models::ColumnType;
use crate::{Error, Result};
use std::collections::HashMap;

/// Hidden column every SQL table carries to preserve insertion order.
pub const ROW_SEQ_COLUMN: &str = "row_seq";

/// Schema of a single table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    name: String,
    columns: Vec<(String, ColumnType)>,
    primary_key: Vec<String>,
}

impl TableSchema {
    /// Creates a validated table schema.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIdentifier`] if the table or a column name is
    /// not a safe identifier or uses the reserved `row_seq` name, and
    /// [`Error::InvalidInput`] for duplicate columns, an empty column list or
    /// a primary key naming an undeclared column.
    pub fn new<N, C>(name: &str, columns: C, primary_key: &[&str]) -> Result<Self>
    where
        C: IntoIterator<Item = (N, ColumnType)>,
        N: Into<String>,
    {
        validate(name)?;

        let mut declared: Vec<(String, ColumnType)> = Vec::new();
        for (column, column_type) in columns {
            let column = column.into();
            validate(&column)?;
            if column.eq_ignore_ascii_case(ROW_SEQ_COLUMN) {
                return Err(Error::InvalidIdentifier { identifier: column });
            }
            if declared.iter().any(|(c, _)| *c == column) {
                return Err(Error::InvalidInput(format!(
                    "column '{column}' declared twice in table '{name}'"
                )));
            }
            declared.push((column, column_type));
        }

        if declared.is_empty() {
            return Err(Error::InvalidInput(format!(
                "table '{name}' must declare at least one column"
            )));
        }

        for key in primary_key {
            if !declared.iter().any(|(c, _)| c == key) {
                return Err(Error::InvalidInput(format!(
                    "primary key column '{key}' is not declared in table '{name}'"
                )));
            }
        }

        Ok(Self {
            name: name.to_string(),
            columns: declared,
            primary_key: primary_key.iter().map(ToString::to_string).collect(),
        })
    }

    /// Builds a schema from compile-time constants without validation.
    ///
    /// Only used for the built-in tables, whose names are covered by tests.
    fn from_static(
        name: &str,
        columns: &[(&str, ColumnType)],
        primary_key: &[&str],
    ) -> Self {
        Self {
            name: name.to_string(),
            columns: columns
                .iter()
                .map(|(c, t)| ((*c).to_string(), *t))
                .collect(),
            primary_key: primary_key.iter().map(ToString::to_string).collect(),
        }
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared columns in order.
    #[must_use]
    pub fn columns(&self) -> &[(String, ColumnType)] {
        &self.columns
    }

    /// Primary key columns in order.
    #[must_use]
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// Returns true if `column` is part of the primary key.
    #[must_use]
    pub fn is_primary_key(&self, column: &str) -> bool {
        self.primary_key.iter().any(|k| k == column)
    }

    /// Looks up the declared type of `column`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownColumn`] if the column is not declared.
    pub fn type_of(&self, column: &str) -> Result<ColumnType> {
        self.columns
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, t)| *t)
            .ok_or_else(|| Error::UnknownColumn {
                table: self.name.clone(),
                column: column.to_string(),
            })
    }
}

/// Registry of all table schemas the process manages.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    tables: HashMap<String, TableSchema>,
    order: Vec<String>,
}

impl SchemaRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the registry with the application's tables.
    ///
    /// - `expenses`: one row per recorded expense, keyed by user and time
    /// - `budgets`: monthly budget per user
    /// - `users`: known chat users
    #[must_use]
    pub fn builtin() -> Self {
        use ColumnType::{Integer, Text};

        Self::new()
            .with_table(TableSchema::from_static(
                "expenses",
                &[
                    ("id", Text),
                    ("user_id", Integer),
                    ("item", Text),
                    ("amount", Integer),
                    ("category", Text),
                    ("created_at", Text),
                ],
                &["user_id", "created_at"],
            ))
            .with_table(TableSchema::from_static(
                "budgets",
                &[("user_id", Integer), ("amount", Integer), ("updated_at", Text)],
                &["user_id"],
            ))
            .with_table(TableSchema::from_static(
                "users",
                &[("id", Integer), ("name", Text)],
                &["id"],
            ))
    }

    /// Adds (or replaces) a table schema.
    #[must_use]
    pub fn with_table(mut self, schema: TableSchema) -> Self {
        let name = schema.name.clone();
        if !self.order.contains(&name) {
            self.order.push(name.clone());
        }
        self.tables.insert(name, schema);
        self
    }

    /// Returns the schema for `table`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTable`] if the table is not registered.
    pub fn table(&self, table: &str) -> Result<&TableSchema> {
        self.tables.get(table).ok_or_else(|| Error::UnknownTable {
            table: table.to_string(),
        })
    }

    /// Looks up the declared type of `table.column`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownTable`] or [`Error::UnknownColumn`].
    pub fn type_of(&self, table: &str, column: &str) -> Result<ColumnType> {
        self.table(table)?.type_of(column)
    }

    /// Iterates over registered schemas in registration order.
    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.order.iter().filter_map(|name| self.tables.get(name))
    }
}
